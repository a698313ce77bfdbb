//! Service references and their per-service lifecycle state.

use std::time::SystemTime;

use serde::Serialize;

use crate::tree::DeviceId;

/// One-shot resolution state of a service's description retrieval.
///
/// A service starts `Pending` and transitions at most once, to `Resolved` or
/// `Failed`. Duplicate reports after the transition are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// The service has not reported yet
    Pending,
    /// The service finished resolving
    Resolved,
    /// The service failed to resolve
    Failed,
}

/// An active event subscription held by a service.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    /// Subscription ID (SID) granted by the device
    pub sid: String,
    /// Instant the subscription lapses unless renewed before then
    pub expires_at: SystemTime,
}

/// A service entry owned by a device node.
#[derive(Debug, Clone)]
pub struct ServiceRef {
    service_type: String,
    service_id: String,
    control_url: String,
    event_sub_url: String,
    presentation_url: Option<String>,
    scpd_url: String,
    device: DeviceId,
    resolution: ResolutionState,
    subscription: Option<SubscriptionHandle>,
}

impl ServiceRef {
    /// Create a service entry owned by `device`.
    pub fn new(
        service_type: impl Into<String>,
        service_id: impl Into<String>,
        control_url: impl Into<String>,
        event_sub_url: impl Into<String>,
        presentation_url: Option<String>,
        scpd_url: impl Into<String>,
        device: DeviceId,
    ) -> Self {
        Self {
            service_type: service_type.into(),
            service_id: service_id.into(),
            control_url: control_url.into(),
            event_sub_url: event_sub_url.into(),
            presentation_url,
            scpd_url: scpd_url.into(),
            device,
            resolution: ResolutionState::Pending,
            subscription: None,
        }
    }

    /// Service type URN, e.g. `urn:schemas-upnp-org:service:ContentDirectory:1`.
    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Service ID as declared in the description document.
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Control endpoint, as written in the document (possibly relative).
    pub fn control_url(&self) -> &str {
        &self.control_url
    }

    /// Eventing endpoint, as written in the document (possibly relative).
    pub fn event_sub_url(&self) -> &str {
        &self.event_sub_url
    }

    /// Presentation URL, when the document declares one.
    pub fn presentation_url(&self) -> Option<&str> {
        self.presentation_url.as_deref()
    }

    /// SCPD document URL, as written in the document (possibly relative).
    pub fn scpd_url(&self) -> &str {
        &self.scpd_url
    }

    /// The device node that owns this service.
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Class segment of the service type URN: the second-to-last
    /// colon-delimited component, ignoring domain and version. Returns
    /// `"ContentDirectory"` for `urn:schemas-upnp-org:service:ContentDirectory:1`.
    pub fn service_class(&self) -> Option<&str> {
        let segments: Vec<&str> = self.service_type.split(':').collect();
        let index = segments.len().checked_sub(2)?;
        let class = segments[index];
        (!class.is_empty()).then_some(class)
    }

    /// Unique service name: `"{device udn}::{service type}"`.
    pub fn usn(&self, device_udn: &str) -> String {
        format!("{}::{}", device_udn, self.service_type)
    }

    /// Current one-shot resolution state.
    pub fn resolution(&self) -> ResolutionState {
        self.resolution
    }

    /// The active subscription, if one is held.
    pub fn subscription(&self) -> Option<&SubscriptionHandle> {
        self.subscription.as_ref()
    }

    /// Subscription ID of the active subscription, if one is held.
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.sid.as_str())
    }

    /// Expiry of the active subscription, if one is held.
    pub fn subscription_expiry(&self) -> Option<SystemTime> {
        self.subscription.as_ref().map(|s| s.expires_at)
    }

    /// Structural snapshot of this service.
    pub fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            service_type: self.service_type.clone(),
            service_id: self.service_id.clone(),
            control_url: self.control_url.clone(),
            event_sub_url: self.event_sub_url.clone(),
            scpd_url: self.scpd_url.clone(),
        }
    }

    /// Transition `Pending` → `Resolved`. Returns whether the transition
    /// happened; duplicate reports return false.
    pub(crate) fn mark_resolved(&mut self) -> bool {
        if self.resolution != ResolutionState::Pending {
            return false;
        }
        self.resolution = ResolutionState::Resolved;
        true
    }

    /// Transition `Pending` → `Failed`. Returns whether the transition
    /// happened.
    pub(crate) fn mark_failed(&mut self) -> bool {
        if self.resolution != ResolutionState::Pending {
            return false;
        }
        self.resolution = ResolutionState::Failed;
        true
    }

    pub(crate) fn set_subscription(&mut self, sid: String, expires_at: SystemTime) {
        self.subscription = Some(SubscriptionHandle { sid, expires_at });
    }

    /// Move the expiry of the active subscription. Returns false when no
    /// subscription is held.
    pub(crate) fn apply_renewal(&mut self, expires_at: SystemTime) -> bool {
        match self.subscription.as_mut() {
            Some(subscription) => {
                subscription.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear_subscription(&mut self) -> Option<SubscriptionHandle> {
        self.subscription.take()
    }
}

/// Structural snapshot of a service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    /// Service type URN
    pub service_type: String,
    /// Service ID
    pub service_id: String,
    /// Control endpoint
    pub control_url: String,
    /// Eventing endpoint
    pub event_sub_url: String,
    /// SCPD document URL
    pub scpd_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn content_directory() -> ServiceRef {
        ServiceRef::new(
            "urn:schemas-upnp-org:service:ContentDirectory:1",
            "urn:upnp-org:serviceId:ContentDirectory",
            "/ctrl/cd",
            "/evt/cd",
            None,
            "/scpd/cd.xml",
            DeviceId::new(0),
        )
    }

    #[test]
    fn test_service_class_ignores_version() {
        let service = content_directory();
        assert_eq!(service.service_class(), Some("ContentDirectory"));

        let v2 = ServiceRef::new(
            "urn:schemas-upnp-org:service:ContentDirectory:2",
            "id",
            "/c",
            "/e",
            None,
            "/s",
            DeviceId::new(0),
        );
        assert_eq!(v2.service_class(), Some("ContentDirectory"));
    }

    #[test]
    fn test_service_class_of_malformed_type() {
        let service = ServiceRef::new("", "id", "/c", "/e", None, "/s", DeviceId::new(0));
        assert_eq!(service.service_class(), None);
    }

    #[test]
    fn test_usn_format() {
        let service = content_directory();
        assert_eq!(
            service.usn("uuid:device-1"),
            "uuid:device-1::urn:schemas-upnp-org:service:ContentDirectory:1"
        );
    }

    #[test]
    fn test_resolution_is_one_shot() {
        let mut service = content_directory();
        assert_eq!(service.resolution(), ResolutionState::Pending);
        assert!(service.mark_resolved());
        assert!(!service.mark_resolved());
        assert!(!service.mark_failed());
        assert_eq!(service.resolution(), ResolutionState::Resolved);
    }

    #[test]
    fn test_subscription_accessors() {
        let mut service = content_directory();
        assert_eq!(service.subscription_id(), None);

        let expires = SystemTime::now() + Duration::from_secs(1800);
        service.set_subscription("uuid:sub-1".to_string(), expires);
        assert_eq!(service.subscription_id(), Some("uuid:sub-1"));
        assert_eq!(service.subscription_expiry(), Some(expires));

        let later = expires + Duration::from_secs(1800);
        assert!(service.apply_renewal(later));
        assert_eq!(service.subscription_expiry(), Some(later));

        assert!(service.clear_subscription().is_some());
        assert!(!service.apply_renewal(later));
    }
}
