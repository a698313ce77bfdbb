//! Periodic subscription maintenance over a device tree.
//!
//! The maintainer owns no timer. Callers invoke
//! [`SubscriptionMaintainer::renew_subscriptions`] periodically; the period
//! must be strictly less than the minimum granted subscription lifetime
//! minus [`RENEWAL_LOOKAHEAD`], or renewals can be missed.
//!
//! Requests for one pass fan out concurrently, but never while the tree lock
//! is held: targets collect under the lock, the I/O happens with it
//! released, and results re-acquire it to apply through liveness-checked
//! tree methods. A result landing after the node was torn down is a no-op.

use std::time::{Duration, SystemTime};

use futures::future::join_all;
use tracing::{debug, info, warn};

use upnp_device::{DeviceId, DeviceTree, SharedTree};

use crate::transport::EventingTransport;

/// Fixed look-ahead window: a subscription expiring within this much of
/// `now` is renewed on the current pass.
pub const RENEWAL_LOOKAHEAD: Duration = Duration::from_secs(30);

/// Lifetime requested from the device on each renewal.
const REQUESTED_TIMEOUT: Duration = Duration::from_secs(1800);

/// Summary of one renewal pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenewReport {
    /// Subscriptions inspected during the walk
    pub checked: usize,
    /// Renewals that succeeded and were applied
    pub renewed: usize,
    /// Renewal attempts that failed
    pub failed: usize,
}

/// Summary of a bulk unsubscription. Every attempt has settled, succeeded or
/// failed, by the time this is returned.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnsubscribeReport {
    /// Unsubscribe requests issued
    pub attempted: usize,
    /// Requests that failed
    pub failed: usize,
}

struct DueRenewal {
    device: DeviceId,
    service_id: String,
    endpoint: String,
    sid: String,
}

struct UnsubscribeTarget {
    service_id: String,
    endpoint: String,
    sid: String,
}

/// Maintains the event subscriptions of a device tree through an
/// [`EventingTransport`].
pub struct SubscriptionMaintainer<T> {
    transport: T,
    requested_timeout: Duration,
}

impl<T: EventingTransport> SubscriptionMaintainer<T> {
    /// Create a maintainer over `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            requested_timeout: REQUESTED_TIMEOUT,
        }
    }

    /// Override the lifetime requested on each renewal.
    pub fn with_requested_timeout(mut self, timeout: Duration) -> Self {
        self.requested_timeout = timeout;
        self
    }

    /// Walk the tree depth-first (each node, then its children) and renew
    /// every subscription expiring within [`RENEWAL_LOOKAHEAD`] of `now`.
    ///
    /// A subscription already lapsed at `now` is logged as an anomaly and
    /// still renewed. Failed renewals are logged and counted; the
    /// subscription state keeps its old expiry so the next pass retries.
    pub async fn renew_subscriptions(&self, tree: &SharedTree, now: SystemTime) -> RenewReport {
        let (due, checked) = {
            let tree = tree.lock();
            let mut due = Vec::new();
            let mut checked = 0;
            collect_due(&tree, tree.root_id(), now, &mut due, &mut checked);
            (due, checked)
        };

        debug!("renewal pass: {} of {checked} subscriptions due", due.len());
        let results = join_all(
            due.iter()
                .map(|d| self.transport.renew(&d.endpoint, &d.sid, self.requested_timeout)),
        )
        .await;

        let mut report = RenewReport {
            checked,
            ..RenewReport::default()
        };
        let mut tree = tree.lock();
        for (entry, result) in due.into_iter().zip(results) {
            match result {
                Ok(granted) => {
                    if tree.apply_renewal(entry.device, &entry.service_id, now + granted) {
                        report.renewed += 1;
                    } else {
                        debug!(
                            "renewal for {} landed after teardown, ignoring",
                            entry.service_id
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to renew subscription for {}: {e}", entry.service_id);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Unsubscribe every active subscription held by `device`'s own
    /// services.
    ///
    /// Deliberately does not recurse into embedded children; callers wanting
    /// full-tree unsubscription recurse explicitly. All requests fan out
    /// concurrently and every attempt settles before the report returns; an
    /// individual failure never short-circuits the rest. Subscription state
    /// is cleared whether or not the device acknowledged.
    pub async fn unsubscribe_all(&self, tree: &SharedTree, device: DeviceId) -> UnsubscribeReport {
        let targets: Vec<UnsubscribeTarget> = {
            let tree = tree.lock();
            let Some(node) = tree.node(device) else {
                warn!("unsubscribe_all for unknown node {device}");
                return UnsubscribeReport::default();
            };
            node.services()
                .iter()
                .filter_map(|service| {
                    let subscription = service.subscription()?;
                    match tree.resolve_url(device, service.event_sub_url()) {
                        Ok(endpoint) => Some(UnsubscribeTarget {
                            service_id: service.service_id().to_string(),
                            endpoint,
                            sid: subscription.sid.clone(),
                        }),
                        Err(e) => {
                            warn!(
                                "cannot resolve event endpoint for {}: {e}",
                                service.service_id()
                            );
                            None
                        }
                    }
                })
                .collect()
        };

        info!(
            "unsubscribing {} subscriptions on {device}",
            targets.len()
        );
        let results = join_all(
            targets
                .iter()
                .map(|t| self.transport.unsubscribe(&t.endpoint, &t.sid)),
        )
        .await;

        let mut report = UnsubscribeReport {
            attempted: targets.len(),
            failed: 0,
        };
        let mut tree = tree.lock();
        for (target, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                warn!("unsubscribe for {} failed: {e}", target.service_id);
                report.failed += 1;
            }
            tree.clear_subscription(device, &target.service_id);
        }
        report
    }
}

fn collect_due(
    tree: &DeviceTree,
    id: DeviceId,
    now: SystemTime,
    due: &mut Vec<DueRenewal>,
    checked: &mut usize,
) {
    let Some(node) = tree.node(id) else {
        return;
    };

    for service in node.services() {
        let Some(subscription) = service.subscription() else {
            continue;
        };
        *checked += 1;
        if subscription.expires_at < now {
            warn!(
                "event subscription for {} lapsed before renewal; the renew period may be too long for the granted lifetime",
                service.service_id()
            );
        }
        if subscription.expires_at < now + RENEWAL_LOOKAHEAD {
            match tree.resolve_url(id, service.event_sub_url()) {
                Ok(endpoint) => due.push(DueRenewal {
                    device: id,
                    service_id: service.service_id().to_string(),
                    endpoint,
                    sid: subscription.sid.clone(),
                }),
                Err(e) => warn!(
                    "cannot resolve event endpoint for {}: {e}",
                    service.service_id()
                ),
            }
        }
    }

    for child in node.children() {
        collect_due(tree, *child, now, due, checked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EventingError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use upnp_device::{parse_description, DeviceTree, DiscoveryInfo, Manifestation, NullRegistry};

    const DOC: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
    <friendlyName>Root</friendlyName>
    <UDN>uuid:root-1</UDN>
    <serviceList>
      <service>
        <serviceType>urn:x:service:A:1</serviceType>
        <serviceId>root-a</serviceId>
        <controlURL>/c</controlURL><eventSubURL>/evt/a</eventSubURL><SCPDURL>/s</SCPDURL>
      </service>
      <service>
        <serviceType>urn:x:service:B:1</serviceType>
        <serviceId>root-b</serviceId>
        <controlURL>/c</controlURL><eventSubURL>/evt/b</eventSubURL><SCPDURL>/s</SCPDURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:Embedded:1</deviceType>
        <friendlyName>Nested</friendlyName>
        <UDN>uuid:embedded-1</UDN>
        <serviceList>
          <service>
            <serviceType>urn:x:service:C:1</serviceType>
            <serviceId>embedded-c</serviceId>
            <controlURL>/c</controlURL><eventSubURL>/evt/c</eventSubURL><SCPDURL>/s</SCPDURL>
          </service>
        </serviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

    fn build() -> SharedTree {
        let mut tree = DeviceTree::new(
            DiscoveryInfo {
                usn: "uuid:root-1::upnp:rootdevice".to_string(),
                server: "Linux UPnP/1.0".to_string(),
                search_target: "upnp:rootdevice".to_string(),
                location: "http://192.168.1.20:49152/desc.xml".to_string(),
                manifestation: Manifestation::Remote,
                host: "192.168.1.20".to_string(),
            },
            Arc::new(NullRegistry),
        );
        parse_description(&mut tree, DOC.as_bytes()).unwrap();
        tree.shared()
    }

    /// Transport that records every request and answers from canned results.
    #[derive(Default)]
    struct RecordingTransport {
        renewed: Mutex<Vec<(String, String)>>,
        unsubscribed: Mutex<Vec<(String, String)>>,
        fail_sids: Vec<String>,
    }

    #[async_trait]
    impl EventingTransport for RecordingTransport {
        async fn renew(
            &self,
            endpoint: &str,
            sid: &str,
            timeout: Duration,
        ) -> Result<Duration, EventingError> {
            self.renewed
                .lock()
                .push((endpoint.to_string(), sid.to_string()));
            if self.fail_sids.iter().any(|s| s == sid) {
                return Err(EventingError::RenewalFailed("HTTP 412".to_string()));
            }
            Ok(timeout)
        }

        async fn unsubscribe(&self, endpoint: &str, sid: &str) -> Result<(), EventingError> {
            self.unsubscribed
                .lock()
                .push((endpoint.to_string(), sid.to_string()));
            if self.fail_sids.iter().any(|s| s == sid) {
                return Err(EventingError::UnsubscribeFailed("HTTP 404".to_string()));
            }
            Ok(())
        }
    }

    fn renewed_sids(transport: &RecordingTransport) -> Vec<String> {
        transport
            .renewed
            .lock()
            .iter()
            .map(|(_, sid)| sid.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_renews_inside_lookahead_only() {
        let tree = build();
        let now = SystemTime::now();
        {
            let mut tree = tree.lock();
            let root = tree.root_id();
            // 29 seconds out: due
            tree.set_subscription(root, "root-a", "sid-a".to_string(), now + Duration::from_secs(29));
            // 31 seconds out: not due
            tree.set_subscription(root, "root-b", "sid-b".to_string(), now + Duration::from_secs(31));
        }

        let maintainer = SubscriptionMaintainer::new(RecordingTransport::default());
        let report = maintainer.renew_subscriptions(&tree, now).await;

        assert_eq!(report, RenewReport { checked: 2, renewed: 1, failed: 0 });
        assert_eq!(renewed_sids(&maintainer.transport), vec!["sid-a"]);
    }

    #[tokio::test]
    async fn test_renewal_walks_into_children_and_resolves_endpoints() {
        let tree = build();
        let now = SystemTime::now();
        let child = {
            let mut tree = tree.lock();
            let root = tree.root_id();
            let child = tree.node(root).unwrap().children()[0];
            tree.set_subscription(child, "embedded-c", "sid-c".to_string(), now);
            child
        };

        let maintainer = SubscriptionMaintainer::new(RecordingTransport::default());
        let report = maintainer.renew_subscriptions(&tree, now).await;

        assert_eq!(report.renewed, 1);
        let renewed = maintainer.transport.renewed.lock();
        assert_eq!(
            renewed[0].0,
            "http://192.168.1.20:49152/evt/c"
        );
        let tree = tree.lock();
        let service = &tree.node(child).unwrap().services()[0];
        assert_eq!(
            service.subscription_expiry(),
            Some(now + REQUESTED_TIMEOUT)
        );
    }

    #[tokio::test]
    async fn test_lapsed_subscription_is_still_renewed() {
        let tree = build();
        let now = SystemTime::now();
        {
            let mut tree = tree.lock();
            let root = tree.root_id();
            tree.set_subscription(root, "root-a", "sid-a".to_string(), now - Duration::from_secs(5));
        }

        let maintainer = SubscriptionMaintainer::new(RecordingTransport::default());
        let report = maintainer.renew_subscriptions(&tree, now).await;
        assert_eq!(report.renewed, 1);
    }

    #[tokio::test]
    async fn test_failed_renewal_keeps_old_expiry() {
        let tree = build();
        let now = SystemTime::now();
        let expiry = now + Duration::from_secs(10);
        {
            let mut tree = tree.lock();
            let root = tree.root_id();
            tree.set_subscription(root, "root-a", "sid-a".to_string(), expiry);
        }

        let transport = RecordingTransport {
            fail_sids: vec!["sid-a".to_string()],
            ..RecordingTransport::default()
        };
        let maintainer = SubscriptionMaintainer::new(transport);
        let report = maintainer.renew_subscriptions(&tree, now).await;

        assert_eq!(report, RenewReport { checked: 1, renewed: 0, failed: 1 });
        let tree = tree.lock();
        let root = tree.root_id();
        let service = &tree.node(root).unwrap().services()[0];
        assert_eq!(service.subscription_expiry(), Some(expiry));
    }

    /// Transport that tears the device down while the renewal is in flight.
    struct RemovingTransport {
        tree: SharedTree,
    }

    #[async_trait]
    impl EventingTransport for RemovingTransport {
        async fn renew(
            &self,
            _endpoint: &str,
            _sid: &str,
            timeout: Duration,
        ) -> Result<Duration, EventingError> {
            let mut tree = self.tree.lock();
            let root = tree.root_id();
            tree.remove(root);
            Ok(timeout)
        }

        async fn unsubscribe(&self, _endpoint: &str, _sid: &str) -> Result<(), EventingError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_renewal_landing_after_teardown_is_a_noop() {
        let tree = build();
        let now = SystemTime::now();
        {
            let mut tree = tree.lock();
            let root = tree.root_id();
            tree.set_subscription(root, "root-a", "sid-a".to_string(), now);
        }

        let maintainer = SubscriptionMaintainer::new(RemovingTransport {
            tree: Arc::clone(&tree),
        });
        let report = maintainer.renew_subscriptions(&tree, now).await;

        // the request went out but nothing was applied
        assert_eq!(report.renewed, 0);
        assert_eq!(report.failed, 0);
        let tree = tree.lock();
        let root = tree.root_id();
        assert!(!tree.is_live(root));
    }

    #[tokio::test]
    async fn test_unsubscribe_all_settles_every_attempt() {
        let tree = build();
        let now = SystemTime::now();
        let root = {
            let mut tree = tree.lock();
            let root = tree.root_id();
            tree.set_subscription(root, "root-a", "sid-a".to_string(), now);
            tree.set_subscription(root, "root-b", "sid-b".to_string(), now);
            root
        };

        let transport = RecordingTransport {
            fail_sids: vec!["sid-a".to_string()],
            ..RecordingTransport::default()
        };
        let maintainer = SubscriptionMaintainer::new(transport);
        let report = maintainer.unsubscribe_all(&tree, root).await;

        // the failure did not short-circuit the second attempt
        assert_eq!(report, UnsubscribeReport { attempted: 2, failed: 1 });
        assert_eq!(maintainer.transport.unsubscribed.lock().len(), 2);

        // state cleared regardless of outcome
        let tree = tree.lock();
        for service in tree.node(root).unwrap().services() {
            assert!(service.subscription().is_none());
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_all_does_not_recurse_into_children() {
        let tree = build();
        let now = SystemTime::now();
        let (root, child) = {
            let mut tree = tree.lock();
            let root = tree.root_id();
            let child = tree.node(root).unwrap().children()[0];
            tree.set_subscription(root, "root-a", "sid-a".to_string(), now);
            tree.set_subscription(child, "embedded-c", "sid-c".to_string(), now);
            (root, child)
        };

        let maintainer = SubscriptionMaintainer::new(RecordingTransport::default());
        let report = maintainer.unsubscribe_all(&tree, root).await;

        assert_eq!(report.attempted, 1);
        let tree = tree.lock();
        // the child's subscription survives
        let service = &tree.node(child).unwrap().services()[0];
        assert_eq!(service.subscription_id(), Some("sid-c"));
    }

    #[tokio::test]
    async fn test_services_without_subscriptions_are_ignored() {
        let tree = build();
        let maintainer = SubscriptionMaintainer::new(RecordingTransport::default());

        let report = maintainer
            .renew_subscriptions(&tree, SystemTime::now())
            .await;
        assert_eq!(report, RenewReport::default());

        let root = tree.lock().root_id();
        let report = maintainer.unsubscribe_all(&tree, root).await;
        assert_eq!(report, UnsubscribeReport::default());
    }
}
