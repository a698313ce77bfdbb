//! Arena-backed device tree and node accessors.
//!
//! Nodes live in a slot arena addressed by [`DeviceId`]; parents are stored
//! as non-owning ids and children as owned id lists, so the parent/child/
//! service references never form an ownership cycle. Slots are never
//! deallocated: teardown marks a node inert and every externally reachable
//! mutation checks liveness first, so a signal addressed to a removed node
//! is a logged no-op.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::registry::{ClientHandle, DeviceRegistry};
use crate::resolve;
use crate::service::{ResolutionState, ServiceRef};

/// Stable identifier of a node slot in a [`DeviceTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(usize);

impl DeviceId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device-{}", self.0)
    }
}

/// Globally unique device identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Udn(String);

impl Udn {
    /// Create a UDN from a string, e.g. `uuid:a0fd3f45-...`.
    pub fn new(udn: impl Into<String>) -> Self {
        Self(udn.into())
    }

    /// Get the UDN as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The UDN with its `uuid:` prefix stripped, when present.
    pub fn uuid(&self) -> &str {
        self.0.strip_prefix("uuid:").unwrap_or(&self.0)
    }
}

impl fmt::Display for Udn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Udn {
    fn from(udn: &str) -> Self {
        Self(udn.to_string())
    }
}

impl From<String> for Udn {
    fn from(udn: String) -> Self {
        Self(udn)
    }
}

/// Whether a device is hosted locally or was discovered on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Manifestation {
    /// The device is hosted by this process
    Local,
    /// The device was discovered remotely
    Remote,
}

impl Manifestation {
    /// True for locally hosted devices.
    pub fn is_local(self) -> bool {
        self == Manifestation::Local
    }

    /// True for remotely discovered devices.
    pub fn is_remote(self) -> bool {
        !self.is_local()
    }
}

impl From<&str> for Manifestation {
    fn from(value: &str) -> Self {
        if value == "local" {
            Manifestation::Local
        } else {
            Manifestation::Remote
        }
    }
}

/// Identity metadata supplied by the discovery transport for an announced
/// root device.
#[derive(Debug, Clone)]
pub struct DiscoveryInfo {
    /// Unique service name from the announcement
    pub usn: String,
    /// SERVER header of the announcement
    pub server: String,
    /// Search target the device answered
    pub search_target: String,
    /// Description document URL
    pub location: String,
    /// Local or remote manifestation
    pub manifestation: Manifestation,
    /// Host the announcement came from
    pub host: String,
}

/// Identity payload carried by the root node only.
///
/// Non-root nodes do not duplicate any of this; their
/// location/usn/upnp-version/urlbase lookups delegate up the parent chain.
#[derive(Debug)]
pub struct RootIdentity {
    usn: String,
    server: String,
    search_target: String,
    location: String,
    manifestation: Manifestation,
    host: String,
    pub(crate) upnp_version: String,
    pub(crate) urlbase: Option<String>,
    pub(crate) completed_children: usize,
}

impl RootIdentity {
    fn new(info: DiscoveryInfo) -> Self {
        Self {
            usn: info.usn,
            server: info.server,
            search_target: info.search_target,
            location: info.location,
            manifestation: info.manifestation,
            host: info.host,
            upnp_version: "n/a".to_string(),
            urlbase: None,
            completed_children: 0,
        }
    }

    /// Unique service name of the announcement.
    pub fn usn(&self) -> &str {
        &self.usn
    }

    /// SERVER header of the announcement.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Search target the device answered.
    pub fn search_target(&self) -> &str {
        &self.search_target
    }

    /// Description document URL.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Local or remote manifestation.
    pub fn manifestation(&self) -> Manifestation {
        self.manifestation
    }

    /// Host the announcement came from.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// UPnP spec version from the description document, `"n/a"` until the
    /// document declares one.
    pub fn upnp_version(&self) -> &str {
        &self.upnp_version
    }

    /// Optional URLBase of the description document.
    pub fn urlbase(&self) -> Option<&str> {
        self.urlbase.as_deref()
    }

    /// Number of direct children that have completed detection.
    pub fn completed_children(&self) -> usize {
        self.completed_children
    }
}

/// Extended metadata block of a device; every field is best-effort.
#[derive(Debug, Default, Clone)]
pub struct DeviceDetails {
    /// Manufacturer name
    pub manufacturer: Option<String>,
    /// Manufacturer URL
    pub manufacturer_url: Option<String>,
    /// Model name
    pub model_name: Option<String>,
    /// Model description
    pub model_description: Option<String>,
    /// Model number
    pub model_number: Option<String>,
    /// Model URL
    pub model_url: Option<String>,
    /// Serial number
    pub serial_number: Option<String>,
    /// Universal product code
    pub upc: Option<String>,
    /// Presentation URL, as written in the document (possibly relative)
    pub presentation_url: Option<String>,
    /// DLNA device class declarations (`X_DLNADOC`)
    pub dlna_device_classes: Vec<String>,
    /// DLNA capability declarations (`X_DLNACAP`, comma-split)
    pub dlna_capabilities: Vec<String>,
}

/// A device icon with its original and resolved URLs.
#[derive(Debug, Clone)]
pub struct IconDescriptor {
    /// Icon MIME type
    pub mimetype: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Color depth in bits
    pub depth: u32,
    /// URL as written in the document
    pub url: String,
    /// URL resolved against the scheme+host of the device's location
    pub resolved_url: String,
}

/// One node of the description tree.
pub struct DeviceNode {
    id: DeviceId,
    parent: Option<DeviceId>,
    pub(crate) friendly_name: String,
    pub(crate) device_type: String,
    pub(crate) udn: Udn,
    pub(crate) icons: Vec<IconDescriptor>,
    pub(crate) services: Vec<ServiceRef>,
    pub(crate) children: Vec<DeviceId>,
    pub(crate) client: Option<ClientHandle>,
    pub(crate) details: DeviceDetails,
    pub(crate) completed_services: usize,
    pub(crate) detection_fired: bool,
    pub(crate) removed: bool,
    pub(crate) root: Option<RootIdentity>,
}

impl DeviceNode {
    fn new(id: DeviceId, parent: Option<DeviceId>) -> Self {
        Self {
            id,
            parent,
            friendly_name: String::new(),
            device_type: String::new(),
            udn: Udn::default(),
            icons: Vec::new(),
            services: Vec::new(),
            children: Vec::new(),
            client: None,
            details: DeviceDetails::default(),
            completed_services: 0,
            detection_fired: false,
            removed: false,
            root: None,
        }
    }

    /// This node's arena id.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Parent node id; `None` at the structural root.
    pub fn parent(&self) -> Option<DeviceId> {
        self.parent
    }

    /// Friendly name from the description document.
    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    /// Device type URN, e.g. `urn:schemas-upnp-org:device:MediaServer:1`.
    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// Unique device identifier. Assigned exactly once, during parse.
    pub fn udn(&self) -> &Udn {
        &self.udn
    }

    /// Parsed icon descriptors, in document order.
    pub fn icons(&self) -> &[IconDescriptor] {
        &self.icons
    }

    /// Owned services, in document order.
    pub fn services(&self) -> &[ServiceRef] {
        &self.services
    }

    /// Owned embedded-device ids, in document order.
    pub fn children(&self) -> &[DeviceId] {
        &self.children
    }

    /// Client association, when one has been set.
    pub fn client(&self) -> Option<&ClientHandle> {
        self.client.as_ref()
    }

    /// Extended metadata.
    pub fn details(&self) -> &DeviceDetails {
        &self.details
    }

    /// Root identity payload; present on the root node only.
    pub fn root_identity(&self) -> Option<&RootIdentity> {
        self.root.as_ref()
    }

    /// Number of owned services that have reported resolution.
    pub fn completed_services(&self) -> usize {
        self.completed_services
    }

    /// Whether this node's one-shot completion has fired.
    pub fn detection_fired(&self) -> bool {
        self.detection_fired
    }

    /// Whether this node has been torn down.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Class segment of the device type URN (second-to-last component).
    pub fn friendly_device_type(&self) -> Option<&str> {
        urn_segment(&self.device_type, 1)
    }

    /// Version segment of the device type URN (last component).
    pub fn device_type_version(&self) -> Option<&str> {
        urn_segment(&self.device_type, 0)
    }

    /// Short display name, recomputed on demand:
    /// `"{friendly_device_type}:{version} {friendly_name}"`.
    pub fn markup_name(&self) -> String {
        format!(
            "{}:{} {}",
            self.friendly_device_type().unwrap_or("[unknown]"),
            self.device_type_version().unwrap_or("0"),
            self.friendly_name
        )
    }

    pub(crate) fn assign_udn(&mut self, udn: Udn) {
        debug_assert!(self.udn.as_str().is_empty(), "udn is assigned exactly once");
        self.udn = udn;
    }
}

fn urn_segment(urn: &str, from_end: usize) -> Option<&str> {
    let segments: Vec<&str> = urn.split(':').collect();
    let index = segments.len().checked_sub(from_end + 1)?;
    let segment = segments[index];
    (!segment.is_empty()).then_some(segment)
}

/// Shared handle to a device tree behind its single-writer lock.
///
/// The lock is the synchronization the tree relies on: renewals and
/// unsubscriptions collect under it, await with it released, then re-lock to
/// apply, so no in-flight request can race a concurrent teardown.
pub type SharedTree = Arc<Mutex<DeviceTree>>;

/// The description tree of one announced root device.
pub struct DeviceTree {
    slots: Vec<DeviceNode>,
    root: DeviceId,
    registry: Arc<dyn DeviceRegistry>,
}

impl DeviceTree {
    /// Create a tree whose root node and identity come from discovery
    /// metadata. The root's own description fields are filled by the parse
    /// step once the document arrives.
    pub fn new(info: DiscoveryInfo, registry: Arc<dyn DeviceRegistry>) -> Self {
        let root = DeviceId::new(0);
        let mut node = DeviceNode::new(root, None);
        node.root = Some(RootIdentity::new(info));
        Self {
            slots: vec![node],
            root,
            registry,
        }
    }

    /// Id of the structural root.
    pub fn root_id(&self) -> DeviceId {
        self.root
    }

    /// Look up a node. Removed nodes are still returned; check
    /// [`DeviceNode::is_removed`] when liveness matters.
    pub fn node(&self, id: DeviceId) -> Option<&DeviceNode> {
        self.slots.get(id.0)
    }

    /// Whether `id` names a node that has not been torn down.
    pub fn is_live(&self, id: DeviceId) -> bool {
        self.node(id).map(|n| !n.removed).unwrap_or(false)
    }

    /// Wrap the tree in its shared single-writer lock.
    pub fn shared(self) -> SharedTree {
        Arc::new(Mutex::new(self))
    }

    pub(crate) fn node_mut(&mut self, id: DeviceId) -> Option<&mut DeviceNode> {
        self.slots.get_mut(id.0)
    }

    pub(crate) fn registry(&self) -> Arc<dyn DeviceRegistry> {
        Arc::clone(&self.registry)
    }

    /// Allocate an embedded-device node attached under `parent`.
    pub(crate) fn alloc_child(&mut self, parent: DeviceId) -> DeviceId {
        let id = DeviceId::new(self.slots.len());
        self.slots.push(DeviceNode::new(id, Some(parent)));
        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.push(id);
        }
        id
    }

    /// Roll back a child whose parse failed: detach it from its parent and
    /// mark its slot inert.
    pub(crate) fn discard_child(&mut self, parent: DeviceId, child: DeviceId) {
        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.retain(|c| *c != child);
        }
        if let Some(child_node) = self.node_mut(child) {
            child_node.removed = true;
        }
    }

    /// RootIdentity reachable from `id` by walking the parent chain.
    pub fn root_identity_for(&self, id: DeviceId) -> Option<&RootIdentity> {
        let mut current = id;
        loop {
            let node = self.node(current)?;
            if let Some(root) = node.root.as_ref() {
                return Some(root);
            }
            current = node.parent?;
        }
    }

    /// Description document URL, delegated up to the root identity.
    pub fn location(&self, id: DeviceId) -> Option<&str> {
        self.root_identity_for(id).map(RootIdentity::location)
    }

    /// Description URLBase, delegated up to the root identity.
    pub fn urlbase(&self, id: DeviceId) -> Option<&str> {
        self.root_identity_for(id).and_then(RootIdentity::urlbase)
    }

    /// UPnP spec version, delegated up to the root identity.
    pub fn upnp_version(&self, id: DeviceId) -> Option<&str> {
        self.root_identity_for(id).map(RootIdentity::upnp_version)
    }

    /// Announcement USN, delegated up to the root identity.
    pub fn usn(&self, id: DeviceId) -> Option<&str> {
        self.root_identity_for(id).map(RootIdentity::usn)
    }

    /// UDN of `id`'s parent node, `None` at the root.
    pub fn parent_udn(&self, id: DeviceId) -> Option<&Udn> {
        let parent = self.node(id)?.parent?;
        self.node(parent).map(DeviceNode::udn)
    }

    /// Resolve `reference` using the node's urlbase/location.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::NoRootIdentity` if the node is unknown, and
    /// the underlying join errors otherwise.
    pub fn resolve_url(&self, id: DeviceId, reference: &str) -> Result<String, ResolveError> {
        let root = self
            .root_identity_for(id)
            .ok_or(ResolveError::NoRootIdentity)?;
        resolve::resolve(reference, root.urlbase(), root.location())
    }

    /// The node's presentation URL made fully qualified, when set and
    /// resolvable.
    pub fn presentation_url(&self, id: DeviceId) -> Option<String> {
        let raw = self.node(id)?.details.presentation_url.clone()?;
        self.resolve_url(id, &raw).ok()
    }

    /// Append a service to `device`. No-op when the node is unknown or
    /// removed.
    pub fn add_service(&mut self, device: DeviceId, service: ServiceRef) {
        match self.node_mut(device) {
            Some(node) if !node.removed => {
                debug!(
                    "add service {} to {}",
                    service.service_id(),
                    node.udn
                );
                node.services.push(service);
            }
            _ => warn!("add_service for unknown or removed node {device}"),
        }
    }

    /// Find a service on `device` by the class segment of its type URN,
    /// ignoring domain and version. `"ContentDirectory"` matches
    /// `urn:schemas-upnp-org:service:ContentDirectory:1`.
    pub fn service_by_type(&self, device: DeviceId, class: &str) -> Option<&ServiceRef> {
        self.node(device)?
            .services
            .iter()
            .find(|s| s.service_class() == Some(class))
    }

    /// Remove the service whose USN is `usn` from `device`, if present.
    /// Returns whether a service was removed.
    pub fn remove_service_with_usn(&mut self, device: DeviceId, usn: &str) -> bool {
        let Some(node) = self.node_mut(device) else {
            return false;
        };
        let udn = node.udn.as_str().to_string();
        let Some(index) = node.services.iter().position(|s| s.usn(&udn) == usn) else {
            return false;
        };
        let service = node.services.remove(index);
        // keep completed_services <= services.len()
        if service.resolution() == ResolutionState::Resolved && node.completed_services > 0 {
            node.completed_services -= 1;
        }
        debug!("removed service {} from {}", service.service_id(), udn);
        true
    }

    /// Record a granted subscription on a service. Liveness-checked; returns
    /// whether the state was applied.
    pub fn set_subscription(
        &mut self,
        device: DeviceId,
        service_id: &str,
        sid: String,
        expires_at: SystemTime,
    ) -> bool {
        match self.live_service_mut(device, service_id) {
            Some(service) => {
                service.set_subscription(sid, expires_at);
                true
            }
            None => {
                debug!("set_subscription for missing {device}/{service_id}, ignoring");
                false
            }
        }
    }

    /// Move a subscription's expiry after a successful renewal.
    /// Liveness-checked; a renewal landing after teardown returns false and
    /// changes nothing.
    pub fn apply_renewal(
        &mut self,
        device: DeviceId,
        service_id: &str,
        expires_at: SystemTime,
    ) -> bool {
        match self.live_service_mut(device, service_id) {
            Some(service) => service.apply_renewal(expires_at),
            None => {
                debug!("renewal for missing {device}/{service_id}, ignoring");
                false
            }
        }
    }

    /// Drop a service's subscription state. Liveness-checked; returns whether
    /// a subscription was held.
    pub fn clear_subscription(&mut self, device: DeviceId, service_id: &str) -> bool {
        match self.live_service_mut(device, service_id) {
            Some(service) => service.clear_subscription().is_some(),
            None => false,
        }
    }

    /// Associate an opaque client with `device`. Liveness-checked.
    pub fn set_client(&mut self, device: DeviceId, client: ClientHandle) -> bool {
        match self.node_mut(device) {
            Some(node) if !node.removed => {
                node.client = Some(client);
                true
            }
            _ => {
                warn!("set_client for unknown or removed node {device}");
                false
            }
        }
    }

    fn live_service_mut(&mut self, device: DeviceId, service_id: &str) -> Option<&mut ServiceRef> {
        let node = self.node_mut(device)?;
        if node.removed {
            return None;
        }
        node.services
            .iter_mut()
            .find(|s| s.service_id() == service_id)
    }
}
