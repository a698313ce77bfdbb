//! External registry observer notified of tree lifecycle events.

use std::any::Any;
use std::sync::Arc;

use crate::tree::DeviceId;

/// Opaque association between a device node and a control-point client.
pub type ClientHandle = Arc<dyn Any + Send + Sync>;

/// Observer for tree lifecycle notifications.
///
/// `detection_completed` fires exactly once per node, bottom-up, at the
/// moment the node's completion predicate first becomes true.
/// `remove_client` fires at most once per node, during teardown of a node
/// that still holds a client association.
///
/// Notifications fire synchronously from within tree mutation, so
/// implementations should hand the information off rather than re-enter the
/// tree.
pub trait DeviceRegistry: Send + Sync {
    /// A node finished resolving all of its constituent parts.
    fn detection_completed(&self, device: DeviceId, udn: &str);

    /// A node holding a client association was torn down.
    fn remove_client(&self, udn: &str, client: &ClientHandle);
}

/// Registry that ignores every notification.
pub struct NullRegistry;

impl DeviceRegistry for NullRegistry {
    fn detection_completed(&self, _device: DeviceId, _udn: &str) {}

    fn remove_client(&self, _udn: &str, _client: &ClientHandle) {}
}
