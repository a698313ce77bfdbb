//! Recursive, idempotent teardown of device subtrees.

use tracing::{debug, info};

use crate::tree::{DeviceId, DeviceTree};

impl DeviceTree {
    /// Tear down `id`'s subtree: children first (depth-first, children before
    /// self), then the node's own services, then the client association,
    /// which fires `remove_client` at most once.
    ///
    /// Idempotent: after the first call the node holds no children, services,
    /// or client, so a second call performs no removals and emits nothing.
    /// The slot itself stays in the arena, marked inert; in-flight async
    /// operations are not cancelled, their late results are dropped by the
    /// liveness checks on every mutation path.
    ///
    /// A removed embedded device stays listed in its parent's children, so a
    /// root whose child was torn down never reports completion.
    pub fn remove(&mut self, id: DeviceId) {
        let children = {
            let Some(node) = self.node_mut(id) else {
                debug!("remove for unknown node {id}");
                return;
            };
            info!("removing {} ({})", node.friendly_name(), node.udn());
            std::mem::take(&mut node.children)
        };
        for child in children {
            debug!("removing embedded device {child}");
            self.remove(child);
        }

        let (udn, client) = {
            let Some(node) = self.node_mut(id) else {
                return;
            };
            let services = std::mem::take(&mut node.services);
            for service in &services {
                debug!("dropping service {}", service.service_id());
            }
            node.removed = true;
            (node.udn.clone(), node.client.take())
        };

        if let Some(client) = client {
            self.registry().remove_client(udn.as_str(), &client);
        }
    }
}
