//! Bottom-up completion detection over the device tree.
//!
//! A non-root node is complete when it owns at least one service and every
//! one of them has reported resolution. The root additionally waits for each
//! of its direct children. The children aggregate is intentionally root-only:
//! a device nested two or more levels deep satisfies the children term
//! vacuously, and its own completion feeds no counter above it. A device
//! with no services never completes and stays invisible to the registry.

use tracing::{debug, warn};

use crate::tree::{DeviceId, DeviceTree};

impl DeviceTree {
    /// Whether `id` currently satisfies its completion predicate.
    pub fn is_detection_complete(&self, id: DeviceId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        let services_done =
            !node.services.is_empty() && node.completed_services == node.services.len();
        match node.root_identity() {
            Some(root) => services_done && root.completed_children() == node.children.len(),
            None => services_done,
        }
    }

    /// Record a service's one-shot resolution report and re-evaluate the
    /// owning node. Duplicate reports and reports addressed to removed nodes
    /// are logged no-ops.
    pub fn service_resolved(&mut self, device: DeviceId, service_id: &str) {
        let Some(node) = self.node_mut(device) else {
            warn!("resolution report for unknown node {device}");
            return;
        };
        if node.removed {
            debug!("resolution report for removed node {device}, ignoring");
            return;
        }
        let Some(service) = node
            .services
            .iter_mut()
            .find(|s| s.service_id() == service_id)
        else {
            warn!("resolution report for unknown service {service_id} on {device}");
            return;
        };
        if !service.mark_resolved() {
            debug!("duplicate resolution report for {service_id}, ignoring");
            return;
        }
        node.completed_services += 1;
        debug!(
            "service {service_id} resolved, {}/{} complete on {device}",
            node.completed_services,
            node.services.len()
        );
        self.evaluate_detection(device);
    }

    /// Record a service's resolution failure. One failed service discards
    /// the entire owning device, descendants included.
    pub fn service_resolution_failed(&mut self, device: DeviceId, service_id: &str) {
        if let Some(node) = self.node_mut(device) {
            if let Some(service) = node
                .services
                .iter_mut()
                .find(|s| s.service_id() == service_id)
            {
                service.mark_failed();
            }
        }
        self.service_detection_failed(device);
    }

    /// A service under `device` failed detection; the whole device goes.
    pub fn service_detection_failed(&mut self, device: DeviceId) {
        warn!("service detection failed for {device}, removing the device");
        self.remove(device);
    }

    /// Re-evaluate `id`, firing its one-shot completion notification when
    /// the predicate has newly become true, and feeding the root's children
    /// aggregate when `id` hangs directly under the root.
    pub(crate) fn evaluate_detection(&mut self, id: DeviceId) {
        if !self.is_detection_complete(id) {
            return;
        }

        let (udn, parent) = {
            let Some(node) = self.node_mut(id) else {
                return;
            };
            if node.detection_fired || node.removed {
                return;
            }
            node.detection_fired = true;
            (node.udn.clone(), node.parent())
        };

        debug!("detection completed for {udn} ({id})");
        self.registry().detection_completed(id, udn.as_str());

        if let Some(parent_id) = parent {
            let parent_is_root = self
                .node(parent_id)
                .map(|n| n.root_identity().is_some())
                .unwrap_or(false);
            if parent_is_root {
                if let Some(parent_node) = self.node_mut(parent_id) {
                    if let Some(identity) = parent_node.root.as_mut() {
                        identity.completed_children += 1;
                    }
                }
                self.evaluate_detection(parent_id);
            }
        }
    }
}
