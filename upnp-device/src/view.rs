//! Structural snapshots and display listings of device nodes.

use serde::Serialize;

use crate::service::ServiceSnapshot;
use crate::tree::{DeviceId, DeviceTree};

/// Recursive structural snapshot of a device node.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    /// Device type URN
    pub device_type: String,
    /// Friendly name
    pub friendly_name: String,
    /// Unique device identifier
    pub udn: String,
    /// Snapshots of the owned services, in document order
    pub services: Vec<ServiceSnapshot>,
    /// Snapshots of the parsed icons, in document order
    pub icons: Vec<IconSnapshot>,
}

/// Snapshot of one icon entry; carries the resolved URL.
#[derive(Debug, Clone, Serialize)]
pub struct IconSnapshot {
    /// Icon MIME type
    pub mimetype: String,
    /// Resolved icon URL
    pub url: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Color depth in bits
    pub depth: u32,
}

/// A single labeled value in a display listing.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayValue {
    /// Plain text value
    Text(String),
    /// A URL shown with a display form and a resolved target
    Link {
        /// Display form, as written in the document
        label: String,
        /// Resolved target
        href: String,
    },
    /// An icon entry with its attributes
    Icon {
        /// URL as written in the document
        url: String,
        /// Resolved URL
        resolved_url: String,
        /// Icon MIME type
        mimetype: String,
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
        /// Color depth in bits
        depth: u32,
    },
}

impl DeviceTree {
    /// Side-effect-free structural snapshot of `id`, or `None` for an
    /// unknown node.
    pub fn snapshot(&self, id: DeviceId) -> Option<DeviceSnapshot> {
        let node = self.node(id)?;
        Some(DeviceSnapshot {
            device_type: node.device_type().to_string(),
            friendly_name: node.friendly_name().to_string(),
            udn: node.udn().to_string(),
            services: node.services().iter().map(|s| s.snapshot()).collect(),
            icons: node
                .icons()
                .iter()
                .map(|icon| IconSnapshot {
                    mimetype: icon.mimetype.clone(),
                    url: icon.resolved_url.clone(),
                    width: icon.width,
                    height: icon.height,
                    depth: icon.depth,
                })
                .collect(),
        })
    }

    /// Fixed-order display listing of `id`. Each entry is computed
    /// independently; an unset or unresolvable field is omitted, never an
    /// error.
    pub fn display_pairs(&self, id: DeviceId) -> Vec<(&'static str, DisplayValue)> {
        let mut pairs = Vec::new();
        let Some(node) = self.node(id) else {
            return pairs;
        };

        if let Some(location) = self.location(id) {
            pairs.push((
                "Location",
                DisplayValue::Link {
                    label: location.to_string(),
                    href: location.to_string(),
                },
            ));
        }
        if let Some(urlbase) = self.urlbase(id) {
            pairs.push(("URL base", DisplayValue::Text(urlbase.to_string())));
        }
        if !node.udn().as_str().is_empty() {
            pairs.push(("UDN", DisplayValue::Text(node.udn().to_string())));
        }
        if !node.device_type().is_empty() {
            pairs.push(("Type", DisplayValue::Text(node.device_type().to_string())));
        }
        if let Some(version) = self.upnp_version(id) {
            pairs.push(("UPnP Version", DisplayValue::Text(version.to_string())));
        }

        let details = node.details();
        if !details.dlna_device_classes.is_empty() {
            pairs.push((
                "DLNA Device Class",
                DisplayValue::Text(details.dlna_device_classes.join(",")),
            ));
        }
        if !details.dlna_capabilities.is_empty() {
            pairs.push((
                "DLNA Device Capability",
                DisplayValue::Text(details.dlna_capabilities.join(",")),
            ));
        }
        if !node.friendly_name().is_empty() {
            pairs.push((
                "Friendly Name",
                DisplayValue::Text(node.friendly_name().to_string()),
            ));
        }
        if let Some(value) = &details.manufacturer {
            pairs.push(("Manufacturer", DisplayValue::Text(value.clone())));
        }
        if let Some(value) = &details.manufacturer_url {
            pairs.push((
                "Manufacturer URL",
                DisplayValue::Link {
                    label: value.clone(),
                    href: value.clone(),
                },
            ));
        }
        if let Some(value) = &details.model_description {
            pairs.push(("Model Description", DisplayValue::Text(value.clone())));
        }
        if let Some(value) = &details.model_name {
            pairs.push(("Model Name", DisplayValue::Text(value.clone())));
        }
        if let Some(value) = &details.model_number {
            pairs.push(("Model Number", DisplayValue::Text(value.clone())));
        }
        if let Some(value) = &details.model_url {
            pairs.push((
                "Model URL",
                DisplayValue::Link {
                    label: value.clone(),
                    href: value.clone(),
                },
            ));
        }
        if let Some(value) = &details.serial_number {
            pairs.push(("Serial Number", DisplayValue::Text(value.clone())));
        }
        if let Some(value) = &details.upc {
            pairs.push(("UPC", DisplayValue::Text(value.clone())));
        }
        if let Some(raw) = &details.presentation_url {
            if let Ok(href) = self.resolve_url(id, raw) {
                pairs.push((
                    "Presentation URL",
                    DisplayValue::Link {
                        label: raw.clone(),
                        href,
                    },
                ));
            }
        }

        for icon in node.icons() {
            pairs.push((
                "Icon",
                DisplayValue::Icon {
                    url: icon.url.clone(),
                    resolved_url: icon.resolved_url.clone(),
                    mimetype: icon.mimetype.clone(),
                    width: icon.width,
                    height: icon.height,
                    depth: icon.depth,
                },
            ));
        }

        pairs
    }
}
