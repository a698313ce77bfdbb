//! Description document parsing into the device tree.
//!
//! Required identity fields are extracted strictly: a device entry without a
//! UDN aborts that branch only. Everything optional is extracted per field,
//! so one malformed value never takes its siblings down with it.

use tracing::{debug, warn};
use xmltree::{Element, XMLNode};

use crate::error::ParseError;
use crate::resolve;
use crate::service::ServiceRef;
use crate::tree::{DeviceId, DeviceTree, IconDescriptor, Udn};

const DEVICE_NS: &str = "urn:schemas-upnp-org:device-1-0";
const DLNA_NS: &str = "urn:schemas-dlna-org:device-1-0";

/// Parse a fetched description document into `tree`, populating the root
/// node and recursively building embedded devices and services.
///
/// # Errors
///
/// Returns `ParseError::Malformed` when the body is not XML,
/// `ParseError::MissingDevice` when no `<device>` element exists, and
/// `ParseError::MissingUdn` when the root device entry has no UDN. Embedded
/// devices with the same defect are skipped with a warning instead.
pub fn parse_description(tree: &mut DeviceTree, body: &[u8]) -> Result<(), ParseError> {
    let document = Element::parse(body).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let upnp_version = child(&document, "specVersion").and_then(|version| {
        let major = child_text(version, "major")?;
        let minor = child_text(version, "minor")?;
        Some(format!("{major}.{minor}"))
    });
    let urlbase = child_text(&document, "URLBase");

    let root_id = tree.root_id();
    if let Some(node) = tree.node_mut(root_id) {
        if let Some(identity) = node.root.as_mut() {
            if let Some(version) = upnp_version {
                identity.upnp_version = version;
            }
            identity.urlbase = urlbase;
        }
    }

    let device = child(&document, "device").ok_or(ParseError::MissingDevice)?;
    parse_device(tree, root_id, device)
}

/// Populate the existing node `id` from a `<device>` element, recursing into
/// its embedded devices. The completion check runs once the whole entry,
/// children included, has been attached.
fn parse_device(tree: &mut DeviceTree, id: DeviceId, element: &Element) -> Result<(), ParseError> {
    let udn = child_text(element, "UDN").ok_or(ParseError::MissingUdn)?;

    if let Some(node) = tree.node_mut(id) {
        node.assign_udn(Udn::new(udn));
        node.device_type = child_text(element, "deviceType").unwrap_or_default();
        node.friendly_name = child_text(element, "friendlyName").unwrap_or_default();
        debug!("parsing device {} ({})", node.friendly_name(), node.udn());
    }

    parse_details(tree, id, element);
    parse_icons(tree, id, element);
    parse_services(tree, id, element);

    if let Some(list) = child(element, "deviceList") {
        for child_element in children_in(list, "device", DEVICE_NS) {
            let child_id = tree.alloc_child(id);
            if let Err(e) = parse_device(tree, child_id, child_element) {
                warn!("skipping embedded device under {id}: {e}");
                tree.discard_child(id, child_id);
            }
        }
    }

    tree.evaluate_detection(id);
    Ok(())
}

fn parse_details(tree: &mut DeviceTree, id: DeviceId, element: &Element) {
    let dlna_device_classes: Vec<String> = children_in(element, "X_DLNADOC", DLNA_NS)
        .into_iter()
        .filter_map(text_of)
        .collect();
    let dlna_capabilities: Vec<String> = children_in(element, "X_DLNACAP", DLNA_NS)
        .into_iter()
        .filter_map(text_of)
        .flat_map(|caps| {
            caps.split(',')
                .map(|cap| cap.trim().to_string())
                .collect::<Vec<_>>()
        })
        .collect();

    let Some(node) = tree.node_mut(id) else {
        return;
    };
    let details = &mut node.details;
    details.manufacturer = optional_field(element, "manufacturer");
    details.manufacturer_url = optional_field(element, "manufacturerURL");
    details.model_name = optional_field(element, "modelName");
    details.model_description = optional_field(element, "modelDescription");
    details.model_number = optional_field(element, "modelNumber");
    details.model_url = optional_field(element, "modelURL");
    details.serial_number = optional_field(element, "serialNumber");
    details.upc = optional_field(element, "UPC");
    details.presentation_url = optional_field(element, "presentationURL");
    details.dlna_device_classes = dlna_device_classes;
    details.dlna_capabilities = dlna_capabilities;
}

/// Best-effort extraction of one optional field; absence is logged and never
/// aborts the fields around it.
fn optional_field(element: &Element, name: &str) -> Option<String> {
    let value = child_text(element, name);
    if value.is_none() {
        debug!("device description has no {name}");
    }
    value
}

fn parse_icons(tree: &mut DeviceTree, id: DeviceId, element: &Element) {
    let Some(list) = child(element, "iconList") else {
        return;
    };
    let location = tree.location(id).map(str::to_string);

    let mut icons = Vec::new();
    for icon_element in children_in(list, "icon", DEVICE_NS) {
        match parse_icon(icon_element, location.as_deref()) {
            Some(icon) => {
                debug!("adding icon {} for {id}", icon.mimetype);
                icons.push(icon);
            }
            None => warn!("device {id} has an invalid icon description, ignoring that icon"),
        }
    }

    if let Some(node) = tree.node_mut(id) {
        node.icons = icons;
    }
}

/// An icon missing any of mimetype/width/height/depth/url, or with
/// non-numeric dimensions, is rejected as a whole.
fn parse_icon(element: &Element, location: Option<&str>) -> Option<IconDescriptor> {
    let mimetype = child_text(element, "mimetype")?;
    let width = child_text(element, "width")?.parse().ok()?;
    let height = child_text(element, "height")?.parse().ok()?;
    let depth = child_text(element, "depth")?.parse().ok()?;
    let url = child_text(element, "url")?;

    let resolved_url = match location {
        Some(location) => resolve::resolve_against_origin(&url, location).ok()?,
        None => url.clone(),
    };

    Some(IconDescriptor {
        mimetype,
        width,
        height,
        depth,
        url,
        resolved_url,
    })
}

fn parse_services(tree: &mut DeviceTree, id: DeviceId, element: &Element) {
    let Some(list) = child(element, "serviceList") else {
        return;
    };

    for service_element in children_in(list, "service", DEVICE_NS) {
        let service_type = child_text(service_element, "serviceType").unwrap_or_default();
        let service_id = child_text(service_element, "serviceId").unwrap_or_default();
        let presentation_url = child_text(service_element, "presentationURL");

        let Some(scpd_url) = child_text(service_element, "SCPDURL") else {
            warn!("service {service_id} has no uri for its description, skipping");
            continue;
        };
        let Some(event_sub_url) = child_text(service_element, "eventSubURL") else {
            warn!("service {service_id} has no uri for eventing, skipping");
            continue;
        };
        let Some(control_url) = child_text(service_element, "controlURL") else {
            warn!("service {service_id} has no uri for controlling, skipping");
            continue;
        };

        tree.add_service(
            id,
            ServiceRef::new(
                service_type,
                service_id,
                control_url,
                event_sub_url,
                presentation_url,
                scpd_url,
                id,
            ),
        );
    }
}

fn elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(child) => Some(child),
        _ => None,
    })
}

fn child<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    elements(element).find(|c| c.name == name && c.namespace.as_deref() == Some(DEVICE_NS))
}

fn children_in<'a>(element: &'a Element, name: &str, namespace: &str) -> Vec<&'a Element> {
    elements(element)
        .filter(|c| c.name == name && c.namespace.as_deref() == Some(namespace))
        .collect()
}

fn child_text(element: &Element, name: &str) -> Option<String> {
    text_of(child(element, name)?)
}

fn text_of(element: &Element) -> Option<String> {
    let mut text = String::new();
    for node in &element.children {
        match node {
            XMLNode::Text(t) => text.push_str(t),
            XMLNode::CData(t) => text.push_str(t),
            _ => {}
        }
    }
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}
