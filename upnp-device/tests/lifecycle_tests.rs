//! End-to-end lifecycle tests through the public API: fetch a description,
//! build the tree, resolve constituents, observe completion, tear down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use upnp_device::{
    build_tree, ClientHandle, DescriptionFetcher, DeviceError, DeviceId, DeviceRegistry,
    DiscoveryInfo, FetchError, FetchedDocument, Manifestation, SharedTree,
};

const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
    <friendlyName>Root</friendlyName>
    <UDN>uuid:root-1</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>
        <serviceId>root-cd</serviceId>
        <controlURL>/c</controlURL><eventSubURL>/e</eventSubURL><SCPDURL>/s</SCPDURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ConnectionManager:1</serviceType>
        <serviceId>root-cm</serviceId>
        <controlURL>/c</controlURL><eventSubURL>/e</eventSubURL><SCPDURL>/s</SCPDURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
        <friendlyName>First Renderer</friendlyName>
        <UDN>uuid:embedded-1</UDN>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
            <serviceId>embedded-1-rc</serviceId>
            <controlURL>/c</controlURL><eventSubURL>/e</eventSubURL><SCPDURL>/s</SCPDURL>
          </service>
        </serviceList>
      </device>
      <device>
        <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
        <friendlyName>Second Renderer</friendlyName>
        <UDN>uuid:embedded-2</UDN>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
            <serviceId>embedded-2-rc</serviceId>
            <controlURL>/c</controlURL><eventSubURL>/e</eventSubURL><SCPDURL>/s</SCPDURL>
          </service>
        </serviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

struct StaticFetcher;

#[async_trait]
impl DescriptionFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedDocument, FetchError> {
        Ok(FetchedDocument {
            body: DESCRIPTION.as_bytes().to_vec(),
            headers: HashMap::new(),
        })
    }
}

#[derive(Default)]
struct Recorder {
    completed: Mutex<Vec<String>>,
    removed_clients: Mutex<Vec<String>>,
}

impl DeviceRegistry for Recorder {
    fn detection_completed(&self, _device: DeviceId, udn: &str) {
        self.completed.lock().unwrap().push(udn.to_string());
    }

    fn remove_client(&self, udn: &str, _client: &ClientHandle) {
        self.removed_clients.lock().unwrap().push(udn.to_string());
    }
}

fn info() -> DiscoveryInfo {
    DiscoveryInfo {
        usn: "uuid:root-1::upnp:rootdevice".to_string(),
        server: "Linux UPnP/1.0".to_string(),
        search_target: "upnp:rootdevice".to_string(),
        location: "http://192.168.1.20:49152/desc.xml".to_string(),
        manifestation: Manifestation::Remote,
        host: "192.168.1.20".to_string(),
    }
}

async fn build(recorder: Arc<Recorder>) -> SharedTree {
    build_tree(info(), &StaticFetcher, recorder).await.unwrap()
}

/// Every (device, service) pair in the tree.
fn constituents(tree: &SharedTree) -> Vec<(DeviceId, String)> {
    let tree = tree.lock();
    let root = tree.root_id();
    let root_node = tree.node(root).unwrap();
    let mut parts: Vec<(DeviceId, String)> = root_node
        .services()
        .iter()
        .map(|s| (root, s.service_id().to_string()))
        .collect();
    for child in root_node.children() {
        for service in tree.node(*child).unwrap().services() {
            parts.push((*child, service.service_id().to_string()));
        }
    }
    parts
}

#[tokio::test]
async fn full_resolution_reports_root_exactly_once() {
    let recorder = Arc::new(Recorder::default());
    let tree = build(Arc::clone(&recorder)).await;

    for (device, service) in constituents(&tree) {
        tree.lock().service_resolved(device, &service);
    }

    let completed = recorder.completed.lock().unwrap();
    assert_eq!(completed.len(), 3);
    assert_eq!(
        completed.iter().filter(|udn| *udn == "uuid:root-1").count(),
        1
    );
    // bottom-up: the root reports last
    assert_eq!(completed.last().map(String::as_str), Some("uuid:root-1"));
}

#[tokio::test]
async fn reversed_resolution_order_still_reports_root_once() {
    let recorder = Arc::new(Recorder::default());
    let tree = build(Arc::clone(&recorder)).await;

    for (device, service) in constituents(&tree).into_iter().rev() {
        tree.lock().service_resolved(device, &service);
    }

    assert_eq!(
        recorder
            .completed
            .lock()
            .unwrap()
            .iter()
            .filter(|udn| *udn == "uuid:root-1")
            .count(),
        1
    );
}

#[tokio::test]
async fn teardown_after_completion_emits_remove_client_once() {
    let recorder = Arc::new(Recorder::default());
    let tree = build(Arc::clone(&recorder)).await;

    for (device, service) in constituents(&tree) {
        tree.lock().service_resolved(device, &service);
    }

    {
        let mut tree = tree.lock();
        let root = tree.root_id();
        tree.set_client(root, Arc::new("client".to_string()) as ClientHandle);
        tree.remove(root);
        tree.remove(root);
    }

    assert_eq!(
        *recorder.removed_clients.lock().unwrap(),
        vec!["uuid:root-1"]
    );
}

#[tokio::test]
async fn service_lookup_and_delegation_work_through_the_tree() {
    let tree = build(Arc::new(Recorder::default())).await;
    let tree = tree.lock();
    let root = tree.root_id();

    let service = tree.service_by_type(root, "ContentDirectory").unwrap();
    assert_eq!(service.service_id(), "root-cd");

    let child = tree.node(root).unwrap().children()[0];
    assert_eq!(tree.usn(child), Some("uuid:root-1::upnp:rootdevice"));
    assert_eq!(
        tree.resolve_url(child, "ctrl").unwrap(),
        "http://192.168.1.20:49152/ctrl"
    );
}

#[tokio::test]
async fn failing_fetch_is_terminal() {
    struct DownFetcher;

    #[async_trait]
    impl DescriptionFetcher for DownFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
            Err(FetchError::Network(format!("connection refused: {url}")))
        }
    }

    let result = build_tree(info(), &DownFetcher, Arc::new(Recorder::default())).await;
    assert!(matches!(result, Err(DeviceError::Fetch(_))));
}
