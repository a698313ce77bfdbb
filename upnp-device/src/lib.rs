//! UPnP device description trees
//!
//! This crate models the description tree of an announced UPnP root device:
//! fetch the description document once, parse the device/service hierarchy
//! recursively, track bottom-up completion of service and embedded-device
//! resolution, and tear the tree down again when the device disappears.
//!
//! The tree lives in an arena addressed by [`DeviceId`] behind a
//! single-writer lock ([`SharedTree`]); an external registry observes
//! completion and teardown through the [`DeviceRegistry`] trait.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use upnp_device::{build_tree, DiscoveryInfo, HttpFetcher, Manifestation, NullRegistry};
//!
//! # async fn demo() -> Result<(), upnp_device::DeviceError> {
//! let info = DiscoveryInfo {
//!     usn: "uuid:device-1::upnp:rootdevice".into(),
//!     server: "Linux UPnP/1.0".into(),
//!     search_target: "upnp:rootdevice".into(),
//!     location: "http://192.168.1.20:49152/description.xml".into(),
//!     manifestation: Manifestation::Remote,
//!     host: "192.168.1.20".into(),
//! };
//! let fetcher = HttpFetcher::new()?;
//! let tree = build_tree(info, &fetcher, Arc::new(NullRegistry)).await?;
//! let root = tree.lock().root_id();
//! println!("built tree rooted at {root}");
//! # Ok(())
//! # }
//! ```

mod completion;
mod error;
mod parse;
mod registry;
mod resolve;
mod service;
mod teardown;
mod tree;
mod view;

pub mod fetch;

pub use error::{DeviceError, FetchError, ParseError, ResolveError};
pub use fetch::{build_tree, DescriptionFetcher, FetchedDocument, HttpFetcher};
pub use parse::parse_description;
pub use registry::{ClientHandle, DeviceRegistry, NullRegistry};
pub use resolve::resolve;
pub use service::{ResolutionState, ServiceRef, ServiceSnapshot, SubscriptionHandle};
pub use tree::{
    DeviceDetails, DeviceId, DeviceNode, DeviceTree, DiscoveryInfo, IconDescriptor, Manifestation,
    RootIdentity, SharedTree, Udn,
};
pub use view::{DeviceSnapshot, DisplayValue, IconSnapshot};
