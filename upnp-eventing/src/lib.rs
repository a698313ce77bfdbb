//! Event subscription maintenance for UPnP device trees
//!
//! Companion crate to `upnp-device`: keeps the event subscriptions recorded
//! on a device tree alive and tears them down in bulk.
//!
//! [`SubscriptionMaintainer::renew_subscriptions`] walks the tree depth-first
//! and renews every subscription expiring within a fixed 30 second
//! look-ahead; the caller supplies the periodic trigger.
//! [`SubscriptionMaintainer::unsubscribe_all`] drops a single node's
//! subscriptions concurrently with settle-all semantics. Both operate on the
//! shared tree lock and never hold it across a network request, so an
//! operation in flight cannot race the tree's teardown.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::SystemTime;
//! use upnp_eventing::{HttpEventingTransport, SubscriptionMaintainer};
//! # async fn demo(tree: upnp_device::SharedTree) -> Result<(), upnp_eventing::EventingError> {
//! let maintainer = SubscriptionMaintainer::new(HttpEventingTransport::new()?);
//! // call this on a timer, faster than the shortest granted lifetime minus 30s
//! let report = maintainer.renew_subscriptions(&tree, SystemTime::now()).await;
//! println!("renewed {} of {} subscriptions", report.renewed, report.checked);
//! # Ok(())
//! # }
//! ```

mod error;
mod maintainer;
mod transport;

pub use error::{EventingError, Result};
pub use maintainer::{
    RenewReport, SubscriptionMaintainer, UnsubscribeReport, RENEWAL_LOOKAHEAD,
};
pub use transport::{EventingTransport, HttpEventingTransport};
