//! Error types for the upnp-device crate.

use thiserror::Error;

/// Errors raised while parsing a description document.
///
/// Only document-level problems and a missing UDN are fatal; skipped optional
/// fields, icons, and services are recovered inside the parser and logged.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document body is not well-formed XML
    #[error("Malformed description document: {0}")]
    Malformed(String),

    /// The document has no `<device>` element under its root
    #[error("Description document has no device element")]
    MissingDevice,

    /// A device entry carries no UDN, so its branch cannot be built
    #[error("Device entry has no UDN")]
    MissingUdn,
}

/// Errors raised while fetching a description document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A network error occurred
    #[error("Network error: {0}")]
    Network(String),

    /// The device answered with a non-success status
    #[error("Description fetch returned HTTP {0}")]
    HttpStatus(u16),
}

/// Terminal outcome of a device tree build.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The description fetch failed; no tree is built and no retry is made
    #[error("Description fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The description document could not be parsed into a tree
    #[error("Description parse failed: {0}")]
    Parse(#[from] ParseError),
}

/// Errors raised while resolving a reference against the tree.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The base the reference should join against is not a valid URL
    #[error("Invalid base URL {0:?}")]
    InvalidBase(String),

    /// The reference cannot be joined against the chosen base
    #[error("Cannot join {reference:?} against {base:?}")]
    Join {
        /// The reference being resolved
        reference: String,
        /// The base it was joined against
        base: String,
    },

    /// No root identity is reachable from the node's parent chain
    #[error("No root identity above node")]
    NoRootIdentity,
}
