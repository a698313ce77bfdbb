//! UPnP eventing transport: the SUBSCRIBE renewal and UNSUBSCRIBE verbs.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::EventingError;

/// Transport carrying subscription maintenance requests to a device.
///
/// Implementations must be `Send + Sync`; the maintainer fans requests out
/// concurrently.
#[async_trait]
pub trait EventingTransport: Send + Sync {
    /// Renew the subscription `sid` at `endpoint`, asking for `timeout` of
    /// lifetime. Returns the lifetime the device actually granted.
    async fn renew(
        &self,
        endpoint: &str,
        sid: &str,
        timeout: Duration,
    ) -> Result<Duration, EventingError>;

    /// Drop the subscription `sid` at `endpoint`.
    async fn unsubscribe(&self, endpoint: &str, sid: &str) -> Result<(), EventingError>;
}

/// reqwest-backed transport speaking the UPnP eventing verbs.
pub struct HttpEventingTransport {
    client: reqwest::Client,
}

impl HttpEventingTransport {
    /// Create the transport and its HTTP client with a 10 second request
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns `EventingError::Network` if the client cannot be constructed.
    pub fn new() -> Result<Self, EventingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EventingError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// HOST header value for `endpoint`.
    fn host_header(endpoint: &str) -> String {
        if let Ok(url) = url::Url::parse(endpoint) {
            if let Some(host) = url.host_str() {
                if let Some(port) = url.port() {
                    return format!("{host}:{port}");
                }
                return host.to_string();
            }
        }
        "localhost".to_string()
    }
}

#[async_trait]
impl EventingTransport for HttpEventingTransport {
    async fn renew(
        &self,
        endpoint: &str,
        sid: &str,
        timeout: Duration,
    ) -> Result<Duration, EventingError> {
        let response = self
            .client
            .request(reqwest::Method::from_bytes(b"SUBSCRIBE").unwrap(), endpoint)
            .header("HOST", Self::host_header(endpoint))
            .header("SID", sid)
            .header("TIMEOUT", format!("Second-{}", timeout.as_secs()))
            .send()
            .await
            .map_err(|e| EventingError::Network(format!("SUBSCRIBE request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EventingError::RenewalFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let granted = response
            .headers()
            .get("TIMEOUT")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_second_timeout)
            .unwrap_or(timeout);

        Ok(granted)
    }

    async fn unsubscribe(&self, endpoint: &str, sid: &str) -> Result<(), EventingError> {
        let response = self
            .client
            .request(
                reqwest::Method::from_bytes(b"UNSUBSCRIBE").unwrap(),
                endpoint,
            )
            .header("HOST", Self::host_header(endpoint))
            .header("SID", sid)
            .send()
            .await
            .map_err(|e| EventingError::Network(format!("UNSUBSCRIBE request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EventingError::UnsubscribeFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Parse the `Second-1800` form of a TIMEOUT header.
fn parse_second_timeout(value: &str) -> Option<Duration> {
    value
        .strip_prefix("Second-")?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
