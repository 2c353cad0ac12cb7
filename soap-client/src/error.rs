//! Error types for the SOAP client

use thiserror::Error;

/// Errors that can occur during HTTP, SOAP or GENA communication
#[derive(Debug, Error)]
pub enum SoapError {
    /// Network or HTTP transport error (refused, reset, TLS, ...)
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The request did not complete before its deadline
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// The peer answered with a non-success status and no SOAP fault
    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// XML parsing error
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// SOAP fault returned by the device
    #[error("SOAP fault {code}: {description}")]
    Fault {
        /// UPnP error code (500 when the fault carries none)
        code: u16,
        /// UPnP error description, possibly empty
        description: String,
    },

    /// The SOAP body did not contain the `<Action>Response` element
    #[error("Missing {0} element")]
    MissingResponse(String),
}

impl SoapError {
    /// Transport-level failures are the ones worth a liveness ping.
    pub fn is_transport(&self) -> bool {
        matches!(self, SoapError::Network(_) | SoapError::Timeout(_))
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            SoapError::Timeout(timeout_ms)
        } else {
            SoapError::Network(err.to_string())
        }
    }
}
