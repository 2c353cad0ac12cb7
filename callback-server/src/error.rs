//! Error types for the callback server

use thiserror::Error;

/// Errors starting or running the server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listening socket
    #[error("Failed to bind callback server: {0}")]
    Bind(#[source] std::io::Error),

    /// No routable local address to advertise in CALLBACK headers
    #[error("Failed to detect local IP address")]
    LocalAddress,
}

/// Protocol violations that abort one connection
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Malformed request line: {0}")]
    BadRequestLine(String),

    #[error("Unsupported method {0}")]
    UnsupportedMethod(String),

    #[error("Malformed header line")]
    BadHeader,

    #[error("Header block exceeds {0} bytes")]
    HeadersTooLarge(usize),

    #[error("Content-Type must be text/xml, got {0:?}")]
    UnsupportedContentType(Option<String>),

    #[error("Missing SID header")]
    MissingSid,

    #[error("Invalid Content-Length {0:?}")]
    InvalidContentLength(String),

    #[error("Invalid chunk size {0:?}")]
    InvalidChunkSize(String),

    #[error("Chunk-size line exceeds {0} bytes")]
    ChunkLineTooLong(usize),

    #[error("Missing CRLF after chunk data")]
    MissingChunkTerminator,

    #[error("Body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("Connection closed before the request was complete")]
    Truncated,

    #[error("No data for {0} ms")]
    Inactive(u64),

    #[error("I/O error: {0}")]
    Io(String),
}
