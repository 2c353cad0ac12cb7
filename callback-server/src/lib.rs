//! Embedded HTTP server for UPnP event notifications.
//!
//! Devices deliver GENA events by opening a TCP connection to the CALLBACK
//! URL given at subscription time and sending one `NOTIFY` request. This crate
//! accepts those connections, parses each request with a small state machine
//! (plain `Content-Length` or chunked bodies, bounded in size and time) and
//! forwards the result as a [`NotificationPayload`].
//!
//! - [`CallbackServer`]: the listener and accept loop
//! - [`RequestParser`]: the per-connection parser, independent of sockets
//!
//! This crate has no knowledge of device protocols; the consumer maps SIDs to
//! its own subscriptions and parses the XML.

mod connection;
mod error;
mod server;

pub use connection::{Limits, Progress, RequestParser};
pub use error::{RequestError, ServerError};
pub use server::{handle_connection, CallbackServer, ServerConfig, OK_RESPONSE};

/// One received event notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    /// The subscription ID from the SID header
    pub subscription_id: String,
    /// The raw XML event body
    pub event_xml: String,
    /// The SEQ header; passed through, never used for reordering
    pub seq: Option<u32>,
}
