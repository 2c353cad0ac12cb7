//! Private HTTP/SOAP/GENA client for UPnP device communication
//!
//! Every call is asynchronous and carries its own deadline, so the caller can
//! run many commands concurrently on one event loop and drop (abort) any of
//! them. The client covers the three verbs a control point needs:
//!
//! - plain `GET` for device descriptions,
//! - SOAP `POST` with a `SOAPACTION` header for control actions,
//! - GENA `SUBSCRIBE`/`UNSUBSCRIBE` for eventing.

mod envelope;
mod error;

pub use envelope::{
    build_envelope, extract_response, soap_action_header, ActionResponse, ENCODING_STYLE,
    ENVELOPE_NS,
};
pub use error::SoapError;

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use tracing::{debug, trace};
use xmltree::Element;

/// Maximum number of redirects followed for GET and POST requests.
const MAX_REDIRECTS: usize = 5;

/// Response from a UPnP subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResponse {
    /// Subscription ID returned by the device
    pub sid: String,
    /// Actual timeout granted by the device (in seconds)
    pub timeout_seconds: u32,
}

/// Raw reply to a request sent with [`SoapClient::request`].
#[derive(Debug, Clone)]
pub struct HttpReply {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Body decoded as UTF-8 (lossy)
    pub body: String,
}

impl HttpReply {
    /// Header value as a string, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Async client for UPnP device communication.
///
/// Cloning is cheap; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct SoapClient {
    http: reqwest::Client,
    user_agent: String,
}

impl SoapClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self, SoapError> {
        Self::with_user_agent("avcp/0.1 UPnP/1.1")
    }

    /// Create a client announcing `user_agent` on every request
    pub fn with_user_agent(user_agent: &str) -> Result<Self, SoapError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| SoapError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            user_agent: user_agent.to_string(),
        })
    }

    /// Send an arbitrary request with a custom verb and extra headers.
    ///
    /// Redirects are followed for standard methods; the deadline covers the
    /// whole exchange including reading the body.
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<String>,
        timeout: Duration,
    ) -> Result<HttpReply, SoapError> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| SoapError::Network(format!("Invalid HTTP method {method}: {e}")))?;

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SoapError::Network(format!("Invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SoapError::Network(format!("Invalid header value: {e}")))?;
            header_map.insert(name, value);
        }

        let timeout_ms = timeout.as_millis() as u64;
        let mut builder = self
            .http
            .request(method.clone(), url)
            .header(reqwest::header::USER_AGENT, self.user_agent.as_str())
            .headers(header_map)
            .timeout(timeout);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        trace!(%method, url, "Sending HTTP request");
        let response = builder
            .send()
            .await
            .map_err(|e| SoapError::from_reqwest(e, timeout_ms))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SoapError::from_reqwest(e, timeout_ms))?;

        Ok(HttpReply {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    /// Fetch a document (device description, icon index, ...) as text.
    pub async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, SoapError> {
        let reply = self.request("GET", url, &[], None, timeout).await?;
        if !StatusCode::from_u16(reply.status).is_ok_and(|s| s.is_success()) {
            return Err(SoapError::HttpStatus(reply.status));
        }
        Ok(reply.body)
    }

    /// Invoke a control action and return its output arguments.
    ///
    /// `args` are written in order into the action element. A SOAP fault is
    /// surfaced as [`SoapError::Fault`] even when it arrives with HTTP 500.
    pub async fn call(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<ActionResponse, SoapError> {
        let body = build_envelope(service_type, action, args);
        let soap_action = soap_action_header(service_type, action);

        let reply = self
            .request(
                "POST",
                control_url,
                &[
                    ("Content-Type", "text/xml; charset=\"utf-8\""),
                    ("SOAPACTION", soap_action.as_str()),
                ],
                Some(body),
                timeout,
            )
            .await?;

        debug!(action, status = reply.status, "SOAP response received");

        match Element::parse(reply.body.as_bytes()) {
            Ok(xml) => {
                let response = extract_response(&xml, action)?;
                Ok(ActionResponse::from_element(action, &response))
            }
            Err(_) if reply.status >= 400 => Err(SoapError::HttpStatus(reply.status)),
            Err(e) => Err(SoapError::Parse(e.to_string())),
        }
    }

    /// Subscribe to UPnP events on `event_url`
    ///
    /// # Arguments
    /// * `event_url` - Absolute event subscription URL of the service
    /// * `callback_url` - URL where NOTIFY requests should be sent
    /// * `timeout_seconds` - Requested lease in seconds
    /// * `request_timeout` - Deadline for the HTTP exchange itself
    pub async fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        timeout_seconds: u32,
        request_timeout: Duration,
    ) -> Result<SubscriptionResponse, SoapError> {
        let callback = format!("<{callback_url}>");
        let lease = format!("Second-{timeout_seconds}");
        let reply = self
            .request(
                "SUBSCRIBE",
                event_url,
                &[
                    ("CALLBACK", callback.as_str()),
                    ("NT", "upnp:event"),
                    ("TIMEOUT", lease.as_str()),
                ],
                None,
                request_timeout,
            )
            .await?;

        if reply.status != 200 {
            return Err(SoapError::HttpStatus(reply.status));
        }

        let sid = reply
            .header("SID")
            .ok_or_else(|| SoapError::Parse("Missing SID header in SUBSCRIBE response".to_string()))?
            .trim()
            .to_string();

        Ok(SubscriptionResponse {
            sid,
            timeout_seconds: reply
                .header("TIMEOUT")
                .and_then(parse_timeout_header)
                .unwrap_or(timeout_seconds),
        })
    }

    /// Renew an existing subscription, returning the granted lease
    pub async fn renew_subscription(
        &self,
        event_url: &str,
        sid: &str,
        timeout_seconds: u32,
        request_timeout: Duration,
    ) -> Result<u32, SoapError> {
        let lease = format!("Second-{timeout_seconds}");
        let reply = self
            .request(
                "SUBSCRIBE",
                event_url,
                &[("SID", sid), ("TIMEOUT", lease.as_str())],
                None,
                request_timeout,
            )
            .await?;

        if reply.status != 200 {
            return Err(SoapError::HttpStatus(reply.status));
        }

        Ok(reply
            .header("TIMEOUT")
            .and_then(parse_timeout_header)
            .unwrap_or(timeout_seconds))
    }

    /// Cancel a subscription
    pub async fn unsubscribe(
        &self,
        event_url: &str,
        sid: &str,
        request_timeout: Duration,
    ) -> Result<(), SoapError> {
        let reply = self
            .request("UNSUBSCRIBE", event_url, &[("SID", sid)], None, request_timeout)
            .await?;

        if reply.status != 200 {
            return Err(SoapError::HttpStatus(reply.status));
        }
        Ok(())
    }
}

/// Parse a GENA `TIMEOUT` header (`Second-1800`, `Second-infinite`).
///
/// `infinite` maps to `u32::MAX`.
pub fn parse_timeout_header(value: &str) -> Option<u32> {
    let seconds = value.trim().strip_prefix("Second-")?;
    if seconds.eq_ignore_ascii_case("infinite") {
        Some(u32::MAX)
    } else {
        seconds.parse().ok()
    }
}
