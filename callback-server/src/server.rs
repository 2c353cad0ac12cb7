//! TCP server for receiving UPnP event notifications.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::connection::{Limits, Progress, RequestParser};
use crate::error::{RequestError, ServerError};
use crate::NotificationPayload;

/// Fixed reply to every accepted notification.
pub const OK_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to try first, typically the one remembered from the last run.
    /// Falls back to an ephemeral port when taken.
    pub preferred_port: Option<u16>,
    /// A connection that stays silent this long is dropped
    pub inactivity_timeout: Duration,
    pub limits: Limits,
    /// Address advertised in callback URLs; detected when `None`
    pub advertised_ip: Option<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            preferred_port: None,
            inactivity_timeout: Duration::from_secs(2),
            limits: Limits::default(),
            advertised_ip: None,
        }
    }
}

impl ServerConfig {
    pub fn with_preferred_port(mut self, port: Option<u16>) -> Self {
        self.preferred_port = port;
        self
    }

    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    pub fn with_advertised_ip(mut self, ip: IpAddr) -> Self {
        self.advertised_ip = Some(ip);
        self
    }
}

/// HTTP callback server for receiving UPnP event notifications.
///
/// Every NOTIFY that passes validation is forwarded to the channel, whatever
/// its SID; mapping SIDs to subscriptions is the receiver's job since the
/// first event of a subscription can arrive before the SUBSCRIBE reply.
///
/// # Example
///
/// ```no_run
/// use tokio::sync::mpsc;
/// use callback_server::{CallbackServer, NotificationPayload, ServerConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
///
///     let server = CallbackServer::start(ServerConfig::default(), tx)
///         .await
///         .expect("Failed to create callback server");
///
///     println!("Server listening at: {}", server.base_url());
///
///     while let Some(notification) = rx.recv().await {
///         println!("Received event for subscription: {}", notification.subscription_id);
///     }
/// }
/// ```
pub struct CallbackServer {
    port: u16,
    base_url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind and start accepting connections.
    pub async fn start(
        config: ServerConfig,
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self, ServerError> {
        let listener = Self::bind(config.preferred_port).await?;
        let port = listener.local_addr().map_err(ServerError::Bind)?.port();

        let local_ip = config
            .advertised_ip
            .or_else(Self::detect_local_ip)
            .ok_or(ServerError::LocalAddress)?;
        let base_url = format!("http://{}", SocketAddr::new(local_ip, port));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let server_handle = tokio::spawn(accept_loop(listener, config, event_sender, shutdown_rx));

        info!(%base_url, "Callback server listening");

        Ok(Self {
            port,
            base_url,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// The port the server is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL, e.g. `http://192.168.1.2:41234`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Callback URL for one subscriber. The path is informational only;
    /// notifications are matched by SID.
    pub fn callback_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
    }

    async fn bind(preferred: Option<u16>) -> Result<TcpListener, ServerError> {
        let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        if let Some(port) = preferred.filter(|p| *p != 0) {
            match TcpListener::bind(SocketAddr::new(any, port)).await {
                Ok(listener) => return Ok(listener),
                Err(e) => warn!(port, "Remembered callback port unavailable: {}", e),
            }
        }
        TcpListener::bind(SocketAddr::new(any, 0))
            .await
            .map_err(ServerError::Bind)
    }

    /// Detect the local IP address for callback URLs.
    ///
    /// This uses a UDP socket connection to determine the local IP address
    /// that would be used for outbound connections. No data is actually sent.
    pub fn detect_local_ip() -> Option<IpAddr> {
        // The SSDP group routes over the LAN interface even without a default
        // gateway; the public address covers hosts without a multicast route.
        ["239.255.255.250:1900", "8.8.8.8:80"]
            .into_iter()
            .find_map(|target| {
                let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
                socket.connect(target).ok()?;
                let ip = socket.local_addr().ok()?.ip();
                (!ip.is_unspecified()).then_some(ip)
            })
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: ServerConfig,
    event_sender: mpsc::UnboundedSender<NotificationPayload>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("Callback server shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    trace!(%peer, "Accepted callback connection");
                    let sender = event_sender.clone();
                    let limits = config.limits;
                    let timeout = config.inactivity_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, limits, timeout, &sender).await {
                            debug!(%peer, "Dropped callback connection: {}", e);
                        }
                    });
                }
                Err(e) => warn!("Accept failed: {}", e),
            }
        }
    }
}

/// Serve exactly one request on `stream`.
///
/// On success the notification is forwarded, the fixed 200 reply written and
/// the stream shut down. Any protocol violation or inactivity returns early and
/// the caller drops the stream without a reply.
pub async fn handle_connection<S>(
    mut stream: S,
    limits: Limits,
    inactivity: Duration,
    sender: &mpsc::UnboundedSender<NotificationPayload>,
) -> Result<(), RequestError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut parser = RequestParser::new(limits);
    let mut buf = [0u8; 4096];

    let payload = loop {
        let read = tokio::time::timeout(inactivity, stream.read(&mut buf))
            .await
            .map_err(|_| RequestError::Inactive(inactivity.as_millis() as u64))?
            .map_err(|e| RequestError::Io(e.to_string()))?;

        if read == 0 {
            break parser.finish()?;
        }
        if let Progress::Complete(payload) = parser.feed(&buf[..read])? {
            break payload;
        }
    };

    trace!(sid = %payload.subscription_id, seq = ?payload.seq, bytes = payload.event_xml.len(), "NOTIFY received");
    let _ = sender.send(payload);

    stream
        .write_all(OK_RESPONSE)
        .await
        .map_err(|e| RequestError::Io(e.to_string()))?;
    let _ = stream.shutdown().await;
    Ok(())
}
