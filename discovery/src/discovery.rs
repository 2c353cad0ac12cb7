//! Discovery worker.
//!
//! Runs on its own thread with a single-threaded tokio runtime, so multicast
//! traffic and description fetches never compete with the control loop. The
//! only way out is the event channel, which carries immutable
//! [`DiscoveryEvent`] values.

use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use soap_client::SoapClient;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::DiscoveryConfig;
use crate::device::DiscoveredDevice;
use crate::error::{DiscoveryError, Result};
use crate::socket::{bind_multicast, multicast_group};
use crate::ssdp::{build_msearch, parse_message, ROOT_DEVICE};
use crate::tracker::{DiscoveryTracker, FetchRequest, TrackerOutput};
use crate::DiscoveryEvent;

/// Commands accepted by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryCommand {
    SetOnline(bool),
    SearchNow,
    /// Drop a device from the known set so its next answer fetches it again
    Forget(String),
    Shutdown,
}

/// Cloneable sender for worker commands, for code that does not own the
/// [`Discovery`] itself.
#[derive(Debug, Clone)]
pub struct DiscoveryHandle {
    commands: mpsc::UnboundedSender<DiscoveryCommand>,
}

impl DiscoveryHandle {
    pub fn new(commands: mpsc::UnboundedSender<DiscoveryCommand>) -> Self {
        Self { commands }
    }

    /// See [`Discovery::set_online`].
    pub fn set_online(&self, online: bool) {
        let _ = self.commands.send(DiscoveryCommand::SetOnline(online));
    }

    /// Search immediately instead of waiting for the next period.
    pub fn search_now(&self) {
        let _ = self.commands.send(DiscoveryCommand::SearchNow);
    }

    /// Forget `uuid` without reporting it removed. A device dropped by its
    /// consumer (failed liveness ping) is then re-added on its next answer.
    pub fn forget(&self, uuid: &str) {
        let _ = self.commands.send(DiscoveryCommand::Forget(uuid.to_string()));
    }
}

/// Handle to a running discovery worker.
///
/// Dropping the handle asks the worker to stop without waiting for it; call
/// [`Discovery::shutdown`] to wait.
pub struct Discovery {
    handle: DiscoveryHandle,
    worker: Option<JoinHandle<()>>,
}

impl Discovery {
    /// Bind the SSDP socket and start periodic searching.
    ///
    /// Returns once the socket is bound so bind failures surface here. Events
    /// arrive on the returned receiver.
    pub fn start(
        config: DiscoveryConfig,
        client: SoapClient,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DiscoveryEvent>)> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);

        let worker = thread::Builder::new()
            .name("ssdp-discovery".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(DiscoveryError::NetworkError(format!(
                            "Failed to create tokio runtime for discovery: {}",
                            e
                        ))));
                        return;
                    }
                };

                rt.block_on(async move {
                    let socket = match bind_multicast(config.port) {
                        Ok(socket) => socket,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));
                    run_worker(config, client, socket, command_rx, event_tx).await;
                });
            })
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to spawn discovery thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok((
                Self {
                    handle: DiscoveryHandle::new(command_tx),
                    worker: Some(worker),
                },
                event_rx,
            )),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => Err(DiscoveryError::NetworkError(
                "Discovery worker exited during startup".to_string(),
            )),
        }
    }

    /// Network reachability changed. Going offline reports every known device
    /// as removed and pauses searching; coming back online restarts from scratch.
    pub fn set_online(&self, online: bool) {
        self.handle.set_online(online);
    }

    /// Search immediately instead of waiting for the next period.
    pub fn search_now(&self) {
        self.handle.search_now();
    }

    /// See [`DiscoveryHandle::forget`].
    pub fn forget(&self, uuid: &str) {
        self.handle.forget(uuid);
    }

    /// A command sender that outlives borrows of this handle.
    pub fn handle(&self) -> DiscoveryHandle {
        self.handle.clone()
    }

    /// Stop the worker and wait for its thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.handle.commands.send(DiscoveryCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Discovery worker panicked");
            }
        }
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        let _ = self.handle.commands.send(DiscoveryCommand::Shutdown);
    }
}

/// Fetch and parse one device description.
pub async fn fetch_description(
    client: &SoapClient,
    location: &str,
    timeout: Duration,
) -> Result<DiscoveredDevice> {
    let xml = client.get_text(location, timeout).await?;
    DiscoveredDevice::from_description(&xml, location)
}

async fn run_worker(
    config: DiscoveryConfig,
    client: SoapClient,
    socket: tokio::net::UdpSocket,
    mut commands: mpsc::UnboundedReceiver<DiscoveryCommand>,
    events: mpsc::UnboundedSender<DiscoveryEvent>,
) {
    let mut tracker = DiscoveryTracker::new();
    let mut fetches: JoinSet<(String, Result<DiscoveredDevice>)> = JoinSet::new();
    let mut search_timer = tokio::time::interval(config.search_interval);
    search_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let window = sleep_until(Instant::now());
    tokio::pin!(window);
    let mut window_armed = false;
    let mut online = true;
    let mut buf = vec![0u8; 8192];

    info!(interval = ?config.search_interval, "Discovery worker started");

    let publish = |event: DiscoveryEvent| -> bool {
        match &event {
            DiscoveryEvent::DeviceAdded(device) => {
                info!(uuid = %device.uuid, name = %device.name, "Device added")
            }
            DiscoveryEvent::DeviceRemoved(uuid) => info!(%uuid, "Device removed"),
        }
        events.send(event).is_ok()
    };

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(DiscoveryCommand::Shutdown) => break,
                Some(DiscoveryCommand::SetOnline(true)) => {
                    if !online {
                        info!("Network online, restarting discovery");
                        online = true;
                        search_timer.reset_immediately();
                    }
                }
                Some(DiscoveryCommand::SetOnline(false)) => {
                    if online {
                        info!("Network offline, dropping known devices");
                        online = false;
                        window_armed = false;
                        fetches.abort_all();
                        if !tracker.reset().into_iter().all(&publish) {
                            break;
                        }
                    }
                }
                Some(DiscoveryCommand::SearchNow) => {
                    if online {
                        send_search(&socket, &config, &mut tracker).await;
                        window.as_mut().reset(Instant::now() + config.listing_window);
                        window_armed = true;
                    }
                }
                Some(DiscoveryCommand::Forget(uuid)) => {
                    if tracker.forget(&uuid) {
                        debug!(%uuid, "Forgot device at consumer request");
                    }
                }
            },

            _ = search_timer.tick(), if online => {
                send_search(&socket, &config, &mut tracker).await;
                window.as_mut().reset(Instant::now() + config.listing_window);
                window_armed = true;
            }

            _ = &mut window, if window_armed => {
                window_armed = false;
                if !tracker.end_window().into_iter().all(&publish) {
                    break;
                }
            }

            received = socket.recv_from(&mut buf), if online => match received {
                Ok((len, from)) => {
                    let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                        trace!(%from, "Ignoring non-UTF-8 datagram");
                        continue;
                    };
                    let Some(message) = parse_message(text) else {
                        continue;
                    };
                    match tracker.handle_message(&message) {
                        TrackerOutput::None => {}
                        TrackerOutput::Fetch(FetchRequest { uuid, location }) => {
                            debug!(%uuid, %location, "Fetching device description");
                            let client = client.clone();
                            let timeout = config.fetch_timeout;
                            fetches.spawn(async move {
                                let result = fetch_description(&client, &location, timeout).await;
                                (uuid, result)
                            });
                        }
                        TrackerOutput::Event(event) => {
                            if !publish(event) {
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!("SSDP receive failed: {}", e),
            },

            Some(joined) = fetches.join_next(), if !fetches.is_empty() => match joined {
                Ok((uuid, result)) => {
                    if let Some(event) = tracker.fetch_completed(&uuid, result) {
                        if !publish(event) {
                            break;
                        }
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => error!("Description fetch task failed: {}", e),
            },
        }
    }

    fetches.abort_all();
    info!("Discovery worker stopped");
}

async fn send_search(
    socket: &tokio::net::UdpSocket,
    config: &DiscoveryConfig,
    tracker: &mut DiscoveryTracker,
) {
    let request = build_msearch(ROOT_DEVICE, config.mx);
    match socket.send_to(request.as_bytes(), multicast_group()).await {
        Ok(_) => debug!("M-SEARCH sent"),
        Err(e) => warn!("Failed to send M-SEARCH: {}", e),
    }
    tracker.begin_window();
}
