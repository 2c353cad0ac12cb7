//! The runtime: owns both registries, executes device effects on tokio and
//! feeds completions back.
//!
//! Everything runs on one task. Jobs and timers are spawned and report back
//! through an internal channel; a cancelled job is aborted and, should its
//! result already be queued, dropped on arrival.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use callback_server::{CallbackServer, NotificationPayload, ServerConfig};
use soap_client::SoapClient;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, info, trace, warn};
use upnp_discovery::{DiscoveryEvent, DiscoveryHandle};
use upnp_parser::parse_property_set;

use crate::command::{InsertPosition, PlayCommand, PlayKind};
use crate::config::ControlPointConfig;
use crate::content::{ModelEvent, TreeModel};
use crate::device::Device;
use crate::effect::{DeviceClass, DeviceKey, Effect, Effects, JobId, JobResult, TimerKind};
use crate::error::{ControlError, Result};
use crate::handle::{ControlCommand, ControlHandle, DeviceSummary, Row};
use crate::media_server::{LocalPlaylists, MediaServer, ServerDevice, LOCAL_PLAYLISTS_UUID};
use crate::registry::{DeviceRegistry, RegistryEvent, RegistryOutput};
use crate::renderer::{OpenHomeRenderer, RendererEvent};
use crate::status::{StatusBoard, StatusKey, StatusMessage};
use crate::store::KeyValueStore;

const SERVER_SCOPE: &str = "CallbackServer";
const PORT_KEY: &str = "port";
/// NOTIFYs whose SID is not known yet (the SUBSCRIBE reply is still on its way)
const MAX_ORPHANS: usize = 16;
const UNSUBSCRIBE_GRACE: Duration = Duration::from_secs(2);

/// What consumers observe.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    DeviceAdded {
        class: DeviceClass,
        uuid: String,
        name: String,
    },
    DeviceRemoved {
        class: DeviceClass,
        uuid: String,
    },
    ActiveDeviceChanged {
        class: DeviceClass,
        uuid: Option<String>,
    },
    /// Change in a device's content tree or queue
    Model { key: DeviceKey, event: ModelEvent },
    Renderer { uuid: String, event: RendererEvent },
    Status { key: StatusKey, text: String },
    StatusCleared { key: StatusKey },
}

#[derive(Debug)]
enum Input {
    JobDone {
        key: DeviceKey,
        job: JobId,
        result: JobResult,
    },
    TimerFired {
        key: DeviceKey,
        timer: TimerKind,
        generation: u64,
    },
    StatusExpired {
        key: StatusKey,
        generation: u64,
    },
}

/// Start the NOTIFY listener on the remembered port (or the configured one)
/// and remember the port actually bound.
pub async fn start_event_server(
    config: &ControlPointConfig,
    store: &dyn KeyValueStore,
    notifications: mpsc::UnboundedSender<NotificationPayload>,
) -> Result<CallbackServer> {
    let preferred = config.event_port.or_else(|| {
        store
            .get(SERVER_SCOPE, PORT_KEY)
            .and_then(|port| port.parse().ok())
    });
    let server = CallbackServer::start(ServerConfig::default().with_preferred_port(preferred), notifications).await?;
    if let Err(e) = store.set(SERVER_SCOPE, PORT_KEY, &server.port().to_string()) {
        warn!(error = %e, "Failed to remember event server port");
    }
    Ok(server)
}

/// Control point state machine plus the executor for its effects.
pub struct ControlPoint {
    config: ControlPointConfig,
    client: SoapClient,
    callback_base: String,
    discovery: Option<DiscoveryHandle>,
    servers: DeviceRegistry<ServerDevice>,
    renderers: DeviceRegistry<OpenHomeRenderer>,
    jobs: HashMap<(DeviceKey, JobId), AbortHandle>,
    timers: HashMap<(DeviceKey, TimerKind), (u64, AbortHandle)>,
    next_timer: u64,
    sids: HashMap<String, DeviceKey>,
    orphans: VecDeque<NotificationPayload>,
    statuses: StatusBoard,
    unsubscribes: JoinSet<()>,
    inputs_tx: mpsc::UnboundedSender<Input>,
    inputs_rx: Option<mpsc::UnboundedReceiver<Input>>,
    commands_rx: Option<mpsc::UnboundedReceiver<ControlCommand>>,
    events: mpsc::UnboundedSender<ControlEvent>,
}

impl ControlPoint {
    /// `callback_base` is the event server's base URL; each device subscribes
    /// with `<callback_base>/<uuid>`.
    pub fn new(
        config: ControlPointConfig,
        client: SoapClient,
        store: Arc<dyn KeyValueStore>,
        callback_base: impl Into<String>,
    ) -> (Self, ControlHandle, mpsc::UnboundedReceiver<ControlEvent>) {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let callback_base: String = callback_base.into();

        let mut control_point = Self {
            servers: DeviceRegistry::new(DeviceClass::MediaServer, store.clone(), config.startup_polls),
            renderers: DeviceRegistry::new(DeviceClass::Renderer, store, config.startup_polls),
            config,
            client,
            callback_base: callback_base.trim_end_matches('/').to_string(),
            discovery: None,
            jobs: HashMap::new(),
            timers: HashMap::new(),
            next_timer: 0,
            sids: HashMap::new(),
            orphans: VecDeque::new(),
            statuses: StatusBoard::new(),
            unsubscribes: JoinSet::new(),
            inputs_tx,
            inputs_rx: Some(inputs_rx),
            commands_rx: Some(commands_rx),
            events: events_tx,
        };

        let mut out = RegistryOutput::new();
        control_point
            .servers
            .insert_front(ServerDevice::Local(LocalPlaylists::new()), &mut out);
        control_point.apply_registry(DeviceClass::MediaServer, out);

        (control_point, ControlHandle::new(commands_tx), events_rx)
    }

    /// Let a device dropped after a failed ping be rediscovered while it is
    /// still answering searches.
    pub fn attach_discovery(&mut self, discovery: DiscoveryHandle) {
        self.discovery = Some(discovery);
    }

    pub fn servers(&self) -> &DeviceRegistry<ServerDevice> {
        &self.servers
    }

    pub fn renderers(&self) -> &DeviceRegistry<OpenHomeRenderer> {
        &self.renderers
    }

    pub fn statuses(&self) -> &StatusBoard {
        &self.statuses
    }

    /// Both registries finished their startup grace period.
    pub fn is_settled(&self) -> bool {
        self.servers.is_settled() && self.renderers.is_settled()
    }

    /// Drive the control point until [`ControlHandle::shutdown`] or until
    /// every input channel is closed. Deactivates all devices on the way out.
    pub async fn run(
        mut self,
        mut discovery: mpsc::UnboundedReceiver<DiscoveryEvent>,
        mut notifications: mpsc::UnboundedReceiver<NotificationPayload>,
    ) -> Result<()> {
        let (Some(mut inputs), Some(mut commands)) = (self.inputs_rx.take(), self.commands_rx.take()) else {
            return Err(ControlError::Closed);
        };
        let mut startup = tokio::time::interval(self.config.startup_poll_interval);
        startup.tick().await;
        info!(callback = %self.callback_base, "Control point running");

        loop {
            tokio::select! {
                Some(input) = inputs.recv() => self.handle_input(input),
                Some(command) = commands.recv() => {
                    if matches!(command, ControlCommand::Shutdown) {
                        break;
                    }
                    self.handle_command(command);
                }
                Some(event) = discovery.recv() => self.handle_discovery(event),
                Some(notification) = notifications.recv() => self.handle_notification(notification),
                _ = startup.tick(), if !self.is_settled() => self.poll_startup(),
                else => break,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Wait for the next job, timer or status expiry and process it.
    /// Returns `false` once the input channel is gone.
    pub async fn process_next(&mut self) -> bool {
        let Some(mut inputs) = self.inputs_rx.take() else {
            return false;
        };
        let input = inputs.recv().await;
        self.inputs_rx = Some(inputs);
        match input {
            Some(input) => {
                self.handle_input(input);
                true
            }
            None => false,
        }
    }

    /// One startup tick for both registries.
    pub fn poll_startup(&mut self) {
        let mut out = RegistryOutput::new();
        self.servers.poll(&mut out);
        self.apply_registry(DeviceClass::MediaServer, out);

        let mut out = RegistryOutput::new();
        self.renderers.poll(&mut out);
        self.apply_registry(DeviceClass::Renderer, out);
    }

    pub fn handle_discovery(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::DeviceAdded(device) => {
                if device.is_openhome_renderer() {
                    let mut out = RegistryOutput::new();
                    self.renderers
                        .add(OpenHomeRenderer::new(&device, self.config.clone()), &mut out);
                    self.apply_registry(DeviceClass::Renderer, out);
                }
                if device.is_media_server() {
                    let mut out = RegistryOutput::new();
                    self.servers.add(
                        ServerDevice::Remote(MediaServer::new(&device, self.config.clone())),
                        &mut out,
                    );
                    self.apply_registry(DeviceClass::MediaServer, out);
                }
                if !device.is_openhome_renderer() && !device.is_media_server() {
                    debug!(device = %device.uuid, device_type = %device.device_type, "Ignoring device");
                }
            }
            DiscoveryEvent::DeviceRemoved(uuid) => {
                self.remove_device(&DeviceKey::new(DeviceClass::Renderer, uuid.clone()), false);
                self.remove_device(&DeviceKey::new(DeviceClass::MediaServer, uuid), false);
            }
        }
    }

    /// Route a NOTIFY to the device owning its SID. Unknown SIDs are held
    /// back briefly since the first event may beat the SUBSCRIBE reply.
    pub fn handle_notification(&mut self, notification: NotificationPayload) {
        let Some(key) = self.sids.get(&notification.subscription_id).cloned() else {
            debug!(sid = %notification.subscription_id, "Holding event for unknown subscription");
            if self.orphans.len() == MAX_ORPHANS {
                self.orphans.pop_front();
            }
            self.orphans.push_back(notification);
            return;
        };

        let variables = match parse_property_set(&notification.event_xml) {
            Ok(variables) => variables,
            Err(e) => {
                warn!(device = %key.uuid, error = %e, "Dropping unreadable event");
                return;
            }
        };
        trace!(device = %key.uuid, seq = ?notification.seq, variables = variables.len(), "Event");
        let sid = notification.subscription_id;
        self.with_device(&key, |device, fx| device.handle_event(&sid, &variables, fx));
    }

    pub fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::SetActiveDevice { class, uuid, reply } => {
                let mut out = RegistryOutput::new();
                let result = match class {
                    DeviceClass::MediaServer => self.servers.set_active(&uuid, &mut out),
                    DeviceClass::Renderer => self.renderers.set_active(&uuid, &mut out),
                };
                self.apply_registry(class, out);
                let _ = reply.send(result);
            }
            ControlCommand::Play {
                selection,
                position,
                kind,
            } => self.with_active_server(|server, fx| server.play(selection, position, kind, fx)),
            ControlCommand::Search { text } => {
                self.with_active_server(|server, fx| server.search(&text, fx))
            }
            ControlCommand::FetchMore { node } => {
                self.with_active_server(|server, fx| server.fetch_more(node, fx))
            }
            ControlCommand::Seek { seconds } => {
                self.with_active_renderer(|renderer, fx| renderer.seek(seconds, fx))
            }
            ControlCommand::SeekRow { row } => {
                self.with_active_renderer(|renderer, fx| renderer.seek_row(row, fx))
            }
            ControlCommand::SetVolume { volume } => {
                self.with_active_renderer(|renderer, fx| renderer.set_volume(volume, fx))
            }
            ControlCommand::SetMute { muted } => {
                self.with_active_renderer(|renderer, fx| renderer.set_mute(muted, fx))
            }
            ControlCommand::SetRepeat { repeat } => {
                self.with_active_renderer(|renderer, fx| renderer.set_repeat(repeat, fx))
            }
            ControlCommand::SetShuffle { shuffle } => {
                self.with_active_renderer(|renderer, fx| renderer.set_shuffle(shuffle, fx))
            }
            ControlCommand::RemoveTracks { rows } => {
                self.with_active_renderer(|renderer, fx| renderer.remove_tracks(&rows, fx))
            }
            ControlCommand::MoveTracks { rows, to_row } => {
                self.with_active_renderer(|renderer, fx| renderer.move_tracks(&rows, to_row, fx))
            }
            ControlCommand::Transport(action) => {
                self.with_active_renderer(|renderer, fx| renderer.transport(action, fx))
            }
            ControlCommand::ClearQueue => {
                self.with_active_renderer(|renderer, fx| renderer.clear_queue(fx))
            }
            ControlCommand::SaveQueue { name } => self.save_queue(&name),
            ControlCommand::Rows { class, node, reply } => {
                let _ = reply.send(self.rows(class, node));
            }
            ControlCommand::SearchRoot { reply } => {
                let root = match self.servers.active() {
                    Some(ServerDevice::Remote(server)) => Some(server.search_root()),
                    _ => None,
                };
                let _ = reply.send(root);
            }
            ControlCommand::Devices { class, reply } => {
                let _ = reply.send(self.device_summaries(class));
            }
            ControlCommand::Shutdown => {
                debug!("Shutdown requested outside the run loop");
            }
        }
    }

    /// Deactivate every device, unsubscribing with a short grace period,
    /// and stop all jobs and timers.
    pub async fn shutdown(&mut self) {
        info!("Control point shutting down");
        let mut out = RegistryOutput::new();
        self.servers.shutdown(&mut out);
        self.apply_registry(DeviceClass::MediaServer, out);
        let mut out = RegistryOutput::new();
        self.renderers.shutdown(&mut out);
        self.apply_registry(DeviceClass::Renderer, out);

        for (_, handle) in self.jobs.drain() {
            handle.abort();
        }
        for (_, (_, handle)) in self.timers.drain() {
            handle.abort();
        }

        let pending = self.unsubscribes.len();
        let drained = tokio::time::timeout(UNSUBSCRIBE_GRACE, async {
            while self.unsubscribes.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(pending, "Unsubscribe requests still pending at shutdown");
            self.unsubscribes.abort_all();
        }
    }

    fn handle_input(&mut self, input: Input) {
        match input {
            Input::JobDone { key, job, result } => {
                if self.jobs.remove(&(key.clone(), job)).is_none() {
                    trace!(device = %key.uuid, %job, "Dropping result of cancelled job");
                    return;
                }
                let new_sid = match &result {
                    JobResult::Subscribed(Ok(response)) => Some(response.sid.clone()),
                    _ => None,
                };
                if let Some(sid) = &new_sid {
                    self.sids.insert(sid.clone(), key.clone());
                }
                self.with_device(&key, |device, fx| device.handle_job(job, result, fx));
                if let Some(sid) = new_sid {
                    self.replay_orphans(&sid);
                }
            }
            Input::TimerFired {
                key,
                timer,
                generation,
            } => {
                let current = self.timers.get(&(key.clone(), timer)).map(|(g, _)| *g);
                if current != Some(generation) {
                    return;
                }
                self.timers.remove(&(key.clone(), timer));
                self.with_device(&key, |device, fx| device.handle_timer(timer, fx));
            }
            Input::StatusExpired { key, generation } => {
                if self.statuses.expire(&key, generation) {
                    self.emit(ControlEvent::StatusCleared { key });
                }
            }
        }
    }

    fn replay_orphans(&mut self, sid: &str) {
        let (matching, rest): (VecDeque<_>, VecDeque<_>) = self
            .orphans
            .drain(..)
            .partition(|n| n.subscription_id == sid);
        self.orphans = rest;
        for notification in matching {
            self.handle_notification(notification);
        }
    }

    fn remove_device(&mut self, key: &DeviceKey, lost: bool) {
        let mut out = RegistryOutput::new();
        let removed = match key.class {
            DeviceClass::MediaServer => {
                if key.uuid == LOCAL_PLAYLISTS_UUID {
                    return;
                }
                self.servers.remove(&key.uuid, lost, &mut out).is_some()
            }
            DeviceClass::Renderer => self.renderers.remove(&key.uuid, lost, &mut out).is_some(),
        };
        self.apply_registry(key.class, out);
        if removed {
            self.forget(key);
        }
    }

    /// Drop every job, timer and SID still associated with a removed device.
    fn forget(&mut self, key: &DeviceKey) {
        self.jobs.retain(|(k, _), handle| {
            let keep = k != key;
            if !keep {
                handle.abort();
            }
            keep
        });
        self.timers.retain(|(k, _), (_, handle)| {
            let keep = k != key;
            if !keep {
                handle.abort();
            }
            keep
        });
        self.sids.retain(|_, k| k != key);
    }

    fn with_device(&mut self, key: &DeviceKey, f: impl FnOnce(&mut dyn Device, &mut Effects)) {
        let mut fx = Effects::new();
        let found = match key.class {
            DeviceClass::MediaServer => self.servers.get_mut(&key.uuid).map(|d| f(d, &mut fx)),
            DeviceClass::Renderer => self.renderers.get_mut(&key.uuid).map(|d| f(d, &mut fx)),
        };
        if found.is_none() {
            trace!(device = %key, "Message for a device that is gone");
        }
        self.apply(key.clone(), fx);
    }

    fn with_active_server(&mut self, f: impl FnOnce(&mut ServerDevice, &mut Effects)) {
        let mut fx = Effects::new();
        let Some(server) = self.servers.active_mut() else {
            self.post_status(String::new(), StatusMessage::new("server", "No media server selected"));
            return;
        };
        let key = DeviceKey::new(DeviceClass::MediaServer, server.uuid());
        f(server, &mut fx);
        self.apply(key, fx);
    }

    fn with_active_renderer(&mut self, f: impl FnOnce(&mut OpenHomeRenderer, &mut Effects)) {
        let mut fx = Effects::new();
        let Some(renderer) = self.renderers.active_mut() else {
            self.post_status(String::new(), StatusMessage::new("renderer", "No renderer selected"));
            return;
        };
        let key = DeviceKey::new(DeviceClass::Renderer, renderer.uuid());
        f(renderer, &mut fx);
        self.apply(key, fx);
    }

    fn save_queue(&mut self, name: &str) {
        let Some(tracks) = self.renderers.active().map(|r| r.queue_tracks()) else {
            self.post_status(String::new(), StatusMessage::new("renderer", "No renderer selected"));
            return;
        };
        let mut fx = Effects::new();
        if let Some(local) = self
            .servers
            .get_mut(LOCAL_PLAYLISTS_UUID)
            .and_then(ServerDevice::as_local_mut)
        {
            local.save_playlist(
                name,
                PlayCommand {
                    tracks,
                    position: InsertPosition::End,
                    kind: PlayKind::Append,
                },
                &mut fx,
            );
        }
        self.apply(DeviceKey::new(DeviceClass::MediaServer, LOCAL_PLAYLISTS_UUID), fx);
    }

    fn rows(&self, class: DeviceClass, node: Option<crate::content::NodeId>) -> Vec<Row> {
        let model: Option<&dyn TreeModel> = match class {
            DeviceClass::MediaServer => self.servers.active().map(|d| d.model()),
            DeviceClass::Renderer => self.renderers.active().map(|d| d.model()),
        };
        let Some(model) = model else {
            return Vec::new();
        };
        let parent = node.unwrap_or_else(|| model.root());
        model
            .children(parent)
            .iter()
            .filter_map(|child| {
                Some(Row {
                    node: *child,
                    data: model.row_data(*child)?,
                    has_children: !model.children(*child).is_empty() || model.can_fetch_more(*child),
                })
            })
            .collect()
    }

    fn device_summaries(&self, class: DeviceClass) -> Vec<DeviceSummary> {
        fn summarize<D: Device>(registry: &DeviceRegistry<D>) -> Vec<DeviceSummary> {
            registry
                .devices()
                .iter()
                .map(|d| DeviceSummary {
                    uuid: d.uuid().to_string(),
                    name: d.info().name.clone(),
                    active: registry.active_uuid() == Some(d.uuid()),
                })
                .collect()
        }
        match class {
            DeviceClass::MediaServer => summarize(&self.servers),
            DeviceClass::Renderer => summarize(&self.renderers),
        }
    }

    fn apply_registry(&mut self, class: DeviceClass, out: RegistryOutput) {
        for event in out.events {
            self.emit(match event {
                RegistryEvent::Added { uuid, name } => ControlEvent::DeviceAdded { class, uuid, name },
                RegistryEvent::Removed { uuid } => ControlEvent::DeviceRemoved { class, uuid },
                RegistryEvent::ActiveChanged { uuid } => ControlEvent::ActiveDeviceChanged { class, uuid },
            });
        }
        for (uuid, fx) in out.effects {
            self.apply(DeviceKey::new(class, uuid), fx);
        }
    }

    /// Execute effects in order. Effects produced while executing (a play
    /// command handed to the renderer) are appended to the same queue.
    fn apply(&mut self, key: DeviceKey, fx: Effects) {
        let mut queue: VecDeque<(DeviceKey, Effect)> = fx.into_iter().map(|e| (key.clone(), e)).collect();
        while let Some((key, effect)) = queue.pop_front() {
            self.execute(key, effect, &mut queue);
        }
    }

    fn execute(&mut self, key: DeviceKey, effect: Effect, queue: &mut VecDeque<(DeviceKey, Effect)>) {
        match effect {
            Effect::Soap { job, request } => {
                let client = self.client.clone();
                self.spawn_job(key, job, async move {
                    let args: Vec<(&str, &str)> = request
                        .args
                        .iter()
                        .map(|(name, value)| (name.as_str(), value.as_str()))
                        .collect();
                    JobResult::Soap(
                        client
                            .call(
                                &request.control_url,
                                &request.service_type,
                                &request.action,
                                &args,
                                request.timeout,
                            )
                            .await,
                    )
                });
            }
            Effect::Subscribe {
                job,
                event_url,
                lease_seconds,
                timeout,
            } => {
                let client = self.client.clone();
                let callback = format!("{}/{}", self.callback_base, key.uuid);
                self.spawn_job(key, job, async move {
                    JobResult::Subscribed(client.subscribe(&event_url, &callback, lease_seconds, timeout).await)
                });
            }
            Effect::Renew {
                job,
                event_url,
                sid,
                lease_seconds,
                timeout,
            } => {
                let client = self.client.clone();
                self.spawn_job(key, job, async move {
                    JobResult::Renewed(
                        client
                            .renew_subscription(&event_url, &sid, lease_seconds, timeout)
                            .await,
                    )
                });
            }
            Effect::Unsubscribe { event_url, sid } => {
                self.sids.remove(&sid);
                let client = self.client.clone();
                let timeout = self.config.ping_timeout.max(Duration::from_secs(1));
                self.unsubscribes.spawn(async move {
                    if let Err(e) = client.unsubscribe(&event_url, &sid, timeout).await {
                        debug!(%sid, error = %e, "Unsubscribe failed");
                    }
                });
            }
            Effect::CancelJobs(jobs) => {
                for job in jobs {
                    if let Some(handle) = self.jobs.remove(&(key.clone(), job)) {
                        handle.abort();
                    }
                }
            }
            Effect::StartTimer { timer, after } => self.start_timer(key, timer, after),
            Effect::CancelTimer(timer) => {
                if let Some((_, handle)) = self.timers.remove(&(key, timer)) {
                    handle.abort();
                }
            }
            Effect::Model(event) => self.emit(ControlEvent::Model { key, event }),
            Effect::Status(message) => self.post_status(key.uuid, message),
            Effect::Play(command) => {
                let Some(renderer) = self.renderers.active_mut() else {
                    self.post_status(key.uuid, StatusMessage::new("play", "No renderer selected"));
                    return;
                };
                let target = DeviceKey::new(DeviceClass::Renderer, renderer.uuid());
                let mut fx = Effects::new();
                renderer.execute(command, &mut fx);
                queue.extend(fx.into_iter().map(|e| (target.clone(), e)));
            }
            Effect::Renderer(event) => self.emit(ControlEvent::Renderer { uuid: key.uuid, event }),
            Effect::DeviceLost => {
                warn!(device = %key, "Device lost");
                if let Some(discovery) = &self.discovery {
                    discovery.forget(&key.uuid);
                }
                self.remove_device(&key, true);
            }
        }
    }

    fn spawn_job(&mut self, key: DeviceKey, job: JobId, work: impl Future<Output = JobResult> + Send + 'static) {
        let inputs = self.inputs_tx.clone();
        let job_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = work.await;
            let _ = inputs.send(Input::JobDone {
                key: job_key,
                job,
                result,
            });
        });
        self.jobs.insert((key, job), handle.abort_handle());
    }

    fn start_timer(&mut self, key: DeviceKey, timer: TimerKind, after: Duration) {
        if let Some((_, handle)) = self.timers.remove(&(key.clone(), timer)) {
            handle.abort();
        }
        self.next_timer += 1;
        let generation = self.next_timer;
        let inputs = self.inputs_tx.clone();
        let timer_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = inputs.send(Input::TimerFired {
                key: timer_key,
                timer,
                generation,
            });
        });
        self.timers.insert((key, timer), (generation, handle.abort_handle()));
    }

    fn post_status(&mut self, uuid: String, message: StatusMessage) {
        let key = StatusKey {
            uuid,
            id: message.id,
        };
        info!(device = %key.uuid, id = %key.id, text = %message.text, "Status");
        let generation = self.statuses.post(key.clone(), message.text.clone());
        self.emit(ControlEvent::Status {
            key: key.clone(),
            text: message.text,
        });

        let inputs = self.inputs_tx.clone();
        let expiry = self.config.status_expiry;
        tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            let _ = inputs.send(Input::StatusExpired { key, generation });
        });
    }

    fn emit(&self, event: ControlEvent) {
        let _ = self.events.send(event);
    }
}
