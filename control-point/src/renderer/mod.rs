//! OpenHome Playlist renderers.
//!
//! The queue mirrors the device's id array. Metadata is read lazily with
//! batched `ReadList` calls, and only for ids the queue has not seen yet.

mod insert;
mod state;
mod sync;

pub use insert::InsertPipeline;
pub use state::{parse_bool, PlaybackState, RendererEvent, TransportAction, TransportState, VolumeState};
pub use sync::{has_duplicates, sync_queue, SyncOutcome};

use std::collections::{HashSet, VecDeque};

use soap_client::ActionResponse;
use tracing::{debug, info, warn};
use upnp_discovery::{DiscoveredDevice, OPENHOME_PLAYLIST};
use upnp_parser::{
    decode_id_array, format_id_list, parse_last_change, parse_source_list, parse_track_list,
    playlist_source_index, Source, TrackEntry,
};

use crate::command::{InsertPosition, PlayCommand, PlayKind};
use crate::config::ControlPointConfig;
use crate::content::{ContentKind, ContentTree, MusicTrack, Node, NodeId, Population, TreeModel, TreeRole};
use crate::device::{Completion, Device, DeviceCore, DeviceInfo, DeviceState, PingAction};
use crate::effect::{Effect, Effects, JobId, JobResult, TimerKind};
use crate::status::StatusMessage;

pub const OPENHOME_PRODUCT: &str = "urn:av-openhome-org:service:Product:";
pub const OPENHOME_VOLUME: &str = "urn:av-openhome-org:service:Volume:";
pub const OPENHOME_TIME: &str = "urn:av-openhome-org:service:Time:";
pub const RENDERING_CONTROL: &str = "urn:schemas-upnp-org:service:RenderingControl:";

/// Title of a queue row whose metadata could not be read
pub const UNAVAILABLE_TITLE: &str = "Track unavailable";

const STATUS_INSERT: &str = "insert";

/// Services a renderer binds; everything else is dropped on construction.
fn is_renderer_service(service_type: &str) -> bool {
    [
        OPENHOME_PLAYLIST,
        OPENHOME_PRODUCT,
        OPENHOME_VOLUME,
        OPENHOME_TIME,
        RENDERING_CONTROL,
    ]
    .iter()
    .any(|prefix| service_type.starts_with(prefix))
}

/// State read on activation, answered through the same path as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Query {
    IdArray,
    CurrentId,
    Repeat,
    Shuffle,
    TransportState,
    SourceXml,
    SourceIndex,
    VolumeLimits,
    Volume,
    Mute,
    Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RendererJob {
    Query(Query),
    /// Metadata for a batch of ids; `retry` marks the second attempt
    ReadList { ids: Vec<u32>, retry: bool },
    /// `DeleteAll` ahead of a replace-and-play
    ClearForReplace,
    Insert,
    /// `SeekId` on the first track of a replace-and-play
    StartReplaced,
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VolumeService {
    OpenHome,
    RenderingControl,
}

/// A renderer with an OpenHome Playlist service.
#[derive(Debug)]
pub struct OpenHomeRenderer {
    core: DeviceCore<RendererJob>,
    queue: ContentTree,
    /// Ids of the queue rows, in row order
    ids: Vec<u32>,
    unread: VecDeque<u32>,
    current_id: Option<u32>,
    playback: PlaybackState,
    volume: VolumeState,
    sources: Vec<Source>,
    source_index: Option<usize>,
    /// The source list changed and the selected source was not checked yet
    source_check: bool,
    inserts: InsertPipeline,
}

impl OpenHomeRenderer {
    pub fn new(device: &DiscoveredDevice, config: ControlPointConfig) -> Self {
        Self::from_info(
            DeviceInfo::from_discovered(device, |s| is_renderer_service(&s.service_type)),
            config,
        )
    }

    pub fn from_info(mut info: DeviceInfo, config: ControlPointConfig) -> Self {
        info.services.retain(|s| is_renderer_service(&s.service_type));
        let mut root = Node::collection(ContentKind::Playlist, info.name.clone(), "");
        root.population = Population::Populated;
        Self {
            core: DeviceCore::new(
                info,
                config,
                Some(PingAction {
                    service: OPENHOME_PRODUCT,
                    action: "SourceIndex",
                }),
            ),
            queue: ContentTree::new(TreeRole::Queue, root),
            ids: Vec::new(),
            unread: VecDeque::new(),
            current_id: None,
            playback: PlaybackState::default(),
            volume: VolumeState::default(),
            sources: Vec::new(),
            source_index: None,
            source_check: false,
            inserts: InsertPipeline::new(),
        }
    }

    pub fn queue(&self) -> &ContentTree {
        &self.queue
    }

    /// OpenHome ids of the queue rows.
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn current_id(&self) -> Option<u32> {
        self.current_id
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn volume(&self) -> &VolumeState {
        &self.volume
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn source_index(&self) -> Option<usize> {
        self.source_index
    }

    /// Tracks of the queue whose metadata is known, in row order.
    pub fn queue_tracks(&self) -> Vec<MusicTrack> {
        self.queue
            .children(self.queue.root())
            .iter()
            .filter_map(|id| self.queue.get(*id)?.kind.track())
            .filter(|track| !track.url.is_empty())
            .cloned()
            .collect()
    }

    /// Insert the tracks of `command`, after any command still running.
    pub fn execute(&mut self, command: PlayCommand, fx: &mut Effects) {
        if command.tracks.is_empty() {
            return;
        }
        if self.inserts.is_busy() {
            debug!(device = %self.core.uuid(), kind = ?command.kind, "Queueing play command");
            self.inserts.enqueue(command);
            return;
        }
        self.start_command(command, fx);
    }

    pub fn transport(&mut self, action: TransportAction, fx: &mut Effects) {
        self.control(fx, OPENHOME_PLAYLIST, action.action(), &[], false);
    }

    pub fn seek(&mut self, seconds: u32, fx: &mut Effects) {
        self.control(
            fx,
            OPENHOME_PLAYLIST,
            "SeekSecondAbsolute",
            &[("Value", seconds.to_string())],
            true,
        );
    }

    pub fn seek_id(&mut self, id: u32, fx: &mut Effects) {
        self.control(fx, OPENHOME_PLAYLIST, "SeekId", &[("Value", id.to_string())], true);
    }

    /// Start the queue row `row`.
    pub fn seek_row(&mut self, row: usize, fx: &mut Effects) {
        if let Some(id) = self.ids.get(row).copied() {
            self.seek_id(id, fx);
        }
    }

    pub fn set_volume(&mut self, volume: u32, fx: &mut Effects) {
        let volume = volume.min(self.volume.max);
        match self.volume_service() {
            Some(VolumeService::OpenHome) => self.control(
                fx,
                OPENHOME_VOLUME,
                "SetVolume",
                &[("Value", volume.to_string())],
                true,
            ),
            Some(VolumeService::RenderingControl) => self.control(
                fx,
                RENDERING_CONTROL,
                "SetVolume",
                &[
                    ("InstanceID", "0".to_string()),
                    ("Channel", "Master".to_string()),
                    ("DesiredVolume", volume.to_string()),
                ],
                true,
            ),
            None => warn!(device = %self.core.uuid(), "Renderer has no volume control"),
        }
    }

    pub fn set_mute(&mut self, muted: bool, fx: &mut Effects) {
        match self.volume_service() {
            Some(VolumeService::OpenHome) => self.control(
                fx,
                OPENHOME_VOLUME,
                "SetMute",
                &[("Value", muted.to_string())],
                true,
            ),
            Some(VolumeService::RenderingControl) => self.control(
                fx,
                RENDERING_CONTROL,
                "SetMute",
                &[
                    ("InstanceID", "0".to_string()),
                    ("Channel", "Master".to_string()),
                    ("DesiredMute", if muted { "1" } else { "0" }.to_string()),
                ],
                true,
            ),
            None => warn!(device = %self.core.uuid(), "Renderer has no volume control"),
        }
    }

    pub fn set_repeat(&mut self, repeat: bool, fx: &mut Effects) {
        self.control(fx, OPENHOME_PLAYLIST, "SetRepeat", &[("Value", repeat.to_string())], true);
    }

    pub fn set_shuffle(&mut self, shuffle: bool, fx: &mut Effects) {
        self.control(fx, OPENHOME_PLAYLIST, "SetShuffle", &[("Value", shuffle.to_string())], true);
    }

    /// `DeleteId` for each queue row in `rows`. The queue itself changes
    /// when the device reports its new id array.
    pub fn remove_tracks(&mut self, rows: &[usize], fx: &mut Effects) {
        let ids: Vec<u32> = rows.iter().filter_map(|row| self.ids.get(*row).copied()).collect();
        for id in ids {
            self.control(fx, OPENHOME_PLAYLIST, "DeleteId", &[("Value", id.to_string())], false);
        }
    }

    pub fn clear_queue(&mut self, fx: &mut Effects) {
        self.control(fx, OPENHOME_PLAYLIST, "DeleteAll", &[], false);
    }

    /// Move `rows` so they land before row `to_row`: the moved entries are
    /// deleted and reinserted after the nearest preceding row that stays.
    /// Rows whose metadata is still unknown are left in place.
    pub fn move_tracks(&mut self, rows: &[usize], to_row: usize, fx: &mut Effects) {
        let mut rows: Vec<usize> = rows.iter().copied().filter(|r| *r < self.ids.len()).collect();
        rows.sort_unstable();
        rows.dedup();

        let children = self.queue.children(self.queue.root()).to_vec();
        let mut moved = Vec::new();
        let mut tracks = Vec::new();
        for row in rows {
            let Some(track) = children
                .get(row)
                .and_then(|id| self.queue.get(*id))
                .and_then(|n| n.kind.track())
                .filter(|t| !t.url.is_empty())
            else {
                continue;
            };
            moved.push(self.ids[row]);
            tracks.push(track.clone());
        }
        if moved.is_empty() {
            return;
        }

        let after_id = self.ids[..to_row.min(self.ids.len())]
            .iter()
            .rev()
            .find(|id| !moved.contains(id))
            .copied()
            .unwrap_or(0);
        info!(device = %self.core.uuid(), tracks = moved.len(), after_id, "Moving queue entries");

        for id in &moved {
            self.control(fx, OPENHOME_PLAYLIST, "DeleteId", &[("Value", id.to_string())], false);
        }
        self.execute(
            PlayCommand {
                tracks,
                position: InsertPosition::AfterId(after_id),
                kind: PlayKind::Move,
            },
            fx,
        );
    }

    fn control(
        &mut self,
        fx: &mut Effects,
        service: &str,
        action: &str,
        args: &[(&str, String)],
        cancel_others: bool,
    ) {
        self.core
            .send_command(fx, service, action, args, cancel_others, RendererJob::Control);
    }

    fn volume_service(&self) -> Option<VolumeService> {
        if self.core.info().service(OPENHOME_VOLUME).is_some() {
            Some(VolumeService::OpenHome)
        } else if self.core.info().service(RENDERING_CONTROL).is_some() {
            Some(VolumeService::RenderingControl)
        } else {
            None
        }
    }

    fn populate(&mut self, fx: &mut Effects) {
        self.core.set_state(DeviceState::Populating);

        let mut queries: Vec<(&str, &str, Vec<(&str, String)>, Query)> = vec![
            (OPENHOME_PLAYLIST, "IdArray", vec![], Query::IdArray),
            (OPENHOME_PLAYLIST, "Id", vec![], Query::CurrentId),
            (OPENHOME_PLAYLIST, "Repeat", vec![], Query::Repeat),
            (OPENHOME_PLAYLIST, "Shuffle", vec![], Query::Shuffle),
            (OPENHOME_PLAYLIST, "TransportState", vec![], Query::TransportState),
            (OPENHOME_PRODUCT, "SourceXml", vec![], Query::SourceXml),
            (OPENHOME_PRODUCT, "SourceIndex", vec![], Query::SourceIndex),
        ];
        let master = || vec![("InstanceID", "0".to_string()), ("Channel", "Master".to_string())];
        match self.volume_service() {
            Some(VolumeService::OpenHome) => {
                queries.push((OPENHOME_VOLUME, "Characteristics", vec![], Query::VolumeLimits));
                queries.push((OPENHOME_VOLUME, "Volume", vec![], Query::Volume));
                queries.push((OPENHOME_VOLUME, "Mute", vec![], Query::Mute));
            }
            Some(VolumeService::RenderingControl) => {
                queries.push((RENDERING_CONTROL, "GetVolume", master(), Query::Volume));
                queries.push((RENDERING_CONTROL, "GetMute", master(), Query::Mute));
            }
            None => {}
        }
        if self.core.info().service(OPENHOME_TIME).is_some() {
            queries.push((OPENHOME_TIME, "Time", vec![], Query::Position));
        }

        for (service, action, args, query) in queries {
            self.core
                .send_command(fx, service, action, &args, false, RendererJob::Query(query));
        }
    }

    fn clear(&mut self, fx: &mut Effects) {
        self.inserts.clear();
        self.unread.clear();
        self.ids.clear();
        self.queue.reset();
        if let Some(root) = self.queue.get_mut(self.queue.root()) {
            root.population = Population::Populated;
        }
        self.current_id = None;
        self.playback = PlaybackState::default();
        self.volume = VolumeState::default();
        self.sources.clear();
        self.source_index = None;
        self.source_check = false;
        self.core.set_state(DeviceState::Initial);
        self.flush(fx);
    }

    fn query_done(&mut self, query: Query, response: &ActionResponse, fx: &mut Effects) {
        let value = |names: &[&str]| names.iter().find_map(|n| response.get(n)).map(str::to_string);
        let variables: Vec<(&str, Option<String>)> = match query {
            Query::IdArray => vec![("IdArray", value(&["Array"]))],
            Query::CurrentId => vec![("Id", value(&["Value"]))],
            Query::Repeat => vec![("Repeat", value(&["Value"]))],
            Query::Shuffle => vec![("Shuffle", value(&["Value"]))],
            Query::TransportState => vec![("TransportState", value(&["Value"]))],
            Query::SourceXml => vec![("SourceXml", value(&["Value"]))],
            Query::SourceIndex => vec![("SourceIndex", value(&["Value"]))],
            Query::VolumeLimits => vec![
                ("VolumeMax", value(&["VolumeMax"])),
                ("VolumeSteps", value(&["VolumeSteps"])),
            ],
            Query::Volume => vec![("Volume", value(&["Value", "CurrentVolume"]))],
            Query::Mute => vec![("Mute", value(&["Value", "CurrentMute"]))],
            Query::Position => vec![
                ("Seconds", value(&["Seconds"])),
                ("Duration", value(&["Duration"])),
            ],
        };
        for (name, value) in variables {
            match value {
                Some(value) => self.apply_variable(name, &value, fx),
                None => debug!(device = %self.core.uuid(), variable = name, "Response without value"),
            }
        }
    }

    fn apply_variable(&mut self, name: &str, value: &str, fx: &mut Effects) {
        match name {
            "IdArray" => self.on_id_array(value, fx),
            "Id" => {
                let id = value.trim().parse::<u32>().ok().filter(|id| *id != 0);
                if id != self.current_id {
                    self.current_id = id;
                    fx.push(Effect::Renderer(RendererEvent::CurrentTrack(id)));
                }
            }
            "TransportState" => {
                let state = TransportState::from_openhome(value);
                self.update_playback(fx, |p| p.state = state);
            }
            "Repeat" => {
                if let Some(repeat) = parse_bool(value) {
                    self.update_playback(fx, |p| p.repeat = repeat);
                }
            }
            "Shuffle" => {
                if let Some(shuffle) = parse_bool(value) {
                    self.update_playback(fx, |p| p.shuffle = shuffle);
                }
            }
            "Seconds" => {
                if let Ok(seconds) = value.trim().parse::<u32>() {
                    self.update_playback(fx, |p| p.position_seconds = seconds);
                }
            }
            "Duration" => {
                if let Ok(seconds) = value.trim().parse::<u32>() {
                    self.update_playback(fx, |p| p.duration_seconds = seconds);
                }
            }
            "Volume" => {
                if let Ok(volume) = value.trim().parse::<u32>() {
                    self.update_volume(fx, |v| v.current = volume);
                }
            }
            "Mute" => {
                if let Some(muted) = parse_bool(value) {
                    self.update_volume(fx, |v| v.muted = muted);
                }
            }
            "VolumeMax" => {
                if let Ok(max) = value.trim().parse::<u32>() {
                    self.update_volume(fx, |v| v.max = max);
                }
            }
            "VolumeSteps" => {
                if let Ok(steps) = value.trim().parse::<u32>() {
                    self.update_volume(fx, |v| v.steps = steps);
                }
            }
            "SourceXml" => self.on_source_xml(value, fx),
            "SourceIndex" => self.on_source_index(value, fx),
            "LastChange" => match parse_last_change(value) {
                Ok(changes) => {
                    for (name, value) in changes {
                        if matches!(name.as_str(), "Volume" | "Mute") {
                            self.apply_variable(&name, &value, fx);
                        }
                    }
                }
                Err(e) => warn!(device = %self.core.uuid(), error = %e, "Unreadable LastChange"),
            },
            _ => {}
        }
    }

    fn update_playback(&mut self, fx: &mut Effects, change: impl FnOnce(&mut PlaybackState)) {
        let before = self.playback.clone();
        change(&mut self.playback);
        if self.playback != before {
            fx.push(Effect::Renderer(RendererEvent::Playback(self.playback.clone())));
        }
    }

    fn update_volume(&mut self, fx: &mut Effects, change: impl FnOnce(&mut VolumeState)) {
        let before = self.volume.clone();
        change(&mut self.volume);
        if self.volume != before {
            fx.push(Effect::Renderer(RendererEvent::Volume(self.volume.clone())));
        }
    }

    fn on_id_array(&mut self, value: &str, fx: &mut Effects) {
        let ids = match decode_id_array(value) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(device = %self.core.uuid(), error = %e, "Dropping malformed id array");
                return;
            }
        };
        if has_duplicates(&ids) {
            warn!(device = %self.core.uuid(), "Dropping id array with duplicate ids");
            return;
        }

        let outcome = sync_queue(&mut self.queue, &mut self.ids, &ids);
        if outcome.reset {
            self.unread.clear();
            self.core
                .cancel_where(fx, |job| matches!(job, RendererJob::ReadList { .. }));
        } else {
            let present: HashSet<u32> = ids.iter().copied().collect();
            self.unread.retain(|id| present.contains(id));
        }
        debug!(
            device = %self.core.uuid(),
            tracks = ids.len(),
            unknown = outcome.unknown.len(),
            reset = outcome.reset,
            "Queue synchronized"
        );
        self.unread.extend(outcome.unknown);
        self.core.set_state(DeviceState::Populated);
        self.read_next(fx);
    }

    /// Request metadata for the next batch of unknown ids, one batch at a time.
    fn read_next(&mut self, fx: &mut Effects) {
        if self.unread.is_empty()
            || self
                .core
                .has_job_where(|job| matches!(job, RendererJob::ReadList { .. }))
        {
            return;
        }
        let count = self.core.config().read_list_batch.max(1).min(self.unread.len());
        let batch: Vec<u32> = self.unread.drain(..count).collect();
        self.send_read_list(batch, false, fx);
    }

    fn send_read_list(&mut self, ids: Vec<u32>, retry: bool, fx: &mut Effects) -> bool {
        let args = [("IdList", format_id_list(&ids))];
        let sent = self
            .core
            .send_command(fx, OPENHOME_PLAYLIST, "ReadList", &args, false, RendererJob::ReadList { ids, retry })
            .is_some();
        if !sent {
            self.unread.clear();
        }
        sent
    }

    /// A failed batch is sent once more; after a second failure its rows are
    /// labelled unavailable instead of staying blank.
    fn read_list_failed(&mut self, ids: Vec<u32>, retry: bool, fx: &mut Effects) {
        let ids: Vec<u32> = ids.into_iter().filter(|id| self.ids.contains(id)).collect();
        if !ids.is_empty() {
            if !retry {
                debug!(device = %self.core.uuid(), ids = ids.len(), "Reading track metadata again");
                if self.send_read_list(ids, true, fx) {
                    return;
                }
            } else {
                warn!(device = %self.core.uuid(), ids = ids.len(), "Track metadata unavailable");
                for id in ids {
                    self.mark_unavailable(id);
                }
            }
        }
        self.read_next(fx);
    }

    fn mark_unavailable(&mut self, id: u32) {
        let Some(node) = self.row_node(id) else {
            return;
        };
        if let Some(ContentKind::Track(track)) = self.queue.get_mut(node).map(|n| &mut n.kind) {
            if track.url.is_empty() && track.title.is_empty() {
                track.title = UNAVAILABLE_TITLE.to_string();
            }
        }
        self.queue.touch(node);
    }

    fn row_node(&self, id: u32) -> Option<NodeId> {
        let row = self.ids.iter().position(|i| *i == id)?;
        self.queue.children(self.queue.root()).get(row).copied()
    }

    fn read_list_done(&mut self, response: &ActionResponse, fx: &mut Effects) {
        match parse_track_list(response.get("TrackList").unwrap_or_default()) {
            Ok(entries) => {
                for entry in entries {
                    self.apply_entry(entry);
                }
            }
            Err(e) => warn!(device = %self.core.uuid(), error = %e, "Unreadable track list"),
        }
        self.read_next(fx);
    }

    fn apply_entry(&mut self, entry: TrackEntry) {
        let Some(node) = self.row_node(entry.id) else {
            return;
        };
        if let Some(n) = self.queue.get_mut(node) {
            n.kind = ContentKind::Track(track_from_entry(entry));
        }
        self.queue.touch(node);
    }

    fn on_source_xml(&mut self, value: &str, fx: &mut Effects) {
        let sources = match parse_source_list(value) {
            Ok(sources) => sources,
            Err(e) => {
                warn!(device = %self.core.uuid(), error = %e, "Dropping malformed source list");
                return;
            }
        };
        if sources == self.sources {
            return;
        }
        self.sources = sources;
        self.source_check = true;
        self.emit_sources(fx);
        self.check_source(fx);
    }

    fn on_source_index(&mut self, value: &str, fx: &mut Effects) {
        let Ok(index) = value.trim().parse::<usize>() else {
            warn!(device = %self.core.uuid(), value, "Ignoring malformed SourceIndex");
            return;
        };
        if self.source_index == Some(index) {
            return;
        }
        self.source_index = Some(index);
        self.emit_sources(fx);
        self.check_source(fx);
    }

    fn emit_sources(&self, fx: &mut Effects) {
        fx.push(Effect::Renderer(RendererEvent::Sources {
            names: self.sources.iter().map(|s| s.name.clone()).collect(),
            active: self.source_index,
        }));
    }

    /// After a source list change, switch to the Playlist source once the
    /// selected index is known.
    fn check_source(&mut self, fx: &mut Effects) {
        if !self.source_check {
            return;
        }
        let Some(current) = self.source_index else {
            return;
        };
        self.source_check = false;
        let Some(playlist) = playlist_source_index(&self.sources) else {
            return;
        };
        if current != playlist {
            info!(device = %self.core.uuid(), from = current, to = playlist, "Selecting Playlist source");
            self.control(
                fx,
                OPENHOME_PRODUCT,
                "SetSourceIndex",
                &[("Value", playlist.to_string())],
                true,
            );
        }
    }

    fn resolve_position(&self, position: InsertPosition) -> u32 {
        match position {
            InsertPosition::End => self.ids.last().copied().unwrap_or(0),
            InsertPosition::Row(0) => 0,
            InsertPosition::Row(row) => self
                .ids
                .get(row - 1)
                .or(self.ids.last())
                .copied()
                .unwrap_or(0),
            InsertPosition::AfterId(id) => id,
        }
    }

    fn start_command(&mut self, command: PlayCommand, fx: &mut Effects) {
        let replace = command.kind == PlayKind::ReplaceAndPlay;
        let after_id = if replace {
            0
        } else {
            self.resolve_position(command.position)
        };
        info!(
            device = %self.core.uuid(),
            tracks = command.tracks.len(),
            kind = ?command.kind,
            after_id,
            "Executing play command"
        );
        self.inserts.begin(command, after_id);

        if replace {
            let sent = self.core.send_command(
                fx,
                OPENHOME_PLAYLIST,
                "DeleteAll",
                &[],
                false,
                RendererJob::ClearForReplace,
            );
            if sent.is_none() {
                self.insert_failed(fx);
            }
        } else {
            self.insert_next(fx);
        }
    }

    fn insert_next(&mut self, fx: &mut Effects) {
        let next = self
            .inserts
            .next_track()
            .map(|(after_id, track)| (after_id, track.url.clone(), track.metadata_xml()));
        let Some((after_id, uri, metadata)) = next else {
            if let Some(count) = self.inserts.finish() {
                debug!(device = %self.core.uuid(), count, "Play command done");
            }
            if let Some(command) = self.inserts.next_command() {
                self.start_command(command, fx);
            }
            return;
        };

        let args = [
            ("AfterId", after_id.to_string()),
            ("Uri", uri),
            ("Metadata", metadata),
        ];
        if self
            .core
            .send_command(fx, OPENHOME_PLAYLIST, "Insert", &args, false, RendererJob::Insert)
            .is_none()
        {
            self.insert_failed(fx);
        }
    }

    fn insert_done(&mut self, response: &ActionResponse, fx: &mut Effects) {
        let Some(new_id) = response.get_u32("NewId") else {
            warn!(device = %self.core.uuid(), "Insert response without NewId");
            self.insert_failed(fx);
            return;
        };
        if self.inserts.inserted(new_id) {
            self.core.send_command(
                fx,
                OPENHOME_PLAYLIST,
                "SeekId",
                &[("Value", new_id.to_string())],
                false,
                RendererJob::StartReplaced,
            );
        }
        self.insert_next(fx);
    }

    fn insert_failed(&mut self, fx: &mut Effects) {
        if let Some((inserted, total)) = self.inserts.abort() {
            warn!(device = %self.core.uuid(), inserted, total, "Play command aborted");
            fx.push(Effect::Status(StatusMessage::new(
                STATUS_INSERT,
                format!("Inserted {inserted} of {total} tracks"),
            )));
        }
        if let Some(command) = self.inserts.next_command() {
            self.start_command(command, fx);
        }
    }

    fn flush(&mut self, fx: &mut Effects) {
        fx.extend(self.queue.take_events().into_iter().map(Effect::Model));
    }
}

/// Queue row content for a `ReadList` entry. The entry URI wins over the
/// metadata's resource.
fn track_from_entry(entry: TrackEntry) -> MusicTrack {
    let mut track = entry
        .metadata
        .as_ref()
        .and_then(MusicTrack::from_didl)
        .unwrap_or_else(|| {
            let mut track = MusicTrack::from_url(entry.uri.clone());
            if let Some(object) = &entry.metadata {
                track.title = object.title.clone();
                track.artist = object.artist.clone();
                track.album = object.album.clone();
                track.art_url = object.album_art_uri.clone();
            }
            track
        });
    if !entry.uri.is_empty() {
        track.url = entry.uri;
    }
    track
}

impl Device for OpenHomeRenderer {
    fn info(&self) -> &DeviceInfo {
        self.core.info()
    }

    fn state(&self) -> DeviceState {
        self.core.state()
    }

    fn is_active(&self) -> bool {
        self.core.is_active()
    }

    fn set_active(&mut self, active: bool, fx: &mut Effects) {
        if active {
            if self.core.activate(fx) {
                self.populate(fx);
            }
        } else if self.core.deactivate(fx) {
            self.clear(fx);
        }
    }

    fn mark_lost(&mut self) {
        self.core.mark_lost();
    }

    fn handle_job(&mut self, job: JobId, result: JobResult, fx: &mut Effects) {
        match self.core.complete(fx, job, result) {
            Completion::Succeeded { tag, response } => match tag {
                RendererJob::Query(query) => self.query_done(query, &response, fx),
                RendererJob::ReadList { .. } => self.read_list_done(&response, fx),
                RendererJob::ClearForReplace => self.insert_next(fx),
                RendererJob::Insert => self.insert_done(&response, fx),
                RendererJob::StartReplaced => {
                    self.control(fx, OPENHOME_PLAYLIST, "Play", &[], false);
                }
                RendererJob::Control => {}
            },
            Completion::Failed { tag, .. } => match tag {
                RendererJob::ReadList { ids, retry } => self.read_list_failed(ids, retry, fx),
                RendererJob::ClearForReplace | RendererJob::Insert => self.insert_failed(fx),
                RendererJob::Query(_) | RendererJob::StartReplaced | RendererJob::Control => {}
            },
            Completion::Handled => {}
        }
        self.flush(fx);
    }

    fn handle_timer(&mut self, timer: TimerKind, fx: &mut Effects) {
        match timer {
            TimerKind::Renewal => self.core.renew_all(fx),
            TimerKind::PlayTimeout => {}
        }
    }

    fn handle_event(&mut self, sid: &str, variables: &[(String, String)], fx: &mut Effects) {
        if self.core.service_for_sid(sid).is_none() {
            debug!(device = %self.core.uuid(), sid, "Event for unknown subscription");
        }
        for (name, value) in variables {
            self.apply_variable(name, value, fx);
        }
        self.flush(fx);
    }

    fn model(&self) -> &dyn TreeModel {
        &self.queue
    }
}
