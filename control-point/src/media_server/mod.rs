//! ContentDirectory media servers.
//!
//! The content tree is populated lazily: the root on activation, every
//! other collection when a consumer expands it or a play request needs its
//! tracks. Pages are requested strictly one after another per collection.

mod local;
mod search;
mod vendor;

pub use local::{LocalPlaylists, LOCAL_PLAYLISTS_UUID};
pub use search::{search_criteria, SearchSession};

use soap_client::ActionResponse;
use tracing::{debug, info, warn};
use upnp_discovery::{DiscoveredDevice, CONTENT_DIRECTORY};
use upnp_parser::{parse_container_update_ids, DidlLite};

use crate::command::{BuildStep, CommandBuilder, InsertPosition, PlayKind};
use crate::config::ControlPointConfig;
use crate::content::{
    ContentKind, ContentTree, Icon, Node, NodeId, Population, TreeModel, TreeRole,
};
use crate::device::{Completion, Device, DeviceCore, DeviceInfo, DeviceState, PingAction};
use crate::effect::{Effect, Effects, JobId, JobResult, TimerKind};
use crate::status::StatusMessage;

const STATUS_PLAY: &str = "play";
const STATUS_SEARCH: &str = "search";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerJob {
    Browse { node: NodeId },
    Search { session: u64 },
}

/// One page of a Browse or Search answer.
struct Page {
    didl: DidlLite,
    returned: u32,
    total: Option<u32>,
}

impl Page {
    fn parse(response: &ActionResponse) -> Option<Self> {
        let didl = match DidlLite::from_xml(response.get("Result").unwrap_or_default()) {
            Ok(didl) => didl,
            Err(e) => {
                warn!(error = %e, "Unreadable DIDL-Lite result");
                return None;
            }
        };
        Some(Self {
            returned: response
                .get_u32("NumberReturned")
                .unwrap_or(didl.objects.len() as u32),
            total: response.get_u32("TotalMatches"),
            didl,
        })
    }

    /// Whether another page should follow once `fetched` results are known.
    /// Servers that cannot count report `TotalMatches` 0; keep going while
    /// they fill whole pages.
    fn has_more(&self, fetched: u32, page_size: u32, cap: u32) -> bool {
        if self.returned == 0 || fetched >= cap {
            return false;
        }
        match self.total {
            Some(0) => self.returned >= page_size,
            Some(total) => fetched < total,
            None => false,
        }
    }
}

/// A UPnP AV media server.
#[derive(Debug)]
pub struct MediaServer {
    core: DeviceCore<ServerJob>,
    tree: ContentTree,
    search_root: NodeId,
    system_update_id: Option<u32>,
    search: Option<SearchSession>,
    next_search: u64,
    builder: CommandBuilder,
}

impl MediaServer {
    pub fn new(device: &DiscoveredDevice, config: ControlPointConfig) -> Self {
        Self::from_info(
            DeviceInfo::from_discovered(device, |s| s.service_type.starts_with(CONTENT_DIRECTORY)),
            config,
        )
    }

    pub fn from_info(info: DeviceInfo, config: ControlPointConfig) -> Self {
        let mut tree = ContentTree::new(
            TreeRole::Library,
            Node::collection(ContentKind::Folder { icon: Icon::Folder }, info.name.clone(), "0"),
        );
        let search_root = tree.add_detached(Node::collection(ContentKind::SearchContainer, "Search", ""));
        Self {
            core: DeviceCore::new(
                info,
                config,
                Some(PingAction {
                    service: CONTENT_DIRECTORY,
                    action: "GetSystemUpdateID",
                }),
            ),
            tree,
            search_root,
            system_update_id: None,
            search: None,
            next_search: 0,
            builder: CommandBuilder::new(),
        }
    }

    pub fn tree(&self) -> &ContentTree {
        &self.tree
    }

    /// Hidden root holding the (album, artist) groups of the last search.
    pub fn search_root(&self) -> NodeId {
        self.search_root
    }

    pub fn system_update_id(&self) -> Option<u32> {
        self.system_update_id
    }

    /// Start populating `node` if nobody asked for its children yet.
    pub fn fetch_more(&mut self, node: NodeId, fx: &mut Effects) {
        if self.tree.can_fetch_more(node) {
            self.browse(node, fx);
        }
        self.flush(fx);
    }

    /// Replace the search results with the answer to `text`.
    pub fn search(&mut self, text: &str, fx: &mut Effects) {
        self.core
            .cancel_where(fx, |job| matches!(job, ServerJob::Search { .. }));
        self.tree.remove_children(self.search_root);

        let text = text.trim();
        if text.is_empty() {
            self.search = None;
            self.set_population(self.search_root, Population::Unpopulated);
        } else {
            self.next_search += 1;
            self.search = Some(SearchSession::new(self.next_search, text));
            self.set_population(self.search_root, Population::Populating);
            self.search_page(fx);
        }
        self.flush(fx);
    }

    /// Flatten `selection` into a [`PlayCommand`](crate::command::PlayCommand),
    /// populating collections on the way.
    pub fn play(
        &mut self,
        selection: Vec<NodeId>,
        position: InsertPosition,
        kind: PlayKind,
        fx: &mut Effects,
    ) {
        let step = self.builder.start(&self.tree, selection, position, kind);
        self.drive_play(step, true, fx);
        self.flush(fx);
    }

    fn populate(&mut self, fx: &mut Effects) {
        self.core.set_state(DeviceState::Populating);
        let root = self.tree.root();
        self.browse(root, fx);
        self.flush(fx);
    }

    fn clear(&mut self, fx: &mut Effects) {
        if self.builder.cancel() {
            fx.push(Effect::CancelTimer(TimerKind::PlayTimeout));
        }
        self.search = None;
        self.system_update_id = None;
        self.tree.reset();
        self.core.set_state(DeviceState::Initial);
        self.flush(fx);
    }

    fn set_population(&mut self, node: NodeId, population: Population) {
        if let Some(n) = self.tree.get_mut(node) {
            n.population = population;
        }
    }

    fn browse(&mut self, node: NodeId, fx: &mut Effects) {
        let Some((object_id, start)) = self.tree.get(node).map(|n| (n.object_id.clone(), n.fetched())) else {
            return;
        };
        let args = [
            ("ObjectID", object_id),
            ("BrowseFlag", "BrowseDirectChildren".to_string()),
            ("Filter", "*".to_string()),
            ("StartingIndex", start.to_string()),
            ("RequestedCount", self.core.config().browse_page_size.to_string()),
            ("SortCriteria", String::new()),
        ];
        let sent = self
            .core
            .send_command(fx, CONTENT_DIRECTORY, "Browse", &args, false, ServerJob::Browse { node });
        self.set_population(
            node,
            if sent.is_some() {
                Population::Populating
            } else {
                Population::Unpopulated
            },
        );
    }

    fn browse_done(&mut self, node: NodeId, response: &ActionResponse, fx: &mut Effects) {
        if !self.tree.contains(node) {
            return;
        }
        let Some(page) = Page::parse(response) else {
            self.finish_population(node, fx);
            return;
        };

        let mut children = Vec::with_capacity(page.didl.objects.len());
        let mut skipped = 0;
        for object in &page.didl.objects {
            match ContentKind::classify(object) {
                Some(ContentKind::Track(track)) => children.push(Node::track(track, object.id.clone())),
                Some(kind) => {
                    let mut child = Node::collection(kind, object.title.clone(), object.id.clone());
                    vendor::relabel(&mut child);
                    children.push(child);
                }
                None => skipped += 1,
            }
        }
        self.tree.append(node, children);

        let Some(n) = self.tree.get_mut(node) else {
            return;
        };
        n.skipped += skipped;
        let fetched = n.fetched();
        debug!(
            device = %self.core.uuid(),
            object = %n.object_id,
            fetched,
            total = ?page.total,
            skipped,
            "Browse page"
        );

        let page_size = self.core.config().browse_page_size;
        if page.has_more(fetched, page_size, u32::MAX) {
            self.browse(node, fx);
        } else {
            self.finish_population(node, fx);
        }
    }

    fn browse_failed(&mut self, node: NodeId) {
        // Keep what arrived; the next expand resumes after it.
        self.set_population(node, Population::Unpopulated);
        if node == self.tree.root() && self.tree.is_empty() {
            self.core.set_state(DeviceState::Initial);
        }
    }

    fn finish_population(&mut self, node: NodeId, fx: &mut Effects) {
        self.set_population(node, Population::Populated);
        if node == self.tree.root() {
            self.core.set_state(DeviceState::Populated);
        }
        if let Some(step) = self.builder.resume(&self.tree) {
            self.drive_play(step, false, fx);
        }
    }

    fn drive_play(&mut self, step: BuildStep, started: bool, fx: &mut Effects) {
        match step {
            BuildStep::Ready(command) => {
                fx.push(Effect::CancelTimer(TimerKind::PlayTimeout));
                info!(
                    device = %self.core.uuid(),
                    tracks = command.tracks.len(),
                    kind = ?command.kind,
                    "Play request ready"
                );
                fx.push(Effect::Play(command));
            }
            BuildStep::Empty => {
                fx.push(Effect::CancelTimer(TimerKind::PlayTimeout));
                fx.push(Effect::Status(StatusMessage::new(STATUS_PLAY, "No tracks found")));
            }
            BuildStep::Waiting(nodes) => {
                for node in nodes {
                    if self.tree.can_fetch_more(node) {
                        self.browse(node, fx);
                    }
                }
                if started {
                    fx.push(Effect::StartTimer {
                        timer: TimerKind::PlayTimeout,
                        after: self.core.config().play_timeout,
                    });
                }
            }
        }
    }

    fn search_page(&mut self, fx: &mut Effects) {
        let Some(session) = &self.search else {
            return;
        };
        let config = self.core.config();
        let count = config
            .search_page_size
            .min(config.search_result_cap.saturating_sub(session.fetched));
        let args = [
            ("ContainerID", "0".to_string()),
            ("SearchCriteria", search_criteria(&session.text)),
            ("Filter", "*".to_string()),
            ("StartingIndex", session.fetched.to_string()),
            ("RequestedCount", count.to_string()),
            ("SortCriteria", String::new()),
        ];
        let tag = ServerJob::Search {
            session: session.id,
        };
        if self
            .core
            .send_command(fx, CONTENT_DIRECTORY, "Search", &args, true, tag)
            .is_none()
        {
            self.search = None;
            self.set_population(self.search_root, Population::Unpopulated);
        }
    }

    fn search_done(&mut self, session_id: u64, response: &ActionResponse, fx: &mut Effects) {
        let Some(mut session) = self.search.take() else {
            return;
        };
        if session.id != session_id {
            self.search = Some(session);
            return;
        }

        let page = Page::parse(response);
        let mut skipped = 0;
        if let Some(page) = &page {
            for object in &page.didl.objects {
                match ContentKind::classify(object) {
                    Some(ContentKind::Track(track)) => {
                        session.add_track(&mut self.tree, self.search_root, track, object.id.clone())
                    }
                    _ => skipped += 1,
                }
            }
            session.fetched += page.returned.max(page.didl.objects.len() as u32);
        }
        if let Some(root) = self.tree.get_mut(self.search_root) {
            root.skipped += skipped;
        }

        let config = self.core.config();
        let more = page
            .as_ref()
            .map(|p| p.has_more(session.fetched, config.search_page_size, config.search_result_cap))
            .unwrap_or(false);
        debug!(
            device = %self.core.uuid(),
            fetched = session.fetched,
            tracks = session.tracks,
            more,
            "Search page"
        );

        let found = session.tracks;
        self.search = Some(session);
        if more {
            self.search_page(fx);
        } else {
            self.set_population(self.search_root, Population::Populated);
            if found == 0 {
                fx.push(Effect::Status(StatusMessage::new(STATUS_SEARCH, "No tracks found")));
            }
        }
    }

    fn on_system_update_id(&mut self, value: &str, fx: &mut Effects) {
        let Ok(id) = value.trim().parse::<u32>() else {
            warn!(device = %self.core.uuid(), value, "Ignoring malformed SystemUpdateID");
            return;
        };
        let previous = self.system_update_id.replace(id);
        if previous.is_some_and(|p| p != id) && self.core.state() != DeviceState::Initial {
            info!(device = %self.core.uuid(), id, "SystemUpdateID changed, repopulating");
            self.core.cancel_where(fx, |_| true);
            self.cancel_play(fx);
            self.search = None;
            self.tree.reset();
            self.populate(fx);
        }
    }

    fn on_container_update_ids(&mut self, value: &str, fx: &mut Effects) {
        let Some(updates) = parse_container_update_ids(value) else {
            warn!(device = %self.core.uuid(), value, "Dropping malformed ContainerUpdateIDs");
            return;
        };
        let root = self.tree.root();
        let mut targets: Vec<NodeId> = updates
            .iter()
            .filter_map(|u| self.tree.find_object(root, &u.container_id))
            .filter(|node| {
                self.tree
                    .get(*node)
                    .is_some_and(|n| n.population != Population::Unpopulated)
            })
            .collect();
        if targets.is_empty() {
            return;
        }

        let mut rerun_search = false;
        for job in self.core.cancel_where(fx, |_| true) {
            match job {
                ServerJob::Browse { node } if !targets.contains(&node) => targets.push(node),
                ServerJob::Browse { .. } => {}
                ServerJob::Search { .. } => rerun_search = true,
            }
        }
        self.cancel_play(fx);

        let all = targets.clone();
        targets.retain(|t| !self.tree.ancestors(*t).any(|a| all.contains(&a)));
        info!(device = %self.core.uuid(), containers = targets.len(), "Containers changed, repopulating");

        for node in targets {
            self.tree.remove_children(node);
            self.set_population(node, Population::Unpopulated);
            if node == root {
                self.core.set_state(DeviceState::Populating);
            }
            self.browse(node, fx);
        }

        if rerun_search {
            if let Some(text) = self.search.as_ref().map(|s| s.text.clone()) {
                self.search(&text, fx);
            }
        }
        self.flush(fx);
    }

    fn cancel_play(&mut self, fx: &mut Effects) {
        if self.builder.cancel() {
            fx.push(Effect::CancelTimer(TimerKind::PlayTimeout));
            fx.push(Effect::Status(StatusMessage::new(
                STATUS_PLAY,
                "Content changed, play request cancelled",
            )));
        }
    }

    fn flush(&mut self, fx: &mut Effects) {
        fx.extend(self.tree.take_events().into_iter().map(Effect::Model));
    }
}

impl Device for MediaServer {
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
            Completion::Succeeded {
                tag: ServerJob::Browse { node },
                response,
            } => self.browse_done(node, &response, fx),
            Completion::Succeeded {
                tag: ServerJob::Search { session },
                response,
            } => self.search_done(session, &response, fx),
            Completion::Failed {
                tag: ServerJob::Browse { node },
                ..
            } => self.browse_failed(node),
            Completion::Failed {
                tag: ServerJob::Search { session },
                error,
            } => {
                if self.search.as_ref().is_some_and(|s| s.id == session) {
                    self.set_population(self.search_root, Population::Populated);
                    fx.push(Effect::Status(StatusMessage::new(
                        STATUS_SEARCH,
                        format!("Search failed: {error}"),
                    )));
                }
            }
            Completion::Handled => {}
        }
        self.flush(fx);
    }

    fn handle_timer(&mut self, timer: TimerKind, fx: &mut Effects) {
        match timer {
            TimerKind::Renewal => self.core.renew_all(fx),
            TimerKind::PlayTimeout => {
                if self.builder.cancel() {
                    warn!(device = %self.core.uuid(), "Play request timed out");
                    fx.push(Effect::Status(StatusMessage::new(STATUS_PLAY, "Timeout!")));
                }
            }
        }
    }

    fn handle_event(&mut self, sid: &str, variables: &[(String, String)], fx: &mut Effects) {
        if self.core.service_for_sid(sid).is_none() {
            debug!(device = %self.core.uuid(), sid, "Event for unknown subscription");
        }
        for (name, value) in variables {
            match name.as_str() {
                "SystemUpdateID" => self.on_system_update_id(value, fx),
                "ContainerUpdateIDs" => self.on_container_update_ids(value, fx),
                _ => {}
            }
        }
        self.flush(fx);
    }

    fn model(&self) -> &dyn TreeModel {
        &self.tree
    }
}

/// Entry of the media server registry: the built-in local playlists or a
/// network server.
#[derive(Debug)]
pub enum ServerDevice {
    Local(LocalPlaylists),
    Remote(MediaServer),
}

impl ServerDevice {
    pub fn tree(&self) -> &ContentTree {
        match self {
            ServerDevice::Local(local) => local.tree(),
            ServerDevice::Remote(server) => server.tree(),
        }
    }

    pub fn play(
        &mut self,
        selection: Vec<NodeId>,
        position: InsertPosition,
        kind: PlayKind,
        fx: &mut Effects,
    ) {
        match self {
            ServerDevice::Local(local) => local.play(selection, position, kind, fx),
            ServerDevice::Remote(server) => server.play(selection, position, kind, fx),
        }
    }

    pub fn fetch_more(&mut self, node: NodeId, fx: &mut Effects) {
        if let ServerDevice::Remote(server) = self {
            server.fetch_more(node, fx);
        }
    }

    pub fn search(&mut self, text: &str, fx: &mut Effects) {
        match self {
            ServerDevice::Remote(server) => server.search(text, fx),
            ServerDevice::Local(_) => fx.push(Effect::Status(StatusMessage::new(
                STATUS_SEARCH,
                "Search is not available for local playlists",
            ))),
        }
    }

    pub fn as_local_mut(&mut self) -> Option<&mut LocalPlaylists> {
        match self {
            ServerDevice::Local(local) => Some(local),
            ServerDevice::Remote(_) => None,
        }
    }

    fn device(&self) -> &dyn Device {
        match self {
            ServerDevice::Local(local) => local,
            ServerDevice::Remote(server) => server,
        }
    }

    fn device_mut(&mut self) -> &mut dyn Device {
        match self {
            ServerDevice::Local(local) => local,
            ServerDevice::Remote(server) => server,
        }
    }
}

impl Device for ServerDevice {
    fn info(&self) -> &DeviceInfo {
        self.device().info()
    }

    fn state(&self) -> DeviceState {
        self.device().state()
    }

    fn is_active(&self) -> bool {
        self.device().is_active()
    }

    fn set_active(&mut self, active: bool, fx: &mut Effects) {
        self.device_mut().set_active(active, fx)
    }

    fn mark_lost(&mut self) {
        self.device_mut().mark_lost()
    }

    fn handle_job(&mut self, job: JobId, result: JobResult, fx: &mut Effects) {
        self.device_mut().handle_job(job, result, fx)
    }

    fn handle_timer(&mut self, timer: TimerKind, fx: &mut Effects) {
        self.device_mut().handle_timer(timer, fx)
    }

    fn handle_event(&mut self, sid: &str, variables: &[(String, String)], fx: &mut Effects) {
        self.device_mut().handle_event(sid, variables, fx)
    }

    fn model(&self) -> &dyn TreeModel {
        self.device().model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ModelEvent;
    use upnp_discovery::ServiceInfo;

    fn info() -> DeviceInfo {
        DeviceInfo {
            uuid: "server-1".to_string(),
            name: "NAS".to_string(),
            host: "192.168.1.20".to_string(),
            base_url: "http://192.168.1.20:9000/".to_string(),
            manufacturer: "Minim".to_string(),
            model_name: "MinimServer".to_string(),
            icon_url: None,
            services: vec![ServiceInfo {
                service_type: format!("{CONTENT_DIRECTORY}1"),
                service_id: "urn:upnp-org:serviceId:ContentDirectory".to_string(),
                control_url: "http://192.168.1.20:9000/cd/control".to_string(),
                event_url: Some("http://192.168.1.20:9000/cd/event".to_string()),
            }],
        }
    }

    fn server() -> MediaServer {
        let mut server = MediaServer::from_info(info(), ControlPointConfig::default());
        let mut fx = Effects::new();
        server.set_active(true, &mut fx);
        server
    }

    fn soap(fx: &Effects) -> Vec<(JobId, String, Vec<(String, String)>)> {
        fx.iter()
            .filter_map(|e| match e {
                Effect::Soap { job, request } => {
                    Some((*job, request.action.clone(), request.args.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn arg(args: &[(String, String)], name: &str) -> String {
        args.iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .unwrap()
    }

    fn statuses(fx: &Effects) -> Vec<String> {
        fx.iter()
            .filter_map(|e| match e {
                Effect::Status(status) => Some(status.text.clone()),
                _ => None,
            })
            .collect()
    }

    fn track(id: &str) -> String {
        format!(
            r#"<item id="{id}" parentID="p" restricted="1"><dc:title>Track {id}</dc:title><upnp:class>object.item.audioItem.musicTrack</upnp:class><res protocolInfo="http-get:*:audio/flac:*">http://nas/{id}.flac</res></item>"#
        )
    }

    fn picture(id: &str) -> String {
        format!(
            r#"<item id="{id}" parentID="p" restricted="1"><dc:title>Cover</dc:title><upnp:class>object.item.imageItem.photo</upnp:class><res protocolInfo="http-get:*:image/jpeg:*">http://nas/{id}.jpg</res></item>"#
        )
    }

    fn folder(id: &str, title: &str) -> String {
        format!(
            r#"<container id="{id}" parentID="0" restricted="1"><dc:title>{title}</dc:title><upnp:class>object.container.storageFolder</upnp:class></container>"#
        )
    }

    fn didl(objects: &[String]) -> String {
        format!(
            r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">{}</DIDL-Lite>"#,
            objects.concat()
        )
    }

    fn page(objects: &[String], total: u32) -> JobResult {
        JobResult::Soap(Ok(ActionResponse::new("Browse")
            .with_arg("Result", didl(objects))
            .with_arg("NumberReturned", objects.len().to_string())
            .with_arg("TotalMatches", total.to_string())
            .with_arg("UpdateID", "1")))
    }

    fn event(server: &mut MediaServer, name: &str, value: &str) -> Effects {
        let mut fx = Effects::new();
        server.handle_event("uuid:sub-1", &[(name.to_string(), value.to_string())], &mut fx);
        fx
    }

    /// Server whose root holds the folders `1` and `2`.
    fn with_root() -> (MediaServer, Vec<NodeId>) {
        let mut server = MediaServer::from_info(info(), ControlPointConfig::default());
        let mut fx = Effects::new();
        server.set_active(true, &mut fx);
        let (job, _, _) = soap(&fx).remove(0);

        let mut fx = Effects::new();
        server.handle_job(job, page(&[folder("1", "Albums"), folder("2", "Artists")], 2), &mut fx);
        let root = server.tree().root();
        let children = server.tree().children(root).to_vec();
        (server, children)
    }

    #[test]
    fn test_activation_browses_root() {
        let mut server = MediaServer::from_info(info(), ControlPointConfig::default());
        let mut fx = Effects::new();
        server.set_active(true, &mut fx);

        let sent = soap(&fx);
        assert_eq!(sent.len(), 1);
        let (_, action, args) = &sent[0];
        assert_eq!(action, "Browse");
        assert_eq!(arg(args, "ObjectID"), "0");
        assert_eq!(arg(args, "BrowseFlag"), "BrowseDirectChildren");
        assert_eq!(arg(args, "StartingIndex"), "0");
        assert_eq!(arg(args, "RequestedCount"), "500");
        assert!(fx.iter().any(|e| matches!(e, Effect::Subscribe { .. })));
        assert_eq!(server.state(), DeviceState::Populating);
    }

    #[test]
    fn test_paging_counts_skipped_objects() {
        let mut server = MediaServer::from_info(info(), ControlPointConfig::default());
        let mut fx = Effects::new();
        server.set_active(true, &mut fx);
        let (job, _, _) = soap(&fx).remove(0);

        let mut objects: Vec<String> = (0..30).map(|i| track(&format!("t{i}"))).collect();
        objects.extend((0..5).map(|i| picture(&format!("p{i}"))));
        let mut fx = Effects::new();
        server.handle_job(job, page(&objects, 50), &mut fx);

        let root = server.tree().root();
        assert_eq!(server.tree().children(root).len(), 30);
        let sent = soap(&fx);
        assert_eq!(sent.len(), 1);
        assert_eq!(arg(&sent[0].2, "StartingIndex"), "35");
        assert_eq!(server.state(), DeviceState::Populating);

        let rest: Vec<String> = (30..45).map(|i| track(&format!("t{i}"))).collect();
        let mut fx = Effects::new();
        server.handle_job(sent[0].0, page(&rest, 50), &mut fx);

        assert!(soap(&fx).is_empty());
        assert_eq!(server.tree().children(root).len(), 45);
        assert_eq!(server.state(), DeviceState::Populated);
    }

    #[test]
    fn test_uncounted_server_pages_until_short_page() {
        let config = ControlPointConfig::default().with_browse_page_size(2);
        let mut server = MediaServer::from_info(info(), config);
        let mut fx = Effects::new();
        server.set_active(true, &mut fx);
        let (job, _, _) = soap(&fx).remove(0);

        let mut fx = Effects::new();
        server.handle_job(job, page(&[track("a"), track("b")], 0), &mut fx);
        let sent = soap(&fx);
        assert_eq!(arg(&sent[0].2, "StartingIndex"), "2");

        let mut fx = Effects::new();
        server.handle_job(sent[0].0, page(&[track("c")], 0), &mut fx);
        assert!(soap(&fx).is_empty());
        assert_eq!(server.state(), DeviceState::Populated);
    }

    #[test]
    fn test_expand_browses_each_collection_once() {
        let (mut server, folders) = with_root();
        assert!(server.tree().can_fetch_more(folders[0]));

        let mut fx = Effects::new();
        server.fetch_more(folders[0], &mut fx);
        let sent = soap(&fx);
        assert_eq!(sent.len(), 1);
        assert_eq!(arg(&sent[0].2, "ObjectID"), "1");

        let mut fx = Effects::new();
        server.fetch_more(folders[0], &mut fx);
        assert!(soap(&fx).is_empty());
    }

    #[test]
    fn test_failed_browse_can_be_retried() {
        let (mut server, folders) = with_root();
        let mut fx = Effects::new();
        server.fetch_more(folders[0], &mut fx);
        let (job, _, _) = soap(&fx).remove(0);

        let mut fx = Effects::new();
        server.handle_job(
            job,
            JobResult::Soap(Err(soap_client::SoapError::Fault {
                code: 701,
                description: "No such object".to_string(),
            })),
            &mut fx,
        );
        assert!(server.tree().can_fetch_more(folders[0]));
    }

    #[test]
    fn test_system_update_id_change_repopulates() {
        let (mut server, _) = with_root();

        let fx = event(&mut server, "SystemUpdateID", "10");
        assert!(soap(&fx).is_empty());
        assert_eq!(server.system_update_id(), Some(10));

        let fx = event(&mut server, "SystemUpdateID", "10");
        assert!(soap(&fx).is_empty());

        let fx = event(&mut server, "SystemUpdateID", "11");
        assert!(fx.contains(&Effect::Model(ModelEvent::Reset)));
        let sent = soap(&fx);
        assert_eq!(sent.len(), 1);
        assert_eq!(arg(&sent[0].2, "ObjectID"), "0");
        assert_eq!(arg(&sent[0].2, "StartingIndex"), "0");

        let root = server.tree().root();
        assert!(server.tree().children(root).is_empty());
        assert_eq!(server.state(), DeviceState::Populating);
    }

    #[test]
    fn test_container_update_repopulates_expanded_container() {
        let (mut server, folders) = with_root();
        let mut fx = Effects::new();
        server.fetch_more(folders[0], &mut fx);
        let (job, _, _) = soap(&fx).remove(0);
        let mut fx = Effects::new();
        server.handle_job(job, page(&[track("a"), track("b")], 2), &mut fx);
        assert_eq!(server.tree().children(folders[0]).len(), 2);

        // Folder 2 was never expanded and is left alone
        let fx = event(&mut server, "ContainerUpdateIDs", "1,7,2,3");
        let sent = soap(&fx);
        assert_eq!(sent.len(), 1);
        assert_eq!(arg(&sent[0].2, "ObjectID"), "1");
        assert_eq!(arg(&sent[0].2, "StartingIndex"), "0");
        assert!(server.tree().children(folders[0]).is_empty());
        assert!(fx.contains(&Effect::Model(ModelEvent::Removed {
            parent: folders[0],
            first: 0,
            last: 1,
        })));
    }

    #[test]
    fn test_container_update_with_odd_fields_is_dropped() {
        let (mut server, folders) = with_root();
        let mut fx = Effects::new();
        server.fetch_more(folders[0], &mut fx);
        let (job, _, _) = soap(&fx).remove(0);
        let mut fx = Effects::new();
        server.handle_job(job, page(&[track("a")], 1), &mut fx);

        let fx = event(&mut server, "ContainerUpdateIDs", "1,7,2");
        assert!(fx.is_empty());
        assert_eq!(server.tree().children(folders[0]).len(), 1);
    }

    #[test]
    fn test_play_waits_for_content() {
        let (mut server, folders) = with_root();

        let mut fx = Effects::new();
        server.play(vec![folders[0]], InsertPosition::End, PlayKind::Append, &mut fx);
        let sent = soap(&fx);
        assert_eq!(sent.len(), 1);
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::StartTimer {
                timer: TimerKind::PlayTimeout,
                ..
            }
        )));

        let mut fx = Effects::new();
        server.handle_job(sent[0].0, page(&[track("a"), track("b")], 2), &mut fx);
        let command = fx
            .iter()
            .find_map(|e| match e {
                Effect::Play(command) => Some(command.clone()),
                _ => None,
            })
            .unwrap();
        let urls: Vec<&str> = command.tracks.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, vec!["http://nas/a.flac", "http://nas/b.flac"]);
        assert!(fx.contains(&Effect::CancelTimer(TimerKind::PlayTimeout)));
    }

    #[test]
    fn test_play_times_out() {
        let (mut server, folders) = with_root();
        let mut fx = Effects::new();
        server.play(vec![folders[0]], InsertPosition::End, PlayKind::Append, &mut fx);

        let mut fx = Effects::new();
        server.handle_timer(TimerKind::PlayTimeout, &mut fx);
        assert_eq!(statuses(&fx), vec!["Timeout!"]);

        // A late answer no longer produces a play command
        let mut fx = Effects::new();
        server.handle_timer(TimerKind::PlayTimeout, &mut fx);
        assert!(fx.is_empty());
    }

    #[test]
    fn test_container_update_cancels_pending_play() {
        let (mut server, folders) = with_root();
        let mut fx = Effects::new();
        server.fetch_more(folders[1], &mut fx);
        let (job, _, _) = soap(&fx).remove(0);
        let mut fx = Effects::new();
        server.handle_job(job, page(&[folder("2.1", "Nested")], 1), &mut fx);

        let mut fx = Effects::new();
        server.play(vec![folders[1]], InsertPosition::End, PlayKind::Append, &mut fx);

        let fx = event(&mut server, "ContainerUpdateIDs", "2,4");
        assert_eq!(statuses(&fx), vec!["Content changed, play request cancelled"]);
    }

    #[test]
    fn test_search_without_tracks_reports_status() {
        let mut server = server();
        let mut fx = Effects::new();
        server.search("nothing", &mut fx);
        let sent = soap(&fx);
        assert_eq!(sent[0].1, "Search");
        assert_eq!(arg(&sent[0].2, "ContainerID"), "0");
        assert_eq!(arg(&sent[0].2, "RequestedCount"), "100");

        let mut fx = Effects::new();
        server.handle_job(sent[0].0, page(&[], 0), &mut fx);
        assert_eq!(statuses(&fx), vec!["No tracks found"]);
        assert_eq!(
            server.tree().get(server.search_root()).map(|n| n.population),
            Some(Population::Populated)
        );
    }

    #[test]
    fn test_new_search_cancels_previous() {
        let mut server = server();
        let mut fx = Effects::new();
        server.search("first", &mut fx);
        let (first, _, _) = soap(&fx).remove(0);

        let mut fx = Effects::new();
        server.search("second", &mut fx);
        assert!(fx.contains(&Effect::CancelJobs(vec![first])));
    }

    #[test]
    fn test_local_server_refuses_search() {
        let mut device = ServerDevice::Local(LocalPlaylists::new());
        let mut fx = Effects::new();
        device.search("anything", &mut fx);
        assert_eq!(statuses(&fx), vec!["Search is not available for local playlists"]);
        assert_eq!(device.uuid(), LOCAL_PLAYLISTS_UUID);
    }
}
