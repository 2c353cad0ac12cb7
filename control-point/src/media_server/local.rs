//! The built-in "Local Playlists" pseudo-server.

use tracing::info;

use crate::command::{BuildStep, CommandBuilder, InsertPosition, PlayCommand, PlayKind};
use crate::content::{ContentKind, ContentTree, Icon, Node, NodeId, Population, TreeModel, TreeRole};
use crate::device::{Device, DeviceInfo, DeviceState};
use crate::effect::{Effect, Effects, JobId, JobResult, TimerKind};
use crate::status::StatusMessage;

pub const LOCAL_PLAYLISTS_UUID: &str = "local-playlists";

/// Named playlists kept in memory. Always populated, never talks to the
/// network, and keeps its content across deactivation.
#[derive(Debug)]
pub struct LocalPlaylists {
    info: DeviceInfo,
    active: bool,
    tree: ContentTree,
    builder: CommandBuilder,
}

impl Default for LocalPlaylists {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalPlaylists {
    pub fn new() -> Self {
        let mut root = Node::collection(ContentKind::Folder { icon: Icon::Playlist }, "Local Playlists", "0");
        root.population = Population::Populated;
        Self {
            info: DeviceInfo {
                uuid: LOCAL_PLAYLISTS_UUID.to_string(),
                name: "Local Playlists".to_string(),
                host: String::new(),
                base_url: String::new(),
                manufacturer: String::new(),
                model_name: String::new(),
                icon_url: None,
                services: Vec::new(),
            },
            active: false,
            tree: ContentTree::new(TreeRole::Library, root),
            builder: CommandBuilder::new(),
        }
    }

    pub fn tree(&self) -> &ContentTree {
        &self.tree
    }

    pub fn playlist(&self, name: &str) -> Option<NodeId> {
        let root = self.tree.root();
        self.tree
            .children(root)
            .iter()
            .copied()
            .find(|id| self.tree.get(*id).is_some_and(|n| n.name == name))
    }

    /// Store the tracks of `command` as playlist `name`, replacing a playlist
    /// of the same name.
    pub fn save_playlist(&mut self, name: &str, command: PlayCommand, fx: &mut Effects) -> Option<NodeId> {
        self.remove_playlist(name, fx);

        let root = self.tree.root();
        let mut playlist = Node::collection(ContentKind::Playlist, name, name);
        playlist.population = Population::Populated;
        let id = self.tree.append(root, vec![playlist]).first().copied()?;

        let tracks: Vec<Node> = command
            .tracks
            .into_iter()
            .enumerate()
            .map(|(index, track)| Node::track(track, format!("{name}/{index}")))
            .collect();
        info!(playlist = name, tracks = tracks.len(), "Saved local playlist");
        self.tree.append(id, tracks);
        self.flush(fx);
        Some(id)
    }

    pub fn remove_playlist(&mut self, name: &str, fx: &mut Effects) -> bool {
        let root = self.tree.root();
        let Some(row) = self.playlist(name).and_then(|id| self.tree.row(id)) else {
            return false;
        };
        self.tree.remove_row(root, row);
        self.flush(fx);
        true
    }

    pub fn play(
        &mut self,
        selection: Vec<NodeId>,
        position: InsertPosition,
        kind: PlayKind,
        fx: &mut Effects,
    ) {
        match self.builder.start(&self.tree, selection, position, kind) {
            BuildStep::Ready(command) => fx.push(Effect::Play(command)),
            BuildStep::Empty | BuildStep::Waiting(_) => {
                self.builder.cancel();
                fx.push(Effect::Status(StatusMessage::new("play", "No tracks found")));
            }
        }
    }

    fn flush(&mut self, fx: &mut Effects) {
        fx.extend(self.tree.take_events().into_iter().map(Effect::Model));
    }
}

impl Device for LocalPlaylists {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn state(&self) -> DeviceState {
        DeviceState::Populated
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool, _fx: &mut Effects) {
        self.active = active;
    }

    fn mark_lost(&mut self) {}

    fn handle_job(&mut self, _job: JobId, _result: JobResult, _fx: &mut Effects) {}

    fn handle_timer(&mut self, _timer: TimerKind, _fx: &mut Effects) {}

    fn handle_event(&mut self, _sid: &str, _variables: &[(String, String)], _fx: &mut Effects) {}

    fn model(&self) -> &dyn TreeModel {
        &self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MusicTrack;

    fn command(urls: &[&str]) -> PlayCommand {
        PlayCommand {
            tracks: urls.iter().map(|u| MusicTrack::from_url(*u)).collect(),
            position: InsertPosition::End,
            kind: PlayKind::Append,
        }
    }

    #[test]
    fn test_saved_playlist_plays_back_in_order() {
        let mut local = LocalPlaylists::new();
        let mut fx = Effects::new();
        let id = local
            .save_playlist("Morning", command(&["http://x/1", "http://x/2"]), &mut fx)
            .unwrap();
        assert!(fx.iter().all(|e| matches!(e, Effect::Model(_))));

        let mut fx = Effects::new();
        local.play(vec![id], InsertPosition::End, PlayKind::ReplaceAndPlay, &mut fx);
        match fx.as_slice() {
            [Effect::Play(cmd)] => {
                let urls: Vec<_> = cmd.tracks.iter().map(|t| t.url.as_str()).collect();
                assert_eq!(urls, vec!["http://x/1", "http://x/2"]);
                assert_eq!(cmd.kind, PlayKind::ReplaceAndPlay);
            }
            other => panic!("unexpected effects {other:?}"),
        }
    }

    #[test]
    fn test_saving_same_name_replaces() {
        let mut local = LocalPlaylists::new();
        let mut fx = Effects::new();
        local.save_playlist("Mix", command(&["http://x/1"]), &mut fx);
        let id = local.save_playlist("Mix", command(&["http://x/2", "http://x/3"]), &mut fx).unwrap();

        let root = local.tree().root();
        assert_eq!(local.tree().children(root), &[id]);
        assert_eq!(local.tree().children(id).len(), 2);
        assert!(local.remove_playlist("Mix", &mut fx));
        assert!(local.playlist("Mix").is_none());
    }
}
