//! Text search over a ContentDirectory and aggregation of the flat result
//! list into (album, artist) groups.

use std::collections::HashMap;

use crate::content::{ContentKind, ContentTree, MusicTrack, Node, NodeId, TreeModel};

/// `SearchCriteria` matching audio items whose title, artist or album
/// contains `text`.
pub fn search_criteria(text: &str) -> String {
    let needle = text.trim().replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "upnp:class derivedfrom \"object.item.audioItem\" and \
         (dc:title contains \"{needle}\" or upnp:artist contains \"{needle}\" or upnp:album contains \"{needle}\")"
    )
}

/// One search query and its paging progress.
#[derive(Debug, Default)]
pub struct SearchSession {
    pub id: u64,
    pub text: String,
    /// Results consumed so far, recognized or not
    pub fetched: u32,
    pub tracks: u32,
    groups: HashMap<(String, String), NodeId>,
}

impl SearchSession {
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            ..Self::default()
        }
    }

    /// File `track` under its (album, artist) group below `root`, creating the
    /// group on first sight. Within a group tracks stay ordered by track
    /// number; unnumbered tracks go last in arrival order.
    pub fn add_track(&mut self, tree: &mut ContentTree, root: NodeId, track: MusicTrack, object_id: String) {
        let album = track.album.clone().unwrap_or_default();
        let artist = track.display_artist().unwrap_or_default().to_string();
        let key = (album, artist);

        let group = match self.groups.get(&key).copied().filter(|g| tree.contains(*g)) {
            Some(group) => group,
            None => {
                let name = if key.0.is_empty() {
                    "Unknown album".to_string()
                } else {
                    key.0.clone()
                };
                let mut node = Node::collection(
                    ContentKind::Album {
                        artist: (!key.1.is_empty()).then(|| key.1.clone()),
                        art_url: track.art_url.clone(),
                    },
                    name,
                    String::new(),
                );
                node.population = crate::content::Population::Populated;
                let Some(group) = tree.append(root, vec![node]).first().copied() else {
                    return;
                };
                self.groups.insert(key, group);
                group
            }
        };

        let number = track.track_number.unwrap_or(u32::MAX);
        let row = tree
            .children(group)
            .iter()
            .position(|child| {
                tree.get(*child)
                    .and_then(|n| n.kind.track())
                    .map(|t| t.track_number.unwrap_or(u32::MAX) > number)
                    .unwrap_or(false)
            })
            .unwrap_or(tree.children(group).len());
        tree.insert(group, row, Node::track(track, object_id));
        self.tracks += 1;
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}
