//! Arena-backed content tree.
//!
//! Nodes live in a slot vector and are addressed by generational [`NodeId`]
//! handles, so a handle to a removed node never aliases a newer one.
//! Structural changes are recorded as [`ModelEvent`]s until drained with
//! [`ContentTree::take_events`].

use crate::image::CoverDescriptor;

use super::kind::ContentKind;
use super::model::{Icon, ModelEvent, RowAction, RowData, TreeModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Child-list state of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Population {
    Unpopulated,
    Populating,
    Populated,
}

/// Library trees offer play actions, queue trees offer seek/remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeRole {
    Library,
    Queue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Title of a collection; tracks derive their text from the track
    pub name: String,
    /// Server-assigned id (ContentDirectory object id, OpenHome track id)
    pub object_id: String,
    pub kind: ContentKind,
    pub population: Population,
    /// Children of unrecognized class seen while paging
    pub skipped: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn collection(kind: ContentKind, name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object_id: object_id.into(),
            population: if kind.is_collection() {
                Population::Unpopulated
            } else {
                Population::Populated
            },
            kind,
            skipped: 0,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn track(track: super::MusicTrack, object_id: impl Into<String>) -> Self {
        Self::collection(ContentKind::Track(track), String::new(), object_id)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Offset of the next page: recognized children plus skipped ones.
    pub fn fetched(&self) -> u32 {
        self.children.len() as u32 + self.skipped
    }

    pub fn display_text(&self) -> String {
        match &self.kind {
            ContentKind::Track(track) => track.display_text(),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug, Clone)]
pub struct ContentTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    role: TreeRole,
    events: Vec<ModelEvent>,
}

impl ContentTree {
    pub fn new(role: TreeRole, root: Node) -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            role,
            events: Vec::new(),
        };
        tree.root = tree.alloc(root);
        tree
    }

    pub fn role(&self) -> TreeRole {
        self.role
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes, roots included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    /// Add a parentless node, e.g. a hidden search root.
    pub fn add_detached(&mut self, node: Node) -> NodeId {
        self.alloc(node)
    }

    /// Append `nodes` to `parent` as one insertion.
    pub fn append(&mut self, parent: NodeId, nodes: Vec<Node>) -> Vec<NodeId> {
        let Some(first) = self.get(parent).map(|p| p.children.len()) else {
            return Vec::new();
        };
        if nodes.is_empty() {
            return Vec::new();
        }

        let ids: Vec<NodeId> = nodes
            .into_iter()
            .map(|mut node| {
                node.parent = Some(parent);
                self.alloc(node)
            })
            .collect();

        let last = first + ids.len() - 1;
        if let Some(p) = self.get_mut(parent) {
            p.children.extend_from_slice(&ids);
        }
        self.events.push(ModelEvent::Inserted { parent, first, last });
        ids
    }

    /// Insert one node before `row` (clamped to the end).
    pub fn insert(&mut self, parent: NodeId, row: usize, mut node: Node) -> Option<NodeId> {
        let len = self.get(parent)?.children.len();
        let row = row.min(len);
        node.parent = Some(parent);
        let id = self.alloc(node);
        self.get_mut(parent)?.children.insert(row, id);
        self.events.push(ModelEvent::Inserted {
            parent,
            first: row,
            last: row,
        });
        Some(id)
    }

    pub fn remove_row(&mut self, parent: NodeId, row: usize) -> bool {
        let Some(p) = self.get_mut(parent) else {
            return false;
        };
        if row >= p.children.len() {
            return false;
        }
        let id = p.children.remove(row);
        self.release(id);
        self.events.push(ModelEvent::Removed {
            parent,
            first: row,
            last: row,
        });
        true
    }

    /// Drop every child of `parent` and forget its skip count.
    pub fn remove_children(&mut self, parent: NodeId) {
        let Some(p) = self.get_mut(parent) else {
            return;
        };
        p.skipped = 0;
        let children = std::mem::take(&mut p.children);
        if children.is_empty() {
            return;
        }
        let last = children.len() - 1;
        for child in children {
            self.release(child);
        }
        self.events.push(ModelEvent::Removed {
            parent,
            first: 0,
            last,
        });
    }

    /// Move the child at `from` so that it ends up at `to`.
    pub fn move_row(&mut self, parent: NodeId, from: usize, to: usize) -> bool {
        let Some(p) = self.get_mut(parent) else {
            return false;
        };
        if from >= p.children.len() || to >= p.children.len() {
            return false;
        }
        if from == to {
            return true;
        }
        let id = p.children.remove(from);
        p.children.insert(to, id);
        self.events.push(ModelEvent::Moved { parent, from, to });
        true
    }

    /// Discard everything below the root (detached roots are kept but
    /// emptied) and report a single [`ModelEvent::Reset`].
    pub fn reset(&mut self) {
        let roots: Vec<NodeId> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let node = slot.node.as_ref()?;
                node.parent.is_none().then_some(NodeId {
                    index: index as u32,
                    generation: slot.generation,
                })
            })
            .collect();

        for root in roots {
            if let Some(node) = self.get_mut(root) {
                node.skipped = 0;
                node.population = Population::Unpopulated;
                let children = std::mem::take(&mut node.children);
                for child in children {
                    self.release(child);
                }
            }
        }
        self.events.clear();
        self.events.push(ModelEvent::Reset);
    }

    /// Report a data change of `node`.
    pub fn touch(&mut self, node: NodeId) {
        if self.contains(node) {
            self.events.push(ModelEvent::Changed { node });
        }
    }

    /// Depth-first, pre-order search for a server object id below `start`
    /// (inclusive).
    pub fn find_object(&self, start: NodeId, object_id: &str) -> Option<NodeId> {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            if node.object_id == object_id {
                return Some(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    /// Parent chain of `node`, nearest first.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.get(node).and_then(|n| n.parent), move |id| {
            self.get(*id).and_then(|n| n.parent)
        })
    }

    pub fn take_events(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.events)
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(slot) = self
                .slots
                .get_mut(id.index as usize)
                .filter(|slot| slot.generation == id.generation)
            else {
                continue;
            };
            if let Some(node) = slot.node.take() {
                stack.extend(node.children);
                self.free.push(id.index);
            }
        }
    }

    fn actions(&self, kind: &ContentKind) -> Vec<RowAction> {
        match (self.role, kind) {
            (TreeRole::Queue, ContentKind::Track(_)) => vec![RowAction::Seek, RowAction::Remove],
            (TreeRole::Queue, _) => Vec::new(),
            (TreeRole::Library, ContentKind::SearchContainer) => Vec::new(),
            (TreeRole::Library, _) => vec![RowAction::Play, RowAction::Append, RowAction::Insert],
        }
    }
}

impl TreeModel for ContentTree {
    fn root(&self) -> NodeId {
        self.root
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.get(node)?.parent
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        self.get(node).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    fn row(&self, node: NodeId) -> Option<usize> {
        let parent = self.get(node)?.parent?;
        self.get(parent)?.children.iter().position(|c| *c == node)
    }

    fn row_data(&self, node: NodeId) -> Option<RowData> {
        let n = self.get(node)?;
        let (sub_text, cover) = match &n.kind {
            ContentKind::Track(track) => (
                track.sub_text(),
                Some(CoverDescriptor {
                    url: track.art_url.clone(),
                    album: track.album.clone(),
                    artist: track.display_artist().map(str::to_string),
                }),
            ),
            ContentKind::Album { artist, art_url } => (
                artist.clone(),
                Some(CoverDescriptor {
                    url: art_url.clone(),
                    album: Some(n.name.clone()),
                    artist: artist.clone(),
                }),
            ),
            ContentKind::Folder { .. }
            | ContentKind::Genre
            | ContentKind::Artist
            | ContentKind::Playlist
            | ContentKind::SearchContainer => (None, None),
        };

        let icon = match &n.kind {
            ContentKind::Track(track) if self.role == TreeRole::Queue && track.url.is_empty() => {
                Icon::Pending
            }
            kind => kind.icon(),
        };

        Some(RowData {
            display_text: n.display_text(),
            sub_text,
            icon,
            cover: cover.filter(|c| !c.is_empty()),
            actions: self.actions(&n.kind),
        })
    }

    fn can_fetch_more(&self, node: NodeId) -> bool {
        self.get(node)
            .map(|n| n.kind.is_collection() && n.population == Population::Unpopulated)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MusicTrack;

    fn library() -> ContentTree {
        ContentTree::new(
            TreeRole::Library,
            Node::collection(ContentKind::Folder { icon: Icon::Folder }, "Root", "0"),
        )
    }

    fn folder(name: &str, id: &str) -> Node {
        Node::collection(ContentKind::Folder { icon: Icon::Folder }, name, id)
    }

    fn track(url: &str) -> Node {
        Node::track(MusicTrack::from_url(url), url)
    }

    #[test]
    fn test_append_reports_one_insertion() {
        let mut tree = library();
        let root = tree.root();
        let ids = tree.append(root, vec![folder("A", "1"), folder("B", "2")]);

        assert_eq!(ids.len(), 2);
        assert_eq!(tree.row(ids[1]), Some(1));
        assert_eq!(tree.parent(ids[0]), Some(root));
        assert_eq!(
            tree.take_events(),
            vec![ModelEvent::Inserted {
                parent: root,
                first: 0,
                last: 1
            }]
        );
    }

    #[test]
    fn test_removed_handles_do_not_alias_new_nodes() {
        let mut tree = library();
        let root = tree.root();
        let old = tree.append(root, vec![folder("A", "1")])[0];
        tree.remove_children(root);
        let new = tree.append(root, vec![folder("B", "2")])[0];

        assert!(!tree.contains(old));
        assert_eq!(tree.get(new).unwrap().name, "B");
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_removing_a_collection_frees_its_subtree() {
        let mut tree = library();
        let root = tree.root();
        let album = tree.append(root, vec![folder("A", "1")])[0];
        let tracks = tree.append(album, vec![track("http://x/1"), track("http://x/2")]);

        assert!(tree.remove_row(root, 0));
        assert!(!tree.contains(album));
        assert!(tracks.iter().all(|t| !tree.contains(*t)));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_find_object_is_depth_first() {
        let mut tree = library();
        let root = tree.root();
        let ids = tree.append(root, vec![folder("A", "a"), folder("B", "b")]);
        let nested = tree.append(ids[0], vec![folder("Deep", "d")])[0];

        assert_eq!(tree.find_object(root, "d"), Some(nested));
        assert_eq!(tree.find_object(root, "b"), Some(ids[1]));
        assert_eq!(tree.find_object(ids[1], "d"), None);
        assert_eq!(tree.ancestors(nested).collect::<Vec<_>>(), vec![ids[0], root]);
    }

    #[test]
    fn test_move_row() {
        let mut tree = library();
        let root = tree.root();
        let ids = tree.append(root, vec![track("http://x/5"), track("http://x/6"), track("http://x/7")]);
        tree.take_events();

        assert!(tree.move_row(root, 1, 0));
        assert_eq!(tree.children(root), &[ids[1], ids[0], ids[2]]);
        assert_eq!(
            tree.take_events(),
            vec![ModelEvent::Moved {
                parent: root,
                from: 1,
                to: 0
            }]
        );
    }

    #[test]
    fn test_reset_empties_detached_roots() {
        let mut tree = library();
        let search = tree.add_detached(Node::collection(ContentKind::SearchContainer, "Search", ""));
        tree.append(search, vec![track("http://x/1")]);
        tree.append(tree.root(), vec![folder("A", "1")]);

        tree.reset();
        assert!(tree.is_empty());
        assert!(tree.children(search).is_empty());
        assert_eq!(tree.take_events(), vec![ModelEvent::Reset]);
        assert!(tree.can_fetch_more(tree.root()));
    }

    #[test]
    fn test_row_data_actions_depend_on_role() {
        let mut queue = ContentTree::new(
            TreeRole::Queue,
            Node::collection(ContentKind::Playlist, "Queue", ""),
        );
        let root = queue.root();
        let rows = queue.append(root, vec![Node::track(MusicTrack::default(), "5")]);

        let data = queue.row_data(rows[0]).unwrap();
        assert_eq!(data.icon, Icon::Pending);
        assert_eq!(data.actions, vec![RowAction::Seek, RowAction::Remove]);

        let mut lib = library();
        let lib_root = lib.root();
        let ids = lib.append(lib_root, vec![track("http://x/1")]);
        assert_eq!(
            lib.row_data(ids[0]).unwrap().actions,
            vec![RowAction::Play, RowAction::Append, RowAction::Insert]
        );
    }
}
