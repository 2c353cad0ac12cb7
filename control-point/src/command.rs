//! Play requests: what a renderer is asked to enqueue, and how a selection of
//! library rows is flattened into it.

use std::collections::HashSet;

use tracing::debug;

use crate::content::{ContentKind, ContentTree, MusicTrack, NodeId, Population};

/// How a renderer applies a [`PlayCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayKind {
    Append,
    /// Clear the queue, insert, then start the first inserted track
    ReplaceAndPlay,
    Insert,
    /// Reinsertion half of a queue move
    Move,
}

/// Where inserted tracks go in a renderer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    End,
    /// Before the row currently at this index
    Row(usize),
    /// After the queue entry with this id; 0 is the start of the queue
    AfterId(u32),
}

/// Ordered tracks for exactly one renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayCommand {
    pub tracks: Vec<MusicTrack>,
    pub position: InsertPosition,
    pub kind: PlayKind,
}

/// Outcome of one flattening attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
    Ready(PlayCommand),
    /// Collections that must finish populating first, in visit order
    Waiting(Vec<NodeId>),
    /// Everything is populated but no playable track was found
    Empty,
}

#[derive(Debug, Clone)]
struct PendingPlay {
    selection: Vec<NodeId>,
    position: InsertPosition,
    kind: PlayKind,
}

/// Accumulates a play request across asynchronous population.
///
/// The selection is re-flattened from scratch after every population, so the
/// result is always in left-to-right depth-first order no matter in which
/// order pages arrive.
#[derive(Debug, Default)]
pub struct CommandBuilder {
    pending: Option<PendingPlay>,
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request, replacing any pending one.
    pub fn start(
        &mut self,
        tree: &ContentTree,
        selection: Vec<NodeId>,
        position: InsertPosition,
        kind: PlayKind,
    ) -> BuildStep {
        self.pending = Some(PendingPlay {
            selection,
            position,
            kind,
        });
        self.step(tree)
    }

    /// Re-evaluate after a population finished. `None` when idle.
    pub fn resume(&mut self, tree: &ContentTree) -> Option<BuildStep> {
        self.pending.as_ref()?;
        Some(self.step(tree))
    }

    /// Drop the pending request; returns whether there was one.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn step(&mut self, tree: &ContentTree) -> BuildStep {
        let Some(pending) = self.pending.as_ref() else {
            return BuildStep::Empty;
        };

        let mut tracks = Vec::new();
        let mut waiting = Vec::new();
        for node in &pending.selection {
            collect(tree, *node, &mut tracks, &mut waiting);
        }

        if !waiting.is_empty() {
            debug!(waiting = waiting.len(), "Play request waiting for content");
            return BuildStep::Waiting(waiting);
        }

        let Some(pending) = self.pending.take() else {
            return BuildStep::Empty;
        };
        let mut seen = HashSet::new();
        tracks.retain(|track: &MusicTrack| seen.insert(track.url.clone()));

        if tracks.is_empty() {
            BuildStep::Empty
        } else {
            BuildStep::Ready(PlayCommand {
                tracks,
                position: pending.position,
                kind: pending.kind,
            })
        }
    }
}

fn collect(tree: &ContentTree, start: NodeId, tracks: &mut Vec<MusicTrack>, waiting: &mut Vec<NodeId>) {
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        match &node.kind {
            ContentKind::Track(track) => {
                let mut track = track.clone();
                if track.art_url.is_none() {
                    track.art_url = album_art(tree, id);
                }
                tracks.push(track);
            }
            _ if node.population != Population::Populated => waiting.push(id),
            _ => stack.extend(node.children().iter().rev().copied()),
        }
    }
}

/// Art of the nearest enclosing album.
fn album_art(tree: &ContentTree, node: NodeId) -> Option<String> {
    tree.ancestors(node).find_map(|id| match &tree.get(id)?.kind {
        ContentKind::Album { art_url, .. } => art_url.clone(),
        _ => None,
    })
}
