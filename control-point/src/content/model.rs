//! Read interface for views over a content tree or a renderer queue.

use crate::image::{CoverDescriptor, CoverResolver, ImageHandle};

use super::tree::NodeId;

/// Icon role of a row. Theming is up to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Icon {
    Track,
    Broadcast,
    Folder,
    Genre,
    Artist,
    Album,
    Playlist,
    Search,
    /// A "all tracks" style synthetic folder
    TrackList,
    /// Queue row whose metadata has not arrived yet
    Pending,
}

/// What a consumer may offer for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowAction {
    Play,
    Append,
    Insert,
    /// Jump to this queue entry
    Seek,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowData {
    pub display_text: String,
    pub sub_text: Option<String>,
    pub icon: Icon,
    pub cover: Option<CoverDescriptor>,
    pub actions: Vec<RowAction>,
}

/// Structural change notifications, in the order they were applied.
///
/// Rows are positions within `parent` after the preceding events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// Everything below the root was discarded
    Reset,
    Inserted {
        parent: NodeId,
        first: usize,
        last: usize,
    },
    Removed {
        parent: NodeId,
        first: usize,
        last: usize,
    },
    Moved {
        parent: NodeId,
        from: usize,
        to: usize,
    },
    Changed {
        node: NodeId,
    },
}

/// Tree-shaped row source.
pub trait TreeModel {
    fn root(&self) -> NodeId;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Children in row order; empty for leaves and unknown handles.
    fn children(&self, node: NodeId) -> &[NodeId];

    fn row(&self, node: NodeId) -> Option<usize>;

    fn row_data(&self, node: NodeId) -> Option<RowData>;

    /// A collection whose children have not been requested yet.
    fn can_fetch_more(&self, node: NodeId) -> bool;

    fn cover_image(
        &self,
        node: NodeId,
        resolver: &dyn CoverResolver,
        size: u32,
        urgent: bool,
    ) -> Option<ImageHandle> {
        let cover = self.row_data(node)?.cover?;
        resolver.cover_image(&cover, size, urgent)
    }
}
