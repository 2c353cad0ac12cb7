//! Content data model shared by media servers, local playlists and renderer
//! queues.

mod kind;
mod model;
mod tree;

pub use kind::{ContentKind, MusicTrack};
pub use model::{Icon, ModelEvent, RowAction, RowData, TreeModel};
pub use tree::{ContentTree, Node, NodeId, Population, TreeRole};
