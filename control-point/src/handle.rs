//! Cloneable front end of a running [`ControlPoint`](crate::ControlPoint).

use tokio::sync::{mpsc, oneshot};

use crate::command::{InsertPosition, PlayKind};
use crate::content::{NodeId, RowData};
use crate::effect::DeviceClass;
use crate::error::{ControlError, Result};
use crate::renderer::TransportAction;

/// One row of a device's content model.
#[derive(Debug, Clone)]
pub struct Row {
    pub node: NodeId,
    pub data: RowData,
    pub has_children: bool,
}

/// A registry entry as listed by [`ControlHandle::devices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub uuid: String,
    pub name: String,
    pub active: bool,
}

/// Requests accepted by the control point loop.
#[derive(Debug)]
pub enum ControlCommand {
    SetActiveDevice {
        class: DeviceClass,
        uuid: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Flatten library rows of the active server into the active renderer
    Play {
        selection: Vec<NodeId>,
        position: InsertPosition,
        kind: PlayKind,
    },
    Search {
        text: String,
    },
    FetchMore {
        node: NodeId,
    },
    Seek {
        seconds: u32,
    },
    SeekRow {
        row: usize,
    },
    SetVolume {
        volume: u32,
    },
    SetMute {
        muted: bool,
    },
    SetRepeat {
        repeat: bool,
    },
    SetShuffle {
        shuffle: bool,
    },
    RemoveTracks {
        rows: Vec<usize>,
    },
    MoveTracks {
        rows: Vec<usize>,
        to_row: usize,
    },
    Transport(TransportAction),
    ClearQueue,
    /// Copy the active renderer's queue into a local playlist
    SaveQueue {
        name: String,
    },
    Rows {
        class: DeviceClass,
        node: Option<NodeId>,
        reply: oneshot::Sender<Vec<Row>>,
    },
    SearchRoot {
        reply: oneshot::Sender<Option<NodeId>>,
    },
    Devices {
        class: DeviceClass,
        reply: oneshot::Sender<Vec<DeviceSummary>>,
    },
    Shutdown,
}

/// Send commands to the control point from any task.
///
/// Commands are fire-and-forget; their outcome shows up as
/// [`ControlEvent`](crate::ControlEvent)s. Queries wait for the loop to answer.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    commands: mpsc::UnboundedSender<ControlCommand>,
}

impl ControlHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<ControlCommand>) -> Self {
        Self { commands }
    }

    fn send(&self, command: ControlCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| ControlError::Closed)
    }

    async fn query<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ControlCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx))?;
        rx.await.map_err(|_| ControlError::Closed)
    }

    /// Select the active device of a registry and remember the choice.
    pub async fn set_active_device(&self, class: DeviceClass, uuid: impl Into<String>) -> Result<()> {
        let uuid = uuid.into();
        self.query(|reply| ControlCommand::SetActiveDevice { class, uuid, reply })
            .await?
    }

    pub fn play(&self, selection: Vec<NodeId>, position: InsertPosition, kind: PlayKind) -> Result<()> {
        self.send(ControlCommand::Play {
            selection,
            position,
            kind,
        })
    }

    pub fn search(&self, text: impl Into<String>) -> Result<()> {
        self.send(ControlCommand::Search { text: text.into() })
    }

    /// Populate a collection of the active media server.
    pub fn fetch_more(&self, node: NodeId) -> Result<()> {
        self.send(ControlCommand::FetchMore { node })
    }

    pub fn seek(&self, seconds: u32) -> Result<()> {
        self.send(ControlCommand::Seek { seconds })
    }

    /// Play the queue row `row`.
    pub fn seek_row(&self, row: usize) -> Result<()> {
        self.send(ControlCommand::SeekRow { row })
    }

    pub fn set_volume(&self, volume: u32) -> Result<()> {
        self.send(ControlCommand::SetVolume { volume })
    }

    pub fn set_mute(&self, muted: bool) -> Result<()> {
        self.send(ControlCommand::SetMute { muted })
    }

    pub fn set_repeat(&self, repeat: bool) -> Result<()> {
        self.send(ControlCommand::SetRepeat { repeat })
    }

    pub fn set_shuffle(&self, shuffle: bool) -> Result<()> {
        self.send(ControlCommand::SetShuffle { shuffle })
    }

    pub fn remove_tracks(&self, rows: Vec<usize>) -> Result<()> {
        self.send(ControlCommand::RemoveTracks { rows })
    }

    pub fn move_tracks(&self, rows: Vec<usize>, to_row: usize) -> Result<()> {
        self.send(ControlCommand::MoveTracks { rows, to_row })
    }

    pub fn transport_play(&self) -> Result<()> {
        self.send(ControlCommand::Transport(TransportAction::Play))
    }

    pub fn transport_pause(&self) -> Result<()> {
        self.send(ControlCommand::Transport(TransportAction::Pause))
    }

    pub fn transport_stop(&self) -> Result<()> {
        self.send(ControlCommand::Transport(TransportAction::Stop))
    }

    pub fn transport_next(&self) -> Result<()> {
        self.send(ControlCommand::Transport(TransportAction::Next))
    }

    pub fn transport_previous(&self) -> Result<()> {
        self.send(ControlCommand::Transport(TransportAction::Previous))
    }

    pub fn clear_queue(&self) -> Result<()> {
        self.send(ControlCommand::ClearQueue)
    }

    pub fn save_queue_as_playlist(&self, name: impl Into<String>) -> Result<()> {
        self.send(ControlCommand::SaveQueue { name: name.into() })
    }

    /// Children of `node` (the root when `None`) in the active device's model.
    pub async fn rows(&self, class: DeviceClass, node: Option<NodeId>) -> Result<Vec<Row>> {
        self.query(|reply| ControlCommand::Rows { class, node, reply }).await
    }

    /// Hidden root of the active media server's search results.
    pub async fn search_root(&self) -> Result<Option<NodeId>> {
        self.query(|reply| ControlCommand::SearchRoot { reply }).await
    }

    pub async fn devices(&self, class: DeviceClass) -> Result<Vec<DeviceSummary>> {
        self.query(|reply| ControlCommand::Devices { class, reply }).await
    }

    /// Ask the loop to deactivate everything and return.
    pub fn shutdown(&self) -> Result<()> {
        self.send(ControlCommand::Shutdown)
    }
}
