//! Renderer state mirrored from OpenHome events.

/// Transport state folded onto four values; `Buffering` counts as playing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportState {
    #[default]
    Null,
    Stopped,
    Playing,
    Paused,
}

impl TransportState {
    pub fn from_openhome(value: &str) -> Self {
        match value.trim() {
            "Playing" | "Buffering" => TransportState::Playing,
            "Paused" => TransportState::Paused,
            "Stopped" => TransportState::Stopped,
            _ => TransportState::Null,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub state: TransportState,
    pub position_seconds: u32,
    pub duration_seconds: u32,
    pub shuffle: bool,
    pub repeat: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeState {
    pub max: u32,
    pub steps: u32,
    pub current: u32,
    pub muted: bool,
}

impl Default for VolumeState {
    fn default() -> Self {
        Self {
            max: 100,
            steps: 100,
            current: 0,
            muted: false,
        }
    }
}

/// Change notifications; each is emitted only when the value changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererEvent {
    Playback(PlaybackState),
    Volume(VolumeState),
    /// OpenHome id of the current queue entry
    CurrentTrack(Option<u32>),
    Sources {
        names: Vec<String>,
        active: Option<usize>,
    },
}

/// Argument-less Playlist transport actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAction {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
}

impl TransportAction {
    pub fn action(&self) -> &'static str {
        match self {
            TransportAction::Play => "Play",
            TransportAction::Pause => "Pause",
            TransportAction::Stop => "Stop",
            TransportAction::Next => "Next",
            TransportAction::Previous => "Previous",
        }
    }
}

/// OpenHome and UPnP spell booleans differently in events.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" => Some(true),
        "0" => Some(false),
        v if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") => Some(true),
        v if v.eq_ignore_ascii_case("false") || v.eq_ignore_ascii_case("no") => Some(false),
        _ => None,
    }
}
