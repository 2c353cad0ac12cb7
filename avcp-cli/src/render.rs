//! One-line descriptions of control point events.

use control_point::{ControlEvent, RendererEvent, TransportState};

fn clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Text for `event`, or `None` for events too chatty to print (model edits).
pub fn describe(event: &ControlEvent) -> Option<String> {
    let text = match event {
        ControlEvent::DeviceAdded { class, name, uuid } => format!("+ {class} {name} ({uuid})"),
        ControlEvent::DeviceRemoved { class, uuid } => format!("- {class} {uuid}"),
        ControlEvent::ActiveDeviceChanged { class, uuid: Some(uuid) } => {
            format!("> active {class}: {uuid}")
        }
        ControlEvent::ActiveDeviceChanged { class, uuid: None } => format!("> no active {class}"),
        ControlEvent::Status { key, text } => format!("! {text} [{}]", key.id),
        ControlEvent::Renderer { event, .. } => match event {
            RendererEvent::Playback(playback) => {
                let state = match playback.state {
                    TransportState::Null => return None,
                    TransportState::Stopped => "stopped",
                    TransportState::Playing => "playing",
                    TransportState::Paused => "paused",
                };
                format!(
                    "~ {state} {}/{}{}{}",
                    clock(playback.position_seconds),
                    clock(playback.duration_seconds),
                    if playback.shuffle { " shuffle" } else { "" },
                    if playback.repeat { " repeat" } else { "" },
                )
            }
            RendererEvent::Volume(volume) if volume.muted => format!("~ volume {} (muted)", volume.current),
            RendererEvent::Volume(volume) => format!("~ volume {}/{}", volume.current, volume.max),
            RendererEvent::CurrentTrack(Some(id)) => format!("~ track {id}"),
            RendererEvent::CurrentTrack(None) => "~ no track".to_string(),
            RendererEvent::Sources { names, active } => {
                let active = active
                    .and_then(|i| names.get(i))
                    .map(String::as_str)
                    .unwrap_or("?");
                format!("~ source {active} of {}", names.len())
            }
        },
        ControlEvent::Model { .. } | ControlEvent::StatusCleared { .. } => return None,
    };
    Some(text)
}
