//! # UPnP AV / OpenHome control point
//!
//! Browses UPnP MediaServers and drives OpenHome renderers:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use control_point::{start_event_server, ControlPoint, ControlPointConfig, JsonFileStore};
//! use soap_client::SoapClient;
//! use upnp_discovery::{Discovery, DiscoveryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), control_point::ControlError> {
//!     let config = ControlPointConfig::default();
//!     let store = Arc::new(JsonFileStore::open_default()?);
//!     let client = SoapClient::new()?;
//!
//!     let (notify_tx, notify_rx) = tokio::sync::mpsc::unbounded_channel();
//!     let server = start_event_server(&config, store.as_ref(), notify_tx).await?;
//!     let (discovery, discovery_rx) = Discovery::start(DiscoveryConfig::default(), client.clone())?;
//!
//!     let (control_point, handle, mut events) =
//!         ControlPoint::new(config, client, store, server.base_url());
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{event:?}");
//!         }
//!     });
//!
//!     let running = tokio::spawn(control_point.run(discovery_rx, notify_rx));
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.shutdown()?;
//!     running.await.ok();
//!     discovery.shutdown();
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ControlHandle (commands, queries)
//!     ↓
//! ControlPoint (tokio loop: jobs, timers, SIDs)
//!     ↓
//! DeviceRegistry<ServerDevice> / DeviceRegistry<OpenHomeRenderer>
//!     ↓
//! devices (sans-I/O, emit Effects)
//! ```

pub use config::ControlPointConfig;
pub use control_point::{start_event_server, ControlEvent, ControlPoint};
pub use error::{ControlError, Result};
pub use handle::{ControlCommand, ControlHandle, DeviceSummary, Row};
pub use registry::{DeviceRegistry, RegistryEvent, RegistryOutput};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};

pub use command::{InsertPosition, PlayCommand, PlayKind};
pub use effect::{DeviceClass, DeviceKey};
pub use media_server::{LocalPlaylists, MediaServer, ServerDevice, LOCAL_PLAYLISTS_UUID};
pub use renderer::{OpenHomeRenderer, PlaybackState, RendererEvent, TransportAction, TransportState, VolumeState};
pub use status::StatusKey;

pub mod command;
pub mod config;
pub mod content;
pub mod device;
pub mod effect;
pub mod image;
pub mod logging;
pub mod media_server;
pub mod renderer;
pub mod status;
pub mod store;

mod control_point;
mod error;
mod handle;
mod registry;
