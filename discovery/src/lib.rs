//! SSDP discovery of UPnP AV media servers and OpenHome renderers
//!
//! A [`Discovery`] worker searches for `upnp:rootdevice` every 30 seconds,
//! listens for NOTIFY announcements, fetches each new device's description and
//! reports [`DiscoveryEvent`]s over a channel.
//!
//! # Quick Start
//!
//! ```no_run
//! use soap_client::SoapClient;
//! use upnp_discovery::{Discovery, DiscoveryConfig, DiscoveryEvent};
//!
//! # async fn run() -> upnp_discovery::Result<()> {
//! let client = SoapClient::new().expect("http client");
//! let (discovery, mut events) = Discovery::start(DiscoveryConfig::default(), client)?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         DiscoveryEvent::DeviceAdded(device) => println!("Found {} at {}", device.name, device.host),
//!         DiscoveryEvent::DeviceRemoved(uuid) => println!("Lost {}", uuid),
//!     }
//! }
//! # drop(discovery);
//! # Ok(())
//! # }
//! ```

mod config;
pub mod device;
mod discovery;
mod error;
mod socket;
pub mod ssdp;
pub mod tracker;

pub use config::DiscoveryConfig;
pub use device::{DiscoveredDevice, IconInfo, ServiceInfo, CONTENT_DIRECTORY, OPENHOME_PLAYLIST};
pub use discovery::{fetch_description, Discovery, DiscoveryCommand, DiscoveryHandle};
pub use error::{DiscoveryError, Result};

use std::time::Duration;

use soap_client::SoapClient;

/// Events published by the discovery worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A root device answered and its description was parsed
    DeviceAdded(DiscoveredDevice),
    /// A device said byebye, went silent for a whole window, or the network went away
    DeviceRemoved(String),
}

/// Run one discovery window and return the devices that are still present at
/// its end.
pub async fn discover_once(
    config: DiscoveryConfig,
    client: SoapClient,
    window: Duration,
) -> Result<Vec<DiscoveredDevice>> {
    let (discovery, mut events) = Discovery::start(config, client)?;
    let deadline = tokio::time::Instant::now() + window;
    let mut found: Vec<DiscoveredDevice> = Vec::new();

    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        match event {
            DiscoveryEvent::DeviceAdded(device) => {
                found.retain(|d| d.uuid != device.uuid);
                found.push(device);
            }
            DiscoveryEvent::DeviceRemoved(uuid) => found.retain(|d| d.uuid != uuid),
        }
    }

    drop(discovery);
    Ok(found)
}
