//! Known-device bookkeeping, free of I/O.
//!
//! The worker feeds datagrams, fetch results and window boundaries into a
//! [`DiscoveryTracker`]; the tracker answers with fetches to start and events
//! to publish. Keeping this separate from the socket loop lets the liveness
//! rules be tested without a network.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::device::DiscoveredDevice;
use crate::error::Result;
use crate::ssdp::{is_root_device, usn_uuid, SsdpMessage};
use crate::DiscoveryEvent;

/// A description fetch the worker must start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub uuid: String,
    pub location: String,
}

/// Liveness state of every device seen on the network.
#[derive(Debug, Default)]
pub struct DiscoveryTracker {
    known: HashMap<String, DiscoveredDevice>,
    pending: HashSet<String>,
    listed: HashSet<String>,
    window_open: bool,
}

impl DiscoveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a listing window; devices not heard from before
    /// [`end_window`](Self::end_window) are considered gone.
    pub fn begin_window(&mut self) {
        self.listed.clear();
        self.window_open = true;
    }

    /// Handle one classified datagram.
    ///
    /// Returns a fetch to start for a root device that is neither known nor
    /// already being fetched, or the removal event for a byebye.
    pub fn handle_message(&mut self, message: &SsdpMessage) -> TrackerOutput {
        let Some(uuid) = usn_uuid(message.usn()).map(str::to_string) else {
            return TrackerOutput::None;
        };

        match message {
            SsdpMessage::ByeBye { .. } => {
                self.pending.remove(&uuid);
                self.listed.remove(&uuid);
                match self.known.remove(&uuid) {
                    Some(_) => {
                        debug!(%uuid, "Device said byebye");
                        TrackerOutput::Event(DiscoveryEvent::DeviceRemoved(uuid))
                    }
                    None => TrackerOutput::None,
                }
            }
            SsdpMessage::SearchResponse { usn, location } | SsdpMessage::Alive { usn, location } => {
                if !is_root_device(usn) {
                    return TrackerOutput::None;
                }
                self.listed.insert(uuid.clone());
                if self.known.contains_key(&uuid) || !self.pending.insert(uuid.clone()) {
                    trace!(%uuid, "Device already known");
                    return TrackerOutput::None;
                }
                TrackerOutput::Fetch(FetchRequest {
                    uuid,
                    location: location.clone(),
                })
            }
        }
    }

    /// Record the outcome of a description fetch.
    ///
    /// Results for fetches that were cancelled (byebye, offline) are dropped.
    pub fn fetch_completed(
        &mut self,
        uuid: &str,
        result: Result<DiscoveredDevice>,
    ) -> Option<DiscoveryEvent> {
        if !self.pending.remove(uuid) {
            return None;
        }
        match result {
            Ok(mut device) => {
                // The description's UDN can differ in case from the USN.
                device.uuid = uuid.to_string();
                self.listed.insert(uuid.to_string());
                self.known.insert(uuid.to_string(), device.clone());
                Some(DiscoveryEvent::DeviceAdded(device))
            }
            Err(e) => {
                debug!(%uuid, "Description fetch failed: {}", e);
                None
            }
        }
    }

    /// Close the listing window and drop every known device that stayed silent.
    pub fn end_window(&mut self) -> Vec<DiscoveryEvent> {
        if !self.window_open {
            return Vec::new();
        }
        self.window_open = false;

        let mut silent: Vec<String> = self
            .known
            .keys()
            .filter(|uuid| !self.listed.contains(*uuid))
            .cloned()
            .collect();
        silent.sort();

        silent
            .into_iter()
            .map(|uuid| {
                self.known.remove(&uuid);
                debug!(%uuid, "Device missing from search window");
                DiscoveryEvent::DeviceRemoved(uuid)
            })
            .collect()
    }

    /// Forget everything, reporting each known device as removed.
    pub fn reset(&mut self) -> Vec<DiscoveryEvent> {
        self.pending.clear();
        self.listed.clear();
        self.window_open = false;
        let mut gone: Vec<String> = self.known.drain().map(|(uuid, _)| uuid).collect();
        gone.sort();
        gone.into_iter().map(DiscoveryEvent::DeviceRemoved).collect()
    }

    /// Drop `uuid` silently. Its next search response or alive fetches the
    /// description again; an in-flight fetch for it is discarded.
    pub fn forget(&mut self, uuid: &str) -> bool {
        let pending = self.pending.remove(uuid);
        self.listed.remove(uuid);
        self.known.remove(uuid).is_some() || pending
    }

    pub fn known(&self) -> impl Iterator<Item = &DiscoveredDevice> {
        self.known.values()
    }

    pub fn is_known(&self, uuid: &str) -> bool {
        self.known.contains_key(uuid)
    }
}

/// What the worker should do after a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerOutput {
    None,
    Fetch(FetchRequest),
    Event(DiscoveryEvent),
}
