//! Configuration for the control point runtime

use std::time::Duration;

/// Timing and paging knobs shared by every device the control point drives.
///
/// The defaults match what UPnP AV and OpenHome devices in the field expect;
/// tests shrink the timeouts.
#[derive(Debug, Clone)]
pub struct ControlPointConfig {
    /// Deadline for an ordinary SOAP command
    ///
    /// Default: 15 seconds
    pub command_timeout: Duration,

    /// Deadline for a liveness ping after a transport failure
    ///
    /// Default: 1 second
    pub ping_timeout: Duration,

    /// Lease requested in SUBSCRIBE, in seconds
    ///
    /// Default: 1800 (30 minutes)
    pub subscription_lease: u32,

    /// Interval of the per-device renewal timer
    ///
    /// Default: 29 minutes, one minute inside the lease
    pub renewal_interval: Duration,

    /// How long a play request may wait for content to populate
    ///
    /// Default: 15 seconds
    pub play_timeout: Duration,

    /// `RequestedCount` for Browse pages
    ///
    /// Default: 500
    pub browse_page_size: u32,

    /// `RequestedCount` for Search pages
    ///
    /// Default: 100
    pub search_page_size: u32,

    /// Maximum number of results fetched for one search
    ///
    /// Default: 2000
    pub search_result_cap: u32,

    /// Ids per OpenHome `ReadList` call
    ///
    /// Default: 20
    pub read_list_batch: usize,

    /// Number of startup polls spent waiting for the remembered device
    ///
    /// Default: 50
    pub startup_polls: u32,

    /// Interval between startup polls
    ///
    /// Default: 100 milliseconds
    pub startup_poll_interval: Duration,

    /// Lifetime of a status message that is not replaced
    ///
    /// Default: 5 seconds
    pub status_expiry: Duration,

    /// Port for the event callback server; `None` reuses the remembered port
    ///
    /// Default: None
    pub event_port: Option<u16>,
}

impl Default for ControlPointConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(15),
            ping_timeout: Duration::from_secs(1),
            subscription_lease: 1800,
            renewal_interval: Duration::from_secs(29 * 60),
            play_timeout: Duration::from_secs(15),
            browse_page_size: 500,
            search_page_size: 100,
            search_result_cap: 2000,
            read_list_batch: 20,
            startup_polls: 50,
            startup_poll_interval: Duration::from_millis(100),
            status_expiry: Duration::from_secs(5),
            event_port: None,
        }
    }
}

impl ControlPointConfig {
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn with_play_timeout(mut self, timeout: Duration) -> Self {
        self.play_timeout = timeout;
        self
    }

    pub fn with_browse_page_size(mut self, size: u32) -> Self {
        self.browse_page_size = size;
        self
    }

    pub fn with_search_page_size(mut self, size: u32) -> Self {
        self.search_page_size = size;
        self
    }

    pub fn with_startup_polls(mut self, polls: u32, interval: Duration) -> Self {
        self.startup_polls = polls;
        self.startup_poll_interval = interval;
        self
    }

    pub fn with_status_expiry(mut self, expiry: Duration) -> Self {
        self.status_expiry = expiry;
        self
    }

    pub fn with_event_port(mut self, port: u16) -> Self {
        self.event_port = Some(port);
        self
    }

    /// Total time spent preferring the remembered device at startup.
    pub fn startup_grace(&self) -> Duration {
        self.startup_poll_interval * self.startup_polls
    }
}
