//! Discovery configuration.

use std::time::Duration;

use crate::ssdp::SSDP_PORT;

/// Timing and socket settings for the discovery worker.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Period between M-SEARCH passes; the first pass is immediate
    pub search_interval: Duration,
    /// How long after a search a device must have answered to stay known
    pub listing_window: Duration,
    /// MX value sent in M-SEARCH
    pub mx: u32,
    /// Deadline for one description fetch
    pub fetch_timeout: Duration,
    /// Local UDP port; 1900 so NOTIFYs are received too
    pub port: u16,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_interval: Duration::from_secs(30),
            listing_window: Duration::from_secs(8),
            mx: 3,
            fetch_timeout: Duration::from_secs(5),
            port: SSDP_PORT,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_search_interval(mut self, interval: Duration) -> Self {
        self.search_interval = interval;
        self
    }

    pub fn with_listing_window(mut self, window: Duration) -> Self {
        self.listing_window = window;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}
