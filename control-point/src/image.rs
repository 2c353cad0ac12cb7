//! Cover art lookup seam.
//!
//! Fetching and caching images is up to the consumer. The core only hands out
//! descriptors and asks the resolver for whatever it already has.

use std::sync::Arc;

/// What is known about the cover of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoverDescriptor {
    /// `upnp:albumArtURI` of the item or its album
    pub url: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
}

impl CoverDescriptor {
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.album.is_none()
    }
}

/// Opaque image owned by the resolver.
#[derive(Debug, Clone)]
pub struct ImageHandle(pub Arc<dyn std::any::Any + Send + Sync>);

/// Non-blocking image lookup.
///
/// `urgent` marks a request for a visible row. Implementations must return
/// immediately: `None` means "not available yet", and the consumer repaints
/// when its own cache fills.
pub trait CoverResolver: Send + Sync {
    fn cover_image(&self, descriptor: &CoverDescriptor, size: u32, urgent: bool)
        -> Option<ImageHandle>;
}

/// Resolver that never has an image.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCovers;

impl CoverResolver for NoCovers {
    fn cover_image(&self, _: &CoverDescriptor, _: u32, _: bool) -> Option<ImageHandle> {
        None
    }
}
