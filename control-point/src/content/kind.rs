//! What a content node is.

use upnp_parser::{format_duration, DidlObject, DidlResource, ObjectKind};

use super::model::Icon;

/// A playable track.
///
/// Display strings are derived from the fields on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MusicTrack {
    pub url: String,
    pub title: String,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub year: Option<u32>,
    pub duration: Option<u32>,
    pub art_url: Option<String>,
    pub protocol_info: Option<String>,
    /// Every attribute of the `<res>` element, passed back verbatim in metadata
    pub resource_attributes: Vec<(String, String)>,
    /// `object.item.audioItem.audioBroadcast` (radio streams)
    pub broadcast: bool,
}

impl MusicTrack {
    /// Track for an audio item. Items without a resource URL cannot be played
    /// and yield `None`.
    pub fn from_didl(object: &DidlObject) -> Option<Self> {
        let resource = object.primary_resource().filter(|r| !r.uri.is_empty())?;
        Some(Self {
            url: resource.uri.clone(),
            title: object.title.clone(),
            artist: object.artist.clone(),
            album_artist: object.album_artist.clone(),
            album: object.album.clone(),
            genre: object.genre.clone(),
            track_number: object.track_number,
            year: object.year(),
            duration: resource.duration_seconds(),
            art_url: object.album_art_uri.clone(),
            protocol_info: resource.protocol_info.clone(),
            resource_attributes: resource.attributes.clone(),
            broadcast: object.class.starts_with("object.item.audioItem.audioBroadcast"),
        })
    }

    /// Track known only by its URL, as a renderer queue may report it.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_didl(&self, id: &str) -> DidlObject {
        let mut object = DidlObject::item(id, self.title.clone());
        if self.broadcast {
            object.class = "object.item.audioItem.audioBroadcast".to_string();
        }
        object.artist = self.artist.clone();
        object.album_artist = self.album_artist.clone();
        object.album = self.album.clone();
        object.genre = self.genre.clone();
        object.track_number = self.track_number;
        object.date = self.year.map(|y| y.to_string());
        object.album_art_uri = self.art_url.clone();
        object.resources.push(DidlResource {
            uri: self.url.clone(),
            protocol_info: self.protocol_info.clone(),
            duration: self.duration.map(format_duration),
            attributes: self.resource_attributes.clone(),
        });
        object
    }

    /// `Metadata` argument for OpenHome `Insert`.
    pub fn metadata_xml(&self) -> String {
        self.to_didl("").to_metadata_xml()
    }

    /// Album artist when the server supplies one, else the track artist.
    pub fn display_artist(&self) -> Option<&str> {
        self.album_artist.as_deref().or(self.artist.as_deref())
    }

    pub fn display_text(&self) -> String {
        if !self.title.is_empty() {
            return self.title.clone();
        }
        self.url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(self.url.as_str())
            .to_string()
    }

    pub fn sub_text(&self) -> Option<String> {
        match (self.artist.as_deref(), self.album.as_deref()) {
            (Some(artist), Some(album)) => Some(format!("{artist} - {album}")),
            (Some(artist), None) => Some(artist.to_string()),
            (None, Some(album)) => Some(album.to_string()),
            (None, None) => None,
        }
    }
}

/// Node payload. Every variant except `Track` is a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    Track(MusicTrack),
    /// Plain container; servers' synthetic folders get a more specific icon
    Folder { icon: Icon },
    Genre,
    Artist,
    Album {
        artist: Option<String>,
        art_url: Option<String>,
    },
    Playlist,
    SearchContainer,
}

impl ContentKind {
    /// Map a DIDL object onto a node kind by `upnp:class`.
    ///
    /// Unknown classes (video, images, unplayable items) yield `None` and are
    /// counted as skipped by the caller.
    pub fn classify(object: &DidlObject) -> Option<Self> {
        let class = object.class.trim();
        match object.kind {
            ObjectKind::Container => {
                if class.starts_with("object.container.genre") {
                    Some(ContentKind::Genre)
                } else if class.starts_with("object.container.person") {
                    Some(ContentKind::Artist)
                } else if class.starts_with("object.container.album") {
                    Some(ContentKind::Album {
                        artist: object.album_artist.clone().or_else(|| object.artist.clone()),
                        art_url: object.album_art_uri.clone(),
                    })
                } else if class.starts_with("object.container.playlistContainer") {
                    Some(ContentKind::Playlist)
                } else if class.starts_with("object.container") {
                    Some(ContentKind::Folder { icon: Icon::Folder })
                } else {
                    None
                }
            }
            ObjectKind::Item => {
                if class.starts_with("object.item.audioItem") {
                    MusicTrack::from_didl(object).map(ContentKind::Track)
                } else {
                    None
                }
            }
        }
    }

    pub fn is_collection(&self) -> bool {
        !matches!(self, ContentKind::Track(_))
    }

    pub fn track(&self) -> Option<&MusicTrack> {
        match self {
            ContentKind::Track(track) => Some(track),
            _ => None,
        }
    }

    pub fn icon(&self) -> Icon {
        match self {
            ContentKind::Track(track) if track.broadcast => Icon::Broadcast,
            ContentKind::Track(_) => Icon::Track,
            ContentKind::Folder { icon } => *icon,
            ContentKind::Genre => Icon::Genre,
            ContentKind::Artist => Icon::Artist,
            ContentKind::Album { .. } => Icon::Album,
            ContentKind::Playlist => Icon::Playlist,
            ContentKind::SearchContainer => Icon::Search,
        }
    }
}
