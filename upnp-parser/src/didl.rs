//! DIDL-Lite structures for ContentDirectory and OpenHome metadata.
//!
//! DIDL-Lite example:
//! ```xml
//! <DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/"
//!            xmlns:dc="http://purl.org/dc/elements/1.1/"
//!            xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">
//!   <container id="1$4" parentID="1" childCount="12">
//!     <dc:title>Albums</dc:title>
//!     <upnp:class>object.container.storageFolder</upnp:class>
//!   </container>
//!   <item id="1$4$7" parentID="1$4">
//!     <dc:title>Song Title</dc:title>
//!     <upnp:artist role="AlbumArtist">Artist Name</upnp:artist>
//!     <upnp:album>Album Name</upnp:album>
//!     <res duration="0:03:58" protocolInfo="http-get:*:audio/flac:*">http://host/7.flac</res>
//!   </item>
//! </DIDL-Lite>
//! ```

use std::borrow::Cow;

use quick_xml::escape::escape;
use xmltree::Element;

use crate::error::{ParseError, ParseResult};
use crate::time::{format_duration, parse_duration};
use crate::xml_decode::{child_elements, child_text, parse_tree};

/// Opening tag used when writing metadata for `Insert`.
const DIDL_OPEN: &str = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">"#;

/// Whether a DIDL object is a `<container>` or an `<item>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Container,
    Item,
}

/// A `<res>` element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DidlResource {
    /// The resource URI
    pub uri: String,
    /// `protocolInfo` attribute, if present
    pub protocol_info: Option<String>,
    /// `duration` attribute in `H:MM:SS[.fff]` format
    pub duration: Option<String>,
    /// Every attribute as sent by the server, sorted by name
    pub attributes: Vec<(String, String)>,
}

impl DidlResource {
    /// Duration in whole seconds.
    pub fn duration_seconds(&self) -> Option<u32> {
        self.duration.as_deref().and_then(parse_duration)
    }
}

/// One `<container>` or `<item>` from a DIDL-Lite document.
#[derive(Debug, Clone, PartialEq)]
pub struct DidlObject {
    pub kind: ObjectKind,
    pub id: String,
    pub parent_id: String,
    /// `childCount` on containers, when the server reports it
    pub child_count: Option<u32>,
    pub title: String,
    /// `upnp:class`, e.g. `object.item.audioItem.musicTrack`
    pub class: String,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    /// `dc:date` as sent; see [`DidlObject::year`]
    pub date: Option<String>,
    pub album_art_uri: Option<String>,
    pub resources: Vec<DidlResource>,
}

impl DidlObject {
    /// Empty item, mostly for building metadata from local data.
    pub fn item(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::Item,
            id: id.into(),
            parent_id: String::new(),
            child_count: None,
            title: title.into(),
            class: "object.item.audioItem.musicTrack".to_string(),
            artist: None,
            album_artist: None,
            album: None,
            genre: None,
            track_number: None,
            date: None,
            album_art_uri: None,
            resources: Vec::new(),
        }
    }

    fn from_element(kind: ObjectKind, element: &Element) -> Self {
        let mut artist = None;
        let mut album_artist = None;
        for node in child_elements(element).filter(|e| e.name == "artist") {
            let Some(text) = node.get_text().map(Cow::into_owned) else {
                continue;
            };
            let text = text.trim().to_string();
            match node.attributes.get("role").map(String::as_str) {
                Some(role) if role.eq_ignore_ascii_case("AlbumArtist") => {
                    album_artist.get_or_insert(text);
                }
                _ => {
                    artist.get_or_insert(text);
                }
            }
        }
        if artist.is_none() {
            artist = child_text(element, "creator");
        }

        let resources = child_elements(element)
            .filter(|e| e.name == "res")
            .map(|res| {
                let mut attributes: Vec<(String, String)> = res
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                attributes.sort();
                DidlResource {
                    uri: res
                        .get_text()
                        .map(|t| t.trim().to_string())
                        .unwrap_or_default(),
                    protocol_info: res.attributes.get("protocolInfo").cloned(),
                    duration: res.attributes.get("duration").cloned(),
                    attributes,
                }
            })
            .collect();

        Self {
            kind,
            id: element.attributes.get("id").cloned().unwrap_or_default(),
            parent_id: element.attributes.get("parentID").cloned().unwrap_or_default(),
            child_count: element
                .attributes
                .get("childCount")
                .and_then(|c| c.trim().parse().ok()),
            title: child_text(element, "title").unwrap_or_default(),
            class: child_text(element, "class").unwrap_or_default(),
            artist,
            album_artist,
            album: child_text(element, "album"),
            genre: child_text(element, "genre"),
            track_number: child_text(element, "originalTrackNumber").and_then(|n| n.parse().ok()),
            date: child_text(element, "date"),
            album_art_uri: child_text(element, "albumArtURI"),
            resources,
        }
    }

    /// First resource, which is the one a renderer is given.
    pub fn primary_resource(&self) -> Option<&DidlResource> {
        self.resources.first()
    }

    /// Four-digit year from `dc:date` (`2001`, `2001-05-03`, ...).
    pub fn year(&self) -> Option<u32> {
        let date = self.date.as_deref()?;
        date.get(..4).and_then(|y| y.parse().ok())
    }

    /// Serialize as a standalone single-item DIDL-Lite document.
    ///
    /// This is the `Metadata` argument OpenHome `Insert` expects.
    pub fn to_metadata_xml(&self) -> String {
        let mut xml = String::from(DIDL_OPEN);
        let tag = match self.kind {
            ObjectKind::Container => "container",
            ObjectKind::Item => "item",
        };
        xml.push_str(&format!(
            r#"<{tag} id="{}" parentID="{}" restricted="1">"#,
            escape(self.id.as_str()),
            escape(self.parent_id.as_str())
        ));

        push_element(&mut xml, "dc:title", Some(&self.title));
        push_element(&mut xml, "upnp:class", Some(&self.class));
        if let Some(artist) = &self.artist {
            push_element(&mut xml, "dc:creator", Some(artist));
            push_element(&mut xml, "upnp:artist", Some(artist));
        }
        if let Some(album_artist) = &self.album_artist {
            xml.push_str(&format!(
                r#"<upnp:artist role="AlbumArtist">{}</upnp:artist>"#,
                escape(album_artist.as_str())
            ));
        }
        push_element(&mut xml, "upnp:album", self.album.as_ref());
        push_element(&mut xml, "upnp:genre", self.genre.as_ref());
        push_element(
            &mut xml,
            "upnp:originalTrackNumber",
            self.track_number.map(|n| n.to_string()).as_ref(),
        );
        push_element(&mut xml, "dc:date", self.date.as_ref());
        push_element(&mut xml, "upnp:albumArtURI", self.album_art_uri.as_ref());

        for res in &self.resources {
            xml.push_str("<res");
            let mut attributes = res.attributes.clone();
            if let Some(info) = &res.protocol_info {
                if !attributes.iter().any(|(k, _)| k == "protocolInfo") {
                    attributes.push(("protocolInfo".to_string(), info.clone()));
                }
            }
            if let Some(duration) = &res.duration {
                if !attributes.iter().any(|(k, _)| k == "duration") {
                    attributes.push(("duration".to_string(), duration.clone()));
                }
            }
            for (name, value) in &attributes {
                xml.push_str(&format!(r#" {name}="{}""#, escape(value.as_str())));
            }
            xml.push('>');
            xml.push_str(&escape(res.uri.as_str()));
            xml.push_str("</res>");
        }

        xml.push_str(&format!("</{tag}></DIDL-Lite>"));
        xml
    }
}

fn push_element(xml: &mut String, name: &str, value: Option<&String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        xml.push_str(&format!("<{name}>{}</{name}>", escape(value.as_str())));
    }
}

/// A parsed DIDL-Lite document, objects in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DidlLite {
    pub objects: Vec<DidlObject>,
}

impl DidlLite {
    /// Parse DIDL-Lite XML content.
    ///
    /// Unknown child elements of the root are ignored. An empty string parses
    /// to an empty document since some servers send nothing for empty pages.
    pub fn from_xml(xml: &str) -> ParseResult<Self> {
        if xml.trim().is_empty() {
            return Ok(Self::default());
        }
        let root = parse_tree(xml)?;
        if root.name != "DIDL-Lite" {
            return Err(ParseError::MissingRequiredElement("DIDL-Lite".to_string()));
        }

        let objects = child_elements(&root)
            .filter_map(|element| match element.name.as_str() {
                "container" => Some(DidlObject::from_element(ObjectKind::Container, element)),
                "item" => Some(DidlObject::from_element(ObjectKind::Item, element)),
                _ => None,
            })
            .collect();

        Ok(Self { objects })
    }

    /// First object, for single-item metadata blobs.
    pub fn first(&self) -> Option<&DidlObject> {
        self.objects.first()
    }
}

/// Build minimal metadata for a bare URI with only a title.
pub fn minimal_metadata(title: &str, uri: &str, duration_seconds: Option<u32>) -> String {
    let mut object = DidlObject::item("", title);
    object.resources.push(DidlResource {
        uri: uri.to_string(),
        protocol_info: Some("http-get:*:*:*".to_string()),
        duration: duration_seconds.map(format_duration),
        attributes: Vec::new(),
    });
    object.to_metadata_xml()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BROWSE_PAGE: &str = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">
<container id="1$4" parentID="1" childCount="12" restricted="1"><dc:title>Albums</dc:title><upnp:class>object.container.storageFolder</upnp:class></container>
<item id="1$4$7" parentID="1$4" restricted="1"><dc:title>Song &amp; Dance</dc:title><dc:creator>Creator</dc:creator><upnp:artist role="AlbumArtist">Band</upnp:artist><upnp:artist role="Performer">Singer</upnp:artist><upnp:album>Record</upnp:album><upnp:genre>Rock</upnp:genre><upnp:originalTrackNumber>3</upnp:originalTrackNumber><dc:date>1999-04-01</dc:date><upnp:albumArtURI>http://host/art.jpg</upnp:albumArtURI><res duration="0:03:58.000" protocolInfo="http-get:*:audio/flac:*" size="1234">http://host/7.flac</res></item>
</DIDL-Lite>"#;

    #[test]
    fn test_parse_browse_page() {
        let didl = DidlLite::from_xml(BROWSE_PAGE).unwrap();
        assert_eq!(didl.objects.len(), 2);

        let folder = &didl.objects[0];
        assert_eq!(folder.kind, ObjectKind::Container);
        assert_eq!(folder.id, "1$4");
        assert_eq!(folder.child_count, Some(12));
        assert_eq!(folder.class, "object.container.storageFolder");

        let track = &didl.objects[1];
        assert_eq!(track.kind, ObjectKind::Item);
        assert_eq!(track.title, "Song & Dance");
        assert_eq!(track.artist.as_deref(), Some("Singer"));
        assert_eq!(track.album_artist.as_deref(), Some("Band"));
        assert_eq!(track.album.as_deref(), Some("Record"));
        assert_eq!(track.genre.as_deref(), Some("Rock"));
        assert_eq!(track.track_number, Some(3));
        assert_eq!(track.year(), Some(1999));

        let res = track.primary_resource().unwrap();
        assert_eq!(res.uri, "http://host/7.flac");
        assert_eq!(res.duration_seconds(), Some(238));
        assert!(res.attributes.contains(&("size".to_string(), "1234".to_string())));
    }

    #[test]
    fn test_creator_used_when_no_artist() {
        let xml = r#"<DIDL-Lite xmlns:dc="http://purl.org/dc/elements/1.1/"><item id="1" parentID="0"><dc:title>T</dc:title><dc:creator>Someone</dc:creator></item></DIDL-Lite>"#;
        let didl = DidlLite::from_xml(xml).unwrap();
        assert_eq!(didl.objects[0].artist.as_deref(), Some("Someone"));
    }

    #[test]
    fn test_empty_and_invalid_documents() {
        assert!(DidlLite::from_xml("").unwrap().objects.is_empty());
        assert!(DidlLite::from_xml("<invalid>not didl-lite</invalid>").is_err());
    }

    #[test]
    fn test_metadata_xml_parses_back() {
        let didl = DidlLite::from_xml(BROWSE_PAGE).unwrap();
        let track = &didl.objects[1];
        let xml = track.to_metadata_xml();

        assert!(xml.contains("Song &amp; Dance"));
        let reparsed = DidlLite::from_xml(&xml).unwrap();
        let copy = reparsed.first().unwrap();
        assert_eq!(copy.title, track.title);
        assert_eq!(copy.album_artist, track.album_artist);
        assert_eq!(copy.primary_resource().unwrap().uri, "http://host/7.flac");
    }

    #[test]
    fn test_minimal_metadata() {
        let xml = minimal_metadata("Stream", "http://radio/stream", Some(65));
        let didl = DidlLite::from_xml(&xml).unwrap();
        let item = didl.first().unwrap();
        assert_eq!(item.title, "Stream");
        assert_eq!(item.primary_resource().unwrap().duration.as_deref(), Some("0:01:05"));
    }
}
