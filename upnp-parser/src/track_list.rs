//! OpenHome Playlist `ReadList` responses.
//!
//! ```xml
//! <TrackList>
//!   <Entry><Id>5</Id><Uri>http://host/5.flac</Uri><Metadata>&lt;DIDL-Lite...</Metadata></Entry>
//! </TrackList>
//! ```

use serde::Deserialize;

use crate::didl::{DidlLite, DidlObject};
use crate::error::ParseResult;
use crate::xml_decode;

#[derive(Debug, Deserialize)]
struct TrackListXml {
    #[serde(rename = "Entry", default)]
    entries: Vec<EntryXml>,
}

#[derive(Debug, Deserialize)]
struct EntryXml {
    #[serde(rename = "Id")]
    id: u32,
    #[serde(rename = "Uri", default)]
    uri: String,
    #[serde(rename = "Metadata", default)]
    metadata: String,
}

/// One track of a playlist as returned by `ReadList`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEntry {
    pub id: u32,
    pub uri: String,
    /// Parsed metadata; `None` when the device stored none or it was unreadable
    pub metadata: Option<DidlObject>,
}

/// Parse the `TrackList` argument of a `ReadList` response.
///
/// Entries whose metadata fails to parse are kept with `metadata: None` so the
/// row still shows its URI.
pub fn parse_track_list(xml: &str) -> ParseResult<Vec<TrackEntry>> {
    let list: TrackListXml = xml_decode::parse(xml)?;
    Ok(list
        .entries
        .into_iter()
        .map(|entry| TrackEntry {
            id: entry.id,
            metadata: DidlLite::from_xml(&entry.metadata)
                .ok()
                .and_then(|didl| didl.objects.into_iter().next()),
            uri: entry.uri,
        })
        .collect())
}

/// Space-separated id list for the `IdList` argument of `ReadList`.
pub fn format_id_list(ids: &[u32]) -> String {
    ids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_track_list() {
        let xml = r#"<TrackList><Entry><Id>5</Id><Uri>http://host/5.flac</Uri><Metadata>&lt;DIDL-Lite xmlns:dc="http://purl.org/dc/elements/1.1/"&gt;&lt;item id="x" parentID="y"&gt;&lt;dc:title&gt;Five&lt;/dc:title&gt;&lt;/item&gt;&lt;/DIDL-Lite&gt;</Metadata></Entry><Entry><Id>6</Id><Uri>http://host/6.flac</Uri><Metadata></Metadata></Entry></TrackList>"#;

        let entries = parse_track_list(xml).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, 5);
        assert_eq!(entries[0].metadata.as_ref().unwrap().title, "Five");
        assert_eq!(entries[1].uri, "http://host/6.flac");
        assert!(entries[1].metadata.is_none());
    }

    #[test]
    fn test_parse_empty_track_list() {
        assert!(parse_track_list("<TrackList></TrackList>").unwrap().is_empty());
    }

    #[test]
    fn test_format_id_list() {
        assert_eq!(format_id_list(&[1, 2, 30]), "1 2 30");
        assert_eq!(format_id_list(&[]), "");
    }
}
