//! OpenHome Product `SourceXml`.

use serde::Deserialize;

use crate::error::ParseResult;
use crate::xml_decode;

/// One input source of an OpenHome product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Source {
    #[serde(rename = "Name")]
    pub name: String,
    /// `Playlist`, `Radio`, `Receiver`, `UpnpAv`, ...
    #[serde(rename = "Type")]
    pub source_type: String,
    #[serde(rename = "Visible", default, deserialize_with = "deserialize_flag")]
    pub visible: bool,
}

#[derive(Debug, Deserialize)]
struct SourceListXml {
    #[serde(rename = "Source", default)]
    sources: Vec<Source>,
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    ))
}

/// Parse the `SourceXml` of a Product service.
pub fn parse_source_list(xml: &str) -> ParseResult<Vec<Source>> {
    let list: SourceListXml = xml_decode::parse(xml)?;
    Ok(list.sources)
}

/// Index of the first Playlist-type source.
pub fn playlist_source_index(sources: &[Source]) -> Option<usize> {
    sources
        .iter()
        .position(|s| s.source_type.eq_ignore_ascii_case("Playlist"))
}
