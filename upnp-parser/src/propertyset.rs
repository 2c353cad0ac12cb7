//! GENA event bodies.
//!
//! UPnP events are wrapped in a propertyset structure:
//! ```xml
//! <e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
//!   <e:property><IdArray>AAAABQ==</IdArray></e:property>
//!   <e:property><TransportState>Playing</TransportState></e:property>
//! </e:propertyset>
//! ```
//! Services that batch their state into `LastChange` (RenderingControl,
//! AVTransport) carry an escaped `<Event>` document instead; see
//! [`parse_last_change`].

use std::borrow::Cow;

use crate::error::{ParseError, ParseResult};
use crate::xml_decode::{child_elements, parse_tree};

/// Flatten a property set into `(variable, value)` pairs in document order.
///
/// Values are not trimmed: an id array or a DIDL blob is passed through as is.
pub fn parse_property_set(xml: &str) -> ParseResult<Vec<(String, String)>> {
    let root = parse_tree(xml)?;
    if root.name != "propertyset" {
        return Err(ParseError::MissingRequiredElement("propertyset".to_string()));
    }

    Ok(child_elements(&root)
        .filter(|e| e.name == "property")
        .flat_map(child_elements)
        .map(|variable| {
            (
                variable.name.clone(),
                variable.get_text().map(Cow::into_owned).unwrap_or_default(),
            )
        })
        .collect())
}

/// Decode a `LastChange` document into `(variable, val)` pairs of instance 0.
///
/// Per-channel variables (`Volume`, `Mute`) only report the `Master` channel.
///
/// ```xml
/// <Event xmlns="urn:schemas-upnp-org:metadata-1-0/RCS/">
///   <InstanceID val="0">
///     <Volume channel="Master" val="20"/>
///     <Mute channel="Master" val="0"/>
///   </InstanceID>
/// </Event>
/// ```
pub fn parse_last_change(xml: &str) -> ParseResult<Vec<(String, String)>> {
    let root = parse_tree(xml)?;
    let instance = child_elements(&root)
        .find(|e| {
            e.name == "InstanceID" && e.attributes.get("val").map(String::as_str).unwrap_or("0") == "0"
        })
        .ok_or_else(|| ParseError::MissingRequiredElement("InstanceID".to_string()))?;

    Ok(child_elements(instance)
        .filter(|e| {
            e.attributes
                .get("channel")
                .map_or(true, |c| c.eq_ignore_ascii_case("Master"))
        })
        .filter_map(|e| {
            e.attributes
                .get("val")
                .map(|val| (e.name.clone(), val.clone()))
        })
        .collect())
}

/// One `(container id, update id)` pair of a `ContainerUpdateIDs` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerUpdate {
    pub container_id: String,
    pub update_id: String,
}

/// Split a `ContainerUpdateIDs` value (`id,version,id,version,...`).
///
/// Returns `None` for a list with an odd number of fields; such an update is
/// dropped as a whole.
pub fn parse_container_update_ids(value: &str) -> Option<Vec<ContainerUpdate>> {
    let value = value.trim();
    if value.is_empty() {
        return Some(Vec::new());
    }

    let fields: Vec<&str> = value.split(',').collect();
    if fields.len() % 2 != 0 {
        return None;
    }

    Some(
        fields
            .chunks_exact(2)
            .map(|pair| ContainerUpdate {
                container_id: pair[0].trim().to_string(),
                update_id: pair[1].trim().to_string(),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_property_set() {
        let xml = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property><SystemUpdateID>42</SystemUpdateID></e:property>
  <e:property><ContainerUpdateIDs>1$4,7</ContainerUpdateIDs></e:property>
</e:propertyset>"#;

        let vars = parse_property_set(xml).unwrap();
        assert_eq!(
            vars,
            vec![
                ("SystemUpdateID".to_string(), "42".to_string()),
                ("ContainerUpdateIDs".to_string(), "1$4,7".to_string()),
            ]
        );
    }

    #[test]
    fn test_property_set_wrong_root() {
        assert!(parse_property_set("<Envelope/>").is_err());
    }

    #[test]
    fn test_parse_last_change_master_only() {
        let xml = r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/RCS/"><InstanceID val="0"><Volume channel="Master" val="20"/><Volume channel="LF" val="5"/><Mute channel="Master" val="1"/><PresetNameList val="FactoryDefaults"/></InstanceID></Event>"#;

        let vars = parse_last_change(xml).unwrap();
        assert_eq!(
            vars,
            vec![
                ("Volume".to_string(), "20".to_string()),
                ("Mute".to_string(), "1".to_string()),
                ("PresetNameList".to_string(), "FactoryDefaults".to_string()),
            ]
        );
    }

    #[test]
    fn test_container_update_ids() {
        let updates = parse_container_update_ids("1$4,7,64,2").unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].container_id, "1$4");
        assert_eq!(updates[1].update_id, "2");

        assert!(parse_container_update_ids("1$4,7,64").is_none());
        assert_eq!(parse_container_update_ids(""), Some(Vec::new()));
    }
}
