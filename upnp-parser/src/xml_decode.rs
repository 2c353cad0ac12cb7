//! Shared XML helpers.
//!
//! Two parsing styles are used across the crate: serde deserialization through
//! `quick-xml` for payloads with a fixed shape (track lists, source lists), and
//! an `xmltree` DOM for open-ended documents (DIDL-Lite, property sets) where
//! element names vary. `xmltree` stores the local name separately from the
//! prefix, so lookups by name ignore namespaces.

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use xmltree::{Element, XMLNode};

use crate::error::{ParseError, ParseResult};

/// Deserialize a fixed-shape document with `quick-xml`.
pub fn parse<T: DeserializeOwned>(xml: &str) -> ParseResult<T> {
    quick_xml::de::from_str(xml).map_err(|e| ParseError::XmlDeserializationFailed(e.to_string()))
}

/// Parse a document into an `xmltree` DOM.
pub fn parse_tree(xml: &str) -> ParseResult<Element> {
    Element::parse(xml.trim_start().as_bytes())
        .map_err(|e| ParseError::InvalidXmlStructure(e.to_string()))
}

/// Text of the first child named `name`, trimmed. Empty text counts as absent.
pub fn child_text(element: &Element, name: &str) -> Option<String> {
    element
        .get_child(name)
        .and_then(|child| child.get_text())
        .map(Cow::into_owned)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Iterate over the element children of `element`, skipping text and comments.
pub fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(child) => Some(child),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_text_ignores_prefix() {
        let tree = parse_tree(
            r#"<item xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title> Song </dc:title><dc:date></dc:date></item>"#,
        )
        .unwrap();

        assert_eq!(child_text(&tree, "title"), Some("Song".to_string()));
        assert_eq!(child_text(&tree, "date"), None);
        assert_eq!(child_text(&tree, "missing"), None);
    }

    #[test]
    fn test_parse_tree_rejects_garbage() {
        assert!(matches!(
            parse_tree("<unclosed>"),
            Err(ParseError::InvalidXmlStructure(_))
        ));
    }
}
