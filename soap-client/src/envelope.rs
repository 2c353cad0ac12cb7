//! SOAP 1.1 envelope construction and response extraction.

use std::borrow::Cow;

use quick_xml::escape::escape;
use xmltree::{Element, XMLNode};

use crate::error::SoapError;

/// Namespace of the SOAP 1.1 envelope.
pub const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Encoding style declared on every request envelope.
pub const ENCODING_STYLE: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Build the request envelope for `action` on `service_type`.
///
/// Argument values are XML-escaped; names are written verbatim since they come
/// from service descriptions, not from user data.
pub fn build_envelope(service_type: &str, action: &str, args: &[(&str, &str)]) -> String {
    let mut payload = String::new();
    for (name, value) in args {
        payload.push('<');
        payload.push_str(name);
        payload.push('>');
        payload.push_str(&escape(*value));
        payload.push_str("</");
        payload.push_str(name);
        payload.push('>');
    }

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="{ENVELOPE_NS}" s:encodingStyle="{ENCODING_STYLE}"><s:Body><u:{action} xmlns:u="{service_type}">{payload}</u:{action}></s:Body></s:Envelope>"#
    )
}

/// Value of the `SOAPACTION` header: the quoted `urn#Action` pair.
pub fn soap_action_header(service_type: &str, action: &str) -> String {
    format!("\"{service_type}#{action}\"")
}

/// Walk Envelope→Body→`<Action>Response`.
///
/// A `Fault` in the body is reported as [`SoapError::Fault`] carrying the UPnP
/// error code and description when present.
pub fn extract_response(xml: &Element, action: &str) -> Result<Element, SoapError> {
    let body = xml
        .get_child("Body")
        .ok_or_else(|| SoapError::Parse("Missing SOAP Body".to_string()))?;

    if let Some(fault) = body.get_child("Fault") {
        let upnp_error = fault
            .get_child("detail")
            .and_then(|d| d.get_child("UPnPError").or_else(|| d.get_child("UpnPError")));
        let code = upnp_error
            .and_then(|e| e.get_child("errorCode"))
            .and_then(|c| c.get_text())
            .and_then(|t| t.trim().parse::<u16>().ok())
            .unwrap_or(500);
        let description = upnp_error
            .and_then(|e| e.get_child("errorDescription"))
            .and_then(|c| c.get_text())
            .map(Cow::into_owned)
            .unwrap_or_default();
        return Err(SoapError::Fault { code, description });
    }

    let response_name = format!("{action}Response");
    body.get_child(response_name.as_str())
        .cloned()
        .ok_or(SoapError::MissingResponse(response_name))
}

/// Output arguments of a successful action, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResponse {
    /// Action this response answers
    pub action: String,
    args: Vec<(String, String)>,
}

impl ActionResponse {
    /// Build an empty response, mostly useful for tests and synthetic replies.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            args: Vec::new(),
        }
    }

    /// Append an output argument.
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    /// Flatten the children of an `<Action>Response` element.
    pub fn from_element(action: &str, element: &Element) -> Self {
        let args = element
            .children
            .iter()
            .filter_map(|node| match node {
                XMLNode::Element(child) => Some((
                    child.name.clone(),
                    child.get_text().map(Cow::into_owned).unwrap_or_default(),
                )),
                _ => None,
            })
            .collect();
        Self {
            action: action.to_string(),
            args,
        }
    }

    /// Parse a raw SOAP response body.
    pub fn parse(action: &str, body: &str) -> Result<Self, SoapError> {
        let xml = Element::parse(body.as_bytes()).map_err(|e| SoapError::Parse(e.to_string()))?;
        let response = extract_response(&xml, action)?;
        Ok(Self::from_element(action, &response))
    }

    /// Output argument by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Output argument parsed as an unsigned integer.
    pub fn get_u32(&self, name: &str) -> Option<u32> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// Output argument parsed as a UPnP boolean (`1`/`true`/`yes`).
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            )
        })
    }

    /// All arguments in document order.
    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_envelope_escapes_values() {
        let xml = build_envelope(
            "urn:schemas-upnp-org:service:ContentDirectory:1",
            "Search",
            &[("ContainerID", "0"), ("SearchCriteria", "dc:title contains \"a&b\"")],
        );

        assert!(xml.contains(r#"<u:Search xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">"#));
        assert!(xml.contains("<ContainerID>0</ContainerID>"));
        assert!(xml.contains("a&amp;b"));
        assert!(xml.contains(ENVELOPE_NS));
    }

    #[test]
    fn test_soap_action_header_is_quoted() {
        assert_eq!(
            soap_action_header("urn:av-openhome-org:service:Playlist:1", "IdArray"),
            "\"urn:av-openhome-org:service:Playlist:1#IdArray\""
        );
    }

    #[test]
    fn test_parse_action_response_arguments() {
        let body = r#"<?xml version="1.0"?>
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <u:BrowseResponse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">
                        <Result>&lt;DIDL-Lite/&gt;</Result>
                        <NumberReturned>35</NumberReturned>
                        <TotalMatches>50</TotalMatches>
                        <UpdateID>7</UpdateID>
                    </u:BrowseResponse>
                </s:Body>
            </s:Envelope>"#;

        let response = ActionResponse::parse("Browse", body).unwrap();
        assert_eq!(response.get("Result"), Some("<DIDL-Lite/>"));
        assert_eq!(response.get_u32("NumberReturned"), Some(35));
        assert_eq!(response.get_u32("TotalMatches"), Some(50));
        assert_eq!(response.get("Missing"), None);
    }

    #[test]
    fn test_extract_response_with_soap_fault() {
        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Client</faultcode>
                        <faultstring>UPnPError</faultstring>
                        <detail>
                            <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
                                <errorCode>701</errorCode>
                                <errorDescription>No such object</errorDescription>
                            </UPnPError>
                        </detail>
                    </s:Fault>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match extract_response(&xml, "Browse").unwrap_err() {
            SoapError::Fault { code, description } => {
                assert_eq!(code, 701);
                assert_eq!(description, "No such object");
            }
            other => panic!("Expected SoapError::Fault, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_response_missing_action_response() {
        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <u:OtherResponse xmlns:u="urn:x"/>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match extract_response(&xml, "Play").unwrap_err() {
            SoapError::MissingResponse(name) => assert_eq!(name, "PlayResponse"),
            other => panic!("Expected SoapError::MissingResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_get_bool_variants() {
        let response = ActionResponse::new("Repeat")
            .with_arg("Value", "1")
            .with_arg("Other", "false");
        assert_eq!(response.get_bool("Value"), Some(true));
        assert_eq!(response.get_bool("Other"), Some(false));
        assert_eq!(response.get_bool("Nope"), None);
    }
}
