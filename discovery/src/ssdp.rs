//! SSDP datagram construction and classification.

/// SSDP multicast group.
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";
/// SSDP port.
pub const SSDP_PORT: u16 = 1900;
/// Search target used for every M-SEARCH.
pub const ROOT_DEVICE: &str = "upnp:rootdevice";

const ROOT_DEVICE_SUFFIX: &str = "::upnp:rootdevice";

/// An inbound SSDP datagram this control point cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsdpMessage {
    /// Unicast `HTTP/1.1 200 OK` reply to an M-SEARCH
    SearchResponse { usn: String, location: String },
    /// `NOTIFY` with `NTS: ssdp:alive`
    Alive { usn: String, location: String },
    /// `NOTIFY` with `NTS: ssdp:byebye`
    ByeBye { usn: String },
}

impl SsdpMessage {
    pub fn usn(&self) -> &str {
        match self {
            SsdpMessage::SearchResponse { usn, .. }
            | SsdpMessage::Alive { usn, .. }
            | SsdpMessage::ByeBye { usn } => usn,
        }
    }
}

/// Build an M-SEARCH request for `search_target`.
pub fn build_msearch(search_target: &str, mx: u32) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {SSDP_MULTICAST_ADDR}:{SSDP_PORT}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {search_target}\r\n\
         USER-AGENT: avcp/0.1 UPnP/1.1\r\n\
         \r\n",
        mx.max(1)
    )
}

/// Classify a datagram. Anything malformed or irrelevant yields `None`.
///
/// M-SEARCH requests from other control points are ignored, as are
/// `ssdp:update` notifications.
pub fn parse_message(datagram: &str) -> Option<SsdpMessage> {
    let mut lines = datagram.lines();
    let start = lines.next()?.trim();

    let mut location = None;
    let mut usn = None;
    let mut nts = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match name.trim().to_ascii_uppercase().as_str() {
            "LOCATION" => location = Some(value),
            "USN" => usn = Some(value),
            "NTS" => nts = Some(value),
            _ => {}
        }
    }

    let usn = usn.filter(|u| !u.is_empty())?;
    if start.starts_with("HTTP/") {
        if !start.split_whitespace().nth(1).is_some_and(|code| code == "200") {
            return None;
        }
        return Some(SsdpMessage::SearchResponse {
            usn,
            location: location.filter(|l| !l.is_empty())?,
        });
    }

    if start.to_ascii_uppercase().starts_with("NOTIFY") {
        return match nts.as_deref() {
            Some("ssdp:alive") => Some(SsdpMessage::Alive {
                usn,
                location: location.filter(|l| !l.is_empty())?,
            }),
            Some("ssdp:byebye") => Some(SsdpMessage::ByeBye { usn }),
            _ => None,
        };
    }

    None
}

/// Bare device uuid of a USN (`uuid:XXXX::urn:...` → `XXXX`).
pub fn usn_uuid(usn: &str) -> Option<&str> {
    let rest = usn.trim().strip_prefix("uuid:")?;
    let uuid = rest.split("::").next().unwrap_or(rest);
    (!uuid.is_empty()).then_some(uuid)
}

/// Whether the USN announces a root device (`uuid:XXXX::upnp:rootdevice`).
pub fn is_root_device(usn: &str) -> bool {
    usn.trim().ends_with(ROOT_DEVICE_SUFFIX)
}
