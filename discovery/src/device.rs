//! Device description parsing.
//!
//! Turns the XML at an SSDP `LOCATION` into a [`DiscoveredDevice`] with every
//! URL resolved to an absolute one.

use serde::Deserialize;
use url::Url;

use crate::error::{DiscoveryError, Result};

/// ContentDirectory service type prefix, version-agnostic.
pub const CONTENT_DIRECTORY: &str = "urn:schemas-upnp-org:service:ContentDirectory:";
/// OpenHome Playlist service type prefix, version-agnostic.
pub const OPENHOME_PLAYLIST: &str = "urn:av-openhome-org:service:Playlist:";

const OPENHOME_NAME_SUFFIX: &str = "(OpenHome)";

/// UPnP device description root element.
#[derive(Debug, Deserialize)]
struct Root {
    #[serde(rename = "URLBase", default)]
    url_base: Option<String>,
    device: DeviceXml,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceXml {
    #[serde(default)]
    device_type: String,
    #[serde(default)]
    friendly_name: String,
    #[serde(default)]
    manufacturer: String,
    #[serde(default)]
    model_name: String,
    #[serde(rename = "UDN", default)]
    udn: String,
    #[serde(default)]
    icon_list: Option<IconListXml>,
    #[serde(default)]
    service_list: Option<ServiceListXml>,
    #[serde(default)]
    device_list: Option<DeviceListXml>,
}

#[derive(Debug, Deserialize)]
struct IconListXml {
    #[serde(rename = "icon", default)]
    icons: Vec<IconXml>,
}

#[derive(Debug, Deserialize)]
struct IconXml {
    #[serde(default)]
    mimetype: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct ServiceListXml {
    #[serde(rename = "service", default)]
    services: Vec<ServiceXml>,
}

#[derive(Debug, Deserialize)]
struct ServiceXml {
    #[serde(rename = "serviceType")]
    service_type: String,
    #[serde(rename = "serviceId", default)]
    service_id: String,
    #[serde(rename = "controlURL", default)]
    control_url: String,
    #[serde(rename = "eventSubURL", default)]
    event_sub_url: String,
}

#[derive(Debug, Deserialize)]
struct DeviceListXml {
    #[serde(rename = "device", default)]
    devices: Vec<DeviceXml>,
}

/// One service of a device, URLs absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub service_type: String,
    pub service_id: String,
    pub control_url: String,
    /// `None` for services that do not event
    pub event_url: Option<String>,
}

/// One icon advertised by the device, URL absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconInfo {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub url: String,
}

/// A device whose description was fetched and parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// UDN without the `uuid:` prefix
    pub uuid: String,
    pub name: String,
    pub device_type: String,
    pub manufacturer: String,
    pub model_name: String,
    /// The description URL from SSDP
    pub location: String,
    /// Base for relative URLs (`URLBase` or the location)
    pub base_url: String,
    /// Host part of the base URL
    pub host: String,
    /// Services of the root device and all embedded devices
    pub services: Vec<ServiceInfo>,
    pub icons: Vec<IconInfo>,
}

impl DiscoveredDevice {
    /// Parse a device description fetched from `location`.
    pub fn from_description(xml: &str, location: &str) -> Result<Self> {
        let root: Root = quick_xml::de::from_str(xml.trim_start())
            .map_err(|e| DiscoveryError::ParseError(format!("Failed to parse device XML: {}", e)))?;

        let base = match root.url_base.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            Some(base) => Url::parse(base),
            None => Url::parse(location),
        }
        .map_err(|e| DiscoveryError::ParseError(format!("Invalid base URL: {}", e)))?;

        let uuid = root
            .device
            .udn
            .trim()
            .trim_start_matches("uuid:")
            .to_string();
        if uuid.is_empty() {
            return Err(DiscoveryError::InvalidDevice(format!(
                "description at {} has no UDN",
                location
            )));
        }

        let mut services = Vec::new();
        collect_services(&root.device, &base, &mut services);

        let icons = root
            .device
            .icon_list
            .iter()
            .flat_map(|list| list.icons.iter())
            .filter_map(|icon| {
                Some(IconInfo {
                    mime_type: icon.mimetype.clone(),
                    width: icon.width,
                    height: icon.height,
                    url: resolve(&base, &icon.url)?,
                })
            })
            .collect();

        Ok(Self {
            uuid,
            name: clean_name(&root.device.friendly_name),
            device_type: root.device.device_type.trim().to_string(),
            manufacturer: root.device.manufacturer.trim().to_string(),
            model_name: root.device.model_name.trim().to_string(),
            location: location.to_string(),
            host: base.host_str().unwrap_or_default().to_string(),
            base_url: base.to_string(),
            services,
            icons,
        })
    }

    /// First service whose type starts with `prefix`.
    pub fn service(&self, prefix: &str) -> Option<&ServiceInfo> {
        self.services
            .iter()
            .find(|s| s.service_type.starts_with(prefix))
    }

    /// Has a ContentDirectory service.
    pub fn is_media_server(&self) -> bool {
        self.service(CONTENT_DIRECTORY).is_some()
    }

    /// Has an OpenHome Playlist service.
    pub fn is_openhome_renderer(&self) -> bool {
        self.service(OPENHOME_PLAYLIST).is_some()
    }

    /// Icon closest to `size` pixels wide, preferring larger ones.
    pub fn best_icon(&self, size: u32) -> Option<&IconInfo> {
        self.icons
            .iter()
            .min_by_key(|icon| (icon.width < size, icon.width.abs_diff(size)))
    }
}

fn collect_services(device: &DeviceXml, base: &Url, out: &mut Vec<ServiceInfo>) {
    for service in device.service_list.iter().flat_map(|l| l.services.iter()) {
        let Some(control_url) = resolve(base, &service.control_url) else {
            continue;
        };
        out.push(ServiceInfo {
            service_type: service.service_type.trim().to_string(),
            service_id: service.service_id.trim().to_string(),
            control_url,
            event_url: resolve(base, &service.event_sub_url),
        });
    }
    for embedded in device.device_list.iter().flat_map(|l| l.devices.iter()) {
        collect_services(embedded, base, out);
    }
}

fn resolve(base: &Url, relative: &str) -> Option<String> {
    let relative = relative.trim();
    if relative.is_empty() {
        return None;
    }
    base.join(relative).ok().map(String::from)
}

/// Trim and drop the `(OpenHome)` suffix some renderers append.
fn clean_name(name: &str) -> String {
    let name = name.trim();
    name.strip_suffix(OPENHOME_NAME_SUFFIX)
        .unwrap_or(name)
        .trim_end()
        .to_string()
}
