//! Integration tests for the discovery flow without multicast: datagrams are
//! fed to the tracker by hand and descriptions are served by a mock server.

use std::time::Duration;

use soap_client::SoapClient;
use upnp_discovery::ssdp::parse_message;
use upnp_discovery::tracker::{DiscoveryTracker, TrackerOutput};
use upnp_discovery::{fetch_description, DiscoveryError, DiscoveryEvent, CONTENT_DIRECTORY};

const MEDIA_SERVER_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
    <friendlyName>Music Library</friendlyName>
    <manufacturer>MiniDLNA</manufacturer>
    <modelName>Windows Media Connect compatible</modelName>
    <UDN>uuid:X</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ContentDirectory</serviceId>
        <controlURL>/ctl/ContentDir</controlURL>
        <eventSubURL>/evt/ContentDir</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

#[tokio::test]
async fn test_search_response_then_byebye() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/desc.xml")
        .with_status(200)
        .with_header("content-type", "text/xml")
        .with_body(MEDIA_SERVER_XML)
        .expect(1)
        .create_async()
        .await;

    let location = format!("{}/desc.xml", server.url());
    let datagram = format!(
        "HTTP/1.1 200 OK\r\nCACHE-CONTROL: max-age=1800\r\nLOCATION: {location}\r\nST: upnp:rootdevice\r\nUSN: uuid:X::upnp:rootdevice\r\n\r\n"
    );

    let client = SoapClient::new().unwrap();
    let mut tracker = DiscoveryTracker::new();
    tracker.begin_window();

    let mut events = Vec::new();
    // The same response arriving twice must not start a second fetch
    let mut fetches = Vec::new();
    for _ in 0..2 {
        let message = parse_message(&datagram).unwrap();
        if let TrackerOutput::Fetch(fetch) = tracker.handle_message(&message) {
            fetches.push(fetch);
        }
    }
    assert_eq!(fetches.len(), 1);

    for fetch in fetches {
        let result = fetch_description(&client, &fetch.location, Duration::from_secs(5)).await;
        events.extend(tracker.fetch_completed(&fetch.uuid, result));
    }

    mock.assert_async().await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        DiscoveryEvent::DeviceAdded(device) => {
            assert_eq!(device.uuid, "X");
            assert_eq!(device.name, "Music Library");
            assert_eq!(device.services.len(), 1);
            let cd = device.service(CONTENT_DIRECTORY).unwrap();
            assert_eq!(cd.control_url, format!("{}/ctl/ContentDir", server.url()));
        }
        other => panic!("expected DeviceAdded, got {other:?}"),
    }

    let byebye = "NOTIFY * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nNT: upnp:rootdevice\r\nNTS: ssdp:byebye\r\nUSN: uuid:X::upnp:rootdevice\r\n\r\n";
    let output = tracker.handle_message(&parse_message(byebye).unwrap());
    assert_eq!(
        output,
        TrackerOutput::Event(DiscoveryEvent::DeviceRemoved("X".to_string()))
    );

    // Nothing more until the device is rediscovered
    assert_eq!(
        tracker.handle_message(&parse_message(byebye).unwrap()),
        TrackerOutput::None
    );
    assert!(tracker.end_window().is_empty());
}

#[tokio::test]
async fn test_failed_description_fetch() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/desc.xml")
        .with_status(404)
        .create_async()
        .await;

    let client = SoapClient::new().unwrap();
    let result = fetch_description(
        &client,
        &format!("{}/desc.xml", server.url()),
        Duration::from_secs(5),
    )
    .await;

    assert!(matches!(result, Err(DiscoveryError::NetworkError(_))));
}
