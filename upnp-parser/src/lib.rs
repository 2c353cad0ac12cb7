//! # upnp-parser
//!
//! XML and binary payload decoding for a UPnP AV / OpenHome control point.
//! Nothing here does I/O; every function takes the text a device sent and
//! returns typed values.
//!
//! - [`didl`]: DIDL-Lite objects from Browse/Search results and track metadata
//! - [`propertyset`]: GENA NOTIFY bodies and `LastChange` documents
//! - [`id_array`]: OpenHome Playlist id arrays
//! - [`track_list`]: OpenHome `ReadList` responses
//! - [`source_list`]: OpenHome Product source lists
//! - [`time`]: `H:MM:SS` durations
//!
//! ```rust
//! use upnp_parser::decode_id_array;
//!
//! assert_eq!(decode_id_array("AAAABQ==").unwrap(), vec![5]);
//! ```

pub mod didl;
pub mod error;
pub mod id_array;
pub mod propertyset;
pub mod source_list;
pub mod time;
pub mod track_list;
pub mod xml_decode;

pub use didl::{minimal_metadata, DidlLite, DidlObject, DidlResource, ObjectKind};
pub use error::{ParseError, ParseResult};
pub use id_array::{decode_id_array, encode_id_array};
pub use propertyset::{
    parse_container_update_ids, parse_last_change, parse_property_set, ContainerUpdate,
};
pub use source_list::{parse_source_list, playlist_source_index, Source};
pub use time::{format_duration, parse_duration};
pub use track_list::{format_id_list, parse_track_list, TrackEntry};
