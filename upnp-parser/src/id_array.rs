//! OpenHome id arrays: base64 of consecutive big-endian u32 track ids.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{ParseError, ParseResult};

/// Decode an id array. Whitespace is ignored; an empty string is an empty array.
pub fn decode_id_array(encoded: &str) -> ParseResult<Vec<u32>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Ok(Vec::new());
    }

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ParseError::InvalidIdArray(e.to_string()))?;
    if bytes.len() % 4 != 0 {
        return Err(ParseError::InvalidIdArray(format!(
            "length {} is not a multiple of 4",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|word| u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
        .collect())
}

/// Encode ids the way a Playlist service would report them.
pub fn encode_id_array(ids: &[u32]) -> String {
    let bytes: Vec<u8> = ids.iter().flat_map(|id| id.to_be_bytes()).collect();
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_array() {
        // 00000005 00000006 00000007
        assert_eq!(decode_id_array("AAAABQAAAAYAAAAH").unwrap(), vec![5, 6, 7]);
    }

    #[test]
    fn test_decode_empty_and_whitespace() {
        assert!(decode_id_array("").unwrap().is_empty());
        assert_eq!(decode_id_array(" AAAA\nBQ== ").unwrap(), vec![5]);
    }

    #[test]
    fn test_decode_rejects_partial_words() {
        // three bytes
        assert!(matches!(
            decode_id_array("AAAA"),
            Err(ParseError::InvalidIdArray(_))
        ));
        assert!(decode_id_array("!!!").is_err());
    }

    #[test]
    fn test_encode_matches_decode() {
        let ids = [1, 0xdead_beef, 42];
        assert_eq!(decode_id_array(&encode_id_array(&ids)).unwrap(), ids);
        assert_eq!(encode_id_array(&[5, 6, 7]), "AAAABQAAAAYAAAAH");
    }
}
