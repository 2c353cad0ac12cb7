//! Per-connection NOTIFY request parser.
//!
//! The parser is fed raw bytes as they arrive and moves through
//! `ReadingHeaders → ReadingBody → Done`. It does no I/O itself, which keeps
//! framing and bounds checks testable byte by byte.

use bytes::{Buf, BytesMut};

use crate::error::RequestError;
use crate::NotificationPayload;

/// Size bounds enforced while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Request line plus all headers
    pub max_header_bytes: usize,
    /// Assembled body, after de-chunking
    pub max_body_bytes: usize,
    /// Largest single chunk accepted
    pub max_chunk_size: usize,
    /// Longest chunk-size line, extensions included
    pub max_chunk_line: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_bytes: 16 * 1024,
            max_body_bytes: 1024 * 1024,
            max_chunk_size: 32 * 1024,
            max_chunk_line: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk {
    Size,
    Data(usize),
    DataEnd,
    Trailer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingHeaders,
    ContentLength(usize),
    Chunked(Chunk),
    UntilClose,
    Done,
}

/// Result of feeding bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    NeedMore,
    Complete(NotificationPayload),
}

/// Incremental parser for one NOTIFY request.
#[derive(Debug)]
pub struct RequestParser {
    limits: Limits,
    state: State,
    buf: BytesMut,
    header_bytes: usize,
    request_line_seen: bool,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl RequestParser {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            state: State::ReadingHeaders,
            buf: BytesMut::with_capacity(4096),
            header_bytes: 0,
            request_line_seen: false,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Append received bytes and advance as far as they allow.
    ///
    /// Bytes after a complete request are ignored since every connection
    /// carries exactly one request.
    pub fn feed(&mut self, data: &[u8]) -> Result<Progress, RequestError> {
        if self.state == State::Done {
            return Ok(Progress::NeedMore);
        }
        self.buf.extend_from_slice(data);

        loop {
            match self.state {
                State::ReadingHeaders => {
                    let Some(line) = self.take_line() else {
                        if self.header_bytes + self.buf.len() > self.limits.max_header_bytes {
                            return Err(RequestError::HeadersTooLarge(self.limits.max_header_bytes));
                        }
                        return Ok(Progress::NeedMore);
                    };
                    self.header_bytes += line.len() + 2;
                    if self.header_bytes > self.limits.max_header_bytes {
                        return Err(RequestError::HeadersTooLarge(self.limits.max_header_bytes));
                    }
                    if line.is_empty() {
                        if self.request_line_seen {
                            if let Some(done) = self.begin_body()? {
                                return Ok(done);
                            }
                        }
                    } else {
                        self.header_line(line)?;
                    }
                }
                State::ContentLength(remaining) => {
                    if self.buf.is_empty() {
                        return Ok(Progress::NeedMore);
                    }
                    let take = remaining.min(self.buf.len());
                    self.body.extend_from_slice(&self.buf[..take]);
                    self.buf.advance(take);
                    if remaining == take {
                        return Ok(self.complete());
                    }
                    self.state = State::ContentLength(remaining - take);
                }
                State::Chunked(Chunk::Size) => {
                    let Some(line) = self.take_line() else {
                        if self.buf.len() > self.limits.max_chunk_line {
                            return Err(RequestError::ChunkLineTooLong(self.limits.max_chunk_line));
                        }
                        return Ok(Progress::NeedMore);
                    };
                    if line.len() > self.limits.max_chunk_line {
                        return Err(RequestError::ChunkLineTooLong(self.limits.max_chunk_line));
                    }
                    let size = self.parse_chunk_size(&line)?;
                    self.state = if size == 0 {
                        State::Chunked(Chunk::Trailer)
                    } else {
                        State::Chunked(Chunk::Data(size))
                    };
                }
                State::Chunked(Chunk::Data(remaining)) => {
                    if self.buf.is_empty() {
                        return Ok(Progress::NeedMore);
                    }
                    let take = remaining.min(self.buf.len());
                    self.body.extend_from_slice(&self.buf[..take]);
                    self.buf.advance(take);
                    self.state = if remaining == take {
                        State::Chunked(Chunk::DataEnd)
                    } else {
                        State::Chunked(Chunk::Data(remaining - take))
                    };
                }
                State::Chunked(Chunk::DataEnd) => {
                    let Some(line) = self.take_line() else {
                        if self.buf.len() >= 2 {
                            return Err(RequestError::MissingChunkTerminator);
                        }
                        return Ok(Progress::NeedMore);
                    };
                    if !line.is_empty() {
                        return Err(RequestError::MissingChunkTerminator);
                    }
                    self.state = State::Chunked(Chunk::Size);
                }
                State::Chunked(Chunk::Trailer) => {
                    // Trailers share the header budget
                    let Some(line) = self.take_line() else {
                        if self.header_bytes + self.buf.len() > self.limits.max_header_bytes {
                            return Err(RequestError::HeadersTooLarge(self.limits.max_header_bytes));
                        }
                        return Ok(Progress::NeedMore);
                    };
                    self.header_bytes += line.len() + 2;
                    if self.header_bytes > self.limits.max_header_bytes {
                        return Err(RequestError::HeadersTooLarge(self.limits.max_header_bytes));
                    }
                    if line.is_empty() {
                        return Ok(self.complete());
                    }
                }
                State::UntilClose => {
                    if self.body.len() + self.buf.len() > self.limits.max_body_bytes {
                        return Err(RequestError::BodyTooLarge(self.limits.max_body_bytes));
                    }
                    self.body.extend_from_slice(&self.buf);
                    self.buf.clear();
                    return Ok(Progress::NeedMore);
                }
                State::Done => return Ok(Progress::NeedMore),
            }
        }
    }

    /// The peer closed its side. Only a body without explicit framing may end
    /// this way.
    pub fn finish(&mut self) -> Result<NotificationPayload, RequestError> {
        match self.state {
            State::UntilClose => match self.complete() {
                Progress::Complete(payload) => Ok(payload),
                Progress::NeedMore => Err(RequestError::Truncated),
            },
            _ => Err(RequestError::Truncated),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Take one line without its terminator. Bare LF is accepted.
    fn take_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line = self.buf.split_to(end + 1);
        line.truncate(end);
        if line.last() == Some(&b'\r') {
            line.truncate(end - 1);
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn header_line(&mut self, line: String) -> Result<(), RequestError> {
        if !self.request_line_seen {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 3 || !parts[2].starts_with("HTTP/") {
                return Err(RequestError::BadRequestLine(line));
            }
            if !parts[0].eq_ignore_ascii_case("NOTIFY") {
                return Err(RequestError::UnsupportedMethod(parts[0].to_string()));
            }
            self.request_line_seen = true;
            return Ok(());
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            let (_, value) = self.headers.last_mut().ok_or(RequestError::BadHeader)?;
            let folded = line.trim();
            if !folded.is_empty() {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(folded);
            }
            return Ok(());
        }

        let (name, value) = line.split_once(':').ok_or(RequestError::BadHeader)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(RequestError::BadHeader);
        }
        self.headers.push((name.to_string(), value.trim().to_string()));
        Ok(())
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Validate headers and pick the body framing.
    fn begin_body(&mut self) -> Result<Option<Progress>, RequestError> {
        let content_type = self.header("Content-Type");
        let is_xml = content_type
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/xml"));
        if !is_xml {
            return Err(RequestError::UnsupportedContentType(
                content_type.map(str::to_string),
            ));
        }
        if self.header("SID").map_or(true, |sid| sid.is_empty()) {
            return Err(RequestError::MissingSid);
        }

        let chunked = self
            .header("Transfer-Encoding")
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
        if chunked {
            self.state = State::Chunked(Chunk::Size);
            return Ok(None);
        }

        match self.header("Content-Length") {
            Some(raw) => {
                let length: usize = raw
                    .trim()
                    .parse()
                    .map_err(|_| RequestError::InvalidContentLength(raw.to_string()))?;
                if length > self.limits.max_body_bytes {
                    return Err(RequestError::BodyTooLarge(self.limits.max_body_bytes));
                }
                if length == 0 {
                    return Ok(Some(self.complete()));
                }
                self.state = State::ContentLength(length);
            }
            None => self.state = State::UntilClose,
        }
        Ok(None)
    }

    fn parse_chunk_size(&self, line: &str) -> Result<usize, RequestError> {
        let digits = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(digits, 16)
            .map_err(|_| RequestError::InvalidChunkSize(line.to_string()))?;
        if size > self.limits.max_chunk_size {
            return Err(RequestError::InvalidChunkSize(line.to_string()));
        }
        if self.body.len() + size > self.limits.max_body_bytes {
            return Err(RequestError::BodyTooLarge(self.limits.max_body_bytes));
        }
        Ok(size)
    }

    fn complete(&mut self) -> Progress {
        self.state = State::Done;
        Progress::Complete(NotificationPayload {
            subscription_id: self.header("SID").unwrap_or_default().to_string(),
            seq: self.header("SEQ").and_then(|s| s.trim().parse().ok()),
            event_xml: String::from_utf8_lossy(&std::mem::take(&mut self.body)).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EVENT: &str = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><Id>5</Id></e:property></e:propertyset>"#;

    fn headers(extra: &str) -> String {
        format!(
            "NOTIFY /evt/dev HTTP/1.1\r\nHOST: 192.168.1.2:4000\r\nCONTENT-TYPE: text/xml; charset=\"utf-8\"\r\nNT: upnp:event\r\nNTS: upnp:propchange\r\nSID: uuid:sub-1\r\nSEQ: 3\r\n{extra}\r\n"
        )
    }

    fn content_length_request() -> String {
        format!("{}{}", headers(&format!("CONTENT-LENGTH: {}\r\n", EVENT.len())), EVENT)
    }

    fn chunked_request() -> String {
        let (a, b) = EVENT.split_at(40);
        format!(
            "{}{:x}\r\n{}\r\n{:x};ext=1\r\n{}\r\n0\r\n\r\n",
            headers("TRANSFER-ENCODING: chunked\r\n"),
            a.len(),
            a,
            b.len(),
            b
        )
    }

    fn parse_all(request: &str) -> Result<Progress, RequestError> {
        RequestParser::new(Limits::default()).feed(request.as_bytes())
    }

    fn expect_payload(progress: Progress) -> NotificationPayload {
        match progress {
            Progress::Complete(payload) => payload,
            Progress::NeedMore => panic!("request should be complete"),
        }
    }

    #[test]
    fn test_content_length_request() {
        let payload = expect_payload(parse_all(&content_length_request()).unwrap());
        assert_eq!(payload.subscription_id, "uuid:sub-1");
        assert_eq!(payload.seq, Some(3));
        assert_eq!(payload.event_xml, EVENT);
    }

    #[test]
    fn test_chunked_request() {
        let payload = expect_payload(parse_all(&chunked_request()).unwrap());
        assert_eq!(payload.event_xml, EVENT);
    }

    #[test]
    fn test_chunked_single_chunk_of_0x1a_bytes() {
        let body = "<a>abcdefghijklmnopqrs</a>";
        assert_eq!(body.len(), 0x1a);
        let request = format!(
            "{}1a\r\n{}\r\n0\r\n\r\n",
            headers("Transfer-Encoding: chunked\r\n"),
            body
        );
        let payload = expect_payload(parse_all(&request).unwrap());
        assert_eq!(payload.event_xml.len(), 0x1a);
    }

    #[test]
    fn test_incomplete_request_needs_more() {
        let request = content_length_request();
        let mut parser = RequestParser::new(Limits::default());
        assert_eq!(
            parser.feed(&request.as_bytes()[..request.len() - 1]).unwrap(),
            Progress::NeedMore
        );
        assert!(!parser.is_done());
        assert!(matches!(
            parser.feed(&request.as_bytes()[request.len() - 1..]).unwrap(),
            Progress::Complete(_)
        ));
        assert!(parser.is_done());
    }

    #[test]
    fn test_folded_header() {
        let request = "NOTIFY / HTTP/1.1\r\nContent-Type: text/xml\r\nSID: uuid:\r\n  folded\r\nContent-Length: 2\r\n\r\nab";
        let payload = expect_payload(parse_all(request).unwrap());
        assert_eq!(payload.subscription_id, "uuid: folded");
    }

    #[test]
    fn test_missing_sid_rejected() {
        let request = "NOTIFY / HTTP/1.1\r\nContent-Type: text/xml\r\nContent-Length: 0\r\n\r\n";
        assert_eq!(parse_all(request), Err(RequestError::MissingSid));
    }

    #[test]
    fn test_wrong_content_type_rejected() {
        let request = "NOTIFY / HTTP/1.1\r\nContent-Type: application/json\r\nSID: uuid:x\r\nContent-Length: 0\r\n\r\n";
        assert!(matches!(
            parse_all(request),
            Err(RequestError::UnsupportedContentType(Some(_)))
        ));
    }

    #[test]
    fn test_wrong_method_rejected() {
        let request = "GET / HTTP/1.1\r\n\r\n";
        assert_eq!(
            parse_all(request),
            Err(RequestError::UnsupportedMethod("GET".to_string()))
        );
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        let request = format!("{}8001\r\n", headers("Transfer-Encoding: chunked\r\n"));
        assert!(matches!(
            parse_all(&request),
            Err(RequestError::InvalidChunkSize(_))
        ));

        let request = format!("{}zz\r\n", headers("Transfer-Encoding: chunked\r\n"));
        assert!(matches!(
            parse_all(&request),
            Err(RequestError::InvalidChunkSize(_))
        ));
    }

    #[test]
    fn test_chunk_of_exactly_max_size_accepted() {
        let data = "x".repeat(0x8000);
        let request = format!(
            "{}8000\r\n{}\r\n0\r\n\r\n",
            headers("Transfer-Encoding: chunked\r\n"),
            data
        );
        let payload = expect_payload(parse_all(&request).unwrap());
        assert_eq!(payload.event_xml.len(), 0x8000);
    }

    #[test]
    fn test_missing_chunk_terminator() {
        let request = format!("{}2\r\nabXY", headers("Transfer-Encoding: chunked\r\n"));
        assert_eq!(parse_all(&request), Err(RequestError::MissingChunkTerminator));
    }

    #[test]
    fn test_unterminated_chunk_size_line_rejected() {
        let mut parser = RequestParser::new(Limits::default());
        let request = headers("Transfer-Encoding: chunked\r\n");
        assert_eq!(parser.feed(request.as_bytes()).unwrap(), Progress::NeedMore);
        assert_eq!(parser.feed(&[b'0'; 512]).unwrap(), Progress::NeedMore);
        assert_eq!(
            parser.feed(&[b'0'; 8192]),
            Err(RequestError::ChunkLineTooLong(1024))
        );
    }

    #[test]
    fn test_long_chunk_extension_rejected() {
        let request = format!(
            "{}4;ext={}\r\nabcd\r\n0\r\n\r\n",
            headers("Transfer-Encoding: chunked\r\n"),
            "x".repeat(2000)
        );
        assert_eq!(parse_all(&request), Err(RequestError::ChunkLineTooLong(1024)));
    }

    #[test]
    fn test_trailers_count_against_header_limit() {
        let trailers = "X-Trailer: value\r\n".repeat(2000);
        let request = format!(
            "{}2\r\nab\r\n0\r\n{}\r\n",
            headers("Transfer-Encoding: chunked\r\n"),
            trailers
        );
        assert_eq!(parse_all(&request), Err(RequestError::HeadersTooLarge(16 * 1024)));

        // One endless trailer line is caught before its newline arrives
        let mut parser = RequestParser::new(Limits::default());
        let request = format!("{}0\r\nX-Trailer: ", headers("Transfer-Encoding: chunked\r\n"));
        assert_eq!(parser.feed(request.as_bytes()).unwrap(), Progress::NeedMore);
        assert_eq!(
            parser.feed(&[b'a'; 20 * 1024]),
            Err(RequestError::HeadersTooLarge(16 * 1024))
        );
    }

    #[test]
    fn test_short_trailer_accepted() {
        let request = format!(
            "{}2\r\nab\r\n0\r\nX-Checksum: 1\r\n\r\n",
            headers("Transfer-Encoding: chunked\r\n")
        );
        assert_eq!(expect_payload(parse_all(&request).unwrap()).event_xml, "ab");
    }

    #[test]
    fn test_header_block_too_large() {
        let limits = Limits {
            max_header_bytes: 64,
            ..Limits::default()
        };
        let mut parser = RequestParser::new(limits);
        let request = format!("NOTIFY / HTTP/1.1\r\nX-Padding: {}\r\n", "a".repeat(100));
        assert_eq!(
            parser.feed(request.as_bytes()),
            Err(RequestError::HeadersTooLarge(64))
        );
    }

    #[test]
    fn test_body_too_large() {
        let limits = Limits {
            max_body_bytes: 10,
            ..Limits::default()
        };
        let request = headers("Content-Length: 11\r\n");
        assert_eq!(
            RequestParser::new(limits).feed(request.as_bytes()),
            Err(RequestError::BodyTooLarge(10))
        );
    }

    #[test]
    fn test_unframed_body_ends_at_close() {
        let mut parser = RequestParser::new(Limits::default());
        let request = format!("{}{}", headers(""), EVENT);
        assert_eq!(parser.feed(request.as_bytes()).unwrap(), Progress::NeedMore);
        assert_eq!(parser.finish().unwrap().event_xml, EVENT);
    }

    #[test]
    fn test_close_during_headers_is_truncated() {
        let mut parser = RequestParser::new(Limits::default());
        parser.feed(b"NOTIFY / HTTP/1.1\r\nSID: x\r\n").unwrap();
        assert_eq!(parser.finish(), Err(RequestError::Truncated));
    }

    proptest! {
        #[test]
        fn prop_split_points_do_not_change_result(cuts in proptest::collection::vec(0usize..400, 0..8)) {
            let request = chunked_request();
            let bytes = request.as_bytes();
            let mut points: Vec<usize> = cuts.into_iter().map(|c| c % bytes.len()).collect();
            points.push(0);
            points.push(bytes.len());
            points.sort_unstable();
            points.dedup();

            let mut parser = RequestParser::new(Limits::default());
            let mut result = None;
            for window in points.windows(2) {
                if let Progress::Complete(payload) = parser.feed(&bytes[window[0]..window[1]]).unwrap() {
                    result = Some(payload);
                }
            }
            let payload = result.expect("complete after all bytes");
            prop_assert_eq!(payload.event_xml, EVENT);
            prop_assert_eq!(payload.seq, Some(3));
        }
    }
}
