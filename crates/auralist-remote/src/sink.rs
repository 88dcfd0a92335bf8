//! Sink framing for streaming bytes into a named remote file
//!
//! A sink stream is `C0644 <len> <name>\n`, then exactly `len` bytes, then a single NUL.
//! The receiving side knows where the file ends without relying on the connection closing.

use auralist_types::{Error, Result};

/// NUL byte closing a sink stream
pub const SINK_TERMINATOR: u8 = 0;

const DEFAULT_MODE: &str = "0644";

/// Header name used when the base name cannot appear on the header line
const FALLBACK_NAME: &str = "auralist.upload";

/// Header line of one sink stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkHeader {
    /// Octal permission bits
    pub mode: String,
    /// Exact number of content bytes that follow
    pub size: u64,
    /// Base name of the remote file
    pub name: String,
}

impl SinkHeader {
    /// Header for a regular file named after the last component of `remote_path`
    ///
    /// The receiver writes to the path it was started with, so the header name is informational.
    /// Control characters are replaced with `_` since a newline would end the header early.
    pub fn for_path(remote_path: &str, size: u64) -> Self {
        let base = remote_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(remote_path);
        Self {
            mode: DEFAULT_MODE.to_string(),
            size,
            name: header_name(base),
        }
    }

    /// Encode the header line
    pub fn encode(&self) -> Vec<u8> {
        format!("C{} {} {}\n", self.mode, self.size, self.name).into_bytes()
    }

    /// Parse a header line from the start of `data`, returning it and its encoded length
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let end = data
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| Error::other("Sink header is not terminated"))?;
        let line = std::str::from_utf8(&data[..end])
            .map_err(|_| Error::other("Sink header is not valid UTF-8"))?;

        let rest = line
            .strip_prefix('C')
            .ok_or_else(|| Error::other(format!("Unexpected sink record: {line}")))?;
        let mut parts = rest.splitn(3, ' ');
        let (Some(mode), Some(size), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::other(format!("Malformed sink header: {line}")));
        };
        let size = size
            .parse()
            .map_err(|_| Error::other(format!("Invalid sink size in header: {line}")))?;

        Ok((
            Self {
                mode: mode.to_string(),
                size,
                name: name.to_string(),
            },
            end + 1,
        ))
    }
}

fn header_name(base: &str) -> String {
    let name: String = base
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();
    match name.as_str() {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        _ => name,
    }
}

/// Byte accounting for one sink stream
#[derive(Debug)]
pub struct SinkFramer {
    header: SinkHeader,
    written: u64,
}

impl SinkFramer {
    /// Start a stream with the given header
    pub fn new(header: SinkHeader) -> Self {
        Self { header, written: 0 }
    }

    /// Header of this stream
    pub fn header(&self) -> &SinkHeader {
        &self.header
    }

    /// Bytes accepted so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Account for `len` more content bytes, refusing to exceed the declared size
    pub fn accept(&mut self, len: usize) -> Result<()> {
        let next = self.written + len as u64;
        if next > self.header.size {
            return Err(Error::other(format!(
                "Sink for '{}' declared {} bytes but received {}",
                self.header.name, self.header.size, next
            )));
        }
        self.written = next;
        Ok(())
    }

    /// Trailer bytes, available only once the declared size has been written
    pub fn trailer(&self) -> Result<[u8; 1]> {
        if self.written != self.header.size {
            return Err(Error::other(format!(
                "Sink for '{}' closed after {} of {} bytes",
                self.header.name, self.written, self.header.size
            )));
        }
        Ok([SINK_TERMINATOR])
    }
}

/// Split a complete framed stream into its header and content
pub fn decode_frame(data: &[u8]) -> Result<(SinkHeader, &[u8])> {
    let (header, offset) = SinkHeader::parse(data)?;
    let size = usize::try_from(header.size)
        .map_err(|_| Error::other("Sink size does not fit in memory"))?;
    let end = offset + size;

    if data.len() != end + 1 || data[end] != SINK_TERMINATOR {
        return Err(Error::other(format!(
            "Sink stream for '{}' is not terminated after {} bytes",
            header.name, header.size
        )));
    }
    Ok((header, &data[offset..end]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_header_encoding() {
        let header = SinkHeader::for_path("/tmp/auralist.tmp.ab.part000000001", 42);
        assert_eq!(header.encode(), b"C0644 42 auralist.tmp.ab.part000000001\n");
    }

    #[test]
    fn test_header_name_with_spaces() {
        let header = SinkHeader::for_path("/srv/music/01 Intro.mp3", 5);
        let encoded = header.encode();
        let (parsed, len) = SinkHeader::parse(&encoded).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(len, encoded.len());
    }

    #[test]
    fn test_control_characters_stay_off_the_header_line() {
        let header = SinkHeader::for_path("/srv/music/evil\nC0644 1 x\r\0.mp3", 4);
        assert_eq!(header.name, "evil_C0644 1 x__.mp3");

        let mut stream = header.encode();
        assert_eq!(stream.iter().filter(|&&b| b == b'\n').count(), 1);
        stream.extend_from_slice(b"data");
        stream.push(SINK_TERMINATOR);

        let (decoded, content) = decode_frame(&stream).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(content, b"data");
    }

    #[test]
    fn test_unusable_names_fall_back() {
        assert_eq!(SinkHeader::for_path("/", 0).name, FALLBACK_NAME);
        assert_eq!(SinkHeader::for_path("/srv/..", 0).name, FALLBACK_NAME);
        assert_eq!(SinkHeader::for_path("/srv/a/.", 0).name, FALLBACK_NAME);
        assert_eq!(SinkHeader::for_path("/srv/ok.txt", 0).name, "ok.txt");
    }

    proptest! {
        #[test]
        fn test_any_remote_path_frames_cleanly(
            path in any::<String>(),
            content in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let header = SinkHeader::for_path(&path, content.len() as u64);
            let mut stream = header.encode();
            prop_assert_eq!(stream.iter().filter(|&&b| b == b'\n').count(), 1);
            stream.extend_from_slice(&content);
            stream.push(SINK_TERMINATOR);

            let (decoded, body) = decode_frame(&stream).unwrap();
            prop_assert_eq!(decoded, header);
            prop_assert_eq!(body, &content[..]);
        }
    }

    #[test]
    fn test_decode_frame() {
        let header = SinkHeader::for_path("/srv/a.txt", 5);
        let mut framer = SinkFramer::new(header.clone());
        let mut stream = header.encode();
        framer.accept(5).unwrap();
        stream.extend_from_slice(b"hello");
        stream.extend_from_slice(&framer.trailer().unwrap());

        let (decoded, content) = decode_frame(&stream).unwrap();
        assert_eq!(decoded.name, "a.txt");
        assert_eq!(content, b"hello");
    }

    #[test]
    fn test_content_may_contain_nul() {
        let header = SinkHeader::for_path("/srv/a.bin", 3);
        let mut stream = header.encode();
        stream.extend_from_slice(&[0, 1, 0]);
        stream.push(SINK_TERMINATOR);

        let (_, content) = decode_frame(&stream).unwrap();
        assert_eq!(content, &[0, 1, 0]);
    }

    #[test]
    fn test_framer_rejects_overrun_and_short_close() {
        let mut framer = SinkFramer::new(SinkHeader::for_path("/srv/a", 4));
        framer.accept(3).unwrap();
        assert!(framer.trailer().is_err());
        assert!(framer.accept(2).is_err());
        framer.accept(1).unwrap();
        assert_eq!(framer.trailer().unwrap(), [0]);
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        let header = SinkHeader::for_path("/srv/a", 4);
        let mut stream = header.encode();
        stream.extend_from_slice(b"abc");
        assert!(decode_frame(&stream).is_err());
    }

    #[test]
    fn test_malformed_header() {
        assert!(SinkHeader::parse(b"D0755 0 dir\n").is_err());
        assert!(SinkHeader::parse(b"C0644 x name\n").is_err());
        assert!(SinkHeader::parse(b"C0644 1 name").is_err());
    }
}
