//! Decoder for the BT10 binary edge sequence.
//!
//! The sequence is a stream of variable-length records:
//!
//! ```text
//! rec := byte<255>        one-byte edge ID in [0, 254]
//!      | 0xFF u32le       four-byte extended ID; zero value marks EOF
//! ```
//!
//! Common edges cost one byte; the sentinel `0xFF 00 00 00 00` is
//! unambiguous because a zero edge ID is only legal in the one-byte form.

use crate::config::BT10_STAGING_SIZE;
use crate::error::TraceError;
use crate::trace::decompress::ByteSource;

/// Longest possible record: the marker byte plus a 32-bit index.
const MAX_RECORD: usize = 5;

pub struct Bt10Parser {
    /// Staging area for raw bytes pulled off the decompressed stream.
    /// Unconsumed tail bytes are copied to the front before each refill.
    data: Vec<u8>,
    filled: usize,
    pos: usize,

    /// Set when the EOF sentinel has been decoded.
    reached_eof: bool,
}

impl Bt10Parser {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; BT10_STAGING_SIZE],
            filled: 0,
            pos: 0,
            reached_eof: false,
        }
    }

    /// Whether the EOF sentinel has been decoded.
    pub fn reached_eof(&self) -> bool {
        self.reached_eof
    }

    /// Ensure at least [MAX_RECORD] bytes are staged, unless the stream
    /// itself runs out first.
    fn restock(&mut self, src: &mut ByteSource) -> Result<(), TraceError> {
        let tail = self.filled - self.pos;
        self.data.copy_within(self.pos..self.filled, 0);
        self.filled = tail;
        self.pos = 0;
        while self.filled < self.data.len() {
            let n = src.read(&mut self.data[self.filled..])?;
            if n == 0 {
                break;
            }
            self.filled += n;
        }
        Ok(())
    }

    /// Decode edge IDs into `window` until it is full or the sentinel is
    /// reached. Returns the number of IDs written.
    ///
    /// Every decoded ID is checked against `edge_count`; an out-of-range
    /// ID fails with [TraceError::InvalidEdgeIndex]. A stream that ends
    /// without the sentinel fails as truncated.
    pub fn fill(
        &mut self,
        src: &mut ByteSource,
        window: &mut [u32],
        edge_count: usize,
    ) -> Result<usize, TraceError> {
        let mut written = 0;
        if self.reached_eof {
            return Ok(0);
        }
        loop {
            if self.filled - self.pos < MAX_RECORD {
                self.restock(src)?;
            }
            let avail = self.filled - self.pos;
            if avail == 0 {
                return Err(TraceError::TruncatedStream);
            }

            let id = match self.data[self.pos] {
                0xFF => {
                    if avail < MAX_RECORD {
                        return Err(TraceError::TruncatedStream);
                    }
                    let bytes: [u8; 4] =
                        self.data[self.pos + 1..self.pos + 5].try_into().unwrap();
                    self.pos += 5;
                    let id = u32::from_le_bytes(bytes);
                    if id == 0 {
                        self.reached_eof = true;
                        return Ok(written);
                    }
                    id
                }
                byte => {
                    self.pos += 1;
                    byte as u32
                }
            };

            if id as usize >= edge_count {
                return Err(TraceError::InvalidEdgeIndex { id });
            }
            window[written] = id;
            written += 1;
            if written == window.len() {
                return Ok(written);
            }
        }
    }
}

impl Default for Bt10Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a sequence of edge IDs in the BT10 format, with the terminating
/// sentinel. The inverse of [Bt10Parser::fill]; used by tests.
#[cfg(test)]
pub fn encode(ids: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    for &id in ids {
        if id < 255 {
            out.push(id as u8);
        } else {
            out.push(0xFF);
            out.extend_from_slice(&id.to_le_bytes());
        }
    }
    out.push(0xFF);
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::trace::decompress::Decompressor;
    use std::io::Write;

    fn source_from(bytes: &[u8]) -> (ByteSource, tempfile::NamedTempFile) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let compressed = zstd::stream::encode_all(bytes, 0).unwrap();
        f.write_all(&compressed).unwrap();
        f.flush().unwrap();
        let src = ByteSource::new(Decompressor::open(f.path()).unwrap());
        (src, f)
    }

    fn decode_all(bytes: &[u8], edge_count: usize) -> Result<Vec<u32>, TraceError> {
        let (mut src, _f) = source_from(bytes);
        let mut parser = Bt10Parser::new();
        let mut window = [0u32; 8];
        let mut out = Vec::new();
        loop {
            let n = parser.fill(&mut src, &mut window, edge_count)?;
            out.extend_from_slice(&window[..n]);
            if parser.reached_eof() && n < window.len() {
                return Ok(out);
            }
            if parser.reached_eof() && n == window.len() {
                // Window filled exactly as the sentinel landed; one more
                // call drains nothing.
                let n = parser.fill(&mut src, &mut window, edge_count)?;
                assert_eq!(n, 0);
                return Ok(out);
            }
        }
    }

    #[test]
    fn roundtrip_mixed_widths() {
        let seq = vec![0, 1, 254, 255, 256, 70000, 3, 254];
        let bytes = encode(&seq);
        assert_eq!(decode_all(&bytes, 100_000).unwrap(), seq);
    }

    #[test]
    fn one_byte_boundary() {
        // 254 stays in one byte; 255 forces the four-byte form.
        assert_eq!(encode(&[254]).len(), 1 + 5);
        assert_eq!(encode(&[255]).len(), 5 + 5);
        assert_eq!(decode_all(&encode(&[254, 255]), 300).unwrap(), vec![254, 255]);
    }

    #[test]
    fn zero_id_is_one_byte_only() {
        let bytes = encode(&[0, 0, 5]);
        assert_eq!(decode_all(&bytes, 10).unwrap(), vec![0, 0, 5]);
    }

    #[test]
    fn out_of_range_id() {
        let bytes = encode(&[3]);
        match decode_all(&bytes, 3) {
            Err(TraceError::InvalidEdgeIndex { id: 3 }) => {}
            other => panic!("expected InvalidEdgeIndex, got {:?}", other),
        }
    }

    #[test]
    fn missing_sentinel_is_truncated() {
        let mut bytes = encode(&[1, 2, 1]);
        bytes.truncate(bytes.len() - 5);
        assert!(matches!(
            decode_all(&bytes, 10),
            Err(TraceError::TruncatedStream)
        ));
    }
}
