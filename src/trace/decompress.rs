//! Streaming zstd decompression with demand-driven output.
//!
//! The decoder side of the trace reader: a pull-style state object that
//! owns the file handle, the decoder context, and both scratch buffers.
//! Consumers drain decompressed bytes with [Decompressor::pull]; the
//! decoder only runs when the output scratch is empty.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use zstd::stream::raw::{Decoder, InBuffer, Operation, OutBuffer};
use zstd::zstd_safe::DCtx;

use crate::error::TraceError;

pub struct Decompressor {
    file: File,

    /// Decoder context. Automatically resets between concatenated frames.
    decoder: Decoder<'static>,

    /// Compressed input scratch, sized by the decoder's recommendation.
    inbuf: Vec<u8>,
    in_len: usize,
    in_pos: usize,

    /// Decompressed output scratch, sized by the decoder's recommendation.
    outbuf: Vec<u8>,
    out_len: usize,
    out_pos: usize,

    /// Return hint from the last decoder step; non-zero at end of input
    /// means the final frame was cut short.
    last_hint: usize,

    saw_input: bool,
    file_eof: bool,
}

impl Decompressor {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let file = File::open(path)?;
        let decoder = Decoder::new()?;
        Ok(Self {
            file,
            decoder,
            inbuf: vec![0u8; DCtx::in_size()],
            in_len: 0,
            in_pos: 0,
            outbuf: vec![0u8; DCtx::out_size()],
            out_len: 0,
            out_pos: 0,
            last_hint: 0,
            saw_input: false,
            file_eof: false,
        })
    }

    /// Copy up to `dst.len()` decompressed bytes into `dst`.
    ///
    /// Returns `Ok(0)` exactly once the compressed stream is exhausted.
    /// Fails with [TraceError::EmptyInput] if the file held no bytes at
    /// all, and with [TraceError::TruncatedStream] if the file ended in
    /// the middle of a frame.
    pub fn pull(&mut self, dst: &mut [u8]) -> Result<usize, TraceError> {
        if dst.is_empty() {
            return Ok(0);
        }
        loop {
            // Serve whatever is left in the output scratch first.
            if self.out_pos < self.out_len {
                let n = dst.len().min(self.out_len - self.out_pos);
                dst[..n].copy_from_slice(&self.outbuf[self.out_pos..self.out_pos + n]);
                self.out_pos += n;
                return Ok(n);
            }

            // Feed pending compressed bytes through the decoder.
            if self.in_pos < self.in_len {
                let mut input = InBuffer::around(&self.inbuf[self.in_pos..self.in_len]);
                let mut output = OutBuffer::around(&mut self.outbuf[..]);
                let hint = self
                    .decoder
                    .run(&mut input, &mut output)
                    .map_err(TraceError::CorruptStream)?;
                self.in_pos += input.pos;
                self.out_len = output.pos();
                self.out_pos = 0;
                self.last_hint = hint;
                continue;
            }

            if self.file_eof {
                if !self.saw_input {
                    return Err(TraceError::EmptyInput);
                }
                if self.last_hint != 0 {
                    return Err(TraceError::TruncatedStream);
                }
                return Ok(0);
            }

            let n = self.file.read(&mut self.inbuf)?;
            if n == 0 {
                self.file_eof = true;
            } else {
                self.saw_input = true;
                self.in_len = n;
                self.in_pos = 0;
            }
        }
    }
}

/// A line-oriented consumer over a [Decompressor].
///
/// Splits the decompressed byte stream into `\n`-terminated lines for the
/// ASCII phases, then hands out raw bytes for the binary edge sequence.
pub struct ByteSource {
    dec: Decompressor,
    chunk: Vec<u8>,
    len: usize,
    pos: usize,
}

impl ByteSource {
    pub fn new(dec: Decompressor) -> Self {
        let cap = DCtx::out_size();
        Self {
            dec,
            chunk: vec![0u8; cap],
            len: 0,
            pos: 0,
        }
    }

    fn refill(&mut self) -> Result<bool, TraceError> {
        let n = self.dec.pull(&mut self.chunk)?;
        self.len = n;
        self.pos = 0;
        Ok(n > 0)
    }

    /// Read one line, without its terminating `\n`.
    /// Returns `Ok(None)` at end of stream.
    pub fn read_line(&mut self) -> Result<Option<String>, TraceError> {
        let mut out: Vec<u8> = Vec::new();
        loop {
            if self.pos == self.len && !self.refill()? {
                if out.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(String::from_utf8_lossy(&out).into_owned()));
            }
            let slice = &self.chunk[self.pos..self.len];
            if let Some(i) = slice.iter().position(|&b| b == b'\n') {
                out.extend_from_slice(&slice[..i]);
                self.pos += i + 1;
                return Ok(Some(String::from_utf8_lossy(&out).into_owned()));
            }
            out.extend_from_slice(slice);
            self.pos = self.len;
        }
    }

    /// Fill `dst` with raw decompressed bytes.
    /// A short count is only returned at end of stream.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<usize, TraceError> {
        let mut written = 0;
        while written < dst.len() {
            if self.pos == self.len && !self.refill()? {
                break;
            }
            let n = (dst.len() - written).min(self.len - self.pos);
            dst[written..written + n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
            self.pos += n;
            written += n;
        }
        Ok(written)
    }
}
