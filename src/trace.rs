//! Reader for BT9 traces with a BT10 binary edge sequence.
//!
//! A trace is a zstd-compressed byte stream: an ASCII header, a node
//! table, an edge table, and a compact binary sequence of edge IDs. The
//! reader parses the tables eagerly and then lifts the edge sequence into
//! a lazy stream of [BranchInstance] values with bounded memory.

pub mod bt10;
pub mod decompress;
pub mod header;
pub mod record;

pub use header::*;
pub use record::*;

use std::path::Path;

use log::warn;

use crate::branch::Conditionality;
use crate::config::EDGE_SEQUENCE_BUFFER_SIZE;
use crate::error::{RefKind, Section, TraceError};
use crate::trace::bt10::Bt10Parser;
use crate::trace::decompress::{ByteSource, Decompressor};

/// Parse an unsigned integer, accepting a `0x` prefix for hex.
pub(crate) fn parse_u64_auto(token: &str) -> Option<u64> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        token.parse::<u64>().ok()
    }
}

/// One dynamic execution of a branch: the source site, the destination
/// site, and the edge traversed between them.
///
/// Borrows the reader's tables, so an instance is only valid until the
/// next call to [TraceReader::next_instance].
#[derive(Clone, Copy, Debug)]
pub struct BranchInstance<'a> {
    pub src: &'a NodeRecord,
    pub dst: &'a NodeRecord,
    pub edge: &'a EdgeRecord,
}

/// A streaming BT9/BT10 trace reader.
///
/// [TraceReader::next_instance] is a forward, input-only cursor: it is
/// single-pass and non-restartable. Once `Ok(None)` has been returned,
/// every later call returns `Ok(None)` again.
pub struct TraceReader {
    pub header: TraceHeader,
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,

    source: ByteSource,
    bt10: Bt10Parser,

    /// Access window over the decoded edge sequence.
    window: Vec<u32>,
    read_ptr: usize,
    write_ptr: usize,
    reached_eof: bool,

    line_num: u64,
}

impl TraceReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let source = ByteSource::new(Decompressor::open(path)?);
        let mut reader = Self {
            header: TraceHeader::default(),
            nodes: Vec::new(),
            edges: Vec::new(),
            source,
            bt10: Bt10Parser::new(),
            window: vec![0u32; EDGE_SEQUENCE_BUFFER_SIZE],
            read_ptr: 0,
            write_ptr: 0,
            reached_eof: false,
            line_num: 0,
        };
        reader.read_header()?;
        reader.read_node_table()?;
        reader.read_edge_table()?;
        reader.refill()?;
        Ok(reader)
    }

    pub fn header(&self) -> &TraceHeader {
        &self.header
    }
    pub fn node_table(&self) -> &[NodeRecord] {
        &self.nodes
    }
    pub fn edge_table(&self) -> &[EdgeRecord] {
        &self.edges
    }

    /// Read the next line, bumping the line counter.
    fn next_line(&mut self) -> Result<Option<String>, TraceError> {
        let line = self.source.read_line()?;
        if line.is_some() {
            self.line_num += 1;
        }
        Ok(line)
    }

    /// Split a line at the first `#`, yielding (code, comment).
    fn split_comment(line: &str) -> (&str, Option<&str>) {
        match line.find('#') {
            Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
            None => (line, None),
        }
    }

    /// Phase H: the magic line and `key: value` fields up to `BT9_NODES`.
    fn read_header(&mut self) -> Result<(), TraceError> {
        loop {
            let Some(line) = self.next_line()? else {
                return Err(TraceError::NotBt9 {
                    line: self.line_num,
                });
            };
            let (code, _) = Self::split_comment(&line);
            let Some(token) = code.split_whitespace().next() else {
                continue;
            };
            if token != "BT9_SPA_TRACE_FORMAT" {
                return Err(TraceError::NotBt9 {
                    line: self.line_num,
                });
            }
            break;
        }

        loop {
            let Some(line) = self.next_line()? else {
                return Err(TraceError::MissingSection(Section::Nodes));
            };
            let (code, _) = Self::split_comment(&line);
            let mut tokens = code.split_whitespace();
            let Some(key) = tokens.next() else {
                continue;
            };
            if key == "BT9_NODES" {
                return Ok(());
            }
            // Everything after the key token (value may contain spaces).
            let value = code[code.find(key).unwrap() + key.len()..].trim();
            let line_num = self.line_num;
            self.header.insert(key, value, line_num)?;
        }
    }

    /// Phase N: `NODE` rows up to `BT9_EDGES`.
    fn read_node_table(&mut self) -> Result<(), TraceError> {
        let mut staged: Vec<NodeRecord> = Vec::new();
        loop {
            let Some(line) = self.next_line()? else {
                return Err(TraceError::MissingSection(Section::Edges));
            };
            let (code, comment) = Self::split_comment(&line);
            let mut tokens = code.split_whitespace();
            let Some(token) = tokens.next() else {
                continue;
            };
            match token {
                "BT9_EDGES" => break,
                "NODE" => {
                    staged.push(NodeRecord::parse(tokens, comment, self.line_num)?);
                }
                _ => {
                    return Err(TraceError::NodeField {
                        field: "specifier",
                        token: token.to_string(),
                        line: self.line_num,
                    })
                }
            }
        }

        // Build the dense table. A node whose conditionality is already
        // known is never overwritten; the duplicate is reported and kept
        // out of the table.
        let len = staged.iter().map(|n| n.id as usize + 1).max().unwrap_or(0);
        self.nodes = vec![NodeRecord::default(); len];
        for node in staged {
            let slot = &mut self.nodes[node.id as usize];
            if slot.class.conditionality == Conditionality::Unknown {
                *slot = node;
            } else {
                warn!(
                    "line {}: duplicated node ({:#x}) detected",
                    self.line_num, node.id
                );
            }
        }
        Ok(())
    }

    /// Phase E: `EDGE` rows up to the BT10 markers.
    fn read_edge_table(&mut self) -> Result<(), TraceError> {
        let mut staged: Vec<EdgeRecord> = Vec::new();
        let mut reached_small_index = false;
        loop {
            let Some(line) = self.next_line()? else {
                return Err(TraceError::MissingSection(Section::Sequence));
            };
            let (code, _) = Self::split_comment(&line);
            let mut tokens = code.split_whitespace();
            let Some(token) = tokens.next() else {
                continue;
            };
            match token {
                "EDGE" => {
                    let edge = EdgeRecord::parse(tokens, self.line_num)?;
                    for node_id in [edge.src_id, edge.dst_id] {
                        if node_id as usize >= self.nodes.len() {
                            return Err(TraceError::InvalidReference {
                                kind: RefKind::Node,
                                id: node_id,
                                line: self.line_num,
                            });
                        }
                    }
                    staged.push(edge);
                }
                "BT10_SMALL_INDEX_SIZE_8" => reached_small_index = true,
                "BT10_BIG_INDEX_SIZE_32" if reached_small_index => break,
                _ => {
                    return Err(TraceError::EdgeField {
                        field: "specifier",
                        token: token.to_string(),
                        line: self.line_num,
                    })
                }
            }
        }

        let len = staged.iter().map(|e| e.id as usize + 1).max().unwrap_or(0);
        self.edges = vec![EdgeRecord::default(); len];
        let mut seen = vec![false; len];
        for edge in staged {
            let idx = edge.id as usize;
            if seen[idx] {
                warn!(
                    "line {}: duplicated edge ({:#x}) detected",
                    self.line_num, edge.id
                );
            }
            seen[idx] = true;
            self.edges[idx] = edge;
        }
        Ok(())
    }

    /// Refill the edge-ID window from the BT10 parser.
    fn refill(&mut self) -> Result<(), TraceError> {
        self.write_ptr = self
            .bt10
            .fill(&mut self.source, &mut self.window, self.edges.len())?;
        self.reached_eof = self.bt10.reached_eof();
        self.read_ptr = 0;
        Ok(())
    }

    /// Advance the cursor and yield the next branch instance.
    ///
    /// Single-pass: the returned instance borrows the reader and is
    /// invalidated by the next call.
    pub fn next_instance(&mut self) -> Result<Option<BranchInstance<'_>>, TraceError> {
        if self.read_ptr >= self.write_ptr {
            if self.reached_eof {
                return Ok(None);
            }
            self.refill()?;
            if self.write_ptr == 0 {
                return Ok(None);
            }
        }
        debug_assert!(self.read_ptr < self.write_ptr);
        debug_assert!(self.write_ptr <= self.window.len());

        let edge_id = self.window[self.read_ptr] as usize;
        self.read_ptr += 1;

        let edge = &self.edges[edge_id];
        let src = &self.nodes[edge.src_id as usize];
        let dst = &self.nodes[edge.dst_id as usize];
        Ok(Some(BranchInstance { src, dst, edge }))
    }
}
