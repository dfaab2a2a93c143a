//! Error kinds for the trace pipeline and the simulation driver.

use thiserror::Error;

/// Section markers that must appear in a BT9 trace, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Nodes,
    Edges,
    Sequence,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Self::Nodes => "BT9_NODES",
            Self::Edges => "BT9_EDGES",
            Self::Sequence => "BT10_BIG_INDEX_SIZE_32",
        };
        write!(f, "{}", s)
    }
}

/// What an out-of-range table reference points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefKind {
    Node,
    Edge,
}

impl std::fmt::Display for RefKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Edge => write!(f, "edge"),
        }
    }
}

/// Terminal failures while reading a trace or driving the simulation.
///
/// Everything here bubbles up to the binary, which prints the message to
/// stderr and exits non-zero. Duplicate node/edge records are warnings,
/// not errors.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("empty input")]
    EmptyInput,

    #[error("truncated zstd stream")]
    TruncatedStream,

    #[error("corrupt zstd stream: {0}")]
    CorruptStream(std::io::Error),

    #[error("line {line}: not a BT9 trace")]
    NotBt9 { line: u64 },

    #[error("line {line}: invalid header field `{key}`: {value}")]
    HeaderField {
        key: String,
        value: String,
        line: u64,
    },

    #[error("`{0}` section is missing")]
    MissingSection(Section),

    #[error("line {line}: invalid node field `{field}`: {token}")]
    NodeField {
        field: &'static str,
        token: String,
        line: u64,
    },

    #[error("line {line}: invalid edge field `{field}`: {token}")]
    EdgeField {
        field: &'static str,
        token: String,
        line: u64,
    },

    #[error("line {line}: edge references unknown {kind} {id}")]
    InvalidReference { kind: RefKind, id: u32, line: u64 },

    #[error("invalid edge index {id} in sequence")]
    InvalidEdgeIndex { id: u32 },

    #[error("unclassifiable branch at {pc:#x}: {reason}")]
    Classification { pc: u64, reason: &'static str },

    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}
