//! Node and edge records from the BT9 lookup tables.

use crate::branch::{BranchBehavior, BranchClass, Directness};
use crate::error::TraceError;
use crate::trace::parse_u64_auto;

/// A branch site: one row of the `BT9_NODES` table.
///
/// Stored in a dense array indexed by `id`. Immutable after table load.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeRecord {
    pub id: u32,
    pub virtual_addr: u64,
    pub physical_addr: Option<u64>,
    pub opcode: u64,
    pub opcode_size: u32,
    pub class: BranchClass,
    pub behavior: BranchBehavior,
    pub taken_cnt: u64,
    pub not_taken_cnt: u64,
    pub tgt_cnt: u64,
    pub mnemonic: Option<String>,
}

impl NodeRecord {
    /// Parse the tokens following a `NODE` specifier, plus the trailing
    /// comment (which may carry a quoted `mnemonic:`).
    pub fn parse<'a>(
        mut tokens: impl Iterator<Item = &'a str>,
        comment: Option<&str>,
        line: u64,
    ) -> Result<Self, TraceError> {
        let invalid = |field: &'static str, token: &str| TraceError::NodeField {
            field,
            token: token.to_string(),
            line,
        };
        let mut next = |field: &'static str| {
            tokens.next().ok_or(TraceError::NodeField {
                field,
                token: String::new(),
                line,
            })
        };

        let mut node = NodeRecord::default();
        let tok = next("id")?;
        node.id = parse_u64_auto(tok).ok_or_else(|| invalid("id", tok))? as u32;
        let tok = next("virtual_address")?;
        node.virtual_addr = parse_u64_auto(tok).ok_or_else(|| invalid("virtual_address", tok))?;
        let tok = next("physical_address")?;
        node.physical_addr = if tok == "-" {
            None
        } else {
            Some(parse_u64_auto(tok).ok_or_else(|| invalid("physical_address", tok))?)
        };
        let tok = next("opcode")?;
        node.opcode = parse_u64_auto(tok).ok_or_else(|| invalid("opcode", tok))?;
        let tok = next("size")?;
        node.opcode_size = parse_u64_auto(tok).ok_or_else(|| invalid("size", tok))? as u32;

        while let Some(key) = tokens.next() {
            match key {
                "class:" => {
                    let tok = tokens.next().unwrap_or("");
                    node.class =
                        BranchClass::parse(tok).map_err(|_| invalid("class", tok))?;
                }
                "behavior:" => {
                    let tok = tokens.next().unwrap_or("");
                    node.behavior =
                        BranchBehavior::parse(tok).map_err(|_| invalid("behavior", tok))?;
                }
                "taken_cnt:" => {
                    let tok = tokens.next().unwrap_or("");
                    node.taken_cnt =
                        parse_u64_auto(tok).ok_or_else(|| invalid("taken_cnt", tok))?;
                }
                "not_taken_cnt:" => {
                    let tok = tokens.next().unwrap_or("");
                    node.not_taken_cnt =
                        parse_u64_auto(tok).ok_or_else(|| invalid("not_taken_cnt", tok))?;
                }
                "tgt_cnt:" => {
                    let tok = tokens.next().unwrap_or("");
                    node.tgt_cnt = parse_u64_auto(tok).ok_or_else(|| invalid("tgt_cnt", tok))?;
                }
                // Unknown keys consume one value token and are discarded.
                _ => {
                    tokens.next();
                }
            }
        }

        // A statically direct branch can never behave indirectly.
        if node.class.directness == Directness::Direct
            && node.behavior.indirectness == Directness::Indirect
        {
            return Err(invalid("behavior", "IND"));
        }

        if let Some(comment) = comment {
            node.mnemonic = parse_mnemonic(comment, line)?;
        }
        Ok(node)
    }
}

/// Prints the record row in its canonical form (without the `NODE`
/// specifier). The sentinel source/sink node prints only its fixed
/// fields.
impl std::fmt::Display for NodeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {:#x} ", self.id, self.virtual_addr)?;
        match self.physical_addr {
            Some(p) => write!(f, "{:#x}", p)?,
            None => write!(f, "-")?,
        }
        write!(f, " {:#x} {}", self.opcode, self.opcode_size)?;
        if self.opcode_size == 0 {
            return Ok(());
        }
        if self.class != BranchClass::default() {
            write!(f, " class: {}", self.class)?;
        }
        if self.behavior != BranchBehavior::default() {
            write!(f, " behavior: {}", self.behavior)?;
        }
        write!(
            f,
            " taken_cnt: {} not_taken_cnt: {} tgt_cnt: {}",
            self.taken_cnt, self.not_taken_cnt, self.tgt_cnt
        )
    }
}

/// Extract a double-quoted `mnemonic:` (which may contain spaces) from a
/// trailing comment.
fn parse_mnemonic(comment: &str, line: u64) -> Result<Option<String>, TraceError> {
    let Some(at) = comment.find("mnemonic:") else {
        return Ok(None);
    };
    let rest = comment[at + "mnemonic:".len()..].trim_start();
    if !rest.starts_with('"') {
        return Err(TraceError::NodeField {
            field: "mnemonic",
            token: rest.split_whitespace().next().unwrap_or("").to_string(),
            line,
        });
    }
    let body = &rest[1..];
    // A missing closing quote keeps the remainder of the comment.
    match body.find('"') {
        Some(end) => Ok(Some(body[..end].to_string())),
        None => Ok(Some(body.to_string())),
    }
}

/// One row of the `BT9_EDGES` table: a traversal of the control-flow graph
/// between two branch sites.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgeRecord {
    pub id: u32,
    pub src_id: u32,
    pub dst_id: u32,
    pub taken: bool,
    pub virtual_target: u64,
    pub physical_target: Option<u64>,
    /// Non-branch instructions between this branch and the next.
    pub inst_cnt: u64,
    pub traverse_cnt: u64,
}

impl EdgeRecord {
    /// Parse the tokens following an `EDGE` specifier.
    pub fn parse<'a>(
        mut tokens: impl Iterator<Item = &'a str>,
        line: u64,
    ) -> Result<Self, TraceError> {
        let invalid = |field: &'static str, token: &str| TraceError::EdgeField {
            field,
            token: token.to_string(),
            line,
        };
        let mut next = |field: &'static str| {
            tokens.next().ok_or(TraceError::EdgeField {
                field,
                token: String::new(),
                line,
            })
        };

        let mut edge = EdgeRecord::default();
        let tok = next("id")?;
        edge.id = parse_u64_auto(tok).ok_or_else(|| invalid("id", tok))? as u32;
        let tok = next("src_id")?;
        edge.src_id = parse_u64_auto(tok).ok_or_else(|| invalid("src_id", tok))? as u32;
        let tok = next("dst_id")?;
        edge.dst_id = parse_u64_auto(tok).ok_or_else(|| invalid("dst_id", tok))? as u32;
        let tok = next("taken")?;
        edge.taken = match tok {
            "T" => true,
            "N" => false,
            _ => return Err(invalid("taken", tok)),
        };
        let tok = next("virtual_target")?;
        edge.virtual_target =
            parse_u64_auto(tok).ok_or_else(|| invalid("virtual_target", tok))?;
        let tok = next("physical_target")?;
        edge.physical_target = if tok == "-" {
            None
        } else {
            Some(parse_u64_auto(tok).ok_or_else(|| invalid("physical_target", tok))?)
        };
        let tok = next("inst_cnt")?;
        edge.inst_cnt = parse_u64_auto(tok).ok_or_else(|| invalid("inst_cnt", tok))?;

        while let Some(key) = tokens.next() {
            match key {
                "traverse_cnt:" => {
                    let tok = tokens.next().unwrap_or("");
                    edge.traverse_cnt =
                        parse_u64_auto(tok).ok_or_else(|| invalid("traverse_cnt", tok))?;
                }
                _ => {
                    tokens.next();
                }
            }
        }
        Ok(edge)
    }
}

/// Prints the record row in its canonical form (without the `EDGE`
/// specifier).
impl std::fmt::Display for EdgeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {:#x} ",
            self.id,
            self.src_id,
            self.dst_id,
            if self.taken { "T" } else { "N" },
            self.virtual_target,
        )?;
        match self.physical_target {
            Some(p) => write!(f, "{:#x}", p)?,
            None => write!(f, "-")?,
        }
        write!(
            f,
            " {} traverse_cnt: {}",
            self.inst_cnt, self.traverse_cnt
        )
    }
}
