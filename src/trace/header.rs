//! The BT9 trace header: a key/value dictionary with typed projections.

use std::collections::HashMap;

use crate::error::TraceError;
use crate::trace::parse_u64_auto;

/// Header fields collected before the `BT9_NODES` marker.
///
/// Recognised keys get typed fields; everything else lands in the open
/// dictionary. Immutable after construction.
#[derive(Debug, Default)]
pub struct TraceHeader {
    pub minor_version: u32,
    pub has_physical_address: bool,
    pub md5_checksum: String,
    pub conversion_date: String,
    pub original_trace_path: String,
    fields: HashMap<String, String>,
}

impl TraceHeader {
    /// Record one `key: value` header line.
    pub(crate) fn insert(
        &mut self,
        key: &str,
        value: &str,
        line: u64,
    ) -> Result<(), TraceError> {
        let invalid = |k: &str, v: &str| TraceError::HeaderField {
            key: k.to_string(),
            value: v.to_string(),
            line,
        };
        match key {
            "bt9_minor_version:" => {
                self.minor_version = parse_u64_auto(value.split_whitespace().next().unwrap_or(""))
                    .ok_or_else(|| invalid(key, value))? as u32;
            }
            "has_physical_address:" => {
                let v = parse_u64_auto(value.split_whitespace().next().unwrap_or(""))
                    .ok_or_else(|| invalid(key, value))?;
                self.has_physical_address = v != 0;
            }
            "md5_checksum:" => self.md5_checksum = value.to_string(),
            "conversion_date:" => self.conversion_date = value.to_string(),
            "original_stf_input_file:" => self.original_trace_path = value.to_string(),
            _ => {
                self.fields
                    .insert(key.trim_end_matches(':').to_string(), value.to_string());
            }
        }
        Ok(())
    }

    /// Look up an unclassified header field by key (without the colon).
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }

    fn u64_field(&self, key: &'static str) -> Result<u64, TraceError> {
        let value = self.field(key).unwrap_or("");
        parse_u64_auto(value.split_whitespace().next().unwrap_or("")).ok_or_else(|| {
            TraceError::HeaderField {
                key: key.to_string(),
                value: value.to_string(),
                line: 0,
            }
        })
    }

    /// Total instruction count declared by the tracer.
    pub fn total_instruction_count(&self) -> Result<u64, TraceError> {
        self.u64_field("total_instruction_count")
    }

    /// Branch instruction count declared by the tracer. Includes the dummy
    /// branch at the start of the trace.
    pub fn branch_instruction_count(&self) -> Result<u64, TraceError> {
        self.u64_field("branch_instruction_count")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn typed_and_untyped_fields() {
        let mut h = TraceHeader::default();
        h.insert("bt9_minor_version:", "2", 1).unwrap();
        h.insert("has_physical_address:", "0", 2).unwrap();
        h.insert("md5_checksum:", "0123abcd", 3).unwrap();
        h.insert("total_instruction_count:", "1234", 4).unwrap();
        h.insert("branch_instruction_count:", "0x10", 5).unwrap();

        assert_eq!(h.minor_version, 2);
        assert!(!h.has_physical_address);
        assert_eq!(h.md5_checksum, "0123abcd");
        assert_eq!(h.total_instruction_count().unwrap(), 1234);
        assert_eq!(h.branch_instruction_count().unwrap(), 16);
        assert!(h.total_instruction_count().is_ok());
        assert!(h.field("nonexistent").is_none());
    }

    #[test]
    fn invalid_numeric_field() {
        let mut h = TraceHeader::default();
        assert!(h.insert("bt9_minor_version:", "xyz", 7).is_err());
    }

    #[test]
    fn missing_count_is_an_error() {
        let h = TraceHeader::default();
        assert!(h.total_instruction_count().is_err());
    }
}
