//! Static field lists for persisted records
//!
//! Each output record declares its columns once, in order. `LogSink` logs
//! the header row built from it; the serde names of the record fields are
//! kept identical.

use serde::Serialize;

/// Column type as understood by downstream stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    Integer,
    Float,
    Decimal,
    Text,
    Timestamp,
}

/// One named, typed column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// A record type with a fixed, ordered column list
pub trait Record {
    const FIELDS: &'static [Field];

    /// Header line for this record with the given delimiter
    fn header_row(delimiter: char) -> String {
        header_row(Self::FIELDS, delimiter)
    }
}

/// Join the column names with `delimiter`
pub fn header_row(fields: &[Field], delimiter: char) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        out.push_str(field.name);
    }
    out
}
