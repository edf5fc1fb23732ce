// layout.rs — Bit layouts for method interfaces
//
// A layout is an ordered list of named, fixed-width fields. Layout equality
// is structural: field names, bit widths and field order all participate.
// Layouts are the currency of the signature registry and of wire bundles in
// the netlist.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single named field of a layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub width: u32,
}

/// An ordered record of named, fixed-width fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Layout {
    pub fields: Vec<Field>,
}

impl Layout {
    /// The empty layout (zero bits). Used for transaction bodies and for
    /// methods without arguments or results.
    pub fn empty() -> Layout {
        Layout { fields: Vec::new() }
    }

    pub fn new(fields: Vec<Field>) -> Layout {
        Layout { fields }
    }

    /// Total width in bits.
    pub fn width(&self) -> u32 {
        self.fields.iter().map(|f| f.width).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0
    }

    /// True when every field is a single bit, so the layout can be merged
    /// across simultaneous callers by a bitwise OR reducer.
    pub fn is_reduction_compatible(&self) -> bool {
        self.fields.iter().all(|f| f.width == 1)
    }

    /// Bit offset of the named field, if present.
    pub fn field_offset(&self, name: &str) -> Option<u32> {
        let mut offset = 0;
        for field in &self.fields {
            if field.name == name {
                return Some(offset);
            }
            offset += field.width;
        }
        None
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for Layout {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        Layout {
            fields: iter
                .into_iter()
                .map(|(name, width)| Field {
                    name: name.into(),
                    width,
                })
                .collect(),
        }
    }
}

/// Build a layout from `(name, width)` pairs.
pub fn layout<S: Into<String>>(fields: impl IntoIterator<Item = (S, u32)>) -> Layout {
    fields.into_iter().collect()
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field.name, field.width)?;
        }
        write!(f, "}}")
    }
}
