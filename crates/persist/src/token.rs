//! The structural events shared by both sides of every format adapter.

use serde::{Deserialize, Serialize};
use std::fmt;
use stowage_common::{Scalar, StorableId};

/// Where a value sits inside its container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    /// A named object field, or a key of a mapping.
    Field(String),
    /// An element of a sequence, or a top-level object.
    Item,
}

impl Slot {
    pub fn field(name: impl Into<String>) -> Self {
        Slot::Field(name.into())
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Slot::Field(name) => Some(name),
            Slot::Item => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Field(name) => write!(f, "{name}:"),
            Slot::Item => f.write_str("-"),
        }
    }
}

/// One parsed structural event.
///
/// A well-formed stream is `Header`, any number of top-level objects or
/// references, then `Footer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Token {
    /// Root-id manifest.
    Header { roots: Vec<StorableId> },
    BeginObject {
        slot: Slot,
        type_name: String,
        id: StorableId,
    },
    EndObject,
    Reference { slot: Slot, id: StorableId },
    Scalar { slot: Slot, value: Scalar },
    BeginSequence { slot: Slot },
    EndSequence,
    BeginMapping { slot: Slot },
    EndMapping,
    /// Number of full object bodies in the stream.
    Footer { objects: u64 },
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Header { roots } => write!(f, "header roots={}", roots.len()),
            Token::BeginObject {
                slot,
                type_name,
                id,
            } => write!(f, "{slot} begin {type_name} #{id}"),
            Token::EndObject => f.write_str("end object"),
            Token::Reference { slot, id } => write!(f, "{slot} ref #{id}"),
            Token::Scalar { slot, value } => write!(f, "{slot} {value}"),
            Token::BeginSequence { slot } => write!(f, "{slot} ["),
            Token::EndSequence => f.write_str("]"),
            Token::BeginMapping { slot } => write!(f, "{slot} {{"),
            Token::EndMapping => f.write_str("}"),
            Token::Footer { objects } => write!(f, "footer objects={objects}"),
        }
    }
}
