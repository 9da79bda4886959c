//! Errors raised by the storable contract and the type registry.

use stowage_common::StorableId;

/// Errors from serializing, recreating or linking a single storable.
#[derive(Debug, thiserror::Error)]
pub enum StorableError {
    #[error("field `{field}` holds a value of type `{type_name}` that cannot be stored")]
    UnsupportedFieldType { field: String, type_name: String },
    #[error("no storable type is registered under `{type_name}`")]
    UnknownType { type_name: String },
    #[error("type name `{type_name}` is registered by two different types")]
    TypeNameCollision { type_name: String },
    #[error("missing field `{field}`")]
    MissingField { field: String },
    #[error("field `{field}` should be {expected}, found {found}")]
    FieldType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("`{owner}` does not accept a link to `{id}`")]
    UnexpectedReference { owner: StorableId, id: StorableId },
    #[error("invalid storable `{id}`: {reason}")]
    Invalid { id: StorableId, reason: String },
}

pub type Result<T> = std::result::Result<T, StorableError>;
