use stowage_common::StorableId;
use stowage_kernel::StorableError;

/// Errors from a write or load session.
///
/// Every variant aborts the whole session. Output already flushed by a
/// failed write is unreliable.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error(transparent)]
    Storable(#[from] StorableError),
    #[error("duplicate storable id `{id}`")]
    DuplicateId { id: StorableId },
    #[error("`{owner}` references `{id}`, which is not in the graph")]
    DanglingReference { owner: StorableId, id: StorableId },
    #[error("root `{id}` is not in the graph")]
    MissingRoot { id: StorableId },
    #[error("malformed token stream: {0}")]
    Malformed(String),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
}

pub type Result<T> = std::result::Result<T, PersistError>;

impl PersistError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        PersistError::Malformed(reason.into())
    }
}
