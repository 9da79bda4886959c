//! Format adapters: the pluggable layer between structural events and bytes.
//!
//! The graph algorithms in [`crate::writer`] and [`crate::reader`] only see
//! the two traits below. Adapters own concrete syntax and nothing else: they
//! never reorder, deduplicate or resolve anything.
//!
//! Shipped adapters:
//! - [`json`]: readable JSON document, extension `json`.
//! - [`binary`]: one CBOR item per token in a zstd frame, extension
//!   `cbor.zst`.
//! - [`memory`]: in-memory token list, used by tests and tooling.

pub mod binary;
pub mod json;
pub mod memory;

use crate::error::{PersistError, Result};
use crate::token::{Slot, Token};
use serde::{Deserialize, Serialize};
use std::path::Path;
use stowage_common::{Scalar, StorableId};

pub use binary::{BinaryReader, BinaryWriter};
pub use json::{JsonReader, JsonWriter};
pub use memory::TokenBuffer;

/// Write side of a format adapter.
///
/// Calls arrive in stream order: `open`, `write_header`, the objects,
/// `write_footer`, `close`. `close` is also called after a failure, in
/// which case the stream may stop at any point before it.
pub trait FormatWriter {
    /// Acquire the sink.
    fn open(&mut self) -> Result<()>;
    /// Flush and release the sink.
    fn close(&mut self) -> Result<()>;
    fn write_header(&mut self, roots: &[StorableId]) -> Result<()>;
    fn write_footer(&mut self, objects: u64) -> Result<()>;
    fn begin_object(&mut self, slot: &Slot, type_name: &str, id: &StorableId) -> Result<()>;
    fn end_object(&mut self) -> Result<()>;
    fn write_reference(&mut self, slot: &Slot, id: &StorableId) -> Result<()>;
    fn write_scalar(&mut self, slot: &Slot, value: &Scalar) -> Result<()>;
    fn begin_sequence(&mut self, slot: &Slot) -> Result<()>;
    fn end_sequence(&mut self) -> Result<()>;
    fn begin_mapping(&mut self, slot: &Slot) -> Result<()>;
    fn end_mapping(&mut self) -> Result<()>;

    /// Forward one parsed token. Used to copy streams between adapters.
    fn write_token(&mut self, token: &Token) -> Result<()> {
        match token {
            Token::Header { roots } => self.write_header(roots),
            Token::BeginObject {
                slot,
                type_name,
                id,
            } => self.begin_object(slot, type_name, id),
            Token::EndObject => self.end_object(),
            Token::Reference { slot, id } => self.write_reference(slot, id),
            Token::Scalar { slot, value } => self.write_scalar(slot, value),
            Token::BeginSequence { slot } => self.begin_sequence(slot),
            Token::EndSequence => self.end_sequence(),
            Token::BeginMapping { slot } => self.begin_mapping(slot),
            Token::EndMapping => self.end_mapping(),
            Token::Footer { objects } => self.write_footer(*objects),
        }
    }
}

/// Read side of a format adapter: a lazy token stream.
pub trait FormatReader {
    /// Acquire the source.
    fn open(&mut self) -> Result<()>;
    /// Next token, or `None` once the stream is exhausted.
    fn next_token(&mut self) -> Result<Option<Token>>;
    /// Release the source.
    fn close(&mut self) -> Result<()>;
}

/// On-disk formats, selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Binary,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Json, Format::Binary];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Binary => "cbor.zst",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Binary => "binary",
        }
    }

    /// Pick the format whose extension ends the file name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PersistError::UnsupportedFormat(path.display().to_string()))?;
        Self::ALL
            .into_iter()
            .find(|format| name.ends_with(&format!(".{}", format.extension())))
            .ok_or_else(|| PersistError::UnsupportedFormat(name.to_owned()))
    }
}

/// Adapter settings. Every field has a default, so partial config files
/// are fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Indent JSON output.
    pub pretty: bool,
    /// zstd level for the binary format.
    pub compression_level: i32,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            pretty: true,
            compression_level: 3,
        }
    }
}
