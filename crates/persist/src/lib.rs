//! Graph persistence for storables: a deduplicating graph writer, a
//! three-pass graph reader, and pluggable format adapters.
//!
//! # Invariants
//! - Each distinct object body is written once per session; later visits
//!   become reference tokens, so shared children and cycles survive.
//! - Loading instantiates every object, then links every reference, then
//!   finishes every object. No link happens before all objects exist.
//! - A duplicate id or a dangling reference fails the load before any
//!   link is made.
//! - Sinks and sources are closed on every exit path.

pub mod error;
pub mod format;
pub mod reader;
pub mod store;
pub mod token;
pub mod transcode;
pub mod writer;

#[cfg(test)]
mod testing;

pub use error::{PersistError, Result};
pub use format::{
    BinaryReader, BinaryWriter, Format, FormatReader, FormatWriter, JsonReader, JsonWriter,
    PersistConfig, TokenBuffer,
};
pub use reader::{LoadedGraph, read_graph};
pub use store::{load, load_global, save};
pub use token::{Slot, Token};
pub use transcode::transcode;
pub use writer::{WriteSummary, write_graph};
