//! Shared identifier and scalar types for stowage crates.

pub mod types;

pub use types::{Scalar, StorableId};
