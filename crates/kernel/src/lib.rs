//! Storable kernel: field values, the storable contract and the type registry.
//!
//! # Invariants
//! - Every concrete storable type has one globally unique type name.
//! - Rehydration (`from_stored`) is separate from normal construction.
//! - Links are resolved only after every object of a graph exists, and
//!   objects are finished only after every link is resolved.

pub mod error;
pub mod registry;
pub mod storable;
pub mod value;

pub use error::{Result, StorableError};
pub use registry::{Factory, TypeRegistry, global, register_type};
pub use storable::{
    AsAny, Serialized, Storable, StorableRef, StorableType, downcast_mut, downcast_ref, shared,
};
pub use stowage_common::{Scalar, StorableId};
pub use value::{Content, Value};
