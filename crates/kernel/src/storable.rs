//! The contract every persistable type implements.
//!
//! Saving asks an object for its [`Serialized`] form. Loading goes through
//! three steps that never interleave across a graph:
//!
//! 1. [`StorableType::from_stored`] builds the object from its id and raw
//!    content. Nested objects appear in that content as
//!    [`Value::Reference`] placeholders.
//! 2. [`Storable::link_storable`] is called once per placeholder, after
//!    every object of the graph exists.
//! 3. [`Storable::deserialize`] is called once per object, after every link
//!    of the graph is in place.
//!
//! [`Value::Reference`]: crate::value::Value::Reference

use crate::error::{Result, StorableError};
use crate::value::Content;
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use stowage_common::StorableId;

/// Shared handle to a storable of any type.
///
/// Graphs share sub-objects and may contain cycles, so objects live behind
/// `Rc<RefCell<_>>`. Back edges that would form a strong cycle can be kept as
/// `Weak` by the owning type.
pub type StorableRef = Rc<RefCell<dyn Storable>>;

/// Wrap a storable into a shared handle.
pub fn shared<T: Storable>(value: T) -> StorableRef {
    Rc::new(RefCell::new(value))
}

/// Borrow a shared storable as its concrete type.
///
/// Returns `None` if the object is of another type. Panics like
/// `RefCell::borrow` if the object is mutably borrowed.
pub fn downcast_ref<T: Storable>(object: &StorableRef) -> Option<Ref<'_, T>> {
    Ref::filter_map(object.borrow(), |s| s.as_any().downcast_ref::<T>()).ok()
}

/// Mutably borrow a shared storable as its concrete type.
pub fn downcast_mut<T: Storable>(object: &StorableRef) -> Option<RefMut<'_, T>> {
    RefMut::filter_map(object.borrow_mut(), |s| s.as_any_mut().downcast_mut::<T>()).ok()
}

/// Upcast to `Any` for downcasting trait objects.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What a storable hands to the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct Serialized {
    pub type_name: &'static str,
    pub id: StorableId,
    pub content: Content,
}

/// An object that can be written into a graph and read back.
pub trait Storable: AsAny {
    /// Registry key of the concrete type. Must equal
    /// [`StorableType::TYPE_NAME`].
    fn type_name(&self) -> &'static str;

    fn id(&self) -> &StorableId;

    /// The fields to persist, in the order they should be written.
    fn content(&self) -> Result<Content>;

    fn serialize(&self) -> Result<Serialized> {
        Ok(Serialized {
            type_name: self.type_name(),
            id: self.id().clone(),
            content: self.content()?,
        })
    }

    /// Resolve one reference placeholder left in the stored content.
    ///
    /// `object` may be `self` for a self-reference, so implementations must
    /// store the handle without borrowing it.
    fn link_storable(&mut self, id: &StorableId, object: StorableRef) -> Result<()> {
        let _ = object;
        Err(StorableError::UnexpectedReference {
            owner: self.id().clone(),
            id: id.clone(),
        })
    }

    /// Finish rehydration once the whole graph is linked. Other objects
    /// may or may not have been finished yet.
    fn deserialize(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A concrete storable type that the registry can recreate.
pub trait StorableType: Storable + Sized {
    /// Globally unique name written next to every instance.
    const TYPE_NAME: &'static str;

    /// Rehydration entry point, distinct from normal construction.
    fn from_stored(id: StorableId, content: Content) -> Result<Self>;
}
