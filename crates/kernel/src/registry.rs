//! Type registry: unique type name → reconstruction factory.
//!
//! Loading knows a type only by the name written next to each object. Every
//! concrete type registers a factory under its [`StorableType::TYPE_NAME`]
//! before the first load that needs it:
//!
//! ```ignore
//! stowage_kernel::register_type::<Station>()?;
//! stowage_kernel::register_type::<Passage>()?;
//! ```
//!
//! Names are resolved at recreate time, so registering more types after the
//! registry exists is fine. Two different types claiming one name is a
//! configuration error and is reported as
//! [`StorableError::TypeNameCollision`].

use crate::error::{Result, StorableError};
use crate::storable::{StorableRef, StorableType, shared};
use crate::value::Content;
use once_cell::sync::Lazy;
use parking_lot::{RwLock, RwLockReadGuard};
use std::any::TypeId;
use std::collections::HashMap;
use stowage_common::StorableId;
use tracing::{debug, info};

/// Function that rebuilds an object from its id and stored content.
pub type Factory = fn(StorableId, Content) -> Result<StorableRef>;

fn recreate_as<T: StorableType>(id: StorableId, content: Content) -> Result<StorableRef> {
    Ok(shared(T::from_stored(id, content)?))
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    factory: Factory,
    /// Set for types registered through [`TypeRegistry::register`].
    type_id: Option<TypeId>,
}

/// Lookup table from type name to factory.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    factories: HashMap<String, Registration>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its `TYPE_NAME`. Registering the same type again
    /// is a no-op.
    pub fn register<T: StorableType>(&mut self) -> Result<()> {
        self.insert(
            T::TYPE_NAME,
            Registration {
                factory: recreate_as::<T>,
                type_id: Some(TypeId::of::<T>()),
            },
        )
    }

    /// Register a hand-written factory. Each name can be claimed once.
    pub fn register_factory(&mut self, type_name: &str, factory: Factory) -> Result<()> {
        self.insert(
            type_name,
            Registration {
                factory,
                type_id: None,
            },
        )
    }

    fn insert(&mut self, type_name: &str, registration: Registration) -> Result<()> {
        match self.factories.get(type_name) {
            Some(existing)
                if existing.type_id.is_some() && existing.type_id == registration.type_id =>
            {
                Ok(())
            }
            Some(_) => Err(StorableError::TypeNameCollision {
                type_name: type_name.to_owned(),
            }),
            None => {
                info!(type_name, "registered storable type");
                self.factories.insert(type_name.to_owned(), registration);
                Ok(())
            }
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Rebuild one object through the factory registered for `type_name`.
    pub fn recreate(&self, type_name: &str, id: StorableId, content: Content) -> Result<StorableRef> {
        let registration = self
            .factories
            .get(type_name)
            .ok_or_else(|| StorableError::UnknownType {
                type_name: type_name.to_owned(),
            })?;
        debug!(type_name, %id, "recreating storable");
        (registration.factory)(id, content)
    }
}

/// Process-wide registry, written during startup and read by loads.
static GLOBAL_REGISTRY: Lazy<RwLock<TypeRegistry>> = Lazy::new(|| RwLock::new(TypeRegistry::new()));

/// Register `T` in the process-wide registry.
pub fn register_type<T: StorableType>() -> Result<()> {
    GLOBAL_REGISTRY.write().register::<T>()
}

/// Read access to the process-wide registry.
///
/// Do not register types while holding the guard.
pub fn global() -> RwLockReadGuard<'static, TypeRegistry> {
    GLOBAL_REGISTRY.read()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storable::{Storable, downcast_ref};

    struct Beacon {
        id: StorableId,
        freq: i64,
    }

    impl Storable for Beacon {
        fn type_name(&self) -> &'static str {
            Self::TYPE_NAME
        }

        fn id(&self) -> &StorableId {
            &self.id
        }

        fn content(&self) -> Result<Content> {
            Ok(Content::new().with("freq", self.freq))
        }
    }

    impl StorableType for Beacon {
        const TYPE_NAME: &'static str = "registry_test.Beacon";

        fn from_stored(id: StorableId, content: Content) -> Result<Self> {
            Ok(Self {
                id,
                freq: content.i64_field("freq")?,
            })
        }
    }

    fn impostor(id: StorableId, content: Content) -> Result<StorableRef> {
        recreate_as::<Beacon>(id, content)
    }

    #[test]
    fn recreate_registered_type() {
        let mut registry = TypeRegistry::new();
        registry.register::<Beacon>().unwrap();
        let object = registry
            .recreate(Beacon::TYPE_NAME, "b1".into(), Content::new().with("freq", 87))
            .unwrap();
        assert_eq!(downcast_ref::<Beacon>(&object).unwrap().freq, 87);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = TypeRegistry::new();
        let err = registry
            .recreate("nope.Missing", "x".into(), Content::new())
            .err()
            .unwrap();
        match err {
            StorableError::UnknownType { type_name } => assert_eq!(type_name, "nope.Missing"),
            other => panic!("expected UnknownType, got {other:?}"),
        }
    }

    #[test]
    fn same_type_twice_is_idempotent() {
        let mut registry = TypeRegistry::new();
        registry.register::<Beacon>().unwrap();
        registry.register::<Beacon>().unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn name_collision_is_rejected() {
        let mut registry = TypeRegistry::new();
        registry.register::<Beacon>().unwrap();
        let err = registry
            .register_factory(Beacon::TYPE_NAME, impostor)
            .unwrap_err();
        assert!(matches!(err, StorableError::TypeNameCollision { .. }));
    }

    #[test]
    fn late_registration_is_visible() {
        assert!(!global().contains("registry_test.Late"));
        GLOBAL_REGISTRY
            .write()
            .register_factory("registry_test.Late", impostor)
            .unwrap();
        assert!(global().contains("registry_test.Late"));
    }
}
