//! Field values and the ordered field map a storable serializes into.
//!
//! A [`Value`] is one of the kinds every format adapter understands: a
//! scalar, a sequence, a string-keyed mapping, a nested storable, or a
//! reference to a storable by id. Anything else has to be converted first;
//! [`Value::from_serialize`] does that for serde types and reports
//! [`StorableError::UnsupportedFieldType`] when no conversion exists.

use crate::error::{Result, StorableError};
use crate::storable::StorableRef;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use stowage_common::{Scalar, StorableId};

/// A single field value.
///
/// Mappings use `BTreeMap` so iteration, and therefore output, is
/// deterministic.
#[derive(Clone)]
pub enum Value {
    Scalar(Scalar),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A nested object, written inline the first time the writer meets it.
    Storable(StorableRef),
    /// A link to another object by id. Loaded content holds these in place
    /// of every nested object.
    Reference(StorableId),
}

impl Value {
    pub fn reference(id: impl Into<StorableId>) -> Self {
        Value::Reference(id.into())
    }

    /// Convert any serde value into a field value.
    ///
    /// `field` is only used to name the culprit in the error.
    pub fn from_serialize<T: Serialize + ?Sized>(field: &str, value: &T) -> Result<Self> {
        let unsupported = || StorableError::UnsupportedFieldType {
            field: field.to_owned(),
            type_name: std::any::type_name::<T>().to_owned(),
        };
        let json = serde_json::to_value(value).map_err(|_| unsupported())?;
        from_json(json).ok_or_else(unsupported)
    }

    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Scalar(s) => s.kind(),
            Value::Seq(_) => "sequence",
            Value::Map(_) => "mapping",
            Value::Storable(_) => "storable",
            Value::Reference(_) => "reference",
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Scalar(Scalar::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and integers widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Scalar(Scalar::Float(x)) => Some(*x),
            Value::Scalar(Scalar::Int(i)) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&StorableId> {
        match self {
            Value::Reference(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_storable(&self) -> Option<&StorableRef> {
        match self {
            Value::Storable(object) => Some(object),
            _ => None,
        }
    }

    /// Plain-data view of this value. Fails on storables and references.
    fn to_json(&self, field: &str) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Scalar(Scalar::Bool(b)) => serde_json::Value::Bool(*b),
            Value::Scalar(Scalar::Int(i)) => serde_json::Value::from(*i),
            Value::Scalar(Scalar::Float(x)) => serde_json::Value::from(*x),
            Value::Scalar(Scalar::Str(s)) => serde_json::Value::String(s.clone()),
            Value::Seq(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| item.to_json(field))
                    .collect::<Result<_>>()?,
            ),
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json(field)?)))
                    .collect::<Result<_>>()?,
            ),
            Value::Storable(_) | Value::Reference(_) => {
                return Err(StorableError::FieldType {
                    field: field.to_owned(),
                    expected: "plain data",
                    found: self.kind(),
                });
            }
        })
    }
}

fn from_json(json: serde_json::Value) -> Option<Value> {
    Some(match json {
        serde_json::Value::Null => return None,
        serde_json::Value::Bool(b) => Value::Scalar(Scalar::Bool(b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Scalar(Scalar::Int(i)),
            // u64 beyond i64::MAX has no lossless representation.
            None if n.is_u64() => return None,
            None => Value::Scalar(Scalar::Float(n.as_f64()?)),
        },
        serde_json::Value::String(s) => Value::Scalar(Scalar::Str(s)),
        serde_json::Value::Array(items) => {
            Value::Seq(items.into_iter().map(from_json).collect::<Option<_>>()?)
        }
        serde_json::Value::Object(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| Some((k, from_json(v)?)))
                .collect::<Option<_>>()?,
        ),
    })
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{s:?}"),
            Value::Seq(items) => f.debug_list().entries(items).finish(),
            Value::Map(entries) => f.debug_map().entries(entries).finish(),
            Value::Storable(object) => match object.try_borrow() {
                Ok(object) => write!(f, "Storable({}#{})", object.type_name(), object.id()),
                Err(_) => f.write_str("Storable(<borrowed>)"),
            },
            Value::Reference(id) => write!(f, "Reference({id})"),
        }
    }
}

/// Storables compare by identity, everything else structurally.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Storable(a), Value::Storable(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            (Value::Reference(a), Value::Reference(b)) => a == b,
            _ => false,
        }
    }
}

macro_rules! scalar_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Scalar(Scalar::from(v))
            }
        })*
    };
}

scalar_value!(bool, i32, i64, u32, f64, &str, String);

impl From<Scalar> for Value {
    fn from(v: Scalar) -> Self {
        Value::Scalar(v)
    }
}

impl From<StorableRef> for Value {
    fn from(v: StorableRef) -> Self {
        Value::Storable(v)
    }
}

impl From<&StorableRef> for Value {
    fn from(v: &StorableRef) -> Self {
        Value::Storable(Rc::clone(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Seq(v)
    }
}

impl From<Vec<StorableRef>> for Value {
    fn from(v: Vec<StorableRef>) -> Self {
        Value::Seq(v.into_iter().map(Value::Storable).collect())
    }
}

impl From<&[StorableRef]> for Value {
    fn from(v: &[StorableRef]) -> Self {
        Value::Seq(v.iter().map(Value::from).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// The ordered field map of one storable.
///
/// Field order is insertion order and is preserved through every adapter.
/// Inserting an existing name replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Content {
    fields: Vec<(String, Value)>,
}

impl Content {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Content::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Insert any serde value, converting it with [`Value::from_serialize`].
    pub fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        let name = name.into();
        let value = Value::from_serialize(&name, value)?;
        self.insert(name, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn require(&self, name: &str) -> Result<&Value> {
        self.get(name).ok_or_else(|| StorableError::MissingField {
            field: name.to_owned(),
        })
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn str_field(&self, name: &str) -> Result<&str> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| mismatch(name, "a string", value))
    }

    pub fn i64_field(&self, name: &str) -> Result<i64> {
        let value = self.require(name)?;
        value.as_i64().ok_or_else(|| mismatch(name, "an integer", value))
    }

    pub fn f64_field(&self, name: &str) -> Result<f64> {
        let value = self.require(name)?;
        value.as_f64().ok_or_else(|| mismatch(name, "a number", value))
    }

    pub fn bool_field(&self, name: &str) -> Result<bool> {
        let value = self.require(name)?;
        value.as_bool().ok_or_else(|| mismatch(name, "a bool", value))
    }

    pub fn reference_field(&self, name: &str) -> Result<&StorableId> {
        let value = self.require(name)?;
        value
            .as_reference()
            .ok_or_else(|| mismatch(name, "a reference", value))
    }

    /// A sequence field whose items are all references.
    pub fn reference_list(&self, name: &str) -> Result<Vec<StorableId>> {
        let value = self.require(name)?;
        let items = value
            .as_seq()
            .ok_or_else(|| mismatch(name, "a sequence of references", value))?;
        items
            .iter()
            .map(|item| {
                item.as_reference()
                    .cloned()
                    .ok_or_else(|| mismatch(name, "a sequence of references", item))
            })
            .collect()
    }

    /// Decode a plain-data field into any serde type.
    pub fn field<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.require(name)?;
        let json = value.to_json(name)?;
        serde_json::from_value(json).map_err(|_| mismatch(name, std::any::type_name::<T>(), value))
    }
}

fn mismatch(field: &str, expected: &'static str, found: &Value) -> StorableError {
    StorableError::FieldType {
        field: field.to_owned(),
        expected,
        found: found.kind(),
    }
}

impl IntoIterator for Content {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Content {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut content = Content::new();
        for (name, value) in iter {
            content.insert(name, value);
        }
        content
    }
}
