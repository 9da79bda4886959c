//! Graph writer: emits every distinct storable exactly once.
//!
//! Roots are walked depth-first in field order. The first visit of an id
//! writes the full body; every later visit writes a reference token. This
//! bounds body emission to one per node and makes cycles terminate.

use crate::error::{PersistError, Result};
use crate::format::FormatWriter;
use crate::token::Slot;
use std::collections::HashMap;
use std::rc::Rc;
use stowage_common::{Scalar, StorableId};
use stowage_kernel::{StorableError, StorableRef, Value};
use tracing::{debug, info, warn};

/// Counts reported by a finished write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub roots: usize,
    /// Full object bodies written.
    pub objects: u64,
    /// Reference tokens written, including explicit `Value::Reference`s.
    pub references: u64,
}

/// Write `roots` and everything reachable from them through `format`.
///
/// The sink is opened here and closed on every exit path. When both the
/// write and the close fail, the write error is returned.
pub fn write_graph<F>(format: &mut F, roots: &[StorableRef]) -> Result<WriteSummary>
where
    F: FormatWriter + ?Sized,
{
    format.open()?;
    let result = GraphWriter::new(format).write(roots);
    let closed = format.close();
    match (result, closed) {
        (Ok(summary), Ok(())) => {
            info!(
                roots = summary.roots,
                objects = summary.objects,
                references = summary.references,
                "graph written"
            );
            Ok(summary)
        }
        (Ok(_), Err(err)) => Err(err),
        (Err(err), close_result) => {
            if let Err(close_err) = close_result {
                warn!(error = %close_err, "closing sink after failed write also failed");
            }
            warn!(error = %err, "graph write aborted");
            Err(err)
        }
    }
}

/// One write session. Owns the already-written map; never reused.
struct GraphWriter<'a, F: FormatWriter + ?Sized> {
    format: &'a mut F,
    /// Every object whose body has been written, by id.
    written: HashMap<StorableId, StorableRef>,
    summary: WriteSummary,
}

impl<'a, F: FormatWriter + ?Sized> GraphWriter<'a, F> {
    fn new(format: &'a mut F) -> Self {
        Self {
            format,
            written: HashMap::new(),
            summary: WriteSummary::default(),
        }
    }

    fn write(mut self, roots: &[StorableRef]) -> Result<WriteSummary> {
        let ids: Vec<StorableId> = roots.iter().map(|root| root.borrow().id().clone()).collect();
        self.summary.roots = ids.len();
        self.format.write_header(&ids)?;
        for root in roots {
            self.write_storable(&Slot::Item, root)?;
        }
        self.format.write_footer(self.summary.objects)?;
        Ok(self.summary)
    }

    fn write_storable(&mut self, slot: &Slot, object: &StorableRef) -> Result<()> {
        let id = object.borrow().id().clone();
        if let Some(earlier) = self.written.get(&id) {
            if !Rc::ptr_eq(earlier, object) {
                return Err(PersistError::DuplicateId { id });
            }
            debug!(%id, "already written, emitting reference");
            self.summary.references += 1;
            return self.format.write_reference(slot, &id);
        }
        self.written.insert(id, object.clone());

        // Serialize and check before emitting anything so a bad field
        // leaves no half-written body behind.
        let serialized = object.borrow().serialize()?;
        for (name, value) in serialized.content.iter() {
            check_finite(name, value)?;
        }
        debug!(type_name = serialized.type_name, id = %serialized.id, "writing storable");
        self.format
            .begin_object(slot, serialized.type_name, &serialized.id)?;
        for (name, value) in serialized.content {
            self.write_value(&Slot::Field(name), value)?;
        }
        self.format.end_object()?;
        self.summary.objects += 1;
        Ok(())
    }

    fn write_value(&mut self, slot: &Slot, value: Value) -> Result<()> {
        match value {
            Value::Scalar(scalar) => self.format.write_scalar(slot, &scalar),
            Value::Seq(items) => {
                self.format.begin_sequence(slot)?;
                for item in items {
                    self.write_value(&Slot::Item, item)?;
                }
                self.format.end_sequence()
            }
            Value::Map(entries) => {
                self.format.begin_mapping(slot)?;
                for (key, item) in entries {
                    self.write_value(&Slot::Field(key), item)?;
                }
                self.format.end_mapping()
            }
            Value::Storable(object) => self.write_storable(slot, &object),
            Value::Reference(id) => {
                self.summary.references += 1;
                self.format.write_reference(slot, &id)
            }
        }
    }
}

/// Reject NaN and infinities anywhere in a plain-data value. Nested
/// storables are checked when their own body is written.
fn check_finite(field: &str, value: &Value) -> Result<()> {
    match value {
        Value::Scalar(Scalar::Float(x)) if !x.is_finite() => {
            Err(StorableError::UnsupportedFieldType {
                field: field.to_owned(),
                type_name: "f64".to_owned(),
            }
            .into())
        }
        Value::Seq(items) => items.iter().try_for_each(|item| check_finite(field, item)),
        Value::Map(entries) => entries
            .values()
            .try_for_each(|item| check_finite(field, item)),
        _ => Ok(()),
    }
}
