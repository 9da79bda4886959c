//! Graph loader: rebuilds the id → object map in three ordered passes.
//!
//! 1. Instantiate: parse tokens into records and recreate each one through
//!    the registry as soon as its body ends. Nested objects and references
//!    become `Value::Reference` placeholders in the owner's content.
//! 2. Link: check that every placeholder and root resolves, then call
//!    `link_storable` for every placeholder.
//! 3. Finish: call `deserialize` on every object.
//!
//! Forward references are legal, so no pass starts before the previous one
//! has finished for the whole graph.

use crate::error::{PersistError, Result};
use crate::format::FormatReader;
use crate::token::{Slot, Token};
use std::cell::Ref;
use std::collections::BTreeMap;
use stowage_common::StorableId;
use stowage_kernel::{Content, Storable, StorableRef, TypeRegistry, Value, downcast_ref};
use tracing::{debug, info, warn};

/// The result of a load: every object by id plus the root manifest.
pub struct LoadedGraph {
    roots: Vec<StorableId>,
    objects: BTreeMap<StorableId, StorableRef>,
}

impl LoadedGraph {
    /// Ids the writer was asked to save, in order.
    pub fn roots(&self) -> &[StorableId] {
        &self.roots
    }

    pub fn root_objects(&self) -> Vec<StorableRef> {
        self.roots
            .iter()
            .filter_map(|id| self.objects.get(id).cloned())
            .collect()
    }

    pub fn get(&self, id: &StorableId) -> Option<&StorableRef> {
        self.objects.get(id)
    }

    /// Borrow an object as its concrete type.
    pub fn get_as<T: Storable>(&self, id: &StorableId) -> Option<Ref<'_, T>> {
        self.objects.get(id).and_then(downcast_ref::<T>)
    }

    pub fn contains(&self, id: &StorableId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn objects(&self) -> &BTreeMap<StorableId, StorableRef> {
        &self.objects
    }

    pub fn into_objects(self) -> BTreeMap<StorableId, StorableRef> {
        self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl std::fmt::Debug for LoadedGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedGraph")
            .field("roots", &self.roots)
            .field("objects", &self.objects.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Load a graph from `format`, recreating objects through `registry`.
///
/// The source is opened here and closed before linking starts, on every
/// exit path.
pub fn read_graph<F>(format: &mut F, registry: &TypeRegistry) -> Result<LoadedGraph>
where
    F: FormatReader + ?Sized,
{
    format.open()?;
    let parsed = Instantiate::new(registry).run(format);
    let closed = format.close();
    let parsed = match (parsed, closed) {
        (Ok(parsed), Ok(())) => parsed,
        (Ok(_), Err(err)) => return Err(err),
        (Err(err), close_result) => {
            if let Err(close_err) = close_result {
                warn!(error = %close_err, "closing source after failed load also failed");
            }
            warn!(error = %err, "graph load aborted");
            return Err(err);
        }
    };
    debug!(objects = parsed.objects.len(), "instantiate pass done");

    parsed.link()?;
    debug!("link pass done");

    for object in parsed.objects.values() {
        object.borrow_mut().deserialize()?;
    }
    info!(
        roots = parsed.roots.len(),
        objects = parsed.objects.len(),
        "graph loaded"
    );

    Ok(LoadedGraph {
        roots: parsed.roots,
        objects: parsed.objects,
    })
}

/// An instantiated object and the placeholders its content holds.
struct Record {
    id: StorableId,
    references: Vec<StorableId>,
}

enum Frame {
    Object {
        slot: Slot,
        type_name: String,
        id: StorableId,
        content: Content,
        references: Vec<StorableId>,
    },
    Sequence {
        slot: Slot,
        items: Vec<Value>,
    },
    Mapping {
        slot: Slot,
        entries: BTreeMap<String, Value>,
    },
}

/// Output of the first pass.
struct Parsed {
    roots: Vec<StorableId>,
    objects: BTreeMap<StorableId, StorableRef>,
    records: Vec<Record>,
    /// Top-level reference tokens: roots already written inside another
    /// root.
    root_references: Vec<StorableId>,
}

impl Parsed {
    fn link(&self) -> Result<()> {
        // Resolve everything up front so a failure leaves nothing linked.
        for record in &self.records {
            if let Some(id) = record
                .references
                .iter()
                .find(|id| !self.objects.contains_key(*id))
            {
                return Err(PersistError::DanglingReference {
                    owner: record.id.clone(),
                    id: id.clone(),
                });
            }
        }
        if let Some(id) = self
            .roots
            .iter()
            .chain(&self.root_references)
            .find(|id| !self.objects.contains_key(*id))
        {
            return Err(PersistError::MissingRoot { id: id.clone() });
        }

        for record in &self.records {
            let owner = &self.objects[&record.id];
            for id in &record.references {
                let target = self.objects[id].clone();
                owner.borrow_mut().link_storable(id, target)?;
            }
        }
        Ok(())
    }
}

/// First pass state machine over the token stream.
struct Instantiate<'r> {
    registry: &'r TypeRegistry,
    stack: Vec<Frame>,
    roots: Option<Vec<StorableId>>,
    footer: Option<u64>,
    objects: BTreeMap<StorableId, StorableRef>,
    records: Vec<Record>,
    root_references: Vec<StorableId>,
}

impl<'r> Instantiate<'r> {
    fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            stack: Vec::new(),
            roots: None,
            footer: None,
            objects: BTreeMap::new(),
            records: Vec::new(),
            root_references: Vec::new(),
        }
    }

    fn run<F: FormatReader + ?Sized>(mut self, format: &mut F) -> Result<Parsed> {
        while let Some(token) = format.next_token()? {
            self.accept(token)?;
        }
        if self.footer.is_none() {
            return Err(PersistError::malformed("stream ended before the footer"));
        }
        Ok(Parsed {
            roots: self.roots.unwrap_or_default(),
            objects: self.objects,
            records: self.records,
            root_references: self.root_references,
        })
    }

    fn accept(&mut self, token: Token) -> Result<()> {
        if self.footer.is_some() {
            return Err(PersistError::malformed(format!("`{token}` after the footer")));
        }
        if self.roots.is_none() {
            return match token {
                Token::Header { roots } => {
                    self.roots = Some(roots);
                    Ok(())
                }
                other => Err(PersistError::malformed(format!(
                    "expected header, found `{other}`"
                ))),
            };
        }

        match token {
            Token::Header { .. } => Err(PersistError::malformed("second header")),
            Token::Footer { objects } => {
                if !self.stack.is_empty() {
                    return Err(PersistError::malformed("footer inside an open container"));
                }
                if objects != self.records.len() as u64 {
                    return Err(PersistError::malformed(format!(
                        "footer counts {objects} objects, stream holds {}",
                        self.records.len()
                    )));
                }
                self.footer = Some(objects);
                Ok(())
            }
            Token::BeginObject {
                slot,
                type_name,
                id,
            } => {
                self.stack.push(Frame::Object {
                    slot,
                    type_name,
                    id,
                    content: Content::new(),
                    references: Vec::new(),
                });
                Ok(())
            }
            Token::EndObject => match self.stack.pop() {
                Some(Frame::Object {
                    slot,
                    type_name,
                    id,
                    content,
                    references,
                }) => self.finish_object(slot, &type_name, id, content, references),
                _ => Err(PersistError::malformed("unbalanced end of object")),
            },
            Token::Reference { slot, id } => self.attach_reference(slot, id),
            Token::Scalar { slot, value } => self.attach(slot, Value::Scalar(value)),
            Token::BeginSequence { slot } => {
                self.stack.push(Frame::Sequence {
                    slot,
                    items: Vec::new(),
                });
                Ok(())
            }
            Token::EndSequence => match self.stack.pop() {
                Some(Frame::Sequence { slot, items }) => self.attach(slot, Value::Seq(items)),
                _ => Err(PersistError::malformed("unbalanced end of sequence")),
            },
            Token::BeginMapping { slot } => {
                self.stack.push(Frame::Mapping {
                    slot,
                    entries: BTreeMap::new(),
                });
                Ok(())
            }
            Token::EndMapping => match self.stack.pop() {
                Some(Frame::Mapping { slot, entries }) => self.attach(slot, Value::Map(entries)),
                _ => Err(PersistError::malformed("unbalanced end of mapping")),
            },
        }
    }

    fn finish_object(
        &mut self,
        slot: Slot,
        type_name: &str,
        id: StorableId,
        content: Content,
        references: Vec<StorableId>,
    ) -> Result<()> {
        if self.objects.contains_key(&id) {
            return Err(PersistError::DuplicateId { id });
        }
        let object = self.registry.recreate(type_name, id.clone(), content)?;
        self.objects.insert(id.clone(), object);
        self.records.push(Record {
            id: id.clone(),
            references,
        });
        if self.stack.is_empty() {
            check_top_level(&slot)?;
            Ok(())
        } else {
            self.attach_reference(slot, id)
        }
    }

    fn attach_reference(&mut self, slot: Slot, id: StorableId) -> Result<()> {
        let owner = self.stack.iter_mut().rev().find_map(|frame| match frame {
            Frame::Object { references, .. } => Some(references),
            _ => None,
        });
        match owner {
            Some(references) => {
                references.push(id.clone());
                self.attach(slot, Value::Reference(id))
            }
            None => {
                check_top_level(&slot)?;
                self.root_references.push(id);
                Ok(())
            }
        }
    }

    /// Place a finished value into the innermost open container.
    fn attach(&mut self, slot: Slot, value: Value) -> Result<()> {
        match (self.stack.last_mut(), slot) {
            (Some(Frame::Object { content, .. }), Slot::Field(name)) => {
                if content.contains(&name) {
                    return Err(PersistError::malformed(format!("field `{name}` repeated")));
                }
                content.insert(name, value);
                Ok(())
            }
            (Some(Frame::Mapping { entries, .. }), Slot::Field(key)) => {
                if entries.insert(key.clone(), value).is_some() {
                    return Err(PersistError::malformed(format!("key `{key}` repeated")));
                }
                Ok(())
            }
            (Some(Frame::Sequence { items, .. }), Slot::Item) => {
                items.push(value);
                Ok(())
            }
            (None, _) => Err(PersistError::malformed(format!(
                "top-level {} outside any object",
                value.kind()
            ))),
            (Some(_), slot) => Err(PersistError::malformed(format!(
                "slot `{slot}` does not fit its container"
            ))),
        }
    }
}

fn check_top_level(slot: &Slot) -> Result<()> {
    match slot {
        Slot::Item => Ok(()),
        Slot::Field(name) => Err(PersistError::malformed(format!(
            "top-level entry carries field name `{name}`"
        ))),
    }
}
