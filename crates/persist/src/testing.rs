//! Storable fixtures shared by the unit tests of this crate.

use std::cell::RefCell;
use stowage_common::StorableId;
use stowage_kernel::{
    Content, Result, Storable, StorableError, StorableRef, StorableType, TypeRegistry, Value,
    downcast_mut, shared,
};

thread_local! {
    /// Link and finalize calls in the order they happened on this thread.
    pub static CALLS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

pub fn take_calls() -> Vec<String> {
    CALLS.with(|calls| std::mem::take(&mut *calls.borrow_mut()))
}

fn record(call: String) {
    CALLS.with(|calls| calls.borrow_mut().push(call));
}

/// A labelled node with ordered outgoing links.
pub struct Node {
    pub id: StorableId,
    pub label: String,
    pub links: Vec<StorableRef>,
    pub pending: Vec<StorableId>,
    pub finalized: bool,
}

impl Node {
    pub const NAME: &'static str = "test.Node";

    pub fn link(from: &StorableRef, to: &StorableRef) {
        downcast_mut::<Node>(from)
            .expect("not a node")
            .links
            .push(to.clone());
    }
}

pub fn node(id: &str, label: &str) -> StorableRef {
    shared(Node {
        id: id.into(),
        label: label.into(),
        links: Vec::new(),
        pending: Vec::new(),
        finalized: false,
    })
}

impl Storable for Node {
    fn type_name(&self) -> &'static str {
        Self::NAME
    }

    fn id(&self) -> &StorableId {
        &self.id
    }

    fn content(&self) -> Result<Content> {
        Ok(Content::new()
            .with("label", self.label.as_str())
            .with("links", self.links.as_slice()))
    }

    fn link_storable(&mut self, id: &StorableId, object: StorableRef) -> Result<()> {
        if !self.pending.contains(id) {
            return Err(StorableError::UnexpectedReference {
                owner: self.id.clone(),
                id: id.clone(),
            });
        }
        record(format!("link {}->{}", self.id, id));
        self.links.push(object);
        Ok(())
    }

    fn deserialize(&mut self) -> Result<()> {
        if self.links.len() != self.pending.len() {
            return Err(StorableError::Invalid {
                id: self.id.clone(),
                reason: "finalized before every link arrived".into(),
            });
        }
        record(format!("finalize {}", self.id));
        self.finalized = true;
        Ok(())
    }
}

impl StorableType for Node {
    const TYPE_NAME: &'static str = Self::NAME;

    fn from_stored(id: StorableId, content: Content) -> Result<Self> {
        Ok(Self {
            id,
            label: content.str_field("label")?.to_owned(),
            links: Vec::new(),
            pending: content.reference_list("links")?,
            finalized: false,
        })
    }
}

/// A storable whose only field has no storable representation.
pub struct Opaque {
    pub id: StorableId,
}

impl Storable for Opaque {
    fn type_name(&self) -> &'static str {
        "test.Opaque"
    }

    fn id(&self) -> &StorableId {
        &self.id
    }

    fn content(&self) -> Result<Content> {
        let mut content = Content::new();
        content.serialize_field("nothing", &())?;
        Ok(content)
    }
}

/// A measurement kept as a plain float and inside a history list.
pub struct Gauge {
    pub id: StorableId,
    pub reading: f64,
}

impl Storable for Gauge {
    fn type_name(&self) -> &'static str {
        "test.Gauge"
    }

    fn id(&self) -> &StorableId {
        &self.id
    }

    fn content(&self) -> Result<Content> {
        Ok(Content::new()
            .with("history", vec![Value::from(0.5), Value::from(self.reading)])
            .with("reading", self.reading))
    }
}

pub fn gauge(id: &str, reading: f64) -> StorableRef {
    shared(Gauge {
        id: id.into(),
        reading,
    })
}

pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register::<Node>()
        .expect("fresh registry accepts Node");
    registry
}

/// Label and link ids of a node, for structural comparisons.
pub fn describe(object: &StorableRef) -> (String, Vec<String>) {
    let object = object.borrow();
    let content = object.content().expect("node content");
    let label = content.str_field("label").expect("label").to_owned();
    let links = match content.get("links") {
        Some(Value::Seq(items)) => items
            .iter()
            .map(|item| match item {
                Value::Storable(s) => s.borrow().id().to_string(),
                other => format!("{other:?}"),
            })
            .collect(),
        _ => Vec::new(),
    };
    (label, links)
}
