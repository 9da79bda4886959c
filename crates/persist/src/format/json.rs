//! JSON adapter.
//!
//! Document layout:
//!
//! ```text
//! {
//!   "roots": ["a", "b"],
//!   "objects": [
//!     {"$type": "demo.Team", "$id": "a", "fields": {"name": "core", "lead": {"$ref": "b"}}},
//!     {"$ref": "b"}
//!   ],
//!   "count": 2
//! }
//! ```
//!
//! An object is a JSON object with `$type`, `$id` and `fields`; a
//! reference is `{"$ref": id}`; any other JSON object is a mapping. Mapping
//! keys starting with `$` are therefore refused when writing.

use super::{FormatReader, FormatWriter};
use crate::error::{PersistError, Result};
use crate::token::{Slot, Token};
use serde_json::{Map, Value as Json};
use std::io::{Read, Write};
use stowage_common::{Scalar, StorableId};

const TYPE_KEY: &str = "$type";
const ID_KEY: &str = "$id";
const FIELDS_KEY: &str = "fields";
const REF_KEY: &str = "$ref";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Document,
    Objects,
    Object,
    Fields,
    Sequence,
    Mapping,
}

/// Streaming JSON writer.
pub struct JsonWriter<W: Write> {
    out: W,
    pretty: bool,
    /// Open containers and whether each already holds an element.
    stack: Vec<(Container, bool)>,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            pretty: false,
            stack: Vec::new(),
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn newline(&mut self) -> Result<()> {
        if self.pretty {
            write!(self.out, "\n{:width$}", "", width = self.stack.len() * 2)?;
        }
        Ok(())
    }

    /// Separator, indentation and key for the next element.
    fn entry(&mut self, slot: &Slot) -> Result<()> {
        let (container, has_elements) = self
            .stack
            .last_mut()
            .ok_or_else(|| PersistError::malformed("JSON value outside the document"))?;
        let container = *container;
        if std::mem::replace(has_elements, true) {
            self.out.write_all(b",")?;
        }
        self.newline()?;
        if let Slot::Field(key) = slot {
            if container == Container::Mapping && key.starts_with('$') {
                return Err(PersistError::malformed(format!(
                    "mapping key `{key}` is reserved in JSON"
                )));
            }
            serde_json::to_writer(&mut self.out, key)?;
            self.out
                .write_all(if self.pretty { b": " } else { b":" })?;
        }
        Ok(())
    }

    fn open_container(&mut self, container: Container, bracket: &[u8]) -> Result<()> {
        self.out.write_all(bracket)?;
        self.stack.push((container, false));
        Ok(())
    }

    fn close_container(&mut self, expected: Container, bracket: &[u8]) -> Result<()> {
        match self.stack.pop() {
            Some((container, has_elements)) if container == expected => {
                if has_elements {
                    self.newline()?;
                }
                self.out.write_all(bracket)?;
                Ok(())
            }
            _ => Err(PersistError::malformed(format!(
                "unbalanced close of {expected:?}"
            ))),
        }
    }
}

impl<W: Write> FormatWriter for JsonWriter<W> {
    fn open(&mut self) -> Result<()> {
        self.stack.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    fn write_header(&mut self, roots: &[StorableId]) -> Result<()> {
        self.open_container(Container::Document, b"{")?;
        self.entry(&Slot::field("roots"))?;
        serde_json::to_writer(&mut self.out, roots)?;
        self.entry(&Slot::field("objects"))?;
        self.open_container(Container::Objects, b"[")
    }

    fn write_footer(&mut self, objects: u64) -> Result<()> {
        self.close_container(Container::Objects, b"]")?;
        self.entry(&Slot::field("count"))?;
        write!(self.out, "{objects}")?;
        self.close_container(Container::Document, b"}")?;
        if self.pretty {
            self.out.write_all(b"\n")?;
        }
        Ok(())
    }

    fn begin_object(&mut self, slot: &Slot, type_name: &str, id: &StorableId) -> Result<()> {
        self.entry(slot)?;
        self.open_container(Container::Object, b"{")?;
        self.entry(&Slot::field(TYPE_KEY))?;
        serde_json::to_writer(&mut self.out, type_name)?;
        self.entry(&Slot::field(ID_KEY))?;
        serde_json::to_writer(&mut self.out, id)?;
        self.entry(&Slot::field(FIELDS_KEY))?;
        self.open_container(Container::Fields, b"{")
    }

    fn end_object(&mut self) -> Result<()> {
        self.close_container(Container::Fields, b"}")?;
        self.close_container(Container::Object, b"}")
    }

    fn write_reference(&mut self, slot: &Slot, id: &StorableId) -> Result<()> {
        self.entry(slot)?;
        let mut reference = Map::new();
        reference.insert(REF_KEY.to_owned(), Json::String(id.to_string()));
        serde_json::to_writer(&mut self.out, &reference)?;
        Ok(())
    }

    fn write_scalar(&mut self, slot: &Slot, value: &Scalar) -> Result<()> {
        if let Scalar::Float(x) = value {
            if !x.is_finite() {
                return Err(PersistError::malformed(format!(
                    "{x} has no JSON representation"
                )));
            }
        }
        self.entry(slot)?;
        match value {
            Scalar::Bool(b) => serde_json::to_writer(&mut self.out, b)?,
            Scalar::Int(i) => serde_json::to_writer(&mut self.out, i)?,
            Scalar::Float(x) => serde_json::to_writer(&mut self.out, x)?,
            Scalar::Str(s) => serde_json::to_writer(&mut self.out, s)?,
        }
        Ok(())
    }

    fn begin_sequence(&mut self, slot: &Slot) -> Result<()> {
        self.entry(slot)?;
        self.open_container(Container::Sequence, b"[")
    }

    fn end_sequence(&mut self) -> Result<()> {
        self.close_container(Container::Sequence, b"]")
    }

    fn begin_mapping(&mut self, slot: &Slot) -> Result<()> {
        self.entry(slot)?;
        self.open_container(Container::Mapping, b"{")
    }

    fn end_mapping(&mut self) -> Result<()> {
        self.close_container(Container::Mapping, b"}")
    }
}

/// What to emit once a cursor runs dry.
enum End {
    Footer(u64),
    Object,
    Sequence,
    Mapping,
}

enum Cursor {
    Items(std::vec::IntoIter<Json>, End),
    Entries(serde_json::map::IntoIter, End),
}

/// JSON reader. Parses the document on `open`, then walks it one token
/// per call.
pub struct JsonReader<R: Read> {
    source: Option<R>,
    header: Option<Token>,
    cursors: Vec<Cursor>,
}

impl<R: Read> JsonReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source: Some(source),
            header: None,
            cursors: Vec::new(),
        }
    }

    /// Turn one JSON value into its opening token, descending into it.
    fn descend(&mut self, slot: Slot, value: Json) -> Result<Token> {
        Ok(match value {
            Json::Null => return Err(PersistError::malformed("null is not a storable value")),
            Json::Bool(b) => Token::Scalar {
                slot,
                value: Scalar::Bool(b),
            },
            Json::Number(n) => {
                let value = match n.as_i64() {
                    Some(i) => Scalar::Int(i),
                    None => Scalar::Float(n.as_f64().ok_or_else(|| {
                        PersistError::malformed(format!("number {n} out of range"))
                    })?),
                };
                Token::Scalar { slot, value }
            }
            Json::String(s) => Token::Scalar {
                slot,
                value: Scalar::Str(s),
            },
            Json::Array(items) => {
                self.cursors
                    .push(Cursor::Items(items.into_iter(), End::Sequence));
                Token::BeginSequence { slot }
            }
            Json::Object(mut map) => {
                if let Some(id) = map.remove(REF_KEY) {
                    let id: StorableId = string_field(REF_KEY, id)?.into();
                    no_extra_keys(&map, || format!("reference to `{id}`"))?;
                    Token::Reference { slot, id }
                } else if let Some(type_name) = map.remove(TYPE_KEY) {
                    let type_name = string_field(TYPE_KEY, type_name)?;
                    let id = map
                        .remove(ID_KEY)
                        .ok_or_else(|| PersistError::malformed("object without `$id`"))?;
                    let id: StorableId = string_field(ID_KEY, id)?.into();
                    let fields = match map.remove(FIELDS_KEY) {
                        Some(Json::Object(fields)) => fields,
                        None => Map::new(),
                        Some(_) => {
                            return Err(PersistError::malformed(format!(
                                "`{FIELDS_KEY}` of `{id}` is not an object"
                            )));
                        }
                    };
                    no_extra_keys(&map, || format!("object `{id}`"))?;
                    self.cursors
                        .push(Cursor::Entries(fields.into_iter(), End::Object));
                    Token::BeginObject {
                        slot,
                        type_name,
                        id,
                    }
                } else {
                    self.cursors
                        .push(Cursor::Entries(map.into_iter(), End::Mapping));
                    Token::BeginMapping { slot }
                }
            }
        })
    }
}

/// Fails when `map` still holds keys after the known ones were taken out.
fn no_extra_keys(map: &Map<String, Json>, what: impl FnOnce() -> String) -> Result<()> {
    if map.is_empty() {
        return Ok(());
    }
    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
    Err(PersistError::malformed(format!(
        "unexpected keys {keys:?} in {}",
        what()
    )))
}

fn string_field(key: &str, value: Json) -> Result<String> {
    match value {
        Json::String(s) => Ok(s),
        other => Err(PersistError::malformed(format!(
            "`{key}` should be a string, found {other}"
        ))),
    }
}

impl<R: Read> FormatReader for JsonReader<R> {
    fn open(&mut self) -> Result<()> {
        let source = self
            .source
            .take()
            .ok_or_else(|| PersistError::malformed("JSON source already consumed"))?;
        let document: Json = serde_json::from_reader(source)?;
        let Json::Object(mut document) = document else {
            return Err(PersistError::malformed("document is not a JSON object"));
        };

        let roots = match document.remove("roots") {
            Some(Json::Array(roots)) => roots
                .into_iter()
                .map(|root| string_field("roots", root).map(StorableId::from))
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(PersistError::malformed("missing `roots` array")),
        };
        let objects = match document.remove("objects") {
            Some(Json::Array(objects)) => objects,
            _ => return Err(PersistError::malformed("missing `objects` array")),
        };
        let count = document
            .remove("count")
            .and_then(|count| count.as_u64())
            .ok_or_else(|| PersistError::malformed("missing object `count`"))?;
        no_extra_keys(&document, || "the document".to_owned())?;

        self.header = Some(Token::Header { roots });
        self.cursors
            .push(Cursor::Items(objects.into_iter(), End::Footer(count)));
        Ok(())
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        if let Some(header) = self.header.take() {
            return Ok(Some(header));
        }
        let next = match self.cursors.last_mut() {
            None => return Ok(None),
            Some(Cursor::Items(items, _)) => items.next().map(|value| (Slot::Item, value)),
            Some(Cursor::Entries(entries, _)) => {
                entries.next().map(|(key, value)| (Slot::Field(key), value))
            }
        };
        if let Some((slot, value)) = next {
            return self.descend(slot, value).map(Some);
        }
        let end = match self.cursors.pop() {
            Some(Cursor::Items(_, end) | Cursor::Entries(_, end)) => end,
            None => return Ok(None),
        };
        Ok(Some(match end {
            End::Footer(objects) => Token::Footer { objects },
            End::Object => Token::EndObject,
            End::Sequence => Token::EndSequence,
            End::Mapping => Token::EndMapping,
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.header = None;
        self.cursors.clear();
        Ok(())
    }
}
