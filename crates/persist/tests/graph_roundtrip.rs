//! End-to-end graph persistence through real files.

use serde::{Deserialize, Serialize};
use std::rc::Rc;
use stowage_kernel::{
    Content, Result, Storable, StorableError, StorableId, StorableRef, StorableType,
    TypeRegistry, Value, downcast_mut, register_type, shared,
};
use stowage_persist::{Format, LoadedGraph, PersistConfig, PersistError, load, load_global, save};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Edition {
    isbn: String,
    pages: u32,
    tags: Vec<String>,
    subtitle: Option<String>,
}

struct Author {
    id: StorableId,
    name: String,
    born: i64,
    books: Vec<StorableRef>,
    pending: Vec<StorableId>,
    finished: bool,
}

struct Book {
    id: StorableId,
    title: String,
    rating: f64,
    in_print: bool,
    edition: Edition,
    author: Option<StorableRef>,
    pending_author: Option<StorableId>,
}

impl Storable for Author {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn id(&self) -> &StorableId {
        &self.id
    }

    fn content(&self) -> Result<Content> {
        Ok(Content::new()
            .with("name", self.name.as_str())
            .with("born", self.born)
            .with("books", self.books.as_slice()))
    }

    fn link_storable(&mut self, id: &StorableId, object: StorableRef) -> Result<()> {
        let expected = self.pending.get(self.books.len());
        if expected != Some(id) {
            return Err(StorableError::UnexpectedReference {
                owner: self.id.clone(),
                id: id.clone(),
            });
        }
        self.books.push(object);
        Ok(())
    }

    fn deserialize(&mut self) -> Result<()> {
        self.finished = self.books.len() == self.pending.len();
        Ok(())
    }
}

impl StorableType for Author {
    const TYPE_NAME: &'static str = "catalogue.Author";

    fn from_stored(id: StorableId, content: Content) -> Result<Self> {
        Ok(Self {
            id,
            name: content.str_field("name")?.to_owned(),
            born: content.i64_field("born")?,
            books: Vec::new(),
            pending: content.reference_list("books")?,
            finished: false,
        })
    }
}

impl Storable for Book {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn id(&self) -> &StorableId {
        &self.id
    }

    fn content(&self) -> Result<Content> {
        let mut content = Content::new()
            .with("title", self.title.as_str())
            .with("rating", self.rating)
            .with("in_print", self.in_print);
        content.serialize_field("edition", &self.edition)?;
        if let Some(author) = &self.author {
            content.insert("author", author);
        }
        Ok(content)
    }

    fn link_storable(&mut self, id: &StorableId, object: StorableRef) -> Result<()> {
        if self.pending_author.as_ref() != Some(id) {
            return Err(StorableError::UnexpectedReference {
                owner: self.id.clone(),
                id: id.clone(),
            });
        }
        self.author = Some(object);
        Ok(())
    }
}

impl StorableType for Book {
    const TYPE_NAME: &'static str = "catalogue.Book";

    fn from_stored(id: StorableId, content: Content) -> Result<Self> {
        Ok(Self {
            id,
            title: content.str_field("title")?.to_owned(),
            rating: content.f64_field("rating")?,
            in_print: content.bool_field("in_print")?,
            edition: content.field("edition")?,
            author: None,
            pending_author: content
                .get("author")
                .and_then(Value::as_reference)
                .cloned(),
        })
    }
}

fn author(id: &str, name: &str, born: i64) -> StorableRef {
    shared(Author {
        id: id.into(),
        name: name.into(),
        born,
        books: Vec::new(),
        pending: Vec::new(),
        finished: false,
    })
}

fn book(id: &str, title: &str, subtitle: Option<&str>) -> StorableRef {
    shared(Book {
        id: id.into(),
        title: title.into(),
        rating: 4.5,
        in_print: true,
        edition: Edition {
            isbn: format!("isbn-{id}"),
            pages: 320,
            tags: vec!["fiction".into(), "classic".into()],
            subtitle: subtitle.map(str::to_owned),
        },
        author: None,
        pending_author: None,
    })
}

fn write_by(author: &StorableRef, book: &StorableRef) {
    downcast_mut::<Author>(author)
        .unwrap()
        .books
        .push(book.clone());
    downcast_mut::<Book>(book).unwrap().author = Some(author.clone());
}

fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry.register::<Author>().unwrap();
    registry.register::<Book>().unwrap();
    registry
}

/// Two authors sharing a co-written book; each book points back at its
/// first author.
fn catalogue() -> Vec<StorableRef> {
    let le_guin = author("au-1", "Ursula", 1929);
    let pratchett = author("au-2", "Terry", 1948);
    let earthsea = book("bk-1", "Earthsea", Some("the first book"));
    let joint = book("bk-2", "Joint Work", Some("a collaboration"));
    write_by(&le_guin, &earthsea);
    write_by(&le_guin, &joint);
    downcast_mut::<Author>(&pratchett)
        .unwrap()
        .books
        .push(joint.clone());
    vec![le_guin, pratchett]
}

fn check_catalogue(graph: &LoadedGraph) {
    assert_eq!(graph.len(), 4);
    let roots = graph.root_objects();
    assert_eq!(roots.len(), 2);

    let ursula = graph.get_as::<Author>(&"au-1".into()).unwrap();
    let terry = graph.get_as::<Author>(&"au-2".into()).unwrap();
    assert_eq!(ursula.name, "Ursula");
    assert_eq!(terry.born, 1948);
    assert!(ursula.finished && terry.finished);

    // The co-written book is one object reachable from both authors.
    assert!(Rc::ptr_eq(&ursula.books[1], &terry.books[0]));
    assert!(Rc::ptr_eq(&ursula.books[1], graph.get(&"bk-2".into()).unwrap()));

    // Back-references close the cycle onto the loaded root.
    let earthsea = graph.get_as::<Book>(&"bk-1".into()).unwrap();
    assert!(Rc::ptr_eq(earthsea.author.as_ref().unwrap(), &roots[0]));
    assert_eq!(earthsea.rating, 4.5);
    assert!(earthsea.in_print);
    assert_eq!(earthsea.edition.pages, 320);
    assert_eq!(earthsea.edition.subtitle.as_deref(), Some("the first book"));
}

#[test]
fn catalogue_roundtrips_through_every_format() {
    let tmp = tempfile::tempdir().unwrap();
    for format in Format::ALL {
        let path = tmp.path().join(format!("catalogue.{}", format.extension()));
        let summary = save(&path, &catalogue(), &PersistConfig::default()).unwrap();
        assert_eq!(summary.roots, 2);
        assert_eq!(summary.objects, 4);

        let graph = load(&path, &registry()).unwrap();
        check_catalogue(&graph);
    }
}

#[test]
fn json_file_holds_each_body_once() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("catalogue.json");
    save(&path, &catalogue(), &PersistConfig::default()).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.matches(r#""$id": "bk-2""#).count(), 1);
    assert_eq!(text.matches(r#"{"$ref":"bk-2"}"#).count(), 1);
    assert_eq!(text.matches(r#"{"$ref":"au-1"}"#).count(), 2);
}

#[test]
fn global_registry_loads_registered_types() {
    register_type::<Author>().unwrap();
    register_type::<Book>().unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("catalogue.cbor.zst");
    save(&path, &catalogue(), &PersistConfig::default()).unwrap();
    check_catalogue(&load_global(&path).unwrap());
}

/// Registers `Imprint` the first time one is read back.
struct Publisher {
    id: StorableId,
}

struct Imprint {
    id: StorableId,
}

impl Storable for Publisher {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn id(&self) -> &StorableId {
        &self.id
    }

    fn content(&self) -> Result<Content> {
        Ok(Content::new())
    }
}

impl StorableType for Publisher {
    const TYPE_NAME: &'static str = "catalogue.Publisher";

    fn from_stored(id: StorableId, _content: Content) -> Result<Self> {
        register_type::<Imprint>()?;
        Ok(Self { id })
    }
}

impl Storable for Imprint {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn id(&self) -> &StorableId {
        &self.id
    }

    fn content(&self) -> Result<Content> {
        Ok(Content::new())
    }
}

impl StorableType for Imprint {
    const TYPE_NAME: &'static str = "catalogue.Imprint";

    fn from_stored(id: StorableId, _content: Content) -> Result<Self> {
        Ok(Self { id })
    }
}

#[test]
fn types_registered_while_loading_apply_to_later_loads() {
    register_type::<Publisher>().unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("publisher.json");
    let publisher = shared(Publisher { id: "pub-1".into() });
    save(&path, &[publisher], &PersistConfig::default()).unwrap();
    let graph = load_global(&path).unwrap();
    assert!(graph.contains(&"pub-1".into()));
    assert!(stowage_kernel::global().contains(Imprint::TYPE_NAME));

    let path = tmp.path().join("imprint.json");
    let imprint = shared(Imprint { id: "imp-1".into() });
    save(&path, &[imprint], &PersistConfig::default()).unwrap();
    assert_eq!(load_global(&path).unwrap().len(), 1);
}

#[test]
fn none_field_aborts_the_write() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("catalogue.json");
    let draft = book("bk-9", "Draft", None);

    let err = save(&path, &[draft], &PersistConfig::default()).unwrap_err();
    assert!(
        matches!(
            err,
            PersistError::Storable(StorableError::UnsupportedFieldType { ref field, .. })
                if field == "edition"
        ),
        "{err}"
    );
}

fn load_text(text: &str) -> stowage_persist::Result<LoadedGraph> {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("hand.json");
    std::fs::write(&path, text).unwrap();
    load(&path, &registry())
}

const EDITION: &str = r#""edition": {"isbn": "x", "pages": 1, "tags": [], "subtitle": "s"}"#;

#[test]
fn duplicate_ids_are_rejected() {
    let text = r#"{
            "roots": ["au-1"],
            "objects": [
                {"$type": "catalogue.Author", "$id": "au-1", "fields": {"name": "a", "born": 1, "books": []}},
                {"$type": "catalogue.Author", "$id": "au-1", "fields": {"name": "b", "born": 2, "books": []}}
            ],
            "count": 2
        }"#;
    let err = load_text(text).unwrap_err();
    assert!(matches!(err, PersistError::DuplicateId { ref id } if id.as_str() == "au-1"));
}

#[test]
fn dangling_references_are_rejected() {
    let text = format!(
        r#"{{
            "roots": ["bk-1"],
            "objects": [
                {{"$type": "catalogue.Book", "$id": "bk-1", "fields": {{
                    "title": "t", "rating": 1.0, "in_print": false, {EDITION},
                    "author": {{"$ref": "au-404"}}
                }}}}
            ],
            "count": 1
        }}"#
    );
    let err = load_text(&text).unwrap_err();
    assert!(
        matches!(err, PersistError::DanglingReference { ref owner, ref id }
            if owner.as_str() == "bk-1" && id.as_str() == "au-404"),
        "{err}"
    );
}

#[test]
fn forward_reference_in_hand_written_file_resolves() {
    let text = format!(
        r#"{{
            "roots": ["bk-1"],
            "objects": [
                {{"$type": "catalogue.Book", "$id": "bk-1", "fields": {{
                    "title": "t", "rating": 2, "in_print": true, {EDITION},
                    "author": {{"$ref": "au-1"}}
                }}}},
                {{"$type": "catalogue.Author", "$id": "au-1", "fields": {{
                    "name": "n", "born": 1900, "books": [{{"$ref": "bk-1"}}]
                }}}}
            ],
            "count": 2
        }}"#
    );
    let graph = load_text(&text).unwrap();
    let book = graph.get_as::<Book>(&"bk-1".into()).unwrap();
    assert_eq!(book.rating, 2.0);
    assert!(Rc::ptr_eq(
        book.author.as_ref().unwrap(),
        graph.get(&"au-1".into()).unwrap()
    ));
}

#[test]
fn unknown_type_names_the_type() {
    let text = r#"{
        "roots": ["x"],
        "objects": [{"$type": "catalogue.Shelf", "$id": "x", "fields": {}}],
        "count": 1
    }"#;
    let err = load_text(text).unwrap_err();
    assert!(
        matches!(err, PersistError::Storable(StorableError::UnknownType { ref type_name })
            if type_name == "catalogue.Shelf"),
        "{err}"
    );
}
