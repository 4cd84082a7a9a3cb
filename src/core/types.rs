use serde::{Serialize, Deserialize};
use crate::index::term::Term;

/// Global document number within one reader's view of the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    pub fn new(id: u32) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for DocId {
    fn from(id: u32) -> Self {
        DocId(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FieldValue::Text(text) => text.as_bytes(),
            FieldValue::Bytes(bytes) => bytes,
        }
    }
}

/// One engine field. Indexed text is a single exact term, never analysed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
    pub indexed: bool,
    pub stored: bool,
}

impl Field {
    pub fn indexed(name: &str, text: impl Into<String>) -> Self {
        Field {
            name: name.to_string(),
            value: FieldValue::Text(text.into()),
            indexed: true,
            stored: false,
        }
    }

    pub fn indexed_stored(name: &str, text: impl Into<String>) -> Self {
        Field {
            name: name.to_string(),
            value: FieldValue::Text(text.into()),
            indexed: true,
            stored: true,
        }
    }

    pub fn stored_bytes(name: &str, bytes: Vec<u8>) -> Self {
        Field {
            name: name.to_string(),
            value: FieldValue::Bytes(bytes),
            indexed: false,
            stored: true,
        }
    }

    /// Term produced by this field, if it is indexed
    pub fn term(&self) -> Option<Term> {
        match (&self.value, self.indexed) {
            (FieldValue::Text(text), true) => Some(Term::new(&self.name, text)),
            _ => None,
        }
    }
}

/// Engine document: an ordered list of fields.
///
/// Field order is significant and survives storage: same-named stored fields
/// come back in exactly the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub fields: Vec<Field>,
}

impl Document {
    pub fn new() -> Self {
        Document { fields: Vec::new() }
    }

    pub fn add(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Field> + 'a {
        self.fields.iter().filter(move |f| f.name == name)
    }

    /// First stored value of a field
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.stored && f.name == name).map(|f| &f.value)
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_text())
    }

    pub fn terms(&self) -> impl Iterator<Item = Term> + '_ {
        self.fields.iter().filter_map(|f| f.term())
    }

    pub fn has_term(&self, term: &Term) -> bool {
        self.fields.iter().any(|f| {
            f.indexed && f.name == term.field && f.value.as_text() == Some(term.text.as_str())
        })
    }

    /// Copy containing only the stored fields, in order
    pub fn stored_only(&self) -> Document {
        Document {
            fields: self.fields.iter().filter(|f| f.stored).cloned().collect(),
        }
    }
}
