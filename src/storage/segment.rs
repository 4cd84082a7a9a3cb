use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;
use serde::{Deserialize, Serialize};
use crate::core::types::Document;
use crate::index::term::Term;

/// Unique segment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    pub fn new() -> Self {
        SegmentId(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(SegmentId)
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Written segment summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub id: SegmentId,
    pub doc_count: u32,
    pub size_bytes: u64,
}

/// Segment file header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentHeader {
    pub magic: u32,
    pub version: u32,     // Format version
    pub doc_count: u32,   // Number of documents
    pub checksum: u32,    // CRC32 of the compressed body
    pub body_len: u64,
}

impl SegmentHeader {
    pub const MAGIC: u32 = 0x5052_5358;
    pub const VERSION: u32 = 1;
    pub const SIZE: usize = 24; // Fixed header size (bincode, fixint)

    pub fn new(doc_count: u32, checksum: u32, body_len: u64) -> Self {
        SegmentHeader {
            magic: Self::MAGIC,
            version: Self::VERSION,
            doc_count,
            checksum,
            body_len,
        }
    }
}

/// Immutable segment content: stored fields per local doc plus postings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentData {
    pub docs: Vec<Document>,
    pub postings: BTreeMap<Term, Vec<u32>>,
}

impl SegmentData {
    /// Splits documents into stored fields and a postings table
    pub fn from_documents(documents: Vec<Document>) -> Self {
        let mut postings: BTreeMap<Term, Vec<u32>> = BTreeMap::new();
        let mut docs = Vec::with_capacity(documents.len());

        for (local, doc) in documents.into_iter().enumerate() {
            let local = local as u32;
            for term in doc.terms() {
                let list = postings.entry(term).or_default();
                // Multi-valued fields may repeat a term within one doc
                if list.last() != Some(&local) {
                    list.push(local);
                }
            }
            docs.push(doc.stored_only());
        }

        SegmentData { docs, postings }
    }

    pub fn doc_count(&self) -> u32 {
        self.docs.len() as u32
    }

    /// Sorted local doc ids containing the term
    pub fn postings(&self, term: &Term) -> &[u32] {
        self.postings.get(term).map(|v| v.as_slice()).unwrap_or(&[])
    }
}
