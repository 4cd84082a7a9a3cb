use std::sync::Arc;
use roaring::RoaringBitmap;
use tracing::debug;
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, Document};
use crate::index::term::Term;
use crate::storage::checkpoint::Checkpoint;
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{SegmentData, SegmentId};

/// Attempts when a concurrent commit removes segments mid-open
const OPEN_RETRIES: usize = 3;

/// Chooses which stored fields `IndexReader::document` loads
pub trait FieldSelector {
    fn accept(&self, field: &str) -> bool;
}

pub struct AllFields;

impl FieldSelector for AllFields {
    fn accept(&self, _field: &str) -> bool {
        true
    }
}

impl<F: Fn(&str) -> bool> FieldSelector for F {
    fn accept(&self, field: &str) -> bool {
        self(field)
    }
}

struct ReaderSegment {
    id: SegmentId,
    data: Arc<SegmentData>,
    deleted: RoaringBitmap,
    base: u32,
}

/// Read-only, point-in-time view of one committed generation
pub struct IndexReader {
    storage: Arc<StorageLayout>,
    version: u64,
    segments: Vec<ReaderSegment>,
    max_doc: u32,
    num_docs: u32,
}

impl IndexReader {
    /// Open the latest commit point
    pub fn open(storage: Arc<StorageLayout>) -> Result<Self> {
        let mut attempt = 0;
        loop {
            let checkpoint = Checkpoint::load(&storage)?.ok_or_else(|| {
                Error::unavailable(format!("No index at {}", storage.base_dir.display()))
            })?;

            match Self::load_segments(&storage, &checkpoint) {
                Ok(segments) => return Ok(Self::from_segments(storage, checkpoint.generation, segments)),
                Err(e) => {
                    attempt += 1;
                    // A commit may have replaced the segments we were loading
                    let moved_on = storage.reload_generation()? != checkpoint.generation;
                    if !moved_on || attempt >= OPEN_RETRIES {
                        return Err(e);
                    }
                    debug!(attempt, error = %e, "commit raced reader open, retrying");
                }
            }
        }
    }

    fn load_segments(storage: &StorageLayout, checkpoint: &Checkpoint) -> Result<Vec<ReaderSegment>> {
        let mut segments = Vec::with_capacity(checkpoint.segments.len());
        let mut base = 0u32;
        for entry in &checkpoint.segments {
            let data = storage.load_segment(entry.id)?;
            let doc_count = data.doc_count();
            segments.push(ReaderSegment {
                id: entry.id,
                data,
                deleted: entry.deleted()?,
                base,
            });
            base += doc_count;
        }
        Ok(segments)
    }

    fn from_segments(storage: Arc<StorageLayout>, version: u64, segments: Vec<ReaderSegment>) -> Self {
        let max_doc = segments.iter().map(|s| s.data.doc_count()).sum();
        let num_docs = segments.iter()
            .map(|s| s.data.doc_count() - s.deleted.len() as u32)
            .sum();
        IndexReader {
            storage,
            version,
            segments,
            max_doc,
            num_docs,
        }
    }

    /// Generation of the commit this reader sees
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_current(&self) -> bool {
        self.storage.generation() == self.version
    }

    /// A reader on the latest commit, or `None` when this one is current.
    /// Unchanged segments are shared through the directory's segment cache.
    pub fn reopen(&self) -> Result<Option<IndexReader>> {
        if self.is_current() {
            return Ok(None);
        }
        IndexReader::open(self.storage.clone()).map(Some)
    }

    pub fn storage(&self) -> &Arc<StorageLayout> {
        &self.storage
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.segments.iter().map(|s| s.id).collect()
    }

    fn locate(&self, doc: DocId) -> Option<(&ReaderSegment, u32)> {
        let pos = self.segments.partition_point(|s| s.base <= doc.0);
        let segment = self.segments.get(pos.checked_sub(1)?)?;
        let local = doc.0 - segment.base;
        (local < segment.data.doc_count()).then_some((segment, local))
    }

    pub fn is_deleted(&self, doc: DocId) -> bool {
        match self.locate(doc) {
            Some((segment, local)) => segment.deleted.contains(local),
            None => true,
        }
    }

    /// Live documents containing the term
    pub fn term_docs(&self, term: &Term) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        for segment in &self.segments {
            for &local in segment.data.postings(term) {
                if !segment.deleted.contains(local) {
                    docs.insert(segment.base + local);
                }
            }
        }
        docs
    }

    pub fn doc_freq(&self, term: &Term) -> u64 {
        self.term_docs(term).len()
    }

    pub fn live_docs(&self) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        for segment in &self.segments {
            let all = segment.base..segment.base + segment.data.doc_count();
            docs.insert_range(all);
            for local in &segment.deleted {
                docs.remove(segment.base + local);
            }
        }
        docs
    }

    /// Stored fields of a live document, in original order
    pub fn document(&self, doc: DocId, selector: &dyn FieldSelector) -> Result<Document> {
        let (segment, local) = self.locate(doc)
            .filter(|(segment, local)| !segment.deleted.contains(*local))
            .ok_or_else(|| Error::invalid_argument(format!("Document {} is deleted or out of range", doc.0)))?;

        let stored = &segment.data.docs[local as usize];
        Ok(Document {
            fields: stored.fields.iter()
                .filter(|f| selector.accept(&f.name))
                .cloned()
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Field;
    use crate::index::index_writer::{IndexWriter, WriterConfig};
    use tempfile::TempDir;

    fn doc(path: &str, tag: &str) -> Document {
        let mut doc = Document::new();
        doc.add(Field::indexed_stored("path", path));
        doc.add(Field::indexed("tag", tag));
        doc.add(Field::stored_bytes("blob", vec![1]));
        doc
    }

    fn setup() -> (TempDir, Arc<StorageLayout>) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageLayout::open(dir.path().to_path_buf()).unwrap());
        storage.initialize().unwrap();
        (dir, storage)
    }

    #[test]
    fn test_reader_sees_only_committed_docs() {
        let (_dir, storage) = setup();
        let mut writer = IndexWriter::open(storage.clone(), WriterConfig::default()).unwrap();
        writer.add_document(doc("/a", "x")).unwrap();
        writer.commit().unwrap();
        writer.add_document(doc("/b", "x")).unwrap();

        let reader = IndexReader::open(storage.clone()).unwrap();
        assert_eq!(reader.num_docs(), 1);
        assert!(reader.is_current());

        writer.commit().unwrap();
        assert!(!reader.is_current());
        let reopened = reader.reopen().unwrap().unwrap();
        assert_eq!(reopened.num_docs(), 2);
        assert_eq!(reopened.term_docs(&Term::new("tag", "x")).len(), 2);
        assert!(reopened.reopen().unwrap().is_none());
    }

    #[test]
    fn test_document_applies_selector_and_deletions() {
        let (_dir, storage) = setup();
        let mut writer = IndexWriter::open(storage.clone(), WriterConfig::default()).unwrap();
        writer.add_document(doc("/a", "x")).unwrap();
        writer.add_document(doc("/b", "y")).unwrap();
        writer.commit().unwrap();
        writer.delete_documents(&Term::new("path", "/a"));
        writer.close().unwrap();

        let reader = IndexReader::open(storage).unwrap();
        assert_eq!(reader.num_docs(), 1);
        assert_eq!(reader.live_docs().len(), 1);

        let live = reader.term_docs(&Term::new("tag", "y")).min().unwrap();
        let only_path = |name: &str| name == "path";
        let stored = reader.document(DocId(live), &only_path).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.get_text("path"), Some("/b"));

        assert!(reader.document(DocId(99), &AllFields).is_err());
    }
}
