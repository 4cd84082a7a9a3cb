use std::collections::HashSet;
use std::fs;
use std::mem;
use std::sync::Arc;
use roaring::RoaringBitmap;
use tracing::{debug, info, warn};
use crate::core::config::TuningProfile;
use crate::core::error::{Error, Result};
use crate::core::types::Document;
use crate::index::term::Term;
use crate::storage::checkpoint::{Checkpoint, SegmentEntry};
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::merge_policy::{LogMergePolicy, MergePolicy, SegmentSummary};
use crate::storage::segment::{SegmentData, SegmentId};
use crate::storage::segment_writer::SegmentWriter;

#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    pub merge_factor: usize,
    pub max_buffered_docs: usize,
}

impl From<TuningProfile> for WriterConfig {
    fn from(profile: TuningProfile) -> Self {
        WriterConfig {
            merge_factor: profile.merge_factor,
            max_buffered_docs: profile.max_buffered_docs.max(1),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        TuningProfile::incremental().into()
    }
}

struct WriterSegment {
    id: SegmentId,
    data: Arc<SegmentData>,
    deleted: RoaringBitmap,
}

impl WriterSegment {
    fn live_docs(&self) -> u32 {
        self.data.doc_count() - self.deleted.len() as u32
    }
}

/// Single writer over one directory. Holds the engine lock file while open.
pub struct IndexWriter {
    storage: Arc<StorageLayout>,
    config: WriterConfig,
    merge_policy: Box<dyn MergePolicy>,
    segments: Vec<WriterSegment>,
    buffer: SegmentWriter,
    committed: HashSet<SegmentId>,
    dirty: bool,
    _lock: FileLock,
}

impl IndexWriter {
    pub fn open(storage: Arc<StorageLayout>, config: WriterConfig) -> Result<Self> {
        let lock = FileLock::acquire(&storage)?;

        let checkpoint = Checkpoint::load(&storage)?.ok_or_else(|| {
            Error::unavailable(format!("No index at {}", storage.base_dir.display()))
        })?;

        let mut segments = Vec::with_capacity(checkpoint.segments.len());
        for entry in &checkpoint.segments {
            segments.push(WriterSegment {
                id: entry.id,
                data: storage.load_segment(entry.id)?,
                deleted: entry.deleted()?,
            });
        }
        let committed = segments.iter().map(|s| s.id).collect();

        Ok(IndexWriter {
            merge_policy: Box::new(LogMergePolicy::new(config.merge_factor)),
            storage,
            config,
            segments,
            buffer: SegmentWriter::new(SegmentId::new()),
            committed,
            dirty: false,
            _lock: lock,
        })
    }

    pub fn config(&self) -> WriterConfig {
        self.config
    }

    pub fn add_document(&mut self, doc: Document) -> Result<()> {
        self.buffer.write_document(doc);
        self.dirty = true;

        if self.buffer.doc_count() >= self.config.max_buffered_docs {
            self.flush()?;
        }
        Ok(())
    }

    /// Deletes every document (flushed or buffered) containing the term
    pub fn delete_documents(&mut self, term: &Term) -> usize {
        let mut deleted = 0;

        for segment in &mut self.segments {
            for &local in segment.data.postings(term) {
                if segment.deleted.insert(local) {
                    deleted += 1;
                }
            }
        }

        let before = self.buffer.docs.len();
        self.buffer.docs.retain(|doc| !doc.has_term(term));
        deleted += before - self.buffer.docs.len();

        if deleted > 0 {
            self.dirty = true;
        }
        deleted
    }

    pub fn delete_all(&mut self) {
        self.segments.clear();
        self.buffer.docs.clear();
        self.dirty = true;
    }

    /// Absorbs the committed content of another directory in one step by
    /// copying its segment files together with their deletions.
    pub fn add_indexes(&mut self, other: &StorageLayout) -> Result<usize> {
        if other.base_dir == self.storage.base_dir {
            return Err(Error::invalid_argument("Cannot add an index to itself"));
        }
        self.flush()?;

        let checkpoint = Checkpoint::load(other)?.ok_or_else(|| {
            Error::unavailable(format!("No index at {}", other.base_dir.display()))
        })?;

        let mut added = 0;
        for entry in &checkpoint.segments {
            let id = SegmentId::new();
            fs::copy(other.segment_path(&entry.id), self.storage.segment_path(&id))?;
            let segment = WriterSegment {
                id,
                data: self.storage.load_segment(id)?,
                deleted: entry.deleted()?,
            };
            added += segment.live_docs() as usize;
            self.segments.push(segment);
        }

        self.dirty = true;
        debug!(from = %other.base_dir.display(), docs = added, "absorbed index");
        Ok(added)
    }

    /// Writes buffered documents to a new (uncommitted) segment
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.doc_count() == 0 {
            return Ok(());
        }

        let writer = mem::replace(&mut self.buffer, SegmentWriter::new(SegmentId::new()));
        let id = writer.id;
        let (segment, data) = writer.finish(&self.storage)?;

        let data = Arc::new(data);
        self.storage.cache().insert(id, data.clone());
        self.segments.push(WriterSegment {
            id,
            data,
            deleted: RoaringBitmap::new(),
        });

        debug!(segment = %id, docs = segment.doc_count, bytes = segment.size_bytes, "flushed segment");
        Ok(())
    }

    /// Merge down to a single segment with no deletions
    pub fn force_merge(&mut self) -> Result<()> {
        self.flush()?;

        if self.segments.len() > 1 || self.segments.iter().any(|s| !s.deleted.is_empty()) {
            let all: Vec<usize> = (0..self.segments.len()).collect();
            self.merge(&all)?;
            self.dirty = true;
        }
        Ok(())
    }

    fn maybe_merge(&mut self) -> Result<()> {
        let summaries: Vec<SegmentSummary> = self.segments.iter()
            .map(|s| SegmentSummary { id: s.id, live_docs: s.live_docs() })
            .collect();

        let selected = self.merge_policy.select_segments_to_merge(&summaries);
        if !selected.is_empty() {
            self.merge(&selected)?;
        }
        Ok(())
    }

    /// `positions` must be sorted ascending
    fn merge(&mut self, positions: &[usize]) -> Result<()> {
        let Some(&first) = positions.first() else {
            return Ok(());
        };

        let mut merged = SegmentData::default();
        for &pos in positions {
            let segment = &self.segments[pos];

            let mut remap: Vec<Option<u32>> = vec![None; segment.data.docs.len()];
            for (local, doc) in segment.data.docs.iter().enumerate() {
                if segment.deleted.contains(local as u32) {
                    continue;
                }
                remap[local] = Some(merged.docs.len() as u32);
                merged.docs.push(doc.clone());
            }

            for (term, locals) in &segment.data.postings {
                let mut mapped = locals.iter().filter_map(|&l| remap[l as usize]).peekable();
                if mapped.peek().is_some() {
                    merged.postings.entry(term.clone()).or_default().extend(mapped);
                }
            }
        }

        let id = SegmentId::new();
        let segment = SegmentWriter::write_data(&self.storage, id, &merged)?;
        let data = Arc::new(merged);
        self.storage.cache().insert(id, data.clone());

        for &pos in positions.iter().rev() {
            self.segments.remove(pos);
        }
        self.segments.insert(first, WriterSegment {
            id,
            data,
            deleted: RoaringBitmap::new(),
        });

        debug!(merged = positions.len(), segment = %id, docs = segment.doc_count, "merged segments");
        Ok(())
    }

    /// Makes all changes durable and visible. Returns the committed generation.
    pub fn commit(&mut self) -> Result<u64> {
        self.flush()?;
        if !self.dirty {
            return Ok(self.storage.generation());
        }
        self.maybe_merge()?;

        let mut checkpoint = Checkpoint::empty(self.storage.generation() + 1);
        for segment in &self.segments {
            checkpoint.segments.push(SegmentEntry::new(segment.id, segment.data.doc_count(), &segment.deleted)?);
            checkpoint.doc_count += segment.live_docs() as usize;
        }
        checkpoint.save(&self.storage)?;
        self.storage.set_generation(checkpoint.generation);

        self.dirty = false;
        self.committed = self.segments.iter().map(|s| s.id).collect();
        self.remove_unreferenced();

        info!(
            dir = %self.storage.base_dir.display(),
            generation = checkpoint.generation,
            docs = checkpoint.doc_count,
            segments = checkpoint.segments.len(),
            "committed index"
        );
        Ok(checkpoint.generation)
    }

    /// Commit and release the engine lock
    pub fn close(mut self) -> Result<u64> {
        self.commit()
    }

    /// Discard everything since the last commit and release the engine lock
    pub fn rollback(mut self) {
        for segment in &self.segments {
            if !self.committed.contains(&segment.id) {
                let _ = fs::remove_file(self.storage.segment_path(&segment.id));
            }
        }
        self.dirty = false;
    }

    fn remove_unreferenced(&self) {
        match self.storage.list_segments() {
            Ok(ids) => {
                for id in ids.into_iter().filter(|id| !self.committed.contains(id)) {
                    if let Err(e) = fs::remove_file(self.storage.segment_path(&id)) {
                        warn!(segment = %id, error = %e, "could not remove unreferenced segment");
                    }
                }
            }
            Err(e) => warn!(error = %e, "could not list segments for cleanup"),
        }
        self.storage.cache().retain(&self.committed);
    }

    /// Live documents including buffered ones
    pub fn num_docs(&self) -> usize {
        self.segments.iter().map(|s| s.live_docs() as usize).sum::<usize>() + self.buffer.doc_count()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn has_uncommitted_changes(&self) -> bool {
        self.dirty
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        if self.dirty {
            warn!(dir = %self.storage.base_dir.display(), "index writer dropped with uncommitted changes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Field;
    use tempfile::TempDir;

    fn doc(path: &str) -> Document {
        let mut doc = Document::new();
        doc.add(Field::indexed_stored("path", path));
        doc
    }

    fn open_storage(dir: &TempDir) -> Arc<StorageLayout> {
        let storage = Arc::new(StorageLayout::open(dir.path().to_path_buf()).unwrap());
        storage.initialize().unwrap();
        storage
    }

    #[test]
    fn test_commit_advances_generation() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(&dir);
        let mut writer = IndexWriter::open(storage.clone(), WriterConfig::default()).unwrap();

        writer.add_document(doc("/a")).unwrap();
        assert_eq!(writer.commit().unwrap(), 2);
        assert_eq!(storage.generation(), 2);

        // Nothing changed, nothing written
        assert_eq!(writer.commit().unwrap(), 2);
    }

    #[test]
    fn test_delete_reaches_buffered_and_flushed_docs() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(&dir);
        let config = WriterConfig { merge_factor: 10, max_buffered_docs: 2 };
        let mut writer = IndexWriter::open(storage, config).unwrap();

        writer.add_document(doc("/dup")).unwrap();
        writer.add_document(doc("/dup")).unwrap(); // flushes
        writer.add_document(doc("/dup")).unwrap(); // buffered

        assert_eq!(writer.delete_documents(&Term::new("path", "/dup")), 3);
        writer.add_document(doc("/other")).unwrap();
        assert_eq!(writer.num_docs(), 1);
    }

    #[test]
    fn test_second_writer_is_lock_contention() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(&dir);
        let _writer = IndexWriter::open(storage.clone(), WriterConfig::default()).unwrap();

        let err = IndexWriter::open(storage, WriterConfig::default()).err().unwrap();
        assert!(err.is_lock_contention());
    }

    #[test]
    fn test_force_merge_drops_deleted_docs() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(&dir);
        let config = WriterConfig { merge_factor: 10, max_buffered_docs: 1 };
        let mut writer = IndexWriter::open(storage, config).unwrap();

        for path in ["/a", "/b", "/c"] {
            writer.add_document(doc(path)).unwrap();
        }
        writer.delete_documents(&Term::new("path", "/b"));
        writer.force_merge().unwrap();

        assert_eq!(writer.segment_count(), 1);
        assert_eq!(writer.num_docs(), 2);
        writer.close().unwrap();
    }

    #[test]
    fn test_background_merge_keeps_index_order() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(&dir);
        let config = WriterConfig { merge_factor: 3, max_buffered_docs: 2 };
        let mut writer = IndexWriter::open(storage.clone(), config).unwrap();

        for path in ["/a", "/b", "/c", "/d"] {
            writer.add_document(doc(path)).unwrap();
        }
        writer.commit().unwrap();
        assert_eq!(writer.segment_count(), 2);

        // Leaves [1, 2, 2, 1] live docs: the two smallest are not adjacent
        for path in ["/e", "/f", "/g"] {
            writer.add_document(doc(path)).unwrap();
        }
        writer.delete_documents(&Term::new("path", "/a"));
        writer.commit().unwrap();
        assert_eq!(writer.segment_count(), 2);

        let reader = crate::index::index_reader::IndexReader::open(storage).unwrap();
        let paths: Vec<String> = reader.live_docs().iter()
            .map(|id| {
                let doc = reader.document(crate::core::types::DocId(id), &crate::index::index_reader::AllFields).unwrap();
                doc.get_text("path").unwrap().to_string()
            })
            .collect();
        assert_eq!(paths, vec!["/b", "/c", "/d", "/e", "/f", "/g"]);
    }
}
