use std::path::PathBuf;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use crate::core::error::{Error, Result};
use crate::index::segment_cache::SegmentCache;
use crate::storage::checkpoint::Checkpoint;
use crate::storage::segment::{SegmentData, SegmentId};

const LOCK_FILE: &str = "write.lock";

/// On-disk directory of one index instance
#[derive(Debug)]
pub struct StorageLayout {
    pub base_dir: PathBuf,      // <storage_root>/<storage_id>
    pub segments_dir: PathBuf,  // .seg files
    pub meta_dir: PathBuf,      // commit point
    generation: AtomicU64,      // Last committed generation, cached in-process
    cache: SegmentCache,
}

impl StorageLayout {
    /// Open (creating if needed) the directory tree. Does not create an index.
    pub fn open(base_dir: PathBuf) -> Result<Self> {
        let segments_dir = base_dir.join("segments");
        let meta_dir = base_dir.join("meta");

        for dir in [&segments_dir, &meta_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                Error::unavailable(format!("Cannot create index directory {}: {}", dir.display(), e))
            })?;
        }

        let layout = StorageLayout {
            base_dir,
            segments_dir,
            meta_dir,
            generation: AtomicU64::new(0),
            cache: SegmentCache::new(),
        };

        if let Some(checkpoint) = Checkpoint::load(&layout)? {
            layout.generation.store(checkpoint.generation, Ordering::SeqCst);
        }

        Ok(layout)
    }

    pub fn segment_path(&self, id: &SegmentId) -> PathBuf {
        self.segments_dir.join(format!("{}.seg", id))
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.meta_dir.join("checkpoint.bin")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(LOCK_FILE)
    }

    /// An index exists once a commit point has been written
    pub fn has_index(&self) -> bool {
        self.checkpoint_path().exists()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn set_generation(&self, generation: u64) {
        self.generation.store(generation, Ordering::SeqCst);
    }

    /// Reads the committed generation from disk and refreshes the cached value
    pub fn reload_generation(&self) -> Result<u64> {
        let generation = Checkpoint::load(self)?
            .map(|c| c.generation)
            .unwrap_or(0);
        self.set_generation(generation);
        Ok(generation)
    }

    /// Writes an empty commit point if none exists yet
    pub fn initialize(&self) -> Result<bool> {
        if self.has_index() {
            return Ok(false);
        }
        let checkpoint = Checkpoint::empty(self.generation() + 1);
        checkpoint.save(self)?;
        self.set_generation(checkpoint.generation);
        debug!(dir = %self.base_dir.display(), generation = checkpoint.generation, "initialized empty index");
        Ok(true)
    }

    /// Removes every segment and the commit point. The generation counter
    /// is kept so version stamps stay monotonic across a recreate.
    pub fn clear_contents(&self) -> Result<()> {
        for dir in [&self.segments_dir, &self.meta_dir] {
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
            fs::create_dir_all(dir)?;
        }
        self.cache.clear();
        Ok(())
    }

    /// Segment ids present on disk, referenced or not
    pub fn list_segments(&self) -> Result<Vec<SegmentId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.segments_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("seg") {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()).and_then(SegmentId::parse) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Loads a segment through the shared segment cache
    pub fn load_segment(&self, id: SegmentId) -> Result<Arc<SegmentData>> {
        self.cache.get_or_load(self, id)
    }

    pub(crate) fn cache(&self) -> &SegmentCache {
        &self.cache
    }
}
