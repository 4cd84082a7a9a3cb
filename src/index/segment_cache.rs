use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use parking_lot::RwLock;
use crate::core::error::Result;
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{SegmentData, SegmentId};
use crate::storage::segment_reader::SegmentReader;

/// Decoded segments shared by the writer and every reader of one directory.
/// Segments are immutable, so a cached entry is valid until the file is removed.
#[derive(Debug, Default)]
pub struct SegmentCache {
    cache: RwLock<HashMap<SegmentId, Arc<SegmentData>>>,
}

impl SegmentCache {
    pub fn new() -> Self {
        SegmentCache {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get or load segment data
    pub fn get_or_load(&self, storage: &StorageLayout, segment_id: SegmentId) -> Result<Arc<SegmentData>> {
        // Fast path: check if already cached
        {
            let cache = self.cache.read();
            if let Some(data) = cache.get(&segment_id) {
                return Ok(data.clone());
            }
        }

        // Slow path: load from disk outside the lock
        let data = Arc::new(SegmentReader::open(storage, segment_id)?);

        let mut cache = self.cache.write();
        Ok(cache.entry(segment_id).or_insert(data).clone())
    }

    /// Seed the cache with data the writer already has in memory
    pub fn insert(&self, segment_id: SegmentId, data: Arc<SegmentData>) {
        self.cache.write().insert(segment_id, data);
    }

    /// Drop entries for segments no longer referenced
    pub fn retain(&self, live: &HashSet<SegmentId>) {
        self.cache.write().retain(|id, _| live.contains(id));
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}
