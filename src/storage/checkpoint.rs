use std::fs::{self, File};
use std::io::Write;
use chrono::{DateTime, Utc};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::storage::layout::StorageLayout;
use crate::storage::segment::SegmentId;

/// One committed segment and its deletions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentEntry {
    pub id: SegmentId,
    pub doc_count: u32,
    pub deletes: Vec<u8>,   // Serialized RoaringBitmap of deleted local ids
}

impl SegmentEntry {
    pub fn new(id: SegmentId, doc_count: u32, deleted: &RoaringBitmap) -> Result<Self> {
        let mut deletes = Vec::with_capacity(deleted.serialized_size());
        deleted.serialize_into(&mut deletes)?;
        Ok(SegmentEntry { id, doc_count, deletes })
    }

    pub fn deleted(&self) -> Result<RoaringBitmap> {
        RoaringBitmap::deserialize_from(&self.deletes[..])
            .map_err(|e| Error::corruption(format!("Segment {} deletions: {}", self.id, e)))
    }
}

/// Commit point: the set of segments that make up one index version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub generation: u64,
    pub segments: Vec<SegmentEntry>,
    pub timestamp: DateTime<Utc>,
    pub doc_count: usize,   // Live documents
}

impl Checkpoint {
    pub fn empty(generation: u64) -> Self {
        Checkpoint {
            generation,
            segments: Vec::new(),
            timestamp: Utc::now(),
            doc_count: 0,
        }
    }

    /// Load checkpoint from disk
    pub fn load(storage: &StorageLayout) -> Result<Option<Self>> {
        let path = storage.checkpoint_path();
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read(path)?;
        let checkpoint = bincode::deserialize(&data)
            .map_err(|e| Error::corruption(format!("Unreadable commit point: {}", e)))?;
        Ok(Some(checkpoint))
    }

    /// Save atomically: readers see the old or the new commit, never a mix
    pub fn save(&self, storage: &StorageLayout) -> Result<()> {
        let data = bincode::serialize(self)?;
        let path = storage.checkpoint_path();
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(tmp_path, path)?;
        Ok(())
    }
}
