use std::io::Write;
use std::fs::{self, File};
use crc32fast::Hasher;
use crate::core::types::Document;
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{Segment, SegmentData, SegmentHeader, SegmentId};
use crate::core::error::Result;

/// Accumulates documents for one segment and writes it in a single pass
pub struct SegmentWriter {
    pub id: SegmentId,
    pub docs: Vec<Document>,
}

impl SegmentWriter {
    pub fn new(id: SegmentId) -> Self {
        SegmentWriter {
            id,
            docs: Vec::new(),
        }
    }

    pub fn write_document(&mut self, doc: Document) {
        self.docs.push(doc);
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    pub fn finish(self, storage: &StorageLayout) -> Result<(Segment, SegmentData)> {
        let data = SegmentData::from_documents(self.docs);
        let segment = Self::write_data(storage, self.id, &data)?;
        Ok((segment, data))
    }

    // [ HEADER (magic, version, doc_count, checksum, body_len) ] <- byte 0
    // [ LZ4( bincode(SegmentData) ) ]
    pub fn write_data(storage: &StorageLayout, id: SegmentId, data: &SegmentData) -> Result<Segment> {
        let body = bincode::serialize(data)?;
        let compressed = lz4_flex::compress_prepend_size(&body);

        let mut hasher = Hasher::new();
        hasher.update(&compressed);
        let header = SegmentHeader::new(data.doc_count(), hasher.finalize(), compressed.len() as u64);
        let header_data = bincode::serialize(&header)?;

        // Write under a temporary name so a crash never leaves a torn .seg
        let path = storage.segment_path(&id);
        let tmp_path = path.with_extension("seg.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&header_data)?;
            file.write_all(&compressed)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        Ok(Segment {
            id,
            doc_count: data.doc_count(),
            size_bytes: (header_data.len() + compressed.len()) as u64,
        })
    }
}
