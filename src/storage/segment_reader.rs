use std::fs;
use crc32fast::Hasher;
use crate::core::error::{Error, Result};
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{SegmentData, SegmentHeader, SegmentId};

pub struct SegmentReader;

impl SegmentReader {
    /// Read and decode a whole segment
    pub fn open(storage: &StorageLayout, segment_id: SegmentId) -> Result<SegmentData> {
        let bytes = fs::read(storage.segment_path(&segment_id))?;
        let (header, body) = Self::check(segment_id, &bytes)?;

        let decompressed = lz4_flex::decompress_size_prepended(body)
            .map_err(|e| Error::corruption(format!("Segment {}: {}", segment_id, e)))?;
        let data: SegmentData = bincode::deserialize(&decompressed)
            .map_err(|e| Error::corruption(format!("Segment {}: {}", segment_id, e)))?;

        if data.doc_count() != header.doc_count {
            return Err(Error::corruption(format!(
                "Segment {}: header says {} docs, body has {}",
                segment_id,
                header.doc_count,
                data.doc_count()
            )));
        }

        Ok(data)
    }

    /// Checksum-only pass used by index validation
    pub fn verify(storage: &StorageLayout, segment_id: SegmentId) -> Result<SegmentHeader> {
        let path = storage.segment_path(&segment_id);
        let bytes = fs::read(&path).map_err(|e| {
            Error::corruption(format!("Segment {} unreadable: {}", segment_id, e))
        })?;
        let (header, _) = Self::check(segment_id, &bytes)?;
        Ok(header)
    }

    fn check(segment_id: SegmentId, bytes: &[u8]) -> Result<(SegmentHeader, &[u8])> {
        if bytes.len() < SegmentHeader::SIZE {
            return Err(Error::corruption(format!("Segment {} truncated header", segment_id)));
        }

        let header: SegmentHeader = bincode::deserialize(&bytes[..SegmentHeader::SIZE])
            .map_err(|e| Error::corruption(format!("Segment {}: {}", segment_id, e)))?;

        if header.magic != SegmentHeader::MAGIC || header.version != SegmentHeader::VERSION {
            return Err(Error::corruption(format!(
                "Segment {}: bad magic/version {:#x}/{}",
                segment_id, header.magic, header.version
            )));
        }

        let body = &bytes[SegmentHeader::SIZE..];
        if body.len() as u64 != header.body_len {
            return Err(Error::corruption(format!(
                "Segment {}: expected {} body bytes, found {}",
                segment_id,
                header.body_len,
                body.len()
            )));
        }

        let mut hasher = Hasher::new();
        hasher.update(body);
        if hasher.finalize() != header.checksum {
            return Err(Error::corruption(format!("Segment {} checksum mismatch", segment_id)));
        }

        Ok((header, body))
    }
}
