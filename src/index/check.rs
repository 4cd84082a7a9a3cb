use tracing::warn;
use crate::core::error::{Error, Result};
use crate::storage::checkpoint::Checkpoint;
use crate::storage::layout::StorageLayout;
use crate::storage::segment_reader::SegmentReader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub generation: u64,
    pub segments: usize,
    pub max_doc: u64,
    pub live_docs: u64,
}

/// Verifies the commit point and every segment it references.
/// All failures are reported as `Corruption`, never as plain I/O errors.
pub fn check_index(storage: &StorageLayout) -> Result<CheckReport> {
    let checkpoint = Checkpoint::load(storage)
        .map_err(|e| Error::corruption(format!("Commit point: {}", e.context)))?
        .ok_or_else(|| Error::corruption(format!("No commit point in {}", storage.base_dir.display())))?;

    let mut report = CheckReport {
        generation: checkpoint.generation,
        segments: checkpoint.segments.len(),
        ..CheckReport::default()
    };

    for entry in &checkpoint.segments {
        let header = SegmentReader::verify(storage, entry.id)?;
        if header.doc_count != entry.doc_count {
            return Err(Error::corruption(format!(
                "Segment {}: commit point says {} docs, file says {}",
                entry.id, entry.doc_count, header.doc_count
            )));
        }

        let deleted = entry.deleted()?;
        if deleted.max().is_some_and(|max| max >= entry.doc_count) {
            return Err(Error::corruption(format!("Segment {}: deletion out of range", entry.id)));
        }

        report.max_doc += entry.doc_count as u64;
        report.live_docs += entry.doc_count as u64 - deleted.len();
    }

    if report.live_docs != checkpoint.doc_count as u64 {
        warn!(
            expected = checkpoint.doc_count,
            actual = report.live_docs,
            "commit point live document count disagrees with segments"
        );
    }

    Ok(report)
}
