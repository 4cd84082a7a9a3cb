use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use tracing::{debug, error};
use crate::core::error::{Error, Result};
use crate::index::index_reader::IndexReader;

/// Owns one `IndexReader` and closes it exactly once: when a close has been
/// requested and the last reference has been released.
pub struct RefCountedReader {
    reader: RwLock<Option<IndexReader>>,
    version: u64,
    ref_count: AtomicUsize,
    close_pending: AtomicBool,
    closed: AtomicBool,
}

impl RefCountedReader {
    pub fn new(reader: IndexReader) -> Self {
        RefCountedReader {
            version: reader.version(),
            reader: RwLock::new(Some(reader)),
            ref_count: AtomicUsize::new(0),
            close_pending: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Take a reference. Fails once the reader has been closed.
    pub fn acquire(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::unavailable(format!("Reader at version {} is closed", self.version)));
        }
        self.ref_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Drop a reference, closing if it was the last one and a close is pending
    pub fn release(&self) {
        let previous = self.ref_count.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
            count.checked_sub(1)
        });
        match previous {
            Ok(1) if self.close_pending.load(Ordering::SeqCst) => self.close_now(),
            Ok(_) => {}
            Err(_) => error!(version = self.version, "reader released more often than acquired"),
        }
    }

    /// Request a close; happens now if unreferenced, otherwise on the last release
    pub fn close(&self) {
        self.close_pending.store(true, Ordering::SeqCst);
        if self.ref_count.load(Ordering::SeqCst) == 0 {
            self.close_now();
        } else {
            debug!(version = self.version, refs = self.ref_count(), "reader close deferred");
        }
    }

    fn close_now(&self) {
        if self.closed.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            self.reader.write().take();
            debug!(version = self.version, "reader closed");
        }
    }

    /// The wrapped reader, for the duration of the guard
    pub fn reader(&self) -> Result<MappedRwLockReadGuard<'_, IndexReader>> {
        RwLockReadGuard::try_map(self.reader.read(), |reader| reader.as_ref())
            .map_err(|_| Error::unavailable(format!("Reader at version {} is closed", self.version)))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether a newer commit exists
    pub fn is_current(&self) -> bool {
        match self.reader.read().as_ref() {
            Some(reader) => reader.is_current(),
            None => false,
        }
    }

    /// A fresh reader on the latest commit, or `None` if this one is current
    pub fn reopen(&self) -> Result<Option<IndexReader>> {
        self.reader()?.reopen()
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::SeqCst)
    }

    pub fn is_close_pending(&self) -> bool {
        self.close_pending.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
