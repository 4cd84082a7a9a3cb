use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use parking_lot::{MappedRwLockReadGuard, Mutex};
use tracing::{debug, warn};
use crate::core::error::{Error, Result};
use crate::index::index_reader::IndexReader;
use crate::reader::refcounted::RefCountedReader;
use crate::storage::layout::StorageLayout;

/// One pool slot. `version` is 0 while the slot has no reader.
struct PoolItem {
    slot: Mutex<Option<Arc<RefCountedReader>>>,
    version: AtomicU64,
    refresh: AtomicBool,
}

impl PoolItem {
    fn new() -> Self {
        PoolItem {
            slot: Mutex::new(None),
            version: AtomicU64::new(0),
            refresh: AtomicBool::new(false),
        }
    }
}

/// Pool-wide bookkeeping, held only briefly
struct PoolState {
    last_refresh: Instant,
    next: usize,
}

/// Fixed-size pool of shared, reference-counted readers.
///
/// Items may serve an older commit for up to `max_staleness`; a forced
/// refresh (after every commit) or any version disagreement between items
/// marks every item for reopen on its next borrow.
pub struct ReaderPool {
    name: &'static str,
    storage: Arc<StorageLayout>,
    items: Vec<PoolItem>,
    max_staleness: Option<Duration>,   // None refreshes on every borrow
    state: Mutex<PoolState>,
    closed: AtomicBool,
}

impl ReaderPool {
    pub fn new(name: &'static str, storage: Arc<StorageLayout>, size: usize, max_staleness_secs: i64) -> Self {
        let size = size.max(1);
        ReaderPool {
            name,
            storage,
            items: (0..size).map(|_| PoolItem::new()).collect(),
            max_staleness: (max_staleness_secs > 0).then(|| Duration::from_secs(max_staleness_secs as u64)),
            state: Mutex::new(PoolState {
                last_refresh: Instant::now(),
                next: 0,
            }),
            closed: AtomicBool::new(false),
        }
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    /// Borrow a reader. With `affinity` the calling thread always gets the
    /// same item, so a request issuing several queries sees one version.
    pub fn borrow(&self, affinity: bool) -> Result<PooledReader> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::unavailable(format!("Reader pool '{}' is closed", self.name)));
        }

        let index = {
            let mut state = self.state.lock();
            let index = if affinity {
                thread_slot(self.items.len())
            } else {
                state.next = state.next.wrapping_add(1);
                state.next % self.items.len()
            };

            if self.refresh_required(&state) {
                for item in &self.items {
                    item.refresh.store(true, Ordering::SeqCst);
                }
                state.last_refresh = Instant::now();
            }
            index
        };

        let reader = self.checkout(&self.items[index])?;
        Ok(PooledReader { reader })
    }

    fn refresh_required(&self, state: &PoolState) -> bool {
        let Some(max_staleness) = self.max_staleness else {
            return true;
        };
        if state.last_refresh.elapsed() > max_staleness {
            return true;
        }

        // Never let items stay split across versions
        let mut versions = self.items.iter()
            .map(|item| item.version.load(Ordering::SeqCst))
            .filter(|&v| v != 0);
        match versions.next() {
            Some(first) => versions.any(|v| v != first),
            None => false,
        }
    }

    /// Acquire the item's reader while its slot is held, so a concurrent
    /// refresh cannot retire it between selection and acquire
    fn checkout(&self, item: &PoolItem) -> Result<Arc<RefCountedReader>> {
        let mut slot = item.slot.lock();
        let reader = self.current(&mut slot, item)?;
        reader.acquire()?;
        Ok(reader)
    }

    /// Current reader of an item, opening or reopening as needed
    fn current(&self, slot: &mut Option<Arc<RefCountedReader>>, item: &PoolItem) -> Result<Arc<RefCountedReader>> {
        let current = match slot.as_ref() {
            None => {
                let reader = self.install(slot, item, IndexReader::open(self.storage.clone()))?;
                debug!(pool = self.name, version = reader.version(), "opened pooled reader");
                return Ok(reader);
            }
            Some(current) => current.clone(),
        };

        if item.refresh.load(Ordering::SeqCst) && !current.is_current() {
            match current.reopen() {
                Ok(Some(fresh)) => {
                    let reader = self.install(slot, item, Ok(fresh))?;
                    debug!(pool = self.name, from = current.version(), to = reader.version(), "reopened pooled reader");
                    retire(&current);
                    return Ok(reader);
                }
                Ok(None) => item.refresh.store(false, Ordering::SeqCst),
                Err(e) => {
                    warn!(pool = self.name, error = %e, "pooled reader reopen failed, discarding");
                    slot.take();
                    item.version.store(0, Ordering::SeqCst);
                    retire(&current);
                    return Err(e);
                }
            }
        } else if current.is_current() {
            item.refresh.store(false, Ordering::SeqCst);
        }

        Ok(current)
    }

    fn install(
        &self,
        slot: &mut Option<Arc<RefCountedReader>>,
        item: &PoolItem,
        opened: Result<IndexReader>,
    ) -> Result<Arc<RefCountedReader>> {
        let reader = match opened {
            Ok(reader) => Arc::new(RefCountedReader::new(reader)),
            Err(e) => {
                slot.take();
                item.version.store(0, Ordering::SeqCst);
                return Err(e);
            }
        };
        // The pool's own reference, dropped when the reader is replaced
        reader.acquire()?;
        item.version.store(reader.version(), Ordering::SeqCst);
        // A commit may have landed while the reader was opening
        item.refresh.store(!reader.is_current(), Ordering::SeqCst);
        *slot = Some(reader.clone());

        // A split pool always has refresh hints set
        let divergent = self.items.iter()
            .map(|other| other.version.load(Ordering::SeqCst))
            .any(|v| v != 0 && v != reader.version());
        if divergent {
            for other in &self.items {
                other.refresh.store(true, Ordering::SeqCst);
            }
        }
        Ok(reader)
    }

    /// Make the next borrow of every item see the latest commit
    pub fn force_refresh(&self) {
        let mut state = self.state.lock();
        for item in &self.items {
            item.refresh.store(true, Ordering::SeqCst);
        }
        state.last_refresh = Instant::now();
        debug!(pool = self.name, "forced refresh");
    }

    /// Drop every pooled reader; borrowed ones close when returned
    pub fn reset(&self) {
        for item in &self.items {
            let mut slot = item.slot.lock();
            if let Some(reader) = slot.take() {
                retire(&reader);
            }
            item.version.store(0, Ordering::SeqCst);
            item.refresh.store(false, Ordering::SeqCst);
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reset();
        debug!(pool = self.name, "reader pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Version stamp of each item, 0 for empty items
    pub fn versions(&self) -> Vec<u64> {
        self.items.iter().map(|item| item.version.load(Ordering::SeqCst)).collect()
    }

    /// True when every item is marked for refresh or all loaded items agree
    pub fn is_converging(&self) -> bool {
        if self.items.iter().any(|item| item.refresh.load(Ordering::SeqCst)) {
            return true;
        }
        let mut versions = self.versions().into_iter().filter(|&v| v != 0);
        match versions.next() {
            Some(first) => versions.all(|v| v == first),
            None => true,
        }
    }
}

/// Drop the pool's reference after requesting a close
fn retire(reader: &RefCountedReader) {
    reader.close();
    reader.release();
}

fn thread_slot(size: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    thread::current().id().hash(&mut hasher);
    (hasher.finish() % size as u64) as usize
}

/// A borrowed reader, returned to the pool on drop
pub struct PooledReader {
    reader: Arc<RefCountedReader>,
}

impl PooledReader {
    pub fn reader(&self) -> Result<MappedRwLockReadGuard<'_, IndexReader>> {
        self.reader.reader()
    }

    pub fn version(&self) -> u64 {
        self.reader.version()
    }

    /// Return the reader now rather than at end of scope
    pub fn release(self) {}
}

impl Drop for PooledReader {
    fn drop(&mut self) {
        self.reader.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Document, Field};
    use crate::index::index_writer::{IndexWriter, WriterConfig};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<StorageLayout>) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageLayout::open(dir.path().to_path_buf()).unwrap());
        storage.initialize().unwrap();
        (dir, storage)
    }

    fn commit_one(storage: &Arc<StorageLayout>, path: &str) -> u64 {
        let mut writer = IndexWriter::open(storage.clone(), WriterConfig::default()).unwrap();
        let mut doc = Document::new();
        doc.add(Field::indexed_stored("path", path));
        writer.add_document(doc).unwrap();
        writer.close().unwrap()
    }

    #[test]
    fn test_forced_refresh_converges_every_item() {
        let (_dir, storage) = setup();
        let pool = ReaderPool::new("aging", storage.clone(), 3, 3600);
        for _ in 0..3 {
            pool.borrow(false).unwrap();
        }
        let before = storage.generation();
        assert_eq!(pool.versions(), vec![before; 3]);

        let after = commit_one(&storage, "/a");
        // Within the staleness window nothing moves
        assert_eq!(pool.borrow(false).unwrap().version(), before);

        pool.force_refresh();
        for _ in 0..3 {
            let borrowed = pool.borrow(false).unwrap();
            assert_eq!(borrowed.version(), after);
            assert_eq!(borrowed.reader().unwrap().num_docs(), 1);
        }
        assert_eq!(pool.versions(), vec![after; 3]);
    }

    #[test]
    fn test_zero_staleness_always_current() {
        let (_dir, storage) = setup();
        let pool = ReaderPool::new("normal", storage.clone(), 2, 0);
        pool.borrow(false).unwrap();
        let after = commit_one(&storage, "/a");
        assert_eq!(pool.borrow(false).unwrap().version(), after);
        assert_eq!(pool.borrow(false).unwrap().version(), after);
    }

    #[test]
    fn test_replaced_reader_survives_until_returned() {
        let (_dir, storage) = setup();
        let pool = ReaderPool::new("normal", storage.clone(), 1, 0);
        let old = pool.borrow(false).unwrap();
        let old_version = old.version();

        commit_one(&storage, "/a");
        let new = pool.borrow(false).unwrap();
        assert!(new.version() > old_version);

        // Still usable: the deferred close waits for this handle
        assert_eq!(old.reader().unwrap().num_docs(), 0);
        let inner = old.reader.clone();
        assert!(inner.is_close_pending());
        old.release();
        assert!(inner.is_closed());
    }

    #[test]
    fn test_divergent_items_are_marked_for_refresh() {
        let (_dir, storage) = setup();
        let pool = ReaderPool::new("aging", storage.clone(), 2, 3600);
        pool.borrow(false).unwrap();      // item 1
        commit_one(&storage, "/a");
        pool.borrow(false).unwrap();      // item 0 opens on the new commit
        assert!(pool.is_converging());

        let versions = pool.versions();
        assert_ne!(versions[0], versions[1]);
        // Next borrow notices the split and moves item 1 forward
        pool.borrow(false).unwrap();
        let versions = pool.versions();
        assert_eq!(versions[0], versions[1]);
    }

    #[test]
    fn test_failed_reopen_discards_reader_and_heals() {
        let (_dir, storage) = setup();
        let pool = ReaderPool::new("normal", storage.clone(), 1, 0);
        let first = pool.borrow(false).unwrap().version();

        commit_one(&storage, "/a");
        for segment in storage.list_segments().unwrap() {
            std::fs::remove_file(storage.segment_path(&segment)).unwrap();
        }
        storage.cache().clear();

        assert!(pool.borrow(false).is_err());
        assert_eq!(pool.versions(), vec![0]);

        storage.clear_contents().unwrap();
        storage.initialize().unwrap();
        let healed = pool.borrow(false).unwrap();
        assert!(healed.version() > first);
        assert_eq!(healed.reader().unwrap().num_docs(), 0);
        assert_eq!(pool.versions(), vec![healed.version()]);
    }

    #[test]
    fn test_affinity_picks_the_same_item() {
        let (_dir, storage) = setup();
        let pool = ReaderPool::new("aging", storage, 4, 3600);
        let first = pool.borrow(true).unwrap();
        let second = pool.borrow(true).unwrap();
        assert!(Arc::ptr_eq(&first.reader, &second.reader));
        assert_eq!(first.reader.ref_count(), 3);
    }

    #[test]
    fn test_closed_pool_refuses_borrows() {
        let (_dir, storage) = setup();
        let pool = ReaderPool::new("normal", storage, 1, 0);
        let borrowed = pool.borrow(false).unwrap();
        pool.close();
        assert!(pool.borrow(false).is_err());
        assert!(borrowed.reader().is_ok());
    }

    #[test]
    fn test_failed_open_leaves_item_empty() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageLayout::open(dir.path().to_path_buf()).unwrap());
        let pool = ReaderPool::new("normal", storage.clone(), 1, 0);
        assert!(pool.borrow(false).is_err());
        assert_eq!(pool.versions(), vec![0]);

        storage.initialize().unwrap();
        assert!(pool.borrow(false).is_ok());
    }
}
