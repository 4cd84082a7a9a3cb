use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::index::check::{check_index, CheckReport};
use crate::index::index_reader::IndexReader;
use crate::index::index_writer::{IndexWriter, WriterConfig};
use crate::reader::reader_pool::{PooledReader, ReaderPool};
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::writer::write_lock::WriteLock;

/// Produces the directory an `IndexManager` works on
pub trait DirectoryProvider: Send + Sync {
    fn open_directory(&self) -> Result<Arc<StorageLayout>>;
}

/// Plain filesystem directory
pub struct FsDirectoryProvider {
    path: PathBuf,
}

impl FsDirectoryProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FsDirectoryProvider { path: path.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.index_path())
    }
}

impl DirectoryProvider for FsDirectoryProvider {
    fn open_directory(&self) -> Result<Arc<StorageLayout>> {
        StorageLayout::open(self.path.clone()).map(Arc::new)
    }
}

/// Which reader pool to borrow from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Always sees the latest commit
    Normal,
    /// May lag behind by up to `aging_max_staleness_secs`
    Aging,
}

/// Writer and primary reader; never both open at once
#[derive(Default)]
struct ManagerState {
    writer: Option<IndexWriter>,
    reader: Option<IndexReader>,
    commits: u32,
    batch_mode: bool,
}

/// Lifecycle manager of one index instance.
///
/// Every write operation requires the caller to hold the write lock
/// (`lock`/`try_lock`, released with `unlock`). Pooled reads need no lock.
pub struct IndexManager {
    config: Config,
    storage: Arc<StorageLayout>,
    lock: WriteLock,
    state: Mutex<ManagerState>,
    pool: ReaderPool,
    aging_pool: ReaderPool,
    closed: AtomicBool,
}

impl IndexManager {
    /// Open the index at `<storage_root>/<storage_id>`
    pub fn open(config: Config) -> Result<Self> {
        let provider = FsDirectoryProvider::from_config(&config);
        Self::with_provider(config, &provider)
    }

    pub fn with_provider(config: Config, provider: &dyn DirectoryProvider) -> Result<Self> {
        let storage = provider.open_directory()?;
        let manager = IndexManager {
            pool: ReaderPool::new("normal", storage.clone(), config.pool_size, 0),
            aging_pool: ReaderPool::new(
                "aging",
                storage.clone(),
                config.aging_pool_size,
                config.aging_max_staleness_secs,
            ),
            storage,
            config,
            lock: WriteLock::new(),
            state: Mutex::new(ManagerState::default()),
            closed: AtomicBool::new(false),
        };

        manager.lock.acquire();
        let opened = manager.reinitialize();
        manager.lock.release();
        opened?;

        info!(dir = %manager.storage.base_dir.display(), generation = manager.storage.generation(), "index opened");
        Ok(manager)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Arc<StorageLayout> {
        &self.storage
    }

    // Write lock

    pub fn lock(&self) -> bool {
        self.lock.acquire()
    }

    pub fn try_lock(&self, timeout: Duration) -> bool {
        self.lock.try_acquire(timeout)
    }

    pub fn unlock(&self) {
        self.lock.release()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::unavailable(format!("Index {} is closed", self.storage.base_dir.display())));
        }
        if !self.lock.is_locked() {
            return Err(Error::invalid_state("Write lock must be held"));
        }
        Ok(())
    }

    /// Close writer and reader, then make sure a usable index is on disk
    pub fn reinitialize(&self) -> Result<()> {
        self.ensure_writable()?;
        let mut state = self.state.lock();
        Self::close_writer(&mut state)?;
        state.reader = None;

        if FileLock::is_locked(&self.storage) {
            if !FileLock::is_stale(&self.storage)? {
                return Err(Error::lock_contention(format!(
                    "Index {} is locked by another writer",
                    self.storage.base_dir.display()
                )));
            }
            if self.config.force_unlock_on_open {
                warn!(dir = %self.storage.base_dir.display(), "removing stale index lock");
                FileLock::force_unlock(&self.storage)?;
            } else {
                warn!(dir = %self.storage.base_dir.display(), "stale index lock present");
            }
        }

        if self.storage.initialize()? {
            info!(dir = %self.storage.base_dir.display(), "created new index");
        } else {
            self.storage.reload_generation()?;
        }
        Ok(())
    }

    fn close_writer(state: &mut ManagerState) -> Result<()> {
        if let Some(writer) = state.writer.take() {
            writer.close()?;
        }
        Ok(())
    }

    fn writer_config(&self, batch_mode: bool) -> WriterConfig {
        if batch_mode {
            self.config.batch.into()
        } else {
            self.config.incremental.into()
        }
    }

    /// The single writer, opened on demand. Closes the primary reader.
    pub fn writer(&self) -> Result<MappedMutexGuard<'_, IndexWriter>> {
        self.ensure_writable()?;
        let mut state = self.state.lock();
        state.reader = None;

        if state.writer.is_none() {
            let config = self.writer_config(state.batch_mode);
            debug!(batch = state.batch_mode, merge_factor = config.merge_factor, "opening index writer");
            state.writer = Some(IndexWriter::open(self.storage.clone(), config)?);
        }
        MutexGuard::try_map(state, |s| s.writer.as_mut())
            .map_err(|_| Error::internal("Index writer vanished"))
    }

    /// Non-pooled reader for use inside a write session. Closes the writer.
    pub fn reader(&self) -> Result<MappedMutexGuard<'_, IndexReader>> {
        self.ensure_writable()?;
        let mut state = self.state.lock();
        Self::close_writer(&mut state)?;

        let stale = state.reader.as_ref().is_none_or(|r| !r.is_current());
        if stale {
            state.reader = Some(IndexReader::open(self.storage.clone())?);
        }
        MutexGuard::try_map(state, |s| s.reader.as_mut())
            .map_err(|_| Error::internal("Index reader vanished"))
    }

    /// Make pending changes durable and visible to the next pooled borrow
    pub fn commit(&self) -> Result<u64> {
        self.ensure_writable()?;
        let mut state = self.state.lock();
        Self::close_writer(&mut state)?;
        state.reader = None;
        state.commits = state.commits.wrapping_add(1);

        let every = self.config.commits_per_optimize;
        if every > 0 && state.commits % every == 0 {
            info!(commits = state.commits, "periodic optimize");
            let mut writer = IndexWriter::open(self.storage.clone(), self.writer_config(state.batch_mode))?;
            writer.force_merge()?;
            writer.close()?;
        }
        drop(state);

        self.pool.force_refresh();
        self.aging_pool.force_refresh();
        Ok(self.storage.generation())
    }

    /// Discard everything written since the last commit
    pub fn rollback(&self) -> Result<()> {
        self.ensure_writable()?;
        if let Some(writer) = self.state.lock().writer.take() {
            writer.rollback();
            warn!(dir = %self.storage.base_dir.display(), "uncommitted changes rolled back");
        }
        Ok(())
    }

    /// Merge the index down to one segment; visible after `commit`
    pub fn optimize(&self) -> Result<()> {
        self.writer()?.force_merge()
    }

    /// Delete every document; visible after `commit`
    pub fn clear(&self) -> Result<()> {
        self.writer()?.delete_all();
        Ok(())
    }

    /// Wipe the directory and start over with an empty index
    pub fn recreate(&self) -> Result<()> {
        self.ensure_writable()?;
        let mut state = self.state.lock();
        if let Some(writer) = state.writer.take() {
            writer.rollback();
        }
        state.reader = None;

        self.pool.reset();
        self.aging_pool.reset();
        self.storage.clear_contents()?;
        self.storage.initialize()?;
        drop(state);

        self.pool.force_refresh();
        self.aging_pool.force_refresh();
        info!(dir = %self.storage.base_dir.display(), generation = self.storage.generation(), "index recreated");
        Ok(())
    }

    /// Engine checksum pass over the committed index
    pub fn check(&self) -> Result<CheckReport> {
        check_index(&self.storage)
    }

    /// Tuning for the next writer opened
    pub fn set_batch_mode(&self, batch: bool) {
        self.state.lock().batch_mode = batch;
    }

    pub fn is_batch_mode(&self) -> bool {
        self.state.lock().batch_mode
    }

    pub fn borrow_reader(&self, kind: PoolKind, affinity: bool) -> Result<PooledReader> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::unavailable(format!("Index {} is closed", self.storage.base_dir.display())));
        }
        match kind {
            PoolKind::Normal => self.pool.borrow(affinity),
            PoolKind::Aging => self.aging_pool.borrow(affinity),
        }
    }

    pub fn pool(&self, kind: PoolKind) -> &ReaderPool {
        match kind {
            PoolKind::Normal => &self.pool,
            PoolKind::Aging => &self.aging_pool,
        }
    }

    /// Shut down once in-flight write sessions finish, waiting at most the
    /// configured timeout. Returns false, leaving everything open, on timeout.
    pub fn close(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return true;
        }
        if !self.lock.try_acquire(self.config.shutdown_lock_timeout()) {
            error!(
                dir = %self.storage.base_dir.display(),
                timeout_secs = self.config.shutdown_lock_timeout_secs,
                "could not obtain write lock for shutdown, index left open"
            );
            return false;
        }

        {
            let mut state = self.state.lock();
            if let Err(e) = Self::close_writer(&mut state) {
                warn!(error = %e, "index writer failed to close cleanly");
            }
            state.reader = None;
        }
        self.pool.close();
        self.aging_pool.close();
        self.closed.store(true, Ordering::SeqCst);
        self.lock.release();

        info!(dir = %self.storage.base_dir.display(), "index closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
