use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use crate::core::error::{Error, Result};
use crate::propset::index::PropertySetIndex;
use crate::propset::path::Path;
use crate::reindex::source::{PropertySetSource, SourceIter};

/// Rebuilds an index from a property-set source
pub trait Reindexer {
    /// Returns the number of property sets indexed
    fn run(&self) -> Result<usize>;
}

/// Rebuilds in place. The caller must hold the target's write lock.
pub struct DirectReindexer {
    target: Arc<PropertySetIndex>,
    source: Arc<dyn PropertySetSource>,
    ordered: bool,
}

impl DirectReindexer {
    pub fn new(target: Arc<PropertySetIndex>, source: Arc<dyn PropertySetSource>) -> Self {
        DirectReindexer {
            target,
            source,
            ordered: false,
        }
    }

    /// Traverse the source in path order
    pub fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    /// Re-index only `root` and its descendants
    pub fn run_subtree(&self, root: &Path) -> Result<usize> {
        self.in_batch_mode(|| {
            let deleted = self.target.delete_property_set_tree(root)?;
            let added = self.add_all(self.source.subtree(root)?)?;
            info!(root = %root, deleted, added, "subtree reindexed");
            Ok(added)
        })
    }

    fn add_all(&self, sets: SourceIter<'_>) -> Result<usize> {
        let mut count = 0;
        for set in sets {
            let set = set?;
            self.target.add_property_set(&set.property_set, &set.acl_read_principals)?;
            count += 1;
        }
        Ok(count)
    }

    /// Runs `build` with batch tuning, then commits; rolls back on failure
    fn in_batch_mode(&self, build: impl FnOnce() -> Result<usize>) -> Result<usize> {
        let manager = self.target.manager();
        manager.set_batch_mode(true);

        let result = build().and_then(|count| self.target.commit().map(|_| count));
        if result.is_err() {
            if let Err(e) = manager.rollback() {
                warn!(error = %e, "rollback after failed reindex failed");
            }
        }

        manager.set_batch_mode(false);
        result
    }
}

impl Reindexer for DirectReindexer {
    fn run(&self) -> Result<usize> {
        let started = Instant::now();
        let result = self.in_batch_mode(|| {
            self.target.clear()?;
            self.add_all(self.source.property_sets(self.ordered)?)
        });

        match &result {
            Ok(count) => info!(count, elapsed_ms = started.elapsed().as_millis() as u64, "direct reindex finished"),
            Err(e) => error!(error = %e, "direct reindex failed"),
        }
        result
    }
}

/// Releases the locks taken by an indirect reindex, whatever happens
struct LockGuard<'a> {
    locked: Vec<&'a PropertySetIndex>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        for index in self.locked.drain(..).rev() {
            index.unlock();
        }
    }
}

/// Builds into a scratch index and then swaps the result into the target
/// in one step, so readers of the target never see a half-built index.
pub struct IndirectReindexer {
    target: Arc<PropertySetIndex>,
    scratch: Arc<PropertySetIndex>,
    source: Arc<dyn PropertySetSource>,
    lock_timeout: Duration,
}

impl IndirectReindexer {
    pub fn new(
        target: Arc<PropertySetIndex>,
        scratch: Arc<PropertySetIndex>,
        source: Arc<dyn PropertySetSource>,
    ) -> Self {
        IndirectReindexer {
            target,
            scratch,
            source,
            lock_timeout: Duration::ZERO,
        }
    }

    /// How long to wait for each write lock; zero fails at once
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn lock_both(&self) -> Result<LockGuard<'_>> {
        let mut guard = LockGuard { locked: Vec::with_capacity(2) };

        // Target first: if it is busy the scratch index is never touched
        for (name, index) in [("target", &self.target), ("scratch", &self.scratch)] {
            if !index.try_lock(self.lock_timeout) {
                return Err(Error::lock_contention(format!("Could not lock {} index for reindex", name)));
            }
            guard.locked.push(Arc::as_ref(index));
        }
        Ok(guard)
    }

    fn swap_into_target(&self) -> Result<()> {
        let manager = self.target.manager();
        let scratch_storage = self.scratch.manager().storage().clone();

        let absorbed = (|| {
            self.target.clear()?;
            manager.writer()?.add_indexes(&scratch_storage)?;
            self.target.commit()
        })();

        if let Err(e) = absorbed {
            if let Err(rollback) = manager.rollback() {
                warn!(error = %rollback, "target rollback failed");
            }
            return Err(e);
        }
        Ok(())
    }
}

impl Reindexer for IndirectReindexer {
    fn run(&self) -> Result<usize> {
        let started = Instant::now();
        let _locks = self.lock_both()?;

        let count = DirectReindexer::new(self.scratch.clone(), self.source.clone())
            .run()
            .inspect_err(|e| error!(error = %e, "scratch build failed, target untouched"))?;

        self.swap_into_target()?;

        // Scratch content is no longer needed
        if let Err(e) = self.scratch.reinitialize() {
            warn!(error = %e, "could not empty scratch index");
        }

        info!(count, elapsed_ms = started.elapsed().as_millis() as u64, "indirect reindex finished");
        Ok(count)
    }
}
