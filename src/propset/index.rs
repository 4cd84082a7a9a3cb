use std::sync::Arc;
use std::time::Duration;
use roaring::RoaringBitmap;
use tracing::{debug, error};
use crate::core::error::{Error, Result};
use crate::core::manager::{IndexManager, PoolKind};
use crate::core::types::DocId;
use crate::index::index_reader::IndexReader;
use crate::index::term::Term;
use crate::mapper::document_mapper::{DocumentMapper, PropertySelector};
use crate::propset::acl::AclFilterFactory;
use crate::propset::model::{PropertySet, Value};
use crate::propset::path::Path;
use crate::schema::types::PropertyKey;

/// Property-set view of one index.
///
/// Write operations need the write lock (`lock`/`try_lock`/`unlock`) and
/// become visible on `commit`. Reads borrow pooled readers and never lock.
pub struct PropertySetIndex {
    manager: Arc<IndexManager>,
    mapper: Arc<DocumentMapper>,
    acl_filter: Option<Arc<dyn AclFilterFactory>>,
    pool: PoolKind,
}

impl PropertySetIndex {
    pub fn new(manager: Arc<IndexManager>, mapper: Arc<DocumentMapper>) -> Self {
        PropertySetIndex {
            manager,
            mapper,
            acl_filter: None,
            pool: PoolKind::Normal,
        }
    }

    pub fn with_acl_filter(mut self, filter: Arc<dyn AclFilterFactory>) -> Self {
        self.acl_filter = Some(filter);
        self
    }

    /// Serve reads from the aging pool instead of the always-fresh one
    pub fn with_pool(mut self, pool: PoolKind) -> Self {
        self.pool = pool;
        self
    }

    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    pub fn mapper(&self) -> &Arc<DocumentMapper> {
        &self.mapper
    }

    // Locking

    pub fn lock(&self) -> bool {
        self.manager.lock()
    }

    pub fn try_lock(&self, timeout: Duration) -> bool {
        self.manager.try_lock(timeout)
    }

    pub fn unlock(&self) {
        self.manager.unlock()
    }

    // Writes

    /// Adds without touching existing sets at the same path
    pub fn add_property_set(&self, ps: &PropertySet, acl_read_principals: &[String]) -> Result<()> {
        let doc = self.mapper.to_document(ps, acl_read_principals)?;
        self.manager.writer()?.add_document(doc)
    }

    /// Replaces every set at the path
    pub fn update_property_set(&self, ps: &PropertySet, acl_read_principals: &[String]) -> Result<()> {
        let doc = self.mapper.to_document(ps, acl_read_principals)?;
        let mut writer = self.manager.writer()?;
        writer.delete_documents(&DocumentMapper::path_term(&ps.path));
        writer.add_document(doc)
    }

    /// Removes every set at the path, duplicates included
    pub fn delete_property_set(&self, path: &Path) -> Result<usize> {
        Ok(self.manager.writer()?.delete_documents(&DocumentMapper::path_term(path)))
    }

    /// Removes the set at `root` and all its descendants
    pub fn delete_property_set_tree(&self, root: &Path) -> Result<usize> {
        let mut writer = self.manager.writer()?;
        let deleted = writer.delete_documents(&DocumentMapper::path_term(root))
            + writer.delete_documents(&DocumentMapper::ancestor_term(root));
        debug!(root = %root, deleted, "deleted property set tree");
        Ok(deleted)
    }

    pub fn delete_property_set_by_id(&self, id: i32) -> Result<usize> {
        Ok(self.manager.writer()?.delete_documents(&DocumentMapper::id_term(id)))
    }

    pub fn clear(&self) -> Result<()> {
        self.manager.clear()
    }

    pub fn commit(&self) -> Result<u64> {
        self.manager.commit()
    }

    pub fn optimize(&self) -> Result<()> {
        self.manager.optimize()
    }

    /// Throw the index away and start empty
    pub fn reinitialize(&self) -> Result<()> {
        self.manager.recreate()
    }

    // Reads

    fn load(&self, reader: &IndexReader, docs: &RoaringBitmap, selector: &PropertySelector) -> Result<Vec<PropertySet>> {
        let fields = self.mapper.field_selector(selector);
        docs.iter()
            .map(|doc| self.mapper.from_document(&reader.document(DocId(doc), &fields)?))
            .collect()
    }

    /// First set at the path, if any
    pub fn get_property_set(&self, path: &Path, selector: &PropertySelector) -> Result<Option<PropertySet>> {
        let pooled = self.manager.borrow_reader(self.pool, false)?;
        let reader = pooled.reader()?;
        let Some(first) = reader.term_docs(&DocumentMapper::path_term(path)).min() else {
            return Ok(None);
        };
        let fields = self.mapper.field_selector(selector);
        self.mapper.from_document(&reader.document(DocId(first), &fields)?).map(Some)
    }

    /// Every set at the path (more than one if duplicates were added)
    pub fn get_property_sets(&self, path: &Path, selector: &PropertySelector) -> Result<Vec<PropertySet>> {
        let pooled = self.manager.borrow_reader(self.pool, false)?;
        let reader = pooled.reader()?;
        let docs = reader.term_docs(&DocumentMapper::path_term(path));
        self.load(&reader, &docs, selector)
    }

    pub fn count_instances(&self, path: &Path) -> Result<u64> {
        let pooled = self.manager.borrow_reader(self.pool, false)?;
        let count = pooled.reader()?.doc_freq(&DocumentMapper::path_term(path));
        Ok(count)
    }

    pub fn count_all_instances(&self) -> Result<u64> {
        let pooled = self.manager.borrow_reader(self.pool, false)?;
        let count = pooled.reader()?.num_docs() as u64;
        Ok(count)
    }

    /// Every indexed set, by path when `ordered`, else in index order
    pub fn property_sets(&self, ordered: bool, selector: &PropertySelector) -> Result<Vec<PropertySet>> {
        let pooled = self.manager.borrow_reader(self.pool, false)?;
        let reader = pooled.reader()?;
        let mut sets = self.load(&reader, &reader.live_docs(), selector)?;
        if ordered {
            sets.sort_by(|a, b| a.path.cmp(&b.path));
        }
        Ok(sets)
    }

    /// Sets whose property `key` equals `value`, limited to what `token` may read
    pub fn search(&self, key: &PropertyKey, value: &Value, token: Option<&str>) -> Result<Vec<PropertySet>> {
        let term = self.mapper.property_term(key, value, false)?;
        self.search_term(&term, token)
    }

    /// Case-insensitive variant for string, HTML and JSON properties
    pub fn search_ignore_case(&self, key: &PropertyKey, value: &Value, token: Option<&str>) -> Result<Vec<PropertySet>> {
        let term = self.mapper.property_term(key, value, true)?;
        self.search_term(&term, token)
    }

    /// Raw term query, e.g. one of `DocumentMapper`'s system-field terms
    pub fn search_term(&self, term: &Term, token: Option<&str>) -> Result<Vec<PropertySet>> {
        let pooled = self.manager.borrow_reader(self.pool, true)?;
        let reader = pooled.reader()?;
        let mut docs = reader.term_docs(term);
        if let Some(factory) = &self.acl_filter {
            if let Some(allowed) = factory.filter(token, &reader)? {
                docs &= allowed;
            }
        }
        self.load(&reader, &docs, &PropertySelector::All)
    }

    /// Checksums every segment, then decodes every stored document.
    /// Any failure is reported as corruption.
    pub fn validate(&self) -> Result<()> {
        let report = self.manager.check()?;

        let pooled = self.manager.borrow_reader(PoolKind::Normal, false)?;
        let reader = pooled.reader()?;
        let all = self.mapper.field_selector(&PropertySelector::All);
        for doc in reader.live_docs().iter() {
            let loaded = reader.document(DocId(doc), &all)
                .and_then(|stored| self.mapper.from_document(&stored));
            if let Err(e) = loaded {
                error!(doc, error = %e, "stored document does not map");
                return Err(Error::corruption(format!("Document {}: {}", doc, e)));
            }
        }

        debug!(segments = report.segments, docs = report.live_docs, "index validated");
        Ok(())
    }
}
