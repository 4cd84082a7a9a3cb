use crate::core::error::Result;
use crate::propset::model::PropertySet;
use crate::propset::path::Path;

/// A property set as the content repository hands it over for indexing
#[derive(Debug, Clone)]
pub struct IndexableSet {
    pub property_set: PropertySet,
    pub acl_read_principals: Vec<String>,
}

impl IndexableSet {
    pub fn new(property_set: PropertySet, acl_read_principals: Vec<String>) -> Self {
        IndexableSet {
            property_set,
            acl_read_principals,
        }
    }
}

pub type SourceIter<'a> = Box<dyn Iterator<Item = Result<IndexableSet>> + 'a>;

/// Traversal of the content repository used to rebuild an index
pub trait PropertySetSource: Send + Sync {
    /// Every property set, in path order when `ordered`
    fn property_sets(&self, ordered: bool) -> Result<SourceIter<'_>>;

    /// `root` and everything below it
    fn subtree(&self, root: &Path) -> Result<SourceIter<'_>>;
}

/// Source over an in-memory list
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    sets: Vec<IndexableSet>,
}

impl MemorySource {
    pub fn new(sets: Vec<IndexableSet>) -> Self {
        MemorySource { sets }
    }

    pub fn push(&mut self, set: IndexableSet) {
        self.sets.push(set);
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl PropertySetSource for MemorySource {
    fn property_sets(&self, ordered: bool) -> Result<SourceIter<'_>> {
        let mut sets: Vec<&IndexableSet> = self.sets.iter().collect();
        if ordered {
            sets.sort_by(|a, b| a.property_set.path.cmp(&b.property_set.path));
        }
        Ok(Box::new(sets.into_iter().cloned().map(Ok)))
    }

    fn subtree(&self, root: &Path) -> Result<SourceIter<'_>> {
        let root = root.clone();
        Ok(Box::new(
            self.sets.iter()
                .filter(move |s| s.property_set.path == root || root.is_ancestor_of(&s.property_set.path))
                .cloned()
                .map(Ok),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(path: &str) -> IndexableSet {
        IndexableSet::new(PropertySet::new(Path::parse(path).unwrap(), "doc", 0), Vec::new())
    }

    #[test]
    fn test_ordered_and_subtree_traversal() {
        let source = MemorySource::new(vec![set("/b"), set("/a/x"), set("/a"), set("/ab")]);

        let ordered: Vec<String> = source.property_sets(true).unwrap()
            .map(|s| s.unwrap().property_set.path.to_string())
            .collect();
        assert_eq!(ordered, vec!["/a", "/a/x", "/ab", "/b"]);

        let subtree = source.subtree(&Path::parse("/a").unwrap()).unwrap().count();
        assert_eq!(subtree, 2);
    }
}
