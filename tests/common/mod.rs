#![allow(dead_code)]

use std::sync::Arc;
use propindex::{
    Config, DocumentMapper, IndexManager, Path, Property, PropertyKey, PropertySet, PropertySetIndex,
    PropertyTypeDefinition, StaticTypeRegistry, Value, ValueType,
};
use tempfile::TempDir;

pub fn registry() -> Arc<StaticTypeRegistry> {
    Arc::new(
        [
            PropertyTypeDefinition::new(None, "x", ValueType::Int),
            PropertyTypeDefinition::new(None, "title", ValueType::String),
            PropertyTypeDefinition::new(None, "tags", ValueType::String).multiple(),
            PropertyTypeDefinition::new(Some("sys"), "modified", ValueType::Timestamp),
        ]
        .into_iter()
        .collect(),
    )
}

pub fn open_index(dir: &TempDir, id: &str) -> Arc<PropertySetIndex> {
    open_with(dir, id, |_| {})
}

pub fn open_with(dir: &TempDir, id: &str, tweak: impl FnOnce(&mut Config)) -> Arc<PropertySetIndex> {
    let mut config = Config::new(dir.path(), id);
    config.shutdown_lock_timeout_secs = 1;
    tweak(&mut config);
    let manager = Arc::new(IndexManager::open(config).expect("open index"));
    Arc::new(PropertySetIndex::new(manager, Arc::new(DocumentMapper::new(registry()))))
}

pub fn property(index: &PropertySetIndex, name: &str, value: Value) -> Property {
    let definition = index.mapper().types().definition(&PropertyKey::local(name)).expect("known property");
    Property::single(definition, value).expect("valid property")
}

pub fn set(index: &PropertySetIndex, path: &str, id: i32) -> PropertySet {
    PropertySet::new(Path::parse(path).expect("valid path"), "resource", id)
        .with_property(property(index, "title", Value::String(format!("Resource {}", id))))
}

pub fn path(s: &str) -> Path {
    Path::parse(s).expect("valid path")
}

/// Add sets under the write lock and commit
pub fn index_all(index: &PropertySetIndex, sets: &[PropertySet]) {
    index.lock();
    for ps in sets {
        index.add_property_set(ps, &[]).unwrap();
    }
    index.commit().unwrap();
    index.unlock();
}
