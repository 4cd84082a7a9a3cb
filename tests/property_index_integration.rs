mod common;

use common::*;
use propindex::{PoolKind, PropertyKey, PropertySelector, PropertySet, Value};
use tempfile::TempDir;

#[test]
fn test_single_int_property_roundtrip() {
    let dir = TempDir::new().unwrap();
    let index = open_index(&dir, "scenario_a");

    let ps = PropertySet::new(path("/a/b"), "resource", 1)
        .with_property(property(&index, "x", Value::Int(42)));
    index_all(&index, &[ps]);

    let loaded = index.get_property_set(&path("/a/b"), &PropertySelector::All).unwrap().unwrap();
    let x = loaded.property(&PropertyKey::local("x")).unwrap();
    assert_eq!(x.value(), Some(&Value::Int(42)));
}

#[test]
fn test_duplicate_paths_are_counted_and_deleted_together() {
    let dir = TempDir::new().unwrap();
    let index = open_index(&dir, "scenario_b");
    index_all(&index, &[set(&index, "/dup", 1), set(&index, "/dup", 2), set(&index, "/other", 3)]);

    assert_eq!(index.count_instances(&path("/dup")).unwrap(), 2);
    assert_eq!(index.get_property_sets(&path("/dup"), &PropertySelector::All).unwrap().len(), 2);

    index.lock();
    assert_eq!(index.delete_property_set(&path("/dup")).unwrap(), 2);
    index.commit().unwrap();
    index.unlock();

    assert_eq!(index.count_instances(&path("/dup")).unwrap(), 0);
    assert_eq!(index.count_all_instances().unwrap(), 1);
}

#[test]
fn test_delete_tree_keeps_unrelated_paths() {
    let dir = TempDir::new().unwrap();
    let index = open_index(&dir, "scenario_c");
    index_all(
        &index,
        &[
            set(&index, "/a", 1),
            set(&index, "/a/b", 2),
            set(&index, "/a/b/c", 3),
            set(&index, "/ab", 4),
            set(&index, "/x", 5),
        ],
    );

    index.lock();
    assert_eq!(index.delete_property_set_tree(&path("/a")).unwrap(), 3);
    index.commit().unwrap();
    index.unlock();

    let remaining: Vec<String> = index.property_sets(true, &PropertySelector::All).unwrap()
        .into_iter()
        .map(|ps| ps.path.to_string())
        .collect();
    assert_eq!(remaining, vec!["/ab", "/x"]);
}

#[test]
fn test_multi_valued_order_survives_the_index() {
    let dir = TempDir::new().unwrap();
    let index = open_index(&dir, "multi");
    let definition = index.mapper().types().definition(&PropertyKey::local("tags")).unwrap();
    let tags: Vec<Value> = ["zeta", "alpha", "mid", "alpha"].iter().map(|t| Value::String(t.to_string())).collect();
    let ps = set(&index, "/tagged", 1)
        .with_property(propindex::Property::multiple(definition, tags.clone()).unwrap());
    index_all(&index, &[ps]);

    let selector = PropertySelector::only([PropertyKey::local("tags")]);
    let loaded = index.get_property_set(&path("/tagged"), &selector).unwrap().unwrap();
    assert_eq!(loaded.properties.len(), 1);
    assert_eq!(loaded.properties[0].values(), tags.as_slice());
}

#[test]
fn test_commit_is_visible_to_every_pool_item() {
    let dir = TempDir::new().unwrap();
    let index = open_with(&dir, "pool", |config| {
        config.aging_pool_size = 3;
        config.aging_max_staleness_secs = 3600;
    });
    let manager = index.manager().clone();
    let aging = manager.pool(PoolKind::Aging);
    for _ in 0..aging.size() {
        manager.borrow_reader(PoolKind::Aging, false).unwrap();
    }

    index_all(&index, &[set(&index, "/new", 1)]);
    let committed = manager.storage().generation();

    for _ in 0..aging.size() {
        let reader = manager.borrow_reader(PoolKind::Aging, false).unwrap();
        assert_eq!(reader.version(), committed);
    }
    assert!(aging.versions().iter().all(|&v| v == committed));
}

#[test]
fn test_validate_reports_damaged_segment_as_corruption() {
    let dir = TempDir::new().unwrap();
    let index = open_index(&dir, "damaged");
    index_all(&index, &[set(&index, "/a", 1)]);
    index.validate().unwrap();

    let storage = index.manager().storage().clone();
    let segment = storage.list_segments().unwrap()[0];
    let file = storage.segment_path(&segment);
    let mut bytes = std::fs::read(&file).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&file, bytes).unwrap();

    assert!(index.validate().unwrap_err().is_corruption());
}

#[test]
fn test_reopen_existing_index() {
    let dir = TempDir::new().unwrap();
    {
        let index = open_index(&dir, "persist");
        index_all(&index, &[set(&index, "/kept", 9)]);
        assert!(index.manager().close());
    }

    let index = open_index(&dir, "persist");
    let loaded = index.get_property_set(&path("/kept"), &PropertySelector::All).unwrap().unwrap();
    assert_eq!(loaded.id, 9);
    assert_eq!(loaded.type_name, "resource");
}
