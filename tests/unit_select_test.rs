use fleetmon::config::Config;
use fleetmon::core::entity::BackendStat;
use fleetmon::core::filter::{Filter, ItemTypes};
use fleetmon::core::storage::Storage;

fn backend_stat(backend_id: u64, group: u64) -> BackendStat {
    BackendStat {
        ts_sec: 1000,
        backend_id,
        state: 1,
        group,
        fsid: 1,
        vfs_blocks: 1000,
        vfs_bsize: 4096,
        vfs_bavail: 500,
        ..BackendStat::default()
    }
}

/// Two nodes, each hosting one backend: N1 carries group 1, N2 group 2.
/// Groups 1 and 2 form the couple "1:2" in the namespace "default".
fn make_storage() -> Storage {
    let config = Config::from_json(r#"{ "reserved_space": 1000000 }"#).unwrap();

    let mut storage = Storage::new();
    storage.add_node("::1", 1025, 10);
    storage.add_node("::2", 1025, 10);

    storage
        .node_mut("::1:1025:10")
        .unwrap()
        .handle_backend(backend_stat(1, 1), 1_000_000);
    storage
        .node_mut("::2:1025:10")
        .unwrap()
        .handle_backend(backend_stat(1, 2), 1_000_000);
    storage.update_group_structure();

    let metadata = rmp_serde::to_vec(&[1u64, 2]).unwrap();
    storage.group_mut(1).unwrap().save_metadata(&metadata, 1);
    storage.group_mut(2).unwrap().save_metadata(&metadata, 1);

    storage.update(&config);
    storage
}

#[test]
fn test_groups_of_one_node() {
    let storage = make_storage();

    let filter = Filter {
        nodes: vec!["::1:1025:10".to_string()],
        item_types: ItemTypes::GROUP,
        ..Filter::default()
    };

    let entries = storage.select(&filter);
    assert_eq!(entries.groups.len(), 1);
    assert!(entries.groups.contains(&1));
}

#[test]
fn test_explicit_axis_is_taken_verbatim() {
    let storage = make_storage();

    let filter = Filter {
        groups: vec![2],
        nodes: vec!["::1:1025:10".to_string()],
        item_types: ItemTypes::GROUP,
        ..Filter::default()
    };

    // The explicit group set wins over the node relation.
    let entries = storage.select(&filter);
    assert_eq!(entries.groups.len(), 1);
    assert!(entries.groups.contains(&2));
}

#[test]
fn test_intersection_of_two_axes() {
    let storage = make_storage();

    // Backends of N1 relate to group 1; node axis N2 relates to group 2.
    // The intersection is empty.
    let filter = Filter {
        backends: vec!["::1:1025:10/1".to_string()],
        nodes: vec!["::2:1025:10".to_string()],
        item_types: ItemTypes::GROUP,
        ..Filter::default()
    };

    let entries = storage.select(&filter);
    assert!(entries.groups.is_empty());
}

#[test]
fn test_intersection_agreement() {
    let storage = make_storage();

    let filter = Filter {
        backends: vec!["::1:1025:10/1".to_string()],
        couples: vec!["1:2".to_string()],
        item_types: ItemTypes::GROUP,
        ..Filter::default()
    };

    // Groups of the couple: {1, 2}; groups of the backend: {1}.
    let entries = storage.select(&filter);
    assert_eq!(entries.groups.len(), 1);
    assert!(entries.groups.contains(&1));
}

#[test]
fn test_couples_of_a_namespace() {
    let storage = make_storage();

    let filter = Filter {
        namespaces: vec!["default".to_string()],
        item_types: ItemTypes::COUPLE | ItemTypes::GROUP,
        ..Filter::default()
    };

    let entries = storage.select(&filter);
    assert!(entries.couples.contains("1:2"));
    assert_eq!(entries.groups.len(), 2);
}

#[test]
fn test_backends_and_filesystems_of_a_group() {
    let storage = make_storage();

    let filter = Filter {
        groups: vec![1],
        item_types: ItemTypes::BACKEND | ItemTypes::FS | ItemTypes::NODE,
        ..Filter::default()
    };

    let entries = storage.select(&filter);
    assert!(entries.backends.contains("::1:1025:10/1"));
    assert!(entries.filesystems.contains("::1:1025:10/1"));
    assert!(entries.nodes.contains("::1:1025:10"));
    assert_eq!(entries.backends.len(), 1);
    assert_eq!(entries.nodes.len(), 1);
}

#[test]
fn test_unknown_explicit_keys_resolve_to_nothing() {
    let storage = make_storage();

    let filter = Filter {
        nodes: vec!["nosuch:1:1".to_string()],
        item_types: ItemTypes::GROUP,
        ..Filter::default()
    };

    let entries = storage.select(&filter);
    assert!(entries.groups.is_empty());
}
