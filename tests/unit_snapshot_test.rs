use fleetmon::config::Config;
use fleetmon::core::entity::BackendStat;
use fleetmon::core::filter::{Filter, ItemTypes};
use fleetmon::core::storage::Storage;

fn make_storage() -> Storage {
    let config = Config::from_json(r#"{ "reserved_space": 1000000 }"#).unwrap();

    let mut storage = Storage::new();
    storage.add_node("::1", 1025, 10);
    storage.add_node("::2", 1025, 10);

    for (node_key, group) in [("::1:1025:10", 1u64), ("::2:1025:10", 2u64)] {
        let stat = BackendStat {
            ts_sec: 1000,
            backend_id: 1,
            state: 1,
            group,
            fsid: 7,
            vfs_blocks: 1000,
            vfs_bsize: 4096,
            vfs_bavail: 500,
            ..BackendStat::default()
        };
        storage
            .node_mut(node_key)
            .unwrap()
            .handle_backend(stat, 1_000_000);
    }
    storage.update_group_structure();

    let metadata = rmp_serde::to_vec(&[1u64, 2]).unwrap();
    storage.group_mut(1).unwrap().save_metadata(&metadata, 1);
    storage.group_mut(2).unwrap().save_metadata(&metadata, 1);

    storage.update(&config);
    storage
}

#[test]
fn test_whole_graph_snapshot_sections() {
    let storage = make_storage();

    let filter = Filter {
        item_types: ItemTypes::NODE
            | ItemTypes::BACKEND
            | ItemTypes::FS
            | ItemTypes::GROUP
            | ItemTypes::COUPLE
            | ItemTypes::NAMESPACE,
        ..Filter::default()
    };
    let snapshot = storage.snapshot_json(&filter);

    let nodes = snapshot["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0]["host"], "::1");
    assert_eq!(nodes[0]["backends"].as_array().unwrap().len(), 1);
    assert_eq!(nodes[0]["filesystems"].as_array().unwrap().len(), 1);

    let backend = &nodes[0]["backends"][0];
    assert_eq!(backend["backend_id"], 1);
    assert_eq!(backend["group"], 1);
    assert_eq!(backend["status"], "OK");
    assert_eq!(backend["vfs_total_space"], 4_096_000_000u64);

    assert_eq!(snapshot["groups"].as_array().unwrap().len(), 2);
    assert_eq!(snapshot["couples"].as_array().unwrap().len(), 1);
    assert_eq!(snapshot["couples"][0]["id"], "1:2");
    assert_eq!(snapshot["namespaces"][0], "default");
}

#[test]
fn test_item_types_restrict_the_sections() {
    let storage = make_storage();

    let filter = Filter {
        item_types: ItemTypes::GROUP,
        ..Filter::default()
    };
    let snapshot = storage.snapshot_json(&filter);

    assert!(snapshot.get("nodes").is_none());
    assert!(snapshot.get("couples").is_none());
    assert!(snapshot.get("namespaces").is_none());
    assert_eq!(snapshot["groups"].as_array().unwrap().len(), 2);
}

#[test]
fn test_node_sections_omit_unrequested_sub_arrays() {
    let storage = make_storage();

    let filter = Filter {
        item_types: ItemTypes::NODE,
        ..Filter::default()
    };
    let snapshot = storage.snapshot_json(&filter);

    let node = &snapshot["nodes"][0];
    assert!(node.get("backends").is_none());
    assert!(node.get("filesystems").is_none());
}

#[test]
fn test_filtered_snapshot_restricts_node_sub_arrays() {
    let storage = make_storage();

    let filter = Filter {
        nodes: vec!["::1:1025:10".to_string()],
        backends: vec!["::1:1025:10/1".to_string()],
        item_types: ItemTypes::NODE | ItemTypes::BACKEND,
        ..Filter::default()
    };
    let snapshot = storage.snapshot_json(&filter);

    let nodes = snapshot["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["host"], "::1");
    assert_eq!(nodes[0]["backends"].as_array().unwrap().len(), 1);
    assert!(snapshot.get("groups").is_none());
}

#[test]
fn test_show_internals_exposes_group_metadata() {
    let storage = make_storage();

    let filter = Filter {
        groups: vec![1],
        item_types: ItemTypes::GROUP,
        show_internals: true,
        ..Filter::default()
    };
    let snapshot = storage.snapshot_json(&filter);

    let group = &snapshot["groups"][0];
    assert_eq!(group["id"], 1);
    assert_eq!(group["couple"], "1:2");
    assert_eq!(group["namespace"], "default");
    assert_eq!(group["internal_status"], "COUPLED_MetadataOK");
    assert_eq!(group["metadata_internal"]["version"], 1);
    assert_eq!(group["metadata_internal"]["namespace_name"], "default");
    assert_eq!(
        group["metadata_internal"]["couple"].as_array().unwrap().len(),
        2
    );
}

#[test]
fn test_internals_are_hidden_by_default() {
    let storage = make_storage();

    let filter = Filter {
        groups: vec![1],
        item_types: ItemTypes::GROUP,
        ..Filter::default()
    };
    let snapshot = storage.snapshot_json(&filter);

    let group = &snapshot["groups"][0];
    assert!(group.get("metadata_internal").is_none());
    assert!(group.get("internal_status").is_none());
}

#[test]
fn test_couple_snapshot_carries_space_figures() {
    let storage = make_storage();

    let filter = Filter {
        couples: vec!["1:2".to_string()],
        item_types: ItemTypes::COUPLE,
        show_internals: true,
        ..Filter::default()
    };
    let snapshot = storage.snapshot_json(&filter);

    let couple = &snapshot["couples"][0];
    assert_eq!(couple["status"], "OK");
    assert!(couple["effective_space"].as_u64().unwrap() > 0);
    assert!(couple["effective_free_space"].as_u64().unwrap() > 0);
    assert!(couple.get("modified_time").is_some());
}
