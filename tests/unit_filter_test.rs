use fleetmon::core::filter::{Filter, ItemTypes};

#[test]
fn test_full_document() {
    let input = r#"{
        "filter": {
            "namespaces": ["default", "special"],
            "couples": ["1:2:3"],
            "groups": [3, 1, 2, 2],
            "backends": ["host:1025:10/1"],
            "nodes": ["host:1025:10"],
            "filesystems": ["host:1025:10/77"]
        },
        "item_types": ["group", "couple", "node"],
        "options": { "show_internals": true }
    }"#;

    let filter = Filter::from_json(input).unwrap();

    assert_eq!(filter.namespaces, vec!["default", "special"]);
    assert_eq!(filter.couples, vec!["1:2:3"]);
    // Explicit sets come out sorted and deduplicated.
    assert_eq!(filter.groups, vec![1, 2, 3]);
    assert_eq!(filter.backends, vec!["host:1025:10/1"]);
    assert_eq!(filter.nodes, vec!["host:1025:10"]);
    assert_eq!(filter.filesystems, vec!["host:1025:10/77"]);
    assert_eq!(
        filter.item_types,
        ItemTypes::GROUP | ItemTypes::COUPLE | ItemTypes::NODE
    );
    assert!(filter.show_internals);
    assert!(!filter.empty());
}

#[test]
fn test_empty_document() {
    let filter = Filter::from_json("{}").unwrap();
    assert!(filter.empty());
    assert!(filter.item_types.is_empty());
    assert!(!filter.show_internals);
}

#[test]
fn test_unknown_item_type_is_rejected() {
    let result = Filter::from_json(r#"{ "item_types": ["gadget"] }"#);
    assert!(result.is_err());
}

#[test]
fn test_all_item_type_labels() {
    let input = r#"{ "item_types": ["group", "couple", "namespace", "node", "backend", "fs", "job"] }"#;
    let filter = Filter::from_json(input).unwrap();
    assert_eq!(filter.item_types, ItemTypes::all());
}

#[test]
fn test_split_node_num() {
    assert_eq!(
        Filter::split_node_num("host:1025:10/42"),
        Some(("host:1025:10", 42))
    );
    assert_eq!(Filter::split_node_num("no-slash"), None);
    assert_eq!(Filter::split_node_num("host/notanum"), None);
}
