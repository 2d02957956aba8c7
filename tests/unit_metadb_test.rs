use fleetmon::core::collect::metadb::{InventoryRow, parse_group_history, parse_jobs};
use fleetmon::core::entity::{GroupHistoryEntry, JobStatus, JobType};
use serde_json::json;

#[test]
fn test_jobs_parse_and_skip_unknown_enums() {
    let records = vec![
        json!({ "id": "job-1", "status": "executing", "group": 19, "type": "move_job" }),
        json!({ "id": "job-2", "status": "weird", "group": 23, "type": "move_job" }),
        json!({ "id": "job-3", "status": "new", "group": 29, "type": "teleport_job" }),
        json!({ "id": "job-4", "status": "pending", "group": 31, "type": "restore_group_job" }),
        json!({ "status": "new", "group": 37, "type": "move_job" }),
    ];

    let jobs = parse_jobs(&records, 42);

    // Only the two well-formed records survive.
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id(), "job-1");
    assert_eq!(jobs[0].kind(), JobType::Move);
    assert_eq!(jobs[0].status(), JobStatus::Executing);
    assert_eq!(jobs[0].group_id(), 19);
    assert_eq!(jobs[0].timestamp(), 42);
    assert_eq!(jobs[1].id(), "job-4");
    assert_eq!(jobs[1].kind(), JobType::RestoreGroup);
}

#[test]
fn test_history_latest_manual_record_wins() {
    let doc = json!({
        "group_id": 19,
        "nodes": [
            {
                "timestamp": 100.0,
                "type": "manual",
                "set": [
                    { "backend_id": 1, "hostname": "old.storage", "port": 1025, "family": 10 }
                ]
            },
            {
                "timestamp": 300.0,
                "type": "automatic",
                "set": [
                    { "backend_id": 9, "hostname": "auto.storage", "port": 1025, "family": 10 }
                ]
            },
            {
                "timestamp": 200.0,
                "type": "manual",
                "set": [
                    { "backend_id": 2, "hostname": "new.storage", "port": 1025, "family": 10 }
                ]
            }
        ]
    });

    let entry = GroupHistoryEntry::from_document(&doc).unwrap();

    assert_eq!(entry.group_id(), 19);
    assert_eq!(entry.timestamp(), 200.0);
    assert!(!entry.empty());
    assert_eq!(entry.backends().len(), 1);
    assert!(entry.backends().contains("new.storage:1025:10/2"));
}

#[test]
fn test_history_entry_with_only_automatic_records_is_empty() {
    let doc = json!({
        "group_id": 19,
        "nodes": [
            {
                "timestamp": 300.0,
                "type": "automatic",
                "set": [
                    { "backend_id": 9, "hostname": "auto.storage", "port": 1025, "family": 10 }
                ]
            }
        ]
    });

    let entry = GroupHistoryEntry::from_document(&doc).unwrap();
    assert!(entry.empty());
}

#[test]
fn test_history_without_group_id_is_rejected() {
    let doc = json!({ "nodes": [] });
    assert!(GroupHistoryEntry::from_document(&doc).is_err());
}

#[test]
fn test_history_with_incomplete_backend_is_rejected() {
    let doc = json!({
        "group_id": 19,
        "nodes": [
            {
                "timestamp": 100.0,
                "type": "manual",
                "set": [{ "backend_id": 1, "hostname": "", "port": 1025, "family": 10 }]
            }
        ]
    });
    assert!(GroupHistoryEntry::from_document(&doc).is_err());
}

#[test]
fn test_malformed_history_records_are_skipped_by_the_batch_parser() {
    let records = vec![
        json!({ "group_id": 19, "nodes": [
            { "timestamp": 100.0, "type": "manual", "set": [
                { "backend_id": 1, "hostname": "a.storage", "port": 1025, "family": 10 }
            ] }
        ] }),
        json!({ "nodes": [] }),
    ];

    let entries = parse_group_history(&records);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].group_id(), 19);
}

#[test]
fn test_inventory_row_round_trip() {
    let row = InventoryRow {
        host: "node1.storage".to_string(),
        dc: "alpha".to_string(),
        timestamp: 1234.5,
    };

    let rebuilt = InventoryRow::from_document(&row.to_document()).unwrap();
    assert_eq!(rebuilt.host, "node1.storage");
    assert_eq!(rebuilt.dc, "alpha");
    assert_eq!(rebuilt.timestamp, 1234.5);
}

#[test]
fn test_incomplete_inventory_row_is_rejected() {
    let doc = json!({ "host": "node1.storage", "timestamp": 1234.5 });
    assert!(InventoryRow::from_document(&doc).is_err());
}
