use fleetmon::core::stats::StatsParser;
use serde_json::json;

fn monitor_payload() -> Vec<u8> {
    json!({
        "timestamp": { "tv_sec": 1000, "tv_usec": 500000 },
        "procfs": {
            "vm": { "la": [120, 110, 95] },
            "net": {
                "net_interfaces": {
                    "lo": {
                        "receive": { "bytes": 999999 },
                        "transmit": { "bytes": 888888 }
                    },
                    "eth0": {
                        "receive": { "bytes": 1000 },
                        "transmit": { "bytes": 2000 }
                    },
                    "eth1": {
                        "receive": { "bytes": 30 },
                        "transmit": { "bytes": 40 }
                    }
                }
            }
        },
        "backends": {
            "1": {
                "backend_id": 1,
                "status": { "state": 1, "defrag_state": 2 },
                "backend": {
                    "dstat": { "read_ios": 100, "write_ios": 50, "error": 0 },
                    "vfs": { "blocks": 1000, "bavail": 400, "bsize": 4096, "fsid": 77 },
                    "summary_stats": {
                        "records_total": 10,
                        "records_removed": 1,
                        "records_removed_size": 128,
                        "want_defrag": 0,
                        "base_size": 2048
                    },
                    "config": {
                        "blob_size_limit": 1000000,
                        "blob_size": 500000,
                        "group": 7,
                        "data": "/srv/storage/1/data"
                    },
                    "base_stats": {
                        "data-0.0": { "base_size": 700 },
                        "data-0.1": { "base_size": 900 }
                    }
                }
            },
            "2": {
                "backend_id": 2,
                "status": { "state": 1, "defrag_state": 0 },
                "backend": {
                    "dstat": { "read_ios": 5, "write_ios": 6, "error": 1 },
                    "vfs": { "blocks": 2000, "bavail": 100, "bsize": 512, "fsid": 78 },
                    "summary_stats": {
                        "records_total": 4,
                        "records_removed": 2,
                        "records_removed_size": 0,
                        "want_defrag": 1,
                        "base_size": 64
                    },
                    "config": { "blob_size_limit": 0, "blob_size": 0, "group": 9, "data": "/srv/storage/2/data" }
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}

#[test]
fn test_parse_node_and_backends_in_one_pass() {
    let stats = StatsParser::parse(&monitor_payload()).unwrap();

    assert_eq!(stats.node.ts_sec, 1000);
    assert_eq!(stats.node.ts_usec, 500000);
    // Only the first element of the load average array counts.
    assert_eq!(stats.node.la1, 120);
    // The loopback interface is skipped; the others are summed.
    assert_eq!(stats.node.rx_bytes, 1030);
    assert_eq!(stats.node.tx_bytes, 2040);

    assert_eq!(stats.backends.len(), 2);

    let b1 = stats.backends.iter().find(|b| b.backend_id == 1).unwrap();
    assert_eq!(b1.state, 1);
    assert_eq!(b1.defrag_state, 2);
    assert_eq!(b1.read_ios, 100);
    assert_eq!(b1.write_ios, 50);
    assert_eq!(b1.vfs_blocks, 1000);
    assert_eq!(b1.vfs_bavail, 400);
    assert_eq!(b1.vfs_bsize, 4096);
    assert_eq!(b1.fsid, 77);
    assert_eq!(b1.records_total, 10);
    assert_eq!(b1.records_removed, 1);
    assert_eq!(b1.records_removed_size, 128);
    assert_eq!(b1.base_size, 2048);
    assert_eq!(b1.blob_size_limit, 1000000);
    assert_eq!(b1.blob_size, 500000);
    assert_eq!(b1.group, 7);
    assert_eq!(b1.base_path, "/srv/storage/1/data");
    // The wildcard blob folder keeps the maximum base size.
    assert_eq!(b1.max_blob_base_size, 900);
    // Backend stats carry the payload timestamp.
    assert_eq!(b1.ts_sec, 1000);
    assert_eq!(b1.ts_usec, 500000);

    let b2 = stats.backends.iter().find(|b| b.backend_id == 2).unwrap();
    assert_eq!(b2.error, 1);
    assert_eq!(b2.group, 9);
    assert_eq!(b2.want_defrag, 1);
    assert_eq!(b2.max_blob_base_size, 0);
}

#[test]
fn test_unknown_keys_are_ignored() {
    let payload = json!({
        "timestamp": { "tv_sec": 5, "tv_usec": 6 },
        "string_counters": { "whatever": { "deep": [1, 2, 3] } },
        "procfs": {
            "vm": { "la": [42] },
            "stat": { "ctxt": 123456 },
            "net": { "net_interfaces": {} }
        }
    })
    .to_string();

    let stats = StatsParser::parse(payload.as_bytes()).unwrap();
    assert_eq!(stats.node.ts_sec, 5);
    assert_eq!(stats.node.la1, 42);
    assert_eq!(stats.node.rx_bytes, 0);
    assert!(stats.backends.is_empty());
}

#[test]
fn test_malformed_json_is_a_parse_failure() {
    let result = StatsParser::parse(b"{\"timestamp\": {");
    assert!(result.is_err());
}

#[test]
fn test_empty_backends_section() {
    let payload = json!({
        "timestamp": { "tv_sec": 1, "tv_usec": 0 },
        "backends": {},
        "procfs": { "vm": { "la": [10] }, "net": { "net_interfaces": {} } }
    })
    .to_string();

    let stats = StatsParser::parse(payload.as_bytes()).unwrap();
    assert!(stats.backends.is_empty());
    assert_eq!(stats.node.la1, 10);
}
