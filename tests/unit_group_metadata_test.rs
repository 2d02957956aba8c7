use fleetmon::core::entity::{Group, GroupMetadata};
use rmpv::Value;

fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value).unwrap();
    buf
}

fn v2_metadata() -> Vec<u8> {
    encode(&Value::Map(vec![
        (Value::from("version"), Value::from(2u64)),
        (
            Value::from("couple"),
            Value::Array(vec![Value::from(29u64), Value::from(19u64), Value::from(23u64)]),
        ),
        (Value::from("namespace"), Value::from("special")),
        (Value::from("frozen"), Value::from(true)),
        (Value::from("type"), Value::from("cache")),
        (
            Value::from("service"),
            Value::Map(vec![
                (Value::from("status"), Value::from("MIGRATING")),
                (Value::from("job_id"), Value::from("abcd")),
            ]),
        ),
    ]))
}

#[test]
fn test_version_1_bare_array() {
    let raw = rmp_serde::to_vec(&[19u64, 23, 29]).unwrap();
    let metadata = GroupMetadata::parse(&raw).unwrap();

    assert_eq!(metadata.version, 1);
    assert!(!metadata.frozen);
    assert_eq!(metadata.namespace_name, "default");
    assert_eq!(metadata.couple, vec![19, 23, 29]);
    assert!(!metadata.service.migrating);
}

#[test]
fn test_version_1_couple_ids_are_sorted() {
    let raw = rmp_serde::to_vec(&[29u64, 19, 23]).unwrap();
    let metadata = GroupMetadata::parse(&raw).unwrap();
    assert_eq!(metadata.couple, vec![19, 23, 29]);
}

#[test]
fn test_version_2_map() {
    let metadata = GroupMetadata::parse(&v2_metadata()).unwrap();

    assert_eq!(metadata.version, 2);
    assert!(metadata.frozen);
    assert_eq!(metadata.namespace_name, "special");
    assert_eq!(metadata.couple, vec![19, 23, 29]);
    assert_eq!(metadata.type_label, "cache");
    assert!(metadata.service.migrating);
    assert_eq!(metadata.service.job_id, "abcd");
}

#[test]
fn test_garbage_is_a_parse_failure() {
    assert!(GroupMetadata::parse(b"\xc1\xc1\xc1").is_err());
}

#[test]
fn test_group_parse_marks_bad_on_garbage() {
    let mut group = Group::new(19);
    group.save_metadata(b"\xc1\xc1\xc1", 1);
    assert!(!group.parse_metadata());
    assert_eq!(group.status().to_string(), "BAD");
    assert_eq!(group.internal_status().to_string(), "BAD_ParseFailed");
}

#[test]
fn test_identical_metadata_stays_clean() {
    let raw = rmp_serde::to_vec(&[19u64, 23, 29]).unwrap();

    let mut group = Group::new(19);
    group.save_metadata(&raw, 1);
    assert!(group.parse_metadata());
    assert!(group.metadata_parsed());
    let first_update_time = group.update_time();

    // The same payload again leaves the parsed state untouched.
    group.save_metadata(&raw, 1);
    assert!(group.parse_metadata());
    assert_eq!(group.update_time(), first_update_time);
}

#[test]
fn test_group_type_classification() {
    // Unversioned group on a cache path reads as UNMARKED.
    let mut group = Group::new(1);
    group.calculate_type("/srv/cache/", ["/srv/cache/1/data"].into_iter());
    assert_eq!(group.group_type().to_string(), "UNMARKED");

    // Without the prefix match it stays DATA.
    let mut group = Group::new(2);
    group.calculate_type("/srv/cache/", ["/srv/storage/2/data"].into_iter());
    assert_eq!(group.group_type().to_string(), "DATA");

    // A versioned group marked "cache" reads as CACHE regardless of paths.
    let mut group = Group::new(3);
    group.save_metadata(&v2_metadata(), 1);
    assert!(group.parse_metadata());
    group.calculate_type("", std::iter::empty());
    assert_eq!(group.group_type().to_string(), "CACHE");
}

#[test]
fn test_metadata_internal_round_trip() {
    let mut group = Group::new(19);
    group.save_metadata(&v2_metadata(), 1);
    assert!(group.parse_metadata());

    let projected = group.to_json(None, true);
    let rebuilt = GroupMetadata::from_internal_json(&projected["metadata_internal"]).unwrap();

    assert_eq!(rebuilt, group.metadata);
}
