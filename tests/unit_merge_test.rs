use fleetmon::config::Config;
use fleetmon::core::entity::{BackendStat, Job, JobStatus, JobType};
use fleetmon::core::storage::Storage;

fn config() -> Config {
    Config::from_json(r#"{ "reserved_space": 1000000 }"#).unwrap()
}

fn storage_with_group(group_id: u64) -> Storage {
    let mut storage = Storage::new();
    storage.add_node("::1", 1025, 10);
    let stat = BackendStat {
        ts_sec: 1000,
        backend_id: 1,
        state: 1,
        group: group_id,
        fsid: 1,
        vfs_blocks: 1000,
        vfs_bsize: 4096,
        vfs_bavail: 500,
        ..BackendStat::default()
    };
    storage
        .node_mut("::1:1025:10")
        .unwrap()
        .handle_backend(stat, 1_000_000);
    storage.update_group_structure();
    storage
}

#[test]
fn test_merging_an_older_shadow_signals_have_newer() {
    let mut live = storage_with_group(5);
    let mut shadow = live.clone();

    // The shadow captured its metadata first, the live side afterwards.
    shadow
        .group_mut(5)
        .unwrap()
        .save_metadata(&rmp_serde::to_vec(&[5u64, 6]).unwrap(), 1);
    live.group_mut(5)
        .unwrap()
        .save_metadata(&rmp_serde::to_vec(&[5u64, 7]).unwrap(), 1);

    let live_time = live.group(5).unwrap().update_time();
    assert!(live_time > shadow.group(5).unwrap().update_time());

    let have_newer = live.merge(&shadow);

    assert!(have_newer);
    assert_eq!(live.group(5).unwrap().update_time(), live_time);
}

#[test]
fn test_merging_a_newer_shadow_advances_the_live_side() {
    let mut live = storage_with_group(5);
    let mut shadow = live.clone();

    live.group_mut(5)
        .unwrap()
        .save_metadata(&rmp_serde::to_vec(&[5u64, 7]).unwrap(), 1);
    shadow
        .group_mut(5)
        .unwrap()
        .save_metadata(&rmp_serde::to_vec(&[5u64, 6]).unwrap(), 1);

    let shadow_time = shadow.group(5).unwrap().update_time();
    assert!(shadow_time > live.group(5).unwrap().update_time());

    let have_newer = live.merge(&shadow);

    assert!(!have_newer);
    assert_eq!(live.group(5).unwrap().update_time(), shadow_time);
}

#[test]
fn test_merge_keeps_local_entities_missing_from_the_shadow() {
    let mut live = storage_with_group(5);
    live.add_node("::2", 1025, 10);

    let shadow = storage_with_group(5);
    let have_newer = live.merge(&shadow);

    // The extra node survives and reads as newer local state.
    assert!(have_newer);
    assert!(live.node("::2:1025:10").is_some());
}

#[test]
fn test_merge_inserts_entities_new_in_the_shadow() {
    let mut live = storage_with_group(5);
    let mut shadow = live.clone();
    shadow.add_node("::9", 1025, 10);

    live.merge(&shadow);
    assert!(live.node("::9:1025:10").is_some());
}

#[test]
fn test_newer_backend_sample_wins() {
    let mut live = storage_with_group(5);
    let mut shadow = live.clone();

    let fresher = BackendStat {
        ts_sec: 2000,
        backend_id: 1,
        state: 1,
        group: 5,
        fsid: 1,
        vfs_blocks: 2000,
        vfs_bsize: 4096,
        vfs_bavail: 100,
        ..BackendStat::default()
    };
    shadow
        .node_mut("::1:1025:10")
        .unwrap()
        .handle_backend(fresher, 1_000_000);

    live.merge(&shadow);

    let backend = live.node("::1:1025:10").unwrap().backend(1).unwrap();
    assert_eq!(backend.stat.ts_sec, 2000);
    assert_eq!(backend.vfs_total_space(), 2000 * 4096);
}

#[test]
fn test_job_merge_follows_the_round_timestamp() {
    let mut live = storage_with_group(5);
    live.save_new_jobs(
        vec![Job::new("job-1", JobType::Move, JobStatus::New, 5, 100)],
        100,
    );
    live.process_new_jobs();
    live.update(&config());
    assert!(live.group(5).unwrap().active_job().is_some());

    // A newer round saw no jobs at all: the job disappears and the group
    // unbinds.
    let mut shadow = live.clone();
    shadow.save_new_jobs(vec![], 200);
    shadow.process_new_jobs();

    live.merge(&shadow);
    assert!(live.jobs().is_empty());
    assert!(live.group(5).unwrap().active_job().is_none());

    // Merging an older shadow that still carries the job reports newer
    // local state and keeps the map empty.
    let mut stale = Storage::new();
    stale.save_new_jobs(
        vec![Job::new("job-1", JobType::Move, JobStatus::New, 5, 100)],
        100,
    );
    stale.process_new_jobs();

    let have_newer = live.merge(&stale);
    assert!(have_newer);
    assert!(live.jobs().is_empty());
}
