use fleetmon::core::entity::{Backend, BackendStat, BackendStatus, Node};

fn sample_stat() -> BackendStat {
    BackendStat {
        ts_sec: 1000,
        ts_usec: 0,
        backend_id: 17,
        state: 1,
        vfs_blocks: 500_000_000,
        vfs_bsize: 4_096,
        vfs_bavail: 300_000_000,
        blob_size_limit: 100_000_000_000,
        base_size: 3_000_000,
        records_total: 100,
        records_removed: 10,
        fsid: 42,
        group: 5,
        ..BackendStat::default()
    }
}

#[test]
fn test_space_derivation_with_blob_size_limit() {
    let mut backend = Backend::new("::1:1025:10", sample_stat());
    backend.recalculate(112_742_891_519);
    backend.update_status(false);

    assert_eq!(backend.key(), "::1:1025:10/17");
    assert_eq!(backend.vfs_total_space(), 2_048_000_000_000);
    assert_eq!(backend.vfs_free_space(), 1_228_800_000_000);
    assert_eq!(backend.vfs_used_space(), 819_200_000_000);

    assert_eq!(backend.total_space(), 100_000_000_000);
    assert_eq!(backend.used_space(), 3_000_000);
    assert_eq!(backend.free_space(), 99_997_000_000);
    assert!((backend.fragmentation() - 0.1).abs() < 1e-9);
    assert_eq!(backend.status(), BackendStatus::Ok);
    assert!(!backend.full());
}

#[test]
fn test_space_derivation_without_blob_size_limit() {
    let mut stat = sample_stat();
    stat.blob_size_limit = 0;

    let mut backend = Backend::new("::1:1025:10", stat);
    backend.recalculate(112_742_891_519);

    assert_eq!(backend.total_space(), backend.vfs_total_space());
    assert_eq!(backend.free_space(), backend.vfs_free_space());
    assert_eq!(backend.used_space(), backend.vfs_used_space());
}

#[test]
fn test_effective_space_scales_the_reserve_by_the_vfs_share() {
    let mut stat = sample_stat();
    stat.blob_size_limit = 0;

    let mut backend = Backend::new("::1:1025:10", stat);
    backend.recalculate(1_000_000_000);

    // The whole mount belongs to this backend, so the full reserve applies.
    assert_eq!(backend.effective_space(), 2_048_000_000_000 - 1_000_000_000);
}

#[test]
fn test_request_rates_from_successive_samples() {
    let mut node = Node::new("::1", 1025, 10);

    let mut bstat = sample_stat();
    bstat.read_ios = 0;
    bstat.write_ios = 0;
    node.handle_backend(bstat.clone(), 112_742_891_519);

    bstat.ts_sec += 60;
    bstat.read_ios += 60_000;
    bstat.write_ios += 30_000;
    node.handle_backend(bstat, 112_742_891_519);

    let backend = node.backend(17).unwrap();
    assert_eq!(backend.read_rps(), 1_000);
    assert_eq!(backend.write_rps(), 500);
}

#[test]
fn test_status_cascade() {
    // An error always reads as STALLED.
    let mut stat = sample_stat();
    stat.error = 1;
    let mut backend = Backend::new("::1:1025:10", stat);
    backend.recalculate(1);
    backend.update_status(false);
    assert_eq!(backend.status(), BackendStatus::Stalled);

    // A disabled state reads as STALLED too.
    let mut stat = sample_stat();
    stat.state = 0;
    let mut backend = Backend::new("::1:1025:10", stat);
    backend.recalculate(1);
    backend.update_status(false);
    assert_eq!(backend.status(), BackendStatus::Stalled);

    // A broken filesystem beats read-only.
    let mut stat = sample_stat();
    stat.state = 2;
    let mut backend = Backend::new("::1:1025:10", stat);
    backend.recalculate(1);
    backend.update_status(true);
    assert_eq!(backend.status(), BackendStatus::Broken);

    backend.update_status(false);
    assert_eq!(backend.status(), BackendStatus::Ro);
}

#[test]
fn test_full_when_no_free_space_remains() {
    let mut stat = sample_stat();
    stat.vfs_bavail = 0;
    let mut backend = Backend::new("::1:1025:10", stat);
    backend.recalculate(112_742_891_519);
    assert!(backend.full());
}
