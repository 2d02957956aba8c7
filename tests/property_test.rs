use fleetmon::core::entity::{Backend, BackendStat};
use proptest::prelude::*;

fn arb_stat() -> impl Strategy<Value = BackendStat> {
    (
        0u64..2_000_000,
        0u64..2_000_000,
        1u64..65_536,
        0u64..10_000_000_000,
        0u64..10_000_000_000,
        0u64..1_000_000,
        0u64..1_000_000,
    )
        .prop_map(
            |(blocks, bavail, bsize, limit, base, total, removed)| BackendStat {
                ts_sec: 1000,
                backend_id: 1,
                state: 1,
                vfs_blocks: blocks,
                vfs_bavail: bavail.min(blocks),
                vfs_bsize: bsize,
                blob_size_limit: limit,
                base_size: base,
                records_total: total,
                records_removed: removed.min(total),
                fsid: 1,
                group: 1,
                ..BackendStat::default()
            },
        )
}

proptest! {
    /// Recomputing derived fields from the same stat is deterministic.
    #[test]
    fn backend_derivation_is_deterministic(stat in arb_stat()) {
        let mut a = Backend::new("::1:1025:10", stat.clone());
        let mut b = Backend::new("::1:1025:10", stat);

        a.recalculate(112_742_891_519);
        b.recalculate(112_742_891_519);
        // Another pass moves nothing.
        a.recalculate(112_742_891_519);

        prop_assert_eq!(a.total_space(), b.total_space());
        prop_assert_eq!(a.used_space(), b.used_space());
        prop_assert_eq!(a.free_space(), b.free_space());
        prop_assert_eq!(a.effective_space(), b.effective_space());
        prop_assert_eq!(a.fragmentation(), b.fragmentation());
    }

    /// Without a blob size limit the space figures equal the VFS figures.
    #[test]
    fn zero_blob_size_limit_mirrors_vfs(stat in arb_stat()) {
        let mut stat = stat;
        stat.blob_size_limit = 0;

        let mut backend = Backend::new("::1:1025:10", stat);
        backend.recalculate(112_742_891_519);

        prop_assert_eq!(backend.total_space(), backend.vfs_total_space());
        prop_assert_eq!(backend.used_space(), backend.vfs_used_space());
        prop_assert_eq!(backend.free_space(), backend.vfs_free_space());
    }

    /// Derived figures always stay internally consistent.
    #[test]
    fn derived_spaces_are_bounded(stat in arb_stat()) {
        let mut backend = Backend::new("::1:1025:10", stat);
        backend.recalculate(112_742_891_519);

        prop_assert!(backend.free_space() <= backend.vfs_free_space());
        prop_assert!(backend.total_space() <= backend.vfs_total_space());
        prop_assert!(backend.effective_space() <= backend.total_space());
        prop_assert!(backend.fragmentation() >= 0.0 && backend.fragmentation() <= 1.0);
    }
}
