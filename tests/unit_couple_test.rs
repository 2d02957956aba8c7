use fleetmon::core::entity::couple::{
    Couple, CoupleGroupView, CouplePolicy, effective_free_space, effective_space, is_full,
};
use fleetmon::core::entity::{Group, GroupStatus, Job, JobStatus, JobType};

fn view(id: u64) -> CoupleGroupView {
    CoupleGroupView {
        id,
        status: GroupStatus::Coupled,
        metadata_version: 2,
        frozen: false,
        namespace_name: "default".to_string(),
        couple_list: vec![1, 2],
        conflict_skip: false,
        total_space: 1_000_000,
        effective_space: 900_000,
        free_space: 500_000,
        full: false,
        update_time: 10,
        active_job: None,
        dcs: Ok(vec![format!("dc-{id}")]),
    }
}

#[test]
fn test_effective_space_takes_the_weakest_member() {
    let mut weak = view(2);
    weak.effective_space = 600_000;
    let members = [view(1), weak];

    assert_eq!(effective_space(&members, 0.0), 600_000);
    // The namespace reserve rounds down.
    assert_eq!(effective_space(&members, 0.1), 540_000);
}

#[test]
fn test_effective_free_space() {
    let members = [view(1), view(2)];
    // min_free - (min_total - effective) = 500000 - (1000000 - 900000)
    assert_eq!(effective_free_space(&members, 0.0), 400_000);

    let mut full_member = view(3);
    full_member.free_space = 0;
    let members = [view(1), full_member];
    assert_eq!(effective_free_space(&members, 0.0), 0);
}

#[test]
fn test_full_when_any_member_is_full_or_no_space_remains() {
    let members = [view(1), view(2)];
    assert!(!is_full(&members, 0.0));

    let mut full_member = view(2);
    full_member.full = true;
    assert!(is_full(&[view(1), full_member], 0.0));
}

#[test]
fn test_empty_metadata_beats_everything() {
    let mut couple = Couple::new(vec![1, 2], "default");
    let mut bad = view(2);
    bad.metadata_version = 0;

    couple.update_status(&[view(1), bad], 0.0, true, CouplePolicy::default());
    assert_eq!(couple.status().to_string(), "BAD");
    assert_eq!(couple.status_text(), "Group 2 has empty metadata.");
}

#[test]
fn test_namespace_mismatch_is_bad() {
    let mut couple = Couple::new(vec![1, 2], "default");
    let mut foreign = view(2);
    foreign.namespace_name = "other".to_string();

    couple.update_status(&[view(1), foreign], 0.0, true, CouplePolicy::default());
    assert_eq!(couple.status().to_string(), "BAD");
    assert!(couple.status_text().contains("doesn't match"));
}

#[test]
fn test_ns_without_settings_breaks_when_forbidden() {
    let policy = CouplePolicy {
        forbidden_ns_without_settings: true,
        ..CouplePolicy::default()
    };

    let mut couple = Couple::new(vec![1, 2], "default");
    couple.update_status(&[view(1), view(2)], 0.0, true, policy);
    assert_eq!(couple.status().to_string(), "BROKEN");

    // Provisioned settings clear the verdict.
    couple.update_status(&[view(1), view(2)], 0.0, false, policy);
    assert_eq!(couple.status().to_string(), "OK");
}

#[test]
fn test_stalled_service_job() {
    let mut couple = Couple::new(vec![1, 2], "default");
    let mut stuck = view(2);
    stuck.status = GroupStatus::Ro;
    stuck.active_job = Some(Job::new(
        "job-9",
        JobType::RestoreGroup,
        JobStatus::Pending,
        2,
        1,
    ));

    couple.update_status(&[view(1), stuck], 0.0, true, CouplePolicy::default());
    assert_eq!(couple.status().to_string(), "SERVICE_STALLED");
    assert!(couple.status_text().contains("job-9"));
}

#[test]
fn test_defrag_jobs_do_not_mask_a_bad_couple() {
    let mut couple = Couple::new(vec![1, 2], "default");
    let mut stuck = view(2);
    stuck.status = GroupStatus::Ro;
    stuck.active_job = Some(Job::new(
        "job-5",
        JobType::CoupleDefrag,
        JobStatus::Executing,
        2,
        1,
    ));

    couple.update_status(&[view(1), stuck], 0.0, true, CouplePolicy::default());
    assert_eq!(couple.status().to_string(), "BAD");
}

#[test]
fn test_coupled_status_feedback_respects_backend_verdicts() {
    let mut group = Group::new(7);
    // A group with no backends is INIT; the couple verdict may override it.
    group.update_status(&[], false);
    group.set_coupled_status(false, 100);
    assert_eq!(group.status().to_string(), "BAD");
    assert_eq!(group.internal_status().to_string(), "BAD_CoupleBAD");

    // A parse failure is never overridden by the couple verdict.
    let mut group = Group::new(8);
    group.save_metadata(b"\xc1", 1);
    assert!(!group.parse_metadata());
    group.set_coupled_status(true, 100);
    assert_eq!(group.internal_status().to_string(), "BAD_ParseFailed");
}
