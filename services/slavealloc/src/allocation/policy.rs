//! Master selection.
//!
//! 1. A slave locked to a master gets that master whenever it is enabled,
//!    regardless of capacity.
//! 2. Otherwise the candidates are the enabled masters in the slave's pool
//!    with spare capacity.
//! 3. The least-loaded candidate wins; ties go to the lowest nickname, then
//!    the lowest id.

use super::{MasterCandidate, NoAllocationReason, SlaveRecord};

/// Pick the master `slave` should be allocated to.
///
/// `candidates` may contain masters from other pools or disabled masters;
/// they are filtered here. Loads must already exclude the slave's own
/// current allocation.
pub fn select_master<'a>(
    slave: &SlaveRecord,
    candidates: &'a [MasterCandidate],
) -> Result<&'a MasterCandidate, NoAllocationReason> {
    if !slave.enabled {
        return Err(NoAllocationReason::SlaveDisabled);
    }

    if let Some(locked) = slave.locked_master_id {
        return candidates
            .iter()
            .find(|c| c.master.master_id == locked && c.enabled)
            .ok_or(NoAllocationReason::LockedMasterUnavailable);
    }

    candidates
        .iter()
        .filter(|c| c.enabled && c.pool_id == slave.pool_id && c.has_capacity())
        .min_by(|a, b| {
            a.current_slaves
                .cmp(&b.current_slaves)
                .then_with(|| a.master.nickname.cmp(&b.master.nickname))
                .then_with(|| a.master.master_id.cmp(&b.master.master_id))
        })
        .ok_or(NoAllocationReason::NoEligibleMaster)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;
    use crate::allocation::Master;

    fn slave(pool_id: i32) -> SlaveRecord {
        SlaveRecord {
            name: "bld-linux64-001".into(),
            basedir: "/builds/slave".into(),
            pool_id,
            enabled: true,
            locked_master_id: None,
        }
    }

    fn master(id: i32, nickname: &str, pool_id: i32, load: i64) -> MasterCandidate {
        MasterCandidate {
            master: Master {
                master_id: id,
                nickname: nickname.into(),
                fqdn: format!("{nickname}.build.example.com"),
                pb_port: 9000 + id,
            },
            pool_id,
            enabled: true,
            max_slaves: None,
            current_slaves: load,
        }
    }

    #[test]
    fn test_picks_least_loaded() {
        let masters = vec![master(1, "bm01", 1, 5), master(2, "bm02", 1, 2), master(3, "bm03", 1, 9)];
        let chosen = select_master(&slave(1), &masters).unwrap();
        assert_eq!(chosen.master.nickname, "bm02");
    }

    #[rstest]
    #[case::nickname(vec![master(7, "bm-b", 1, 3), master(8, "bm-a", 1, 3)], 8)]
    #[case::id(vec![master(9, "bm", 1, 3), master(4, "bm", 1, 3)], 4)]
    fn test_ties(#[case] masters: Vec<MasterCandidate>, #[case] expected_id: i32) {
        let chosen = select_master(&slave(1), &masters).unwrap();
        assert_eq!(chosen.master.master_id, expected_id);
    }

    #[test]
    fn test_ignores_other_pools_disabled_and_full() {
        let mut disabled = master(2, "bm02", 1, 0);
        disabled.enabled = false;
        let mut full = master(3, "bm03", 1, 4);
        full.max_slaves = Some(4);
        let masters = vec![master(1, "bm01", 2, 0), disabled, full, master(4, "bm04", 1, 50)];

        let chosen = select_master(&slave(1), &masters).unwrap();
        assert_eq!(chosen.master.master_id, 4);
    }

    #[test]
    fn test_no_eligible_master() {
        let mut full = master(1, "bm01", 1, 1);
        full.max_slaves = Some(1);
        assert_eq!(
            select_master(&slave(1), &[full, master(2, "bm02", 2, 0)]),
            Err(NoAllocationReason::NoEligibleMaster)
        );
        assert_eq!(
            select_master(&slave(1), &[]),
            Err(NoAllocationReason::NoEligibleMaster)
        );
    }

    #[test]
    fn test_disabled_slave() {
        let mut s = slave(1);
        s.enabled = false;
        assert_eq!(
            select_master(&s, &[master(1, "bm01", 1, 0)]),
            Err(NoAllocationReason::SlaveDisabled)
        );
    }

    #[test]
    fn test_locked_master_ignores_capacity_and_pool() {
        let mut locked = master(5, "bm-locked", 3, 10);
        locked.max_slaves = Some(1);
        let mut s = slave(1);
        s.locked_master_id = Some(5);

        let masters = [master(1, "bm01", 1, 0), locked];
        let chosen = select_master(&s, &masters).unwrap();
        assert_eq!(chosen.master.master_id, 5);
    }

    #[test]
    fn test_locked_master_disabled_or_missing() {
        let mut locked = master(5, "bm-locked", 1, 0);
        locked.enabled = false;
        let mut s = slave(1);
        s.locked_master_id = Some(5);

        assert_eq!(
            select_master(&s, &[master(1, "bm01", 1, 0), locked]),
            Err(NoAllocationReason::LockedMasterUnavailable)
        );
        assert_eq!(
            select_master(&s, &[master(1, "bm01", 1, 0)]),
            Err(NoAllocationReason::LockedMasterUnavailable)
        );
    }

    fn arb_candidate() -> impl Strategy<Value = MasterCandidate> {
        (1..50i32, 1..3i32, any::<bool>(), proptest::option::of(0..5i32), 0..6i64).prop_map(
            |(id, pool_id, enabled, max_slaves, load)| {
                let mut c = master(id, &format!("bm{id:02}"), pool_id, load);
                c.enabled = enabled;
                c.max_slaves = max_slaves;
                c
            },
        )
    }

    proptest! {
        #[test]
        fn prop_choice_is_eligible_and_minimal(candidates in proptest::collection::vec(arb_candidate(), 0..12)) {
            let s = slave(1);
            let eligible: Vec<_> = candidates
                .iter()
                .filter(|c| c.enabled && c.pool_id == 1 && c.has_capacity())
                .collect();

            match select_master(&s, &candidates) {
                Ok(chosen) => {
                    prop_assert!(chosen.enabled);
                    prop_assert_eq!(chosen.pool_id, 1);
                    prop_assert!(chosen.has_capacity());
                    prop_assert!(eligible.iter().all(|c| c.current_slaves >= chosen.current_slaves));
                }
                Err(reason) => {
                    prop_assert_eq!(reason, NoAllocationReason::NoEligibleMaster);
                    prop_assert!(eligible.is_empty());
                }
            }
        }
    }
}
