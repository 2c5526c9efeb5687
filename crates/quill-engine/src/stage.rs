//! Group-dependent stage transitions. Pure functions over (group, stage).

use quill_core::{Group, Stage};

/// Stage after submitting prewriting: at least drafting.
pub fn after_prewriting(stage: Stage) -> Stage {
    stage.max(Stage::Drafting)
}

/// Next stage when the student asks to move on from drafting.
///
/// Groups A and B pass through peer notes; group C goes straight to final.
/// Never lowers the stage.
pub fn advance_to_peer(group: Group, stage: Stage) -> Stage {
    if group.skips_peer_stage() {
        return Stage::Final;
    }
    match stage {
        Stage::Prewriting | Stage::Drafting => Stage::PeerNotes,
        Stage::PeerNotes | Stage::Final => Stage::Final,
    }
}

/// Previous stage, mirroring the advance table. Clamped at prewriting.
pub fn regress(group: Group, stage: Stage) -> Stage {
    match (stage, group.skips_peer_stage()) {
        (Stage::Final, false) => Stage::PeerNotes,
        (Stage::Final, true) => Stage::Drafting,
        (Stage::PeerNotes, _) => Stage::Drafting,
        (Stage::Drafting, _) | (Stage::Prewriting, _) => Stage::Prewriting,
    }
}

/// Validate an administrative jump target.
pub fn jump_target(target: i64) -> Option<Stage> {
    u8::try_from(target).ok().and_then(|n| Stage::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STAGES: [Stage; 4] = [
        Stage::Prewriting,
        Stage::Drafting,
        Stage::PeerNotes,
        Stage::Final,
    ];
    const ALL_GROUPS: [Group; 3] = [Group::A, Group::B, Group::C];

    #[test]
    fn advance_never_decreases() {
        for group in ALL_GROUPS {
            for stage in ALL_STAGES {
                assert!(advance_to_peer(group, stage) >= stage, "{group} {stage}");
            }
        }
    }

    #[test]
    fn sequential_groups_step_through_peer_notes() {
        for group in [Group::A, Group::B] {
            assert_eq!(advance_to_peer(group, Stage::Prewriting), Stage::PeerNotes);
            assert_eq!(advance_to_peer(group, Stage::Drafting), Stage::PeerNotes);
            assert_eq!(advance_to_peer(group, Stage::PeerNotes), Stage::Final);
            assert_eq!(advance_to_peer(group, Stage::Final), Stage::Final);
        }
    }

    #[test]
    fn group_c_jumps_to_final() {
        for stage in ALL_STAGES {
            assert_eq!(advance_to_peer(Group::C, stage), Stage::Final);
        }
    }

    #[test]
    fn regress_from_final() {
        assert_eq!(regress(Group::A, Stage::Final), Stage::PeerNotes);
        assert_eq!(regress(Group::B, Stage::Final), Stage::PeerNotes);
        assert_eq!(regress(Group::C, Stage::Final), Stage::Drafting);
    }

    #[test]
    fn regress_walks_down_and_clamps() {
        for group in ALL_GROUPS {
            assert_eq!(regress(group, Stage::PeerNotes), Stage::Drafting);
            assert_eq!(regress(group, Stage::Drafting), Stage::Prewriting);
            assert_eq!(regress(group, Stage::Prewriting), Stage::Prewriting);
        }
    }

    #[test]
    fn prewriting_submission_raises_to_drafting_only() {
        assert_eq!(after_prewriting(Stage::Prewriting), Stage::Drafting);
        assert_eq!(after_prewriting(Stage::Drafting), Stage::Drafting);
        assert_eq!(after_prewriting(Stage::Final), Stage::Final);
    }

    #[test]
    fn jump_target_bounds() {
        assert_eq!(jump_target(1), Some(Stage::Prewriting));
        assert_eq!(jump_target(4), Some(Stage::Final));
        assert_eq!(jump_target(0), None);
        assert_eq!(jump_target(5), None);
        assert_eq!(jump_target(-1), None);
        assert_eq!(jump_target(260), None);
    }
}
