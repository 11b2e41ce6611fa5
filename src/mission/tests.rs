use super::*;
use crate::error::ErrorKind;

fn wp(seq: u16) -> Waypoint {
    Waypoint::new(seq, 24.0 + seq as f64, 120.0, 30.0)
}

#[test]
fn test_set_then_get_returns_same_waypoints() {
    let registry = MissionRegistry::new();
    let waypoints = vec![wp(0), wp(1), wp(2)];

    registry.set_mission("a1", waypoints.clone()).unwrap();

    let mission = registry.get_mission("a1").unwrap();
    assert_eq!(mission.waypoints, waypoints);
    assert_eq!(mission.agent_id, "a1");
}

#[test]
fn test_replacement_discards_prior_mission() {
    let registry = MissionRegistry::new();

    registry.set_mission("a1", vec![wp(0), wp(1)]).unwrap();
    registry.set_mission("a1", vec![wp(0)]).unwrap();

    let mission = registry.get_mission("a1").unwrap();
    assert_eq!(mission.waypoints, vec![wp(0)]);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_revision_increases_on_replacement() {
    let registry = MissionRegistry::new();
    let r1 = registry.set_mission("a1", vec![wp(0)]).unwrap();
    let r2 = registry.set_mission("a2", vec![wp(0)]).unwrap();
    let r3 = registry.set_mission("a1", vec![wp(1)]).unwrap();
    assert!(r1 < r2 && r2 < r3);
    assert_eq!(registry.get_mission("a1").unwrap().revision, r3);
}

#[test]
fn test_waypoints_stored_in_sequence_order() {
    let registry = MissionRegistry::new();
    registry.set_mission("a1", vec![wp(2), wp(0), wp(1)]).unwrap();

    let seqs: Vec<u16> = registry
        .get_mission("a1")
        .unwrap()
        .waypoints
        .iter()
        .map(|w| w.sequence)
        .collect();
    assert_eq!(seqs, vec![0, 1, 2]);
}

#[test]
fn test_duplicate_sequence_rejected_and_prior_kept() {
    let registry = MissionRegistry::new();
    registry.set_mission("a1", vec![wp(0)]).unwrap();

    let err = registry.set_mission("a1", vec![wp(1), wp(1)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedUpdate);
    assert_eq!(registry.get_mission("a1").unwrap().waypoints, vec![wp(0)]);
}

#[test]
fn test_unknown_agent_has_no_mission() {
    let registry = MissionRegistry::new();
    assert!(registry.get_mission("ghost").is_none());
}

#[test]
fn test_target_system_from_agent_id() {
    assert_eq!(target_system_for("mavlink_7"), 7);
    assert_eq!(target_system_for("drone_a_12"), 12);
    assert_eq!(target_system_for("a1"), 1);
    assert_eq!(target_system_for("drone_alpha"), 1);
}

#[test]
fn test_empty_mission_replaces_and_is_stored_empty() {
    let registry = MissionRegistry::new();
    registry.set_mission("mavlink_3", vec![wp(0), wp(1)]).unwrap();
    registry.set_mission("mavlink_3", vec![]).unwrap();

    let mission = registry.get_mission("mavlink_3").unwrap();
    assert!(mission.waypoints.is_empty());

    let frames = mission.dispatch_frames();
    assert_eq!(frames.len(), 2);
    assert!(matches!(frames[0], DispatchFrame::MissionClearAll { .. }));
    assert!(matches!(frames[1], DispatchFrame::MissionCount { count: 0, .. }));
}

#[test]
fn test_dispatch_frames_shape() {
    let registry = MissionRegistry::new();
    registry.set_mission("mavlink_3", vec![wp(0), wp(1)]).unwrap();

    let frames = registry.get_mission("mavlink_3").unwrap().dispatch_frames();
    assert_eq!(frames.len(), 4);
    assert_eq!(
        frames[0],
        DispatchFrame::MissionClearAll {
            target_system: 3,
            target_component: 1
        }
    );
    assert_eq!(
        frames[1],
        DispatchFrame::MissionCount {
            target_system: 3,
            target_component: 1,
            count: 2
        }
    );
    match &frames[3] {
        DispatchFrame::MissionItem {
            seq,
            frame,
            current,
            autocontinue,
            x,
            ..
        } => {
            assert_eq!(*seq, 1);
            assert_eq!(*frame, FRAME_GLOBAL_RELATIVE_ALT);
            assert_eq!(*current, 0);
            assert_eq!(*autocontinue, 1);
            assert_eq!(*x, 25.0);
        }
        other => panic!("expected mission item, got {:?}", other),
    }
}
