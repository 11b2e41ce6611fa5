use super::*;
use serde_json::json;

fn raw(value: serde_json::Value) -> RawCommand {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_state_update_validates() {
    let event = UpdateEvent::state("a1", StatePatch::position([1.0, 2.0, 3.0]));
    assert!(event.validate().is_ok());
}

#[test]
fn test_empty_patch_is_malformed() {
    let event = UpdateEvent::state("a1", StatePatch::default());
    assert_eq!(event.validate(), Err(ValidationError::EmptyPatch));
}

#[test]
fn test_missing_agent_id_is_malformed() {
    let event = UpdateEvent::state("", StatePatch::position([0.0, 0.0, 0.0]));
    assert_eq!(event.validate(), Err(ValidationError::MissingAgentId));
}

#[test]
fn test_duplicate_waypoint_sequence_rejected() {
    let event = UpdateEvent::mission(
        "a1",
        vec![Waypoint::new(0, 1.0, 1.0, 10.0), Waypoint::new(0, 2.0, 2.0, 10.0)],
    );
    assert_eq!(event.validate(), Err(ValidationError::DuplicateSequence(0)));
}

#[test]
fn test_mission_longer_than_count_frame_rejected() {
    let full: Vec<Waypoint> = (0..=u16::MAX)
        .map(|seq| Waypoint::new(seq, 1.0, 1.0, 10.0))
        .collect();
    assert_eq!(full.len(), 65_536);
    assert_eq!(
        validate_waypoints(&full),
        Err(ValidationError::TooManyWaypoints(65_536))
    );

    assert!(validate_waypoints(&full[..MAX_MISSION_ITEMS]).is_ok());
}

#[test]
fn test_empty_mission_accepted() {
    let event = UpdateEvent::mission("a1", vec![]);
    assert!(event.validate().is_ok());
}

#[test]
fn test_waypoint_defaults_from_json() {
    let wp: Waypoint =
        serde_json::from_value(json!({"sequence": 3, "lat": 24.1, "lon": 120.6, "alt": 50.0}))
            .unwrap();
    assert_eq!(wp.command, 16);
    assert!(wp.autocontinue);
    assert_eq!(wp.param1, 0.0);
}

#[test]
fn test_waypoint_without_sequence_fails_to_parse() {
    let result: Result<Waypoint, _> =
        serde_json::from_value(json!({"lat": 24.1, "lon": 120.6, "alt": 50.0}));
    assert!(result.is_err());
}

#[test]
fn test_patch_omits_absent_fields_on_the_wire() {
    let patch = StatePatch {
        armed: Some(true),
        ..Default::default()
    };
    assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"armed": true}));
}

#[test]
fn test_command_nested_parameters() {
    let cmd = Command::try_from(raw(json!({
        "type": "load_mission",
        "parameters": {"file": "missions/survey.plan"}
    })))
    .unwrap();
    assert_eq!(
        cmd,
        Command::LoadMission {
            file: "missions/survey.plan".to_string()
        }
    );
}

#[test]
fn test_command_flattened_parameters() {
    let cmd = Command::try_from(raw(json!({"type": "load_mission", "file": "a.plan"}))).unwrap();
    assert_eq!(cmd.kind(), "load_mission");
}

#[test]
fn test_set_parameter_requires_numeric_value() {
    let err = Command::try_from(raw(json!({
        "type": "set_parameter",
        "parameters": {"name": "wind", "value": "strong"}
    })))
    .unwrap_err();
    assert_eq!(err, ValidationError::MissingField("value"));
}

#[test]
fn test_safety_distance_alias() {
    let cmd = Command::try_from(raw(json!({"type": "set_safety_distance"}))).unwrap();
    assert_eq!(
        cmd,
        Command::SetParameter {
            name: "safety_distance".to_string(),
            value: 5.0
        }
    );

    let cmd = Command::try_from(raw(json!({"type": "set_safety_distance", "distance": 8.5}))).unwrap();
    assert_eq!(
        cmd,
        Command::SetParameter {
            name: "safety_distance".to_string(),
            value: 8.5
        }
    );
}

#[test]
fn test_unknown_command_kept_for_reporting() {
    let cmd = Command::from_json(br#"{"type": "self_destruct"}"#).unwrap();
    assert_eq!(
        cmd,
        Command::Unrecognized {
            kind: "self_destruct".to_string()
        }
    );
    assert_eq!(cmd.kind(), "self_destruct");
}

#[test]
fn test_command_without_type_is_malformed() {
    assert!(Command::from_json(br#"{"file": "x"}"#).is_err());
    assert!(Command::from_json(br#"{"type": ""}"#).is_err());
}
