use super::{StatePatch, Vec3, Waypoint};
use crate::error::BridgeError;
use std::collections::HashSet;
use std::fmt;

/// Maximum accepted agent identifier length
const MAX_AGENT_ID_LEN: usize = 128;

/// Largest mission whose item count fits the u16 count frame
pub const MAX_MISSION_ITEMS: usize = u16::MAX as usize;

/// Shape validation failures for inbound updates
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingAgentId,
    InvalidAgentId(String),
    EmptyPatch,
    NonFinite(&'static str),
    DuplicateSequence(u16),
    TooManyWaypoints(usize),
    MissingField(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingAgentId => write!(f, "agent id is required"),
            ValidationError::InvalidAgentId(id) => {
                write!(f, "invalid agent id '{}': must be printable and at most {} chars", id, MAX_AGENT_ID_LEN)
            }
            ValidationError::EmptyPatch => write!(f, "state update carries no fields"),
            ValidationError::NonFinite(field) => {
                write!(f, "field '{}' must contain finite numbers", field)
            }
            ValidationError::DuplicateSequence(seq) => {
                write!(f, "waypoint sequence {} appears more than once", seq)
            }
            ValidationError::TooManyWaypoints(n) => {
                write!(f, "mission has {} waypoints, at most {} allowed", n, MAX_MISSION_ITEMS)
            }
            ValidationError::MissingField(field) => write!(f, "field '{}' is required", field),
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for BridgeError {
    fn from(err: ValidationError) -> Self {
        BridgeError::MalformedUpdate(err.to_string())
    }
}

/// Validates an agent identifier.
///
/// Rules:
/// - Non-empty
/// - At most 128 characters
/// - No control characters or whitespace
pub fn validate_agent_id(agent_id: &str) -> Result<(), ValidationError> {
    if agent_id.is_empty() {
        return Err(ValidationError::MissingAgentId);
    }
    if agent_id.chars().count() > MAX_AGENT_ID_LEN
        || agent_id.chars().any(|c| c.is_control() || c.is_whitespace())
    {
        return Err(ValidationError::InvalidAgentId(agent_id.to_string()));
    }
    Ok(())
}

/// Validates a partial state update: at least one field, all numbers finite.
pub fn validate_patch(patch: &StatePatch) -> Result<(), ValidationError> {
    if patch.is_empty() {
        return Err(ValidationError::EmptyPatch);
    }
    check_vec("position", patch.position.as_ref())?;
    check_vec("velocity", patch.velocity.as_ref())?;
    check_vec("attitude", patch.attitude.as_ref())?;
    if let Some(v) = patch.battery_voltage {
        if !v.is_finite() {
            return Err(ValidationError::NonFinite("battery_voltage"));
        }
    }
    Ok(())
}

/// Validates a mission: sequence numbers unique, coordinates finite.
///
/// Geographic bounds are the simulation's concern and are not checked here.
pub fn validate_waypoints(waypoints: &[Waypoint]) -> Result<(), ValidationError> {
    if waypoints.len() > MAX_MISSION_ITEMS {
        return Err(ValidationError::TooManyWaypoints(waypoints.len()));
    }
    let mut seen = HashSet::with_capacity(waypoints.len());
    for wp in waypoints {
        if !seen.insert(wp.sequence) {
            return Err(ValidationError::DuplicateSequence(wp.sequence));
        }
        if ![wp.lat, wp.lon, wp.alt].iter().all(|v| v.is_finite()) {
            return Err(ValidationError::NonFinite("waypoint"));
        }
        if ![wp.param1, wp.param2, wp.param3, wp.param4]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(ValidationError::NonFinite("waypoint params"));
        }
    }
    Ok(())
}

fn check_vec(field: &'static str, value: Option<&Vec3>) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.iter().all(|c| c.is_finite()) => Err(ValidationError::NonFinite(field)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn test_valid_agent_ids() {
        assert!(validate_agent_id("a1").is_ok());
        assert!(validate_agent_id("mavlink_1").is_ok());
        assert!(validate_agent_id("drone-07.alpha").is_ok());
    }

    #[test]
    fn test_invalid_agent_ids() {
        assert_eq!(validate_agent_id(""), Err(ValidationError::MissingAgentId));
        assert!(validate_agent_id("drone 7").is_err());
        assert!(validate_agent_id("drone\n7").is_err());
        assert!(validate_agent_id(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_non_finite_position_rejected() {
        let patch = StatePatch::position([1.0, f64::NAN, 3.0]);
        assert_eq!(
            validate_patch(&patch),
            Err(ValidationError::NonFinite("position"))
        );
    }
}
