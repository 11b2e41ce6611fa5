use super::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default safety distance for the legacy `set_safety_distance` command
const DEFAULT_SAFETY_DISTANCE: f64 = 5.0;

/// Control command routed to the simulation collaborator.
///
/// `Unrecognized` carries kinds the bridge does not know so the dispatcher
/// can report them instead of dropping them at the edge.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    StartSimulation,
    StopSimulation,
    LoadMission { file: String },
    SetParameter { name: String, value: f64 },
    Unrecognized { kind: String },
}

impl Command {
    pub fn kind(&self) -> &str {
        match self {
            Command::StartSimulation => "start_simulation",
            Command::StopSimulation => "stop_simulation",
            Command::LoadMission { .. } => "load_mission",
            Command::SetParameter { .. } => "set_parameter",
            Command::Unrecognized { kind } => kind,
        }
    }

    /// Parse a JSON command payload (`{type, parameters}` or flattened form)
    pub fn from_json(payload: &[u8]) -> Result<Self, ValidationError> {
        let raw: RawCommand = serde_json::from_slice(payload)
            .map_err(|_| ValidationError::MissingField("type"))?;
        Command::try_from(raw)
    }
}

/// Loosely-typed command as it arrives from the topic bus or HTTP API.
///
/// Parameters may be nested under `parameters` or given at the top level
/// next to `type`; nested values take precedence.
#[derive(Clone, Debug, Deserialize)]
pub struct RawCommand {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub parameters: Map<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawCommand {
    fn param(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key).or_else(|| self.extra.get(key))
    }

    fn string_param(&self, key: &'static str) -> Result<String, ValidationError> {
        self.param(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(ValidationError::MissingField(key))
    }

    fn number_param(&self, key: &'static str) -> Result<f64, ValidationError> {
        let value = self
            .param(key)
            .and_then(|v| v.as_f64())
            .ok_or(ValidationError::MissingField(key))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ValidationError::NonFinite(key))
        }
    }
}

impl TryFrom<RawCommand> for Command {
    type Error = ValidationError;

    fn try_from(raw: RawCommand) -> Result<Self, Self::Error> {
        match raw.kind.as_str() {
            "" => Err(ValidationError::MissingField("type")),
            "start_simulation" => Ok(Command::StartSimulation),
            "stop_simulation" => Ok(Command::StopSimulation),
            "load_mission" => Ok(Command::LoadMission {
                file: raw.string_param("file")?,
            }),
            "set_parameter" => Ok(Command::SetParameter {
                name: raw.string_param("name")?,
                value: raw.number_param("value")?,
            }),
            "set_safety_distance" => {
                let value = match raw.param("distance") {
                    None => DEFAULT_SAFETY_DISTANCE,
                    Some(_) => raw.number_param("distance")?,
                };
                Ok(Command::SetParameter {
                    name: "safety_distance".to_string(),
                    value,
                })
            }
            other => Ok(Command::Unrecognized {
                kind: other.to_string(),
            }),
        }
    }
}
