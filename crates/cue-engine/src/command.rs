//! Command protocol accepted by the playback worker.
//!
//! Commands travel as JSON envelopes: `{"command": "<name>"}` or
//! `{"command": "<name>", "value": <payload>}`. The `value` key is present exactly when the
//! command carries a payload. `loop`, `setStart` and `setEnd` read an absent value as `0`.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::EngineError;
use crate::params::{Fade, Loop, Volume};

const KEY_COMMAND: &str = "command";
const KEY_VALUE: &str = "value";

/// The closed vocabulary of engine operations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    Quit,
    Volume(Volume),
    Fade(Fade),
    Loop(Loop),
    /// Trim start in seconds.
    SetStart(f64),
    /// Trim end in seconds (`0.0` = end of clip).
    SetEnd(f64),
}

impl Command {
    /// All command names, in wire spelling.
    pub const NAMES: [&'static str; 9] = [
        "play", "pause", "stop", "quit", "volume", "fade", "loop", "setStart", "setEnd",
    ];

    /// Build a command from its wire name and optional payload.
    ///
    /// An unknown name is `InvalidCommand`; an ill-typed payload, or a missing `volume` or `fade`
    /// payload, is `InvalidMessage`. `loop` defaults to no repeats and the trims to `0.0`.
    pub fn new(name: &str, value: Option<Value>) -> Result<Self, EngineError> {
        let cmd = match name {
            "play" => Command::Play,
            "pause" => Command::Pause,
            "stop" => Command::Stop,
            "quit" => Command::Quit,
            "volume" => Command::Volume(payload::<Volume>(name, value)?.clamped()),
            "fade" => Command::Fade(payload::<Fade>(name, value)?.clamped()),
            "loop" => Command::Loop(Loop::new(payload_or_default::<i64>(name, value)?)),
            "setStart" => Command::SetStart(non_negative(payload_or_default::<f64>(name, value)?)),
            "setEnd" => Command::SetEnd(non_negative(payload_or_default::<f64>(name, value)?)),
            other => return Err(EngineError::InvalidCommand(other.to_string())),
        };
        Ok(cmd)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::Quit => "quit",
            Command::Volume(_) => "volume",
            Command::Fade(_) => "fade",
            Command::Loop(_) => "loop",
            Command::SetStart(_) => "setStart",
            Command::SetEnd(_) => "setEnd",
        }
    }

    /// Payload in wire form, `None` for payload-less commands.
    pub fn value(&self) -> Option<Value> {
        match self {
            Command::Play | Command::Pause | Command::Stop | Command::Quit => None,
            Command::Volume(v) => serde_json::to_value(v).ok(),
            Command::Fade(f) => serde_json::to_value(f).ok(),
            Command::Loop(l) => Some(Value::from(l.count())),
            Command::SetStart(s) | Command::SetEnd(s) => Some(Value::from(*s)),
        }
    }

    /// Parameter changes force the engine back to `Stopped`.
    pub fn resets_playback(&self) -> bool {
        matches!(
            self,
            Command::Volume(_)
                | Command::Fade(_)
                | Command::Loop(_)
                | Command::SetStart(_)
                | Command::SetEnd(_)
        )
    }

    pub fn to_message(&self) -> Value {
        let mut map = Map::new();
        map.insert(KEY_COMMAND.to_string(), Value::from(self.name()));
        if let Some(value) = self.value() {
            map.insert(KEY_VALUE.to_string(), value);
        }
        Value::Object(map)
    }

    pub fn from_message(message: &Value) -> Result<Self, EngineError> {
        let map = message
            .as_object()
            .ok_or_else(|| EngineError::InvalidMessage(format!("not an object: {message}")))?;
        let name = map
            .get(KEY_COMMAND)
            .ok_or_else(|| {
                EngineError::InvalidMessage(format!("missing `{KEY_COMMAND}`: {message}"))
            })?
            .as_str()
            .ok_or_else(|| {
                EngineError::InvalidMessage(format!("`{KEY_COMMAND}` is not a string: {message}"))
            })?;
        let value = map.get(KEY_VALUE).filter(|v| !v.is_null()).cloned();
        Command::new(name, value)
    }
}

fn payload<T: DeserializeOwned>(name: &str, value: Option<Value>) -> Result<T, EngineError> {
    let value =
        value.ok_or_else(|| EngineError::InvalidMessage(format!("`{name}` needs a value")))?;
    serde_json::from_value(value)
        .map_err(|e| EngineError::InvalidMessage(format!("bad `{name}` value: {e}")))
}

fn payload_or_default<T: DeserializeOwned + Default>(
    name: &str,
    value: Option<Value>,
) -> Result<T, EngineError> {
    match value {
        Some(value) => payload(name, Some(value)),
        None => Ok(T::default()),
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { 0.0 }
}
