//! # Driving Simulator Frames
//!
//! The driving simulator speaks socket.io. Its bridge relays the raw socket.io text frames to the
//! controller over zmq, and relays the controller's reply frames back, so this module defines the
//! frame format rather than a plain JSON payload.
//!
//! An event frame looks like `42["telemetry",{"cte":"0.7598","speed":"0.4","steering_angle":"0"}]`,
//! where the leading `4` marks a websocket message and the `2` marks a socket.io event.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Prefix of a socket.io event frame.
const EVENT_FRAME_PREFIX: &str = "42";

/// Name of the telemetry event.
const TELEMETRY_EVENT: &str = "telemetry";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry sent by the simulator once per simulation step.
///
/// The simulator sends every quantity as a JSON string, plain numbers are accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Telemetry {
    /// Cross track error to the reference line.
    ///
    /// Units: meters
    #[serde(deserialize_with = "f64_from_str_or_num")]
    pub cte: f64,

    /// Current speed of the vehicle.
    ///
    /// Units: miles per hour
    #[serde(deserialize_with = "f64_from_str_or_num")]
    pub speed: f64,

    /// Current steering angle of the vehicle.
    ///
    /// Units: degrees
    #[serde(deserialize_with = "f64_from_str_or_num")]
    pub steering_angle: f64,
}

/// Demands sent back to the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct SteerDems {
    /// Normalised steering demand in `[-1, 1]`.
    pub steering_angle: f64,

    /// Throttle demand, `0` lifts off the throttle.
    pub throttle: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// An event parsed from a simulator frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// Telemetry from the vehicle.
    Telemetry(Telemetry),

    /// An event frame without any data, the simulator is in manual driving mode.
    Manual,

    /// An event other than telemetry.
    Other(String),

    /// Not an event frame (pings, connection handshakes), nothing to act on.
    Ignored,
}

/// A reply frame to send to the simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimReply {
    /// Steering and throttle demands.
    Steer(SteerDems),

    /// Tell the simulator to keep manual driving.
    Manual,

    /// Nothing to say, the bridge drops empty frames.
    None,
}

/// Errors raised when parsing or building simulator frames.
#[derive(Debug, thiserror::Error)]
pub enum SimFrameError {
    #[error("Frame data is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Frame data does not start with an event name")]
    MissingEventName,

    #[error("The {0} event has no payload")]
    MissingPayload(String),

    #[error("Telemetry payload is invalid: {0}")]
    InvalidTelemetry(serde_json::Error),

    #[error("Could not serialize the reply: {0}")]
    SerializationError(serde_json::Error),
}

/// Accepted representations for numbers in the telemetry.
#[derive(Deserialize)]
#[serde(untagged)]
enum StrOrNum {
    Num(f64),
    Str(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimEvent {
    /// Parse a raw frame received from the simulator bridge.
    pub fn parse(frame: &str) -> Result<Self, SimFrameError> {
        if frame.len() <= EVENT_FRAME_PREFIX.len() || !frame.starts_with(EVENT_FRAME_PREFIX) {
            return Ok(SimEvent::Ignored);
        }

        let data = match frame_data(frame) {
            Some(d) => d,
            None => return Ok(SimEvent::Manual),
        };

        let mut items = match serde_json::from_str::<Value>(data)
            .map_err(SimFrameError::InvalidJson)?
        {
            Value::Array(a) => a.into_iter(),
            _ => return Err(SimFrameError::MissingEventName),
        };

        let event = match items.next() {
            Some(Value::String(s)) => s,
            _ => return Err(SimFrameError::MissingEventName),
        };

        if event != TELEMETRY_EVENT {
            return Ok(SimEvent::Other(event));
        }

        let payload = items.next()
            .ok_or_else(|| SimFrameError::MissingPayload(event.clone()))?;

        serde_json::from_value(payload)
            .map(SimEvent::Telemetry)
            .map_err(SimFrameError::InvalidTelemetry)
    }
}

impl SimReply {
    /// Build the frame to send to the simulator bridge.
    pub fn to_frame(&self) -> Result<String, SimFrameError> {
        match self {
            SimReply::Steer(dems) => {
                let payload = serde_json::to_string(dems)
                    .map_err(SimFrameError::SerializationError)?;
                Ok(format!("{}[\"steer\",{}]", EVENT_FRAME_PREFIX, payload))
            },
            SimReply::Manual => Ok(format!("{}[\"manual\",{{}}]", EVENT_FRAME_PREFIX)),
            SimReply::None => Ok(String::new()),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Extract the JSON data of an event frame.
///
/// Returns `None` if the frame contains `null` or has no bracketed data.
fn frame_data(frame: &str) -> Option<&str> {
    if frame.contains("null") {
        return None;
    }

    match (frame.find('['), frame.rfind(']')) {
        (Some(b1), Some(b2)) if b2 > b1 => Some(&frame[b1..=b2]),
        _ => None,
    }
}

/// Read a finite number given either as a JSON number or as a string.
fn f64_from_str_or_num<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value: f64 = match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Num(n) => n,
        StrOrNum::Str(s) => s.trim().parse().map_err(serde::de::Error::custom)?,
    };

    if !value.is_finite() {
        return Err(serde::de::Error::custom(format!("expected a finite number, found {}", value)));
    }

    Ok(value)
}
