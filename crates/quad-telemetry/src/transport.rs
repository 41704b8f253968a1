//! Wire adapters for device traffic.
//!
//! Every transport (raw WebSocket, socket.io relay, serial bridge) hands its
//! text messages to [`decode`], which accepts:
//!
//! - a tagged envelope `{"type": "angles"|"control"|"motors"|"state", "payload": {...}}`
//! - the legacy `{"type": "telemetria", "payload": {...}}` full record
//! - an untagged flat JSON record
//! - a 27-column comma-separated line
//!
//! Numeric fields are coerced leniently: anything that cannot be read as a
//! number becomes `0`, never an error.

use quad_domain::{
    AnglesFragment, ControlFragment, DeviceCommand, DeviceEnvelope, Fragment, MotorsFragment,
};
use serde_json::{Map, Value};

use crate::error::{Result, TelemetryError};

/// Keys that mark a flat record as carrying an `angles` block
pub const ANGLES_KEYS: [&str; 15] = [
    "RateRoll",
    "RatePitch",
    "RateYaw",
    "AngleRoll",
    "AngleRoll_est",
    "AnglePitch",
    "AnglePitch_est",
    "AngleYaw",
    "AngleYaw_est",
    "RawRoll",
    "RawPitch",
    "RawYaw",
    "AccX",
    "AccY",
    "AccZ",
];

pub const CONTROL_KEYS: [&str; 11] = [
    "tau_x",
    "tau_y",
    "tau_z",
    "KalmanAngleRoll",
    "KalmanAnglePitch",
    "error_phi",
    "error_theta",
    "InputThrottle",
    "InputRoll",
    "InputPitch",
    "InputYaw",
];

pub const MOTORS_KEYS: [&str; 6] = [
    "MotorInput1",
    "MotorInput2",
    "MotorInput3",
    "MotorInput4",
    "Altura",
    "modo",
];

/// Column order of the firmware's CSV line
pub const CSV_COLUMNS: [&str; 27] = [
    "timestamp",
    "AngleRoll",
    "AnglePitch",
    "AngleYaw",
    "RateRoll",
    "RatePitch",
    "RateYaw",
    "AccX",
    "AccY",
    "AccZ",
    "tau_x",
    "tau_y",
    "tau_z",
    "KalmanAngleRoll",
    "KalmanAnglePitch",
    "error_phi",
    "error_theta",
    "InputThrottle",
    "InputRoll",
    "InputPitch",
    "InputYaw",
    "MotorInput1",
    "MotorInput2",
    "MotorInput3",
    "MotorInput4",
    "Altura",
    "modo",
];

/// A decoded inbound device message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InboundMessage {
    Fragment(Fragment),
    /// Mode report/request; the raw value is validated by the arbiter
    State { mode: i64 },
}

/// Decode one device message into zero or more inbound messages.
///
/// # Errors
///
/// Returns [`TelemetryError::Decode`] for JSON that is not an object or an
/// envelope without a usable payload, and [`TelemetryError::UnknownType`]
/// for envelope types outside the known set.
pub fn decode(text: &str) -> Result<Vec<InboundMessage>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => decode_object(&map),
        Ok(other) => Err(TelemetryError::Decode(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(_) => Ok(decode_csv(text)),
    }
}

fn decode_object(map: &Map<String, Value>) -> Result<Vec<InboundMessage>> {
    let Some(tag) = map.get("type") else {
        return Ok(split_record(map));
    };
    let tag = tag
        .as_str()
        .ok_or_else(|| TelemetryError::Decode("`type` must be a string".to_string()))?;

    let payload = map
        .get("payload")
        .and_then(Value::as_object)
        .ok_or_else(|| TelemetryError::Decode(format!("`{tag}` message without object payload")))?;

    let message = match tag {
        "angles" => InboundMessage::Fragment(Fragment::Angles(angles_from(payload))),
        "control" => InboundMessage::Fragment(Fragment::Control(control_from(payload))),
        "motors" => InboundMessage::Fragment(Fragment::Motors(motors_from(payload))),
        "state" => InboundMessage::State {
            mode: mode_from(payload)?,
        },
        "telemetria" => return Ok(split_record(payload)),
        other => return Err(TelemetryError::UnknownType(other.to_string())),
    };

    Ok(vec![message])
}

/// Decode a firmware CSV line. Missing or unreadable columns read as 0.
#[must_use]
pub fn decode_csv(line: &str) -> Vec<InboundMessage> {
    let mut columns = line.split(',');
    let record: Map<String, Value> = CSV_COLUMNS
        .iter()
        .map(|key| {
            let raw = columns.next();
            let value = raw
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite());
            if value.is_none() {
                tracing::debug!(column = *key, raw = raw.unwrap_or(""), "CSV column coerced to 0");
            }
            ((*key).to_string(), Value::from(value.unwrap_or(0.0)))
        })
        .collect();

    split_record(&record)
}

/// Split a flat record into one fragment per kind it carries.
#[must_use]
pub fn split_record(record: &Map<String, Value>) -> Vec<InboundMessage> {
    let carries = |keys: &[&str]| keys.iter().any(|key| record.contains_key(*key));

    let mut messages = Vec::with_capacity(3);
    if carries(&ANGLES_KEYS) {
        messages.push(InboundMessage::Fragment(Fragment::Angles(angles_from(record))));
    }
    if carries(&CONTROL_KEYS) {
        messages.push(InboundMessage::Fragment(Fragment::Control(control_from(record))));
    }
    if carries(&MOTORS_KEYS) {
        messages.push(InboundMessage::Fragment(Fragment::Motors(motors_from(record))));
    }
    messages
}

/// Serialize a command for the vehicle
///
/// # Errors
///
/// Returns [`TelemetryError::Serialization`] if JSON encoding fails.
pub fn encode_command(command: DeviceCommand) -> Result<String> {
    Ok(serde_json::to_string(&DeviceEnvelope::Command(command))?)
}

fn angles_from(map: &Map<String, Value>) -> AnglesFragment {
    AnglesFragment {
        rate_roll: field(map, "RateRoll"),
        rate_pitch: field(map, "RatePitch"),
        rate_yaw: field(map, "RateYaw"),
        angle_roll: field(map, "AngleRoll"),
        angle_roll_est: field(map, "AngleRoll_est"),
        angle_pitch: field(map, "AnglePitch"),
        angle_pitch_est: field(map, "AnglePitch_est"),
        angle_yaw: field(map, "AngleYaw"),
        angle_yaw_est: field(map, "AngleYaw_est"),
        raw_roll: field(map, "RawRoll"),
        raw_pitch: field(map, "RawPitch"),
        raw_yaw: field(map, "RawYaw"),
        acc_x: field(map, "AccX"),
        acc_y: field(map, "AccY"),
        acc_z: field(map, "AccZ"),
    }
}

fn control_from(map: &Map<String, Value>) -> ControlFragment {
    ControlFragment {
        tau_x: field(map, "tau_x"),
        tau_y: field(map, "tau_y"),
        tau_z: field(map, "tau_z"),
        kalman_angle_roll: field(map, "KalmanAngleRoll"),
        kalman_angle_pitch: field(map, "KalmanAnglePitch"),
        error_phi: field(map, "error_phi"),
        error_theta: field(map, "error_theta"),
        input_throttle: field(map, "InputThrottle"),
        input_roll: field(map, "InputRoll"),
        input_pitch: field(map, "InputPitch"),
        input_yaw: field(map, "InputYaw"),
    }
}

fn motors_from(map: &Map<String, Value>) -> MotorsFragment {
    MotorsFragment {
        motor_input1: field(map, "MotorInput1"),
        motor_input2: field(map, "MotorInput2"),
        motor_input3: field(map, "MotorInput3"),
        motor_input4: field(map, "MotorInput4"),
        altura: field(map, "Altura"),
        modo: field(map, "modo"),
    }
}

fn mode_from(payload: &Map<String, Value>) -> Result<i64> {
    let value = payload
        .get("mode")
        .ok_or_else(|| TelemetryError::Decode("`state` message without `mode`".to_string()))?;

    if let Some(mode) = value.as_i64() {
        return Ok(mode);
    }
    match value.as_f64() {
        #[allow(clippy::cast_possible_truncation)]
        Some(mode) if mode.fract() == 0.0 && mode.abs() <= f64::from(i32::MAX) => Ok(mode as i64),
        _ => Err(TelemetryError::Decode(format!("`mode` is not an integer: {value}"))),
    }
}

/// Read one numeric field. `null` counts as absent.
fn field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key).and_then(|value| coerce(key, value))
}

fn coerce(key: &str, value: &Value) -> Option<f64> {
    let number = match value {
        Value::Null => return None,
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Array(_) | Value::Object(_) => None,
    };

    match number.filter(|v| v.is_finite()) {
        Some(v) => Some(v),
        None => {
            tracing::debug!(field = key, value = %value, "Non-numeric telemetry field coerced to 0");
            Some(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quad_domain::Mode;
    use std::sync::{Arc, Mutex};
    use tokio_test::{assert_err, assert_ok};

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn debug_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        (result, logs)
    }

    fn single_fragment(text: &str) -> Fragment {
        let messages = assert_ok!(decode(text));
        assert_eq!(messages.len(), 1);
        match messages[0] {
            InboundMessage::Fragment(fragment) => fragment,
            InboundMessage::State { .. } => panic!("expected a fragment"),
        }
    }

    #[test]
    fn test_decode_tagged_envelopes() {
        let fragment = single_fragment(r#"{"type":"motors","payload":{"MotorInput1":1500}}"#);
        let Fragment::Motors(motors) = fragment else {
            panic!("expected motors");
        };
        assert_eq!(motors.motor_input1, Some(1500.0));
        assert_eq!(motors.motor_input2, None);

        let fragment = single_fragment(r#"{"type":"angles","payload":{"AngleRoll_est":0.3}}"#);
        let Fragment::Angles(angles) = fragment else {
            panic!("expected angles");
        };
        assert_eq!(angles.angle_roll_est, Some(0.3));
        assert_eq!(angles.angle_roll, None);
    }

    #[test]
    fn test_decode_state() {
        let messages = assert_ok!(decode(r#"{"type":"state","payload":{"mode":2}}"#));
        assert_eq!(messages, vec![InboundMessage::State { mode: 2 }]);

        // Out-of-range values are passed through for the arbiter to reject
        let messages = assert_ok!(decode(r#"{"type":"state","payload":{"mode":9}}"#));
        assert_eq!(messages, vec![InboundMessage::State { mode: 9 }]);

        assert_err!(decode(r#"{"type":"state","payload":{"mode":"pilot"}}"#));
        assert_err!(decode(r#"{"type":"state","payload":{}}"#));
    }

    #[test]
    fn test_non_numeric_fields_coerce_to_zero() {
        let fragment = single_fragment(
            r#"{"type":"control","payload":{"tau_x":"abc","tau_y":"0.25","tau_z":null,"InputYaw":[1]}}"#,
        );
        let Fragment::Control(control) = fragment else {
            panic!("expected control");
        };
        assert_eq!(control.tau_x, Some(0.0));
        assert_eq!(control.tau_y, Some(0.25));
        assert_eq!(control.tau_z, None);
        assert_eq!(control.input_yaw, Some(0.0));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = assert_err!(decode(r#"{"type":"video","payload":{}}"#));
        assert_eq!(err.error_code(), "UNKNOWN_TYPE");

        let err = assert_err!(decode(r#"{"type":"angles"}"#));
        assert_eq!(err.error_code(), "DECODE_ERROR");

        assert_err!(decode("[1, 2, 3]"));
    }

    #[test]
    fn test_flat_record_splits_by_kind() {
        let messages = assert_ok!(decode(r#"{"AngleRoll":0.1,"MotorInput3":1200}"#));
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], InboundMessage::Fragment(Fragment::Angles(_))));
        assert!(matches!(messages[1], InboundMessage::Fragment(Fragment::Motors(_))));

        let messages = assert_ok!(decode(
            r#"{"type":"telemetria","payload":{"tau_x":0.5}}"#
        ));
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], InboundMessage::Fragment(Fragment::Control(_))));
    }

    #[test]
    fn test_decode_csv_line() {
        let line = "1000,0.1,0.2,0.3,1,2,3,0,0,9.8,0.01,0.02,0.03,0.1,0.2,0,0,1200,0,0,0,1100,1101,1102,1103,2.5,1";
        let messages = assert_ok!(decode(line));
        assert_eq!(messages.len(), 3);

        let InboundMessage::Fragment(Fragment::Angles(angles)) = messages[0] else {
            panic!("expected angles first");
        };
        assert_eq!(angles.angle_yaw, Some(0.3));
        assert_eq!(angles.acc_z, Some(9.8));

        let InboundMessage::Fragment(Fragment::Motors(motors)) = messages[2] else {
            panic!("expected motors last");
        };
        assert_eq!(motors.motor_input4, Some(1103.0));
        assert_eq!(motors.modo, Some(1.0));
    }

    #[test]
    fn test_short_csv_line_pads_with_zero() {
        let messages = decode_csv("5,0.7,x");
        let InboundMessage::Fragment(Fragment::Angles(angles)) = messages[0] else {
            panic!("expected angles first");
        };
        assert_eq!(angles.angle_roll, Some(0.7));
        assert_eq!(angles.angle_pitch, Some(0.0));
        assert_eq!(angles.acc_x, Some(0.0));
    }

    #[test]
    fn test_csv_fallback_is_logged() {
        let (messages, logs) = debug_logs(|| decode_csv("5,0.7,x"));
        assert_eq!(messages.len(), 3);
        assert!(logs.contains("CSV column coerced to 0"));
        assert!(logs.contains("AnglePitch"));

        let full = "0,0.2,0.1,0,0,0,0,0,0,9.8,0,0,0,0,0,0,0,0,0,0,0,1000,1000,1000,1000,0,1";
        let (_, logs) = debug_logs(|| decode_csv(full));
        assert!(!logs.contains("CSV column coerced to 0"));
    }

    #[test]
    fn test_blank_message_is_ignored() {
        assert!(assert_ok!(decode("   ")).is_empty());
    }

    #[test]
    fn test_encode_mode_command() {
        let text = assert_ok!(encode_command(DeviceCommand::Mode { mode: Mode::Manual }));
        assert_eq!(text, r#"{"type":"command","payload":{"mode":2}}"#);
    }
}
