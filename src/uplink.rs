// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoder for The Things Network v3 uplink messages.
//!
//! Only two fields of the uplink are interpreted:
//!
//! ```text
//! {
//!   "end_device_ids": { "device_id": "window-1", ... },
//!   "uplink_message": {
//!     "decoded_payload": { "digital": 0, ... },
//!     ...
//!   }
//! }
//! ```
//!
//! # Examples
//!
//! ```
//! use window_watcher::uplink::decode;
//!
//! let payload = br#"{"end_device_ids":{"device_id":"window-1"},
//!                    "uplink_message":{"decoded_payload":{"digital":0}}}"#;
//! let uplink = decode(payload).unwrap();
//! assert_eq!(uplink.device_id, "window-1");
//! assert_eq!(uplink.digital, 0);
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Name of the decoded payload field carrying the contact state.
pub const DIGITAL_FIELD: &str = "digital";

/// A decoded uplink carrying a contact reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uplink {
    /// End device identifier as registered in the TTN application.
    pub device_id: String,
    /// Raw value of the `digital` field (0 = contact open).
    pub digital: i64,
}

#[derive(Debug, Deserialize)]
struct RawUplink {
    end_device_ids: EndDeviceIds,
    uplink_message: UplinkMessage,
}

#[derive(Debug, Deserialize)]
struct EndDeviceIds {
    device_id: String,
}

#[derive(Debug, Deserialize)]
struct UplinkMessage {
    decoded_payload: Map<String, Value>,
}

/// Decodes a raw uplink payload.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedPayload`] if the bytes are not UTF-8 JSON
/// with `end_device_ids.device_id` and `uplink_message.decoded_payload`, or
/// if `digital` is present but not an integer.
///
/// Returns [`DecodeError::NoDigitalField`] if the decoded payload has no
/// (or a `null`) `digital` field.
pub fn decode(raw: &[u8]) -> Result<Uplink, DecodeError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| DecodeError::MalformedPayload(format!("invalid UTF-8: {e}")))?;

    let uplink: RawUplink = serde_json::from_str(text)
        .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;

    let device_id = uplink.end_device_ids.device_id;
    let digital = match uplink.uplink_message.decoded_payload.get(DIGITAL_FIELD) {
        None | Some(Value::Null) => return Err(DecodeError::NoDigitalField { device_id }),
        Some(value) => parse_digital(value).ok_or_else(|| {
            DecodeError::MalformedPayload(format!(
                "{DIGITAL_FIELD} of {device_id} is not an integer: {value}"
            ))
        })?,
    };

    Ok(Uplink { device_id, digital })
}

/// Accepts JSON integers and floats without a fractional part.
fn parse_digital(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    // Above i64::MAX: only its non-zero-ness matters
    if value.as_u64().is_some() {
        return Some(i64::MAX);
    }
    let f = value.as_f64()?;
    if f.fract() != 0.0 || !f.is_finite() || f.abs() > 9.0e15 {
        return None;
    }
    // Safe: whole number well inside the i64 range
    #[allow(clippy::cast_possible_truncation)]
    Some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uplink_json(device_id: &str, decoded_payload: &str) -> Vec<u8> {
        format!(
            r#"{{"end_device_ids":{{"device_id":"{device_id}","application_ids":{{"application_id":"office"}}}},
                "received_at":"2024-03-01T08:15:00Z",
                "uplink_message":{{"f_port":1,"decoded_payload":{decoded_payload}}}}}"#
        )
        .into_bytes()
    }

    #[test]
    fn decodes_open_contact() {
        let uplink = decode(&uplink_json("window-1", r#"{"digital":0,"battery":3.1}"#)).unwrap();
        assert_eq!(
            uplink,
            Uplink {
                device_id: "window-1".to_string(),
                digital: 0
            }
        );
    }

    #[test]
    fn decodes_closed_contact() {
        let uplink = decode(&uplink_json("window-2", r#"{"digital":1}"#)).unwrap();
        assert_eq!(uplink.digital, 1);
    }

    #[test]
    fn digital_above_i64_range_is_closed() {
        let uplink =
            decode(&uplink_json("window-2", r#"{"digital":18446744073709551615}"#)).unwrap();
        assert_ne!(uplink.digital, 0);
        assert_eq!(
            crate::state::WindowState::from_digital(uplink.digital),
            crate::state::WindowState::Closed
        );
    }

    #[test]
    fn accepts_whole_float() {
        let uplink = decode(&uplink_json("window-2", r#"{"digital":1.0}"#)).unwrap();
        assert_eq!(uplink.digital, 1);
    }

    #[test]
    fn missing_digital_is_no_digital_field() {
        let err = decode(&uplink_json("window-3", r#"{"battery":3.1}"#)).unwrap_err();
        assert_eq!(
            err,
            DecodeError::NoDigitalField {
                device_id: "window-3".to_string()
            }
        );
    }

    #[test]
    fn null_digital_is_no_digital_field() {
        let err = decode(&uplink_json("window-3", r#"{"digital":null}"#)).unwrap_err();
        assert!(matches!(err, DecodeError::NoDigitalField { .. }));
    }

    #[test]
    fn non_integer_digital_is_malformed() {
        for payload in [r#"{"digital":"open"}"#, r#"{"digital":0.5}"#, r#"{"digital":[0]}"#] {
            let err = decode(&uplink_json("window-4", payload)).unwrap_err();
            assert!(
                matches!(err, DecodeError::MalformedPayload(_)),
                "{payload} should be malformed"
            );
        }
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let err = decode(&[0xff, 0xfe, b'{']).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload(_)));
    }

    #[test]
    fn not_json_is_malformed() {
        let err = decode(b"ONLINE").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload(_)));
    }

    #[test]
    fn missing_device_id_is_malformed() {
        let payload =
            br#"{"end_device_ids":{},"uplink_message":{"decoded_payload":{"digital":0}}}"#;
        let err = decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload(_)));
    }

    #[test]
    fn missing_decoded_payload_is_malformed() {
        let payload = br#"{"end_device_ids":{"device_id":"window-1"},"uplink_message":{"f_port":1}}"#;
        let err = decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload(_)));
    }
}
