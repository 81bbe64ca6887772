// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Text ↔ value conversion for the primitive kinds.
//!
//! Writes entered as text are parsed into the kind the node already holds:
//! read the node first, then [`parse_like`] the current value.
//!
//! | Kind       | Accepted text                                    |
//! |------------|--------------------------------------------------|
//! | Boolean    | `true`/`false`, `1`/`0`, `yes`/`no`, `on`/`off`  |
//! | Int16..    | decimal integers in range                        |
//! | Float      | decimal or scientific notation                   |
//! | String     | any text, unchanged                              |
//! | DateTime   | RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC  |
//!
//! # Examples
//!
//! ```
//! use bhs_opcua::client::conversion::{format_value, parse_value};
//! use bhs_opcua::client::OpcUaValue;
//! use bhs_opcua::types::OpcUaDataType;
//!
//! let value = parse_value(" 100 ", OpcUaDataType::Int32).unwrap();
//! assert_eq!(value, OpcUaValue::Int32(100));
//! assert_eq!(format_value(&value), "100");
//! assert!(parse_value("70000", OpcUaDataType::Int16).is_err());
//! ```

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{ConversionError, OpcUaError, OpcUaResult};
use crate::types::OpcUaDataType;

use super::transport::OpcUaValue;

const NAIVE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses `text` as a value of `data_type`.
pub fn parse_value(text: &str, data_type: OpcUaDataType) -> OpcUaResult<OpcUaValue> {
    match data_type {
        OpcUaDataType::Boolean => parse_bool(text).map(OpcUaValue::Boolean),
        OpcUaDataType::Int16 => parse_number(text, data_type).map(OpcUaValue::Int16),
        OpcUaDataType::UInt16 => parse_number(text, data_type).map(OpcUaValue::UInt16),
        OpcUaDataType::Int32 => parse_number(text, data_type).map(OpcUaValue::Int32),
        OpcUaDataType::UInt32 => parse_number(text, data_type).map(OpcUaValue::UInt32),
        OpcUaDataType::Float => parse_number(text, data_type).map(OpcUaValue::Float),
        OpcUaDataType::String => Ok(OpcUaValue::String(text.to_string())),
        OpcUaDataType::DateTime => parse_datetime(text).map(OpcUaValue::DateTime),
    }
}

/// Parses `text` as a value of the same kind as `current`.
///
/// Fails with `UnsupportedType` when `current` is null, since a null value
/// carries no kind to parse into.
pub fn parse_like(text: &str, current: &OpcUaValue) -> OpcUaResult<OpcUaValue> {
    match current {
        OpcUaValue::Byte(_) => parse_number(text, "Byte").map(OpcUaValue::Byte),
        OpcUaValue::Null => Err(OpcUaError::conversion(ConversionError::unsupported_type(
            "Null",
        ))),
        other => match other.data_type() {
            Some(data_type) => parse_value(text, data_type),
            None => Err(OpcUaError::conversion(ConversionError::unsupported_type(
                "Unknown",
            ))),
        },
    }
}

/// Formats `value` the way [`parse_value`] reads it back.
pub fn format_value(value: &OpcUaValue) -> String {
    match value {
        OpcUaValue::DateTime(v) => v.to_rfc3339(),
        OpcUaValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_bool(text: &str) -> OpcUaResult<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(OpcUaError::conversion(ConversionError::parse_failed(
            OpcUaDataType::Boolean,
            text,
            "expected true/false, 1/0, yes/no or on/off",
        ))),
    }
}

fn parse_number<T>(text: &str, kind: impl std::fmt::Display) -> OpcUaResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    text.trim()
        .parse::<T>()
        .map_err(|e| OpcUaError::conversion(ConversionError::parse_failed(kind, text, e)))
}

fn parse_datetime(text: &str) -> OpcUaResult<DateTime<Utc>> {
    let trimmed = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, NAIVE_DATETIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            OpcUaError::conversion(ConversionError::parse_failed(
                OpcUaDataType::DateTime,
                text,
                e,
            ))
        })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_bool() {
        for text in ["true", "TRUE", " 1", "yes", "On"] {
            assert_eq!(parse_value(text, OpcUaDataType::Boolean).unwrap(), OpcUaValue::Boolean(true));
        }
        for text in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_value(text, OpcUaDataType::Boolean).unwrap(), OpcUaValue::Boolean(false));
        }
        assert!(parse_value("maybe", OpcUaDataType::Boolean).is_err());
    }

    #[test]
    fn test_parse_integers_in_range() {
        assert_eq!(parse_value("-32768", OpcUaDataType::Int16).unwrap(), OpcUaValue::Int16(i16::MIN));
        assert_eq!(parse_value("65535", OpcUaDataType::UInt16).unwrap(), OpcUaValue::UInt16(u16::MAX));
        assert_eq!(parse_value("-1", OpcUaDataType::Int32).unwrap(), OpcUaValue::Int32(-1));
        assert_eq!(parse_value("4294967295", OpcUaDataType::UInt32).unwrap(), OpcUaValue::UInt32(u32::MAX));

        assert!(parse_value("-1", OpcUaDataType::UInt16).is_err());
        assert!(parse_value("1.5", OpcUaDataType::Int32).is_err());
    }

    #[test]
    fn test_parse_float_and_string() {
        assert_eq!(parse_value("2.5e1", OpcUaDataType::Float).unwrap(), OpcUaValue::Float(25.0));
        assert_eq!(
            parse_value("  spaced  ", OpcUaDataType::String).unwrap(),
            OpcUaValue::String("  spaced  ".to_string())
        );
    }

    #[test]
    fn test_parse_datetime() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            parse_value("2024-03-01T14:30:00+02:00", OpcUaDataType::DateTime).unwrap(),
            OpcUaValue::DateTime(expected)
        );
        assert_eq!(
            parse_value("2024-03-01 12:30:00", OpcUaDataType::DateTime).unwrap(),
            OpcUaValue::DateTime(expected)
        );
        assert!(parse_value("yesterday", OpcUaDataType::DateTime).is_err());
    }

    #[test]
    fn test_parse_error_names_kind() {
        let err = parse_value("abc", OpcUaDataType::Int32).unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Conversion(ConversionError::ParseFailed { ref data_type, .. }) if data_type == "Int32"
        ));
    }

    #[test]
    fn test_parse_like_current_kind() {
        assert_eq!(parse_like("7", &OpcUaValue::UInt16(1)).unwrap(), OpcUaValue::UInt16(7));
        assert_eq!(parse_like("3", &OpcUaValue::Byte(0)).unwrap(), OpcUaValue::Byte(3));
        assert!(parse_like("7", &OpcUaValue::Null).is_err());
    }

    #[test]
    fn test_format_value() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(format_value(&OpcUaValue::DateTime(at)), "2024-03-01T12:30:00+00:00");
        assert_eq!(format_value(&OpcUaValue::Boolean(true)), "true");
        assert_eq!(format_value(&OpcUaValue::Null), "");
        assert_eq!(
            parse_value(&format_value(&OpcUaValue::Float(1.25)), OpcUaDataType::Float).unwrap(),
            OpcUaValue::Float(1.25)
        );
    }
}
