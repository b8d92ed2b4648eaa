use crate::structure::position::cell_reference;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use iso8601_duration::Duration as IsoDuration;
use serde_json::Value;
use thiserror::Error;

/// A single cell value cannot be converted to its JSON representation.
/// Recovered locally: the cell degrades to `null` plus a warning and
/// extraction continues.
#[derive(Error, Debug)]
#[error("invalid cell value at '{position}': {message}")]
pub struct CellConversionError {
    pub position: String,
    pub message: String,
}

/// Style signals a grid source may expose for a cell. Used only as a
/// header-detection hint.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CellStyle {
    pub bold: bool,
    pub filled: bool,
}

/// Typed cell value as reported by a grid source.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    /// ISO 8601 duration literal, as stored by ODS-style sources.
    Duration(String),
    /// Spreadsheet error literal such as `#DIV/0!`.
    Error(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// True for values shaped like tabular data rather than labels.
    pub fn is_data_shaped(&self) -> bool {
        match self {
            Self::Int(_) | Self::Float(_) | Self::Bool(_) => true,
            Self::DateTime(_) | Self::Date(_) | Self::Time(_) | Self::Duration(_) => true,
            Self::Text(text) => crate::structure::metadata::is_numeric_text(text),
            _ => false,
        }
    }

    /// Header-label text for this value, `None` when the cell cannot label a
    /// column.
    pub fn label_text(&self) -> Option<String> {
        match self {
            Self::Text(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_owned())
            }
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Bool(value) => Some(value.to_string()),
            Self::DateTime(value) => Some(value.format("%Y-%m-%dT%H:%M:%S").to_string()),
            Self::Date(value) => Some(value.format("%Y-%m-%d").to_string()),
            Self::Time(value) => Some(value.format("%H:%M:%S").to_string()),
            Self::Duration(value) => Some(value.to_owned()),
            Self::Empty | Self::Error(_) => None,
        }
    }

    /// Converts to the JSON value emitted in records.
    ///
    /// Integral numerics stay integers, non-integral numerics stay floats,
    /// date/time values become naive ISO 8601 strings, formula results arrive
    /// here already computed, and error cells are handled by the caller.
    pub fn to_json(&self, row: u32, col: u32) -> Result<Value, CellConversionError> {
        match self {
            Self::Empty => Ok(Value::Null),
            Self::Bool(value) => Ok(Value::Bool(*value)),
            Self::Int(value) => Ok(Value::from(*value)),
            Self::Float(value) => {
                if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
                    // Integer stored through a float-only source path
                    Ok(Value::from(*value as i64))
                } else {
                    serde_json::Number::from_f64(*value)
                        .map(Value::Number)
                        .ok_or_else(|| CellConversionError {
                            position: cell_reference(row, col),
                            message: format!("non-finite number {}", value),
                        })
                }
            }
            Self::Text(value) => Ok(Value::String(value.to_owned())),
            Self::DateTime(value) => {
                Ok(Value::String(value.format("%Y-%m-%dT%H:%M:%S").to_string()))
            }
            Self::Date(value) => Ok(Value::String(value.format("%Y-%m-%d").to_string())),
            Self::Time(value) => Ok(Value::String(value.format("%H:%M:%S").to_string())),
            Self::Duration(value) => {
                value
                    .parse::<IsoDuration>()
                    .map_err(|_| CellConversionError {
                        position: cell_reference(row, col),
                        message: format!("invalid iso8601 duration '{}'", value),
                    })?;
                Ok(Value::String(value.to_owned()))
            }
            Self::Error(value) => Err(CellConversionError {
                position: cell_reference(row, col),
                message: format!("error cell {}", value),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_never_becomes_float() {
        assert_eq!(CellValue::Int(547).to_json(1, 1).unwrap(), Value::from(547));
        assert_eq!(
            CellValue::Float(547.0).to_json(1, 1).unwrap(),
            Value::from(547)
        );
    }

    #[test]
    fn fractional_float_preserved() {
        assert_eq!(
            CellValue::Float(92.5).to_json(1, 1).unwrap(),
            Value::from(92.5)
        );
    }

    #[test]
    fn text_preserves_embedded_newlines() {
        let value = CellValue::Text("line one\nline two".to_owned());
        assert_eq!(
            value.to_json(1, 1).unwrap(),
            Value::String("line one\nline two".to_owned())
        );
    }

    #[test]
    fn datetime_formats_naive_iso() {
        let datetime = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(
            CellValue::DateTime(datetime).to_json(1, 1).unwrap(),
            Value::String("2024-03-07T09:30:00".to_owned())
        );
    }

    #[test]
    fn error_cell_is_a_conversion_error() {
        let error = CellValue::Error("#DIV/0!".to_owned()).to_json(3, 2).unwrap_err();
        assert_eq!(error.position, "B3");
    }

    #[test]
    fn non_finite_float_is_a_conversion_error() {
        assert!(CellValue::Float(f64::NAN).to_json(1, 1).is_err());
    }

    #[test]
    fn duration_keeps_literal() {
        assert_eq!(
            CellValue::Duration("PT1H30M".to_owned()).to_json(1, 1).unwrap(),
            Value::String("PT1H30M".to_owned())
        );
        assert!(CellValue::Duration("90 minutes".to_owned()).to_json(1, 1).is_err());
    }
}
