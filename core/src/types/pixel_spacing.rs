use crate::error::{Result, RetinaError};
use regex::Regex;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::fmt;
use std::sync::OnceLock;

/// Pixel spacing in millimeters (row, column)
///
/// Serialized as a two-element list, matching the order of the
/// DICOM PixelSpacing attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSpacing {
    pub row: f64,
    pub col: f64,
}

impl PixelSpacing {
    pub fn new(row: f64, col: f64) -> Self {
        Self { row, col }
    }

    /// Builds spacing from decoded multi-valued tag numbers
    ///
    /// A single value is applied to both axes.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        match values {
            [row, col, ..] => Some(Self::new(*row, *col)),
            [both] => Some(Self::new(*both, *both)),
            [] => None,
        }
    }

    /// Parses pixel spacing from a tag string
    ///
    /// Accepts `0.1\0.1`, `0.1 0.1`, `[0.1, 0.1]` and exponential notation.
    ///
    /// # Errors
    ///
    /// Returns [`RetinaError::InvalidValue`] unless two numbers are found
    pub fn parse(s: &str) -> Result<Self> {
        static REGEX: OnceLock<Regex> = OnceLock::new();
        let re = REGEX.get_or_init(|| {
            Regex::new(r"[-+]?\d*\.?\d+(?:[eE][-+]?\d+)?").expect("Failed to compile regex")
        });

        let numbers: Vec<f64> = re
            .find_iter(s)
            .take(2)
            .map(|m| m.as_str().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| RetinaError::InvalidValue(format!("PixelSpacing '{}': {}", s, e)))?;

        match numbers.as_slice() {
            [row, col] => Ok(Self::new(*row, *col)),
            _ => Err(RetinaError::InvalidValue(format!(
                "Failed to parse PixelSpacing from '{}'",
                s
            ))),
        }
    }
}

impl Serialize for PixelSpacing {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&self.row)?;
        seq.serialize_element(&self.col)?;
        seq.end()
    }
}

impl fmt::Display for PixelSpacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {} mm", self.row, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0.1\\0.1", 0.1, 0.1)]
    #[case("0.0114 0.0039", 0.0114, 0.0039)]
    #[case("[0.1, 0.2]", 0.1, 0.2)]
    #[case("1.5e-1\\1.5e+1", 0.15, 15.0)]
    fn test_parse(#[case] input: &str, #[case] row: f64, #[case] col: f64) {
        let ps = PixelSpacing::parse(input).unwrap();
        assert_eq!(ps, PixelSpacing::new(row, col));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(PixelSpacing::parse("invalid").is_err());
        assert!(PixelSpacing::parse("").is_err());
        assert!(PixelSpacing::parse("0.1").is_err());
    }

    #[test]
    fn test_from_values() {
        assert_eq!(PixelSpacing::from_values(&[0.2]), Some(PixelSpacing::new(0.2, 0.2)));
        assert_eq!(PixelSpacing::from_values(&[0.2, 0.3, 9.0]), Some(PixelSpacing::new(0.2, 0.3)));
        assert_eq!(PixelSpacing::from_values(&[]), None);
    }

    #[test]
    fn test_serializes_as_list() {
        let json = serde_json::to_string(&PixelSpacing::new(0.5, 0.25)).unwrap();
        assert_eq!(json, "[0.5,0.25]");
    }
}
