use serde::Serialize;
use std::fmt;

/// DICOM ImageType attribute split into its components
///
/// - `pixels`: first value (e.g. "ORIGINAL", "DERIVED")
/// - `exam`: second value (e.g. "PRIMARY", "SECONDARY")
/// - `extras`: remaining values, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageType {
    pub pixels: String,
    pub exam: String,
    pub extras: Vec<String>,
}

impl ImageType {
    /// Builds the image type from the attribute's ordered values
    ///
    /// Returns `None` when the attribute holds no values.
    pub fn from_values<S: AsRef<str>>(values: &[S]) -> Option<Self> {
        let mut iter = values.iter().map(|v| v.as_ref().trim().to_string());
        let pixels = iter.next()?;
        let exam = iter.next().unwrap_or_default();
        Some(Self {
            pixels,
            exam,
            extras: iter.collect(),
        })
    }

    /// Returns the `|`-joined representation
    ///
    /// Empty trailing values are dropped.
    pub fn simple_repr(&self) -> String {
        let mut parts: Vec<&str> = vec![self.pixels.as_str(), self.exam.as_str()];
        parts.extend(self.extras.iter().map(String::as_str));
        while parts.last().is_some_and(|p| p.is_empty()) {
            parts.pop();
        }
        parts.join("|")
    }

    /// True for images derived from other images (e.g. projections, en-face maps)
    pub fn is_derived(&self) -> bool {
        self.pixels == "DERIVED"
    }
}

impl Serialize for ImageType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.simple_repr())
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.simple_repr())
    }
}
