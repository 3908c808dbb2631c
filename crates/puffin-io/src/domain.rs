//! Domain types for puffin-io.

use std::collections::HashSet;
use std::fmt;

use crate::IoError;

/// An ordered, validated list of track field names.
///
/// Position 0 is the label field; the rest are features. Names must be
/// non-empty printable ASCII without quotes or backslashes so they can be
/// written verbatim into a `.npy` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldList(Vec<String>);

impl FieldList {
    /// Validate a field list.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::EmptyFieldList`] | `names` is empty |
    /// | [`IoError::InvalidFieldName`] | a name is empty or has forbidden characters |
    /// | [`IoError::DuplicateField`] | a name appears twice |
    pub fn new(names: Vec<String>) -> Result<Self, IoError> {
        if names.is_empty() {
            return Err(IoError::EmptyFieldList);
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !is_valid_name(name) {
                return Err(IoError::InvalidFieldName { name: name.clone() });
            }
            if !seen.insert(name.as_str()) {
                return Err(IoError::DuplicateField { name: name.clone() });
            }
        }
        Ok(Self(names))
    }

    /// Label field (position 0).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.0[0]
    }

    /// Feature fields (positions 1..).
    #[must_use]
    pub fn features(&self) -> &[String] {
        &self.0[1..]
    }

    /// All names in order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Number of fields, label included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept alongside [`len`](Self::len).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Require a label plus at least one feature.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InsufficientFields`] for a single-field list.
    pub fn require_features(&self) -> Result<(), IoError> {
        if self.0.len() < 2 {
            return Err(IoError::InsufficientFields { count: self.0.len() });
        }
        Ok(())
    }

    /// Iterate over the names in order.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a FieldList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for FieldList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| (c.is_ascii_graphic() || c == ' ') && !matches!(c, '\'' | '"' | '\\'))
}
