//! Field-tagged validation failures.

use std::collections::BTreeMap;

use serde::Serialize;

/// A single failed field rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Ordered collection of field failures produced by one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Checks a character-length bound on an already-trimmed value.
    pub fn check_len(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.chars().count();
        if len < min {
            if min <= 1 {
                self.add(field, format!("{field} is required"));
            } else {
                self.add(field, format!("{field} must be at least {min} characters"));
            }
        } else if len > max {
            self.add(field, format!("{field} must be at most {max} characters"));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Field → messages, the shape returned to HTTP clients.
    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for err in &self.0 {
            map.entry(err.field.clone()).or_default().push(err.message.clone());
        }
        map
    }

    /// `Ok(())` when nothing failed, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), crate::DomainError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(crate::DomainError::Validation(self))
        }
    }
}

impl core::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut first = true;
        for err in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            f.write_str(&err.message)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_len_counts_characters_not_bytes() {
        let mut errors = FieldErrors::new();
        // 3 characters, 6 bytes
        errors.check_len("name", "ção", 3, 3);
        assert!(errors.is_empty());
    }

    #[test]
    fn check_len_reports_both_bounds() {
        let mut errors = FieldErrors::new();
        errors.check_len("name", "ab", 3, 10);
        errors.check_len("module", "abcdefghijk", 3, 10);
        let map = errors.to_map();
        assert_eq!(map["name"], vec!["name must be at least 3 characters"]);
        assert_eq!(map["module"], vec!["module must be at most 10 characters"]);
    }

    #[test]
    fn into_result_is_ok_when_empty() {
        assert!(FieldErrors::new().into_result().is_ok());
    }
}
