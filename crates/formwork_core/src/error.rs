//! Error types for formwork_core
//!
//! Two kinds of failure exist in a form:
//!
//! - [`DecodeError`]: a structural mismatch against the schema. Raised by the
//!   bulk operations (`set_strict`, `get_strict`) and always returned to the
//!   caller.
//! - Per-field validation failures. These are data, not errors: they are
//!   recorded as [`ErrorState::Invalid`](crate::state::ErrorState) in the
//!   field state and never surface as `Err`.

use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;

/// A single decode problem, located by field path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeIssue {
    /// Field path (`""` for the record itself)
    pub path: String,
    /// Name of the type the decoder expected
    pub expected: String,
    /// Human readable description
    pub message: String,
}

impl DecodeIssue {
    pub fn new(
        path: impl Into<String>,
        expected: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DecodeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} (expected {})", self.message, self.expected)
        } else {
            write!(f, "{}: {} (expected {})", self.path, self.message, self.expected)
        }
    }
}

/// Structural decode failure, carrying every issue found
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeError {
    issues: SmallVec<[DecodeIssue; 2]>,
}

impl DecodeError {
    /// Create an error with a single issue at the root path
    pub fn new(expected: impl Into<String>, message: impl Into<String>) -> Self {
        Self::from_issue(DecodeIssue::new("", expected, message))
    }

    pub fn from_issue(issue: DecodeIssue) -> Self {
        let mut issues = SmallVec::new();
        issues.push(issue);
        Self { issues }
    }

    /// Collect issues into one error, `None` if there are none
    pub fn from_issues(issues: impl IntoIterator<Item = DecodeIssue>) -> Option<Self> {
        let issues: SmallVec<[DecodeIssue; 2]> = issues.into_iter().collect();
        if issues.is_empty() {
            None
        } else {
            Some(Self { issues })
        }
    }

    /// Re-root every issue under `field`
    pub fn at_field(mut self, field: &str) -> Self {
        for issue in &mut self.issues {
            issue.path = if issue.path.is_empty() {
                field.to_string()
            } else {
                format!("{field}.{}", issue.path)
            };
        }
        self
    }

    pub fn issues(&self) -> &[DecodeIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<DecodeIssue> {
        self.issues.into_vec()
    }

    /// Field paths that failed, in the order they were reported
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().map(|issue| issue.path.as_str())
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decode error: ")?;
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DecodeError {}

/// Errors returned by form controller operations
#[derive(Error, Debug)]
pub enum FormError {
    /// Value did not match the schema
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The form has no state yet (`set` was never called and no `init` was given)
    #[error("form `{0}` has not been initialized")]
    NotInitialized(String),

    /// Field name is not declared by the schema
    #[error("unknown field `{0}`")]
    UnknownField(String),

    /// Strictly decoded record could not be converted to or from the typed record
    #[error("record conversion failed: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// Form options could not be parsed
    #[error("invalid form options: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type for formwork_core operations
pub type Result<T> = std::result::Result<T, FormError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_field_prefixes_paths() {
        let err = DecodeError::new("integer", "not an integer").at_field("age");
        assert_eq!(err.issues()[0].path, "age");

        let nested = err.at_field("person");
        assert_eq!(nested.issues()[0].path, "person.age");
    }

    #[test]
    fn test_from_issues_empty_is_none() {
        assert!(DecodeError::from_issues(Vec::new()).is_none());
    }

    #[test]
    fn test_display_lists_every_issue() {
        let err = DecodeError::from_issues(vec![
            DecodeIssue::new("age", "integer", "missing required value"),
            DecodeIssue::new("name", "string", "expected a string"),
        ])
        .unwrap();
        let text = err.to_string();
        assert!(text.contains("age: missing required value"));
        assert!(text.contains("name: expected a string"));
    }
}
