//! Option checks shared by every command builder.
//!
//! Builders hold loosely typed `Option<_>` fields while they are being filled
//! in; `build()` runs them through these helpers so that a command is only ever
//! constructed from a complete, well-formed option set. Each kind also
//! publishes an [`OptionSpec`] table describing which options it recognizes and
//! which of them are required or defaulted.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    Missing,
    Empty,
    Invalid { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn missing(field: &'static str) -> Self {
        Self {
            field,
            kind: ValidationErrorKind::Missing,
        }
    }

    pub fn empty(field: &'static str) -> Self {
        Self {
            field,
            kind: ValidationErrorKind::Empty,
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            kind: ValidationErrorKind::Invalid {
                reason: reason.into(),
            },
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ValidationErrorKind::Missing => write!(f, "{} is required", self.field),
            ValidationErrorKind::Empty => write!(f, "{} must not be empty", self.field),
            ValidationErrorKind::Invalid { reason } => {
                write!(f, "invalid {}: {reason}", self.field)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
    Default(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub requirement: Requirement,
}

impl OptionSpec {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            requirement: Requirement::Required,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            requirement: Requirement::Optional,
        }
    }

    pub const fn defaulted(name: &'static str, default: &'static str) -> Self {
        Self {
            name,
            requirement: Requirement::Default(default),
        }
    }
}

/// Options every kind accepts in addition to its own.
pub const GENERIC_OPTIONS: &[OptionSpec] = &[
    OptionSpec::required("callback"),
    OptionSpec::defaulted("max_retries", "per-kind retry budget"),
];

pub fn require<T>(field: &'static str, value: Option<T>) -> Result<T, ValidationError> {
    value.ok_or_else(|| ValidationError::missing(field))
}

pub fn require_non_empty(
    field: &'static str,
    value: Option<String>,
) -> Result<String, ValidationError> {
    let value = require(field, value)?;
    if value.is_empty() {
        return Err(ValidationError::empty(field));
    }
    Ok(value)
}

/// Rejects an explicitly provided empty string; `None` stays `None`.
pub fn optional_non_empty(
    field: &'static str,
    value: Option<String>,
) -> Result<Option<String>, ValidationError> {
    match value {
        Some(v) if v.is_empty() => Err(ValidationError::empty(field)),
        other => Ok(other),
    }
}

pub fn non_empty_list<T>(field: &'static str, values: Vec<T>) -> Result<Vec<T>, ValidationError> {
    if values.is_empty() {
        return Err(ValidationError::empty(field));
    }
    Ok(values)
}

pub fn positive_timeout(timeout_ms: Option<u32>) -> Result<Option<u32>, ValidationError> {
    match timeout_ms {
        Some(0) => Err(ValidationError::invalid("timeout", "must be greater than 0 ms")),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn messages_name_the_field() {
        assert_eq!(
            ValidationError::missing("callback").to_string(),
            "callback is required"
        );
        assert_eq!(
            ValidationError::empty("table").to_string(),
            "table must not be empty"
        );
        assert_eq!(
            ValidationError::invalid("timeout", "must be greater than 0 ms").to_string(),
            "invalid timeout: must be greater than 0 ms"
        );
    }

    #[test]
    fn require_non_empty_distinguishes_missing_from_empty() {
        assert_eq!(
            require_non_empty("bucket", None).unwrap_err(),
            ValidationError::missing("bucket")
        );
        assert_eq!(
            require_non_empty("bucket", Some(String::new())).unwrap_err(),
            ValidationError::empty("bucket")
        );
        assert_eq!(
            require_non_empty("bucket", Some("b".to_string())).unwrap(),
            "b"
        );
    }

    #[test]
    fn optional_fields_keep_absence() {
        assert_eq!(optional_non_empty("key", None).unwrap(), None);
        assert!(optional_non_empty("key", Some(String::new())).is_err());
        assert_eq!(positive_timeout(None).unwrap(), None);
        assert_eq!(positive_timeout(Some(5)).unwrap(), Some(5));
        assert!(positive_timeout(Some(0)).is_err());
    }
}
