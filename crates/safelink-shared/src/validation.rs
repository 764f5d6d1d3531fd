//! Request validation that reports every violated constraint at once.
//!
//! A [`Validator`] accumulates [`Violation`]s while a request is inspected;
//! [`Validator::finish`] turns them into a single [`ValidationErrors`] so the
//! caller sees the whole list in one round trip instead of fixing fields one
//! at a time.

use std::fmt;

use serde::Serialize;

/// One violated constraint on one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

/// All constraints violated by a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    violations: Vec<Violation>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a list holding exactly one violation.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Returns `true` if any violation concerns `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", v.field, v.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Accumulates violations for one request.
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: impl Into<String>) -> &mut Self {
        if !ok {
            self.errors.push(field, message);
        }
        self
    }

    pub fn latitude(&mut self, field: &str, value: f64) -> &mut Self {
        self.check(
            value.is_finite() && (-90.0..=90.0).contains(&value),
            field,
            "must be a number between -90 and 90",
        )
    }

    pub fn longitude(&mut self, field: &str, value: f64) -> &mut Self {
        self.check(
            value.is_finite() && (-180.0..=180.0).contains(&value),
            field,
            "must be a number between -180 and 180",
        )
    }

    pub fn finite(&mut self, field: &str, value: Option<f64>) -> &mut Self {
        match value {
            Some(v) => self.check(v.is_finite(), field, "must be a finite number"),
            None => self,
        }
    }

    pub fn non_negative(&mut self, field: &str, value: Option<f64>) -> &mut Self {
        match value {
            Some(v) => self.check(v.is_finite() && v >= 0.0, field, "must be zero or greater"),
            None => self,
        }
    }

    /// Optional text no longer than `max` characters.
    pub fn max_chars(&mut self, field: &str, value: Option<&str>, max: usize) -> &mut Self {
        match value {
            Some(s) => self.check(
                s.chars().count() <= max,
                field,
                format!("must be at most {max} characters"),
            ),
            None => self,
        }
    }

    /// Required text whose trimmed length lies in `min..=max` characters.
    pub fn chars_between(&mut self, field: &str, value: &str, min: usize, max: usize) -> &mut Self {
        let len = value.trim().chars().count();
        self.check(
            (min..=max).contains(&len),
            field,
            format!("must be between {min} and {max} characters"),
        )
    }

    /// Record a violation for a field that was absent or unparsable.
    pub fn missing(&mut self, field: &str) -> &mut Self {
        self.errors.push(field, "is required");
        self
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        self.errors.push(field, message);
        self
    }

    /// Fold another validator's findings into this one.
    pub fn merge(&mut self, other: ValidationErrors) -> &mut Self {
        self.errors.violations.extend(other.violations);
        self
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Everything recorded so far, for callers that already know the
    /// request is rejected.
    pub fn into_errors(self) -> ValidationErrors {
        self.errors
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}
