//! Request validators and reusable validation rules.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub field: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every failure reported by every validator of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    failures: Vec<ValidationFailure>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.failures.push(ValidationFailure::new(field, message));
    }

    /// Records the outcome of a rule.
    pub fn check(&mut self, outcome: Result<(), ValidationFailure>) -> &mut Self {
        if let Err(failure) = outcome {
            self.failures.push(failure);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn failures(&self) -> &[ValidationFailure] {
        &self.failures
    }

    /// Returns the failures reported against `field`.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationFailure> {
        self.failures.iter().filter(move |f| f.field == field)
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl Extend<ValidationFailure> for ValidationErrors {
    fn extend<I: IntoIterator<Item = ValidationFailure>>(&mut self, iter: I) {
        self.failures.extend(iter);
    }
}

/// Checks a request and appends any failures.
///
/// Validators must be pure. All validators of a request run, so a
/// validator should not assume an earlier one passed.
pub trait Validator<R>: Send + Sync {
    fn validate(&self, request: &R, errors: &mut ValidationErrors);
}

impl<R, F> Validator<R> for F
where
    F: Fn(&R, &mut ValidationErrors) + Send + Sync,
{
    fn validate(&self, request: &R, errors: &mut ValidationErrors) {
        self(request, errors)
    }
}

/// Reusable field rules. Each returns `Err` with a ready-made failure.
pub mod rules {
    use std::fmt::Display;

    use common::AggregateId;

    use super::ValidationFailure;

    pub fn not_blank(field: &str, value: &str) -> Result<(), ValidationFailure> {
        if value.trim().is_empty() {
            return Err(ValidationFailure::new(field, "must not be blank"));
        }
        Ok(())
    }

    /// Length is counted in characters, not bytes.
    pub fn max_length(field: &str, value: &str, max: usize) -> Result<(), ValidationFailure> {
        if value.chars().count() > max {
            return Err(ValidationFailure::new(
                field,
                format!("must be at most {max} characters"),
            ));
        }
        Ok(())
    }

    pub fn min_length(field: &str, value: &str, min: usize) -> Result<(), ValidationFailure> {
        if value.chars().count() < min {
            return Err(ValidationFailure::new(
                field,
                format!("must be at least {min} characters"),
            ));
        }
        Ok(())
    }

    /// Inclusive on both ends.
    pub fn in_range<T>(field: &str, value: T, min: T, max: T) -> Result<(), ValidationFailure>
    where
        T: PartialOrd + Display,
    {
        if value < min || value > max {
            return Err(ValidationFailure::new(
                field,
                format!("must be between {min} and {max}"),
            ));
        }
        Ok(())
    }

    pub fn not_nil_id(field: &str, id: AggregateId) -> Result<(), ValidationFailure> {
        if id.is_nil() {
            return Err(ValidationFailure::new(field, "must be a valid id"));
        }
        Ok(())
    }
}
