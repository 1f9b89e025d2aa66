//! Boundary validation for request bodies. Collects every failing field
//! before rejecting so callers see all problems in one response.

use crate::error::{AppError, FieldError, Result};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn positive(&mut self, field: &str, value: f64) {
        if !value.is_finite() || value <= 0.0 {
            self.push(field, "must be a positive number");
        }
    }

    pub fn non_negative(&mut self, field: &str, value: f64) {
        if !value.is_finite() || value < 0.0 {
            self.push(field, "must be zero or greater");
        }
    }

    pub fn non_empty(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(field, "cannot be empty");
        }
    }

    /// Loose shape check: one `@`, non-empty local part, dotted domain.
    pub fn email(&mut self, field: &str, value: &str) {
        let valid = match value.trim().split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
        if !valid {
            self.push(field, "must be a valid email address");
        }
    }

    pub fn finish(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(result: Result<()>) -> Vec<String> {
        match result {
            Err(AppError::Validation(errors)) => errors.into_iter().map(|e| e.field).collect(),
            Err(other) => panic!("expected validation error, got {other}"),
            Ok(()) => Vec::new(),
        }
    }

    #[test]
    fn collects_every_failure() {
        let mut errors = FieldErrors::new();
        errors.positive("price", 0.0);
        errors.non_negative("cost", -1.0);
        errors.non_empty("location", "   ");
        assert_eq!(fields(errors.finish()), vec!["price", "cost", "location"]);
    }

    #[test]
    fn rejects_non_finite_numbers() {
        let mut errors = FieldErrors::new();
        errors.positive("price", f64::NAN);
        errors.positive("size", f64::INFINITY);
        assert_eq!(fields(errors.finish()).len(), 2);
    }

    #[test]
    fn zero_is_non_negative() {
        let mut errors = FieldErrors::new();
        errors.non_negative("cost", 0.0);
        assert!(errors.finish().is_ok());
    }

    #[test]
    fn email_shapes() {
        for ok in ["dev@example.com", "a.b@houston.tx.us"] {
            let mut errors = FieldErrors::new();
            errors.email("email", ok);
            assert!(errors.finish().is_ok(), "{ok} should pass");
        }
        for bad in ["", "no-at-sign", "@example.com", "a@b", "a@@b.com", "a@.com"] {
            let mut errors = FieldErrors::new();
            errors.email("email", bad);
            assert!(errors.finish().is_err(), "{bad} should fail");
        }
    }
}
