//! Hyperparameter checks shared by the optimizer configurations.
//!
//! Every check returns `GradwiseError::ConfigurationError` naming the
//! offending hyperparameter.

use gradwise_core::GradwiseError;

/// Which ends of an interval are included.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeType {
    /// `[low, high]`
    Closed,
    /// `[low, high)`
    ClosedOpen,
    /// `(low, high]`
    OpenClosed,
    /// `(low, high)`
    Open,
}

/// Side of a one-sided bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundType {
    /// The value must not exceed the boundary.
    Upper,
    /// The value must not fall below the boundary.
    Lower,
}

fn config_error(message: String) -> GradwiseError {
    GradwiseError::ConfigurationError(message)
}

pub fn validate_range(
    x: f64,
    name: &str,
    low: f64,
    high: f64,
    range_type: RangeType,
) -> Result<(), GradwiseError> {
    let ok = match range_type {
        RangeType::Closed => low <= x && x <= high,
        RangeType::ClosedOpen => low <= x && x < high,
        RangeType::OpenClosed => low < x && x <= high,
        RangeType::Open => low < x && x < high,
    };
    if ok {
        return Ok(());
    }
    let (open, close) = match range_type {
        RangeType::Closed => ('[', ']'),
        RangeType::ClosedOpen => ('[', ')'),
        RangeType::OpenClosed => ('(', ']'),
        RangeType::Open => ('(', ')'),
    };
    Err(config_error(format!(
        "{} must be in the range {}{}, {}{}, got {}",
        name, open, low, high, close, x
    )))
}

pub fn validate_boundary(
    x: f64,
    name: &str,
    boundary: f64,
    bound_type: BoundType,
) -> Result<(), GradwiseError> {
    match bound_type {
        BoundType::Upper if x > boundary => Err(config_error(format!(
            "{} must be at most {}, got {}",
            name, boundary, x
        ))),
        BoundType::Lower if x < boundary => Err(config_error(format!(
            "{} must be at least {}, got {}",
            name, boundary, x
        ))),
        _ => Ok(()),
    }
}

pub fn validate_learning_rate(lr: f32) -> Result<(), GradwiseError> {
    if !(lr > 0.0) || !lr.is_finite() {
        return Err(config_error(format!(
            "Learning rate must be positive and finite, got {}",
            lr
        )));
    }
    Ok(())
}

pub fn validate_non_negative(x: f64, name: &str) -> Result<(), GradwiseError> {
    validate_boundary(x, name, 0.0, BoundType::Lower)
}

pub fn validate_positive(x: f64, name: &str) -> Result<(), GradwiseError> {
    if !(x > 0.0) {
        return Err(config_error(format!("{} must be positive, got {}", name, x)));
    }
    Ok(())
}

/// Each beta is an EMA decay and must lie in `[0, 1)`.
pub fn validate_betas(betas: &[f32]) -> Result<(), GradwiseError> {
    for (i, &beta) in betas.iter().enumerate() {
        validate_range(beta as f64, &format!("beta{}", i + 1), 0.0, 1.0, RangeType::ClosedOpen)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "validation_test.rs"]
mod tests;
