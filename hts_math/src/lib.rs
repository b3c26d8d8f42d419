//! # HTS Math
//!
//! Numeric kernels used by the hierarchical sales forecaster.
//! This crate provides the dense linear algebra needed for forecast
//! reconciliation, including the nonnegativity-constrained solve.

use thiserror::Error;

pub mod constrained;
pub mod linalg;

pub use linalg::{cholesky, cholesky_solve, gram, weighted_gram};
pub use constrained::nonnegative_minimize;

/// Errors that can occur in numeric calculations
#[derive(Error, Debug)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Matrix is not positive definite: {0}")]
    NotPositiveDefinite(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numeric operations
pub type Result<T> = std::result::Result<T, MathError>;
