use crate::faer_ndarray::LinalgError;
use thiserror::Error;

/// A comprehensive error type for all operations in this crate.
///
/// Every failure is reported synchronously at the offending call. A failed
/// fit produces no usable spline and a failed reduction leaves its target
/// untouched; there is no partial-success mode.
#[derive(Error, Debug)]
pub enum SplineError {
    #[error(
        "Coordinate {value} in dimension {dim} lies outside the domain [{lower}, {upper}]."
    )]
    OutOfDomain {
        dim: usize,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("The knot vector is invalid: {0}")]
    InvalidKnotVector(String),

    #[error("The least-squares system could not be solved: {0}")]
    SingularFit(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Linear algebra backend failed: {0}")]
    Linalg(#[from] LinalgError),
}
