//! Multivariate tensor-product B-splines: least-squares fitting over
//! scattered samples, value and gradient evaluation, knot refinement, and
//! exact domain reduction.
//!
//! The central type is [`Spline`], built with [`Spline::fit`] from an
//! `nsamples x d` point matrix and a value vector. Each dimension carries its
//! own clamped [`KnotVector`]; the multivariate basis is their tensor
//! product, managed by [`TensorBasis`]. [`reduce`](Spline::reduce_domain) and
//! [`bisect_domains`] restrict a fitted spline to sub-boxes exactly, without
//! refitting.

mod basis;
mod error;
mod faer_ndarray;
mod knots;
mod reduce;
mod spline;
mod tensor;

pub use basis::{BasisScratch, eval_derivative_nonzero_into, eval_nonzero_into};
pub use error::SplineError;
pub use faer_ndarray::LinalgError;
pub use knots::{KnotInsertionMap, KnotVector};
pub use reduce::{SplitConfig, bisect_domains, reduce};
pub use spline::{BasisType, Spline};
pub use tensor::TensorBasis;
