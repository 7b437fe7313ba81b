//! Multivariate B-spline fitting and evaluation.
//!
//! A `Spline` pairs a `TensorBasis` with a flat coefficient vector laid out
//! by the basis's row-major strides. Fitting builds the dense design matrix
//! over scattered samples and solves the normal equations with a symmetric
//! factorization; evaluation touches only the `prod (p_i + 1)` active basis
//! functions per point.

use crate::error::SplineError;
use crate::faer_ndarray::solve_symmetric;
use crate::knots::KnotVector;
use crate::reduce;
use crate::tensor::TensorBasis;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis, IxDyn};

/// Basis family selector for fitting. Degrees above one use "free" end
/// conditions: fewer interior knots than sample values, which removes the
/// artificial boundary-derivative constraints of a fully clamped fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BasisType {
    /// Piecewise-linear basis, degree 1.
    Linear,
    /// Quadratic basis with free end conditions, degree 2.
    QuadraticFree,
    /// Cubic basis with free end conditions, degree 3.
    CubicFree,
}

impl BasisType {
    #[inline]
    pub fn degree(&self) -> usize {
        match self {
            BasisType::Linear => 1,
            BasisType::QuadraticFree => 2,
            BasisType::CubicFree => 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Spline {
    pub(crate) basis: TensorBasis,
    pub(crate) coefficients: Array1<f64>,
}

impl Spline {
    /// Fits a tensor-product spline to scattered samples by least squares.
    ///
    /// `points` is `nsamples x d`, `values` has length `nsamples`. Each
    /// dimension's knot vector is derived from the distinct sorted sample
    /// coordinates of that dimension, so a full grid of samples yields an
    /// interpolatory fit.
    pub fn fit(
        points: ArrayView2<'_, f64>,
        values: ArrayView1<'_, f64>,
        basis_type: BasisType,
    ) -> Result<Self, SplineError> {
        let (nsamples, d) = points.dim();
        if values.len() != nsamples {
            return Err(SplineError::DimensionMismatch(format!(
                "{nsamples} sample points but {} values",
                values.len()
            )));
        }
        if nsamples == 0 || d == 0 {
            return Err(SplineError::DimensionMismatch(
                "fitting requires at least one sample with at least one coordinate".to_string(),
            ));
        }

        let degree = basis_type.degree();
        let mut dims = Vec::with_capacity(d);
        for dim in 0..d {
            let mut column: Vec<f64> = points.column(dim).to_vec();
            column.sort_by(f64::total_cmp);
            column.dedup();
            dims.push(KnotVector::from_samples(degree, &column)?);
        }
        let basis = TensorBasis::new(dims)?;

        let total = basis.total_basis();
        if nsamples < total {
            return Err(SplineError::SingularFit(format!(
                "{nsamples} samples cannot determine {total} coefficients"
            )));
        }

        let design = basis.design_matrix(points)?;
        let gram = design.t().dot(&design);
        let rhs = design.t().dot(&values);
        let coefficients = solve_symmetric(&gram, &rhs)?;
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(SplineError::SingularFit(
                "solution contains non-finite coefficients".to_string(),
            ));
        }

        log::debug!(
            "fitted {d}-dimensional degree-{degree} spline: {nsamples} samples, {total} coefficients"
        );
        Ok(Self { basis, coefficients })
    }

    #[inline]
    pub(crate) fn from_parts(basis: TensorBasis, coefficients: Array1<f64>) -> Self {
        debug_assert_eq!(basis.total_basis(), coefficients.len());
        Self { basis, coefficients }
    }

    #[inline]
    pub fn dimensions(&self) -> usize {
        self.basis.dimensions()
    }

    #[inline]
    pub fn basis(&self) -> &TensorBasis {
        &self.basis
    }

    #[inline]
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    /// Lower domain edge in every dimension.
    pub fn domain_lower_bound(&self) -> Vec<f64> {
        (0..self.dimensions())
            .map(|dim| self.basis.knot_vector(dim).lower_bound())
            .collect()
    }

    /// Upper domain edge in every dimension.
    pub fn domain_upper_bound(&self) -> Vec<f64> {
        (0..self.dimensions())
            .map(|dim| self.basis.knot_vector(dim).upper_bound())
            .collect()
    }

    fn check_domain(&self, x: ArrayView1<'_, f64>) -> Result<(), SplineError> {
        let d = self.dimensions();
        if x.len() != d {
            return Err(SplineError::DimensionMismatch(format!(
                "point has {} coordinates, the spline has {d} dimensions",
                x.len()
            )));
        }
        for dim in 0..d {
            let kv = self.basis.knot_vector(dim);
            let (lower, upper) = (kv.lower_bound(), kv.upper_bound());
            if x[dim] < lower || x[dim] > upper {
                return Err(SplineError::OutOfDomain {
                    dim,
                    value: x[dim],
                    lower,
                    upper,
                });
            }
        }
        Ok(())
    }

    /// Evaluates the spline at `x`. Both domain edges are inclusive; the
    /// upper edge takes its one-sided limit.
    pub fn eval(&self, x: ArrayView1<'_, f64>) -> Result<f64, SplineError> {
        self.check_domain(x)?;
        let (indices, values) = self.basis.eval_nonzero(x)?;
        Ok(indices
            .iter()
            .zip(&values)
            .map(|(&flat, &v)| v * self.coefficients[flat])
            .sum())
    }

    /// Evaluates the gradient at `x`, one partial derivative per dimension.
    pub fn eval_jacobian(&self, x: ArrayView1<'_, f64>) -> Result<Array1<f64>, SplineError> {
        self.check_domain(x)?;
        let (indices, rows) = self.basis.eval_jacobian_nonzero(x)?;
        let d = self.dimensions();
        let mut jacobian = Array1::zeros(d);
        for row in 0..d {
            jacobian[row] = indices
                .iter()
                .zip(rows.row(row))
                .map(|(&flat, &v)| v * self.coefficients[flat])
                .sum();
        }
        Ok(jacobian)
    }

    /// Inserts a knot at `x` in dimension `dim`, refining the representation
    /// without changing the spline's values anywhere.
    pub fn insert_knot(&mut self, dim: usize, x: f64) -> Result<(), SplineError> {
        let d = self.dimensions();
        if dim >= d {
            return Err(SplineError::DimensionMismatch(format!(
                "dimension {dim} does not exist in a {d}-dimensional spline"
            )));
        }
        let old_dims = self.basis.num_basis_per_dim();
        let map = self.basis.knot_vector_mut(dim).insert(x).map_err(|err| {
            // The univariate insert does not know which dimension it serves.
            match err {
                SplineError::OutOfDomain {
                    value,
                    lower,
                    upper,
                    ..
                } => SplineError::OutOfDomain {
                    dim,
                    value,
                    lower,
                    upper,
                },
                other => other,
            }
        })?;

        let tensor = self
            .coefficients
            .view()
            .into_shape_with_order(IxDyn(&old_dims))
            .expect("coefficient count must match the basis shape");
        let refined = map.apply_along_axis(tensor, Axis(dim));
        self.coefficients = Array1::from_iter(refined.iter().copied());
        Ok(())
    }

    /// Restricts the spline exactly to the box `[lower, upper]`, which must
    /// lie inside the current domain. On error the spline is left untouched.
    pub fn reduce_domain(&mut self, lower: &[f64], upper: &[f64]) -> Result<(), SplineError> {
        let reduced = reduce::reduce(self, lower, upper)?;
        *self = reduced;
        Ok(())
    }

    /// Structural equality up to a tolerance: same dimension count and
    /// degrees, knot sequences within `tol`, coefficients within `tol`.
    pub fn approx_eq(&self, other: &Spline, tol: f64) -> bool {
        if self.dimensions() != other.dimensions() {
            return false;
        }
        for dim in 0..self.dimensions() {
            let a = self.basis.knot_vector(dim);
            let b = other.basis.knot_vector(dim);
            if a.degree() != b.degree() || a.len() != b.len() {
                return false;
            }
            if a
                .as_view()
                .iter()
                .zip(b.as_view())
                .any(|(x, y)| (x - y).abs() > tol)
            {
                return false;
            }
        }
        self.coefficients.len() == other.coefficients.len()
            && self
                .coefficients
                .iter()
                .zip(&other.coefficients)
                .all(|(a, b)| (a - b).abs() <= tol)
    }
}
