//! Knot vector management for one dimension.
//!
//! A `KnotVector` owns the non-decreasing breakpoint sequence of a single
//! dimension in clamped (open) form: boundary knots repeated `degree + 1`
//! times, interior multiplicity at most `degree`. Refinement by single-knot
//! insertion returns the sparse coefficient map that keeps the represented
//! function unchanged; that map is the basis of exact domain reduction.

use crate::error::SplineError;
use ndarray::{Array1, ArrayD, ArrayView1, ArrayViewD, Axis, Zip, s};

#[derive(Clone, Debug)]
pub struct KnotVector {
    degree: usize,
    knots: Array1<f64>,
}

impl KnotVector {
    /// Builds a knot vector from an explicit sequence, validating the
    /// clamped-form invariants.
    pub fn new(degree: usize, knots: Array1<f64>) -> Result<Self, SplineError> {
        if degree < 1 {
            return Err(SplineError::InvalidKnotVector(
                "degree must be at least 1".to_string(),
            ));
        }
        let order = degree + 1;
        if knots.len() < 2 * order {
            return Err(SplineError::InvalidKnotVector(format!(
                "degree {} requires at least {} knots, got {}",
                degree,
                2 * order,
                knots.len()
            )));
        }
        if knots.iter().any(|k| !k.is_finite()) {
            return Err(SplineError::InvalidKnotVector(
                "knot vector contains non-finite values".to_string(),
            ));
        }
        for i in 0..knots.len() - 1 {
            if knots[i] > knots[i + 1] {
                return Err(SplineError::InvalidKnotVector(
                    "knot vector is not non-decreasing".to_string(),
                ));
            }
        }
        if knots[0] != knots[degree] || knots[degree] == knots[order] {
            return Err(SplineError::InvalidKnotVector(format!(
                "first knot must have multiplicity exactly {order}"
            )));
        }
        let m = knots.len();
        if knots[m - 1] != knots[m - order] || knots[m - order] == knots[m - order - 1] {
            return Err(SplineError::InvalidKnotVector(format!(
                "last knot must have multiplicity exactly {order}"
            )));
        }
        // Interior multiplicity must stay below the order.
        let mut run = 1usize;
        for i in order..m - order {
            if knots[i] == knots[i - 1] {
                run += 1;
            } else {
                run = 1;
            }
            if run > degree {
                return Err(SplineError::InvalidKnotVector(format!(
                    "interior knot {} exceeds maximum multiplicity {}",
                    knots[i], degree
                )));
            }
        }

        Ok(Self { degree, knots })
    }

    /// Builds the "free" end-condition knot vector from the distinct sorted
    /// sample coordinates of one dimension.
    ///
    /// Boundary values are clamped to multiplicity `degree + 1`; the interior
    /// knots are the remaining sample values with `floor((p-1)/2)` dropped
    /// after the lower end and `ceil((p-1)/2)` before the upper end, so the
    /// basis count equals the distinct-sample count and gridded fits are
    /// interpolatory.
    pub fn from_samples(degree: usize, values: &[f64]) -> Result<Self, SplineError> {
        if degree < 1 {
            return Err(SplineError::InvalidKnotVector(
                "degree must be at least 1".to_string(),
            ));
        }
        let k = values.len();
        if k < degree + 1 {
            return Err(SplineError::InvalidKnotVector(format!(
                "degree {} needs at least {} distinct sample values, got {}",
                degree,
                degree + 1,
                k
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SplineError::InvalidKnotVector(
                "sample values contain non-finite values".to_string(),
            ));
        }
        for i in 0..k - 1 {
            if values[i] >= values[i + 1] {
                return Err(SplineError::InvalidKnotVector(
                    "sample values must be strictly increasing".to_string(),
                ));
            }
        }

        let drop_front = (degree - 1) / 2;
        let drop_back = degree - 1 - drop_front;
        let mut knots = Vec::with_capacity(k + degree + 1);
        for _ in 0..=degree {
            knots.push(values[0]);
        }
        knots.extend_from_slice(&values[1 + drop_front..k - 1 - drop_back]);
        for _ in 0..=degree {
            knots.push(values[k - 1]);
        }

        Self::new(degree, Array1::from_vec(knots))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.knots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.knots.is_empty()
    }

    #[inline]
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Number of basis functions defined on this vector.
    #[inline]
    pub fn num_basis(&self) -> usize {
        self.knots.len() - self.degree - 1
    }

    /// First distinct knot, the lower edge of the represented domain.
    #[inline]
    pub fn lower_bound(&self) -> f64 {
        self.knots[0]
    }

    /// Last distinct knot, the upper edge of the represented domain.
    #[inline]
    pub fn upper_bound(&self) -> f64 {
        self.knots[self.knots.len() - 1]
    }

    #[inline]
    pub fn as_view(&self) -> ArrayView1<'_, f64> {
        self.knots.view()
    }

    /// Exact-match multiplicity of `x` in the sequence.
    pub fn multiplicity(&self, x: f64) -> usize {
        self.knots.iter().filter(|&&t| t == x).count()
    }

    /// Inserts `x` once, refining the vector without changing the function it
    /// represents. Returns the sparse map expressing the refined coefficients
    /// in terms of the old ones (Boehm's algorithm): evaluating old basis and
    /// coefficients or new basis and mapped coefficients gives identical
    /// values everywhere in the domain, up to rounding.
    pub fn insert(&mut self, x: f64) -> Result<KnotInsertionMap, SplineError> {
        let (lower, upper) = (self.lower_bound(), self.upper_bound());
        if x < lower || x > upper {
            return Err(SplineError::OutOfDomain {
                dim: 0,
                value: x,
                lower,
                upper,
            });
        }
        let p = self.degree;
        if self.multiplicity(x) > p {
            return Err(SplineError::InvalidKnotVector(format!(
                "knot {x} already has the maximum multiplicity {}",
                p + 1
            )));
        }

        let old_n = self.num_basis();
        let mu = self
            .knots
            .iter()
            .rposition(|&t| t <= x)
            .expect("span lookup cannot fail inside the domain");

        let mut triplets = Vec::with_capacity(old_n + p + 1);
        for i in 0..=old_n {
            if i + p <= mu {
                triplets.push((i, i, 1.0));
            } else if i > mu {
                triplets.push((i, i - 1, 1.0));
            } else {
                // mu - p < i <= mu: convex combination of two old coefficients.
                let den = self.knots[i + p] - self.knots[i];
                let alpha = if den.abs() > crate::basis::DENOM_TOL {
                    (x - self.knots[i]) / den
                } else {
                    0.0
                };
                triplets.push((i, i, alpha));
                triplets.push((i, i - 1, 1.0 - alpha));
            }
        }

        let mut refined = Vec::with_capacity(self.knots.len() + 1);
        refined.extend_from_slice(&self.knots.as_slice().expect("knots are contiguous")[..=mu]);
        refined.push(x);
        refined.extend_from_slice(&self.knots.as_slice().expect("knots are contiguous")[mu + 1..]);
        self.knots = Array1::from_vec(refined);

        Ok(KnotInsertionMap {
            old_len: old_n,
            new_len: old_n + 1,
            triplets,
        })
    }

    /// Drops all knots outside `[lower, upper]`, returning the index of the
    /// first retained basis function. Both bounds must already be present at
    /// full multiplicity `degree + 1`; domain reduction establishes that
    /// before calling.
    pub(crate) fn truncate(&mut self, lower: f64, upper: f64) -> usize {
        debug_assert_eq!(self.multiplicity(lower), self.degree + 1);
        debug_assert_eq!(self.multiplicity(upper), self.degree + 1);
        let first = self
            .knots
            .iter()
            .position(|&t| t >= lower)
            .expect("lower bound must be present");
        let last = self
            .knots
            .iter()
            .rposition(|&t| t <= upper)
            .expect("upper bound must be present");
        self.knots = self.knots.slice(s![first..=last]).to_owned();
        first
    }
}

/// Sparse linear map from old to refined coefficients produced by a single
/// knot insertion. Each row carries at most two nonzeros, so applying it
/// along one axis of the coefficient tensor costs work proportional to the
/// affected entries rather than a dense matrix product.
#[derive(Clone, Debug)]
pub struct KnotInsertionMap {
    old_len: usize,
    new_len: usize,
    triplets: Vec<(usize, usize, f64)>,
}

impl KnotInsertionMap {
    #[inline]
    pub fn old_len(&self) -> usize {
        self.old_len
    }

    #[inline]
    pub fn new_len(&self) -> usize {
        self.new_len
    }

    /// Applies the map to a single dimension's coefficient vector.
    pub fn apply(&self, coefficients: ArrayView1<'_, f64>) -> Array1<f64> {
        debug_assert_eq!(coefficients.len(), self.old_len);
        let mut out = Array1::zeros(self.new_len);
        for &(row, col, weight) in &self.triplets {
            out[row] += weight * coefficients[col];
        }
        out
    }

    /// Applies the map along one axis of a coefficient tensor, leaving every
    /// other dimension's structure untouched.
    pub fn apply_along_axis(&self, coefficients: ArrayViewD<'_, f64>, axis: Axis) -> ArrayD<f64> {
        debug_assert_eq!(coefficients.len_of(axis), self.old_len);
        let mut out_dim = coefficients.raw_dim();
        out_dim[axis.index()] = self.new_len;
        let mut out = ArrayD::zeros(out_dim);
        Zip::from(out.lanes_mut(axis))
            .and(coefficients.lanes(axis))
            .for_each(|mut new_lane, old_lane| {
                for &(row, col, weight) in &self.triplets {
                    new_lane[row] += weight * old_lane[col];
                }
            });
        out
    }
}
