//! Exact domain reduction.
//!
//! Restricting a spline to a sub-box is done representation-side, not by
//! refitting: each bound is inserted as a knot until it reaches full
//! multiplicity `degree + 1`, at which point the basis functions split
//! cleanly at the bound and the outside knots and coefficients can be
//! dropped. The restricted spline agrees with the original everywhere in the
//! reduced box up to rounding.

use crate::error::SplineError;
use crate::spline::Spline;
use ndarray::{Array1, Axis, IxDyn, Slice};

/// Restricts `spline` to the box `[lower, upper]`, returning a new spline.
///
/// Bounds equal to the current domain edges are no-ops for that side. The
/// input spline is never modified; `Spline::reduce_domain` commits the result
/// only on success.
pub fn reduce(spline: &Spline, lower: &[f64], upper: &[f64]) -> Result<Spline, SplineError> {
    let d = spline.dimensions();
    if lower.len() != d || upper.len() != d {
        return Err(SplineError::DimensionMismatch(format!(
            "bounds have {} and {} entries, the spline has {d} dimensions",
            lower.len(),
            upper.len()
        )));
    }
    let current_lower = spline.domain_lower_bound();
    let current_upper = spline.domain_upper_bound();
    for dim in 0..d {
        if !(lower[dim] < upper[dim]) {
            return Err(SplineError::DimensionMismatch(format!(
                "reduced bounds in dimension {dim} are not ordered: [{}, {}]",
                lower[dim], upper[dim]
            )));
        }
        for &bound in &[lower[dim], upper[dim]] {
            if bound < current_lower[dim] || bound > current_upper[dim] {
                return Err(SplineError::OutOfDomain {
                    dim,
                    value: bound,
                    lower: current_lower[dim],
                    upper: current_upper[dim],
                });
            }
        }
    }

    let mut work = spline.clone();
    for dim in 0..d {
        for &bound in &[lower[dim], upper[dim]] {
            let order = work.basis.knot_vector(dim).degree() + 1;
            while work.basis.knot_vector(dim).multiplicity(bound) < order {
                work.insert_knot(dim, bound)?;
            }
        }
    }

    // Every bound now sits at full multiplicity; truncate each dimension and
    // slice the matching coefficient block out of the tensor.
    let old_dims = work.basis.num_basis_per_dim();
    let mut tensor = work
        .coefficients
        .view()
        .into_shape_with_order(IxDyn(&old_dims))
        .expect("coefficient count must match the basis shape")
        .to_owned();
    for dim in 0..d {
        let kv = work.basis.knot_vector_mut(dim);
        let first = kv.truncate(lower[dim], upper[dim]);
        let keep = kv.num_basis();
        tensor = tensor
            .slice_axis(Axis(dim), Slice::from(first..first + keep))
            .to_owned();
    }
    let coefficients = Array1::from_iter(tensor.iter().copied());

    log::debug!("reduced {d}-dimensional spline to {lower:?}..{upper:?}");
    Ok(Spline::from_parts(work.basis, coefficients))
}

/// Controls recursive bisection of a spline's domain.
#[derive(Clone, Copy, Debug)]
pub struct SplitConfig {
    /// Dimensions whose extent is at most this are not split further.
    pub min_span: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self { min_span: 0.1 }
    }
}

/// Recursively bisects the spline's domain until every dimension's extent is
/// at most `config.min_span`, returning one exactly-restricted spline per
/// leaf box. The leaves tile the original domain.
pub fn bisect_domains(spline: &Spline, config: &SplitConfig) -> Result<Vec<Spline>, SplineError> {
    if !(config.min_span > 0.0) {
        return Err(SplineError::DimensionMismatch(format!(
            "min_span must be positive, got {}",
            config.min_span
        )));
    }
    let mut leaves = Vec::new();
    bisect_into(spline, config.min_span, &mut leaves)?;
    Ok(leaves)
}

fn bisect_into(
    spline: &Spline,
    min_span: f64,
    leaves: &mut Vec<Spline>,
) -> Result<(), SplineError> {
    let lower = spline.domain_lower_bound();
    let upper = spline.domain_upper_bound();
    let split_dim = (0..spline.dimensions()).find(|&dim| upper[dim] - lower[dim] > min_span);

    let Some(dim) = split_dim else {
        leaves.push(spline.clone());
        return Ok(());
    };

    let mid = 0.5 * (lower[dim] + upper[dim]);
    let mut left_upper = upper.clone();
    left_upper[dim] = mid;
    let mut right_lower = lower.clone();
    right_lower[dim] = mid;

    let left = reduce(spline, &lower, &left_upper)?;
    let right = reduce(spline, &right_lower, &upper)?;
    bisect_into(&left, min_span, leaves)?;
    bisect_into(&right, min_span, leaves)
}
