//! Univariate B-spline basis evaluation.
//!
//! Everything here is expressed as iterative table filling over a triangular
//! array rather than call recursion: the Cox-de Boor recurrence is evaluated
//! bottom-up inside reusable scratch buffers, which bounds stack depth and
//! keeps per-point evaluation allocation free.

use ndarray::ArrayView1;

/// Denominators below this magnitude come from repeated knots and contribute
/// zero by the usual B-spline convention.
pub(crate) const DENOM_TOL: f64 = 1e-12;

/// Reusable buffers for basis evaluation. These are reused across points to
/// reduce allocation and improve cache locality.
#[derive(Clone, Debug)]
pub struct BasisScratch {
    left: Vec<f64>,
    right: Vec<f64>,
    table: Vec<f64>,
}

impl BasisScratch {
    #[inline]
    pub fn new(degree: usize) -> Self {
        let len = degree + 1;
        Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
            table: vec![0.0; len],
        }
    }

    #[inline]
    fn ensure_degree(&mut self, degree: usize) {
        let len = degree + 1;
        if self.table.len() < len {
            self.left.resize(len, 0.0);
            self.right.resize(len, 0.0);
            self.table.resize(len, 0.0);
        }
    }
}

/// Locates the knot span containing `x` for a basis of the given degree.
///
/// Coordinates at or beyond the last distinct knot are clamped into the last
/// span of positive width, so the upper domain boundary evaluates to its
/// one-sided limit instead of falling off the basis support. Coordinates
/// below the first distinct knot select the first span; out-of-domain inputs
/// therefore extrapolate the boundary polynomial, and domain checking is the
/// caller's responsibility.
#[inline]
pub(crate) fn find_span(x: f64, degree: usize, knots: ArrayView1<'_, f64>) -> usize {
    let num_basis = knots.len() - degree - 1;
    if x >= knots[num_basis] {
        let mut span = num_basis - 1;
        while span > degree && knots[span] >= knots[span + 1] {
            span -= 1;
        }
        span
    } else if x < knots[degree] {
        degree
    } else {
        let mut span = degree;
        while span < num_basis && x >= knots[span + 1] {
            span += 1;
        }
        span
    }
}

/// Fills `scratch.table[0..=degree]` with the nonzero basis values at `x`
/// for the span `mu`, using the stable triangular form of the Cox-de Boor
/// recurrence (Algorithm A2.2 in Piegl & Tiller, "The NURBS Book").
#[inline]
fn cox_de_boor_into(
    x: f64,
    degree: usize,
    mu: usize,
    knots: ArrayView1<'_, f64>,
    scratch: &mut BasisScratch,
) {
    scratch.ensure_degree(degree);
    let left = &mut scratch.left;
    let right = &mut scratch.right;
    let table = &mut scratch.table;

    table[0] = 1.0;

    for d in 1..=degree {
        left[d] = x - knots[mu + 1 - d];
        right[d] = knots[mu + d] - x;

        let mut saved = 0.0;
        for r in 0..d {
            let den = right[r + 1] + left[d - r];
            let temp = if den.abs() > DENOM_TOL {
                table[r] / den
            } else {
                0.0
            };

            table[r] = saved + right[r + 1] * temp;
            saved = left[d - r] * temp;
        }
        table[d] = saved;
    }
}

/// Evaluates the `degree + 1` nonzero basis values at `x` into `values`,
/// returning the index of the first nonzero basis function.
#[inline]
pub fn eval_nonzero_into(
    x: f64,
    degree: usize,
    knots: ArrayView1<'_, f64>,
    values: &mut [f64],
    scratch: &mut BasisScratch,
) -> usize {
    debug_assert_eq!(values.len(), degree + 1);
    let mu = find_span(x, degree, knots);
    cox_de_boor_into(x, degree, mu, knots, scratch);
    values.copy_from_slice(&scratch.table[..=degree]);
    mu - degree
}

/// Evaluates the `order`-th derivative of the `degree + 1` nonzero basis
/// functions at `x` into `values`, returning the first nonzero basis index.
///
/// Starts from the nonzero values of the degree `p - order` basis, then
/// climbs one degree per step with the derivative recurrence
/// `D_{i,k} = k (D_{i,k-1}/(t_{i+k}-t_i) - D_{i+1,k-1}/(t_{i+k+1}-t_{i+1}))`,
/// aligning the sparse blocks by absolute basis index. Orders above the
/// degree yield all zeros.
pub fn eval_derivative_nonzero_into(
    x: f64,
    degree: usize,
    order: usize,
    knots: ArrayView1<'_, f64>,
    values: &mut [f64],
    scratch: &mut BasisScratch,
) -> usize {
    debug_assert_eq!(values.len(), degree + 1);
    if order == 0 {
        return eval_nonzero_into(x, degree, knots, values, scratch);
    }

    let mu = find_span(x, degree, knots);
    let start = mu - degree;
    values.fill(0.0);
    if order > degree {
        return start;
    }

    let base = degree - order;
    cox_de_boor_into(x, base, mu, knots, scratch);
    values[..=base].copy_from_slice(&scratch.table[..=base]);

    // Level k holds values for basis indices mu-k ..= mu at slice offsets
    // 0 ..= k. Descending offsets let the update run in place: the slot at
    // `offset` still holds the level k-1 value needed as the right operand.
    for k in (base + 1)..=degree {
        for offset in (0..=k).rev() {
            let i = mu - k + offset;
            let lower_left = if offset >= 1 { values[offset - 1] } else { 0.0 };
            let lower_right = if offset < k { values[offset] } else { 0.0 };

            let den_left = knots[i + k] - knots[i];
            let den_right = knots[i + k + 1] - knots[i + 1];
            let left_term = if den_left.abs() > DENOM_TOL {
                lower_left / den_left
            } else {
                0.0
            };
            let right_term = if den_right.abs() > DENOM_TOL {
                lower_right / den_right
            } else {
                0.0
            };
            values[offset] = (k as f64) * (left_term - right_term);
        }
    }

    start
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, array};

    /// Independent recursive implementation of the Cox-de Boor definition,
    /// used to cross-validate the iterative table-filling evaluation.
    fn reference_bspline(x: f64, knots: &Array1<f64>, i: usize, degree: usize) -> f64 {
        let last_knot = *knots.last().expect("knot vector should be non-empty");
        let last_basis_index = knots.len() - degree - 2;

        if (x - last_knot).abs() < 1e-14 {
            return if i == last_basis_index { 1.0 } else { 0.0 };
        }

        if degree == 0 {
            // Indicator of the half-open span [t_i, t_{i+1}), closed on the
            // right only for the final span so the boundary evaluates to 1.
            if x >= knots[i] && x < knots[i + 1] {
                return 1.0;
            }
            if i == knots.len() - 2 && x == knots[i + 1] {
                return 1.0;
            }
            return 0.0;
        }

        let mut result = 0.0;
        let den1 = knots[i + degree] - knots[i];
        if den1.abs() > DENOM_TOL {
            result += (x - knots[i]) / den1 * reference_bspline(x, knots, i, degree - 1);
        }
        let den2 = knots[i + degree + 1] - knots[i + 1];
        if den2.abs() > DENOM_TOL {
            result +=
                (knots[i + degree + 1] - x) / den2 * reference_bspline(x, knots, i + 1, degree - 1);
        }
        result
    }

    fn eval_full(x: f64, degree: usize, knots: &Array1<f64>) -> Array1<f64> {
        let num_basis = knots.len() - degree - 1;
        let mut sparse = vec![0.0; degree + 1];
        let mut scratch = BasisScratch::new(degree);
        let start = eval_nonzero_into(x, degree, knots.view(), &mut sparse, &mut scratch);
        let mut full = Array1::zeros(num_basis);
        for (offset, &v) in sparse.iter().enumerate() {
            full[start + offset] = v;
        }
        full
    }

    fn check_against_reference(degree: usize, knots: &Array1<f64>) {
        let num_basis = knots.len() - degree - 1;
        for step in 0..=80 {
            let x = 4.0 * step as f64 / 80.0;
            let full = eval_full(x, degree, knots);
            for i in 0..num_basis {
                let expected = reference_bspline(x, knots, i, degree);
                assert_abs_diff_eq!(full[i], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn iterative_evaluation_matches_recursive_reference() {
        // Clamped vectors with a repeated interior knot, which exercises the
        // zero-denominator convention.
        check_against_reference(1, &array![0.0, 0.0, 1.0, 2.0, 2.0, 3.0, 4.0, 4.0]);
        check_against_reference(2, &array![0.0, 0.0, 0.0, 1.0, 2.0, 2.0, 3.0, 4.0, 4.0, 4.0]);
        check_against_reference(
            3,
            &array![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 2.0, 3.0, 4.0, 4.0, 4.0, 4.0],
        );
    }

    #[test]
    fn partition_of_unity_including_boundaries() {
        let knots = array![0.0, 0.0, 0.0, 0.0, 0.5, 1.3, 2.0, 3.0, 3.0, 3.0, 3.0];
        let degree = 3;
        for step in 0..=100 {
            let x = 3.0 * step as f64 / 100.0;
            let sum: f64 = eval_full(x, degree, &knots).sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn first_derivative_matches_finite_difference() {
        let knots = array![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 4.0, 4.0, 4.0];
        let degree = 3;
        let num_basis = knots.len() - degree - 1;
        let h = 1e-6;

        let mut scratch = BasisScratch::new(degree);
        let mut deriv = vec![0.0; degree + 1];
        // Interior points away from knots, where every basis function is smooth.
        for &x in &[0.31, 0.77, 1.49, 2.22, 3.63] {
            let start =
                eval_derivative_nonzero_into(x, degree, 1, knots.view(), &mut deriv, &mut scratch);
            let plus = eval_full(x + h / 2.0, degree, &knots);
            let minus = eval_full(x - h / 2.0, degree, &knots);
            for offset in 0..=degree {
                let i = start + offset;
                assert!(i < num_basis);
                let fd = (plus[i] - minus[i]) / h;
                assert_abs_diff_eq!(deriv[offset], fd, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn second_derivative_matches_finite_difference_of_first() {
        let knots = array![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 4.0, 4.0, 4.0];
        let degree = 3;
        let h = 1e-6;

        let mut scratch = BasisScratch::new(degree);
        let mut second = vec![0.0; degree + 1];
        let mut first_plus = vec![0.0; degree + 1];
        let mut first_minus = vec![0.0; degree + 1];
        for &x in &[0.4, 1.6, 2.5, 3.2] {
            let start =
                eval_derivative_nonzero_into(x, degree, 2, knots.view(), &mut second, &mut scratch);
            let start_p = eval_derivative_nonzero_into(
                x + h / 2.0,
                degree,
                1,
                knots.view(),
                &mut first_plus,
                &mut scratch,
            );
            let start_m = eval_derivative_nonzero_into(
                x - h / 2.0,
                degree,
                1,
                knots.view(),
                &mut first_minus,
                &mut scratch,
            );
            assert_eq!(start, start_p);
            assert_eq!(start, start_m);
            for offset in 0..=degree {
                let fd = (first_plus[offset] - first_minus[offset]) / h;
                assert_abs_diff_eq!(second[offset], fd, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn derivative_order_above_degree_is_zero() {
        let knots = array![0.0, 0.0, 0.0, 1.0, 2.0, 2.0, 2.0];
        let degree = 2;
        let mut scratch = BasisScratch::new(degree);
        let mut values = vec![1.0; degree + 1];
        eval_derivative_nonzero_into(1.2, degree, 3, knots.view(), &mut values, &mut scratch);
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn full_degree_derivative_is_piecewise_constant() {
        // Third derivative of a cubic basis is constant between knots.
        let knots = array![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 3.0, 3.0, 3.0];
        let degree = 3;
        let mut scratch = BasisScratch::new(degree);
        let mut a = vec![0.0; degree + 1];
        let mut b = vec![0.0; degree + 1];
        let start_a =
            eval_derivative_nonzero_into(1.2, degree, 3, knots.view(), &mut a, &mut scratch);
        let start_b =
            eval_derivative_nonzero_into(1.8, degree, 3, knots.view(), &mut b, &mut scratch);
        assert_eq!(start_a, start_b);
        for offset in 0..=degree {
            assert_abs_diff_eq!(a[offset], b[offset], epsilon = 1e-12);
        }
    }

    #[test]
    fn boundary_evaluation_selects_last_valid_span() {
        let knots = array![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 2.0, 2.0, 2.0];
        let degree = 3;
        let num_basis = knots.len() - degree - 1;
        let full = eval_full(2.0, degree, &knots);
        // At the clamped right boundary only the last basis function is 1.
        for i in 0..num_basis - 1 {
            assert_abs_diff_eq!(full[i], 0.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(full[num_basis - 1], 1.0, epsilon = 1e-12);
    }
}
