//! Bridge between `ndarray` storage and faer factorizations.
//!
//! The fitting code keeps everything in `ndarray` containers and only drops
//! down to faer for the symmetric solve of the normal equations. The view
//! wrappers below hand faer a zero-copy `MatRef` whenever the underlying
//! strides allow it, and fall back to an owned compact copy otherwise.

use faer::linalg::solvers::{self, Ldlt as FaerLdlt, Llt as FaerLlt, Solve};
use faer::{MatMut, MatRef, Side};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};
use std::marker::PhantomData;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinalgError {
    #[error("Cholesky factorization failed: {0:?}")]
    Cholesky(solvers::LltError),
    #[error("LDLT factorization failed: {0:?}")]
    Ldlt(solvers::LdltError),
}

pub enum SymmetricFactor {
    Llt(FaerLlt<f64>),
    Ldlt(FaerLdlt<f64>),
}

impl SymmetricFactor {
    #[inline]
    fn solve_in_place(&self, rhs: MatMut<'_, f64>) {
        match self {
            SymmetricFactor::Llt(f) => f.solve_in_place(rhs),
            SymmetricFactor::Ldlt(f) => f.solve_in_place(rhs),
        }
    }
}

/// Factorize a symmetric matrix with an LLT first attempt and LDLT fallback.
///
/// The LLT rejects systems that are not numerically positive definite; the
/// LDLT fallback still solves semi-definite systems that arise from
/// marginally conditioned design matrices.
#[inline]
pub fn factorize_symmetric(
    matrix: MatRef<'_, f64>,
    side: Side,
) -> Result<SymmetricFactor, LinalgError> {
    if let Ok(llt) = FaerLlt::new(matrix, side) {
        return Ok(SymmetricFactor::Llt(llt));
    }
    let ldlt = FaerLdlt::new(matrix, side).map_err(LinalgError::Ldlt)?;
    Ok(SymmetricFactor::Ldlt(ldlt))
}

/// Solve `matrix * x = rhs` for a symmetric `matrix`.
pub fn solve_symmetric(
    matrix: &Array2<f64>,
    rhs: &Array1<f64>,
) -> Result<Array1<f64>, LinalgError> {
    let view = FaerMatView::new(matrix);
    let factor = factorize_symmetric(view.as_ref(), Side::Lower)?;
    let mut solution = rhs.to_owned();
    let solution_view = array1_to_col_mat_mut(&mut solution);
    factor.solve_in_place(solution_view);
    Ok(solution)
}

#[inline]
pub fn array1_to_col_mat_mut(array: &mut Array1<f64>) -> MatMut<'_, f64> {
    let len = array.len();
    let stride = array.strides()[0];
    // SAFETY: pointer, length, and stride come straight from the live ndarray.
    unsafe { MatMut::from_raw_parts_mut(array.as_mut_ptr(), len, 1, stride, 0) }
}

/// Zero-copy faer view over a two-dimensional ndarray.
///
/// Layouts with non-positive strides can alias or reverse memory traversal,
/// which faer kernels do not tolerate; those are materialized into an owned
/// compact copy instead.
pub struct FaerMatView<'a> {
    ptr: *const f64,
    rows: usize,
    cols: usize,
    row_stride: isize,
    col_stride: isize,
    owned: Option<Array2<f64>>,
    _marker: PhantomData<&'a f64>,
}

impl<'a> FaerMatView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let strides = array.strides();
        if strides[0] <= 0 || strides[1] <= 0 {
            let owned = array.to_owned();
            let owned_strides = owned.strides();
            return Self {
                ptr: owned.as_ptr(),
                rows,
                cols,
                row_stride: owned_strides[0],
                col_stride: owned_strides[1],
                owned: Some(owned),
                _marker: PhantomData,
            };
        }

        Self {
            ptr: array.as_ptr(),
            rows,
            cols,
            row_stride: strides[0],
            col_stride: strides[1],
            owned: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        let (ptr, rows, cols, row_stride, col_stride) = if let Some(owned) = &self.owned {
            let strides = owned.strides();
            (
                owned.as_ptr(),
                owned.nrows(),
                owned.ncols(),
                strides[0],
                strides[1],
            )
        } else {
            (
                self.ptr,
                self.rows,
                self.cols,
                self.row_stride,
                self.col_stride,
            )
        };
        // SAFETY: pointer/shape/strides either come directly from a live
        // ndarray view with positive strides, or from the owned compact copy
        // stored inside this wrapper, which stays alive for the view lifetime.
        unsafe { MatRef::from_raw_parts(ptr, rows, cols, row_stride, col_stride) }
    }
}
