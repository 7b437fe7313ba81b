//! Tensor-product combination of per-dimension bases.
//!
//! A `TensorBasis` holds one `KnotVector` per dimension and combines the
//! univariate nonzero blocks into multivariate basis values with an outer
//! product. The multi-index to flat-index mapping is row-major with the last
//! dimension fastest, and the exact same strides are used by fitting,
//! evaluation, refinement, and truncation; a mismatch between any two of
//! those would silently corrupt results, so the mapping lives here alone.

use crate::basis::{BasisScratch, eval_derivative_nonzero_into, eval_nonzero_into};
use crate::error::SplineError;
use crate::knots::KnotVector;
use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

/// Row-count threshold above which design-matrix assembly is parallelized.
const PAR_THRESHOLD: usize = 256;

#[derive(Clone, Debug)]
pub struct TensorBasis {
    dims: Vec<KnotVector>,
}

impl TensorBasis {
    pub fn new(dims: Vec<KnotVector>) -> Result<Self, SplineError> {
        if dims.is_empty() {
            return Err(SplineError::DimensionMismatch(
                "a tensor basis requires at least one dimension".to_string(),
            ));
        }
        let basis = Self { dims };
        basis
            .num_basis_per_dim()
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| {
                SplineError::InvalidKnotVector("tensor basis is too large to index".to_string())
            })?;
        Ok(basis)
    }

    #[inline]
    pub fn dimensions(&self) -> usize {
        self.dims.len()
    }

    #[inline]
    pub fn knot_vector(&self, dim: usize) -> &KnotVector {
        &self.dims[dim]
    }

    #[inline]
    pub(crate) fn knot_vector_mut(&mut self, dim: usize) -> &mut KnotVector {
        &mut self.dims[dim]
    }

    pub fn num_basis_per_dim(&self) -> Vec<usize> {
        self.dims.iter().map(|kv| kv.num_basis()).collect()
    }

    /// Total coefficient count `N = prod n_i`.
    pub fn total_basis(&self) -> usize {
        self.dims.iter().map(|kv| kv.num_basis()).product()
    }

    /// Row-major strides over the per-dimension basis counts, last dimension
    /// fastest.
    pub fn strides(&self) -> Vec<usize> {
        let num_basis = self.num_basis_per_dim();
        let mut strides = vec![1usize; num_basis.len()];
        let mut acc = 1usize;
        for i in (0..num_basis.len()).rev() {
            strides[i] = acc;
            acc *= num_basis[i];
        }
        strides
    }

    /// Maps a multi-index to the flat coefficient index.
    pub fn flat_index(&self, multi: &[usize]) -> usize {
        debug_assert_eq!(multi.len(), self.dims.len());
        multi
            .iter()
            .zip(self.strides())
            .map(|(&idx, stride)| idx * stride)
            .sum()
    }

    /// Evaluates the nonzero tensor-basis block at `x`: the flat coefficient
    /// indices of the `prod (p_i + 1)` active functions and their values.
    ///
    /// Domain checking is the caller's responsibility; out-of-domain
    /// coordinates extrapolate the boundary polynomials.
    pub fn eval_nonzero(&self, x: ArrayView1<'_, f64>) -> Result<(Vec<usize>, Vec<f64>), SplineError> {
        let (starts, values) = self.eval_univariate(x, None)?;
        let mut scratch = TensorAccumulator::new(self);
        let nnz = scratch.support_size();
        let mut indices = Vec::with_capacity(nnz);
        let mut products = Vec::with_capacity(nnz);
        scratch.for_each_term(&starts, |flat, offsets| {
            indices.push(flat);
            products.push(
                offsets
                    .iter()
                    .enumerate()
                    .map(|(dim, &o)| values[dim][o])
                    .product(),
            );
        });
        Ok((indices, products))
    }

    /// Evaluates the Jacobian block at `x`: the same flat indices as
    /// `eval_nonzero` and a `d x nnz` matrix whose row `k` carries the tensor
    /// values with dimension `k`'s basis replaced by its first derivative
    /// (the multivariate product rule, one dimension at a time).
    pub fn eval_jacobian_nonzero(
        &self,
        x: ArrayView1<'_, f64>,
    ) -> Result<(Vec<usize>, Array2<f64>), SplineError> {
        let (starts, values) = self.eval_univariate(x, None)?;
        let (deriv_starts, derivatives) = self.eval_univariate(x, Some(1))?;
        debug_assert_eq!(starts, deriv_starts);

        let d = self.dims.len();
        let mut scratch = TensorAccumulator::new(self);
        let nnz = scratch.support_size();
        let mut indices = Vec::with_capacity(nnz);
        let mut rows = Array2::zeros((d, nnz));
        let mut term = 0usize;
        scratch.for_each_term(&starts, |flat, offsets| {
            indices.push(flat);
            for row in 0..d {
                let mut product = 1.0;
                for (dim, &o) in offsets.iter().enumerate() {
                    let factor = if dim == row {
                        derivatives[dim][o]
                    } else {
                        values[dim][o]
                    };
                    product *= factor;
                }
                rows[[row, term]] = product;
            }
            term += 1;
        });
        Ok((indices, rows))
    }

    /// Assembles the dense least-squares design matrix: row `j` holds the
    /// tensor-basis evaluation at sample `j`. Rows are filled in parallel
    /// above a fixed threshold, with per-worker scratch buffers.
    pub fn design_matrix(&self, points: ArrayView2<'_, f64>) -> Result<Array2<f64>, SplineError> {
        let (nrows, point_dims) = points.dim();
        let d = self.dims.len();
        if point_dims != d {
            return Err(SplineError::DimensionMismatch(format!(
                "sample points have {point_dims} coordinates, the basis has {d} dimensions"
            )));
        }

        let total = self.total_basis();
        let mut matrix = Array2::zeros((nrows, total));

        if nrows >= PAR_THRESHOLD {
            matrix
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each_init(
                    || RowScratch::new(self),
                    |scratch, (row_idx, mut row)| {
                        let row_slice = row
                            .as_slice_mut()
                            .expect("design matrix rows should be contiguous");
                        self.fill_design_row(points.row(row_idx), scratch, row_slice);
                    },
                );
        } else {
            let mut scratch = RowScratch::new(self);
            for (row_idx, mut row) in matrix.axis_iter_mut(Axis(0)).enumerate() {
                let row_slice = row
                    .as_slice_mut()
                    .expect("design matrix rows should be contiguous");
                self.fill_design_row(points.row(row_idx), &mut scratch, row_slice);
            }
        }

        Ok(matrix)
    }

    fn fill_design_row(
        &self,
        point: ArrayView1<'_, f64>,
        scratch: &mut RowScratch,
        row: &mut [f64],
    ) {
        for dim in 0..self.dims.len() {
            let kv = &self.dims[dim];
            scratch.starts[dim] = eval_nonzero_into(
                point[dim],
                kv.degree(),
                kv.as_view(),
                &mut scratch.values[dim],
                &mut scratch.basis[dim],
            );
        }
        let values = &scratch.values;
        scratch
            .accumulator
            .for_each_term(&scratch.starts, |flat, offsets| {
                row[flat] = offsets
                    .iter()
                    .enumerate()
                    .map(|(dim, &o)| values[dim][o])
                    .product();
            });
    }

    /// Evaluates every dimension's nonzero univariate block at `x`, either
    /// plain values or a derivative of the given order.
    fn eval_univariate(
        &self,
        x: ArrayView1<'_, f64>,
        derivative: Option<usize>,
    ) -> Result<(Vec<usize>, Vec<Vec<f64>>), SplineError> {
        let d = self.dims.len();
        if x.len() != d {
            return Err(SplineError::DimensionMismatch(format!(
                "point has {} coordinates, the basis has {d} dimensions",
                x.len()
            )));
        }
        let mut starts = vec![0usize; d];
        let mut values = Vec::with_capacity(d);
        for (dim, kv) in self.dims.iter().enumerate() {
            let degree = kv.degree();
            let mut block = vec![0.0; degree + 1];
            let mut scratch = BasisScratch::new(degree);
            starts[dim] = match derivative {
                Some(order) => eval_derivative_nonzero_into(
                    x[dim],
                    degree,
                    order,
                    kv.as_view(),
                    &mut block,
                    &mut scratch,
                ),
                None => eval_nonzero_into(x[dim], degree, kv.as_view(), &mut block, &mut scratch),
            };
            values.push(block);
        }
        Ok((starts, values))
    }
}

/// Odometer over the per-dimension nonzero offsets, producing each term's
/// flat coefficient index. Kept separate so evaluation and design-matrix
/// assembly iterate the support in exactly the same order.
#[derive(Clone, Debug)]
struct TensorAccumulator {
    supports: Vec<usize>,
    strides: Vec<usize>,
    offsets: Vec<usize>,
}

impl TensorAccumulator {
    fn new(basis: &TensorBasis) -> Self {
        let supports: Vec<usize> = basis.dims.iter().map(|kv| kv.degree() + 1).collect();
        let strides = basis.strides();
        let offsets = vec![0usize; supports.len()];
        Self {
            supports,
            strides,
            offsets,
        }
    }

    fn support_size(&self) -> usize {
        self.supports.iter().product()
    }

    fn for_each_term<F>(&mut self, starts: &[usize], mut visit: F)
    where
        F: FnMut(usize, &[usize]),
    {
        self.offsets.fill(0);
        loop {
            let flat = self
                .offsets
                .iter()
                .zip(starts)
                .zip(&self.strides)
                .map(|((&offset, &start), &stride)| (start + offset) * stride)
                .sum();
            visit(flat, &self.offsets);

            let mut carried = true;
            for dim in (0..self.offsets.len()).rev() {
                self.offsets[dim] += 1;
                if self.offsets[dim] < self.supports[dim] {
                    carried = false;
                    break;
                }
                self.offsets[dim] = 0;
            }
            if carried {
                break;
            }
        }
    }
}

/// Per-worker scratch for design-matrix row assembly.
struct RowScratch {
    basis: Vec<BasisScratch>,
    values: Vec<Vec<f64>>,
    starts: Vec<usize>,
    accumulator: TensorAccumulator,
}

impl RowScratch {
    fn new(basis: &TensorBasis) -> Self {
        Self {
            basis: basis
                .dims
                .iter()
                .map(|kv| BasisScratch::new(kv.degree()))
                .collect(),
            values: basis
                .dims
                .iter()
                .map(|kv| vec![0.0; kv.degree() + 1])
                .collect(),
            starts: vec![0usize; basis.dims.len()],
            accumulator: TensorAccumulator::new(basis),
        }
    }
}
