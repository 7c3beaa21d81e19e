//! Strided matrix views and small vector helpers
//!
//! Transform matrices arrive from callers in either row- or column-major
//! order. The view carries the layout explicitly so a wrong-order supply is
//! a declared fact rather than a silent transposition.

use serde::{Deserialize, Serialize};

use sf_core::{Sample, SfError, SfResult};

/// Dot product with f64 accumulation
#[inline]
pub fn dot(a: &[Sample], b: &[Sample]) -> Sample {
    debug_assert_eq!(a.len(), b.len());
    let mut acc = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        acc += x as f64 * y as f64;
    }
    acc as Sample
}

/// Sum with f64 accumulation
#[inline]
pub fn sum(values: &[Sample]) -> Sample {
    values.iter().map(|&x| x as f64).sum::<f64>() as Sample
}

/// Sum of squares with f64 accumulation
#[inline]
pub fn sum_squares(values: &[Sample]) -> Sample {
    values.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>() as Sample
}

/// Storage order of a flat matrix buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatrixLayout {
    RowMajor,
    #[default]
    ColMajor,
}

/// Borrowed matrix over a flat buffer with explicit layout
#[derive(Debug, Clone, Copy)]
pub struct MatrixView<'a> {
    data: &'a [Sample],
    rows: usize,
    cols: usize,
    layout: MatrixLayout,
}

impl<'a> MatrixView<'a> {
    pub fn new(
        data: &'a [Sample],
        rows: usize,
        cols: usize,
        layout: MatrixLayout,
    ) -> SfResult<Self> {
        if data.len() != rows * cols {
            return Err(SfError::KernelFailure(format!(
                "matrix buffer holds {} values, shape {rows}x{cols} needs {}",
                data.len(),
                rows * cols
            )));
        }
        Ok(Self {
            data,
            rows,
            cols,
            layout,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn at(&self, row: usize, col: usize) -> Sample {
        debug_assert!(row < self.rows && col < self.cols);
        match self.layout {
            MatrixLayout::RowMajor => self.data[row * self.cols + col],
            MatrixLayout::ColMajor => self.data[col * self.rows + row],
        }
    }

    /// `out = M * v`; `v.len()` must equal `cols`, `out.len()` equals `rows`
    pub fn mat_vec(&self, v: &[Sample], out: &mut [Sample]) {
        debug_assert_eq!(v.len(), self.cols);
        debug_assert_eq!(out.len(), self.rows);
        for (row, slot) in out.iter_mut().enumerate() {
            let mut acc = 0.0f64;
            for (col, &x) in v.iter().enumerate() {
                acc += self.at(row, col) as f64 * x as f64;
            }
            *slot = acc as Sample;
        }
    }
}
