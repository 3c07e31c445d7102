//! Packed Hermitian matrices.
//!
//! An n×n Hermitian matrix is stored as a real diagonal of length n plus
//! real and imaginary upper-triangle arrays of length n(n-1)/2, row-major.
//! The lower triangle is implicit: M[j][i] = conj(M[i][j]).
//!
//! This is the natural storage for Hamiltonian and density-matrix blocks
//! accumulated element by element; dense conversion is provided for the
//! eigensolvers in [`crate::diag`].

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use std::ops::{Add, AddAssign, DivAssign, Mul, MulAssign, Sub, SubAssign};

use crate::error::{MatrixError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct HermitianMatrix {
    dimension: usize,
    /// Diagonal elements (real by hermiticity).
    diagonal: Vec<f64>,
    /// Real parts of the strict upper triangle, row-major.
    off_diag_re: Vec<f64>,
    /// Imaginary parts of the strict upper triangle, row-major.
    off_diag_im: Vec<f64>,
}

impl HermitianMatrix {
    /// Zero matrix of the given dimension.
    pub fn zeros(dimension: usize) -> Self {
        let n_off = dimension * dimension.saturating_sub(1) / 2;
        HermitianMatrix {
            dimension,
            diagonal: vec![0.0; dimension],
            off_diag_re: vec![0.0; n_off],
            off_diag_im: vec![0.0; n_off],
        }
    }

    /// Identity matrix of the given dimension.
    pub fn identity(dimension: usize) -> Self {
        let mut m = Self::zeros(dimension);
        for d in m.diagonal.iter_mut() {
            *d = 1.0;
        }
        m
    }

    pub fn dim(&self) -> usize {
        self.dimension
    }

    /// Packed index of upper-triangle element (i, j), i < j.
    #[inline]
    fn packed_index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < j && j < self.dimension);
        i * (2 * self.dimension - i - 1) / 2 + (j - i - 1)
    }

    /// Element (i, j). The lower triangle returns the conjugate of the
    /// stored upper-triangle value.
    pub fn get(&self, i: usize, j: usize) -> Complex64 {
        assert!(
            i < self.dimension && j < self.dimension,
            "element ({i},{j}) out of bounds for dimension {}",
            self.dimension
        );
        if i == j {
            Complex64::new(self.diagonal[i], 0.0)
        } else if i < j {
            let k = self.packed_index(i, j);
            Complex64::new(self.off_diag_re[k], self.off_diag_im[k])
        } else {
            let k = self.packed_index(j, i);
            Complex64::new(self.off_diag_re[k], -self.off_diag_im[k])
        }
    }

    /// Set element (i, j). Setting (j, i) with i < j stores the conjugate;
    /// the imaginary part of a diagonal assignment is discarded.
    pub fn set(&mut self, i: usize, j: usize, value: Complex64) {
        assert!(
            i < self.dimension && j < self.dimension,
            "element ({i},{j}) out of bounds for dimension {}",
            self.dimension
        );
        if i == j {
            self.diagonal[i] = value.re;
        } else if i < j {
            let k = self.packed_index(i, j);
            self.off_diag_re[k] = value.re;
            self.off_diag_im[k] = value.im;
        } else {
            let k = self.packed_index(j, i);
            self.off_diag_re[k] = value.re;
            self.off_diag_im[k] = -value.im;
        }
    }

    /// Accumulate into element (i, j) (conjugated below the diagonal).
    pub fn add_to(&mut self, i: usize, j: usize, value: Complex64) {
        assert!(
            i < self.dimension && j < self.dimension,
            "element ({i},{j}) out of bounds for dimension {}",
            self.dimension
        );
        if i == j {
            self.diagonal[i] += value.re;
        } else if i < j {
            let k = self.packed_index(i, j);
            self.off_diag_re[k] += value.re;
            self.off_diag_im[k] += value.im;
        } else {
            let k = self.packed_index(j, i);
            self.off_diag_re[k] += value.re;
            self.off_diag_im[k] -= value.im;
        }
    }

    /// Sum of diagonal elements.
    pub fn trace(&self) -> f64 {
        self.diagonal.iter().sum()
    }

    /// Matrix-vector product M|v⟩, walking the packed triangle once.
    pub fn mul_vec(&self, v: &DVector<Complex64>) -> DVector<Complex64> {
        assert_eq!(
            v.len(),
            self.dimension,
            "vector length {} does not match dimension {}",
            v.len(),
            self.dimension
        );
        let mut result = DVector::from_element(self.dimension, Complex64::new(0.0, 0.0));
        for i in 0..self.dimension {
            result[i] += Complex64::new(self.diagonal[i], 0.0) * v[i];
            for j in (i + 1)..self.dimension {
                let k = self.packed_index(i, j);
                let m = Complex64::new(self.off_diag_re[k], self.off_diag_im[k]);
                result[i] += m * v[j];
                result[j] += m.conj() * v[i];
            }
        }
        result
    }

    /// Sandwich ⟨v1|M|v2⟩.
    pub fn matrix_element(&self, v1: &DVector<Complex64>, v2: &DVector<Complex64>) -> Complex64 {
        let mv = self.mul_vec(v2);
        let mut sum = Complex64::new(0.0, 0.0);
        for i in 0..self.dimension {
            sum += v1[i].conj() * mv[i];
        }
        sum
    }

    /// Expand to a dense complex matrix.
    pub fn to_dense(&self) -> DMatrix<Complex64> {
        DMatrix::from_fn(self.dimension, self.dimension, |i, j| self.get(i, j))
    }

    /// Import a dense matrix, checking hermiticity within `tol`.
    pub fn try_from_dense(m: &DMatrix<Complex64>, tol: f64) -> Result<Self> {
        if m.nrows() != m.ncols() {
            return Err(MatrixError::NotSquare {
                rows: m.nrows(),
                cols: m.ncols(),
            });
        }
        let n = m.nrows();
        let mut out = Self::zeros(n);
        for i in 0..n {
            if m[(i, i)].im.abs() > tol {
                return Err(MatrixError::NotHermitian { row: i, col: i, tol });
            }
            out.diagonal[i] = m[(i, i)].re;
            for j in (i + 1)..n {
                if (m[(i, j)] - m[(j, i)].conj()).norm() > tol {
                    return Err(MatrixError::NotHermitian { row: i, col: j, tol });
                }
                let k = out.packed_index(i, j);
                out.off_diag_re[k] = m[(i, j)].re;
                out.off_diag_im[k] = m[(i, j)].im;
            }
        }
        Ok(out)
    }

    /// Doubled real-symmetric block form [[Re, -Im], [Im, Re]].
    ///
    /// Its spectrum is the Hermitian spectrum with every eigenvalue
    /// doubled, so real-only eigensolvers can be used.
    pub fn to_real_symmetric(&self) -> DMatrix<f64> {
        let n = self.dimension;
        let mut out = DMatrix::zeros(2 * n, 2 * n);
        for i in 0..n {
            for j in 0..n {
                let a = self.get(i, j);
                out[(i, j)] = a.re;
                out[(i + n, j + n)] = a.re;
                out[(i, j + n)] = -a.im;
                out[(i + n, j)] = a.im;
            }
        }
        out
    }
}

impl AddAssign<&HermitianMatrix> for HermitianMatrix {
    fn add_assign(&mut self, rhs: &HermitianMatrix) {
        assert_eq!(
            self.dimension, rhs.dimension,
            "dimension mismatch in Hermitian matrix addition"
        );
        for (a, b) in self.diagonal.iter_mut().zip(&rhs.diagonal) {
            *a += b;
        }
        for (a, b) in self.off_diag_re.iter_mut().zip(&rhs.off_diag_re) {
            *a += b;
        }
        for (a, b) in self.off_diag_im.iter_mut().zip(&rhs.off_diag_im) {
            *a += b;
        }
    }
}

impl SubAssign<&HermitianMatrix> for HermitianMatrix {
    fn sub_assign(&mut self, rhs: &HermitianMatrix) {
        assert_eq!(
            self.dimension, rhs.dimension,
            "dimension mismatch in Hermitian matrix subtraction"
        );
        for (a, b) in self.diagonal.iter_mut().zip(&rhs.diagonal) {
            *a -= b;
        }
        for (a, b) in self.off_diag_re.iter_mut().zip(&rhs.off_diag_re) {
            *a -= b;
        }
        for (a, b) in self.off_diag_im.iter_mut().zip(&rhs.off_diag_im) {
            *a -= b;
        }
    }
}

impl MulAssign<f64> for HermitianMatrix {
    fn mul_assign(&mut self, rhs: f64) {
        for a in self.diagonal.iter_mut() {
            *a *= rhs;
        }
        for a in self.off_diag_re.iter_mut() {
            *a *= rhs;
        }
        for a in self.off_diag_im.iter_mut() {
            *a *= rhs;
        }
    }
}

impl DivAssign<f64> for HermitianMatrix {
    fn div_assign(&mut self, rhs: f64) {
        *self *= 1.0 / rhs;
    }
}

impl Add for &HermitianMatrix {
    type Output = HermitianMatrix;
    fn add(self, rhs: &HermitianMatrix) -> HermitianMatrix {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Sub for &HermitianMatrix {
    type Output = HermitianMatrix;
    fn sub(self, rhs: &HermitianMatrix) -> HermitianMatrix {
        let mut out = self.clone();
        out -= rhs;
        out
    }
}

impl Mul<f64> for &HermitianMatrix {
    type Output = HermitianMatrix;
    fn mul(self, rhs: f64) -> HermitianMatrix {
        let mut out = self.clone();
        out *= rhs;
        out
    }
}
