//! Error types for fock-matrix.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("matrix is not square: {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("matrix is not Hermitian at ({row},{col}) within tolerance {tol}")]
    NotHermitian { row: usize, col: usize, tol: f64 },
}

pub type Result<T> = std::result::Result<T, MatrixError>;
