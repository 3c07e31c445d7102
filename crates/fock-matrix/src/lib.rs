//! Packed Hermitian matrix algebra and eigensolvers.
//!
//! Hamiltonians and reduced density matrices in exact diagonalization are
//! Hermitian and assembled element by element; [`HermitianMatrix`] stores
//! them packed (real diagonal + upper-triangle Re/Im arrays) and
//! [`diag`]/[`lanczos`] diagonalize them.
//!
//! # Modules
//!
//! - [`hermitian`]: packed storage, element access, arithmetic, matvec
//! - [`diag`]: dense eigendecomposition via nalgebra's `SymmetricEigen`
//! - [`lanczos`]: matvec-driven Lanczos (eigenpairs + tridiagonalization)

pub mod diag;
pub mod error;
pub mod hermitian;
pub mod lanczos;

pub use diag::Spectrum;
pub use error::MatrixError;
pub use hermitian::HermitianMatrix;
pub use lanczos::Tridiagonal;
