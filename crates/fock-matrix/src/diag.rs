//! Dense eigendecomposition of Hermitian matrices.
//!
//! Uses nalgebra's `SymmetricEigen` (Householder tridiagonalization + QR
//! internally). Suitable up to a few tens of thousands of dimensions;
//! beyond that use [`crate::lanczos`].

use nalgebra::DVector;
use num_complex::Complex64;

use crate::hermitian::HermitianMatrix;

/// Eigenvalues and eigenstates from diagonalization.
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Eigenvalues in ascending order.
    pub energies: Vec<f64>,
    /// Corresponding eigenvectors (orthonormal).
    pub states: Vec<DVector<Complex64>>,
}

impl Spectrum {
    /// Ground state energy.
    pub fn ground_energy(&self) -> f64 {
        self.energies[0]
    }

    /// Ground state vector.
    pub fn ground_state(&self) -> &DVector<Complex64> {
        &self.states[0]
    }

    /// Spectral gap (E_1 - E_0).
    pub fn gap(&self) -> f64 {
        if self.energies.len() < 2 {
            return 0.0;
        }
        self.energies[1] - self.energies[0]
    }
}

/// Diagonalize a Hermitian matrix.
///
/// If `n_lowest` is `Some(n)`, only the `n` lowest eigenvalues/states are
/// returned (still computed via full diagonalization). Eigenvectors inside
/// degenerate clusters are re-orthogonalized by modified Gram-Schmidt.
pub fn diagonalize(h: &HermitianMatrix, n_lowest: Option<usize>) -> Spectrum {
    let eig = h.to_dense().symmetric_eigen();

    let mut indexed: Vec<(usize, f64)> = eig
        .eigenvalues
        .iter()
        .enumerate()
        .map(|(i, &e)| (i, e))
        .collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

    let n = match n_lowest {
        Some(n) => n.min(indexed.len()),
        None => indexed.len(),
    };

    let energies: Vec<f64> = indexed[..n].iter().map(|&(_, e)| e).collect();
    let mut states: Vec<DVector<Complex64>> = indexed[..n]
        .iter()
        .map(|&(i, _)| eig.eigenvectors.column(i).into_owned())
        .collect();

    reorthogonalize_degenerate(&energies, &mut states);

    Spectrum { energies, states }
}

/// Eigenvalues only, ascending.
pub fn eigenvalues(h: &HermitianMatrix) -> Vec<f64> {
    let mut vals: Vec<f64> = h.to_dense().symmetric_eigenvalues().iter().copied().collect();
    vals.sort_by(|a, b| a.partial_cmp(b).unwrap());
    vals
}

/// Modified Gram-Schmidt within clusters of (numerically) equal eigenvalues.
fn reorthogonalize_degenerate(energies: &[f64], states: &mut [DVector<Complex64>]) {
    let scale = energies.iter().fold(1.0f64, |m, e| m.max(e.abs()));
    let tol = 1e-10 * scale;

    let mut start = 0;
    while start < energies.len() {
        let mut end = start + 1;
        while end < energies.len() && (energies[end] - energies[end - 1]).abs() < tol {
            end += 1;
        }
        if end - start > 1 {
            for a in start..end {
                for b in start..a {
                    let overlap = states[b].dotc(&states[a]);
                    let correction = &states[b] * overlap;
                    states[a] -= correction;
                }
                let norm = states[a].norm();
                if norm > 1e-15 {
                    states[a] /= Complex64::new(norm, 0.0);
                }
            }
        }
        start = end;
    }
}
