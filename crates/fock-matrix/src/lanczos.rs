//! Lanczos eigensolver and tridiagonalization for Hermitian operators.
//!
//! The operator is supplied as a matvec closure, so the full matrix never
//! needs to be stored. Two entry points:
//!
//! - [`lanczos`]: lowest eigenpairs with full reorthogonalization of the
//!   Krylov basis (stable, memory ∝ iterations × dimension);
//! - [`tridiagonalize`]: plain three-term recurrence producing the
//!   tridiagonal coefficients only. No reorthogonalization — loss of
//!   orthogonality in long runs is the accepted tradeoff for the
//!   streaming variant.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::diag::Spectrum;
use crate::hermitian::HermitianMatrix;

/// Tridiagonal coefficients from a Lanczos run.
#[derive(Debug, Clone)]
pub struct Tridiagonal {
    /// Diagonal entries α_j.
    pub alpha: Vec<f64>,
    /// Off-diagonal entries β_j (one fewer than alpha).
    pub beta: Vec<f64>,
}

impl Tridiagonal {
    /// The k lowest eigenvalues of the tridiagonal matrix.
    pub fn eigenvalues(&self, k: usize) -> Vec<f64> {
        diagonalize_tridiagonal(&self.alpha, &self.beta, k)
    }
}

/// Deterministic start vector (reproducible across runs).
fn seed_vector(dim: usize) -> DVector<Complex64> {
    let mut q = DVector::from_element(dim, Complex64::new(0.0, 0.0));
    for i in 0..dim {
        q[i] = Complex64::new(((i as f64 + 1.0) * 0.618033988749895).fract() - 0.5, 0.0);
    }
    let norm = q.norm();
    q /= Complex64::new(norm, 0.0);
    q
}

/// Plain Lanczos three-term recurrence.
///
/// Runs `steps` iterations (capped at the dimension) and returns the
/// tridiagonal coefficients. Stops early when an invariant subspace is hit.
pub fn tridiagonalize<F>(matvec: F, dim: usize, steps: usize) -> Tridiagonal
where
    F: Fn(&DVector<Complex64>) -> DVector<Complex64>,
{
    let m = steps.min(dim);
    let mut alpha = Vec::with_capacity(m);
    let mut beta = Vec::with_capacity(m);

    let mut q = seed_vector(dim);
    let mut q_prev: Option<DVector<Complex64>> = None;

    for j in 0..m {
        let mut w = matvec(&q);
        // α_j = Re⟨q_j|w⟩ (real for a Hermitian operator)
        let a = q.dotc(&w).re;
        alpha.push(a);

        w -= &q * Complex64::new(a, 0.0);
        if let Some(prev) = &q_prev {
            w -= prev * Complex64::new(beta[j - 1], 0.0);
        }

        let b = w.norm();
        if b < 1e-14 {
            eprintln!("  Lanczos: invariant subspace found at iteration {}", j + 1);
            break;
        }
        if j + 1 < m {
            beta.push(b);
            q_prev = Some(q);
            q = w / Complex64::new(b, 0.0);
        }
    }

    Tridiagonal { alpha, beta }
}

/// Lanczos algorithm with full reorthogonalization.
///
/// # Arguments
/// * `matvec` — function that computes H|v⟩
/// * `dim` — dimension of the space
/// * `n_eigenvalues` — number of lowest eigenvalues to find
/// * `max_iter` — maximum Lanczos iterations
/// * `tol` — convergence tolerance on eigenvalue change
pub fn lanczos<F>(
    matvec: F,
    dim: usize,
    n_eigenvalues: usize,
    max_iter: usize,
    tol: f64,
) -> Spectrum
where
    F: Fn(&DVector<Complex64>) -> DVector<Complex64>,
{
    let m = max_iter.min(dim);
    let k = n_eigenvalues.min(m);

    let mut q_vecs: Vec<DVector<Complex64>> = Vec::with_capacity(m + 1);
    let mut alpha: Vec<f64> = Vec::with_capacity(m);
    let mut beta: Vec<f64> = Vec::with_capacity(m);

    q_vecs.push(seed_vector(dim));

    let mut prev_eigenvalues = vec![f64::MAX; k];

    for j in 0..m {
        let mut w = matvec(&q_vecs[j]);

        let a = q_vecs[j].dotc(&w).re;
        alpha.push(a);

        w -= &q_vecs[j] * Complex64::new(a, 0.0);
        if j > 0 {
            w -= &q_vecs[j - 1] * Complex64::new(beta[j - 1], 0.0);
        }

        // Full reorthogonalization (crucial for numerical stability)
        for qi in &q_vecs {
            let overlap = qi.dotc(&w);
            w -= qi * overlap;
        }

        let b = w.norm();

        if (j + 1) % 10 == 0 || j == m - 1 || b < 1e-14 {
            let spec = diagonalize_tridiagonal(&alpha, &beta, k);
            let max_change = spec
                .iter()
                .zip(prev_eigenvalues.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0f64, f64::max);

            if max_change < tol {
                eprintln!(
                    "  Lanczos converged at iteration {} (change={:.2e})",
                    j + 1,
                    max_change
                );
                return recover_eigenvectors(&alpha, &beta, &q_vecs, k);
            }
            prev_eigenvalues = spec;
        }

        if b < 1e-14 {
            eprintln!("  Lanczos: invariant subspace found at iteration {}", j + 1);
            return recover_eigenvectors(&alpha, &beta, &q_vecs, k);
        }

        beta.push(b);
        let q_next = &w * Complex64::new(1.0 / b, 0.0);
        q_vecs.push(q_next);
    }

    eprintln!("  Lanczos: max iterations ({m}) reached");
    recover_eigenvectors(&alpha, &beta, &q_vecs, k)
}

/// Convenience: lowest eigenpairs of a packed Hermitian matrix.
pub fn lanczos_hermitian(
    h: &HermitianMatrix,
    n_eigenvalues: usize,
    max_iter: Option<usize>,
) -> Spectrum {
    let dim = h.dim();
    let max_iter = max_iter
        .unwrap_or_else(|| (20 * n_eigenvalues).max(100))
        .min(dim);
    lanczos(|v| h.mul_vec(v), dim, n_eigenvalues, max_iter, 1e-10)
}

fn tridiagonal_matrix(alpha: &[f64], beta: &[f64]) -> DMatrix<f64> {
    let m = alpha.len();
    let mut t = DMatrix::zeros(m, m);
    for i in 0..m {
        t[(i, i)] = alpha[i];
        if i > 0 {
            t[(i, i - 1)] = beta[i - 1];
            t[(i - 1, i)] = beta[i - 1];
        }
    }
    t
}

/// Diagonalize the tridiagonal matrix to get eigenvalues only.
fn diagonalize_tridiagonal(alpha: &[f64], beta: &[f64], k: usize) -> Vec<f64> {
    let eig = tridiagonal_matrix(alpha, beta).symmetric_eigen();
    let mut vals: Vec<f64> = eig.eigenvalues.iter().copied().collect();
    vals.sort_by(|a, b| a.partial_cmp(b).unwrap());
    vals.truncate(k);
    vals
}

/// Recover eigenvectors from the Krylov basis and tridiagonal eigenvectors.
fn recover_eigenvectors(
    alpha: &[f64],
    beta: &[f64],
    q_vecs: &[DVector<Complex64>],
    k: usize,
) -> Spectrum {
    let m = alpha.len();
    let eig = tridiagonal_matrix(alpha, beta).symmetric_eigen();

    let mut indexed: Vec<(usize, f64)> = eig
        .eigenvalues
        .iter()
        .enumerate()
        .map(|(i, &e)| (i, e))
        .collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

    let n = k.min(indexed.len());
    let dim = q_vecs[0].len();
    let n_q = q_vecs.len().min(m);

    let mut energies = Vec::with_capacity(n);
    let mut states = Vec::with_capacity(n);

    for &(idx, eval) in indexed.iter().take(n) {
        energies.push(eval);

        let mut v = DVector::from_element(dim, Complex64::new(0.0, 0.0));
        for j in 0..n_q {
            let coeff = Complex64::new(eig.eigenvectors[(j, idx)], 0.0);
            v += &q_vecs[j] * coeff;
        }
        let norm = v.norm();
        if norm > 1e-15 {
            v /= Complex64::new(norm, 0.0);
        }
        states.push(v);
    }

    Spectrum { energies, states }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_hermitian(n: usize, seed: u64) -> HermitianMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut m = HermitianMatrix::zeros(n);
        for i in 0..n {
            m.set(i, i, Complex64::new(rng.gen_range(-1.0..1.0), 0.0));
            for j in (i + 1)..n {
                m.set(
                    i,
                    j,
                    Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)),
                );
            }
        }
        m
    }

    #[test]
    fn test_lanczos_vs_dense() {
        let h = random_hermitian(40, 11);
        let dense = diag::diagonalize(&h, Some(3));
        let lanc = lanczos_hermitian(&h, 3, None);

        let e0_diff = (dense.ground_energy() - lanc.ground_energy()).abs();
        assert!(
            e0_diff < 1e-8,
            "E₀ mismatch: dense={}, lanczos={}, diff={e0_diff}",
            dense.ground_energy(),
            lanc.ground_energy()
        );
    }

    #[test]
    fn test_lanczos_eigenvector_residual() {
        let h = random_hermitian(30, 5);
        let lanc = lanczos_hermitian(&h, 2, None);
        for (e, v) in lanc.energies.iter().zip(&lanc.states) {
            let residual = (h.mul_vec(v) - v * Complex64::new(*e, 0.0)).norm();
            assert!(residual < 1e-7, "residual {residual} at energy {e}");
        }
    }

    #[test]
    fn test_tridiagonalize_extreme_eigenvalue() {
        let h = random_hermitian(30, 9);
        let tri = tridiagonalize(|v| h.mul_vec(v), h.dim(), 30);
        let lowest = tri.eigenvalues(1)[0];
        let exact = diag::eigenvalues(&h)[0];
        assert!(
            (lowest - exact).abs() < 1e-6,
            "tridiagonal lowest {lowest} vs exact {exact}"
        );
    }

    #[test]
    fn test_tridiagonal_shapes() {
        let h = random_hermitian(12, 1);
        let tri = tridiagonalize(|v| h.mul_vec(v), h.dim(), 8);
        assert_eq!(tri.alpha.len(), 8);
        assert_eq!(tri.beta.len(), 7);
    }
}
