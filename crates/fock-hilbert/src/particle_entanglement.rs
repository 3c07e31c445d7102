//! Particle partition of a many-body state.
//!
//! The N fermions of a normalized state are split into a kept group of
//! N_A particles and a traced-out group of N_B = N - N_A. The reduced
//! density matrix on the kept group is
//!
//!   ρ_A(i, j) = (1/C(N, N_A)) Σ_b σ(i,b) σ(j,b) ψ*(i∪b) ψ(j∪b)
//!
//! where b runs over the complementary basis, i∪b is the merged word (zero
//! overlap required) and σ the fermionic sign of interleaving the two
//! ordered mode strings. Summed over all momentum sectors of the kept
//! group the trace is one.
//!
//! The sum over b is embarrassingly parallel; each rayon job accumulates
//! its own packed Hermitian block and the blocks are reduced by addition.

use nalgebra::DVector;
use num_complex::Complex64;
use rayon::prelude::*;

use fock_matrix::HermitianMatrix;

use crate::bits::binomial;
use crate::error::{Result, SpaceError};
use crate::fermion_momentum::FermionMomentumSpace;

/// Sign of merging two disjoint ordered mode strings into one ordered
/// string: parity of the number of crossing pairs.
fn merge_sign(wa: u64, wb: u64) -> f64 {
    debug_assert_eq!(wa & wb, 0, "partition words overlap");
    let mut parity = 0u32;
    let mut rest = wb;
    while rest != 0 {
        let p = rest.trailing_zeros();
        // modes of the kept word above p cross this traced-out mode
        parity ^= (wa >> p).count_ones() & 1;
        rest &= rest - 1;
    }
    if parity == 0 {
        1.0
    } else {
        -1.0
    }
}

fn check_compatible(
    full: &FermionMomentumSpace,
    destination: &FermionMomentumSpace,
    complementary: &FermionMomentumSpace,
    ground_state: &DVector<Complex64>,
) -> Result<()> {
    if destination.nbr_site() != full.nbr_site() || complementary.nbr_site() != full.nbr_site() {
        return Err(SpaceError::IncompatibleQuantumNumbers(
            "partition spaces live on different lattices".into(),
        ));
    }
    if destination.nbr_fermions() + complementary.nbr_fermions() != full.nbr_fermions() {
        return Err(SpaceError::IncompatibleQuantumNumbers(format!(
            "partition {} + {} does not give {} fermions",
            destination.nbr_fermions(),
            complementary.nbr_fermions(),
            full.nbr_fermions()
        )));
    }
    let (nx, ny, nz) = full.nbr_site();
    let (ax, ay, az) = destination.sector();
    let (bx, by, bz) = complementary.sector();
    if (
        (ax + bx).rem_euclid(nx),
        (ay + by).rem_euclid(ny),
        (az + bz).rem_euclid(nz),
    ) != full.sector()
    {
        return Err(SpaceError::IncompatibleQuantumNumbers(
            "partition momenta do not add up to the full sector".into(),
        ));
    }
    if ground_state.len() as u64 != full.dim() {
        return Err(SpaceError::IncompatibleQuantumNumbers(format!(
            "state vector length {} does not match dimension {}",
            ground_state.len(),
            full.dim()
        )));
    }
    Ok(())
}

/// Reduced density matrix of a particle partition, in the momentum sector
/// of `destination`, tracing out `complementary`.
pub fn particle_partition_density_matrix(
    full: &FermionMomentumSpace,
    destination: &FermionMomentumSpace,
    complementary: &FermionMomentumSpace,
    ground_state: &DVector<Complex64>,
) -> Result<HermitianMatrix> {
    check_compatible(full, destination, complementary, ground_state)?;
    let dim_a = destination.dim() as usize;
    let dim_b = complementary.dim() as usize;

    let mut rho = (0..dim_b)
        .into_par_iter()
        .fold(
            || HermitianMatrix::zeros(dim_a),
            |mut acc, b| {
                accumulate_traced_state(
                    &mut acc,
                    full,
                    destination,
                    complementary.state_word(b),
                    ground_state,
                );
                acc
            },
        )
        .reduce(
            || HermitianMatrix::zeros(dim_a),
            |mut a, b| {
                a += &b;
                a
            },
        );

    rho /= binomial(full.nbr_fermions() as u64, destination.nbr_fermions() as u64) as f64;
    Ok(rho)
}

/// Contribution of one traced-out word: collect the amplitudes of every
/// kept state it combines with, then accumulate their outer product.
fn accumulate_traced_state(
    rho: &mut HermitianMatrix,
    full: &FermionMomentumSpace,
    destination: &FermionMomentumSpace,
    wb: u64,
    ground_state: &DVector<Complex64>,
) {
    let dim_a = destination.dim() as usize;
    let mut amplitudes: Vec<(usize, Complex64)> = Vec::new();
    for i in 0..dim_a {
        let wa = destination.state_word(i);
        if wa & wb != 0 {
            continue;
        }
        let Some(index) = full.find_state_index(wa | wb) else {
            continue;
        };
        let amp = ground_state[index] * merge_sign(wa, wb);
        if amp.norm_sqr() > 0.0 {
            amplitudes.push((i, amp));
        }
    }
    for (p, &(i, ci)) in amplitudes.iter().enumerate() {
        rho.add_to(i, i, ci * ci.conj());
        for &(j, cj) in &amplitudes[p + 1..] {
            // i < j since states were scanned in order
            rho.add_to(i, j, ci * cj.conj());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_state(dim: usize, seed: u64) -> DVector<Complex64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut v = DVector::from_fn(dim, |_, _| {
            Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
        });
        let norm = v.norm();
        v /= Complex64::new(norm, 0.0);
        v
    }

    #[test]
    fn test_merge_sign_crossings() {
        // kept mode 2, traced mode 0: one crossing pair? mode 2 is above 0
        assert_eq!(merge_sign(0b100, 0b001), -1.0);
        // kept mode 0, traced mode 2: no kept mode above 2
        assert_eq!(merge_sign(0b001, 0b100), 1.0);
        // kept modes 1,3 around traced mode 2: one crossing
        assert_eq!(merge_sign(0b1010, 0b0100), -1.0);
        assert_eq!(merge_sign(0, 0b1100), 1.0);
    }

    #[test]
    fn test_trace_sums_to_one_over_sectors() {
        // 2 fermions on a 2-site chain at total momentum 1; one kept
        // particle can carry momentum 0 or 1.
        let full = FermionMomentumSpace::new(2, (2, 1, 1), (1, 0, 0), None).unwrap();
        let psi = random_state(full.dim() as usize, 11);

        let mut trace = 0.0;
        for ka in 0..2 {
            let dest = FermionMomentumSpace::new(1, (2, 1, 1), (ka, 0, 0), None).unwrap();
            let comp = FermionMomentumSpace::new(1, (2, 1, 1), (1 - ka, 0, 0), None).unwrap();
            let rho = particle_partition_density_matrix(&full, &dest, &comp, &psi).unwrap();
            assert_eq!(rho.dim(), dest.dim() as usize);
            for i in 0..rho.dim() {
                assert!(rho.get(i, i).re > -1e-12, "negative diagonal weight");
            }
            trace += rho.trace();
        }
        assert!((trace - 1.0).abs() < 1e-12, "total trace {trace}");
    }

    #[test]
    fn test_slater_determinant_weights() {
        // A single basis state |m n⟩: each kept mode carries weight 1/2 on
        // the diagonal of its own momentum sector.
        let full = FermionMomentumSpace::new(2, (2, 1, 1), (1, 0, 0), None).unwrap();
        let mut psi = DVector::from_element(full.dim() as usize, Complex64::new(0.0, 0.0));
        psi[0] = Complex64::new(1.0, 0.0);
        let occupied = full.occupied_modes(0);

        for ka in 0..2 {
            let dest = FermionMomentumSpace::new(1, (2, 1, 1), (ka, 0, 0), None).unwrap();
            let comp = FermionMomentumSpace::new(1, (2, 1, 1), (1 - ka, 0, 0), None).unwrap();
            let rho = particle_partition_density_matrix(&full, &dest, &comp, &psi).unwrap();
            for i in 0..rho.dim() {
                let expected = if occupied.contains(&(dest.state_word(i).trailing_zeros() as usize))
                {
                    0.5
                } else {
                    0.0
                };
                assert!(
                    (rho.get(i, i).re - expected).abs() < 1e-14,
                    "sector {ka} state {i}"
                );
                for j in (i + 1)..rho.dim() {
                    assert!(rho.get(i, j).norm() < 1e-14, "off-diagonal in a determinant");
                }
            }
            assert!((rho.trace() - 0.5).abs() < 1e-14);
        }
    }

    #[test]
    fn test_incompatible_partition_rejected() {
        let full = FermionMomentumSpace::new(2, (2, 1, 1), (1, 0, 0), None).unwrap();
        let psi = random_state(full.dim() as usize, 3);
        let dest = FermionMomentumSpace::new(1, (2, 1, 1), (0, 0, 0), None).unwrap();
        // wrong complementary momentum: 0 + 0 ≠ 1 (mod 2)
        let comp = FermionMomentumSpace::new(1, (2, 1, 1), (0, 0, 0), None).unwrap();
        assert!(matches!(
            particle_partition_density_matrix(&full, &dest, &comp, &psi),
            Err(SpaceError::IncompatibleQuantumNumbers(_))
        ));
        // wrong particle split
        let comp2 = FermionMomentumSpace::new(2, (2, 1, 1), (1, 0, 0), None).unwrap();
        assert!(matches!(
            particle_partition_density_matrix(&full, &dest, &comp2, &psi),
            Err(SpaceError::IncompatibleQuantumNumbers(_))
        ));
    }
}
