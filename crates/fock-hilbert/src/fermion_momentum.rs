//! Spinful fermions on a periodic Nx×Ny×Nz lattice in momentum space.
//!
//! Basis states are bit-packed words with two bits per momentum orbital:
//! bit 2o = spin down, bit 2o+1 = spin up, o = (kx·Ny + ky)·Nz + kz.
//! Conserved quantum numbers: particle number, total momentum modulo the
//! lattice extents, and optionally the number of spin-up particles.
//!
//! Counting and enumeration share one recursion parameterized by a
//! visitor; the basis is generated in strictly descending word order, and
//! a two-level [`StateLookup`] resolves word → index queries.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::bits::fermion_sign;
use crate::error::{Result, SpaceError};
use crate::io;
use crate::lookup::StateLookup;

/// Dimensions at or above this no longer fit the legacy 32-bit field.
pub(crate) const SMALL_DIM_LIMIT: u64 = 1 << 30;

/// Intermediate result of a string of annihilation operators: the
/// surviving word and the accumulated fermionic sign. Caller-owned, so
/// the staged `aa` → `ad_ad` protocol needs no mutable space state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AaResult {
    pub word: u64,
    pub sign: f64,
}

#[derive(Debug)]
struct BasisData {
    states: Vec<u64>,
    lookup: StateLookup,
}

/// Fermionic momentum-space basis with spin on a 3-D periodic lattice.
///
/// Clones share the basis arrays.
#[derive(Debug, Clone)]
pub struct FermionMomentumSpace {
    nbr_fermions: i32,
    nbr_site: (i32, i32, i32),
    sector: (i32, i32, i32),
    nbr_spin_up: Option<i32>,
    nbr_orbitals: i32,
    dimension: u64,
    data: Arc<BasisData>,
}

struct Geometry {
    nx: i32,
    ny: i32,
    nz: i32,
    sector: (i32, i32, i32),
}

impl Geometry {
    /// Shared count/generate recursion.
    ///
    /// Walks orbitals from the highest momentum downward; a kz underflow
    /// borrows from ky, a ky underflow from kx. Each orbital branches
    /// into doubly occupied / up / down / empty (in that order, keeping
    /// the emitted words strictly descending) and adds its momentum to
    /// the running totals. A leaf is accepted when every total matches
    /// the sector modulo the lattice extent and the spin-up budget, if
    /// fixed, is exactly spent.
    #[allow(clippy::too_many_arguments)]
    fn visit<F: FnMut(u64)>(
        &self,
        nbr: i32,
        nbr_up: Option<i32>,
        cx: i32,
        cy: i32,
        mut cz: i32,
        totals: (i32, i32, i32),
        acc: u64,
        emit: &mut F,
    ) {
        let mut cy = cy;
        let mut cx = cx;
        if cz < 0 {
            cz = self.nz - 1;
            cy -= 1;
            if cy < 0 {
                cy = self.ny - 1;
                cx -= 1;
            }
        }
        if let Some(up) = nbr_up {
            if up < 0 || up > nbr {
                return;
            }
        }
        if nbr == 0 {
            if totals.0 % self.nx == self.sector.0
                && totals.1 % self.ny == self.sector.1
                && totals.2 % self.nz == self.sector.2
            {
                emit(acc);
            }
            return;
        }
        if cx < 0 {
            return;
        }

        let orbital = (cx * self.ny + cy) * self.nz + cz;
        let shift = 2 * orbital as u32;

        if nbr >= 2 {
            self.visit(
                nbr - 2,
                nbr_up.map(|u| u - 1),
                cx,
                cy,
                cz - 1,
                (totals.0 + 2 * cx, totals.1 + 2 * cy, totals.2 + 2 * cz),
                acc | (0x3u64 << shift),
                emit,
            );
        }
        self.visit(
            nbr - 1,
            nbr_up.map(|u| u - 1),
            cx,
            cy,
            cz - 1,
            (totals.0 + cx, totals.1 + cy, totals.2 + cz),
            acc | (0x2u64 << shift),
            emit,
        );
        self.visit(
            nbr - 1,
            nbr_up,
            cx,
            cy,
            cz - 1,
            (totals.0 + cx, totals.1 + cy, totals.2 + cz),
            acc | (0x1u64 << shift),
            emit,
        );
        self.visit(nbr, nbr_up, cx, cy, cz - 1, totals, acc, emit);
    }
}

#[derive(Serialize, Deserialize)]
struct FermionRecord {
    nbr_fermions: i32,
    nbr_site: (i32, i32, i32),
    sector: (i32, i32, i32),
    nbr_spin_up: Option<i32>,
    dimension: u64,
    states: Vec<u64>,
}

impl FermionMomentumSpace {
    /// Build the basis of a momentum sector.
    ///
    /// `nbr_site` are the lattice extents (use extent 1 along unused
    /// directions), `sector` the conserved total momentum (reduced modulo
    /// the extents), `nbr_spin_up` an optional fixed spin-up count.
    pub fn new(
        nbr_fermions: i32,
        nbr_site: (i32, i32, i32),
        sector: (i32, i32, i32),
        nbr_spin_up: Option<i32>,
    ) -> Result<Self> {
        let (nx, ny, nz) = nbr_site;
        if nx < 1 || ny < 1 || nz < 1 || nbr_fermions < 0 {
            return Err(SpaceError::IncompatibleQuantumNumbers(format!(
                "lattice {nx}x{ny}x{nz} with {nbr_fermions} fermions"
            )));
        }
        let nbr_orbitals = nx * ny * nz;
        let required_bits = 2 * nbr_orbitals as u32;
        if required_bits > 64 {
            return Err(SpaceError::CapacityExceeded { required_bits });
        }
        if let Some(up) = nbr_spin_up {
            if up < 0 || up > nbr_fermions {
                return Err(SpaceError::IncompatibleQuantumNumbers(format!(
                    "{up} spin-up among {nbr_fermions} fermions"
                )));
            }
        }
        let sector = (
            sector.0.rem_euclid(nx),
            sector.1.rem_euclid(ny),
            sector.2.rem_euclid(nz),
        );

        let geom = Geometry { nx, ny, nz, sector };
        let mut counted: u64 = 0;
        geom.visit(
            nbr_fermions,
            nbr_spin_up,
            nx - 1,
            ny - 1,
            nz - 1,
            (0, 0, 0),
            0,
            &mut |_| counted += 1,
        );

        let mut states = Vec::with_capacity(counted as usize);
        geom.visit(
            nbr_fermions,
            nbr_spin_up,
            nx - 1,
            ny - 1,
            nz - 1,
            (0, 0, 0),
            0,
            &mut |w| states.push(w),
        );
        if states.len() as u64 != counted {
            return Err(SpaceError::DimensionMismatch {
                counted,
                generated: states.len() as u64,
            });
        }

        Self::from_states(nbr_fermions, nbr_site, sector, nbr_spin_up, states)
    }

    fn from_states(
        nbr_fermions: i32,
        nbr_site: (i32, i32, i32),
        sector: (i32, i32, i32),
        nbr_spin_up: Option<i32>,
        states: Vec<u64>,
    ) -> Result<Self> {
        debug_assert!(
            states.windows(2).all(|w| w[0] > w[1]),
            "basis not strictly descending"
        );
        let dimension = states.len() as u64;
        let lookup = StateLookup::new(&states);
        Ok(FermionMomentumSpace {
            nbr_fermions,
            nbr_site,
            sector,
            nbr_spin_up,
            nbr_orbitals: nbr_site.0 * nbr_site.1 * nbr_site.2,
            dimension,
            data: Arc::new(BasisData { states, lookup }),
        })
    }

    /// Basis dimension.
    pub fn dim(&self) -> u64 {
        self.dimension
    }

    /// Dimension as a 32-bit count, `None` once it no longer fits the
    /// legacy field.
    pub fn small_dim(&self) -> Option<u32> {
        if self.dimension < SMALL_DIM_LIMIT {
            Some(self.dimension as u32)
        } else {
            None
        }
    }

    pub fn nbr_fermions(&self) -> i32 {
        self.nbr_fermions
    }

    pub fn nbr_orbitals(&self) -> i32 {
        self.nbr_orbitals
    }

    /// Number of spin-orbital modes (two per orbital).
    pub fn nbr_modes(&self) -> usize {
        2 * self.nbr_orbitals as usize
    }

    pub fn nbr_site(&self) -> (i32, i32, i32) {
        self.nbr_site
    }

    pub fn sector(&self) -> (i32, i32, i32) {
        self.sector
    }

    pub fn nbr_spin_up(&self) -> Option<i32> {
        self.nbr_spin_up
    }

    /// Packed word of the `index`-th basis state.
    pub fn state_word(&self, index: usize) -> u64 {
        self.data.states[index]
    }

    /// Index of a packed word, `None` when it lies outside the sector.
    pub fn find_state_index(&self, word: u64) -> Option<usize> {
        self.data.lookup.find(&self.data.states, word)
    }

    /// Index of the basis state occupying exactly the listed spin-orbital
    /// modes, `None` when that configuration lies outside the sector.
    pub fn find_modes_index(&self, modes: &[usize]) -> Option<usize> {
        let mut word = 0u64;
        for &m in modes {
            if m >= self.nbr_modes() {
                return None;
            }
            word |= 1u64 << m;
        }
        self.find_state_index(word)
    }

    /// Momenta (kx, ky, kz) of orbital `o`.
    pub fn orbital_momenta(&self, o: i32) -> (i32, i32, i32) {
        let (_, ny, nz) = self.nbr_site;
        let kz = o % nz;
        let r = o / nz;
        (r / ny, r % ny, kz)
    }

    /// Diagonal occupation ⟨i|a†_m a_m|i⟩ of spin-orbital mode m.
    pub fn ad_a_diagonal(&self, index: usize, m: usize) -> f64 {
        ((self.data.states[index] >> m) & 1) as f64
    }

    /// Apply a†_m a_n; `None` when annihilating an empty mode or hitting
    /// Pauli blocking.
    pub fn ad_a(&self, index: usize, m: usize, n: usize) -> Option<(usize, f64)> {
        let word = self.data.states[index];
        if (word >> n) & 1 == 0 {
            return None;
        }
        let mut sign = fermion_sign(word, n as u32);
        let w = word & !(1u64 << n);
        if (w >> m) & 1 == 1 {
            return None;
        }
        sign *= fermion_sign(w, m as u32);
        self.find_state_index(w | (1u64 << m)).map(|i| (i, sign))
    }

    /// Apply a_{n1} a_{n2} (rightmost first), returning the caller-owned
    /// intermediate for a following [`Self::ad_ad`].
    pub fn aa(&self, index: usize, n1: usize, n2: usize) -> Option<AaResult> {
        let word = self.data.states[index];
        if n1 == n2 || (word >> n1) & 1 == 0 || (word >> n2) & 1 == 0 {
            return None;
        }
        let mut sign = fermion_sign(word, n2 as u32);
        let w = word & !(1u64 << n2);
        sign *= fermion_sign(w, n1 as u32);
        Some(AaResult {
            word: w & !(1u64 << n1),
            sign,
        })
    }

    /// Apply a†_{m1} a†_{m2} (rightmost first) to a pending [`AaResult`].
    pub fn ad_ad(&self, pending: &AaResult, m1: usize, m2: usize) -> Option<(usize, f64)> {
        if m1 == m2 {
            return None;
        }
        let mut w = pending.word;
        let mut sign = pending.sign;
        if (w >> m2) & 1 == 1 {
            return None;
        }
        sign *= fermion_sign(w, m2 as u32);
        w |= 1u64 << m2;
        if (w >> m1) & 1 == 1 {
            return None;
        }
        sign *= fermion_sign(w, m1 as u32);
        w |= 1u64 << m1;
        self.find_state_index(w).map(|i| (i, sign))
    }

    /// Apply a†_{m1} a†_{m2} a_{n1} a_{n2}.
    pub fn ad_ad_a_a(
        &self,
        index: usize,
        m1: usize,
        m2: usize,
        n1: usize,
        n2: usize,
    ) -> Option<(usize, f64)> {
        let pending = self.aa(index, n1, n2)?;
        self.ad_ad(&pending, m1, m2)
    }

    /// Apply a string of annihilation operators (rightmost first).
    pub fn prod_a(&self, index: usize, modes: &[usize]) -> Option<AaResult> {
        let mut w = self.data.states[index];
        let mut sign = 1.0;
        for &n in modes.iter().rev() {
            if (w >> n) & 1 == 0 {
                return None;
            }
            sign *= fermion_sign(w, n as u32);
            w &= !(1u64 << n);
        }
        Some(AaResult { word: w, sign })
    }

    /// Apply a string of creation operators (rightmost first) to a
    /// pending [`AaResult`].
    pub fn prod_ad(&self, pending: &AaResult, modes: &[usize]) -> Option<(usize, f64)> {
        let mut w = pending.word;
        let mut sign = pending.sign;
        for &m in modes.iter().rev() {
            if (w >> m) & 1 == 1 {
                return None;
            }
            sign *= fermion_sign(w, m as u32);
            w |= 1u64 << m;
        }
        self.find_state_index(w).map(|i| (i, sign))
    }

    /// Occupied spin-orbital modes of a basis state, ascending.
    pub fn occupied_modes(&self, index: usize) -> Vec<usize> {
        let word = self.data.states[index];
        (0..self.nbr_modes()).filter(|&m| (word >> m) & 1 == 1).collect()
    }

    /// Render a state as its occupied orbitals, e.g. `[(0,1,0,-)(1,0,0,+)]`.
    pub fn state_string(&self, index: usize) -> String {
        let word = self.data.states[index];
        let mut out = String::from("[");
        for o in 0..self.nbr_orbitals {
            let (kx, ky, kz) = self.orbital_momenta(o);
            if (word >> (2 * o)) & 1 == 1 {
                out.push_str(&format!("({kx},{ky},{kz},-)"));
            }
            if (word >> (2 * o + 1)) & 1 == 1 {
                out.push_str(&format!("({kx},{ky},{kz},+)"));
            }
        }
        out.push(']');
        out
    }

    /// Persist the basis (versioned binary envelope).
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        io::write_envelope(
            path,
            &FermionRecord {
                nbr_fermions: self.nbr_fermions,
                nbr_site: self.nbr_site,
                sector: self.sector,
                nbr_spin_up: self.nbr_spin_up,
                dimension: self.dimension,
                states: self.data.states.clone(),
            },
        )
    }

    /// Load a persisted basis, rebuilding the lookup tables and
    /// re-validating the recorded dimension.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let rec: FermionRecord = io::read_envelope(path)?;
        if rec.states.len() as u64 != rec.dimension {
            return Err(SpaceError::DimensionMismatch {
                counted: rec.dimension,
                generated: rec.states.len() as u64,
            });
        }
        Self::from_states(
            rec.nbr_fermions,
            rec.nbr_site,
            rec.sector,
            rec.nbr_spin_up,
            rec.states,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::binomial;

    fn total_momentum(space: &FermionMomentumSpace, index: usize) -> (i32, i32, i32) {
        let (nx, ny, nz) = space.nbr_site();
        let mut t = (0, 0, 0);
        for m in space.occupied_modes(index) {
            let (kx, ky, kz) = space.orbital_momenta((m / 2) as i32);
            t = (t.0 + kx, t.1 + ky, t.2 + kz);
        }
        (t.0 % nx, t.1 % ny, t.2 % nz)
    }

    #[test]
    fn test_sector_dimensions_sum_to_free_count() {
        // 3 fermions on a 2x2 lattice: 4 orbitals, 8 spin-orbital modes.
        // Summed over the 4 momentum sectors the dimensions must give
        // C(8,3) = 56.
        let mut total = 0;
        for kx in 0..2 {
            for ky in 0..2 {
                let space = FermionMomentumSpace::new(3, (2, 2, 1), (kx, ky, 0), None).unwrap();
                total += space.dim();
            }
        }
        assert_eq!(total, binomial(8, 3));
    }

    #[test]
    fn test_sector_dimensions_with_fixed_spin_up() {
        // 2 up + 1 down on 2x2: sum over sectors = C(4,2)·C(4,1) = 24.
        let mut total = 0;
        for kx in 0..2 {
            for ky in 0..2 {
                let space =
                    FermionMomentumSpace::new(3, (2, 2, 1), (kx, ky, 0), Some(2)).unwrap();
                total += space.dim();
            }
        }
        assert_eq!(total, binomial(4, 2) * binomial(4, 1));
    }

    #[test]
    fn test_states_descending_and_in_sector() {
        let space = FermionMomentumSpace::new(3, (2, 1, 2), (1, 0, 1), None).unwrap();
        assert!(space.dim() > 0);
        for i in 0..space.dim() as usize {
            if i > 0 {
                assert!(space.state_word(i - 1) > space.state_word(i));
            }
            assert_eq!(total_momentum(&space, i), space.sector());
            assert_eq!(space.occupied_modes(i).len(), 3);
        }
    }

    #[test]
    fn test_lookup_round_trip_and_miss() {
        let space = FermionMomentumSpace::new(2, (4, 1, 1), (0, 0, 0), None).unwrap();
        for i in 0..space.dim() as usize {
            assert_eq!(space.find_state_index(space.state_word(i)), Some(i));
        }
        // Moving one particle to a different orbital changes the total
        // momentum, so the word must miss.
        let w = space.state_word(0);
        let m = (0..space.nbr_modes()).find(|&m| (w >> m) & 1 == 1).unwrap();
        let free = (0..space.nbr_modes())
            .find(|&f| (w >> f) & 1 == 0 && f / 2 != m / 2)
            .unwrap();
        let outside = (w & !(1u64 << m)) | (1u64 << free);
        assert_eq!(space.find_state_index(outside), None);
    }

    #[test]
    fn test_find_modes_index_round_trip() {
        let space = FermionMomentumSpace::new(3, (2, 2, 1), (1, 1, 0), None).unwrap();
        assert!(space.dim() > 0);
        for i in 0..space.dim() as usize {
            assert_eq!(space.find_modes_index(&space.occupied_modes(i)), Some(i));
        }
        // wrong particle count and out-of-range modes both miss
        assert_eq!(space.find_modes_index(&[0, 1]), None);
        assert_eq!(space.find_modes_index(&[0, 1, space.nbr_modes()]), None);
    }

    #[test]
    fn test_ad_a_hermitian_pairing() {
        let space = FermionMomentumSpace::new(2, (4, 1, 1), (1, 0, 0), None).unwrap();
        let modes = space.nbr_modes();
        for i in 0..space.dim() as usize {
            for m in 0..modes {
                for n in 0..modes {
                    if let Some((j, c)) = space.ad_a(i, m, n) {
                        if m == n {
                            continue;
                        }
                        let back = space.ad_a(j, n, m);
                        assert_eq!(
                            back,
                            Some((i, c)),
                            "a†_{n} a_{m} does not invert a†_{m} a_{n} at state {i}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_staged_aa_ad_ad_matches_composed() {
        let space = FermionMomentumSpace::new(3, (2, 2, 1), (1, 1, 0), None).unwrap();
        let modes = space.nbr_modes();
        for i in 0..space.dim() as usize {
            for n1 in 0..modes {
                for n2 in 0..modes {
                    let Some(pending) = space.aa(i, n1, n2) else {
                        continue;
                    };
                    for m1 in 0..modes {
                        for m2 in 0..modes {
                            assert_eq!(
                                space.ad_ad(&pending, m1, m2),
                                space.ad_ad_a_a(i, m1, m2, n1, n2)
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_pauli_blocking() {
        let space = FermionMomentumSpace::new(3, (2, 2, 1), (0, 0, 0), None).unwrap();
        let i = 0;
        let occupied = space.occupied_modes(i);
        let empty = (0..space.nbr_modes())
            .find(|m| !occupied.contains(m))
            .unwrap();
        // annihilating an empty mode
        assert!(space.aa(i, empty, occupied[0]).is_none());
        // repeated annihilation of the same mode
        assert!(space.aa(i, occupied[0], occupied[0]).is_none());
        // creating on a still-occupied mode
        let pending = space.aa(i, occupied[0], occupied[1]).unwrap();
        assert!(space.ad_ad(&pending, occupied[2], occupied[2]).is_none());
        assert!(space
            .ad_ad(&pending, occupied[2], occupied[0])
            .map(|(j, _)| j != i)
            .unwrap_or(true));
    }

    #[test]
    fn test_prod_a_prod_ad_round_trip() {
        let space = FermionMomentumSpace::new(3, (2, 2, 1), (0, 0, 0), None).unwrap();
        for i in 0..space.dim() as usize {
            let occ = space.occupied_modes(i);
            let pending = space.prod_a(i, &occ).unwrap();
            assert_eq!(pending.word, 0);
            // recreating descending onto the vacuum adds no further sign
            let (back, sign) = space.prod_ad(&pending, &occ).unwrap();
            assert_eq!(back, i);
            assert_eq!(sign, pending.sign);
        }
    }

    #[test]
    fn test_small_dim() {
        let space = FermionMomentumSpace::new(2, (4, 1, 1), (0, 0, 0), None).unwrap();
        assert_eq!(space.small_dim(), Some(space.dim() as u32));
    }

    #[test]
    fn test_idempotent_construction() {
        let a = FermionMomentumSpace::new(3, (2, 2, 1), (1, 0, 0), Some(2)).unwrap();
        let b = FermionMomentumSpace::new(3, (2, 2, 1), (1, 0, 0), Some(2)).unwrap();
        assert_eq!(a.dim(), b.dim());
        for i in 0..a.dim() as usize {
            assert_eq!(a.state_word(i), b.state_word(i));
        }
    }

    #[test]
    fn test_capacity_and_parameter_errors() {
        assert!(matches!(
            FermionMomentumSpace::new(2, (33, 1, 1), (0, 0, 0), None),
            Err(SpaceError::CapacityExceeded { .. })
        ));
        assert!(matches!(
            FermionMomentumSpace::new(2, (2, 2, 1), (0, 0, 0), Some(3)),
            Err(SpaceError::IncompatibleQuantumNumbers(_))
        ));
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("space.bin");
        let space = FermionMomentumSpace::new(3, (2, 2, 1), (1, 1, 0), Some(1)).unwrap();
        space.write_to_file(&path).unwrap();
        let back = FermionMomentumSpace::read_from_file(&path).unwrap();
        assert_eq!(back.dim(), space.dim());
        assert_eq!(back.sector(), space.sector());
        for i in 0..space.dim() as usize {
            assert_eq!(back.state_word(i), space.state_word(i));
            assert_eq!(back.find_state_index(space.state_word(i)), Some(i));
        }
    }

    #[test]
    fn test_state_string_lists_occupied_orbitals() {
        let space = FermionMomentumSpace::new(2, (2, 1, 1), (0, 0, 0), None).unwrap();
        for i in 0..space.dim() as usize {
            let s = space.state_string(i);
            assert!(s.starts_with('[') && s.ends_with(']'));
            assert_eq!(s.matches('(').count(), 2, "two occupied modes in {s}");
        }
    }
}
