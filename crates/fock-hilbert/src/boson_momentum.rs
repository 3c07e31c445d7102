//! Bosons on a periodic Nx×Ny lattice in momentum space, with bands.
//!
//! Occupations are packed in the stars-and-bars encoding: starting from
//! orbital 0 at the low end of the word, each orbital contributes `n_j`
//! ones followed by a zero separator — `N + M - 1` significant bits for
//! N bosons on M orbitals. The encoding preserves the lexicographic order
//! of occupation vectors read from the highest orbital, so the generator
//! emits strictly descending words just like the fermionic spaces.
//!
//! Orbital index: o = (kx·Ny + ky)·nbr_bands + band.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, SpaceError};
use crate::fermion_momentum::SMALL_DIM_LIMIT;
use crate::io;
use crate::lookup::StateLookup;

/// Intermediate result of a string of bosonic annihilation operators:
/// the depleted occupation vector and the squared-coefficient product.
#[derive(Debug, Clone)]
pub struct BosonAaResult {
    pub occupations: Vec<i32>,
    pub coefficient: f64,
}

/// Pack occupations into the stars-and-bars word.
pub fn occupations_to_word(occ: &[i32]) -> u64 {
    let mut word = 0u64;
    let mut pos = 0u32;
    for &n in occ {
        debug_assert!(n >= 0 && pos + n as u32 <= 64);
        if n > 0 {
            word |= ((1u64 << n) - 1) << pos;
        }
        pos += n as u32 + 1;
    }
    word
}

/// Unpack a stars-and-bars word into occupations.
pub fn word_to_occupations(mut word: u64, nbr_orbitals: usize) -> Vec<i32> {
    let mut occ = vec![0i32; nbr_orbitals];
    let mut j = 0;
    while word != 0 {
        if word & 1 == 1 {
            occ[j] += 1;
        } else {
            j += 1;
        }
        word >>= 1;
    }
    occ
}

#[derive(Debug)]
struct BasisData {
    states: Vec<u64>,
    lookup: StateLookup,
}

/// Bosonic momentum-space basis on a 2-D periodic lattice with bands.
///
/// Clones share the basis arrays.
#[derive(Debug, Clone)]
pub struct BosonMomentumSpace {
    nbr_bosons: i32,
    nbr_site: (i32, i32),
    nbr_bands: i32,
    sector: (i32, i32),
    nbr_orbitals: i32,
    dimension: u64,
    data: Arc<BasisData>,
}

struct Geometry {
    nx: i32,
    ny: i32,
    bands: i32,
    sector: (i32, i32),
}

impl Geometry {
    /// Shared count/generate recursion over occupation vectors.
    ///
    /// Walks orbitals (kx, ky, band) from the highest downward (a band
    /// underflow borrows from ky, a ky underflow from kx), placing
    /// `i = nbr..0` bosons per orbital so the emitted words descend.
    #[allow(clippy::too_many_arguments)]
    fn visit<F: FnMut(&[i32])>(
        &self,
        nbr: i32,
        cx: i32,
        cy: i32,
        mut cband: i32,
        totals: (i32, i32),
        occ: &mut Vec<i32>,
        emit: &mut F,
    ) {
        let mut cy = cy;
        let mut cx = cx;
        if cband < 0 {
            cband = self.bands - 1;
            cy -= 1;
            if cy < 0 {
                cy = self.ny - 1;
                cx -= 1;
            }
        }
        if nbr == 0 {
            if totals.0 % self.nx == self.sector.0 && totals.1 % self.ny == self.sector.1 {
                emit(occ);
            }
            return;
        }
        if cx < 0 {
            return;
        }

        let orbital = ((cx * self.ny + cy) * self.bands + cband) as usize;
        for i in (0..=nbr).rev() {
            occ[orbital] = i;
            self.visit(
                nbr - i,
                cx,
                cy,
                cband - 1,
                (totals.0 + i * cx, totals.1 + i * cy),
                occ,
                emit,
            );
        }
        occ[orbital] = 0;
    }
}

#[derive(Serialize, Deserialize)]
struct BosonRecord {
    nbr_bosons: i32,
    nbr_site: (i32, i32),
    nbr_bands: i32,
    sector: (i32, i32),
    dimension: u64,
    states: Vec<u64>,
}

impl BosonMomentumSpace {
    /// Build the basis of a momentum sector.
    pub fn new(
        nbr_bosons: i32,
        nbr_site: (i32, i32),
        nbr_bands: i32,
        sector: (i32, i32),
    ) -> Result<Self> {
        let (nx, ny) = nbr_site;
        if nx < 1 || ny < 1 || nbr_bands < 1 || nbr_bosons < 0 {
            return Err(SpaceError::IncompatibleQuantumNumbers(format!(
                "lattice {nx}x{ny} with {nbr_bands} bands and {nbr_bosons} bosons"
            )));
        }
        let nbr_orbitals = nx * ny * nbr_bands;
        let required_bits = (nbr_bosons + nbr_orbitals - 1) as u32;
        if required_bits > 64 {
            return Err(SpaceError::CapacityExceeded { required_bits });
        }
        let sector = (sector.0.rem_euclid(nx), sector.1.rem_euclid(ny));

        let geom = Geometry {
            nx,
            ny,
            bands: nbr_bands,
            sector,
        };
        let mut occ = vec![0i32; nbr_orbitals as usize];

        let mut counted: u64 = 0;
        geom.visit(
            nbr_bosons,
            nx - 1,
            ny - 1,
            nbr_bands - 1,
            (0, 0),
            &mut occ,
            &mut |_| counted += 1,
        );

        let mut states = Vec::with_capacity(counted as usize);
        geom.visit(
            nbr_bosons,
            nx - 1,
            ny - 1,
            nbr_bands - 1,
            (0, 0),
            &mut occ,
            &mut |occ| states.push(occupations_to_word(occ)),
        );
        if states.len() as u64 != counted {
            return Err(SpaceError::DimensionMismatch {
                counted,
                generated: states.len() as u64,
            });
        }

        Self::from_states(nbr_bosons, nbr_site, nbr_bands, sector, states)
    }

    fn from_states(
        nbr_bosons: i32,
        nbr_site: (i32, i32),
        nbr_bands: i32,
        sector: (i32, i32),
        states: Vec<u64>,
    ) -> Result<Self> {
        debug_assert!(
            states.windows(2).all(|w| w[0] > w[1]),
            "basis not strictly descending"
        );
        let dimension = states.len() as u64;
        let lookup = StateLookup::new(&states);
        Ok(BosonMomentumSpace {
            nbr_bosons,
            nbr_site,
            nbr_bands,
            sector,
            nbr_orbitals: nbr_site.0 * nbr_site.1 * nbr_bands,
            dimension,
            data: Arc::new(BasisData { states, lookup }),
        })
    }

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

    pub fn nbr_bosons(&self) -> i32 {
        self.nbr_bosons
    }

    pub fn nbr_orbitals(&self) -> i32 {
        self.nbr_orbitals
    }

    pub fn sector(&self) -> (i32, i32) {
        self.sector
    }

    /// Packed word of the `index`-th basis state.
    pub fn state_word(&self, index: usize) -> u64 {
        self.data.states[index]
    }

    /// Occupation vector of the `index`-th basis state.
    pub fn occupations(&self, index: usize) -> Vec<i32> {
        word_to_occupations(self.data.states[index], self.nbr_orbitals as usize)
    }

    /// Index of a packed word, `None` when it lies outside the sector.
    pub fn find_state_index(&self, word: u64) -> Option<usize> {
        self.data.lookup.find(&self.data.states, word)
    }

    /// Index of an occupation vector.
    pub fn find_occupations_index(&self, occ: &[i32]) -> Option<usize> {
        self.find_state_index(occupations_to_word(occ))
    }

    /// Momenta and band (kx, ky, band) of orbital `o`.
    pub fn orbital_quantum_numbers(&self, o: i32) -> (i32, i32, i32) {
        let band = o % self.nbr_bands;
        let r = o / self.nbr_bands;
        (r / self.nbr_site.1, r % self.nbr_site.1, band)
    }

    /// Diagonal occupation ⟨i|a†_m a_m|i⟩.
    pub fn ad_a_diagonal(&self, index: usize, m: usize) -> f64 {
        self.occupations(index)[m] as f64
    }

    /// Apply a†_m a_n with the bosonic √n coefficients.
    pub fn ad_a(&self, index: usize, m: usize, n: usize) -> Option<(usize, f64)> {
        let mut occ = self.occupations(index);
        if occ[n] == 0 {
            return None;
        }
        let mut c = occ[n] as f64;
        occ[n] -= 1;
        occ[m] += 1;
        c *= occ[m] as f64;
        let i = self.find_state_index(occupations_to_word(&occ))?;
        Some((i, c.sqrt()))
    }

    /// Apply a_{n1} a_{n2} (rightmost first), returning the caller-owned
    /// intermediate for a following [`Self::ad_ad`].
    pub fn aa(&self, index: usize, n1: usize, n2: usize) -> Option<BosonAaResult> {
        let mut occ = self.occupations(index);
        if occ[n2] == 0 {
            return None;
        }
        let mut c = occ[n2] as f64;
        occ[n2] -= 1;
        if occ[n1] == 0 {
            return None;
        }
        c *= occ[n1] as f64;
        occ[n1] -= 1;
        Some(BosonAaResult {
            occupations: occ,
            coefficient: c,
        })
    }

    /// Apply a†_{m1} a†_{m2} (rightmost first) to a pending [`BosonAaResult`].
    pub fn ad_ad(&self, pending: &BosonAaResult, m1: usize, m2: usize) -> Option<(usize, f64)> {
        let mut occ = pending.occupations.clone();
        let mut c = pending.coefficient;
        occ[m2] += 1;
        c *= occ[m2] as f64;
        occ[m1] += 1;
        c *= occ[m1] as f64;
        let i = self.find_state_index(occupations_to_word(&occ))?;
        Some((i, c.sqrt()))
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

    /// Apply a string of annihilation operators (rightmost first;
    /// repeated modes allowed).
    pub fn prod_a(&self, index: usize, modes: &[usize]) -> Option<BosonAaResult> {
        let mut occ = self.occupations(index);
        let mut c = 1.0;
        for &n in modes.iter().rev() {
            if occ[n] == 0 {
                return None;
            }
            c *= occ[n] as f64;
            occ[n] -= 1;
        }
        Some(BosonAaResult {
            occupations: occ,
            coefficient: c,
        })
    }

    /// Apply a string of creation operators (rightmost first) to a
    /// pending [`BosonAaResult`].
    pub fn prod_ad(&self, pending: &BosonAaResult, modes: &[usize]) -> Option<(usize, f64)> {
        let mut occ = pending.occupations.clone();
        let mut c = pending.coefficient;
        for &m in modes.iter().rev() {
            occ[m] += 1;
            c *= occ[m] as f64;
        }
        let i = self.find_state_index(occupations_to_word(&occ))?;
        Some((i, c.sqrt()))
    }

    /// Render a state as occupied orbitals with exponents, e.g.
    /// `[(0,0;0)^2 (1,0;1)]`.
    pub fn state_string(&self, index: usize) -> String {
        let occ = self.occupations(index);
        let mut out = String::from("[");
        let mut first = true;
        for (o, &n) in occ.iter().enumerate() {
            if n == 0 {
                continue;
            }
            if !first {
                out.push(' ');
            }
            first = false;
            let (kx, ky, band) = self.orbital_quantum_numbers(o as i32);
            if n == 1 {
                out.push_str(&format!("({kx},{ky};{band})"));
            } else {
                out.push_str(&format!("({kx},{ky};{band})^{n}"));
            }
        }
        out.push(']');
        out
    }

    /// Persist the basis (versioned binary envelope).
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        io::write_envelope(
            path,
            &BosonRecord {
                nbr_bosons: self.nbr_bosons,
                nbr_site: self.nbr_site,
                nbr_bands: self.nbr_bands,
                sector: self.sector,
                dimension: self.dimension,
                states: self.data.states.clone(),
            },
        )
    }

    /// Load a persisted basis, rebuilding lookup tables and re-validating
    /// the recorded dimension.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let rec: BosonRecord = io::read_envelope(path)?;
        if rec.states.len() as u64 != rec.dimension {
            return Err(SpaceError::DimensionMismatch {
                counted: rec.dimension,
                generated: rec.states.len() as u64,
            });
        }
        Self::from_states(
            rec.nbr_bosons,
            rec.nbr_site,
            rec.nbr_bands,
            rec.sector,
            rec.states,
        )
    }
}
