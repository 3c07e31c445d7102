//! Spinful fermions on a periodic lattice, reduced by translations and
//! optionally by the spin-flip (Sz → -Sz) parity.
//!
//! Sites are grouped into max_x × max_y unit cells of `nbr_site /
//! (max_x·max_y)` sites each, ordered x-major: site s = (x·max_y + y)·cell
//! + u, two bits per site (bit 2s = spin down, bit 2s+1 = spin up). A
//! translation is then a cyclic rotation of the word (x) or of each
//! x-block (y), with the fermionic reordering sign of the wrapped
//! particles.
//!
//! The basis keeps one representative per group orbit, the smallest word,
//! together with its orbit size and the packed reordering signs of every
//! group element. Representatives whose stabilizer phase is incompatible
//! with the momentum (kx, ky) and parity sector are projected out.
//!
//! Operators return `(index, coefficient, tx, ty)`: the coefficient folds
//! the fermionic signs, the parity sector sign and the orbit rescaling
//! √(n_src/n_dst); the caller multiplies by the momentum phase
//! e^{-2πi(kx·tx/max_x + ky·ty/max_y)}.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::bits::{fermion_sign, field_mask, rotate_field_right};
use crate::error::{Result, SpaceError};
use crate::fermion_momentum::{AaResult, SMALL_DIM_LIMIT};
use crate::io;
use crate::lookup::StateLookup;

const DOWN_PATTERN: u64 = 0x5555_5555_5555_5555;

/// Quantum numbers and geometry of a translation-reduced space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationParams {
    pub nbr_fermions: i32,
    pub nbr_site: i32,
    /// Translation group extent and momentum along x.
    pub max_x: i32,
    pub kx: i32,
    /// Translation group extent and momentum along y.
    pub max_y: i32,
    pub ky: i32,
    /// Optional fixed spin-up count.
    pub nbr_spin_up: Option<i32>,
    /// Optional spin-flip parity sector (+1 or -1); adds the flip to the
    /// group and requires a spin-balanced particle count when the spin-up
    /// count is fixed.
    pub sz_parity: Option<i8>,
}

#[derive(Debug)]
struct ReducedBasis {
    states: Vec<u64>,
    orbit_sizes: Vec<i32>,
    /// One bit per group element, set when the element carries a negative
    /// reordering sign on the representative.
    reordering_signs: Vec<u64>,
    lookup: StateLookup,
    /// rescaling[n_src][n_dst] = √(n_src / n_dst).
    rescaling: Vec<Vec<f64>>,
}

/// Symmetry-reduced fermionic basis. Clones share the basis arrays.
#[derive(Debug, Clone)]
pub struct TranslationFermionSpace {
    params: TranslationParams,
    state_bits: u32,
    state_x_shift: u32,
    state_y_shift: u32,
    group_order: i32,
    dimension: u64,
    data: Arc<ReducedBasis>,
}

#[derive(Serialize, Deserialize)]
struct TranslationRecord {
    params: TranslationParams,
    dimension: u64,
    states: Vec<u64>,
    orbit_sizes: Vec<i32>,
    reordering_signs: Vec<u64>,
}

/// Emit every word with `nbr` fermions (optionally `nbr_up` of them
/// spin-up) on sites 0..=site, in strictly descending order.
fn visit_words<F: FnMut(u64)>(site: i32, nbr: i32, nbr_up: Option<i32>, acc: u64, emit: &mut F) {
    if let Some(up) = nbr_up {
        if up < 0 || up > nbr {
            return;
        }
    }
    if nbr == 0 {
        emit(acc);
        return;
    }
    if site < 0 {
        return;
    }
    let shift = 2 * site as u32;
    if nbr >= 2 {
        visit_words(
            site - 1,
            nbr - 2,
            nbr_up.map(|u| u - 1),
            acc | (0x3u64 << shift),
            emit,
        );
    }
    visit_words(
        site - 1,
        nbr - 1,
        nbr_up.map(|u| u - 1),
        acc | (0x2u64 << shift),
        emit,
    );
    visit_words(site - 1, nbr - 1, nbr_up, acc | (0x1u64 << shift), emit);
    visit_words(site - 1, nbr, nbr_up, acc, emit);
}

impl TranslationFermionSpace {
    /// Build the reduced basis of a momentum (and parity) sector.
    pub fn new(params: TranslationParams) -> Result<Self> {
        let (params, derived) = Self::validate(params)?;
        let scaffold = Self::empty(params, derived);

        let mut raw = Vec::new();
        visit_words(
            params.nbr_site - 1,
            params.nbr_fermions,
            params.nbr_spin_up,
            0,
            &mut |w| raw.push(w),
        );

        let mut states = Vec::new();
        let mut orbit_sizes = Vec::new();
        let mut reordering_signs = Vec::new();
        for w in raw {
            if let Some((orbit, signs)) = scaffold.classify(w)? {
                states.push(w);
                orbit_sizes.push(orbit);
                reordering_signs.push(signs);
            }
        }

        Self::from_parts(params, states, orbit_sizes, reordering_signs)
    }

    fn validate(params: TranslationParams) -> Result<(TranslationParams, (u32, u32, u32, i32))> {
        let TranslationParams {
            nbr_fermions,
            nbr_site,
            max_x,
            max_y,
            nbr_spin_up,
            sz_parity,
            ..
        } = params;
        if nbr_site < 1 || nbr_fermions < 0 || max_x < 1 || max_y < 1 {
            return Err(SpaceError::IncompatibleQuantumNumbers(format!(
                "{nbr_site} sites, {nbr_fermions} fermions, group {max_x}x{max_y}"
            )));
        }
        let state_bits = 2 * nbr_site as u32;
        if state_bits > 64 {
            return Err(SpaceError::CapacityExceeded {
                required_bits: state_bits,
            });
        }
        if nbr_site % (max_x * max_y) != 0 {
            return Err(SpaceError::IncompatibleQuantumNumbers(format!(
                "{nbr_site} sites not divisible by the {max_x}x{max_y} translation group"
            )));
        }
        if let Some(up) = nbr_spin_up {
            if up < 0 || up > nbr_fermions {
                return Err(SpaceError::IncompatibleQuantumNumbers(format!(
                    "{up} spin-up among {nbr_fermions} fermions"
                )));
            }
        }
        let flips = match sz_parity {
            None => 1,
            Some(p) if p == 1 || p == -1 => {
                if let Some(up) = nbr_spin_up {
                    if 2 * up != nbr_fermions {
                        return Err(SpaceError::IncompatibleQuantumNumbers(format!(
                            "spin-flip parity with {up} spin-up among {nbr_fermions} fermions"
                        )));
                    }
                }
                2
            }
            Some(p) => {
                return Err(SpaceError::IncompatibleQuantumNumbers(format!(
                    "spin-flip parity must be ±1, got {p}"
                )));
            }
        };
        let group_order = max_x * max_y * flips;
        if group_order > 64 {
            return Err(SpaceError::GroupTooLarge(group_order));
        }

        let state_x_shift = state_bits / max_x as u32;
        let state_y_shift = state_x_shift / max_y as u32;
        let params = TranslationParams {
            kx: params.kx.rem_euclid(max_x),
            ky: params.ky.rem_euclid(max_y),
            ..params
        };
        Ok((params, (state_bits, state_x_shift, state_y_shift, group_order)))
    }

    /// Space with the geometry set up but no basis yet; used to run the
    /// group machinery during construction.
    fn empty(params: TranslationParams, derived: (u32, u32, u32, i32)) -> Self {
        let (state_bits, state_x_shift, state_y_shift, group_order) = derived;
        TranslationFermionSpace {
            params,
            state_bits,
            state_x_shift,
            state_y_shift,
            group_order,
            dimension: 0,
            data: Arc::new(ReducedBasis {
                states: Vec::new(),
                orbit_sizes: Vec::new(),
                reordering_signs: Vec::new(),
                lookup: StateLookup::new(&[]),
                rescaling: Vec::new(),
            }),
        }
    }

    fn from_parts(
        params: TranslationParams,
        states: Vec<u64>,
        orbit_sizes: Vec<i32>,
        reordering_signs: Vec<u64>,
    ) -> Result<Self> {
        let (params, derived) = Self::validate(params)?;
        debug_assert!(
            states.windows(2).all(|w| w[0] > w[1]),
            "basis not strictly descending"
        );
        let group_order = derived.3;
        let mut rescaling = vec![vec![0.0; group_order as usize + 1]; group_order as usize + 1];
        for (a, row) in rescaling.iter_mut().enumerate().skip(1) {
            for (b, r) in row.iter_mut().enumerate().skip(1) {
                *r = (a as f64 / b as f64).sqrt();
            }
        }
        let dimension = states.len() as u64;
        let lookup = StateLookup::new(&states);
        let mut space = Self::empty(params, derived);
        space.dimension = dimension;
        space.data = Arc::new(ReducedBasis {
            states,
            orbit_sizes,
            reordering_signs,
            lookup,
            rescaling,
        });
        Ok(space)
    }

    // --- group action -----------------------------------------------------

    /// Translate one step along x: cyclic right rotation of the whole word
    /// by an x-block. The wrapped fermions pass the remaining ones.
    fn apply_x(&self, word: u64, sign: f64) -> (u64, f64) {
        let wrapped = (word & field_mask(self.state_x_shift)).count_ones() as i32;
        let others = self.params.nbr_fermions - wrapped;
        let sign = if (wrapped * others) % 2 == 1 { -sign } else { sign };
        (
            rotate_field_right(word, self.state_x_shift, self.state_bits),
            sign,
        )
    }

    /// Translate one step along y: rotate each x-block independently.
    fn apply_y(&self, word: u64, sign: f64) -> (u64, f64) {
        let bx = self.state_x_shift;
        let mut out = 0u64;
        let mut sign = sign;
        for b in 0..self.params.max_x as u32 {
            let block = (word >> (b * bx)) & field_mask(bx);
            let in_block = block.count_ones() as i32;
            let wrapped = (block & field_mask(self.state_y_shift)).count_ones() as i32;
            if (wrapped * (in_block - wrapped)) % 2 == 1 {
                sign = -sign;
            }
            out |= rotate_field_right(block, self.state_y_shift, bx) << (b * bx);
        }
        (out, sign)
    }

    /// Exchange the spin species. Each doubly occupied site swaps a pair
    /// of adjacent operators, contributing a minus sign.
    fn apply_flip(&self, word: u64, sign: f64) -> (u64, f64) {
        let down = word & DOWN_PATTERN;
        let up = word & (DOWN_PATTERN << 1);
        let doubles = (word & (word >> 1) & DOWN_PATTERN).count_ones();
        let sign = if doubles % 2 == 1 { -sign } else { sign };
        ((down << 1) | (up >> 1), sign)
    }

    /// Apply every group element to `word`. Entry e holds the image and
    /// reordering sign of element e = ((f·max_y + ty)·max_x + tx).
    fn orbit_table(&self, word: u64) -> Vec<(u64, f64)> {
        let flips = if self.params.sz_parity.is_some() { 2 } else { 1 };
        let mut table = Vec::with_capacity(self.group_order as usize);
        for f in 0..flips {
            let (wf, sf) = if f == 0 {
                (word, 1.0)
            } else {
                self.apply_flip(word, 1.0)
            };
            let mut wy = wf;
            let mut sy = sf;
            for ty in 0..self.params.max_y {
                if ty > 0 {
                    (wy, sy) = self.apply_y(wy, sy);
                }
                let mut wx = wy;
                let mut sx = sy;
                for tx in 0..self.params.max_x {
                    if tx > 0 {
                        (wx, sx) = self.apply_x(wx, sx);
                    }
                    table.push((wx, sx));
                }
            }
        }
        table
    }

    fn decode_element(&self, e: usize) -> (i32, i32, bool) {
        let tx = e as i32 % self.params.max_x;
        let r = e as i32 / self.params.max_x;
        (tx, r % self.params.max_y, r / self.params.max_y == 1)
    }

    /// Smallest orbit word of `word`, with the transporting element and
    /// its reordering sign.
    fn canonicalize(&self, word: u64) -> (u64, i32, i32, bool, f64) {
        let mut best = word;
        let mut best_e = 0;
        let mut best_sign = 1.0;
        for (e, (gw, s)) in self.orbit_table(word).into_iter().enumerate() {
            if gw < best {
                best = gw;
                best_e = e;
                best_sign = s;
            }
        }
        let (tx, ty, f) = self.decode_element(best_e);
        (best, tx, ty, f, best_sign)
    }

    /// Decide whether `word` is a surviving representative.
    ///
    /// Returns the orbit size and the packed reordering signs, or `None`
    /// when the word is not the smallest of its orbit or when a stabilizer
    /// element carries a phase incompatible with the sector: acceptance
    /// requires σ_g·p^f = e^{2πi(kx·tx/max_x + ky·ty/max_y)} for every
    /// stabilizing g, tested in exact integer arithmetic.
    fn classify(&self, word: u64) -> Result<Option<(i32, u64)>> {
        let (mx, my) = (self.params.max_x, self.params.max_y);
        let parity = self.params.sz_parity.unwrap_or(1) as f64;
        let mut signs: u64 = 0;
        let mut stabilizer = 0i32;
        for (e, (gw, s)) in self.orbit_table(word).into_iter().enumerate() {
            if gw < word {
                return Ok(None);
            }
            if s < 0.0 {
                signs |= 1u64 << e;
            }
            if gw == word {
                let (tx, ty, f) = self.decode_element(e);
                let total = if f { s * parity } else { s };
                let mut num = 2 * (self.params.kx * tx * my + self.params.ky * ty * mx);
                if total < 0.0 {
                    num += mx * my;
                }
                if num.rem_euclid(2 * mx * my) != 0 {
                    return Ok(None);
                }
                stabilizer += 1;
            }
        }
        if self.group_order % stabilizer != 0 {
            return Err(SpaceError::OrbitSizeInvalid {
                stabilizer,
                group_order: self.group_order,
            });
        }
        Ok(Some((self.group_order / stabilizer, signs)))
    }

    /// Map an operator-result word back into the reduced basis.
    fn transported(
        &self,
        word: u64,
        sign: f64,
        src_orbit: i32,
    ) -> Option<(usize, f64, i32, i32)> {
        let (best, tx, ty, f, tsign) = self.canonicalize(word);
        let j = self.data.lookup.find(&self.data.states, best)?;
        let mut c = sign * tsign
            * self.data.rescaling[src_orbit as usize][self.data.orbit_sizes[j] as usize];
        if f {
            c *= self.params.sz_parity.unwrap_or(1) as f64;
        }
        Some((j, c, tx, ty))
    }

    // --- accessors ---------------------------------------------------------

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
        self.params.nbr_fermions
    }

    pub fn nbr_site(&self) -> i32 {
        self.params.nbr_site
    }

    /// Number of spin-orbital modes (two per site).
    pub fn nbr_modes(&self) -> usize {
        2 * self.params.nbr_site as usize
    }

    pub fn momentum(&self) -> (i32, i32) {
        (self.params.kx, self.params.ky)
    }

    pub fn max_x(&self) -> i32 {
        self.params.max_x
    }

    pub fn max_y(&self) -> i32 {
        self.params.max_y
    }

    pub fn sz_parity(&self) -> Option<i8> {
        self.params.sz_parity
    }

    pub fn nbr_spin_up(&self) -> Option<i32> {
        self.params.nbr_spin_up
    }

    pub fn group_order(&self) -> i32 {
        self.group_order
    }

    /// Representative word of the `index`-th basis state.
    pub fn state_word(&self, index: usize) -> u64 {
        self.data.states[index]
    }

    /// Orbit size of the `index`-th representative.
    pub fn orbit_size(&self, index: usize) -> i32 {
        self.data.orbit_sizes[index]
    }

    /// Reordering sign of the group element (tx, ty, flip) applied to the
    /// `index`-th representative, from the packed sign table.
    pub fn reordering_sign(&self, index: usize, tx: i32, ty: i32, flipped: bool) -> f64 {
        let f = flipped as i32;
        let e = ((f * self.params.max_y + ty) * self.params.max_x + tx) as u32;
        debug_assert!((e as i32) < self.group_order);
        if (self.data.reordering_signs[index] >> e) & 1 == 1 {
            -1.0
        } else {
            1.0
        }
    }

    // --- operators ---------------------------------------------------------

    /// Diagonal occupation of spin-orbital mode m on the representative.
    /// Exact for group-invariant diagonal sums, which take the same value
    /// on every orbit member.
    pub fn ad_a_diagonal(&self, index: usize, m: usize) -> f64 {
        ((self.data.states[index] >> m) & 1) as f64
    }

    /// Apply a†_m a_n and transport back to a representative. Returns
    /// `(index, coefficient, tx, ty)`; the caller applies the momentum
    /// phase for (tx, ty).
    pub fn ad_a(&self, index: usize, m: usize, n: usize) -> Option<(usize, f64, i32, i32)> {
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
        self.transported(w | (1u64 << m), sign, self.data.orbit_sizes[index])
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

    /// Apply a†_{m1} a†_{m2} (rightmost first) to a pending [`AaResult`]
    /// obtained from [`Self::aa`] on the state at `src_index`.
    pub fn ad_ad(
        &self,
        src_index: usize,
        pending: &AaResult,
        m1: usize,
        m2: usize,
    ) -> Option<(usize, f64, i32, i32)> {
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
        self.transported(w, sign, self.data.orbit_sizes[src_index])
    }

    /// Apply a†_{m1} a†_{m2} a_{n1} a_{n2}.
    pub fn ad_ad_a_a(
        &self,
        index: usize,
        m1: usize,
        m2: usize,
        n1: usize,
        n2: usize,
    ) -> Option<(usize, f64, i32, i32)> {
        let pending = self.aa(index, n1, n2)?;
        self.ad_ad(index, &pending, m1, m2)
    }

    /// Apply a string of annihilation operators (rightmost first),
    /// returning the caller-owned intermediate for [`Self::prod_ad`].
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
    /// pending [`AaResult`] obtained from [`Self::prod_a`] on the state at
    /// `src_index`, then transport back to a representative.
    pub fn prod_ad(
        &self,
        src_index: usize,
        pending: &AaResult,
        modes: &[usize],
    ) -> Option<(usize, f64, i32, i32)> {
        let mut w = pending.word;
        let mut sign = pending.sign;
        for &m in modes.iter().rev() {
            if (w >> m) & 1 == 1 {
                return None;
            }
            sign *= fermion_sign(w, m as u32);
            w |= 1u64 << m;
        }
        self.transported(w, sign, self.data.orbit_sizes[src_index])
    }

    /// Render a representative as per-site occupations: `2` doubly
    /// occupied, `u`/`d` singly, `.` empty.
    pub fn state_string(&self, index: usize) -> String {
        let word = self.data.states[index];
        let mut out = String::from("[");
        for s in 0..self.params.nbr_site {
            if s > 0 {
                out.push(' ');
            }
            let pair = (word >> (2 * s)) & 0x3;
            out.push(match pair {
                0x3 => '2',
                0x2 => 'u',
                0x1 => 'd',
                _ => '.',
            });
        }
        out.push(']');
        out
    }

    // --- persistence ---------------------------------------------------------

    /// Persist the reduced basis (versioned binary envelope).
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        io::write_envelope(
            path,
            &TranslationRecord {
                params: self.params,
                dimension: self.dimension,
                states: self.data.states.clone(),
                orbit_sizes: self.data.orbit_sizes.clone(),
                reordering_signs: self.data.reordering_signs.clone(),
            },
        )
    }

    /// Load a persisted basis, rebuilding the lookup and rescaling tables
    /// and re-validating the recorded dimension.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let rec: TranslationRecord = io::read_envelope(path)?;
        if rec.states.len() as u64 != rec.dimension
            || rec.orbit_sizes.len() != rec.states.len()
            || rec.reordering_signs.len() != rec.states.len()
        {
            return Err(SpaceError::DimensionMismatch {
                counted: rec.dimension,
                generated: rec.states.len() as u64,
            });
        }
        Self::from_parts(rec.params, rec.states, rec.orbit_sizes, rec.reordering_signs)
    }
}
