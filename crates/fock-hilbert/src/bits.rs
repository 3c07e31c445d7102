//! Word-level helpers for bit-packed many-body states.
//!
//! Fermionic states are `u64` words with one bit per mode (two bits per
//! site for spinful fermions: bit 2s = spin down, bit 2s+1 = spin up).
//! Bosonic occupations use the stars-and-bars packing implemented in
//! [`crate::boson_momentum`].

/// Position of the highest set bit. `word` must be nonzero.
#[inline]
pub fn highest_bit(word: u64) -> u32 {
    debug_assert_ne!(word, 0);
    63 - word.leading_zeros()
}

/// Jordan-Wigner sign of the bit population strictly below `pos`:
/// +1 for even parity, -1 for odd. XOR parity fold.
#[inline]
pub fn fermion_sign(word: u64, pos: u32) -> f64 {
    debug_assert!(pos < 64);
    let mut masked = word & ((1u64 << pos) - 1);
    masked ^= masked >> 32;
    masked ^= masked >> 16;
    masked ^= masked >> 8;
    masked ^= masked >> 4;
    masked ^= masked >> 2;
    masked ^= masked >> 1;
    if masked & 1 == 0 {
        1.0
    } else {
        -1.0
    }
}

/// All-ones mask of the given width (width ≤ 64).
#[inline]
pub fn field_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Cyclic right rotation of the low `width` bits of `word`.
/// Requires 0 < shift < width; bits above `width` must be clear.
#[inline]
pub fn rotate_field_right(word: u64, shift: u32, width: u32) -> u64 {
    debug_assert!(shift > 0 && shift < width && width <= 64);
    debug_assert_eq!(word & !field_mask(width), 0);
    ((word >> shift) | (word << (width - shift))) & field_mask(width)
}

/// Binomial coefficient C(n, k).
pub fn binomial(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u64 = 1;
    for i in 0..k {
        result = result * (n - i) / (i + 1);
    }
    result
}
