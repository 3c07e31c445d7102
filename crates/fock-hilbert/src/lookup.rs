//! Two-level state index over a descending-sorted basis.
//!
//! Level 1 buckets states by their highest set bit (contiguous ranges in a
//! descending-sorted array). Level 2 is a direct-address table on the
//! leading `min(h+1, max_lookup_bits)` bits of the word, narrowing each
//! query to a short range finished by binary search. Misses return `None`;
//! every caller must handle them.

use crate::bits::highest_bit;

/// Default width of the per-bucket direct-address tables.
pub const DEFAULT_LOOKUP_BITS: u32 = 14;

#[derive(Debug, Clone)]
struct Bucket {
    start: usize,
    end: usize,
    /// Right shift turning a word into its table key.
    shift: u32,
    /// `offsets[k]` = first position in the descending array whose key is ≤ k.
    offsets: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct StateLookup {
    /// Indexed by highest set bit; `None` for bits no state carries.
    buckets: Vec<Option<Bucket>>,
    /// Whether the (single) zero word closes the array.
    has_zero_word: bool,
}

impl StateLookup {
    /// Build the index for a strictly descending array of state words.
    pub fn new(states: &[u64]) -> Self {
        Self::with_lookup_bits(states, DEFAULT_LOOKUP_BITS)
    }

    /// Build with an explicit table width (memory/speed tradeoff).
    pub fn with_lookup_bits(states: &[u64], max_lookup_bits: u32) -> Self {
        debug_assert!(
            states.windows(2).all(|w| w[0] > w[1]),
            "basis must be strictly descending"
        );
        debug_assert!(max_lookup_bits >= 1);

        let has_zero_word = states.last() == Some(&0);
        let nonzero = if has_zero_word {
            &states[..states.len() - 1]
        } else {
            states
        };

        if nonzero.is_empty() {
            return StateLookup {
                buckets: Vec::new(),
                has_zero_word,
            };
        }

        let max_bit = highest_bit(nonzero[0]);
        let mut buckets: Vec<Option<Bucket>> = (0..=max_bit).map(|_| None).collect();

        let mut start = 0;
        while start < nonzero.len() {
            let h = highest_bit(nonzero[start]);
            let mut end = start + 1;
            while end < nonzero.len() && highest_bit(nonzero[end]) == h {
                end += 1;
            }

            let lookup_bits = (h + 1).min(max_lookup_bits);
            let shift = h + 1 - lookup_bits;
            let table_size = 1usize << lookup_bits;

            // Keys are non-increasing along the range; offsets[k] is the
            // first index whose key is ≤ k, so states with key exactly k
            // occupy [offsets[k], offsets[k-1]).
            let mut offsets = vec![end; table_size];
            let mut prev_key = table_size;
            for (i, &s) in nonzero[start..end].iter().enumerate() {
                let k = (s >> shift) as usize;
                if k < prev_key {
                    for slot in &mut offsets[k..prev_key] {
                        *slot = start + i;
                    }
                    prev_key = k;
                }
            }

            buckets[h as usize] = Some(Bucket {
                start,
                end,
                shift,
                offsets,
            });
            start = end;
        }

        StateLookup {
            buckets,
            has_zero_word,
        }
    }

    /// Index of `word` in the basis the lookup was built for.
    pub fn find(&self, states: &[u64], word: u64) -> Option<usize> {
        if word == 0 {
            return if self.has_zero_word {
                Some(states.len() - 1)
            } else {
                None
            };
        }
        let h = highest_bit(word) as usize;
        let bucket = self.buckets.get(h)?.as_ref()?;

        let key = (word >> bucket.shift) as usize;
        // key has its top bit set, so key ≥ 1 and key - 1 is in range.
        let lo = bucket.offsets[key];
        let hi = bucket.offsets[key - 1];

        let slice = &states[lo..hi];
        let mut a = 0;
        let mut b = slice.len();
        while a < b {
            let mid = (a + b) / 2;
            if slice[mid] == word {
                return Some(lo + mid);
            } else if slice[mid] > word {
                a = mid + 1;
            } else {
                b = mid;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descending(mut v: Vec<u64>) -> Vec<u64> {
        v.sort_unstable_by(|a, b| b.cmp(a));
        v.dedup();
        v
    }

    #[test]
    fn test_round_trip_dense_small() {
        let states: Vec<u64> = descending((1..200u64).collect());
        let lookup = StateLookup::new(&states);
        for (i, &s) in states.iter().enumerate() {
            assert_eq!(lookup.find(&states, s), Some(i), "word {s:#b}");
        }
    }

    #[test]
    fn test_round_trip_sparse_words() {
        let states = descending(vec![
            0b1100_0000_0001,
            0b1010_1010,
            0b1000_0000_0000_0001,
            0b111,
            0b101,
            1,
        ]);
        for bits in [1, 3, 8, 14] {
            let lookup = StateLookup::with_lookup_bits(&states, bits);
            for (i, &s) in states.iter().enumerate() {
                assert_eq!(lookup.find(&states, s), Some(i));
            }
            assert_eq!(lookup.find(&states, 0b110), None);
            assert_eq!(lookup.find(&states, 0b1_0000_0000), None);
            assert_eq!(lookup.find(&states, 0), None);
        }
    }

    #[test]
    fn test_zero_word() {
        let states = vec![0b10, 0b1, 0];
        let lookup = StateLookup::new(&states);
        assert_eq!(lookup.find(&states, 0), Some(2));
        assert_eq!(lookup.find(&states, 0b1), Some(1));
    }

    #[test]
    fn test_miss_above_all_buckets() {
        let states = vec![0b101, 0b100, 0b11];
        let lookup = StateLookup::new(&states);
        assert_eq!(lookup.find(&states, 1 << 40), None);
    }

    #[test]
    fn test_empty_basis() {
        let states: Vec<u64> = Vec::new();
        let lookup = StateLookup::new(&states);
        assert_eq!(lookup.find(&states, 5), None);
    }
}
