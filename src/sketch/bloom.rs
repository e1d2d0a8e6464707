use std::sync::atomic::{AtomicU64, Ordering};

/// Hash count used for every filter.
const NUM_DERIVATIONS: usize = 3;

/// Bits per expected element. ~10 bits with 3 probes keeps the false-positive
/// rate around 1-2% at the design cardinality.
const BITS_PER_ELEMENT: usize = 10;

/// Default expected k-mer cardinality for a metagenomic sample.
const DEFAULT_CAPACITY: usize = 1 << 22;

/// Approximate set of previously seen k-mer hashes.
///
/// When enabled, the read sketcher only offers a k-mer to the MinHash once the
/// filter has seen it before, suppressing singleton k-mers from sequencing
/// errors. The bitfield is atomic so one filter can be shared by all mapping
/// workers without a lock.
pub struct BloomFilter {
    bits: Vec<AtomicU64>,
    mask: u64,
}

impl BloomFilter {
    /// Size the bitfield for an expected number of distinct k-mers.
    pub fn with_capacity(expected: usize) -> Self {
        let nbits = (expected.max(64) * BITS_PER_ELEMENT).next_power_of_two();
        let words = nbits / 64;
        let mut bits = Vec::with_capacity(words);
        bits.resize_with(words, || AtomicU64::new(0));
        BloomFilter {
            bits,
            mask: (nbits - 1) as u64,
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Three independent bit positions derived from one 64-bit hash.
    #[inline]
    fn positions(&self, value: u64) -> [u64; NUM_DERIVATIONS] {
        let mut out = [0u64; NUM_DERIVATIONS];
        let mut x = value;
        for slot in out.iter_mut() {
            // splitmix64 finalisation step; each round yields a fresh probe
            x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = x;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^= z >> 31;
            *slot = z & self.mask;
        }
        out
    }

    /// Mark `value` as seen and report whether it was (possibly) seen before.
    pub fn observe(&self, value: u64) -> bool {
        let mut seen = true;
        for pos in self.positions(value) {
            let word = (pos / 64) as usize;
            let bit = 1u64 << (pos % 64);
            let prev = self.bits[word].fetch_or(bit, Ordering::Relaxed);
            if prev & bit == 0 {
                seen = false;
            }
        }
        seen
    }

    /// Membership test without insertion.
    pub fn contains(&self, value: u64) -> bool {
        self.positions(value).iter().all(|&pos| {
            let word = (pos / 64) as usize;
            let bit = 1u64 << (pos % 64);
            self.bits[word].load(Ordering::Relaxed) & bit != 0
        })
    }

    /// Clear the filter.
    pub fn reset(&mut self) {
        for word in &mut self.bits {
            *word.get_mut() = 0;
        }
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new()
    }
}
