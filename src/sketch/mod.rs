//! MinHash sketching of nucleotide sequences.
//!
//! Two interchangeable flavours are implemented on top of the canonical
//! rolling hash: bottom-k (the smallest `s` distinct k-mer hashes) and KMV
//! (`s` parallel minima over derived hash streams). The flavour is chosen at
//! index-build time and fixed for the lifetime of the index.

pub mod bloom;
pub mod nthash;

use self::bloom::BloomFilter;
use self::nthash::NtHashIter;
use crate::errors::ArgotError;
use fxhash::FxHashSet;
use std::collections::BinaryHeap;

/// Bottom-k sketch: a max-heap of the smallest `size` distinct hashes.
pub struct BottomKSketch {
    size: usize,
    // BinaryHeap peeks the largest value, which is the eviction candidate
    heap: BinaryHeap<u64>,
    members: FxHashSet<u64>,
}

impl BottomKSketch {
    pub fn new(size: usize) -> Self {
        BottomKSketch {
            size,
            heap: BinaryHeap::with_capacity(size + 1),
            members: FxHashSet::default(),
        }
    }

    #[inline]
    fn push(&mut self, hash: u64) {
        if self.members.contains(&hash) {
            return;
        }
        if self.heap.len() < self.size {
            self.heap.push(hash);
            self.members.insert(hash);
        } else if let Some(&max) = self.heap.peek() {
            if hash < max {
                self.heap.pop();
                self.members.remove(&max);
                self.heap.push(hash);
                self.members.insert(hash);
            }
        }
    }

    /// Heap contents, sorted ascending.
    fn finish(self) -> Vec<u64> {
        let mut sketch = self.heap.into_vec();
        sketch.sort_unstable();
        sketch
    }
}

/// KMV sketch: `size` slots, each tracking the minimum of a derived stream.
pub struct KmvSketch {
    slots: Vec<u64>,
}

impl KmvSketch {
    pub fn new(size: usize) -> Self {
        KmvSketch {
            slots: vec![u64::MAX; size],
        }
    }

    #[inline]
    fn push(&mut self, base: u64) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            // derive one value per slot from the base hash
            let derived = base.wrapping_add((i as u64).wrapping_mul(base));
            if derived < *slot {
                *slot = derived;
            }
        }
    }

    fn finish(self) -> Vec<u64> {
        self.slots
    }
}

/// A MinHash sketcher of either flavour.
pub enum Sketcher {
    BottomK(BottomKSketch),
    Kmv(KmvSketch),
}

impl Sketcher {
    pub fn new(size: usize, kmv: bool) -> Self {
        if kmv {
            Sketcher::Kmv(KmvSketch::new(size))
        } else {
            Sketcher::BottomK(BottomKSketch::new(size))
        }
    }

    #[inline]
    pub fn push(&mut self, hash: u64) {
        match self {
            Sketcher::BottomK(s) => s.push(hash),
            Sketcher::Kmv(s) => s.push(hash),
        }
    }

    pub fn finish(self) -> Vec<u64> {
        match self {
            Sketcher::BottomK(s) => s.finish(),
            Sketcher::Kmv(s) => s.finish(),
        }
    }
}

/// Decompose a sequence to k-mers, hash them and collect the MinHash sketch.
///
/// * `bloom` – optional pre-filter; when present, a k-mer is only offered to
///   the sketcher once it has been observed before, suppressing singletons.
///
/// Fails with `SequenceTooShort` when `seq` holds no full k-mer.
pub fn sketch_sequence(
    seq: &[u8],
    k: usize,
    size: usize,
    kmv: bool,
    bloom: Option<&BloomFilter>,
) -> Result<Vec<u64>, ArgotError> {
    let mut sketcher = Sketcher::new(size, kmv);
    for hash in NtHashIter::new(seq, k)? {
        if let Some(filter) = bloom {
            if !filter.observe(hash) {
                continue;
            }
        }
        sketcher.push(hash);
    }
    Ok(sketcher.finish())
}

/// Jaccard estimate between two KMV sketches: the fraction of matching
/// positions over the shorter length.
pub fn kmv_similarity(a: &[u64], b: &[u64]) -> f64 {
    let shared = a.len().min(b.len());
    if shared == 0 {
        return 0.0;
    }
    let matches = (0..shared).filter(|&i| a[i] == b[i]).count();
    matches as f64 / shared as f64
}

/// Jaccard estimate between two bottom-k sketches: matching values in the
/// shared tail of the (ascending) sketches.
pub fn bottom_k_similarity(a: &[u64], b: &[u64]) -> f64 {
    let shared = a.len().min(b.len());
    if shared == 0 {
        return 0.0;
    }
    let matches = (1..=shared)
        .filter(|&i| a[a.len() - i] == b[b.len() - i])
        .count();
    matches as f64 / shared as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQ: &[u8] = b"ACTGCGTGCGTGAAACGTGCACGTGACGTG";
    const SEQ2: &[u8] = b"TTACCAATTGGACCTAGGAACCTTGGATCA";

    #[test]
    fn kmv_sketch_has_fixed_length() {
        let sketch = sketch_sequence(SEQ, 7, 10, true, None).unwrap();
        assert_eq!(sketch.len(), 10);
    }

    #[test]
    fn bottom_k_is_sorted_and_distinct() {
        let sketch = sketch_sequence(SEQ, 7, 10, false, None).unwrap();
        assert!(sketch.len() <= 10);
        assert!(sketch.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn too_short_sequences_are_rejected() {
        assert!(sketch_sequence(&SEQ[0..3], 7, 10, true, None).is_err());
        assert!(sketch_sequence(&SEQ[0..3], 7, 10, false, None).is_err());
    }

    #[test]
    fn identical_sequences_estimate_full_similarity() {
        let a = sketch_sequence(SEQ, 7, 10, true, None).unwrap();
        let b = sketch_sequence(SEQ, 7, 10, true, None).unwrap();
        assert_eq!(kmv_similarity(&a, &b), 1.0);

        let a = sketch_sequence(SEQ, 7, 10, false, None).unwrap();
        let b = sketch_sequence(SEQ, 7, 10, false, None).unwrap();
        assert_eq!(bottom_k_similarity(&a, &b), 1.0);
    }

    #[test]
    fn unrelated_sequences_estimate_low_similarity() {
        let a = sketch_sequence(SEQ, 7, 10, true, None).unwrap();
        let b = sketch_sequence(SEQ2, 7, 10, true, None).unwrap();
        assert!(kmv_similarity(&a, &b) < 0.3);
    }

    #[test]
    fn bloom_filter_suppresses_singletons() {
        // AAACCC holds four canonically distinct 3-mers, each seen once; with
        // a fresh filter nothing reaches the sketcher on the first pass
        let filter = BloomFilter::with_capacity(1024);
        let first = sketch_sequence(b"AAACCC", 3, 4, true, Some(&filter)).unwrap();
        assert!(first.iter().all(|&v| v == u64::MAX));

        // second pass: the filter has seen every k-mer, so the sketch matches
        // the unfiltered one
        let second = sketch_sequence(b"AAACCC", 3, 4, true, Some(&filter)).unwrap();
        let unfiltered = sketch_sequence(b"AAACCC", 3, 4, true, None).unwrap();
        assert_eq!(second, unfiltered);
    }
}
