//! LSH forest over MinHash sketches.
//!
//! Sketches are split into `L` bands of `K` hashes; each band is stringified
//! and dropped into a hash table. After all inserts, the tables are
//! materialised as arrays sorted by band so queries can binary-search them.
//! `K` and `L` are chosen from the sketch size and a Jaccard threshold by
//! minimising the estimated false-positive plus false-negative probability.

pub mod store;

use crate::errors::ArgotError;
use crate::graph::windows::WindowKey;
use fxhash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Bytes per hash value in a stringified band.
const HASH_BYTES: usize = 8;

/// Integration step for the error-probability estimates.
const INTEGRATION_STEP: f64 = 0.01;

/// A band value and the keys whose sketch matches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Bucket {
    band: Vec<u8>,
    keys: Vec<String>,
}

/// The banded index.
///
/// `add` before `index()`, `query` after; both orders are enforced. After
/// `index()` the forest is immutable and queries need no synchronisation.
#[derive(Serialize, Deserialize)]
pub struct LshForest {
    k: usize,
    l: usize,
    sketch_size: usize,
    #[serde(skip)]
    initial_tables: Vec<FxHashMap<Vec<u8>, Vec<String>>>,
    tables: Vec<Vec<Bucket>>,
    /// Relates stringified keys back to graph locations.
    key_lookup: FxHashMap<String, WindowKey>,
    indexed: bool,
}

impl LshForest {
    /// Build an empty forest with `K`/`L` tuned for the sketch size and
    /// Jaccard similarity threshold.
    pub fn new(sketch_size: usize, jaccard_threshold: f64) -> Self {
        let (k, l, _, _) = optimise(sketch_size, jaccard_threshold);
        LshForest {
            k,
            l,
            sketch_size,
            initial_tables: vec![FxHashMap::default(); l],
            tables: vec![Vec::new(); l],
            key_lookup: FxHashMap::default(),
            indexed: false,
        }
    }

    /// (band width, band count)
    pub fn settings(&self) -> (usize, usize) {
        (self.k, self.l)
    }

    pub fn sketch_size(&self) -> usize {
        self.sketch_size
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.key_lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_lookup.is_empty()
    }

    /// Add a sketched window key to the forest.
    ///
    /// The sketch is banded into the initial hash tables and then discarded
    /// from the stored key to save space. A bottom-k sketch of a
    /// low-complexity window can hold fewer than `sketch_size` distinct
    /// hashes; only its complete bands are indexed, and a sketch too short
    /// to fill a single band is skipped. Returns whether the key was
    /// indexed. Sketches larger than the configured size are a usage error.
    pub fn add(&mut self, mut key: WindowKey) -> Result<bool, ArgotError> {
        if self.indexed {
            return Err(ArgotError::IndexFinalised);
        }
        if key.sketch.len() > self.sketch_size {
            return Err(ArgotError::SketchSizeMismatch {
                expected: self.sketch_size,
                got: key.sketch.len(),
            });
        }
        if key.sketch.len() < self.k {
            return Ok(false);
        }
        for (table, band) in self.initial_tables.iter_mut().zip(bands(&key.sketch, self.k)) {
            table.entry(band).or_default().push(key.id.clone());
        }
        key.sketch = Vec::new();
        self.key_lookup.insert(key.id.clone(), key);
        Ok(true)
    }

    /// Materialise the initial hash tables as sorted arrays. Must run once,
    /// after all inserts and before any query.
    pub fn index(&mut self) {
        for (table, sorted) in self.initial_tables.iter_mut().zip(self.tables.iter_mut()) {
            sorted.clear();
            sorted.extend(table.drain().map(|(band, keys)| Bucket { band, keys }));
            sorted.sort_unstable_by(|a, b| a.band.cmp(&b.band));
        }
        self.indexed = true;
    }

    /// Return the stringified keys of every indexed window whose sketch
    /// matches the query in at least one band.
    ///
    /// An under-filled bottom-k query sketch (a short or low-complexity
    /// read) is banded as far as it goes; a sketch too short to fill one
    /// band matches nothing. Neither is an error.
    pub fn query(&self, sketch: &[u64]) -> Result<Vec<String>, ArgotError> {
        if !self.indexed {
            return Err(ArgotError::IndexNotFinalised);
        }
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut results = Vec::new();
        for (table, band) in self.tables.iter().zip(bands(sketch, self.k)) {
            // first bucket with this band, then the contiguous run of matches
            let start = table.partition_point(|bucket| bucket.band < band);
            for bucket in &table[start..] {
                if bucket.band != band {
                    break;
                }
                for key in &bucket.keys {
                    if seen.insert(key) {
                        results.push(key.clone());
                    }
                }
            }
        }
        Ok(results)
    }

    /// Resolve a stringified key back to its structured form.
    ///
    /// A miss signals a corrupted index and is fatal to the caller.
    pub fn get_key(&self, id: &str) -> Result<&WindowKey, ArgotError> {
        self.key_lookup
            .get(id)
            .ok_or_else(|| ArgotError::KeyNotFound(id.to_string()))
    }
}

/// Split a sketch into `L` consecutive bands of `K` hashes, each stringified
/// as little-endian bytes.
fn bands(sketch: &[u64], k: usize) -> impl Iterator<Item = Vec<u8>> + '_ {
    sketch.chunks_exact(k).map(move |chunk| {
        let mut band = Vec::with_capacity(k * HASH_BYTES);
        for hash in chunk {
            band.extend_from_slice(&hash.to_le_bytes());
        }
        band
    })
}

/// Choose `(K, L)` minimising `P_fp + P_fn` subject to `K·L <= sketch_size`.
/// Also returns the error probabilities at the optimum.
pub fn optimise(sketch_size: usize, jaccard_threshold: f64) -> (usize, usize, f64, f64) {
    let mut best = (0usize, 0usize, 0.0f64, 0.0f64);
    let mut min_error = f64::MAX;
    for l in 1..=sketch_size {
        for k in 1..=sketch_size {
            if k * l > sketch_size {
                break;
            }
            let fp = false_positive_probability(k, l, jaccard_threshold);
            let fn_ = false_negative_probability(k, l, jaccard_threshold);
            if fp + fn_ < min_error {
                min_error = fp + fn_;
                best = (k, l, fp, fn_);
            }
        }
    }
    best
}

/// Probability that two sketches below the threshold still collide in some
/// band, integrated over similarities in `[0, t)`.
pub fn false_positive_probability(k: usize, l: usize, threshold: f64) -> f64 {
    integrate(
        |j| 1.0 - (1.0 - j.powi(k as i32)).powi(l as i32),
        0.0,
        threshold,
    )
}

/// Probability that two sketches above the threshold collide in no band,
/// integrated over similarities in `[t, 1]`.
pub fn false_negative_probability(k: usize, l: usize, threshold: f64) -> f64 {
    integrate(
        |j| (1.0 - j.powi(k as i32)).powi(l as i32),
        threshold,
        1.0,
    )
}

/// Midpoint-rule integration at the module's fixed step.
fn integrate(f: impl Fn(f64) -> f64, a: f64, b: f64) -> f64 {
    let mut area = 0.0;
    let mut x = a;
    while x < b {
        area += f(x + 0.5 * INTEGRATION_STEP) * INTEGRATION_STEP;
        x += INTEGRATION_STEP;
    }
    area
}
