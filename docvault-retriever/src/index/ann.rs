//! Nearest-neighbor structures behind the vector index.
//!
//! The capability is a trait contract so index internals stay pluggable:
//! an implementation stores L2-normalized vectors in insertion order and
//! answers top-k inner-product queries (== cosine similarity on unit
//! vectors). Two implementations ship:
//!
//! - [`FlatIndex`]: exact scan, O(n) per query. Correct top-k, the right
//!   choice until the vector count makes scans too slow.
//! - [`IvfFlatIndex`]: inverted-file clustering. Trades a small recall loss
//!   for sub-linear queries once trained; below its training threshold it
//!   scans exactly like the flat index.
//!
//! Cluster and probe counts are explicit tunables, not auto-derived; the
//! defaults live on [`IndexKind::ivf_flat_default`].

use serde::{Deserialize, Serialize};

/// Contract for an append-only nearest-neighbor structure.
///
/// Callers hand in vectors that are already validated against the index
/// dimension and L2-normalized. Slots are assigned monotonically: `push`
/// returns the previous vector count, and slots are never reused for the
/// lifetime of the structure.
pub trait NearestNeighbor {
    /// Dimension every stored vector must have.
    fn dimension(&self) -> usize;

    /// Number of stored vectors (tombstoned vectors included).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a normalized vector, returning its slot.
    fn push(&mut self, vector: &[f32]) -> usize;

    /// Top-k slots by inner product, descending; ties break on slot order.
    /// May return fewer than k when fewer vectors are stored or reachable.
    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)>;

    /// The stored vector at `slot`, if any.
    fn vector(&self, slot: usize) -> Option<&[f32]>;
}

/// Which nearest-neighbor structure an index uses.
///
/// Exact (flat) search is guaranteed-correct top-k at O(n) query cost.
/// `IvfFlat` is worth it once the vector count passes roughly
/// `nlist * 8` (its training threshold).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexKind {
    Flat,
    IvfFlat { nlist: usize, nprobe: usize },
}

impl IndexKind {
    /// IVF with the default tunables: 100 clusters, 8 probed per query.
    pub fn ivf_flat_default() -> Self {
        IndexKind::IvfFlat {
            nlist: 100,
            nprobe: 8,
        }
    }
}

/// The concrete structures, dispatched by [`IndexKind`].
#[derive(Debug, Clone)]
pub enum AnnIndex {
    Flat(FlatIndex),
    IvfFlat(IvfFlatIndex),
}

impl AnnIndex {
    pub fn new(kind: IndexKind, dimension: usize) -> Self {
        match kind {
            IndexKind::Flat => AnnIndex::Flat(FlatIndex::new(dimension)),
            IndexKind::IvfFlat { nlist, nprobe } => {
                AnnIndex::IvfFlat(IvfFlatIndex::new(dimension, nlist, nprobe))
            }
        }
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            AnnIndex::Flat(_) => IndexKind::Flat,
            AnnIndex::IvfFlat(ivf) => IndexKind::IvfFlat {
                nlist: ivf.nlist,
                nprobe: ivf.nprobe,
            },
        }
    }
}

impl NearestNeighbor for AnnIndex {
    fn dimension(&self) -> usize {
        match self {
            AnnIndex::Flat(inner) => inner.dimension(),
            AnnIndex::IvfFlat(inner) => inner.dimension(),
        }
    }

    fn len(&self) -> usize {
        match self {
            AnnIndex::Flat(inner) => inner.len(),
            AnnIndex::IvfFlat(inner) => inner.len(),
        }
    }

    fn push(&mut self, vector: &[f32]) -> usize {
        match self {
            AnnIndex::Flat(inner) => inner.push(vector),
            AnnIndex::IvfFlat(inner) => inner.push(vector),
        }
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        match self {
            AnnIndex::Flat(inner) => inner.search(query, k),
            AnnIndex::IvfFlat(inner) => inner.search(query, k),
        }
    }

    fn vector(&self, slot: usize) -> Option<&[f32]> {
        match self {
            AnnIndex::Flat(inner) => inner.vector(slot),
            AnnIndex::IvfFlat(inner) => inner.vector(slot),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Rank `candidates` (slot, similarity) descending, ties by slot, keep k.
fn top_k(mut candidates: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    candidates.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    candidates.truncate(k);
    candidates
}

/// Exact inner-product scan over a flat vector array.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }
}

impl NearestNeighbor for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    fn push(&mut self, vector: &[f32]) -> usize {
        let slot = self.len();
        self.data.extend_from_slice(vector);
        slot
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let candidates = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(slot, stored)| (slot, dot(query, stored)))
            .collect();
        top_k(candidates, k)
    }

    fn vector(&self, slot: usize) -> Option<&[f32]> {
        let start = slot.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }
}

/// How many vectors per cluster must exist before k-means training runs.
const TRAIN_FACTOR: usize = 8;
/// Fixed Lloyd iteration count; deterministic by construction.
const KMEANS_ITERATIONS: usize = 10;

/// Inverted-file index: vectors are bucketed under their nearest centroid,
/// and queries scan only the `nprobe` most promising buckets.
///
/// Until `nlist * TRAIN_FACTOR` vectors have been inserted the index is
/// untrained and queries fall back to an exact scan, so small indices pay
/// no recall penalty. Training is deterministic: centroids seed from
/// evenly-spaced stored vectors and run a fixed number of Lloyd iterations.
#[derive(Debug, Clone)]
pub struct IvfFlatIndex {
    dimension: usize,
    nlist: usize,
    nprobe: usize,
    data: Vec<f32>,
    centroids: Vec<f32>,
    lists: Vec<Vec<usize>>,
    trained: bool,
}

impl IvfFlatIndex {
    pub fn new(dimension: usize, nlist: usize, nprobe: usize) -> Self {
        let nlist = nlist.max(1);
        Self {
            dimension,
            nlist,
            nprobe: nprobe.clamp(1, nlist),
            data: Vec::new(),
            centroids: Vec::new(),
            lists: Vec::new(),
            trained: false,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    fn slot_vector(&self, slot: usize) -> &[f32] {
        &self.data[slot * self.dimension..(slot + 1) * self.dimension]
    }

    fn nearest_centroid(&self, vector: &[f32]) -> usize {
        let mut best = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (i, centroid) in self.centroids.chunks_exact(self.dimension).enumerate() {
            let score = dot(vector, centroid);
            if score > best_score {
                best_score = score;
                best = i;
            }
        }
        best
    }

    fn train(&mut self) {
        let count = self.len();
        let k = self.nlist.min(count);
        if k == 0 {
            return;
        }

        // Seed from evenly spaced stored vectors.
        let mut centroids = Vec::with_capacity(k * self.dimension);
        for i in 0..k {
            let slot = i * count / k;
            centroids.extend_from_slice(self.slot_vector(slot));
        }
        self.centroids = centroids;

        let mut assignments = vec![0usize; count];
        for _ in 0..KMEANS_ITERATIONS {
            for slot in 0..count {
                assignments[slot] = self.nearest_centroid(self.slot_vector(slot));
            }

            let mut sums = vec![0.0f32; k * self.dimension];
            let mut sizes = vec![0usize; k];
            for slot in 0..count {
                let cluster = assignments[slot];
                sizes[cluster] += 1;
                let target = &mut sums[cluster * self.dimension..(cluster + 1) * self.dimension];
                for (t, v) in target.iter_mut().zip(self.slot_vector(slot)) {
                    *t += v;
                }
            }
            for cluster in 0..k {
                if sizes[cluster] == 0 {
                    // Empty cluster keeps its previous centroid.
                    continue;
                }
                let target =
                    &mut sums[cluster * self.dimension..(cluster + 1) * self.dimension];
                let norm = target.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for value in target.iter_mut() {
                        *value /= norm;
                    }
                    self.centroids[cluster * self.dimension..(cluster + 1) * self.dimension]
                        .copy_from_slice(target);
                }
            }
        }

        let mut lists = vec![Vec::new(); k];
        for slot in 0..count {
            lists[self.nearest_centroid(self.slot_vector(slot))].push(slot);
        }
        self.lists = lists;
        self.trained = true;
        tracing::debug!(
            clusters = k,
            vectors = count,
            "trained inverted-file index"
        );
    }
}

impl NearestNeighbor for IvfFlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    fn push(&mut self, vector: &[f32]) -> usize {
        let slot = self.len();
        self.data.extend_from_slice(vector);
        if self.trained {
            let cluster = self.nearest_centroid(vector);
            self.lists[cluster].push(slot);
        } else if self.len() >= self.nlist * TRAIN_FACTOR {
            self.train();
        }
        slot
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if !self.trained {
            let candidates = self
                .data
                .chunks_exact(self.dimension)
                .enumerate()
                .map(|(slot, stored)| (slot, dot(query, stored)))
                .collect();
            return top_k(candidates, k);
        }

        let centroid_scores: Vec<(usize, f32)> = self
            .centroids
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(cluster, centroid)| (cluster, dot(query, centroid)))
            .collect();
        let probes = top_k(centroid_scores, self.nprobe);

        let mut candidates = Vec::new();
        for (cluster, _) in probes {
            for &slot in &self.lists[cluster] {
                candidates.push((slot, dot(query, self.slot_vector(slot))));
            }
        }
        top_k(candidates, k)
    }

    fn vector(&self, slot: usize) -> Option<&[f32]> {
        let start = slot.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }
}
