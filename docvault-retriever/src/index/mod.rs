//! Vector indices with parallel metadata bookkeeping.
//!
//! A [`VectorIndex`] pairs an append-only nearest-neighbor structure with a
//! map from slot index to [`SlotRecord`]. Slots are assigned monotonically
//! on insert and identify vectors positionally; the record map carries the
//! logical identity (document, chunk) plus the tombstone flag. The two
//! stay in lockstep: the record map has exactly one entry per stored
//! vector, except transiently during a rebuild swap, and a slot that has
//! somehow lost its record is skipped and logged rather than surfaced.
//!
//! Deletion is soft: the nearest-neighbor structure offers no cheap
//! in-place removal, so [`VectorIndex::remove_document`] flips tombstones
//! and [`VectorIndex::rebuild`] is the only path that reclaims storage,
//! producing a fresh structure with fresh contiguous slots.

pub mod ann;
pub mod persistence;

use ann::{AnnIndex, IndexKind, NearestNeighbor};
use docvault_embed::l2_normalize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, RetrieverError};

/// Metadata for a whole-document vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub model_name: String,
    pub dimension: usize,
    pub document_type: Option<String>,
    /// Unix timestamp (seconds) of indexing time.
    pub created_at: i64,
    pub active: bool,
}

/// Metadata for a chunk vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub document_id: String,
    /// Position within the parent document; contiguous from 0.
    pub ordinal: u32,
    /// Absolute byte offsets of the chunk in the document text.
    pub span_start: usize,
    pub span_end: usize,
    pub chunk_type: String,
    /// The chunk text, kept for snippet display in search results.
    pub excerpt: String,
    pub document_type: Option<String>,
    pub created_at: i64,
    pub active: bool,
    pub usage_count: u64,
}

/// The record stored alongside each vector slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotRecord {
    Document(DocumentRecord),
    Chunk(ChunkRecord),
}

impl SlotRecord {
    pub fn document_id(&self) -> &str {
        match self {
            SlotRecord::Document(r) => &r.document_id,
            SlotRecord::Chunk(r) => &r.document_id,
        }
    }

    pub fn document_type(&self) -> Option<&str> {
        match self {
            SlotRecord::Document(r) => r.document_type.as_deref(),
            SlotRecord::Chunk(r) => r.document_type.as_deref(),
        }
    }

    pub fn created_at(&self) -> i64 {
        match self {
            SlotRecord::Document(r) => r.created_at,
            SlotRecord::Chunk(r) => r.created_at,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            SlotRecord::Document(r) => r.active,
            SlotRecord::Chunk(r) => r.active,
        }
    }

    fn set_active(&mut self, active: bool) {
        match self {
            SlotRecord::Document(r) => r.active = active,
            SlotRecord::Chunk(r) => r.active = active,
        }
    }

    pub fn as_chunk(&self) -> Option<&ChunkRecord> {
        match self {
            SlotRecord::Chunk(r) => Some(r),
            SlotRecord::Document(_) => None,
        }
    }
}

/// A single search result from one index: slot, similarity, and a copy of
/// the record (owned, so results can cross thread boundaries).
#[derive(Debug, Clone)]
pub struct SlotMatch {
    pub slot: usize,
    pub similarity: f32,
    pub record: SlotRecord,
}

/// An append-only vector index plus its metadata map.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    ann: AnnIndex,
    records: BTreeMap<usize, SlotRecord>,
}

impl VectorIndex {
    pub fn new(kind: IndexKind, dimension: usize) -> Self {
        Self {
            ann: AnnIndex::new(kind, dimension),
            records: BTreeMap::new(),
        }
    }

    /// Reassemble an index from persisted parts. Used by the persistence
    /// layer, which has already validated that `vectors` holds
    /// `records.len()` vectors of the right dimension; the approximate
    /// structure (if any) is retrained from the raw vectors.
    pub(crate) fn from_parts(
        kind: IndexKind,
        dimension: usize,
        vectors: &[f32],
        records: BTreeMap<usize, SlotRecord>,
    ) -> Self {
        let mut ann = AnnIndex::new(kind, dimension);
        for vector in vectors.chunks_exact(dimension) {
            ann.push(vector);
        }
        Self { ann, records }
    }

    pub fn kind(&self) -> IndexKind {
        self.ann.kind()
    }

    pub fn dimension(&self) -> usize {
        self.ann.dimension()
    }

    /// Total stored vectors, tombstoned ones included.
    pub fn total_count(&self) -> usize {
        self.ann.len()
    }

    /// Vectors whose records are still active.
    pub fn active_count(&self) -> usize {
        self.records.values().filter(|r| r.is_active()).count()
    }

    pub fn record(&self, slot: usize) -> Option<&SlotRecord> {
        self.records.get(&slot)
    }

    pub fn records(&self) -> &BTreeMap<usize, SlotRecord> {
        &self.records
    }

    pub fn vector(&self, slot: usize) -> Option<&[f32]> {
        self.ann.vector(slot)
    }

    /// Whether any active record belongs to `document_id`.
    pub fn contains_active_document(&self, document_id: &str) -> bool {
        self.records
            .values()
            .any(|r| r.is_active() && r.document_id() == document_id)
    }

    /// Validate, normalize, and append a vector with its record.
    ///
    /// On a dimension mismatch the index is left completely unchanged.
    pub fn insert(&mut self, vector: &[f32], record: SlotRecord) -> Result<usize> {
        if vector.len() != self.dimension() {
            return Err(RetrieverError::DimensionMismatch {
                expected: self.dimension(),
                actual: vector.len(),
            });
        }
        let mut normalized = vector.to_vec();
        l2_normalize(&mut normalized);

        let slot = self.ann.push(&normalized);
        self.records.insert(slot, record);
        Ok(slot)
    }

    /// Top-k active records by cosine similarity, filtered to
    /// `similarity >= threshold`. Returns fewer than k when there are not
    /// enough active candidates; an empty index yields an empty result.
    pub fn search(&self, query: &[f32], k: usize, threshold: f32) -> Result<Vec<SlotMatch>> {
        if query.len() != self.dimension() {
            return Err(RetrieverError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        if self.ann.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut normalized = query.to_vec();
        l2_normalize(&mut normalized);

        // Fetch enough extra candidates to absorb tombstones; exact for the
        // flat index, best-effort for approximate ones.
        let inactive = self.total_count() - self.active_count();
        let fetch = k.saturating_add(inactive).min(self.total_count());

        let mut matches = Vec::new();
        for (slot, similarity) in self.ann.search(&normalized, fetch) {
            if similarity < threshold {
                break; // candidates are sorted descending
            }
            match self.records.get(&slot) {
                None => {
                    tracing::warn!(slot, "vector slot has no metadata record; skipping");
                }
                Some(record) if record.is_active() => {
                    matches.push(SlotMatch {
                        slot,
                        similarity,
                        record: record.clone(),
                    });
                    if matches.len() >= k {
                        break;
                    }
                }
                Some(_) => {} // tombstoned
            }
        }
        Ok(matches)
    }

    /// Tombstone every record belonging to `document_id`; returns how many
    /// were flipped. The vectors stay physically present until rebuild.
    pub fn remove_document(&mut self, document_id: &str) -> usize {
        let mut removed = 0;
        for record in self.records.values_mut() {
            if record.is_active() && record.document_id() == document_id {
                record.set_active(false);
                removed += 1;
            }
        }
        removed
    }

    /// Bump usage counts for chunk hits. Each entry pairs a slot with the
    /// chunk id observed at search time; entries that no longer line up
    /// (e.g. after a rebuild reassigned slots) are ignored.
    pub fn record_usage(&mut self, hits: &[(usize, String)]) {
        for (slot, chunk_id) in hits {
            if let Some(SlotRecord::Chunk(chunk)) = self.records.get_mut(slot) {
                if &chunk.chunk_id == chunk_id {
                    chunk.usage_count += 1;
                }
            }
        }
    }

    /// Build a brand-new index containing only the active records, with
    /// fresh contiguous slots. This is the only point where tombstoned
    /// vector storage is reclaimed.
    pub fn rebuild(&self) -> VectorIndex {
        let mut fresh = VectorIndex::new(self.kind(), self.dimension());
        for (slot, record) in &self.records {
            if !record.is_active() {
                continue;
            }
            match self.ann.vector(*slot) {
                Some(vector) => {
                    let new_slot = fresh.ann.push(vector);
                    fresh.records.insert(new_slot, record.clone());
                }
                None => {
                    tracing::warn!(slot, "record has no stored vector; dropping on rebuild");
                }
            }
        }
        fresh
    }
}
