//! Search request/response types and the ranking arithmetic.
//!
//! The functions here are pure: they take per-index match lists and produce
//! one deduplicated, ranked candidate list. The engine owns embedding and
//! index access; keeping the merge logic free of I/O makes the ranking
//! rules directly testable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::index::{SlotMatch, SlotRecord};

/// Which index levels a query consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Document,
    Chunk,
    Hybrid,
}

impl SearchType {
    pub fn includes_documents(&self) -> bool {
        matches!(self, SearchType::Document | SearchType::Hybrid)
    }

    pub fn includes_chunks(&self) -> bool {
        matches!(self, SearchType::Chunk | SearchType::Hybrid)
    }
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(SearchType::Document),
            "chunk" => Ok(SearchType::Chunk),
            "hybrid" => Ok(SearchType::Hybrid),
            other => Err(format!(
                "unknown search type '{other}' (expected document, chunk, or hybrid)"
            )),
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchType::Document => "document",
            SearchType::Chunk => "chunk",
            SearchType::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Post-search filters, applied after the nearest-neighbor pass. When the
/// oversampling factor is too small this can under-return; that is a tuning
/// concern, not a guarantee violation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub document_types: Option<Vec<String>>,
    /// Unix timestamp (seconds), inclusive lower bound on indexing time.
    pub created_after: Option<i64>,
    /// Unix timestamp (seconds), inclusive upper bound on indexing time.
    pub created_before: Option<i64>,
}

impl SearchFilters {
    pub fn matches(&self, document_type: Option<&str>, created_at: i64) -> bool {
        if let Some(types) = &self.document_types {
            match document_type {
                Some(dt) if types.iter().any(|t| t == dt) => {}
                _ => return false,
            }
        }
        if let Some(after) = self.created_after {
            if created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if created_at > before {
                return false;
            }
        }
        true
    }
}

/// A search query against the engine.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub search_type: SearchType,
    pub top_k: usize,
    pub min_score: f32,
    pub filters: SearchFilters,
    /// Whether hits should carry their matching chunk excerpts.
    pub include_chunks: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, search_type: SearchType) -> Self {
        Self {
            query: query.into(),
            search_type,
            top_k: 10,
            min_score: 0.0,
            filters: SearchFilters::default(),
            include_chunks: false,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_include_chunks(mut self, include_chunks: bool) -> Self {
        self.include_chunks = include_chunks;
        self
    }
}

/// A chunk-level match attached to a hit.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkExcerpt {
    pub chunk_id: String,
    pub text: String,
    pub span_start: usize,
    pub span_end: usize,
    pub similarity: f32,
}

/// One ranked document in a search response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub score: f32,
    /// 1-based rank.
    pub rank: usize,
    pub chunk_excerpts: Vec<ChunkExcerpt>,
}

/// The full result of one query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub total: usize,
    pub elapsed_ms: f64,
    pub search_type: SearchType,
}

/// A per-document candidate during merging, before ranks are assigned.
#[derive(Debug, Clone)]
pub(crate) struct DocCandidate {
    pub document_id: String,
    pub score: f32,
    pub document_type: Option<String>,
    pub created_at: i64,
    pub excerpts: Vec<ChunkExcerpt>,
    /// (slot, chunk_id) pairs backing the excerpts, for usage accounting.
    pub chunk_hits: Vec<(usize, String)>,
}

/// Lift a document-index match into a candidate; non-document records in
/// the document index indicate drift and are skipped by the caller.
pub(crate) fn candidate_from_document(m: &SlotMatch) -> Option<DocCandidate> {
    match &m.record {
        SlotRecord::Document(record) => Some(DocCandidate {
            document_id: record.document_id.clone(),
            score: m.similarity,
            document_type: record.document_type.clone(),
            created_at: record.created_at,
            excerpts: Vec::new(),
            chunk_hits: Vec::new(),
        }),
        SlotRecord::Chunk(_) => {
            tracing::warn!(slot = m.slot, "chunk record in document index; skipping");
            None
        }
    }
}

/// Group chunk matches by parent document. A document's chunk-derived score
/// is the maximum similarity among its hits: one strong match must not be
/// diluted by weaker sibling chunks.
pub(crate) fn aggregate_chunks(matches: &[SlotMatch]) -> Vec<DocCandidate> {
    let mut by_document: HashMap<String, DocCandidate> = HashMap::new();

    for m in matches {
        let Some(chunk) = m.record.as_chunk() else {
            tracing::warn!(slot = m.slot, "document record in chunk index; skipping");
            continue;
        };
        let excerpt = ChunkExcerpt {
            chunk_id: chunk.chunk_id.clone(),
            text: chunk.excerpt.clone(),
            span_start: chunk.span_start,
            span_end: chunk.span_end,
            similarity: m.similarity,
        };
        let entry = by_document
            .entry(chunk.document_id.clone())
            .or_insert_with(|| DocCandidate {
                document_id: chunk.document_id.clone(),
                score: f32::NEG_INFINITY,
                document_type: chunk.document_type.clone(),
                created_at: chunk.created_at,
                excerpts: Vec::new(),
                chunk_hits: Vec::new(),
            });
        entry.score = entry.score.max(m.similarity);
        entry.excerpts.push(excerpt);
        entry.chunk_hits.push((m.slot, chunk.chunk_id.clone()));
    }

    let mut candidates: Vec<DocCandidate> = by_document.into_values().collect();
    for candidate in &mut candidates {
        candidate
            .excerpts
            .sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
    }
    sort_candidates(&mut candidates);
    candidates
}

/// Combine document-level and chunk-level candidates into one weighted,
/// deduplicated list. Each side is scaled by its weight; on collision the
/// higher weighted score wins and the excerpts of both sides are kept.
pub(crate) fn merge_hybrid(
    document_candidates: Vec<DocCandidate>,
    chunk_candidates: Vec<DocCandidate>,
    document_weight: f32,
    chunk_weight: f32,
) -> Vec<DocCandidate> {
    let mut merged: HashMap<String, DocCandidate> = HashMap::new();

    let weighted = document_candidates
        .into_iter()
        .map(|mut c| {
            c.score *= document_weight;
            c
        })
        .chain(chunk_candidates.into_iter().map(|mut c| {
            c.score *= chunk_weight;
            c
        }));

    for candidate in weighted {
        match merged.get_mut(&candidate.document_id) {
            None => {
                merged.insert(candidate.document_id.clone(), candidate);
            }
            Some(existing) => {
                existing.score = existing.score.max(candidate.score);
                existing.excerpts.extend(candidate.excerpts);
                existing.chunk_hits.extend(candidate.chunk_hits);
            }
        }
    }

    let mut candidates: Vec<DocCandidate> = merged.into_values().collect();
    sort_candidates(&mut candidates);
    candidates
}

/// Descending by score; ties break on document id for determinism.
pub(crate) fn sort_candidates(candidates: &mut [DocCandidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ChunkRecord;

    fn chunk_match(document_id: &str, ordinal: u32, similarity: f32) -> SlotMatch {
        SlotMatch {
            slot: ordinal as usize,
            similarity,
            record: SlotRecord::Chunk(ChunkRecord {
                chunk_id: format!("{document_id}:{ordinal}"),
                document_id: document_id.to_string(),
                ordinal,
                span_start: 0,
                span_end: 10,
                chunk_type: "paragraph".to_string(),
                excerpt: format!("excerpt {ordinal}"),
                document_type: None,
                created_at: 1_700_000_000,
                active: true,
                usage_count: 0,
            }),
        }
    }

    fn doc_candidate(document_id: &str, score: f32) -> DocCandidate {
        DocCandidate {
            document_id: document_id.to_string(),
            score,
            document_type: None,
            created_at: 1_700_000_000,
            excerpts: Vec::new(),
            chunk_hits: Vec::new(),
        }
    }

    #[test]
    fn chunk_aggregation_uses_max_not_average() {
        let matches = vec![chunk_match("d1", 0, 0.9), chunk_match("d1", 1, 0.4)];
        let candidates = aggregate_chunks(&matches);

        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].score - 0.9).abs() < 1e-6, "max, not 0.65");
        assert_eq!(candidates[0].excerpts.len(), 2);
        assert_eq!(candidates[0].excerpts[0].chunk_id, "d1:0", "excerpts sorted by similarity");
    }

    #[test]
    fn chunk_aggregation_groups_by_document() {
        let matches = vec![
            chunk_match("d1", 0, 0.5),
            chunk_match("d2", 0, 0.8),
            chunk_match("d1", 1, 0.6),
        ];
        let candidates = aggregate_chunks(&matches);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].document_id, "d2");
        assert!((candidates[1].score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn hybrid_merge_applies_weights_and_dedupes() {
        let document_candidates = vec![doc_candidate("d1", 0.9), doc_candidate("d2", 0.5)];
        let chunk_candidates = vec![doc_candidate("d1", 0.8), doc_candidate("d3", 0.6)];

        let merged = merge_hybrid(document_candidates, chunk_candidates, 0.3, 0.7);

        assert_eq!(merged.len(), 3);
        // d1 keeps the higher weighted score: max(0.9 * 0.3, 0.8 * 0.7) = 0.56.
        let d1 = merged.iter().find(|c| c.document_id == "d1").unwrap();
        assert!((d1.score - 0.56).abs() < 1e-6);
        // Ranking: d1 (0.56) > d3 (0.42) > d2 (0.15).
        let order: Vec<&str> = merged.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(order, vec!["d1", "d3", "d2"]);
    }

    #[test]
    fn hybrid_merge_keeps_chunk_excerpts_on_collision() {
        let document_candidates = vec![doc_candidate("d1", 0.95)];
        let mut chunk_side = aggregate_chunks(&[chunk_match("d1", 0, 0.4)]);
        assert_eq!(chunk_side.len(), 1);
        chunk_side[0].score = 0.4;

        let merged = merge_hybrid(document_candidates, chunk_side, 0.3, 0.7);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].excerpts.len(), 1, "excerpts survive the merge");
        assert_eq!(merged[0].chunk_hits.len(), 1);
    }

    #[test]
    fn filters_match_type_and_date() {
        let filters = SearchFilters {
            document_types: Some(vec!["report".to_string()]),
            created_after: Some(100),
            created_before: Some(200),
        };
        assert!(filters.matches(Some("report"), 150));
        assert!(!filters.matches(Some("invoice"), 150));
        assert!(!filters.matches(None, 150));
        assert!(!filters.matches(Some("report"), 50));
        assert!(!filters.matches(Some("report"), 250));

        let empty = SearchFilters::default();
        assert!(empty.matches(None, 0));
    }

    #[test]
    fn search_type_parses_from_str() {
        assert_eq!("hybrid".parse::<SearchType>().unwrap(), SearchType::Hybrid);
        assert!("fuzzy".parse::<SearchType>().is_err());
        assert!(SearchType::Hybrid.includes_documents());
        assert!(SearchType::Hybrid.includes_chunks());
        assert!(!SearchType::Document.includes_chunks());
    }
}
