//! Durable save/load of an index and its metadata.
//!
//! Each logical index persists as two artifacts in one directory:
//!
//! - `{name}.index`: a binary blob with magic, format version, dimension and
//!   vector count, followed by the raw f32 vector data in slot order.
//! - `{name}_metadata.json`: a JSON sidecar mapping the stringified slot
//!   index to its record, plus the index configuration.
//!
//! Writes go to a temporary file in the same directory and are renamed
//! into place, so a crash mid-write never leaves a half-written artifact
//! visible. Loads never abort startup: a missing artifact means an empty
//! index, and an unreadable or inconsistent one is logged at warn level
//! and likewise treated as "start fresh", meaning stale results until the next
//! rebuild, not a dead service.
//!
//! The blob stores vectors, not cluster geometry: an approximate structure
//! is retrained from the raw vectors at load time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::ann::IndexKind;
use super::{SlotRecord, VectorIndex};
use crate::error::Result;

const MAGIC: &[u8; 4] = b"DVIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Serialize, Deserialize)]
struct MetadataSidecar {
    dimension: usize,
    kind: IndexKind,
    records: BTreeMap<String, SlotRecord>,
}

/// Saves and loads index artifacts under one directory.
#[derive(Debug, Clone)]
pub struct IndexPersistence {
    dir: PathBuf,
}

impl IndexPersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.index"))
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}_metadata.json"))
    }

    /// Write both artifacts for `index`, atomically replacing any previous
    /// version.
    pub fn save(&self, name: &str, index: &VectorIndex) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let count = index.total_count();
        let dimension = index.dimension();

        let mut blob = Vec::with_capacity(HEADER_LEN + count * dimension * 4);
        blob.extend_from_slice(MAGIC);
        blob.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        blob.extend_from_slice(&(dimension as u32).to_le_bytes());
        blob.extend_from_slice(&(count as u64).to_le_bytes());
        for slot in 0..count {
            if let Some(vector) = index.vector(slot) {
                blob.extend_from_slice(bytemuck::cast_slice(vector));
            }
        }
        write_atomic(&self.index_path(name), &blob)?;

        let sidecar = MetadataSidecar {
            dimension,
            kind: index.kind(),
            records: index
                .records()
                .iter()
                .map(|(slot, record)| (slot.to_string(), record.clone()))
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&sidecar).map_err(anyhow::Error::from)?;
        write_atomic(&self.metadata_path(name), &json)?;

        tracing::debug!(name, vectors = count, "saved index artifacts");
        Ok(())
    }

    /// Load the persisted index named `name`, or an empty index when no
    /// usable artifacts exist. Corruption is logged, never propagated.
    pub fn load(&self, name: &str, kind: IndexKind, dimension: usize) -> VectorIndex {
        match self.try_load(name, kind, dimension) {
            Ok(Some(index)) => {
                tracing::info!(name, vectors = index.total_count(), "loaded index artifacts");
                index
            }
            Ok(None) => {
                tracing::info!(name, "no persisted artifacts; starting with an empty index");
                VectorIndex::new(kind, dimension)
            }
            Err(message) => {
                tracing::warn!(name, %message, "unreadable index artifacts; starting fresh");
                VectorIndex::new(kind, dimension)
            }
        }
    }

    fn try_load(
        &self,
        name: &str,
        kind: IndexKind,
        dimension: usize,
    ) -> std::result::Result<Option<VectorIndex>, String> {
        let index_path = self.index_path(name);
        let metadata_path = self.metadata_path(name);
        if !index_path.exists() && !metadata_path.exists() {
            return Ok(None);
        }

        let blob = fs::read(&index_path).map_err(|e| format!("reading blob: {e}"))?;
        if blob.len() < HEADER_LEN {
            return Err("blob shorter than header".to_string());
        }
        if &blob[0..4] != MAGIC {
            return Err("bad magic".to_string());
        }
        let version = u32::from_le_bytes(blob[4..8].try_into().expect("4-byte slice"));
        if version != FORMAT_VERSION {
            return Err(format!("unsupported format version {version}"));
        }
        let stored_dimension =
            u32::from_le_bytes(blob[8..12].try_into().expect("4-byte slice")) as usize;
        if stored_dimension != dimension {
            return Err(format!(
                "dimension mismatch: artifact has {stored_dimension}, expected {dimension}"
            ));
        }
        let count = u64::from_le_bytes(blob[12..HEADER_LEN].try_into().expect("8-byte slice")) as usize;
        let expected_len = HEADER_LEN + count * dimension * 4;
        if blob.len() != expected_len {
            return Err(format!(
                "blob length {} does not match header ({} vectors of dim {})",
                blob.len(),
                count,
                dimension
            ));
        }
        let vectors: Vec<f32> = bytemuck::pod_collect_to_vec(&blob[HEADER_LEN..]);

        let json = fs::read(&metadata_path).map_err(|e| format!("reading sidecar: {e}"))?;
        let sidecar: MetadataSidecar =
            serde_json::from_slice(&json).map_err(|e| format!("parsing sidecar: {e}"))?;
        if sidecar.dimension != dimension {
            return Err(format!(
                "sidecar dimension {} does not match expected {dimension}",
                sidecar.dimension
            ));
        }
        if sidecar.records.len() != count {
            return Err(format!(
                "sidecar has {} records for {} vectors",
                sidecar.records.len(),
                count
            ));
        }

        let mut records = BTreeMap::new();
        for (key, record) in sidecar.records {
            let slot: usize = key
                .parse()
                .map_err(|_| format!("non-numeric slot key '{key}'"))?;
            if slot >= count {
                return Err(format!("slot key {slot} out of range ({count} vectors)"));
            }
            records.insert(slot, record);
        }

        Ok(Some(VectorIndex::from_parts(kind, dimension, &vectors, records)))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ChunkRecord, DocumentRecord};
    use tempfile::tempdir;

    fn doc_record(id: &str, active: bool) -> SlotRecord {
        SlotRecord::Document(DocumentRecord {
            document_id: id.to_string(),
            model_name: "hashing".to_string(),
            dimension: 4,
            document_type: Some("report".to_string()),
            created_at: 1_700_000_000,
            active,
        })
    }

    fn chunk_record(document_id: &str, ordinal: u32) -> SlotRecord {
        SlotRecord::Chunk(ChunkRecord {
            chunk_id: format!("{document_id}:{ordinal}"),
            document_id: document_id.to_string(),
            ordinal,
            span_start: 0,
            span_end: 12,
            chunk_type: "paragraph".to_string(),
            excerpt: "some excerpt".to_string(),
            document_type: None,
            created_at: 1_700_000_000,
            active: true,
            usage_count: 3,
        })
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let persistence = IndexPersistence::new(dir.path());

        let mut index = VectorIndex::new(IndexKind::Flat, 4);
        index.insert(&[1.0, 0.0, 0.0, 0.0], doc_record("a", true)).unwrap();
        index.insert(&[0.0, 1.0, 0.0, 0.0], doc_record("b", false)).unwrap();
        index.insert(&[0.0, 0.0, 1.0, 0.0], chunk_record("a", 0)).unwrap();
        persistence.save("documents", &index).unwrap();

        let loaded = persistence.load("documents", IndexKind::Flat, 4);
        assert_eq!(loaded.total_count(), 3);
        assert_eq!(loaded.active_count(), 2);
        assert_eq!(loaded.records(), index.records());
        for slot in 0..3 {
            assert_eq!(loaded.vector(slot), index.vector(slot));
        }
    }

    #[test]
    fn missing_artifacts_load_empty() {
        let dir = tempdir().unwrap();
        let persistence = IndexPersistence::new(dir.path());
        let loaded = persistence.load("documents", IndexKind::Flat, 4);
        assert_eq!(loaded.total_count(), 0);
    }

    #[test]
    fn corrupt_blob_loads_empty() {
        let dir = tempdir().unwrap();
        let persistence = IndexPersistence::new(dir.path());

        let mut index = VectorIndex::new(IndexKind::Flat, 4);
        index.insert(&[1.0, 0.0, 0.0, 0.0], doc_record("a", true)).unwrap();
        persistence.save("documents", &index).unwrap();

        fs::write(dir.path().join("documents.index"), b"not an index").unwrap();
        let loaded = persistence.load("documents", IndexKind::Flat, 4);
        assert_eq!(loaded.total_count(), 0, "corruption means start fresh");
    }

    #[test]
    fn truncated_sidecar_loads_empty() {
        let dir = tempdir().unwrap();
        let persistence = IndexPersistence::new(dir.path());

        let mut index = VectorIndex::new(IndexKind::Flat, 4);
        index.insert(&[1.0, 0.0, 0.0, 0.0], doc_record("a", true)).unwrap();
        persistence.save("documents", &index).unwrap();

        fs::write(dir.path().join("documents_metadata.json"), b"{").unwrap();
        let loaded = persistence.load("documents", IndexKind::Flat, 4);
        assert_eq!(loaded.total_count(), 0);
    }

    #[test]
    fn dimension_change_loads_empty() {
        let dir = tempdir().unwrap();
        let persistence = IndexPersistence::new(dir.path());

        let mut index = VectorIndex::new(IndexKind::Flat, 4);
        index.insert(&[1.0, 0.0, 0.0, 0.0], doc_record("a", true)).unwrap();
        persistence.save("documents", &index).unwrap();

        let loaded = persistence.load("documents", IndexKind::Flat, 8);
        assert_eq!(loaded.total_count(), 0);
        assert_eq!(loaded.dimension(), 8);
    }

    #[test]
    fn save_replaces_previous_artifacts() {
        let dir = tempdir().unwrap();
        let persistence = IndexPersistence::new(dir.path());

        let mut index = VectorIndex::new(IndexKind::Flat, 4);
        index.insert(&[1.0, 0.0, 0.0, 0.0], doc_record("a", true)).unwrap();
        persistence.save("documents", &index).unwrap();

        index.insert(&[0.0, 1.0, 0.0, 0.0], doc_record("b", true)).unwrap();
        persistence.save("documents", &index).unwrap();

        let loaded = persistence.load("documents", IndexKind::Flat, 4);
        assert_eq!(loaded.total_count(), 2);
        assert!(!dir.path().join("documents.tmp").exists());
    }
}
