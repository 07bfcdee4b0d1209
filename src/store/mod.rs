//! Persisted embeddings + metadata, and the read-only in-memory store the
//! server queries.
//!
//! Every vector row carries its chunk id. Row `i` of the embeddings file and
//! entry `i` of the metadata table must name the same chunk; this is checked
//! whenever a store is built and on every write.
pub mod codec;

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::artifact::{self, ArtifactError};
use crate::chunker::Chunk;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("malformed embeddings file: {0}")]
    Format(String),

    #[error("{vectors} embedding rows but {metadata} metadata entries")]
    LengthMismatch { vectors: usize, metadata: usize },

    #[error("row {row}: embedding is for {vector_id} but metadata is for {metadata_id}")]
    Misaligned {
        row: usize,
        vector_id: String,
        metadata_id: String,
    },

    #[error("row {row}: expected {expected} dimensions, found {actual}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate chunk id in store: {0}")]
    DuplicateChunkId(String),

    #[error("vectors were built with {store} but the query embedder is {embedder}")]
    ModelMismatch { store: String, embedder: String },
}

/// One row of the metadata table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub chunk_id: String,
    pub text: String,
    pub source_page: u32,
    pub heading: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
}

impl From<&Chunk> for MetadataEntry {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            text: chunk.text.clone(),
            source_page: chunk.source.source_page,
            heading: chunk.source.heading.clone(),
            chapter: chunk.source.chapter.clone(),
            chapter_title: chunk.source.chapter_title.clone(),
            section: chunk.source.section.clone(),
            subsection: chunk.source.subsection.clone(),
            section_title: chunk.source.section_title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
}

/// Contents of the embeddings file.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingFile {
    pub model: String,
    pub dimensions: usize,
    pub records: Vec<EmbeddingRecord>,
}

/// Verify the row-for-row alignment between vectors and metadata.
pub fn check_alignment(
    file: &EmbeddingFile,
    metadata: &[MetadataEntry],
) -> Result<(), StoreError> {
    if file.records.len() != metadata.len() {
        return Err(StoreError::LengthMismatch {
            vectors: file.records.len(),
            metadata: metadata.len(),
        });
    }

    let mut seen = HashSet::with_capacity(metadata.len());
    for (row, (record, entry)) in file.records.iter().zip(metadata).enumerate() {
        if record.chunk_id != entry.chunk_id {
            return Err(StoreError::Misaligned {
                row,
                vector_id: record.chunk_id.clone(),
                metadata_id: entry.chunk_id.clone(),
            });
        }
        if record.vector.len() != file.dimensions {
            return Err(StoreError::DimensionMismatch {
                row,
                expected: file.dimensions,
                actual: record.vector.len(),
            });
        }
        if !seen.insert(record.chunk_id.as_str()) {
            return Err(StoreError::DuplicateChunkId(record.chunk_id.clone()));
        }
    }
    Ok(())
}

/// Write both serving artifacts after checking they line up.
pub fn write_artifacts(
    embeddings_path: &Path,
    metadata_path: &Path,
    file: &EmbeddingFile,
    metadata: &[MetadataEntry],
) -> Result<(), StoreError> {
    check_alignment(file, metadata)?;
    codec::write_embeddings(embeddings_path, file)?;
    artifact::write_json(metadata_path, metadata)?;
    info!(
        "Wrote {} vectors to {} and metadata to {}",
        file.records.len(),
        embeddings_path.display(),
        metadata_path.display()
    );
    Ok(())
}

/// Read-only vector store: a flat row-major matrix plus its metadata.
#[derive(Debug)]
pub struct VectorStore {
    model: String,
    dimensions: usize,
    vectors: Vec<f32>,
    metadata: Vec<MetadataEntry>,
}

impl VectorStore {
    /// Build a store from in-memory parts, enforcing alignment.
    pub fn from_parts(file: EmbeddingFile, metadata: Vec<MetadataEntry>) -> Result<Self, StoreError> {
        check_alignment(&file, &metadata)?;

        let mut vectors = Vec::with_capacity(file.records.len() * file.dimensions);
        for record in file.records {
            vectors.extend(record.vector);
        }

        Ok(Self {
            model: file.model,
            dimensions: file.dimensions,
            vectors,
            metadata,
        })
    }

    /// Load the embeddings file and metadata table from disk.
    pub fn load(embeddings_path: &Path, metadata_path: &Path) -> Result<Self, StoreError> {
        let file = codec::read_embeddings(embeddings_path)?;
        let metadata: Vec<MetadataEntry> = artifact::read_json(metadata_path)?;
        let store = Self::from_parts(file, metadata)?;
        info!(
            "Loaded {} vectors ({} dims, model {}) from {}",
            store.len(),
            store.dimensions,
            store.model,
            embeddings_path.display()
        );
        Ok(store)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Vector for row `i`.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.vectors[i * self.dimensions..(i + 1) * self.dimensions]
    }

    #[must_use]
    pub fn entry(&self, i: usize) -> &MetadataEntry {
        &self.metadata[i]
    }

    #[must_use]
    pub fn entries(&self) -> &[MetadataEntry] {
        &self.metadata
    }

    /// Number of distinct chapters in the corpus.
    #[must_use]
    pub fn chapter_count(&self) -> usize {
        self.metadata
            .iter()
            .filter_map(|m| m.chapter.as_deref())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, chapter: Option<&str>) -> MetadataEntry {
        MetadataEntry {
            chunk_id: id.to_string(),
            text: format!("text of {id}"),
            source_page: 1,
            heading: "Section 1. Title".to_string(),
            chapter: chapter.map(str::to_string),
            chapter_title: None,
            section: Some("1".to_string()),
            subsection: None,
            section_title: Some("Title".to_string()),
        }
    }

    fn file(ids: &[&str]) -> EmbeddingFile {
        EmbeddingFile {
            model: "hash-2".to_string(),
            dimensions: 2,
            records: ids
                .iter()
                .enumerate()
                .map(|(i, id)| EmbeddingRecord {
                    chunk_id: id.to_string(),
                    vector: vec![i as f32, 1.0],
                })
                .collect(),
        }
    }

    #[test]
    fn test_from_parts_aligned() {
        let store = VectorStore::from_parts(
            file(&["a_0001", "a_0002"]),
            vec![entry("a_0001", Some("1")), entry("a_0002", Some("2"))],
        )
        .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.row(1), &[1.0, 1.0]);
        assert_eq!(store.entry(1).chunk_id, "a_0002");
        assert_eq!(store.chapter_count(), 2);
    }

    #[test]
    fn test_length_mismatch() {
        let err = VectorStore::from_parts(file(&["a_0001", "a_0002"]), vec![entry("a_0001", None)])
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::LengthMismatch {
                vectors: 2,
                metadata: 1
            }
        ));
    }

    #[test]
    fn test_misaligned_rows() {
        let err = VectorStore::from_parts(
            file(&["a_0001", "a_0002"]),
            vec![entry("a_0002", None), entry("a_0001", None)],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Misaligned { row: 0, .. }));
    }

    #[test]
    fn test_duplicate_ids() {
        let err = VectorStore::from_parts(
            file(&["a_0001", "a_0001"]),
            vec![entry("a_0001", None), entry("a_0001", None)],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateChunkId(_)));
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let emb = dir.path().join("embeddings.bin");
        let meta = dir.path().join("metadata.json");
        let metadata = vec![entry("a_0001", Some("1")), entry("a_0002", Some("1"))];
        write_artifacts(&emb, &meta, &file(&["a_0001", "a_0002"]), &metadata).unwrap();

        let store = VectorStore::load(&emb, &meta).unwrap();
        assert_eq!(store.entries(), metadata.as_slice());
        assert_eq!(store.model(), "hash-2");
        assert_eq!(store.chapter_count(), 1);
    }

    #[test]
    fn test_load_detects_metadata_edited_out_of_band() {
        let dir = tempfile::tempdir().unwrap();
        let emb = dir.path().join("embeddings.bin");
        let meta = dir.path().join("metadata.json");
        let metadata = vec![entry("a_0001", None), entry("a_0002", None)];
        write_artifacts(&emb, &meta, &file(&["a_0001", "a_0002"]), &metadata).unwrap();

        artifact::write_json(&meta, &vec![entry("a_0001", None)]).unwrap();
        assert!(matches!(
            VectorStore::load(&emb, &meta),
            Err(StoreError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_write_refuses_misaligned() {
        let dir = tempfile::tempdir().unwrap();
        let emb = dir.path().join("embeddings.bin");
        let meta = dir.path().join("metadata.json");
        let result = write_artifacts(&emb, &meta, &file(&["a_0001"]), &[entry("b_0001", None)]);
        assert!(result.is_err());
        assert!(!emb.exists());
        assert!(!meta.exists());
    }
}
