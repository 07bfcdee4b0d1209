//! Chunking and tagging: bounded-length chunks with stable identifiers.
pub mod split;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::artifact::{self, ArtifactError};
use crate::extractor::Section;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("duplicate chunk id: {0}")]
    DuplicateId(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Where a chunk came from in the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRef {
    pub heading: String,
    pub source_page: u32,
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    pub source: SectionRef,
}

#[derive(Debug, Clone)]
pub struct ChunkOptions {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Identifier prefix, e.g. `npc2017`.
    pub prefix: String,
}

/// `npc2017`, 1 → `npc2017_0001`.
#[must_use]
pub fn format_chunk_id(prefix: &str, seq: usize) -> String {
    format!("{prefix}_{seq:04}")
}

/// Split sections into chunks and number them in document order.
///
/// Identical input and options always produce identical identifiers.
pub fn chunk_sections(sections: &[Section], opts: &ChunkOptions) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for section in sections {
        for (subsection, piece) in split::split_subsections(&section.body_text) {
            for text in split::split_into_chunks(&piece, opts.chunk_size) {
                let seq = chunks.len() + 1;
                chunks.push(Chunk {
                    chunk_id: format_chunk_id(&opts.prefix, seq),
                    text,
                    source: SectionRef {
                        heading: section.heading.clone(),
                        source_page: section.source_page,
                        chapter: section.chapter.clone(),
                        chapter_title: section.chapter_title.clone(),
                        section: section.section.clone(),
                        subsection: subsection.clone(),
                        section_title: section.section_title.clone(),
                    },
                });
            }
        }
    }

    info!(
        "Chunked {} sections into {} chunks",
        sections.len(),
        chunks.len()
    );
    chunks
}

/// Reassign identifiers to an existing chunk list, in its current order.
pub fn retag(chunks: &mut [Chunk], prefix: &str) {
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_id = format_chunk_id(prefix, i + 1);
    }
}

/// Ensure no two chunks share an identifier.
pub fn validate_unique_ids(chunks: &[Chunk]) -> Result<(), ChunkError> {
    let mut seen = HashSet::with_capacity(chunks.len());
    for chunk in chunks {
        if !seen.insert(chunk.chunk_id.as_str()) {
            return Err(ChunkError::DuplicateId(chunk.chunk_id.clone()));
        }
    }
    Ok(())
}

/// Overwrite the chunked JSON artifact. Refuses to write duplicate ids.
pub fn save_chunks(path: &Path, chunks: &[Chunk]) -> Result<(), ChunkError> {
    validate_unique_ids(chunks)?;
    artifact::write_json(path, chunks)?;
    Ok(())
}

pub fn load_chunks(path: &Path) -> Result<Vec<Chunk>, ChunkError> {
    let chunks: Vec<Chunk> = artifact::read_json(path)?;
    validate_unique_ids(&chunks)?;
    Ok(chunks)
}
