/// Offline build stages: PDF → sections → chunks → vectors + metadata.
///
/// Each stage reads the previous stage's artifact and overwrites its own.
/// Any failure aborts the stage before anything is written.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::chunker::{self, Chunk, ChunkOptions};
use crate::config::Config;
use crate::embedder::{Embedder, EmbedderError};
use crate::extractor;
use crate::store::{self, EmbeddingFile, EmbeddingRecord, MetadataEntry};

/// Resolved artifact locations.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub source_pdf: PathBuf,
    pub sections: PathBuf,
    pub chunks: PathBuf,
    pub embeddings: PathBuf,
    pub metadata: PathBuf,
}

impl From<&Config> for ArtifactPaths {
    fn from(config: &Config) -> Self {
        Self {
            source_pdf: PathBuf::from(&config.paths.source_pdf),
            sections: PathBuf::from(&config.paths.sections),
            chunks: PathBuf::from(&config.paths.chunks),
            embeddings: PathBuf::from(&config.paths.embeddings),
            metadata: PathBuf::from(&config.paths.metadata),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub sections: usize,
    pub chunks: usize,
    pub vectors: usize,
}

// ── Stages ───────────────────────────────────────────────────────────

/// Stage 1: extract sections from the PDF and write `sections.json`.
pub fn run_extract(pdf: &Path, sections_out: &Path) -> Result<usize> {
    info!("Extracting sections from {}", pdf.display());
    let sections = extractor::extract_sections(pdf)
        .with_context(|| format!("extraction failed for {}", pdf.display()))?;
    extractor::save_sections(sections_out, &sections)?;
    info!("Wrote {} sections to {}", sections.len(), sections_out.display());
    Ok(sections.len())
}

/// Stage 2: split sections into tagged chunks and write `chunks.json`.
pub fn run_chunk(sections_in: &Path, chunks_out: &Path, opts: &ChunkOptions) -> Result<usize> {
    let sections = extractor::load_sections(sections_in)?;
    anyhow::ensure!(
        !sections.is_empty(),
        "no sections in {}",
        sections_in.display()
    );
    let chunks = chunker::chunk_sections(&sections, opts);
    chunker::save_chunks(chunks_out, &chunks)?;
    info!("Wrote {} chunks to {}", chunks.len(), chunks_out.display());
    Ok(chunks.len())
}

/// Renumber an existing chunk file in place.
pub fn run_retag(chunks_path: &Path, prefix: &str) -> Result<usize> {
    let mut chunks: Vec<Chunk> = crate::artifact::read_json(chunks_path)?;
    chunker::retag(&mut chunks, prefix);
    chunker::save_chunks(chunks_path, &chunks)?;
    info!(
        "Retagged {} chunks in {} with prefix {prefix}",
        chunks.len(),
        chunks_path.display()
    );
    Ok(chunks.len())
}

/// Embed every chunk, in order, in batches of `batch_size`.
pub fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<EmbeddingFile, EmbedderError> {
    let batch_size = batch_size.max(1);
    let dimensions = embedder.dimensions();
    let pb = progress_bar(chunks.len() as u64);

    let mut records = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let vectors = embedder.embed_batch(&texts)?;
        if vectors.len() != batch.len() {
            return Err(EmbedderError::CountMismatch {
                requested: batch.len(),
                returned: vectors.len(),
            });
        }
        for (chunk, vector) in batch.iter().zip(vectors) {
            if vector.len() != dimensions {
                return Err(EmbedderError::DimensionMismatch {
                    expected: dimensions,
                    actual: vector.len(),
                });
            }
            records.push(EmbeddingRecord {
                chunk_id: chunk.chunk_id.clone(),
                vector,
            });
        }
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    Ok(EmbeddingFile {
        model: embedder.model_name().to_string(),
        dimensions,
        records,
    })
}

/// Stage 3: embed `chunks.json`, then write the embeddings file and the
/// metadata table together.
pub fn run_embed(
    chunks_in: &Path,
    embeddings_out: &Path,
    metadata_out: &Path,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<usize> {
    let chunks = chunker::load_chunks(chunks_in)?;
    anyhow::ensure!(!chunks.is_empty(), "no chunks in {}", chunks_in.display());

    info!(
        "Embedding {} chunks with {} (batch size {batch_size})",
        chunks.len(),
        embedder.model_name()
    );
    let file = embed_chunks(embedder, &chunks, batch_size).context("embedding failed")?;
    let metadata: Vec<MetadataEntry> = chunks.iter().map(MetadataEntry::from).collect();
    store::write_artifacts(embeddings_out, metadata_out, &file, &metadata)?;
    Ok(file.records.len())
}

/// Run all three offline stages.
pub fn run_all(config: &Config, paths: &ArtifactPaths, embedder: &dyn Embedder) -> Result<PipelineSummary> {
    let sections = run_extract(&paths.source_pdf, &paths.sections)?;
    let opts = ChunkOptions {
        chunk_size: config.chunk_size,
        prefix: config.chunk_id_prefix.clone(),
    };
    let chunks = run_chunk(&paths.sections, &paths.chunks, &opts)?;
    let vectors = run_embed(
        &paths.chunks,
        &paths.embeddings,
        &paths.metadata,
        embedder,
        config.model.batch_size,
    )?;
    Ok(PipelineSummary {
        sections,
        chunks,
        vectors,
    })
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::default_bar().template("  {bar:40.cyan/blue} {pos}/{len} chunks ({eta})")
    {
        pb.set_style(style.progress_chars("█▓░"));
    }
    pb
}

// ── Tests ────────────────────────────────────────────────────────────
