use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lexrag::chunker::ChunkOptions;
use lexrag::config::{Config, DEFAULT_CONFIG_PATH};
use lexrag::embedder::{self, download};
use lexrag::engine::QueryEngine;
use lexrag::generator::Generator;
use lexrag::generator::chat::ChatGenerator;
use lexrag::pipeline::{self, ArtifactPaths};
use lexrag::server::{self, ServeContext};
use lexrag::store::VectorStore;

#[derive(Parser, Debug)]
#[command(
    name = "lexrag",
    version,
    about = "Question answering over Nepal's National Penal Code, 2017"
)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, short, global = true, env = "LEXRAG_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract sections from the source PDF.
    Extract {
        #[arg(long)]
        pdf: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Split sections into tagged chunks.
    Chunk {
        #[arg(long)]
        sections: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        prefix: Option<String>,
        /// Renumber the existing chunk file instead of re-chunking.
        #[arg(long)]
        retag: bool,
    },
    /// Embed chunks and write the embeddings file and metadata table.
    Embed {
        #[arg(long)]
        chunks: Option<PathBuf>,
        #[arg(long)]
        embeddings: Option<PathBuf>,
        #[arg(long)]
        metadata: Option<PathBuf>,
    },
    /// Run extract, chunk and embed in sequence.
    Pipeline {
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
    /// Serve the web UI and JSON API.
    Serve {
        #[arg(long)]
        bind: Option<String>,
        /// Retrieval only, even when an API key is available.
        #[arg(long)]
        no_generate: bool,
    },
    /// Answer one question from the command line.
    Query {
        question: String,
        #[arg(long, short)]
        k: Option<usize>,
        /// Also generate an answer.
        #[arg(long)]
        answer: bool,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Download the ONNX model files.
    DownloadModel,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    let mut paths = ArtifactPaths::from(&config);

    match cli.command {
        Command::Extract { pdf, out } => {
            override_path(&mut paths.source_pdf, pdf);
            override_path(&mut paths.sections, out);
            pipeline::run_extract(&paths.source_pdf, &paths.sections)?;
        }
        Command::Chunk {
            sections,
            out,
            chunk_size,
            prefix,
            retag,
        } => {
            override_path(&mut paths.sections, sections);
            override_path(&mut paths.chunks, out);
            if let Some(size) = chunk_size {
                config.chunk_size = size;
            }
            if let Some(prefix) = prefix {
                config.chunk_id_prefix = prefix;
            }
            config.validate()?;

            if retag {
                pipeline::run_retag(&paths.chunks, &config.chunk_id_prefix)?;
            } else {
                let opts = ChunkOptions {
                    chunk_size: config.chunk_size,
                    prefix: config.chunk_id_prefix.clone(),
                };
                pipeline::run_chunk(&paths.sections, &paths.chunks, &opts)?;
            }
        }
        Command::Embed {
            chunks,
            embeddings,
            metadata,
        } => {
            override_path(&mut paths.chunks, chunks);
            override_path(&mut paths.embeddings, embeddings);
            override_path(&mut paths.metadata, metadata);
            config.validate()?;

            let embedder = embedder::from_config(&config.model)?;
            pipeline::run_embed(
                &paths.chunks,
                &paths.embeddings,
                &paths.metadata,
                embedder.as_ref(),
                config.model.batch_size,
            )?;
        }
        Command::Pipeline { pdf } => {
            override_path(&mut paths.source_pdf, pdf);
            config.validate()?;

            let embedder = embedder::from_config(&config.model)?;
            let summary = pipeline::run_all(&config, &paths, embedder.as_ref())?;
            info!(
                "Pipeline complete: {} sections, {} chunks, {} vectors",
                summary.sections, summary.chunks, summary.vectors
            );
        }
        Command::Serve { bind, no_generate } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if no_generate {
                config.generation.enabled = false;
            }
            config.validate()?;
            let addr = config.bind_addr()?;

            // Built outside the runtime: the blocking HTTP clients inside
            // must not be created or dropped on an async worker.
            let engine = build_engine(&config, &paths)?;
            let ctx = Arc::new(ServeContext::new(engine.clone()));

            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            rt.block_on(server::serve(ctx, addr))?;
        }
        Command::Query {
            question,
            k,
            answer,
            json,
        } => {
            config.generation.enabled &= answer;
            config.validate()?;
            let engine = build_engine(&config, &paths)?;
            run_query(&engine, &question, k, answer, json)?;
        }
        Command::DownloadModel => {
            download::download_model_files(&PathBuf::from(&config.model.model_dir))?;
        }
    }

    Ok(())
}

fn override_path(slot: &mut PathBuf, value: Option<PathBuf>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn build_generator(config: &Config) -> Option<Arc<dyn Generator>> {
    if !config.generation.enabled {
        info!("Answer generation disabled");
        return None;
    }
    match ChatGenerator::from_config(&config.generation) {
        Ok(g) => {
            info!("Answer generation via {} at {}", config.generation.model, config.generation.base_url);
            Some(Arc::new(g))
        }
        Err(e) => {
            warn!("Answer generation unavailable ({e}); running retrieval-only");
            None
        }
    }
}

fn build_engine(config: &Config, paths: &ArtifactPaths) -> Result<Arc<QueryEngine>> {
    let store = VectorStore::load(&paths.embeddings, &paths.metadata)
        .context("failed to load vector store; run `lexrag pipeline` first")?;
    let embedder = embedder::from_config(&config.model)?;
    let generator = build_generator(config);

    let engine = QueryEngine::new(
        Arc::new(store),
        embedder,
        generator,
        config.metric,
        config.search_top_k,
        config.max_top_k,
    )?;
    Ok(Arc::new(engine))
}

fn run_query(engine: &QueryEngine, question: &str, k: Option<usize>, answer: bool, json: bool) -> Result<()> {
    let retrieval = engine.retrieve(question, k)?;
    let generated = if answer {
        Some(engine.synthesize(&retrieval)?)
    } else {
        None
    };

    if json {
        let out = serde_json::json!({ "retrieval": retrieval, "answer": generated });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if let Some(a) = &generated {
        println!("Answer:\n{}\n", a.parsed.answer);
        if let Some(source) = a.parsed.cited_source() {
            println!("Source:\n{source}\n");
        }
    }
    println!("Retrieved sections:");
    for hit in &retrieval.hits {
        println!("{:>2}. [{}] (score {:.3}, page {})", hit.rank, hit.citation, hit.score, hit.entry.source_page);
        println!("    {}", hit.entry.text.replace('\n', " "));
    }
    Ok(())
}
