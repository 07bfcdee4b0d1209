//! Web UI and JSON API over a loaded [`QueryEngine`].
//!
//! All state is read-only after startup and shared through an `Arc`.
//! Embedding and generation calls block, so handlers run them on
//! `spawn_blocking`.
pub mod api;
pub mod page;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::engine::QueryEngine;
use crate::retrieval::Metric;

/// Everything a request handler needs.
pub struct ServeContext {
    pub engine: Arc<QueryEngine>,
    pub loaded_at: DateTime<Utc>,
}

impl ServeContext {
    #[must_use]
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self {
            engine,
            loaded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        let store = self.engine.store();
        Stats {
            provisions: store.len(),
            chapters: store.chapter_count(),
            dimensions: store.dimensions(),
            model: store.model().to_string(),
            metric: self.engine.metric(),
            generator: self.engine.generator_name().map(str::to_string),
            loaded_at: self.loaded_at,
        }
    }
}

/// Dataset summary shown in the sidebar and at `/api/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub provisions: usize,
    pub chapters: usize,
    pub dimensions: usize,
    pub model: String,
    pub metric: Metric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    pub loaded_at: DateTime<Utc>,
}

pub fn router(ctx: Arc<ServeContext>) -> Router {
    Router::new()
        .route("/", get(page::index))
        .route("/api/search", post(api::search))
        .route("/api/ask", post(api::ask))
        .route("/api/stats", get(api::stats))
        .route("/health", get(api::health))
        .with_state(ctx)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(ctx: Arc<ServeContext>, addr: SocketAddr) -> Result<()> {
    let stats = ctx.stats();
    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        "Serving {} provisions ({} chapters) on http://{addr}",
        stats.provisions, stats.chapters
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::ServeContext;
    use crate::embedder::Embedder;
    use crate::embedder::hash::HashEmbedder;
    use crate::engine::QueryEngine;
    use crate::generator::Generator;
    use crate::retrieval::Metric;
    use crate::store::{EmbeddingFile, EmbeddingRecord, MetadataEntry, VectorStore};

    pub const TEXTS: &[(&str, &str, &str)] = &[
        ("1", "1", "No person shall commit theft of movable property."),
        ("1", "2", "Whoever commits murder shall be liable to life imprisonment."),
        ("2", "3", "A public servant shall not accept a bribe <or gift>."),
    ];

    pub fn context(generator: Option<Arc<dyn Generator>>) -> Arc<ServeContext> {
        let embedder = HashEmbedder::new(64);
        let mut records = Vec::new();
        let mut metadata = Vec::new();
        for (i, (chapter, section, text)) in TEXTS.iter().enumerate() {
            let chunk_id = format!("npc2017_{:04}", i + 1);
            records.push(EmbeddingRecord {
                chunk_id: chunk_id.clone(),
                vector: embedder.embed(text).unwrap(),
            });
            metadata.push(MetadataEntry {
                chunk_id,
                text: text.to_string(),
                source_page: 1,
                heading: format!("Section {section}"),
                chapter: Some(chapter.to_string()),
                chapter_title: None,
                section: Some(section.to_string()),
                subsection: None,
                section_title: Some("Title".to_string()),
            });
        }
        let file = EmbeddingFile {
            model: embedder.model_name().to_string(),
            dimensions: embedder.dimensions(),
            records,
        };
        let store = Arc::new(VectorStore::from_parts(file, metadata).unwrap());
        let engine =
            QueryEngine::new(store, Arc::new(embedder), generator, Metric::Cosine, 2, 10).unwrap();
        Arc::new(ServeContext::new(Arc::new(engine)))
    }
}
