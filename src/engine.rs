//! Query engine: embeds a question, retrieves law text, and optionally asks
//! the generator for a grounded answer.
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::embedder::{Embedder, EmbedderError};
use crate::generator::{self, Generator, GeneratorError, ParsedAnswer};
use crate::retrieval::{self, Hit, Metric};
use crate::store::{StoreError, VectorStore};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("generation failed: {0}")]
    Generation(#[from] GeneratorError),

    #[error("answer generation is not configured")]
    NoGenerator,

    #[error("query task failed: {0}")]
    Task(String),
}

/// Retrieved law text for one question.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub query: String,
    pub top_k: usize,
    pub hits: Vec<Hit>,
    /// `[citation] text` blocks handed to the generator.
    pub context: String,
}

/// A generated reply and its parsed parts.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    #[serde(flatten)]
    pub parsed: ParsedAnswer,
    pub raw: String,
}

pub struct QueryEngine {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    generator: Option<Arc<dyn Generator>>,
    metric: Metric,
    default_top_k: usize,
    max_top_k: usize,
}

impl QueryEngine {
    /// Fails if the store was built with a different embedding model.
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        generator: Option<Arc<dyn Generator>>,
        metric: Metric,
        default_top_k: usize,
        max_top_k: usize,
    ) -> Result<Self, StoreError> {
        if store.model() != embedder.model_name() || store.dimensions() != embedder.dimensions() {
            return Err(StoreError::ModelMismatch {
                store: format!("{} ({} dims)", store.model(), store.dimensions()),
                embedder: format!("{} ({} dims)", embedder.model_name(), embedder.dimensions()),
            });
        }

        let max_top_k = max_top_k.max(1);
        Ok(Self {
            store,
            embedder,
            generator,
            metric,
            default_top_k: default_top_k.clamp(1, max_top_k),
            max_top_k,
        })
    }

    #[must_use]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    #[must_use]
    pub fn max_top_k(&self) -> usize {
        self.max_top_k
    }

    #[must_use]
    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    #[must_use]
    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    #[must_use]
    pub fn generator_name(&self) -> Option<&str> {
        self.generator.as_deref().map(|g| g.model_name())
    }

    /// Clamp a requested k into `[1, max_top_k]`.
    #[must_use]
    pub fn clamp_top_k(&self, k: Option<usize>) -> usize {
        k.unwrap_or(self.default_top_k).clamp(1, self.max_top_k)
    }

    pub fn retrieve(&self, query: &str, k: Option<usize>) -> Result<Retrieval, QueryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        let top_k = self.clamp_top_k(k);

        let vector = self.embedder.embed(query)?;
        let hits = retrieval::search(&self.store, &vector, top_k, self.metric)?;
        debug!("Retrieved {} hits for {query:?} (k={top_k})", hits.len());

        let context = retrieval::build_context(&hits);
        Ok(Retrieval {
            query: query.to_string(),
            top_k,
            hits,
            context,
        })
    }

    /// Ask the generator to answer from already retrieved passages.
    pub fn synthesize(&self, retrieval: &Retrieval) -> Result<Answer, QueryError> {
        let generator = self.generator.as_ref().ok_or(QueryError::NoGenerator)?;

        let raw = if retrieval.hits.is_empty() {
            generator::REFUSAL.to_string()
        } else {
            let prompt = generator::build_prompt(&retrieval.context, &retrieval.query);
            generator.generate(&prompt)?
        };
        let parsed = generator::parse_answer(&raw);
        info!(
            "Answered {:?} from {} passages{}",
            retrieval.query,
            retrieval.hits.len(),
            if parsed.is_refusal() { " (refused)" } else { "" }
        );

        Ok(Answer { parsed, raw })
    }

    /// Retrieve, then generate a grounded answer.
    pub fn answer(&self, query: &str, k: Option<usize>) -> Result<(Retrieval, Answer), QueryError> {
        if self.generator.is_none() {
            return Err(QueryError::NoGenerator);
        }
        let retrieval = self.retrieve(query, k)?;
        let answer = self.synthesize(&retrieval)?;
        Ok((retrieval, answer))
    }
}
