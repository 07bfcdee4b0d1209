//! JSON endpoints.
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::{ServeContext, Stats};
use crate::engine::{Answer, QueryEngine, QueryError, Retrieval};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    #[serde(flatten)]
    pub answer: Answer,
    pub retrieval: Retrieval,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// A [`QueryError`] mapped onto an HTTP status.
#[derive(Debug)]
pub struct ApiError(pub QueryError);

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.0 {
            QueryError::EmptyQuery => StatusCode::BAD_REQUEST,
            QueryError::NoGenerator => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::Embedding(_) | QueryError::Generation(_) => StatusCode::BAD_GATEWAY,
            QueryError::Store(_) | QueryError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Bad request: {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Run a blocking engine call off the async executor.
pub(crate) async fn run_blocking<T, F>(engine: Arc<QueryEngine>, f: F) -> Result<T, QueryError>
where
    T: Send + 'static,
    F: FnOnce(&QueryEngine) -> Result<T, QueryError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || f(&engine)).await {
        Ok(result) => result,
        Err(e) => Err(QueryError::Task(e.to_string())),
    }
}

pub async fn search(
    State(ctx): State<Arc<ServeContext>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Retrieval>, ApiError> {
    if req.query.trim().is_empty() {
        return Err(QueryError::EmptyQuery.into());
    }
    let retrieval = run_blocking(ctx.engine.clone(), move |e| {
        e.retrieve(&req.query, req.top_k)
    })
    .await?;
    Ok(Json(retrieval))
}

pub async fn ask(
    State(ctx): State<Arc<ServeContext>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    if req.query.trim().is_empty() {
        return Err(QueryError::EmptyQuery.into());
    }
    if !ctx.engine.has_generator() {
        return Err(QueryError::NoGenerator.into());
    }
    let (retrieval, answer) =
        run_blocking(ctx.engine.clone(), move |e| e.answer(&req.query, req.top_k)).await?;
    Ok(Json(AskResponse { answer, retrieval }))
}

pub async fn stats(State(ctx): State<Arc<ServeContext>>) -> Json<Stats> {
    Json(ctx.stats())
}

pub async fn health() -> &'static str {
    "ok"
}
