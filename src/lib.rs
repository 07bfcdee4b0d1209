//! # lexrag: Nepal Penal Code 2017 legal assistant
//!
//! Offline pipeline that turns the National Penal Code PDF into searchable
//! vectors, and a small web server that answers questions strictly from the
//! retrieved law text.
//!
//! ## Architecture
//!
//! - **[`extractor`]**: PDF text extraction and chapter/section segmentation
//! - **[`chunker`]**: Subsection-aware chunking with stable `npc2017_NNNN` ids
//! - **[`embedder`]**: Text embedding via ONNX Runtime (all-mpnet-base-v2) or a hashing stub
//! - **[`store`]**: Binary embeddings file, metadata table and the in-memory vector store
//! - **[`retrieval`]**: Exhaustive similarity search, de-duplication and citations
//! - **[`generator`]**: Grounded prompt, chat-completions client, answer parsing
//! - **[`engine`]**: Query engine tying embedder, store and generator together
//! - **[`server`]**: axum web UI and JSON API
//! - **[`pipeline`]**: Orchestration of the offline stages
//! - **[`config`]**: Configuration loading, validation and defaults
//! - **[`artifact`]**: JSON/binary artifact I/O

pub mod artifact;
pub mod chunker;
pub mod config;
pub mod embedder;
pub mod engine;
pub mod extractor;
pub mod generator;
pub mod pipeline;
pub mod retrieval;
pub mod server;
pub mod store;
