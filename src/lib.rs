//! # Form Graph Advisor
//!
//! An adaptive questionnaire engine. Questions and their answer options live
//! in a label/property graph; a user's answers pick a path through it, which
//! is persisted per user and form and scored to recommend machine-learning
//! models. Trained models can then be ranked on two metrics with Pareto
//! optimality. Everything is exposed as MCP tools over stdio.
//!
//! ## Features
//!
//! - **Traversal**: Next-question resolution from an answer history, with
//!   single, multiple and free-text answers
//! - **Gating**: A boolean gate that hides restricted options for the rest of a run
//! - **Replay**: Pre-filling from a stored form and detecting where an edit diverges
//! - **Answer Paths**: Per-user, per-form answer paths stored back into the graph
//! - **Recommendation**: Weight-product scoring of the model catalogue
//! - **Pareto Ranking**: Normalized two-metric ranking with optimality flags
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server (stdio) → Advisor → QuestionGraph / PathStore
//!                                                    ↓
//!                                          GraphStore (SQLite)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use form_graph_advisor::{Config, AppState, McpServer};
//! use form_graph_advisor::storage::SqliteGraphStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let store = SqliteGraphStore::new(&config.database).await?;
//!     let state = Arc::new(AppState::new(config, Arc::new(store)));
//!     McpServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Form service tying traversal, persistence and scoring together.
pub mod advisor;
/// Configuration management for the MCP server.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Answer histories, traversal and replay.
pub mod form;
/// Persisted answer paths.
pub mod paths;
/// Question graph access.
pub mod questions;
/// Pareto ranking of trained models.
pub mod ranking;
/// Model recommendation scoring.
pub mod scoring;
/// MCP server implementation and request handling.
pub mod server;
/// Graph storage layer.
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use advisor::Advisor;
pub use config::Config;
pub use error::{AppError, AppResult, FormError, FormResult};
pub use server::{AppState, McpServer, SharedState};
