//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state management

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::advisor::Advisor;
use crate::config::Config;
use crate::ranking::ParetoRanker;
use crate::storage::SharedGraphStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Graph store holding the questionnaire and stored forms.
    pub store: SharedGraphStore,
    /// Questionnaire service.
    pub advisor: Advisor,
    /// Model ranker.
    pub ranker: ParetoRanker,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, store: SharedGraphStore) -> Self {
        tracing::info!(
            first_question = %config.form.first_question_id,
            tie_policy = ?config.form.tie_policy,
            distance = ?config.ranking.distance,
            "AppState initializing"
        );

        let advisor = Advisor::new(store.clone(), &config.form);
        let ranker = ParetoRanker::new(config.ranking.distance);

        Self {
            config,
            store,
            advisor,
            ranker,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
