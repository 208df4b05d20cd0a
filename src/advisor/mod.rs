//! Application service over the question graph and stored paths.
//!
//! The [`Advisor`] strings the pieces together the way a form session uses
//! them: traverse, then on completion persist the path, score the models and
//! record the recommendation on the path.

use serde::Serialize;
use tracing::info;

use crate::config::FormConfig;
use crate::error::{FormError, FormResult};
use crate::form::{Answer, FormTraversal, HistoryReplay, ReplayState, ReviewEntry, TraversalCursor};
use crate::paths::PathStore;
use crate::questions::{QuestionGraph, QuestionNode};
use crate::scoring::AiScorer;
use crate::storage::SharedGraphStore;

/// Outcome of persisting a form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    /// Owner of the form.
    pub username: String,
    /// Name the form is stored under.
    pub form_name: String,
    /// Id of the first path node.
    pub start_id: String,
    /// Recommended models, best first.
    pub best_models: Vec<String>,
}

/// A stored form with its recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormSummary {
    /// Form name.
    pub name: String,
    /// Recommended models recorded at submission.
    pub best_models: Vec<String>,
}

/// Questionnaire service.
#[derive(Clone)]
pub struct Advisor {
    traversal: FormTraversal,
    paths: PathStore,
    scorer: AiScorer,
    best_models_count: usize,
}

impl Advisor {
    /// Create an advisor over a graph store.
    pub fn new(store: SharedGraphStore, config: &FormConfig) -> Self {
        let graph = QuestionGraph::new(store.clone(), config.first_question_id.clone());
        Self {
            traversal: FormTraversal::new(graph, config.gate_affirmative_label.clone()),
            paths: PathStore::new(store),
            scorer: AiScorer::new(config.tie_policy),
            best_models_count: config.best_models_count,
        }
    }

    /// The traversal engine.
    pub fn traversal(&self) -> &FormTraversal {
        &self.traversal
    }

    /// The path store.
    pub fn paths(&self) -> &PathStore {
        &self.paths
    }

    /// Question reached after `history`.
    pub async fn next_question(&self, history: &[Answer]) -> FormResult<QuestionNode> {
        self.traversal.next_question(history).await
    }

    /// Best models for `history`, `k` defaulting to the configured count.
    pub async fn best_models(&self, history: &[Answer], k: Option<usize>) -> FormResult<Vec<String>> {
        let cursor = self.traversal.resolve(history).await?;
        self.score(&cursor, k.unwrap_or(self.best_models_count)).await
    }

    /// Persist a completed form and record its recommendation.
    pub async fn submit(
        &self,
        username: &str,
        form_name: &str,
        history: &[Answer],
    ) -> FormResult<Submission> {
        let cursor = self.completed(history).await?;
        let start_id = self.paths.save(username, form_name, cursor.events()).await?;
        self.recommend(username, form_name, start_id, &cursor).await
    }

    /// Replace a stored form, possibly under a new name, and rescore it.
    pub async fn resubmit(
        &self,
        username: &str,
        old_name: &str,
        new_name: &str,
        history: &[Answer],
    ) -> FormResult<Submission> {
        let cursor = self.completed(history).await?;
        let start_id = self
            .paths
            .rename(username, old_name, new_name, cursor.events())
            .await?;
        self.recommend(username, new_name, start_id, &cursor).await
    }

    /// Answers stored on the path starting at `start_id`.
    pub async fn list_answers(&self, start_id: &str) -> FormResult<Vec<Answer>> {
        self.paths.list_answers(start_id).await
    }

    /// Answers of a stored form.
    pub async fn form_answers(&self, username: &str, form_name: &str) -> FormResult<Vec<Answer>> {
        let start = self
            .paths
            .form_start(username, form_name)
            .await?
            .ok_or_else(|| FormError::not_found("form", form_name))?;
        self.paths.list_answers(&start).await
    }

    /// Replay `history` over a stored form.
    pub async fn replay(
        &self,
        username: &str,
        form_name: &str,
        history: &[Answer],
    ) -> FormResult<ReplayState> {
        let previous = self.form_answers(username, form_name).await?;
        HistoryReplay::new(previous)
            .replay(&self.traversal, history)
            .await
    }

    /// Stored answers of a form paired with their questions.
    pub async fn review(&self, username: &str, form_name: &str) -> FormResult<Vec<ReviewEntry>> {
        let previous = self.form_answers(username, form_name).await?;
        HistoryReplay::new(previous).review(&self.traversal).await
    }

    /// Forms stored for a user.
    pub async fn forms(&self, username: &str) -> FormResult<Vec<FormSummary>> {
        let mut forms = Vec::new();
        for name in self.paths.list_forms(username).await? {
            let best_models = self.paths.stored_best_models(username, &name).await?;
            forms.push(FormSummary { name, best_models });
        }
        Ok(forms)
    }

    /// Every known username.
    pub async fn users(&self) -> FormResult<Vec<String>> {
        self.paths.users().await
    }

    /// Metric tags relevant to a stored form.
    pub async fn form_metrics(&self, username: &str, form_name: &str) -> FormResult<Vec<String>> {
        self.paths.path_metrics(username, form_name).await
    }

    async fn completed(&self, history: &[Answer]) -> FormResult<TraversalCursor> {
        let cursor = self.traversal.resolve(history).await?;
        if !cursor.is_complete() {
            return Err(FormError::Incomplete {
                answered: history.len(),
            });
        }
        Ok(cursor)
    }

    async fn score(&self, cursor: &TraversalCursor, k: usize) -> FormResult<Vec<String>> {
        let catalogue = self.traversal.graph().model_catalogue().await?;
        Ok(self.scorer.best_models(&catalogue, cursor.events(), k))
    }

    async fn recommend(
        &self,
        username: &str,
        form_name: &str,
        start_id: String,
        cursor: &TraversalCursor,
    ) -> FormResult<Submission> {
        let best_models = self.score(cursor, self.best_models_count).await?;
        self.paths
            .store_best_models(username, form_name, &best_models)
            .await?;

        info!(
            username = %username,
            form_name = %form_name,
            recommended = best_models.len(),
            "Form submitted"
        );

        Ok(Submission {
            username: username.to_string(),
            form_name: form_name.to_string(),
            start_id,
            best_models,
        })
    }
}
