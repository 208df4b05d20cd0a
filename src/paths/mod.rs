//! Persisted answer paths.
//!
//! A completed form is written into the graph as a chain of path nodes, one
//! per answered question plus a terminal node, linked by `Answer` edges that
//! carry the chosen option text. The user's root vertex points at the first
//! node of each of their forms.
//!
//! Writes are issued one at a time. A failure in the middle of [`PathStore::rename`]
//! can leave the old path deleted and the new one missing; callers are
//! expected to resubmit.

use std::collections::HashSet;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{FormError, FormResult};
use crate::form::{Answer, AnswerEvent};
use crate::questions::parse_list;
use crate::storage::{Edge, SharedGraphStore, Vertex};

/// Question id used for the terminal path node.
pub const END_QUESTION_ID: &str = "end";
/// Label of a user's root vertex.
pub const USER_LABEL: &str = "user";
/// Label of path nodes and path edges.
pub const ANSWER_LABEL: &str = "Answer";
/// Label of the terminal path node.
pub const END_LABEL: &str = "end";
/// Label of the edge from a user to the first node of a form.
pub const FORM_LINK_LABEL: &str = "Form";
/// First-node property holding the recommended models.
pub const BEST_MODELS_PROPERTY: &str = "best_models";

/// Id of the path node recording `question_id` for `(username, form_name)`.
pub fn path_node_id(username: &str, question_id: &str, form_name: &str) -> String {
    format!("{}-answer{}-{}", username, question_id, form_name)
}

/// Idempotent graph writes.
#[derive(Clone)]
pub struct PathRepository {
    store: SharedGraphStore,
}

impl PathRepository {
    /// Create a repository over a store.
    pub fn new(store: SharedGraphStore) -> Self {
        Self { store }
    }

    /// Create the vertex unless one with its id exists. Returns whether it was created.
    pub async fn ensure_vertex(&self, vertex: &Vertex) -> FormResult<bool> {
        if self.store.vertex_exists(&vertex.id).await? {
            return Ok(false);
        }
        self.store.create_vertex(vertex).await?;
        Ok(true)
    }

    /// Create the edge unless one with its id exists. Returns whether it was created.
    pub async fn ensure_edge(&self, edge: &Edge) -> FormResult<bool> {
        if self.store.get_edge(&edge.id).await?.is_some() {
            return Ok(false);
        }
        self.store.create_edge(edge).await?;
        Ok(true)
    }
}

/// Reads and writes persisted answer paths.
#[derive(Clone)]
pub struct PathStore {
    store: SharedGraphStore,
    repository: PathRepository,
}

impl PathStore {
    /// Create a path store.
    pub fn new(store: SharedGraphStore) -> Self {
        Self {
            repository: PathRepository::new(store.clone()),
            store,
        }
    }

    /// Make sure the user's root vertex exists.
    ///
    /// A vertex already using the username as id is only reused when it is a
    /// user vertex; anything else (a question, a path node) is `UserConflict`.
    pub async fn ensure_user(&self, username: &str) -> FormResult<bool> {
        match self.store.get_vertex(username).await? {
            Some(existing) if existing.label == USER_LABEL => Ok(false),
            Some(existing) => Err(FormError::UserConflict {
                username: username.to_string(),
                label: existing.label,
            }),
            None => {
                self.repository
                    .ensure_vertex(&Vertex::new(username, USER_LABEL))
                    .await
            }
        }
    }

    /// Persist a completed form.
    ///
    /// Fails with `AlreadyExists` when the form's first node is already there.
    /// Every step must have at least one chosen option; this is checked before
    /// anything is written.
    pub async fn save(
        &self,
        username: &str,
        form_name: &str,
        events: &[AnswerEvent],
    ) -> FormResult<String> {
        validate_events(events)?;
        let start_id = path_node_id(username, &events[0].question_id, form_name);

        if self.store.vertex_exists(&start_id).await? {
            return Err(FormError::AlreadyExists {
                username: username.to_string(),
                form_name: form_name.to_string(),
            });
        }

        self.ensure_user(username).await?;
        let created_at = Utc::now().to_rfc3339();

        for (index, event) in events.iter().enumerate() {
            let from = path_node(username, form_name, event, &created_at);
            let to = match events.get(index + 1) {
                Some(next) => path_node(username, form_name, next, &created_at),
                None => end_node(username, form_name, &created_at),
            };
            self.repository.ensure_vertex(&from).await?;
            self.repository.ensure_vertex(&to).await?;

            for (option, text) in event.chosen.iter().zip(event.recorded_texts()) {
                let edge = Edge::new(ANSWER_LABEL, &from.id, &to.id)
                    .with_id(format!("{}->{}:{}", from.id, to.id, option.id))
                    .with_property("answer", text)
                    .with_property("proposition_id", option.id.clone())
                    .with_property("metrics", json!(option.metrics));
                self.repository.ensure_edge(&edge).await?;
            }
        }

        let link = Edge::new(FORM_LINK_LABEL, username, &start_id)
            .with_id(format!("{}-form-{}", username, form_name))
            .with_property("form_name", form_name);
        self.repository.ensure_edge(&link).await?;

        info!(
            username = %username,
            form_name = %form_name,
            steps = events.len(),
            "Form path saved"
        );
        Ok(start_id)
    }

    /// Replace the path stored under `old_name` with one built from `events`
    /// under `new_name`.
    pub async fn rename(
        &self,
        username: &str,
        old_name: &str,
        new_name: &str,
        events: &[AnswerEvent],
    ) -> FormResult<String> {
        validate_events(events)?;

        if new_name != old_name {
            let new_start = path_node_id(username, &events[0].question_id, new_name);
            if self.store.vertex_exists(&new_start).await? {
                return Err(FormError::AlreadyExists {
                    username: username.to_string(),
                    form_name: new_name.to_string(),
                });
            }
        }

        let removed = self.delete_path(username, old_name).await?;
        debug!(username = %username, form_name = %old_name, removed, "Old form path deleted");

        self.save(username, new_name, events).await
    }

    /// Delete a stored path by following outgoing edges from its first node.
    /// Returns the number of deleted nodes.
    pub async fn delete_path(&self, username: &str, form_name: &str) -> FormResult<usize> {
        let start = self
            .form_start(username, form_name)
            .await?
            .ok_or_else(|| FormError::not_found("form", form_name))?;

        let mut seen = HashSet::new();
        let mut next = Some(start);
        while let Some(node) = next {
            if !seen.insert(node.clone()) {
                break;
            }
            next = self
                .store
                .outgoing_edges(&node)
                .await?
                .into_iter()
                .next()
                .map(|e| e.to);
            self.store.delete_vertex(&node).await?;
        }

        Ok(seen.len())
    }

    /// Answers recorded on the path starting at `start_id`, one entry per step.
    pub async fn list_answers(&self, start_id: &str) -> FormResult<Vec<Answer>> {
        Ok(self
            .walk(start_id)
            .await?
            .into_iter()
            .map(|edges| {
                Answer::many(
                    edges
                        .iter()
                        .map(|e| e.str_property("answer").unwrap_or_default()),
                )
            })
            .collect())
    }

    /// Id of the first node of a user's form, if stored.
    pub async fn form_start(&self, username: &str, form_name: &str) -> FormResult<Option<String>> {
        Ok(self
            .form_links(username)
            .await?
            .into_iter()
            .find(|e| e.str_property("form_name") == Some(form_name))
            .map(|e| e.to))
    }

    /// Whether the user has a form with this name.
    pub async fn form_exists(&self, username: &str, form_name: &str) -> FormResult<bool> {
        Ok(self.form_start(username, form_name).await?.is_some())
    }

    /// Names of the user's forms, oldest first.
    pub async fn list_forms(&self, username: &str) -> FormResult<Vec<String>> {
        Ok(self
            .form_links(username)
            .await?
            .iter()
            .filter_map(|e| e.str_property("form_name").map(str::to_string))
            .collect())
    }

    /// Every known username.
    pub async fn users(&self) -> FormResult<Vec<String>> {
        Ok(self
            .store
            .vertices_by_label(USER_LABEL)
            .await?
            .into_iter()
            .map(|v| v.id)
            .collect())
    }

    /// Record the recommended models on the form's first node.
    pub async fn store_best_models(
        &self,
        username: &str,
        form_name: &str,
        models: &[String],
    ) -> FormResult<()> {
        let start = self.require_start(username, form_name).await?;
        self.store
            .set_vertex_property(&start, BEST_MODELS_PROPERTY, json!(models))
            .await?;
        Ok(())
    }

    /// Recommended models recorded for a form.
    pub async fn stored_best_models(&self, username: &str, form_name: &str) -> FormResult<Vec<String>> {
        let start = self.require_start(username, form_name).await?;
        Ok(self
            .store
            .get_vertex(&start)
            .await?
            .and_then(|v| v.property(BEST_MODELS_PROPERTY).map(parse_list))
            .unwrap_or_default())
    }

    /// Metric tags of the options along a stored path, first occurrence first.
    pub async fn path_metrics(&self, username: &str, form_name: &str) -> FormResult<Vec<String>> {
        let start = self.require_start(username, form_name).await?;
        let mut metrics: Vec<String> = Vec::new();

        for edge in self.walk(&start).await?.iter().flatten() {
            for metric in edge.property("metrics").map(parse_list).unwrap_or_default() {
                if !metrics.contains(&metric) {
                    metrics.push(metric);
                }
            }
        }

        Ok(metrics)
    }

    async fn require_start(&self, username: &str, form_name: &str) -> FormResult<String> {
        self.form_start(username, form_name)
            .await?
            .ok_or_else(|| FormError::not_found("form", form_name))
    }

    async fn form_links(&self, username: &str) -> FormResult<Vec<Edge>> {
        Ok(self
            .store
            .outgoing_edges(username)
            .await?
            .into_iter()
            .filter(|e| e.label == FORM_LINK_LABEL)
            .collect())
    }

    /// Answer edges grouped by step, from `start_id` to the terminal node.
    async fn walk(&self, start_id: &str) -> FormResult<Vec<Vec<Edge>>> {
        let start = self
            .store
            .get_vertex(start_id)
            .await?
            .ok_or_else(|| FormError::not_found("path", start_id))?;

        let mut steps = Vec::new();
        let mut seen = HashSet::from([start.id.clone()]);
        let mut node = start;

        while node.label != END_LABEL {
            let edges: Vec<Edge> = self
                .store
                .outgoing_edges(&node.id)
                .await?
                .into_iter()
                .filter(|e| e.label == ANSWER_LABEL)
                .collect();
            let Some(next_id) = edges.first().map(|e| e.to.clone()) else {
                warn!(node = %node.id, "Path stops before its terminal node");
                break;
            };
            if !seen.insert(next_id.clone()) {
                return Err(FormError::malformed(start_id, "path loops back on itself"));
            }
            steps.push(edges);
            node = self
                .store
                .get_vertex(&next_id)
                .await?
                .ok_or_else(|| FormError::not_found("path", next_id.clone()))?;
        }

        Ok(steps)
    }
}

fn validate_events(events: &[AnswerEvent]) -> FormResult<()> {
    if events.is_empty() {
        return Err(FormError::Incomplete { answered: 0 });
    }
    match events.iter().find(|e| e.chosen.is_empty()) {
        Some(event) => Err(FormError::invalid_selection(
            &event.question_id,
            "no option selected",
        )),
        None => Ok(()),
    }
}

fn path_node(username: &str, form_name: &str, event: &AnswerEvent, created_at: &str) -> Vertex {
    Vertex::new(path_node_id(username, &event.question_id, form_name), ANSWER_LABEL)
        .with_property("question", event.question_text.clone())
        .with_property("question_id", event.question_id.clone())
        .with_property("created_at", created_at)
}

fn end_node(username: &str, form_name: &str, created_at: &str) -> Vertex {
    Vertex::new(path_node_id(username, END_QUESTION_ID, form_name), END_LABEL)
        .with_property("question", "")
        .with_property("question_id", END_QUESTION_ID)
        .with_property("created_at", created_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::{GraphStore, MemoryGraphStore, MockGraphStore};
    use crate::testing::{fixture_history, fixture_snapshot, traversal_over};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    async fn fixture_events(store: SharedGraphStore, history: &[Answer]) -> Vec<AnswerEvent> {
        traversal_over(store)
            .resolve(history)
            .await
            .unwrap()
            .into_events()
    }

    fn memory_store() -> Arc<MemoryGraphStore> {
        Arc::new(MemoryGraphStore::from_snapshot(fixture_snapshot()))
    }

    #[test]
    fn test_path_node_id_format() {
        assert_eq!(path_node_id("alice", "3", "demo"), "alice-answer3-demo");
        assert_eq!(path_node_id("alice", END_QUESTION_ID, "demo"), "alice-answerend-demo");
    }

    #[tokio::test]
    async fn test_save_builds_path_and_round_trips() {
        let memory = memory_store();
        let store: SharedGraphStore = memory.clone();
        let events = fixture_events(store.clone(), &fixture_history()).await;
        let paths = PathStore::new(store);

        let start = paths.save("alice", "demo", &events).await.unwrap();
        assert_eq!(start, "alice-answer1-demo");

        let answers = paths.list_answers(&start).await.unwrap();
        assert_eq!(answers, fixture_history());

        let end = memory.get_vertex("alice-answerend-demo").await.unwrap().unwrap();
        assert_eq!(end.label, END_LABEL);
        let first = memory.get_vertex(&start).await.unwrap().unwrap();
        assert_eq!(first.str_property("question"), Some("What is the name of your project?"));
    }

    #[tokio::test]
    async fn test_multi_select_creates_parallel_edges() {
        let memory = memory_store();
        let store: SharedGraphStore = memory.clone();
        let events = fixture_events(store.clone(), &fixture_history()).await;
        let paths = PathStore::new(store);

        paths.save("alice", "demo", &events).await.unwrap();

        let edges = memory.outgoing_edges("alice-answer5-demo").await.unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.to == "alice-answer6-demo"));
        assert_eq!(edges[0].str_property("proposition_id"), Some("5-speed"));
        assert_eq!(edges[1].str_property("answer"), Some("Higher accuracy"));
    }

    #[tokio::test]
    async fn test_save_twice_is_already_exists() {
        let store: SharedGraphStore = memory_store();
        let events = fixture_events(store.clone(), &fixture_history()).await;
        let paths = PathStore::new(store);

        paths.save("alice", "demo", &events).await.unwrap();
        let err = paths.save("alice", "demo", &events).await.unwrap_err();

        assert!(matches!(err, FormError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_save_rejects_empty_selection_before_writing() {
        let memory = memory_store();
        let store: SharedGraphStore = memory.clone();
        let mut history = fixture_history();
        history[4] = Answer::default();
        let events = fixture_events(store.clone(), &history).await;
        let before = memory.vertex_count().await;

        let err = PathStore::new(store).save("alice", "demo", &events).await.unwrap_err();

        assert!(matches!(err, FormError::InvalidSelection { question_id, .. } if question_id == "5"));
        assert_eq!(memory.vertex_count().await, before);
    }

    #[tokio::test]
    async fn test_forms_listing_and_user_index() {
        let store: SharedGraphStore = memory_store();
        let events = fixture_events(store.clone(), &fixture_history()).await;
        let paths = PathStore::new(store);

        paths.save("alice", "first", &events).await.unwrap();
        paths.save("alice", "second", &events).await.unwrap();
        paths.save("bob", "first", &events).await.unwrap();

        assert_eq!(paths.list_forms("alice").await.unwrap(), vec!["first", "second"]);
        assert_eq!(paths.users().await.unwrap(), vec!["alice", "bob"]);
        assert!(paths.form_exists("bob", "first").await.unwrap());
        assert!(!paths.form_exists("bob", "second").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_replaces_path() {
        let memory = memory_store();
        let store: SharedGraphStore = memory.clone();
        let events = fixture_events(store.clone(), &fixture_history()).await;
        let paths = PathStore::new(store);

        paths.save("alice", "draft", &events).await.unwrap();
        let start = paths.rename("alice", "draft", "final", &events).await.unwrap();

        assert_eq!(start, "alice-answer1-final");
        assert!(!memory.vertex_exists("alice-answer1-draft").await.unwrap());
        assert!(!memory.vertex_exists("alice-answerend-draft").await.unwrap());
        assert_eq!(paths.list_forms("alice").await.unwrap(), vec!["final"]);
    }

    #[tokio::test]
    async fn test_rename_in_place_rewrites_answers() {
        let store: SharedGraphStore = memory_store();
        let original = fixture_events(store.clone(), &fixture_history()).await;
        let mut history = fixture_history();
        history[2] = Answer::single("Text");
        let edited = fixture_events(store.clone(), &history).await;
        let paths = PathStore::new(store);

        paths.save("alice", "demo", &original).await.unwrap();
        let start = paths.rename("alice", "demo", "demo", &edited).await.unwrap();

        assert_eq!(paths.list_answers(&start).await.unwrap()[2], Answer::single("Text"));
    }

    #[tokio::test]
    async fn test_rename_onto_existing_form_keeps_old_path() {
        let memory = memory_store();
        let store: SharedGraphStore = memory.clone();
        let events = fixture_events(store.clone(), &fixture_history()).await;
        let paths = PathStore::new(store);

        paths.save("alice", "a", &events).await.unwrap();
        paths.save("alice", "b", &events).await.unwrap();

        let err = paths.rename("alice", "a", "b", &events).await.unwrap_err();
        assert!(matches!(err, FormError::AlreadyExists { form_name, .. } if form_name == "b"));
        assert!(memory.vertex_exists("alice-answer1-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_best_models_and_metrics_on_path() {
        let store: SharedGraphStore = memory_store();
        let events = fixture_events(store.clone(), &fixture_history()).await;
        let paths = PathStore::new(store);
        paths.save("alice", "demo", &events).await.unwrap();

        let models = vec!["LinearRegression".to_string(), "RandomForest".to_string()];
        paths.store_best_models("alice", "demo", &models).await.unwrap();

        assert_eq!(paths.stored_best_models("alice", "demo").await.unwrap(), models);
        assert_eq!(
            paths.path_metrics("alice", "demo").await.unwrap(),
            vec!["training_time", "accuracy", "f1"]
        );
    }

    #[tokio::test]
    async fn test_unknown_form_is_not_found() {
        let paths = PathStore::new(memory_store());
        let err = paths.stored_best_models("nobody", "demo").await.unwrap_err();
        assert!(matches!(err, FormError::NotFound { entity: "form", .. }));

        let err = paths.list_answers("missing").await.unwrap_err();
        assert!(matches!(err, FormError::NotFound { entity: "path", .. }));
    }

    #[tokio::test]
    async fn test_ensure_vertex_skips_existing() {
        let mut mock = MockGraphStore::new();
        mock.expect_vertex_exists().returning(|_| Ok(true));
        mock.expect_create_vertex().times(0);

        let repository = PathRepository::new(Arc::new(mock));
        let created = repository
            .ensure_vertex(&Vertex::new("alice", USER_LABEL))
            .await
            .unwrap();
        assert!(!created);
    }

    #[tokio::test]
    async fn test_ensure_edge_creates_missing() {
        let mut mock = MockGraphStore::new();
        mock.expect_get_edge().returning(|_| Ok(None));
        mock.expect_create_edge()
            .withf(|edge: &Edge| edge.id == "link")
            .times(1)
            .returning(|_| Ok(()));

        let repository = PathRepository::new(Arc::new(mock));
        let created = repository
            .ensure_edge(&Edge::new(FORM_LINK_LABEL, "alice", "x").with_id("link"))
            .await
            .unwrap();
        assert!(created);
    }

    #[tokio::test]
    async fn test_username_matching_question_id_is_rejected() {
        let memory = memory_store();
        let store: SharedGraphStore = memory.clone();
        let events = fixture_events(store.clone(), &fixture_history()).await;
        let paths = PathStore::new(store.clone());

        let err = paths.save("1", "demo", &events).await.unwrap_err();

        assert!(matches!(err, FormError::UserConflict { ref label, .. } if label == "Q_Open"));
        assert!(!memory.vertex_exists("1-answer1-demo").await.unwrap());
        let question_edges = memory.outgoing_edges("1").await.unwrap();
        assert_eq!(question_edges.len(), 1);
        assert!(paths.users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_user_reuses_user_vertex() {
        let mut mock = MockGraphStore::new();
        mock.expect_get_vertex()
            .returning(|id| Ok(Some(Vertex::new(id, USER_LABEL))));
        mock.expect_create_vertex().times(0);

        let created = PathStore::new(Arc::new(mock)).ensure_user("alice").await.unwrap();

        assert!(!created);
    }

    #[tokio::test]
    async fn test_store_failure_propagates_unmodified() {
        let events = fixture_events(memory_store(), &fixture_history()).await;

        let mut mock = MockGraphStore::new();
        mock.expect_vertex_exists().returning(|_| {
            Err(StorageError::Query {
                message: "database is locked".to_string(),
            })
        });
        mock.expect_create_vertex().times(0);

        let err = PathStore::new(Arc::new(mock))
            .save("alice", "demo", &events)
            .await
            .unwrap_err();
        assert!(matches!(err, FormError::Storage(StorageError::Query { message }) if message == "database is locked"));
    }
}
