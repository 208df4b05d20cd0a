//! Graph store layer.
//!
//! The questionnaire and the persisted answer paths both live in a
//! label/property graph. This module defines the [`GraphStore`] primitives the
//! rest of the crate consumes, with a SQLite-backed implementation and an
//! in-memory one.

mod memory;
mod sqlite;


pub use memory::MemoryGraphStore;
pub use sqlite::SqliteGraphStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::StorageResult;

/// Property bag attached to vertices and edges.
pub type Properties = serde_json::Map<String, Value>;

/// A labelled vertex with arbitrary JSON properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Unique vertex identifier.
    pub id: String,
    /// Vertex label (question kind, `user`, `Answer`, `end`, ...).
    pub label: String,
    /// Vertex properties.
    #[serde(default)]
    pub properties: Properties,
}

/// A directed, labelled edge with arbitrary JSON properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique edge identifier.
    pub id: String,
    /// Edge label.
    pub label: String,
    /// Source vertex id.
    pub from: String,
    /// Target vertex id.
    pub to: String,
    /// Edge properties.
    #[serde(default)]
    pub properties: Properties,
}

impl Vertex {
    /// Create a new vertex without properties.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            properties: Properties::new(),
        }
    }

    /// Set a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Get a property value.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Get a string property value.
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

impl Edge {
    /// Create a new edge with a generated id.
    pub fn new(label: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label: label.into(),
            from: from.into(),
            to: to.into(),
            properties: Properties::new(),
        }
    }

    /// Replace the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Get a property value.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Get a string property value.
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// A serializable dump of a graph, used to load question graphs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// All vertices.
    #[serde(default)]
    pub vertices: Vec<Vertex>,
    /// All edges, in enumeration order.
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Counts reported by [`import_snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Vertices created.
    pub vertices_created: usize,
    /// Vertices already present and left untouched.
    pub vertices_skipped: usize,
    /// Edges created.
    pub edges_created: usize,
    /// Edges already present and left untouched.
    pub edges_skipped: usize,
}

/// Read and write primitives over a label/property graph.
///
/// Implementations issue one logical operation per call. Nothing here spans
/// multiple calls transactionally.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphStore: Send + Sync {
    // Vertex operations

    /// Get a vertex by ID.
    async fn get_vertex(&self, id: &str) -> StorageResult<Option<Vertex>>;
    /// Check whether a vertex exists.
    async fn vertex_exists(&self, id: &str) -> StorageResult<bool>;
    /// Create a vertex. Fails with `VertexExists` if the id is taken.
    async fn create_vertex(&self, vertex: &Vertex) -> StorageResult<()>;
    /// Set (or replace) one property on an existing vertex.
    async fn set_vertex_property(&self, id: &str, key: &str, value: Value) -> StorageResult<()>;
    /// Delete a vertex together with every edge touching it.
    async fn delete_vertex(&self, id: &str) -> StorageResult<()>;
    /// Get all vertices carrying a label, ordered by id.
    async fn vertices_by_label(&self, label: &str) -> StorageResult<Vec<Vertex>>;

    // Edge operations

    /// Create an edge. Both endpoints must exist.
    async fn create_edge(&self, edge: &Edge) -> StorageResult<()>;
    /// Get an edge by ID.
    async fn get_edge(&self, id: &str) -> StorageResult<Option<Edge>>;
    /// Get the outgoing edges of a vertex in insertion order.
    async fn outgoing_edges(&self, id: &str) -> StorageResult<Vec<Edge>>;
}

/// Shared graph store handle
pub type SharedGraphStore = Arc<dyn GraphStore>;

/// Load a snapshot into a store, creating only what is absent.
pub async fn import_snapshot(
    store: &dyn GraphStore,
    snapshot: &GraphSnapshot,
) -> StorageResult<ImportSummary> {
    let mut summary = ImportSummary::default();

    for vertex in &snapshot.vertices {
        if store.vertex_exists(&vertex.id).await? {
            summary.vertices_skipped += 1;
        } else {
            store.create_vertex(vertex).await?;
            summary.vertices_created += 1;
        }
    }

    for edge in &snapshot.edges {
        if store.get_edge(&edge.id).await?.is_some() {
            summary.edges_skipped += 1;
        } else {
            store.create_edge(edge).await?;
            summary.edges_created += 1;
        }
    }

    info!(
        vertices_created = summary.vertices_created,
        vertices_skipped = summary.vertices_skipped,
        edges_created = summary.edges_created,
        edges_skipped = summary.edges_skipped,
        "Graph snapshot imported"
    );

    Ok(summary)
}
