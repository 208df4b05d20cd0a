//! In-memory graph store.
//!
//! Mirrors the SQLite store's semantics (duplicate ids rejected, edges need
//! both endpoints, deleting a vertex drops its edges, insertion-ordered edge
//! enumeration) over `tokio::sync::RwLock` collections.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Edge, GraphSnapshot, GraphStore, Vertex};
use crate::error::{StorageError, StorageResult};

/// In-memory implementation of [`GraphStore`].
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    vertices: RwLock<BTreeMap<String, Vertex>>,
    edges: RwLock<Vec<Edge>>,
}

impl MemoryGraphStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with a snapshot, as-is.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let vertices = snapshot
            .vertices
            .into_iter()
            .map(|v| (v.id.clone(), v))
            .collect();
        Self {
            vertices: RwLock::new(vertices),
            edges: RwLock::new(snapshot.edges),
        }
    }

    /// Number of vertices currently stored.
    pub async fn vertex_count(&self) -> usize {
        self.vertices.read().await.len()
    }

    /// Number of edges currently stored.
    pub async fn edge_count(&self) -> usize {
        self.edges.read().await.len()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn get_vertex(&self, id: &str) -> StorageResult<Option<Vertex>> {
        Ok(self.vertices.read().await.get(id).cloned())
    }

    async fn vertex_exists(&self, id: &str) -> StorageResult<bool> {
        Ok(self.vertices.read().await.contains_key(id))
    }

    async fn create_vertex(&self, vertex: &Vertex) -> StorageResult<()> {
        let mut vertices = self.vertices.write().await;
        if vertices.contains_key(&vertex.id) {
            return Err(StorageError::VertexExists {
                id: vertex.id.clone(),
            });
        }
        vertices.insert(vertex.id.clone(), vertex.clone());
        Ok(())
    }

    async fn set_vertex_property(&self, id: &str, key: &str, value: Value) -> StorageResult<()> {
        let mut vertices = self.vertices.write().await;
        let vertex = vertices
            .get_mut(id)
            .ok_or_else(|| StorageError::VertexNotFound { id: id.to_string() })?;
        vertex.properties.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete_vertex(&self, id: &str) -> StorageResult<()> {
        let mut vertices = self.vertices.write().await;
        let mut edges = self.edges.write().await;
        edges.retain(|e| e.from != id && e.to != id);
        vertices.remove(id);
        Ok(())
    }

    async fn vertices_by_label(&self, label: &str) -> StorageResult<Vec<Vertex>> {
        Ok(self
            .vertices
            .read()
            .await
            .values()
            .filter(|v| v.label == label)
            .cloned()
            .collect())
    }

    async fn create_edge(&self, edge: &Edge) -> StorageResult<()> {
        let vertices = self.vertices.read().await;
        for endpoint in [&edge.from, &edge.to] {
            if !vertices.contains_key(endpoint) {
                return Err(StorageError::VertexNotFound {
                    id: endpoint.clone(),
                });
            }
        }

        let mut edges = self.edges.write().await;
        if edges.iter().any(|e| e.id == edge.id) {
            return Err(StorageError::EdgeExists {
                id: edge.id.clone(),
            });
        }
        edges.push(edge.clone());
        Ok(())
    }

    async fn get_edge(&self, id: &str) -> StorageResult<Option<Edge>> {
        Ok(self.edges.read().await.iter().find(|e| e.id == id).cloned())
    }

    async fn outgoing_edges(&self, id: &str) -> StorageResult<Vec<Edge>> {
        Ok(self
            .edges
            .read()
            .await
            .iter()
            .filter(|e| e.from == id)
            .cloned()
            .collect())
    }
}
