//! Integration tests for the SQLite graph store
//!
//! Tests graph operations against in-memory and file-backed SQLite databases.

use serde_json::json;

use form_graph_advisor::config::DatabaseConfig;
use form_graph_advisor::error::StorageError;
use form_graph_advisor::storage::{
    import_snapshot, Edge, GraphSnapshot, GraphStore, SqliteGraphStore, Vertex,
};

/// Create an in-memory store for testing
async fn create_test_store() -> SqliteGraphStore {
    SqliteGraphStore::new_in_memory()
        .await
        .expect("Failed to create in-memory store")
}

fn fixture_snapshot() -> GraphSnapshot {
    serde_json::from_str(include_str!("fixtures/question_graph.json"))
        .expect("fixture graph parses")
}

#[cfg(test)]
mod vertex_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_vertex() {
        let store = create_test_store().await;

        let vertex = Vertex::new("q1", "Q_QCM").with_property("text", "Pick one");
        store.create_vertex(&vertex).await.unwrap();

        let retrieved = store.get_vertex("q1").await.unwrap();
        assert_eq!(retrieved, Some(vertex));
        assert!(store.vertex_exists("q1").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_nonexistent_vertex() {
        let store = create_test_store().await;

        assert!(store.get_vertex("nonexistent").await.unwrap().is_none());
        assert!(!store.vertex_exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_vertex_is_rejected() {
        let store = create_test_store().await;
        store.create_vertex(&Vertex::new("q1", "Q_QCM")).await.unwrap();

        let err = store
            .create_vertex(&Vertex::new("q1", "Q_Open"))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::VertexExists { id } if id == "q1"));
        let kept = store.get_vertex("q1").await.unwrap().unwrap();
        assert_eq!(kept.label, "Q_QCM");
    }

    #[tokio::test]
    async fn test_set_vertex_property_merges() {
        let store = create_test_store().await;
        store
            .create_vertex(&Vertex::new("u", "user").with_property("name", "alice"))
            .await
            .unwrap();

        store
            .set_vertex_property("u", "best_models", json!(["KMeans"]))
            .await
            .unwrap();
        store
            .set_vertex_property("u", "name", json!("bob"))
            .await
            .unwrap();

        let vertex = store.get_vertex("u").await.unwrap().unwrap();
        assert_eq!(vertex.str_property("name"), Some("bob"));
        assert_eq!(vertex.property("best_models"), Some(&json!(["KMeans"])));
    }

    #[tokio::test]
    async fn test_set_property_on_missing_vertex() {
        let store = create_test_store().await;

        let err = store
            .set_vertex_property("ghost", "k", json!(1))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::VertexNotFound { .. }));
    }

    #[tokio::test]
    async fn test_unreadable_properties_are_reported_and_kept() {
        let store = create_test_store().await;
        store
            .create_vertex(&Vertex::new("u", "user").with_property("name", "alice"))
            .await
            .unwrap();
        sqlx::query("UPDATE vertices SET properties = 'not json' WHERE id = ?")
            .bind("u")
            .execute(store.pool())
            .await
            .unwrap();

        let read = store.get_vertex("u").await;
        assert!(matches!(read, Err(StorageError::Query { .. })));

        let write = store
            .set_vertex_property("u", "best_models", json!(["KMeans"]))
            .await;
        match write {
            Err(StorageError::Query { message }) => assert!(message.contains("u")),
            other => panic!("expected query error, got {:?}", other),
        }

        let (raw,): (String,) = sqlx::query_as("SELECT properties FROM vertices WHERE id = ?")
            .bind("u")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(raw, "not json");
    }

    #[tokio::test]
    async fn test_vertices_by_label_ordered_by_id() {
        let store = create_test_store().await;
        for id in ["c", "a", "b"] {
            store.create_vertex(&Vertex::new(id, "user")).await.unwrap();
        }
        store.create_vertex(&Vertex::new("x", "Answer")).await.unwrap();

        let users = store.vertices_by_label("user").await.unwrap();
        let ids: Vec<_> = users.iter().map(|v| v.id.as_str()).collect();

        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_delete_vertex_removes_touching_edges() {
        let store = create_test_store().await;
        for id in ["a", "b", "c"] {
            store.create_vertex(&Vertex::new(id, "Answer")).await.unwrap();
        }
        store
            .create_edge(&Edge::new("answer", "a", "b").with_id("a->b"))
            .await
            .unwrap();
        store
            .create_edge(&Edge::new("answer", "b", "c").with_id("b->c"))
            .await
            .unwrap();

        store.delete_vertex("b").await.unwrap();

        assert!(!store.vertex_exists("b").await.unwrap());
        assert!(store.get_edge("a->b").await.unwrap().is_none());
        assert!(store.get_edge("b->c").await.unwrap().is_none());
        assert!(store.outgoing_edges("a").await.unwrap().is_empty());
        assert!(store.vertex_exists("c").await.unwrap());
    }
}

#[cfg(test)]
mod edge_tests {
    use super::*;

    async fn store_with_vertices(ids: &[&str]) -> SqliteGraphStore {
        let store = create_test_store().await;
        for id in ids {
            store.create_vertex(&Vertex::new(*id, "Q_QCM")).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_outgoing_edges_keep_insertion_order() {
        let store = store_with_vertices(&["q", "z", "a", "m"]).await;

        for (to, text) in [("z", "first"), ("a", "second"), ("m", "third")] {
            store
                .create_edge(&Edge::new("option", "q", to).with_property("text", text))
                .await
                .unwrap();
        }

        let texts: Vec<_> = store
            .outgoing_edges("q")
            .await
            .unwrap()
            .iter()
            .map(|e| e.str_property("text").unwrap_or_default().to_string())
            .collect();

        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_edge_requires_existing_endpoints() {
        let store = store_with_vertices(&["q"]).await;

        let err = store
            .create_edge(&Edge::new("option", "q", "missing"))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::VertexNotFound { id } if id == "missing"));
    }

    #[tokio::test]
    async fn test_duplicate_edge_id_is_rejected() {
        let store = store_with_vertices(&["a", "b"]).await;
        let edge = Edge::new("answer", "a", "b").with_id("fixed");
        store.create_edge(&edge).await.unwrap();

        let err = store.create_edge(&edge).await.unwrap_err();

        assert!(matches!(err, StorageError::EdgeExists { .. }));
        assert_eq!(store.outgoing_edges("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edge_properties_round_trip() {
        let store = store_with_vertices(&["a", "b"]).await;
        let edge = Edge::new("option", "a", "b")
            .with_property("weights", json!([1.0, null, 0.5]))
            .with_property("restricted", true);
        store.create_edge(&edge).await.unwrap();

        let retrieved = store.get_edge(&edge.id).await.unwrap().unwrap();

        assert_eq!(retrieved, edge);
    }
}

#[cfg(test)]
mod import_tests {
    use super::*;

    #[tokio::test]
    async fn test_import_fixture_graph() {
        let store = create_test_store().await;
        let snapshot = fixture_snapshot();

        let summary = import_snapshot(&store, &snapshot).await.unwrap();

        assert_eq!(summary.vertices_created, snapshot.vertices.len());
        assert_eq!(summary.edges_created, snapshot.edges.len());
        assert_eq!(summary.vertices_skipped, 0);
        assert!(store.vertex_exists("end").await.unwrap());
    }

    #[tokio::test]
    async fn test_import_is_idempotent() {
        let store = create_test_store().await;
        let snapshot = fixture_snapshot();
        import_snapshot(&store, &snapshot).await.unwrap();

        let summary = import_snapshot(&store, &snapshot).await.unwrap();

        assert_eq!(summary.vertices_created, 0);
        assert_eq!(summary.edges_created, 0);
        assert_eq!(summary.vertices_skipped, snapshot.vertices.len());
        assert_eq!(summary.edges_skipped, snapshot.edges.len());
    }
}

#[cfg(test)]
mod file_tests {
    use super::*;

    #[tokio::test]
    async fn test_file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("forms.db"),
            max_connections: 2,
        };

        {
            let store = SqliteGraphStore::new(&config).await.unwrap();
            store
                .create_vertex(&Vertex::new("alice", "user"))
                .await
                .unwrap();
            store.pool().close().await;
        }

        let reopened = SqliteGraphStore::new(&config).await.unwrap();
        assert!(reopened.vertex_exists("alice").await.unwrap());
        assert!(config.path.exists());
    }
}
