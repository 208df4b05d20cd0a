use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{info, warn};

use super::{Edge, GraphStore, Properties, Vertex};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed graph store
#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    /// Create a new SQLite graph store
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create a store backed by a private in-memory database.
    ///
    /// The pool is pinned to a single connection that never expires, since
    /// every SQLite `:memory:` connection is its own database.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn get_vertex(&self, id: &str) -> StorageResult<Option<Vertex>> {
        let row: Option<VertexRow> = sqlx::query_as(
            r#"
            SELECT id, label, properties
            FROM vertices
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Vertex::try_from).transpose()
    }

    async fn vertex_exists(&self, id: &str) -> StorageResult<bool> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM vertices WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    async fn create_vertex(&self, vertex: &Vertex) -> StorageResult<()> {
        let properties = encode_properties(&vertex.properties)?;

        let result = sqlx::query(
            r#"
            INSERT INTO vertices (id, label, properties, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&vertex.id)
        .bind(&vertex.label)
        .bind(&properties)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::VertexExists {
                id: vertex.id.clone(),
            });
        }

        Ok(())
    }

    async fn set_vertex_property(&self, id: &str, key: &str, value: Value) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> = sqlx::query_as("SELECT properties FROM vertices WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some((raw,)) = row else {
            return Err(StorageError::VertexNotFound { id: id.to_string() });
        };

        let mut properties = decode_properties(&raw, id)?;
        properties.insert(key.to_string(), value);

        sqlx::query("UPDATE vertices SET properties = ? WHERE id = ?")
            .bind(encode_properties(&properties)?)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_vertex(&self, id: &str) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM edges WHERE from_id = ? OR to_id = ?")
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM vertices WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn vertices_by_label(&self, label: &str) -> StorageResult<Vec<Vertex>> {
        let rows: Vec<VertexRow> = sqlx::query_as(
            r#"
            SELECT id, label, properties
            FROM vertices
            WHERE label = ?
            ORDER BY id ASC
            "#,
        )
        .bind(label)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Vertex::try_from).collect()
    }

    async fn create_edge(&self, edge: &Edge) -> StorageResult<()> {
        for endpoint in [&edge.from, &edge.to] {
            if !self.vertex_exists(endpoint).await? {
                return Err(StorageError::VertexNotFound {
                    id: endpoint.clone(),
                });
            }
        }

        let properties = encode_properties(&edge.properties)?;

        let result = sqlx::query(
            r#"
            INSERT INTO edges (id, label, from_id, to_id, properties, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&edge.id)
        .bind(&edge.label)
        .bind(&edge.from)
        .bind(&edge.to)
        .bind(&properties)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::EdgeExists {
                id: edge.id.clone(),
            });
        }

        Ok(())
    }

    async fn get_edge(&self, id: &str) -> StorageResult<Option<Edge>> {
        let row: Option<EdgeRow> = sqlx::query_as(
            r#"
            SELECT id, label, from_id, to_id, properties
            FROM edges
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Edge::try_from).transpose()
    }

    async fn outgoing_edges(&self, id: &str) -> StorageResult<Vec<Edge>> {
        let rows: Vec<EdgeRow> = sqlx::query_as(
            r#"
            SELECT id, label, from_id, to_id, properties
            FROM edges
            WHERE from_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Edge::try_from).collect()
    }
}

fn encode_properties(properties: &Properties) -> StorageResult<String> {
    serde_json::to_string(properties).map_err(|e| StorageError::Query {
        message: format!("Failed to encode properties: {}", e),
    })
}

fn decode_properties(raw: &str, owner: &str) -> StorageResult<Properties> {
    serde_json::from_str(raw).map_err(|e| {
        warn!(error = %e, owner = %owner, "Unreadable properties");
        StorageError::Query {
            message: format!("Failed to decode properties of {}: {}", owner, e),
        }
    })
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct VertexRow {
    id: String,
    label: String,
    properties: String,
}

impl TryFrom<VertexRow> for Vertex {
    type Error = StorageError;

    fn try_from(row: VertexRow) -> StorageResult<Self> {
        let properties = decode_properties(&row.properties, &row.id)?;
        Ok(Self {
            id: row.id,
            label: row.label,
            properties,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EdgeRow {
    id: String,
    label: String,
    from_id: String,
    to_id: String,
    properties: String,
}

impl TryFrom<EdgeRow> for Edge {
    type Error = StorageError;

    fn try_from(row: EdgeRow) -> StorageResult<Self> {
        let properties = decode_properties(&row.properties, &row.id)?;
        Ok(Self {
            id: row.id,
            label: row.label,
            from: row.from_id,
            to: row.to_id,
            properties,
        })
    }
}
