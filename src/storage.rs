use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  #[error("blob database error: {0}")]
  Database(#[from] rusqlite::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
  pub content_type: String,
  pub bytes: Vec<u8>,
}

/// Durable store for generated files, served back over `/blobs/:id`.
#[async_trait]
pub trait BlobStore: Send + Sync {
  /// Stores `bytes` and returns the public URL.
  async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError>;
  async fn get(&self, id: &str) -> Result<Option<Blob>, StorageError>;
}

pub fn init_db(path: &Path) -> anyhow::Result<Connection> {
  let conn = Connection::open(path)?;
  create_schema(&conn)?;
  Ok(conn)
}

fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
  conn.execute_batch(
    "
    CREATE TABLE IF NOT EXISTS blobs (
      id TEXT PRIMARY KEY,
      created_at TEXT NOT NULL,
      name TEXT NOT NULL,
      content_type TEXT NOT NULL,
      bytes BLOB NOT NULL
    );
    ",
  )
}

pub struct SqliteBlobStore {
  db: Mutex<Connection>,
  public_base_url: String,
}

impl SqliteBlobStore {
  pub fn new(conn: Connection, public_base_url: &str) -> Self {
    Self {
      db: Mutex::new(conn),
      public_base_url: public_base_url.trim_end_matches('/').to_string(),
    }
  }

  #[cfg(test)]
  pub fn in_memory(public_base_url: &str) -> Result<Self, StorageError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(Self::new(conn, public_base_url))
  }

  pub fn url_for(&self, id: &str) -> String {
    format!("{}/blobs/{}", self.public_base_url, id)
  }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
  async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
    let id = uuid::Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    let conn = self.db.lock().await;
    conn.execute(
      "INSERT INTO blobs (id, created_at, name, content_type, bytes) VALUES (?1, ?2, ?3, ?4, ?5)",
      params![id, created_at, name, content_type, bytes],
    )?;
    Ok(self.url_for(&id))
  }

  async fn get(&self, id: &str) -> Result<Option<Blob>, StorageError> {
    let conn = self.db.lock().await;
    let blob = conn
      .query_row(
        "SELECT content_type, bytes FROM blobs WHERE id = ?1",
        params![id],
        |row| {
          Ok(Blob {
            content_type: row.get(0)?,
            bytes: row.get(1)?,
          })
        },
      )
      .optional()?;
    Ok(blob)
  }
}
