//! SQLite-backed memory store. Persistent across process restarts.
//!
//! Schema (exact, part of the persisted-state contract):
//! `short_mem(id TEXT PRIMARY KEY, content TEXT, meta TEXT, created_at REAL)`
//! and `long_mem(...)` — `meta` is JSON-encoded UTF-8. WAL mode serializes
//! writers. Search is a `LIKE` substring match, unscored.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::params;

use super::store::{MemoryError, MemoryHit, MemoryRecord, MemoryScope, MemoryStore};

/// SQLite store with the `short_mem`/`long_mem` tables.
///
/// Uses `spawn_blocking` for all rusqlite work; one connection per
/// operation keeps the store `Send + Sync` without a pool.
pub struct SqliteMemoryStore {
    db_path: std::path::PathBuf,
}

impl SqliteMemoryStore {
    /// Opens (creating if needed) the database and ensures both tables exist.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| MemoryError::Storage(e.to_string()))?;
            }
        }
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
        for table in ["short_mem", "long_mem"] {
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        id TEXT PRIMARY KEY,
                        content TEXT,
                        meta TEXT,
                        created_at REAL
                    )",
                    table
                ),
                [],
            )
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
        }
        Ok(Self { db_path })
    }

    fn open(db_path: &Path) -> Result<rusqlite::Connection, MemoryError> {
        rusqlite::Connection::open(db_path).map_err(|e| MemoryError::Storage(e.to_string()))
    }

    fn row_to_record(
        id: String,
        content: String,
        meta: String,
        created_at: f64,
    ) -> Result<MemoryRecord, MemoryError> {
        let metadata = serde_json::from_str(&meta)?;
        Ok(MemoryRecord {
            id,
            content,
            metadata,
            created_at,
            updated_at: created_at,
        })
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn put(&self, scope: MemoryScope, record: MemoryRecord) -> Result<(), MemoryError> {
        let meta = serde_json::to_string(&record.metadata)?;
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Self::open(&db_path)?;
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO {} (id, content, meta, created_at) VALUES (?1, ?2, ?3, ?4)",
                    scope.table()
                ),
                params![record.id, record.content, meta, record.created_at],
            )
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
            Ok::<(), MemoryError>(())
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }

    async fn get(&self, scope: MemoryScope, id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        let id = id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Self::open(&db_path)?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT id, content, meta, created_at FROM {} WHERE id = ?1",
                    scope.table()
                ))
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            let mut rows = stmt
                .query(params![id])
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            let row = match rows.next().map_err(|e| MemoryError::Storage(e.to_string()))? {
                Some(r) => r,
                None => return Ok(None),
            };
            let record = Self::row_to_record(
                row.get(0).map_err(|e| MemoryError::Storage(e.to_string()))?,
                row.get(1).map_err(|e| MemoryError::Storage(e.to_string()))?,
                row.get(2).map_err(|e| MemoryError::Storage(e.to_string()))?,
                row.get(3).map_err(|e| MemoryError::Storage(e.to_string()))?,
            )?;
            Ok(Some(record))
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }

    async fn search(
        &self,
        scope: MemoryScope,
        query: &str,
        limit: usize,
        _relevance_cutoff: f32,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        let pattern = format!("%{}%", query);
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Self::open(&db_path)?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT id, content, meta, created_at FROM {} WHERE content LIKE ?1 ORDER BY created_at DESC LIMIT ?2",
                    scope.table()
                ))
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![pattern, limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, f64>(3)?,
                    ))
                })
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            let mut hits = Vec::new();
            for row in rows {
                let (id, content, meta, created_at) =
                    row.map_err(|e| MemoryError::Storage(e.to_string()))?;
                hits.push(MemoryHit {
                    record: Self::row_to_record(id, content, meta, created_at)?,
                    score: None,
                });
            }
            Ok(hits)
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }

    async fn delete(&self, scope: MemoryScope, id: &str) -> Result<(), MemoryError> {
        let id = id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Self::open(&db_path)?;
            conn.execute(
                &format!("DELETE FROM {} WHERE id = ?1", scope.table()),
                params![id],
            )
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }

    async fn reset(&self, scope: MemoryScope) -> Result<(), MemoryError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Self::open(&db_path)?;
            conn.execute(&format!("DELETE FROM {}", scope.table()), [])
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn temp_store() -> (SqliteMemoryStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMemoryStore::new(dir.path().join("memory.db")).unwrap();
        (store, dir)
    }

    fn record(content: &str, quality: f64) -> MemoryRecord {
        let mut meta = Map::new();
        meta.insert("quality".into(), json!(quality));
        MemoryRecord::new(content, meta)
    }

    /// **Scenario**: put/get round-trips content and JSON metadata.
    #[tokio::test]
    async fn put_get_roundtrip_with_metadata() {
        let (store, _dir) = temp_store();
        let rec = record("the answer is 42", 0.8);
        let id = rec.id.clone();
        store.put(MemoryScope::ShortTerm, rec).await.unwrap();

        let loaded = store.get(MemoryScope::ShortTerm, &id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "the answer is 42");
        assert_eq!(loaded.metric("quality"), Some(0.8));
        assert!(store.get(MemoryScope::LongTerm, &id).await.unwrap().is_none());
    }

    /// **Scenario**: search is substring over content, scoped per table,
    /// limited, and unscored.
    #[tokio::test]
    async fn search_substring_scoped_and_limited() {
        let (store, _dir) = temp_store();
        store
            .put(MemoryScope::ShortTerm, record("prime numbers 2 3 5", 0.5))
            .await
            .unwrap();
        store
            .put(MemoryScope::ShortTerm, record("haiku about primes", 0.5))
            .await
            .unwrap();
        store
            .put(MemoryScope::LongTerm, record("prime directive", 0.5))
            .await
            .unwrap();

        let hits = store
            .search(MemoryScope::ShortTerm, "prime", 10, 0.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score.is_none()));

        let limited = store
            .search(MemoryScope::ShortTerm, "prime", 1, 0.0)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    /// **Scenario**: delete removes one record; reset clears only the scope.
    #[tokio::test]
    async fn delete_and_reset_are_scoped() {
        let (store, _dir) = temp_store();
        let short = record("short fact", 0.5);
        let long = record("long fact", 0.9);
        let short_id = short.id.clone();
        store.put(MemoryScope::ShortTerm, short).await.unwrap();
        store.put(MemoryScope::LongTerm, long).await.unwrap();

        store.delete(MemoryScope::ShortTerm, &short_id).await.unwrap();
        assert!(store.get(MemoryScope::ShortTerm, &short_id).await.unwrap().is_none());

        store.reset(MemoryScope::LongTerm).await.unwrap();
        assert!(store
            .search(MemoryScope::LongTerm, "fact", 10, 0.0)
            .await
            .unwrap()
            .is_empty());
    }

    /// **Scenario**: the persisted schema matches the contract exactly.
    #[tokio::test]
    async fn schema_matches_contract() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        let _store = SqliteMemoryStore::new(&path).unwrap();

        let conn = rusqlite::Connection::open(&path).unwrap();
        for table in ["short_mem", "long_mem"] {
            let mut stmt = conn
                .prepare(&format!("PRAGMA table_info({})", table))
                .unwrap();
            let cols: Vec<(String, String)> = stmt
                .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))
                .unwrap()
                .map(Result::unwrap)
                .collect();
            let names: Vec<&str> = cols.iter().map(|(n, _)| n.as_str()).collect();
            assert_eq!(names, ["id", "content", "meta", "created_at"]);
            assert_eq!(cols[3].1.to_uppercase(), "REAL");
        }
    }
}
