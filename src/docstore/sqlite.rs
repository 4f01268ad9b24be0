use async_trait::async_trait;
use rusqlite::params;
use serde_json::{Map, Value};

use super::{CollectionPath, Document, DocumentStore, StoreError, WriteBatch, WriteOp};
use crate::state::DbPool;

/// SQLite implementation. One row per document; each batch is one transaction.
pub struct SqliteDocumentStore {
    pool: DbPool,
}

impl SqliteDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn parse_row(id: String, data: String) -> Result<Document, StoreError> {
    let data: Map<String, Value> = serde_json::from_str(&data)?;
    Ok(Document::new(id, data))
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn list(&self, path: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT id, data FROM documents WHERE collection = ?1 ORDER BY seq")?;

        let rows = stmt.query_map(params![path.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, data) = row?;
            docs.push(parse_row(id, data)?);
        }
        Ok(docs)
    }

    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError> {
        let conn = self.pool.get()?;

        let result: Result<String, rusqlite::Error> = conn.query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
            params![path.as_str(), id],
            |row| row.get(0),
        );

        match result {
            Ok(data) => Ok(Some(parse_row(id.to_string(), data)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn count(&self, path: &CollectionPath) -> Result<usize, StoreError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![path.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        batch.check_size()?;

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        for op in batch.ops() {
            match op {
                WriteOp::Set { path, id, data } => {
                    let body = serde_json::to_string(data)?;
                    tx.execute(
                        "INSERT INTO documents (collection, id, owner, data)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(collection, id) DO UPDATE SET
                           data = excluded.data,
                           updated_at = datetime('now')",
                        params![path.as_str(), id, path.owner(), body],
                    )?;
                }
                WriteOp::Delete { path, id } => {
                    tx.execute(
                        "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                        params![path.as_str(), id],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn list_owners(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT owner FROM documents WHERE owner IS NOT NULL ORDER BY owner",
        )?;
        let owners = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(owners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteDocumentStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = db::create_pool(&db_path).unwrap();
        db::run_migrations(&pool).unwrap();
        (SqliteDocumentStore::new(pool), temp_dir)
    }

    fn fields(value: serde_json::Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _temp) = create_test_store();
        let path = CollectionPath::user("u1", "media").unwrap();

        store
            .set(&path, "m1", fields(json!({ "name": "rings.jpg", "userId": "u1" })))
            .await
            .unwrap();

        let doc = store.get(&path, "m1").await.unwrap().unwrap();
        assert_eq!(doc.str_field("name"), Some("rings.jpg"));
        assert_eq!(store.get(&path, "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_keeps_insertion_order() {
        let (store, _temp) = create_test_store();
        let path = CollectionPath::global("comments");

        store.set(&path, "first", fields(json!({ "n": 1 }))).await.unwrap();
        store.set(&path, "second", fields(json!({ "n": 2 }))).await.unwrap();
        store.set(&path, "first", fields(json!({ "n": 10 }))).await.unwrap();

        let docs = store.list(&path).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "first");
        assert_eq!(docs[0].data["n"], 10);
    }

    #[tokio::test]
    async fn test_oversized_batch_writes_nothing() {
        let (store, _temp) = create_test_store();
        let path = CollectionPath::global("media");
        store.set(&path, "keep", fields(json!({}))).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.delete(path.clone(), "keep");
        for i in 0..super::super::MAX_BATCH_WRITES {
            batch.set(path.clone(), format!("n{}", i), Map::new());
        }
        assert!(store.commit(batch).await.is_err());

        assert_eq!(store.count(&path).await.unwrap(), 1);
        assert!(store.get(&path, "keep").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_sql_error() {
        let (store, _temp) = create_test_store();
        let path = CollectionPath::global("media");

        // Reject one id so the second write of the batch fails
        {
            let conn = store.pool().get().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON documents
                 WHEN NEW.id = 'poison'
                 BEGIN SELECT RAISE(ABORT, 'poisoned'); END;",
            )
            .unwrap();
        }

        let mut batch = WriteBatch::new();
        batch.set(path.clone(), "ok", Map::new());
        batch.set(path.clone(), "poison", Map::new());
        assert!(store.commit(batch).await.is_err());

        assert_eq!(store.count(&path).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_owners() {
        let (store, _temp) = create_test_store();
        store
            .insert(&CollectionPath::global("media"), Map::new())
            .await
            .unwrap();
        store
            .insert(&CollectionPath::user("dev2", "media").unwrap(), Map::new())
            .await
            .unwrap();
        store
            .insert(&CollectionPath::user("u1", "comments").unwrap(), Map::new())
            .await
            .unwrap();
        store
            .insert(&CollectionPath::user("u1", "media").unwrap(), Map::new())
            .await
            .unwrap();

        assert_eq!(store.list_owners().await.unwrap(), vec!["dev2", "u1"]);
    }
}
