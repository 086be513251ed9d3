//! SQLite-backed implementation of `PipeHandler`
//!
//! Documents are JSON objects with an integer `id`, stored per collection in
//! one `documents` table. Every pipe name gets its own collection, and all
//! collections share one connection.

use std::path::Path;
use std::sync::Arc;

use loaderpipe::{Outcome, PipeError, PipeHandler, ReadFilter};
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use tracing::debug;

const ID_FIELD: &str = "id";

fn backend(e: rusqlite::Error) -> PipeError {
    PipeError::Backend(e.to_string())
}

/// Database holding every collection
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (and create if needed) the database at `db_path`
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened or table creation fails.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, rusqlite::Error> {
        Self::with_connection(Connection::open(db_path)?)
    }

    /// Private in-memory database
    ///
    /// # Errors
    ///
    /// Returns error if table creation fails.
    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id INTEGER NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Handler serving one collection
    #[must_use]
    pub fn collection(&self, name: impl Into<String>) -> SqlitePipeHandler {
        SqlitePipeHandler {
            store: self.clone(),
            collection: name.into(),
        }
    }
}

pub struct SqlitePipeHandler {
    store: SqliteStore,
    collection: String,
}

impl SqlitePipeHandler {
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn next_id(conn: &Connection, collection: &str) -> rusqlite::Result<i64> {
        conn.query_row(
            "SELECT COALESCE(MAX(id), 0) + 1 FROM documents WHERE collection = ?",
            params![collection],
            |row| row.get(0),
        )
    }
}

impl PipeHandler for SqlitePipeHandler {
    fn on_read(&self, filter: Option<&ReadFilter>) -> Outcome<Vec<u8>> {
        let mut sql = String::from("SELECT body FROM documents WHERE collection = ?");
        let mut args = vec![SqlValue::Text(self.collection.clone())];

        if let Some(filter) = filter {
            for (key, expected) in filter.get_where() {
                sql.push_str(" AND CAST(json_extract(body, ?) AS TEXT) = ?");
                args.push(SqlValue::Text(format!("$.{key}")));
                args.push(SqlValue::Text(expected.clone()));
            }
        }
        sql.push_str(" ORDER BY id LIMIT ? OFFSET ?");
        let limit = filter.and_then(ReadFilter::get_limit).map_or(-1, i64::from);
        let offset = filter.and_then(ReadFilter::get_offset).map_or(0, i64::from);
        args.push(SqlValue::Integer(limit));
        args.push(SqlValue::Integer(offset));

        let conn = self.store.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(backend)?;
        let bodies = stmt
            .query_map(params_from_iter(args), |row| row.get::<_, String>(0))
            .map_err(backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)?;
        debug!(collection = %self.collection, rows = bodies.len(), "read");

        let docs = bodies
            .iter()
            .map(|body| serde_json::from_str::<Value>(body))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(serde_json::to_vec(&docs)?)
    }

    fn on_save(&self, body: &[u8]) -> Outcome<Vec<u8>> {
        let mut doc: Value = serde_json::from_slice(body)?;
        let Some(object) = doc.as_object_mut() else {
            return Err(PipeError::Status {
                code: 400,
                message: "document must be a JSON object".to_string(),
            });
        };

        let conn = self.store.conn.lock();
        let id = match object.get(ID_FIELD) {
            None | Some(Value::Null) => {
                let id = Self::next_id(&conn, &self.collection).map_err(backend)?;
                object.insert(ID_FIELD.to_string(), Value::from(id));
                id
            }
            Some(value) => value.as_i64().ok_or_else(|| PipeError::Status {
                code: 400,
                message: format!("document id must be an integer, got {value}"),
            })?,
        };

        let stored = serde_json::to_string(&doc)?;
        conn.execute(
            "INSERT OR REPLACE INTO documents (collection, id, body) VALUES (?, ?, ?)",
            params![self.collection, id, stored],
        )
        .map_err(backend)?;
        debug!(collection = %self.collection, id, "saved");
        Ok(stored.into_bytes())
    }

    fn on_remove(&self, id: &str) -> Outcome<()> {
        let Ok(key) = id.parse::<i64>() else {
            return Err(PipeError::NotFound(id.to_string()));
        };
        let conn = self.store.conn.lock();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM documents WHERE collection = ? AND id = ?",
                params![self.collection, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        if existing.is_none() {
            return Err(PipeError::NotFound(id.to_string()));
        }
        conn.execute(
            "DELETE FROM documents WHERE collection = ? AND id = ?",
            params![self.collection, key],
        )
        .map_err(backend)?;
        debug!(collection = %self.collection, id = key, "removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hamcrest::assert_that;
    use hamcrest::prelude::*;
    use serde_json::json;

    fn read(handler: &SqlitePipeHandler, filter: Option<&ReadFilter>) -> Vec<Value> {
        serde_json::from_slice(&handler.on_read(filter).unwrap()).unwrap()
    }

    #[test]
    fn test_save_assigns_sequential_ids() {
        let handler = SqliteStore::in_memory().unwrap().collection("widgets");
        let first: Value = serde_json::from_slice(&handler.on_save(br#"{"name":"a"}"#).unwrap()).unwrap();
        let second: Value = serde_json::from_slice(&handler.on_save(br#"{"name":"b"}"#).unwrap()).unwrap();

        assert_that!(first["id"].as_i64(), is(equal_to(Some(1))));
        assert_that!(second["id"].as_i64(), is(equal_to(Some(2))));
        assert_eq!(read(&handler, None).len(), 2);
    }

    #[test]
    fn test_save_with_id_replaces() {
        let handler = SqliteStore::in_memory().unwrap().collection("widgets");
        handler.on_save(br#"{"id":5,"name":"old"}"#).unwrap();
        handler.on_save(br#"{"id":5,"name":"new"}"#).unwrap();

        assert_eq!(read(&handler, None), vec![json!({"id": 5, "name": "new"})]);
    }

    #[test]
    fn test_read_filters_in_sql() {
        let handler = SqliteStore::in_memory().unwrap().collection("widgets");
        for (name, color) in [("a", "red"), ("b", "blue"), ("c", "red"), ("d", "red")] {
            let body = serde_json::to_vec(&json!({"name": name, "color": color})).unwrap();
            handler.on_save(&body).unwrap();
        }

        let filter = ReadFilter::new().where_eq("color", "red").offset(1).limit(1);
        let docs = read(&handler, Some(&filter));
        assert_eq!(docs, vec![json!({"id": 3, "name": "c", "color": "red"})]);

        let by_id = ReadFilter::new().where_eq("id", "2");
        assert_eq!(read(&handler, Some(&by_id))[0]["name"], json!("b"));
    }

    #[test]
    fn test_collections_are_separate() {
        let store = SqliteStore::in_memory().unwrap();
        let widgets = store.collection("widgets");
        let gadgets = store.collection("gadgets");
        widgets.on_save(br#"{"name":"a"}"#).unwrap();

        assert!(read(&gadgets, None).is_empty());
        assert_eq!(gadgets.on_remove("1"), Err(PipeError::NotFound("1".to_string())));
        assert_eq!(widgets.on_remove("1"), Ok(()));
        assert!(read(&widgets, None).is_empty());
    }

    #[test]
    fn test_bad_documents_are_rejected() {
        let handler = SqliteStore::in_memory().unwrap().collection("widgets");
        assert!(matches!(handler.on_save(b"[1, 2]"), Err(PipeError::Status { code: 400, .. })));
        assert!(matches!(handler.on_save(br#"{"id":"x"}"#), Err(PipeError::Status { code: 400, .. })));
        assert!(matches!(handler.on_save(b"not json"), Err(PipeError::Codec(_))));
        assert_eq!(handler.on_remove("abc"), Err(PipeError::NotFound("abc".to_string())));
    }
}
