//! SQLite storage implementation
//!
//! This module provides a SQLite-backed implementation of the `ItemStore`
//! and `ErrorLog` traits. rusqlite is synchronous, so the async trait
//! methods hop onto the blocking pool; the connection itself sits behind a
//! mutex shared by every clone of the store.

use crate::model::{DiscoveredEdge, Item, UserRecord};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ErrorLog, ItemStore, StorageError, StorageResult, UpsertSummary};
use crate::storage::Collection;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite storage backend
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens or creates the database at `path` and bootstraps the schema
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// View of this store that upserts edges into `collection`
    pub fn item_store(&self, collection: Collection) -> SqliteItemStore {
        SqliteItemStore {
            store: self.clone(),
            collection,
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&mut conn)
    }

    /// Runs `f` on the blocking pool against a clone of this store
    pub async fn run_blocking<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&SqliteStore) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    // ===== Shared boxes =====

    /// Upserts parent-tagged edges keyed by `item.node` in one transaction
    pub fn upsert_shared_boxes(&self, edges: &[DiscoveredEdge]) -> StorageResult<UpsertSummary> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut summary = UpsertSummary::default();
            {
                let mut exists =
                    tx.prepare_cached("SELECT EXISTS(SELECT 1 FROM sharedboxes WHERE node = ?1)")?;
                let mut upsert = tx.prepare_cached(
                    "INSERT INTO sharedboxes (node, name, url, drive_path, parent_node, synced_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(node) DO UPDATE SET
                        name = excluded.name,
                        url = excluded.url,
                        drive_path = excluded.drive_path,
                        parent_node = excluded.parent_node,
                        synced_at = excluded.synced_at",
                )?;

                for edge in edges {
                    let item = &edge.item;
                    let existed: bool = exists.query_row(params![item.node], |row| row.get(0))?;
                    upsert.execute(params![
                        item.node,
                        item.name,
                        item.url,
                        item.drive_path,
                        edge.parent_node,
                        now
                    ])?;
                    if existed {
                        summary.replaced += 1;
                    } else {
                        summary.inserted += 1;
                    }
                }
            }
            tx.commit()?;
            Ok(summary)
        })
    }

    /// Gets the stored edge for `node`
    pub fn get_shared_box(&self, node: &str) -> StorageResult<Option<DiscoveredEdge>> {
        self.with_conn(|conn| {
            let edge = conn
                .query_row(
                    "SELECT node, name, url, drive_path, parent_node FROM sharedboxes WHERE node = ?1",
                    params![node],
                    |row| {
                        Ok(DiscoveredEdge {
                            item: Item {
                                node: row.get(0)?,
                                name: row.get(1)?,
                                url: row.get(2)?,
                                drive_path: row.get(3)?,
                            },
                            parent_node: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(edge)
        })
    }

    // ===== Item-only snapshot =====

    /// Upserts items keyed by `node` in one transaction
    pub fn upsert_items<'a>(
        &self,
        items: impl IntoIterator<Item = &'a Item>,
    ) -> StorageResult<UpsertSummary> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut summary = UpsertSummary::default();
            {
                let mut exists = tx.prepare_cached(
                    "SELECT EXISTS(SELECT 1 FROM sharedbox_items WHERE node = ?1)",
                )?;
                let mut upsert = tx.prepare_cached(
                    "INSERT INTO sharedbox_items (node, name, url, drive_path, synced_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(node) DO UPDATE SET
                        name = excluded.name,
                        url = excluded.url,
                        drive_path = excluded.drive_path,
                        synced_at = excluded.synced_at",
                )?;

                for item in items {
                    let existed: bool = exists.query_row(params![item.node], |row| row.get(0))?;
                    upsert.execute(params![item.node, item.name, item.url, item.drive_path, now])?;
                    if existed {
                        summary.replaced += 1;
                    } else {
                        summary.inserted += 1;
                    }
                }
            }
            tx.commit()?;
            Ok(summary)
        })
    }

    /// Gets the stored item for `node`
    pub fn get_item(&self, node: &str) -> StorageResult<Option<Item>> {
        self.with_conn(|conn| {
            let item = conn
                .query_row(
                    "SELECT node, name, url, drive_path FROM sharedbox_items WHERE node = ?1",
                    params![node],
                    |row| {
                        Ok(Item {
                            node: row.get(0)?,
                            name: row.get(1)?,
                            url: row.get(2)?,
                            drive_path: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(item)
        })
    }

    // ===== Users =====

    /// Upserts users keyed by `user_seq` in one transaction
    ///
    /// A record without `user_seq` fails the whole batch.
    pub fn upsert_users(&self, users: &[UserRecord]) -> StorageResult<UpsertSummary> {
        let now = Utc::now().to_rfc3339();
        let rows = users
            .iter()
            .map(|user| {
                let seq = user.user_seq().ok_or(StorageError::MissingKey("user_seq"))?;
                Ok((seq, serde_json::to_string(user)?))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut summary = UpsertSummary::default();
            {
                let mut exists =
                    tx.prepare_cached("SELECT EXISTS(SELECT 1 FROM users WHERE user_seq = ?1)")?;
                let mut upsert = tx.prepare_cached(
                    "INSERT INTO users (user_seq, record, synced_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(user_seq) DO UPDATE SET
                        record = excluded.record,
                        synced_at = excluded.synced_at",
                )?;

                for (seq, record) in &rows {
                    let existed: bool = exists.query_row(params![seq], |row| row.get(0))?;
                    upsert.execute(params![seq, record, now])?;
                    if existed {
                        summary.replaced += 1;
                    } else {
                        summary.inserted += 1;
                    }
                }
            }
            tx.commit()?;
            Ok(summary)
        })
    }

    /// Gets the stored record for `user_seq`
    pub fn get_user(&self, user_seq: &str) -> StorageResult<Option<UserRecord>> {
        let record: Option<String> = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT record FROM users WHERE user_seq = ?1",
                    params![user_seq],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        record
            .map(|json| serde_json::from_str(&json).map_err(StorageError::from))
            .transpose()
    }

    // ===== Error log =====

    /// Appends `messages` to the list `key` in one transaction
    pub fn append_errors(&self, key: &str, messages: &[String]) -> StorageResult<u64> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut insert = tx.prepare_cached(
                    "INSERT INTO error_log (list_key, message, appended_at) VALUES (?1, ?2, ?3)",
                )?;
                for message in messages {
                    insert.execute(params![key, message, now])?;
                }
            }
            tx.commit()?;
            Ok(messages.len() as u64)
        })
    }

    /// Gets every message of the list `key`, oldest first
    pub fn error_messages(&self, key: &str) -> StorageResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT message FROM error_log WHERE list_key = ?1 ORDER BY id")?;
            let messages = stmt
                .query_map(params![key], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(messages)
        })
    }

    // ===== Statistics =====

    /// Counts the records of `collection`
    pub fn count(&self, collection: Collection) -> StorageResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", collection.table_name());
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}

#[async_trait]
impl ErrorLog for SqliteStore {
    async fn append(&self, key: &str, messages: Vec<String>) -> StorageResult<u64> {
        let key = key.to_string();
        self.run_blocking(move |store| store.append_errors(&key, &messages))
            .await
    }
}

/// `ItemStore` over one collection of a `SqliteStore`
#[derive(Clone)]
pub struct SqliteItemStore {
    store: SqliteStore,
    collection: Collection,
}

impl SqliteItemStore {
    pub fn collection(&self) -> Collection {
        self.collection
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn upsert_edges(&self, edges: Vec<DiscoveredEdge>) -> StorageResult<UpsertSummary> {
        let collection = self.collection;
        self.store
            .run_blocking(move |store| match collection {
                Collection::SharedBoxes => store.upsert_shared_boxes(&edges),
                Collection::Items => store.upsert_items(edges.iter().map(|edge| &edge.item)),
                Collection::Users => Err(StorageError::Database(
                    "users cannot be written from shared box edges".to_string(),
                )),
            })
            .await
    }
}
