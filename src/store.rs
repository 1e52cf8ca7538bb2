//! Item store
//!
//! SQLite-backed history of clipboard items. The connection sits behind a
//! mutex so the daemon actor, the clipboard monitor and the enrichment tasks
//! can share one store through `Arc`.

use crate::error::StoreError;
use crate::item::{normalize_tags, ClipboardItem, ContentType, ItemId};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SELECT_COLUMNS: &str = "id, timestamp_ms, content, content_type, source_app, \
     usage_count, tags, vector_id, is_favorite, image_path";

/// Clipboard history database
pub struct ItemStore {
    conn: Mutex<Connection>,
}

impl ItemStore {
    /// Open or create the store at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        tracing::debug!("Opened item store at {:?}", path);
        Ok(store)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                timestamp_ms INTEGER NOT NULL,
                content TEXT NOT NULL,
                content_type TEXT NOT NULL DEFAULT 'text',
                source_app TEXT,
                usage_count INTEGER NOT NULL DEFAULT 0,
                tags TEXT NOT NULL DEFAULT '[]',
                vector_id TEXT,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                image_path TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_items_timestamp ON items(timestamp_ms DESC);
            CREATE INDEX IF NOT EXISTS idx_items_vector_id ON items(vector_id);
            "#,
        )?;
        Ok(())
    }

    /// Insert a new item. Empty content is refused.
    pub fn insert(&self, item: &ClipboardItem) -> Result<(), StoreError> {
        if item.content.trim().is_empty() {
            return Err(StoreError::EmptyContent);
        }

        let tags = serde_json::to_string(&item.tags)?;
        self.conn()?.execute(
            r#"
            INSERT INTO items (id, timestamp_ms, content, content_type, source_app,
                               usage_count, tags, vector_id, is_favorite, image_path)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                item.id.to_string(),
                item.timestamp.timestamp_millis(),
                item.content,
                item.content_type.as_str(),
                item.source_app,
                item.usage_count as i64,
                tags,
                item.vector_id,
                item.is_favorite as i32,
                item.image_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
            ],
        )?;
        Ok(())
    }

    /// Get an item by ID
    pub fn get(&self, id: &ItemId) -> Result<Option<ClipboardItem>, StoreError> {
        let conn = self.conn()?;
        find_item(&conn, id)
    }

    /// Delete an item, returning it so callers can cascade
    pub fn delete(&self, id: &ItemId) -> Result<Option<ClipboardItem>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let existing = find_item(&tx, id)?;
        if existing.is_some() {
            tx.execute("DELETE FROM items WHERE id = ?1", params![id.to_string()])?;
        }
        tx.commit()?;
        Ok(existing)
    }

    /// Most recent items first
    pub fn fetch_recent(&self, limit: usize) -> Result<Vec<ClipboardItem>, StoreError> {
        self.query_items(
            &format!(
                "SELECT {} FROM items ORDER BY timestamp_ms DESC LIMIT ?1",
                SELECT_COLUMNS
            ),
            params![limit as i64],
        )
    }

    /// Every item, most recent first
    pub fn fetch_all(&self) -> Result<Vec<ClipboardItem>, StoreError> {
        self.query_items(
            &format!("SELECT {} FROM items ORDER BY timestamp_ms DESC", SELECT_COLUMNS),
            [],
        )
    }

    /// Items whose vector id is in `vector_ids`
    pub fn fetch_by_vector_id(&self, vector_ids: &[String]) -> Result<Vec<ClipboardItem>, StoreError> {
        if vector_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=vector_ids.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM items WHERE vector_id IN ({}) ORDER BY timestamp_ms DESC",
            SELECT_COLUMNS, placeholders
        );
        self.query_items(&sql, rusqlite::params_from_iter(vector_ids.iter()))
    }

    /// Content of the most recently stored item
    pub fn latest_content(&self) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        let content = conn
            .query_row(
                "SELECT content FROM items ORDER BY timestamp_ms DESC LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(content)
    }

    /// Replace an item's tags (normalised)
    pub fn update_tags(&self, id: &ItemId, tags: &[String]) -> Result<(), StoreError> {
        let tags = serde_json::to_string(&normalize_tags(tags))?;
        self.update_one(
            "UPDATE items SET tags = ?2 WHERE id = ?1",
            id,
            tags,
        )
    }

    /// Record the vector index identifier for an item
    pub fn set_vector_id(&self, id: &ItemId, vector_id: &str) -> Result<(), StoreError> {
        self.update_one(
            "UPDATE items SET vector_id = ?2 WHERE id = ?1",
            id,
            vector_id.to_string(),
        )
    }

    /// Replace the content of an image item with its description
    pub fn update_content(&self, id: &ItemId, content: &str) -> Result<(), StoreError> {
        if content.trim().is_empty() {
            return Err(StoreError::EmptyContent);
        }
        let changed = self.conn()?.execute(
            "UPDATE items SET content = ?2, content_type = ?3 WHERE id = ?1",
            params![
                id.to_string(),
                content,
                ContentType::VisionExtracted.as_str()
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Bump the usage counter after a suggestion was accepted
    pub fn increment_usage(&self, id: &ItemId) -> Result<(), StoreError> {
        let changed = self.conn()?.execute(
            "UPDATE items SET usage_count = usage_count + 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn set_favorite(&self, id: &ItemId, favorite: bool) -> Result<(), StoreError> {
        self.update_one(
            "UPDATE items SET is_favorite = ?2 WHERE id = ?1",
            id,
            favorite as i32,
        )
    }

    /// Remove every item (optionally sparing favourites), returning what was removed
    pub fn clear(&self, keep_favorites: bool) -> Result<Vec<ClipboardItem>, StoreError> {
        let (select, delete) = if keep_favorites {
            (
                format!("SELECT {} FROM items WHERE is_favorite = 0", SELECT_COLUMNS),
                "DELETE FROM items WHERE is_favorite = 0",
            )
        } else {
            (
                format!("SELECT {} FROM items", SELECT_COLUMNS),
                "DELETE FROM items",
            )
        };
        // Select and delete must see the same rows, or an item inserted in
        // between would vanish without its vector and image being cleaned up
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = query_with(&tx, &select, [])?;
        tx.execute(delete, [])?;
        tx.commit()?;
        Ok(removed)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn update_one<V: rusqlite::ToSql>(
        &self,
        sql: &str,
        id: &ItemId,
        value: V,
    ) -> Result<(), StoreError> {
        let changed = self.conn()?.execute(sql, params![id.to_string(), value])?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn query_items<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<ClipboardItem>, StoreError> {
        let conn = self.conn()?;
        query_with(&conn, sql, params)
    }
}

fn find_item(conn: &Connection, id: &ItemId) -> Result<Option<ClipboardItem>, StoreError> {
    let item = conn
        .query_row(
            &format!("SELECT {} FROM items WHERE id = ?1", SELECT_COLUMNS),
            params![id.to_string()],
            row_to_item,
        )
        .optional()?;
    Ok(item.flatten())
}

fn query_with<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<ClipboardItem>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, row_to_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().flatten().collect())
}

/// Map a row to an item. Rows whose id is not a UUID are skipped: a fresh
/// id would not match the vector entry or any later delete.
fn row_to_item(row: &Row<'_>) -> rusqlite::Result<Option<ClipboardItem>> {
    let raw_id: String = row.get(0)?;
    let id = match ItemId::parse(&raw_id) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("Skipping stored item with invalid id {:?}: {}", raw_id, e);
            return Ok(None);
        }
    };

    let tags_json: String = row.get(6)?;
    let tags = match serde_json::from_str::<Vec<String>>(&tags_json) {
        Ok(tags) => tags,
        Err(e) => {
            tracing::warn!("Ignoring unreadable tags of {}: {}", id, e);
            Vec::new()
        }
    };

    Ok(Some(ClipboardItem {
        id,
        timestamp: millis_to_datetime(row.get(1)?),
        content: row.get(2)?,
        content_type: ContentType::from_str_lossy(&row.get::<_, String>(3)?),
        source_app: row.get(4)?,
        usage_count: row.get::<_, i64>(5)?.max(0) as u32,
        tags,
        vector_id: row.get(7)?,
        is_favorite: row.get::<_, i32>(8)? != 0,
        image_path: row.get::<_, Option<String>>(9)?.map(PathBuf::from),
    }))
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}
