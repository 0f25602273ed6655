//! SQLite-backed catalog record store.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::CatalogError;
use crate::types::{Category, Item, Variant};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Result of writing a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Result of inserting a single variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Durable storage for items and variants.
///
/// Implementations must be safe to call from several tasks at once.
pub trait CatalogStore: Send + Sync {
    /// Fetches one item by id.
    fn get(&self, id: &str) -> Result<Option<Item>, CatalogError>;

    /// Inserts an item or replaces every field of an existing one.
    fn upsert(&self, item: &Item) -> Result<UpsertOutcome, CatalogError>;

    /// Upserts every item or none of them.
    ///
    /// Returns `(created, updated)` counts on commit.
    fn upsert_batch(&self, items: &[Item]) -> Result<(usize, usize), CatalogError>;

    /// Lists every item ordered by display name.
    fn list_all(&self) -> Result<Vec<Item>, CatalogError>;

    /// Lists the cached variants of an item, in insertion order.
    fn get_variants(&self, item_id: &str) -> Result<Vec<Variant>, CatalogError>;

    /// Inserts a variant unless one with the same `(item, channel, tag)`
    /// already exists.
    fn insert_variant(&self, variant: &Variant) -> Result<InsertOutcome, CatalogError>;
}

/// Catalog store backed by a single SQLite connection.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    /// Opens or creates the catalog database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory catalog.
    pub fn in_memory() -> Result<Self, CatalogError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CatalogError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // A panic while holding the lock cannot leave the connection mid-write:
    // every multi-statement write runs inside a transaction.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs raw SQL against the connection.
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<(), CatalogError> {
        self.conn().execute_batch(sql)?;
        Ok(())
    }
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    let category: String = row.get(2)?;
    Ok(Item {
        id: row.get(0)?,
        name: row.get(1)?,
        category: Category::from_remote(&category),
        rarity: row.get(3)?,
        icon: row.get(4)?,
        added_at: row.get(5)?,
    })
}

fn upsert_on(conn: &Connection, item: &Item) -> Result<UpsertOutcome, CatalogError> {
    let exists = conn
        .query_row("SELECT 1 FROM items WHERE id = ?1", params![item.id], |_| {
            Ok(())
        })
        .optional()?
        .is_some();

    conn.execute(
        "INSERT INTO items (id, name, category, rarity, icon, added_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             category = excluded.category,
             rarity = excluded.rarity,
             icon = excluded.icon,
             added_at = excluded.added_at",
        params![
            item.id,
            item.name,
            item.category.as_str(),
            item.rarity,
            item.icon,
            item.added_at,
        ],
    )?;

    Ok(if exists {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Created
    })
}

impl CatalogStore for SqliteCatalogStore {
    fn get(&self, id: &str) -> Result<Option<Item>, CatalogError> {
        let conn = self.conn();
        let item = conn
            .query_row(
                "SELECT id, name, category, rarity, icon, added_at FROM items WHERE id = ?1",
                params![id],
                item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    fn upsert(&self, item: &Item) -> Result<UpsertOutcome, CatalogError> {
        upsert_on(&self.conn(), item)
    }

    fn upsert_batch(&self, items: &[Item]) -> Result<(usize, usize), CatalogError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut created = 0;
        let mut updated = 0;
        for item in items {
            match upsert_on(&tx, item)? {
                UpsertOutcome::Created => created += 1,
                UpsertOutcome::Updated => updated += 1,
            }
        }

        // Dropping the transaction on error rolls it back.
        tx.commit()?;
        Ok((created, updated))
    }

    fn list_all(&self) -> Result<Vec<Item>, CatalogError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, category, rarity, icon, added_at FROM items ORDER BY name, id",
        )?;
        let items = stmt
            .query_map([], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn get_variants(&self, item_id: &str) -> Result<Vec<Variant>, CatalogError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT item_id, channel, tag, name, image FROM item_variants
             WHERE item_id = ?1 ORDER BY id",
        )?;
        let variants = stmt
            .query_map(params![item_id], |row| {
                Ok(Variant {
                    item_id: row.get(0)?,
                    channel: row.get(1)?,
                    tag: row.get(2)?,
                    name: row.get(3)?,
                    image: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(variants)
    }

    fn insert_variant(&self, variant: &Variant) -> Result<InsertOutcome, CatalogError> {
        let changed = self.conn().execute(
            "INSERT OR IGNORE INTO item_variants (item_id, channel, tag, name, image)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                variant.item_id,
                variant.channel,
                variant.tag,
                variant.name,
                variant.image,
            ],
        )?;
        Ok(if changed == 0 {
            InsertOutcome::AlreadyPresent
        } else {
            InsertOutcome::Inserted
        })
    }
}
