//! SQLite-backed product store.
//!
//! All CRUD and search operations go through [`RecordStore`], which owns the
//! database connection behind a single lock. Backup and restore reuse the
//! same lock for their whole-file read and replace phases, so no CRUD
//! operation can interleave with a file transfer.
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! Writes that touch more than one statement are transactional.

use crate::error::{InventoryError, Result};
use crate::normalize::normalize;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A single inventory record.
///
/// `id` and `sku` are assigned by the store on insert and never change;
/// `stock` is the only field mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub sku: String,
    pub stock: i64,
}

/// Durable store for [`Product`] records.
///
/// Owns the connection and the path to the database file. Every operation
/// acquires the lock for its full critical section; [`snapshot_bytes`] and
/// [`replace_from_bytes`] hold it across the entire file read or
/// replacement.
///
/// [`snapshot_bytes`]: RecordStore::snapshot_bytes
/// [`replace_from_bytes`]: RecordStore::replace_from_bytes
pub struct RecordStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl RecordStore {
    /// Opens (or creates) the database file and initialises the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| InventoryError::StorageUnavailable(e.to_string()))?;
            }
        }
        let conn = open_conn(&path)?;
        log::info!("Opened inventory database: {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-runs schema creation. Safe to call any number of times; never
    /// alters existing rows.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        init_schema(&conn)
    }

    /// All records, most recently inserted first.
    pub fn list_all(&self) -> Result<Vec<Product>> {
        let conn = self.conn.lock().unwrap();
        list_all_conn(&conn)
    }

    /// Inserts a new product, assigning its id and SKU.
    ///
    /// The name must be non-empty after trimming. Negative stock is stored
    /// as 0; the non-negativity invariant is enforced here, not at callers.
    pub fn add(&self, name: &str, stock: i64) -> Result<Product> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InventoryError::Validation(
                "product name must not be empty".to_string(),
            ));
        }
        let mut conn = self.conn.lock().unwrap();
        add_conn(&mut conn, name, stock.max(0))
    }

    /// Sets the stock level for `id`, returning the number of rows touched.
    ///
    /// An unknown id affects zero rows, which is success, not an error.
    pub fn update_stock(&self, id: i64, stock: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE inventory SET stock = ?1 WHERE id = ?2",
            params![stock.max(0), id],
        )?;
        Ok(affected)
    }

    /// Removes the product with `id`, returning the number of rows touched.
    /// An unknown id is a silent no-op.
    pub fn delete(&self, id: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM inventory WHERE id = ?1", params![id])?;
        Ok(affected)
    }

    /// Fetches one product by id.
    pub fn get(&self, id: i64) -> Result<Product> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, sku, stock FROM inventory WHERE id = ?1",
            params![id],
            row_to_product,
        )
        .optional()?
        .ok_or(InventoryError::NotFound(id))
    }

    /// Products whose normalised name or SKU contains the normalised query,
    /// optionally restricted to products with stock on hand.
    ///
    /// Matching is a pure function of one consistent snapshot of the
    /// collection; an empty query matches everything.
    pub fn search(&self, query: &str, in_stock_only: bool) -> Result<Vec<Product>> {
        let needle = normalize(query);
        let mut products = self.list_all()?;
        products.retain(|p| {
            let matches =
                normalize(&p.name).contains(&needle) || normalize(&p.sku).contains(&needle);
            matches && (!in_stock_only || p.stock > 0)
        });
        Ok(products)
    }

    /// Reads the full database file, holding the lock for the entire read
    /// so no write can interleave with the transfer.
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>> {
        let _conn = self.conn.lock().unwrap();
        fs::read(&self.path).map_err(InventoryError::LocalReadFailed)
    }

    /// Atomically replaces the database file with `bytes` and re-runs schema
    /// creation, so a copy that predates a schema change still initialises.
    ///
    /// The lock is held for the entire replacement. The swap is a staged
    /// write followed by a rename; any failure before the rename leaves the
    /// existing file untouched.
    pub fn replace_from_bytes(&self, bytes: &[u8]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();

        let staging = self.path.with_extension("db.staging");
        // Stage and validate the incoming bytes before touching the live
        // file: they must open as a database, and schema init runs on the
        // staged copy so a file predating a schema change arrives ready.
        let staged = stage_file(&staging, bytes)
            .map_err(|e| InventoryError::StorageUnavailable(e.to_string()))
            .and_then(|_| open_conn(&staging).map(drop));
        if let Err(e) = staged {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        // Close the live handle before the rename; the reopen below must see
        // the new file, not the inode the old handle still has open.
        let placeholder = Connection::open_in_memory()?;
        drop(std::mem::replace(&mut *conn, placeholder));

        let swapped = fs::rename(&staging, &self.path)
            .map_err(|e| InventoryError::StorageUnavailable(e.to_string()))
            .and_then(|_| open_conn(&self.path));

        match swapped {
            Ok(new_conn) => {
                *conn = new_conn;
                log::info!("Replaced database file ({} bytes)", bytes.len());
                Ok(())
            }
            Err(e) => {
                // Reopen whatever is on disk so the store keeps serving.
                let _ = fs::remove_file(&staging);
                if let Ok(old_conn) = open_conn(&self.path) {
                    *conn = old_conn;
                }
                Err(e)
            }
        }
    }
}

/// Parses a raw stock field from a form or query string.
///
/// Unparseable input and negative numbers both become 0 rather than failing
/// the request.
pub fn parse_stock(raw: &str) -> i64 {
    raw.trim().parse::<i64>().unwrap_or(0).max(0)
}

/// Opens a connection and prepares it for use.
fn open_conn(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| InventoryError::StorageUnavailable(e.to_string()))?;
    // A restored file may arrive in WAL mode; the snapshot path reads only
    // the main database file, so keep rollback journaling.
    conn.execute_batch("PRAGMA journal_mode = DELETE;").ok();
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates the `inventory` table if it does not already exist.
fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS inventory (
            id    INTEGER PRIMARY KEY AUTOINCREMENT,
            name  TEXT NOT NULL,
            sku   TEXT UNIQUE NOT NULL,
            stock INTEGER NOT NULL
        );",
    )?;
    Ok(())
}

fn add_conn(conn: &mut Connection, name: &str, stock: i64) -> Result<Product> {
    let tx = conn.transaction()?;

    // The next id comes from the table's AUTOINCREMENT sequence, which never
    // decreases on delete: a freshly issued SKU cannot collide with one
    // handed out before a deletion. MAX(id) alone would.
    let next_id: i64 = tx.query_row(
        "SELECT MAX(
             COALESCE((SELECT seq FROM sqlite_sequence WHERE name = 'inventory'), 0),
             COALESCE((SELECT MAX(id) FROM inventory), 0)
         ) + 1",
        [],
        |row| row.get(0),
    )?;
    let sku = sku_for(next_id);
    tx.execute(
        "INSERT INTO inventory (name, sku, stock) VALUES (?1, ?2, ?3)",
        params![name, sku, stock],
    )?;
    let id = tx.last_insert_rowid();
    debug_assert_eq!(id, next_id);
    tx.commit()?;

    log::info!("Added product {} ({})", id, sku);
    Ok(Product {
        id,
        name: name.to_string(),
        sku,
        stock,
    })
}

/// SKU for an assigned id: `PROD` plus the id zero-padded to three digits.
/// Sequences past 999 keep their natural width.
fn sku_for(id: i64) -> String {
    format!("PROD{:03}", id)
}

fn list_all_conn(conn: &Connection) -> Result<Vec<Product>> {
    let mut stmt =
        conn.prepare("SELECT id, name, sku, stock FROM inventory ORDER BY id DESC")?;
    let rows = stmt.query_map([], row_to_product)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn row_to_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        sku: row.get(2)?,
        stock: row.get(3)?,
    })
}

/// Writes `bytes` to `staging` and syncs it, so the rename that follows can
/// only publish fully written contents.
fn stage_file(staging: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(staging, bytes)?;
    fs::File::open(staging)?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (RecordStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::open(temp_dir.path().join("inventory.db")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn open_creates_schema() {
        let (store, _dir) = test_store();
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn initialize_is_idempotent() {
        let (store, _dir) = test_store();
        let widget = store.add("Widget", 3).unwrap();
        for _ in 0..5 {
            store.initialize().unwrap();
        }
        assert_eq!(store.list_all().unwrap(), vec![widget]);
    }

    #[test]
    fn add_assigns_increasing_ids_and_skus() {
        let (store, _dir) = test_store();
        let a = store.add("Widget A", 1).unwrap();
        let b = store.add("Widget B", 2).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(a.sku, "PROD001");
        assert_eq!(b.id, 2);
        assert_eq!(b.sku, "PROD002");
        assert!(b.id > a.id);
    }

    #[test]
    fn add_trims_name() {
        let (store, _dir) = test_store();
        let p = store.add("  Widget  ", 1).unwrap();
        assert_eq!(p.name, "Widget");
    }

    #[test]
    fn add_rejects_empty_name() {
        let (store, _dir) = test_store();
        assert!(matches!(
            store.add("   ", 1),
            Err(InventoryError::Validation(_))
        ));
        assert!(store.list_all().unwrap().is_empty(), "nothing committed");
    }

    #[test]
    fn add_clamps_negative_stock() {
        let (store, _dir) = test_store();
        let p = store.add("Widget", -5).unwrap();
        assert_eq!(p.stock, 0);
        assert_eq!(store.get(p.id).unwrap().stock, 0);
    }

    #[test]
    fn sku_format_grows_past_three_digits() {
        assert_eq!(sku_for(1), "PROD001");
        assert_eq!(sku_for(42), "PROD042");
        assert_eq!(sku_for(999), "PROD999");
        assert_eq!(sku_for(1042), "PROD1042");
    }

    #[test]
    fn list_all_orders_newest_first() {
        let (store, _dir) = test_store();
        store.add("First", 1).unwrap();
        store.add("Second", 2).unwrap();
        store.add("Third", 3).unwrap();
        let names: Vec<String> = store
            .list_all()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Third", "Second", "First"]);
    }

    #[test]
    fn update_stock_changes_only_stock() {
        let (store, _dir) = test_store();
        let p = store.add("Widget", 1).unwrap();
        let affected = store.update_stock(p.id, 9).unwrap();
        assert_eq!(affected, 1);
        let updated = store.get(p.id).unwrap();
        assert_eq!(updated.stock, 9);
        assert_eq!(updated.name, p.name);
        assert_eq!(updated.sku, p.sku);
    }

    #[test]
    fn update_stock_unknown_id_is_noop() {
        let (store, _dir) = test_store();
        let affected = store.update_stock(999, 5).unwrap();
        assert_eq!(affected, 0);
        assert!(store.list_all().unwrap().is_empty(), "no record created");
    }

    #[test]
    fn update_stock_clamps_negative() {
        let (store, _dir) = test_store();
        let p = store.add("Widget", 5).unwrap();
        store.update_stock(p.id, -3).unwrap();
        assert_eq!(store.get(p.id).unwrap().stock, 0);
    }

    #[test]
    fn delete_removes_row() {
        let (store, _dir) = test_store();
        let p = store.add("Widget", 1).unwrap();
        assert_eq!(store.delete(p.id).unwrap(), 1);
        assert!(matches!(
            store.get(p.id),
            Err(InventoryError::NotFound(_))
        ));
    }

    #[test]
    fn delete_unknown_id_is_noop() {
        let (store, _dir) = test_store();
        assert_eq!(store.delete(42).unwrap(), 0);
    }

    #[test]
    fn delete_then_add_reuses_neither_id_nor_sku() {
        let (store, _dir) = test_store();
        store.add("A", 1).unwrap();
        let b = store.add("B", 1).unwrap();
        assert_eq!(b.sku, "PROD002");

        store.delete(b.id).unwrap();
        let c = store.add("C", 1).unwrap();

        // The sequence survives the deletion: no id reuse, no SKU collision.
        assert_eq!(c.id, 3);
        assert_eq!(c.sku, "PROD003");
        let skus: Vec<String> = store
            .list_all()
            .unwrap()
            .into_iter()
            .map(|p| p.sku)
            .collect();
        assert_eq!(skus, vec!["PROD003", "PROD001"]);
    }

    #[test]
    fn search_matches_name_and_sku() {
        let (store, _dir) = test_store();
        let widget = store.add("Widget A", 0).unwrap();
        let gadget = store.add("Gadget", 5).unwrap();

        let by_name = store.search("widget", false).unwrap();
        assert_eq!(by_name, vec![widget.clone()]);

        let by_sku = store.search("prod002", false).unwrap();
        assert_eq!(by_sku, vec![gadget]);
    }

    #[test]
    fn search_in_stock_only_excludes_empty_stock() {
        let (store, _dir) = test_store();
        store.add("Widget A", 0).unwrap();
        store.add("Gadget", 5).unwrap();
        assert!(store.search("widget", true).unwrap().is_empty());
    }

    #[test]
    fn search_is_punctuation_insensitive() {
        let (store, _dir) = test_store();
        let p = store.add("Widget-X!", 1).unwrap();
        assert_eq!(store.search("widget x", false).unwrap(), vec![p]);
    }

    #[test]
    fn search_empty_query_returns_everything() {
        let (store, _dir) = test_store();
        store.add("A", 1).unwrap();
        store.add("B", 0).unwrap();
        assert_eq!(store.search("", false).unwrap().len(), 2);
        assert_eq!(store.search("", true).unwrap().len(), 1);
    }

    #[test]
    fn parse_stock_coerces_bad_input() {
        assert_eq!(parse_stock("7"), 7);
        assert_eq!(parse_stock(" 12 "), 12);
        assert_eq!(parse_stock("abc"), 0);
        assert_eq!(parse_stock(""), 0);
        assert_eq!(parse_stock("-3"), 0);
        assert_eq!(parse_stock("3.5"), 0);
    }

    #[test]
    fn snapshot_bytes_reads_a_sqlite_file() {
        let (store, _dir) = test_store();
        store.add("Widget", 1).unwrap();
        let bytes = store.snapshot_bytes().unwrap();
        assert!(bytes.starts_with(b"SQLite format 3\0"));
    }

    #[test]
    fn replace_from_bytes_swaps_the_collection() {
        let (store, _dir) = test_store();
        store.add("Old", 1).unwrap();
        let snapshot = store.snapshot_bytes().unwrap();

        store.add("New", 2).unwrap();
        assert_eq!(store.list_all().unwrap().len(), 2);

        store.replace_from_bytes(&snapshot).unwrap();
        let names: Vec<String> = store
            .list_all()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Old"]);
    }

    #[test]
    fn replace_from_bytes_keeps_sequence_of_restored_file() {
        let (store, _dir) = test_store();
        store.add("A", 1).unwrap();
        store.add("B", 1).unwrap();
        let snapshot = store.snapshot_bytes().unwrap();

        store.replace_from_bytes(&snapshot).unwrap();
        let c = store.add("C", 1).unwrap();
        assert_eq!(c.id, 3);
        assert_eq!(c.sku, "PROD003");
    }

    #[test]
    fn replace_from_bytes_rejects_non_database_bytes() {
        let (store, _dir) = test_store();
        store.add("Widget", 1).unwrap();
        let before = store.list_all().unwrap();

        let err = store
            .replace_from_bytes(b"definitely not a database")
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::Database(_) | InventoryError::StorageUnavailable(_)
        ));
        assert_eq!(store.list_all().unwrap(), before, "local file untouched");
    }

    #[test]
    fn store_survives_restore_of_schemaless_file() {
        // A valid empty SQLite file without our table: schema init runs on
        // replace, so CRUD keeps working.
        let (store, dir) = test_store();
        store.add("Widget", 1).unwrap();

        let empty_db_path = dir.path().join("empty.db");
        let conn = Connection::open(&empty_db_path).unwrap();
        drop(conn);
        let empty_bytes = fs::read(&empty_db_path).unwrap();

        store.replace_from_bytes(&empty_bytes).unwrap();
        assert!(store.list_all().unwrap().is_empty());
        let p = store.add("Fresh", 1).unwrap();
        assert_eq!(p.id, 1);
    }
}
