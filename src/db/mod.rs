pub mod models;

use crate::assets::{BlobStore, StoreError, StoredBlob};
use models::AssetRecord;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

pub struct Database {
    pub conn: Mutex<Connection>,
}

impl Database {
    pub fn new(app_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(app_dir).ok();
        let db_path = app_dir.join("amaraste.db");
        let conn = Connection::open(db_path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Private database for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS pdf_assets (
                key TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                data BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Assets ──

    pub fn put_asset(&self, key: &str, filename: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        // INSERT OR REPLACE rewrites the whole row, so created_at tracks the
        // last write.
        conn.execute(
            "INSERT OR REPLACE INTO pdf_assets (key, filename, data) VALUES (?1, ?2, ?3)",
            params![key, filename, bytes],
        )?;
        Ok(())
    }

    pub fn get_asset(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT filename, data FROM pdf_assets WHERE key = ?1",
            params![key],
            |row| {
                Ok(StoredBlob {
                    filename: row.get(0)?,
                    bytes: row.get(1)?,
                })
            },
        );
        match result {
            Ok(blob) => Ok(Some(blob)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete_asset(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM pdf_assets WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn list_assets(&self) -> Result<Vec<AssetRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT key, filename, LENGTH(data), created_at FROM pdf_assets ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AssetRecord {
                key: row.get(0)?,
                filename: row.get(1)?,
                size: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Settings ──

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );
        match result {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl BlobStore for Database {
    fn get_blob(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        self.get_asset(key)
    }

    fn put_blob(&self, key: &str, filename: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.put_asset(key, filename, bytes)
    }

    fn delete_blob(&self, key: &str) -> Result<(), StoreError> {
        self.delete_asset(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_roundtrip_last_write_wins() {
        let db = Database::open_in_memory().unwrap();
        db.put_asset("pdf", "first.pdf", b"one").unwrap();
        db.put_asset("pdf", "second.pdf", b"two").unwrap();

        let blob = db.get_asset("pdf").unwrap().unwrap();
        assert_eq!(blob.filename, "second.pdf");
        assert_eq!(blob.bytes, b"two");

        let records = db.list_assets().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "pdf");
        assert_eq!(records[0].size, 3);
    }

    #[test]
    fn missing_asset_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_asset("pdf").unwrap().is_none());
        db.delete_asset("pdf").unwrap(); // idempotent
    }

    #[test]
    fn settings_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_setting("chat_model").unwrap().is_none());
        db.set_setting("chat_model", "gemini-2.5-flash").unwrap();
        assert_eq!(
            db.get_setting("chat_model").unwrap().as_deref(),
            Some("gemini-2.5-flash")
        );
        db.set_setting("chat_model", "gemini-2.5-pro").unwrap();
        assert_eq!(
            db.get_setting("chat_model").unwrap().as_deref(),
            Some("gemini-2.5-pro")
        );
        db.delete_setting("chat_model").unwrap();
        assert!(db.get_setting("chat_model").unwrap().is_none());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::new(dir.path()).unwrap();
            db.put_asset("booker", "booker-page.pdf", b"%PDF-1.4").unwrap();
        }
        let db = Database::new(dir.path()).unwrap();
        let blob = db.get_asset("booker").unwrap().unwrap();
        assert_eq!(blob.bytes, b"%PDF-1.4");
    }
}
