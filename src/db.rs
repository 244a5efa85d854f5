use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use tracing::warn;

use crate::error::PersistenceError;
use crate::kv::{KeyValueStore, MemoryStore};

const APP_DIR: &str = "ridealert";
const DB_FILE_NAME: &str = "store.db";

/// SQLite-backed key-value store.
pub struct Database {
    conn: Connection,
}

/// Default database location under the user's data directory.
pub fn default_path() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine data directories")?;
    Ok(base.data_dir().join(APP_DIR).join(DB_FILE_NAME))
}

impl Database {
    /// Open the database at the default location
    pub fn open() -> Result<Self> {
        Self::open_at(&default_path()?)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create data directory {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        let mut db = Self { conn };
        db.setup()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.setup()?;
        Ok(db)
    }

    fn setup(&mut self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "FULL")?;

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
              key   TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );
        "#,
        )?;
        Ok(())
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| PersistenceError::Read {
                key: key.to_string(),
                message: err.to_string(),
            })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.multi_set(&[(key, value)])
    }

    fn multi_set(&self, entries: &[(&str, &str)]) -> Result<(), PersistenceError> {
        let write = || -> rusqlite::Result<()> {
            let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
            {
                let mut stmt = tx.prepare(
                    r#"INSERT INTO kv (key, value) VALUES (?1, ?2)
                       ON CONFLICT(key) DO UPDATE SET value = excluded.value"#,
                )?;
                for (key, value) in entries {
                    stmt.execute(params![key, value])?;
                }
            }
            tx.commit()
        };
        write().map_err(|err| PersistenceError::Write {
            key: entries
                .iter()
                .map(|(key, _)| *key)
                .collect::<Vec<_>>()
                .join(","),
            message: err.to_string(),
        })
    }
}

/// Storage for one run: the database, or process memory when it cannot be
/// opened. Reads and writes keep working either way; nothing in memory
/// outlives the process.
pub enum Store {
    Database(Database),
    Memory { reason: String, store: MemoryStore },
}

impl Store {
    /// Open the database at `path` (the default location when `None`).
    pub fn open(path: Option<&Path>) -> Self {
        let opened = match path {
            Some(path) => Database::open_at(path),
            None => Database::open(),
        };
        match opened {
            Ok(db) => Store::Database(db),
            Err(err) => {
                let reason = format!("{:#}", err);
                warn!(error = %reason, "database unavailable; changes will not be saved");
                Store::Memory {
                    reason,
                    store: MemoryStore::new(),
                }
            }
        }
    }

    /// Why the database could not be opened, if it could not.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            Store::Database(_) => None,
            Store::Memory { reason, .. } => Some(reason),
        }
    }
}

impl KeyValueStore for Store {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match self {
            Store::Database(db) => db.get(key),
            Store::Memory { store, .. } => store.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        match self {
            Store::Database(db) => db.set(key, value),
            Store::Memory { store, .. } => store.set(key, value),
        }
    }

    fn multi_set(&self, entries: &[(&str, &str)]) -> Result<(), PersistenceError> {
        match self {
            Store::Database(db) => db.multi_set(entries),
            Store::Memory { store, .. } => store.multi_set(entries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_missing_key_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get("driverName").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites() {
        let db = Database::open_in_memory().unwrap();
        db.set("selectedContacts", "[]").unwrap();
        db.set("selectedContacts", r#"[{"name":"A","phone":"1"}]"#)
            .unwrap();
        assert_eq!(
            db.get("selectedContacts").unwrap().as_deref(),
            Some(r#"[{"name":"A","phone":"1"}]"#)
        );
    }

    #[test]
    fn test_multi_set_writes_all_entries() {
        let db = Database::open_in_memory().unwrap();
        db.multi_set(&[
            ("driverName", "Asha"),
            ("driverVehicleNumber", "KA01AB1234"),
            ("driverContact", "9998887776"),
        ])
        .unwrap();
        assert_eq!(db.get("driverName").unwrap().as_deref(), Some("Asha"));
        assert_eq!(
            db.get("driverVehicleNumber").unwrap().as_deref(),
            Some("KA01AB1234")
        );
        assert_eq!(
            db.get("driverContact").unwrap().as_deref(),
            Some("9998887776")
        );
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.set("driverName", "Asha").unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.get("driverName").unwrap().as_deref(), Some("Asha"));
    }

    #[test]
    fn test_failed_write_names_the_keys() {
        let db = Database::open_in_memory().unwrap();
        db.conn.execute_batch("DROP TABLE kv").unwrap();
        let err = db
            .multi_set(&[("driverName", "Asha"), ("driverContact", "1")])
            .unwrap_err();
        match &err {
            PersistenceError::Write { key, .. } => assert_eq!(key, "driverName,driverContact"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("`driverName,driverContact`"));
    }

    #[test]
    fn test_store_falls_back_to_memory_when_path_is_blocked() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let store = Store::open(Some(blocker.join("store.db").as_path()));
        assert!(store.unavailable_reason().is_some());

        assert_eq!(store.get("selectedContacts").unwrap(), None);
        store.set("selectedContacts", "[]").unwrap();
        assert_eq!(store.get("selectedContacts").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_store_uses_database_when_it_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = Store::open(Some(path.as_path()));
            assert!(store.unavailable_reason().is_none());
            store.set("driverName", "Asha").unwrap();
        }
        let store = Store::open(Some(path.as_path()));
        assert_eq!(store.get("driverName").unwrap().as_deref(), Some("Asha"));
    }
}
