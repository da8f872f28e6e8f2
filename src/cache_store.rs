use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::debug;

use crate::error::CacheError;

const APP_CACHE_DIR: &str = "moneyline_backtest";

/// Key-value store for shaped records. Entries are write-once from the caller's side:
/// nothing here expires or invalidates a key.
pub trait CacheStore {
    fn init(&self) -> Result<(), CacheError>;
    fn get(&self, key: &str) -> Option<Value>;
    fn put(&self, key: &str, value: &Value) -> Result<(), CacheError>;
}

/// One `{key}.json` file per entry.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl CacheStore for JsonDirStore {
    fn init(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)
            .map_err(|err| CacheError::Init(format!("{}: {err}", self.dir.display())))
    }

    fn get(&self, key: &str) -> Option<Value> {
        let raw = fs::read_to_string(self.entry_path(key)).ok()?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(key, %err, "ignoring unparsable cache file");
                None
            }
        }
    }

    fn put(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        let persist_err = |reason: String| CacheError::Persist {
            key: key.to_string(),
            reason,
        };
        let path = self.entry_path(key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(value).map_err(|e| persist_err(e.to_string()))?;
        fs::write(&tmp, json).map_err(|e| persist_err(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| persist_err(e.to_string()))?;
        Ok(())
    }
}

/// Single-table SQLite store. A put on an existing key replaces its value.
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: Mutex::new(None),
        }
    }

    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(|e| CacheError::Init(e.to_string()))?;
        init_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(Some(conn)),
        })
    }
}

fn init_schema(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            stored_at TEXT NOT NULL
        );
        "#,
    )
    .map_err(|e| CacheError::Init(e.to_string()))
}

impl CacheStore for SqliteStore {
    fn init(&self) -> Result<(), CacheError> {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| CacheError::Init(format!("{}: {err}", parent.display())))?;
        }
        let conn = Connection::open(&self.path)
            .map_err(|e| CacheError::Init(format!("{}: {e}", self.path.display())))?;
        init_schema(&conn)?;
        *guard = Some(conn);
        Ok(())
    }

    fn get(&self, key: &str) -> Option<Value> {
        let guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let conn = guard.as_ref()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM records WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .ok()
            .flatten();
        serde_json::from_str(&raw?).ok()
    }

    fn put(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        let guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let Some(conn) = guard.as_ref() else {
            return Err(CacheError::Persist {
                key: key.to_string(),
                reason: "store not initialized".to_string(),
            });
        };
        conn.execute(
            "INSERT INTO records (key, value, stored_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, stored_at = excluded.stored_at",
            params![key, value.to_string(), Utc::now().to_rfc3339()],
        )
        .map_err(|e| CacheError::Persist {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryStore {
    fn init(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// Always misses; writes are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledStore;

impl CacheStore for DisabledStore {
    fn init(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    fn put(&self, _key: &str, _value: &Value) -> Result<(), CacheError> {
        Ok(())
    }
}

impl<S: CacheStore + ?Sized> CacheStore for Box<S> {
    fn init(&self) -> Result<(), CacheError> {
        (**self).init()
    }

    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        (**self).put(key, value)
    }
}

pub fn default_cache_dir() -> PathBuf {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return PathBuf::from(base).join(APP_CACHE_DIR);
    }
    match std::env::var("HOME") {
        Ok(home) if !home.trim().is_empty() => {
            PathBuf::from(home).join(".cache").join(APP_CACHE_DIR)
        }
        _ => PathBuf::from("cache"),
    }
}
