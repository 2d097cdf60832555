use std::sync::{Arc, Mutex, RwLock};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

/// Durable store for the bearer credential. The token lives in memory for
/// cheap per-request reads and is written through to sqlite so a restart
/// resumes the session. No local validation of the token shape is done;
/// only the backend decides whether it is still good.
#[derive(Clone)]
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
    token: Arc<RwLock<Option<String>>>,
}

impl SessionStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS session (
              id INTEGER PRIMARY KEY CHECK (id = 1),
              token TEXT NOT NULL,
              stored_at TEXT
            );
            "#,
        )?;

        let stored: Option<String> = conn
            .query_row("SELECT token FROM session WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            token: Arc::new(RwLock::new(stored)),
        })
    }

    pub fn get(&self) -> Option<String> {
        self.token.read().unwrap().clone()
    }

    pub fn set(&self, token: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.lock().unwrap().execute(
            "INSERT OR REPLACE INTO session (id, token, stored_at) VALUES (1, ?, ?)",
            params![token, now],
        )?;
        *self.token.write().unwrap() = Some(token.to_string());
        Ok(())
    }

    /// Removes the credential from memory and disk. Safe to call repeatedly.
    pub fn clear(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute("DELETE FROM session WHERE id = 1", [])?;
        *self.token.write().unwrap() = None;
        Ok(())
    }
}
