use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use crate::error::Result;

pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// SQLite store holding the agent cache and the sync-state table.
///
/// Both tables live in one file and are opened together. WAL mode keeps
/// readers unblocked while a sync pass is writing.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn new(database_url: &str) -> Result<Self> {
        let (manager, max_size) = if database_url == ":memory:" {
            // Every in-memory connection is a separate database, so keep one.
            (SqliteConnectionManager::memory(), 1)
        } else {
            // Create parent directory if it doesn't exist
            if let Some(parent) = Path::new(database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).ok();
                }
            }
            (SqliteConnectionManager::file(database_url), 8)
        };

        let manager = manager.with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
        });
        let pool = Pool::builder().max_size(max_size).build(manager)?;

        let db = Self { pool };
        db.init()?;
        Ok(db)
    }

    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS agents (
                agent_id INTEGER NOT NULL,
                chain_id INTEGER NOT NULL,
                wallet_address TEXT NOT NULL,
                source_uri TEXT NOT NULL DEFAULT '',
                name TEXT,
                description TEXT,
                capabilities TEXT NOT NULL DEFAULT '[]',
                messaging_address TEXT,
                http_endpoint TEXT,
                mcp_endpoint TEXT,
                a2a_endpoint TEXT,
                payment_address TEXT,
                reputation_score REAL NOT NULL DEFAULT 0,
                feedback_count INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT,
                indexed_at TEXT NOT NULL,
                PRIMARY KEY (chain_id, agent_id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_agents_score ON agents(reputation_score DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}
