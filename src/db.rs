use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use tracing::info;

use crate::errors::{AppError, AppResult};

pub struct DatabaseContext {
    pub connection: Connection,
    pub path: PathBuf,
}

pub fn bootstrap<P: AsRef<Path>>(data_dir: P, database_file: &str) -> AppResult<DatabaseContext> {
    let data_dir = data_dir.as_ref();
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join(database_file);

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(&db_path, flags)?;
    configure(&connection)?;
    run_migrations(&connection)?;

    info!(
        target: "database_bootstrap",
        path = %db_path.display(),
        "key-value store ready"
    );
    Ok(DatabaseContext {
        connection,
        path: db_path,
    })
}

pub fn bootstrap_in_memory() -> AppResult<Connection> {
    let connection = Connection::open_in_memory()?;
    run_migrations(&connection)?;
    Ok(connection)
}

fn configure(connection: &Connection) -> AppResult<()> {
    // journal_mode returns a row, so it cannot go through execute().
    let mode: String = connection
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .map_err(AppError::from)?;
    if !mode.eq_ignore_ascii_case("wal") {
        info!(target: "database_bootstrap", mode, "WAL unavailable; using default journal");
    }
    connection.execute_batch("PRAGMA busy_timeout = 5000;")?;
    Ok(())
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            expires_at INTEGER,
            updated_at TEXT NOT NULL DEFAULT (DATETIME('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_kv_entries_expires_at ON kv_entries(expires_at);
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn runs_migrations_and_creates_tables() {
        let dir = tempdir().unwrap();
        let ctx = bootstrap(dir.path(), "test.db").unwrap();

        let tables: i64 = ctx
            .connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = 'kv_entries'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
        assert!(ctx.path.ends_with("test.db"));
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        drop(bootstrap(dir.path(), "twice.db").unwrap());
        let ctx = bootstrap(dir.path(), "twice.db").unwrap();
        assert!(ctx.path.exists());
    }
}
