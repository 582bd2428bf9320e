//! SQLite schema for the object store
//!
//! One row per key, value serialized as JSON text. The version lives in the
//! `object_store_meta` table; [`migrate`] brings a database up to
//! [`SCHEMA_VERSION`] step by step, each step in its own transaction.

use rusqlite::{Connection, OptionalExtension, Result};

/// Version the code expects
pub const SCHEMA_VERSION: u32 = 1;

/// Statements that move a database from version `index` to `index + 1`
const MIGRATIONS: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS objects (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );
"#];

/// Version stored in the database, 0 for a fresh one
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let has_meta = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'object_store_meta'")?
        .exists([])?;
    if !has_meta {
        return Ok(0);
    }

    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM object_store_meta WHERE name = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.and_then(|v| v.parse().ok()).unwrap_or(0))
}

/// Apply every missing migration; returns the number applied
pub fn migrate(conn: &mut Connection) -> Result<usize> {
    let current = schema_version(conn)? as usize;
    let pending = MIGRATIONS.iter().enumerate().skip(current);

    let mut applied = 0;
    for (index, statements) in pending {
        let tx = conn.transaction()?;
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS object_store_meta (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        tx.execute_batch(statements)?;
        tx.execute(
            "INSERT OR REPLACE INTO object_store_meta (name, value) VALUES ('schema_version', ?1)",
            [(index + 1).to_string()],
        )?;
        tx.commit()?;
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_is_migrated() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 0);

        assert_eq!(migrate(&mut conn).unwrap(), MIGRATIONS.len());
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);

        conn.execute(
            "INSERT INTO objects (key, value, updated_at) VALUES ('k', '1', 0)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_migrate_twice_keeps_rows() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO objects (key, value, updated_at) VALUES ('k', '1', 0)",
            [],
        )
        .unwrap();

        assert_eq!(migrate(&mut conn).unwrap(), 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM objects", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_code_and_migrations_agree() {
        assert_eq!(MIGRATIONS.len(), SCHEMA_VERSION as usize);
    }
}
