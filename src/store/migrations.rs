use super::schema;
use rusqlite::{types::Type, Connection};

pub const LATEST_SCHEMA_VERSION: u32 = 3;

const MIGRATIONS: &[(u32, &str)] = &[
    (1, schema::MIGRATION_V1_SQL),
    (2, schema::MIGRATION_V2_SQL),
    (3, schema::MIGRATION_V3_SQL),
];

pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Applies every migration newer than `PRAGMA user_version`, each in its own
/// transaction.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.commit()?;
        tracing::debug!(version, "applied cache migration");
        current = *version;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn object_exists(conn: &Connection, object_type: &str, name: &str) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2)",
            params![object_type, name],
            |row| row.get(0),
        )
    }

    #[test]
    fn test_migrate_empty_db_to_latest() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(current_schema_version(&conn)?, LATEST_SCHEMA_VERSION);

        for table in ["sprints", "issues", "work_logs", "users", "sync_log"] {
            assert!(object_exists(&conn, "table", table)?, "missing table {table}");
        }
        for index in schema::REQUIRED_INDEXES {
            assert!(object_exists(&conn, "index", index)?, "missing index {index}");
        }
        Ok(())
    }

    #[test]
    fn test_migrate_is_idempotent() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        Ok(())
    }

    #[test]
    fn test_migrate_from_v1_applies_the_rest() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::MIGRATION_V1_SQL)?;
        conn.pragma_update(None, "user_version", 1)?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert!(object_exists(&conn, "table", "sync_log")?);
        assert!(object_exists(&conn, "index", "idx_work_logs_author_day")?);
        Ok(())
    }

    #[test]
    fn test_v3_drops_work_logs_without_a_local_day() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::MIGRATION_V1_SQL)?;
        conn.execute_batch(schema::MIGRATION_V2_SQL)?;
        conn.pragma_update(None, "user_version", 2)?;
        conn.execute(
            "INSERT INTO issues (key, summary, issue_type, status, created, updated)
             VALUES ('PROJ-1', 's', 'Task', 'To Do', '2024-03-01', '2024-03-01')",
            [],
        )?;
        conn.execute(
            "INSERT INTO work_logs (id, issue_key, author, time_spent_seconds, started)
             VALUES ('1', 'PROJ-1', 'alice', 3600, '2024-03-04 09:00:00+00:00')",
            [],
        )?;

        assert_eq!(migrate(&mut conn)?, 3);
        let remaining: i64 = conn.query_row("SELECT COUNT(*) FROM work_logs", [], |row| row.get(0))?;
        assert_eq!(remaining, 0);
        Ok(())
    }
}
