use rusqlite::Connection;

/// Click buckets: one row per (banner, minute). Timestamps are epoch milliseconds.
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS banner_clicks (
        banner_id     INTEGER NOT NULL,
        click_time    INTEGER NOT NULL,
        minute_bucket INTEGER NOT NULL,
        clicks        INTEGER NOT NULL DEFAULT 1,
        CONSTRAINT banner_clicks_unique UNIQUE (banner_id, minute_bucket)
    );

    CREATE INDEX IF NOT EXISTS idx_banner_clicks_minute
        ON banner_clicks(banner_id, minute_bucket);
";

/// Create the bucket table and its index if absent. Safe to run on every start.
pub fn provision(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)?;
    tracing::info!(table = "banner_clicks", "schema provisioned");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    #[test]
    fn test_provision_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        provision(&conn).unwrap();
        provision(&conn).unwrap();

        let indexes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_banner_clicks_minute'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(indexes, 1);
    }

    #[test]
    fn test_unique_constraint_rejects_plain_duplicate() {
        let conn = Connection::open_in_memory().unwrap();
        provision(&conn).unwrap();

        conn.execute(
            "INSERT INTO banner_clicks (banner_id, click_time, minute_bucket) VALUES (?1, ?2, ?3)",
            params![5, 1_000, 0],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO banner_clicks (banner_id, click_time, minute_bucket) VALUES (?1, ?2, ?3)",
            params![5, 2_000, 0],
        );
        assert!(dup.is_err(), "second row for the same minute must be rejected");
    }

    #[test]
    fn test_clicks_default_to_one() {
        let conn = Connection::open_in_memory().unwrap();
        provision(&conn).unwrap();

        conn.execute(
            "INSERT INTO banner_clicks (banner_id, click_time, minute_bucket) VALUES (1, 0, 0)",
            [],
        )
        .unwrap();
        let clicks: i64 = conn
            .query_row("SELECT clicks FROM banner_clicks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(clicks, 1);
    }
}
