use rusqlite::Connection;

pub const UPLOAD_RECORDS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS upload_records (
    identity TEXT PRIMARY KEY,
    count INTEGER NOT NULL CHECK (count >= 0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

pub const UPLOAD_EVENTS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS upload_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity TEXT NOT NULL REFERENCES upload_records(identity),
    timestamp TEXT NOT NULL,
    file_name TEXT NOT NULL,
    file_id TEXT
);
"#;

pub const UPLOAD_EVENTS_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_events_identity ON upload_events(identity, id);
"#;

pub fn init_database(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UPLOAD_RECORDS_TABLE_SCHEMA)?;
    conn.execute_batch(UPLOAD_EVENTS_TABLE_SCHEMA)?;
    conn.execute_batch(UPLOAD_EVENTS_INDEXES)?;
    Ok(())
}
