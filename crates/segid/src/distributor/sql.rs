//! Statements shared by the SQLite-backed stores.

/// Creates the namespace counter table if it does not exist yet.
pub const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS segment_id (
    namespace     TEXT    NOT NULL PRIMARY KEY,
    max_id        INTEGER NOT NULL DEFAULT 0,
    step          INTEGER NOT NULL,
    safe_distance INTEGER NOT NULL DEFAULT 10,
    updated_at    INTEGER NOT NULL DEFAULT 0
)";

pub const INCREMENT_MAX_ID_SQL: &str =
    "UPDATE segment_id SET max_id = max_id + ?, updated_at = ? WHERE namespace = ?";

pub const FETCH_MAX_ID_SQL: &str = "SELECT max_id FROM segment_id WHERE namespace = ?";

pub const FETCH_DEFINITION_SQL: &str =
    "SELECT namespace, max_id, step, safe_distance FROM segment_id WHERE namespace = ?";

pub const INSERT_SEGMENT_SQL: &str =
    "INSERT INTO segment_id (namespace, max_id, step, safe_distance, updated_at) VALUES (?, ?, ?, ?, ?)";
