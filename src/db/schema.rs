pub const SCHEMA: &str = r#"
-- Faces table: one row per detected face, append-only
CREATE TABLE IF NOT EXISTS faces (
    face_id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id TEXT NOT NULL,

    -- Little-endian f32 vector
    embedding BLOB NOT NULL,
    embedding_dim INTEGER NOT NULL,

    -- Provenance
    image_hash TEXT NOT NULL,
    image_id TEXT NOT NULL,

    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Indexes for dedupe and per-group retrieval
CREATE INDEX IF NOT EXISTS idx_faces_image_hash ON faces(image_hash);
CREATE INDEX IF NOT EXISTS idx_faces_group ON faces(group_id);
"#;

/// Statements applied after SCHEMA; failures are ignored so they can be re-run.
pub const MIGRATIONS: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_faces_image_id ON faces(image_id)",
];
