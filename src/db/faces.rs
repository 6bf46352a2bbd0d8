//! Face rows: append, dedupe lookup, and per-group retrieval.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::Database;
use crate::error::PersistenceError;

/// A persisted face
#[derive(Debug, Clone, PartialEq)]
pub struct FaceRecord {
    pub face_id: i64,
    pub group_id: String,
    pub embedding: Vec<f32>,
    pub image_hash: String,
    pub image_id: String,
}

impl FaceRecord {
    /// Display form used by exports, e.g. `Face_12`.
    pub fn display_id(&self) -> String {
        format!("Face_{}", self.face_id)
    }
}

/// A face about to be appended; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewFace {
    pub group_id: String,
    pub embedding: Vec<f32>,
    pub image_hash: String,
    pub image_id: String,
}

impl Database {
    /// Whether any face from an upload with this content hash has been stored.
    pub fn exists_by_hash(&self, image_hash: &str) -> Result<bool, PersistenceError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM faces WHERE image_hash = ?)",
            [image_hash],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Append a single face.
    pub fn append(&self, face: &NewFace) -> Result<FaceRecord, PersistenceError> {
        let tx = self.conn.unchecked_transaction()?;
        let record = insert_face(&tx, face)?;
        tx.commit()?;
        Ok(record)
    }

    /// Append faces atomically, in order. Either all rows become visible or none do.
    pub fn append_all(&self, faces: &[NewFace]) -> Result<Vec<FaceRecord>, PersistenceError> {
        let tx = self.conn.unchecked_transaction()?;
        let records = faces
            .iter()
            .map(|face| insert_face(&tx, face))
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit()?;
        Ok(records)
    }

    /// The full face history in insertion order, as parallel embedding / group vectors.
    pub fn all_embeddings_and_groups(
        &self,
    ) -> Result<(Vec<Vec<f32>>, Vec<String>), PersistenceError> {
        let mut stmt = self
            .conn
            .prepare("SELECT embedding, group_id FROM faces ORDER BY face_id")?;

        let rows = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(0)?;
                Ok((bytes_to_embedding(&bytes), row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows.into_iter().unzip())
    }

    /// Image ids of a group, ordered by their first face's insertion; each image appears once.
    pub fn images_for_group(&self, group_id: &str) -> Result<Vec<String>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT image_id, MIN(face_id) AS first_face
            FROM faces
            WHERE group_id = ?
            GROUP BY image_id
            ORDER BY first_face
            "#,
        )?;

        let image_ids = stmt
            .query_map([group_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(image_ids)
    }

    /// Every group id, in the order the groups were created.
    pub fn group_ids(&self) -> Result<Vec<String>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT group_id, MIN(face_id) AS first_face
            FROM faces
            GROUP BY group_id
            ORDER BY first_face
            "#,
        )?;

        let groups = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(groups)
    }

    pub fn group_exists(&self, group_id: &str) -> Result<bool, PersistenceError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM faces WHERE group_id = ? LIMIT 1",
                [group_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn face_count(&self) -> Result<i64, PersistenceError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM faces", [], |row| row.get(0))?;
        Ok(count)
    }

    /// All rows in insertion order
    pub fn all_records(&self) -> Result<Vec<FaceRecord>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT face_id, group_id, embedding, image_hash, image_id
            FROM faces
            ORDER BY face_id
            "#,
        )?;

        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

fn insert_face(conn: &Connection, face: &NewFace) -> rusqlite::Result<FaceRecord> {
    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO faces (group_id, embedding, embedding_dim, image_hash, image_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )?;
    stmt.execute(params![
        face.group_id,
        embedding_to_bytes(&face.embedding),
        face.embedding.len() as i64,
        face.image_hash,
        face.image_id,
    ])?;

    Ok(FaceRecord {
        face_id: conn.last_insert_rowid(),
        group_id: face.group_id.clone(),
        embedding: face.embedding.clone(),
        image_hash: face.image_hash.clone(),
        image_id: face.image_id.clone(),
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FaceRecord> {
    let bytes: Vec<u8> = row.get(2)?;
    Ok(FaceRecord {
        face_id: row.get(0)?,
        group_id: row.get(1)?,
        embedding: bytes_to_embedding(&bytes),
        image_hash: row.get(3)?,
        image_id: row.get(4)?,
    })
}

/// Convert f32 vector to bytes for storage
pub(crate) fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to f32 vector
pub(crate) fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
