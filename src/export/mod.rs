use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::assets::is_path_component;
use crate::db::{Database, NewFace};
use crate::error::PersistenceError;

/// Column headers of the face table, shared by export and legacy import.
pub const FACE_TABLE_HEADERS: [&str; 5] =
    ["Face ID", "Group ID", "Face Embedding", "Image Hash", "Image ID"];

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }
}

/// Face row for export
#[derive(Debug, Serialize)]
pub struct ExportedFace {
    #[serde(rename = "Face ID")]
    pub face_id: String,
    #[serde(rename = "Group ID")]
    pub group_id: String,
    #[serde(rename = "Face Embedding")]
    pub embedding: Vec<f32>,
    #[serde(rename = "Image Hash")]
    pub image_hash: String,
    #[serde(rename = "Image ID")]
    pub image_id: String,
}

/// Export the face table to a file; returns the number of rows written.
pub fn export_faces(
    db: &Database,
    output_path: &Path,
    format: ExportFormat,
) -> Result<usize, PersistenceError> {
    let faces: Vec<ExportedFace> = db
        .all_records()?
        .into_iter()
        .map(|record| ExportedFace {
            face_id: record.display_id(),
            group_id: record.group_id,
            embedding: record.embedding,
            image_hash: record.image_hash,
            image_id: record.image_id,
        })
        .collect();
    let count = faces.len();

    match format {
        ExportFormat::Json => export_json(&faces, output_path)?,
        ExportFormat::Csv => export_csv(&faces, output_path)?,
    }

    tracing::info!(path = %output_path.display(), rows = count, format = format.name(), "Exported faces");
    Ok(count)
}

fn export_json(faces: &[ExportedFace], output_path: &Path) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(faces).map_err(|e| PersistenceError::Export(e.to_string()))?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_csv(faces: &[ExportedFace], output_path: &Path) -> Result<(), PersistenceError> {
    let mut wtr = csv::Writer::from_path(output_path).map_err(csv_error)?;

    wtr.write_record(FACE_TABLE_HEADERS).map_err(csv_error)?;

    for face in faces {
        let embedding =
            serde_json::to_string(&face.embedding).map_err(|e| PersistenceError::Export(e.to_string()))?;
        wtr.write_record([
            face.face_id.as_str(),
            face.group_id.as_str(),
            embedding.as_str(),
            face.image_hash.as_str(),
            face.image_id.as_str(),
        ])
        .map_err(csv_error)?;
    }

    wtr.flush()?;
    Ok(())
}

fn csv_error(e: csv::Error) -> PersistenceError {
    PersistenceError::Export(e.to_string())
}

/// Outcome of a legacy table import
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    /// Rows whose image was already in the store before the import
    pub skipped_existing: usize,
    /// Rows with missing columns, unparsable embeddings, or group/image ids
    /// that are not a single path component
    pub skipped_invalid: usize,
}

/// Import a face table in the legacy CSV layout, appending rows in file order.
///
/// Stored face ids are reassigned. Images already present in the store are
/// skipped. All accepted rows are written in a single transaction.
pub fn import_legacy_csv(db: &Database, input_path: &Path) -> Result<ImportSummary, PersistenceError> {
    let mut rdr = csv::Reader::from_path(input_path).map_err(csv_error)?;
    let headers = rdr.headers().map_err(csv_error)?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| PersistenceError::Export(format!("missing column \"{}\"", name)))
    };
    let group_col = column("Group ID")?;
    let embedding_col = column("Face Embedding")?;
    let hash_col = column("Image Hash")?;
    let image_col = column("Image ID")?;

    let mut summary = ImportSummary::default();
    let mut known_hashes: HashSet<String> = HashSet::new();
    let mut faces = Vec::new();

    for (line, record) in rdr.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(row = line + 1, error = %e, "Skipping unreadable row");
                summary.skipped_invalid += 1;
                continue;
            }
        };

        let fields = (
            record.get(group_col),
            record.get(embedding_col),
            record.get(hash_col),
            record.get(image_col),
        );
        let (group_id, embedding, image_hash, image_id) = match fields {
            (Some(g), Some(e), Some(h), Some(i))
                if is_path_component(g) && is_path_component(i) && !h.is_empty() =>
            {
                (g, e, h, i)
            }
            _ => {
                tracing::warn!(row = line + 1, "Skipping row with missing or unusable ids");
                summary.skipped_invalid += 1;
                continue;
            }
        };

        let embedding = match parse_embedding(embedding) {
            Some(e) => e,
            None => {
                tracing::warn!(row = line + 1, "Skipping row with unparsable embedding");
                summary.skipped_invalid += 1;
                continue;
            }
        };

        if !known_hashes.contains(image_hash) && db.exists_by_hash(image_hash)? {
            summary.skipped_existing += 1;
            continue;
        }
        known_hashes.insert(image_hash.to_string());

        faces.push(NewFace {
            group_id: group_id.to_string(),
            embedding,
            image_hash: image_hash.to_string(),
            image_id: image_id.to_string(),
        });
    }

    summary.imported = db.append_all(&faces)?.len();
    tracing::info!(
        path = %input_path.display(),
        imported = summary.imported,
        skipped_existing = summary.skipped_existing,
        skipped_invalid = summary.skipped_invalid,
        "Imported legacy face table"
    );
    Ok(summary)
}

/// Parse an embedding cell such as `[0.12, -0.5, ...]`.
fn parse_embedding(cell: &str) -> Option<Vec<f32>> {
    let values: Vec<f32> = serde_json::from_str(cell.trim()).ok()?;
    (!values.is_empty() && values.iter().all(|v| v.is_finite())).then_some(values)
}
