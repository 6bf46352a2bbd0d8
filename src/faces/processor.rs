use serde::Serialize;
use std::path::PathBuf;

use super::clustering::{Assignment, Clusterer, Population};
use super::detector::FaceExtractor;
use crate::assets::AssetStore;
use crate::config::UploadConfig;
use crate::db::{Database, NewFace};
use crate::error::{FacereelError, FacereelResult, ValidationError};
use crate::ingest;

/// Where one face of an upload ended up
#[derive(Debug, Clone, Serialize)]
pub struct FaceAssignment {
    pub face_id: i64,
    pub group_id: String,
    pub new_group: bool,
}

/// Result of a successful upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub image_id: String,
    pub content_hash: String,
    pub faces: Vec<FaceAssignment>,
    /// One saved copy per distinct group the faces landed in
    pub assets: Vec<PathBuf>,
}

/// Runs the upload pipeline: validate, dedupe, extract, cluster, save, append.
///
/// Callers must hold exclusive access to the database for the whole call; the
/// clustering decision reads the full history and is only valid until the next append.
pub struct FaceProcessor {
    extractor: Box<dyn FaceExtractor>,
    clusterer: Clusterer,
    upload: UploadConfig,
}

impl FaceProcessor {
    pub fn new(extractor: Box<dyn FaceExtractor>, clusterer: Clusterer, upload: UploadConfig) -> Self {
        Self {
            extractor,
            clusterer,
            upload,
        }
    }

    pub fn upload_config(&self) -> &UploadConfig {
        &self.upload
    }

    /// Process one uploaded image.
    pub fn process_upload(
        &self,
        db: &Database,
        assets: &AssetStore,
        bytes: &[u8],
    ) -> FacereelResult<UploadOutcome> {
        let prepared = ingest::prepare(bytes, &self.upload)?;

        if db.exists_by_hash(&prepared.content_hash)? {
            return Err(ValidationError::DuplicateImage {
                hash: prepared.content_hash,
            }
            .into());
        }

        let image = ingest::resize_to_fit(prepared.image, self.upload.max_dimension);
        let detected = self.extractor.extract(&image)?;
        if detected.is_empty() {
            return Err(FacereelError::NoFaceDetected);
        }

        let image_id = uuid::Uuid::new_v4().to_string();
        let (embeddings, group_ids) = db.all_embeddings_and_groups()?;
        let mut population = Population::new(embeddings, group_ids);

        let mut new_faces = Vec::with_capacity(detected.len());
        let mut assignments = Vec::with_capacity(detected.len());
        for face in &detected {
            let assignment = population.assign(&self.clusterer, &face.embedding);
            match &assignment {
                Assignment::Existing { group_id, distance } => {
                    tracing::debug!(group_id = %group_id, distance, "Face joined existing group");
                }
                Assignment::New { group_id } => {
                    tracing::debug!(group_id = %group_id, "Face started new group");
                }
            }

            new_faces.push(NewFace {
                group_id: assignment.group_id().to_string(),
                embedding: face.embedding.clone(),
                image_hash: prepared.content_hash.clone(),
                image_id: image_id.clone(),
            });
            assignments.push(assignment);
        }

        let mut target_groups: Vec<&str> = Vec::new();
        for assignment in &assignments {
            if !target_groups.contains(&assignment.group_id()) {
                target_groups.push(assignment.group_id());
            }
        }

        let mut saved: Vec<(&str, PathBuf)> = Vec::with_capacity(target_groups.len());
        for group_id in target_groups {
            match assets.save(&image, group_id, &image_id) {
                Ok(path) => saved.push((group_id, path)),
                Err(e) => {
                    rollback_assets(assets, &saved, &image_id);
                    return Err(e.into());
                }
            }
        }

        let records = match db.append_all(&new_faces) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(image_id = %image_id, error = %e, "Failed to persist faces, removing saved assets");
                rollback_assets(assets, &saved, &image_id);
                return Err(e.into());
            }
        };

        let faces = records
            .iter()
            .zip(assignments.iter())
            .map(|(record, assignment)| FaceAssignment {
                face_id: record.face_id,
                group_id: record.group_id.clone(),
                new_group: assignment.is_new(),
            })
            .collect();

        tracing::info!(
            image_id = %image_id,
            faces = records.len(),
            groups = saved.len(),
            "Upload processed"
        );

        Ok(UploadOutcome {
            image_id,
            content_hash: prepared.content_hash,
            faces,
            assets: saved.into_iter().map(|(_, path)| path).collect(),
        })
    }
}

fn rollback_assets(assets: &AssetStore, saved: &[(&str, PathBuf)], image_id: &str) {
    for (group_id, _) in saved {
        if let Err(e) = assets.remove(group_id, image_id) {
            tracing::warn!(group_id = %group_id, error = %e, "Failed to remove asset during rollback");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use crate::faces::detector::{BoundingBox, DetectedFace};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// Returns canned faces keyed by the top-left pixel's red channel.
    #[derive(Default)]
    pub(crate) struct StubExtractor {
        faces: Mutex<HashMap<u8, Vec<Vec<f32>>>>,
        panic_on: Option<u8>,
    }

    impl StubExtractor {
        pub(crate) fn with(mut self, marker: u8, embeddings: Vec<Vec<f32>>) -> Self {
            self.faces.get_mut().unwrap().insert(marker, embeddings);
            self
        }

        /// Panic mid-upload for `marker`, while the caller holds the store.
        pub(crate) fn panicking(mut self, marker: u8) -> Self {
            self.panic_on = Some(marker);
            self
        }
    }

    impl FaceExtractor for StubExtractor {
        fn extract(&self, image: &DynamicImage) -> Result<Vec<DetectedFace>, ExtractionError> {
            let marker = image.to_rgb8().get_pixel(0, 0)[0];
            if self.panic_on == Some(marker) {
                panic!("extractor crashed on marker {}", marker);
            }
            let faces = self.faces.lock().unwrap();
            Ok(faces
                .get(&marker)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|embedding| DetectedFace {
                    bbox: BoundingBox {
                        top: 0,
                        right: 1,
                        bottom: 1,
                        left: 0,
                    },
                    embedding,
                })
                .collect())
        }
    }

    /// PNG whose top-left red channel is `marker`.
    pub(crate) fn marked_png(marker: u8) -> Vec<u8> {
        let mut img = RgbImage::from_pixel(16, 12, Rgb([90, 90, 90]));
        img.put_pixel(0, 0, Rgb([marker, 0, 0]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    /// Records the dimensions of every image it is asked about.
    #[derive(Default)]
    struct SizeRecorder {
        seen: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    impl FaceExtractor for SizeRecorder {
        fn extract(&self, image: &DynamicImage) -> Result<Vec<DetectedFace>, ExtractionError> {
            self.seen.lock().unwrap().push((image.width(), image.height()));
            Ok(vec![DetectedFace {
                bbox: BoundingBox {
                    top: 0,
                    right: 1,
                    bottom: 1,
                    left: 0,
                },
                embedding: vec![0.0, 0.0],
            }])
        }
    }

    fn setup(extractor: StubExtractor) -> (tempfile::TempDir, Database, AssetStore, FaceProcessor) {
        setup_with(Box::new(extractor), UploadConfig::default())
    }

    fn setup_with(
        extractor: Box<dyn FaceExtractor>,
        upload: UploadConfig,
    ) -> (tempfile::TempDir, Database, AssetStore, FaceProcessor) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("faces.db")).unwrap();
        db.initialize().unwrap();
        let assets = AssetStore::with_root(dir.path().join("grouped_faces"));
        let processor = FaceProcessor::new(extractor, Clusterer::default(), upload);
        (dir, db, assets, processor)
    }

    #[test]
    fn test_upload_scenario_with_duplicate() {
        let extractor = StubExtractor::default()
            .with(1, vec![vec![0.0, 0.0]])
            .with(2, vec![vec![0.2, 0.0]]);
        let (_dir, db, assets, processor) = setup(extractor);

        let a = processor.process_upload(&db, &assets, &marked_png(1)).unwrap();
        assert_eq!(a.faces.len(), 1);
        assert_eq!(a.faces[0].group_id, "Group_1");
        assert!(a.faces[0].new_group);
        assert!(assets.exists("Group_1", &a.image_id));

        let b = processor.process_upload(&db, &assets, &marked_png(2)).unwrap();
        assert_eq!(b.faces[0].group_id, "Group_1");
        assert!(!b.faces[0].new_group);

        let again = processor.process_upload(&db, &assets, &marked_png(1));
        match again {
            Err(e) => assert_eq!(e.code(), "duplicate-image"),
            Ok(_) => panic!("duplicate upload accepted"),
        }
        assert_eq!(db.face_count().unwrap(), 2);
        assert_eq!(db.images_for_group("Group_1").unwrap(), vec![a.image_id, b.image_id]);
    }

    #[test]
    fn test_downscale_happens_after_duplicate_check() {
        let recorder = SizeRecorder::default();
        let seen = recorder.seen.clone();
        let upload = UploadConfig {
            max_dimension: 8,
            ..UploadConfig::default()
        };
        let (_dir, db, assets, processor) = setup_with(Box::new(recorder), upload);

        let outcome = processor.process_upload(&db, &assets, &marked_png(1)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(8, 6)]);
        let stored = image::open(&outcome.assets[0]).unwrap();
        assert_eq!((stored.width(), stored.height()), (8, 6));
        assert_eq!(
            outcome.content_hash,
            ingest::prepare(&marked_png(1), &UploadConfig::default())
                .unwrap()
                .content_hash
        );

        let err = processor
            .process_upload(&db, &assets, &marked_png(1))
            .unwrap_err();
        assert_eq!(err.code(), "duplicate-image");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_no_faces_leaves_store_untouched() {
        let (_dir, db, assets, processor) = setup(StubExtractor::default());

        let err = processor
            .process_upload(&db, &assets, &marked_png(9))
            .unwrap_err();
        assert_eq!(err.code(), "no-faces-detected");
        assert_eq!(db.face_count().unwrap(), 0);
        assert!(!assets.root().exists());
    }

    #[test]
    fn test_multi_face_photo_saved_once_per_group() {
        let extractor = StubExtractor::default()
            .with(1, vec![vec![0.0, 0.0]])
            .with(2, vec![vec![0.1, 0.0], vec![5.0, 5.0], vec![0.05, 0.0]]);
        let (_dir, db, assets, processor) = setup(extractor);

        processor.process_upload(&db, &assets, &marked_png(1)).unwrap();
        let outcome = processor.process_upload(&db, &assets, &marked_png(2)).unwrap();

        let groups: Vec<&str> = outcome.faces.iter().map(|f| f.group_id.as_str()).collect();
        assert_eq!(groups, vec!["Group_1", "Group_2", "Group_1"]);
        assert_eq!(outcome.assets.len(), 2);
        assert!(assets.exists("Group_1", &outcome.image_id));
        assert!(assets.exists("Group_2", &outcome.image_id));
        assert_eq!(db.images_for_group("Group_1").unwrap().len(), 2);
    }

    #[test]
    fn test_unmatched_faces_in_one_photo_get_distinct_groups() {
        let extractor =
            StubExtractor::default().with(3, vec![vec![0.0, 0.0], vec![3.0, 0.0]]);
        let (_dir, db, assets, processor) = setup(extractor);

        let outcome = processor.process_upload(&db, &assets, &marked_png(3)).unwrap();
        assert_eq!(outcome.faces[0].group_id, "Group_1");
        assert_eq!(outcome.faces[1].group_id, "Group_2");
    }

    #[test]
    fn test_failed_append_removes_assets() {
        let extractor = StubExtractor::default().with(4, vec![vec![0.0, 0.0]]);
        let (_dir, db, assets, processor) = setup(extractor);

        db.conn
            .execute_batch(
                "CREATE TRIGGER reject_all BEFORE INSERT ON faces
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let err = processor
            .process_upload(&db, &assets, &marked_png(4))
            .unwrap_err();
        assert_eq!(err.code(), "persistence-error");
        assert_eq!(db.face_count().unwrap(), 0);

        let leftover = std::fs::read_dir(assets.root().join("Group_1"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftover, 0);
    }
}
