//! `MemoryService`: the entry point callers use for uploads, group listing and video creation.
//!
//! The identity store sits behind a single mutex. An upload holds it from the
//! duplicate check to the final append, so concurrent uploads can never both
//! mint the same new group. Rendering only holds it while reading the group's
//! image ids.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::assets::AssetStore;
use crate::config::{Config, VideoConfig};
use crate::db::Database;
use crate::error::{AssetNotFoundError, FacereelResult, RenderError, ValidationError};
use crate::export::{self, ExportFormat, ImportSummary};
use crate::faces::detector::{CommandExtractor, FaceExtractor, UnconfiguredExtractor};
use crate::faces::{Clusterer, FaceProcessor, UploadOutcome};
use crate::ingest::discover_images;
use crate::video::{
    build_timeline, list_videos, AnimationKind, Canvas, Encoder, FfmpegEncoder, RenderPipeline,
    RenderedFile, VideoJob,
};

/// A group and the asset paths of its images, in upload order.
#[derive(Debug, Clone, Serialize)]
pub struct GroupImages {
    pub group_id: String,
    pub images: Vec<PathBuf>,
}

/// Per-file result of a directory upload.
#[derive(Debug)]
pub struct BatchEntry {
    pub path: PathBuf,
    pub result: FacereelResult<UploadOutcome>,
}

pub struct MemoryService {
    db: Mutex<Database>,
    assets: AssetStore,
    processor: FaceProcessor,
    pipeline: RenderPipeline,
    video: VideoConfig,
    music_track: PathBuf,
}

impl MemoryService {
    pub fn new(
        config: &Config,
        db: Database,
        extractor: Box<dyn FaceExtractor>,
        encoder: Box<dyn Encoder>,
    ) -> Self {
        let processor = FaceProcessor::new(
            extractor,
            Clusterer::new(config.clustering.distance_threshold),
            config.upload.clone(),
        );
        Self {
            db: Mutex::new(db),
            assets: AssetStore::new(&config.assets),
            processor,
            pipeline: RenderPipeline::new(encoder),
            video: config.video.clone(),
            music_track: config.music.track_path(),
        }
    }

    /// Open the configured store and wire up the external extractor and ffmpeg.
    pub fn open(config: &Config) -> FacereelResult<Self> {
        let db = Database::open(&config.db_path)?;
        db.initialize()?;

        let extractor: Box<dyn FaceExtractor> = match CommandExtractor::from_config(&config.extractor) {
            Ok(extractor) => Box::new(extractor),
            Err(_) => {
                tracing::warn!("No extractor command configured; uploads will be rejected");
                Box::new(UnconfiguredExtractor)
            }
        };
        let encoder = Box::new(FfmpegEncoder::new(config.video.clone()));

        Ok(Self::new(config, db, extractor, encoder))
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        // Writes are transactional; a poisoned lock still guards a consistent store.
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Process one uploaded image.
    pub fn upload(&self, bytes: &[u8]) -> FacereelResult<UploadOutcome> {
        let db = self.db();
        let result = self.processor.process_upload(&db, &self.assets, bytes);
        drop(db);

        if let Err(e) = &result {
            tracing::warn!(code = e.code(), error = %e, "Upload rejected");
        }
        result
    }

    pub fn upload_file(&self, path: &Path) -> FacereelResult<UploadOutcome> {
        let bytes = std::fs::read(path)
            .map_err(|e| ValidationError::InvalidImage(format!("{}: {}", path.display(), e)))?;
        self.upload(&bytes)
    }

    /// Upload every image under `dir`. One file failing does not stop the rest.
    pub fn upload_dir(&self, dir: &Path) -> Vec<BatchEntry> {
        let files = discover_images(dir, &self.processor.upload_config().image_extensions);
        tracing::info!(dir = ?dir, files = files.len(), "Uploading directory");

        files
            .into_iter()
            .map(|path| {
                let result = self.upload_file(&path);
                BatchEntry { path, result }
            })
            .collect()
    }

    /// Every group in creation order with its existing image files.
    pub fn list_groups(&self) -> FacereelResult<Vec<GroupImages>> {
        let listing = {
            let db = self.db();
            let mut listing = Vec::new();
            for group_id in db.group_ids()? {
                let image_ids = db.images_for_group(&group_id)?;
                listing.push((group_id, image_ids));
            }
            listing
        };

        Ok(listing
            .into_iter()
            .map(|(group_id, image_ids)| GroupImages {
                images: self.assets.list_images(&group_id, &image_ids),
                group_id,
            })
            .collect())
    }

    /// Render a memory video for a group to a fresh output path.
    pub fn create_video(&self, group_id: &str, kind: AnimationKind) -> FacereelResult<RenderedFile> {
        if group_id.trim().is_empty() {
            return Err(ValidationError::MissingGroupId.into());
        }
        let job = VideoJob::new(group_id, kind, &self.video.output_dir, &self.video.extension);
        self.render_job(&job)
    }

    /// Render a resolved job. A file already at the job's output path is returned as-is.
    pub fn render_job(&self, job: &VideoJob) -> FacereelResult<RenderedFile> {
        if let Some(existing) = RenderPipeline::reuse_existing(&job.output_path) {
            return Ok(existing);
        }

        let image_ids = {
            let db = self.db();
            if !db.group_exists(&job.group_id)? {
                tracing::warn!(group_id = %job.group_id, "Video requested for unknown group");
                return Err(AssetNotFoundError::GroupNotFound(job.group_id.clone()).into());
            }
            db.images_for_group(&job.group_id)?
        };

        let images = self.assets.list_images(&job.group_id, &image_ids);
        if images.is_empty() {
            tracing::warn!(group_id = %job.group_id, "No images on disk for group");
            return Err(AssetNotFoundError::NoImagesForGroup(job.group_id.clone()).into());
        }

        let canvas = Canvas {
            width: self.video.width,
            height: self.video.height,
        };
        let timeline = build_timeline(&images, job.kind, canvas);
        let music = self.music_track.as_path();

        let rendered = self.pipeline.render(&timeline, Some(music), &job.output_path)?;
        tracing::info!(
            group_id = %job.group_id,
            path = %rendered.path.display(),
            images = images.len(),
            "Memory video ready"
        );
        Ok(rendered)
    }

    /// [`create_video`](Self::create_video) on the blocking thread pool.
    pub async fn create_video_blocking_task(
        self: Arc<Self>,
        group_id: String,
        kind: AnimationKind,
    ) -> FacereelResult<RenderedFile> {
        tokio::task::spawn_blocking(move || self.create_video(&group_id, kind))
            .await
            .map_err(|e| RenderError::Aborted(e.to_string()))?
    }

    pub fn list_videos(&self) -> FacereelResult<Vec<String>> {
        let names = list_videos(&self.video.output_dir, &self.video.extension)
            .map_err(crate::error::PersistenceError::from)?;
        Ok(names)
    }

    pub fn video_dir(&self) -> &Path {
        &self.video.output_dir
    }

    pub fn export(&self, path: &Path, format: ExportFormat) -> FacereelResult<usize> {
        let db = self.db();
        Ok(export::export_faces(&db, path, format)?)
    }

    pub fn import_legacy_csv(&self, path: &Path) -> FacereelResult<ImportSummary> {
        let db = self.db();
        Ok(export::import_legacy_csv(&db, path)?)
    }
}
