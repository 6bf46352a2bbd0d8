//! Face detection and embedding extraction.
//!
//! Detection models live outside this crate. An extractor only has to turn an
//! image into face regions with fixed-length embeddings.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::process::{Command, Stdio};

use crate::config::ExtractorConfig;
use crate::error::ExtractionError;

/// Bounding box for a detected face, in pixels of the image handed to the extractor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl BoundingBox {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// A detected face with bounding box and embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Vec<f32>,
}

/// Image -> faces capability.
pub trait FaceExtractor: Send + Sync {
    /// Faces in detection order; an empty list means no faces were found.
    fn extract(&self, image: &DynamicImage) -> Result<Vec<DetectedFace>, ExtractionError>;
}

/// Runs an external program: PNG on stdin, JSON array of [`DetectedFace`] on stdout.
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> Result<Self, ExtractionError> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or(ExtractionError::NotConfigured)?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }
}

impl FaceExtractor for CommandExtractor {
    fn extract(&self, image: &DynamicImage) -> Result<Vec<DetectedFace>, ExtractionError> {
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| ExtractionError::Encode(e.to_string()))?;
        let png = png.into_inner();

        tracing::debug!(program = %self.program, bytes = png.len(), "Running face extractor");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin off-thread; the child may fill stdout before it finishes reading.
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || {
                let result = stdin.write_all(&png);
                drop(stdin);
                result
            })
        });

        let output = child.wait_with_output()?;

        if let Some(handle) = writer {
            match handle.join() {
                Ok(Ok(())) => {}
                // The child is allowed to stop reading once it has what it needs.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(ExtractionError::Encode(
                        "extractor stdin writer panicked".to_string(),
                    ))
                }
            }
        }

        if !output.status.success() {
            return Err(ExtractionError::CommandFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_faces(&output.stdout)
    }
}

/// Stand-in used when no extractor command is configured; every call fails.
pub struct UnconfiguredExtractor;

impl FaceExtractor for UnconfiguredExtractor {
    fn extract(&self, _image: &DynamicImage) -> Result<Vec<DetectedFace>, ExtractionError> {
        Err(ExtractionError::NotConfigured)
    }
}

/// Parse extractor JSON output.
pub fn parse_faces(stdout: &[u8]) -> Result<Vec<DetectedFace>, ExtractionError> {
    let faces: Vec<DetectedFace> = serde_json::from_slice(stdout)?;
    Ok(faces)
}
