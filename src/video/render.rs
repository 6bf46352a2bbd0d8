//! Render pipeline: audio reconciliation, encoding and idempotent output.

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::command::{probe_duration, FfmpegCommand};
use super::filters::{build_filter_graph, VIDEO_OUTPUT_LABEL};
use super::timeline::Timeline;
use crate::config::VideoConfig;
use crate::error::RenderError;

/// How a background track is fitted to the video length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AudioPlan {
    /// Track is at least as long as the video; cut it at `to` seconds.
    Truncate { to: f64 },
    /// Track is shorter; play it `repeats` times back to back, then cut at `to`.
    Loop { repeats: u32, to: f64 },
}

impl AudioPlan {
    /// Plan for a track of `audio_duration` under a video of `video_duration`.
    /// Returns `None` for a track with no usable length.
    pub fn reconcile(audio_duration: f64, video_duration: f64) -> Option<Self> {
        if !audio_duration.is_finite() || audio_duration <= 0.0 {
            return None;
        }
        if audio_duration >= video_duration {
            Some(AudioPlan::Truncate { to: video_duration })
        } else {
            let repeats = (video_duration / audio_duration).ceil() as u32;
            Some(AudioPlan::Loop {
                repeats: repeats.max(1),
                to: video_duration,
            })
        }
    }

    /// Length of the audio after applying the plan.
    pub fn duration(&self) -> f64 {
        match self {
            AudioPlan::Truncate { to } | AudioPlan::Loop { to, .. } => *to,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub path: PathBuf,
    pub plan: AudioPlan,
}

/// Turns a timeline (and optional audio) into a video file.
pub trait Encoder: Send + Sync {
    /// Duration of an audio file in seconds.
    fn probe_duration(&self, path: &Path) -> Result<f64, RenderError>;

    /// Encode to `output`. The caller owns cleanup of `output` on failure.
    fn encode(
        &self,
        timeline: &Timeline,
        audio: Option<&AudioTrack>,
        output: &Path,
    ) -> Result<(), RenderError>;
}

/// Encoder backed by the ffmpeg and ffprobe binaries.
pub struct FfmpegEncoder {
    config: VideoConfig,
}

impl FfmpegEncoder {
    pub fn new(config: VideoConfig) -> Self {
        Self { config }
    }

    pub fn build_command(
        &self,
        timeline: &Timeline,
        audio: Option<&AudioTrack>,
        output: &Path,
    ) -> FfmpegCommand {
        let fps = self.config.fps;
        let mut cmd = FfmpegCommand::new(self.config.ffmpeg.clone(), output);

        for clip in &timeline.clips {
            cmd = cmd.input(
                &clip.source,
                [
                    "-loop".to_string(),
                    "1".to_string(),
                    "-framerate".to_string(),
                    fps.to_string(),
                    "-t".to_string(),
                    format!("{:.3}", clip.duration),
                ],
            );
        }

        let audio_index = cmd.input_count();
        if let Some(track) = audio {
            let args = match track.plan {
                AudioPlan::Truncate { to } => vec!["-t".to_string(), format!("{:.3}", to)],
                AudioPlan::Loop { repeats, .. } => vec![
                    "-stream_loop".to_string(),
                    repeats.saturating_sub(1).to_string(),
                ],
            };
            cmd = cmd.input(&track.path, args);
        }

        cmd = cmd
            .filter_complex(build_filter_graph(timeline, fps))
            .map(format!("[{}]", VIDEO_OUTPUT_LABEL));
        if audio.is_some() {
            cmd = cmd
                .map(format!("{}:a", audio_index))
                .audio_codec(self.config.audio_codec.clone());
        }

        cmd.video_codec(self.config.video_codec.clone())
            .frame_rate(fps)
            .duration(timeline.duration())
            .output_arg("-movflags")
            .output_arg("+faststart")
    }
}

impl Encoder for FfmpegEncoder {
    fn probe_duration(&self, path: &Path) -> Result<f64, RenderError> {
        probe_duration(&self.config.ffprobe, path)
    }

    fn encode(
        &self,
        timeline: &Timeline,
        audio: Option<&AudioTrack>,
        output: &Path,
    ) -> Result<(), RenderError> {
        self.build_command(timeline, audio, output).run()
    }
}

/// Result of a render request.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedFile {
    pub path: PathBuf,
    /// True when an existing file at the output path was returned untouched.
    pub reused: bool,
    /// Seconds of video; unknown for a reused file.
    pub duration: Option<f64>,
    pub audio: Option<AudioPlan>,
}

pub struct RenderPipeline {
    encoder: Box<dyn Encoder>,
}

impl RenderPipeline {
    pub fn new(encoder: Box<dyn Encoder>) -> Self {
        Self { encoder }
    }

    /// Render `timeline` to `output`.
    ///
    /// An existing file at `output` is returned as-is. Encoding goes to a
    /// sibling partial file that is renamed into place only on success, so a
    /// failed render never leaves a file at `output`.
    pub fn render(
        &self,
        timeline: &Timeline,
        music: Option<&Path>,
        output: &Path,
    ) -> Result<RenderedFile, RenderError> {
        if let Some(existing) = Self::reuse_existing(output) {
            return Ok(existing);
        }

        if timeline.is_empty() {
            return Err(RenderError::EmptyTimeline);
        }

        let audio = self.plan_audio(music, timeline.duration())?;

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let partial = partial_path(output);

        tracing::info!(
            path = %output.display(),
            clips = timeline.clips.len(),
            duration = timeline.duration(),
            animation = %timeline.kind,
            with_audio = audio.is_some(),
            "Rendering video"
        );

        let result = self
            .encoder
            .encode(timeline, audio.as_ref(), &partial)
            .and_then(|()| std::fs::rename(&partial, output).map_err(RenderError::from));

        if let Err(e) = result {
            tracing::error!(path = %output.display(), error = %e, "Render failed");
            if let Err(cleanup) = std::fs::remove_file(&partial) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %partial.display(), error = %cleanup, "Failed to remove partial output");
                }
            }
            return Err(e);
        }

        Ok(RenderedFile {
            path: output.to_path_buf(),
            reused: false,
            duration: Some(timeline.duration()),
            audio: audio.map(|track| track.plan),
        })
    }

    /// The file already at `output`, if any. Rendering is skipped for it.
    pub fn reuse_existing(output: &Path) -> Option<RenderedFile> {
        if !output.is_file() {
            return None;
        }
        tracing::info!(path = %output.display(), "Video already exists, reusing");
        Some(RenderedFile {
            path: output.to_path_buf(),
            reused: true,
            duration: None,
            audio: None,
        })
    }

    fn plan_audio(
        &self,
        music: Option<&Path>,
        video_duration: f64,
    ) -> Result<Option<AudioTrack>, RenderError> {
        let path = match music {
            Some(path) if path.is_file() => path,
            Some(path) => {
                tracing::warn!(path = %path.display(), "Background track missing, rendering without audio");
                return Ok(None);
            }
            None => return Ok(None),
        };

        let audio_duration = self.encoder.probe_duration(path)?;
        match AudioPlan::reconcile(audio_duration, video_duration) {
            Some(plan) => Ok(Some(AudioTrack {
                path: path.to_path_buf(),
                plan,
            })),
            None => {
                tracing::warn!(path = %path.display(), "Background track has no duration, rendering without audio");
                Ok(None)
            }
        }
    }
}

/// `<dir>/<stem>.partial.<ext>` next to the final output.
fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!("{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!("{}.partial", stem),
    };
    output.with_file_name(name)
}
