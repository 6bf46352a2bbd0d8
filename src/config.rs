use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub assets: AssetConfig,

    #[serde(default)]
    pub video: VideoConfig,

    #[serde(default)]
    pub music: MusicConfig,

    #[serde(default)]
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_image_size_kb")]
    pub max_image_size_kb: u64,

    /// Longest side, in pixels, an image is downscaled to before detection.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    /// Extensions picked up when a directory is uploaded
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

fn default_max_image_size_kb() -> u64 {
    1024
}

fn default_max_dimension() -> u32 {
    900
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "gif".to_string(),
        "webp".to_string(),
        "bmp".to_string(),
        "tif".to_string(),
        "tiff".to_string(),
    ]
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_image_size_kb: default_max_image_size_kb(),
            max_dimension: default_max_dimension(),
            image_extensions: default_image_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Euclidean distance below which a face joins its nearest neighbour's group.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,
}

fn default_distance_threshold() -> f32 {
    0.45
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    #[serde(default = "default_assets_root")]
    pub root: PathBuf,
}

fn default_assets_root() -> PathBuf {
    data_root().join("grouped_faces")
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            root: default_assets_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: u32,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Container extension for rendered videos
    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
}

fn default_output_dir() -> PathBuf {
    data_root().join("memory_videos")
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_fps() -> u32 {
    24
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_extension() -> String {
    "mp4".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            extension: default_extension(),
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicConfig {
    #[serde(default = "default_music_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_music_track")]
    pub track: String,
}

fn default_music_dir() -> PathBuf {
    data_root().join("background_music")
}

fn default_music_track() -> String {
    "Inspire.mp3".to_string()
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            dir: default_music_dir(),
            track: default_music_track(),
        }
    }
}

impl MusicConfig {
    /// Path of the background track, whether or not it exists.
    pub fn track_path(&self) -> PathBuf {
        self.dir.join(&self.track)
    }
}

/// External embedding extractor invocation.
///
/// The command receives a PNG on stdin and prints a JSON array of faces on
/// stdout, e.g. `["python3", "/opt/facereel/embed.py"]`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtractorConfig {
    #[serde(default)]
    pub command: Vec<String>,
}

fn data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("facereel")
}

fn default_db_path() -> PathBuf {
    data_root().join("faces.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            upload: UploadConfig::default(),
            clustering: ClusteringConfig::default(),
            assets: AssetConfig::default(),
            video: VideoConfig::default(),
            music: MusicConfig::default(),
            extractor: ExtractorConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("FACEREEL_CONFIG") {
            return Self::load_from(Path::new(&path));
        }

        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Create the asset, video and music directories if they are missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.assets.root)?;
        std::fs::create_dir_all(&self.video.output_dir)?;
        std::fs::create_dir_all(&self.music.dir)?;
        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facereel")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [clustering]
            distance_threshold = 0.5

            [video]
            fps = 30
            "#,
        )
        .unwrap();

        assert!((config.clustering.distance_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.video.fps, 30);
        assert_eq!(config.video.width, 1920);
        assert_eq!(config.upload.max_image_size_kb, 1024);
        assert_eq!(config.upload.max_dimension, 900);
        assert_eq!(config.music.track, "Inspire.mp3");
        assert!(config.extractor.command.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.extractor.command = vec!["python3".to_string(), "embed.py".to_string()];
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.extractor.command, config.extractor.command);
        assert_eq!(loaded.video.video_codec, "libx264");
    }
}
