//! FFmpeg command builder, runner and duration probe.

use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::error::RenderError;

#[derive(Debug, Clone)]
struct Input {
    /// Arguments placed before this input's -i
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for FFmpeg commands with any number of inputs.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    program: String,
    inputs: Vec<Input>,
    output: PathBuf,
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(program: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
        }
    }

    /// Add an input with its own leading arguments.
    pub fn input<I, S>(mut self, path: impl AsRef<Path>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(Input {
            args: args.into_iter().map(Into::into).collect(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Add output arguments (after all inputs).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn filter_complex(self, graph: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(graph)
    }

    pub fn map(self, stream: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(stream)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    /// Cap output length.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-v", "error"].iter().map(|s| s.to_string()).collect();

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }

    /// Full invocation, program first.
    pub fn command_line(&self) -> Vec<String> {
        let mut line = vec![self.program.clone()];
        line.extend(self.build_args());
        line
    }

    /// Run to completion, capturing stderr for diagnostics.
    pub fn run(&self) -> Result<(), RenderError> {
        let args = self.build_args();
        debug!("Running FFmpeg: {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| spawn_error(&self.program, e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(RenderError::encoder_failed(
                "FFmpeg exited with non-zero status",
                self.command_line(),
                (!stderr.is_empty()).then_some(stderr),
                output.status.code(),
            ))
        }
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> RenderError {
    if e.kind() == ErrorKind::NotFound {
        RenderError::EncoderNotFound(program.to_string())
    } else {
        RenderError::Io(e)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Media duration in seconds, read with ffprobe.
pub fn probe_duration(ffprobe: &str, path: &Path) -> Result<f64, RenderError> {
    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| spawn_error(ffprobe, e))?;

    if !output.status.success() {
        return Err(RenderError::ProbeFailed {
            path: path.to_path_buf(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_probe_duration(&output.stdout).ok_or_else(|| RenderError::ProbeFailed {
        path: path.to_path_buf(),
        message: "no duration in ffprobe output".to_string(),
    })
}

fn parse_probe_duration(stdout: &[u8]) -> Option<f64> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout).ok()?;
    probe
        .format
        .duration
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_orders_inputs() {
        let cmd = FfmpegCommand::new("ffmpeg", "/out/video.mp4")
            .input("/in/a.jpg", ["-loop", "1", "-t", "4.000"])
            .input("/in/music.mp3", Vec::<String>::new())
            .filter_complex("[0:v]null[vout]")
            .map("[vout]")
            .map("1:a")
            .video_codec("libx264")
            .duration(4.0);

        let args = cmd.build_args();
        assert_eq!(&args[..3], &["-y", "-v", "error"]);
        assert_eq!(
            &args[3..9],
            &["-loop", "1", "-t", "4.000", "-i", "/in/a.jpg"]
        );
        assert_eq!(&args[9..11], &["-i", "/in/music.mp3"]);
        assert!(args.windows(2).any(|w| w == ["-map", "1:a"]));
        assert_eq!(args.last().unwrap(), "/out/video.mp4");
        assert_eq!(cmd.input_count(), 2);
        assert_eq!(cmd.command_line()[0], "ffmpeg");
    }

    #[test]
    fn test_parse_probe_duration() {
        let json = br#"{"format": {"filename": "x.mp3", "duration": "183.249000"}}"#;
        assert_eq!(parse_probe_duration(json), Some(183.249));
        assert_eq!(parse_probe_duration(br#"{"format": {}}"#), None);
        assert_eq!(parse_probe_duration(b"garbage"), None);
    }

    #[test]
    fn test_missing_binary_is_reported() {
        let cmd = FfmpegCommand::new("facereel-no-such-ffmpeg", "/tmp/out.mp4");
        assert!(matches!(cmd.run(), Err(RenderError::EncoderNotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_carries_stderr_and_command() {
        // `sh -y ...` is not a valid invocation, so sh exits non-zero with a message.
        let cmd = FfmpegCommand::new("sh", "/tmp/out.mp4");
        match cmd.run() {
            Err(RenderError::EncoderFailed {
                command, exit_code, ..
            }) => {
                assert_eq!(command[0], "sh");
                assert!(exit_code.is_some());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
