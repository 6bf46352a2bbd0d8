//! Memory video synthesis: timeline building, filter graphs, encoding and output naming.

pub mod command;
pub mod filters;
pub mod output;
pub mod render;
pub mod timeline;

pub use output::{list_videos, output_file_name, VideoJob};
pub use render::{AudioPlan, AudioTrack, Encoder, FfmpegEncoder, RenderPipeline, RenderedFile};
pub use timeline::{
    build as build_timeline, AnimationKind, Canvas, Clip, Law, Motion, Position, Timeline, Transform,
};
