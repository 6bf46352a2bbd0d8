//! Incremental face clustering and memory-video synthesis.
//!
//! Uploaded photographs are split into faces, each face joins the identity
//! group of its nearest stored neighbour (or starts a new one), and any group
//! can be rendered into a short animated video with background music.

pub mod assets;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod faces;
pub mod ingest;
pub mod logging;
pub mod service;
pub mod video;

pub use error::{FacereelError, FacereelResult};
pub use service::MemoryService;
