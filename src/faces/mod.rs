pub mod clustering;
pub mod detector;
pub mod processor;

pub use clustering::{Assignment, Clusterer, LinearScan, NeighborIndex, DEFAULT_DISTANCE_THRESHOLD};
pub use detector::{BoundingBox, CommandExtractor, DetectedFace, FaceExtractor, UnconfiguredExtractor};
pub use processor::{FaceAssignment, FaceProcessor, UploadOutcome};
