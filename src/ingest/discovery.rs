use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Image files under `directory` (recursively) whose extension is in `extensions`, sorted by path.
pub fn discover_images(directory: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_extension(path, extensions))
        .collect();

    // Sorted so batch uploads cluster in a reproducible order
    images.sort();
    images
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| extensions.iter().any(|e| e.to_lowercase() == ext))
        .unwrap_or(false)
}
