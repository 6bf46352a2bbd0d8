//! On-disk copies of uploaded photographs, one directory per group.
//!
//! Layout: `<root>/<group_id>/<image_id>_full.jpg`. A photo whose faces land in
//! several groups is saved once into each of those groups.

use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AssetConfig;
use crate::error::PersistenceError;

const ASSET_SUFFIX: &str = "_full.jpg";

/// Group and image ids name asset paths, so each must be a single path component.
pub fn is_path_component(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\'])
}

/// Manages the per-group image tree
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(config: &AssetConfig) -> Self {
        Self::with_root(config.root.clone())
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the asset for (group, image) lives, whether or not it exists.
    pub fn asset_path(&self, group_id: &str, image_id: &str) -> PathBuf {
        self.root
            .join(group_id)
            .join(format!("{}{}", image_id, ASSET_SUFFIX))
    }

    pub fn exists(&self, group_id: &str, image_id: &str) -> bool {
        self.asset_path(group_id, image_id).exists()
    }

    /// Write a full-resolution JPEG copy, creating the group directory if needed.
    pub fn save(
        &self,
        image: &DynamicImage,
        group_id: &str,
        image_id: &str,
    ) -> Result<PathBuf, PersistenceError> {
        let group_dir = self.root.join(group_id);
        fs::create_dir_all(&group_dir).map_err(|source| PersistenceError::Asset {
            path: group_dir.clone(),
            source,
        })?;

        let path = self.asset_path(group_id, image_id);
        DynamicImage::ImageRgb8(image.to_rgb8())
            .save_with_format(&path, image::ImageFormat::Jpeg)
            .map_err(|e| PersistenceError::ImageEncode {
                path: path.clone(),
                message: e.to_string(),
            })?;

        tracing::debug!(group_id = %group_id, path = ?path, "Saved group asset");
        Ok(path)
    }

    /// Remove an asset; used to roll back an upload whose faces could not be persisted.
    pub fn remove(&self, group_id: &str, image_id: &str) -> Result<(), PersistenceError> {
        let path = self.asset_path(group_id, image_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Asset { path, source }),
        }
    }

    /// Asset paths for the given images in order, skipping files deleted
    /// out-of-band and ids that would resolve outside the group directory.
    pub fn list_images<S: AsRef<str>>(&self, group_id: &str, image_ids: &[S]) -> Vec<PathBuf> {
        if !is_path_component(group_id) {
            tracing::warn!(group_id = %group_id, "Refusing to list assets for unusable group id");
            return Vec::new();
        }
        image_ids
            .iter()
            .map(AsRef::as_ref)
            .filter(|id| {
                let usable = is_path_component(id);
                if !usable {
                    tracing::warn!(image_id = %id, "Skipping unusable image id");
                }
                usable
            })
            .map(|id| self.asset_path(group_id, id))
            .filter(|path| {
                let present = path.exists();
                if !present {
                    tracing::debug!(path = ?path, "Skipping missing asset");
                }
                present
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([120, 80, 40])))
    }

    #[test]
    fn test_save_creates_group_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = AssetStore::with_root(dir.path().join("grouped_faces"));

        let path = store.save(&sample_image(), "Group_1", "imgA").unwrap();

        assert_eq!(path, dir.path().join("grouped_faces/Group_1/imgA_full.jpg"));
        assert!(path.exists());
        assert!(store.exists("Group_1", "imgA"));
        assert!(!store.exists("Group_2", "imgA"));
    }

    #[test]
    fn test_same_image_saved_per_group() {
        let dir = tempfile::tempdir().unwrap();
        let store = AssetStore::with_root(dir.path());

        store.save(&sample_image(), "Group_1", "shared").unwrap();
        store.save(&sample_image(), "Group_2", "shared").unwrap();

        assert!(store.exists("Group_1", "shared"));
        assert!(store.exists("Group_2", "shared"));
    }

    #[test]
    fn test_list_images_skips_missing_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = AssetStore::with_root(dir.path());

        store.save(&sample_image(), "Group_1", "a").unwrap();
        store.save(&sample_image(), "Group_1", "b").unwrap();
        store.save(&sample_image(), "Group_1", "c").unwrap();
        fs::remove_file(store.asset_path("Group_1", "b")).unwrap();

        let listed = store.list_images("Group_1", &["c", "b", "a"]);
        assert_eq!(
            listed,
            vec![
                store.asset_path("Group_1", "c"),
                store.asset_path("Group_1", "a"),
            ]
        );
    }

    #[test]
    fn test_path_component_check() {
        assert!(is_path_component("Group_1"));
        assert!(is_path_component("3f2c-uuid"));
        for bad in ["", ".", "..", "../../secret", "a/b", "a\\b"] {
            assert!(!is_path_component(bad), "{:?} accepted", bad);
        }
    }

    #[test]
    fn test_list_images_never_leaves_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = AssetStore::with_root(dir.path().join("grouped_faces"));
        store.save(&sample_image(), "Group_1", "a").unwrap();
        sample_image()
            .save_with_format(dir.path().join("secret_full.jpg"), image::ImageFormat::Jpeg)
            .unwrap();

        let listed = store.list_images("Group_1", &["../../secret", "a"]);
        assert_eq!(listed, vec![store.asset_path("Group_1", "a")]);
        assert!(store.list_images("..", &["a"]).is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = AssetStore::with_root(dir.path());

        store.save(&sample_image(), "Group_1", "a").unwrap();
        store.remove("Group_1", "a").unwrap();
        store.remove("Group_1", "a").unwrap();
        assert!(!store.exists("Group_1", "a"));
    }
}
