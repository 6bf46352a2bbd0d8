//! Output naming and listing for rendered memory videos.

use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};

use super::timeline::AnimationKind;

/// Every rendered video name ends with this before the extension.
pub const MEMORY_SUFFIX: &str = "_memory";

/// A fully resolved render request.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoJob {
    pub group_id: String,
    pub kind: AnimationKind,
    pub output_path: PathBuf,
}

impl VideoJob {
    /// New job stamped with the current local time and a random suffix.
    pub fn new(group_id: &str, kind: AnimationKind, output_dir: &Path, extension: &str) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self::with_stamp(
            group_id,
            kind,
            output_dir,
            extension,
            Local::now().naive_local(),
            &suffix[..8],
        )
    }

    /// Job with an explicit timestamp and suffix. Equal inputs give equal paths.
    pub fn with_stamp(
        group_id: &str,
        kind: AnimationKind,
        output_dir: &Path,
        extension: &str,
        timestamp: NaiveDateTime,
        suffix: &str,
    ) -> Self {
        Self {
            group_id: group_id.to_string(),
            kind,
            output_path: output_dir.join(output_file_name(group_id, timestamp, suffix, extension)),
        }
    }
}

/// `<group>_<YYYYmmdd_HHMMSS>_<suffix>_memory.<ext>`
pub fn output_file_name(
    group_id: &str,
    timestamp: NaiveDateTime,
    suffix: &str,
    extension: &str,
) -> String {
    format!(
        "{}_{}_{}{}.{}",
        group_id,
        timestamp.format("%Y%m%d_%H%M%S"),
        suffix,
        MEMORY_SUFFIX,
        extension
    )
}

/// Names of rendered videos in `output_dir`, sorted. A missing directory lists nothing.
pub fn list_videos(output_dir: &Path, extension: &str) -> std::io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let wanted = format!("{}.{}", MEMORY_SUFFIX, extension);
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(&wanted) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap()
    }

    #[test]
    fn test_output_file_name_format() {
        assert_eq!(
            output_file_name("Group_2", stamp(), "a1b2c3d4", "mp4"),
            "Group_2_20240309_140507_a1b2c3d4_memory.mp4"
        );
    }

    #[test]
    fn test_same_stamp_gives_same_path() {
        let dir = Path::new("/videos");
        let a = VideoJob::with_stamp("Group_1", AnimationKind::Zoom, dir, "mp4", stamp(), "deadbeef");
        let b = VideoJob::with_stamp("Group_1", AnimationKind::Zoom, dir, "mp4", stamp(), "deadbeef");
        assert_eq!(a.output_path, b.output_path);
        assert_eq!(
            a.output_path,
            PathBuf::from("/videos/Group_1_20240309_140507_deadbeef_memory.mp4")
        );
    }

    #[test]
    fn test_new_jobs_get_distinct_paths() {
        let dir = Path::new("/videos");
        let a = VideoJob::new("Group_1", AnimationKind::CrossFade, dir, "mp4");
        let b = VideoJob::new("Group_1", AnimationKind::CrossFade, dir, "mp4");
        assert_ne!(a.output_path, b.output_path);
        assert!(a
            .output_path
            .to_string_lossy()
            .ends_with("_memory.mp4"));
    }

    #[test]
    fn test_list_videos_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "Group_2_20240101_000000_bbbbbbbb_memory.mp4",
            "Group_1_20240101_000000_aaaaaaaa_memory.mp4",
            "Group_1_20240101_000000_cccccccc_memory.partial.mp4",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub_memory.mp4")).unwrap();

        let names = list_videos(dir.path(), "mp4").unwrap();
        assert_eq!(
            names,
            vec![
                "Group_1_20240101_000000_aaaaaaaa_memory.mp4".to_string(),
                "Group_2_20240101_000000_bbbbbbbb_memory.mp4".to_string(),
            ]
        );

        assert!(list_videos(&dir.path().join("absent"), "mp4").unwrap().is_empty());
    }
}
