use std::path::{Path, PathBuf};

use crate::result::Result;

/// Position of a segment within its split, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPos {
    pub index: usize,
    pub count: usize,
}

/// A concrete local file produced for a job: either the whole download
/// or one split segment of it.
#[derive(Debug, Clone)]
pub struct LocalArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub segment: Option<SegmentPos>,
}

impl LocalArtifact {
    /// Wrap an existing on-disk file as a non-split artifact
    pub fn whole(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let size_bytes = std::fs::metadata(&path)?.len();
        Ok(Self {
            path,
            size_bytes,
            segment: None,
        })
    }

    pub fn segment(path: impl Into<PathBuf>, index: usize, count: usize) -> Result<Self> {
        let path = path.into();
        let size_bytes = std::fs::metadata(&path)?.len();
        Ok(Self {
            path,
            size_bytes,
            segment: Some(SegmentPos { index, count }),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Caption sent along with this artifact: the bare display name for a
    /// whole file, `"name (Part i/n)"` for a segment
    pub fn caption(&self, display_name: &str) -> String {
        match self.segment {
            Some(SegmentPos { index, count }) if count > 1 => {
                format!("{display_name} (Part {index}/{count})")
            }
            _ => display_name.to_string(),
        }
    }
}

/// Helper for tests and the splitter: does this path look like a video
/// container we know how to remux?
pub fn has_video_extension(path: &Path) -> bool {
    const VIDEO_EXTENSIONS: &[&str] = &[
        "mp4", "mkv", "avi", "mov", "webm", "m4v", "ts", "flv", "wmv", "mpg", "mpeg",
    ];

    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_for_whole_file_is_bare_name() {
        let artifact = LocalArtifact {
            path: PathBuf::from("/tmp/movie.mkv"),
            size_bytes: 1,
            segment: None,
        };
        assert_eq!(artifact.caption("Movie"), "Movie");
    }

    #[test]
    fn caption_for_segment_includes_position() {
        let artifact = LocalArtifact {
            path: PathBuf::from("/tmp/movie.part002.mkv"),
            size_bytes: 1,
            segment: Some(SegmentPos { index: 2, count: 5 }),
        };
        assert_eq!(artifact.caption("Movie"), "Movie (Part 2/5)");
    }

    #[test]
    fn video_extension_detection() {
        assert!(has_video_extension(Path::new("a.mkv")));
        assert!(has_video_extension(Path::new("a.MP4")));
        assert!(!has_video_extension(Path::new("a.iso")));
        assert!(!has_video_extension(Path::new("noext")));
    }
}
