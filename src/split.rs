use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{
    outside::StreamSplitter,
    result::{bail, Error, Result},
    types::{has_video_extension, LocalArtifact, UploadMode},
};

/// Files at or below this size pass through untouched (~1.95 GiB,
/// safely under the destination's 2 GiB hard ceiling)
pub const CHECK_THRESHOLD: u64 = 1950 * 1024 * 1024;

/// Target size per segment (~1800 MiB), leaving margin under the ceiling
/// for container overhead
const TARGET_SEGMENT_BYTES: u64 = 1800 * 1024 * 1024;

/// Floor for the computed segment duration, avoids degenerate tiny cuts
const MIN_SEGMENT_SECS: u64 = 10;

/// A single produced segment this close to the original is segmentation
/// overhead, not a real split
const SINGLE_SEGMENT_TOLERANCE: u64 = 1024 * 1024;

/// What the size gate decided for one downloaded file
#[derive(Debug)]
pub enum SplitOutcome {
    /// The file fits (or splitting turned out unnecessary); upload as-is
    Whole(LocalArtifact),
    /// The file was cut into ordered, independently playable segments
    Segmented {
        original: PathBuf,
        parts_dir: PathBuf,
        segments: Vec<LocalArtifact>,
    },
}

impl SplitOutcome {
    /// Artifacts to upload, in strict ascending order
    pub fn artifacts(&self) -> &[LocalArtifact] {
        match self {
            SplitOutcome::Whole(artifact) => std::slice::from_ref(artifact),
            SplitOutcome::Segmented { segments, .. } => segments,
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self, SplitOutcome::Segmented { .. })
    }
}

/// Size gate and lossless segmenter.
///
/// Splitting never re-encodes; it delegates to a stream-copy remux sized
/// by a bitrate-derived duration estimate. Byte-range splitting of
/// arbitrary files is deliberately unsupported: it produces unplayable
/// fragments for structured container formats.
#[derive(Debug)]
pub struct Splitter<'a> {
    tool: &'a dyn StreamSplitter,
    threshold: u64,
    target_segment_bytes: u64,
}

impl<'a> Splitter<'a> {
    pub fn new(tool: &'a dyn StreamSplitter) -> Self {
        Self {
            tool,
            threshold: CHECK_THRESHOLD,
            target_segment_bytes: TARGET_SEGMENT_BYTES,
        }
    }

    /// Override the size limits, for callers (and tests) with a smaller
    /// destination ceiling
    pub fn with_limits(tool: &'a dyn StreamSplitter, threshold: u64, target_bytes: u64) -> Self {
        Self {
            tool,
            threshold,
            target_segment_bytes: target_bytes,
        }
    }

    /// Decide whether `path` fits the destination ceiling and cut it into
    /// segments when it does not.
    pub fn split_if_needed(&self, path: &Path, mode: UploadMode) -> Result<SplitOutcome> {
        let artifact = LocalArtifact::whole(path)
            .map_err(|err| err.wrap_err_with(|| "Split check could not stat the file"))?;
        let name = artifact.file_name();

        debug!("File '{name}' is {} bytes", artifact.size_bytes);
        if artifact.size_bytes <= self.threshold {
            debug!("Size is within limit, no splitting needed");
            return Ok(SplitOutcome::Whole(artifact));
        }

        // Only demuxable video can be split, and only when the destination
        // treats it as video
        if mode != UploadMode::Video || !has_video_extension(path) {
            return Err(Error::CannotSplit(format!(
                "'{name}' is {} bytes, over the {} byte limit, \
                 and only video files in video upload mode can be segmented",
                artifact.size_bytes, self.threshold
            )));
        }

        let info = self.tool.probe(path)?;
        let Some(bit_rate) = info.bit_rate else {
            return Err(Error::CannotSplit(format!(
                "bit rate of '{name}' could not be determined, \
                 cannot estimate a segment duration"
            )));
        };

        let segment_secs = (self.target_segment_bytes * 8 / bit_rate).max(MIN_SEGMENT_SECS);
        debug!(
            "Bit rate {bit_rate} b/s, duration {:.1}s, target segment {segment_secs}s",
            info.duration_secs
        );

        if segment_secs as f64 >= info.duration_secs {
            debug!("One segment would cover the whole stream, keeping the original");
            return Ok(SplitOutcome::Whole(artifact));
        }

        info!("Splitting '{name}' into ~{segment_secs}s segments");
        let parts_dir = path.with_file_name(format!("{name}_parts"));
        std::fs::create_dir_all(&parts_dir)?;

        let segments = match self.run_segmentation(path, &parts_dir, segment_secs) {
            Ok(segments) => segments,
            Err(err) => {
                if std::fs::remove_dir_all(&parts_dir).is_err() {
                    warn!("Could not clean up {}", parts_dir.display());
                }
                return Err(err);
            }
        };

        // A single segment nearly the size of the original means the cut
        // achieved nothing; drop it and ship the original
        if segments.len() == 1
            && segments[0].size_bytes.abs_diff(artifact.size_bytes) <= SINGLE_SEGMENT_TOLERANCE
        {
            debug!("Segmentation produced one near-identical file, keeping the original");
            // The original stays uploadable either way; a leftover copy is
            // an operator annoyance, not a job failure
            if let Err(err) = std::fs::remove_file(&segments[0].path) {
                warn!(
                    "Could not remove redundant segment {}: {err}",
                    segments[0].path.display()
                );
            }
            let _ = std::fs::remove_dir(&parts_dir);
            return Ok(SplitOutcome::Whole(artifact));
        }

        info!("Split '{name}' into {} segments", segments.len());
        Ok(SplitOutcome::Segmented {
            original: path.to_path_buf(),
            parts_dir,
            segments,
        })
    }

    fn run_segmentation(
        &self,
        path: &Path,
        parts_dir: &Path,
        segment_secs: u64,
    ) -> Result<Vec<LocalArtifact>> {
        self.tool.segment(path, parts_dir, segment_secs)?;

        let mut names: Vec<PathBuf> = std::fs::read_dir(parts_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect();

        if names.is_empty() {
            return bail("Segmentation reported success but produced no output files");
        }

        // Zero-padded numbering makes lexicographic order the playback order
        names.sort();

        let count = names.len();
        names
            .into_iter()
            .enumerate()
            .map(|(i, p)| LocalArtifact::segment(p, i + 1, count))
            .collect()
    }
}
