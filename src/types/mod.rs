mod artifact;
mod batch;
mod job;
mod mode;
mod progress;

pub use artifact::{has_video_extension, LocalArtifact, SegmentPos};
pub use batch::BatchResult;
pub use job::{AuthBag, DownloadJob};
pub use mode::UploadMode;
pub use progress::{Progress, TransferTracker, REPORT_INTERVAL};
