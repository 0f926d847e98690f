use clap::ValueEnum;
use serde::Deserialize;

/// How the artifact is presented to the destination store.
///
/// The mode selects the primary send operation; `Document` is also the
/// fallback for content-related send failures in the other modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Video,
    Audio,
    Document,
}

impl UploadMode {
    pub fn label(self) -> &'static str {
        match self {
            UploadMode::Video => "Video",
            UploadMode::Audio => "Audio",
            UploadMode::Document => "Document",
        }
    }
}

impl std::fmt::Display for UploadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
