use std::path::{Path, PathBuf};

use miette::IntoDiagnostic;
use serde::Deserialize;
use tracing::debug;

use crate::{result::Result, types::UploadMode};

/// Environment variables overriding settings carry this prefix,
/// e.g. `FERRY_UPLOAD_MODE=audio`
const ENV_PREFIX: &str = "FERRY";

/// Runtime behavior knobs, from an optional TOML file overlaid with
/// `FERRY_*` environment variables. Every field has a default so a bare
/// invocation works out of the box.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where downloads (and their split parts) land
    pub download_dir: PathBuf,
    /// Root directory of the filesystem relay destination
    pub upload_dir: PathBuf,
    pub upload_enabled: bool,
    pub upload_mode: UploadMode,
    pub delete_after_upload: bool,
    /// Destination id inside the store, when it differs from the default
    pub target_destination: Option<i64>,
    /// Optional thumbnail attached to every upload
    pub thumbnail_url: Option<String>,
    /// Jobs processed concurrently
    pub workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            upload_dir: PathBuf::from("uploaded"),
            upload_enabled: true,
            upload_mode: UploadMode::Video,
            delete_after_upload: true,
            target_destination: None,
            thumbnail_url: None,
            workers: 1,
        }
    }
}

impl Settings {
    /// Load settings from `file` (when given) plus the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            debug!("Reading settings from {}", path.display());
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let settings = builder
            .build()
            .into_diagnostic()?
            .try_deserialize::<Settings>()
            .into_diagnostic()?;
        Ok(settings)
    }
}
