use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::{
    report::ProgressHandle,
    transport::{SendError, SendRequest, Transport},
    types::{LocalArtifact, UploadMode},
};

/// Destination caption ceiling, in codepoints
const MAX_CAPTION_LEN: usize = 1024;

/// Extra sleep on top of a flood-wait delay
const FLOOD_WAIT_MARGIN: Duration = Duration::from_secs(1);

const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(10);

/// Upload behavior flags, threaded in explicitly rather than read from
/// any ambient global
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub enabled: bool,
    pub mode: UploadMode,
    pub delete_after_upload: bool,
    /// Upload target when it differs from the status channel
    pub destination: Option<i64>,
    /// Optional thumbnail source, fetched once per upload call
    pub thumbnail_url: Option<String>,
}

/// Pushes one local artifact to the destination store.
///
/// Never propagates errors past its boundary: the outcome is the returned
/// boolean plus status reporting through the handle.
pub struct Uploader<'a> {
    transport: &'a dyn Transport,
    policy: UploadPolicy,
}

impl<'a> Uploader<'a> {
    pub fn new(transport: &'a dyn Transport, policy: UploadPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Upload `artifact` with `caption`. Returns whether the artifact was
    /// delivered (or considered delivered, with uploads disabled).
    pub fn upload(
        &self,
        artifact: &LocalArtifact,
        caption: &str,
        handle: &mut dyn ProgressHandle,
    ) -> bool {
        if !self.policy.enabled {
            info!(
                "Uploads disabled, treating '{}' as delivered",
                artifact.file_name()
            );
            handle.done("skipped (uploads disabled)");
            return true;
        }

        let caption = truncate_caption(caption);

        // Thumbnail failures are cosmetic, never fatal. The temp file is
        // dropped (and thus removed) after the attempt no matter what.
        let thumbnail = self.fetch_thumbnail();

        let primary = self.policy.mode;
        let delivered_as = match self.send_with_flood_wait(
            artifact,
            &caption,
            primary,
            thumbnail.as_ref(),
            handle,
        ) {
            Ok(()) => Some(primary.label().to_string()),
            Err(SendError::ContentRejected(reason)) if primary != UploadMode::Document => {
                warn!(
                    "{primary} upload of '{}' rejected ({reason}), falling back to document",
                    artifact.file_name()
                );
                match self.send_with_flood_wait(
                    artifact,
                    &caption,
                    UploadMode::Document,
                    thumbnail.as_ref(),
                    handle,
                ) {
                    Ok(()) => Some("Document (Fallback)".to_string()),
                    Err(err) => {
                        error!("Fallback upload failed: {err}");
                        None
                    }
                }
            }
            Err(err) => {
                error!("Upload of '{}' failed: {err}", artifact.file_name());
                None
            }
        };

        let Some(mode_label) = delivered_as else {
            handle.failed(&format!("❌ Upload failed: {caption}"));
            return false;
        };

        handle.done(&format!("✅ Upload OK ({mode_label}): {caption}"));

        if self.policy.delete_after_upload {
            match std::fs::remove_file(&artifact.path) {
                Ok(()) => debug!("Deleted local file {}", artifact.path.display()),
                // The upload itself succeeded; a leftover file is an
                // operator annoyance, not a failure
                Err(err) => error!(
                    "Failed to delete local file {}: {err}",
                    artifact.path.display()
                ),
            }
        }

        true
    }

    /// Drive one send, transparently absorbing flood-wait signals
    fn send_with_flood_wait(
        &self,
        artifact: &LocalArtifact,
        caption: &str,
        mode: UploadMode,
        thumbnail: Option<&NamedTempFile>,
        handle: &mut dyn ProgressHandle,
    ) -> Result<(), SendError> {
        let request = SendRequest {
            path: &artifact.path,
            caption,
            mode,
            destination: self.policy.destination,
            thumbnail: thumbnail.map(|t| t.path()),
        };

        loop {
            let mut on_progress = |p| handle.report(p);
            match self.transport.send(&request, &mut on_progress) {
                Err(SendError::FloodWait(delay)) => {
                    let wait = delay + FLOOD_WAIT_MARGIN;
                    warn!("Destination asked to slow down, sleeping {wait:?}");
                    std::thread::sleep(wait);
                }
                other => return other,
            }
        }
    }

    fn fetch_thumbnail(&self) -> Option<NamedTempFile> {
        let url = self.policy.thumbnail_url.as_deref()?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            warn!("Thumbnail source is not an http(s) URL, ignoring: {url}");
            return None;
        }

        match download_thumbnail(url) {
            Ok(file) => Some(file),
            Err(err) => {
                warn!("Failed to fetch thumbnail from {url}: {err}, proceeding without one");
                None
            }
        }
    }
}

fn download_thumbnail(url: &str) -> miette::Result<NamedTempFile> {
    use miette::{Context, IntoDiagnostic};

    let client = reqwest::blocking::Client::builder()
        .timeout(THUMBNAIL_TIMEOUT)
        .build()
        .into_diagnostic()?;

    let mut response = client
        .get(url)
        .send()
        .into_diagnostic()?
        .error_for_status()
        .into_diagnostic()?;

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.starts_with("image/") {
        miette::bail!("thumbnail content type is not an image: {content_type:?}");
    }

    let suffix = if content_type.contains("png") {
        ".png"
    } else if content_type.contains("webp") {
        ".webp"
    } else {
        ".jpg"
    };

    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .into_diagnostic()
        .wrap_err("Could not create thumbnail tempfile")?;
    std::io::copy(&mut response, &mut file).into_diagnostic()?;

    Ok(file)
}

/// Clamp the caption to the destination ceiling, marking the cut
fn truncate_caption(caption: &str) -> String {
    if caption.chars().count() <= MAX_CAPTION_LEN {
        return caption.to_string();
    }
    let mut cut: String = caption.chars().take(MAX_CAPTION_LEN - 3).collect();
    cut.push_str("...");
    cut
}
