use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::debug;

use crate::types::{Progress, UploadMode};

/// Why a send was refused
#[derive(Debug)]
pub enum SendError {
    /// Content/format class: caption too long, malformed request,
    /// unsupported method. Eligible for the fallback-to-document policy.
    ContentRejected(String),
    /// Destination flood control: not a failure, resume after the delay
    FloodWait(Duration),
    Other(miette::Report),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::ContentRejected(reason) => write!(f, "content rejected: {reason}"),
            SendError::FloodWait(delay) => write!(f, "flood wait for {delay:?}"),
            SendError::Other(report) => write!(f, "{report}"),
        }
    }
}

/// One artifact handed to the destination store
#[derive(Debug)]
pub struct SendRequest<'a> {
    pub path: &'a Path,
    pub caption: &'a str,
    pub mode: UploadMode,
    /// Destination id when it differs from the status channel
    pub destination: Option<i64>,
    pub thumbnail: Option<&'a Path>,
}

/// Destination store interface.
///
/// Chat/messaging transports are collaborator implementations; the crate
/// ships a local filesystem relay. Implementations report transfer
/// progress through `on_progress` and classify refusals via [`SendError`]
/// so the uploader can apply its fallback and flood-wait policies.
pub trait Transport: Sync {
    fn send(
        &self,
        request: &SendRequest<'_>,
        on_progress: &mut dyn FnMut(Progress),
    ) -> Result<(), SendError>;
}

const COPY_BLOCK_SIZE: usize = 1024 * 1024;

/// Filesystem relay: streams the artifact into a destination directory.
///
/// Useful on its own for moving files onto mounted remote storage, and as
/// the reference `Transport` for everything above it.
#[derive(Debug)]
pub struct CopyTransport {
    root: PathBuf,
}

impl CopyTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Transport for CopyTransport {
    fn send(
        &self,
        request: &SendRequest<'_>,
        on_progress: &mut dyn FnMut(Progress),
    ) -> Result<(), SendError> {
        let dir = match request.destination {
            Some(id) => self.root.join(id.to_string()),
            None => self.root.clone(),
        };
        std::fs::create_dir_all(&dir).map_err(|e| SendError::Other(miette::Report::msg(e)))?;

        let name = request
            .path
            .file_name()
            .ok_or_else(|| SendError::ContentRejected("artifact has no file name".to_string()))?;
        let dest = dir.join(name);
        debug!(
            "Relaying {} -> {} ({})",
            request.path.display(),
            dest.display(),
            request.mode
        );

        let total = std::fs::metadata(request.path)
            .map(|m| m.len())
            .unwrap_or(0);
        let mut src =
            File::open(request.path).map_err(|e| SendError::Other(miette::Report::msg(e)))?;
        let mut dst = File::create(&dest).map_err(|e| SendError::Other(miette::Report::msg(e)))?;

        let mut buf = vec![0u8; COPY_BLOCK_SIZE];
        let mut done: u64 = 0;
        loop {
            let n = src
                .read(&mut buf)
                .map_err(|e| SendError::Other(miette::Report::msg(e)))?;
            if n == 0 {
                break;
            }
            dst.write_all(&buf[..n])
                .map_err(|e| SendError::Other(miette::Report::msg(e)))?;
            done += n as u64;
            on_progress(Progress {
                bytes_done: done,
                bytes_total: total,
            });
        }

        Ok(())
    }
}
