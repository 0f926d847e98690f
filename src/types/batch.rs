use std::io::Write;
use std::path::{Path, PathBuf};

use miette::{Context, IntoDiagnostic};
use tracing::info;

use crate::result::Result;

/// Outcome of one orchestrator run
#[derive(Debug)]
pub struct BatchResult {
    pub service_name: String,
    pub attempted: usize,
    /// Source URLs that did not fully complete, in input order,
    /// each recorded at most once
    pub failed_sources: Vec<String>,
}

impl BatchResult {
    pub fn new(service_name: impl Into<String>, attempted: usize) -> Self {
        Self {
            service_name: service_name.into(),
            attempted,
            failed_sources: Vec::new(),
        }
    }

    /// Record a failed source. A source failing at several stages still
    /// appears only once.
    pub fn record_failure(&mut self, source_url: &str) {
        if !self.failed_sources.iter().any(|s| s == source_url) {
            self.failed_sources.push(source_url.to_string());
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed_sources.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut msg = format!("🏁 {} process finished.", self.service_name);
        if self.is_success() {
            msg.push_str("\n✅ All items completed successfully!");
        } else {
            msg.push_str(&format!(
                "\n⚠️ Encountered {} failure(s) out of {} item(s).",
                self.failed_sources.len(),
                self.attempted
            ));
        }
        msg
    }

    /// Persist the failed source list as `failed_downloads_<service>.txt`
    /// in `dir`, one URL per line after a header comment.
    ///
    /// The file is overwritten per run, never appended. Returns the path
    /// written, or `None` when there is nothing to persist.
    pub fn write_failed(&self, dir: &Path) -> Result<Option<PathBuf>> {
        if self.failed_sources.is_empty() {
            return Ok(None);
        }

        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("failed_downloads_{}.txt", self.service_name));

        let mut file = std::fs::File::create(&path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not create {}", path.display()))?;

        writeln!(file, "# Failed source URLs for {}", self.service_name)
            .into_diagnostic()?;
        for url in &self.failed_sources {
            writeln!(file, "{url}").into_diagnostic()?;
        }

        info!("List of failed sources saved to {}", path.display());
        Ok(Some(path))
    }
}
