use std::path::{Path, PathBuf};

use clap::Parser;

use crate::{
    config::Settings,
    result::{bail, Result},
    sanitize::{name_from_url, sanitize},
    types::{AuthBag, DownloadJob, UploadMode},
};

macro_rules! arg_env {
    ($v:literal) => {
        concat!("FERRY_", $v)
    };
}

/// Relay large web downloads into a size-capped destination store.
/// Download, split oversized media losslessly, upload every piece, clean up.
#[derive(Parser, Debug)]
pub struct Args {
    /// Batch file with one job per line: `URL | filename`.
    /// The filename is optional and derived from the URL when absent.
    /// Blank lines and lines starting with `#` are ignored.
    #[arg(env = arg_env!("BATCH"))]
    pub batch: PathBuf,

    /// Service label used in the summary and the failed-sources file name
    #[arg(long, default_value = "batch", env = arg_env!("SERVICE"))]
    pub service: String,

    /// Path to a TOML settings file
    #[arg(long, env = arg_env!("CONFIG"))]
    pub config: Option<PathBuf>,

    /// Directory downloads land in, overrides the settings file
    #[arg(long, env = arg_env!("DOWNLOAD_DIR"))]
    pub download_dir: Option<PathBuf>,

    /// How uploaded files are presented to the destination store
    #[arg(long, value_enum, env = arg_env!("MODE"))]
    pub mode: Option<UploadMode>,

    /// Download and split only, never upload
    #[arg(long, env = arg_env!("NO_UPLOAD"))]
    pub no_upload: bool,

    /// Keep local files after a successful upload
    #[arg(long, env = arg_env!("KEEP_FILES"))]
    pub keep_files: bool,

    /// Number of jobs processed concurrently
    #[arg(long, env = arg_env!("WORKERS"))]
    pub workers: Option<usize>,

    /// Destination id inside the store, when it differs from the default
    #[arg(long, env = arg_env!("DEST"))]
    pub dest: Option<i64>,

    /// Thumbnail URL attached to every upload
    #[arg(long, env = arg_env!("THUMBNAIL"))]
    pub thumbnail: Option<String>,

    /// Cookie forwarded with every download request.
    /// The option can be set multiple times.
    #[arg(long = "cookie", value_name = "NAME=VALUE")]
    pub cookies: Vec<String>,

    /// Extra header forwarded with every download request.
    /// The option can be set multiple times.
    #[arg(long = "header", value_name = "NAME=VALUE")]
    pub headers: Vec<String>,

    /// Referer header for download requests
    #[arg(long, env = arg_env!("REFERER"))]
    pub referer: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Fold the command-line overrides into the loaded settings
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(dir) = &self.download_dir {
            settings.download_dir = dir.clone();
        }
        if let Some(mode) = self.mode {
            settings.upload_mode = mode;
        }
        if self.no_upload {
            settings.upload_enabled = false;
        }
        if self.keep_files {
            settings.delete_after_upload = false;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(dest) = self.dest {
            settings.target_destination = Some(dest);
        }
        if let Some(thumbnail) = &self.thumbnail {
            settings.thumbnail_url = Some(thumbnail.clone());
        }
    }

    /// Collect the credential options into one opaque bag
    pub fn auth(&self) -> Result<AuthBag> {
        Ok(AuthBag {
            cookies: parse_pairs(&self.cookies, "cookie")?,
            headers: parse_pairs(&self.headers, "header")?,
            referer: self.referer.clone(),
        })
    }
}

fn parse_pairs(raw: &[String], what: &str) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|entry| match entry.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.trim().to_string()))
            }
            _ => bail(format!("Invalid {what} '{entry}', expected NAME=VALUE")),
        })
        .collect()
}

/// Parse the batch file into jobs.
///
/// URLs and names are collected as two parallel lists and then paired, so
/// alignment errors surface as one batch-level failure.
pub fn read_jobs(path: &Path, auth: &AuthBag) -> Result<Vec<DownloadJob>> {
    let content = std::fs::read_to_string(path)
        .map_err(crate::result::Error::from)
        .map_err(|err| {
            err.wrap_err_with(|| format!("Could not read batch file {}", path.display()))
        })?;

    let mut urls = Vec::new();
    let mut names = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (url, name) = match line.split_once('|') {
            Some((url, name)) => (url.trim(), name.trim()),
            None => (line, ""),
        };

        let name = if name.is_empty() {
            match name_from_url(url) {
                Some(derived) => derived,
                // Unusable URL: keep the entry so it lands in the failure
                // report instead of silently vanishing from the batch
                None => sanitize(url),
            }
        } else {
            name.to_string()
        };

        urls.push(url.to_string());
        names.push(name);
    }

    DownloadJob::pair_up(urls, names, auth)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use indoc::indoc;

    use super::*;

    fn batch_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn parses_lines_with_and_without_names() {
        let file = batch_file(indoc! {"
            # weekly batch
            https://cdn.example.com/uploads/Show%20S01E01.mkv | Show S01E01.mkv

            https://cdn.example.com/uploads/raw.bin
        "});

        let jobs = read_jobs(file.path(), &AuthBag::default()).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].display_name, "Show S01E01.mkv");
        assert_eq!(jobs[1].source_url, "https://cdn.example.com/uploads/raw.bin");
        // Name derived (and decoded) from the URL
        assert_eq!(jobs[1].display_name, "raw.bin");
    }

    #[test]
    fn names_are_sanitized() {
        let file = batch_file("https://h/x.bin | we:ird*name.bin\n");
        let jobs = read_jobs(file.path(), &AuthBag::default()).unwrap();
        assert_eq!(jobs[0].display_name, "we_ird_name.bin");
    }

    #[test]
    fn missing_batch_file_is_an_error() {
        assert!(read_jobs(Path::new("/nonexistent/batch.txt"), &AuthBag::default()).is_err());
    }

    #[test]
    fn cookie_pairs_are_parsed() {
        let args = Args::parse_from([
            "ferry",
            "batch.txt",
            "--cookie",
            "session=abc",
            "--cookie",
            "cf_clearance=tok=en",
            "--referer",
            "https://app.example.com/",
        ]);

        let auth = args.auth().unwrap();
        assert_eq!(
            auth.cookies,
            vec![
                ("session".to_string(), "abc".to_string()),
                // Only the first '=' separates name and value
                ("cf_clearance".to_string(), "tok=en".to_string()),
            ]
        );
        assert_eq!(auth.referer.as_deref(), Some("https://app.example.com/"));
    }

    #[test]
    fn malformed_cookie_is_rejected() {
        let args = Args::parse_from(["ferry", "batch.txt", "--cookie", "no-separator"]);
        assert!(args.auth().is_err());
    }

    #[test]
    fn cli_flags_override_settings() {
        let args = Args::parse_from([
            "ferry",
            "batch.txt",
            "--no-upload",
            "--keep-files",
            "--mode",
            "audio",
            "--workers",
            "3",
        ]);

        let mut settings = Settings::default();
        args.apply_to(&mut settings);
        assert!(!settings.upload_enabled);
        assert!(!settings.delete_after_upload);
        assert_eq!(settings.upload_mode, UploadMode::Audio);
        assert_eq!(settings.workers, 3);
    }
}
