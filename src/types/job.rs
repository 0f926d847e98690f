use crate::result::{bail, Result};
use crate::sanitize::sanitize;

/// Opaque credential bag forwarded verbatim to the source service.
///
/// The pipeline never inspects these beyond turning them into request
/// headers; which cookies a given service wants is the collaborator's
/// business.
#[derive(Debug, Clone, Default)]
pub struct AuthBag {
    /// Cookie pairs, rendered as a single `Cookie` header
    pub cookies: Vec<(String, String)>,
    /// Extra header overrides
    pub headers: Vec<(String, String)>,
    /// Service-appropriate referer, if any
    pub referer: Option<String>,
}

/// One requested source-to-destination transfer
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub source_url: String,
    /// Sanitized filename, used both on disk and as the remote caption
    pub display_name: String,
    pub auth: AuthBag,
}

impl DownloadJob {
    pub fn new(source_url: impl Into<String>, display_name: &str, auth: AuthBag) -> Self {
        Self {
            source_url: source_url.into(),
            display_name: sanitize(display_name),
            auth,
        }
    }

    /// Zip parallel URL and filename lists into jobs.
    ///
    /// A count mismatch is a batch-level input error: the caller's alignment
    /// is broken and guessing which URL goes with which name would be worse
    /// than refusing.
    pub fn pair_up(
        urls: Vec<String>,
        names: Vec<String>,
        auth: &AuthBag,
    ) -> Result<Vec<DownloadJob>> {
        if urls.len() != names.len() {
            return bail(format!(
                "URL/filename counts mismatch: {} URLs but {} filenames",
                urls.len(),
                names.len()
            ));
        }

        Ok(urls
            .into_iter()
            .zip(names)
            .map(|(url, name)| DownloadJob::new(url, &name, auth.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_up_rejects_mismatched_counts() {
        let urls = vec!["https://a/1".to_string(), "https://a/2".to_string()];
        let names = vec!["one".to_string()];
        assert!(DownloadJob::pair_up(urls, names, &AuthBag::default()).is_err());
    }

    #[test]
    fn pair_up_sanitizes_names() {
        let urls = vec!["https://a/1".to_string()];
        let names = vec!["we:ird*name".to_string()];
        let jobs = DownloadJob::pair_up(urls, names, &AuthBag::default()).unwrap();
        assert_eq!(jobs[0].display_name, "we_ird_name");
    }
}
