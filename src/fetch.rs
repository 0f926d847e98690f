use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use miette::{Context, IntoDiagnostic};
use tracing::{debug, info, warn};

use crate::{
    result::{bail, Result},
    types::{DownloadJob, Progress},
};

/// Fixed identity presented to source services
pub const USER_AGENT: &str = "Mozilla/5.0";

/// One attempt, no retry: sources serving multi-gigabyte files either
/// stream or they don't
const FETCH_TIMEOUT: Duration = Duration::from_secs(180);

/// Streaming block size, bounds memory use regardless of file size
const BLOCK_SIZE: usize = 1024 * 1024;

/// Interface for retrieving one source URL to local disk
pub trait SourceFetcher: Sync {
    /// Stream `job.source_url` into `dest_dir/<display_name>`.
    ///
    /// `on_progress` is invoked after every written block with cumulative
    /// bytes and the advertised total (0 when unknown). The callback is
    /// best-effort: it cannot fail and must never be given a way to abort
    /// the download.
    fn fetch(
        &self,
        job: &DownloadJob,
        dest_dir: &Path,
        on_progress: &mut dyn FnMut(Progress),
    ) -> Result<PathBuf>;
}

/// Fetcher over a blocking HTTP client
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .into_diagnostic()
            .wrap_err("Could not build the HTTP client")?;

        Ok(Self { client })
    }

    fn build_request(&self, job: &DownloadJob) -> reqwest::blocking::RequestBuilder {
        let mut req = self.client.get(&job.source_url);

        if let Some(referer) = &job.auth.referer {
            req = req.header("Referer", referer);
        }

        if !job.auth.cookies.is_empty() {
            let cookie_header = job
                .auth
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            req = req.header("Cookie", cookie_header);
        }

        for (name, value) in &job.auth.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        req
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch(
        &self,
        job: &DownloadJob,
        dest_dir: &Path,
        on_progress: &mut dyn FnMut(Progress),
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(dest_dir)
            .map_err(crate::result::Error::from)
            .map_err(|err| err.wrap_err_with(|| "Could not create download directory"))?;

        let dest = dest_dir.join(&job.display_name);
        info!("Downloading '{}' from {}", job.display_name, job.source_url);

        let response = self
            .build_request(job)
            .send()
            .into_diagnostic()
            .wrap_err_with(|| format!("Request to {} failed", job.source_url))?;

        let status = response.status();
        if !status.is_success() {
            return bail(format!(
                "Download of '{}' failed with HTTP status {status}",
                job.display_name
            ));
        }

        let total = response.content_length().unwrap_or(0);
        debug!("Response OK, content length: {total}");

        if let Err(err) = stream_to_file(response, &dest, total, on_progress) {
            // A half-written file is useless without resume support
            if std::fs::remove_file(&dest).is_err() {
                warn!("Could not remove partial file {}", dest.display());
            }
            return Err(err.wrap_err_with(|| {
                format!("Download of '{}' failed mid-stream", job.display_name)
            }));
        }

        Ok(dest)
    }
}

fn stream_to_file(
    mut response: impl Read,
    dest: &Path,
    total: u64,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<()> {
    let mut file = File::create(dest)?;
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut done: u64 = 0;

    loop {
        let n = response
            .read(&mut buf)
            .map_err(crate::result::Error::from)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        done += n as u64;
        on_progress(Progress {
            bytes_done: done,
            bytes_total: total,
        });
    }

    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        io::Read as _,
        net::{SocketAddr, TcpListener},
        sync::mpsc,
    };

    use crate::types::AuthBag;

    use super::*;

    /// One-shot HTTP fixture: answers the first connection with `response`
    /// and reports the raw request through the returned channel.
    fn spawn_server(response: String) -> (SocketAddr, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 8192];
            let n = stream.read(&mut buf).unwrap_or(0);
            tx.send(String::from_utf8_lossy(&buf[..n]).into_owned()).ok();
            stream.write_all(response.as_bytes()).unwrap();
        });

        (addr, rx)
    }

    fn job_for(addr: SocketAddr, name: &str, auth: AuthBag) -> DownloadJob {
        DownloadJob::new(format!("http://{addr}/files/{name}"), name, auth)
    }

    #[test]
    fn streams_body_to_disk_with_progress() {
        let body = "hello from the fixture";
        let (addr, _rx) = spawn_server(format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ));

        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new().unwrap();
        let mut events = Vec::new();

        let path = fetcher
            .fetch(
                &job_for(addr, "greeting.txt", AuthBag::default()),
                dir.path(),
                &mut |p| events.push(p),
            )
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), body);
        let last = events.last().unwrap();
        assert_eq!(last.bytes_done, body.len() as u64);
        assert_eq!(last.bytes_total, body.len() as u64);
    }

    #[test]
    fn non_2xx_status_fails_the_job() {
        let (addr, _rx) = spawn_server(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
        );

        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new().unwrap();

        let err = fetcher
            .fetch(
                &job_for(addr, "missing.bin", AuthBag::default()),
                dir.path(),
                &mut |_| {},
            )
            .unwrap_err();

        assert!(format!("{err}").contains("404"), "{err}");
        assert!(!dir.path().join("missing.bin").exists());
    }

    #[test]
    fn mid_stream_failure_removes_the_partial_file() {
        // Advertises far more bytes than it delivers, then closes
        let (addr, _rx) = spawn_server(
            "HTTP/1.1 200 OK\r\nContent-Length: 65536\r\nConnection: close\r\n\r\ntruncated"
                .to_string(),
        );

        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new().unwrap();

        let err = fetcher
            .fetch(
                &job_for(addr, "truncated.bin", AuthBag::default()),
                dir.path(),
                &mut |_| {},
            )
            .unwrap_err();

        assert!(format!("{err}").contains("mid-stream"), "{err}");
        assert!(!dir.path().join("truncated.bin").exists());
    }

    #[test]
    fn forwards_cookies_and_referer() {
        let (addr, rx) = spawn_server(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok".to_string(),
        );

        let auth = AuthBag {
            cookies: vec![("cf_clearance".to_string(), "tok".to_string())],
            headers: vec![("X-Extra".to_string(), "1".to_string())],
            referer: Some("https://app.example.com/".to_string()),
        };

        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new().unwrap();
        fetcher
            .fetch(&job_for(addr, "auth.bin", auth), dir.path(), &mut |_| {})
            .unwrap();

        let request = rx.recv().unwrap().to_ascii_lowercase();
        assert!(request.contains("cookie: cf_clearance=tok"), "{request}");
        assert!(request.contains("referer: https://app.example.com/"), "{request}");
        assert!(request.contains("x-extra: 1"), "{request}");
        assert!(request.contains("user-agent: mozilla/5.0"), "{request}");
    }

    #[test]
    fn absent_auth_sends_no_cookie_header() {
        let (addr, rx) = spawn_server(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok".to_string(),
        );

        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new().unwrap();
        fetcher
            .fetch(
                &job_for(addr, "plain.bin", AuthBag::default()),
                dir.path(),
                &mut |_| {},
            )
            .unwrap();

        let request = rx.recv().unwrap().to_ascii_lowercase();
        assert!(!request.contains("cookie:"), "{request}");
    }
}
