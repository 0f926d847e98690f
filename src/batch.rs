use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use crossbeam_channel::unbounded;
use tracing::{error, info, warn};

use crate::{
    cleanup::cleanup,
    fetch::SourceFetcher,
    report::Reporter,
    result::{bail, err_msg, Error, Result},
    split::Splitter,
    types::{BatchResult, DownloadJob},
    upload::Uploader,
};

/// Drives a batch of jobs through fetch → split → upload → cleanup.
///
/// Jobs are independent: one failure never blocks the rest of the batch.
/// Within one job the stages are strictly ordered and segments upload in
/// ascending index order, stopping at the first failed segment.
pub struct Pipeline<'a> {
    fetcher: &'a dyn SourceFetcher,
    splitter: &'a Splitter<'a>,
    uploader: &'a Uploader<'a>,
    reporter: &'a dyn Reporter,
    download_dir: &'a Path,
    workers: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        fetcher: &'a dyn SourceFetcher,
        splitter: &'a Splitter<'a>,
        uploader: &'a Uploader<'a>,
        reporter: &'a dyn Reporter,
        download_dir: &'a Path,
        workers: usize,
    ) -> Self {
        Self {
            fetcher,
            splitter,
            uploader,
            reporter,
            download_dir,
            workers: workers.max(1),
        }
    }

    /// Process every job in input order and aggregate the outcome.
    ///
    /// Returns an error only for batch-level input problems; per-job
    /// failures are collected in the returned [`BatchResult`].
    pub fn run(&self, jobs: Vec<DownloadJob>, service_name: &str) -> Result<BatchResult> {
        if jobs.is_empty() {
            return bail("No jobs to process");
        }

        let total = jobs.len();
        let mut result = BatchResult::new(service_name, total);

        // A blank URL only fails its own job; a malformed non-blank URL
        // means the whole input is suspect
        let mut outcomes: Vec<(usize, Option<String>)> = Vec::with_capacity(total);
        let mut queue: Vec<(usize, DownloadJob)> = Vec::with_capacity(total);
        for (idx, job) in jobs.into_iter().enumerate() {
            if job.source_url.trim().is_empty() {
                self.reporter.line(&format!(
                    "⚠️ Skipping [{}/{total}]: no source URL for '{}'",
                    idx + 1,
                    job.display_name
                ));
                outcomes.push((idx, Some(format!("Missing URL for {}", job.display_name))));
                continue;
            }
            let scheme_ok = url::Url::parse(&job.source_url)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !scheme_ok {
                return bail(format!(
                    "Invalid source URL (only http/https is supported): {}",
                    job.source_url
                ));
            }
            queue.push((idx, job));
        }

        let workers = self.workers.min(queue.len().max(1));
        info!("Processing {total} job(s) for {service_name} with {workers} worker(s)");

        // Workers pull jobs from a shared channel; per-job ordering lives
        // inside `process`, aggregation stays on this thread.
        let (job_tx, job_rx) = unbounded::<(usize, DownloadJob)>();
        let (res_tx, res_rx) = unbounded::<(usize, Option<String>)>();

        std::thread::scope(|scope| {
            for worker_id in 0..workers {
                let job_rx = job_rx.clone();
                let res_tx = res_tx.clone();
                std::thread::Builder::new()
                    .name(format!("job-worker-{worker_id}"))
                    .spawn_scoped(scope, move || {
                        for (idx, job) in job_rx.iter() {
                            let failed = self.process_guarded(idx, total, &job);
                            // The receiver outlives every worker
                            res_tx
                                .send((idx, failed))
                                .expect("Result receiver dropped");
                        }
                    })
                    .expect("Could not spawn worker thread");
            }
            drop(job_rx);
            drop(res_tx);

            for entry in queue {
                job_tx.send(entry).expect("Job queue closed early");
            }
            drop(job_tx);

            outcomes.extend(res_rx.iter());
        });

        // Failures are re-ordered to input order before recording
        outcomes.sort_by_key(|(idx, _)| *idx);
        for (_, failed) in outcomes {
            if let Some(source) = failed {
                result.record_failure(&source);
            }
        }

        self.reporter.line(&result.summary());
        match result.write_failed(self.download_dir) {
            Ok(Some(path)) => self
                .reporter
                .line(&format!("List saved to {}", path.display())),
            Ok(None) => {}
            Err(err) => error!("Could not persist the failed source list: {err}"),
        }

        Ok(result)
    }

    /// Job boundary: nothing thrown inside one job may take down the
    /// batch loop. Returns the failed source URL, if any.
    fn process_guarded(&self, idx: usize, total: usize, job: &DownloadJob) -> Option<String> {
        match catch_unwind(AssertUnwindSafe(|| self.process(idx, total, job))) {
            Ok(Ok(())) => None,
            Ok(Err(_)) => {
                // Status lines were already emitted at the failure point
                Some(job.source_url.clone())
            }
            Err(_) => {
                self.reporter.line(&format!(
                    "🚨 Unexpected error while processing {}",
                    job.source_url
                ));
                Some(job.source_url.clone())
            }
        }
    }

    fn process(&self, idx: usize, total: usize, job: &DownloadJob) -> Result<()> {
        let name = &job.display_name;
        self.reporter
            .line(&format!("⬇️ [{}/{total}] Downloading: {name}", idx + 1));

        let mut handle = self.reporter.transfer(&format!("⬇️ {name}"));
        let fetched = {
            let mut on_progress = |p| handle.report(p);
            self.fetcher.fetch(job, self.download_dir, &mut on_progress)
        };
        let path = match fetched {
            Ok(path) => {
                handle.done(&format!("✅ DL OK: {name}"));
                path
            }
            Err(err) => {
                handle.failed(&format!("❌ DL Fail: {name}\n{err}"));
                return Err(err);
            }
        };

        let outcome = match self
            .splitter
            .split_if_needed(&path, self.uploader.policy().mode)
        {
            Ok(outcome) => {
                if outcome.is_split() {
                    self.reporter.line(&format!(
                        "✂️ '{name}' split into {} segments",
                        outcome.artifacts().len()
                    ));
                }
                outcome
            }
            Err(Error::CannotSplit(reason)) => {
                self.reporter
                    .line(&format!("✂️❌ Cannot split '{name}': {reason}"));
                return Err(Error::CannotSplit(reason));
            }
            Err(err) => {
                self.reporter
                    .line(&format!("❌ Splitting failed for '{name}': {err}"));
                return Err(err);
            }
        };

        for artifact in outcome.artifacts() {
            let caption = artifact.caption(name);
            let mut handle = self.reporter.transfer(&format!("⏫ {caption}"));
            if !self.uploader.upload(artifact, &caption, handle.as_mut()) {
                // Later segments of an incomplete split are useless to the
                // viewer; leave everything on disk for the operator
                warn!("Upload failed for '{caption}', skipping remaining segments");
                return Err(err_msg(format!("Upload failed for '{caption}'")));
            }
        }

        if self.uploader.policy().delete_after_upload {
            cleanup(&outcome);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use crate::outside::{MediaInfo, StreamSplitter};
    use crate::report::ProgressHandle;
    use crate::transport::{SendError, SendRequest, Transport};
    use crate::types::{AuthBag, Progress, UploadMode};
    use crate::upload::UploadPolicy;

    use super::*;

    /// Fetcher that materializes `content_size` zero bytes per job,
    /// failing or panicking on marked URLs
    #[derive(Debug)]
    struct FakeFetcher {
        content_size: usize,
        fail_marker: Option<&'static str>,
        panic_marker: Option<&'static str>,
    }

    impl FakeFetcher {
        fn of_size(content_size: usize) -> Self {
            Self {
                content_size,
                fail_marker: None,
                panic_marker: None,
            }
        }
    }

    impl SourceFetcher for FakeFetcher {
        fn fetch(
            &self,
            job: &DownloadJob,
            dest_dir: &Path,
            on_progress: &mut dyn FnMut(Progress),
        ) -> Result<PathBuf> {
            if let Some(marker) = self.panic_marker {
                if job.source_url.contains(marker) {
                    panic!("fetcher exploded");
                }
            }
            if let Some(marker) = self.fail_marker {
                if job.source_url.contains(marker) {
                    return bail("simulated network failure");
                }
            }
            std::fs::create_dir_all(dest_dir)?;
            let path = dest_dir.join(&job.display_name);
            std::fs::write(&path, vec![0u8; self.content_size])?;
            on_progress(Progress {
                bytes_done: self.content_size as u64,
                bytes_total: self.content_size as u64,
            });
            Ok(path)
        }
    }

    /// Splitter tool that cuts the file into fixed-size fake segments
    #[derive(Debug)]
    struct FixedTool {
        segment_sizes: Vec<u64>,
    }

    impl StreamSplitter for FixedTool {
        fn probe(&self, _input: &Path) -> Result<MediaInfo> {
            Ok(MediaInfo {
                duration_secs: 1000.0,
                bit_rate: Some(80),
            })
        }

        fn segment(&self, input: &Path, out_dir: &Path, _segment_secs: u64) -> Result<()> {
            let stem = input.file_stem().unwrap().to_string_lossy().into_owned();
            let ext = input.extension().unwrap().to_string_lossy().into_owned();
            for (i, size) in self.segment_sizes.iter().enumerate() {
                let name = format!("{stem}.part{:03}.{ext}", i + 1);
                std::fs::write(out_dir.join(name), vec![0u8; *size as usize])?;
            }
            Ok(())
        }
    }

    /// Tool for batches that must never reach the split path
    #[derive(Debug)]
    struct UnreachableTool;

    impl StreamSplitter for UnreachableTool {
        fn probe(&self, _input: &Path) -> Result<MediaInfo> {
            bail("probe must not be called")
        }

        fn segment(&self, _input: &Path, _out_dir: &Path, _secs: u64) -> Result<()> {
            bail("segment must not be called")
        }
    }

    #[derive(Debug, Default)]
    struct RecordingTransport {
        captions: Mutex<Vec<String>>,
        fail_caption_marker: Option<&'static str>,
    }

    impl Transport for RecordingTransport {
        fn send(
            &self,
            request: &SendRequest<'_>,
            _on_progress: &mut dyn FnMut(Progress),
        ) -> std::result::Result<(), SendError> {
            self.captions
                .lock()
                .unwrap()
                .push(request.caption.to_string());
            if let Some(marker) = self.fail_caption_marker {
                if request.caption.contains(marker) {
                    return Err(SendError::Other(miette::miette!("send refused")));
                }
            }
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct SilentReporter;

    struct SilentHandle;

    impl ProgressHandle for SilentHandle {
        fn report(&mut self, _progress: Progress) {}
        fn done(&mut self, _note: &str) {}
        fn failed(&mut self, _reason: &str) {}
    }

    impl Reporter for SilentReporter {
        fn line(&self, _text: &str) {}
        fn transfer(&self, _label: &str) -> Box<dyn ProgressHandle> {
            Box::new(SilentHandle)
        }
    }

    fn job(url: &str, name: &str) -> DownloadJob {
        DownloadJob::new(url, name, AuthBag::default())
    }

    fn policy(mode: UploadMode, delete: bool) -> UploadPolicy {
        UploadPolicy {
            enabled: true,
            mode,
            delete_after_upload: delete,
            destination: None,
            thumbnail_url: None,
        }
    }

    #[test]
    fn empty_batch_is_rejected_upfront() {
        let fetcher = FakeFetcher::of_size(1);
        let tool = UnreachableTool;
        let splitter = Splitter::new(&tool);
        let transport = RecordingTransport::default();
        let uploader = Uploader::new(&transport, policy(UploadMode::Document, false));
        let reporter = SilentReporter;
        let dir = tempfile::tempdir().unwrap();

        let pipeline = Pipeline::new(&fetcher, &splitter, &uploader, &reporter, dir.path(), 1);
        assert!(pipeline.run(Vec::new(), "svc").is_err());
    }

    #[test]
    fn non_http_source_rejects_the_whole_batch() {
        let fetcher = FakeFetcher::of_size(1);
        let tool = UnreachableTool;
        let splitter = Splitter::new(&tool);
        let transport = RecordingTransport::default();
        let uploader = Uploader::new(&transport, policy(UploadMode::Document, false));
        let reporter = SilentReporter;
        let dir = tempfile::tempdir().unwrap();

        let pipeline = Pipeline::new(&fetcher, &splitter, &uploader, &reporter, dir.path(), 1);
        let jobs = vec![job("https://ok/1.bin", "1.bin"), job("ftp://x", "2.bin")];
        assert!(pipeline.run(jobs, "svc").is_err());
        assert!(transport.captions.lock().unwrap().is_empty());
    }

    #[test]
    fn blank_url_skips_that_job_with_a_failure_record() {
        let fetcher = FakeFetcher::of_size(4);
        let tool = UnreachableTool;
        let splitter = Splitter::new(&tool);
        let transport = RecordingTransport::default();
        let uploader = Uploader::new(&transport, policy(UploadMode::Document, false));
        let reporter = SilentReporter;
        let dir = tempfile::tempdir().unwrap();

        let pipeline = Pipeline::new(&fetcher, &splitter, &uploader, &reporter, dir.path(), 1);
        let jobs = vec![job("", "nameless.bin"), job("https://host/ok.bin", "ok.bin")];
        let result = pipeline.run(jobs, "svc").unwrap();

        assert_eq!(result.failed_sources, ["Missing URL for nameless.bin"]);
        assert_eq!(transport.captions.lock().unwrap().as_slice(), &["ok.bin"]);
    }

    #[test]
    fn one_failing_job_does_not_block_the_rest() {
        let fetcher = FakeFetcher {
            content_size: 8,
            fail_marker: Some("job2"),
            panic_marker: None,
        };
        let tool = UnreachableTool;
        let splitter = Splitter::new(&tool);
        let transport = RecordingTransport::default();
        let uploader = Uploader::new(&transport, policy(UploadMode::Document, false));
        let reporter = SilentReporter;
        let dir = tempfile::tempdir().unwrap();

        let pipeline = Pipeline::new(&fetcher, &splitter, &uploader, &reporter, dir.path(), 1);
        let jobs = vec![
            job("https://host/job1.bin", "job1.bin"),
            job("https://host/job2.bin", "job2.bin"),
            job("https://host/job3.bin", "job3.bin"),
        ];
        let result = pipeline.run(jobs, "svc").unwrap();

        assert_eq!(result.failed_sources, ["https://host/job2.bin"]);
        assert_eq!(
            transport.captions.lock().unwrap().as_slice(),
            &["job1.bin", "job3.bin"]
        );
    }

    #[test]
    fn a_panicking_job_is_converted_to_a_failure_record() {
        let fetcher = FakeFetcher {
            content_size: 8,
            fail_marker: None,
            panic_marker: Some("boom"),
        };
        let tool = UnreachableTool;
        let splitter = Splitter::new(&tool);
        let transport = RecordingTransport::default();
        let uploader = Uploader::new(&transport, policy(UploadMode::Document, false));
        let reporter = SilentReporter;
        let dir = tempfile::tempdir().unwrap();

        let pipeline = Pipeline::new(&fetcher, &splitter, &uploader, &reporter, dir.path(), 1);
        let jobs = vec![
            job("https://host/boom.bin", "boom.bin"),
            job("https://host/fine.bin", "fine.bin"),
        ];
        let result = pipeline.run(jobs, "svc").unwrap();

        assert_eq!(result.failed_sources, ["https://host/boom.bin"]);
        assert_eq!(transport.captions.lock().unwrap().as_slice(), &["fine.bin"]);
    }

    #[test]
    fn failed_batches_persist_the_failure_list() {
        let fetcher = FakeFetcher {
            content_size: 8,
            fail_marker: Some("job1"),
            panic_marker: None,
        };
        let tool = UnreachableTool;
        let splitter = Splitter::new(&tool);
        let transport = RecordingTransport::default();
        let uploader = Uploader::new(&transport, policy(UploadMode::Document, false));
        let reporter = SilentReporter;
        let dir = tempfile::tempdir().unwrap();

        let pipeline = Pipeline::new(&fetcher, &splitter, &uploader, &reporter, dir.path(), 1);
        let jobs = vec![job("https://host/job1.bin", "job1.bin")];
        pipeline.run(jobs, "svc").unwrap();

        let listing =
            std::fs::read_to_string(dir.path().join("failed_downloads_svc.txt")).unwrap();
        assert_eq!(
            listing,
            "# Failed source URLs for svc\nhttps://host/job1.bin\n"
        );
    }

    #[test]
    fn split_job_uploads_segments_in_order_and_cleans_up() {
        let fetcher = FakeFetcher::of_size(30);
        let tool = FixedTool {
            segment_sizes: vec![12, 12, 6],
        };
        let splitter = Splitter::with_limits(&tool, 20, 16);
        let transport = RecordingTransport::default();
        let uploader = Uploader::new(&transport, policy(UploadMode::Video, true));
        let reporter = SilentReporter;
        let dir = tempfile::tempdir().unwrap();

        let pipeline = Pipeline::new(&fetcher, &splitter, &uploader, &reporter, dir.path(), 1);
        let jobs = vec![job("https://host/Movie.mkv", "Movie.mkv")];
        let result = pipeline.run(jobs, "svc").unwrap();

        assert!(result.is_success());
        assert_eq!(
            transport.captions.lock().unwrap().as_slice(),
            &[
                "Movie.mkv (Part 1/3)",
                "Movie.mkv (Part 2/3)",
                "Movie.mkv (Part 3/3)"
            ]
        );
        // Cleanup invariant: nothing remains on disk
        assert!(!dir.path().join("Movie.mkv").exists());
        assert!(!dir.path().join("Movie.mkv_parts").exists());
    }

    #[test]
    fn first_failed_segment_skips_the_rest_and_keeps_artifacts() {
        let fetcher = FakeFetcher::of_size(30);
        let tool = FixedTool {
            segment_sizes: vec![12, 12, 6],
        };
        let splitter = Splitter::with_limits(&tool, 20, 16);
        let transport = RecordingTransport {
            captions: Mutex::new(Vec::new()),
            fail_caption_marker: Some("Part 2"),
        };
        let uploader = Uploader::new(&transport, policy(UploadMode::Video, true));
        let reporter = SilentReporter;
        let dir = tempfile::tempdir().unwrap();

        let pipeline = Pipeline::new(&fetcher, &splitter, &uploader, &reporter, dir.path(), 1);
        let jobs = vec![job("https://host/Movie.mkv", "Movie.mkv")];
        let result = pipeline.run(jobs, "svc").unwrap();

        assert_eq!(result.failed_sources, ["https://host/Movie.mkv"]);
        assert_eq!(
            transport.captions.lock().unwrap().as_slice(),
            &["Movie.mkv (Part 1/3)", "Movie.mkv (Part 2/3)"]
        );
        // Failed jobs leave their remnants for the operator; only the
        // already-delivered first segment was removed by the uploader
        assert!(dir.path().join("Movie.mkv").exists());
        let parts_dir = dir.path().join("Movie.mkv_parts");
        assert!(parts_dir.join("Movie.part002.mkv").exists());
        assert!(parts_dir.join("Movie.part003.mkv").exists());
    }

    #[test]
    fn oversized_non_video_is_a_distinct_failure() {
        let fetcher = FakeFetcher::of_size(30);
        let tool = UnreachableTool;
        let splitter = Splitter::with_limits(&tool, 20, 16);
        let transport = RecordingTransport::default();
        let uploader = Uploader::new(&transport, policy(UploadMode::Document, false));
        let reporter = SilentReporter;
        let dir = tempfile::tempdir().unwrap();

        let pipeline = Pipeline::new(&fetcher, &splitter, &uploader, &reporter, dir.path(), 1);
        let jobs = vec![job("https://host/huge.iso", "huge.iso")];
        let result = pipeline.run(jobs, "svc").unwrap();

        assert_eq!(result.failed_sources, ["https://host/huge.iso"]);
        assert!(transport.captions.lock().unwrap().is_empty());
    }

    #[test]
    fn worker_pool_processes_every_job() {
        let fetcher = FakeFetcher {
            content_size: 8,
            fail_marker: Some("bad"),
            panic_marker: None,
        };
        let tool = UnreachableTool;
        let splitter = Splitter::new(&tool);
        let transport = RecordingTransport::default();
        let uploader = Uploader::new(&transport, policy(UploadMode::Document, false));
        let reporter = SilentReporter;
        let dir = tempfile::tempdir().unwrap();

        let pipeline = Pipeline::new(&fetcher, &splitter, &uploader, &reporter, dir.path(), 4);
        let jobs: Vec<_> = (0..10)
            .map(|i| {
                if i == 3 || i == 7 {
                    job(&format!("https://host/bad{i}.bin"), &format!("bad{i}.bin"))
                } else {
                    job(&format!("https://host/ok{i}.bin"), &format!("ok{i}.bin"))
                }
            })
            .collect();
        let result = pipeline.run(jobs, "svc").unwrap();

        // Failures come back in input order even with concurrent workers
        assert_eq!(
            result.failed_sources,
            ["https://host/bad3.bin", "https://host/bad7.bin"]
        );
        assert_eq!(transport.captions.lock().unwrap().len(), 8);
    }
}
