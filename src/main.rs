mod batch;
mod cleanup;
mod cli;
mod config;
mod fetch;
mod logging;
mod outside;
mod report;
mod result;
mod sanitize;
mod split;
mod transport;
mod types;
mod upload;

use clap::Parser;
use miette::{Context, IntoDiagnostic};
use tracing::{debug, info, Level};

use crate::{
    batch::Pipeline,
    cli::Args,
    config::Settings,
    fetch::HttpFetcher,
    outside::Ffmpeg,
    report::ConsoleReporter,
    split::Splitter,
    transport::CopyTransport,
    upload::{UploadPolicy, Uploader},
};

fn main() -> miette::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    logging::init_logging(level)?;

    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply_to(&mut settings);
    debug!("Effective settings: {settings:?}");

    std::fs::create_dir_all(&settings.download_dir)
        .into_diagnostic()
        .wrap_err("Could not create download directory")?;

    let jobs = cli::read_jobs(&args.batch, &args.auth()?)?;
    info!("{} job(s) read from {}", jobs.len(), args.batch.display());

    // Verify the external tools before the first download starts
    let ffmpeg = Ffmpeg::new()?;

    let fetcher = HttpFetcher::new()?;
    let splitter = Splitter::new(&ffmpeg);
    let transport = CopyTransport::new(&settings.upload_dir);
    let uploader = Uploader::new(
        &transport,
        UploadPolicy {
            enabled: settings.upload_enabled,
            mode: settings.upload_mode,
            delete_after_upload: settings.delete_after_upload,
            destination: settings.target_destination,
            thumbnail_url: settings.thumbnail_url.clone(),
        },
    );
    let reporter = ConsoleReporter;

    let pipeline = Pipeline::new(
        &fetcher,
        &splitter,
        &uploader,
        &reporter,
        &settings.download_dir,
        settings.workers,
    );
    let result = pipeline.run(jobs, &args.service)?;

    if result.is_success() {
        info!("All tasks completed");
        Ok(())
    } else {
        Err(miette::miette!(
            "{} source(s) failed, see the failure list",
            result.failed_sources.len()
        ))
    }
}
