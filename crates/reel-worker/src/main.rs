//! Render worker binary.
//!
//! Usage: `reel-worker <manifest.json>`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_client::{
    CloudRenderClient, LibraryClient, LibraryConfig, ReviewClient, StagingClient, StagingConfig,
};
use reel_media::{
    cancel_pair, BatchPreprocessor, ClipPreprocessor, FfmpegTranscoder, HttpSourceFetcher,
    LocalRenderer, LocalSourceFetcher, PreprocessOptions, RoutingSourceFetcher,
};
use reel_worker::{
    metrics, Manifest, OrchestratorSettings, RenderOrchestrator, RenderPipeline, ReviewController,
    ReviewSettings, WorkerConfig,
};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reel_worker=info,reel_media=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

fn build_pipeline(config: &WorkerConfig) -> anyhow::Result<RenderPipeline> {
    let transcoder = Arc::new(FfmpegTranscoder);

    let mut http = HttpSourceFetcher::new(DOWNLOAD_TIMEOUT)?;
    if let Some(base) = &config.source_base_url {
        http = http.with_base_url(base.clone());
    }
    let fetcher = Arc::new(RoutingSourceFetcher::new(http, LocalSourceFetcher::new()));

    let preprocessor = ClipPreprocessor::new(
        fetcher,
        transcoder.clone(),
        PreprocessOptions::default()
            .with_work_dir(&config.work_dir)
            .with_timeout(config.transcode_timeout),
    );

    let local = LocalRenderer::new(transcoder, &config.output_dir).with_timeout(config.render_timeout);
    let mut orchestrator =
        RenderOrchestrator::new(OrchestratorSettings::from_config(config)).with_local(Arc::new(local));

    let cloud_enabled = std::env::var("CLOUD_RENDER_URL").is_ok();
    if cloud_enabled {
        let cloud = CloudRenderClient::from_env().context("cloud render client")?;
        orchestrator = orchestrator.with_cloud(Arc::new(cloud));
        info!("Cloud render backend enabled");
    }
    if let Some(library) = LibraryConfig::from_env() {
        orchestrator = orchestrator.with_library(Arc::new(LibraryClient::new(library)?));
        info!("Library persistence enabled");
    }

    let orchestrator = Arc::new(orchestrator);
    let mut pipeline = RenderPipeline::new(
        BatchPreprocessor::new(preprocessor),
        orchestrator.clone(),
        config.job_timeout,
    );

    match StagingConfig::from_env() {
        Some(staging) => {
            let stager = StagingClient::new(staging).context("staging client")?;
            pipeline = pipeline.with_stager(Arc::new(stager));
            info!("Clip staging enabled");
        }
        None if cloud_enabled => warn!("STAGING_URL not set, cloud targets will fail"),
        None => {}
    }

    if std::env::var("REVIEWER_URL").is_ok() {
        let reviewer = ReviewClient::from_env().context("review client")?;
        pipeline = pipeline.with_reviews(ReviewController::new(
            orchestrator,
            Arc::new(reviewer),
            ReviewSettings::from_config(config),
        ));
        info!("Automatic review enabled");
    } else {
        warn!("REVIEWER_URL not set, renders will not be reviewed");
    }

    Ok(pipeline)
}

async fn run() -> anyhow::Result<bool> {
    let manifest_path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: reel-worker <manifest.json>"))?;
    let manifest = Manifest::load(&manifest_path)
        .await
        .with_context(|| format!("loading {manifest_path}"))?;

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Ok(addr) = std::env::var("METRICS_LISTEN_ADDR") {
        let addr: SocketAddr = addr.parse().context("METRICS_LISTEN_ADDR")?;
        metrics::init_metrics(addr)?;
        info!(%addr, "Metrics listener started");
    }

    let pipeline = build_pipeline(&config)?;

    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling");
            cancel_handle.cancel();
        }
    });

    let report = pipeline.run(&manifest, &cancel).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.all_succeeded() {
        warn!(failed = report.failed_count(), "Some targets failed");
    }
    Ok(report.all_succeeded())
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting reel-worker");

    match run().await {
        Ok(true) => info!("Worker finished"),
        Ok(false) => std::process::exit(2),
        Err(e) => {
            error!("Worker failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
