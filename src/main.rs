mod audio;
mod cli;
mod config;
mod error;
mod model;
mod pipeline;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use audio::StftAnalysis;
use cli::Cli;
use model::Classifier;
use pipeline::{ClassificationReport, Pipeline};
use server::{AppState, RouterOptions};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Config applies only where the CLI is still at its default
    let config_path = cli.config.clone().or_else(config::find_config);
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            if cli.host == config::default_host() { cli.host = cfg.server.host; }
            if cli.port == config::default_port() { cli.port = cfg.server.port; }
            if cli.max_upload_mb == config::default_max_upload_mb() {
                cli.max_upload_mb = cfg.server.max_upload_mb;
            }
            if !cli.no_cors { cli.no_cors = !cfg.server.cors; }
            if cli.model == config::default_model_path() { cli.model = cfg.model.path; }
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    let pipeline = Arc::new(Pipeline::new(Arc::new(StftAnalysis::new())));

    if cli.serve {
        return run_server(&cli, pipeline).await;
    }

    if cli.inputs.is_empty() {
        anyhow::bail!("No input files given. Pass audio files to classify, or --serve to start the API.");
    }
    run_offline(&cli, pipeline).await
}

async fn run_server(cli: &Cli, pipeline: Arc<Pipeline>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", cli.host, cli.port))?;

    log::info!("genrelens - music genre classifier");
    log::info!("Model: {}", cli.model);

    let state = AppState {
        pipeline,
        classifier: model::lazy_handle(cli.model.clone()),
        max_upload_bytes: cli.max_upload_mb * 1024 * 1024,
    };
    let options = RouterOptions { cors: !cli.no_cors };
    server::serve(state, options, addr).await
}

async fn run_offline(cli: &Cli, pipeline: Arc<Pipeline>) -> Result<()> {
    for input in &cli.inputs {
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
    }

    log::info!("Loading model {}...", cli.model);
    let model_ref = cli.model.clone();
    let classifier = tokio::task::spawn_blocking(move || model::load_classifier(&model_ref))
        .await
        .context("Model loader task failed")??;

    let pb = ProgressBar::new(cli.inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files ({eta} remaining) {msg}")?
            .progress_chars("=>-"),
    );

    let mut failures = 0usize;
    for input in &cli.inputs {
        pb.set_message(input.display().to_string());
        match classify_path(&pipeline, &classifier, input.clone()).await {
            Ok(report) => {
                let text = if cli.json {
                    serde_json::to_string_pretty(&report)?
                } else {
                    summary(input, &report, cli.segments)
                };
                pb.suspend(|| println!("{}", text));
            }
            Err(e) => {
                failures += 1;
                pb.suspend(|| eprintln!("{}: {:#}", input.display(), e));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if failures > 0 {
        anyhow::bail!("{} of {} file(s) failed", failures, cli.inputs.len());
    }
    Ok(())
}

async fn classify_path(
    pipeline: &Arc<Pipeline>,
    classifier: &Arc<dyn Classifier>,
    path: PathBuf,
) -> Result<ClassificationReport> {
    let pipeline = pipeline.clone();
    let classifier = classifier.clone();
    let report = tokio::task::spawn_blocking(move || {
        pipeline.classify_file(&path, classifier.as_ref())
    })
    .await
    .context("Classification task failed")??;
    Ok(report)
}

fn summary(path: &std::path::Path, report: &ClassificationReport, per_segment: bool) -> String {
    let mut out = format!(
        "{} ({:.1}s, {} segment(s), {:.0}ms)\n",
        path.display(),
        report.audio_info.duration,
        report.audio_info.num_segments,
        report.prediction.processing_time
    );
    for p in &report.prediction.predictions {
        out.push_str(&format!("  {:<10} {:5.1}%\n", p.genre.label(), p.confidence * 100.0));
    }
    out.push_str(&format!("  tempo      {:.0} BPM\n", report.visualization.tempo));

    if per_segment {
        for (i, ranked) in report.segment_predictions.iter().enumerate() {
            if let Some(top) = ranked.first() {
                out.push_str(&format!(
                    "  segment {:>3} [{:>6.1}s] {:<10} {:5.1}%\n",
                    i,
                    (i * pipeline::SEGMENT_SECONDS) as f32,
                    top.genre.label(),
                    top.confidence * 100.0
                ));
            }
        }
    }
    out.trim_end().to_string()
}
