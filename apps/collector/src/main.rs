mod cli;
mod config;
mod transcript;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use logcollector_session::{CollectionSession, StopReason};
use logcollector_status::STATUS_QUEUE_CAPACITY;
use logcollector_tail::LogFilter;

use cli::Cli;
use config::CollectorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the transcript; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,logcollector=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => CollectorConfig::load_from(path)?,
        None => CollectorConfig::load().unwrap_or_default(),
    };
    cli.apply(&mut config);

    if cli.remember {
        config
            .save()
            .with_context(|| format!("saving {}", config.file_path().display()))?;
    }

    if let Some(path) = &config.log_file {
        let filter = LogFilter;
        if !filter.accept(path) {
            warn!(
                path = %path.display(),
                expected = filter.description(),
                "log file does not match the usual filter"
            );
        }
    }

    let (status, drain) =
        logcollector_status::channel(STATUS_QUEUE_CAPACITY, config.status_overflow);
    let renderer = tokio::spawn(transcript::render(drain, tokio::io::stdout()));

    let cancel = CancellationToken::new();
    let session = CollectionSession::with_cancel(config.session_config(), status, &cancel);

    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping");
                cancel.cancel();
            }
        })
    };

    let result = session.run().await;

    // The session owned the last sink, so the renderer sees the queue close.
    ctrl_c.abort();
    match renderer.await {
        Ok(Err(e)) => warn!(error = %e, "transcript output failed"),
        Err(e) => warn!(error = %e, "transcript task failed"),
        Ok(Ok(_)) => {}
    }

    let summary = result.context("collection session failed")?;
    info!(
        peer = %summary.peer,
        lines = summary.tail.lines,
        batches = summary.tail.batches,
        bytes_in = summary.bytes_in,
        bytes_out = summary.bytes_out,
        "collection finished"
    );
    match summary.stop {
        StopReason::Cancelled => Ok(()),
        StopReason::ServerClosed => anyhow::bail!("server closed the connection"),
        StopReason::ServerError(e) => anyhow::bail!("lost connection to server: {e}"),
    }
}
