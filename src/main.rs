use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use osprobe::adapters::{inventory, OsProbe, ProbeConfig, PushgatewayClient, StatCache};
use osprobe::application::{
    push_rounds, MetricsExporter, PollRoundExecutor, RoundCompletion, Scheduler,
};
use osprobe::config::{usage_exit, PollerArgs};
use osprobe::error::TransportError;
use osprobe::interface::http::{create_router, AppState};
use osprobe::logging;
use osprobe::ports::MetricSink;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const ONLINE_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = match PollerArgs::parse().validate() {
        Ok(config) => config,
        Err(e) => usage_exit::<PollerArgs>(&e),
    };

    logging::init(&config.log_level);

    info!("Starting osprobe v{}", env!("CARGO_PKG_VERSION"));
    info!(
        targets = %config.targets.display(),
        interval_secs = config.interval.as_secs(),
        push = config.push_url.is_some(),
        listen = config.listen.as_deref().unwrap_or("-"),
        "Configuration loaded"
    );

    let targets = inventory::load_targets(&config.targets)?;
    if targets.is_empty() {
        warn!("No valid servers in {}, rounds will be empty", config.targets.display());
    }

    let cache = Arc::new(StatCache::new());
    let probe = Arc::new(OsProbe::new(ProbeConfig::new(
        ONLINE_TIMEOUT.min(config.probe_timeout),
        config.probe_timeout,
    )));
    let executor = PollRoundExecutor::new(targets.clone(), probe, Arc::clone(&cache))
        .with_max_concurrency(config.max_concurrency);
    let exporter = Arc::new(MetricsExporter::new(cache, &targets));

    if let Some(addr) = &config.listen {
        let state = AppState::new(Arc::clone(&exporter))?;
        let listener = TcpListener::bind(addr).await?;
        info!("Serving metrics on http://{}/metrics", addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, create_router(state)).await {
                error!(error = %e, "Metrics server stopped");
            }
        });
    }

    let sink = match config.push_url.as_deref() {
        Some(url) => {
            let client = PushgatewayClient::new(url, &config.job)?;
            info!("Pushing to {}", client.job_url());
            Some(Arc::new(client))
        }
        None => None,
    };

    let (completions_tx, completions_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let scheduler = Scheduler::new(executor, config.interval);
    let mut scheduler_task = tokio::spawn(scheduler.run(completions_tx, async move {
        let _ = stop_rx.await;
    }));

    let mut push_task = match &sink {
        Some(sink) => tokio::spawn(push_rounds(
            Arc::clone(&exporter),
            Arc::clone(sink) as Arc<dyn MetricSink>,
            completions_rx,
        )),
        None => tokio::spawn(drain(completions_rx)),
    };

    let outcome: Result<(), BoxError> = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
        joined = &mut push_task => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(error = %e, "Push failed, exiting");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        },
        _ = &mut scheduler_task => Ok(()),
    };

    let _ = stop_tx.send(());
    scheduler_task.abort();
    push_task.abort();

    if let Some(sink) = sink {
        match sink.delete().await {
            Ok(()) => info!("Deleted metrics group {}", sink.job_url()),
            Err(e) => error!(
                error = %e,
                "Failed to delete metrics group, remove it by hand: curl -X DELETE {}",
                sink.job_url()
            ),
        }
    }

    info!("osprobe stopped");
    outcome
}

/// Pull-only mode: nobody consumes completions except the log
async fn drain(mut completions: mpsc::Receiver<RoundCompletion>) -> Result<(), TransportError> {
    while let Some(completion) = completions.recv().await {
        debug!(round = completion.round, targets = completion.targets, "Round complete");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
