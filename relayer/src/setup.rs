use std::{sync::Arc, time::Duration};

use metrics::{HealthChecker, RegistersMetrics, Registry};
use services::{Monitor, ResendReconciler, Runner, Sender};
use storage::Postgres;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    config::{Config, Internal},
    errors::Result,
    L2Node, RelayMonitor, RelaySender, Sequencer,
};

pub fn logger() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_level(true)
        .with_line_number(true)
        .json()
        .init();
}

pub async fn storage(config: &Config) -> Result<Postgres> {
    let postgres = Postgres::connect(&config.db).await?;
    postgres.migrate().await?;

    Ok(postgres)
}

pub fn sequencer_client(
    config: &Config,
    internal_config: &Internal,
    registry: &Registry,
) -> (Sequencer, HealthChecker) {
    let client = eth::SequencerClient::new(
        &config.sender.sequencer_url,
        internal_config.sequencer_errors_before_unhealthy,
    );
    client.register_metrics(registry);

    let health_check = client.connection_health_checker();

    (client, health_check)
}

pub fn l2_node_client(
    config: &Config,
    internal_config: &Internal,
    registry: &Registry,
) -> (L2Node, HealthChecker) {
    let client = eth::L2NodeClient::new(
        &config.monitor.l2_node_url,
        internal_config.l2_node_errors_before_unhealthy,
    );
    client.register_metrics(registry);

    let health_check = client.connection_health_checker();

    (client, health_check)
}

/// Starts the monitor pool and scheduler, then re-enrolls rows that were
/// already forwarded before the last shutdown.
pub fn monitor(
    config: &Config,
    registry: &Registry,
    storage: Postgres,
    l2_node: L2Node,
    cancel_token: CancellationToken,
) -> (Arc<RelayMonitor>, Vec<JoinHandle<()>>) {
    let monitor = Arc::new(Monitor::new(
        services::monitor::Config {
            workers: config.monitor.workers,
            queue_size: config.monitor.queue_size,
            initial_wait_interval: config.monitor.initial_wait_interval,
            retry_wait_interval: config.monitor.retry_wait_interval,
            tx_lifetime_max: config.monitor.tx_life_time_max,
        },
        storage,
        l2_node,
        clock::SystemClock,
    ));
    monitor.register_metrics(registry);

    let handles = monitor.start(cancel_token);

    let recovery = Arc::clone(&monitor);
    tokio::spawn(async move { recovery.resume_monitoring().await });

    (monitor, handles)
}

/// Starts the sender pool, re-drives rows stuck in `pending`, and schedules
/// the resend reconciler.
pub fn sender(
    config: &Config,
    registry: &Registry,
    storage: Postgres,
    sequencer: Sequencer,
    monitor: Arc<RelayMonitor>,
    cancel_token: CancellationToken,
) -> (Arc<RelaySender>, Vec<JoinHandle<()>>) {
    let sender = Arc::new(Sender::new(
        services::sender::Config {
            workers: config.sender.workers,
            queue_size: config.sender.queue_size,
        },
        storage,
        sequencer,
        monitor,
    ));
    sender.register_metrics(registry);

    let mut handles = sender.start(cancel_token.clone());

    let recovery = Arc::clone(&sender);
    tokio::spawn(async move { recovery.resume_pending_transactions().await });

    handles.push(schedule_polling(
        config.sender.resend_txs_check_interval,
        ResendReconciler::new(Arc::clone(&sender)),
        "Resend Reconciler",
        cancel_token,
    ));

    (sender, handles)
}

fn schedule_polling(
    polling_interval: Duration,
    mut runner: impl Runner + 'static,
    name: &'static str,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = runner.run().await {
                error!("{name} encountered an error: {e}");
            }

            if cancel_token.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = tokio::time::sleep(polling_interval) => {}
            }
        }

        info!("{name} stopped");
    })
}

pub async fn shut_down(
    cancel_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    storage: Postgres,
) -> Result<()> {
    cancel_token.cancel();

    for handle in handles {
        handle.await?;
    }

    storage.close().await;
    Ok(())
}
