#![deny(unused_crate_dependencies)]
mod api;
mod config;
mod errors;
mod setup;

use std::sync::Arc;

use errors::{Result, WithContext};
use metrics::Registry;
use tokio_util::sync::CancellationToken;

pub type Database = storage::Postgres;
pub type Sequencer = eth::SequencerClient;
pub type L2Node = eth::L2NodeClient;
pub type RelayMonitor = services::Monitor<Database, L2Node, clock::SystemClock>;
pub type RelaySender = services::Sender<Database, Sequencer, Arc<RelayMonitor>>;

#[tokio::main]
async fn main() -> Result<()> {
    setup::logger();

    let config = config::parse().with_context(|| "failed to parse config")?;
    config
        .validate()
        .with_context(|| "config validation failed")?;

    let metrics_registry = Registry::default();
    let internal_config = config::Internal::default();
    let cancel_token = CancellationToken::new();

    let storage = setup::storage(&config)
        .await
        .with_context(|| "failed to connect to database")?;

    let (l2_node, l2_node_health_check) =
        setup::l2_node_client(&config, &internal_config, &metrics_registry);
    let (monitor, mut handles) = setup::monitor(
        &config,
        &metrics_registry,
        storage.clone(),
        l2_node,
        cancel_token.clone(),
    );

    let (sequencer, sequencer_health_check) =
        setup::sequencer_client(&config, &internal_config, &metrics_registry);
    let (sender, sender_handles) = setup::sender(
        &config,
        &metrics_registry,
        storage.clone(),
        sequencer,
        Arc::clone(&monitor),
        cancel_token.clone(),
    );
    handles.extend(sender_handles);

    api::launch_api_server(
        &config,
        metrics_registry,
        storage.clone(),
        sender,
        sequencer_health_check,
        l2_node_health_check,
    )
    .await
    .with_context(|| "api server")?;

    setup::shut_down(cancel_token, handles, storage).await
}
