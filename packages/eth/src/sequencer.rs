use alloy::{
    primitives::B256,
    providers::{Provider, RootProvider},
    transports::RpcError,
};
use async_trait::async_trait;
use metrics::{
    prometheus::core::Collector, ConnectionHealthTracker, HealthChecker, RegistersMetrics,
};
use services::{ports::sequencer, Error, Result};
use url::Url;

use crate::metrics::SequencerMetrics;

/// JSON-RPC client for the sequencer ingestion endpoint.
#[derive(Clone)]
pub struct SequencerClient {
    provider: RootProvider,
    metrics: SequencerMetrics,
    health_tracker: ConnectionHealthTracker,
}

impl SequencerClient {
    #[must_use]
    pub fn new(url: &Url, unhealthy_after_n_errors: usize) -> Self {
        Self {
            provider: RootProvider::new_http(url.clone()),
            metrics: SequencerMetrics::default(),
            health_tracker: ConnectionHealthTracker::new(unhealthy_after_n_errors),
        }
    }

    #[must_use]
    pub fn connection_health_checker(&self) -> HealthChecker {
        self.health_tracker.tracker()
    }

    fn handle_network_error(&self) {
        self.health_tracker.note_failure();
        self.metrics.sequencer_network_errors.inc();
    }

    fn handle_network_success(&self) {
        self.health_tracker.note_success();
    }
}

#[async_trait]
impl sequencer::Api for SequencerClient {
    async fn send_raw_transaction(&self, encoded: &str) -> Result<()> {
        let response: std::result::Result<B256, _> = self
            .provider
            .client()
            .request("eth_sendRawTransaction", (encoded.to_string(),))
            .await;

        match response {
            Ok(_) => {
                self.handle_network_success();
                Ok(())
            }
            // The sequencer answered, and the answer is a rejection carrying
            // its own message.
            Err(RpcError::ErrorResp(payload)) => {
                self.handle_network_success();
                Err(Error::Other(payload.message.to_string()))
            }
            Err(e) => {
                self.handle_network_error();
                Err(Error::Network(e.to_string()))
            }
        }
    }
}

impl RegistersMetrics for SequencerClient {
    fn metrics(&self) -> Vec<Box<dyn Collector>> {
        self.metrics.metrics()
    }
}
