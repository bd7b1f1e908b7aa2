use alloy::{
    primitives::B256,
    providers::{Provider, RootProvider},
};
use async_trait::async_trait;
use metrics::{
    prometheus::core::Collector, ConnectionHealthTracker, HealthChecker, RegistersMetrics,
};
use services::{ports::l2, types::TransactionReceipt, Error, Result};
use url::Url;

use crate::metrics::L2NodeMetrics;

/// JSON-RPC client used to look up transaction receipts on the L2 node.
#[derive(Clone)]
pub struct L2NodeClient {
    provider: RootProvider,
    metrics: L2NodeMetrics,
    health_tracker: ConnectionHealthTracker,
}

impl L2NodeClient {
    #[must_use]
    pub fn new(url: &Url, unhealthy_after_n_errors: usize) -> Self {
        Self {
            provider: RootProvider::new_http(url.clone()),
            metrics: L2NodeMetrics::default(),
            health_tracker: ConnectionHealthTracker::new(unhealthy_after_n_errors),
        }
    }

    #[must_use]
    pub fn connection_health_checker(&self) -> HealthChecker {
        self.health_tracker.tracker()
    }

    fn handle_network_error(&self) {
        self.health_tracker.note_failure();
        self.metrics.l2_node_network_errors.inc();
    }

    fn handle_network_success(&self) {
        self.health_tracker.note_success();
    }
}

#[async_trait]
impl l2::Api for L2NodeClient {
    async fn transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>> {
        let tx_hash: B256 = hash
            .parse()
            .map_err(|e| Error::Other(format!("invalid transaction hash {hash}: {e}")))?;

        match self.provider.get_transaction_receipt(tx_hash).await {
            // A missing receipt is a normal answer, not a failure.
            Ok(receipt) => {
                self.handle_network_success();
                Ok(receipt.map(|receipt| TransactionReceipt::new(receipt.status())))
            }
            Err(e) => {
                self.handle_network_error();
                Err(Error::Network(e.to_string()))
            }
        }
    }
}

impl RegistersMetrics for L2NodeClient {
    fn metrics(&self) -> Vec<Box<dyn Collector>> {
        self.metrics.metrics()
    }
}
