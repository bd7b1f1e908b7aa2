use std::sync::Arc;

use metrics::{
    prometheus::{core::Collector, IntCounter, Opts},
    RegistersMetrics,
};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    ports::{sequencer, storage::Storage},
    types::{L2Transaction, TxStatus},
    Error, Result, Runner,
};

#[derive(Debug, Clone)]
pub struct Config {
    /// Number of workers forwarding transactions to the sequencer.
    pub workers: usize,
    /// Capacity of the queue between callers and the workers.
    pub queue_size: usize,
}

/// One-way capability used to hand a successfully forwarded transaction over
/// for receipt monitoring.
#[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
pub trait MonitorHandle: Send + Sync {
    fn add_transaction(&self, l2_tx: &L2Transaction);
}

impl<T: MonitorHandle + ?Sized> MonitorHandle for Arc<T> {
    fn add_transaction(&self, l2_tx: &L2Transaction) {
        (**self).add_transaction(l2_tx)
    }
}

struct SendRequest {
    hash: String,
    encoded: String,
    done: oneshot::Sender<Result<()>>,
}

/// Worker pool dispatching raw transactions to the sequencer, with a
/// synchronous submission API for the ingest layer.
pub struct Sender<Db, Seq, M> {
    config: Config,
    storage: Db,
    sequencer: Seq,
    monitor: M,
    request_tx: mpsc::Sender<SendRequest>,
    request_rx: Arc<Mutex<mpsc::Receiver<SendRequest>>>,
    metrics: SenderMetrics,
}

impl<Db, Seq, M> Sender<Db, Seq, M> {
    pub fn new(config: Config, storage: Db, sequencer: Seq, monitor: M) -> Self {
        let (request_tx, request_rx) = mpsc::channel(config.queue_size.max(1));
        Self {
            config,
            storage,
            sequencer,
            monitor,
            request_tx,
            request_rx: Arc::new(Mutex::new(request_rx)),
            metrics: SenderMetrics::default(),
        }
    }
}

impl<Db, Seq, M> Sender<Db, Seq, M>
where
    Db: Storage,
    Seq: sequencer::Api + Clone + 'static,
    M: MonitorHandle,
{
    /// Spawns the worker pool. Workers run until the token is cancelled or
    /// the request channel closes.
    pub fn start(&self, cancel_token: CancellationToken) -> Vec<JoinHandle<()>> {
        info!("starting {} sender workers", self.config.workers);

        (0..self.config.workers)
            .map(|worker_num| {
                let request_rx = Arc::clone(&self.request_rx);
                let sequencer = self.sequencer.clone();
                let cancel_token = cancel_token.clone();

                tokio::spawn(async move {
                    debug!("sender-worker[{worker_num:03}]: started");

                    loop {
                        let request = tokio::select! {
                            _ = cancel_token.cancelled() => break,
                            request = async { request_rx.lock().await.recv().await } => {
                                match request {
                                    Some(request) => request,
                                    None => break,
                                }
                            }
                        };

                        debug!("sender-worker[{worker_num:03}]: sending tx {}", request.hash);
                        let result = sequencer.send_raw_transaction(&request.encoded).await;

                        // The caller may have given up waiting; nothing left
                        // to signal in that case.
                        let _ = request.done.send(result);
                    }

                    debug!("sender-worker[{worker_num:03}]: stopped");
                })
            })
            .collect()
    }

    /// Forwards the transaction to the sequencer and waits for the outcome.
    ///
    /// By the time this returns, the row's status has been written (`sent`
    /// on success, `invalid` with the upstream message otherwise) and a
    /// successfully forwarded transaction has been handed over for receipt
    /// monitoring. A failed status write is logged but does not change the
    /// returned value: the sequencer already gave its verdict.
    pub async fn send_l2_transaction(&self, l2_tx: &L2Transaction) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.enqueue_request(SendRequest {
            hash: l2_tx.hash.clone(),
            encoded: l2_tx.encoded.clone(),
            done: done_tx,
        });

        let result = done_rx
            .await
            .map_err(|_| Error::Other("sender worker pool is gone".to_string()))?;

        match result {
            Ok(()) => {
                info!("tx {} sent to sequencer", l2_tx.tag());
                self.metrics.txs_forwarded.inc();
                if let Err(e) = self
                    .storage
                    .update_transaction_status(l2_tx.id, TxStatus::Sent, "")
                    .await
                {
                    error!("error updating status for tx {}, error: {e}", l2_tx.tag());
                }
                self.monitor.add_transaction(l2_tx);
                Ok(())
            }
            Err(e) => {
                info!("error sending tx {} to sequencer, error: {e}", l2_tx.tag());
                self.metrics.txs_rejected.inc();
                if let Err(db_err) = self
                    .storage
                    .update_transaction_status(l2_tx.id, TxStatus::Invalid, &e.to_string())
                    .await
                {
                    error!(
                        "error updating status for tx {}, error: {db_err}",
                        l2_tx.tag()
                    );
                }
                Err(e)
            }
        }
    }

    // Enqueue from a detached task so a full queue exerts backpressure on
    // the per-request latch instead of on the caller.
    fn enqueue_request(&self, request: SendRequest) {
        debug!(
            "send request for tx {} added to the queue channel",
            request.hash
        );
        let queue = self.request_tx.clone();
        tokio::spawn(async move {
            // A send error means the pool is shutting down; dropping the
            // request resolves the caller's latch with an error.
            let _ = queue.send(request).await;
        });
    }

    /// Re-drives transactions that were persisted but not forwarded before
    /// the last shutdown.
    pub async fn resume_pending_transactions(&self) {
        info!("sending pending txs from the pool database");

        // Collect the full set up front: forwarding moves rows out of
        // `pending`, which would skew offset based pagination.
        let mut pending = Vec::new();
        let mut page = 0;
        loop {
            match self.storage.transactions_to_send(page).await {
                Ok(txs) if txs.is_empty() => break,
                Ok(txs) => pending.extend(txs),
                Err(e) => {
                    error!("error when getting txs to send from the pool database, error: {e}");
                    break;
                }
            }
            page += 1;
        }

        for l2_tx in pending {
            // The outcome is persisted inside; nobody waits on it here.
            let _ = self.send_l2_transaction(&l2_tx).await;
        }
    }
}

impl<Db, Seq, M> RegistersMetrics for Sender<Db, Seq, M> {
    fn metrics(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.metrics.txs_forwarded.clone()),
            Box::new(self.metrics.txs_rejected.clone()),
        ]
    }
}

#[derive(Clone)]
struct SenderMetrics {
    txs_forwarded: IntCounter,
    txs_rejected: IntCounter,
}

impl Default for SenderMetrics {
    fn default() -> Self {
        let txs_forwarded = IntCounter::with_opts(Opts::new(
            "sender_txs_forwarded",
            "Number of transactions accepted by the sequencer.",
        ))
        .expect("sender_txs_forwarded metric to be correctly configured");

        let txs_rejected = IntCounter::with_opts(Opts::new(
            "sender_txs_rejected",
            "Number of transactions rejected by the sequencer.",
        ))
        .expect("sender_txs_rejected metric to be correctly configured");

        Self {
            txs_forwarded,
            txs_rejected,
        }
    }
}

/// Periodically re-enters operator-flagged transactions into the pipeline.
/// This is the sole path by which `resend` rows come back to life.
pub struct ResendReconciler<Db, Seq, M> {
    sender: Arc<Sender<Db, Seq, M>>,
}

impl<Db, Seq, M> ResendReconciler<Db, Seq, M> {
    pub fn new(sender: Arc<Sender<Db, Seq, M>>) -> Self {
        Self { sender }
    }
}

#[async_trait::async_trait]
impl<Db, Seq, M> Runner for ResendReconciler<Db, Seq, M>
where
    Db: Storage,
    Seq: sequencer::Api + Clone + 'static,
    M: MonitorHandle,
{
    async fn run(&mut self) -> Result<()> {
        let mut to_resend = Vec::new();
        let mut page = 0;
        loop {
            let txs = self.sender.storage.transactions_to_resend(page).await?;
            if txs.is_empty() {
                break;
            }
            to_resend.extend(txs);
            page += 1;
        }

        for l2_tx in to_resend {
            if let Err(e) = self.sender.send_l2_transaction(&l2_tx).await {
                error!("error sending tx {} to sequencer, error: {e}", l2_tx.tag());
            }
        }

        Ok(())
    }
}
