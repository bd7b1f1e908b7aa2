use std::{sync::Arc, time::Duration};

use metrics::{
    prometheus::{core::Collector, IntCounter, Opts},
    RegistersMetrics,
};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    ports::{clock::Clock, l2, storage::Storage},
    sender::MonitorHandle,
    types::{DateTime, L2Transaction, TxStatus, Utc},
};

mod retry_list;
use retry_list::RetryList;

#[derive(Debug, Clone)]
pub struct Config {
    /// Number of workers querying for transaction receipts.
    pub workers: usize,
    /// Capacity of the queue between the scheduler and the workers.
    pub queue_size: usize,
    /// Wait before the first receipt lookup of a freshly sent transaction.
    pub initial_wait_interval: Duration,
    /// Wait between receipt lookups for the same transaction.
    pub retry_wait_interval: Duration,
    /// Time a transaction may spend waiting for its receipt, measured from
    /// `received_at`, before it is expired.
    pub tx_lifetime_max: Duration,
}

/// A receipt poll scheduled for a point in time.
#[derive(Debug, Clone)]
pub(crate) struct MonitorRequest {
    pub l2_tx: L2Transaction,
    pub next_retry: DateTime<Utc>,
}

/// Worker pool polling the L2 node for receipts, driving every enrolled
/// transaction to a terminal state.
pub struct Monitor<Db, L2, C> {
    config: Config,
    storage: Db,
    l2_node: L2,
    clock: C,
    request_tx: mpsc::Sender<MonitorRequest>,
    request_rx: Arc<Mutex<mpsc::Receiver<MonitorRequest>>>,
    retry_list: RetryList,
    metrics: MonitorMetrics,
}

impl<Db, L2, C> Monitor<Db, L2, C> {
    pub fn new(config: Config, storage: Db, l2_node: L2, clock: C) -> Self {
        let (request_tx, request_rx) = mpsc::channel(config.queue_size.max(1));
        Self {
            config,
            storage,
            l2_node,
            clock,
            request_tx,
            request_rx: Arc::new(Mutex::new(request_rx)),
            retry_list: RetryList::new(),
            metrics: MonitorMetrics::default(),
        }
    }
}

impl<Db, L2, C> Monitor<Db, L2, C>
where
    Db: Storage + 'static,
    L2: l2::Api + Clone + 'static,
    C: Clock + 'static,
{
    /// Spawns the worker pool and the retry scheduler.
    pub fn start(self: &Arc<Self>, cancel_token: CancellationToken) -> Vec<JoinHandle<()>> {
        info!("starting {} monitor workers", self.config.workers);

        let mut handles: Vec<_> = (0..self.config.workers)
            .map(|worker_num| {
                let monitor = Arc::clone(self);
                let l2_node = self.l2_node.clone();
                let cancel_token = cancel_token.clone();

                tokio::spawn(async move {
                    debug!("monitor-worker[{worker_num:03}]: started");

                    loop {
                        let request = tokio::select! {
                            _ = cancel_token.cancelled() => break,
                            request = async { monitor.request_rx.lock().await.recv().await } => {
                                match request {
                                    Some(request) => request,
                                    None => break,
                                }
                            }
                        };

                        monitor.process_request(request, &l2_node, worker_num).await;
                    }

                    debug!("monitor-worker[{worker_num:03}]: stopped");
                })
            })
            .collect();

        let monitor = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            monitor.check_request_retries(cancel_token).await;
        }));

        handles
    }

    /// Enrolls rows already forwarded before the last shutdown.
    pub async fn resume_monitoring(&self) {
        info!("monitoring txs from the pool database");

        let mut page = 0;
        loop {
            let txs = match self.storage.transactions_to_monitor(page).await {
                Ok(txs) => txs,
                Err(e) => {
                    error!(
                        "error when getting txs to monitor from the pool database, error: {e}"
                    );
                    break;
                }
            };

            if txs.is_empty() {
                break;
            }

            for l2_tx in &txs {
                self.add(l2_tx);
            }
            page += 1;
        }
    }

    fn add(&self, l2_tx: &L2Transaction) {
        if self.config.initial_wait_interval > Duration::ZERO {
            self.retry_list.add(MonitorRequest {
                l2_tx: l2_tx.clone(),
                next_retry: self.clock.now() + self.config.initial_wait_interval,
            });
        } else {
            self.enqueue_request(MonitorRequest {
                l2_tx: l2_tx.clone(),
                next_retry: self.clock.now(),
            });
        }
    }

    // Enqueue from a detached task so a full worker channel never blocks the
    // scheduler or the caller handing a transaction over.
    fn enqueue_request(&self, request: MonitorRequest) {
        debug!(
            "monitor request for tx {} added to the queue channel",
            request.l2_tx.tag()
        );
        let queue = self.request_tx.clone();
        tokio::spawn(async move {
            let _ = queue.send(request).await;
        });
    }

    fn schedule_request_retry(&self, mut request: MonitorRequest) {
        request.next_retry = self.clock.now() + self.config.retry_wait_interval;
        debug!(
            "scheduled retry for tx {} at {}",
            request.l2_tx.tag(),
            request.next_retry
        );
        self.retry_list.add(request);
    }

    async fn process_request(&self, request: MonitorRequest, l2_node: &L2, worker_num: usize) {
        debug!(
            "monitor-worker[{worker_num:03}]: monitoring tx {}",
            request.l2_tx.tag()
        );

        let receipt = match l2_node.transaction_receipt(&request.l2_tx.hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                debug!(
                    "monitor-worker[{worker_num:03}]: receipt for tx {} still not available, scheduling retry",
                    request.l2_tx.tag()
                );
                self.schedule_request_retry(request);
                return;
            }
            Err(e) => {
                error!(
                    "monitor-worker[{worker_num:03}]: error getting receipt for tx {}, error: {e}",
                    request.l2_tx.tag()
                );
                self.schedule_request_retry(request);
                return;
            }
        };

        let status = if receipt.succeeded() {
            TxStatus::Confirmed
        } else {
            TxStatus::Failed
        };

        match self
            .storage
            .update_transaction_status(request.l2_tx.id, status, "")
            .await
        {
            Ok(()) => {
                info!(
                    "monitor-worker[{worker_num:03}]: receipt for tx {} received, status: {status}",
                    request.l2_tx.tag()
                );
                if status == TxStatus::Confirmed {
                    self.metrics.txs_confirmed.inc();
                } else {
                    self.metrics.txs_failed.inc();
                }
                self.retry_list.delete(request.l2_tx.id);
            }
            Err(e) => {
                error!(
                    "monitor-worker[{worker_num:03}]: error updating status for tx {}, error: {e}",
                    request.l2_tx.tag()
                );
                // Retry so the terminal status eventually becomes durable.
                self.schedule_request_retry(request);
            }
        }
    }

    // The single scheduler task. Per head-of-list request it either expires
    // it, dispatches it to a worker, or sleeps until it is due. Requests
    // expired here are not re-enqueued onto workers.
    async fn check_request_retries(&self, cancel_token: CancellationToken) {
        loop {
            let request = match self.retry_list.peek_head() {
                Some(request) => request,
                None => {
                    tokio::select! {
                        _ = cancel_token.cancelled() => break,
                        _ = self.retry_list.wait_non_empty() => {}
                    }
                    continue;
                }
            };

            let now = self.clock.now();

            let age = now.signed_duration_since(request.l2_tx.received_at);
            if age
                .to_std()
                .is_ok_and(|age| age >= self.config.tx_lifetime_max)
            {
                debug!("monitor tx {} has expired, updating status", request.l2_tx.tag());
                match self
                    .storage
                    .update_transaction_status(request.l2_tx.id, TxStatus::Expired, "")
                    .await
                {
                    Ok(()) => {
                        self.metrics.txs_expired.inc();
                        self.retry_list.delete(request.l2_tx.id);
                    }
                    Err(e) => {
                        error!(
                            "error updating status for expired tx {}, error: {e}",
                            request.l2_tx.tag()
                        );
                        // Push the request back so the terminal write is
                        // retried instead of spinning on a broken store.
                        self.retry_list.delete(request.l2_tx.id);
                        self.schedule_request_retry(request);
                    }
                }
                continue;
            }

            if request.next_retry <= now {
                self.retry_list.delete(request.l2_tx.id);
                self.enqueue_request(request);
                continue;
            }

            let until_due = (request.next_retry - now).to_std().unwrap_or_default();
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = tokio::time::sleep(until_due) => {}
            }
        }
    }
}

impl<Db, L2, C> MonitorHandle for Monitor<Db, L2, C>
where
    Db: Storage + 'static,
    L2: l2::Api + Clone + 'static,
    C: Clock + 'static,
{
    fn add_transaction(&self, l2_tx: &L2Transaction) {
        self.add(l2_tx);
    }
}

impl<Db, L2, C> RegistersMetrics for Monitor<Db, L2, C> {
    fn metrics(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.metrics.txs_confirmed.clone()),
            Box::new(self.metrics.txs_failed.clone()),
            Box::new(self.metrics.txs_expired.clone()),
        ]
    }
}

#[derive(Clone)]
struct MonitorMetrics {
    txs_confirmed: IntCounter,
    txs_failed: IntCounter,
    txs_expired: IntCounter,
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        let txs_confirmed = IntCounter::with_opts(Opts::new(
            "monitor_txs_confirmed",
            "Number of transactions with a successful receipt.",
        ))
        .expect("monitor_txs_confirmed metric to be correctly configured");

        let txs_failed = IntCounter::with_opts(Opts::new(
            "monitor_txs_failed",
            "Number of transactions with a failed receipt.",
        ))
        .expect("monitor_txs_failed metric to be correctly configured");

        let txs_expired = IntCounter::with_opts(Opts::new(
            "monitor_txs_expired",
            "Number of transactions expired while waiting for a receipt.",
        ))
        .expect("monitor_txs_expired metric to be correctly configured");

        Self {
            txs_confirmed,
            txs_failed,
            txs_expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use clock::{SystemClock, TestClock};
    use tokio::sync::oneshot;

    use super::*;
    use crate::{
        ports::{l2::MockApi, storage::MockStorage},
        types::TransactionReceipt,
        Error,
    };

    fn given_l2_transaction(id: u64, received_at: DateTime<Utc>) -> L2Transaction {
        L2Transaction {
            id,
            hash: format!("0x{id:064x}"),
            received_at,
            from_address: String::new(),
            gas_price: 1_000_000_000,
            nonce: 0,
            status: TxStatus::Sent,
            ip: String::new(),
            encoded: format!("0xf86c{id:02x}"),
            decoded: "{}".to_string(),
        }
    }

    fn config(
        initial_wait_interval: Duration,
        retry_wait_interval: Duration,
        tx_lifetime_max: Duration,
    ) -> Config {
        Config {
            workers: 1,
            queue_size: 4,
            initial_wait_interval,
            retry_wait_interval,
            tx_lifetime_max,
        }
    }

    // Resolves a oneshot the first time the storage mock records the given
    // status, so tests can await the pipeline instead of sleeping blindly.
    fn notify_on_status(
        storage: &mut MockStorage,
        expected_id: u64,
        expected_status: TxStatus,
    ) -> oneshot::Receiver<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let done_tx = StdMutex::new(Some(done_tx));
        storage
            .expect_update_transaction_status()
            .withf(move |id, status, _| *id == expected_id && *status == expected_status)
            .once()
            .returning(move |_, _, _| {
                if let Some(done) = done_tx.lock().unwrap().take() {
                    let _ = done.send(());
                }
                Ok(())
            });
        done_rx
    }

    #[tokio::test]
    async fn initial_wait_parks_the_request_in_the_retry_list() {
        // given
        let clock = TestClock::default();
        let l2_tx = given_l2_transaction(1, clock.now());
        let monitor = Arc::new(Monitor::new(
            config(
                Duration::from_secs(3),
                Duration::from_secs(3),
                Duration::from_secs(1800),
            ),
            MockStorage::new(),
            Arc::new(MockApi::new()),
            clock,
        ));

        // when
        monitor.add_transaction(&l2_tx);

        // then
        assert_eq!(monitor.retry_list.len(), 1);
    }

    #[tokio::test]
    async fn confirms_transaction_when_receipt_succeeds() {
        // given
        let l2_tx = given_l2_transaction(1, Utc::now());

        let mut l2_node = MockApi::new();
        l2_node
            .expect_transaction_receipt()
            .once()
            .returning(|_| Ok(Some(TransactionReceipt::new(true))));

        let mut storage = MockStorage::new();
        let confirmed = notify_on_status(&mut storage, 1, TxStatus::Confirmed);

        let cancel_token = CancellationToken::new();
        let monitor = Arc::new(Monitor::new(
            config(
                Duration::ZERO,
                Duration::from_millis(50),
                Duration::from_secs(1800),
            ),
            storage,
            Arc::new(l2_node),
            SystemClock,
        ));
        let _handles = monitor.start(cancel_token.clone());

        // when
        monitor.add_transaction(&l2_tx);

        // then
        tokio::time::timeout(Duration::from_secs(2), confirmed)
            .await
            .expect("tx to be confirmed in time")
            .unwrap();
        cancel_token.cancel();
    }

    #[tokio::test]
    async fn marks_transaction_failed_when_receipt_status_is_zero() {
        // given
        let l2_tx = given_l2_transaction(2, Utc::now());

        let mut l2_node = MockApi::new();
        l2_node
            .expect_transaction_receipt()
            .once()
            .returning(|_| Ok(Some(TransactionReceipt::new(false))));

        let mut storage = MockStorage::new();
        let failed = notify_on_status(&mut storage, 2, TxStatus::Failed);

        let cancel_token = CancellationToken::new();
        let monitor = Arc::new(Monitor::new(
            config(
                Duration::ZERO,
                Duration::from_millis(50),
                Duration::from_secs(1800),
            ),
            storage,
            Arc::new(l2_node),
            SystemClock,
        ));
        let _handles = monitor.start(cancel_token.clone());

        // when
        monitor.add_transaction(&l2_tx);

        // then
        tokio::time::timeout(Duration::from_secs(2), failed)
            .await
            .expect("tx to be marked failed in time")
            .unwrap();
        cancel_token.cancel();
    }

    #[tokio::test]
    async fn retries_until_the_receipt_appears() {
        // given
        let l2_tx = given_l2_transaction(3, Utc::now());

        let mut sequence = mockall::Sequence::new();
        let mut l2_node = MockApi::new();
        l2_node
            .expect_transaction_receipt()
            .once()
            .in_sequence(&mut sequence)
            .returning(|_| Ok(None));
        l2_node
            .expect_transaction_receipt()
            .once()
            .in_sequence(&mut sequence)
            .returning(|_| Err(Error::Network("connection reset".to_string())));
        l2_node
            .expect_transaction_receipt()
            .once()
            .in_sequence(&mut sequence)
            .returning(|_| Ok(Some(TransactionReceipt::new(true))));

        let mut storage = MockStorage::new();
        let confirmed = notify_on_status(&mut storage, 3, TxStatus::Confirmed);

        let cancel_token = CancellationToken::new();
        let monitor = Arc::new(Monitor::new(
            config(
                Duration::ZERO,
                Duration::from_millis(50),
                Duration::from_secs(1800),
            ),
            storage,
            Arc::new(l2_node),
            SystemClock,
        ));
        let _handles = monitor.start(cancel_token.clone());

        // when
        monitor.add_transaction(&l2_tx);

        // then
        tokio::time::timeout(Duration::from_secs(3), confirmed)
            .await
            .expect("tx to be confirmed after retries")
            .unwrap();
        cancel_token.cancel();
    }

    #[tokio::test]
    async fn retries_terminal_write_after_store_failure() {
        // given
        let l2_tx = given_l2_transaction(4, Utc::now());

        let mut l2_node = MockApi::new();
        l2_node
            .expect_transaction_receipt()
            .times(2)
            .returning(|_| Ok(Some(TransactionReceipt::new(true))));

        let mut storage = MockStorage::new();
        let mut sequence = mockall::Sequence::new();
        storage
            .expect_update_transaction_status()
            .once()
            .in_sequence(&mut sequence)
            .returning(|_, _, _| Err(Error::Storage("pool db unavailable".to_string())));

        let (done_tx, confirmed) = oneshot::channel();
        let done_tx = StdMutex::new(Some(done_tx));
        storage
            .expect_update_transaction_status()
            .once()
            .in_sequence(&mut sequence)
            .returning(move |_, _, _| {
                if let Some(done) = done_tx.lock().unwrap().take() {
                    let _ = done.send(());
                }
                Ok(())
            });

        let cancel_token = CancellationToken::new();
        let monitor = Arc::new(Monitor::new(
            config(
                Duration::ZERO,
                Duration::from_millis(50),
                Duration::from_secs(1800),
            ),
            storage,
            Arc::new(l2_node),
            SystemClock,
        ));
        let _handles = monitor.start(cancel_token.clone());

        // when
        monitor.add_transaction(&l2_tx);

        // then
        tokio::time::timeout(Duration::from_secs(3), confirmed)
            .await
            .expect("terminal status to become durable")
            .unwrap();
        cancel_token.cancel();
    }

    #[tokio::test]
    async fn expires_transaction_that_outlived_its_maximum_lifetime() {
        // given: a transaction that has already outlived tx_lifetime_max
        let clock = TestClock::default();
        let received_at = clock.now();
        clock.advance_time(Duration::from_secs(7200));
        let l2_tx = given_l2_transaction(5, received_at);

        let l2_node = MockApi::new();
        let mut storage = MockStorage::new();
        let expired = notify_on_status(&mut storage, 5, TxStatus::Expired);

        let cancel_token = CancellationToken::new();
        let monitor = Arc::new(Monitor::new(
            config(
                Duration::from_secs(3),
                Duration::from_secs(3),
                Duration::from_secs(3600),
            ),
            storage,
            Arc::new(l2_node),
            clock,
        ));
        let _handles = monitor.start(cancel_token.clone());

        // when
        monitor.add_transaction(&l2_tx);

        // then
        tokio::time::timeout(Duration::from_secs(2), expired)
            .await
            .expect("tx to be expired by the scheduler")
            .unwrap();
        assert_eq!(monitor.retry_list.len(), 0);
        cancel_token.cancel();
    }

    #[tokio::test]
    async fn never_found_receipt_expires_within_the_documented_bound() {
        // given
        let l2_tx = given_l2_transaction(6, Utc::now());

        let mut l2_node = MockApi::new();
        l2_node
            .expect_transaction_receipt()
            .returning(|_| Ok(None));

        let mut storage = MockStorage::new();
        let expired = notify_on_status(&mut storage, 6, TxStatus::Expired);

        let cancel_token = CancellationToken::new();
        let monitor = Arc::new(Monitor::new(
            config(
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_secs(1),
            ),
            storage,
            Arc::new(l2_node),
            SystemClock,
        ));
        let _handles = monitor.start(cancel_token.clone());

        let started = std::time::Instant::now();

        // when
        monitor.add_transaction(&l2_tx);

        // then: expiry lands in [lifetime, lifetime + retry interval], with
        // slack for scheduling noise
        tokio::time::timeout(Duration::from_secs(3), expired)
            .await
            .expect("tx to expire")
            .unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(900), "expired too early: {elapsed:?}");
        cancel_token.cancel();
    }

    #[tokio::test]
    async fn recovery_enrolls_one_request_per_sent_transaction() {
        // given
        let clock = TestClock::default();
        let mut storage = MockStorage::new();
        let recovered = vec![
            given_l2_transaction(1, clock.now()),
            given_l2_transaction(2, clock.now()),
        ];
        storage
            .expect_transactions_to_monitor()
            .withf(|page| *page == 0)
            .once()
            .returning(move |_| Ok(recovered.clone()));
        storage
            .expect_transactions_to_monitor()
            .withf(|page| *page == 1)
            .once()
            .returning(|_| Ok(vec![]));

        let monitor = Arc::new(Monitor::new(
            config(
                Duration::from_secs(3),
                Duration::from_secs(3),
                Duration::from_secs(1800),
            ),
            storage,
            Arc::new(MockApi::new()),
            clock,
        ));

        // when
        monitor.resume_monitoring().await;

        // then
        assert_eq!(monitor.retry_list.len(), 2);
    }
}
