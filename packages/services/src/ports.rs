pub mod storage {
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::{
        types::{L2Transaction, TxStatus},
        Result,
    };

    /// The durable transaction table. The single source of truth shared by
    /// every pipeline stage and the anchor for crash recovery.
    #[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
    #[async_trait]
    pub trait Storage: Send + Sync {
        /// Persists the transaction and returns the id assigned to it.
        async fn insert_transaction(&self, tx: &L2Transaction) -> Result<u64>;

        /// Sets status and error message. Updating a row that no longer
        /// exists is not an error: an operator may have pruned it.
        async fn update_transaction_status(
            &self,
            id: u64,
            status: TxStatus,
            error_msg: &str,
        ) -> Result<()>;

        /// Returns one page of rows in the given status. Callers iterate
        /// pages until an empty one comes back; ordering across pages is
        /// unspecified.
        async fn transactions_by_status(
            &self,
            status: TxStatus,
            page: u32,
        ) -> Result<Vec<L2Transaction>>;

        /// Alias of `transactions_by_status(TxStatus::Pending, _)`.
        async fn transactions_to_send(&self, page: u32) -> Result<Vec<L2Transaction>>;

        /// Alias of `transactions_by_status(TxStatus::Resend, _)`.
        async fn transactions_to_resend(&self, page: u32) -> Result<Vec<L2Transaction>>;

        /// Alias of `transactions_by_status(TxStatus::Sent, _)`.
        async fn transactions_to_monitor(&self, page: u32) -> Result<Vec<L2Transaction>>;
    }

    #[async_trait]
    impl<T: Storage + ?Sized> Storage for Arc<T> {
        async fn insert_transaction(&self, tx: &L2Transaction) -> Result<u64> {
            (**self).insert_transaction(tx).await
        }

        async fn update_transaction_status(
            &self,
            id: u64,
            status: TxStatus,
            error_msg: &str,
        ) -> Result<()> {
            (**self).update_transaction_status(id, status, error_msg).await
        }

        async fn transactions_by_status(
            &self,
            status: TxStatus,
            page: u32,
        ) -> Result<Vec<L2Transaction>> {
            (**self).transactions_by_status(status, page).await
        }

        async fn transactions_to_send(&self, page: u32) -> Result<Vec<L2Transaction>> {
            (**self).transactions_to_send(page).await
        }

        async fn transactions_to_resend(&self, page: u32) -> Result<Vec<L2Transaction>> {
            (**self).transactions_to_resend(page).await
        }

        async fn transactions_to_monitor(&self, page: u32) -> Result<Vec<L2Transaction>> {
            (**self).transactions_to_monitor(page).await
        }
    }
}

pub mod sequencer {
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::Result;

    /// Client side of the sequencer ingestion RPC. Any error is treated as a
    /// rejection of the transaction.
    #[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
    #[async_trait]
    pub trait Api: Send + Sync {
        async fn send_raw_transaction(&self, encoded: &str) -> Result<()>;
    }

    #[async_trait]
    impl<T: Api + ?Sized> Api for Arc<T> {
        async fn send_raw_transaction(&self, encoded: &str) -> Result<()> {
            (**self).send_raw_transaction(encoded).await
        }
    }
}

pub mod l2 {
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::{types::TransactionReceipt, Result};

    /// Client side of the L2 node receipt lookup. `Ok(None)` is the
    /// distinguished "no receipt yet"; `Err` is a transport problem.
    #[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
    #[async_trait]
    pub trait Api: Send + Sync {
        async fn transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>>;
    }

    #[async_trait]
    impl<T: Api + ?Sized> Api for Arc<T> {
        async fn transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>> {
            (**self).transaction_receipt(hash).await
        }
    }
}

pub mod clock {
    use crate::types::{DateTime, Utc};

    pub trait Clock: Send + Sync {
        fn now(&self) -> DateTime<Utc>;
    }
}
