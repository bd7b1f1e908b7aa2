#![deny(unused_crate_dependencies)]
mod error;
mod mappings;
mod postgres;

use async_trait::async_trait;
use services::{
    ports::storage::Storage,
    types::{L2Transaction, TxStatus},
    Result,
};

pub use crate::postgres::{DbConfig, Postgres};

#[async_trait]
impl Storage for Postgres {
    async fn insert_transaction(&self, tx: &L2Transaction) -> Result<u64> {
        Ok(self._insert_transaction(tx).await?)
    }

    async fn update_transaction_status(
        &self,
        id: u64,
        status: TxStatus,
        error_msg: &str,
    ) -> Result<()> {
        Ok(self._update_transaction_status(id, status, error_msg).await?)
    }

    async fn transactions_by_status(
        &self,
        status: TxStatus,
        page: u32,
    ) -> Result<Vec<L2Transaction>> {
        Ok(self._transactions_by_status(status, page).await?)
    }

    async fn transactions_to_send(&self, page: u32) -> Result<Vec<L2Transaction>> {
        Ok(self._transactions_by_status(TxStatus::Pending, page).await?)
    }

    async fn transactions_to_resend(&self, page: u32) -> Result<Vec<L2Transaction>> {
        Ok(self._transactions_by_status(TxStatus::Resend, page).await?)
    }

    async fn transactions_to_monitor(&self, page: u32) -> Result<Vec<L2Transaction>> {
        Ok(self._transactions_by_status(TxStatus::Sent, page).await?)
    }
}
