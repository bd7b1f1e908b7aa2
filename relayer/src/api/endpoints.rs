use std::sync::Arc;

use async_trait::async_trait;
use services::types::{L2Transaction, TxStatus, Utc};
use tracing::{error, info};

use super::{
    errors::{RpcError, RpcResult, DEFAULT_ERROR_CODE},
    handler::ClientInfo,
};

/// The slice of the sender pool the ingest endpoint depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    async fn send_l2_transaction(&self, l2_tx: &L2Transaction) -> services::Result<()>;
}

#[async_trait]
impl<Db, Seq, M> TransactionSubmitter for services::Sender<Db, Seq, M>
where
    Db: services::ports::storage::Storage,
    Seq: services::ports::sequencer::Api + Clone + 'static,
    M: services::sender::MonitorHandle,
{
    async fn send_l2_transaction(&self, l2_tx: &L2Transaction) -> services::Result<()> {
        services::Sender::send_l2_transaction(self, l2_tx).await
    }
}

/// Implementations of the registered JSON-RPC endpoints.
pub struct Endpoints<Db, S> {
    storage: Db,
    sender: Arc<S>,
}

impl<Db, S> Endpoints<Db, S> {
    pub fn new(storage: Db, sender: Arc<S>) -> Self {
        Self { storage, sender }
    }
}

impl<Db, S> Endpoints<Db, S>
where
    Db: services::ports::storage::Storage,
    S: TransactionSubmitter,
{
    /// `eth_sendRawTransaction`: decode, persist, forward, answer with the
    /// transaction hash.
    pub async fn send_raw_transaction(
        &self,
        client: ClientInfo,
        input: String,
    ) -> RpcResult<String> {
        let decoded = match eth::decode_raw_transaction(&input) {
            Ok(decoded) => decoded,
            Err(eth::DecodeError::InvalidEnvelope(e)) => {
                error!("invalid tx input, error: {e}");
                return Err(RpcError::invalid_params("invalid tx input"));
            }
            Err(eth::DecodeError::Rendering(e)) => {
                error!("error rendering tx to JSON, error: {e}");
                return Err(RpcError::parser("error parsing tx"));
            }
        };

        let mut l2_tx = L2Transaction {
            id: 0,
            hash: decoded.hash,
            received_at: Utc::now(),
            from_address: decoded.from_address,
            gas_price: decoded.gas_price,
            nonce: decoded.nonce,
            status: TxStatus::Pending,
            ip: client.ip,
            encoded: input,
            decoded: decoded.decoded,
        };

        match self.storage.insert_transaction(&l2_tx).await {
            Ok(id) => l2_tx.id = id,
            // Forwarding matters more than bookkeeping here; the row can be
            // reconciled later.
            Err(e) => error!(
                "error adding tx {} to the pool database, error: {e}",
                l2_tx.tag()
            ),
        }

        if let Err(e) = self.sender.send_l2_transaction(&l2_tx).await {
            info!("sending tx {} to sequencer returned error: {e}", l2_tx.tag());
            return Err(RpcError::new(DEFAULT_ERROR_CODE, e.to_string()));
        }

        info!("tx {} sent to sequencer and added to the pool database", l2_tx.tag());

        Ok(l2_tx.hash)
    }
}

#[cfg(test)]
mod tests {
    use services::ports::storage::MockStorage;

    use super::*;
    use crate::api::errors::{INVALID_PARAMS_ERROR_CODE, NOT_FOUND_ERROR_CODE};

    // The signed example transaction from EIP-155, good enough to exercise
    // the whole decode path.
    const RAW_LEGACY_TX: &str = "0xf86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83";

    fn client() -> ClientInfo {
        ClientInfo {
            ip: "10.0.0.1".to_string(),
        }
    }

    #[tokio::test]
    async fn answers_with_the_transaction_hash_on_success() {
        // given
        let mut storage = MockStorage::new();
        storage
            .expect_insert_transaction()
            .withf(|tx| tx.status == TxStatus::Pending && tx.ip == "10.0.0.1" && tx.nonce == 9)
            .once()
            .returning(|_| Ok(42));

        let mut submitter = MockTransactionSubmitter::new();
        submitter
            .expect_send_l2_transaction()
            .withf(|tx| tx.id == 42)
            .once()
            .returning(|_| Ok(()));

        let endpoints = Endpoints::new(storage, Arc::new(submitter));

        // when
        let result = endpoints
            .send_raw_transaction(client(), RAW_LEGACY_TX.to_string())
            .await;

        // then
        let hash = result.unwrap();
        assert!(hash.starts_with("0x"));
        assert_eq!(hash.len(), 66);
    }

    #[tokio::test]
    async fn rejects_undecodable_input_without_persisting_anything() {
        // given
        let mut storage = MockStorage::new();
        storage.expect_insert_transaction().never();

        let mut submitter = MockTransactionSubmitter::new();
        submitter.expect_send_l2_transaction().never();

        let endpoints = Endpoints::new(storage, Arc::new(submitter));

        // when
        let result = endpoints
            .send_raw_transaction(client(), "0xZZ".to_string())
            .await;

        // then
        let err = result.unwrap_err();
        assert_eq!(err.code(), INVALID_PARAMS_ERROR_CODE);
        assert_eq!(err.message(), "invalid tx input");
    }

    #[tokio::test]
    async fn surfaces_the_sequencer_rejection_with_the_default_code() {
        // given
        let mut storage = MockStorage::new();
        storage.expect_insert_transaction().once().returning(|_| Ok(1));

        let mut submitter = MockTransactionSubmitter::new();
        submitter
            .expect_send_l2_transaction()
            .once()
            .returning(|_| Err(services::Error::Other("nonce too low".to_string())));

        let endpoints = Endpoints::new(storage, Arc::new(submitter));

        // when
        let result = endpoints
            .send_raw_transaction(client(), RAW_LEGACY_TX.to_string())
            .await;

        // then
        let err = result.unwrap_err();
        assert_eq!(err.code(), DEFAULT_ERROR_CODE);
        assert_eq!(err.message(), "nonce too low");
    }

    #[tokio::test]
    async fn still_forwards_when_the_insert_fails() {
        // given
        let mut storage = MockStorage::new();
        storage
            .expect_insert_transaction()
            .once()
            .returning(|_| Err(services::Error::Storage("pool db unavailable".to_string())));

        let mut submitter = MockTransactionSubmitter::new();
        submitter
            .expect_send_l2_transaction()
            .withf(|tx| tx.id == 0)
            .once()
            .returning(|_| Ok(()));

        let endpoints = Endpoints::new(storage, Arc::new(submitter));

        // when
        let result = endpoints
            .send_raw_transaction(client(), RAW_LEGACY_TX.to_string())
            .await;

        // then
        assert!(result.is_ok());
    }

    // Keeps the error-codes import honest; dispatch itself is covered in the
    // handler tests.
    #[test]
    fn method_not_found_carries_its_wire_code() {
        assert_eq!(
            RpcError::method_not_found("eth_foo").code(),
            NOT_FOUND_ERROR_CODE
        );
    }
}
