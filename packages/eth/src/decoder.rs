use alloy::{
    consensus::{transaction::SignerRecoverable, Transaction, TxEnvelope},
    eips::eip2718::Decodable2718,
    primitives::hex,
};
use tracing::warn;

/// Fields extracted from a raw RLP-hex transaction envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub hash: String,
    /// Empty when signature recovery failed.
    pub from_address: String,
    pub gas_price: u64,
    pub nonce: u64,
    /// JSON rendering of the transaction, kept for operators.
    pub decoded: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The input is not hex or not a decodable transaction envelope.
    #[error("{0}")]
    InvalidEnvelope(String),
    /// The envelope decoded but could not be rendered to JSON.
    #[error("{0}")]
    Rendering(String),
}

/// Decodes a raw `0x`-prefixed envelope into the fields the ingest endpoint
/// persists. Handles both legacy RLP and EIP-2718 typed envelopes.
///
/// Signature recovery failures are tolerated: the sequencer has the final
/// word on signatures, so the transaction is still forwarded with an empty
/// sender address.
pub fn decode_raw_transaction(raw: &str) -> Result<DecodedTransaction, DecodeError> {
    let bytes = hex::decode(raw).map_err(|e| DecodeError::InvalidEnvelope(e.to_string()))?;

    let envelope = TxEnvelope::decode_2718(&mut bytes.as_slice())
        .map_err(|e| DecodeError::InvalidEnvelope(e.to_string()))?;

    let decoded =
        serde_json::to_string(&envelope).map_err(|e| DecodeError::Rendering(e.to_string()))?;

    let hash = envelope.tx_hash().to_string();

    let from_address = match envelope.recover_signer() {
        Ok(address) => address.to_string(),
        Err(e) => {
            warn!("error recovering sender address for tx {hash}, error: {e}");
            String::new()
        }
    };

    // Dynamic-fee envelopes have no gas price; the fee cap is the closest
    // equivalent the pool can record.
    let gas_price = envelope
        .gas_price()
        .unwrap_or_else(|| envelope.max_fee_per_gas());

    Ok(DecodedTransaction {
        hash,
        from_address,
        gas_price: gas_price.try_into().unwrap_or(u64::MAX),
        nonce: envelope.nonce(),
        decoded,
    })
}
