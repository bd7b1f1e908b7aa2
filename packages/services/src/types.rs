use std::{fmt, str::FromStr};

pub use chrono::{DateTime, Utc};

/// Lifecycle state of a relayed transaction.
///
/// `Resend` is only ever set by an operator directly in the database; the
/// pipeline picks it up and drives the row through the state machine again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxStatus {
    Pending,
    Invalid,
    Sent,
    Confirmed,
    Failed,
    Resend,
    Expired,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Invalid => "invalid",
            Self::Sent => "sent",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Resend => "resend",
            Self::Expired => "expired",
        }
    }

    /// Terminal states are never rewritten by the pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Invalid | Self::Confirmed | Self::Failed | Self::Expired
        )
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "invalid" => Ok(Self::Invalid),
            "sent" => Ok(Self::Sent),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            "resend" => Ok(Self::Resend),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// A signed rollup transaction as tracked by the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Transaction {
    /// Assigned by the store on insert; zero until then.
    pub id: u64,
    /// 0x-prefixed transaction hash. Not unique: the same payload may be
    /// resubmitted.
    pub hash: String,
    pub received_at: DateTime<Utc>,
    /// Recovered from the signature; empty when recovery failed.
    pub from_address: String,
    pub gas_price: u64,
    pub nonce: u64,
    pub status: TxStatus,
    /// Originating client address, or empty.
    pub ip: String,
    /// The raw RLP-hex envelope exactly as received.
    pub encoded: String,
    /// Human readable JSON rendering of the transaction.
    pub decoded: String,
}

impl L2Transaction {
    pub fn tag(&self) -> String {
        format!("[{}]:{}", self.id, self.hash)
    }
}

/// Execution record returned by the L2 node once a transaction was ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionReceipt {
    success: bool,
}

impl TransactionReceipt {
    pub fn new(success: bool) -> Self {
        Self { success }
    }

    pub fn succeeded(&self) -> bool {
        self.success
    }
}
