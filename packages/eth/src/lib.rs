#![deny(unused_crate_dependencies)]
mod decoder;
mod l2_node;
mod metrics;
mod sequencer;

pub use decoder::{decode_raw_transaction, DecodeError, DecodedTransaction};
pub use l2_node::L2NodeClient;
pub use sequencer::SequencerClient;
