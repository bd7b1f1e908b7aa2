use metrics::{
    prometheus::{core::Collector, IntCounter, Opts},
    RegistersMetrics,
};

#[derive(Clone)]
pub(crate) struct SequencerMetrics {
    pub sequencer_network_errors: IntCounter,
}

impl RegistersMetrics for SequencerMetrics {
    fn metrics(&self) -> Vec<Box<dyn Collector>> {
        vec![Box::new(self.sequencer_network_errors.clone())]
    }
}

impl Default for SequencerMetrics {
    fn default() -> Self {
        let sequencer_network_errors = IntCounter::with_opts(Opts::new(
            "sequencer_network_errors",
            "Number of network errors encountered while forwarding transactions to the sequencer.",
        ))
        .expect("sequencer_network_errors metric to be correctly configured");
        Self {
            sequencer_network_errors,
        }
    }
}

#[derive(Clone)]
pub(crate) struct L2NodeMetrics {
    pub l2_node_network_errors: IntCounter,
}

impl RegistersMetrics for L2NodeMetrics {
    fn metrics(&self) -> Vec<Box<dyn Collector>> {
        vec![Box::new(self.l2_node_network_errors.clone())]
    }
}

impl Default for L2NodeMetrics {
    fn default() -> Self {
        let l2_node_network_errors = IntCounter::with_opts(Opts::new(
            "l2_node_network_errors",
            "Number of network errors encountered while querying for transaction receipts.",
        ))
        .expect("l2_node_network_errors metric to be correctly configured");
        Self {
            l2_node_network_errors,
        }
    }
}
