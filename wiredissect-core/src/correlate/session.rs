//! Analysis-session state.

use super::{SyntheticIds, TransactionCorrelator};

/// Tunables for one analysis session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on messages decoded from one transport buffer.
    pub max_messages_per_buffer: usize,
    /// Upper bound on TLV entries walked per region.
    pub max_tlv_entries: usize,
    /// Substitute counter ids for zero transaction ids where a protocol asks
    /// for it.
    pub synthetic_ids: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_messages_per_buffer: 256,
            max_tlv_entries: 128,
            synthetic_ids: true,
        }
    }
}

impl SessionConfig {
    pub fn with_max_messages_per_buffer(mut self, max: usize) -> Self {
        self.max_messages_per_buffer = max;
        self
    }

    pub fn with_max_tlv_entries(mut self, max: usize) -> Self {
        self.max_tlv_entries = max;
        self
    }

    pub fn with_synthetic_ids(mut self, enabled: bool) -> Self {
        self.synthetic_ids = enabled;
        self
    }
}

/// Mutable state scoped to one capture: the correlation table and the
/// synthetic id counters.
///
/// Dropping the session drops every pending transaction at once.
#[derive(Debug, Default)]
pub struct AnalysisSession {
    config: SessionConfig,
    correlator: TransactionCorrelator,
    synthetic: SyntheticIds,
}

impl AnalysisSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            correlator: TransactionCorrelator::new(),
            synthetic: SyntheticIds::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn correlator(&self) -> &TransactionCorrelator {
        &self.correlator
    }

    pub fn correlator_mut(&mut self) -> &mut TransactionCorrelator {
        &mut self.correlator
    }

    pub fn synthetic(&self) -> &SyntheticIds {
        &self.synthetic
    }

    pub fn synthetic_mut(&mut self) -> &mut SyntheticIds {
        &mut self.synthetic
    }
}
