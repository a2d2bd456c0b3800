//! Cross-message state: request/response correlation.
//!
//! - [`CorrelationKey`] - (conversation, transaction id, response type)
//! - [`TransactionCorrelator`] - exactly-once request/response matching
//! - [`SyntheticIds`] - counter ids for protocols that send zero ids
//! - [`AnalysisSession`] - owns both for the lifetime of one capture

mod correlator;
mod key;
mod session;
mod synthetic;

pub use correlator::{
    MatchOutcome, PendingHandle, PendingTransaction, Registration, RequestParams,
    TransactionCorrelator,
};
pub use key::{ConversationId, CorrelationKey, Direction, MessageRef, TransactionId};
pub use session::{AnalysisSession, SessionConfig};
pub use synthetic::SyntheticIds;
