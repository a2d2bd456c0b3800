//! Request/response matching.

use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::{trace, warn};

use super::{CorrelationKey, MessageRef};

/// Request values a response needs for its own interpretation, such as the
/// register addresses a read asked for.
pub type RequestParams = SmallVec<[u32; 8]>;

/// Index of a pending transaction inside its correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingHandle(usize);

/// One request and, once seen, its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub key: CorrelationKey,
    pub request: MessageRef,
    pub request_ts_us: u64,
    pub response: Option<MessageRef>,
    pub response_ts_us: Option<u64>,
    pub params: RequestParams,
    /// Earlier unanswered request this one displaced from the key.
    pub retransmit_of: Option<MessageRef>,
}

impl PendingTransaction {
    #[inline]
    pub fn is_matched(&self) -> bool {
        self.response.is_some()
    }

    /// Microseconds between request and response.
    pub fn elapsed_us(&self) -> Option<u64> {
        self.response_ts_us
            .and_then(|ts| ts.checked_sub(self.request_ts_us))
    }
}

/// Result of registering a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub handle: PendingHandle,
    /// Unanswered request that held the same key before this one.
    pub replaced: Option<MessageRef>,
}

/// Result of offering a response to the correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// This response completed the transaction.
    First(PendingHandle),
    /// This response had already completed it (re-analysis).
    Repeat(PendingHandle),
    /// Another response completed it first; nothing was changed.
    Duplicate(PendingHandle),
}

impl MatchOutcome {
    pub fn handle(&self) -> PendingHandle {
        match self {
            MatchOutcome::First(h) | MatchOutcome::Repeat(h) | MatchOutcome::Duplicate(h) => *h,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, MatchOutcome::Duplicate(_))
    }
}

/// Session-scoped table of pending and completed transactions.
///
/// Entries are never removed individually; the whole table is dropped with
/// the analysis session. Lookups by message identity make every operation
/// idempotent under re-analysis: registering the same request twice, or
/// offering the same response twice, returns the original result.
#[derive(Debug, Default)]
pub struct TransactionCorrelator {
    entries: Vec<PendingTransaction>,
    by_key: HashMap<CorrelationKey, usize>,
    /// Requests and the responses that completed them.
    by_message: HashMap<MessageRef, usize>,
    /// Responses that arrived after a transaction was already complete.
    duplicates: HashMap<MessageRef, usize>,
}

impl TransactionCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request.
    ///
    /// Callers gate this on the first analysis pass; a request already
    /// registered returns its existing handle. A new request whose key is
    /// held by an unanswered one takes the key over; the older entry stays
    /// reachable through its own message reference.
    pub fn register_request(
        &mut self,
        key: CorrelationKey,
        request: MessageRef,
        request_ts_us: u64,
        params: RequestParams,
    ) -> Registration {
        if let Some(&idx) = self.by_message.get(&request) {
            if self.entries[idx].request == request {
                return Registration {
                    handle: PendingHandle(idx),
                    replaced: self.entries[idx].retransmit_of,
                };
            }
        }

        let replaced = self
            .by_key
            .get(&key)
            .map(|&idx| &self.entries[idx])
            .filter(|prev| !prev.is_matched())
            .map(|prev| prev.request);
        if let Some(prev) = replaced {
            warn!(%request, previous = %prev, transaction = %key.transaction_id, "request retransmitted before a response");
        }

        let idx = self.entries.len();
        self.entries.push(PendingTransaction {
            key,
            request,
            request_ts_us,
            response: None,
            response_ts_us: None,
            params,
            retransmit_of: replaced,
        });
        self.by_key.insert(key, idx);
        self.by_message.insert(request, idx);
        trace!(%request, transaction = %key.transaction_id, conversation = %key.conversation, "registered request");

        Registration {
            handle: PendingHandle(idx),
            replaced,
        }
    }

    /// Match a response against the pending request for `key`.
    ///
    /// Returns `None` when no request was registered under the key. The
    /// first response sets the transaction's response reference; later
    /// candidates come back as [`MatchOutcome::Duplicate`] and change
    /// nothing.
    pub fn match_response(
        &mut self,
        key: CorrelationKey,
        response: MessageRef,
        response_ts_us: u64,
    ) -> Option<MatchOutcome> {
        if let Some(&idx) = self.by_message.get(&response) {
            if self.entries[idx].response == Some(response) {
                return Some(MatchOutcome::Repeat(PendingHandle(idx)));
            }
        }
        if let Some(&idx) = self.duplicates.get(&response) {
            return Some(MatchOutcome::Duplicate(PendingHandle(idx)));
        }

        let idx = *self.by_key.get(&key)?;
        let entry = &mut self.entries[idx];
        match entry.response {
            None => {
                entry.response = Some(response);
                entry.response_ts_us = Some(response_ts_us);
                self.by_message.insert(response, idx);
                trace!(%response, request = %entry.request, "matched response");
                Some(MatchOutcome::First(PendingHandle(idx)))
            }
            Some(first) => {
                warn!(%response, %first, request = %entry.request, "answer already found for request");
                self.duplicates.insert(response, idx);
                Some(MatchOutcome::Duplicate(PendingHandle(idx)))
            }
        }
    }

    /// Outcome recorded for `response` by an earlier [`match_response`],
    /// without matching anything new. A response that was never matched
    /// stays uncorrelated.
    ///
    /// [`match_response`]: Self::match_response
    pub fn recorded_response(&self, response: MessageRef) -> Option<MatchOutcome> {
        if let Some(&idx) = self.duplicates.get(&response) {
            return Some(MatchOutcome::Duplicate(PendingHandle(idx)));
        }
        let &idx = self.by_message.get(&response)?;
        (self.entries[idx].response == Some(response)).then_some(MatchOutcome::Repeat(PendingHandle(idx)))
    }

    /// Read-only lookup by key.
    pub fn peek(&self, key: &CorrelationKey) -> Option<PendingHandle> {
        self.by_key.get(key).map(|&idx| PendingHandle(idx))
    }

    /// Transaction a message took part in, as request, response or
    /// duplicate response.
    pub fn find_by_message(&self, message: MessageRef) -> Option<PendingHandle> {
        self.by_message
            .get(&message)
            .or_else(|| self.duplicates.get(&message))
            .map(|&idx| PendingHandle(idx))
    }

    /// Transaction a response belongs to without matching it: the one it
    /// already completed, or the one currently holding its key.
    pub fn lookup_response(&self, key: &CorrelationKey, response: MessageRef) -> Option<PendingHandle> {
        self.find_by_message(response).or_else(|| self.peek(key))
    }

    pub fn get(&self, handle: PendingHandle) -> Option<&PendingTransaction> {
        self.entries.get(handle.0)
    }

    /// All transactions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingTransaction> {
        self.entries.iter()
    }

    /// Requests that never saw a response.
    pub fn unmatched(&self) -> impl Iterator<Item = &PendingTransaction> {
        self.entries.iter().filter(|e| !e.is_matched())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
