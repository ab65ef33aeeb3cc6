//! Correlation table - pending replies keyed by request id
//!
//! A caller registers a request id before sending its request, then waits on
//! the returned [`Pending`] with a deadline. Whoever receives the reply calls
//! [`Correlator::resolve`] or [`Correlator::reject`]. Completing an unknown id
//! (never registered, already completed, timed out) is a no-op, so a late reply
//! can never wake a stale waiter.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{Level, event};

use crate::domain::{account::RequestId, constant::correlation, error::LedgerError};

type Slot<T> = oneshot::Sender<Result<T, LedgerError>>;
type Table<T> = Arc<Mutex<HashMap<RequestId, Slot<T>>>>;

/// Shared table of outstanding requests
pub struct Correlator<T> {
    pending: Table<T>
}

impl<T> Clone for Correlator<T> {
    fn clone(&self) -> Self {
        Self { pending: Arc::clone(&self.pending) }
    }
}

impl<T> Default for Correlator<T> {
    fn default() -> Self {
        Self { pending: Arc::new(Mutex::new(HashMap::new())) }
    }
}

impl<T> fmt::Debug for Correlator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator").field("pending", &self.pending.lock().len()).finish()
    }
}

impl<T: Send + 'static> Correlator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pending entry for `request_id`.
    pub fn register(&self, request_id: RequestId) -> Result<Pending<T>, LedgerError> {
        let (sender, receiver) = oneshot::channel();

        let mut pending = self.pending.lock();
        if pending.contains_key(&request_id) {
            return Err(LedgerError::DuplicateRequest(request_id.to_string()));
        }
        pending.insert(request_id.clone(), sender);

        Ok(Pending { request_id, receiver, table: Arc::clone(&self.pending) })
    }

    /// Complete `request_id` with a value. Returns false if nothing was waiting.
    pub fn resolve(&self, request_id: &RequestId, value: T) -> bool {
        self.complete(request_id, Ok(value))
    }

    /// Complete `request_id` with an error. Returns false if nothing was waiting.
    pub fn reject(&self, request_id: &RequestId, error: LedgerError) -> bool {
        self.complete(request_id, Err(error))
    }

    /// Reject every outstanding request.
    pub fn reject_all(&self, error: LedgerError) -> usize {
        let drained: Vec<Slot<T>> = self.pending.lock().drain().map(|(_, slot)| slot).collect();
        let count = drained.len();
        for slot in drained {
            let _ = slot.send(Err(error.clone()));
        }
        count
    }

    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.pending.lock().contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn complete(&self, request_id: &RequestId, outcome: Result<T, LedgerError>) -> bool {
        let slot = self.pending.lock().remove(request_id);
        match slot {
            Some(sender) => sender.send(outcome).is_ok(),
            None => {
                event!(Level::DEBUG, event = correlation::REPLY_DROPPED, request_id = %request_id);
                false
            }
        }
    }
}

/// Waiter side of a registered request. Dropping it discards the entry.
pub struct Pending<T> {
    request_id: RequestId,
    receiver:   oneshot::Receiver<Result<T, LedgerError>>,
    table:      Table<T>
}

impl<T> Pending<T> {
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Wait for the reply, failing with `Timeout` once `timeout` elapses.
    pub async fn wait(mut self, timeout: Duration) -> Result<T, LedgerError> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(LedgerError::Broker(format!("request {} was abandoned", self.request_id))),
            Err(_) => {
                event!(Level::DEBUG, event = correlation::REQUEST_TIMED_OUT,
                       request_id = %self.request_id, timeout_ms = %timeout.as_millis());
                Err(LedgerError::Timeout(self.request_id.to_string()))
            }
        }
    }
}

impl<T> Drop for Pending<T> {
    fn drop(&mut self) {
        self.table.lock().remove(&self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_completes_waiter() {
        let correlator: Correlator<u32> = Correlator::new();
        let id = RequestId::generate("t");
        let pending = correlator.register(id.clone()).unwrap();

        assert!(correlator.resolve(&id, 7));
        assert_eq!(pending.wait(Duration::from_secs(1)).await.unwrap(), 7);
        assert!(correlator.is_empty());
    }

    #[tokio::test]
    async fn test_reject_completes_waiter_with_error() {
        let correlator: Correlator<u32> = Correlator::new();
        let id = RequestId::generate("t");
        let pending = correlator.register(id.clone()).unwrap();

        assert!(correlator.reject(&id, LedgerError::ActorNotFound("X".to_string())));
        assert_eq!(pending.wait(Duration::from_secs(1)).await, Err(LedgerError::ActorNotFound("X".to_string())));
    }

    #[tokio::test]
    async fn test_timeout_then_late_reply_is_ignored() {
        let correlator: Correlator<u32> = Correlator::new();
        let id = RequestId::generate("t");
        let pending = correlator.register(id.clone()).unwrap();

        let outcome = pending.wait(Duration::from_millis(20)).await;

        assert!(matches!(outcome, Err(LedgerError::Timeout(_))));
        assert!(!correlator.contains(&id));
        assert!(!correlator.resolve(&id, 1));
        assert!(!correlator.reject(&id, LedgerError::InsufficientFunds));
    }

    #[tokio::test]
    async fn test_completion_happens_once() {
        let correlator: Correlator<u32> = Correlator::new();
        let id = RequestId::generate("t");
        let pending = correlator.register(id.clone()).unwrap();

        assert!(correlator.resolve(&id, 1));
        assert!(!correlator.resolve(&id, 2));
        assert_eq!(pending.wait(Duration::from_secs(1)).await.unwrap(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let correlator: Correlator<u32> = Correlator::new();
        let id = RequestId::from("same");
        let _first = correlator.register(id.clone()).unwrap();

        assert_eq!(correlator.register(id).err(), Some(LedgerError::DuplicateRequest("same".to_string())));
    }

    #[test]
    fn test_dropping_waiter_discards_entry() {
        let correlator: Correlator<u32> = Correlator::new();
        let id = RequestId::generate("t");
        let pending = correlator.register(id.clone()).unwrap();
        assert_eq!(correlator.len(), 1);

        drop(pending);

        assert!(correlator.is_empty());
        assert!(!correlator.resolve(&id, 3));
    }

    #[tokio::test]
    async fn test_reject_all_wakes_everyone() {
        let correlator: Correlator<u32> = Correlator::new();
        let first = correlator.register(RequestId::generate("a")).unwrap();
        let second = correlator.register(RequestId::generate("b")).unwrap();

        assert_eq!(correlator.reject_all(LedgerError::Broker("shutdown".to_string())), 2);
        assert!(first.wait(Duration::from_secs(1)).await.is_err());
        assert!(second.wait(Duration::from_secs(1)).await.is_err());
    }
}
