//! One-shot, multi-subscriber completion slots.
//!
//! A [`Waiter`] is created for an id the first time it is registered in a
//! context. Later requests for the same id subscribe to the same waiter and
//! receive a clone of the single outcome.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use crate::error::StoreError;

/// Result delivered to every subscriber of a waiter.
pub type Outcome = Result<Option<Value>, StoreError>;

#[derive(Debug, Clone)]
pub struct Waiter {
    tx: Arc<watch::Sender<Option<Outcome>>>,
}

impl Waiter {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> WaiterHandle {
        WaiterHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// Deliver the outcome. Only the first call has any effect.
    pub fn complete(&self, outcome: Outcome) {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });
    }

    pub fn is_complete(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn same_as(&self, other: &Waiter) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side held by one caller.
#[derive(Debug)]
pub struct WaiterHandle {
    rx: watch::Receiver<Option<Outcome>>,
}

impl WaiterHandle {
    pub async fn wait(mut self) -> Outcome {
        match self.rx.wait_for(Option::is_some).await {
            Ok(ready) => match &*ready {
                Some(outcome) => outcome.clone(),
                None => Err(StoreError::Abandoned),
            },
            Err(_) => Err(StoreError::Abandoned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_all_subscribers_get_the_outcome() {
        let waiter = Waiter::new();
        let first = waiter.subscribe();
        let second = waiter.subscribe();

        waiter.complete(Ok(Some(json!(7))));
        // Late subscribers still see it.
        let late = waiter.subscribe();

        assert_eq!(first.wait().await.unwrap(), Some(json!(7)));
        assert_eq!(second.wait().await.unwrap(), Some(json!(7)));
        assert_eq!(late.wait().await.unwrap(), Some(json!(7)));
    }

    #[tokio::test]
    async fn test_first_completion_wins() {
        let waiter = Waiter::new();
        let handle = waiter.subscribe();
        waiter.complete(Err(StoreError::CircuitOpen));
        waiter.complete(Ok(None));

        assert!(matches!(handle.wait().await, Err(StoreError::CircuitOpen)));
        assert!(waiter.is_complete());
    }

    #[tokio::test]
    async fn test_dropped_waiter_abandons() {
        let waiter = Waiter::new();
        let handle = waiter.subscribe();
        drop(waiter);
        assert!(matches!(handle.wait().await, Err(StoreError::Abandoned)));
    }

    #[test]
    fn test_identity() {
        let a = Waiter::new();
        let b = a.clone();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&Waiter::new()));
    }
}
