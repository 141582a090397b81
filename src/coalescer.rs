use crate::error::{ResilienceError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Collapses concurrent identical operations into a single execution.
///
/// The first caller for a key runs the operation; everyone else arriving
/// while it is in flight awaits the same broadcast result. The
/// registration is removed before the result is delivered, so the next
/// call with the same key starts a fresh execution. This is not a cache:
/// nothing is held after resolution and there is no TTL.
pub struct RequestCoalescer<T: Clone> {
    in_flight: Mutex<HashMap<String, broadcast::Sender<Result<T>>>>,
}

impl<T: Clone> RequestCoalescer<T> {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `operation` under `key`, or wait for the execution already in
    /// flight under that key. Success and failure are both shared with
    /// every waiter.
    pub async fn coalesce<F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        // Registration and removal stay inside the mutex so a waiter
        // either subscribes before the result is broadcast or finds no
        // entry and leads a fresh execution. The lock is never held
        // across an await.
        let waiter = {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| ResilienceError::LockPoisoned("coalescer registry".to_string()))?;

            match in_flight.get(key) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _rx) = broadcast::channel(1);
                    in_flight.insert(key.to_string(), tx);
                    None
                }
            }
        };

        if let Some(mut rx) = waiter {
            return match rx.recv().await {
                Ok(result) => result,
                Err(_) => Err(ResilienceError::CoalesceFailed(key.to_string())),
            };
        }

        let result = operation().await;

        let tx = {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| ResilienceError::LockPoisoned("coalescer registry".to_string()))?;
            in_flight.remove(key)
        };
        if let Some(tx) = tx {
            // No waiters subscribed is fine.
            let _ = tx.send(result.clone());
        }

        result
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl<T: Clone> Default for RequestCoalescer<T> {
    fn default() -> Self {
        Self::new()
    }
}
