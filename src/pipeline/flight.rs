//! Per-key single-flight execution.
//!
//! Guarantees at most one live computation per key. The first caller
//! for a key becomes the leader and runs the computation; concurrent
//! callers for the same key attach as followers and receive a clone of
//! the leader's outcome without re-running it. Keys with no live
//! computation impose no coordination on each other.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

/// The outcome of passing through the gate.
#[derive(Debug)]
pub struct Flight<T> {
    /// The computed (or shared) outcome. `None` only when the leader
    /// vanished without settling, i.e. a panic inside the computation.
    pub outcome: Option<T>,
    /// Whether this caller joined an existing in-flight computation.
    pub joined: bool,
}

/// Keyed single-flight gate.
pub struct FlightGate<T: Clone> {
    inflight: Mutex<HashMap<String, broadcast::Sender<T>>>,
}

/// Removes the in-flight entry when the leader finishes, including by
/// panic, so a crashed leader never wedges its key.
struct FlightGuard<'a, T: Clone> {
    gate: &'a FlightGate<T>,
    key: String,
}

impl<T: Clone> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        let mut inflight = self.gate.inflight.lock().expect("flight lock poisoned");
        inflight.remove(&self.key);
    }
}

enum Role<T> {
    Leader(broadcast::Sender<T>),
    Follower(broadcast::Receiver<T>),
}

impl<T: Clone> FlightGate<T> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys currently in flight.
    pub fn len(&self) -> usize {
        self.inflight.lock().expect("flight lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `compute` for `key`, or join the computation already
    /// running for it.
    ///
    /// The entry is removed before the outcome is broadcast, so every
    /// follower subscribed while the entry existed receives the
    /// outcome, and callers arriving afterwards start a fresh
    /// computation.
    pub async fn run_exclusive<F, Fut>(&self, key: &str, compute: F) -> Flight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let role = {
            let mut inflight = self.inflight.lock().expect("flight lock poisoned");
            match inflight.get(key) {
                Some(sender) => Role::Follower(sender.subscribe()),
                None => {
                    let (sender, _) = broadcast::channel(1);
                    inflight.insert(key.to_string(), sender.clone());
                    Role::Leader(sender)
                }
            }
        };

        match role {
            Role::Follower(mut receiver) => match receiver.recv().await {
                Ok(outcome) => Flight {
                    outcome: Some(outcome),
                    joined: true,
                },
                Err(_) => Flight {
                    outcome: None,
                    joined: true,
                },
            },
            Role::Leader(sender) => {
                let guard = FlightGuard {
                    gate: self,
                    key: key.to_string(),
                };
                let outcome = compute().await;
                drop(guard);
                let _ = sender.send(outcome.clone());
                Flight {
                    outcome: Some(outcome),
                    joined: false,
                }
            }
        }
    }
}

impl<T: Clone> Default for FlightGate<T> {
    fn default() -> Self {
        Self::new()
    }
}
