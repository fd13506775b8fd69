//! Per-key request coalescing.
//!
//! Callers for the same key join one flight. The first caller runs its load
//! future; every caller that joins while the flight is registered waits for
//! that future and receives a copy of its outcome, value or error. If the
//! running caller is dropped before finishing, the next waiter runs its own
//! load future instead.
//!
//! The map entry lives exactly as long as someone is registered on it.
//! Registration is counted under the map's shard lock and released by
//! [`Registration`]'s `Drop`, so a caller cancelled at any await point still
//! deregisters and the key can never stay stuck. A caller arriving after the
//! last registration is gone starts a new flight.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::OnceCell;

use crate::error::CacheError;

type Outcome = Result<Vec<u8>, Arc<CacheError>>;

struct Flight {
    outcome: Arc<OnceCell<Outcome>>,
    /// Callers registered on this flight.
    holders: usize,
}

/// In-process stampede guard keyed by namespaced cache key.
#[derive(Default)]
pub struct StampedeGuard {
    flights: DashMap<String, Flight>,
}

impl StampedeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`, running `load` only if no other caller
    /// has produced or is producing the outcome.
    pub async fn run<F, Fut>(&self, key: &str, load: F) -> Result<Vec<u8>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, CacheError>>,
    {
        let outcome = {
            let mut flight = self.flights.entry(key.to_string()).or_insert_with(|| Flight {
                outcome: Arc::new(OnceCell::new()),
                holders: 0,
            });
            flight.holders += 1;
            Arc::clone(&flight.outcome)
        };

        // Registered before awaiting so that cancellation deregisters.
        let _registration = Registration {
            flights: &self.flights,
            key,
        };

        let shared = outcome
            .get_or_init(move || async move { load().await.map_err(Arc::new) })
            .await;
        match shared {
            Ok(value) => Ok(value.clone()),
            Err(err) => Err(CacheError::from_shared(err)),
        }
    }

    /// Number of keys with a caller in flight.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}

/// One caller's membership in a flight; released on drop.
struct Registration<'a> {
    flights: &'a DashMap<String, Flight>,
    key: &'a str,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.flights.entry(self.key.to_string()) {
            entry.get_mut().holders -= 1;
            if entry.get().holders == 0 {
                entry.remove();
            }
        }
    }
}
