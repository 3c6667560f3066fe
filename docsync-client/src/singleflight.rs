//! Single-flight coordination: at most one in-flight fetch per key.
//!
//! The first caller for a key installs a shared future and drives the
//! actual producer; everyone who arrives before it resolves joins the same
//! future and receives the same eventual result, without issuing a second
//! network round. The registration is removed inside the shared future,
//! atomically with resolution, so a later call always starts fresh work.

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Mutex;

type Flight<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// A table of in-flight fetches, one per key.
#[derive(Debug)]
pub struct SingleFlight<K, V, E> {
    flights: Arc<Mutex<HashMap<K, Flight<V, E>>>>,
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty flight table.
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `producer` for `key`, or join the in-flight run if one exists.
    ///
    /// Returns the shared result and whether this caller led the flight.
    /// A joiner's `producer` is dropped unpolled - it never runs. The
    /// leader flag lets the caller treat failures asymmetrically: the
    /// leader observes the raw error (for logging and propagation) while
    /// joiners degrade to a fallback value.
    pub async fn fetch_or_join<F>(&self, key: K, producer: F) -> (Result<V, E>, bool)
    where
        F: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (flight, led) = {
            let mut flights = self.flights.lock().await;
            if let Some(existing) = flights.get(&key) {
                (existing.clone(), false)
            } else {
                let table = Arc::clone(&self.flights);
                let flight_key = key.clone();
                let flight = async move {
                    let result = producer.await;
                    // Deregister before any caller can observe the result,
                    // so a subsequent call always starts fresh work.
                    table.lock().await.remove(&flight_key);
                    result
                }
                .boxed()
                .shared();
                flights.insert(key, flight.clone());
                (flight, true)
            }
        };
        (flight.await, led)
    }

    /// Number of keys currently in flight.
    pub async fn in_flight(&self) -> usize {
        self.flights.lock().await.len()
    }
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
