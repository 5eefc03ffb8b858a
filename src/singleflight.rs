use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::byterange::Ranges;

// Coalesces concurrent upstream work: at most one execution is in flight per
// key, and late arrivals wait for the leader's result instead of duplicating
// the fetch. The work runs detached, so it completes for the waiters even if
// the caller that started it goes away.
pub struct FlightGroup<T> {
    flights: Arc<Mutex<HashMap<String, Arc<Flight<T>>>>>,
}

// Fetches for the same cache key but different missing ranges are distinct
// upstream requests and must not coalesce.
pub fn flight_key(cache_key: &str, missing: &Ranges) -> String {
    if missing.is_empty() {
        return cache_key.to_string();
    }
    format!("{cache_key}|{missing}")
}

impl<T: Clone + Send + Sync + 'static> FlightGroup<T> {
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn run<F, Fut>(&self, key: String, work: F) -> T
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut flights = self.flights.lock().await;
            match flights.get(&key) {
                Some(flight) => flight.clone(),
                None => {
                    let flight = Arc::new(Flight::new());
                    flights.insert(key.clone(), flight.clone());

                    let registry = self.flights.clone();
                    let leader = flight.clone();
                    tokio::spawn(async move {
                        let result = work().await;
                        leader.finish(result).await;
                        registry.lock().await.remove(&key);
                    });
                    flight
                }
            }
        };

        flight.wait().await
    }
}

impl<T: Clone + Send + Sync + 'static> Default for FlightGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct Flight<T> {
    done: Notify,
    result: Mutex<Option<T>>,
}

impl<T: Clone> Flight<T> {
    fn new() -> Self {
        Self {
            done: Notify::new(),
            result: Mutex::new(None),
        }
    }

    async fn wait(&self) -> T {
        loop {
            if let Some(result) = self.result.lock().await.clone() {
                return result;
            }
            self.done.notified().await;
        }
    }

    async fn finish(&self, result: T) {
        *self.result.lock().await = Some(result);
        self.done.notify_waiters();
    }
}
