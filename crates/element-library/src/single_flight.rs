//! One in-flight registration per element.
//!
//! Flights are keyed by [`ElementKey`], the key the store matches elements
//! by, so two requests that resolve to the same element always share a
//! flight whatever asset type they name. The first caller starts the
//! registration on a background task; later callers join it and receive
//! the same result. Each flight owns a child cancellation token so it can
//! be stopped on its own (element deleted) or with all others (teardown).

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use element_core::ElementKey;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared handle on a running flight.
///
/// Resolves to `None` if the background task panicked or was aborted.
pub type Flight<T> = Shared<BoxFuture<'static, Option<T>>>;

struct FlightEntry<T: Clone> {
    id: u64,
    flight: Flight<T>,
    cancel: CancellationToken,
}

/// Whether [`InFlightRegistry::join_or_start`] started a new flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightRole {
    Started,
    Joined,
}

/// Registry of in-flight registrations keyed by element.
pub struct InFlightRegistry<T: Clone> {
    flights: Arc<DashMap<ElementKey, FlightEntry<T>>>,
    root: CancellationToken,
    next_id: AtomicU64,
}

impl<T: Clone> Default for InFlightRegistry<T> {
    fn default() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
            root: CancellationToken::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`, or start one with `start`.
    ///
    /// `start` receives the flight's cancellation token and is only called
    /// when no flight exists. The returned future is spawned, so it keeps
    /// running even if every caller stops awaiting it; its entry is removed
    /// when it finishes.
    pub fn join_or_start<F, Fut>(&self, key: &ElementKey, start: F) -> (Flight<T>, FlightRole)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        match self.flights.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!(%key, "Joining in-flight registration");
                (entry.get().flight.clone(), FlightRole::Joined)
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let cancel = self.root.child_token();
                let work = start(cancel.clone());

                let flights = Arc::clone(&self.flights);
                let task_key = key.clone();
                let handle = tokio::spawn(async move {
                    let output = work.await;
                    flights.remove_if(&task_key, |_, entry| entry.id == id);
                    output
                });

                let flights = Arc::clone(&self.flights);
                let task_key = key.clone();
                let flight = async move {
                    let output = handle.await.ok();
                    if output.is_none() {
                        flights.remove_if(&task_key, |_, entry| entry.id == id);
                    }
                    output
                }
                .boxed()
                .shared();

                entry.insert(FlightEntry {
                    id,
                    flight: flight.clone(),
                    cancel,
                });
                debug!(%key, flight_id = id, "Started registration flight");
                (flight, FlightRole::Started)
            }
        }
    }

    /// Cancel the flight for `key`. Returns false if none was running.
    pub fn cancel(&self, key: &ElementKey) -> bool {
        match self.flights.get(key) {
            Some(entry) => {
                debug!(%key, "Cancelling registration flight");
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running flight and every flight started afterwards.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Whether a flight runs for the element resolving to `key`.
    pub fn contains_key(&self, key: &ElementKey) -> bool {
        self.flights.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}
