//! Coordination between concurrent fetches and writes of the same key.
//!
//! [`FlightMap`] coalesces concurrent misses: the first caller registers a
//! flight and runs the fetch, later callers await its shared outcome.
//! [`KeyLocks`] serializes every storage write of a key, so a direct write and
//! a fetch landing at the same time cannot interleave.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use orca_core::{Key, OrcaResult, StorageError};
use tokio::sync::{oneshot, Mutex, MutexGuard};

/// Outcome of a flight, awaitable by any number of callers.
pub(crate) type Outcome<T> = Shared<BoxFuture<'static, OrcaResult<T>>>;

#[derive(Debug, Default)]
struct Ticket {
    superseded: AtomicBool,
}

struct Flight<T> {
    outcome: Outcome<T>,
    ticket: Arc<Ticket>,
}

/// Result of [`FlightMap::join_or_start`].
pub(crate) enum Join<T> {
    /// Another caller is already fetching this key.
    Joined(Outcome<T>),
    /// The caller registered a new flight and must drive it through the
    /// returned handle.
    Started(Outcome<T>, FlightHandle<T>),
}

/// In-flight fetches keyed by entity key.
pub(crate) struct FlightMap<T> {
    flights: DashMap<Key, Flight<T>>,
}

impl<T> FlightMap<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            flights: DashMap::new(),
        }
    }

    /// Join the flight for `key`, or register a new one.
    ///
    /// Registration is atomic: of any number of concurrent callers exactly
    /// one gets [`Join::Started`].
    pub(crate) fn join_or_start(self: &Arc<Self>, key: &Key) -> Join<T> {
        match self.flights.entry(key.clone()) {
            Entry::Occupied(entry) => Join::Joined(entry.get().outcome.clone()),
            Entry::Vacant(entry) => {
                let ticket = Arc::new(Ticket::default());
                let (tx, rx) = oneshot::channel();
                let outcome = async move {
                    rx.await.unwrap_or_else(|_| {
                        Err(StorageError::TaskFailed {
                            reason: "fetch task ended without an outcome".to_string(),
                        }
                        .into())
                    })
                }
                .boxed()
                .shared();
                entry.insert(Flight {
                    outcome: outcome.clone(),
                    ticket: Arc::clone(&ticket),
                });
                let handle = FlightHandle {
                    guard: FlightGuard {
                        flights: Arc::clone(self),
                        key: key.clone(),
                        ticket,
                    },
                    tx,
                };
                Join::Started(outcome, handle)
            }
        }
    }
}

impl<T> FlightMap<T> {
    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.flights.contains_key(key)
    }

    /// Mark the flight for `key`, if any, so its result is not stored.
    pub(crate) fn supersede(&self, key: &Key) -> bool {
        match self.flights.get(key) {
            Some(flight) => {
                flight.ticket.superseded.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Mark every current flight as superseded.
    pub(crate) fn supersede_all(&self) -> usize {
        let mut count = 0;
        for flight in self.flights.iter() {
            flight.ticket.superseded.store(true, Ordering::SeqCst);
            count += 1;
        }
        count
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.flights.len()
    }

    fn finish(&self, key: &Key, ticket: &Arc<Ticket>) {
        self.flights
            .remove_if(key, |_, flight| Arc::ptr_eq(&flight.ticket, ticket));
    }
}

/// Removes its flight from the map when dropped, including on panic.
struct FlightGuard<T> {
    flights: Arc<FlightMap<T>>,
    key: Key,
    ticket: Arc<Ticket>,
}

impl<T> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        self.flights.finish(&self.key, &self.ticket);
    }
}

/// Owner's end of a registered flight.
pub(crate) struct FlightHandle<T> {
    guard: FlightGuard<T>,
    tx: oneshot::Sender<OrcaResult<T>>,
}

impl<T> FlightHandle<T> {
    /// Whether a direct write or a clear happened since registration.
    pub(crate) fn is_superseded(&self) -> bool {
        self.guard.ticket.superseded.load(Ordering::SeqCst)
    }

    /// Unregister the flight, keeping the channel to its waiters open.
    pub(crate) fn land(self) -> Landed<T> {
        let Self { guard, tx } = self;
        drop(guard);
        Landed { tx }
    }
}

/// A flight that has left the map but not yet delivered its outcome.
pub(crate) struct Landed<T> {
    tx: oneshot::Sender<OrcaResult<T>>,
}

impl<T> Landed<T> {
    pub(crate) fn deliver(self, outcome: OrcaResult<T>) {
        // Every waiter may have gone away; nobody is left to tell.
        let _ = self.tx.send(outcome);
    }
}

const STRIPES: usize = 64;

/// Striped per-key write locks.
///
/// Unrelated keys may share a stripe; that only costs some contention.
pub(crate) struct KeyLocks {
    hasher: RandomState,
    stripes: Vec<Mutex<()>>,
}

impl KeyLocks {
    pub(crate) fn new() -> Self {
        Self {
            hasher: RandomState::new(),
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, key: &Key) -> &Mutex<()> {
        let index = self.hasher.hash_one(key) as usize % self.stripes.len();
        &self.stripes[index]
    }

    pub(crate) async fn lock(&self, key: &Key) -> MutexGuard<'_, ()> {
        self.stripe(key).lock().await
    }

    /// Lock without waiting; `None` while the key is being written.
    pub(crate) fn try_lock(&self, key: &Key) -> Option<MutexGuard<'_, ()>> {
        self.stripe(key).try_lock().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orca_core::OrcaError;

    fn started<T>(join: Join<T>) -> (Outcome<T>, FlightHandle<T>)
    where
        T: Clone + Send + Sync + 'static,
    {
        match join {
            Join::Started(outcome, handle) => (outcome, handle),
            Join::Joined(_) => panic!("expected a new flight"),
        }
    }

    #[tokio::test]
    async fn test_second_caller_joins() {
        let flights = Arc::new(FlightMap::<u32>::new());
        let key = Key::from("k");

        let (outcome, handle) = started(flights.join_or_start(&key));
        let joined = match flights.join_or_start(&key) {
            Join::Joined(outcome) => outcome,
            Join::Started(..) => panic!("expected to join the existing flight"),
        };
        assert!(flights.contains(&key));

        handle.land().deliver(Ok(7));
        assert!(!flights.contains(&key));
        assert_eq!(outcome.await, Ok(7));
        assert_eq!(joined.await, Ok(7));
    }

    #[tokio::test]
    async fn test_new_flight_after_landing() {
        let flights = Arc::new(FlightMap::<u32>::new());
        let key = Key::from("k");

        let (_, handle) = started(flights.join_or_start(&key));
        handle.land().deliver(Ok(1));

        let (outcome, handle) = started(flights.join_or_start(&key));
        handle.land().deliver(Ok(2));
        assert_eq!(outcome.await, Ok(2));
    }

    #[tokio::test]
    async fn test_dropped_handle_fails_waiters_and_unregisters() {
        let flights = Arc::new(FlightMap::<u32>::new());
        let key = Key::from("k");

        let (outcome, handle) = started(flights.join_or_start(&key));
        drop(handle);

        assert_eq!(flights.len(), 0);
        assert!(matches!(
            outcome.await,
            Err(OrcaError::Storage(StorageError::TaskFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_supersede_marks_only_that_flight() {
        let flights = Arc::new(FlightMap::<u32>::new());
        let (_, a) = started(flights.join_or_start(&Key::from("a")));
        let (_, b) = started(flights.join_or_start(&Key::from("b")));

        assert!(flights.supersede(&Key::from("a")));
        assert!(!flights.supersede(&Key::from("missing")));
        assert!(a.is_superseded());
        assert!(!b.is_superseded());

        assert_eq!(flights.supersede_all(), 2);
        assert!(b.is_superseded());
    }

    #[tokio::test]
    async fn test_key_lock_blocks_try_lock() {
        let locks = KeyLocks::new();
        let key = Key::from("k");

        let guard = locks.lock(&key).await;
        assert!(locks.try_lock(&key).is_none());
        drop(guard);
        assert!(locks.try_lock(&key).is_some());
    }
}
