//! The compliant per-key serializer.
//!
//! Wraps idempotent background updates keyed by some identifier (e.g. a
//! coordination-service node path) so that concurrent callers for the same
//! key never run the payload in parallel, and a newer caller pre-empts an
//! older caller's retry sleep rather than queuing behind it.

use crate::events::SerializerEvent;
use hashbrown::HashMap;
use hermes_backoff::{BackoffSequence, BackoffSpec};
use hermes_core::events::EventListeners;
use parking_lot::Mutex;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::counter;

#[cfg(feature = "tracing")]
use tracing::debug;

/// Outcome of a serialized call.
///
/// `Superseded` is not an error: it means a newer call for the same key
/// arrived and this one abandoned silently, as documented for the per-key
/// serializer's "newer wins" contract.
#[derive(Debug)]
pub enum CallOutcome<T, E> {
    /// The payload ran to completion (success or unretryable/exhausted
    /// failure) under this call's lock acquisition.
    Completed(Result<T, E>),
    /// A newer caller for the same key pre-empted this call.
    Superseded,
}

impl<T, E> CallOutcome<T, E> {
    /// Returns true if this call was superseded by a newer one.
    pub fn is_superseded(&self) -> bool {
        matches!(self, CallOutcome::Superseded)
    }
}

struct KeyEntry {
    waiters: AtomicUsize,
    lock: tokio::sync::Mutex<()>,
    wakeup: tokio::sync::broadcast::Sender<()>,
}

impl KeyEntry {
    fn new() -> Self {
        let (wakeup, _rx) = tokio::sync::broadcast::channel(1);
        Self {
            waiters: AtomicUsize::new(0),
            lock: tokio::sync::Mutex::new(()),
            wakeup,
        }
    }
}

/// A table of per-key compliant locks.
///
/// Cloning shares the same underlying table (it's reference-counted), so a
/// single instance should be constructed per logical serializer and cloned
/// to every caller.
#[derive(Clone)]
pub struct CompliantSerializer<K> {
    table: Arc<Mutex<HashMap<K, Arc<KeyEntry>>>>,
    listeners: EventListeners<SerializerEvent>,
}

impl<K> Default for CompliantSerializer<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> CompliantSerializer<K>
where
    K: Hash + Eq + Clone,
{
    /// Creates an empty serializer with no registered listeners.
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            listeners: EventListeners::new(),
        }
    }

    /// Returns a serializer sharing this one's table with an additional
    /// event listener attached.
    pub fn with_listener<F>(&self, f: F) -> Self
    where
        F: Fn(&SerializerEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.clone();
        listeners.add(hermes_core::events::FnListener::new(f));
        Self {
            table: Arc::clone(&self.table),
            listeners,
        }
    }

    /// The number of keys currently tracked (held or awaiting acquisition).
    /// Exposed for tests verifying garbage collection.
    pub fn tracked_keys(&self) -> usize {
        self.table.lock().len()
    }

    fn entry_for(&self, key: &K) -> Arc<KeyEntry>
    where
        K: std::fmt::Debug,
    {
        let mut table = self.table.lock();
        Arc::clone(
            table
                .entry(key.clone())
                .or_insert_with(|| Arc::new(KeyEntry::new())),
        )
    }

    fn maybe_evict(&self, key: &K, entry: &Arc<KeyEntry>) {
        if entry.waiters.load(Ordering::SeqCst) != 0 {
            return;
        }
        let mut table = self.table.lock();
        if let Some(current) = table.get(key) {
            if Arc::ptr_eq(current, entry) {
                table.remove(key);
            }
        }
    }

    /// Runs `f` under the per-key lock for `key`, retrying on qualifying
    /// failures per `spec`/`should_retry`.
    ///
    /// Contract: broadcast a wakeup to interrupt any currently-sleeping
    /// older caller for this key, then contend for the lock. Once held,
    /// retry `f` until it succeeds, the predicate rejects an error, or the
    /// backoff sequence is exhausted. Between attempts, sleep on the wakeup
    /// signal with a timeout equal to the next backoff delay; waking early,
    /// or finding another caller already waiting for this key's lock when
    /// the sleep completes, means this call has been superseded and it
    /// abandons without raising.
    pub async fn call<T, E, F, Fut>(
        &self,
        key: K,
        spec: BackoffSpec,
        should_retry: impl Fn(&E) -> bool,
        mut f: F,
    ) -> CallOutcome<T, E>
    where
        K: std::fmt::Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key_label = format!("{key:?}");
        let entry = self.entry_for(&key);

        let _ = entry.wakeup.send(());

        entry.waiters.fetch_add(1, Ordering::SeqCst);
        let guard = entry.lock.lock().await;
        entry.waiters.fetch_sub(1, Ordering::SeqCst);

        #[cfg(feature = "tracing")]
        debug!(key = %key_label, "acquired compliant lock");
        self.listeners.emit(&SerializerEvent::Acquired {
            key: key_label.clone(),
            timestamp: Instant::now(),
        });

        let mut wakeup_rx = entry.wakeup.subscribe();
        let mut seq = BackoffSequence::new(spec);
        let mut attempts = 0usize;

        let outcome = 'attempts: loop {
            attempts += 1;
            match f().await {
                Ok(value) => break 'attempts CallOutcome::Completed(Ok(value)),
                Err(err) => {
                    if !should_retry(&err) {
                        break 'attempts CallOutcome::Completed(Err(err));
                    }
                    match seq.try_next() {
                        Err(_) => break 'attempts CallOutcome::Completed(Err(err)),
                        Ok(delay) => {
                            let superseded = tokio::select! {
                                _ = tokio::time::sleep(delay) => {
                                    entry.waiters.load(Ordering::SeqCst) > 0
                                }
                                _ = wakeup_rx.recv() => true,
                            };
                            if superseded {
                                break 'attempts CallOutcome::Superseded;
                            }
                            // else: timer elapsed and no one is waiting, retry.
                        }
                    }
                }
            }
        };

        drop(guard);
        self.maybe_evict(&key, &entry);

        match &outcome {
            CallOutcome::Completed(Ok(_)) => {
                #[cfg(feature = "metrics")]
                counter!("hermes_coalesce_calls_total", "result" => "completed").increment(1);
                self.listeners.emit(&SerializerEvent::Completed {
                    key: key_label,
                    timestamp: Instant::now(),
                    attempts,
                });
            }
            CallOutcome::Completed(Err(_)) => {
                #[cfg(feature = "metrics")]
                counter!("hermes_coalesce_calls_total", "result" => "exhausted").increment(1);
                self.listeners.emit(&SerializerEvent::Exhausted {
                    key: key_label,
                    timestamp: Instant::now(),
                    attempts,
                });
            }
            CallOutcome::Superseded => {
                #[cfg(feature = "metrics")]
                counter!("hermes_coalesce_calls_total", "result" => "superseded").increment(1);
                self.listeners.emit(&SerializerEvent::Superseded {
                    key: key_label,
                    timestamp: Instant::now(),
                });
            }
        }

        outcome
    }
}
