use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use futures::FutureExt;

use crate::config::CacheConfig;
use crate::utils::defer::defer;

use super::{FetchError, FetchFn, KeyFn, Pending, Read, boxed_fetch};

/// One generation of resolved values and in-flight fetches.
///
/// [`Resource::flush`] swaps in a fresh generation. Fetches started in an older
/// generation only hold a [`Weak`] reference to it, so their settlement is dropped once
/// nobody reads from that generation anymore.
struct Generation<K, V> {
    id: u64,
    resolved: moka::sync::Cache<K, V>,
    pending: Mutex<HashMap<K, Pending<V>>>,
}

impl<K, V> Generation<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn new(name: &str, id: u64, capacity: Option<u64>) -> Self {
        let mut builder = moka::sync::Cache::builder().name(name);
        if let Some(capacity) = capacity {
            builder = builder.max_capacity(capacity);
        }

        Generation {
            id,
            resolved: builder.build(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Records the outcome of the in-flight fetch for `key`.
    ///
    /// The value is stored and the in-flight entry removed under the same lock, so a
    /// concurrent [`Resource::read`] either sees the value or the in-flight entry.
    fn settle(&self, name: &'static str, key: K, result: &Result<V, FetchError>) {
        let mut pending = self.pending.lock().unwrap();
        match result {
            Ok(value) => {
                tracing::trace!(resource = name, generation = self.id, "fetch settled");
                self.resolved.insert(key.clone(), value.clone());
            }
            Err(error) => {
                metric!(counter("resource.fetch.error") += 1, "resource" => name);
                tracing::error!(
                    resource = name,
                    error = error as &dyn std::error::Error,
                    "fetch failed, clearing in-flight entry",
                );
            }
        }
        pending.remove(&key);
    }
}

/// A keyed, coalescing cache in front of an asynchronous fetch function.
///
/// Reading a key that was resolved before returns the value right away. Otherwise the
/// read attaches to the in-flight fetch for that key, or starts one, and returns
/// [`Read::Pending`]. There is never more than one in-flight fetch per key.
///
/// Clones share the same stores, so a single instance can be passed to every component
/// that needs it.
pub struct Resource<R, K, V> {
    name: &'static str,
    fetch: Arc<FetchFn<R, V>>,
    key_fn: Arc<KeyFn<R, K>>,
    capacity: Option<u64>,
    generation: Arc<Mutex<Arc<Generation<K, V>>>>,
}

impl<R, K, V> Clone for Resource<R, K, V> {
    fn clone(&self) -> Self {
        Resource {
            name: self.name,
            fetch: Arc::clone(&self.fetch),
            key_fn: Arc::clone(&self.key_fn),
            capacity: self.capacity,
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<R, K, V> fmt::Debug for Resource<R, K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Resource");
        debug.field("name", &self.name);
        if let Ok(generation) = self.generation.try_lock() {
            let pending = generation.pending.try_lock().map(|p| p.len()).ok();
            debug
                .field("generation", &generation.id)
                .field("in-memory items", &generation.resolved.entry_count())
                .field("in-flight fetches", &pending);
        }
        debug.finish()
    }
}

impl<R, V> Resource<R, R, V>
where
    R: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a resource that uses the request itself as the cache key.
    pub fn new<F, Fut, E>(name: &'static str, fetch: F) -> Self
    where
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<FetchError> + 'static,
    {
        Self::with_key(name, fetch, |request: &R| request.clone())
    }
}

impl<R, K, V> Resource<R, K, V>
where
    R: Send + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a resource that derives cache keys from requests with `key_fn`.
    ///
    /// `key_fn` must be deterministic: requests that should share a cached value must
    /// produce equal keys.
    pub fn with_key<F, Fut, E, H>(name: &'static str, fetch: F, key_fn: H) -> Self
    where
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<FetchError> + 'static,
        H: Fn(&R) -> K + Send + Sync + 'static,
    {
        Resource {
            name,
            fetch: boxed_fetch(fetch),
            key_fn: Arc::new(key_fn),
            capacity: None,
            generation: Arc::new(Mutex::new(Arc::new(Generation::new(name, 0, None)))),
        }
    }

    /// Applies the in-memory capacity from the configuration.
    ///
    /// This starts a fresh generation, so it is meant to be called right after
    /// construction.
    pub fn with_config(mut self, config: &CacheConfig) -> Self {
        self.capacity = config.in_memory_capacity;
        let mut current = self.generation.lock().unwrap();
        *current = Arc::new(Generation::new(self.name, current.id + 1, self.capacity));
        drop(current);
        self
    }

    /// The name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn current(&self) -> Arc<Generation<K, V>> {
        Arc::clone(&self.generation.lock().unwrap())
    }

    /// Reads the value for `request`.
    ///
    /// Returns [`Read::Ready`] on a cache hit. Otherwise returns [`Read::Pending`] with
    /// the in-flight fetch for the request's key, starting that fetch if there is none
    /// yet.
    pub fn read(&self, request: R) -> Read<V> {
        let key = (self.key_fn)(&request);
        metric!(counter("resource.access") += 1, "resource" => self.name);

        let generation = self.current();
        // settlement stores the value under this lock, so both stores are consistent here
        let mut pending = generation.pending.lock().unwrap();
        if let Some(value) = generation.resolved.get(&key) {
            tracing::trace!(resource = self.name, "cache hit");
            metric!(counter("resource.memory.hit") += 1, "resource" => self.name);
            return Read::Ready(value);
        }
        if let Some(in_flight) = pending.get(&key) {
            tracing::trace!(resource = self.name, "pending hit");
            metric!(counter("resource.pending.hit") += 1, "resource" => self.name);
            return Read::Pending(in_flight.clone());
        }

        tracing::trace!(resource = self.name, "cache miss");
        let in_flight = self.start_fetch(&generation, key.clone(), request);
        pending.insert(key, in_flight.clone());
        drop(pending);

        in_flight.drive();
        Read::Pending(in_flight)
    }

    fn start_fetch(&self, generation: &Arc<Generation<K, V>>, key: K, request: R) -> Pending<V> {
        let name = self.name;
        metric!(counter("resource.fetch") += 1, "resource" => name);

        let fetch = (self.fetch)(request);
        let generation: Weak<Generation<K, V>> = Arc::downgrade(generation);

        let settle = async move {
            let started = Instant::now();
            let abandoned = defer(move || {
                metric!(counter("resource.fetch.abandoned") += 1, "resource" => name);
            });
            let result = fetch.await;
            abandoned.cancel();
            metric!(timer("resource.fetch.duration") = started.elapsed(), "resource" => name);

            match generation.upgrade() {
                Some(generation) => generation.settle(name, key, &result),
                None => tracing::debug!(resource = name, "dropping settlement of a flushed cache"),
            }
            result
        };

        Pending::new(name, settle.boxed().shared())
    }

    /// Drops every resolved value and forgets all in-flight fetches.
    ///
    /// Subsequent reads behave like first-time misses. Fetches that are still running
    /// complete for whoever awaits them, but their values are not stored.
    pub fn flush(&self) {
        let mut current = self.generation.lock().unwrap();
        let next = Generation::new(self.name, current.id + 1, self.capacity);
        tracing::debug!(resource = self.name, generation = next.id, "flushing cache");
        *current = Arc::new(next);
        metric!(counter("resource.flush") += 1, "resource" => self.name);
    }

    /// Removes the resolved value for `request` and reads it again.
    ///
    /// This starts a fresh fetch unless one is already in flight for the same key, in
    /// which case the read attaches to it.
    pub fn refetch(&self, request: R) -> Read<V> {
        let key = (self.key_fn)(&request);
        self.current().resolved.invalidate(&key);
        self.read(request)
    }

    /// Returns the resolved value for `request` without starting a fetch.
    pub fn peek(&self, request: &R) -> Option<V> {
        let key = (self.key_fn)(request);
        self.current().resolved.get(&key)
    }

    /// Returns `true` if a fetch for the key of `request` is in flight.
    pub fn is_pending(&self, request: &R) -> bool {
        let key = (self.key_fn)(request);
        self.current().pending.lock().unwrap().contains_key(&key)
    }
}
