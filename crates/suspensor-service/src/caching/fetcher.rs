use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use futures::FutureExt;

use super::{FetchError, FetchFn, KeyFn, Pending, Read, boxed_fetch};

/// A per-instance memoizer without request coalescing.
///
/// Unlike [`Resource`](super::Resource), it keeps no record of in-flight fetches: every
/// read of an unresolved key starts another fetch. Once any of them succeeds, the value
/// is stored and all further reads return it. It cannot be flushed.
///
/// Clones share the resolved values.
pub struct Fetcher<R, K, V> {
    name: &'static str,
    fetch: Arc<FetchFn<R, V>>,
    key_fn: Arc<KeyFn<R, K>>,
    resolved: Arc<Mutex<HashMap<K, V>>>,
}

impl<R, K, V> Clone for Fetcher<R, K, V> {
    fn clone(&self) -> Self {
        Fetcher {
            name: self.name,
            fetch: Arc::clone(&self.fetch),
            key_fn: Arc::clone(&self.key_fn),
            resolved: Arc::clone(&self.resolved),
        }
    }
}

impl<R, K, V> fmt::Debug for Fetcher<R, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolved = self.resolved.try_lock().map(|r| r.len()).ok();
        f.debug_struct("Fetcher")
            .field("name", &self.name)
            .field("resolved", &resolved)
            .finish()
    }
}

impl<R, V> Fetcher<R, R, V>
where
    R: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a fetcher that uses the request itself as the key.
    pub fn new<F, Fut, E>(name: &'static str, fetch: F) -> Self
    where
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<FetchError> + 'static,
    {
        Self::with_key(name, fetch, |request: &R| request.clone())
    }
}

impl<R, K, V> Fetcher<R, K, V>
where
    R: Send + 'static,
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn with_key<F, Fut, E, H>(name: &'static str, fetch: F, key_fn: H) -> Self
    where
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<FetchError> + 'static,
        H: Fn(&R) -> K + Send + Sync + 'static,
    {
        Fetcher {
            name,
            fetch: boxed_fetch(fetch),
            key_fn: Arc::new(key_fn),
            resolved: Default::default(),
        }
    }

    /// Reads the value for `request`, starting a new fetch if it is not resolved yet.
    pub fn read(&self, request: R) -> Read<V> {
        let key = (self.key_fn)(&request);
        if let Some(value) = self.resolved.lock().unwrap().get(&key) {
            return Read::Ready(value.clone());
        }

        metric!(counter("resource.fetch") += 1, "resource" => self.name);
        let fetch = (self.fetch)(request);
        let resolved = Arc::clone(&self.resolved);
        let name = self.name;
        let settle = async move {
            let result = fetch.await;
            match &result {
                Ok(value) => {
                    resolved.lock().unwrap().insert(key, value.clone());
                }
                Err(error) => {
                    metric!(counter("resource.fetch.error") += 1, "resource" => name);
                    tracing::error!(
                        resource = name,
                        error = error as &dyn std::error::Error,
                        "fetch failed",
                    );
                }
            }
            result
        };

        let in_flight = Pending::new(self.name, settle.boxed().shared());
        in_flight.drive();
        Read::Pending(in_flight)
    }
}
