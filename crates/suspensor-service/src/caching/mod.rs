//! # Resource caching and suspension
//!
//! Components read their data through a [`Resource`]. A read never blocks: it either
//! returns the cached value or a [`Pending`] handle to the fetch that will produce it.
//! The render pass that hit a pending value is abandoned and the host retries it once
//! the handle settles. This is how a component "suspends".
//!
//! ## Stores
//!
//! A [`Resource`] keeps two stores, keyed by the output of a caller-supplied key
//! function:
//!
//! - The resolved store, an in-memory `moka` cache holding successful values. It is
//!   unbounded unless [`CacheConfig::in_memory_capacity`](crate::config::CacheConfig)
//!   is set.
//! - The pending store, holding one shared handle per key with a fetch in flight.
//!   Reads for a key that is already being fetched attach to that handle, so concurrent
//!   reads are coalesced into a single fetch.
//!
//! When a fetch settles successfully, its value is stored and its pending entry
//! removed, under one lock. A failed fetch only removes the pending entry: every
//! awaiter receives the [`FetchError`], and the next read starts a new fetch.
//!
//! ## Lifecycle
//!
//! - [`Resource::flush`] replaces both stores with empty ones. Fetches that were in
//!   flight still settle for their awaiters, but the result is not stored anywhere a
//!   new read can see it.
//! - [`Resource::refetch`] evicts one key and reads it again.
//!
//! ## Suspending render code
//!
//! [`Read::into_result`] turns a read into a `Result<V, Pending<V>>`, and
//! `Pending<V>` converts into the type-erased [`Suspension`]. Render closures returning
//! `Result<T, Suspension>` can therefore suspend with `?`:
//!
//! ```
//! use suspensor_service::caching::{FetchError, Resource, Suspension};
//!
//! fn render(quotes: &Resource<String, String, f64>) -> Result<String, Suspension> {
//!     let change = quotes.read("aapl".to_owned()).into_result()?;
//!     Ok(format!("AAPL {change}%"))
//! }
//!
//! let quotes = Resource::new("quotes", |_ticker: String| async { Ok::<_, FetchError>(1.2) });
//! assert!(render(&quotes).is_err());
//! ```
//!
//! ## Metrics
//!
//! All metrics are tagged with the `resource` name:
//!
//! - `resource.access`: All reads.
//! - `resource.memory.hit`: Reads served by the resolved store.
//! - `resource.pending.hit`: Reads that attached to an in-flight fetch.
//! - `resource.fetch`: Fetches started.
//! - `resource.fetch.error`: Fetches that failed.
//! - `resource.fetch.abandoned`: Fetches dropped before they settled.
//! - `resource.fetch.duration`: Time from the first poll of a fetch until it settled.
//! - `resource.flush`: Calls to [`Resource::flush`].

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{FutureExt, TryFutureExt};

mod fetch_error;
mod fetcher;
mod pending;
mod resource;

#[cfg(test)]
mod tests;

pub use fetch_error::FetchError;
pub use fetcher::Fetcher;
pub use pending::{Pending, Read, Suspension};
pub use resource::Resource;

type FetchFn<R, V> = dyn Fn(R) -> BoxFuture<'static, Result<V, FetchError>> + Send + Sync;

type KeyFn<R, K> = dyn Fn(&R) -> K + Send + Sync;

fn boxed_fetch<R, V, F, Fut, E>(fetch: F) -> Arc<FetchFn<R, V>>
where
    F: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<FetchError> + 'static,
{
    Arc::new(move |request: R| -> BoxFuture<'static, Result<V, FetchError>> {
        fetch(request).map_err(Into::into).boxed()
    })
}
