use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use super::FetchError;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;

/// A handle to an in-flight fetch.
///
/// Every clone observes the same underlying operation, and awaiting any of them yields
/// its settled result. The operation settles exactly once, no matter how many clones
/// are awaited.
pub struct Pending<V> {
    resource: &'static str,
    fetch: SharedFetch<V>,
}

impl<V: Clone> Pending<V> {
    pub(super) fn new(resource: &'static str, fetch: SharedFetch<V>) -> Self {
        Self { resource, fetch }
    }

    /// The name of the resource this fetch belongs to.
    pub fn resource(&self) -> &'static str {
        self.resource
    }

    /// Returns `true` once the operation has settled.
    pub fn is_settled(&self) -> bool {
        self.fetch.peek().is_some()
    }
}

impl<V: Clone + Send + Sync + 'static> Pending<V> {
    /// Starts driving the fetch on the ambient tokio runtime, if there is one.
    ///
    /// Without a runtime the fetch makes progress only while somebody awaits it.
    pub(super) fn drive(&self) {
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(self.clone());
        }
    }
}

impl<V> Clone for Pending<V> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource,
            fetch: self.fetch.clone(),
        }
    }
}

impl<V> fmt::Debug for Pending<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> Future for Pending<V> {
    type Output = Result<V, FetchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.fetch.poll_unpin(cx)
    }
}

/// The outcome of reading from a [`Resource`](super::Resource) or [`Fetcher`](super::Fetcher).
#[derive(Debug, Clone)]
pub enum Read<V> {
    /// The value was already resolved.
    Ready(V),
    /// The value is not available yet. The render pass should be abandoned and retried
    /// once the handle settles.
    Pending(Pending<V>),
}

impl<V> Read<V> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Read::Ready(_))
    }

    /// Returns the resolved value, if any.
    pub fn ready(self) -> Option<V> {
        match self {
            Read::Ready(value) => Some(value),
            Read::Pending(_) => None,
        }
    }

    /// Converts into a `Result`, so that render code can suspend with `?`.
    ///
    /// The `Err` side converts into a [`Suspension`].
    pub fn into_result(self) -> Result<V, Pending<V>> {
        match self {
            Read::Ready(value) => Ok(value),
            Read::Pending(pending) => Err(pending),
        }
    }
}

/// A type-erased [`Pending`] that aborted a render pass.
///
/// The host awaits it and retries the pass afterwards. It resolves to the fetch error
/// if the operation failed.
pub struct Suspension {
    resource: &'static str,
    settled: BoxFuture<'static, Result<(), FetchError>>,
}

impl Suspension {
    /// The name of the resource that was not ready.
    pub fn resource(&self) -> &'static str {
        self.resource
    }
}

impl fmt::Debug for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspension")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl<V: Clone + Send + Sync + 'static> From<Pending<V>> for Suspension {
    fn from(pending: Pending<V>) -> Self {
        Suspension {
            resource: pending.resource,
            settled: pending.map(|result| result.map(|_| ())).boxed(),
        }
    }
}

impl Future for Suspension {
    type Output = Result<(), FetchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.settled.poll_unpin(cx)
    }
}
