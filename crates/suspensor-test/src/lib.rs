//! Helpers for testing resources, gates and the render host.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Timer-driven tests should run with `#[tokio::test(start_paused = true)]`. The
//!    latency of a [`CountingFetch`] is a tokio sleep, so paused time auto-advances
//!    through it and the tests stay deterministic.
//!
//!  - A [`ManualFetch`] never settles on its own. Hold on to it for the whole test and
//!    settle the outstanding calls explicitly.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `suspensor` crates and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("suspensor_service=trace,suspensor=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

type Respond<R, V> = dyn Fn(R) -> anyhow::Result<V> + Send + Sync;

/// A fake fetch function that counts its calls.
///
/// Each call sleeps for the configured latency and then answers with the response
/// function.
pub struct CountingFetch<R, V> {
    calls: Arc<AtomicUsize>,
    latency: Duration,
    respond: Arc<Respond<R, V>>,
}

impl<R, V> Clone for CountingFetch<R, V> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
            latency: self.latency,
            respond: Arc::clone(&self.respond),
        }
    }
}

impl<R, V> fmt::Debug for CountingFetch<R, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingFetch")
            .field("calls", &self.calls.load(Ordering::SeqCst))
            .field("latency", &self.latency)
            .finish()
    }
}

impl<R, V> CountingFetch<R, V>
where
    R: Send + 'static,
    V: Send + 'static,
{
    /// Creates a fetch that answers with `respond` after 100ms.
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(R) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            latency: Duration::from_millis(100),
            respond: Arc::new(respond),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// How often the fetch function was called so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the fetch function.
    pub fn fetch_fn(
        &self,
    ) -> impl Fn(R) -> BoxFuture<'static, anyhow::Result<V>> + Send + Sync + 'static {
        let this = self.clone();
        move |request: R| {
            this.calls.fetch_add(1, Ordering::SeqCst);
            let latency = this.latency;
            let respond = Arc::clone(&this.respond);
            async move {
                tokio::time::sleep(latency).await;
                respond(request)
            }
            .boxed()
        }
    }
}

/// A fake fetch function whose calls are settled by the test.
pub struct ManualFetch<V> {
    waiting: Arc<Mutex<VecDeque<oneshot::Sender<anyhow::Result<V>>>>>,
}

impl<V> Clone for ManualFetch<V> {
    fn clone(&self) -> Self {
        Self {
            waiting: Arc::clone(&self.waiting),
        }
    }
}

impl<V> fmt::Debug for ManualFetch<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualFetch")
            .field("waiting", &self.waiting.lock().unwrap().len())
            .finish()
    }
}

impl<V> Default for ManualFetch<V> {
    fn default() -> Self {
        Self {
            waiting: Default::default(),
        }
    }
}

impl<V: Send + 'static> ManualFetch<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of calls that have not been settled yet.
    pub fn waiting(&self) -> usize {
        self.waiting.lock().unwrap().len()
    }

    /// Settles the oldest outstanding call. Returns `false` if there was none.
    pub fn settle(&self, result: anyhow::Result<V>) -> bool {
        let sender = self.waiting.lock().unwrap().pop_front();
        match sender {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }

    /// Returns the fetch function. Requests are ignored.
    pub fn fetch_fn<R: 'static>(
        &self,
    ) -> impl Fn(R) -> BoxFuture<'static, anyhow::Result<V>> + Send + Sync + 'static {
        let waiting = Arc::clone(&self.waiting);
        move |_request: R| {
            let (sender, receiver) = oneshot::channel();
            waiting.lock().unwrap().push_back(sender);
            async move {
                receiver
                    .await
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("manual fetch dropped")))
            }
            .boxed()
        }
    }
}
