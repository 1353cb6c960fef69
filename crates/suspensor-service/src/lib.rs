//! Suspending data fetches, timeout gates and route transitions.
//!
//! Render code reads data through [`caching::Resource`]s. A read that is not ready yet
//! suspends the render pass, and the [`host`] retries the pass once the data arrives.
//! A [`timeout::TimeoutGate`] decides when a fallback is shown in the meantime, and the
//! [`routing`] module keeps the previous route on screen until then.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod host;
pub mod logging;
pub mod routing;
pub mod timeout;
pub mod utils;
