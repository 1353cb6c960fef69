use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Deserialize;
use suspensor_test::{CountingFetch, ManualFetch};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::config::CacheConfig;
use crate::host::render_to_completion;

use super::*;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Quote {
    company_name: String,
    symbol: String,
    change: f64,
}

fn quote_fetch() -> CountingFetch<String, Quote> {
    CountingFetch::new(|ticker: String| match ticker.as_str() {
        "aapl" => Ok(serde_json::from_str(
            r#"{"companyName": "Apple Inc.", "symbol": "AAPL", "change": 1.2}"#,
        )?),
        _ => anyhow::bail!("unknown ticker {ticker}"),
    })
}

fn unwrap_pending<V>(read: Read<V>) -> Pending<V> {
    match read {
        Read::Pending(pending) => pending,
        Read::Ready(_) => panic!("expected a pending read"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_coalesces_concurrent_reads() {
    suspensor_test::setup();
    let fetch = CountingFetch::new(|n: u32| Ok(n * 2));
    let resource = Resource::new("double", fetch.fetch_fn());

    let first = unwrap_pending(resource.read(21));
    let second = unwrap_pending(resource.read(21));
    assert_eq!(fetch.calls(), 1);
    assert!(resource.is_pending(&21));

    let (first, second) = futures::join!(first, second);
    assert_eq!(first, Ok(42));
    assert_eq!(second, Ok(42));
    assert_eq!(fetch.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_read_after_settle_hits_cache() {
    suspensor_test::setup();
    let fetch = CountingFetch::new(|n: u32| Ok(n * 2));
    let resource = Resource::new("double", fetch.fetch_fn());

    let pending = unwrap_pending(resource.read(1));
    assert_eq!(pending.await, Ok(2));

    assert_eq!(resource.read(1).ready(), Some(2));
    assert_eq!(resource.peek(&1), Some(2));
    assert!(!resource.is_pending(&1));
    assert_eq!(fetch.calls(), 1);

    // other keys are fetched separately
    assert!(!resource.read(2).is_ready());
    assert_eq!(fetch.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_flush() {
    suspensor_test::setup();
    let fetch = CountingFetch::new(|n: u32| Ok(n + 1));
    let resource = Resource::new("increment", fetch.fetch_fn());

    unwrap_pending(resource.read(1)).await.unwrap();
    assert!(resource.read(1).is_ready());

    resource.flush();
    assert_eq!(resource.peek(&1), None);

    let pending = unwrap_pending(resource.read(1));
    assert_eq!(fetch.calls(), 2);
    assert_eq!(pending.await, Ok(2));
    assert!(resource.read(1).is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_refetch() {
    suspensor_test::setup();
    let fetch = CountingFetch::new(|n: u32| Ok(n));
    let resource = Resource::new("identity", fetch.fetch_fn());

    unwrap_pending(resource.read(7)).await.unwrap();
    assert_eq!(fetch.calls(), 1);

    let pending = unwrap_pending(resource.refetch(7));
    assert_eq!(fetch.calls(), 2);

    // refetching while a fetch is in flight attaches to it
    let attached = unwrap_pending(resource.refetch(7));
    assert_eq!(fetch.calls(), 2);

    assert_eq!(pending.await, Ok(7));
    assert_eq!(attached.await, Ok(7));
    assert_eq!(resource.read(7).ready(), Some(7));
}

#[tokio::test(start_paused = true)]
async fn test_quote_render() {
    suspensor_test::setup();
    let fetch = quote_fetch().with_latency(Duration::from_millis(1500));
    let quotes = Resource::new("quotes", fetch.fetch_fn());

    let rendered = render_to_completion(|| {
        let quote = quotes.read("aapl".to_owned()).into_result()?;
        Ok(format!("{} ({}): {}", quote.company_name, quote.symbol, quote.change))
    })
    .await
    .unwrap();

    insta::assert_snapshot!(rendered, @"Apple Inc. (AAPL): 1.2");
    assert_eq!(fetch.calls(), 1);

    let cached = quotes.read("aapl".to_owned()).ready().unwrap();
    assert_eq!(cached.change, 1.2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_clears_in_flight() {
    suspensor_test::setup();
    let fetch = quote_fetch();
    let quotes = Resource::new("quotes", fetch.fetch_fn());

    let first = unwrap_pending(quotes.read("msft".to_owned()));
    let second = unwrap_pending(quotes.read("msft".to_owned()));
    let error = FetchError::Failed("unknown ticker msft".into());
    assert_eq!(first.await, Err(error.clone()));
    assert_eq!(second.await, Err(error));

    assert!(!quotes.is_pending(&"msft".to_owned()));
    assert_eq!(quotes.peek(&"msft".to_owned()), None);

    // the next read retries
    assert!(!quotes.read("msft".to_owned()).is_ready());
    assert_eq!(fetch.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_render() {
    suspensor_test::setup();
    let quotes = Resource::new("quotes", quote_fetch().fetch_fn());

    let result = render_to_completion(|| {
        let quote = quotes.read("goog".to_owned()).into_result()?;
        Ok(quote.symbol)
    })
    .await;
    assert_eq!(
        result,
        Err(FetchError::Failed("unknown ticker goog".into()))
    );
}

#[tokio::test]
async fn test_not_found() {
    suspensor_test::setup();
    let resource = Resource::new("files", |name: String| async move {
        Err::<String, _>(std::io::Error::new(std::io::ErrorKind::NotFound, name))
    });

    let pending = unwrap_pending(resource.read("missing.txt".into()));
    assert_eq!(pending.resource(), "files");
    assert_eq!(pending.await, Err(FetchError::NotFound));
}

#[tokio::test]
async fn test_flush_drops_in_flight_settlement() {
    suspensor_test::setup();
    let fetch = ManualFetch::new();
    let resource = Resource::new("manual", fetch.fetch_fn());

    let stale = unwrap_pending(resource.read("a"));
    resource.flush();

    assert!(fetch.settle(Ok(1)));
    assert_eq!(stale.clone().await, Ok(1));
    assert!(stale.is_settled());

    // the value was settled into the flushed generation
    assert_eq!(resource.peek(&"a"), None);
    let fresh = unwrap_pending(resource.read("a"));
    assert_eq!(fetch.waiting(), 1);

    assert!(fetch.settle(Ok(2)));
    assert_eq!(fresh.await, Ok(2));
    assert_eq!(resource.read("a").ready(), Some(2));
}

#[tokio::test]
async fn test_read_without_awaiting() {
    suspensor_test::setup();
    let fetch = ManualFetch::new();
    let resource = Resource::new("manual", fetch.fetch_fn());

    // the fetch is driven on the runtime even if the pending handle is dropped
    drop(resource.read(1u8));
    assert!(fetch.settle(Ok("one")));

    while resource.is_pending(&1) {
        tokio::task::yield_now().await;
    }
    assert_eq!(resource.read(1).ready(), Some("one"));
}

#[derive(Clone, Debug)]
struct QuoteRequest {
    ticker: String,
    currency: &'static str,
}

#[tokio::test(start_paused = true)]
async fn test_derived_keys() {
    suspensor_test::setup();
    let fetch = CountingFetch::new(|request: QuoteRequest| {
        Ok(format!("{} in {}", request.ticker, request.currency))
    });
    let quotes = Resource::with_key("quotes", fetch.fetch_fn(), |request: &QuoteRequest| {
        request.ticker.to_lowercase()
    });

    let upper = unwrap_pending(quotes.read(QuoteRequest {
        ticker: "AAPL".into(),
        currency: "USD",
    }));
    let lower = unwrap_pending(quotes.read(QuoteRequest {
        ticker: "aapl".into(),
        currency: "EUR",
    }));
    assert_eq!(fetch.calls(), 1);

    // both requests share the key, so they share the value of the first request
    assert_eq!(upper.await, Ok("AAPL in USD".to_owned()));
    assert_eq!(lower.await, Ok("AAPL in USD".to_owned()));
}

#[tokio::test(start_paused = true)]
async fn test_with_config() {
    suspensor_test::setup();
    let fetch = CountingFetch::new(|n: u64| Ok(n));
    let resource = Resource::new("bounded", fetch.fetch_fn()).with_config(&CacheConfig {
        in_memory_capacity: Some(16),
    });

    unwrap_pending(resource.read(3)).await.unwrap();
    assert_eq!(resource.peek(&3), Some(3));
    assert_eq!(resource.name(), "bounded");
}

#[tokio::test(start_paused = true)]
async fn test_fetcher_does_not_coalesce() {
    suspensor_test::setup();
    let fetch = CountingFetch::new(|n: u32| Ok(n * 10));
    let fetcher = Fetcher::new("tens", fetch.fetch_fn());

    let first = unwrap_pending(fetcher.read(1));
    let second = unwrap_pending(fetcher.read(1));
    assert_eq!(fetch.calls(), 2);

    assert_eq!(first.await, Ok(10));
    assert_eq!(second.await, Ok(10));

    assert_eq!(fetcher.read(1).ready(), Some(10));
    assert_eq!(fetch.calls(), 2);
}

#[tokio::test]
async fn test_fetcher_keeps_failures_out() {
    suspensor_test::setup();
    let fetch = ManualFetch::<u32>::new();
    let fetcher = Fetcher::new("manual", fetch.fetch_fn());

    let failed = unwrap_pending(fetcher.read("x"));
    assert!(fetch.settle(Err(anyhow::anyhow!("boom"))));
    assert_eq!(failed.await, Err(FetchError::Failed("boom".into())));

    assert!(!fetcher.read("x").is_ready());
    assert_eq!(fetch.waiting(), 1);
}

/// Counts the error events it sees.
struct ErrorEvents(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for ErrorEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn test_failed_fetch_logs_one_error() {
    let errors = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(ErrorEvents(Arc::clone(&errors)));
    let _guard = tracing::subscriber::set_default(subscriber);

    let fetch = ManualFetch::<u32>::new();
    let resource = Resource::new("manual", fetch.fetch_fn());
    let first = unwrap_pending(resource.read(1u8));
    let second = unwrap_pending(resource.read(1u8));
    assert!(fetch.settle(Err(anyhow::anyhow!("boom"))));
    assert!(first.await.is_err());
    assert!(second.await.is_err());
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    let fetcher = Fetcher::new("manual", fetch.fetch_fn());
    let failed = unwrap_pending(fetcher.read(1u8));
    assert!(fetch.settle(Err(anyhow::anyhow!("boom"))));
    assert!(failed.await.is_err());
    assert_eq!(errors.load(Ordering::SeqCst), 2);
}
