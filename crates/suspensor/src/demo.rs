//! The demo app: three routes backed by simulated quote and delay data.
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use suspensor_service::caching::{Fetcher, Resource};
use suspensor_service::config::Config;
use suspensor_service::host::{AsyncRouteProvider, Frame};
use suspensor_service::routing::{AsyncRoute, Route};

use crate::cli::OutputFormat;

/// Canned responses of the simulated quote service.
const QUOTES: &str = r#"{
    "aapl": { "companyName": "Apple Inc.", "symbol": "AAPL", "change": 1.2 },
    "msft": { "companyName": "Microsoft Corporation", "symbol": "MSFT", "change": -0.35 }
}"#;

/// A stock quote as returned by the quote service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub company_name: String,
    pub symbol: String,
    pub change: f64,
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) {}%", self.company_name, self.symbol, self.change)
    }
}

/// A request for an artificial delay, identified by `id`.
#[derive(Clone, Debug)]
struct Delay {
    id: &'static str,
    duration: Duration,
}

impl Delay {
    fn new(id: &'static str, millis: u64) -> Self {
        Self {
            id,
            duration: Duration::from_millis(millis),
        }
    }
}

/// What the demo app shows.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "screen", rename_all = "lowercase")]
pub enum Screen {
    Spinner,
    Home,
    About { quote: Quote, delay: String },
    Settings { delays: Vec<String> },
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Screen::Spinner => write!(f, "Spinner"),
            Screen::Home => write!(f, "Home"),
            Screen::About { quote, delay } => write!(f, "About({quote}, {delay})"),
            Screen::Settings { delays } => write!(f, "Settings({})", delays.join(", ")),
        }
    }
}

async fn fetch_quote(ticker: String, latency: Duration) -> Result<Quote> {
    tokio::time::sleep(latency).await;
    let mut quotes: BTreeMap<String, Quote> =
        serde_json::from_str(QUOTES).context("invalid quote fixtures")?;
    quotes
        .remove(&ticker)
        .with_context(|| format!("no quote for ticker {ticker}"))
}

/// The demo app and its data sources.
#[derive(Debug)]
pub struct App {
    quotes: Resource<String, String, Quote>,
    provider: AsyncRouteProvider<Screen>,
}

impl App {
    pub fn new(config: &Config) -> Self {
        let latency = config.demo.quote_latency;
        let quotes = Resource::new("quotes", move |ticker: String| fetch_quote(ticker, latency))
            .with_config(&config.cache);

        // delays are memoized per id but never coalesced
        let delays = Fetcher::with_key(
            "delays",
            |delay: Delay| async move {
                tokio::time::sleep(delay.duration).await;
                Ok::<_, anyhow::Error>(delay.id.to_owned())
            },
            |delay: &Delay| delay.id,
        );

        let about = {
            let quotes = quotes.clone();
            let delays = delays.clone();
            AsyncRoute::new(Route::exact("/about")).with_render(move |_| {
                let quote = quotes.read("aapl".to_owned()).into_result()?;
                let delay = delays.read(Delay::new("fizzsd", 1000)).into_result()?;
                Ok(Screen::About { quote, delay })
            })
        };

        let settings = AsyncRoute::new(Route::exact("/settings")).with_render(move |_| {
            let fizz = delays.read(Delay::new("fizz", 1000)).into_result()?;
            let buzz = delays.read(Delay::new("buzz", 2000)).into_result()?;
            Ok(Screen::Settings {
                delays: vec![fizz, buzz],
            })
        });

        let provider = AsyncRouteProvider::new(config.gate.timeout, Screen::Spinner)
            .with_route(AsyncRoute::new(Route::exact("/")).with_element(Screen::Home))
            .with_route(about)
            .with_route(settings);

        App { quotes, provider }
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.provider.routes().iter().map(AsyncRoute::route)
    }

    /// Forgets all cached quotes.
    pub fn flush(&self) {
        self.quotes.flush();
    }

    pub async fn navigate(&mut self, location: &str) -> Result<Vec<Frame<Screen>>> {
        self.provider
            .navigate(location)
            .await
            .with_context(|| format!("failed to navigate to {location}"))
    }
}

/// Writes `frames` to `out`, one per line.
pub fn print_frames<W: Write>(
    out: &mut W,
    frames: &[Frame<Screen>],
    format: OutputFormat,
) -> Result<()> {
    for frame in frames {
        match format {
            OutputFormat::Text => writeln!(out, "{frame}")?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, frame)?;
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use suspensor_service::config::GateConfig;

    use super::*;

    fn render(frames: &[Frame<Screen>]) -> String {
        let mut out = Vec::new();
        print_frames(&mut out, frames, OutputFormat::Text).unwrap();
        String::from_utf8(out).unwrap().trim_end().to_owned()
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_within_timeout() {
        suspensor_test::setup();
        let mut app = App::new(&Config::default());

        let frames = app.navigate("/").await.unwrap();
        insta::assert_snapshot!(render(&frames), @"/ /=Home");

        let start = tokio::time::Instant::now();
        let frames = app.navigate("/settings").await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        insta::assert_snapshot!(render(&frames), @"/settings /settings=Settings(fizz, buzz)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_with_fallback() {
        suspensor_test::setup();
        let config = Config {
            gate: GateConfig {
                timeout: Duration::from_secs(2),
            },
            ..Default::default()
        };
        let mut app = App::new(&config);
        app.navigate("/").await.unwrap();

        let frames = app.navigate("/about").await.unwrap();
        insta::assert_snapshot!(render(&frames), @r"
        /about [hidden] /=Home fallback=Spinner
        /about /about=About(Apple Inc. (AAPL) 1.2%, fizzsd)
        ");

        // the quote is cached, and the delay is memoized
        let start = tokio::time::Instant::now();
        let frames = app.navigate("/about").await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_refetches_quotes() {
        suspensor_test::setup();
        let mut app = App::new(&Config::default());
        app.navigate("/about").await.unwrap();

        app.flush();
        let start = tokio::time::Instant::now();
        let frames = app.navigate("/about").await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert!(!frames[0].hidden);
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_output() {
        let mut app = App::new(&Config::default());
        let frames = app.navigate("/").await.unwrap();

        let mut out = Vec::new();
        print_frames(&mut out, &frames, OutputFormat::Json).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["location"], "/");
        assert_eq!(json["hidden"], false);
        assert_eq!(json["content"][0]["content"]["screen"], "home");
        assert_eq!(json["fallback"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_unknown_ticker() {
        let error = fetch_quote("goog".into(), Duration::ZERO).await.unwrap_err();
        assert_eq!(error.to_string(), "no quote for ticker goog");
    }
}
