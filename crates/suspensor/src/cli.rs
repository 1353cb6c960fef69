//! Exposes the command line application.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use suspensor_service::config::Config;
use suspensor_service::metrics;

use crate::demo;
use crate::logging;

/// How frames are printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per frame.
    Text,
    /// One JSON object per frame.
    Json,
}

/// Suspensor commands.
#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Navigate the demo app and print every frame that is committed on the way.
    Navigate {
        /// The locations to visit, in order.
        #[arg(default_values_t = ["/".to_owned(), "/about".to_owned()])]
        locations: Vec<String>,

        /// The output format.
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Flush the quote cache before every navigation.
        #[arg(long)]
        no_cache: bool,
    },

    /// List the routes of the demo app.
    Routes,
}

/// Renders suspending route transitions of a demo app.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        ..Default::default()
    });

    // SAFETY: We are still single-threaded at this point, the runtime is built below.
    unsafe { logging::init_logging(&config) };
    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd.as_str(),
            config.metrics.custom_tags.clone(),
        )
        .context("failed to configure statsd")?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("suspensor")
        .build()
        .context("failed to start the runtime")?;

    match cli.command {
        Command::Navigate {
            locations,
            format,
            no_cache,
        } => runtime.block_on(async {
            let mut app = demo::App::new(&config);
            let mut stdout = std::io::stdout().lock();
            for location in &locations {
                if no_cache {
                    app.flush();
                }
                let frames = app.navigate(location).await?;
                demo::print_frames(&mut stdout, &frames, format)?;
            }
            Ok::<_, anyhow::Error>(())
        })?,
        Command::Routes => {
            let app = demo::App::new(&config);
            for route in app.routes() {
                let kind = if route.is_exact() { "exact" } else { "prefix" };
                println!("{} ({kind})", route.path());
            }
        }
    }

    Ok(())
}
