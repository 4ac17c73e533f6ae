//! CLI commands implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use serde_json::Value;
#[cfg(feature = "browser")]
use tokio::sync::watch;
#[cfg(feature = "browser")]
use tracing::warn;

use crate::browser::{StaticEngine, StaticPage};
use crate::config::Settings;
use crate::crawler::{CrawlRequest, CrawlSettings, Crawler, ExtractionOutcome};
use crate::money::parse_price;

#[derive(Parser)]
#[command(name = "pricecrawl")]
#[command(about = "Extract prices from JavaScript-rendered product pages")]
#[command(version)]
pub struct Cli {
    /// Config file (default: ./pricecrawl.toml)
    #[arg(long, global = true, env = "PRICECRAWL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl product pages in a headless browser, printing one JSON outcome per line
    Crawl {
        /// Product page URLs
        #[arg(required = true)]
        urls: Vec<String>,
        /// Navigation timeout in seconds (default: from config)
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Number of pages crawled at once (default: 2)
        #[arg(short, long, default_value = "2")]
        concurrency: usize,
    },

    /// Run extraction over a saved HTML page (no browser)
    Extract {
        /// Saved HTML file
        file: PathBuf,
        /// URL the page was saved from (selects the site config)
        #[arg(short, long)]
        url: String,
    },

    /// List configured sites, or show the config a domain resolves to
    Sites {
        /// Domain to resolve
        domain: Option<String>,
    },

    /// Parse price text the way extraction does
    ParsePrice {
        /// Price text, e.g. "$1,299.00"
        text: String,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Crawl {
            urls,
            timeout,
            concurrency,
        } => cmd_crawl(&settings, &urls, timeout, concurrency).await,
        Commands::Extract { file, url } => cmd_extract(&settings, &file, &url).await,
        Commands::Sites { domain } => cmd_sites(&settings, domain.as_deref()),
        Commands::ParsePrice { text } => cmd_parse_price(&text),
    }
}

/// Outcome as a JSON line, always carrying the requested URL.
fn outcome_json(url: &str, outcome: &ExtractionOutcome) -> anyhow::Result<Value> {
    let mut value = serde_json::to_value(outcome)?;
    if let Value::Object(map) = &mut value {
        map.entry("url")
            .or_insert_with(|| Value::String(url.to_string()));
    }
    Ok(value)
}

#[cfg(feature = "browser")]
async fn cmd_crawl(
    settings: &Settings,
    urls: &[String],
    timeout: Option<u64>,
    concurrency: usize,
) -> anyhow::Result<()> {
    use futures::StreamExt;
    use indicatif::{ProgressBar, ProgressStyle};

    use crate::browser::{ChromiumEngine, RenderEngine};

    let registry = Arc::new(
        settings
            .load_registry()
            .context("Failed to load site table")?,
    );

    let engine = Arc::new(ChromiumEngine::new(settings.browser_config()));
    engine.start().await?;

    let crawler = Arc::new(Crawler::new(
        Arc::clone(&engine) as Arc<dyn RenderEngine>,
        registry,
        settings.crawl_settings(),
    ));

    let progress = ProgressBar::new(urls.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
            .unwrap()
            .progress_chars("█▓░"),
    );

    // One Ctrl-C cancels the crawls in flight and stops new ones starting.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining crawls");
            let _ = cancel_tx.send(true);
        }
    });

    let stop = cancel_rx.clone();
    let mut outcomes = futures::stream::iter(urls.iter().cloned())
        .take_while(move |_| {
            let stopped = *stop.borrow();
            futures::future::ready(!stopped)
        })
        .map(|url| {
            let crawler = Arc::clone(&crawler);
            let cancel = cancelled(cancel_rx.clone());
            async move {
                let mut request = CrawlRequest::new(url.clone());
                if let Some(secs) = timeout {
                    request = request.with_timeout(Duration::from_secs(secs));
                }
                let outcome = crawler.crawl_until(request, cancel).await;
                (url, outcome)
            }
        })
        .buffer_unordered(concurrency.max(1));

    let mut crawled = 0usize;
    let mut succeeded = 0usize;
    while let Some((url, outcome)) = outcomes.next().await {
        crawled += 1;
        if outcome.is_success() {
            succeeded += 1;
        }
        let line = outcome_json(&url, &outcome)?;
        progress.suspend(|| println!("{}", line));
        progress.set_message(url);
        progress.inc(1);
    }
    progress.finish_and_clear();

    drop(outcomes);
    interrupt.abort();
    drop(crawler);
    engine.stop().await;

    if crawled < urls.len() {
        eprintln!(
            "{} skipped {} pages after interrupt",
            style("!").yellow(),
            urls.len() - crawled
        );
    }

    eprintln!(
        "{} {}/{} pages priced",
        style("✓").green(),
        succeeded,
        urls.len()
    );
    Ok(())
}

/// Resolves once `cancel` turns true. A dropped sender never cancels.
#[cfg(feature = "browser")]
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    let closed = cancel.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

#[cfg(not(feature = "browser"))]
async fn cmd_crawl(
    _settings: &Settings,
    _urls: &[String],
    _timeout: Option<u64>,
    _concurrency: usize,
) -> anyhow::Result<()> {
    Err(anyhow::anyhow!(
        "Browser support not compiled. Rebuild with: cargo build --features browser"
    ))
}

async fn cmd_extract(settings: &Settings, file: &Path, url: &str) -> anyhow::Result<()> {
    let registry = Arc::new(
        settings
            .load_registry()
            .context("Failed to load site table")?,
    );
    let page = StaticPage::from_file(url, file)?;

    // Nothing renders in a saved page, so there is nothing to wait for.
    let crawl_settings = CrawlSettings {
        settle: Duration::ZERO,
        popup_pause: Duration::ZERO,
        scroll_pause: Duration::ZERO,
        ..settings.crawl_settings()
    };
    let crawler = Crawler::new(
        Arc::new(StaticEngine::single(page)),
        registry,
        crawl_settings,
    );

    let outcome = crawler.crawl(CrawlRequest::new(url)).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome_json(url, &outcome)?)?
    );
    Ok(())
}

fn cmd_sites(settings: &Settings, domain: Option<&str>) -> anyhow::Result<()> {
    let registry = settings
        .load_registry()
        .context("Failed to load site table")?;

    let Some(domain) = domain else {
        println!("\n{}", style("Configured sites").bold());
        for domain in registry.domains() {
            let site = registry.resolve(domain);
            match site.currency.as_deref().or(registry.known_currency(domain)) {
                Some(currency) => println!("  {} {}", domain, style(currency).dim()),
                None => println!("  {}", domain),
            }
        }
        println!("\n{} sites", registry.len());
        return Ok(());
    };

    let site = registry.resolve(domain);
    if std::ptr::eq(site, registry.default_config()) {
        println!(
            "{} {}",
            style(domain).cyan(),
            style("(no site config, using defaults)").yellow()
        );
    } else {
        println!("{} {}", style(domain).cyan(), style("→").dim());
        println!("{}", style(&site.domain).green());
    }
    println!("{}", toml::to_string_pretty(site)?);
    Ok(())
}

fn cmd_parse_price(text: &str) -> anyhow::Result<()> {
    match parse_price(text) {
        Some(amount) => {
            println!("{}", amount);
            Ok(())
        }
        None => Err(anyhow::anyhow!("No price in {:?}", text)),
    }
}
