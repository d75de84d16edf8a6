use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use parking_lot::Mutex;
use sentinel_engine::{EngineConfig, TopologyEngine, forward, run_feed, shared};
use sentinel_events::redact::redact_event;
use sentinel_events::tap::DEFAULT_PENDING_TTL;
use sentinel_events::{
    ChannelFeed, EventFeed, EventJournal, EventStreamHub, FrameDecoder, JsonlFeed, JsonlRecorder,
};
use sentinel_protocol::McpEvent;
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;

use crate::api::{AppState, router, shutdown_signal};

const QUEUE_CAPACITY: usize = 1024;
const EXPIRY_INTERVAL: Duration = Duration::from_secs(60);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "sentineld")]
#[command(about = "Live topology and health metrics for MCP agent traffic")]
struct Cli {
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the engine and serve the read API.
    Serve(ServeArgs),
    /// Replay a recorded JSONL log once and print topology and metrics.
    Report(ReportArgs),
}

#[derive(Debug, Args)]
struct EngineArgs {
    /// Throughput window in seconds.
    #[arg(long, default_value_t = 60)]
    window_secs: u64,
    /// Ring radius of the topology layout.
    #[arg(long, default_value_t = 320.0)]
    radius: f64,
}

impl EngineArgs {
    fn config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_metrics_window(Duration::from_secs(self.window_secs.max(1)))
            .with_radius(self.radius)
    }
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,
    /// JSONL event feed to follow; `-` reads stdin.
    #[arg(long)]
    input: Option<PathBuf>,
    /// Append every committed event to this JSONL file.
    #[arg(long)]
    record: Option<PathBuf>,
    /// Live subscriber buffer before a slow client starts lagging.
    #[arg(long, default_value_t = 1024)]
    hub_buffer: usize,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Args)]
struct ReportArgs {
    /// Recorded JSONL log; `-` reads stdin.
    input: PathBuf,
    #[command(flatten)]
    engine: EngineArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Report(args) => report(args).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn open_feed(path: &Path) -> Result<Box<dyn EventFeed>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(JsonlFeed::stdin()));
    }
    Ok(Box::new(JsonlFeed::open(path).await?))
}

async fn serve(args: ServeArgs) -> Result<()> {
    let engine = shared(TopologyEngine::new(args.engine.config()));
    let hub = EventStreamHub::new(args.hub_buffer);

    let mut journal = EventJournal::new(hub.clone());
    if let Some(path) = &args.record {
        journal = journal.with_recorder(JsonlRecorder::open(path).await?);
        info!(path = %path.display(), "recording committed events");
    }

    let (ingest, mut queue) = ChannelFeed::bounded(QUEUE_CAPACITY);
    let driver = tokio::spawn({
        let engine = engine.clone();
        async move { run_feed(engine, &mut queue, &mut journal).await }
    });

    let producer = match &args.input {
        Some(path) => {
            let mut feed = open_feed(path).await?;
            let sender = ingest.clone();
            let source = path.display().to_string();
            Some(tokio::spawn(async move {
                match forward(feed.as_mut(), sender).await {
                    Ok(forwarded) => info!(source = %source, forwarded, "input feed finished"),
                    Err(error) => warn!(source = %source, %error, "input feed failed"),
                }
            }))
        }
        None => None,
    };

    let decoder = Arc::new(Mutex::new(FrameDecoder::new()));
    let expiry = tokio::spawn({
        let decoder = decoder.clone();
        async move {
            let mut ticker = tokio::time::interval(EXPIRY_INTERVAL);
            loop {
                ticker.tick().await;
                decoder.lock().expire_pending(DEFAULT_PENDING_TTL);
            }
        }
    });

    let (stop, shutdown) = watch::channel(false);
    let app = router(AppState {
        engine,
        ingest,
        hub,
        decoder,
        shutdown,
    });

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(listen = %args.listen, input = ?args.input, "sentineld listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown requested, closing live streams");
            let _ = stop.send(true);
        })
        .await?;

    expiry.abort();
    if let Some(producer) = producer {
        producer.abort();
    }
    match tokio::time::timeout(DRAIN_TIMEOUT, driver).await {
        Ok(Ok(Ok(summary))) => info!(events = summary.events, "engine drained"),
        Ok(Ok(Err(error))) => warn!(%error, "engine driver failed"),
        Ok(Err(error)) => warn!(%error, "engine driver panicked"),
        Err(_) => warn!("engine driver did not drain before timeout"),
    }
    Ok(())
}

async fn report(args: ReportArgs) -> Result<()> {
    let mut feed = open_feed(&args.input).await?;
    let mut events = Vec::new();
    while let Some(mut event) = feed.next_event().await? {
        redact_event(&mut event);
        events.push(event);
    }
    let engine = TopologyEngine::replay(args.engine.config(), events);

    // Throughput is measured against the last recorded event, not wall time.
    let as_of = engine
        .log()
        .last()
        .map(|entry| entry.event.timestamp)
        .unwrap_or_else(McpEvent::now_millis);

    let report = json!({
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "events": engine.log().len(),
        "collisions": engine.correlation().collisions(),
        "metrics": engine.metrics(as_of),
        "latency": engine.latency_summary(),
        "methods": engine.unique_methods(),
        "topology": engine.topology(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed rendering report")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults_match_engine_defaults() {
        let cli = Cli::try_parse_from(["sentineld", "serve"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.listen, "127.0.0.1:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(cli.log_format, LogFormat::Compact);

        let config = args.engine.config();
        let defaults = EngineConfig::default();
        assert_eq!(config.metrics_window, defaults.metrics_window);
        assert_eq!(config.layout, defaults.layout);
    }

    #[test]
    fn report_accepts_stdin_and_global_log_format() {
        let cli = Cli::try_parse_from([
            "sentineld",
            "report",
            "-",
            "--window-secs",
            "10",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        let Command::Report(args) = cli.command else {
            panic!("expected report");
        };
        assert_eq!(args.input, PathBuf::from("-"));
        assert_eq!(args.engine.config().metrics_window, Duration::from_secs(10));
    }
}
