use activewatch::config::Config;
use activewatch::{create_backends, EventWatcher, MatchResult, TargetMatcher, TargetRegistry};
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "activewatch")]
#[command(about = "Reports which configured application is active on the desktop")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "activewatch.toml")]
    config: String,

    /// Emulate desktop events and windows instead of hooking the OS
    #[arg(long)]
    dry_run: bool,

    /// Log level, overrides the configuration file
    #[arg(long)]
    log_level: Option<String>,

    /// Run the matcher once, print the result and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
        config.validate()?;
    }

    init_tracing(&config.logging.level, &config.logging.format)?;

    info!("Starting activewatch v{}", env!("CARGO_PKG_VERSION"));
    info!(path = %args.config, "Configuration loaded");

    if args.dry_run {
        warn!("Dry-run mode: desktop events and windows are emulated");
    }

    let registry = Arc::new(config.registry()?);
    if registry.is_empty() {
        warn!("No targets configured, nothing can match");
    }

    let backends = create_backends(args.dry_run, config.dry_run_interval());
    let matcher = Arc::new(TargetMatcher::new(backends.desktop));

    if args.once {
        let result = evaluate(matcher, registry.clone()).await?;
        match result.keyword() {
            Some(keyword) => println!("{} ({})", registry.label(keyword).unwrap_or(keyword), keyword),
            None => println!("none"),
        }
        return Ok(());
    }

    // A full queue already guarantees one pending evaluation, so extra events are dropped.
    let (notify_tx, mut notify_rx) = mpsc::channel::<()>(1);
    let watcher = EventWatcher::new(backends.hooks);
    watcher
        .start(move || {
            let _ = notify_tx.try_send(());
        })
        .context("Failed to register desktop event hooks")?;

    let mut evaluator = {
        let matcher = matcher.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            let mut current = MatchResult::none();
            loop {
                match evaluate(matcher.clone(), registry.clone()).await {
                    Ok(result) if result != current => {
                        report(&registry, &current, &result);
                        current = result;
                    }
                    Ok(_) => debug!("Active target unchanged"),
                    Err(e) => error!("Matcher task failed: {}", e),
                }
                if notify_rx.recv().await.is_none() {
                    break;
                }
            }
        })
    };

    info!("Watching desktop events");

    // The evaluator only finishes by itself when the pump dropped the handler.
    let pump_died = tokio::select! {
        signal = signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Received Ctrl+C"),
                Err(err) => error!("Failed to wait for the shutdown signal: {}", err),
            }
            false
        }
        _ = &mut evaluator => true,
    };

    if pump_died {
        error!("Desktop event pump stopped, no further changes can be detected");
    } else {
        info!("Shutting down...");
        evaluator.abort();
    }

    let watcher = Arc::new(watcher);
    let stopping = {
        let watcher = watcher.clone();
        tokio::task::spawn_blocking(move || watcher.stop())
    };

    let shutdown_timeout = tokio::time::Duration::from_secs(5);
    let shutdown_result = tokio::time::timeout(shutdown_timeout, async {
        let stopped = stopping.await;
        if !pump_died {
            let _ = evaluator.await;
        }
        stopped
    })
    .await;

    match shutdown_result {
        Ok(Ok(Ok(()))) => info!("Event hooks released"),
        Ok(Ok(Err(e))) if pump_died => return Err(e).context("Desktop event pump failed"),
        Ok(Ok(Err(e))) => warn!("Event watcher did not stop cleanly: {}", e),
        Ok(Err(e)) => warn!("Stop task failed: {}", e),
        Err(_) => warn!("Timed out waiting for the event watcher to stop"),
    }

    if pump_died {
        anyhow::bail!("Desktop event pump stopped unexpectedly");
    }

    info!("activewatch stopped");
    Ok(())
}

/// Runs the fallback chain off the async runtime; desktop queries block.
async fn evaluate(matcher: Arc<TargetMatcher>, registry: Arc<TargetRegistry>) -> Result<MatchResult> {
    tokio::task::spawn_blocking(move || matcher.find_active_target(&registry))
        .await
        .context("Matcher task panicked")
}

fn report(registry: &TargetRegistry, previous: &MatchResult, current: &MatchResult) {
    match current.keyword() {
        Some(keyword) => info!(
            label = registry.label(keyword).unwrap_or(keyword),
            keyword,
            source = %current.source.map(|s| s.to_string()).unwrap_or_default(),
            "Active target changed"
        ),
        None => info!(
            previous = previous.keyword().unwrap_or("none"),
            "No target active"
        ),
    }
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        "pretty" => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
    }

    Ok(())
}
