use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;

use heimdall::anomaly::{AnomalyScorer, ArtifactScorer};
use heimdall::config::Config;
use heimdall::persistence::SqliteAlertStore;
use heimdall::pipeline::IngestPipeline;

/// SSH intrusion detection daemon: tails the authentication log and
/// persists alerts for the response engine.
#[derive(StructOpt, Debug)]
#[structopt(name = "heimdall_daemon", about = "SSH intrusion detection daemon")]
struct Opt {
    /// Path to the rules configuration file
    #[structopt(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Run a single ingestion cycle and exit (smoke testing)
    #[structopt(long)]
    once: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let opt = Opt::from_args();

    log::info!("starting heimdall daemon with config {:?}", opt.config);
    // Config problems are fatal: detection cannot run without a valid
    // whitelist, time window and brute-force threshold.
    let config = Config::from_file(&opt.config)?;

    let store = Arc::new(SqliteAlertStore::new(&config.store.db_path)?);

    // A broken or missing artifact disables the scorer; rule-based
    // detection keeps running either way.
    let scorer: Option<Box<dyn AnomalyScorer>> = match &config.anomaly.model_path {
        Some(path) => match ArtifactScorer::load(path) {
            Ok(scorer) => Some(Box::new(scorer)),
            Err(e) => {
                log::warn!("anomaly scorer disabled: {}", e);
                None
            }
        },
        None => {
            log::info!("no model artifact configured, rule-based detection only");
            None
        }
    };

    let mut pipeline = IngestPipeline::new(&config, store, scorer);

    if opt.once {
        let stats = pipeline.process_cycle()?;
        log::info!(
            "single cycle: {} lines, {} events, {} alerts",
            stats.lines_read,
            stats.events_parsed,
            stats.alerts_inserted
        );
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("received shutdown signal, stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    log::info!(
        "monitoring {:?} every {}s",
        config.watcher.log_path,
        config.ingest.poll_interval_seconds
    );
    pipeline.run(
        &running,
        Duration::from_secs(config.ingest.poll_interval_seconds),
    );

    log::info!("heimdall daemon stopped");
    Ok(())
}
