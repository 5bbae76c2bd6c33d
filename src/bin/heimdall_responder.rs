use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;

use heimdall::config::Config;
use heimdall::persistence::{AlertStore, SqliteAlertStore};
use heimdall::response::{ResponseEngine, SystemExecutor};

/// Automated response engine: polls the alert store and remediates
/// unhandled critical and AI alerts (firewall block, account lock).
#[derive(StructOpt, Debug)]
#[structopt(name = "heimdall_responder", about = "Automated alert response engine")]
struct Opt {
    /// Path to the rules configuration file
    #[structopt(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Run commands directly instead of through sudo
    #[structopt(long)]
    no_sudo: bool,

    /// Run a single poll cycle and exit (smoke testing)
    #[structopt(long)]
    once: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let opt = Opt::from_args();

    log::info!("starting heimdall responder with config {:?}", opt.config);
    let config = Config::from_file(&opt.config)?;

    let store: Arc<dyn AlertStore> = Arc::new(SqliteAlertStore::new(&config.store.db_path)?);
    let executor = if opt.no_sudo {
        SystemExecutor::without_sudo()
    } else {
        SystemExecutor::new()
    };

    let engine = ResponseEngine::with_threshold(
        store,
        Box::new(executor),
        config.response.critical_severity_threshold,
    );

    if opt.once {
        let dispatched = engine.poll_once()?;
        log::info!("single cycle: dispatched {} alert(s)", dispatched);
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("received shutdown signal, stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    log::info!(
        "polling for unhandled alerts every {}s",
        config.response.poll_interval_seconds
    );
    engine.run(
        &running,
        Duration::from_secs(config.response.poll_interval_seconds),
    );

    log::info!("heimdall responder stopped");
    Ok(())
}
