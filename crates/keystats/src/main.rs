use anyhow::Result;
use keystats::{
    Config, ExportFormat, KeyEvent, KeyStatsError, Recorder, SaveScheduler, Store, input,
    shutdown,
};
use log::{error, info, warn};
use std::{
    env, io,
    path::PathBuf,
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError},
    },
    thread::Builder,
    time::Duration,
};

const POLLING_INTERVAL: Duration = Duration::from_millis(100);
const ENV_EXPORT_DIR: &str = "KEYSTATS_EXPORT_DIR";
const ENV_EXPORT_FORMAT: &str = "KEYSTATS_EXPORT_FORMAT";

fn main() -> Result<()> {
    // Initialize logger - defaults to RUST_LOG if set, otherwise INFO
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let config = Config::from_env()?;
    let export = export_settings()?;
    info!("keystats starting...");
    info!("Data file: {}", config.storage.data_file.display());
    info!("Reading key events from stdin, press Ctrl+C to stop");

    let store = Arc::new(Store::open(&config.storage)?);
    let mut scheduler = SaveScheduler::new(Arc::clone(&store), &config.save);
    scheduler.start()?;
    shutdown::setup_exit_handler()?;

    let mut recorder =
        Recorder::new(Arc::clone(&store), &config.analysis).with_scheduler(scheduler.handle());
    let events = spawn_stdin_reader()?;

    loop {
        if shutdown::should_exit() {
            info!("Received exit signal, saving statistics...");
            break;
        }
        match events.recv_timeout(POLLING_INTERVAL) {
            Ok(event) => recorder.record(&event),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                info!("Input closed, saving statistics...");
                break;
            }
        }
    }

    let stats = scheduler.stop();
    let session = recorder.session();
    info!("Session keystrokes: {}", session.keystrokes);
    info!("Total keystrokes: {}", store.total_keystrokes());
    info!(
        "Saves: {} (idle {}, continuous {}, batch {}, manual {}, shutdown {}), failed {}",
        stats.total_saves,
        stats.idle_saves,
        stats.continuous_saves,
        stats.batch_saves,
        stats.manual_saves,
        stats.shutdown_saves,
        stats.failed_saves
    );

    if let Some((dir, format)) = export {
        if let Err(e) = store.export(Some(&dir), format) {
            error!("Export failed: {e}");
        }
    }

    if stats.shutdown_saves == 0 {
        error!("Final save failed, see the log above");
        std::process::exit(1);
    }
    Ok(())
}

/// Export directory and format from the environment; CSV unless told otherwise.
fn export_settings() -> Result<Option<(PathBuf, ExportFormat)>> {
    let Some(dir) = non_blank_env(ENV_EXPORT_DIR) else {
        return Ok(None);
    };
    let format = match non_blank_env(ENV_EXPORT_FORMAT) {
        Some(name) => name.parse()?,
        None => ExportFormat::Csv,
    };
    Ok(Some((PathBuf::from(dir), format)))
}

fn non_blank_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn spawn_stdin_reader() -> Result<Receiver<KeyEvent>> {
    let (tx, rx) = mpsc::channel();
    Builder::new().name("stdin-reader".into()).spawn(move || {
        for event in input::read_events(io::stdin().lock()) {
            match event {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(KeyStatsError::Csv(e)) if e.is_io_error() => {
                    error!("Failed to read stdin: {e}");
                    break;
                }
                Err(e) => warn!("Skipping input row: {e}"),
            }
        }
    })?;
    Ok(rx)
}
