use crate::error::{KeyStatsError, Result};
use log::info;
use std::sync::{
    Mutex, OnceLock,
    atomic::{AtomicBool, Ordering},
};

// Set once SIGINT/SIGTERM/SIGHUP (Ctrl+C on Windows) arrives
static SHOULD_EXIT: AtomicBool = AtomicBool::new(false);
static EXIT_HANDLER_STATE: OnceLock<Mutex<bool>> = OnceLock::new();

fn inner_setup() -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::{
            consts::{SIGHUP, SIGINT, SIGTERM},
            iterator::Signals,
        };
        use std::thread::Builder;

        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])
            .map_err(|e| KeyStatsError::SignalHandling { source: Box::new(e) })?;

        Builder::new()
            .name("signal-listener".into())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!("Received signal: {sig}");
                    SHOULD_EXIT.store(true, Ordering::Relaxed);
                }
            })
            .map_err(|e| KeyStatsError::SignalHandling { source: Box::new(e) })?;
    }

    #[cfg(windows)]
    {
        ctrlc::set_handler(|| {
            info!("Received Ctrl+C");
            SHOULD_EXIT.store(true, Ordering::Relaxed);
        })?;
    }

    Ok(())
}

/// Installs the exit signal handlers. Safe to call more than once.
pub fn setup_exit_handler() -> Result<()> {
    let m = EXIT_HANDLER_STATE.get_or_init(|| Mutex::new(false));
    let mut inited = m.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    if *inited {
        return Ok(());
    }

    inner_setup()?;
    *inited = true;
    Ok(())
}

#[inline]
pub fn should_exit() -> bool {
    SHOULD_EXIT.load(Ordering::Relaxed)
}

/// Requests shutdown from inside the process, e.g. when input ends.
pub fn request_exit() {
    SHOULD_EXIT.store(true, Ordering::Relaxed);
}
