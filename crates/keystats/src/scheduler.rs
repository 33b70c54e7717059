//! Save scheduling.
//!
//! [`SaveTracker`] holds the trigger rules and takes the current time as an
//! argument. [`SaveScheduler`] drives it from one coordinator thread that
//! sleeps on a channel until the next event or the idle deadline.

use crate::{config::SaveConfig, error::Result, store::Store};
use log::{debug, info, warn};
use serde::Serialize;
use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread::{Builder, JoinHandle},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveTrigger {
    Idle,
    Continuous,
    Batch,
    Manual,
    Shutdown,
}

impl fmt::Display for SaveTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Continuous => "continuous",
            Self::Batch => "batch",
            Self::Manual => "manual",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePolicy {
    pub enabled: bool,
    pub idle_delay: Duration,
    pub continuous_interval: Duration,
    pub batch_threshold: u64,
    pub backup_interval: Duration,
}

impl From<&SaveConfig> for SavePolicy {
    fn from(settings: &SaveConfig) -> Self {
        Self {
            enabled: settings.auto_save,
            idle_delay: settings.idle_delay(),
            continuous_interval: settings.continuous_interval(),
            batch_threshold: settings.batch_threshold(),
            backup_interval: settings.backup_every(),
        }
    }
}

/// Decides when to save from event timing and volume.
#[derive(Debug)]
pub struct SaveTracker {
    policy: SavePolicy,
    unsaved: u64,
    streak_origin: Instant,
    idle_deadline: Option<Instant>,
    last_backup: Instant,
}

impl SaveTracker {
    pub fn new(policy: SavePolicy, now: Instant) -> Self {
        Self {
            policy,
            unsaved: 0,
            streak_origin: now,
            idle_deadline: None,
            last_backup: now,
        }
    }

    /// Keystrokes recorded since the last successful save.
    pub fn unsaved(&self) -> u64 {
        self.unsaved
    }

    pub fn streak_origin(&self) -> Instant {
        self.streak_origin
    }

    /// The only pending idle deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.idle_deadline
    }

    /// Registers one keystroke. Returns at most one trigger; continuous wins
    /// over batch when both hold.
    pub fn on_event(&mut self, now: Instant) -> Option<SaveTrigger> {
        if self.unsaved == 0 {
            self.streak_origin = now;
        }
        self.unsaved += 1;

        if !self.policy.enabled {
            return None;
        }
        self.idle_deadline = Some(now + self.policy.idle_delay);

        if now.saturating_duration_since(self.streak_origin) >= self.policy.continuous_interval {
            Some(SaveTrigger::Continuous)
        } else if self.unsaved >= self.policy.batch_threshold {
            Some(SaveTrigger::Batch)
        } else {
            None
        }
    }

    /// Fires the idle trigger once its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<SaveTrigger> {
        match self.idle_deadline {
            Some(deadline) if now >= deadline => {
                self.idle_deadline = None;
                (self.policy.enabled && self.unsaved > 0).then_some(SaveTrigger::Idle)
            }
            _ => None,
        }
    }

    /// Manual flush; only when something is pending.
    pub fn manual(&self) -> Option<SaveTrigger> {
        (self.unsaved > 0).then_some(SaveTrigger::Manual)
    }

    pub fn wants_backup(&self, trigger: SaveTrigger, now: Instant) -> bool {
        trigger == SaveTrigger::Shutdown
            || now.saturating_duration_since(self.last_backup) >= self.policy.backup_interval
    }

    pub fn mark_saved(&mut self, backed_up: bool, now: Instant) {
        self.unsaved = 0;
        self.streak_origin = now;
        self.idle_deadline = None;
        if backed_up {
            self.last_backup = now;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveStats {
    pub idle_saves: u64,
    pub continuous_saves: u64,
    pub batch_saves: u64,
    pub manual_saves: u64,
    pub shutdown_saves: u64,
    pub total_saves: u64,
    pub failed_saves: u64,
}

impl SaveStats {
    fn record(&mut self, trigger: SaveTrigger) {
        match trigger {
            SaveTrigger::Idle => self.idle_saves += 1,
            SaveTrigger::Continuous => self.continuous_saves += 1,
            SaveTrigger::Batch => self.batch_saves += 1,
            SaveTrigger::Manual => self.manual_saves += 1,
            SaveTrigger::Shutdown => self.shutdown_saves += 1,
        }
        self.total_saves += 1;
    }
}

enum Command {
    Event(Instant),
    Flush,
    Stop,
}

/// Cloneable sender used by the recorder to report keystrokes.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: Sender<Command>,
    running: Arc<AtomicBool>,
}

impl SchedulerHandle {
    pub fn on_event(&self) {
        if self.running.load(Ordering::Relaxed) {
            let _ = self.tx.send(Command::Event(Instant::now()));
        }
    }

    pub fn force_save(&self) {
        if self.running.load(Ordering::Relaxed) {
            let _ = self.tx.send(Command::Flush);
        }
    }
}

pub struct SaveScheduler {
    store: Arc<Store>,
    policy: SavePolicy,
    tx: Sender<Command>,
    rx: Option<Receiver<Command>>,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<SaveStats>>,
    worker: Option<JoinHandle<Receiver<Command>>>,
}

impl SaveScheduler {
    pub fn new(store: Arc<Store>, settings: &SaveConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            store,
            policy: SavePolicy::from(settings),
            tx,
            rx: Some(rx),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(SaveStats::default())),
            worker: None,
        }
    }

    /// Spawns the coordinator thread. Events sent before this are ignored.
    ///
    /// The channel lives as long as the scheduler, so handles taken before a
    /// `stop()` keep working after the next `start()`.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            warn!("Save scheduler already running");
            return Ok(());
        }

        let rx = match self.rx.take() {
            Some(rx) => rx,
            None => {
                warn!("Save scheduler channel was lost; earlier handles are disconnected");
                let (tx, rx) = mpsc::channel();
                self.tx = tx;
                rx
            }
        };

        let store = Arc::clone(&self.store);
        let policy = self.policy.clone();
        let stats = Arc::clone(&self.stats);
        self.running.store(true, Ordering::Relaxed);

        let spawned = Builder::new()
            .name("save-scheduler".into())
            .spawn(move || run_coordinator(&store, policy, rx, &stats));
        match spawned {
            Ok(worker) => {
                self.worker = Some(worker);
                info!(
                    "Save scheduler started (auto_save={}, idle={:?}, continuous={:?}, batch={})",
                    self.policy.enabled,
                    self.policy.idle_delay,
                    self.policy.continuous_interval,
                    self.policy.batch_threshold
                );
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Relaxed);
                Err(e.into())
            }
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            tx: self.tx.clone(),
            running: Arc::clone(&self.running),
        }
    }

    pub fn on_event(&self) {
        self.handle().on_event();
    }

    /// Saves now if any keystrokes are unsaved.
    pub fn force_save(&self) {
        self.handle().force_save();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> SaveStats {
        self.stats.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Performs the final save with a backup and waits for the coordinator.
    pub fn stop(&mut self) -> SaveStats {
        let Some(worker) = self.worker.take() else {
            return self.stats();
        };

        self.running.store(false, Ordering::Relaxed);
        let _ = self.tx.send(Command::Stop);
        match worker.join() {
            Ok(rx) => self.rx = Some(rx),
            Err(_) => warn!("Save scheduler thread panicked"),
        }

        let stats = self.stats();
        info!(
            "Save scheduler stopped: {} saves, {} failed",
            stats.total_saves, stats.failed_saves
        );
        stats
    }
}

impl Drop for SaveScheduler {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

fn run_coordinator(
    store: &Store,
    policy: SavePolicy,
    rx: Receiver<Command>,
    stats: &Mutex<SaveStats>,
) -> Receiver<Command> {
    let mut tracker = SaveTracker::new(policy, Instant::now());

    loop {
        let received = match tracker.next_deadline() {
            Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        let trigger = match received {
            Ok(Command::Event(at)) => tracker.on_event(at),
            Ok(Command::Flush) => tracker.manual(),
            Err(RecvTimeoutError::Timeout) => tracker.poll(Instant::now()),
            Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => {
                perform_save(store, &mut tracker, stats, SaveTrigger::Shutdown);
                break;
            }
        };

        if let Some(trigger) = trigger {
            perform_save(store, &mut tracker, stats, trigger);
        }
    }

    debug!("Save coordinator exiting");
    rx
}

fn perform_save(
    store: &Store,
    tracker: &mut SaveTracker,
    stats: &Mutex<SaveStats>,
    trigger: SaveTrigger,
) {
    let backup = tracker.wants_backup(trigger, Instant::now());
    let pending = tracker.unsaved();

    match store.save(backup) {
        Ok(()) => {
            tracker.mark_saved(backup, Instant::now());
            stats
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .record(trigger);
            debug!("{trigger} save completed ({pending} keystrokes)");
        }
        Err(e) => {
            // Keep the unsaved count so the next trigger retries.
            stats.lock().unwrap_or_else(|p| p.into_inner()).failed_saves += 1;
            warn!("{trigger} save failed, {pending} keystrokes still pending: {e}");
        }
    }
}
