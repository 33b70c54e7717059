//! Keyboard usage statistics with crash-safe persistence.
//!
//! [`Store`] owns the statistics document, [`SaveScheduler`] decides when it
//! is written, and [`Recorder`] turns key events into updates for both.

pub mod backup;
pub mod config;
pub mod error;
pub mod export;
pub mod input;
pub mod model;
pub mod modifiers;
pub mod recorder;
pub mod scheduler;
pub mod shutdown;
pub mod store;

pub use config::Config;
pub use error::{KeyStatsError, Result};
pub use export::ExportFormat;
pub use model::{SequenceKind, StatisticsDocument};
pub use recorder::{KeyEvent, Recorder};
pub use scheduler::{SaveScheduler, SaveStats, SaveTrigger, SchedulerHandle};
pub use store::{LoadOutcome, Store};
