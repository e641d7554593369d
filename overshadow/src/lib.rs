//! LTE Broadcast Overshadowing Engine
//!
//! Tracks the frame timing of an LTE downlink from received samples and
//! schedules timed transmissions of a forged broadcast subframe so that it
//! lands on top of the legitimate one.
//!
//! Two worker threads share an [`OvershadowContext`]: the sensing loop
//! publishes timing into the [`TimingStore`](timing::TimingStore) and the
//! scheduler consumes it.

pub mod config;
pub mod context;
pub mod scheduler;
pub mod sensing;
pub mod timing;

pub use config::{OvershadowConfig, ScheduleParams, SyncMode};
pub use context::{OvershadowContext, Workers};
pub use scheduler::{InjectorStats, OvershadowSchedule, OvershadowScheduler, SchedulerState};
pub use sensing::{SensingLoop, SensingStats};
pub use timing::{DecodeResult, TimingObservation, TimingState, TimingStore, TimingSubscriber};

use interfaces::InterfaceError;
use phy::PhyError;
use thiserror::Error;

/// Engine errors; any of these stops both worker threads
#[derive(Error, Debug)]
pub enum OvershadowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Radio error: {0}")]
    Radio(#[from] InterfaceError),

    #[error("PHY error: {0}")]
    Phy(#[from] PhyError),

    /// The MIB decoder reported an internal failure
    #[error("Decoder fault: {0}")]
    DecoderFault(String),

    #[error("Transmit chain used before configuration")]
    NotConfigured,

    #[error("Worker thread '{0}' panicked")]
    WorkerPanicked(String),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
