//! Radio Front-End Interfaces Library
//!
//! This crate defines the contract between the timing engine and the radio
//! hardware driver, plus a simulated front end for dry runs and tests.
//!
//! The receive and transmit halves are separate handles so the sensing
//! thread and the transmit thread can each own one without sharing a lock.

pub mod sim_rf;

use common::RadioTimestamp;
use num_complex::Complex32;
use thiserror::Error;

/// Interface errors
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("Device open failed: {0}")]
    DeviceOpenFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Sample rate mismatch: requested {requested} Hz, device set {actual} Hz")]
    SampleRateMismatch { requested: f64, actual: f64 },

    #[error("Interface not initialized")]
    NotInitialized,

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Late transmission: requested {requested}, device time {now}")]
    LateTransmission {
        requested: RadioTimestamp,
        now: RadioTimestamp,
    },

    #[error("Short transmission: sent {sent} of {requested} samples")]
    ShortTransmission { sent: usize, requested: usize },
}

/// Tuning applied to one direction of the front end
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadioConfig {
    /// Center frequency in Hz
    pub center_frequency_hz: f64,
    /// Sample rate in Hz
    pub sample_rate_hz: f64,
    /// Gain in dB
    pub gain_db: f32,
}

/// Metadata returned with every receive call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RxMetadata {
    /// Device time of the first sample in the buffer
    pub timestamp: RadioTimestamp,
    /// Number of samples written into the buffer
    pub samples: usize,
}

/// Receive half of a radio front end
pub trait RadioReceiver: Send {
    /// Tune the receive chain; returns the sample rate actually set
    fn configure_rx(&mut self, config: &RadioConfig) -> Result<f64, InterfaceError>;

    /// Block until `buffer` is filled with samples
    fn receive(&mut self, buffer: &mut [Complex32]) -> Result<RxMetadata, InterfaceError>;
}

/// Transmit half of a radio front end
pub trait RadioTransmitter: Send {
    /// Tune the transmit chain; returns the sample rate actually set
    fn configure_tx(&mut self, config: &RadioConfig) -> Result<f64, InterfaceError>;

    /// Queue `samples` to leave the antenna at device time `at`
    ///
    /// `start_of_burst` tells the device to re-establish timing and power
    /// ramp-up after the transmit chain has been idle.
    fn transmit_at(
        &mut self,
        samples: &[Complex32],
        at: RadioTimestamp,
        start_of_burst: bool,
    ) -> Result<usize, InterfaceError>;
}
