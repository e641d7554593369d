//! Simulated RF Front End
//!
//! Stands in for a radio driver by synthesizing a downlink whose subframes
//! carry an in-band tag (frame number and subframe index). The matching
//! simulated PHY reads the tag back, so the timing engine can run end to
//! end without hardware. Transmissions are recorded, never radiated.

use crate::{InterfaceError, RadioConfig, RadioReceiver, RadioTransmitter, RxMetadata};
use common::{RadioTimestamp, SFN_PERIOD, SUBFRAMES_PER_FRAME, SUBFRAME_DURATION_S};
use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Highest sample rate the simulated device accepts
pub const MAX_SAMPLE_RATE: f64 = 61.44e6;

/// Default number of transmissions kept for inspection
pub const DEFAULT_RECORD_LIMIT: usize = 1024;

/// Marker placed in sample 1 of every tagged subframe
const TAG_MAGIC: f32 = 7919.0;

/// Simulated RF configuration
#[derive(Debug, Clone)]
pub struct SimRfConfig {
    /// System frame number of the first received subframe
    pub initial_sfn: u32,
    /// Device time of the first received sample, seconds
    pub start_time_s: f64,
    /// Probability that a received subframe carries no detectable boundary
    pub sync_loss_probability: f64,
    /// Seed for the loss process
    pub seed: u64,
    /// Pace reception at wall-clock rate (1 ms per subframe)
    pub realtime: bool,
    /// Most recent transmissions kept by the monitor; older ones are dropped
    pub record_limit: usize,
}

impl Default for SimRfConfig {
    fn default() -> Self {
        Self {
            initial_sfn: 0,
            start_time_s: 1.0,
            sync_loss_probability: 0.0,
            seed: 0x5eed,
            realtime: true,
            record_limit: DEFAULT_RECORD_LIMIT,
        }
    }
}

impl SimRfConfig {
    /// Parse device arguments in srsRAN format
    /// Format: "key1=value1,key2=value2,..."
    /// Keys: sfn, start, sync_loss, seed, realtime, records
    pub fn from_device_args(args: &str) -> Result<Self, InterfaceError> {
        let mut config = Self::default();

        for pair in args.split(',') {
            let parts: Vec<&str> = pair.trim().split('=').collect();
            if parts.len() != 2 {
                continue;
            }

            let key = parts[0].trim();
            let value = parts[1].trim();
            let invalid = || InterfaceError::InvalidConfig(format!("Invalid {}: {}", key, value));

            match key {
                "sfn" => {
                    config.initial_sfn = value.parse::<u32>().map_err(|_| invalid())? % SFN_PERIOD;
                }
                "start" => {
                    config.start_time_s = value.parse::<f64>().map_err(|_| invalid())?;
                }
                "sync_loss" => {
                    let p = value.parse::<f64>().map_err(|_| invalid())?;
                    if !(0.0..=1.0).contains(&p) {
                        return Err(InterfaceError::InvalidConfig(format!(
                            "sync_loss out of range: {}",
                            p
                        )));
                    }
                    config.sync_loss_probability = p;
                }
                "seed" => {
                    config.seed = value.parse::<u64>().map_err(|_| invalid())?;
                }
                "records" => {
                    config.record_limit = value.parse::<usize>().map_err(|_| invalid())?;
                }
                "realtime" => {
                    config.realtime = matches!(value, "1" | "true" | "yes");
                }
                _ => {
                    debug!("Ignoring unknown simulated RF argument: {}", key);
                }
            }
        }

        Ok(config)
    }
}

/// Write the downlink tag for (`sfn`, `subframe`) into the head of a buffer
pub fn write_tag(buffer: &mut [Complex32], sfn: u32, subframe: u32) {
    if buffer.len() < 2 {
        return;
    }
    buffer[0] = Complex32::new(subframe as f32, sfn as f32);
    buffer[1] = Complex32::new(TAG_MAGIC, 0.0);
}

/// Read a downlink tag, returning (`sfn`, `subframe`)
pub fn read_tag(buffer: &[Complex32]) -> Option<(u32, u32)> {
    if buffer.len() < 2 || buffer[1].re != TAG_MAGIC {
        return None;
    }
    let subframe = buffer[0].re;
    let sfn = buffer[0].im;
    if subframe < 0.0 || sfn < 0.0 {
        return None;
    }
    Some((sfn as u32 % SFN_PERIOD, subframe as u32 % SUBFRAMES_PER_FRAME))
}

/// One recorded timed transmission
#[derive(Debug, Clone, PartialEq)]
pub struct TxRecord {
    /// Requested device time
    pub at: RadioTimestamp,
    /// Device time of the receive stream when the request arrived
    pub requested_at: RadioTimestamp,
    /// Number of samples
    pub samples: usize,
    /// Start-of-burst flag
    pub start_of_burst: bool,
    /// Whether the request arrived after its own start time
    pub late: bool,
    /// Mean sample power, linear
    pub mean_power: f32,
}

/// TX/RX statistics
#[derive(Debug, Default, Clone)]
pub struct RfStats {
    pub rx_samples: u64,
    pub rx_subframes: u64,
    pub sync_losses: u64,
    pub tx_samples: u64,
    pub tx_bursts: u64,
    pub tx_late: u64,
}

#[derive(Debug, Default)]
struct SimShared {
    stats: RfStats,
    records: VecDeque<TxRecord>,
    record_limit: usize,
}

/// Simulated RF device; split into receive and transmit halves
pub struct SimRf {
    config: SimRfConfig,
    rx_sample_index: Arc<AtomicU64>,
    rx_rate_bits: Arc<AtomicU64>,
    shared: Arc<Mutex<SimShared>>,
}

impl SimRf {
    /// Open the simulated device
    pub fn open(config: SimRfConfig) -> Result<Self, InterfaceError> {
        if !config.start_time_s.is_finite() || config.start_time_s < 0.0 {
            return Err(InterfaceError::DeviceOpenFailed(format!(
                "invalid start time {}",
                config.start_time_s
            )));
        }
        info!("Opening simulated RF device");
        info!("  Initial SFN: {}", config.initial_sfn);
        info!("  Sync loss probability: {}", config.sync_loss_probability);
        info!("  Realtime pacing: {}", config.realtime);
        info!("  Recorded transmissions: {}", config.record_limit);

        Ok(Self {
            rx_sample_index: Arc::new(AtomicU64::new(0)),
            rx_rate_bits: Arc::new(AtomicU64::new(0)),
            shared: Arc::new(Mutex::new(SimShared {
                record_limit: config.record_limit,
                ..SimShared::default()
            })),
            config,
        })
    }

    /// Split into independent receive and transmit handles plus an observer
    pub fn split(self) -> (SimRfReceiver, SimRfTransmitter, SimRfMonitor) {
        let monitor = SimRfMonitor {
            shared: self.shared.clone(),
        };
        let rx = SimRfReceiver {
            rng: StdRng::seed_from_u64(self.config.seed),
            config: self.config.clone(),
            sample_rate: None,
            started: None,
            sample_index: self.rx_sample_index.clone(),
            rate_bits: self.rx_rate_bits.clone(),
            shared: self.shared.clone(),
        };
        let tx = SimRfTransmitter {
            start_time: RadioTimestamp::from_secs_f64(self.config.start_time_s),
            sample_rate: None,
            rx_sample_index: self.rx_sample_index,
            rx_rate_bits: self.rx_rate_bits,
            shared: self.shared,
        };
        (rx, tx, monitor)
    }
}

fn validate_config(config: &RadioConfig) -> Result<f64, InterfaceError> {
    if !(config.sample_rate_hz > 0.0 && config.sample_rate_hz <= MAX_SAMPLE_RATE) {
        return Err(InterfaceError::InvalidConfig(format!(
            "unsupported sample rate {} Hz",
            config.sample_rate_hz
        )));
    }
    if config.center_frequency_hz <= 0.0 {
        return Err(InterfaceError::InvalidConfig(format!(
            "invalid center frequency {} Hz",
            config.center_frequency_hz
        )));
    }
    Ok(config.sample_rate_hz)
}

/// Device time of sample `index` counted from `start`
fn time_at_sample(start: RadioTimestamp, index: u64, rate: f64) -> RadioTimestamp {
    let elapsed = RadioTimestamp::from_sample_index(index, rate);
    RadioTimestamp::new(start.full_secs + elapsed.full_secs, start.frac_secs + elapsed.frac_secs)
}

fn lock(shared: &Mutex<SimShared>) -> std::sync::MutexGuard<'_, SimShared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Receive half of the simulated device
pub struct SimRfReceiver {
    config: SimRfConfig,
    rng: StdRng,
    sample_rate: Option<f64>,
    started: Option<Instant>,
    sample_index: Arc<AtomicU64>,
    rate_bits: Arc<AtomicU64>,
    shared: Arc<Mutex<SimShared>>,
}

impl RadioReceiver for SimRfReceiver {
    fn configure_rx(&mut self, config: &RadioConfig) -> Result<f64, InterfaceError> {
        let rate = validate_config(config)?;
        info!(
            "Sim RX tuned to {:.3} MHz, {:.2} MHz sample rate, gain {:.1} dB",
            config.center_frequency_hz / 1e6,
            rate / 1e6,
            config.gain_db
        );
        self.sample_rate = Some(rate);
        self.rate_bits.store(rate.to_bits(), Ordering::Release);
        Ok(rate)
    }

    fn receive(&mut self, buffer: &mut [Complex32]) -> Result<RxMetadata, InterfaceError> {
        let rate = self.sample_rate.ok_or(InterfaceError::NotInitialized)?;
        let subframe_len = (rate * SUBFRAME_DURATION_S).round() as u64;
        if subframe_len == 0 {
            return Err(InterfaceError::InvalidConfig("sample rate too low".to_string()));
        }

        let start_index = self.sample_index.load(Ordering::Acquire);
        let end_index = start_index + buffer.len() as u64;

        // Pace so that the buffer is handed over once it has fully "arrived"
        if self.config.realtime {
            let started = *self.started.get_or_insert_with(Instant::now);
            let due = started + Duration::from_secs_f64(end_index as f64 / rate);
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }

        let subframe_count = start_index / subframe_len;
        let sfn = (self.config.initial_sfn as u64 + subframe_count / SUBFRAMES_PER_FRAME as u64)
            % SFN_PERIOD as u64;
        let subframe = subframe_count % SUBFRAMES_PER_FRAME as u64;

        buffer.iter_mut().for_each(|s| *s = Complex32::new(0.0, 0.0));
        let lost = self.config.sync_loss_probability > 0.0
            && self.rng.gen_bool(self.config.sync_loss_probability);
        if !lost {
            write_tag(buffer, sfn as u32, subframe as u32);
        }

        let timestamp = time_at_sample(
            RadioTimestamp::from_secs_f64(self.config.start_time_s),
            start_index,
            rate,
        );
        self.sample_index.store(end_index, Ordering::Release);

        {
            let mut shared = lock(&self.shared);
            shared.stats.rx_samples += buffer.len() as u64;
            shared.stats.rx_subframes += 1;
            if lost {
                shared.stats.sync_losses += 1;
            }
        }
        trace!("Sim RX: sfn={} sf={} t={} lost={}", sfn, subframe, timestamp, lost);

        Ok(RxMetadata {
            timestamp,
            samples: buffer.len(),
        })
    }
}

/// Transmit half of the simulated device
pub struct SimRfTransmitter {
    start_time: RadioTimestamp,
    sample_rate: Option<f64>,
    rx_sample_index: Arc<AtomicU64>,
    rx_rate_bits: Arc<AtomicU64>,
    shared: Arc<Mutex<SimShared>>,
}

impl SimRfTransmitter {
    /// Current device time as seen by the receive stream
    fn device_time(&self) -> RadioTimestamp {
        let rate = f64::from_bits(self.rx_rate_bits.load(Ordering::Acquire));
        if rate <= 0.0 {
            return self.start_time;
        }
        time_at_sample(self.start_time, self.rx_sample_index.load(Ordering::Acquire), rate)
    }
}

impl RadioTransmitter for SimRfTransmitter {
    fn configure_tx(&mut self, config: &RadioConfig) -> Result<f64, InterfaceError> {
        let rate = validate_config(config)?;
        info!(
            "Sim TX tuned to {:.3} MHz, {:.2} MHz sample rate, gain {:.1} dB",
            config.center_frequency_hz / 1e6,
            rate / 1e6,
            config.gain_db
        );
        self.sample_rate = Some(rate);
        Ok(rate)
    }

    fn transmit_at(
        &mut self,
        samples: &[Complex32],
        at: RadioTimestamp,
        start_of_burst: bool,
    ) -> Result<usize, InterfaceError> {
        if self.sample_rate.is_none() {
            return Err(InterfaceError::NotInitialized);
        }

        let now = self.device_time();
        let late = at.secs_since(&now) < 0.0;
        let mean_power = common::mean_power(samples);
        let record = TxRecord {
            at,
            requested_at: now,
            samples: samples.len(),
            start_of_burst,
            late,
            mean_power,
        };

        let mut shared = lock(&self.shared);
        if shared.record_limit > 0 {
            if shared.records.len() == shared.record_limit {
                shared.records.pop_front();
            }
            shared.records.push_back(record);
        }
        if start_of_burst {
            shared.stats.tx_bursts += 1;
        }
        if late {
            shared.stats.tx_late += 1;
            warn!("Sim TX: late by {:.6} s", now.secs_since(&at));
            return Err(InterfaceError::LateTransmission { requested: at, now });
        }
        shared.stats.tx_samples += samples.len() as u64;
        debug!(
            "Sim TX: {} samples at {} ({:.6} s ahead, {:.1} dB), burst_start={}",
            samples.len(),
            at,
            at.secs_since(&now),
            common::power_to_db(mean_power),
            start_of_burst
        );
        Ok(samples.len())
    }
}

/// Read-only view of what the simulated device has seen
#[derive(Clone)]
pub struct SimRfMonitor {
    shared: Arc<Mutex<SimShared>>,
}

impl SimRfMonitor {
    /// Get RF statistics
    pub fn stats(&self) -> RfStats {
        lock(&self.shared).stats.clone()
    }

    /// Most recent transmissions, oldest first, up to the record limit
    pub fn transmissions(&self) -> Vec<TxRecord> {
        lock(&self.shared).records.iter().cloned().collect()
    }
}
