//! Sensing Loop
//!
//! Receives one subframe at a time, locates the subframe boundary, decodes
//! the MIB when needed and publishes the resulting timing into the store.
//! Between successful decodes the frame counter free-runs, advancing once
//! per frame boundary crossed since the last detected subframe, whether or
//! not subframe 0 itself was received.

use crate::context::OvershadowContext;
use crate::timing::{DecodeResult, TimingObservation};
use crate::OvershadowError;
use common::types::CellParams;
use common::{
    advance_frame_by, FrameClock, RadioTimestamp, BROADCAST_SUBFRAME, SFN_PERIOD,
    SUBFRAMES_PER_FRAME, SUBFRAME_DURATION_S,
};
use interfaces::{InterfaceError, RadioConfig, RadioReceiver};
use num_complex::Complex32;
use phy::{DownlinkSync, Mib, MibDecode};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Sensing loop counters
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SensingStats {
    pub subframes: u64,
    pub sync_misses: u64,
    pub receive_errors: u64,
    pub decode_successes: u64,
    pub decode_misses: u64,
}

/// Receive-side worker
pub struct SensingLoop<R: RadioReceiver, P: DownlinkSync> {
    ctx: Arc<OvershadowContext>,
    radio: R,
    phy: P,
    buffer: Vec<Complex32>,
    cell: CellParams,
    clock: FrameClock,
    /// Subframe index and timestamp of the last detected boundary
    last_sync: Option<(u32, RadioTimestamp)>,
    cfo_hz: f32,
    acquired: bool,
    reference_frame_number: u32,
    stats: SensingStats,
}

impl<R: RadioReceiver, P: DownlinkSync> SensingLoop<R, P> {
    /// Create a sensing loop; nothing touches the radio until [`setup`](Self::setup)
    pub fn new(ctx: Arc<OvershadowContext>, radio: R, phy: P) -> Self {
        let cell = ctx.initial_cell;
        Self {
            ctx,
            radio,
            phy,
            buffer: Vec::new(),
            cell,
            clock: FrameClock::default(),
            last_sync: None,
            cfo_hz: 0.0,
            acquired: false,
            reference_frame_number: 0,
            stats: SensingStats::default(),
        }
    }

    /// Tune the receive chain and bind the PHY to the configured cell
    pub fn setup(&mut self) -> Result<(), OvershadowError> {
        let sample_rate = self.cell.nof_prb.sample_rate();
        let rf = &self.ctx.config.rf;
        info!(
            "[Rx] Tuning receiver to {:.3} MHz, {:.2} MHz sample rate",
            rf.rx_frequency_hz / 1e6,
            sample_rate / 1e6
        );
        let actual = self.radio.configure_rx(&RadioConfig {
            center_frequency_hz: rf.rx_frequency_hz,
            sample_rate_hz: sample_rate,
            gain_db: rf.rx_gain_db,
        })?;
        if actual != sample_rate {
            return Err(InterfaceError::SampleRateMismatch {
                requested: sample_rate,
                actual,
            }
            .into());
        }

        self.phy.set_cell(&self.cell)?;
        self.buffer = vec![Complex32::new(0.0, 0.0); self.cell.nof_prb.subframe_len()];
        info!(
            "[Rx] Tracking PCI {} with {} PRB, {} samples per subframe",
            self.cell.pci.0,
            self.cell.nof_prb.count(),
            self.buffer.len()
        );
        Ok(())
    }

    /// Receive and process one subframe
    pub fn step(&mut self) -> Result<TimingObservation, OvershadowError> {
        let received = match self.radio.receive(&mut self.buffer) {
            Ok(meta) => Some(meta),
            Err(InterfaceError::ReceiveFailed(reason)) => {
                self.stats.receive_errors += 1;
                warn!("[Rx] Receive failed: {}", reason);
                None
            }
            Err(e) => return Err(e.into()),
        };
        self.stats.subframes += 1;

        let sync = received.and_then(|meta| {
            let samples = meta.samples.min(self.buffer.len());
            self.phy
                .detect_subframe_boundary(&self.buffer[..samples])
                .map(|sync| (meta, sync))
        });

        let (meta, sync) = match sync {
            Some(found) => found,
            None => {
                self.stats.sync_misses += 1;
                trace!("[Rx] No subframe boundary after {}", self.clock);
                return Ok(self.publish(false, DecodeResult::NoAttempt));
            }
        };

        let mut timestamp = meta.timestamp;
        timestamp.normalize();
        self.cfo_hz = sync.cfo_hz;

        let crossed = self.frames_crossed(sync.subframe_index, &timestamp);
        self.last_sync = Some((sync.subframe_index, timestamp));

        let mut frame_number = advance_frame_by(self.clock.frame_number, crossed);
        let mut decode_result = DecodeResult::NoAttempt;
        if sync.subframe_index == BROADCAST_SUBFRAME
            && (!self.acquired || self.ctx.config.sync.mode.tracks_mib())
        {
            decode_result = self.decode(meta.samples, &mut frame_number)?;
        }

        self.clock = FrameClock::new(frame_number, sync.subframe_index, timestamp);

        if self.acquired
            && self.clock.is_frame_start()
            && common::repetition_phase(self.reference_frame_number, frame_number)
                == self.ctx.schedule.action_phase
        {
            debug!(
                "[Rx] Frame {}, subframe {}, time {:.6} s",
                frame_number,
                self.clock.subframe_index,
                timestamp.as_secs_f64()
            );
        }

        Ok(self.publish(true, decode_result))
    }

    /// Frame boundaries between the last detected subframe and this one
    ///
    /// Counted from the elapsed radio time so that boundaries whose subframe
    /// 0 was lost still advance the counter. Falls back to the subframe
    /// index wrapping when the timestamps do not move forward.
    fn frames_crossed(&self, subframe_index: u32, timestamp: &RadioTimestamp) -> u32 {
        let Some((last_index, last_timestamp)) = self.last_sync else {
            return (subframe_index == BROADCAST_SUBFRAME) as u32;
        };

        let elapsed = (timestamp.secs_since(&last_timestamp) / SUBFRAME_DURATION_S).round();
        if elapsed >= 1.0 && elapsed.is_finite() {
            let landing = last_index as u64 + elapsed as u64;
            if landing % SUBFRAMES_PER_FRAME as u64 != subframe_index as u64 {
                trace!(
                    "[Rx] Subframe {} detected where {} was expected",
                    subframe_index,
                    landing % SUBFRAMES_PER_FRAME as u64
                );
            }
            ((landing / SUBFRAMES_PER_FRAME as u64) % SFN_PERIOD as u64) as u32
        } else {
            (subframe_index <= last_index) as u32
        }
    }

    /// Attempt a MIB decode on the current buffer, updating `frame_number`
    fn decode(&mut self, samples: usize, frame_number: &mut u32) -> Result<DecodeResult, OvershadowError> {
        let samples = samples.min(self.buffer.len());
        let outcome = self
            .phy
            .decode_broadcast_payload(&self.buffer[..samples])
            .map_err(|e| {
                error!("[Rx] Error decoding UE MIB: {}", e);
                OvershadowError::DecoderFault(e.to_string())
            })?;

        let (payload, sfn_offset) = match outcome {
            MibDecode::Found { payload, sfn_offset } => (payload, sfn_offset),
            MibDecode::NotFound => {
                self.stats.decode_misses += 1;
                return Ok(DecodeResult::DecodeFailed);
            }
        };

        let mib = match Mib::unpack(&payload) {
            Ok(mib) => mib,
            Err(e) => {
                warn!("[Rx] Discarding undecodable MIB: {}", e);
                self.stats.decode_misses += 1;
                return Ok(DecodeResult::DecodeFailed);
            }
        };

        // The receive chain stays at the bandwidth it was tuned for
        if mib.nof_prb != self.cell.nof_prb {
            warn!(
                "[Rx] MIB advertises {} PRB, receiver tuned for {}",
                mib.nof_prb.count(),
                self.cell.nof_prb.count()
            );
        }
        let nof_prb = self.cell.nof_prb;
        mib.apply_to(&mut self.cell);
        self.cell.nof_prb = nof_prb;

        trace!("[Rx] MIB payload {}", common::bytes_to_hex(&payload));
        *frame_number = (mib.sfn + sfn_offset) % SFN_PERIOD;
        self.stats.decode_successes += 1;
        info!(
            "[Rx] Received MIB: SFN={}, Cell ID={}, PRBs={}, Ports={}, sfn_offset={}",
            *frame_number,
            self.cell.pci.0,
            mib.nof_prb.count(),
            self.cell.nof_ports,
            sfn_offset
        );
        Ok(DecodeResult::DecodeSucceeded { sfn_offset })
    }

    fn publish(&mut self, sync_valid: bool, decode_result: DecodeResult) -> TimingObservation {
        let observation = TimingObservation {
            clock: self.clock,
            sync_valid,
            decode_result,
            cell: self.cell,
            cfo_hz: self.cfo_hz,
        };
        let state = self.ctx.timing.publish(&observation);
        if state.cell_acquired && !self.acquired {
            self.acquired = true;
            self.reference_frame_number = state.reference_frame_number;
            info!("[Rx] Cell acquired, reference frame {}", self.reference_frame_number);
        }
        observation
    }

    /// Counters so far
    pub fn stats(&self) -> &SensingStats {
        &self.stats
    }

    /// Run until shutdown or a fatal fault
    ///
    /// A fatal fault also requests shutdown so the scheduler stops too.
    pub fn run(mut self) -> Result<SensingStats, OvershadowError> {
        let result = self.setup().and_then(|()| {
            while !self.ctx.shutdown.is_cancelled() {
                self.step()?;
            }
            Ok(())
        });

        if let Err(e) = &result {
            error!("[Rx] Sensing stopped: {}", e);
            self.ctx.shutdown.cancel();
        }
        info!(
            "[Rx] Exiting after {} subframes ({} sync misses, {} MIB decodes, {} misses)",
            self.stats.subframes, self.stats.sync_misses, self.stats.decode_successes, self.stats.decode_misses
        );
        result.map(|()| self.stats)
    }
}
