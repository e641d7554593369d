//! Timing State Store
//!
//! Single-slot store for the latest sensed downlink timing. The sensing
//! thread is the only writer; every publish overwrites the slot and wakes
//! the scheduler. Observations published while the scheduler is busy are
//! superseded, never queued.

use common::types::CellParams;
use common::{repetition_phase, FrameClock};
use tokio::sync::watch;

/// Outcome of the MIB decode step for one received subframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeResult {
    /// No decode was attempted on this subframe
    #[default]
    NoAttempt,
    /// A decode was attempted and found nothing
    DecodeFailed,
    /// MIB decoded; `sfn_offset` is the frame position in the 40 ms cycle
    DecodeSucceeded { sfn_offset: u32 },
}

/// What the sensing loop learned from one received subframe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingObservation {
    pub clock: FrameClock,
    /// Whether a subframe boundary was found in this buffer
    pub sync_valid: bool,
    pub decode_result: DecodeResult,
    /// Cell as currently known to the sensing loop
    pub cell: CellParams,
    /// Carrier frequency offset estimate, Hz
    pub cfo_hz: f32,
}

/// Shared timing record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingState {
    pub clock: FrameClock,
    pub sync_valid: bool,
    pub decode_result: DecodeResult,
    pub cell: CellParams,
    pub cfo_hz: f32,
    /// Set by the first successful MIB decode, never cleared
    pub cell_acquired: bool,
    /// Frame number at which `cell_acquired` became true
    pub reference_frame_number: u32,
    /// Number of observations folded in so far
    pub generation: u64,
}

impl TimingState {
    /// Empty record for `cell`, before anything was received
    pub fn new(cell: CellParams) -> Self {
        Self {
            clock: FrameClock::default(),
            sync_valid: false,
            decode_result: DecodeResult::NoAttempt,
            cell,
            cfo_hz: 0.0,
            cell_acquired: false,
            reference_frame_number: 0,
            generation: 0,
        }
    }

    /// Fold one observation into the record
    pub fn apply(&mut self, observation: &TimingObservation) {
        self.clock = observation.clock;
        self.sync_valid = observation.sync_valid;
        self.decode_result = observation.decode_result;
        self.cell = observation.cell;
        self.cfo_hz = observation.cfo_hz;

        if let DecodeResult::DecodeSucceeded { .. } = observation.decode_result {
            if !self.cell_acquired {
                self.cell_acquired = true;
                self.reference_frame_number = observation.clock.frame_number;
            }
        }

        self.generation += 1;
    }

    /// Position of the current frame in the repetition cycle anchored at
    /// the reference frame
    pub fn repetition_phase(&self) -> u32 {
        repetition_phase(self.reference_frame_number, self.clock.frame_number)
    }
}

/// Writer side of the store
#[derive(Debug)]
pub struct TimingStore {
    tx: watch::Sender<TimingState>,
}

impl TimingStore {
    /// Create a store holding an empty record
    pub fn new(cell: CellParams) -> Self {
        let (tx, _rx) = watch::channel(TimingState::new(cell));
        Self { tx }
    }

    /// Fold `observation` in and wake subscribers; returns the new record
    ///
    /// Subscribers are notified even when nothing visible changed, so a
    /// failed boundary detection still wakes the scheduler.
    pub fn publish(&self, observation: &TimingObservation) -> TimingState {
        self.tx.send_modify(|state| state.apply(observation));
        *self.tx.borrow()
    }

    /// Copy of the current record
    pub fn snapshot(&self) -> TimingState {
        *self.tx.borrow()
    }

    /// New reader that sees publishes from now on
    pub fn subscribe(&self) -> TimingSubscriber {
        TimingSubscriber {
            rx: self.tx.subscribe(),
        }
    }
}

/// Reader side of the store
#[derive(Debug)]
pub struct TimingSubscriber {
    rx: watch::Receiver<TimingState>,
}

impl TimingSubscriber {
    /// Wait for the next publish and copy the latest record out
    ///
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<TimingState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Whether a publish happened since the last read
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}
