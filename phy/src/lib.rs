//! LTE Physical Layer Seam
//!
//! The timing engine does not demodulate or modulate anything itself. It
//! talks to a PHY library through the two traits below: one used by the
//! sensing thread (boundary detection, MIB decoding) and one used by the
//! transmit thread (MIB encoding, sync signals, subframe modulation).

pub mod mib;
pub mod sim_phy;
pub mod sync_signals;

pub use mib::Mib;
pub use sim_phy::{SimBroadcastSynthesizer, SimDownlinkSync, SimPhyConfig};
pub use sync_signals::SyncSignals;

use bytes::Bytes;
use common::types::{CellParams, Pci};
use num_complex::Complex32;
use thiserror::Error;

/// Errors reported by the PHY library
#[derive(Error, Debug)]
pub enum PhyError {
    /// Internal decoder failure, distinct from an ordinary miss
    #[error("Decoder fault: {0}")]
    DecoderFault(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid cell configuration: {0}")]
    InvalidCell(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Buffer size mismatch: expected {expected}, got {actual}")]
    BufferSize { expected: usize, actual: usize },
}

/// Result of locating a subframe boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubframeSync {
    /// Subframe index within the frame, `[0, 10)`
    pub subframe_index: u32,
    /// Current carrier frequency offset estimate in Hz
    pub cfo_hz: f32,
}

/// Outcome of a broadcast channel decode attempt
#[derive(Debug, Clone, PartialEq)]
pub enum MibDecode {
    /// No valid codeword in this subframe
    NotFound,
    /// Decoded payload and the position (0..4) of this frame in the
    /// 40 ms PBCH repetition cycle
    Found { payload: Bytes, sfn_offset: u32 },
}

/// PBCH codeword to map into subframe 0
#[derive(Debug, Clone, Copy)]
pub struct BchCodeword<'a> {
    /// Packed MIB
    pub payload: &'a [u8],
    /// Antenna ports signalled through the CRC mask
    pub nof_ports: u8,
    /// Which quarter of the 40 ms codeword to send (frame number mod 4)
    pub redundancy_version: u32,
}

/// What one subframe of the synthesized waveform carries
#[derive(Debug, Clone, Copy)]
pub struct SubframeContent<'a> {
    /// Frame number this subframe belongs to
    pub frame_number: u32,
    /// Subframe index, `[0, 10)`
    pub subframe_index: u32,
    /// PSS/SSS, present on subframes 0 and 5
    pub sync: Option<&'a SyncSignals>,
    /// PBCH, present on subframe 0
    pub bch: Option<BchCodeword<'a>>,
}

/// Receive-side PHY operations used by the sensing thread
pub trait DownlinkSync: Send {
    /// Bind to the cell being tracked
    fn set_cell(&mut self, cell: &CellParams) -> Result<(), PhyError>;

    /// Locate the subframe boundary in a freshly received buffer
    fn detect_subframe_boundary(&mut self, samples: &[Complex32]) -> Option<SubframeSync>;

    /// Try to decode the broadcast channel; `Err` is a library fault
    fn decode_broadcast_payload(&mut self, samples: &[Complex32]) -> Result<MibDecode, PhyError>;
}

/// Transmit-side PHY operations used by the injector thread
pub trait BroadcastSynthesizer: Send {
    /// Bind to the cell whose waveform will be synthesized
    fn set_cell(&mut self, cell: &CellParams) -> Result<(), PhyError>;

    /// Samples per synthesized subframe for the bound cell
    fn subframe_len(&self) -> usize;

    /// Pack the MIB advertising `cell` at `frame_number`
    fn encode_broadcast_payload(&self, frame_number: u32, cell: &CellParams) -> Bytes {
        Mib::from_cell(cell, frame_number).pack()
    }

    /// PSS/SSS sequences for `pci`
    fn generate_sync_signals(&self, pci: Pci) -> SyncSignals {
        SyncSignals::generate(pci)
    }

    /// Render one subframe into `out` (exactly `subframe_len()` samples)
    fn modulate(&mut self, content: &SubframeContent<'_>, out: &mut [Complex32]) -> Result<(), PhyError>;
}
