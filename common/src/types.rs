//! Common LTE Cell Types
//!
//! Defines the cell parameters shared by the sensing and transmit paths

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

/// Physical Cell Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pci(pub u16);

impl Pci {
    /// Maximum valid LTE PCI value (0-503)
    pub const MAX: u16 = 503;

    /// Create a new PCI with validation
    pub fn new(value: u16) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    /// PSS root index N_id_2
    pub fn n_id_2(&self) -> u16 {
        self.0 % 3
    }

    /// SSS group index N_id_1
    pub fn n_id_1(&self) -> u16 {
        self.0 / 3
    }
}

/// Downlink bandwidth expressed in physical resource blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum NofPrb {
    /// 1.4 MHz
    Prb6 = 6,
    /// 3 MHz
    Prb15 = 15,
    /// 5 MHz
    Prb25 = 25,
    /// 10 MHz
    Prb50 = 50,
    /// 15 MHz
    Prb75 = 75,
    /// 20 MHz
    Prb100 = 100,
}

impl NofPrb {
    /// Parse a PRB count
    pub fn from_count(count: u32) -> Option<Self> {
        Self::from_u32(count)
    }

    /// Number of PRBs
    pub fn count(&self) -> u32 {
        *self as u32
    }

    /// OFDM symbol size (FFT length) at the reduced srsRAN sample rates
    pub fn symbol_size(&self) -> usize {
        match self {
            NofPrb::Prb6 => 128,
            NofPrb::Prb15 => 256,
            NofPrb::Prb25 => 384,
            NofPrb::Prb50 => 768,
            NofPrb::Prb75 => 1024,
            NofPrb::Prb100 => 1536,
        }
    }

    /// Baseband sample rate in Hz
    pub fn sample_rate(&self) -> f64 {
        self.symbol_size() as f64 * 15_000.0
    }

    /// Samples in one 1 ms subframe
    pub fn subframe_len(&self) -> usize {
        15 * self.symbol_size()
    }

    /// Three-bit bandwidth code carried in the MIB
    pub fn mib_code(&self) -> u8 {
        match self {
            NofPrb::Prb6 => 0,
            NofPrb::Prb15 => 1,
            NofPrb::Prb25 => 2,
            NofPrb::Prb50 => 3,
            NofPrb::Prb75 => 4,
            NofPrb::Prb100 => 5,
        }
    }

    /// Inverse of [`NofPrb::mib_code`]
    pub fn from_mib_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(NofPrb::Prb6),
            1 => Some(NofPrb::Prb15),
            2 => Some(NofPrb::Prb25),
            3 => Some(NofPrb::Prb50),
            4 => Some(NofPrb::Prb75),
            5 => Some(NofPrb::Prb100),
            _ => None,
        }
    }
}

/// PHICH duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhichLength {
    Normal,
    Extended,
}

/// PHICH resource factor Ng
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhichResources {
    /// Ng = 1/6
    OneSixth = 0,
    /// Ng = 1/2
    Half = 1,
    /// Ng = 1
    One = 2,
    /// Ng = 2
    Two = 3,
}

/// LTE cell parameters as sensed from (or advertised in) the broadcast channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellParams {
    /// Physical cell identity
    pub pci: Pci,
    /// Downlink bandwidth
    pub nof_prb: NofPrb,
    /// Number of cell-specific antenna ports (1, 2 or 4)
    pub nof_ports: u8,
    /// PHICH duration
    pub phich_length: PhichLength,
    /// PHICH resources
    pub phich_resources: PhichResources,
}

impl CellParams {
    /// Valid antenna port counts
    pub const VALID_PORTS: [u8; 3] = [1, 2, 4];

    /// Create cell parameters with normal PHICH duration and Ng = 1/6
    pub fn new(pci: Pci, nof_prb: NofPrb, nof_ports: u8) -> Self {
        Self {
            pci,
            nof_prb,
            nof_ports,
            phich_length: PhichLength::Normal,
            phich_resources: PhichResources::OneSixth,
        }
    }
}

impl Default for CellParams {
    fn default() -> Self {
        Self::new(Pci(0), NofPrb::Prb25, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pci_validation() {
        assert!(Pci::new(0).is_some());
        assert!(Pci::new(503).is_some());
        assert!(Pci::new(504).is_none());
        assert_eq!(Pci(301).n_id_2(), 1);
        assert_eq!(Pci(301).n_id_1(), 100);
    }

    #[test]
    fn test_prb_sample_rates() {
        assert_eq!(NofPrb::Prb25.sample_rate(), 5.76e6);
        assert_eq!(NofPrb::Prb25.subframe_len(), 5760);
        assert_eq!(NofPrb::Prb100.sample_rate(), 23.04e6);
        assert_eq!(NofPrb::Prb6.sample_rate(), 1.92e6);
    }

    #[test]
    fn test_prb_from_count() {
        assert_eq!(NofPrb::from_count(50), Some(NofPrb::Prb50));
        assert_eq!(NofPrb::from_count(52), None);
    }

    #[test]
    fn test_cell_params_defaults() {
        let cell = CellParams::new(Pci(9), NofPrb::Prb15, 2);
        assert_eq!(cell.phich_length, PhichLength::Normal);
        assert_eq!(cell.phich_resources, PhichResources::OneSixth);
        assert_eq!(CellParams::default().nof_prb, NofPrb::Prb25);
    }

    #[test]
    fn test_mib_bandwidth_code() {
        for prb in [NofPrb::Prb6, NofPrb::Prb15, NofPrb::Prb25, NofPrb::Prb50, NofPrb::Prb75, NofPrb::Prb100] {
            assert_eq!(NofPrb::from_mib_code(prb.mib_code()), Some(prb));
        }
        assert_eq!(NofPrb::from_mib_code(7), None);
    }
}
