//! LTE Master Information Block
//!
//! Packs and unpacks the 24-bit BCH payload according to 3GPP TS 36.331

use crate::PhyError;
use bytes::Bytes;
use common::types::{CellParams, NofPrb, PhichLength, PhichResources};
use common::utils::{pack_bits, push_bits, read_bits, unpack_bits};
use common::SFN_PERIOD;
use num_traits::FromPrimitive;

/// BCH payload length in bits
pub const MIB_LEN_BITS: usize = 24;

/// Decoded MIB contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mib {
    /// Downlink bandwidth
    pub nof_prb: NofPrb,
    /// PHICH duration
    pub phich_length: PhichLength,
    /// PHICH resources
    pub phich_resources: PhichResources,
    /// System frame number; only the 8 MSBs travel over the air, so a
    /// decoded value is always a multiple of 4
    pub sfn: u32,
}

impl Mib {
    /// MIB advertising `cell` at frame `sfn`
    pub fn from_cell(cell: &CellParams, sfn: u32) -> Self {
        Self {
            nof_prb: cell.nof_prb,
            phich_length: cell.phich_length,
            phich_resources: cell.phich_resources,
            sfn: sfn % SFN_PERIOD,
        }
    }

    /// Pack into the 24-bit payload (3 bytes, MSB first)
    pub fn pack(&self) -> Bytes {
        let mut bits = Vec::with_capacity(MIB_LEN_BITS);

        // dl-Bandwidth (3 bits)
        push_bits(&mut bits, self.nof_prb.mib_code() as u32, 3);

        // phich-Duration (1 bit)
        push_bits(&mut bits, (self.phich_length == PhichLength::Extended) as u32, 1);

        // phich-Resource (2 bits)
        push_bits(&mut bits, self.phich_resources as u32, 2);

        // systemFrameNumber, 8 MSBs of the 10-bit SFN
        push_bits(&mut bits, (self.sfn % SFN_PERIOD) >> 2, 8);

        // spare (10 bits)
        push_bits(&mut bits, 0, 10);

        pack_bits(&bits)
    }

    /// Unpack a 24-bit payload
    pub fn unpack(payload: &[u8]) -> Result<Self, PhyError> {
        let bits = unpack_bits(payload);
        if bits.len() < MIB_LEN_BITS {
            return Err(PhyError::InvalidPayload(format!(
                "MIB must be {} bits, got {}",
                MIB_LEN_BITS,
                bits.len()
            )));
        }

        let bw_code = read_bits(&bits, 0, 3) as u8;
        let nof_prb = NofPrb::from_mib_code(bw_code)
            .ok_or_else(|| PhyError::InvalidPayload(format!("reserved bandwidth code {}", bw_code)))?;

        let phich_length = if bits[3] {
            PhichLength::Extended
        } else {
            PhichLength::Normal
        };

        let phich_resources = PhichResources::from_u32(read_bits(&bits, 4, 2))
            .ok_or_else(|| PhyError::InvalidPayload("invalid PHICH resources".to_string()))?;

        let sfn = read_bits(&bits, 6, 8) << 2;

        Ok(Self {
            nof_prb,
            phich_length,
            phich_resources,
            sfn,
        })
    }

    /// Apply the decoded fields to `cell`, keeping what the MIB does not carry
    pub fn apply_to(&self, cell: &mut CellParams) {
        cell.nof_prb = self.nof_prb;
        cell.phich_length = self.phich_length;
        cell.phich_resources = self.phich_resources;
    }
}
