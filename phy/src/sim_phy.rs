//! Simulated PHY
//!
//! Pairs with `interfaces::sim_rf`: boundary detection and MIB decoding read
//! the in-band tag the simulated front end writes, and synthesis writes the
//! same tag so recorded transmissions can be checked by frame number.

use crate::{
    BroadcastSynthesizer, DownlinkSync, Mib, MibDecode, PhyError, SubframeContent, SubframeSync,
};
use common::types::CellParams;
use common::{BCH_REPETITION_FRAMES, BROADCAST_SUBFRAME};
use interfaces::sim_rf::{read_tag, write_tag};
use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

/// Offset of the synchronization block inside a synthesized subframe
const SYNC_OFFSET: usize = 2;

/// Simulated PHY configuration
#[derive(Debug, Clone)]
pub struct SimPhyConfig {
    /// Probability that a MIB decode attempt misses
    pub mib_loss_probability: f64,
    /// Carrier frequency offset reported with every boundary
    pub cfo_hz: f32,
    /// Report a decoder fault after this many decode attempts
    pub fault_after_attempts: Option<u64>,
    /// Seed for the loss process
    pub seed: u64,
}

impl Default for SimPhyConfig {
    fn default() -> Self {
        Self {
            mib_loss_probability: 0.0,
            cfo_hz: 0.0,
            fault_after_attempts: None,
            seed: 0xb0ca,
        }
    }
}

impl SimPhyConfig {
    /// Parse the PHY keys out of a device argument string
    /// Keys: mib_loss, cfo, phy_fault, phy_seed
    pub fn from_device_args(args: &str) -> Result<Self, PhyError> {
        let mut config = Self::default();

        for pair in args.split(',') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = value.trim();
            let invalid = |what: &str| PhyError::InvalidConfig(format!("Invalid {}: {}", what, value));

            match key.trim() {
                "mib_loss" => {
                    let p = value.parse::<f64>().map_err(|_| invalid("mib_loss"))?;
                    if !(0.0..=1.0).contains(&p) {
                        return Err(invalid("mib_loss"));
                    }
                    config.mib_loss_probability = p;
                }
                "cfo" => {
                    config.cfo_hz = value.parse::<f32>().map_err(|_| invalid("cfo"))?;
                }
                "phy_fault" => {
                    config.fault_after_attempts = Some(value.parse::<u64>().map_err(|_| invalid("phy_fault"))?);
                }
                "phy_seed" => {
                    config.seed = value.parse::<u64>().map_err(|_| invalid("phy_seed"))?;
                }
                _ => {}
            }
        }

        Ok(config)
    }
}

/// Receive-side simulated PHY
pub struct SimDownlinkSync {
    config: SimPhyConfig,
    cell: Option<CellParams>,
    rng: StdRng,
    attempts: u64,
}

impl SimDownlinkSync {
    /// Create a simulated synchronizer/decoder
    pub fn new(config: SimPhyConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            cell: None,
            attempts: 0,
        }
    }
}

impl DownlinkSync for SimDownlinkSync {
    fn set_cell(&mut self, cell: &CellParams) -> Result<(), PhyError> {
        debug!("Sim PHY RX bound to PCI {} ({} PRB)", cell.pci.0, cell.nof_prb.count());
        self.cell = Some(*cell);
        Ok(())
    }

    fn detect_subframe_boundary(&mut self, samples: &[Complex32]) -> Option<SubframeSync> {
        read_tag(samples).map(|(_, subframe)| SubframeSync {
            subframe_index: subframe,
            cfo_hz: self.config.cfo_hz,
        })
    }

    fn decode_broadcast_payload(&mut self, samples: &[Complex32]) -> Result<MibDecode, PhyError> {
        let cell = self
            .cell
            .ok_or_else(|| PhyError::InvalidCell("decoder used before set_cell".to_string()))?;

        self.attempts += 1;
        if let Some(limit) = self.config.fault_after_attempts {
            if self.attempts > limit {
                return Err(PhyError::DecoderFault(format!(
                    "simulated fault after {} attempts",
                    limit
                )));
            }
        }

        let (sfn, subframe) = match read_tag(samples) {
            Some(tag) => tag,
            None => return Ok(MibDecode::NotFound),
        };
        if subframe != BROADCAST_SUBFRAME {
            return Ok(MibDecode::NotFound);
        }
        if self.config.mib_loss_probability > 0.0
            && self.rng.gen_bool(self.config.mib_loss_probability)
        {
            trace!("Sim PHY: dropping MIB at sfn={}", sfn);
            return Ok(MibDecode::NotFound);
        }

        Ok(MibDecode::Found {
            payload: Mib::from_cell(&cell, sfn).pack(),
            sfn_offset: sfn % BCH_REPETITION_FRAMES,
        })
    }
}

/// Transmit-side simulated PHY
pub struct SimBroadcastSynthesizer {
    cell: Option<CellParams>,
}

impl SimBroadcastSynthesizer {
    /// Create a simulated synthesizer
    pub fn new() -> Self {
        Self { cell: None }
    }
}

impl Default for SimBroadcastSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastSynthesizer for SimBroadcastSynthesizer {
    fn set_cell(&mut self, cell: &CellParams) -> Result<(), PhyError> {
        debug!("Sim PHY TX bound to PCI {} ({} PRB)", cell.pci.0, cell.nof_prb.count());
        self.cell = Some(*cell);
        Ok(())
    }

    fn subframe_len(&self) -> usize {
        self.cell.map(|c| c.nof_prb.subframe_len()).unwrap_or(0)
    }

    fn modulate(&mut self, content: &SubframeContent<'_>, out: &mut [Complex32]) -> Result<(), PhyError> {
        let expected = self.subframe_len();
        if expected == 0 {
            return Err(PhyError::InvalidCell("synthesizer used before set_cell".to_string()));
        }
        if out.len() != expected {
            return Err(PhyError::BufferSize {
                expected,
                actual: out.len(),
            });
        }

        out.iter_mut().for_each(|s| *s = Complex32::new(0.0, 0.0));
        write_tag(out, content.frame_number, content.subframe_index);

        let mut cursor = SYNC_OFFSET;
        if let Some(sync) = content.sync {
            let sss = sync.sss_for(content.subframe_index);
            for (dst, src) in out[cursor..].iter_mut().zip(sync.pss.iter()) {
                *dst = *src;
            }
            cursor += sync.pss.len();
            for (dst, &src) in out[cursor..].iter_mut().zip(sss.iter()) {
                *dst = Complex32::new(src, 0.0);
            }
            cursor += sss.len();
        }

        if let Some(bch) = content.bch {
            // One BPSK symbol per payload bit, rotated by the redundancy version
            let rotation = Complex32::from_polar(
                1.0,
                std::f32::consts::FRAC_PI_2 * bch.redundancy_version as f32,
            );
            let bits = common::unpack_bits(bch.payload);
            for (dst, bit) in out[cursor..].iter_mut().zip(bits) {
                let symbol = if bit { -1.0 } else { 1.0 };
                *dst = rotation * symbol;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BchCodeword, SyncSignals};
    use common::types::{NofPrb, Pci};

    fn cell() -> CellParams {
        CellParams::new(Pci(12), NofPrb::Prb6, 1)
    }

    fn tagged(sfn: u32, subframe: u32) -> Vec<Complex32> {
        let mut buf = vec![Complex32::new(0.0, 0.0); NofPrb::Prb6.subframe_len()];
        write_tag(&mut buf, sfn, subframe);
        buf
    }

    #[test]
    fn test_device_args_parsing() {
        let config = SimPhyConfig::from_device_args("sfn=3,mib_loss=0.5, cfo=-150.5,phy_fault=12,phy_seed=4").unwrap();
        assert_eq!(config.mib_loss_probability, 0.5);
        assert_eq!(config.cfo_hz, -150.5);
        assert_eq!(config.fault_after_attempts, Some(12));
        assert_eq!(config.seed, 4);

        assert!(SimPhyConfig::from_device_args("mib_loss=2").is_err());
        assert!(SimPhyConfig::from_device_args("cfo=fast").is_err());
        assert_eq!(SimPhyConfig::from_device_args("").unwrap().fault_after_attempts, None);
    }

    #[test]
    fn test_detect_reads_subframe_index() {
        let mut phy = SimDownlinkSync::new(SimPhyConfig {
            cfo_hz: 120.0,
            ..SimPhyConfig::default()
        });
        let sync = phy.detect_subframe_boundary(&tagged(77, 3)).unwrap();
        assert_eq!(sync.subframe_index, 3);
        assert_eq!(sync.cfo_hz, 120.0);
        assert!(phy.detect_subframe_boundary(&vec![Complex32::new(0.0, 0.0); 16]).is_none());
    }

    #[test]
    fn test_decode_splits_sfn_into_msbs_and_offset() {
        let mut phy = SimDownlinkSync::new(SimPhyConfig::default());
        phy.set_cell(&cell()).unwrap();
        match phy.decode_broadcast_payload(&tagged(513, 0)).unwrap() {
            MibDecode::Found { payload, sfn_offset } => {
                let mib = Mib::unpack(&payload).unwrap();
                assert_eq!(mib.sfn, 512);
                assert_eq!(sfn_offset, 1);
            }
            other => panic!("unexpected decode result {:?}", other),
        }
        assert_eq!(phy.decode_broadcast_payload(&tagged(513, 4)).unwrap(), MibDecode::NotFound);
    }

    #[test]
    fn test_decode_requires_cell_and_faults_on_demand() {
        let mut phy = SimDownlinkSync::new(SimPhyConfig {
            fault_after_attempts: Some(1),
            ..SimPhyConfig::default()
        });
        assert!(matches!(
            phy.decode_broadcast_payload(&tagged(0, 0)),
            Err(PhyError::InvalidCell(_))
        ));
        phy.set_cell(&cell()).unwrap();
        assert!(phy.decode_broadcast_payload(&tagged(0, 0)).is_ok());
        assert!(matches!(
            phy.decode_broadcast_payload(&tagged(0, 0)),
            Err(PhyError::DecoderFault(_))
        ));
    }

    #[test]
    fn test_mib_loss_is_reported_as_miss() {
        let mut phy = SimDownlinkSync::new(SimPhyConfig {
            mib_loss_probability: 1.0,
            ..SimPhyConfig::default()
        });
        phy.set_cell(&cell()).unwrap();
        assert_eq!(phy.decode_broadcast_payload(&tagged(8, 0)).unwrap(), MibDecode::NotFound);
    }

    #[test]
    fn test_modulate_writes_tag_sync_and_bch() {
        let mut synth = SimBroadcastSynthesizer::new();
        synth.set_cell(&cell()).unwrap();
        let sync = SyncSignals::generate(Pci(12));
        let payload = synth.encode_broadcast_payload(101, &cell());
        let mut out = vec![Complex32::new(9.0, 9.0); synth.subframe_len()];

        synth
            .modulate(
                &SubframeContent {
                    frame_number: 101,
                    subframe_index: 0,
                    sync: Some(&sync),
                    bch: Some(BchCodeword {
                        payload: &payload,
                        nof_ports: 1,
                        redundancy_version: 1,
                    }),
                },
                &mut out,
            )
            .unwrap();

        assert_eq!(read_tag(&out), Some((101, 0)));
        assert_eq!(out[SYNC_OFFSET], sync.pss[0]);
        assert_eq!(out[out.len() - 1], Complex32::new(0.0, 0.0));

        let mut short = vec![Complex32::new(0.0, 0.0); 10];
        assert!(matches!(
            synth.modulate(
                &SubframeContent {
                    frame_number: 0,
                    subframe_index: 1,
                    sync: None,
                    bch: None,
                },
                &mut short,
            ),
            Err(PhyError::BufferSize { .. })
        ));
    }
}
