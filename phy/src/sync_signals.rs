//! LTE Primary and Secondary Synchronization Signals
//!
//! Implements PSS/SSS sequence generation according to 3GPP TS 36.211 6.11

use common::types::Pci;
use num_complex::Complex32;
use std::f32::consts::PI;
use tracing::debug;

/// PSS/SSS sequence length (subcarriers)
pub const SYNC_SEQUENCE_LEN: usize = 62;

/// Zadoff-Chu root indices for N_id_2 = 0, 1, 2
const PSS_ROOTS: [u32; 3] = [25, 29, 34];

/// Synchronization sequences for one cell, generated once per acquisition
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSignals {
    /// Physical cell ID the sequences were generated for
    pub pci: Pci,
    /// PSS, frequency domain
    pub pss: Vec<Complex32>,
    /// SSS carried in subframe 0
    pub sss_subframe0: Vec<f32>,
    /// SSS carried in subframe 5
    pub sss_subframe5: Vec<f32>,
}

impl SyncSignals {
    /// Generate PSS and both SSS variants for `pci`
    pub fn generate(pci: Pci) -> Self {
        let pss = generate_pss(pci.n_id_2() as usize);
        let (sss_subframe0, sss_subframe5) = generate_sss(pci.n_id_1() as u32, pci.n_id_2() as u32);
        debug!(
            "Generated sync signals for PCI {} (N_id_1={}, N_id_2={})",
            pci.0,
            pci.n_id_1(),
            pci.n_id_2()
        );
        Self {
            pci,
            pss,
            sss_subframe0,
            sss_subframe5,
        }
    }

    /// SSS for the given subframe (0 or 5)
    pub fn sss_for(&self, subframe: u32) -> &[f32] {
        if subframe == 5 {
            &self.sss_subframe5
        } else {
            &self.sss_subframe0
        }
    }
}

/// Zadoff-Chu PSS with the DC element punctured
fn generate_pss(n_id_2: usize) -> Vec<Complex32> {
    let u = PSS_ROOTS[n_id_2 % 3] as f32;
    (0..SYNC_SEQUENCE_LEN)
        .map(|n| {
            let n = n as f32;
            let phase = if n < 31.0 {
                -PI * u * n * (n + 1.0) / 63.0
            } else {
                -PI * u * (n + 1.0) * (n + 2.0) / 63.0
            };
            Complex32::from_polar(1.0, phase)
        })
        .collect()
}

/// Length-31 m-sequence mapped to +/-1, with the feedback taps given as
/// offsets into the 5-bit register
fn m_sequence(taps: &[usize]) -> [f32; 31] {
    let mut x = [0u8; 31];
    x[4] = 1;
    for i in 0..26 {
        x[i + 5] = taps.iter().fold(0u8, |acc, &t| acc ^ x[i + t]);
    }
    let mut out = [0f32; 31];
    for (o, &bit) in out.iter_mut().zip(x.iter()) {
        *o = 1.0 - 2.0 * bit as f32;
    }
    out
}

/// SSS sequences for subframes 0 and 5
fn generate_sss(n_id_1: u32, n_id_2: u32) -> (Vec<f32>, Vec<f32>) {
    let s_tilde = m_sequence(&[2, 0]);
    let c_tilde = m_sequence(&[3, 0]);
    let z_tilde = m_sequence(&[4, 2, 1, 0]);

    let q_prime = n_id_1 / 30;
    let q = (n_id_1 + q_prime * (q_prime + 1) / 2) / 30;
    let m_prime = n_id_1 + q * (q + 1) / 2;
    let m0 = (m_prime % 31) as usize;
    let m1 = ((m0 as u32 + m_prime / 31 + 1) % 31) as usize;
    let n2 = n_id_2 as usize;

    let mut sf0 = vec![0f32; SYNC_SEQUENCE_LEN];
    let mut sf5 = vec![0f32; SYNC_SEQUENCE_LEN];
    for n in 0..31 {
        let s0 = s_tilde[(n + m0) % 31];
        let s1 = s_tilde[(n + m1) % 31];
        let c0 = c_tilde[(n + n2) % 31];
        let c1 = c_tilde[(n + n2 + 3) % 31];
        let z_m0 = z_tilde[(n + (m0 % 8)) % 31];
        let z_m1 = z_tilde[(n + (m1 % 8)) % 31];

        sf0[2 * n] = s0 * c0;
        sf0[2 * n + 1] = s1 * c1 * z_m0;
        sf5[2 * n] = s1 * c0;
        sf5[2 * n + 1] = s0 * c1 * z_m1;
    }
    (sf0, sf5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pss_is_unit_modulus() {
        let signals = SyncSignals::generate(Pci(1));
        assert_eq!(signals.pss.len(), SYNC_SEQUENCE_LEN);
        for s in &signals.pss {
            assert!((s.norm() - 1.0).abs() < 1e-5);
        }
        // First element has zero phase
        assert!((signals.pss[0].re - 1.0).abs() < 1e-6);
        assert!(signals.pss[0].im.abs() < 1e-6);
    }

    #[test]
    fn test_pss_differs_by_root() {
        let a = SyncSignals::generate(Pci(0));
        let b = SyncSignals::generate(Pci(1));
        let c = SyncSignals::generate(Pci(3));
        assert_ne!(a.pss, b.pss);
        assert_eq!(a.pss, c.pss);
    }

    #[test]
    fn test_sss_is_bipolar_and_subframe_dependent() {
        let signals = SyncSignals::generate(Pci(301));
        assert_eq!(signals.sss_subframe0.len(), SYNC_SEQUENCE_LEN);
        assert!(signals.sss_subframe0.iter().all(|&v| v == 1.0 || v == -1.0));
        assert_ne!(signals.sss_subframe0, signals.sss_subframe5);
        assert_eq!(signals.sss_for(5), signals.sss_subframe5.as_slice());
        assert_eq!(signals.sss_for(0), signals.sss_subframe0.as_slice());
    }
}
