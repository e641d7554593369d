//! Common Utilities
//!
//! Bit packing for broadcast payloads and small helpers over IQ buffers

use bytes::{BufMut, Bytes, BytesMut};
use num_complex::Complex32;

/// Convert a byte slice to hex string for debugging
pub fn bytes_to_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pack bits into bytes (MSB first)
pub fn pack_bits(bits: &[bool]) -> Bytes {
    let mut bytes = BytesMut::with_capacity((bits.len() + 7) / 8);

    for chunk in bits.chunks(8) {
        let mut byte = 0u8;
        for (i, &bit) in chunk.iter().enumerate() {
            if bit {
                byte |= 1 << (7 - i);
            }
        }
        bytes.put_u8(byte);
    }

    bytes.freeze()
}

/// Unpack bytes into bits (MSB first)
pub fn unpack_bits(bytes: &[u8]) -> Vec<bool> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);

    for &byte in bytes {
        for i in 0..8 {
            bits.push((byte & (1 << (7 - i))) != 0);
        }
    }

    bits
}

/// Append the `width` low bits of `value` to `bits`, MSB first
pub fn push_bits(bits: &mut Vec<bool>, value: u32, width: usize) {
    for i in (0..width).rev() {
        bits.push((value >> i) & 1 == 1);
    }
}

/// Read `width` bits starting at `offset` as an unsigned value, MSB first
pub fn read_bits(bits: &[bool], offset: usize, width: usize) -> u32 {
    bits[offset..offset + width]
        .iter()
        .fold(0u32, |acc, &bit| (acc << 1) | bit as u32)
}

/// Multiply every sample by a real factor
pub fn scale_samples(samples: &mut [Complex32], factor: f32) {
    for sample in samples.iter_mut() {
        *sample *= factor;
    }
}

/// Mean power of an IQ buffer, linear
pub fn mean_power(samples: &[Complex32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.norm_sqr()).sum::<f32>() / samples.len() as f32
}

/// Linear power to dB, clamped for silent buffers
pub fn power_to_db(power: f32) -> f32 {
    10.0 * power.max(1e-20).log10()
}
