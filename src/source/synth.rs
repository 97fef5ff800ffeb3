//! Synthetic waveforms. Values are in microvolts and depend only on band,
//! channel index and sample number.

use std::f64::consts::PI;

use super::BandKind;

const AP_NOISE_UV: f64 = 12.0;
const AP_SPIKE_UV: f64 = -90.0;
const AP_SPIKE_SAMPLES: i64 = 45;

const LFP_AMPLITUDE_UV: f64 = 150.0;
const LFP_FREQ_HZ: f64 = 8.0;
const LFP_NOISE_UV: f64 = 4.0;

const AUX_AMPLITUDE_UV: f64 = 2000.0;

pub fn sample(band: BandKind, channel: usize, sample_number: i64, sample_rate_hz: f64) -> f32 {
    let t = sample_number as f64 / sample_rate_hz;
    let ch = channel as f64;

    let value = match band {
        BandKind::Ap => {
            // each channel fires at its own fixed interval
            let interval = 3000 + 97 * channel as i64;
            let phase = (sample_number + 13 * channel as i64).rem_euclid(interval);
            let spike = if phase < AP_SPIKE_SAMPLES {
                let x = phase as f64 / AP_SPIKE_SAMPLES as f64;
                AP_SPIKE_UV * (PI * x).sin() * (-3.0 * x).exp()
            } else {
                0.0
            };
            spike + AP_NOISE_UV * noise(channel, sample_number)
        }
        BandKind::Lfp => {
            LFP_AMPLITUDE_UV * (2.0 * PI * LFP_FREQ_HZ * t + 0.1 * ch).sin()
                + LFP_NOISE_UV * noise(channel, sample_number)
        }
        BandKind::AuxiliaryInput => AUX_AMPLITUDE_UV * (2.0 * PI * (ch + 1.0) * t).sin(),
    };

    value as f32
}

/// Uniform in [-1, 1), stateless (splitmix64 of channel and sample number).
fn noise(channel: usize, sample_number: i64) -> f64 {
    let mut z = (channel as u64)
        .wrapping_shl(40)
        .wrapping_add(sample_number as u64)
        .wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;

    (z >> 11) as f64 / (1u64 << 52) as f64 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_per_channel() {
        for band in &[BandKind::Ap, BandKind::Lfp, BandKind::AuxiliaryInput] {
            let rate = band.sample_rate_hz();
            for sn in 0..200 {
                assert_eq!(sample(*band, 3, sn, rate), sample(*band, 3, sn, rate));
            }
        }
    }

    #[test]
    fn channels_differ() {
        let a: Vec<f32> = (0..100).map(|sn| sample(BandKind::Lfp, 0, sn, 2500.0)).collect();
        let b: Vec<f32> = (0..100).map(|sn| sample(BandKind::Lfp, 1, sn, 2500.0)).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn noise_in_range() {
        for sn in 0..10_000 {
            let n = noise(5, sn);
            assert!(n >= -1.0 && n < 1.0);
        }
    }
}
