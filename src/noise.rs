//! Additive white Gaussian noise at a target SNR, and RMS power.

use rand::Rng;
use rand::distributions::{Distribution, Standard};

/// Buffers quieter than this are treated as silence and left untouched.
const SILENCE_RMS: f32 = 1e-10;

/// Zero-mean normal distribution sampled with the Box–Muller transform.
#[derive(Clone, Copy, Debug)]
pub struct Gaussian {
    std_dev: f64,
}

impl Gaussian {
    pub fn new(std_dev: f64) -> Self {
        Self { std_dev }
    }
}

impl Distribution<f32> for Gaussian {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        // u1 in (0, 1] keeps ln() finite
        let u1: f64 = 1.0 - rng.sample::<f64, _>(Standard);
        let u2: f64 = rng.sample(Standard);
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        (z * self.std_dev) as f32
    }
}

/// Root mean square of `samples`. An empty buffer yields NaN.
pub fn calculate_signal_power(samples: &[f32]) -> f32 {
    let sum: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Add white Gaussian noise so the mixture sits at `snr_db` relative to the
/// signal's RMS, clipped to [-1.0, 1.0].
///
/// The noise level is `rms / 10^(snr_db / 20)`, an amplitude ratio. Silent
/// input is returned unchanged.
pub fn add_noise_snr<R: Rng + ?Sized>(samples: &[f32], snr_db: f64, rng: &mut R) -> Vec<f32> {
    let signal_power = calculate_signal_power(samples);
    if signal_power < SILENCE_RMS {
        return samples.to_vec();
    }

    let noise_power = signal_power as f64 / 10f64.powf(snr_db / 20.0);
    let noise = Gaussian::new(noise_power);
    samples
        .iter()
        .map(|&s| (s + noise.sample(rng)).clamp(-1.0, 1.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn sine(amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 48000.0).sin())
            .collect()
    }

    #[test]
    fn rms_of_sine_is_amplitude_over_sqrt2() {
        let samples = sine(0.5, 48000);
        assert_abs_diff_eq!(
            calculate_signal_power(&samples),
            0.5 / std::f32::consts::SQRT_2,
            epsilon = 1e-4
        );
    }

    #[test]
    fn rms_of_constant_buffer() {
        assert_abs_diff_eq!(calculate_signal_power(&[-0.25; 64]), 0.25, epsilon = 1e-7);
    }

    #[test]
    fn rms_of_empty_buffer_is_nan() {
        assert!(calculate_signal_power(&[]).is_nan());
    }

    #[test]
    fn silence_is_returned_unchanged() {
        let mut rng = StdRng::seed_from_u64(1);
        let silence = vec![0.0f32; 4096];
        for snr in [40.0, 0.0, -20.0] {
            assert_eq!(add_noise_snr(&silence, snr, &mut rng), silence);
        }
    }

    #[test]
    fn output_keeps_length_and_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples = sine(0.9, 10_000);
        for snr in [40.0, 10.0, 0.0, -20.0] {
            let noisy = add_noise_snr(&samples, snr, &mut rng);
            assert_eq!(noisy.len(), samples.len());
            assert!(noisy.iter().all(|s| (-1.0..=1.0).contains(s)), "snr {snr}");
        }
    }

    #[test]
    fn noise_level_follows_amplitude_ratio() {
        let mut rng = StdRng::seed_from_u64(42);
        let samples = sine(0.1, 200_000);
        let noisy = add_noise_snr(&samples, 20.0, &mut rng);
        let residual: Vec<f32> = noisy.iter().zip(&samples).map(|(n, s)| n - s).collect();
        let signal_rms = calculate_signal_power(&samples);
        let noise_rms = calculate_signal_power(&residual);
        // 20 dB => noise RMS is a tenth of the signal RMS
        assert_abs_diff_eq!(noise_rms / signal_rms, 0.1, epsilon = 0.002);
    }

    #[test]
    fn seeded_generators_are_deterministic() {
        let samples = sine(0.3, 1024);
        let a = add_noise_snr(&samples, 5.0, &mut StdRng::seed_from_u64(9));
        let b = add_noise_snr(&samples, 5.0, &mut StdRng::seed_from_u64(9));
        let c = add_noise_snr(&samples, 5.0, &mut StdRng::seed_from_u64(10));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn gaussian_has_requested_spread() {
        let mut rng = StdRng::seed_from_u64(3);
        let dist = Gaussian::new(2.0);
        let draws: Vec<f32> = (0..100_000).map(|_| dist.sample(&mut rng)).collect();
        let mean = draws.iter().map(|&x| x as f64).sum::<f64>() / draws.len() as f64;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 0.03);
        assert_abs_diff_eq!(calculate_signal_power(&draws), 2.0, epsilon = 0.03);
    }
}
