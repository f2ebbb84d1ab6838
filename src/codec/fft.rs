//! Power spectrum of one frame (rustfft)

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::protocol::SAMPLES_PER_FRAME;

/// Forward FFT planned once for `SAMPLES_PER_FRAME` and reused per frame.
pub struct PowerSpectrum {
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
}

impl Default for PowerSpectrum {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerSpectrum {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(SAMPLES_PER_FRAME),
            buffer: vec![Complex::new(0.0, 0.0); SAMPLES_PER_FRAME],
        }
    }

    /// Writes `|X[k]|^2` into `spectrum`, with negative frequencies folded
    /// onto their positive bins (`spectrum[k] += spectrum[N - k]`).
    pub fn compute(&mut self, samples: &[f32], spectrum: &mut [f32]) {
        let n = SAMPLES_PER_FRAME;
        assert_eq!(samples.len(), n);
        assert!(spectrum.len() >= n);

        for (c, &s) in self.buffer.iter_mut().zip(samples) {
            *c = Complex::new(s, 0.0);
        }
        self.fft.process(&mut self.buffer);

        for (out, c) in spectrum.iter_mut().zip(&self.buffer) {
            *out = c.norm_sqr();
        }
        for i in 1..n / 2 {
            spectrum[i] += spectrum[n - i];
        }
    }
}
