//! Configuration for the message, protocol list, SNR sweep and output.

use std::collections::HashSet;
use std::hash::Hash;
use std::path::PathBuf;

use crate::codec::{Protocol, SAMPLE_RATE};

/// SNR levels swept by default, in dB, from cleanest to noisiest.
pub const DEFAULT_SNR_LEVELS: [i32; 11] = [40, 30, 20, 15, 10, 5, 0, -5, -10, -15, -20];

/// Sweep configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Message encoded for every trial.
    pub message: String,
    /// Protocols to test, in report order.
    pub protocols: Vec<Protocol>,
    /// SNR levels (dB) applied to each protocol, in report order.
    pub snr_levels: Vec<i32>,
    /// Encoder volume (0–100).
    pub volume: u8,
    /// Sample rate written to the WAV headers (Hz).
    pub sample_rate: u32,
    /// Directory receiving one WAV file per trial.
    pub output_dir: PathBuf,
    /// Write WAV files at all.
    pub write_wav: bool,
    /// Noise generator seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            message: "hello python".to_string(),
            protocols: Protocol::ALL.to_vec(),
            snr_levels: DEFAULT_SNR_LEVELS.to_vec(),
            volume: 20,
            sample_rate: SAMPLE_RATE,
            output_dir: PathBuf::from("."),
            write_wav: true,
            seed: None,
        }
    }
}

impl Config {
    /// Drop repeated protocols and SNR levels, keeping first occurrences.
    ///
    /// Each (protocol, SNR) pair names one WAV file and one table cell, so
    /// repeats would overwrite earlier trials.
    pub fn dedup(&mut self) {
        let protocols = self.protocols.len();
        let snr_levels = self.snr_levels.len();
        dedup_in_order(&mut self.protocols);
        dedup_in_order(&mut self.snr_levels);
        if protocols != self.protocols.len() || snr_levels != self.snr_levels.len() {
            tracing::warn!(
                protocols = ?self.protocols,
                snr_levels = ?self.snr_levels,
                "ignoring repeated protocols or SNR levels"
            );
        }
    }
}

fn dedup_in_order<T: Copy + Eq + Hash>(items: &mut Vec<T>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(*item));
}
