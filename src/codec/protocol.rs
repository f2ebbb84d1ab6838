//! Modem constants and the protocol preset table.

use std::fmt;
use std::str::FromStr;

/// Sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48000;

/// Number of samples per FFT frame.
pub const SAMPLES_PER_FRAME: usize = 1024;

/// Frequency resolution: 46.875 Hz per bin.
pub const HZ_PER_SAMPLE: f64 = SAMPLE_RATE as f64 / SAMPLES_PER_FRAME as f64;

/// Inverse of `HZ_PER_SAMPLE`.
pub const IHZ_PER_SAMPLE: f64 = 1.0 / HZ_PER_SAMPLE;

/// Bins per nibble slot (one tone per nibble value).
pub const BINS_PER_NIBBLE: usize = 16;

/// Bin spacing between the bit1 and bit0 tone of a marker bit.
pub const FREQ_DELTA_BIN: usize = 1;

/// Number of marker bits checked on each frame.
pub const N_BITS_IN_MARKER: usize = 16;

/// Number of frames for start and end markers.
pub const N_MARKER_FRAMES: usize = 16;

/// Encoded length prefix: 1 length byte + 2 ECC bytes.
pub const ENCODED_DATA_OFFSET: usize = 3;

/// Power ratio a marker bin must exceed its neighbour by.
pub const SOUND_MARKER_THRESHOLD: f32 = 3.0;

/// Maximum payload size in bytes.
pub const MAX_LENGTH_VARIABLE: usize = 140;

/// Maximum total encoded data size.
pub const MAX_DATA_SIZE: usize = 256;

/// Number of frames averaged for marker detection.
pub const MAX_SPECTRUM_HISTORY: usize = 4;

/// Sub-frame steps tried when searching for the data offset.
pub const STEPS_PER_FRAME: usize = 16;

/// ECC byte count for a payload of `len` bytes: `len < 4 ? 2 : max(4, 2*(len/5))`.
pub fn ecc_bytes_for_length(len: usize) -> usize {
    if len < 4 { 2 } else { 4usize.max(2 * (len / 5)) }
}

/// A modulation preset: tone band start and transmission speed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Protocol {
    pub id: u8,
    pub name: &'static str,
    /// FFT bin of the lowest tone.
    pub freq_start: usize,
    /// Frames each chunk of `bytes_per_tx` bytes is held for.
    pub frames_per_tx: usize,
    pub bytes_per_tx: usize,
}

impl Protocol {
    pub const NORMAL: Protocol = Protocol::new(0, "Normal", 40, 9);
    pub const FAST: Protocol = Protocol::new(1, "Fast", 40, 6);
    pub const FASTEST: Protocol = Protocol::new(2, "Fastest", 40, 3);
    pub const ULTRASOUND_NORMAL: Protocol = Protocol::new(3, "U-Normal", 320, 9);
    pub const ULTRASOUND_FAST: Protocol = Protocol::new(4, "U-Fast", 320, 6);
    pub const ULTRASOUND_FASTEST: Protocol = Protocol::new(5, "U-Fastest", 320, 3);

    pub const ALL: [Protocol; 6] = [
        Self::NORMAL,
        Self::FAST,
        Self::FASTEST,
        Self::ULTRASOUND_NORMAL,
        Self::ULTRASOUND_FAST,
        Self::ULTRASOUND_FASTEST,
    ];

    const fn new(id: u8, name: &'static str, freq_start: usize, frames_per_tx: usize) -> Self {
        Self {
            id,
            name,
            freq_start,
            frames_per_tx,
            bytes_per_tx: 3,
        }
    }

    pub fn from_id(id: u8) -> Option<Protocol> {
        Self::ALL.into_iter().find(|p| p.id == id)
    }

    pub fn from_name(name: &str) -> Option<Protocol> {
        Self::ALL
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Number of nibble tones sounding in one data frame.
    pub fn n_tones(&self) -> usize {
        2 * self.bytes_per_tx
    }

    /// Frequency in Hz of tone `bin` counted from `freq_start`.
    pub fn tone_freq(&self, bin: usize) -> f64 {
        HZ_PER_SAMPLE * (self.freq_start + bin) as f64
    }

    /// Data frames needed for `total_bytes` of encoded data.
    pub fn data_frames(&self, total_bytes: usize) -> usize {
        total_bytes.div_ceil(self.bytes_per_tx) * self.frames_per_tx
    }

    /// Total frames of a transmission carrying a `payload_len` byte payload.
    pub fn total_frames(&self, payload_len: usize) -> usize {
        let total_bytes =
            ENCODED_DATA_OFFSET + payload_len + ecc_bytes_for_length(payload_len);
        2 * N_MARKER_FRAMES + self.data_frames(total_bytes)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let found = match s.parse::<u8>() {
            Ok(id) => Protocol::from_id(id),
            Err(_) => Protocol::from_name(s),
        };
        found.ok_or_else(|| {
            let known: Vec<String> = Protocol::ALL
                .iter()
                .map(|p| format!("{} ({})", p.name, p.id))
                .collect();
            format!("unknown protocol '{}', expected one of: {}", s, known.join(", "))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecc_bytes_match_length_rule() {
        assert_eq!(ecc_bytes_for_length(1), 2);
        assert_eq!(ecc_bytes_for_length(3), 2);
        assert_eq!(ecc_bytes_for_length(4), 4);
        assert_eq!(ecc_bytes_for_length(12), 4);
        assert_eq!(ecc_bytes_for_length(15), 6);
        assert_eq!(ecc_bytes_for_length(140), 56);
    }

    #[test]
    fn protocol_ids_are_table_indices() {
        for (i, p) in Protocol::ALL.iter().enumerate() {
            assert_eq!(p.id as usize, i);
            assert_eq!(Protocol::from_id(p.id), Some(*p));
        }
        assert_eq!(Protocol::from_id(6), None);
    }

    #[test]
    fn parse_by_id_or_name() {
        assert_eq!("0".parse::<Protocol>(), Ok(Protocol::NORMAL));
        assert_eq!("u-fastest".parse::<Protocol>(), Ok(Protocol::ULTRASOUND_FASTEST));
        assert_eq!(" Fast ".parse::<Protocol>(), Ok(Protocol::FAST));
        assert!("robust".parse::<Protocol>().is_err());
        assert!("9".parse::<Protocol>().is_err());
    }

    #[test]
    fn tones_stay_below_nyquist() {
        for p in Protocol::ALL {
            let top = p.tone_freq(p.n_tones() * BINS_PER_NIBBLE);
            assert!(top < SAMPLE_RATE as f64 / 2.0, "{} tops out at {} Hz", p, top);
        }
    }

    #[test]
    fn total_frames_for_short_message() {
        // 12 bytes + 4 ecc + 3 length bytes = 19 bytes = 7 chunks
        assert_eq!(Protocol::NORMAL.total_frames(12), 32 + 7 * 9);
        assert_eq!(Protocol::FAST.total_frames(12), 32 + 7 * 6);
        assert_eq!(Protocol::ULTRASOUND_FASTEST.total_frames(12), 32 + 7 * 3);
    }
}
