//! Decoder: f32 audio samples → payload (streaming, multi-protocol).

use super::Error;
use super::encoder::marker_bins;
use super::fft::PowerSpectrum;
use super::protocol::*;
use super::reed_solomon::ReedSolomon;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Listening,
    Receiving,
    Analyzing,
}

/// Streaming decoder listening for a set of protocols.
///
/// Samples are consumed in whole frames; a trailing partial frame is kept
/// until the next call to [`Decoder::decode`]. State carries over between
/// calls, so a transmission may be split across several buffers.
pub struct Decoder {
    protocols: Vec<Protocol>,
    spectrum: PowerSpectrum,

    amplitude_history: Vec<Vec<f32>>,
    history_id: usize,

    state: DecoderState,

    amplitude_recorded: Vec<f32>,
    frames_to_record: usize,
    frames_left_to_record: usize,
    recv_duration_frames: usize,

    marker_freq_start: usize,

    sample_buffer: Vec<f32>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Decoder listening for every protocol preset.
    pub fn new() -> Self {
        Self::with_protocols(&Protocol::ALL)
    }

    pub fn with_protocols(protocols: &[Protocol]) -> Self {
        Self {
            protocols: protocols.to_vec(),
            spectrum: PowerSpectrum::new(),
            amplitude_history: vec![vec![0.0f32; SAMPLES_PER_FRAME]; MAX_SPECTRUM_HISTORY],
            history_id: 0,
            state: DecoderState::Listening,
            amplitude_recorded: Vec::new(),
            frames_to_record: 0,
            frames_left_to_record: 0,
            recv_duration_frames: 0,
            marker_freq_start: 0,
            sample_buffer: Vec::new(),
        }
    }

    /// Drop all buffered audio and return to listening.
    pub fn reset(&mut self) {
        let protocols = std::mem::take(&mut self.protocols);
        *self = Self::with_protocols(&protocols);
    }

    /// Feed audio samples.
    ///
    /// Returns `Ok(Some(payload))` once a transmission is decoded, `Ok(None)`
    /// when more audio is needed, or `Err(Error::DecodeFailed)` when a
    /// recorded transmission could not be decoded. After a result is returned
    /// the remaining samples stay buffered.
    pub fn decode(&mut self, samples: &[f32]) -> Result<Option<Vec<u8>>, Error> {
        self.sample_buffer.extend_from_slice(samples);

        let mut consumed = 0;
        let mut result = Ok(None);
        while self.sample_buffer.len() - consumed >= SAMPLES_PER_FRAME {
            let frame = self.sample_buffer[consumed..consumed + SAMPLES_PER_FRAME].to_vec();
            consumed += SAMPLES_PER_FRAME;

            match self.process_frame(&frame) {
                Ok(None) => {}
                other => {
                    result = other;
                    break;
                }
            }
        }
        self.sample_buffer.drain(..consumed);

        result
    }

    fn process_frame(&mut self, amplitude: &[f32]) -> Result<Option<Vec<u8>>, Error> {
        self.amplitude_history[self.history_id].copy_from_slice(amplitude);
        self.history_id = (self.history_id + 1) % MAX_SPECTRUM_HISTORY;

        let spectrum = if self.history_id == 0 || self.state == DecoderState::Receiving {
            Some(self.averaged_spectrum())
        } else {
            None
        };

        if self.state == DecoderState::Receiving && self.frames_left_to_record > 0 {
            let offset = (self.frames_to_record - self.frames_left_to_record) * SAMPLES_PER_FRAME;
            if offset + SAMPLES_PER_FRAME <= self.amplitude_recorded.len() {
                self.amplitude_recorded[offset..offset + SAMPLES_PER_FRAME]
                    .copy_from_slice(amplitude);
            }
            self.frames_left_to_record -= 1;
            if self.frames_left_to_record == 0 {
                self.state = DecoderState::Analyzing;
            }
        }

        if self.state == DecoderState::Analyzing {
            let result = self.analyze();
            self.state = DecoderState::Listening;
            self.frames_to_record = 0;
            return result;
        }

        if let Some(spectrum) = spectrum {
            match self.state {
                DecoderState::Listening => self.detect_start_marker(&spectrum),
                DecoderState::Receiving => self.detect_end_marker(&spectrum),
                DecoderState::Analyzing => {}
            }
        }

        Ok(None)
    }

    fn averaged_spectrum(&mut self) -> Vec<f32> {
        let mut avg = vec![0.0f32; SAMPLES_PER_FRAME];
        for hist in &self.amplitude_history {
            for (a, &v) in avg.iter_mut().zip(hist) {
                *a += v;
            }
        }
        let norm = 1.0 / MAX_SPECTRUM_HISTORY as f32;
        for v in avg.iter_mut() {
            *v *= norm;
        }

        let mut spectrum = vec![0.0f32; SAMPLES_PER_FRAME];
        self.spectrum.compute(&avg, &mut spectrum);
        spectrum
    }

    /// Distinct tone bands of the configured protocols, lowest first.
    fn bands(&self) -> Vec<usize> {
        let mut starts: Vec<usize> = self.protocols.iter().map(|p| p.freq_start).collect();
        starts.sort_unstable();
        starts.dedup();
        starts
    }

    fn detect_start_marker(&mut self, spectrum: &[f32]) {
        if let Some(freq_start) = self
            .bands()
            .into_iter()
            .find(|&freq_start| marker_present(spectrum, freq_start, true))
        {
            tracing::debug!(freq_start, "start marker detected");
            self.marker_freq_start = freq_start;
            self.start_receiving();
        }
    }

    fn detect_end_marker(&mut self, spectrum: &[f32]) {
        if !marker_present(spectrum, self.marker_freq_start, false) || self.frames_to_record <= 1 {
            return;
        }
        self.recv_duration_frames -= self.frames_left_to_record.saturating_sub(1);
        self.frames_left_to_record = 1;
        tracing::debug!(
            recv_duration_frames = self.recv_duration_frames,
            "end marker detected"
        );
    }

    fn start_receiving(&mut self) {
        self.state = DecoderState::Receiving;

        let max_frames_per_tx = self
            .protocols
            .iter()
            .map(|p| p.frames_per_tx)
            .max()
            .unwrap_or(1);
        let min_bytes_per_tx = self
            .protocols
            .iter()
            .map(|p| p.bytes_per_tx)
            .min()
            .unwrap_or(1);
        let max_total_bytes = MAX_LENGTH_VARIABLE + ecc_bytes_for_length(MAX_LENGTH_VARIABLE);
        let max_data_frames = max_frames_per_tx * (max_total_bytes / min_bytes_per_tx + 1);
        self.recv_duration_frames = 2 * N_MARKER_FRAMES + max_data_frames;

        self.frames_to_record = self.recv_duration_frames;
        self.frames_left_to_record = self.recv_duration_frames;
        self.amplitude_recorded = vec![0.0f32; self.recv_duration_frames * SAMPLES_PER_FRAME];
    }

    fn analyze(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let in_band: Vec<Protocol> = self
            .protocols
            .iter()
            .copied()
            .filter(|p| p.freq_start == self.marker_freq_start)
            .collect();

        let mut best: Option<(Protocol, Candidate)> = None;
        for protocol in in_band {
            let Some(candidate) = self.analyze_protocol(protocol) else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, b)| candidate.beats(b)) {
                best = Some((protocol, candidate));
            }
        }

        match best {
            Some((protocol, candidate)) => {
                tracing::debug!(
                    protocol = protocol.name,
                    len = candidate.payload.len(),
                    clean = candidate.clean,
                    score = candidate.score,
                    "decoded"
                );
                Ok(Some(candidate.payload))
            }
            None => {
                tracing::debug!(
                    recv_duration_frames = self.recv_duration_frames,
                    "no protocol matched the recording"
                );
                Err(Error::DecodeFailed)
            }
        }
    }

    /// Search every sub-frame offset within the start marker for a
    /// consistent transmission of `protocol` and keep the best aligned one.
    fn analyze_protocol(&mut self, protocol: Protocol) -> Option<Candidate> {
        let step = SAMPLES_PER_FRAME / STEPS_PER_FRAME;
        let rs_length = ReedSolomon::new(1, ENCODED_DATA_OFFSET - 1);
        let mut spectrum = vec![0.0f32; SAMPLES_PER_FRAME];
        let mut fft_buf = vec![0.0f32; SAMPLES_PER_FRAME];
        let mut best: Option<Candidate> = None;

        for offset_start in (0..N_MARKER_FRAMES * STEPS_PER_FRAME).rev() {
            let mut data_encoded = vec![0u8; MAX_DATA_SIZE];
            let mut shares = Vec::new();
            let mut decoded_length = None;

            for itx in 0.. {
                let offset_tx = offset_start + itx * protocol.frames_per_tx * STEPS_PER_FRAME;
                if offset_tx >= self.recv_duration_frames * STEPS_PER_FRAME {
                    break;
                }
                if (itx + 1) * protocol.bytes_per_tx >= MAX_DATA_SIZE {
                    break;
                }

                let sample_start = offset_tx * step;
                if sample_start + SAMPLES_PER_FRAME > self.amplitude_recorded.len() {
                    break;
                }

                fft_buf.copy_from_slice(
                    &self.amplitude_recorded[sample_start..sample_start + SAMPLES_PER_FRAME],
                );
                for k in 1..protocol.frames_per_tx {
                    let koffset = (offset_tx + k * STEPS_PER_FRAME) * step;
                    if koffset + SAMPLES_PER_FRAME > self.amplitude_recorded.len() {
                        break;
                    }
                    for (b, &v) in fft_buf
                        .iter_mut()
                        .zip(&self.amplitude_recorded[koffset..koffset + SAMPLES_PER_FRAME])
                    {
                        *b += v;
                    }
                }
                self.spectrum.compute(&fft_buf, &mut spectrum);

                let mut share = 0.0f32;
                for i in 0..protocol.n_tones() {
                    let bin = protocol.freq_start + BINS_PER_NIBBLE * i;
                    let bins = &spectrum[bin..bin + BINS_PER_NIBBLE];
                    share += peak_share(bins);
                    let nibble = strongest_bin(bins) as u8;
                    let byte = &mut data_encoded[itx * protocol.bytes_per_tx + i / 2];
                    if i % 2 == 0 {
                        *byte = (*byte & 0xf0) | nibble;
                    } else {
                        *byte = (*byte & 0x0f) | (nibble << 4);
                    }
                }
                shares.push(share / protocol.n_tones() as f32);

                if decoded_length.is_none() && itx * protocol.bytes_per_tx > ENCODED_DATA_OFFSET {
                    // abandon this offset on an implausible length
                    let Some(len) = rs_length
                        .decode(&data_encoded[..ENCODED_DATA_OFFSET])
                        .map(|decoded| decoded[0] as usize)
                        .filter(|&len| len > 0 && len <= MAX_LENGTH_VARIABLE)
                    else {
                        break;
                    };
                    let expected = protocol.total_frames(len);
                    if self.recv_duration_frames > expected
                        || self.recv_duration_frames + 2 * N_MARKER_FRAMES < expected
                    {
                        break;
                    }
                    decoded_length = Some(len);
                }

                if let Some(len) = decoded_length {
                    let n_total_bytes = ENCODED_DATA_OFFSET + len + ecc_bytes_for_length(len);
                    if itx * protocol.bytes_per_tx > n_total_bytes + 1 {
                        break;
                    }
                }
            }

            let Some(len) = decoded_length else {
                continue;
            };
            let n_ecc = ecc_bytes_for_length(len);
            let rs_data = ReedSolomon::new(len, n_ecc);
            let data_end = ENCODED_DATA_OFFSET + len + n_ecc;
            let received = &data_encoded[ENCODED_DATA_OFFSET..data_end];
            let Some(payload) = rs_data.decode(received) else {
                continue;
            };

            let clean = rs_length.encode(&[len as u8]) == data_encoded[..ENCODED_DATA_OFFSET]
                && rs_data.encode(&payload) == received;
            let n_tx = data_end.div_ceil(protocol.bytes_per_tx).min(shares.len());
            let score = shares[..n_tx].iter().sum::<f32>() / n_tx.max(1) as f32;
            let candidate = Candidate {
                payload,
                clean,
                score,
            };
            if best.as_ref().is_none_or(|b| candidate.beats(b)) {
                best = Some(candidate);
            }
        }

        best
    }
}

/// A payload recovered at one sub-frame offset.
#[derive(Debug)]
struct Candidate {
    payload: Vec<u8>,
    /// Length and payload codewords needed no correction.
    clean: bool,
    /// Mean share of each nibble band's energy held by its strongest bin.
    score: f32,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        (self.clean, self.score) > (other.clean, other.score)
    }
}

/// Whether the start (or end) marker pattern of the band at `freq_start`
/// dominates `spectrum`.
fn marker_present(spectrum: &[f32], freq_start: usize, start: bool) -> bool {
    marker_bins(start).enumerate().all(|(i, bin)| {
        let lower = freq_start + 2 * i;
        let (p0, p1) = (spectrum[lower], spectrum[lower + FREQ_DELTA_BIN]);
        if bin == 2 * i {
            p0 > SOUND_MARKER_THRESHOLD * p1
        } else {
            p0 < SOUND_MARKER_THRESHOLD * p1
        }
    })
}

/// Fraction of the energy in `bins` held by the strongest one.
fn peak_share(bins: &[f32]) -> f32 {
    let total: f32 = bins.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    bins.iter().copied().fold(0.0f32, f32::max) / total
}

fn strongest_bin(bins: &[f32]) -> usize {
    let mut kmax = 0;
    let mut amax = 0.0f32;
    for (k, &a) in bins.iter().enumerate() {
        if a > amax {
            kmax = k;
            amax = a;
        }
    }
    kmax
}
