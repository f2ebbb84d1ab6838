//! Encoder: payload → f32 audio samples.

use std::f64::consts::PI;

use super::Error;
use super::protocol::*;
use super::reed_solomon::ReedSolomon;

/// Fraction of a tone's duration spent fading in and out.
const FADE_FRACTION: f32 = 0.05;

/// Encode `payload` with `protocol` at `volume` (0..=100).
pub fn encode(payload: &[u8], protocol: Protocol, volume: u8) -> Result<Vec<f32>, Error> {
    let data_length = payload.len();
    if data_length == 0 {
        return Err(Error::EmptyPayload);
    }
    if data_length > MAX_LENGTH_VARIABLE {
        return Err(Error::PayloadTooLarge {
            size: data_length,
            max: MAX_LENGTH_VARIABLE,
        });
    }
    if volume > 100 {
        return Err(Error::InvalidVolume(volume));
    }

    let data_encoded = frame_payload(payload);
    let total_data_frames = protocol.data_frames(data_encoded.len());
    let total_frames = N_MARKER_FRAMES + total_data_frames + N_MARKER_FRAMES;
    tracing::trace!(
        protocol = protocol.name,
        bytes = data_encoded.len(),
        total_frames,
        "encoding"
    );

    let tones = tone_table(protocol);
    let scalar = volume as f32 / 100.0;
    let mut output = vec![0.0f32; total_frames * SAMPLES_PER_FRAME];

    for (frame_id, frame_out) in output.chunks_exact_mut(SAMPLES_PER_FRAME).enumerate() {
        let mut n_freq = 0usize;

        if frame_id < N_MARKER_FRAMES {
            for bin in marker_bins(true) {
                add_amplitude_smooth(&tones[bin], frame_out, scalar, frame_id, N_MARKER_FRAMES);
                n_freq += 1;
            }
        } else if frame_id < N_MARKER_FRAMES + total_data_frames {
            let data_frame = frame_id - N_MARKER_FRAMES;
            let cycle_mod = data_frame % protocol.frames_per_tx;
            let data_offset = (data_frame / protocol.frames_per_tx) * protocol.bytes_per_tx;

            for j in 0..protocol.bytes_per_tx {
                let Some(&byte) = data_encoded.get(data_offset + j) else {
                    break;
                };
                let lo = (2 * j) * BINS_PER_NIBBLE + (byte & 0x0f) as usize;
                let hi = (2 * j + 1) * BINS_PER_NIBBLE + (byte >> 4) as usize;
                for bin in [lo, hi] {
                    add_amplitude_smooth(
                        &tones[bin],
                        frame_out,
                        scalar,
                        cycle_mod,
                        protocol.frames_per_tx,
                    );
                    n_freq += 1;
                }
            }
        } else {
            let f_id = frame_id - (N_MARKER_FRAMES + total_data_frames);
            for bin in marker_bins(false) {
                add_amplitude_smooth(&tones[bin], frame_out, scalar, f_id, N_MARKER_FRAMES);
                n_freq += 1;
            }
        }

        let scale = 1.0 / n_freq.max(1) as f32;
        for s in frame_out.iter_mut() {
            *s *= scale;
        }
    }

    Ok(output)
}

/// `[len, ecc, ecc, payload..., ecc...]`
fn frame_payload(payload: &[u8]) -> Vec<u8> {
    let data_length = payload.len();
    let n_ecc = ecc_bytes_for_length(data_length);

    let rs_length = ReedSolomon::new(1, ENCODED_DATA_OFFSET - 1);
    let rs_data = ReedSolomon::new(data_length, n_ecc);

    let mut data_encoded = Vec::with_capacity(ENCODED_DATA_OFFSET + data_length + n_ecc);
    data_encoded.extend_from_slice(&rs_length.encode(&[data_length as u8]));
    data_encoded.extend_from_slice(&rs_data.encode(payload));
    data_encoded
}

/// Marker tone bins relative to `freq_start`. Even marker bits sound the
/// lower tone of their pair on the start marker and the upper one on the end
/// marker; odd bits the opposite.
pub(crate) fn marker_bins(start: bool) -> impl Iterator<Item = usize> {
    (0..N_BITS_IN_MARKER).map(move |i| {
        let upper = (i % 2 == 1) == start;
        2 * i + if upper { FREQ_DELTA_BIN } else { 0 }
    })
}

/// One frame of each tone, bin-centred so consecutive frames join without
/// phase jumps.
fn tone_table(protocol: Protocol) -> Vec<Vec<f32>> {
    let n_bins = (protocol.n_tones() * BINS_PER_NIBBLE).max(2 * N_BITS_IN_MARKER);
    let n = SAMPLES_PER_FRAME as f64;

    (0..n_bins)
        .map(|bin| {
            let cycles = protocol.tone_freq(bin) * IHZ_PER_SAMPLE;
            let phase_offset = PI * bin as f64 / n_bins as f64;
            (0..SAMPLES_PER_FRAME)
                .map(|i| ((2.0 * PI) * (i as f64 / n) * cycles + phase_offset).sin() as f32)
                .collect()
        })
        .collect()
}

/// Add `src` into `dst` under a linear fade in/out envelope spanning
/// `n_per_cycle` frames, of which this is frame `cycle_mod`.
fn add_amplitude_smooth(
    src: &[f32],
    dst: &mut [f32],
    scalar: f32,
    cycle_mod: usize,
    n_per_cycle: usize,
) {
    let frame_len = src.len();
    let n_total = (n_per_cycle * frame_len) as f32;
    let ids = 1.0 / (FADE_FRACTION * n_total);
    let n_begin = (FADE_FRACTION * n_total) as usize;
    let n_end = ((1.0 - FADE_FRACTION) * n_total) as usize;

    for (i, (d, &s)) in dst.iter_mut().zip(src).enumerate() {
        let k = cycle_mod * frame_len + i;
        let envelope = if k < n_begin {
            k as f32 * ids
        } else if k > n_end {
            (n_total - k as f32) * ids
        } else {
            1.0
        };
        *d += scalar * s * envelope;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(encode(b"", Protocol::NORMAL, 20), Err(Error::EmptyPayload)));
        assert!(matches!(
            encode(&[0u8; 141], Protocol::NORMAL, 20),
            Err(Error::PayloadTooLarge { size: 141, max: 140 })
        ));
        assert!(matches!(
            encode(b"hi", Protocol::NORMAL, 101),
            Err(Error::InvalidVolume(101))
        ));
        assert!(encode(&[7u8; 140], Protocol::FASTEST, 100).is_ok());
    }

    #[test]
    fn output_length_matches_frame_count() {
        for protocol in Protocol::ALL {
            let audio = encode(b"hello python", protocol, 20).unwrap();
            assert_eq!(
                audio.len(),
                protocol.total_frames(12) * SAMPLES_PER_FRAME,
                "{}",
                protocol
            );
        }
    }

    #[test]
    fn samples_stay_within_volume() {
        let audio = encode(b"hello python", Protocol::FAST, 20).unwrap();
        let peak = audio.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.0);
        assert!(peak <= 0.2 + 1e-6, "peak {}", peak);
    }

    #[test]
    fn volume_zero_is_silent() {
        let audio = encode(b"hi", Protocol::NORMAL, 0).unwrap();
        assert!(audio.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn framed_payload_layout() {
        let framed = frame_payload(b"abcd");
        assert_eq!(framed.len(), 3 + 4 + 4);
        assert_eq!(framed[0], 4);
        assert_eq!(&framed[3..7], b"abcd");
    }

    #[test]
    fn start_and_end_markers_are_inverted() {
        let start: Vec<usize> = marker_bins(true).collect();
        let end: Vec<usize> = marker_bins(false).collect();
        assert_eq!(&start[..4], &[0, 3, 4, 7]);
        assert_eq!(&end[..4], &[1, 2, 5, 6]);
    }
}
