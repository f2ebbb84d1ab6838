//! PCM → WAV output (hound)

use std::path::Path;

/// Convert a float sample in [-1.0, 1.0] to 16-bit PCM, truncating toward zero.
pub fn to_pcm16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Write mono f32 samples as a 16-bit PCM WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(to_pcm16(s))?;
    }
    writer.finalize()?;
    tracing::trace!(path = %path.display(), samples = samples.len(), "wrote wav");
    Ok(())
}
