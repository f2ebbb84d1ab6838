//! Encode → add noise → decode → compare, over every protocol and SNR level.

use std::fmt;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use rand::Rng;

use crate::codec::{self, Decoder, Protocol};
use crate::config::Config;
use crate::noise::{add_noise_snr, calculate_signal_power};
use crate::wav::write_wav;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to encode message with protocol {protocol}")]
    Encode {
        protocol: Protocol,
        #[source]
        source: codec::Error,
    },
    #[error("failed to create output directory {}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}", path.display())]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
}

/// Binary pass/fail as reported in the summary and in file names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    Fail,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pad() so width specifiers in the report apply
        f.pad(match self {
            Status::Ok => "OK",
            Status::Fail => "FAIL",
        })
    }
}

/// What happened when decoding one noisy waveform.
#[derive(Debug)]
pub enum TrialOutcome {
    /// The original message came back.
    Decoded,
    /// The decoder found no transmission.
    NoSignal,
    /// A transmission decoded to different text.
    Mismatch { decoded: String },
    /// A transmission decoded to bytes that are not UTF-8.
    InvalidUtf8,
    /// The decoder saw a transmission but could not recover it.
    DecoderError(codec::Error),
}

impl TrialOutcome {
    /// Compare a decoder result against the expected message.
    pub fn classify(result: Result<Option<Vec<u8>>, codec::Error>, message: &str) -> Self {
        match result {
            Err(error) => TrialOutcome::DecoderError(error),
            Ok(None) => TrialOutcome::NoSignal,
            Ok(Some(bytes)) if bytes.is_empty() => TrialOutcome::NoSignal,
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(text) if text == message => TrialOutcome::Decoded,
                Ok(text) => TrialOutcome::Mismatch { decoded: text },
                Err(_) => TrialOutcome::InvalidUtf8,
            },
        }
    }

    pub fn status(&self) -> Status {
        match self {
            TrialOutcome::Decoded => Status::Ok,
            _ => Status::Fail,
        }
    }
}

/// Properties of a protocol's clean waveform.
#[derive(Clone, Debug)]
pub struct ProtocolInfo {
    pub protocol: Protocol,
    pub rms: f32,
    pub min: f32,
    pub max: f32,
    /// Size of the waveform as f32 bytes.
    pub byte_len: usize,
    pub samples: usize,
}

impl ProtocolInfo {
    pub fn measure(protocol: Protocol, waveform: &[f32]) -> Self {
        let (min, max) = waveform
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| {
                (lo.min(s), hi.max(s))
            });
        Self {
            protocol,
            rms: calculate_signal_power(waveform),
            min,
            max,
            byte_len: std::mem::size_of_val(waveform),
            samples: waveform.len(),
        }
    }
}

/// One trial at a given SNR.
#[derive(Debug)]
pub struct TrialResult {
    pub snr_db: i32,
    pub outcome: TrialOutcome,
    pub wav_path: Option<PathBuf>,
}

/// Every trial of one protocol, in SNR-list order.
#[derive(Debug)]
pub struct ProtocolSweep {
    pub info: ProtocolInfo,
    pub trials: Vec<TrialResult>,
}

impl ProtocolSweep {
    pub fn status(&self, snr_db: i32) -> Option<Status> {
        self.trials
            .iter()
            .find(|t| t.snr_db == snr_db)
            .map(|t| t.outcome.status())
    }

    pub fn success_count(&self) -> usize {
        self.trials
            .iter()
            .filter(|t| t.outcome.status() == Status::Ok)
            .count()
    }

    /// Percentage of trials that decoded, 0 for an empty sweep.
    pub fn success_rate(&self) -> f64 {
        if self.trials.is_empty() {
            return 0.0;
        }
        self.success_count() as f64 / self.trials.len() as f64 * 100.0
    }

    /// Lowest SNR at which the message still decoded.
    pub fn min_working_snr(&self) -> Option<i32> {
        self.trials
            .iter()
            .filter(|t| t.outcome.status() == Status::Ok)
            .map(|t| t.snr_db)
            .min()
    }
}

#[derive(Debug)]
pub struct SweepReport {
    pub message: String,
    pub snr_levels: Vec<i32>,
    pub protocols: Vec<ProtocolSweep>,
}

/// `{status}_{protocol}-SNR[{snr}].wav`
pub fn trial_file_name(status: Status, protocol: Protocol, snr_db: i32) -> String {
    format!("{}_{}-SNR[{}].wav", status, protocol.name, snr_db)
}

/// Run every (protocol, SNR) trial of `config`.
///
/// One decoder is created per protocol and reused across its SNR levels
/// without a reset, so state left behind by a failed decode can leak into
/// the next level.
pub fn run_sweep<R: Rng + ?Sized>(
    config: &Config,
    rng: &mut R,
    progress: &ProgressBar,
) -> Result<SweepReport, Error> {
    if config.write_wav {
        std::fs::create_dir_all(&config.output_dir).map_err(|source| Error::OutputDir {
            path: config.output_dir.clone(),
            source,
        })?;
    }

    let mut protocols = Vec::with_capacity(config.protocols.len());
    for &protocol in &config.protocols {
        let waveform = codec::encode(config.message.as_bytes(), protocol, config.volume)
            .map_err(|source| Error::Encode { protocol, source })?;
        let info = ProtocolInfo::measure(protocol, &waveform);
        tracing::info!(
            protocol = protocol.name,
            rms = info.rms,
            samples = info.samples,
            "encoded"
        );

        let mut decoder = Decoder::new();
        let mut trials = Vec::with_capacity(config.snr_levels.len());
        for &snr_db in &config.snr_levels {
            progress.set_message(format!("{} @ {} dB", protocol.name, snr_db));
            let trial = run_trial(config, protocol, &waveform, snr_db, &mut decoder, rng)?;
            tracing::debug!(
                protocol = protocol.name,
                snr_db,
                outcome = ?trial.outcome,
                "trial finished"
            );
            trials.push(trial);
            progress.inc(1);
        }
        drop(decoder);

        protocols.push(ProtocolSweep { info, trials });
    }

    Ok(SweepReport {
        message: config.message.clone(),
        snr_levels: config.snr_levels.clone(),
        protocols,
    })
}

fn run_trial<R: Rng + ?Sized>(
    config: &Config,
    protocol: Protocol,
    waveform: &[f32],
    snr_db: i32,
    decoder: &mut Decoder,
    rng: &mut R,
) -> Result<TrialResult, Error> {
    let noisy = add_noise_snr(waveform, snr_db as f64, rng);
    let outcome = TrialOutcome::classify(decoder.decode(&noisy), &config.message);

    let wav_path = if config.write_wav {
        let path = config
            .output_dir
            .join(trial_file_name(outcome.status(), protocol, snr_db));
        save(&path, &noisy, config.sample_rate)?;
        Some(path)
    } else {
        None
    };

    Ok(TrialResult {
        snr_db,
        outcome,
        wav_path,
    })
}

fn save(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), Error> {
    write_wav(path, samples, sample_rate).map_err(|source| Error::Wav {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn config(protocols: &[Protocol], snr_levels: &[i32]) -> Config {
        Config {
            protocols: protocols.to_vec(),
            snr_levels: snr_levels.to_vec(),
            write_wav: false,
            ..Config::default()
        }
    }

    fn sweep(config: &Config, seed: u64) -> SweepReport {
        run_sweep(config, &mut StdRng::seed_from_u64(seed), &ProgressBar::hidden()).unwrap()
    }

    #[test]
    fn classify_collapses_failures() {
        let ok = TrialOutcome::classify(Ok(Some(b"hello python".to_vec())), "hello python");
        assert!(matches!(ok, TrialOutcome::Decoded));
        assert_eq!(ok.status(), Status::Ok);

        let cases = [
            TrialOutcome::classify(Ok(None), "hello python"),
            TrialOutcome::classify(Ok(Some(Vec::new())), "hello python"),
            TrialOutcome::classify(Ok(Some(b"hello pythom".to_vec())), "hello python"),
            TrialOutcome::classify(Ok(Some(vec![0xff, 0xfe])), "hello python"),
            TrialOutcome::classify(Err(codec::Error::DecodeFailed), "hello python"),
        ];
        assert!(matches!(cases[0], TrialOutcome::NoSignal));
        assert!(matches!(cases[1], TrialOutcome::NoSignal));
        assert!(matches!(&cases[2], TrialOutcome::Mismatch { decoded } if decoded == "hello pythom"));
        assert!(matches!(cases[3], TrialOutcome::InvalidUtf8));
        assert!(matches!(cases[4], TrialOutcome::DecoderError(codec::Error::DecodeFailed)));
        assert!(cases.iter().all(|c| c.status() == Status::Fail));
    }

    #[test]
    fn file_names_follow_status_protocol_snr() {
        assert_eq!(
            trial_file_name(Status::Ok, Protocol::NORMAL, 40),
            "OK_Normal-SNR[40].wav"
        );
        assert_eq!(
            trial_file_name(Status::Fail, Protocol::ULTRASOUND_FAST, -15),
            "FAIL_U-Fast-SNR[-15].wav"
        );
    }

    #[test]
    fn status_respects_width() {
        assert_eq!(format!("{:>6}", Status::Ok), "    OK");
        assert_eq!(format!("{:<6}|", Status::Fail), "FAIL  |");
    }

    #[test]
    fn high_snr_decodes_for_every_protocol() {
        let report = sweep(&config(&Protocol::ALL, &[40]), 11);
        assert_eq!(report.protocols.len(), 6);
        for p in &report.protocols {
            assert_eq!(
                p.status(40),
                Some(Status::Ok),
                "{}: {:?}",
                p.info.protocol,
                p.trials[0].outcome
            );
        }
    }

    #[test]
    fn normal_protocol_ok_at_40_fails_at_minus_20() {
        let report = sweep(&config(&[Protocol::NORMAL], &[40, -20]), 2024);
        let normal = &report.protocols[0];
        assert_eq!(normal.status(40), Some(Status::Ok));
        assert_eq!(normal.status(-20), Some(Status::Fail));
        assert_eq!(normal.success_count(), 1);
        assert_eq!(normal.min_working_snr(), Some(40));
        assert!((normal.success_rate() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn fastest_protocol_fails_at_minus_20() {
        let report = sweep(&config(&[Protocol::FASTEST], &[-20]), 5);
        assert_eq!(report.protocols[0].status(-20), Some(Status::Fail));
        assert_eq!(report.protocols[0].min_working_snr(), None);
    }

    #[test]
    fn protocol_info_describes_clean_waveform() {
        let report = sweep(&config(&[Protocol::FAST], &[30]), 1);
        let info = &report.protocols[0].info;
        assert_eq!(info.samples, Protocol::FAST.total_frames(12) * 1024);
        assert_eq!(info.byte_len, info.samples * 4);
        assert!(info.rms > 0.0 && info.rms < 0.2);
        assert!(info.min >= -0.2 && info.max <= 0.2);
    }

    #[test]
    fn oversized_message_is_an_error() {
        let config = Config {
            message: "x".repeat(141),
            ..config(&[Protocol::NORMAL], &[40])
        };
        let result = run_sweep(&config, &mut StdRng::seed_from_u64(0), &ProgressBar::hidden());
        assert!(matches!(
            result,
            Err(Error::Encode {
                protocol: Protocol::NORMAL,
                source: codec::Error::PayloadTooLarge { .. }
            })
        ));
    }

    #[test]
    fn writes_one_wav_per_trial() {
        let dir = std::env::temp_dir().join(format!("noise-sweep-{}", std::process::id()));
        let config = Config {
            output_dir: dir.clone(),
            write_wav: true,
            ..config(&[Protocol::FASTEST], &[40, -20])
        };
        let report = sweep(&config, 8);

        let trials = &report.protocols[0].trials;
        assert_eq!(trials.len(), 2);
        assert_eq!(
            trials[0].wav_path.as_deref(),
            Some(dir.join("OK_Fastest-SNR[40].wav").as_path())
        );
        for trial in trials {
            let path = trial.wav_path.as_ref().unwrap();
            let reader = hound::WavReader::open(path).unwrap();
            assert_eq!(reader.spec().sample_rate, 48000);
            assert_eq!(reader.len() as usize, report.protocols[0].info.samples);
        }

        std::fs::remove_dir_all(&dir).ok();
    }
}
