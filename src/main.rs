mod codec;
mod config;
mod noise;
mod report;
mod trial;
mod wav;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

use codec::Protocol;
use config::Config;
use trial::run_sweep;

#[derive(Parser, Debug)]
#[command(name = "ggwave-noise-test")]
#[command(about = "Measure data-over-sound decoding across protocols and noise levels")]
struct Args {
    /// Message transmitted in every trial
    #[arg(long, default_value = "hello python")]
    message: String,

    /// Protocols to test, by id or name (e.g. 0,Fast,U-Fastest). Defaults to all six
    #[arg(long, value_delimiter = ',')]
    protocols: Vec<Protocol>,

    /// SNR levels in dB (e.g. 40,20,0,-20). Defaults to 40 down to -20
    #[arg(long = "snr", value_delimiter = ',', allow_hyphen_values = true)]
    snr_levels: Vec<i32>,

    /// Encoder volume (0-100)
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: u8,

    /// Seed for the noise generator. Unseeded runs differ from run to run
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for the per-trial WAV files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Skip writing WAV files
    #[arg(long)]
    no_wav: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!(?args);

    if args.message.is_empty() {
        bail!("message must not be empty");
    }

    let mut config = Config {
        message: args.message,
        volume: args.volume,
        output_dir: args.output_dir,
        write_wav: !args.no_wav,
        seed: args.seed,
        ..Config::default()
    };
    if !args.protocols.is_empty() {
        config.protocols = args.protocols;
    }
    if !args.snr_levels.is_empty() {
        config.snr_levels = args.snr_levels;
    }
    config.dedup();

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let total_trials = (config.protocols.len() * config.snr_levels.len()) as u64;
    let pb = ProgressBar::new(total_trials);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} trials {msg}")?
            .progress_chars("=>-"),
    );

    let result = run_sweep(&config, &mut rng, &pb);
    pb.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(error) => {
            tracing::error!(?error);
            return Err(error.into());
        }
    };

    print!("{}", report::render(&report));
    if config.write_wav {
        println!();
        println!("WAV files written to {:?}", config.output_dir);
    }
    Ok(())
}
