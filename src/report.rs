//! Console report: per-protocol waveform info, summary table, statistics.

use crate::trial::SweepReport;

const RULE_WIDTH: usize = 80;

pub fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// One line per protocol describing its clean waveform.
pub fn render_protocol_info(report: &SweepReport) -> String {
    report
        .protocols
        .iter()
        .map(|sweep| {
            let info = &sweep.info;
            format!(
                "{} (ID={}): RMS={:.4}, range=[{:.3}, {:.3}], {} samples ({} bytes)\n",
                info.protocol.name,
                info.protocol.id,
                info.rms,
                info.min,
                info.max,
                info.samples,
                info.byte_len
            )
        })
        .collect()
}

/// Status table: one row per SNR level, one column per protocol.
pub fn render_summary(report: &SweepReport) -> String {
    let header: String = std::iter::once(format!("{:>10}", "SNR (dB)"))
        .chain(
            report
                .protocols
                .iter()
                .map(|sweep| format!(" | {:>10}", sweep.info.protocol.name)),
        )
        .collect();

    let mut out = format!("{}\n{}\n", header, "-".repeat(header.chars().count()));
    for &snr in &report.snr_levels {
        out.push_str(&format!("{:>10} ", snr));
        for sweep in &report.protocols {
            let cell = match sweep.status(snr) {
                Some(status) => status.to_string(),
                None => "?".to_string(),
            };
            out.push_str(&format!("| {:>10}", cell));
        }
        out.push('\n');
    }
    out
}

/// Success count, rate and lowest working SNR per protocol.
pub fn render_statistics(report: &SweepReport) -> String {
    report
        .protocols
        .iter()
        .map(|sweep| {
            let min_snr = match sweep.min_working_snr() {
                Some(snr) => snr.to_string(),
                None => "N/A".to_string(),
            };
            format!(
                "{:10} | success: {}/{} ({:5.1}%) | min working SNR: {} dB\n",
                sweep.info.protocol.name,
                sweep.success_count(),
                sweep.trials.len(),
                sweep.success_rate(),
                min_snr
            )
        })
        .collect()
}

fn section(title: &str) -> String {
    format!("{rule}\n{title}\n{rule}\n", rule = rule())
}

/// Full report as printed by the CLI.
pub fn render(report: &SweepReport) -> String {
    let mut out = section("NOISE RESISTANCE TEST");
    out.push_str(&format!("Message: '{}'\n", report.message));
    out.push_str("Format: float32 PCM, range [-1.0, 1.0]\n\n");
    out.push_str(&render_protocol_info(report));
    out.push('\n');
    out.push_str(&section("SUMMARY"));
    out.push_str(&render_summary(report));
    out.push('\n');
    out.push_str(&section("STATISTICS"));
    out.push_str(&render_statistics(report));
    out
}
