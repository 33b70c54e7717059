use anyhow::Result;
use keystats::{Config, SequenceKind};
use keystats_analyzer::{Analyzer, ReportFormat, export, write_report};
use log::info;
use std::{env, fs, path::PathBuf};

const ENV_REPORT_DIR: &str = "KEYSTATS_REPORT_DIR";
const ENV_REPORT_FORMAT: &str = "KEYSTATS_REPORT_FORMAT";

fn main() -> Result<()> {
    // Initialize logger - defaults to RUST_LOG if set, otherwise INFO
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let config = Config::from_env()?;
    let format = match non_blank_env(ENV_REPORT_FORMAT) {
        Some(name) => name.parse()?,
        None => ReportFormat::Json,
    };
    info!("Analyzing {}", config.storage.data_file.display());

    let analyzer = Analyzer::open(&config.storage);
    let report = analyzer.report();

    let basic = &report.basic;
    info!("Total keystrokes: {}", basic.total_keystrokes);
    info!("Unique keys: {}", basic.unique_keys);
    info!("Recording period: {}", basic.recording_period);
    info!("Average per day: {:.1}", basic.average_per_day);

    info!("Top {} keys:", report.top_keys.len());
    for key in &report.top_keys {
        info!(
            "{}. {}: {} ({:.1}%)",
            key.rank, key.key_name, key.count, key.percentage
        );
    }

    for m in &report.modifier_usage.modifiers {
        info!("Modifier {}: {} ({:.1}%)", m.modifier, m.count, m.ratio);
    }

    for kind in [SequenceKind::Bigram, SequenceKind::Trigram] {
        let ranking = analyzer.sequence_rankings(kind, 5);
        for entry in &ranking.entries {
            info!("{kind} {}. {}: {}", entry.rank, entry.sequence, entry.count);
        }
    }

    for recommendation in &report.recommendations {
        info!("Recommendation: {recommendation}");
    }

    if let Some(dir) = non_blank_env(ENV_REPORT_DIR).map(PathBuf::from) {
        fs::create_dir_all(&dir)?;
        let path = export::timestamped_path(&dir, format);
        write_report(&report, &path, format)?;
        info!("Report written to: {}", path.display());
    }

    Ok(())
}

fn non_blank_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
