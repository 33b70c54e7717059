use crate::{
    error::{AnalyzerError, Result},
    report::{KeyRank, Report, SequenceRanking},
};
use chrono::Local;
use std::{
    fmt::Write as _,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Text,
}

impl ReportFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "txt",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "txt" => Ok(Self::Text),
            other => Err(AnalyzerError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// `report_<timestamp>.<ext>` inside `dir`.
pub fn timestamped_path(dir: &Path, format: ReportFormat) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("report_{timestamp}.{}", format.extension()))
}

pub fn write_report(report: &Report, path: &Path, format: ReportFormat) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, report)?;
            writer.write_all(b"\n")?;
        }
        ReportFormat::Text => writer.write_all(render_text(report).as_bytes())?,
    }
    writer.flush()?;
    Ok(())
}

/// Plain-text rendering of a report.
pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    let basic = &report.basic;

    let _ = writeln!(out, "Keyboard usage report ({})", report.generated_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out);
    let _ = writeln!(out, "Total keystrokes: {}", basic.total_keystrokes);
    let _ = writeln!(out, "Unique keys: {}", basic.unique_keys);
    let _ = writeln!(out, "Recording period: {}", basic.recording_period);
    let _ = writeln!(out, "Average per day: {:.1}", basic.average_per_day);

    write_keys(&mut out, "Top keys", &report.top_keys);
    write_keys(&mut out, "Top keys without modifiers", &report.top_keys_without_modifiers);

    let _ = writeln!(out);
    let _ = writeln!(out, "Modifier usage:");
    for m in &report.modifier_usage.modifiers {
        let _ = writeln!(out, "  {:<6} {:>8} ({:.1}%)", m.modifier, m.count, m.ratio);
    }

    if !report.modifier_usage.shortcuts.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Shortcuts:");
        for s in report.modifier_usage.shortcuts.iter().take(10) {
            let _ = writeln!(out, "  {:<20} {:>8}", s.combination, s.count);
        }
    }

    write_sequences(&mut out, &report.bigrams);
    write_sequences(&mut out, &report.trigrams);

    let patterns = &report.typing_patterns;
    let _ = writeln!(out);
    let _ = writeln!(out, "Typing patterns:");
    for (label, share) in [
        ("letters", patterns.letters),
        ("numbers", patterns.numbers),
        ("special", patterns.special),
    ] {
        let _ = writeln!(out, "  {label:<10} {:>8} ({:.1}%)", share.count, share.percentage);
    }
    if let Some(letters) = &patterns.letter_distribution {
        let _ = writeln!(
            out,
            "  vowels {:.1}%, consonants {:.1}%",
            letters.vowels.percentage, letters.consonants.percentage
        );
    }

    let efficiency = &report.efficiency;
    let _ = writeln!(out);
    let _ = writeln!(out, "Efficiency:");
    let _ = writeln!(
        out,
        "  Home row: {} ({:.1}%), {}",
        efficiency.home_row.count, efficiency.home_row.percentage, efficiency.home_row.rating
    );
    let balance = &efficiency.hand_balance;
    let _ = writeln!(
        out,
        "  Hands: left {:.1}%, right {:.1}% (balance {:.0})",
        balance.left.percentage, balance.right.percentage, balance.balance_score
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "Recommendations:");
    for recommendation in &report.recommendations {
        let _ = writeln!(out, "  - {recommendation}");
    }

    if !report.transitions.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Key transitions:");
        for t in &report.transitions {
            let before: Vec<&str> = t.predecessors.iter().map(|n| n.key_name.as_str()).collect();
            let after: Vec<&str> = t.successors.iter().map(|n| n.key_name.as_str()).collect();
            let _ = writeln!(
                out,
                "  {}. {} ({}): after [{}], before [{}]",
                t.rank,
                t.key_name,
                t.count,
                before.join(", "),
                after.join(", ")
            );
        }
    }

    out
}

fn write_keys(out: &mut String, title: &str, keys: &[KeyRank]) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{title}:");
    if keys.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for k in keys {
        let _ = writeln!(out, "  {:>2}. {:<12} {:>8} ({:.1}%)", k.rank, k.key_name, k.count, k.percentage);
    }
}

fn write_sequences(out: &mut String, ranking: &SequenceRanking) {
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Top {} ({} total, {} unique):",
        ranking.kind, ranking.total, ranking.unique
    );
    for e in &ranking.entries {
        let _ = writeln!(out, "  {:>2}. {:<20} {:>8} ({:.1}%)", e.rank, e.sequence, e.count, e.percentage);
    }
}
