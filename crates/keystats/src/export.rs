use crate::{
    error::{KeyStatsError, Result},
    model::StatisticsDocument,
};
use chrono::Local;
use csv::WriterBuilder;
use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = KeyStatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(KeyStatsError::InvalidConfiguration(format!(
                "unsupported export format: {other}"
            ))),
        }
    }
}

/// Writes `doc` to `path` in the given format.
pub fn export_document(doc: &StatisticsDocument, path: &Path, format: ExportFormat) -> Result<()> {
    let file = File::create(path).map_err(|e| KeyStatsError::CreateFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);

    match format {
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, doc)?;
            writer.write_all(b"\n")?;
        }
        ExportFormat::Csv => write_csv(doc, &mut writer)?,
    }

    writer.flush().map_err(|e| KeyStatsError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Exports `doc` to `keystats_<timestamp>.<ext>` in `output_dir`
/// (or the working directory).
pub fn export_with_path(
    doc: &StatisticsDocument,
    output_dir: Option<&Path>,
    format: ExportFormat,
) -> Result<PathBuf> {
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let filename = format!("keystats_{timestamp}.{}", format.extension());

    let file_path = if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir).map_err(|e| KeyStatsError::CreateDir {
            path: dir.to_path_buf(),
            source: e,
        })?;
        dir.join(&filename)
    } else {
        filename.into()
    };

    export_document(doc, &file_path, format)?;
    Ok(file_path)
}

fn write_csv<W: Write>(doc: &StatisticsDocument, writer: W) -> Result<()> {
    #[allow(unused_mut)]
    let mut builder = WriterBuilder::new();
    #[cfg(windows)]
    {
        use csv::Terminator;
        builder = builder.terminator(Terminator::CRLF);
    }

    let mut wtr = builder.from_writer(writer);

    wtr.write_record(["Key_Code", "Key_Name", "Count"])?;
    let mut rows: Vec<(&str, &str, u64)> = doc
        .keys
        .iter()
        .map(|(code, entry)| (code.as_str(), entry.key_name.as_str(), entry.count))
        .collect();
    rows.sort_unstable_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(b.0)));

    for (code, name, count) in rows {
        let count_s = count.to_string();
        wtr.write_record([code, name, count_s.as_str()])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_document() -> StatisticsDocument {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut doc = StatisticsDocument::new();
        for _ in 0..5 {
            doc.apply_keystroke(date, "65", "A", "none", None);
        }
        for _ in 0..3 {
            doc.apply_keystroke(date, "66", "B", "shift", None);
        }
        for _ in 0..10 {
            doc.apply_keystroke(date, "32", "Space", "none", None);
        }
        doc
    }

    #[test]
    fn test_export_to_csv_basic() {
        let temp_dir = TempDir::new().unwrap();
        let result = export_with_path(&sample_document(), Some(temp_dir.path()), ExportFormat::Csv);
        assert!(result.is_ok());

        let path = result.unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("keystats_"));
        assert!(name.ends_with(".csv"));
        assert!(path.exists());
    }

    #[test]
    fn test_export_empty_document() {
        let temp_dir = TempDir::new().unwrap();
        let path =
            export_with_path(&StatisticsDocument::new(), Some(temp_dir.path()), ExportFormat::Csv)
                .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().collect::<Vec<_>>(), vec!["Key_Code,Key_Name,Count"]);
    }

    #[test]
    fn test_csv_content_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stats.csv");
        export_document(&sample_document(), &path, ExportFormat::Csv).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec!["Key_Code,Key_Name,Count", "32,Space,10", "65,A,5", "66,B,3"]
        );
    }

    #[test]
    fn test_json_export_matches_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stats.json");
        let doc = sample_document();
        export_document(&doc, &path, ExportFormat::Json).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: StatisticsDocument = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_export_json_with_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = export_with_path(&sample_document(), Some(temp_dir.path()), ExportFormat::Json)
            .unwrap();
        assert_eq!(path.extension().unwrap(), "json");

        let parsed: StatisticsDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.totals.total_keystrokes, 18);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(" json ".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_invalid_output_directory() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();

        let result = export_with_path(
            &StatisticsDocument::new(),
            Some(&blocker.join("nested")),
            ExportFormat::Csv,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to create directory"));
    }
}
