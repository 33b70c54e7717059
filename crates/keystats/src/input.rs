//! Key events read as CSV rows: `key_code,display_name,modifiers`.
//!
//! The name and modifier columns are optional. Blank rows and `#` comments
//! are skipped, as is a leading `key_code,...` header row.

use crate::{
    error::{KeyStatsError, Result},
    modifiers::NO_MODIFIERS,
    recorder::KeyEvent,
};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Read;

const HEADER_MARKER: &str = "key_code";

/// Streams events from `reader`, one per non-blank row.
pub fn read_events<R: Read>(reader: R) -> impl Iterator<Item = Result<KeyEvent>> {
    ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(reader)
        .into_records()
        .enumerate()
        .filter_map(|(i, result)| match result {
            Ok(rec) => parse_record(&rec, i + 1).transpose(),
            Err(e) => Some(Err(e.into())),
        })
}

fn parse_record(rec: &StringRecord, row: usize) -> Result<Option<KeyEvent>> {
    if rec.iter().all(|f| f.is_empty()) {
        return Ok(None);
    }

    let key_code = rec.get(0).unwrap_or_default();
    if row == 1 && key_code.eq_ignore_ascii_case(HEADER_MARKER) {
        return Ok(None);
    }
    if key_code.is_empty() {
        return Err(KeyStatsError::InvalidEvent {
            row,
            reason: "missing key code".to_string(),
        });
    }

    let key_name = match rec.get(1) {
        Some(name) if !name.is_empty() => name,
        _ => key_code,
    };
    let modifiers = match rec.get(2) {
        Some(mods) if !mods.is_empty() => mods,
        _ => NO_MODIFIERS,
    };

    Ok(Some(KeyEvent::new(key_code, key_name, modifiers)))
}
