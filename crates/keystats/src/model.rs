use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, collections::BTreeMap, fmt};

/// Format version written into new documents.
pub const FORMAT_VERSION: &str = "1.0";

/// Joins key-codes into a sequence map key, e.g. `65_66`.
pub const SEQUENCE_KEY_SEPARATOR: &str = "_";
/// Joins display names into a sequence label, e.g. `A->B`.
pub const SEQUENCE_DISPLAY_SEPARATOR: &str = "->";

fn default_version() -> String {
    FORMAT_VERSION.to_string()
}

/// Root of the persisted statistics file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsDocument {
    #[serde(rename = "total_statistics")]
    pub totals: TotalStatistics,
    #[serde(rename = "key_statistics")]
    pub keys: BTreeMap<String, KeyEntry>,
    #[serde(rename = "key_sequences")]
    pub sequences: SequenceTables,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalStatistics {
    pub total_keystrokes: u64,
    #[serde(default)]
    pub first_record_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_record_date: Option<NaiveDate>,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for TotalStatistics {
    fn default() -> Self {
        Self {
            total_keystrokes: 0,
            first_record_date: None,
            last_record_date: None,
            version: default_version(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub key_name: String,
    pub count: u64,
    #[serde(default)]
    pub modifier_combinations: BTreeMap<String, ModifierEntry>,
}

impl KeyEntry {
    fn new(key_name: &str) -> Self {
        Self {
            key_name: key_name.to_string(),
            count: 0,
            modifier_combinations: BTreeMap::new(),
        }
    }

    /// Predecessor counts summed over every modifier combination of this key.
    pub fn predecessors(&self) -> BTreeMap<&str, u64> {
        let mut merged: BTreeMap<&str, u64> = BTreeMap::new();
        for combo in self.modifier_combinations.values() {
            for (code, &count) in &combo.preceded_by {
                *merged.entry(code.as_str()).or_insert(0) += count;
            }
        }
        merged
    }

    /// How often `key_code` was pressed right before this key, over all combinations.
    pub fn preceded_by_count(&self, key_code: &str) -> u64 {
        self.modifier_combinations
            .values()
            .filter_map(|combo| combo.preceded_by.get(key_code))
            .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierEntry {
    pub count: u64,
    #[serde(default)]
    pub preceded_by: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub sequence: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceTables {
    #[serde(default)]
    pub bigrams: BTreeMap<String, SequenceEntry>,
    #[serde(default)]
    pub trigrams: BTreeMap<String, SequenceEntry>,
}

impl SequenceTables {
    pub fn table(&self, kind: SequenceKind) -> &BTreeMap<String, SequenceEntry> {
        match kind {
            SequenceKind::Bigram => &self.bigrams,
            SequenceKind::Trigram => &self.trigrams,
        }
    }

    fn table_mut(&mut self, kind: SequenceKind) -> &mut BTreeMap<String, SequenceEntry> {
        match kind {
            SequenceKind::Bigram => &mut self.bigrams,
            SequenceKind::Trigram => &mut self.trigrams,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceKind {
    Bigram,
    Trigram,
}

impl SequenceKind {
    /// Number of key-codes in one sequence of this kind.
    pub const fn len(self) -> usize {
        match self {
            Self::Bigram => 2,
            Self::Trigram => 3,
        }
    }

    /// Name of the table under `key_sequences`.
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Bigram => "bigrams",
            Self::Trigram => "trigrams",
        }
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}


impl StatisticsDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.total_keystrokes == 0 && self.keys.is_empty()
    }

    /// Applies one key press. `modifiers` must already be canonical.
    pub fn apply_keystroke(
        &mut self,
        date: NaiveDate,
        key_code: &str,
        display_name: &str,
        modifiers: &str,
        preceding: Option<&str>,
    ) {
        let entry = self
            .keys
            .entry(key_code.to_string())
            .or_insert_with(|| KeyEntry::new(display_name));
        entry.count += 1;

        let combo = entry
            .modifier_combinations
            .entry(modifiers.to_string())
            .or_default();
        combo.count += 1;

        if let Some(previous) = preceding {
            *combo.preceded_by.entry(previous.to_string()).or_insert(0) += 1;
        }

        let totals = &mut self.totals;
        totals.total_keystrokes += 1;
        if totals.first_record_date.is_none() {
            totals.first_record_date = Some(date);
        }
        totals.last_record_date = Some(date);
    }

    /// Applies one n-gram occurrence.
    pub fn apply_sequence<S: AsRef<str>>(&mut self, codes: &[S], kind: SequenceKind) {
        let key = codes
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(SEQUENCE_KEY_SEPARATOR);

        if !self.sequences.table(kind).contains_key(&key) {
            let display = codes
                .iter()
                .map(|code| self.key_name(code.as_ref()).into_owned())
                .collect::<Vec<_>>()
                .join(SEQUENCE_DISPLAY_SEPARATOR);
            self.sequences.table_mut(kind).insert(
                key.clone(),
                SequenceEntry {
                    sequence: display,
                    count: 0,
                },
            );
        }

        if let Some(entry) = self.sequences.table_mut(kind).get_mut(&key) {
            entry.count += 1;
        }
    }

    /// Display name for a key-code, or `Key_<code>` for codes never recorded.
    pub fn key_name<'a>(&'a self, key_code: &str) -> Cow<'a, str> {
        match self.keys.get(key_code) {
            Some(entry) => Cow::Borrowed(entry.key_name.as_str()),
            None => Cow::Owned(format!("Key_{key_code}")),
        }
    }

    /// Sum of all per-key counts.
    pub fn key_count_sum(&self) -> u64 {
        self.keys.values().map(|entry| entry.count).sum()
    }

    /// True when `total_keystrokes` equals the sum of the per-key counts.
    pub fn is_consistent(&self) -> bool {
        self.totals.total_keystrokes == self.key_count_sum()
    }

    /// Exact-combination totals over all keys.
    pub fn combination_counts(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for entry in self.keys.values() {
            for (combo, stats) in &entry.modifier_combinations {
                *counts.entry(combo.clone()).or_insert(0) += stats.count;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_empty_document_shape() {
        let doc = StatisticsDocument::new();
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["total_statistics"]["total_keystrokes"], 0);
        assert!(json["total_statistics"]["first_record_date"].is_null());
        assert_eq!(json["total_statistics"]["version"], FORMAT_VERSION);
        assert!(json["key_statistics"].as_object().unwrap().is_empty());
        assert!(json["key_sequences"]["bigrams"].as_object().unwrap().is_empty());
        assert!(json["key_sequences"]["trigrams"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_apply_keystroke_creates_entries() {
        let mut doc = StatisticsDocument::new();
        doc.apply_keystroke(day(1), "65", "A", "none", None);
        doc.apply_keystroke(day(1), "65", "A", "shift", Some("66"));

        let entry = &doc.keys["65"];
        assert_eq!(entry.key_name, "A");
        assert_eq!(entry.count, 2);
        assert_eq!(entry.modifier_combinations["none"].count, 1);
        assert_eq!(entry.modifier_combinations["shift"].preceded_by["66"], 1);
        assert_eq!(doc.totals.total_keystrokes, 2);
        assert!(doc.is_consistent());
    }

    #[test]
    fn test_display_name_fixed_on_first_sight() {
        let mut doc = StatisticsDocument::new();
        doc.apply_keystroke(day(1), "65", "A", "none", None);
        doc.apply_keystroke(day(1), "65", "a", "none", None);
        assert_eq!(doc.keys["65"].key_name, "A");
    }

    #[test]
    fn test_record_dates() {
        let mut doc = StatisticsDocument::new();
        doc.apply_keystroke(day(1), "65", "A", "none", None);
        doc.apply_keystroke(day(5), "65", "A", "none", None);
        doc.apply_keystroke(day(3), "65", "A", "none", None);

        assert_eq!(doc.totals.first_record_date, Some(day(1)));
        assert_eq!(doc.totals.last_record_date, Some(day(3)));
    }

    #[test]
    fn test_apply_sequence_display() {
        let mut doc = StatisticsDocument::new();
        doc.apply_keystroke(day(1), "65", "A", "none", None);
        doc.apply_keystroke(day(1), "66", "B", "none", Some("65"));

        doc.apply_sequence(&["65", "66"], SequenceKind::Bigram);
        doc.apply_sequence(&["65", "66"], SequenceKind::Bigram);
        doc.apply_sequence(&["65", "66", "99"], SequenceKind::Trigram);

        let bigram = &doc.sequences.bigrams["65_66"];
        assert_eq!(bigram.sequence, "A->B");
        assert_eq!(bigram.count, 2);
        assert_eq!(doc.sequences.trigrams["65_66_99"].sequence, "A->B->Key_99");
    }

    #[test]
    fn test_predecessors_merge_combinations() {
        let mut doc = StatisticsDocument::new();
        doc.apply_keystroke(day(1), "65", "A", "none", Some("66"));
        doc.apply_keystroke(day(1), "65", "A", "shift", Some("66"));
        doc.apply_keystroke(day(1), "65", "A", "shift", Some("67"));

        let preds = doc.keys["65"].predecessors();
        assert_eq!(preds["66"], 2);
        assert_eq!(preds["67"], 1);
        assert_eq!(doc.keys["65"].preceded_by_count("66"), 2);
    }

    #[test]
    fn test_sequence_kind_names() {
        assert_eq!(SequenceKind::Bigram.to_string(), "bigrams");
        assert_eq!(SequenceKind::Trigram.table_name(), "trigrams");
        assert_eq!(SequenceKind::Trigram.len(), 3);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let json = r#"{
            "total_statistics": {"total_keystrokes": 1},
            "key_statistics": {"65": {"key_name": "A", "count": 1}},
            "key_sequences": {}
        }"#;
        let doc: StatisticsDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.totals.version, FORMAT_VERSION);
        assert!(doc.keys["65"].modifier_combinations.is_empty());
        assert!(doc.sequences.bigrams.is_empty());
    }

    #[test]
    fn test_required_sections_rejected_when_missing() {
        let json = r#"{"total_statistics": {"total_keystrokes": 1}, "key_statistics": {}}"#;
        assert!(serde_json::from_str::<StatisticsDocument>(json).is_err());

        let negative = r#"{
            "total_statistics": {"total_keystrokes": -4},
            "key_statistics": {},
            "key_sequences": {}
        }"#;
        assert!(serde_json::from_str::<StatisticsDocument>(negative).is_err());
    }
}
