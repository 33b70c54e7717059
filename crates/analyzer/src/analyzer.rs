//! Derived statistics over a document snapshot.

use crate::report::{
    BasicStatistics, CombinationUsage, Efficiency, HandBalance, HomeRowRating, HomeRowUsage,
    KeyRank, KeyTransitions, LetterDistribution, ModifierCount, ModifierKeyRank, ModifierUsage,
    Neighbor, Recommendation, Report, SequenceRank, SequenceRanking, Share, Shortcut,
    TypingPatterns,
};
use chrono::Local;
use keystats::{
    SequenceKind, StatisticsDocument, Store,
    config::StorageConfig,
    modifiers::{self, BASE_MODIFIERS, NO_MODIFIERS},
    store,
};
use log::debug;
use std::{collections::BTreeMap, ops::RangeInclusive};

pub const NO_DATA: &str = "no data";
const PERIOD_DATE_FORMAT: &str = "%Y/%m/%d";

const MODIFIER_RANKING_LIMIT: usize = 5;
const REPORT_TOP_KEYS: usize = 10;
const REPORT_NO_MODIFIER_KEYS: usize = 5;
const REPORT_SEQUENCES: usize = 10;
const REPORT_TRANSITION_KEYS: usize = 5;
const REPORT_NEIGHBORS: usize = 3;

// Display order for shortcut labels
const SHORTCUT_ORDER: [&str; 4] = ["ctrl", "shift", "alt", "super"];

// Virtual-key codes
const LETTER_KEYS: RangeInclusive<u32> = 65..=90;
const DIGIT_KEYS: RangeInclusive<u32> = 48..=57;
const VOWEL_KEYS: [u32; 5] = [65, 69, 73, 79, 85];
const HOME_ROW_KEYS: [u32; 7] = [65, 83, 68, 70, 74, 75, 76];
const LEFT_HAND_KEYS: [u32; 13] = [81, 87, 69, 82, 84, 65, 83, 68, 70, 90, 88, 67, 86];
const RIGHT_HAND_KEYS: [u32; 11] = [89, 85, 73, 79, 80, 72, 74, 75, 76, 78, 77];

const HOME_ROW_TARGET: f64 = 30.0;
const BALANCE_TARGET: f64 = 70.0;
const CTRL_HEAVY: f64 = 15.0;
const VARIED_BIGRAMS: usize = 100;

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn share(count: u64, total: u64) -> Share {
    Share {
        count,
        percentage: percentage(count, total),
    }
}

/// 100 for an even split, falling linearly to 0 when one side has everything.
fn balance_score(left: u64, right: u64) -> f64 {
    let total = left + right;
    if total == 0 {
        return 0.0;
    }
    let deviation = (left as f64 / total as f64 - 0.5).abs() * 2.0;
    ((1.0 - deviation) * 100.0).max(0.0)
}

/// Sorts by count descending. The sort is stable, so ties keep key-code order.
fn sort_by_count<T>(items: &mut [T], count: impl Fn(&T) -> u64) {
    items.sort_by(|a, b| count(b).cmp(&count(a)));
}

pub struct Analyzer {
    doc: StatisticsDocument,
}

impl Analyzer {
    pub fn new(doc: StatisticsDocument) -> Self {
        Self { doc }
    }

    pub fn from_store(store: &Store) -> Self {
        Self::new(store.snapshot())
    }

    /// Reads the statistics at `storage` without writing to disk. A corrupt
    /// data file is read from the newest usable backup instead.
    pub fn open(storage: &StorageConfig) -> Self {
        let (doc, outcome) = store::read_snapshot(storage);
        debug!("Opened {} ({outcome:?})", storage.data_file.display());
        Self::new(doc)
    }

    pub fn document(&self) -> &StatisticsDocument {
        &self.doc
    }

    pub fn basic_statistics(&self) -> BasicStatistics {
        let totals = &self.doc.totals;
        let (recording_days, recording_period) =
            match (totals.first_record_date, totals.last_record_date) {
                (Some(first), Some(last)) => {
                    let span = (last - first).num_days();
                    let days = if span < 0 { 0 } else { span as u64 + 1 };
                    let period = format!(
                        "{} ~ {}",
                        first.format(PERIOD_DATE_FORMAT),
                        last.format(PERIOD_DATE_FORMAT)
                    );
                    (days, period)
                }
                _ => (0, NO_DATA.to_string()),
            };

        let average_per_day = if recording_days == 0 {
            0.0
        } else {
            totals.total_keystrokes as f64 / recording_days as f64
        };

        BasicStatistics {
            total_keystrokes: totals.total_keystrokes,
            unique_keys: self.doc.keys.len(),
            first_record_date: totals.first_record_date,
            last_record_date: totals.last_record_date,
            recording_days,
            recording_period,
            average_per_day,
            version: totals.version.clone(),
        }
    }

    /// Keys by total count. Percentages are of all keystrokes.
    pub fn top_keys(&self, limit: usize) -> Vec<KeyRank> {
        let counts = self
            .doc
            .keys
            .iter()
            .map(|(code, entry)| (code.as_str(), entry.count));
        self.rank_keys(counts, limit)
    }

    /// Keys by presses without any modifier. Percentages are of those presses.
    pub fn top_keys_without_modifiers(&self, limit: usize) -> Vec<KeyRank> {
        let counts = self.doc.keys.iter().filter_map(|(code, entry)| {
            entry
                .modifier_combinations
                .get(NO_MODIFIERS)
                .filter(|combo| combo.count > 0)
                .map(|combo| (code.as_str(), combo.count))
        });
        self.rank_keys(counts, limit)
    }

    fn rank_keys<'a>(
        &self,
        counts: impl Iterator<Item = (&'a str, u64)>,
        limit: usize,
    ) -> Vec<KeyRank> {
        let mut rows: Vec<(&str, u64)> = counts.collect();
        let total: u64 = rows.iter().map(|(_, count)| count).sum();
        sort_by_count(&mut rows, |row| row.1);

        rows.into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (code, count))| KeyRank {
                rank: i + 1,
                key_code: code.to_string(),
                key_name: self.doc.key_name(code).into_owned(),
                count,
                percentage: percentage(count, total),
            })
            .collect()
    }

    /// Usage of `none` and each base modifier.
    ///
    /// A compound combination adds its count to every base modifier it
    /// contains: `ctrl+shift` counts once for `ctrl` and once for `shift`.
    pub fn modifier_usage(&self) -> ModifierUsage {
        let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
        let mut per_key: BTreeMap<&str, Vec<(&str, u64)>> = BTreeMap::new();

        for (code, entry) in &self.doc.keys {
            let mut key_counts: BTreeMap<&str, u64> = BTreeMap::new();
            for (combination, stats) in &entry.modifier_combinations {
                if modifiers::is_none(combination) {
                    *totals.entry(NO_MODIFIERS).or_insert(0) += stats.count;
                    continue;
                }
                for part in modifiers::components(combination) {
                    if let Some(base) = BASE_MODIFIERS.iter().copied().find(|&m| m == part) {
                        *totals.entry(base).or_insert(0) += stats.count;
                        *key_counts.entry(base).or_insert(0) += stats.count;
                    }
                }
            }
            for (base, count) in key_counts {
                per_key.entry(base).or_default().push((code.as_str(), count));
            }
        }

        let total: u64 = totals.values().sum();
        let counts: Vec<ModifierCount> = std::iter::once(NO_MODIFIERS)
            .chain(BASE_MODIFIERS)
            .map(|modifier| {
                let count = totals.get(modifier).copied().unwrap_or(0);
                let ratio = match (total, modifier) {
                    (0, NO_MODIFIERS) => 100.0,
                    _ => percentage(count, total),
                };
                ModifierCount {
                    modifier: modifier.to_string(),
                    count,
                    ratio,
                }
            })
            .collect();

        let key_rankings = BASE_MODIFIERS
            .iter()
            .map(|&base| {
                let mut rows = per_key.remove(base).unwrap_or_default();
                sort_by_count(&mut rows, |row| row.1);
                let ranked: Vec<ModifierKeyRank> = rows
                    .into_iter()
                    .take(MODIFIER_RANKING_LIMIT)
                    .enumerate()
                    .map(|(i, (code, count))| ModifierKeyRank {
                        rank: i + 1,
                        key_code: code.to_string(),
                        key_name: self.doc.key_name(code).into_owned(),
                        count,
                    })
                    .collect();
                (base.to_string(), ranked)
            })
            .collect();

        ModifierUsage {
            total,
            modifiers: counts,
            key_rankings,
            shortcuts: self.shortcuts(),
        }
    }

    /// Every modifier combination used on a non-modifier key.
    fn shortcuts(&self) -> Vec<Shortcut> {
        let mut shortcuts = Vec::new();
        for (code, entry) in &self.doc.keys {
            for (combination, stats) in &entry.modifier_combinations {
                if modifiers::is_none(combination)
                    || stats.count == 0
                    || is_modifier_key(&entry.key_name, combination)
                {
                    continue;
                }
                shortcuts.push(Shortcut {
                    combination: shortcut_label(combination, &entry.key_name),
                    modifiers: combination.clone(),
                    key_code: code.clone(),
                    key_name: entry.key_name.clone(),
                    count: stats.count,
                });
            }
        }
        sort_by_count(&mut shortcuts, |s| s.count);
        shortcuts
    }

    /// Exact combinations, without decomposition.
    pub fn combination_usage(&self) -> Vec<CombinationUsage> {
        let counts = self.doc.combination_counts();
        let total: u64 = counts.values().sum();
        let mut rows: Vec<CombinationUsage> = counts
            .into_iter()
            .map(|(combination, count)| CombinationUsage {
                combination,
                count,
                percentage: percentage(count, total),
            })
            .collect();
        sort_by_count(&mut rows, |row| row.count);
        rows
    }

    pub fn sequence_rankings(&self, kind: SequenceKind, limit: usize) -> SequenceRanking {
        let table = self.doc.sequences.table(kind);
        let total: u64 = table.values().map(|entry| entry.count).sum();

        let mut rows: Vec<_> = table.iter().collect();
        sort_by_count(&mut rows, |(_, entry)| entry.count);

        let entries = rows
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (key, entry))| SequenceRank {
                rank: i + 1,
                key: key.clone(),
                sequence: entry.sequence.clone(),
                count: entry.count,
                percentage: percentage(entry.count, total),
            })
            .collect();

        SequenceRanking {
            kind,
            total,
            unique: table.len(),
            entries,
        }
    }

    /// Keys pressed right before `key_code`, over all of its modifier combinations.
    pub fn predecessors(&self, key_code: &str, limit: usize) -> Vec<Neighbor> {
        let Some(entry) = self.doc.keys.get(key_code) else {
            return Vec::new();
        };
        let rows: Vec<(&str, u64)> = entry.predecessors().into_iter().collect();
        self.neighbors(rows, limit)
    }

    /// Keys pressed right after `key_code`.
    ///
    /// Only predecessor counts are stored, so this scans every key's
    /// `preceded_by` maps: O(keys × combinations) per call.
    pub fn successors(&self, key_code: &str, limit: usize) -> Vec<Neighbor> {
        let rows: Vec<(&str, u64)> = self
            .doc
            .keys
            .iter()
            .map(|(code, entry)| (code.as_str(), entry.preceded_by_count(key_code)))
            .filter(|&(_, count)| count > 0)
            .collect();
        self.neighbors(rows, limit)
    }

    fn neighbors(&self, mut rows: Vec<(&str, u64)>, limit: usize) -> Vec<Neighbor> {
        sort_by_count(&mut rows, |row| row.1);
        rows.into_iter()
            .take(limit)
            .map(|(code, count)| Neighbor {
                key_code: code.to_string(),
                key_name: self.doc.key_name(code).into_owned(),
                count,
            })
            .collect()
    }

    /// The most used keys, each with its most frequent neighbors.
    pub fn transitions(&self, key_limit: usize, neighbor_limit: usize) -> Vec<KeyTransitions> {
        self.top_keys(key_limit)
            .into_iter()
            .map(|key| KeyTransitions {
                predecessors: self.predecessors(&key.key_code, neighbor_limit),
                successors: self.successors(&key.key_code, neighbor_limit),
                rank: key.rank,
                key_code: key.key_code,
                key_name: key.key_name,
                count: key.count,
            })
            .collect()
    }

    /// Summed counts of the keys whose numeric code is in `codes`.
    fn count_codes(&self, codes: impl IntoIterator<Item = u32>) -> u64 {
        codes
            .into_iter()
            .filter_map(|code| self.doc.keys.get(&code.to_string()))
            .map(|entry| entry.count)
            .sum()
    }

    pub fn typing_patterns(&self) -> TypingPatterns {
        let (mut letters, mut numbers, mut special) = (0, 0, 0);
        for (code, entry) in &self.doc.keys {
            match code.parse::<u32>() {
                Ok(vk) if LETTER_KEYS.contains(&vk) => letters += entry.count,
                Ok(vk) if DIGIT_KEYS.contains(&vk) => numbers += entry.count,
                _ => special += entry.count,
            }
        }
        let total = letters + numbers + special;

        let letter_distribution = (letters > 0).then(|| {
            let vowels = self.count_codes(VOWEL_KEYS);
            let consonants =
                self.count_codes(LETTER_KEYS.filter(|vk| !VOWEL_KEYS.contains(vk)));
            let typed = vowels + consonants;
            LetterDistribution {
                vowels: share(vowels, typed),
                consonants: share(consonants, typed),
            }
        });

        TypingPatterns {
            letters: share(letters, total),
            numbers: share(numbers, total),
            special: share(special, total),
            letter_distribution,
        }
    }

    pub fn efficiency(&self) -> Efficiency {
        let home_row = self.count_codes(HOME_ROW_KEYS);
        let home_row_percentage = percentage(home_row, self.doc.totals.total_keystrokes);

        let left = self.count_codes(LEFT_HAND_KEYS);
        let right = self.count_codes(RIGHT_HAND_KEYS);

        Efficiency {
            home_row: HomeRowUsage {
                count: home_row,
                percentage: home_row_percentage,
                rating: HomeRowRating::from_percentage(home_row_percentage),
            },
            hand_balance: HandBalance {
                left: share(left, left + right),
                right: share(right, left + right),
                balance_score: balance_score(left, right),
            },
        }
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        let bigrams = self.doc.sequences.table(SequenceKind::Bigram).len();
        recommend(&self.efficiency(), &self.modifier_usage(), bigrams)
    }

    pub fn report(&self) -> Report {
        let modifier_usage = self.modifier_usage();
        let bigrams = self.sequence_rankings(SequenceKind::Bigram, REPORT_SEQUENCES);
        let efficiency = self.efficiency();
        let recommendations = recommend(&efficiency, &modifier_usage, bigrams.unique);

        Report {
            generated_at: Local::now(),
            basic: self.basic_statistics(),
            top_keys: self.top_keys(REPORT_TOP_KEYS),
            top_keys_without_modifiers: self.top_keys_without_modifiers(REPORT_NO_MODIFIER_KEYS),
            modifier_usage,
            combinations: self.combination_usage(),
            bigrams,
            trigrams: self.sequence_rankings(SequenceKind::Trigram, REPORT_SEQUENCES),
            transitions: self.transitions(REPORT_TRANSITION_KEYS, REPORT_NEIGHBORS),
            typing_patterns: self.typing_patterns(),
            efficiency,
            recommendations,
        }
    }
}

/// Nothing is suggested about the home row or hand balance until keys from
/// those groups have been typed.
fn recommend(
    efficiency: &Efficiency,
    modifier_usage: &ModifierUsage,
    unique_bigrams: usize,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    let home_row = &efficiency.home_row;
    let balance = &efficiency.hand_balance;
    let hand_total = balance.left.count + balance.right.count;

    if hand_total > 0 && home_row.percentage < HOME_ROW_TARGET {
        recommendations.push(Recommendation::PracticeHomeRow);
    }
    if hand_total > 0 && balance.balance_score < BALANCE_TARGET {
        if balance.left.percentage > 60.0 {
            recommendations.push(Recommendation::UseRightHandMore);
        } else if balance.left.percentage < 40.0 {
            recommendations.push(Recommendation::UseLeftHandMore);
        }
    }
    if modifier_usage.ratio("ctrl") > CTRL_HEAVY {
        recommendations.push(Recommendation::ShortcutsWellUsed);
    }
    if unique_bigrams > VARIED_BIGRAMS {
        recommendations.push(Recommendation::VariedPatterns);
    }

    if recommendations.is_empty() {
        recommendations.push(Recommendation::KeepItUp);
    }
    recommendations
}

/// True when the key itself is one of the held modifiers, e.g. `Left Shift`
/// under `shift`.
fn is_modifier_key(key_name: &str, combination: &str) -> bool {
    let lowered = key_name.trim().to_ascii_lowercase();
    let stripped = ["left", "right"]
        .iter()
        .find_map(|side| lowered.strip_prefix(side))
        .unwrap_or(&lowered);
    let as_modifier = modifiers::canonicalize(stripped);
    !modifiers::is_none(&as_modifier)
        && modifiers::components(combination).any(|part| part == as_modifier)
}

/// `ctrl+shift` on `C` becomes `Ctrl+Shift+C`.
fn shortcut_label(combination: &str, key_name: &str) -> String {
    let mut parts: Vec<&str> = modifiers::components(combination).collect();
    parts.sort_by_key(|part| {
        SHORTCUT_ORDER
            .iter()
            .position(|known| known == part)
            .unwrap_or(SHORTCUT_ORDER.len())
    });

    let mut label: Vec<String> = parts
        .into_iter()
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    label.push(key_name.to_string());
    label.join("+")
}
