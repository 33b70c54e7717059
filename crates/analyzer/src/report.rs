use chrono::{DateTime, Local, NaiveDate};
use keystats::SequenceKind;
use serde::Serialize;
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicStatistics {
    pub total_keystrokes: u64,
    pub unique_keys: usize,
    pub first_record_date: Option<NaiveDate>,
    pub last_record_date: Option<NaiveDate>,
    /// Inclusive day count between the first and last record dates
    pub recording_days: u64,
    pub recording_period: String,
    pub average_per_day: f64,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyRank {
    pub rank: usize,
    pub key_code: String,
    pub key_name: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModifierCount {
    pub modifier: String,
    pub count: u64,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifierKeyRank {
    pub rank: usize,
    pub key_code: String,
    pub key_name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortcut {
    /// Display form, e.g. `Ctrl+Shift+C`
    pub combination: String,
    pub modifiers: String,
    pub key_code: String,
    pub key_name: String,
    pub count: u64,
}

/// Per-modifier totals. A compound combination such as `ctrl+shift`
/// counts toward both `ctrl` and `shift`, so the totals can exceed the
/// number of keystrokes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModifierUsage {
    pub total: u64,
    pub modifiers: Vec<ModifierCount>,
    pub key_rankings: BTreeMap<String, Vec<ModifierKeyRank>>,
    pub shortcuts: Vec<Shortcut>,
}

impl ModifierUsage {
    pub fn count(&self, modifier: &str) -> u64 {
        self.modifiers
            .iter()
            .find(|m| m.modifier == modifier)
            .map_or(0, |m| m.count)
    }

    pub fn ratio(&self, modifier: &str) -> f64 {
        self.modifiers
            .iter()
            .find(|m| m.modifier == modifier)
            .map_or(0.0, |m| m.ratio)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinationUsage {
    pub combination: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceRank {
    pub rank: usize,
    pub key: String,
    pub sequence: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceRanking {
    pub kind: SequenceKind,
    pub total: u64,
    pub unique: usize,
    pub entries: Vec<SequenceRank>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Neighbor {
    pub key_code: String,
    pub key_name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyTransitions {
    pub rank: usize,
    pub key_code: String,
    pub key_name: String,
    pub count: u64,
    pub predecessors: Vec<Neighbor>,
    pub successors: Vec<Neighbor>,
}

/// A count and its share of some total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Share {
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LetterDistribution {
    pub vowels: Share,
    pub consonants: Share,
}

/// Letters (`A`-`Z`), digits (`0`-`9`) and everything else, by key-code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TypingPatterns {
    pub letters: Share,
    pub numbers: Share,
    pub special: Share,
    /// Only present when any letter was typed.
    pub letter_distribution: Option<LetterDistribution>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeRowRating {
    Excellent,
    Good,
    Fair,
    NeedsPractice,
}

impl HomeRowRating {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 40.0 {
            Self::Excellent
        } else if percentage >= 30.0 {
            Self::Good
        } else if percentage >= 20.0 {
            Self::Fair
        } else {
            Self::NeedsPractice
        }
    }
}

impl fmt::Display for HomeRowRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Excellent => "excellent, the home row is well used",
            Self::Good => "good home row usage",
            Self::Fair => "fair, try to keep your fingers on the home row",
            Self::NeedsPractice => "room to improve, home row practice is recommended",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HomeRowUsage {
    pub count: u64,
    pub percentage: f64,
    pub rating: HomeRowRating,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HandBalance {
    pub left: Share,
    pub right: Share,
    /// 100 for an even split, 0 for one hand only (or no data).
    pub balance_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Efficiency {
    pub home_row: HomeRowUsage,
    pub hand_balance: HandBalance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    PracticeHomeRow,
    UseRightHandMore,
    UseLeftHandMore,
    ShortcutsWellUsed,
    VariedPatterns,
    KeepItUp,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PracticeHomeRow => {
                "Practice home row typing; it will improve your typing efficiency."
            }
            Self::UseRightHandMore => {
                "Your right hand is underused. Practice using both hands evenly."
            }
            Self::UseLeftHandMore => {
                "Your left hand is underused. Practice using both hands evenly."
            }
            Self::ShortcutsWellUsed => "You use Ctrl often and make good use of shortcuts.",
            Self::VariedPatterns => "You type a wide variety of key patterns.",
            Self::KeepItUp => "Your current typing patterns look good. Keep it up.",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Local>,
    pub basic: BasicStatistics,
    pub top_keys: Vec<KeyRank>,
    pub top_keys_without_modifiers: Vec<KeyRank>,
    pub modifier_usage: ModifierUsage,
    pub combinations: Vec<CombinationUsage>,
    pub bigrams: SequenceRanking,
    pub trigrams: SequenceRanking,
    pub transitions: Vec<KeyTransitions>,
    pub typing_patterns: TypingPatterns,
    pub efficiency: Efficiency,
    pub recommendations: Vec<Recommendation>,
}
