use crate::{
    config::AnalysisConfig,
    model::SequenceKind,
    modifiers::{self, NO_MODIFIERS},
    scheduler::SchedulerHandle,
    store::Store,
};
use chrono::{DateTime, Local};
use log::trace;
use std::{collections::VecDeque, sync::Arc};

/// One decoded key press as delivered by the capture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_code: String,
    pub key_name: String,
    /// Raw modifier string, canonicalized on record
    pub modifiers: String,
}

impl KeyEvent {
    pub fn new(
        key_code: impl Into<String>,
        key_name: impl Into<String>,
        modifiers: impl Into<String>,
    ) -> Self {
        Self {
            key_code: key_code.into(),
            key_name: key_name.into(),
            modifiers: modifiers.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub keystrokes: u64,
    pub started_at: Option<DateTime<Local>>,
    /// Last key with its modifiers, e.g. `C (ctrl)`
    pub last_key: Option<String>,
    pub last_key_at: Option<DateTime<Local>>,
}

/// Turns key events into store updates and scheduler notifications.
pub struct Recorder {
    store: Arc<Store>,
    settings: AnalysisConfig,
    scheduler: Option<SchedulerHandle>,
    previous_key: Option<String>,
    window: VecDeque<String>,
    session: SessionStats,
}

impl Recorder {
    pub fn new(store: Arc<Store>, settings: &AnalysisConfig) -> Self {
        Self {
            store,
            settings: settings.clone(),
            scheduler: None,
            previous_key: None,
            window: VecDeque::with_capacity(settings.max_sequence_length.min(1024)),
            session: SessionStats::default(),
        }
    }

    pub fn with_scheduler(mut self, handle: SchedulerHandle) -> Self {
        self.scheduler = Some(handle);
        self
    }

    pub fn session(&self) -> &SessionStats {
        &self.session
    }

    pub fn record(&mut self, event: &KeyEvent) {
        let combination = if self.settings.track_modifiers {
            modifiers::canonicalize(&event.modifiers)
        } else {
            NO_MODIFIERS.to_string()
        };

        self.store.record_keystroke(
            &event.key_code,
            &event.key_name,
            &combination,
            self.previous_key.as_deref(),
        );

        if self.window.len() >= self.settings.max_sequence_length {
            self.window.pop_front();
        }
        self.window.push_back(event.key_code.clone());

        if self.settings.track_bigrams {
            self.record_tail(SequenceKind::Bigram);
        }
        if self.settings.track_trigrams {
            self.record_tail(SequenceKind::Trigram);
        }

        let now = Local::now();
        let session = &mut self.session;
        session.keystrokes += 1;
        session.started_at.get_or_insert(now);
        session.last_key = Some(if modifiers::is_none(&combination) {
            event.key_name.clone()
        } else {
            format!("{} ({combination})", event.key_name)
        });
        session.last_key_at = Some(now);

        trace!("Recorded {} [{combination}]", event.key_code);
        self.previous_key = Some(event.key_code.clone());

        if let Some(handle) = &self.scheduler {
            handle.on_event();
        }
    }

    fn record_tail(&self, kind: SequenceKind) {
        let n = kind.len();
        if self.window.len() < n {
            return;
        }
        let tail: Vec<&str> = self
            .window
            .iter()
            .skip(self.window.len() - n)
            .map(String::as_str)
            .collect();
        self.store.record_sequence(&tail, kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use tempfile::TempDir;

    fn recorder_in(temp_dir: &TempDir, settings: AnalysisConfig) -> (Recorder, Arc<Store>) {
        let storage = StorageConfig::for_data_file(temp_dir.path().join("keyboard_log.json"));
        let store = Arc::new(Store::new(&storage).unwrap());
        (Recorder::new(Arc::clone(&store), &settings), store)
    }

    fn press(recorder: &mut Recorder, code: &str, name: &str, modifiers: &str) {
        recorder.record(&KeyEvent::new(code, name, modifiers));
    }

    #[test]
    fn test_bigrams_and_trigrams() {
        let temp_dir = TempDir::new().unwrap();
        let (mut recorder, store) = recorder_in(&temp_dir, AnalysisConfig::default());

        press(&mut recorder, "65", "A", "");
        press(&mut recorder, "66", "B", "");
        press(&mut recorder, "67", "C", "");

        let doc = store.snapshot();
        assert_eq!(doc.sequences.bigrams.len(), 2);
        assert_eq!(doc.sequences.bigrams["65_66"].sequence, "A->B");
        assert_eq!(doc.sequences.bigrams["66_67"].count, 1);
        assert_eq!(doc.sequences.trigrams.len(), 1);
        assert_eq!(doc.sequences.trigrams["65_66_67"].sequence, "A->B->C");
    }

    #[test]
    fn test_predecessor_is_previous_key() {
        let temp_dir = TempDir::new().unwrap();
        let (mut recorder, store) = recorder_in(&temp_dir, AnalysisConfig::default());

        press(&mut recorder, "65", "A", "none");
        press(&mut recorder, "66", "B", "shift");

        let doc = store.snapshot();
        assert!(doc.keys["65"].modifier_combinations["none"].preceded_by.is_empty());
        assert_eq!(doc.keys["66"].modifier_combinations["shift"].preceded_by["65"], 1);
    }

    #[test]
    fn test_modifier_tracking_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let settings = AnalysisConfig {
            track_modifiers: false,
            ..AnalysisConfig::default()
        };
        let (mut recorder, store) = recorder_in(&temp_dir, settings);

        press(&mut recorder, "67", "C", "ctrl");

        let doc = store.snapshot();
        let combos = &doc.keys["67"].modifier_combinations;
        assert_eq!(combos.keys().collect::<Vec<_>>(), vec!["none"]);
    }

    #[test]
    fn test_sequence_tracking_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let settings = AnalysisConfig {
            track_bigrams: false,
            track_trigrams: false,
            ..AnalysisConfig::default()
        };
        let (mut recorder, store) = recorder_in(&temp_dir, settings);

        for code in ["65", "66", "67", "68"] {
            press(&mut recorder, code, code, "");
        }

        let doc = store.snapshot();
        assert!(doc.sequences.bigrams.is_empty());
        assert!(doc.sequences.trigrams.is_empty());
        assert_eq!(doc.totals.total_keystrokes, 4);
    }

    #[test]
    fn test_window_is_bounded() {
        let temp_dir = TempDir::new().unwrap();
        let settings = AnalysisConfig {
            max_sequence_length: 3,
            ..AnalysisConfig::default()
        };
        let (mut recorder, store) = recorder_in(&temp_dir, settings);

        for code in ["1", "2", "3", "4", "5"] {
            press(&mut recorder, code, code, "");
        }

        assert_eq!(recorder.window.len(), 3);
        let doc = store.snapshot();
        assert_eq!(doc.sequences.trigrams.len(), 3);
        assert!(doc.sequences.trigrams.contains_key("3_4_5"));
    }

    #[test]
    fn test_session_stats() {
        let temp_dir = TempDir::new().unwrap();
        let (mut recorder, _store) = recorder_in(&temp_dir, AnalysisConfig::default());

        press(&mut recorder, "65", "A", "");
        press(&mut recorder, "67", "C", "Control");

        let session = recorder.session();
        assert_eq!(session.keystrokes, 2);
        assert!(session.started_at.is_some());
        assert_eq!(session.last_key.as_deref(), Some("C (ctrl)"));
    }
}
