use keystats::{
    KeyEvent, LoadOutcome, Recorder, SaveScheduler, SequenceKind, StatisticsDocument, Store,
    config::{AnalysisConfig, SaveConfig, StorageConfig},
};
use std::{
    fs,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};
use tempfile::TempDir;

fn storage_in(temp_dir: &TempDir, retention: usize) -> StorageConfig {
    StorageConfig {
        data_file: temp_dir.path().join("keyboard_log.json"),
        backup_retention: retention,
    }
}

#[test]
fn load_after_save_reproduces_document() {
    let temp_dir = TempDir::new().unwrap();
    let storage = storage_in(&temp_dir, 10);
    let store = Store::open(&storage).unwrap();

    for (code, name, mods, prev) in [
        ("72", "H", "shift", None),
        ("73", "I", "none", Some("72")),
        ("32", "Space", "", Some("73")),
        ("72", "H", "none", Some("32")),
    ] {
        store.record_keystroke(code, name, mods, prev);
    }
    store.record_sequence(&["72", "73"], SequenceKind::Bigram);
    store.record_sequence(&["72", "73", "32"], SequenceKind::Trigram);
    store.save(false).unwrap();

    let first = Store::open(&storage).unwrap().snapshot();
    assert_eq!(first, store.snapshot());

    // saving an unchanged document and loading again changes nothing
    let reopened = Store::open(&storage).unwrap();
    reopened.save(false).unwrap();
    assert_eq!(Store::open(&storage).unwrap().snapshot(), first);
}

#[test]
fn counts_add_up_across_sessions() {
    let temp_dir = TempDir::new().unwrap();
    let storage = storage_in(&temp_dir, 10);

    for _ in 0..3 {
        let store = Store::open(&storage).unwrap();
        for _ in 0..7 {
            store.record_keystroke("65", "A", "none", None);
        }
        store.save(true).unwrap();
    }

    let doc = Store::open(&storage).unwrap().snapshot();
    assert_eq!(doc.totals.total_keystrokes, 21);
    assert_eq!(doc.keys["65"].count, 21);
    assert!(doc.is_consistent());
}

#[test]
fn readers_never_see_partial_files() {
    let temp_dir = TempDir::new().unwrap();
    let storage = storage_in(&temp_dir, 10);
    let store = Arc::new(Store::open(&storage).unwrap());
    store.record_keystroke("65", "A", "none", None);
    store.save(false).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let done = Arc::clone(&done);
        let path = storage.data_file.clone();
        thread::spawn(move || {
            let mut reads = 0;
            loop {
                let content = fs::read_to_string(&path).unwrap();
                serde_json::from_str::<StatisticsDocument>(&content).unwrap();
                reads += 1;
                if done.load(Ordering::Relaxed) {
                    break reads;
                }
            }
        })
    };

    for i in 0..200 {
        store.record_keystroke(&i.to_string(), "K", "ctrl+shift", Some("65"));
        store.save(false).unwrap();
    }
    done.store(true, Ordering::Relaxed);

    assert!(reader.join().unwrap() > 0);
}

#[test]
fn backups_keep_only_the_newest() {
    let temp_dir = TempDir::new().unwrap();
    let retention = 4;
    let storage = storage_in(&temp_dir, retention);
    let store = Store::open(&storage).unwrap();
    store.save(false).unwrap();

    let mut created = Vec::new();
    for _ in 0..retention + 3 {
        store.record_keystroke("65", "A", "none", None);
        store.save(false).unwrap();
        created.push(store.create_backup().unwrap().unwrap());
    }

    let mut remaining: Vec<_> = fs::read_dir(storage.backup_dir())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    remaining.sort();

    let mut expected = created[created.len() - retention..].to_vec();
    expected.sort();
    assert_eq!(remaining, expected);
}

#[test]
fn corrupt_file_is_recovered_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let storage = storage_in(&temp_dir, 10);
    {
        let store = Store::open(&storage).unwrap();
        for _ in 0..5 {
            store.record_keystroke("65", "A", "none", None);
        }
        store.save(false).unwrap();
        // backs up the five-keystroke file
        store.save(true).unwrap();
    }

    fs::write(&storage.data_file, b"{\"total_statistics\": ").unwrap();

    let store = Store::new(&storage).unwrap();
    assert!(matches!(store.load(), LoadOutcome::Restored(_)));
    assert_eq!(store.total_keystrokes(), 5);
}

#[test]
fn corrupt_file_without_backups_starts_fresh() {
    let temp_dir = TempDir::new().unwrap();
    let storage = storage_in(&temp_dir, 10);
    fs::write(&storage.data_file, b"\x00\x01 binary junk").unwrap();

    let store = Store::open(&storage).unwrap();
    assert!(store.snapshot().is_empty());
    assert_eq!(store.load(), LoadOutcome::Reset);
}

#[test]
fn recorder_and_scheduler_persist_a_session() {
    let temp_dir = TempDir::new().unwrap();
    let storage = storage_in(&temp_dir, 10);
    let store = Arc::new(Store::open(&storage).unwrap());

    let save = SaveConfig {
        keystroke_batch_save: 4,
        ..SaveConfig::default()
    };
    let mut scheduler = SaveScheduler::new(Arc::clone(&store), &save);
    scheduler.start().unwrap();

    let mut recorder =
        Recorder::new(Arc::clone(&store), &AnalysisConfig::default()).with_scheduler(scheduler.handle());
    for (code, name, mods) in [
        ("72", "H", "shift"),
        ("69", "E", ""),
        ("76", "L", ""),
        ("76", "L", ""),
        ("79", "O", ""),
    ] {
        recorder.record(&KeyEvent::new(code, name, mods));
    }
    let stats = scheduler.stop();
    assert_eq!(stats.shutdown_saves, 1);
    assert_eq!(stats.failed_saves, 0);

    let doc = Store::open(&storage).unwrap().snapshot();
    assert_eq!(doc.totals.total_keystrokes, 5);
    assert_eq!(doc.keys["76"].count, 2);
    assert_eq!(doc.keys["76"].preceded_by_count("76"), 1);
    assert_eq!(doc.sequences.bigrams["76_76"].sequence, "L->L");
    assert_eq!(doc.sequences.trigrams.len(), 3);
    assert_eq!(doc.keys["72"].modifier_combinations["shift"].count, 1);
}
