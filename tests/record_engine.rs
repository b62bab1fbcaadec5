use std::fs;

use fleeting::{GlobalConfig, RecordStorage, VaultSettings, HISTORY_LIMIT};
use tempfile::TempDir;

fn cheap_vault() -> VaultSettings {
    VaultSettings {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    }
}

fn open(temp: &TempDir, keep: u32) -> RecordStorage {
    let config = GlobalConfig {
        storage_dir: temp.path().join("fleeting"),
        backup_keep: keep,
        ..GlobalConfig::default()
    };
    RecordStorage::open_with(config, temp.path().join("config.json"), cheap_vault()).unwrap()
}

#[test]
fn add_tag_search_delete_scenario() {
    let temp = TempDir::new().unwrap();
    let mut storage = open(&temp, 10);

    let record = storage.add_record("Buy milk #todo", false).unwrap();
    let month = record.month_id().unwrap().to_string();

    assert_eq!(
        storage.list_records(Some(&month), false).unwrap(),
        vec![record.clone()]
    );
    assert_eq!(storage.list_tags(false).unwrap(), vec!["todo"]);

    let hits = storage.search_records("#todo", false).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record, record);
    assert_eq!(hits[0].month.as_deref(), Some(month.as_str()));

    assert!(storage
        .delete_record(Some(&month), &record.timestamp, false)
        .unwrap());
    assert!(storage.list_records(Some(&month), false).unwrap().is_empty());
    assert!(storage.list_tags(false).unwrap().is_empty());
}

#[test]
fn tags_survive_reopen_and_reflect_hand_edits() {
    let temp = TempDir::new().unwrap();
    let mut storage = open(&temp, 10);
    let record = storage.add_record("plan #work", false).unwrap();
    let month = record.month_id().unwrap().to_string();
    drop(storage);

    let file = temp.path().join("fleeting").join(format!("{}.md", month));
    let text = fs::read_to_string(&file).unwrap().replace("#work", "#home");
    fs::write(&file, text).unwrap();

    let storage = open(&temp, 10);
    assert_eq!(storage.list_tags(false).unwrap(), vec!["home"]);
}

#[test]
fn edit_keeps_bounded_history() {
    let temp = TempDir::new().unwrap();
    let mut storage = open(&temp, 10);
    let record = storage.add_record("v0", false).unwrap();
    let month = record.month_id().unwrap().to_string();

    for i in 1..=11 {
        assert!(storage
            .edit_record(Some(&month), &record.timestamp, &format!("v{}", i), false)
            .unwrap());
    }

    let history = storage.get_history(&record.timestamp).unwrap();
    assert_eq!(history.len(), HISTORY_LIMIT);
    assert_eq!(history[0].content, "v10");
    assert_eq!(history[9].content, "v1");
    assert_eq!(
        storage.list_records(Some(&month), false).unwrap()[0].content,
        "v11"
    );
}

#[test]
fn search_requires_tag_and_word() {
    let temp = TempDir::new().unwrap();
    let mut storage = open(&temp, 10);
    storage.add_record("Buy MILK #Todo", false).unwrap();
    storage.add_record("Buy bread #todo", false).unwrap();
    storage.add_record("milk run", false).unwrap();

    let hits = storage.search_records("#todo milk", false).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.content, "Buy MILK #Todo");
}

#[test]
fn private_space_round_trip_and_wrong_passphrase() {
    let temp = TempDir::new().unwrap();
    let mut storage = open(&temp, 10);

    assert!(storage.unlock_private("correct horse").unwrap());
    let record = storage.add_record("diary #mood", true).unwrap();
    storage.lock_private();

    assert!(!storage.unlock_private("wrong").unwrap());
    assert!(storage.list_records(None, true).unwrap().is_empty());
    assert!(storage.search_records("diary", true).unwrap().is_empty());

    assert!(storage.unlock_private("correct horse").unwrap());
    assert_eq!(storage.list_records(None, true).unwrap(), vec![record]);
    assert_eq!(storage.list_tags(true).unwrap(), vec!["mood"]);

    let hits = storage.search_records("#mood", true).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].month, None);

    let vault = fs::read_to_string(temp.path().join("fleeting").join("private.enc")).unwrap();
    assert!(!vault.contains("diary"));
}

#[test]
fn backups_deduplicate_and_respect_retention() {
    let temp = TempDir::new().unwrap();
    let mut storage = open(&temp, 3);

    storage.add_record("first", false).unwrap();
    assert!(storage.backup_now().unwrap());
    assert!(!storage.backup_now().unwrap());
    assert_eq!(storage.list_backups().unwrap().len(), 1);

    for i in 0..4 {
        storage.add_record(&format!("more {}", i), false).unwrap();
        assert!(storage.backup_now().unwrap());
    }

    let snapshots = storage.list_backups().unwrap();
    assert_eq!(snapshots.len(), 3);
    assert!(snapshots.windows(2).all(|w| w[0].id > w[1].id));
}

#[test]
fn restore_brings_back_deleted_records() {
    let temp = TempDir::new().unwrap();
    let mut storage = open(&temp, 10);

    let record = storage.add_record("keep me #x", false).unwrap();
    let month = record.month_id().unwrap().to_string();
    storage.backup_now().unwrap();
    let id = storage.list_backups().unwrap()[0].id.clone();

    storage
        .delete_record(Some(&month), &record.timestamp, false)
        .unwrap();
    assert!(storage.list_records(Some(&month), false).unwrap().is_empty());

    assert!(storage.restore_backup(&id).unwrap());
    assert_eq!(
        storage.list_records(Some(&month), false).unwrap(),
        vec![record]
    );
    assert!(storage.list_backups().unwrap().iter().any(|s| s.id == id));
}

#[test]
fn invalid_ids_are_rejected() {
    let temp = TempDir::new().unwrap();
    let mut storage = open(&temp, 10);

    assert!(storage.list_records(Some("../etc"), false).is_err());
    assert!(storage.restore_backup("../../x").is_err());
    assert!(storage.delete_backup("nope").is_err());
}
