//! Tests for the side-car metadata store.
//!
//! Validates persistence round-trips, first-run behavior, defensive
//! copies, concurrent mutation visibility, and the name index.

use skiffrun::constants::NAME_LABEL;
use skiffrun::{MetadataStore, NameIndex};
use std::collections::HashMap;
use tempfile::TempDir;

// =============================================================================
// Persistence Tests
// =============================================================================

#[tokio::test]
async fn test_missing_document_initializes_empty_table() {
    let temp = TempDir::new().unwrap();
    let store = MetadataStore::new(temp.path().join("meta"));

    store.load().await.unwrap();

    assert!(store.get(100).unwrap().is_none());
    assert!(!store.has_label(100, "env").unwrap());
    assert!(
        temp.path().join("meta").exists(),
        "backing directory should be created on load"
    );
}

#[tokio::test]
async fn test_label_round_trip_across_instances() {
    let temp = TempDir::new().unwrap();

    let store = MetadataStore::new(temp.path());
    store.load().await.unwrap();
    store.set_label(7, "env", "prod").unwrap();
    store.save().unwrap();

    let fresh = MetadataStore::new(temp.path());
    fresh.load().await.unwrap();
    assert_eq!(fresh.get_label(7, "env").unwrap().as_deref(), Some("prod"));
}

#[tokio::test]
async fn test_save_persists_full_table() {
    let temp = TempDir::new().unwrap();
    let store = MetadataStore::new(temp.path());
    store.load().await.unwrap();

    let mut labels = HashMap::new();
    labels.insert("env".to_string(), "prod".to_string());
    labels.insert(NAME_LABEL.to_string(), "gitea".to_string());
    store.set(204, labels).unwrap();
    store.set_label(205, NAME_LABEL, "wiki").unwrap();
    store.delete(205).unwrap();
    store.save().unwrap();

    let fresh = MetadataStore::new(temp.path());
    fresh.load().await.unwrap();
    assert_eq!(fresh.find_by_name("gitea").unwrap(), Some(204));
    assert!(fresh.get(205).unwrap().is_none(), "deleted record must not persist");
}

#[tokio::test]
async fn test_double_save_is_benign() {
    let temp = TempDir::new().unwrap();
    let store = MetadataStore::new(temp.path());
    store.load().await.unwrap();
    store.set_label(7, "env", "prod").unwrap();

    store.save().unwrap();
    let first = std::fs::read(store.document_path()).unwrap();

    store.save().unwrap();
    let second = std::fs::read(store.document_path()).unwrap();

    assert_eq!(first, second, "re-flushing unchanged data must not corrupt");
}

#[tokio::test]
async fn test_mutations_flush_in_background() {
    let temp = TempDir::new().unwrap();
    let store = MetadataStore::new(temp.path());
    store.load().await.unwrap();

    store.set_label(7, "env", "prod").unwrap();

    // The detached flush is fire-and-forget; give the writer a moment.
    for _ in 0..100 {
        if store.document_path().exists() {
            let raw = std::fs::read(store.document_path()).unwrap();
            let table: HashMap<u32, HashMap<String, String>> =
                serde_json::from_slice(&raw).unwrap();
            assert_eq!(table[&7]["env"], "prod");
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("background flush never reached disk");
}

#[tokio::test]
async fn test_corrupt_document_fails_load() {
    let temp = TempDir::new().unwrap();
    let store = MetadataStore::new(temp.path());
    std::fs::write(store.document_path(), b"not json").unwrap();

    assert!(store.load().await.is_err());
}

// =============================================================================
// Accessor Tests
// =============================================================================

#[tokio::test]
async fn test_readers_return_defensive_copies() {
    let temp = TempDir::new().unwrap();
    let store = MetadataStore::new(temp.path());
    store.load().await.unwrap();
    store.set_label(3, "tier", "web").unwrap();

    let mut copy = store.get(3).unwrap().unwrap();
    copy.insert("tier".to_string(), "mutated".to_string());
    copy.insert("extra".to_string(), "value".to_string());

    assert_eq!(store.get_label(3, "tier").unwrap().as_deref(), Some("web"));
    assert!(!store.has_label(3, "extra").unwrap());
}

#[tokio::test]
async fn test_set_replaces_all_labels() {
    let temp = TempDir::new().unwrap();
    let store = MetadataStore::new(temp.path());
    store.load().await.unwrap();

    store.set_label(9, "old", "yes").unwrap();
    let mut labels = HashMap::new();
    labels.insert("new".to_string(), "yes".to_string());
    store.set(9, labels).unwrap();

    assert!(!store.has_label(9, "old").unwrap());
    assert_eq!(store.get_label(9, "new").unwrap().as_deref(), Some("yes"));
}

#[tokio::test]
async fn test_find_by_label_scans_table() {
    let temp = TempDir::new().unwrap();
    let store = MetadataStore::new(temp.path());
    store.load().await.unwrap();

    store.set_label(201, "env", "prod").unwrap();
    store.set_label(202, "env", "dev").unwrap();
    store.set_label(203, "env", "prod").unwrap();

    let mut hits = store.find_by_label("env", "prod").unwrap();
    hits.sort_unstable();
    assert_eq!(hits, vec![201, 203]);
    assert!(store.find_by_label("env", "staging").unwrap().is_empty());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[tokio::test]
async fn test_concurrent_writes_on_distinct_ids_all_land() {
    let temp = TempDir::new().unwrap();
    let store = std::sync::Arc::new(MetadataStore::new(temp.path()));
    store.load().await.unwrap();

    let mut handles = Vec::new();
    for vmid in 0..64u32 {
        let store = std::sync::Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            store.set_label(vmid, "index", &vmid.to_string()).unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for vmid in 0..64u32 {
        assert_eq!(
            store.get_label(vmid, "index").unwrap().as_deref(),
            Some(vmid.to_string().as_str()),
            "write for vmid {} was lost",
            vmid
        );
    }
}

// =============================================================================
// Name Index Tests
// =============================================================================

#[test]
fn test_name_index_round_trip() {
    let index = NameIndex::new();
    index.insert("gitea", 204);

    assert_eq!(index.id_for("gitea"), Some(204));
    assert_eq!(index.name_for(204).as_deref(), Some("gitea"));

    index.remove(204);
    assert_eq!(index.id_for("gitea"), None);
    assert_eq!(index.name_for(204), None);
}

#[test]
fn test_name_index_stays_bijective_under_reassignment() {
    let index = NameIndex::new();
    index.insert("web", 100);

    // Same name, new id: the old id loses its mapping.
    index.insert("web", 101);
    assert_eq!(index.name_for(100), None);
    assert_eq!(index.id_for("web"), Some(101));

    // Same id, new name: the old name loses its mapping.
    index.insert("web-renamed", 101);
    assert_eq!(index.id_for("web"), None);
    assert_eq!(index.name_for(101).as_deref(), Some("web-renamed"));
}
