use super::{Record, RecordStore, UpdatedRecord, seed};
use crate::utils::Error;
use serde_json::json;

#[test]
fn test_seeded_store_has_eight_records() {
    let store = RecordStore::seeded();
    assert_eq!(store.len(), 8);
    assert!(!store.is_empty());
}

#[test]
fn test_empty_query_returns_all_in_insertion_order() {
    let store = RecordStore::seeded();
    let all = store.search("");
    let ids: Vec<_> = all.iter().map(|r| r.id).collect();
    assert_eq!(
        ids,
        vec![24186, 72818, 38504, 62403, 93269, 35416, 63192, 27937]
    );
}

#[test]
fn test_search_is_case_sensitive_substring() {
    let store = RecordStore::seeded();
    for query in ["I1l", "i1l", "uij", "qmo4", "zzz-not-there", "O"] {
        let results = store.search(query);
        assert!(results.iter().all(|r| r.text.contains(query)));
        let expected = seed::records()
            .into_iter()
            .filter(|r| r.text.contains(query))
            .count();
        assert_eq!(results.len(), expected, "query {query}");
    }
    assert!(store.search("UIJ").is_empty());
    assert_eq!(store.search("uij")[0].id, 27937);
}

#[test]
fn test_update_changes_only_target_record() {
    let store = RecordStore::seeded();
    let before = store.snapshot();

    let updated = store.update(38504, "changed").unwrap();
    assert_eq!(updated, Record::new(38504, "changed"));

    let after = store.snapshot();
    assert_eq!(after.len(), before.len());
    for (old, new) in before.iter().zip(after.iter()) {
        assert_eq!(old.id, new.id);
        if old.id == 38504 {
            assert_eq!(new.text, "changed");
        } else {
            assert_eq!(old, new);
        }
    }
}

#[test]
fn test_update_unknown_id_is_not_found() {
    let store = RecordStore::seeded();
    let before = store.snapshot();
    match store.update(1, "nope") {
        Err(Error::NotFound(id)) => assert_eq!(id, 1),
        other => panic!("Expected NotFound, got {other:?}"),
    }
    assert_eq!(store.snapshot(), before);
}

#[test]
fn test_from_records_rejects_duplicate_ids() {
    let result = RecordStore::from_records(vec![Record::new(1, "a"), Record::new(1, "b")]);
    assert!(matches!(result, Err(Error::DuplicateRecord(1))));

    let store = RecordStore::from_records(vec![Record::new(1, "a"), Record::new(2, "b")]).unwrap();
    assert_eq!(store.len(), 2);
}

#[test]
fn test_record_id_serializes_as_string() {
    let value = serde_json::to_value(Record::new(24186, "hello")).unwrap();
    assert_eq!(value, json!({ "id": "24186", "text": "hello" }));

    let value = serde_json::to_value(UpdatedRecord::updated(5)).unwrap();
    assert_eq!(value, json!({ "status": "updated", "id": "5" }));
}

#[test]
fn test_record_id_accepts_string_or_integer() {
    let a: Record = serde_json::from_value(json!({ "id": "42", "text": "x" })).unwrap();
    let b: Record = serde_json::from_value(json!({ "id": 42, "text": "x" })).unwrap();
    assert_eq!(a, b);
    assert!(serde_json::from_value::<Record>(json!({ "id": "abc", "text": "x" })).is_err());
}
