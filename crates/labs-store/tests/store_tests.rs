use chrono::Utc;
use labs_model::{
    Attribution, CrewMemberId, KnowledgeItem, KnowledgeItemId, KnowledgeSeed, KnowledgeType,
    SopId,
};
use labs_store::{verify_entries, Journal, JournalEvent, KnowledgeStore, StoreError};
use proptest::prelude::*;

fn revoke(n: usize) -> JournalEvent {
    JournalEvent::TrainingRevoked {
        crew_member_id: CrewMemberId::new(format!("crew-{n}")),
        sop_id: SopId::new("tile"),
    }
}

fn item() -> KnowledgeItem {
    KnowledgeItem::draft(
        KnowledgeItemId::new(),
        KnowledgeSeed::for_attribution(
            "Grout haze",
            KnowledgeType::Technique,
            &Attribution::category("tile"),
        ),
        Utc::now(),
    )
}

#[test]
fn test_stale_writers_lose() {
    let store = KnowledgeStore::new();
    let original = item();
    store.insert(original.clone()).unwrap();

    let mut first = original.clone();
    first.confidence_score = 20;
    let written = store.compare_and_swap(0, first).unwrap();
    assert_eq!(written.version, 1);

    let mut stale = original;
    stale.confidence_score = 34;
    let err = store.compare_and_swap(0, stale).unwrap_err();
    assert!(matches!(
        err,
        StoreError::VersionConflict { expected: 0, found: 1, .. }
    ));
    assert_eq!(store.get(written.id).unwrap().confidence_score, 20);
}

#[test]
fn test_duplicate_items_are_refused() {
    let store = KnowledgeStore::new();
    let original = item();
    store.insert(original.clone()).unwrap();
    assert!(matches!(
        store.insert(original),
        Err(StoreError::Duplicate { .. })
    ));
}

proptest! {
    #[test]
    fn prop_any_journal_verifies(len in 0usize..40) {
        let journal = Journal::new();
        for n in 0..len {
            journal.append(revoke(n)).unwrap();
        }
        prop_assert!(journal.verify_integrity().is_ok());
        prop_assert_eq!(journal.len(), len);
    }

    #[test]
    fn prop_any_edit_is_detected(len in 1usize..30, pick in any::<prop::sample::Index>()) {
        let journal = Journal::new();
        for n in 0..len {
            journal.append(revoke(n)).unwrap();
        }
        let mut entries = journal.entries();
        let victim = pick.index(len);
        entries[victim].event = revoke(len + 100);

        match verify_entries(&entries) {
            Err(StoreError::IntegrityViolation { seq }) => prop_assert_eq!(seq, victim as u64),
            other => prop_assert!(false, "expected integrity violation, got {:?}", other),
        }
    }

    #[test]
    fn prop_dropped_entries_are_detected(len in 2usize..30, pick in any::<prop::sample::Index>()) {
        let journal = Journal::new();
        for n in 0..len {
            journal.append(revoke(n)).unwrap();
        }
        let mut entries = journal.entries();
        let victim = pick.index(len - 1);
        entries.remove(victim);
        prop_assert!(verify_entries(&entries).is_err());
    }
}

#[test]
fn test_journal_file_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let journal = Journal::new();
    let at = Utc::now();
    for n in 0..3 {
        journal.append_at(revoke(n), at).unwrap();
    }
    journal.write_to(&path).unwrap();

    let restored = Journal::read_from(&path).unwrap();
    assert_eq!(restored, journal.entries());
}
