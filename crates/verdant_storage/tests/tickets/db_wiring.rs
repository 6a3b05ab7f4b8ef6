#![forbid(unsafe_code)]

use verdant_contracts::ticket::{
    NewTicket, TicketId, TicketKind, TicketPriority, TicketStatus,
};
use verdant_contracts::UtcSeconds;
use verdant_storage::{MemTicketStore, StorageError, TicketStore};

fn contact_ticket(subject: &str) -> NewTicket {
    NewTicket {
        name: "Ada Example".to_string(),
        email: "ada@example.com".to_string(),
        company: Some("Example Capital".to_string()),
        subject: subject.to_string(),
        message: "Please tell me more about the flagship strategy.".to_string(),
        kind: TicketKind::Question,
        status: TicketStatus::Open,
        priority: TicketPriority::default(),
    }
}

fn newsletter_ticket() -> NewTicket {
    NewTicket {
        name: "Newsletter Subscriber".to_string(),
        email: "reader@example.com".to_string(),
        company: None,
        subject: "Newsletter Signup".to_string(),
        message: "Newsletter signup from reader@example.com".to_string(),
        kind: TicketKind::Newsletter,
        status: TicketStatus::Resolved,
        priority: TicketPriority::default(),
    }
}

#[test]
fn dbw_tickets_01_ids_are_monotonic_and_timestamps_stamped() {
    let mut store = MemTicketStore::new_in_memory();
    let a = store
        .insert(contact_ticket("general - Example Capital"), UtcSeconds(100))
        .unwrap();
    let b = store.insert(newsletter_ticket(), UtcSeconds(105)).unwrap();
    assert_eq!(a.id, TicketId(1));
    assert_eq!(b.id, TicketId(2));
    assert_eq!(a.created_at, a.updated_at);
    assert_eq!(store.len(), 2);
}

#[test]
fn dbw_tickets_02_external_reference_round_trip() {
    let mut store = MemTicketStore::new_in_memory();
    let t = store
        .insert(contact_ticket("support - Individual"), UtcSeconds(50))
        .unwrap();
    store
        .update_external_reference(t.id, "sub_42".to_string(), UtcSeconds(60))
        .unwrap();
    let stored = store.get(t.id).unwrap();
    assert_eq!(stored.external_reference.as_deref(), Some("sub_42"));
    assert_eq!(stored.updated_at, UtcSeconds(60));
}

#[test]
fn dbw_tickets_03_missing_row_refused() {
    let mut store = MemTicketStore::new_in_memory();
    let err = store
        .update_external_reference(TicketId(99), "sub_1".to_string(), UtcSeconds(10))
        .unwrap_err();
    assert!(matches!(err, StorageError::MissingRow { .. }));
}

#[test]
fn dbw_tickets_04_counts_split_by_status() {
    let mut store = MemTicketStore::new_in_memory();
    store
        .insert(contact_ticket("general - Individual"), UtcSeconds(1))
        .unwrap();
    store
        .insert(contact_ticket("compliance - Individual"), UtcSeconds(2))
        .unwrap();
    store.insert(newsletter_ticket(), UtcSeconds(3)).unwrap();
    let counts = store.counts();
    assert_eq!(counts.total, 3);
    assert_eq!(counts.open, 2);
    assert_eq!(counts.resolved, 1);
}

#[test]
fn dbw_tickets_05_invalid_ticket_never_persisted() {
    let mut store = MemTicketStore::new_in_memory();
    let mut bad = contact_ticket("general - Individual");
    bad.email = "not-an-email".to_string();
    assert!(store.insert(bad, UtcSeconds(1)).is_err());
    assert!(store.is_empty());
}
