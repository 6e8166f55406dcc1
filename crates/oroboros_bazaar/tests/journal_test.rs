//! Integration test for the event journal: every committed operation is
//! written as one record, rejected operations leave no trace, and a
//! reopened journal continues the sequence.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy_primitives::Address;
use oroboros_bazaar::{
    AcceptAll, Bazaar, BazaarConfig, BazaarEvent, Collaborators, EventJournal, ManualClock, PauseFlag, Pulse, Role,
    RoleRegistry,
};

const IRON_ORE: u32 = 1;

fn temp_journal_path() -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("test_bazaar_journal_{id}.bzj"))
}

fn server() -> Address {
    Address::with_last_byte(0x5E)
}

fn seller() -> Address {
    Address::with_last_byte(0x51)
}

fn buyer() -> Address {
    Address::with_last_byte(0xB1)
}

fn open_bazaar(path: &Path) -> Bazaar {
    let mut config = BazaarConfig::from_toml_str(include_str!("../data/bazaar.toml")).unwrap();
    config.journal.path = Some(path.to_path_buf());
    let roles = RoleRegistry::new().with(Role::GameContract, server());
    let collaborators = Collaborators::new(
        Arc::new(roles),
        Arc::new(PauseFlag::new()),
        Arc::new(ManualClock::new(500)),
        Arc::new(AcceptAll),
    );
    Bazaar::new(config, collaborators).unwrap()
}

#[test]
fn test_journal_records_committed_operations() {
    let path = temp_journal_path();
    let bazaar = open_bazaar(&path);

    bazaar.mint(server(), seller(), IRON_ORE, 100).unwrap();
    bazaar.deposit(server(), buyer(), Pulse::from_whole(100)).unwrap();
    let id = bazaar.create_listing(seller(), IRON_ORE, 100, Pulse::ONE, 3_600).unwrap();
    // Rejected: not journaled
    assert!(bazaar.mint(buyer(), buyer(), IRON_ORE, 1).is_err());
    bazaar.purchase_listing(buyer(), id, 50, Pulse::from_whole(50)).unwrap();
    drop(bazaar);

    let entries = EventJournal::read_all(&path).unwrap();
    assert_eq!(entries.len(), 4);
    let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);

    assert_eq!(entries[0].events.len(), 1);
    assert_eq!(entries[0].events[0].name(), "item_minted");
    assert!(matches!(
        entries[2].events.last(),
        Some(BazaarEvent::ListingCreated { quantity: 100, expires_at: 4_100, .. })
    ));

    let purchase = &entries[3].events;
    assert!(purchase
        .iter()
        .any(|e| matches!(e, BazaarEvent::FeeCollected { amount, .. } if amount.to_string() == "2.5")));
    assert!(matches!(purchase.last(), Some(BazaarEvent::ListingSold { quantity: 50, .. })));

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_journal_continues_after_reopen() {
    let path = temp_journal_path();

    let bazaar = open_bazaar(&path);
    bazaar.mint(server(), seller(), IRON_ORE, 1).unwrap();
    bazaar.mint(server(), seller(), IRON_ORE, 2).unwrap();
    drop(bazaar);

    let bazaar = open_bazaar(&path);
    bazaar.mint(server(), seller(), IRON_ORE, 3).unwrap();
    drop(bazaar);

    let entries = EventJournal::read_all(&path).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2].sequence, 3);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_torn_tail_is_dropped_on_open() {
    let path = temp_journal_path();

    let bazaar = open_bazaar(&path);
    bazaar.mint(server(), seller(), IRON_ORE, 7).unwrap();
    drop(bazaar);

    // Simulate a crash halfway through the next record
    let mut bytes = std::fs::read(&path).unwrap();
    bytes.extend_from_slice(&[2, 0, 0, 0, 0, 0, 0, 0, 40, 0]);
    std::fs::write(&path, &bytes).unwrap();

    let mut journal = EventJournal::open(&path, true).unwrap();
    assert_eq!(journal.next_sequence(), 2);
    assert_eq!(journal.append(&[]).unwrap(), 2);
    drop(journal);

    let entries = EventJournal::read_all(&path).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[1].events.is_empty());

    std::fs::remove_file(&path).ok();
}
