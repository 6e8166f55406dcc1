//! Conservation test: drives a long random mix of operations (including
//! ones that must fail) and checks after every step that no item or PULSE
//! was created or destroyed outside of mint, burn and deposit, and that
//! escrow always covers the open listings exactly.

use std::sync::Arc;

use alloy_primitives::Address;
use oroboros_bazaar::{
    AcceptAll, Bazaar, BazaarConfig, Collaborators, ListingId, ManualClock, PauseFlag, Pulse, Role, RoleRegistry,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const KINDS: [u32; 5] = [1, 2, 3, 4, 10];
const DAY: u64 = 86_400;

fn admin() -> Address {
    Address::with_last_byte(0xAD)
}

fn server() -> Address {
    Address::with_last_byte(0x5E)
}

fn operator() -> Address {
    Address::with_last_byte(0x0F)
}

fn players() -> Vec<Address> {
    (1..=6).map(Address::with_last_byte).collect()
}

fn create_bazaar(clock: Arc<ManualClock>) -> Bazaar {
    let config = BazaarConfig::from_toml_str(include_str!("../data/bazaar.toml")).unwrap();
    let roles = RoleRegistry::new()
        .with(Role::Administrator, admin())
        .with(Role::GameContract, server())
        .with(Role::Operator, operator());
    let collaborators = Collaborators::new(Arc::new(roles), Arc::new(PauseFlag::new()), clock, Arc::new(AcceptAll));
    Bazaar::new(config, collaborators).unwrap()
}

/// Checks item conservation, currency conservation and escrow coverage.
fn assert_books_balance(bazaar: &Bazaar, listings: &[ListingId], step: usize) {
    let audit = bazaar.currency_audit().unwrap();
    assert!(audit.is_balanced(), "step {step}: currency unbalanced: {audit:?}");

    for kind in KINDS {
        assert_eq!(
            bazaar.total_supply(kind),
            bazaar.sum_of_balances(kind),
            "step {step}: supply of kind {kind} diverged"
        );

        let escrowed: u128 = listings
            .iter()
            .filter_map(|&id| bazaar.listing(id))
            .filter(|l| l.is_active() && l.kind == kind)
            .map(|l| l.remaining_quantity)
            .sum();
        assert_eq!(
            bazaar.balance_of(bazaar.escrow_account(), kind),
            escrowed,
            "step {step}: escrow of kind {kind} does not match open listings"
        );
    }
}

#[test]
fn test_random_operations_conserve_value() {
    let clock = Arc::new(ManualClock::new(0));
    let bazaar = create_bazaar(clock.clone());
    let players = players();
    let mut rng = ChaCha8Rng::seed_from_u64(0x0B0A_2A42);
    let mut listings: Vec<ListingId> = Vec::new();

    bazaar.register_vendor(admin(), 1, DAY).unwrap();
    bazaar.add_vendor_item(admin(), 1, 10, Pulse::from_whole(2), 25).unwrap();
    bazaar.add_vendor_item(admin(), 1, 2, Pulse::ONE, 50).unwrap();

    let mut committed = 0usize;
    for step in 0..2_000 {
        let actor = players[rng.gen_range(0..players.len())];
        let other = players[rng.gen_range(0..players.len())];
        let kind = KINDS[rng.gen_range(0..KINDS.len())];
        let quantity = rng.gen_range(0..20u128);
        let amount = Pulse::from_whole(rng.gen_range(0..30u128));

        let outcome = match rng.gen_range(0..12) {
            0 => bazaar.mint(server(), actor, kind, quantity),
            1 => bazaar.burn(server(), actor, kind, quantity),
            2 => bazaar.transfer(server(), actor, other, kind, quantity),
            3 => bazaar.deposit(server(), actor, amount),
            4 => bazaar
                .create_listing(actor, kind, quantity, Pulse::from_whole(rng.gen_range(1..5u128)), rng.gen_range(1..3 * DAY))
                .map(|id| listings.push(id)),
            5 | 6 => match listings.get(rng.gen_range(0..listings.len().max(1))) {
                Some(&id) => bazaar.purchase_listing(actor, id, quantity, amount).map(|_| ()),
                None => Ok(()),
            },
            7 => match listings.get(rng.gen_range(0..listings.len().max(1))) {
                Some(&id) => bazaar.cancel_listing(actor, id).map(|_| ()),
                None => Ok(()),
            },
            8 => bazaar
                .purchase_from_vendor(actor, 1, if rng.gen_bool(0.5) { 10 } else { 2 }, quantity, amount)
                .map(|_| ()),
            9 => bazaar.disburse_reward(server(), actor, amount, "quest"),
            10 => bazaar.withdraw(admin(), actor, amount),
            _ => bazaar.craft(server(), actor, rng.gen_range(1..=2), rng.gen_range(1..3)).map(|_| ()),
        };
        if outcome.is_ok() {
            committed += 1;
        }

        clock.advance(rng.gen_range(0..3_600));
        assert_books_balance(&bazaar, &listings, step);
    }

    // The mix must actually exercise commits, not just rejections
    assert!(committed > 200, "only {committed} operations committed");
    println!("conservation: {committed}/2000 operations committed, {} listings", listings.len());
}

#[test]
fn test_failed_operations_change_nothing() {
    let clock = Arc::new(ManualClock::new(0));
    let bazaar = create_bazaar(clock);
    let players = players();
    let (alice, bob) = (players[0], players[1]);

    bazaar.mint(server(), alice, 1, 10).unwrap();
    bazaar.deposit(server(), bob, Pulse::from_whole(5)).unwrap();
    let id = bazaar.create_listing(alice, 1, 10, Pulse::ONE, DAY).unwrap();
    bazaar.drain_events();
    let before = bazaar.currency_audit().unwrap();

    // Bob can afford 5 units but offers payment for 8
    assert!(bazaar.purchase_listing(bob, id, 8, Pulse::from_whole(8)).is_err());
    // Burn more than owned
    assert!(bazaar.burn(server(), alice, 1, 1).is_err());
    // Batch with one bad entry
    assert!(bazaar.mint_batch(server(), alice, &[1, 12_345], &[1, 1]).is_err());

    assert_eq!(bazaar.currency_audit(), Ok(before));
    assert_eq!(bazaar.purse_balance(bob), Pulse::from_whole(5));
    assert_eq!(bazaar.balance_of(alice, 1), 0);
    assert_eq!(bazaar.balance_of(bazaar.escrow_account(), 1), 10);
    assert_eq!(bazaar.total_supply(1), 10);
    assert!(bazaar.drain_events().is_empty());
}
