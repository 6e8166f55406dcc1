//! Benchmark for bazaar trade throughput.
//!
//! Every operation drafts against the live economy and copies the
//! components it writes. These numbers track how commit cost grows with
//! the size of the books and with closed history.
//!
//! Run with: cargo bench --package oroboros_bazaar --bench market_benchmark

use std::sync::Arc;

use alloy_primitives::Address;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use oroboros_bazaar::{
    AcceptAll, Bazaar, BazaarConfig, Collaborators, ManualClock, PauseFlag, Pulse, Role, RoleRegistry,
};

const IRON_ORE: u32 = 1;
const HEALTH_POTION: u32 = 10;
const DAY: u64 = 86_400;

fn server() -> Address {
    Address::with_last_byte(0x5E)
}

fn admin() -> Address {
    Address::with_last_byte(0xAD)
}

fn buyer() -> Address {
    Address::with_last_byte(0xB1)
}

fn seller(index: u32) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0x5E;
    bytes[16..].copy_from_slice(&index.to_be_bytes());
    Address::new(bytes)
}

/// A bazaar with `sellers` sellers, each holding one large listing.
fn create_market(sellers: u32) -> (Bazaar, Vec<u64>) {
    let config = BazaarConfig::from_toml_str(include_str!("../data/bazaar.toml")).unwrap();
    let roles = RoleRegistry::new()
        .with(Role::Administrator, admin())
        .with(Role::GameContract, server());
    let collaborators = Collaborators::new(
        Arc::new(roles),
        Arc::new(PauseFlag::new()),
        Arc::new(ManualClock::new(0)),
        Arc::new(AcceptAll),
    );
    let bazaar = Bazaar::new(config, collaborators).unwrap();
    bazaar.deposit(server(), buyer(), Pulse::from_whole(u128::from(u64::MAX))).unwrap();

    let listings = (0..sellers)
        .map(|i| {
            bazaar.mint(server(), seller(i), IRON_ORE, 1_000_000_000).unwrap();
            bazaar
                .create_listing(seller(i), IRON_ORE, 1_000_000_000, Pulse::ONE, 30 * DAY)
                .unwrap()
        })
        .collect();

    bazaar.register_vendor(admin(), 1, DAY).unwrap();
    bazaar
        .add_vendor_item(admin(), 1, HEALTH_POTION, Pulse::ONE, u128::from(u64::MAX))
        .unwrap();
    bazaar.drain_events();
    (bazaar, listings)
}

fn benchmark_listing_purchase(c: &mut Criterion) {
    let mut group = c.benchmark_group("listing_purchase");
    group.throughput(Throughput::Elements(1));

    for sellers in [1u32, 100, 1_000] {
        let (bazaar, listings) = create_market(sellers);
        group.bench_with_input(BenchmarkId::from_parameter(sellers), &listings, |b, listings| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 1) % listings.len();
                black_box(bazaar.purchase_listing(buyer(), listings[i], 1, Pulse::ONE)).unwrap();
                if i == 0 {
                    bazaar.drain_events();
                }
            });
        });
    }

    group.finish();
}

/// Adds `closed` cancelled listings and as many treasury collection tags.
fn add_history(bazaar: &Bazaar, closed: u32) {
    if closed == 0 {
        return;
    }
    let trader = seller(u32::MAX);
    bazaar.mint(server(), trader, IRON_ORE, u128::from(closed)).unwrap();
    bazaar.deposit(server(), server(), Pulse::from_whole(u128::from(closed))).unwrap();
    for i in 0..closed {
        let id = bazaar.create_listing(trader, IRON_ORE, 1, Pulse::ONE, DAY).unwrap();
        bazaar.cancel_listing(trader, id).unwrap();
        bazaar.collect(server(), Pulse::ONE, &format!("source-{i}")).unwrap();
    }
    bazaar.drain_events();
}

fn benchmark_history_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("history_growth");
    group.throughput(Throughput::Elements(1));

    for closed in [0u32, 1_000, 10_000] {
        let (bazaar, listings) = create_market(1);
        add_history(&bazaar, closed);

        group.bench_with_input(BenchmarkId::new("vendor_purchase", closed), &closed, |b, _| {
            b.iter(|| {
                black_box(bazaar.purchase_from_vendor(buyer(), 1, HEALTH_POTION, 1, Pulse::ONE)).unwrap();
                bazaar.drain_events();
            });
        });
        group.bench_with_input(BenchmarkId::new("listing_purchase", closed), &listings, |b, listings| {
            b.iter(|| {
                black_box(bazaar.purchase_listing(buyer(), listings[0], 1, Pulse::ONE)).unwrap();
                bazaar.drain_events();
            });
        });
    }

    group.finish();
}

fn benchmark_vendor_purchase(c: &mut Criterion) {
    let (bazaar, _) = create_market(1);

    c.bench_function("vendor_purchase", |b| {
        b.iter(|| {
            black_box(bazaar.purchase_from_vendor(buyer(), 1, HEALTH_POTION, 1, Pulse::ONE)).unwrap();
            bazaar.drain_events();
        });
    });
}

fn benchmark_rejected_purchase(c: &mut Criterion) {
    let (bazaar, listings) = create_market(100);

    c.bench_function("rejected_purchase_rollback", |b| {
        b.iter(|| {
            // Underpaid: rejected after the draft is built
            black_box(bazaar.purchase_listing(buyer(), listings[0], 2, Pulse::ONE)).unwrap_err();
        });
    });
}

criterion_group!(
    benches,
    benchmark_listing_purchase,
    benchmark_history_growth,
    benchmark_vendor_purchase,
    benchmark_rejected_purchase
);
criterion_main!(benches);
