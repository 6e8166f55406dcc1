//! # Bazaar Golden Path
//!
//! Replays the reference trades end to end against the shipped balance data:
//!
//! 1. **Partial fill** - 100 units at 1.0, buy 50 with 50.0
//! 2. **Full fill** - buy the remaining 50, listing closes
//! 3. **Stock cycle** - sell out a vendor, fail, restock lazily a day later
//! 4. **Crafting** - ore and coal into an ingot
//!
//! Then audits item and currency conservation and prints a summary.
//!
//! Run with: cargo run --package oroboros_bazaar --bin golden_path

use std::sync::Arc;
use std::time::Instant;

use alloy_primitives::Address;
use oroboros_bazaar::{
    AcceptAll, Bazaar, BazaarConfig, BazaarError, Collaborators, ManualClock, PauseFlag, Pulse, Role,
    RoleRegistry,
};

const IRON_ORE: u32 = 1;
const COAL: u32 = 2;
const IRON_INGOT: u32 = 3;
const HEALTH_POTION: u32 = 10;
const DAY: u64 = 86_400;

/// One line of the summary table.
struct Check {
    name: &'static str,
    expected: String,
    actual: String,
}

impl Check {
    fn new(name: &'static str, expected: impl ToString, actual: impl ToString) -> Self {
        Self {
            name,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    fn passed(&self) -> bool {
        self.expected == self.actual
    }
}

fn main() {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║           BAZAAR GOLDEN PATH                                     ║");
    println!("║           List → Buy → Fee → Restock → Craft                     ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let admin = Address::with_last_byte(0xAD);
    let server = Address::with_last_byte(0x5E);
    let operator = Address::with_last_byte(0x0F);
    let seller = Address::with_last_byte(0x51);
    let buyer = Address::with_last_byte(0xB1);

    let config = BazaarConfig::from_toml_str(include_str!("../../data/bazaar.toml"))
        .expect("Failed to load bazaar.toml");
    let roles = RoleRegistry::new()
        .with(Role::Administrator, admin)
        .with(Role::GameContract, server)
        .with(Role::Operator, operator);
    let clock = Arc::new(ManualClock::new(0));
    let bazaar = Bazaar::new(
        config,
        Collaborators::new(Arc::new(roles), Arc::new(PauseFlag::new()), clock.clone(), Arc::new(AcceptAll)),
    )
    .expect("Failed to create bazaar");

    let start = Instant::now();
    let mut checks = Vec::new();

    // =========================================================================
    // SETUP
    // =========================================================================
    bazaar.mint(server, seller, IRON_ORE, 100).expect("mint");
    bazaar.deposit(server, buyer, Pulse::from_whole(1_000)).expect("deposit");
    let listing = bazaar
        .create_listing(seller, IRON_ORE, 100, Pulse::ONE, 7 * DAY)
        .expect("create listing");

    // =========================================================================
    // SCENARIO A: partial fill
    // =========================================================================
    let receipt = bazaar
        .purchase_listing(buyer, listing, 50, Pulse::from_whole(50))
        .expect("first purchase");
    checks.push(Check::new("A: fee", "2.5", receipt.fee));
    checks.push(Check::new("A: seller receives", "47.5", bazaar.purse_balance(seller)));
    checks.push(Check::new("A: buyer units", 50, bazaar.balance_of(buyer, IRON_ORE)));
    checks.push(Check::new("A: remaining", 50, receipt.remaining_quantity));
    checks.push(Check::new("A: active", true, bazaar.listing(listing).is_some_and(|l| l.is_active())));

    // =========================================================================
    // SCENARIO B: full fill
    // =========================================================================
    let receipt = bazaar
        .purchase_listing(buyer, listing, 50, Pulse::from_whole(50))
        .expect("second purchase");
    checks.push(Check::new("B: fee", "2.5", receipt.fee));
    checks.push(Check::new("B: remaining", 0, receipt.remaining_quantity));
    checks.push(Check::new("B: active", false, bazaar.listing(listing).is_some_and(|l| l.is_active())));
    checks.push(Check::new("B: seller listings", 0, bazaar.active_listing_count(seller)));

    // =========================================================================
    // SCENARIO C: vendor stock cycle
    // =========================================================================
    bazaar.register_vendor(admin, 1, DAY).expect("register vendor");
    bazaar
        .add_vendor_item(admin, 1, HEALTH_POTION, Pulse::from_whole(2), 10)
        .expect("add vendor item");
    bazaar
        .purchase_from_vendor(buyer, 1, HEALTH_POTION, 10, Pulse::from_whole(20))
        .expect("sell out");
    clock.set(1);
    let sold_out = bazaar.purchase_from_vendor(buyer, 1, HEALTH_POTION, 1, Pulse::from_whole(2));
    checks.push(Check::new(
        "C: sold out at t=1",
        true,
        matches!(sold_out, Err(BazaarError::StateConflict(_))),
    ));
    clock.set(DAY + 1);
    let receipt = bazaar
        .purchase_from_vendor(buyer, 1, HEALTH_POTION, 1, Pulse::from_whole(2))
        .expect("restocked purchase");
    checks.push(Check::new("C: restocked", true, receipt.restocked));
    checks.push(Check::new("C: stock left", 9, receipt.remaining_stock));

    // =========================================================================
    // CRAFTING
    // =========================================================================
    bazaar.mint(server, buyer, COAL, 1).expect("mint coal");
    bazaar.craft(server, buyer, 1, 1).expect("craft ingot");
    checks.push(Check::new("Craft: ingot", 1, bazaar.balance_of(buyer, IRON_INGOT)));
    checks.push(Check::new("Craft: ore left", 97, bazaar.balance_of(buyer, IRON_ORE)));

    // =========================================================================
    // CONSERVATION
    // =========================================================================
    let balanced = bazaar.currency_audit().is_ok_and(|audit| audit.is_balanced());
    checks.push(Check::new("Currency balanced", true, balanced));
    checks.push(Check::new(
        "Ore conserved",
        bazaar.total_supply(IRON_ORE),
        bazaar.sum_of_balances(IRON_ORE),
    ));
    checks.push(Check::new("Treasury pool", "27", bazaar.pooled_balance()));

    let elapsed = start.elapsed();
    let events = bazaar.drain_events();

    println!("┌─ RESULTS ────────────────────────────────────────────────────────┐");
    for check in &checks {
        println!(
            "│ {} {:<22} expected {:>8}  got {:>8}",
            if check.passed() { "✓" } else { "✗" },
            check.name,
            check.expected,
            check.actual
        );
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("┌─ SUMMARY ────────────────────────────────────────────────────────┐");
    println!("│ Events published:   {}", events.len());
    println!("│ Wall time:          {:.3} ms", elapsed.as_secs_f64() * 1000.0);
    println!("└──────────────────────────────────────────────────────────────────┘");

    if checks.iter().all(Check::passed) {
        println!();
        println!("✅ GOLDEN PATH PASSED");
        std::process::exit(0);
    } else {
        println!();
        println!("❌ GOLDEN PATH FAILED");
        std::process::exit(1);
    }
}
