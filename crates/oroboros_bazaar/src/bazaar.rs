//! # The Bazaar
//!
//! **The single entry point of the economy**
//!
//! Every public operation runs as one indivisible unit:
//!
//! 1. The pause switch and the caller's role are checked
//! 2. The operation runs against a draft of the economy
//! 3. Its events are written to the journal (when one is configured)
//! 4. The draft replaces the live state and the events are published
//!
//! Any error in steps 2 or 3 discards the draft. Callers only ever see
//! fully applied or fully rejected operations, and all operations are
//! serialized by one lock.
//!
//! The draft shares every component with the live state and copies one
//! only when the operation first writes to it. A vendor sale never copies
//! the listing book and a listing trade never copies the vendors or the
//! recipe graph.
//!
//! The escrow account belongs to the auction house. Ledger calls that name
//! it as a holder are rejected, so open listings stay fully backed.

use std::sync::Arc;

use alloy_primitives::Address;
use parking_lot::Mutex;

use crate::access::{AccessControl, Clock, PauseSwitch, PayoutPolicy, Role};
use crate::auction::{AuctionHouse, Listing, ListingId, PurchaseReceipt};
use crate::config::BazaarConfig;
use crate::crafting::{CraftResult, Recipe, RecipeId, Workshop};
use crate::error::{BazaarError, BazaarResult, Denial};
use crate::events::{BazaarEvent, CollectionSource, DisbursementReason, EventLog};
use crate::journal::EventJournal;
use crate::ledger::{ItemDefinition, ItemKind, ItemLedger, Quantity, Supply};
use crate::pulse::Pulse;
use crate::purse::Purses;
use crate::treasury::{Settlement, Treasury};
use crate::vendor::{Vendor, VendorId, VendorItem, VendorReceipt, Vendors};

/// The external services the bazaar consults on every call.
#[derive(Clone)]
pub struct Collaborators {
    /// Role checks.
    pub access: Arc<dyn AccessControl>,
    /// Global pause switch.
    pub pause: Arc<dyn PauseSwitch>,
    /// Time source (seconds).
    pub clock: Arc<dyn Clock>,
    /// Payment hand-off oracle.
    pub payouts: Arc<dyn PayoutPolicy>,
}

impl Collaborators {
    /// Bundles the four collaborators.
    #[must_use]
    pub fn new(
        access: Arc<dyn AccessControl>,
        pause: Arc<dyn PauseSwitch>,
        clock: Arc<dyn Clock>,
        payouts: Arc<dyn PayoutPolicy>,
    ) -> Self {
        Self { access, pause, clock, payouts }
    }
}

/// Currency accounting snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrencyAudit {
    /// Everything ever deposited.
    pub total_deposited: Pulse,
    /// Sum of all purses.
    pub held_in_purses: Pulse,
    /// Treasury pool.
    pub pooled_in_treasury: Pulse,
}

impl CurrencyAudit {
    /// True if no currency was created or lost.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.held_in_purses.checked_add(self.pooled_in_treasury) == Some(self.total_deposited)
    }
}

/// Who may call an operation and whether the pause switch blocks it.
#[derive(Clone, Copy, Debug)]
struct Gate {
    role: Option<Role>,
    pausable: bool,
}

impl Gate {
    /// Any caller, blocked while paused.
    const PLAYER: Self = Self { role: None, pausable: true };

    /// Role holders, blocked while paused.
    const fn role(role: Role) -> Self {
        Self { role: Some(role), pausable: true }
    }

    /// Role holders, even while paused.
    const fn treasury(role: Role) -> Self {
        Self { role: Some(role), pausable: false }
    }
}

/// Everything an operation may change. Components are copied on first
/// write through [`Arc::make_mut`].
#[derive(Clone, Debug)]
struct BazaarState {
    ledger: Arc<ItemLedger>,
    treasury: Arc<Treasury>,
    purses: Arc<Purses>,
    auction: Arc<AuctionHouse>,
    vendors: Arc<Vendors>,
    workshop: Arc<Workshop>,
}

impl BazaarState {
    /// Rejects a ledger call that would move units in or out of escrow
    /// behind the auction house's back.
    fn guard_escrow(&self, account: Address) -> BazaarResult<()> {
        if account == self.auction.escrow_account() {
            return Err(BazaarError::invalid("the escrow account is managed by the auction house"));
        }
        Ok(())
    }
}

struct Core {
    state: BazaarState,
    journal: Option<EventJournal>,
    published: Vec<BazaarEvent>,
}

/// The marketplace and ledger engine.
pub struct Bazaar {
    collaborators: Collaborators,
    core: Mutex<Core>,
}

impl Bazaar {
    /// Builds a bazaar from a validated config.
    ///
    /// Installs the item catalog and recipes, and opens the journal when
    /// `journal.path` is set. Catalog events are published but not
    /// journaled.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for an invalid config or a cyclic recipe set;
    /// `Journal` if the journal cannot be opened.
    pub fn new(config: BazaarConfig, collaborators: Collaborators) -> BazaarResult<Self> {
        config.validate()?;

        let mut log = EventLog::new();
        let mut ledger = ItemLedger::new();
        for item in config.items {
            ledger.register_kind(item, &mut log)?;
        }
        let mut workshop = Workshop::new();
        for recipe in config.recipes {
            let id = recipe.id;
            workshop
                .add_recipe(recipe, &ledger, &mut log)
                .map_err(|e| BazaarError::InvalidConfig(format!("recipe {id}: {e}")))?;
        }

        let journal = match &config.journal.path {
            Some(path) => Some(EventJournal::open(path, config.journal.sync_on_commit)?),
            None => None,
        };

        tracing::info!(
            "Bazaar ready: {} item kinds, {} recipes, escrow {}",
            log.events().iter().filter(|e| matches!(e, BazaarEvent::ItemKindRegistered { .. })).count(),
            workshop.recipe_count(),
            config.escrow_account
        );

        Ok(Self {
            collaborators,
            core: Mutex::new(Core {
                state: BazaarState {
                    ledger: Arc::new(ledger),
                    treasury: Arc::new(Treasury::new()),
                    purses: Arc::new(Purses::new()),
                    auction: Arc::new(AuctionHouse::new(config.auction, config.escrow_account)),
                    vendors: Arc::new(Vendors::new()),
                    workshop: Arc::new(workshop),
                },
                journal,
                published: log.into_events(),
            }),
        })
    }

    // ========================================================================
    // Execution unit
    // ========================================================================

    /// Runs `body` as one all-or-nothing operation.
    fn execute<T>(
        &self,
        operation: &'static str,
        caller: Address,
        gate: Gate,
        body: impl FnOnce(&mut BazaarState, &mut EventLog, u64) -> BazaarResult<T>,
    ) -> BazaarResult<T> {
        let mut core = self.core.lock();

        let result = self.authorize(caller, gate).and_then(|()| {
            let now = self.collaborators.clock.now();
            let mut draft = core.state.clone();
            let mut log = EventLog::new();
            let value = body(&mut draft, &mut log, now)?;
            if let Some(journal) = core.journal.as_mut() {
                journal.append(log.events())?;
            }
            Ok((value, draft, log))
        });

        match result {
            Ok((value, draft, log)) => {
                core.state = draft;
                let events = log.into_events();
                tracing::info!("{} committed by {} ({} events)", operation, caller, events.len());
                core.published.extend(events);
                Ok(value)
            }
            Err(e) => {
                tracing::warn!("{} rejected for {}: {}", operation, caller, e);
                Err(e)
            }
        }
    }

    fn authorize(&self, caller: Address, gate: Gate) -> BazaarResult<()> {
        if gate.pausable && self.collaborators.pause.is_paused() {
            return Err(BazaarError::SystemPaused);
        }
        if let Some(role) = gate.role {
            if !self.collaborators.access.has_role(caller, role) {
                return Err(BazaarError::Unauthorized { caller, denial: Denial::MissingRole(role) });
            }
        }
        Ok(())
    }

    /// Runs a read against the live state.
    fn read<T>(&self, f: impl FnOnce(&BazaarState) -> T) -> T {
        f(&self.core.lock().state)
    }

    /// Takes every event published since the last drain, in commit order.
    pub fn drain_events(&self) -> Vec<BazaarEvent> {
        std::mem::take(&mut self.core.lock().published)
    }

    // ========================================================================
    // Item ledger
    // ========================================================================

    /// Adds an item kind to the catalog. Requires `Administrator`.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, `Unauthorized`, `AlreadyExists`, `InvalidArgument`.
    pub fn register_item_kind(&self, caller: Address, definition: ItemDefinition) -> BazaarResult<()> {
        self.execute("register_item_kind", caller, Gate::role(Role::Administrator), |s, log, _| {
            Arc::make_mut(&mut s.ledger).register_kind(definition, log)
        })
    }

    /// Mints items. Requires `GameContract`.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, `Unauthorized`, `InvalidArgument` if `holder` is the
    /// escrow account, plus [`ItemLedger::mint`] errors.
    pub fn mint(&self, caller: Address, holder: Address, kind: ItemKind, quantity: Quantity) -> BazaarResult<()> {
        self.execute("mint", caller, Gate::role(Role::GameContract), |s, log, _| {
            s.guard_escrow(holder)?;
            Arc::make_mut(&mut s.ledger).mint(holder, kind, quantity, log)
        })
    }

    /// Mints several kinds at once. Requires `GameContract`.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, `Unauthorized`, `InvalidArgument` if `holder` is the
    /// escrow account, plus [`ItemLedger::mint_batch`] errors.
    pub fn mint_batch(
        &self,
        caller: Address,
        holder: Address,
        kinds: &[ItemKind],
        quantities: &[Quantity],
    ) -> BazaarResult<()> {
        self.execute("mint_batch", caller, Gate::role(Role::GameContract), |s, log, _| {
            s.guard_escrow(holder)?;
            Arc::make_mut(&mut s.ledger).mint_batch(holder, kinds, quantities, log)
        })
    }

    /// Burns items. Requires `GameContract`.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, `Unauthorized`, `InvalidArgument` if `holder` is the
    /// escrow account, plus [`ItemLedger::burn`] errors.
    pub fn burn(&self, caller: Address, holder: Address, kind: ItemKind, quantity: Quantity) -> BazaarResult<()> {
        self.execute("burn", caller, Gate::role(Role::GameContract), |s, log, _| {
            s.guard_escrow(holder)?;
            Arc::make_mut(&mut s.ledger).burn(holder, kind, quantity, log)
        })
    }

    /// Burns several kinds at once. Requires `GameContract`.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, `Unauthorized`, `InvalidArgument` if `holder` is the
    /// escrow account, plus [`ItemLedger::burn_batch`] errors.
    pub fn burn_batch(
        &self,
        caller: Address,
        holder: Address,
        kinds: &[ItemKind],
        quantities: &[Quantity],
    ) -> BazaarResult<()> {
        self.execute("burn_batch", caller, Gate::role(Role::GameContract), |s, log, _| {
            s.guard_escrow(holder)?;
            Arc::make_mut(&mut s.ledger).burn_batch(holder, kinds, quantities, log)
        })
    }

    /// Moves items between holders. Requires `GameContract`.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, `Unauthorized`, `InvalidArgument` if either side is
    /// the escrow account, plus [`ItemLedger::transfer`] errors.
    pub fn transfer(
        &self,
        caller: Address,
        from: Address,
        to: Address,
        kind: ItemKind,
        quantity: Quantity,
    ) -> BazaarResult<()> {
        self.execute("transfer", caller, Gate::role(Role::GameContract), |s, log, _| {
            s.guard_escrow(from)?;
            s.guard_escrow(to)?;
            Arc::make_mut(&mut s.ledger).transfer(from, to, kind, quantity, log)
        })
    }

    // ========================================================================
    // Currency and treasury (not pausable)
    // ========================================================================

    /// Credits currency entering the economy. Requires `GameContract`.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, plus [`Purses::deposit`] errors.
    pub fn deposit(&self, caller: Address, account: Address, amount: Pulse) -> BazaarResult<()> {
        self.execute("deposit", caller, Gate::treasury(Role::GameContract), |s, log, _| {
            Arc::make_mut(&mut s.purses).deposit(account, amount, log)
        })
    }

    /// Records an inflow from another game system, paid out of `caller`'s
    /// purse. Requires `GameContract`.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `InsufficientFunds`, plus [`Treasury::collect`] errors.
    pub fn collect(&self, caller: Address, amount: Pulse, source: &str) -> BazaarResult<()> {
        let source = CollectionSource::External(source.to_owned());
        self.execute("collect", caller, Gate::treasury(Role::GameContract), |s, log, _| {
            Arc::make_mut(&mut s.purses).debit(caller, amount)?;
            Arc::make_mut(&mut s.treasury).collect(amount, source, log)
        })
    }

    /// Pays a gameplay reward from the treasury. Requires `GameContract`.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, plus [`Treasury::disburse`] errors.
    pub fn disburse_reward(&self, caller: Address, recipient: Address, amount: Pulse, reason: &str) -> BazaarResult<()> {
        let reason = DisbursementReason::Reward(reason.to_owned());
        let payouts = &*self.collaborators.payouts;
        self.execute("disburse_reward", caller, Gate::treasury(Role::GameContract), |s, log, _| {
            let purses = Arc::make_mut(&mut s.purses);
            Arc::make_mut(&mut s.treasury).disburse(recipient, amount, reason, purses, payouts, log)
        })
    }

    /// Administrative withdrawal from the treasury. Requires `Administrator`.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, plus [`Treasury::disburse`] errors.
    pub fn withdraw(&self, caller: Address, recipient: Address, amount: Pulse) -> BazaarResult<()> {
        let payouts = &*self.collaborators.payouts;
        self.execute("withdraw", caller, Gate::treasury(Role::Administrator), |s, log, _| {
            let purses = Arc::make_mut(&mut s.purses);
            Arc::make_mut(&mut s.treasury).disburse(recipient, amount, DisbursementReason::Withdrawal, purses, payouts, log)
        })
    }

    // ========================================================================
    // Auction house
    // ========================================================================

    /// Escrows items and opens a listing for `seller`.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, plus [`AuctionHouse::create_listing`] errors.
    pub fn create_listing(
        &self,
        seller: Address,
        kind: ItemKind,
        quantity: Quantity,
        unit_price: Pulse,
        duration_secs: u64,
    ) -> BazaarResult<ListingId> {
        self.execute("create_listing", seller, Gate::PLAYER, |s, log, now| {
            let ledger = Arc::make_mut(&mut s.ledger);
            Arc::make_mut(&mut s.auction).create_listing(ledger, seller, kind, quantity, unit_price, duration_secs, now, log)
        })
    }

    /// Buys from a listing, paying `payment` out of `buyer`'s purse.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, plus [`AuctionHouse::purchase`] errors.
    pub fn purchase_listing(
        &self,
        buyer: Address,
        listing_id: ListingId,
        quantity: Quantity,
        payment: Pulse,
    ) -> BazaarResult<PurchaseReceipt> {
        let payouts = &*self.collaborators.payouts;
        self.execute("purchase_listing", buyer, Gate::PLAYER, |s, log, now| {
            let BazaarState { ledger, treasury, purses, auction, .. } = s;
            let mut books = Settlement {
                ledger: Arc::make_mut(ledger),
                treasury: Arc::make_mut(treasury),
                purses: Arc::make_mut(purses),
                payouts,
                log,
            };
            Arc::make_mut(auction).purchase(&mut books, listing_id, buyer, quantity, payment, now)
        })
    }

    /// Cancels `caller`'s listing and returns its escrow.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, plus [`AuctionHouse::cancel_listing`] errors.
    pub fn cancel_listing(&self, caller: Address, listing_id: ListingId) -> BazaarResult<Quantity> {
        self.execute("cancel_listing", caller, Gate::PLAYER, |s, log, _| {
            let ledger = Arc::make_mut(&mut s.ledger);
            Arc::make_mut(&mut s.auction).cancel_listing(ledger, listing_id, caller, log)
        })
    }

    // ========================================================================
    // Vendors
    // ========================================================================

    /// Registers a vendor. Requires `Administrator`.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, `Unauthorized`, plus [`Vendors::register`] errors.
    pub fn register_vendor(&self, caller: Address, vendor_id: VendorId, restock_cycle: u64) -> BazaarResult<()> {
        self.execute("register_vendor", caller, Gate::role(Role::Administrator), |s, log, now| {
            Arc::make_mut(&mut s.vendors).register(vendor_id, restock_cycle, now, log)
        })
    }

    /// Adds an item to a vendor. Requires `Administrator`.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, `Unauthorized`, plus [`Vendors::add_item`] errors.
    pub fn add_vendor_item(
        &self,
        caller: Address,
        vendor_id: VendorId,
        kind: ItemKind,
        unit_price: Pulse,
        max_stock: Quantity,
    ) -> BazaarResult<()> {
        self.execute("add_vendor_item", caller, Gate::role(Role::Administrator), |s, log, _| {
            Arc::make_mut(&mut s.vendors).add_item(&s.ledger, vendor_id, kind, unit_price, max_stock, log)
        })
    }

    /// Refills the listed kinds of a vendor. Requires `Operator`.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, `Unauthorized`, plus [`Vendors::restock`] errors.
    pub fn restock(&self, caller: Address, vendor_id: VendorId, kinds: &[ItemKind]) -> BazaarResult<Vec<ItemKind>> {
        self.execute("restock", caller, Gate::role(Role::Operator), |s, log, now| {
            Arc::make_mut(&mut s.vendors).restock(vendor_id, kinds, now, log)
        })
    }

    /// Buys from a vendor, paying `payment` out of `buyer`'s purse.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, plus [`Vendors::purchase`] errors.
    pub fn purchase_from_vendor(
        &self,
        buyer: Address,
        vendor_id: VendorId,
        kind: ItemKind,
        quantity: Quantity,
        payment: Pulse,
    ) -> BazaarResult<VendorReceipt> {
        let payouts = &*self.collaborators.payouts;
        self.execute("purchase_from_vendor", buyer, Gate::PLAYER, |s, log, now| {
            let BazaarState { ledger, treasury, purses, vendors, .. } = s;
            let mut books = Settlement {
                ledger: Arc::make_mut(ledger),
                treasury: Arc::make_mut(treasury),
                purses: Arc::make_mut(purses),
                payouts,
                log,
            };
            Arc::make_mut(vendors).purchase(&mut books, vendor_id, buyer, kind, quantity, payment, now)
        })
    }

    // ========================================================================
    // Workshop
    // ========================================================================

    /// Adds a crafting recipe. Requires `Administrator`.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, `Unauthorized`, plus [`Workshop::add_recipe`] errors.
    pub fn add_recipe(&self, caller: Address, recipe: Recipe) -> BazaarResult<()> {
        self.execute("add_recipe", caller, Gate::role(Role::Administrator), |s, log, _| {
            Arc::make_mut(&mut s.workshop).add_recipe(recipe, &s.ledger, log)
        })
    }

    /// Crafts a recipe for `crafter`. Requires `GameContract`.
    ///
    /// # Errors
    ///
    /// `SystemPaused`, `Unauthorized`, `InvalidArgument` if `crafter` is
    /// the escrow account, plus [`Workshop::craft`] errors.
    pub fn craft(&self, caller: Address, crafter: Address, recipe_id: RecipeId, times: u32) -> BazaarResult<CraftResult> {
        self.execute("craft", caller, Gate::role(Role::GameContract), |s, log, _| {
            s.guard_escrow(crafter)?;
            s.workshop.craft(Arc::make_mut(&mut s.ledger), crafter, recipe_id, times, log)
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Item balance of `holder`.
    #[must_use]
    pub fn balance_of(&self, holder: Address, kind: ItemKind) -> Quantity {
        self.read(|s| s.ledger.balance_of(holder, kind))
    }

    /// Units of `kind` in existence.
    #[must_use]
    pub fn total_supply(&self, kind: ItemKind) -> Quantity {
        self.read(|s| s.ledger.supply(kind).outstanding())
    }

    /// Mint and burn counters of `kind`.
    #[must_use]
    pub fn supply(&self, kind: ItemKind) -> Supply {
        self.read(|s| s.ledger.supply(kind))
    }

    /// Sum of every holder's balance of `kind`.
    #[must_use]
    pub fn sum_of_balances(&self, kind: ItemKind) -> Quantity {
        self.read(|s| s.ledger.sum_of_balances(kind))
    }

    /// Catalog entry of `kind`.
    #[must_use]
    pub fn item_definition(&self, kind: ItemKind) -> Option<ItemDefinition> {
        self.read(|s| s.ledger.definition(kind).cloned())
    }

    /// A listing by id.
    #[must_use]
    pub fn listing(&self, id: ListingId) -> Option<Listing> {
        self.read(|s| s.auction.listing(id).cloned())
    }

    /// Every listing that can still be bought or cancelled, by id.
    #[must_use]
    pub fn active_listings(&self) -> Vec<Listing> {
        self.read(|s| s.auction.active_listings().cloned().collect())
    }

    /// Open listings of `seller`.
    #[must_use]
    pub fn active_listing_count(&self, seller: Address) -> u32 {
        self.read(|s| s.auction.active_listing_count(seller))
    }

    /// Ledger account holding auction escrow.
    #[must_use]
    pub fn escrow_account(&self) -> Address {
        self.read(|s| s.auction.escrow_account())
    }

    /// A vendor by id.
    #[must_use]
    pub fn vendor(&self, id: VendorId) -> Option<Vendor> {
        self.read(|s| s.vendors.vendor(id).cloned())
    }

    /// A vendor's catalog line. Shows stored stock; a due restock only
    /// happens on the next purchase or explicit restock.
    #[must_use]
    pub fn vendor_item(&self, vendor_id: VendorId, kind: ItemKind) -> Option<VendorItem> {
        self.read(|s| s.vendors.item(vendor_id, kind).copied())
    }

    /// A recipe by id.
    #[must_use]
    pub fn recipe(&self, id: RecipeId) -> Option<Recipe> {
        self.read(|s| s.workshop.recipe(id).cloned())
    }

    /// Treasury pool.
    #[must_use]
    pub fn pooled_balance(&self) -> Pulse {
        self.read(|s| s.treasury.pooled_balance())
    }

    /// Running total collected by the treasury.
    #[must_use]
    pub fn total_collected(&self) -> Pulse {
        self.read(|s| s.treasury.total_collected())
    }

    /// Running total paid out of the treasury.
    #[must_use]
    pub fn total_disbursed(&self) -> Pulse {
        self.read(|s| s.treasury.total_disbursed())
    }

    /// Running total collected from one source.
    #[must_use]
    pub fn collected_from(&self, source: &CollectionSource) -> Pulse {
        self.read(|s| s.treasury.collected_from(source))
    }

    /// Spendable currency of `account`.
    #[must_use]
    pub fn purse_balance(&self, account: Address) -> Pulse {
        self.read(|s| s.purses.balance_of(account))
    }

    /// Where all deposited currency currently sits.
    ///
    /// # Errors
    ///
    /// `ArithmeticOverflow` if the purses sum past the currency's range.
    pub fn currency_audit(&self) -> BazaarResult<CurrencyAudit> {
        self.read(|s| {
            Ok(CurrencyAudit {
                total_deposited: s.purses.total_deposited(),
                held_in_purses: s.purses.total_held()?,
                pooled_in_treasury: s.treasury.pooled_balance(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AcceptAll, ManualClock, PauseFlag, RefusingRecipients, RoleRegistry};
    use crate::ledger::ItemFlag;

    const ORE: ItemKind = 1;

    fn admin() -> Address {
        Address::with_last_byte(0xAD)
    }

    fn server() -> Address {
        Address::with_last_byte(0x5E)
    }

    fn alice() -> Address {
        Address::with_last_byte(0xA1)
    }

    fn bob() -> Address {
        Address::with_last_byte(0xB0)
    }

    struct Harness {
        bazaar: Bazaar,
        pause: Arc<PauseFlag>,
        payouts: Arc<RefusingRecipients>,
    }

    fn create_test_bazaar() -> Harness {
        let roles = RoleRegistry::new()
            .with(Role::Administrator, admin())
            .with(Role::GameContract, server());
        let pause = Arc::new(PauseFlag::new());
        let payouts = Arc::new(RefusingRecipients::new());
        let collaborators = Collaborators::new(Arc::new(roles), pause.clone(), Arc::new(ManualClock::new(0)), payouts.clone());

        let mut config = BazaarConfig::default();
        config.items.push(ItemDefinition::new(ORE, "Ore", &[ItemFlag::Tradeable]));
        let bazaar = Bazaar::new(config, collaborators).unwrap();
        Harness { bazaar, pause, payouts }
    }

    #[test]
    fn test_roles_enforced() {
        let h = create_test_bazaar();
        let result = h.bazaar.mint(alice(), alice(), ORE, 1);
        assert_eq!(
            result,
            Err(BazaarError::Unauthorized { caller: alice(), denial: Denial::MissingRole(Role::GameContract) })
        );
        assert!(h.bazaar.register_vendor(server(), 1, 60).is_err());
        assert!(h.bazaar.withdraw(server(), server(), Pulse::ONE).is_err());
        assert_eq!(h.bazaar.balance_of(alice(), ORE), 0);
    }

    #[test]
    fn test_pause_blocks_mutations() {
        let h = create_test_bazaar();
        h.bazaar.mint(server(), alice(), ORE, 5).unwrap();
        h.pause.pause();

        assert_eq!(h.bazaar.mint(server(), alice(), ORE, 1), Err(BazaarError::SystemPaused));
        assert_eq!(h.bazaar.create_listing(alice(), ORE, 1, Pulse::ONE, 60), Err(BazaarError::SystemPaused));
        // Treasury and deposits keep working
        h.bazaar.deposit(server(), alice(), Pulse::ONE).unwrap();

        h.pause.unpause();
        h.bazaar.mint(server(), alice(), ORE, 1).unwrap();
        assert_eq!(h.bazaar.balance_of(alice(), ORE), 6);
    }

    #[test]
    fn test_refused_seller_payment_rolls_back() {
        let h = create_test_bazaar();
        h.bazaar.mint(server(), alice(), ORE, 10).unwrap();
        h.bazaar.deposit(server(), bob(), Pulse::from_whole(10)).unwrap();
        let id = h.bazaar.create_listing(alice(), ORE, 10, Pulse::ONE, 60).unwrap();
        h.bazaar.drain_events();

        h.payouts.refuse(alice());
        let result = h.bazaar.purchase_listing(bob(), id, 5, Pulse::from_whole(6));
        assert!(matches!(result, Err(BazaarError::TransferFailed { .. })));

        // Escrow, purses, treasury and listing untouched
        assert_eq!(h.bazaar.balance_of(bob(), ORE), 0);
        assert_eq!(h.bazaar.balance_of(h.bazaar.escrow_account(), ORE), 10);
        assert_eq!(h.bazaar.purse_balance(bob()), Pulse::from_whole(10));
        assert_eq!(h.bazaar.pooled_balance(), Pulse::ZERO);
        assert_eq!(h.bazaar.listing(id).unwrap().remaining_quantity, 10);
        assert!(h.bazaar.drain_events().is_empty());
    }

    #[test]
    fn test_events_published_on_commit() {
        let h = create_test_bazaar();
        let bootstrap = h.bazaar.drain_events();
        assert_eq!(bootstrap, vec![BazaarEvent::ItemKindRegistered { kind: ORE }]);

        h.bazaar.mint_batch(server(), alice(), &[ORE, ORE], &[1, 2]).unwrap();
        assert_eq!(h.bazaar.drain_events().len(), 2);
        assert!(h.bazaar.drain_events().is_empty());
    }

    #[test]
    fn test_treasury_flow() {
        let h = create_test_bazaar();
        h.bazaar.deposit(server(), server(), Pulse::from_whole(20)).unwrap();
        h.bazaar.collect(server(), Pulse::from_whole(20), "repair").unwrap();
        h.bazaar.disburse_reward(server(), alice(), Pulse::from_whole(5), "quest").unwrap();
        h.bazaar.withdraw(admin(), admin(), Pulse::from_whole(5)).unwrap();

        assert_eq!(h.bazaar.pooled_balance(), Pulse::from_whole(10));
        assert_eq!(h.bazaar.total_collected(), Pulse::from_whole(20));
        assert_eq!(h.bazaar.total_disbursed(), Pulse::from_whole(10));
        assert_eq!(h.bazaar.collected_from(&CollectionSource::External("repair".into())), Pulse::from_whole(20));
        assert_eq!(h.bazaar.collected_from(&CollectionSource::VendorSale), Pulse::ZERO);
        assert!(h.bazaar.currency_audit().unwrap().is_balanced());
    }

    #[test]
    fn test_untouched_components_are_shared() {
        let h = create_test_bazaar();
        h.bazaar.mint(server(), alice(), ORE, 10).unwrap();
        h.bazaar.create_listing(alice(), ORE, 5, Pulse::ONE, 60).unwrap();
        let before = h.bazaar.core.lock().state.clone();

        h.bazaar.deposit(server(), bob(), Pulse::ONE).unwrap();
        {
            let core = h.bazaar.core.lock();
            assert!(!Arc::ptr_eq(&before.purses, &core.state.purses));
            assert!(Arc::ptr_eq(&before.auction, &core.state.auction));
            assert!(Arc::ptr_eq(&before.ledger, &core.state.ledger));
            assert!(Arc::ptr_eq(&before.vendors, &core.state.vendors));
        }

        // A rejected trade leaves every component in place
        let before = h.bazaar.core.lock().state.clone();
        assert!(h.bazaar.purchase_listing(bob(), 1, 5, Pulse::ONE).is_err());
        let core = h.bazaar.core.lock();
        assert!(Arc::ptr_eq(&before.auction, &core.state.auction));
        assert!(Arc::ptr_eq(&before.ledger, &core.state.ledger));
        assert!(Arc::ptr_eq(&before.purses, &core.state.purses));
    }

    #[test]
    fn test_cyclic_config_rejected() {
        let mut config = BazaarConfig::default();
        config.items.push(ItemDefinition::new(1, "A", &[]));
        config.items.push(ItemDefinition::new(2, "B", &[]));
        config.recipes.push(Recipe::new(1, "A to B", vec![crate::crafting::RecipeItem::new(1, 1)], vec![crate::crafting::RecipeItem::new(2, 1)]).unwrap());
        config.recipes.push(Recipe::new(2, "B to A", vec![crate::crafting::RecipeItem::new(2, 1)], vec![crate::crafting::RecipeItem::new(1, 1)]).unwrap());

        let collaborators = Collaborators::new(
            Arc::new(RoleRegistry::new()),
            Arc::new(PauseFlag::new()),
            Arc::new(ManualClock::new(0)),
            Arc::new(AcceptAll),
        );
        assert!(matches!(Bazaar::new(config, collaborators), Err(BazaarError::InvalidConfig(_))));
    }
}
