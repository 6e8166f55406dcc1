//! # Auction House
//!
//! Fixed-price listings backed by escrow.
//!
//! ## Lifecycle
//!
//! ```text
//! Created --purchase--> PartiallyFilled --purchase--> Filled
//!    |                        |
//!    +--------cancel----------+--------> Cancelled
//! ```
//!
//! While a listing is open the ledger holds its remaining units in the
//! escrow account, so the seller cannot spend them twice. Expiry is checked
//! lazily: an expired listing rejects purchases but keeps its escrow until
//! the seller cancels it.
//!
//! ## Fees
//!
//! `fee = max(floor(total / fee_divisor), min_fee)`, computed on raw
//! 18-decimal units. The seller receives `total - fee`.

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{BazaarError, BazaarResult, Denial};
use crate::events::{BazaarEvent, CollectionSource, EventLog};
use crate::ledger::{ItemKind, ItemLedger, Quantity};
use crate::pulse::Pulse;
use crate::treasury::Settlement;

/// Unique, monotonic listing identifier. Never reused.
pub type ListingId = u64;

/// Thirty days in seconds.
pub const MAX_LISTING_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Auction house tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionConfig {
    /// Fee is `total / fee_divisor` (20 means 5%).
    pub fee_divisor: u64,
    /// Lower bound on the fee.
    pub min_fee: Pulse,
    /// Cap on open listings per seller.
    pub max_active_listings: u32,
    /// Longest allowed listing duration.
    pub max_listing_duration_secs: u64,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            fee_divisor: 20,
            // 0.001 PULSE
            min_fee: Pulse::from_raw(1_000_000_000_000_000),
            max_active_listings: 50,
            max_listing_duration_secs: MAX_LISTING_DURATION_SECS,
        }
    }
}

impl AuctionConfig {
    /// Computes the marketplace fee for a sale of `total_price`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the divisor is zero.
    pub fn compute_fee(&self, total_price: Pulse) -> BazaarResult<Pulse> {
        let proportional = total_price
            .checked_div_int(u128::from(self.fee_divisor))
            .ok_or_else(|| BazaarError::invalid("fee divisor must be positive"))?;
        Ok(proportional.max(self.min_fee))
    }
}

/// Where a listing is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListingStatus {
    /// Open, possibly partially filled.
    Active,
    /// Every unit was sold.
    Filled,
    /// Withdrawn by the seller.
    Cancelled,
}

/// A fixed-price offer of escrowed items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listing {
    /// Identifier.
    pub id: ListingId,
    /// Owner of the escrowed items.
    pub seller: Address,
    /// Item kind on offer.
    pub kind: ItemKind,
    /// Units originally escrowed.
    pub initial_quantity: Quantity,
    /// Units still for sale.
    pub remaining_quantity: Quantity,
    /// Price per unit.
    pub unit_price: Pulse,
    /// Creation time (seconds).
    pub created_at: u64,
    /// Purchases are rejected once `now > expires_at`.
    pub expires_at: u64,
    /// Lifecycle state.
    pub status: ListingStatus,
}

impl Listing {
    /// True while the listing holds escrow.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ListingStatus::Active
    }

    /// True once `now` is past the expiry.
    #[inline]
    #[must_use]
    pub const fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

/// Outcome of a successful purchase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurchaseReceipt {
    /// Listing bought from.
    pub listing_id: ListingId,
    /// Units received.
    pub quantity: Quantity,
    /// `unit_price * quantity`.
    pub total_price: Pulse,
    /// Routed to the treasury.
    pub fee: Pulse,
    /// Paid to the seller.
    pub seller_amount: Pulse,
    /// Overpayment returned to the buyer.
    pub refund: Pulse,
    /// Units still listed afterwards.
    pub remaining_quantity: Quantity,
}

/// The listing engine.
#[derive(Clone, Debug)]
pub struct AuctionHouse {
    config: AuctionConfig,
    escrow: Address,
    listings: BTreeMap<ListingId, Listing>,
    active_per_seller: HashMap<Address, u32>,
    next_id: ListingId,
}

impl AuctionHouse {
    /// Creates an auction house that escrows into `escrow`.
    #[must_use]
    pub fn new(config: AuctionConfig, escrow: Address) -> Self {
        Self {
            config,
            escrow,
            listings: BTreeMap::new(),
            active_per_seller: HashMap::new(),
            next_id: 1,
        }
    }

    /// The tuning in use.
    #[must_use]
    pub const fn config(&self) -> &AuctionConfig {
        &self.config
    }

    /// Ledger account holding escrowed items.
    #[must_use]
    pub const fn escrow_account(&self) -> Address {
        self.escrow
    }

    /// Looks up a listing.
    #[must_use]
    pub fn listing(&self, id: ListingId) -> Option<&Listing> {
        self.listings.get(&id)
    }

    /// Open listings of `seller`.
    #[must_use]
    pub fn active_listing_count(&self, seller: Address) -> u32 {
        self.active_per_seller.get(&seller).copied().unwrap_or(0)
    }

    /// Listings that are still active, in id order.
    pub fn active_listings(&self) -> impl Iterator<Item = &Listing> {
        self.listings.values().filter(|l| l.is_active())
    }

    /// Escrows `quantity` units and opens a listing.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for zero quantity, zero price, or a duration that
    ///   is zero or longer than the configured maximum
    /// - `NotFound` for an unregistered kind
    /// - `StateConflict` for a kind that cannot be traded, or a seller at the
    ///   listing cap
    /// - `InsufficientBalance` if the seller owns fewer units
    #[allow(clippy::too_many_arguments)]
    pub fn create_listing(
        &mut self,
        ledger: &mut ItemLedger,
        seller: Address,
        kind: ItemKind,
        quantity: Quantity,
        unit_price: Pulse,
        duration_secs: u64,
        now: u64,
        log: &mut EventLog,
    ) -> BazaarResult<ListingId> {
        if quantity == 0 {
            return Err(BazaarError::invalid("listing quantity must be positive"));
        }
        if unit_price.is_zero() {
            return Err(BazaarError::invalid("unit price must be positive"));
        }
        if duration_secs == 0 || duration_secs > self.config.max_listing_duration_secs {
            return Err(BazaarError::invalid(format!(
                "duration must be between 1 and {} seconds, got {duration_secs}",
                self.config.max_listing_duration_secs
            )));
        }
        if seller == self.escrow {
            return Err(BazaarError::invalid("the escrow account cannot list items"));
        }
        if !ledger.require_kind(kind)?.flag_set().is_marketable() {
            return Err(BazaarError::conflict(format!("item {kind} is not tradeable")));
        }
        let open = self.active_listing_count(seller);
        if open >= self.config.max_active_listings {
            return Err(BazaarError::conflict(format!(
                "seller has {open} active listings, the limit is {}",
                self.config.max_active_listings
            )));
        }
        let expires_at = now.checked_add(duration_secs).ok_or(BazaarError::ArithmeticOverflow)?;
        // Total value must be representable for every partial fill
        unit_price.safe_mul_int(quantity)?;

        ledger.transfer(seller, self.escrow, kind, quantity, log)?;

        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(BazaarError::ArithmeticOverflow)?;
        self.listings.insert(
            id,
            Listing {
                id,
                seller,
                kind,
                initial_quantity: quantity,
                remaining_quantity: quantity,
                unit_price,
                created_at: now,
                expires_at,
                status: ListingStatus::Active,
            },
        );
        *self.active_per_seller.entry(seller).or_insert(0) += 1;

        log.emit(BazaarEvent::ListingCreated {
            listing_id: id,
            seller,
            kind,
            quantity,
            unit_price,
            expires_at,
        });
        Ok(id)
    }

    /// Buys `quantity` units from a listing.
    ///
    /// `payment` is taken from the buyer's purse. In order: items leave
    /// escrow for the buyer, the seller is paid `total - fee`, the fee goes
    /// to the treasury and any overpayment is refunded.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown listing
    /// - `StateConflict` for an inactive or expired listing, or a self-trade
    /// - `InvalidArgument` for zero quantity, more than remains, or a
    ///   minimum fee larger than the price
    /// - `InsufficientFunds` if `payment` or the buyer's purse is short
    /// - `TransferFailed` if the seller refuses payment
    pub fn purchase(
        &mut self,
        books: &mut Settlement<'_>,
        listing_id: ListingId,
        buyer: Address,
        quantity: Quantity,
        payment: Pulse,
        now: u64,
    ) -> BazaarResult<PurchaseReceipt> {
        let listing = self
            .listings
            .get(&listing_id)
            .ok_or_else(|| BazaarError::not_found("listing", listing_id))?;

        if !listing.is_active() {
            return Err(BazaarError::conflict(format!("listing {listing_id} is not active")));
        }
        if listing.is_expired(now) {
            return Err(BazaarError::conflict(format!("listing {listing_id} expired at {}", listing.expires_at)));
        }
        if buyer == listing.seller {
            return Err(BazaarError::conflict("seller cannot buy their own listing"));
        }
        if buyer.is_zero() {
            return Err(BazaarError::invalid("buyer must not be the null address"));
        }
        if quantity == 0 || quantity > listing.remaining_quantity {
            return Err(BazaarError::invalid(format!(
                "quantity must be between 1 and {}, got {quantity}",
                listing.remaining_quantity
            )));
        }

        let total_price = listing.unit_price.safe_mul_int(quantity)?;
        if payment < total_price {
            return Err(BazaarError::InsufficientFunds { required: total_price, available: payment });
        }
        let fee = self.config.compute_fee(total_price)?;
        let seller_amount = total_price
            .checked_sub(fee)
            .ok_or_else(|| BazaarError::invalid(format!("minimum fee {fee} exceeds price {total_price}")))?;
        let refund = payment.safe_sub(total_price)?;
        let (seller, kind) = (listing.seller, listing.kind);

        books.purses.debit(buyer, payment)?;
        books.ledger.transfer(self.escrow, buyer, kind, quantity, books.log)?;
        books.purses.pay(seller, seller_amount, books.payouts)?;
        if !fee.is_zero() {
            books.treasury.collect(fee, CollectionSource::MarketplaceFee, books.log)?;
        }
        books.purses.pay(buyer, refund, books.payouts)?;

        let remaining_quantity = self.fill(listing_id, quantity);

        books.log.emit(BazaarEvent::ListingSold {
            listing_id,
            buyer,
            quantity,
            total_price,
            fee,
        });
        Ok(PurchaseReceipt {
            listing_id,
            quantity,
            total_price,
            fee,
            seller_amount,
            refund,
            remaining_quantity,
        })
    }

    /// Withdraws a listing and returns its escrow to the seller.
    ///
    /// Works on expired listings. Returns the units handed back.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown listing
    /// - `StateConflict` if the listing is not active
    /// - `Unauthorized` if `caller` is not the seller
    pub fn cancel_listing(
        &mut self,
        ledger: &mut ItemLedger,
        listing_id: ListingId,
        caller: Address,
        log: &mut EventLog,
    ) -> BazaarResult<Quantity> {
        let listing = self
            .listings
            .get_mut(&listing_id)
            .ok_or_else(|| BazaarError::not_found("listing", listing_id))?;

        if !listing.is_active() {
            return Err(BazaarError::conflict(format!("listing {listing_id} is not active")));
        }
        if caller != listing.seller {
            return Err(BazaarError::Unauthorized {
                caller,
                denial: Denial::NotOwner(format!("listing {listing_id}")),
            });
        }

        let returned = listing.remaining_quantity;
        let seller = listing.seller;
        ledger.transfer(self.escrow, seller, listing.kind, returned, log)?;

        listing.remaining_quantity = 0;
        listing.status = ListingStatus::Cancelled;
        self.release_slot(seller);

        log.emit(BazaarEvent::ListingCancelled { listing_id, seller, returned });
        Ok(returned)
    }

    /// Decrements the remaining quantity and closes the listing at zero.
    fn fill(&mut self, listing_id: ListingId, quantity: Quantity) -> Quantity {
        let Some(listing) = self.listings.get_mut(&listing_id) else {
            return 0;
        };
        listing.remaining_quantity -= quantity;
        let remaining = listing.remaining_quantity;
        if remaining == 0 {
            listing.status = ListingStatus::Filled;
            let seller = listing.seller;
            self.release_slot(seller);
        }
        remaining
    }

    fn release_slot(&mut self, seller: Address) {
        if let Some(count) = self.active_per_seller.get_mut(&seller) {
            *count = count.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AcceptAll;
    use crate::ledger::{ItemDefinition, ItemFlag};
    use crate::purse::Purses;
    use crate::treasury::Treasury;

    const GEM: ItemKind = 7;
    const BOUND: ItemKind = 8;
    const DAY: u64 = 86_400;

    fn seller() -> Address {
        Address::with_last_byte(0x51)
    }

    fn buyer() -> Address {
        Address::with_last_byte(0xB1)
    }

    fn escrow() -> Address {
        Address::with_last_byte(0xE5)
    }

    struct Fixture {
        ledger: ItemLedger,
        treasury: Treasury,
        purses: Purses,
        house: AuctionHouse,
        log: EventLog,
    }

    impl Fixture {
        fn new() -> Self {
            let mut ledger = ItemLedger::new();
            let mut log = EventLog::new();
            ledger.register_kind(ItemDefinition::new(GEM, "Gem", &[ItemFlag::Tradeable]), &mut log).unwrap();
            ledger.register_kind(ItemDefinition::new(BOUND, "Bound", &[ItemFlag::Tradeable, ItemFlag::Soulbound]), &mut log).unwrap();
            ledger.mint(seller(), GEM, 100, &mut log).unwrap();
            ledger.mint(seller(), BOUND, 1, &mut log).unwrap();

            let mut purses = Purses::new();
            purses.deposit(buyer(), Pulse::from_whole(1_000), &mut log).unwrap();

            Self {
                ledger,
                treasury: Treasury::new(),
                purses,
                house: AuctionHouse::new(AuctionConfig::default(), escrow()),
                log,
            }
        }

        fn list(&mut self, quantity: Quantity) -> BazaarResult<ListingId> {
            self.house.create_listing(&mut self.ledger, seller(), GEM, quantity, Pulse::ONE, 7 * DAY, 0, &mut self.log)
        }

        fn buy(&mut self, id: ListingId, quantity: Quantity, payment: Pulse, now: u64) -> BazaarResult<PurchaseReceipt> {
            let mut books = Settlement {
                ledger: &mut self.ledger,
                treasury: &mut self.treasury,
                purses: &mut self.purses,
                payouts: &AcceptAll,
                log: &mut self.log,
            };
            self.house.purchase(&mut books, id, buyer(), quantity, payment, now)
        }
    }

    #[test]
    fn test_fee_floor() {
        let config = AuctionConfig::default();
        assert_eq!(config.compute_fee(Pulse::from_whole(50)).unwrap(), Pulse::from_parts(2, 5, 1).unwrap());
        // 0.01 / 20 = 0.0005, below the 0.001 floor
        assert_eq!(config.compute_fee(Pulse::from_parts(0, 1, 2).unwrap()).unwrap(), config.min_fee);
    }

    #[test]
    fn test_create_escrows_items() {
        let mut fx = Fixture::new();
        let id = fx.list(100).unwrap();

        assert_eq!(id, 1);
        assert_eq!(fx.ledger.balance_of(seller(), GEM), 0);
        assert_eq!(fx.ledger.balance_of(escrow(), GEM), 100);
        assert_eq!(fx.house.active_listing_count(seller()), 1);
        assert_eq!(fx.house.listing(id).unwrap().expires_at, 7 * DAY);
    }

    #[test]
    fn test_create_validation() {
        let mut fx = Fixture::new();
        let max = fx.house.config().max_listing_duration_secs;
        let ledger = &mut fx.ledger;
        let log = &mut fx.log;

        let cases = [
            (GEM, 0, Pulse::ONE, DAY),
            (GEM, 1, Pulse::ZERO, DAY),
            (GEM, 1, Pulse::ONE, 0),
            (GEM, 1, Pulse::ONE, max + 1),
        ];
        for (kind, qty, price, duration) in cases {
            let result = fx.house.create_listing(ledger, seller(), kind, qty, price, duration, 0, log);
            assert!(matches!(result, Err(BazaarError::InvalidArgument(_))), "{result:?}");
        }

        let result = fx.house.create_listing(ledger, seller(), BOUND, 1, Pulse::ONE, DAY, 0, log);
        assert!(matches!(result, Err(BazaarError::StateConflict(_))));

        let result = fx.house.create_listing(ledger, seller(), GEM, 101, Pulse::ONE, DAY, 0, log);
        assert!(matches!(result, Err(BazaarError::InsufficientBalance { .. })));
    }

    #[test]
    fn test_listing_cap() {
        let mut fx = Fixture::new();
        let cap = fx.house.config().max_active_listings;
        for _ in 0..cap {
            fx.list(1).unwrap();
        }
        assert!(matches!(fx.list(1), Err(BazaarError::StateConflict(_))));

        // Cancelling frees a slot
        fx.house.cancel_listing(&mut fx.ledger, 1, seller(), &mut fx.log).unwrap();
        fx.list(1).unwrap();
    }

    #[test]
    fn test_partial_then_full_fill() {
        let mut fx = Fixture::new();
        let id = fx.list(100).unwrap();

        let receipt = fx.buy(id, 50, Pulse::from_whole(50), DAY).unwrap();
        assert_eq!(receipt.fee, Pulse::from_parts(2, 5, 1).unwrap());
        assert_eq!(receipt.seller_amount, Pulse::from_parts(47, 5, 1).unwrap());
        assert_eq!(receipt.remaining_quantity, 50);
        assert!(fx.house.listing(id).unwrap().is_active());

        fx.buy(id, 50, Pulse::from_whole(50), DAY).unwrap();
        let listing = fx.house.listing(id).unwrap();
        assert_eq!(listing.status, ListingStatus::Filled);
        assert_eq!(fx.house.active_listing_count(seller()), 0);
        assert_eq!(fx.ledger.balance_of(buyer(), GEM), 100);
        assert_eq!(fx.purses.balance_of(seller()), Pulse::from_whole(95));
        assert_eq!(fx.treasury.pooled_balance(), Pulse::from_whole(5));
    }

    #[test]
    fn test_overpayment_refunded() {
        let mut fx = Fixture::new();
        let id = fx.list(10).unwrap();

        let receipt = fx.buy(id, 2, Pulse::from_whole(5), 0).unwrap();
        assert_eq!(receipt.refund, Pulse::from_whole(3));
        assert_eq!(fx.purses.balance_of(buyer()), Pulse::from_whole(998));
    }

    #[test]
    fn test_purchase_rejections() {
        let mut fx = Fixture::new();
        let id = fx.list(10).unwrap();

        assert!(matches!(fx.buy(id, 0, Pulse::ONE, 0), Err(BazaarError::InvalidArgument(_))));
        assert!(matches!(fx.buy(id, 11, Pulse::from_whole(11), 0), Err(BazaarError::InvalidArgument(_))));
        assert!(matches!(fx.buy(id, 2, Pulse::ONE, 0), Err(BazaarError::InsufficientFunds { .. })));
        assert!(matches!(fx.buy(id, 1, Pulse::ONE, 7 * DAY + 1), Err(BazaarError::StateConflict(_))));
        assert!(matches!(fx.buy(99, 1, Pulse::ONE, 0), Err(BazaarError::NotFound { .. })));

        // Exactly at expiry is still open
        fx.buy(id, 1, Pulse::ONE, 7 * DAY).unwrap();
    }

    #[test]
    fn test_self_trade_rejected() {
        let mut fx = Fixture::new();
        let id = fx.list(10).unwrap();
        let mut books = Settlement {
            ledger: &mut fx.ledger,
            treasury: &mut fx.treasury,
            purses: &mut fx.purses,
            payouts: &AcceptAll,
            log: &mut fx.log,
        };
        let result = fx.house.purchase(&mut books, id, seller(), 1, Pulse::ONE, 0);
        assert!(matches!(result, Err(BazaarError::StateConflict(_))));
    }

    #[test]
    fn test_cancel() {
        let mut fx = Fixture::new();
        let id = fx.list(10).unwrap();
        fx.buy(id, 4, Pulse::from_whole(4), 0).unwrap();

        let result = fx.house.cancel_listing(&mut fx.ledger, id, buyer(), &mut fx.log);
        assert_eq!(
            result,
            Err(BazaarError::Unauthorized {
                caller: buyer(),
                denial: Denial::NotOwner(format!("listing {id}")),
            })
        );
        assert_eq!(fx.ledger.balance_of(escrow(), GEM), 6);

        let returned = fx.house.cancel_listing(&mut fx.ledger, id, seller(), &mut fx.log).unwrap();
        assert_eq!(returned, 6);
        assert_eq!(fx.ledger.balance_of(seller(), GEM), 96);
        assert_eq!(fx.ledger.balance_of(escrow(), GEM), 0);
        assert_eq!(fx.house.active_listing_count(seller()), 0);

        let again = fx.house.cancel_listing(&mut fx.ledger, id, seller(), &mut fx.log);
        assert!(matches!(again, Err(BazaarError::StateConflict(_))));
    }

    #[test]
    fn test_expired_listing_cancellable() {
        let mut fx = Fixture::new();
        let id = fx.list(10).unwrap();
        assert!(fx.buy(id, 1, Pulse::ONE, 30 * DAY).is_err());
        assert_eq!(fx.house.cancel_listing(&mut fx.ledger, id, seller(), &mut fx.log).unwrap(), 10);
    }
}
