//! # NPC Vendors
//!
//! Fixed-price stock that refills on a cycle.
//!
//! There is no timer. Restocking is a pure function of the stored state and
//! the current time, evaluated when someone asks:
//!
//! - explicitly, through [`Vendors::restock`], once the cycle has elapsed;
//!   only the kinds named by the operator are refilled
//! - implicitly, at the start of [`Vendors::purchase`], if the cycle has
//!   elapsed
//!
//! The implicit restock refills the vendor's whole catalog, not just the
//! kind being bought. Each [`Vendor`] records the kinds it sells in
//! `kinds` for this purpose. An explicit restock naming a subset still
//! restarts the cycle for every line.
//!
//! Vendors never escrow. A sale mints fresh units to the buyer.

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::Address;

use crate::error::{BazaarError, BazaarResult};
use crate::events::{BazaarEvent, CollectionSource, EventLog};
use crate::ledger::{ItemKind, ItemLedger, Quantity};
use crate::pulse::Pulse;
use crate::treasury::Settlement;

/// Vendor identifier, chosen by the administrator.
pub type VendorId = u32;

/// An NPC shop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vendor {
    /// Identifier.
    pub id: VendorId,
    /// Seconds between restocks.
    pub restock_cycle: u64,
    /// Time of the last restock (registration counts as one).
    pub last_restock_at: u64,
    /// Kinds this vendor sells, in the order they were added.
    pub kinds: Vec<ItemKind>,
}

impl Vendor {
    /// True once a full cycle has passed since the last restock.
    #[inline]
    #[must_use]
    pub const fn cycle_elapsed(&self, now: u64) -> bool {
        now >= self.last_restock_at.saturating_add(self.restock_cycle)
    }
}

/// One line of a vendor's catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VendorItem {
    /// Owning vendor.
    pub vendor_id: VendorId,
    /// Item kind.
    pub kind: ItemKind,
    /// Price per unit.
    pub unit_price: Pulse,
    /// Units left this cycle. Never above `max_stock`.
    pub current_stock: Quantity,
    /// Units available after a restock.
    pub max_stock: Quantity,
}

/// Outcome of a vendor sale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VendorReceipt {
    /// Units minted to the buyer.
    pub quantity: Quantity,
    /// Collected into the treasury.
    pub total_price: Pulse,
    /// Overpayment returned to the buyer.
    pub refund: Pulse,
    /// Stock left afterwards.
    pub remaining_stock: Quantity,
    /// True if the purchase triggered a restock first.
    pub restocked: bool,
}

/// Every registered vendor and its catalog.
#[derive(Clone, Debug, Default)]
pub struct Vendors {
    vendors: BTreeMap<VendorId, Vendor>,
    items: HashMap<(VendorId, ItemKind), VendorItem>,
}

impl Vendors {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a vendor.
    #[must_use]
    pub fn vendor(&self, id: VendorId) -> Option<&Vendor> {
        self.vendors.get(&id)
    }

    /// Looks up a catalog line.
    #[must_use]
    pub fn item(&self, vendor_id: VendorId, kind: ItemKind) -> Option<&VendorItem> {
        self.items.get(&(vendor_id, kind))
    }

    /// Registers a vendor whose first cycle starts at `now`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` for a duplicate id; `InvalidArgument` for a zero cycle.
    pub fn register(&mut self, id: VendorId, restock_cycle: u64, now: u64, log: &mut EventLog) -> BazaarResult<()> {
        if self.vendors.contains_key(&id) {
            return Err(BazaarError::exists("vendor", id));
        }
        if restock_cycle == 0 {
            return Err(BazaarError::invalid("restock cycle must be positive"));
        }
        self.vendors.insert(
            id,
            Vendor {
                id,
                restock_cycle,
                last_restock_at: now,
                kinds: Vec::new(),
            },
        );
        log.emit(BazaarEvent::VendorRegistered { vendor_id: id, restock_cycle });
        Ok(())
    }

    /// Adds an item to a vendor's catalog, fully stocked.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown vendor or item kind
    /// - `AlreadyExists` if the vendor already sells `kind`
    /// - `InvalidArgument` for a zero price or zero maximum stock
    pub fn add_item(
        &mut self,
        ledger: &ItemLedger,
        vendor_id: VendorId,
        kind: ItemKind,
        unit_price: Pulse,
        max_stock: Quantity,
        log: &mut EventLog,
    ) -> BazaarResult<()> {
        let vendor = self
            .vendors
            .get_mut(&vendor_id)
            .ok_or_else(|| BazaarError::not_found("vendor", vendor_id))?;
        if self.items.contains_key(&(vendor_id, kind)) {
            return Err(BazaarError::exists("vendor item", format!("{vendor_id}/{kind}")));
        }
        if unit_price.is_zero() {
            return Err(BazaarError::invalid("unit price must be positive"));
        }
        if max_stock == 0 {
            return Err(BazaarError::invalid("max stock must be positive"));
        }
        ledger.require_kind(kind)?;

        vendor.kinds.push(kind);
        self.items.insert(
            (vendor_id, kind),
            VendorItem {
                vendor_id,
                kind,
                unit_price,
                current_stock: max_stock,
                max_stock,
            },
        );
        log.emit(BazaarEvent::VendorItemAdded { vendor_id, kind, unit_price, max_stock });
        Ok(())
    }

    /// Refills the listed kinds once the cycle has elapsed.
    ///
    /// Kinds the vendor does not sell are skipped. Returns the kinds that
    /// were reset.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown vendor
    /// - `InvalidArgument` for an empty list
    /// - `StateConflict` if the cycle has not elapsed
    pub fn restock(
        &mut self,
        vendor_id: VendorId,
        kinds: &[ItemKind],
        now: u64,
        log: &mut EventLog,
    ) -> BazaarResult<Vec<ItemKind>> {
        let vendor = self
            .vendors
            .get(&vendor_id)
            .ok_or_else(|| BazaarError::not_found("vendor", vendor_id))?;
        if kinds.is_empty() {
            return Err(BazaarError::invalid("restock needs at least one item kind"));
        }
        if !vendor.cycle_elapsed(now) {
            return Err(BazaarError::conflict(format!(
                "vendor {vendor_id} restocks at {}, now is {now}",
                vendor.last_restock_at.saturating_add(vendor.restock_cycle)
            )));
        }
        Ok(self.reset(vendor_id, kinds, now, log))
    }

    /// Sells `quantity` units of `kind`, restocking first if due.
    ///
    /// `payment` is taken from the buyer's purse; the price goes to the
    /// treasury and any overpayment is refunded.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown vendor or an item it does not sell
    /// - `InvalidArgument` for zero quantity
    /// - `StateConflict` if the stock is short
    /// - `InsufficientFunds` if `payment` or the buyer's purse is short
    #[allow(clippy::too_many_arguments)]
    pub fn purchase(
        &mut self,
        books: &mut Settlement<'_>,
        vendor_id: VendorId,
        buyer: Address,
        kind: ItemKind,
        quantity: Quantity,
        payment: Pulse,
        now: u64,
    ) -> BazaarResult<VendorReceipt> {
        let vendor = self
            .vendors
            .get(&vendor_id)
            .ok_or_else(|| BazaarError::not_found("vendor", vendor_id))?;
        if !self.items.contains_key(&(vendor_id, kind)) {
            return Err(BazaarError::not_found("vendor item", format!("{vendor_id}/{kind}")));
        }

        let restocked = vendor.cycle_elapsed(now);
        if restocked {
            // Whole catalog, not only `kind`
            let all = vendor.kinds.clone();
            self.reset(vendor_id, &all, now, books.log);
            tracing::debug!("Vendor {} restocked on purchase at {}", vendor_id, now);
        }

        if quantity == 0 {
            return Err(BazaarError::invalid("purchase quantity must be positive"));
        }
        if buyer.is_zero() {
            return Err(BazaarError::invalid("buyer must not be the null address"));
        }
        let item = self
            .items
            .get_mut(&(vendor_id, kind))
            .ok_or_else(|| BazaarError::not_found("vendor item", format!("{vendor_id}/{kind}")))?;
        if quantity > item.current_stock {
            return Err(BazaarError::conflict(format!(
                "vendor {vendor_id} has {} of item {kind}, requested {quantity}",
                item.current_stock
            )));
        }
        let total_price = item.unit_price.safe_mul_int(quantity)?;
        if payment < total_price {
            return Err(BazaarError::InsufficientFunds { required: total_price, available: payment });
        }
        let refund = payment.safe_sub(total_price)?;

        item.current_stock -= quantity;
        let remaining_stock = item.current_stock;

        books.purses.debit(buyer, payment)?;
        books.treasury.collect(total_price, CollectionSource::VendorSale, books.log)?;
        books.purses.pay(buyer, refund, books.payouts)?;
        books.ledger.mint(buyer, kind, quantity, books.log)?;

        books.log.emit(BazaarEvent::VendorSale {
            vendor_id,
            buyer,
            kind,
            quantity,
            total_price,
        });
        Ok(VendorReceipt {
            quantity,
            total_price,
            refund,
            remaining_stock,
            restocked,
        })
    }

    /// Starts a new cycle at `now` and refills the known kinds among `kinds`.
    fn reset(&mut self, vendor_id: VendorId, kinds: &[ItemKind], now: u64, log: &mut EventLog) -> Vec<ItemKind> {
        if let Some(vendor) = self.vendors.get_mut(&vendor_id) {
            vendor.last_restock_at = now;
        }
        let mut reset = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            if let Some(item) = self.items.get_mut(&(vendor_id, kind)) {
                item.current_stock = item.max_stock;
                if !reset.contains(&kind) {
                    reset.push(kind);
                }
            }
        }
        log.emit(BazaarEvent::VendorStockReset {
            vendor_id,
            kinds: reset.clone(),
            at: now,
        });
        reset
    }
}
