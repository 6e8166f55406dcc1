//! # Bazaar Events
//!
//! Observable records for off-system indexers and UI. The engine never reads
//! them back as control input.
//!
//! Events raised during an operation are buffered in an [`EventLog`] and only
//! published (journal, event buffer, logs) once the operation commits.

use alloy_primitives::Address;

use crate::auction::ListingId;
use crate::crafting::RecipeId;
use crate::ledger::{ItemKind, Quantity};
use crate::pulse::Pulse;
use crate::vendor::VendorId;

/// What a ledger mutation did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerOperation {
    /// Units created for `holder`.
    Mint,
    /// Units destroyed from `holder`.
    Burn,
    /// Units moved from `holder` to `to`.
    Transfer {
        /// Receiving holder.
        to: Address,
    },
}

/// `{operation, holder, kind, qty}` record of one ledger mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerRecord {
    /// Mutation type.
    pub operation: LedgerOperation,
    /// Holder credited (mint) or debited (burn, transfer).
    pub holder: Address,
    /// Item kind.
    pub kind: ItemKind,
    /// Units affected.
    pub quantity: Quantity,
}

/// Provenance of a treasury inflow.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CollectionSource {
    /// Auction house sale fee.
    MarketplaceFee,
    /// NPC vendor sale.
    VendorSale,
    /// Any other game system (quest fees, repair costs, ...).
    External(String),
}

/// Purpose of a treasury outflow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisbursementReason {
    /// Gameplay reward paid by the game server.
    Reward(String),
    /// Administrative withdrawal.
    Withdrawal,
}

/// Events emitted by the bazaar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BazaarEvent {
    /// An item kind was added to the catalog.
    ItemKindRegistered {
        /// New kind.
        kind: ItemKind,
    },
    /// A ledger balance changed.
    Ledger(LedgerRecord),
    /// Currency entered the economy.
    CurrencyDeposited {
        /// Credited purse.
        account: Address,
        /// Amount.
        amount: Pulse,
    },
    /// Treasury inflow.
    FeeCollected {
        /// Amount collected.
        amount: Pulse,
        /// Where it came from.
        source: CollectionSource,
    },
    /// Treasury outflow.
    FundsDisbursed {
        /// Paid account.
        recipient: Address,
        /// Amount paid.
        amount: Pulse,
        /// Why.
        reason: DisbursementReason,
    },
    /// Items escrowed for sale.
    ListingCreated {
        /// New listing.
        listing_id: ListingId,
        /// Seller.
        seller: Address,
        /// Item kind.
        kind: ItemKind,
        /// Units escrowed.
        quantity: Quantity,
        /// Price per unit.
        unit_price: Pulse,
        /// Absolute expiry (seconds).
        expires_at: u64,
    },
    /// Units bought from a listing.
    ListingSold {
        /// Listing.
        listing_id: ListingId,
        /// Buyer.
        buyer: Address,
        /// Units bought.
        quantity: Quantity,
        /// Price of the units bought.
        total_price: Pulse,
        /// Marketplace fee taken from `total_price`.
        fee: Pulse,
    },
    /// A listing was withdrawn by its seller.
    ListingCancelled {
        /// Listing.
        listing_id: ListingId,
        /// Seller.
        seller: Address,
        /// Units returned from escrow.
        returned: Quantity,
    },
    /// A vendor was registered.
    VendorRegistered {
        /// Vendor.
        vendor_id: VendorId,
        /// Restock cycle (seconds).
        restock_cycle: u64,
    },
    /// A vendor started selling an item kind.
    VendorItemAdded {
        /// Vendor.
        vendor_id: VendorId,
        /// Item kind.
        kind: ItemKind,
        /// Price per unit.
        unit_price: Pulse,
        /// Stock ceiling.
        max_stock: Quantity,
    },
    /// Vendor stock was reset to its maximum.
    VendorStockReset {
        /// Vendor.
        vendor_id: VendorId,
        /// Kinds that were reset.
        kinds: Vec<ItemKind>,
        /// Restock time.
        at: u64,
    },
    /// Units bought from a vendor.
    VendorSale {
        /// Vendor.
        vendor_id: VendorId,
        /// Buyer.
        buyer: Address,
        /// Item kind.
        kind: ItemKind,
        /// Units bought.
        quantity: Quantity,
        /// Price paid into the treasury.
        total_price: Pulse,
    },
    /// A recipe was added to the workshop.
    RecipeAdded {
        /// Recipe.
        recipe_id: RecipeId,
    },
    /// A recipe was crafted.
    ItemCrafted {
        /// Crafting holder.
        crafter: Address,
        /// Recipe used.
        recipe_id: RecipeId,
        /// How many times it was applied.
        times: u32,
    },
}

impl BazaarEvent {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ItemKindRegistered { .. } => "item_kind_registered",
            Self::Ledger(record) => match record.operation {
                LedgerOperation::Mint => "item_minted",
                LedgerOperation::Burn => "item_burned",
                LedgerOperation::Transfer { .. } => "item_transferred",
            },
            Self::CurrencyDeposited { .. } => "currency_deposited",
            Self::FeeCollected { .. } => "fee_collected",
            Self::FundsDisbursed { .. } => "funds_disbursed",
            Self::ListingCreated { .. } => "listing_created",
            Self::ListingSold { .. } => "listing_sold",
            Self::ListingCancelled { .. } => "listing_cancelled",
            Self::VendorRegistered { .. } => "vendor_registered",
            Self::VendorItemAdded { .. } => "vendor_item_added",
            Self::VendorStockReset { .. } => "vendor_stock_reset",
            Self::VendorSale { .. } => "vendor_sale",
            Self::RecipeAdded { .. } => "recipe_added",
            Self::ItemCrafted { .. } => "item_crafted",
        }
    }
}

/// Events raised by one in-flight operation.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<BazaarEvent>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event.
    pub fn emit(&mut self, event: BazaarEvent) {
        self.events.push(event);
    }

    /// Events recorded so far, in order.
    #[must_use]
    pub fn events(&self) -> &[BazaarEvent] {
        &self.events
    }

    /// Consumes the log.
    #[must_use]
    pub fn into_events(self) -> Vec<BazaarEvent> {
        self.events
    }
}
