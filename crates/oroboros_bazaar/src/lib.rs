//! # OROBOROS Bazaar
//!
//! The marketplace and ledger engine of the OROBOROS economy.
//!
//! ## Components
//!
//! - **Item Ledger** - who owns which items; atomic mint/burn/transfer batches
//! - **Treasury** - pooled PULSE from fees and vendor sales; rewards and withdrawals
//! - **Auction House** - escrowed fixed-price listings with expiry and a fee split
//! - **Vendors** - NPC stock on a restock cycle, refilled lazily
//! - **Workshop** - crafting recipes on top of the ledger
//!
//! ## Design Principles
//!
//! 1. **All-or-nothing** - every public operation commits completely or not at all
//! 2. **Zero floating point** - all money is 18-decimal fixed point ([`Pulse`])
//! 3. **No timers** - expiry and restocking are evaluated when touched
//! 4. **Injected authority** - roles, pause, clock and payouts are traits
//!
//! ## Example
//!
//! ```rust,ignore
//! use oroboros_bazaar::{Bazaar, BazaarConfig, Collaborators, Pulse};
//!
//! let config = BazaarConfig::from_file("data/bazaar.toml")?;
//! let bazaar = Bazaar::new(config, collaborators)?;
//!
//! bazaar.mint(game_server, seller, IRON_ORE, 100)?;
//! let listing = bazaar.create_listing(seller, IRON_ORE, 100, Pulse::ONE, 7 * 86_400)?;
//! let receipt = bazaar.purchase_listing(buyer, listing, 50, Pulse::from_whole(50))?;
//! assert_eq!(receipt.fee.to_string(), "2.5");
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod access;
pub mod auction;
pub mod bazaar;
pub mod config;
pub mod crafting;
pub mod error;
pub mod events;
pub mod journal;
pub mod ledger;
pub mod pulse;
pub mod purse;
pub mod treasury;
pub mod vendor;

pub use access::{
    AcceptAll, AccessControl, Clock, ManualClock, PauseFlag, PauseSwitch, PayoutPolicy, RefusingRecipients,
    Role, RoleRegistry, SystemClock,
};
pub use auction::{AuctionConfig, AuctionHouse, Listing, ListingId, ListingStatus, PurchaseReceipt};
pub use bazaar::{Bazaar, Collaborators, CurrencyAudit};
pub use config::{BazaarConfig, JournalConfig};
pub use crafting::{CraftResult, Recipe, RecipeId, RecipeItem, Workshop};
pub use error::{BazaarError, BazaarResult, Denial};
pub use events::{BazaarEvent, CollectionSource, DisbursementReason, EventLog, LedgerOperation, LedgerRecord};
pub use journal::{EventJournal, JournalEntry};
pub use ledger::{ItemDefinition, ItemFlag, ItemFlags, ItemKind, ItemLedger, Quantity, Supply};
pub use pulse::Pulse;
pub use purse::Purses;
pub use treasury::{Settlement, Treasury};
pub use vendor::{Vendor, VendorId, VendorItem, VendorReceipt, Vendors};
