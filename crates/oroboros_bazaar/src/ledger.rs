//! # Item Ledger
//!
//! The single source of truth for who owns which items.
//!
//! ## Guarantees
//!
//! 1. **Conservation**: for every kind, the sum of all balances equals
//!    cumulative mints minus cumulative burns
//! 2. **Atomic batches**: a batch either applies completely or not at all
//! 3. **Closed catalog**: only registered item kinds can be held
//!
//! The ledger does not check roles or the pause switch; the
//! [`Bazaar`](crate::Bazaar) facade does that before calling in.

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{BazaarError, BazaarResult};
use crate::events::{BazaarEvent, EventLog, LedgerOperation, LedgerRecord};

/// Unique identifier for an item kind.
pub type ItemKind = u32;

/// Number of units of an item kind.
pub type Quantity = u128;

/// A single item property, as written in config files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFlag {
    /// Can be listed on the auction house.
    Tradeable,
    /// Consumed on use.
    Consumable,
    /// Crafting material.
    Material,
    /// Equipment.
    Equipment,
    /// Bound to its holder; never listed.
    Soulbound,
}

/// Flags for item properties.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ItemFlags(u32);

impl ItemFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Item can be traded between players.
    pub const TRADEABLE: Self = Self(1 << 0);
    /// Item is consumed on use.
    pub const CONSUMABLE: Self = Self(1 << 1);
    /// Item is a crafting material.
    pub const MATERIAL: Self = Self(1 << 2);
    /// Item is equipment.
    pub const EQUIPMENT: Self = Self(1 << 3);
    /// Item is bound to player (non-transferable on the market).
    pub const SOULBOUND: Self = Self(1 << 4);

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Checks if a specific flag is set.
    #[inline]
    #[must_use]
    pub const fn has(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }

    /// Combines two flag sets.
    #[inline]
    #[must_use]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    /// True if the auction house may list this item.
    #[inline]
    #[must_use]
    pub const fn is_marketable(self) -> bool {
        self.has(Self::TRADEABLE) && !self.has(Self::SOULBOUND)
    }
}

impl From<ItemFlag> for ItemFlags {
    fn from(flag: ItemFlag) -> Self {
        match flag {
            ItemFlag::Tradeable => Self::TRADEABLE,
            ItemFlag::Consumable => Self::CONSUMABLE,
            ItemFlag::Material => Self::MATERIAL,
            ItemFlag::Equipment => Self::EQUIPMENT,
            ItemFlag::Soulbound => Self::SOULBOUND,
        }
    }
}

impl FromIterator<ItemFlag> for ItemFlags {
    fn from_iter<I: IntoIterator<Item = ItemFlag>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::NONE, |flags, flag| flags.with(flag.into()))
    }
}

/// An item kind in the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinition {
    /// Unique identifier.
    pub kind: ItemKind,
    /// Display name.
    pub name: String,
    /// Item properties.
    #[serde(default)]
    pub flags: Vec<ItemFlag>,
}

impl ItemDefinition {
    /// Creates a definition.
    #[must_use]
    pub fn new(kind: ItemKind, name: impl Into<String>, flags: &[ItemFlag]) -> Self {
        Self {
            kind,
            name: name.into(),
            flags: flags.to_vec(),
        }
    }

    /// Flags as a bit set.
    #[must_use]
    pub fn flag_set(&self) -> ItemFlags {
        self.flags.iter().copied().collect()
    }
}

/// Cumulative mint and burn counters for one kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Supply {
    /// Units ever minted.
    pub minted: Quantity,
    /// Units ever burned.
    pub burned: Quantity,
}

impl Supply {
    /// Units currently in existence.
    #[inline]
    #[must_use]
    pub const fn outstanding(&self) -> Quantity {
        self.minted - self.burned
    }
}

/// Balances of a fixed catalog of item kinds per holder.
#[derive(Clone, Debug, Default)]
pub struct ItemLedger {
    /// Registered kinds.
    catalog: HashMap<ItemKind, ItemDefinition>,
    /// Balance per (holder, kind). Missing entries are zero.
    balances: HashMap<(Address, ItemKind), Quantity>,
    /// Mint/burn counters per kind.
    supply: HashMap<ItemKind, Supply>,
}

impl ItemLedger {
    /// Creates an empty ledger with an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    /// Adds an item kind to the catalog.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the kind is registered; `InvalidArgument` for an
    /// empty name.
    pub fn register_kind(&mut self, definition: ItemDefinition, log: &mut EventLog) -> BazaarResult<()> {
        if definition.name.trim().is_empty() {
            return Err(BazaarError::invalid("item name must not be empty"));
        }
        if self.catalog.contains_key(&definition.kind) {
            return Err(BazaarError::exists("item kind", definition.kind));
        }
        let kind = definition.kind;
        self.catalog.insert(kind, definition);
        log.emit(BazaarEvent::ItemKindRegistered { kind });
        Ok(())
    }

    /// Looks up an item kind.
    #[must_use]
    pub fn definition(&self, kind: ItemKind) -> Option<&ItemDefinition> {
        self.catalog.get(&kind)
    }

    /// Looks up an item kind, failing with `NotFound`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the kind is not in the catalog.
    pub fn require_kind(&self, kind: ItemKind) -> BazaarResult<&ItemDefinition> {
        self.catalog
            .get(&kind)
            .ok_or_else(|| BazaarError::not_found("item kind", kind))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Balance of `holder` for `kind`.
    #[must_use]
    pub fn balance_of(&self, holder: Address, kind: ItemKind) -> Quantity {
        self.balances.get(&(holder, kind)).copied().unwrap_or(0)
    }

    /// Mint/burn counters for `kind`.
    #[must_use]
    pub fn supply(&self, kind: ItemKind) -> Supply {
        self.supply.get(&kind).copied().unwrap_or_default()
    }

    /// Sum of every holder's balance for `kind`.
    ///
    /// Always equals `supply(kind).outstanding()`.
    #[must_use]
    pub fn sum_of_balances(&self, kind: ItemKind) -> Quantity {
        self.balances
            .iter()
            .filter(|((_, k), _)| *k == kind)
            .map(|(_, qty)| *qty)
            .sum()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Creates `quantity` units of `kind` for `holder`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for zero quantity or the null holder
    /// - `NotFound` for an unregistered kind
    /// - `ArithmeticOverflow` if a counter would overflow
    pub fn mint(&mut self, holder: Address, kind: ItemKind, quantity: Quantity, log: &mut EventLog) -> BazaarResult<()> {
        self.mint_batch(holder, &[kind], &[quantity], log)
    }

    /// Creates several kinds for `holder` at once. All or nothing.
    ///
    /// # Errors
    ///
    /// As [`ItemLedger::mint`], plus `InvalidArgument` for empty or
    /// mismatched arrays.
    pub fn mint_batch(
        &mut self,
        holder: Address,
        kinds: &[ItemKind],
        quantities: &[Quantity],
        log: &mut EventLog,
    ) -> BazaarResult<()> {
        let totals = self.validate_batch(holder, kinds, quantities)?;

        // Check every counter before touching any of them
        for (&kind, &qty) in &totals {
            self.balance_of(holder, kind)
                .checked_add(qty)
                .ok_or(BazaarError::ArithmeticOverflow)?;
            self.supply(kind)
                .minted
                .checked_add(qty)
                .ok_or(BazaarError::ArithmeticOverflow)?;
        }

        for (&kind, &qty) in &totals {
            *self.balances.entry((holder, kind)).or_insert(0) += qty;
            self.supply.entry(kind).or_default().minted += qty;
        }

        for (&kind, &quantity) in kinds.iter().zip(quantities) {
            log.emit(BazaarEvent::Ledger(LedgerRecord {
                operation: LedgerOperation::Mint,
                holder,
                kind,
                quantity,
            }));
        }
        Ok(())
    }

    /// Destroys `quantity` units of `kind` held by `holder`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for zero quantity or the null holder
    /// - `NotFound` for an unregistered kind
    /// - `InsufficientBalance` if `holder` owns fewer units
    pub fn burn(&mut self, holder: Address, kind: ItemKind, quantity: Quantity, log: &mut EventLog) -> BazaarResult<()> {
        self.burn_batch(holder, &[kind], &[quantity], log)
    }

    /// Destroys several kinds held by `holder` at once. All or nothing.
    ///
    /// Repeated kinds are summed before the balance check.
    ///
    /// # Errors
    ///
    /// As [`ItemLedger::burn`], plus `InvalidArgument` for empty or
    /// mismatched arrays.
    pub fn burn_batch(
        &mut self,
        holder: Address,
        kinds: &[ItemKind],
        quantities: &[Quantity],
        log: &mut EventLog,
    ) -> BazaarResult<()> {
        let totals = self.validate_batch(holder, kinds, quantities)?;
        self.ensure_covers(holder, &totals)?;

        for (&kind, &qty) in &totals {
            self.debit(holder, kind, qty);
            self.supply.entry(kind).or_default().burned += qty;
        }

        for (&kind, &quantity) in kinds.iter().zip(quantities) {
            log.emit(BazaarEvent::Ledger(LedgerRecord {
                operation: LedgerOperation::Burn,
                holder,
                kind,
                quantity,
            }));
        }
        Ok(())
    }

    /// Moves `quantity` units of `kind` from `from` to `to`.
    ///
    /// Used for escrow, escrow release and direct game transfers.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for zero quantity or a null holder
    /// - `NotFound` for an unregistered kind
    /// - `InsufficientBalance` if `from` owns fewer units
    /// - `ArithmeticOverflow` if the receiving balance would overflow
    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        kind: ItemKind,
        quantity: Quantity,
        log: &mut EventLog,
    ) -> BazaarResult<()> {
        if to.is_zero() {
            return Err(BazaarError::invalid("transfer to the null address"));
        }
        let totals = self.validate_batch(from, &[kind], &[quantity])?;
        self.ensure_covers(from, &totals)?;

        if from != to {
            self.balance_of(to, kind)
                .checked_add(quantity)
                .ok_or(BazaarError::ArithmeticOverflow)?;
            self.debit(from, kind, quantity);
            *self.balances.entry((to, kind)).or_insert(0) += quantity;
        }

        log.emit(BazaarEvent::Ledger(LedgerRecord {
            operation: LedgerOperation::Transfer { to },
            holder: from,
            kind,
            quantity,
        }));
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Validates a batch and sums quantities per kind.
    fn validate_batch(
        &self,
        holder: Address,
        kinds: &[ItemKind],
        quantities: &[Quantity],
    ) -> BazaarResult<BTreeMap<ItemKind, Quantity>> {
        if holder.is_zero() {
            return Err(BazaarError::invalid("holder must not be the null address"));
        }
        if kinds.is_empty() {
            return Err(BazaarError::invalid("batch must not be empty"));
        }
        if kinds.len() != quantities.len() {
            return Err(BazaarError::invalid(format!(
                "batch length mismatch: {} kinds, {} quantities",
                kinds.len(),
                quantities.len()
            )));
        }

        let mut totals = BTreeMap::new();
        for (&kind, &qty) in kinds.iter().zip(quantities) {
            if qty == 0 {
                return Err(BazaarError::invalid(format!("zero quantity for item {kind}")));
            }
            self.require_kind(kind)?;
            let total: &mut Quantity = totals.entry(kind).or_insert(0);
            *total = total.checked_add(qty).ok_or(BazaarError::ArithmeticOverflow)?;
        }
        Ok(totals)
    }

    /// Fails unless `holder` owns every amount in `totals`.
    fn ensure_covers(&self, holder: Address, totals: &BTreeMap<ItemKind, Quantity>) -> BazaarResult<()> {
        for (&kind, &required) in totals {
            let available = self.balance_of(holder, kind);
            if available < required {
                return Err(BazaarError::InsufficientBalance {
                    holder,
                    kind,
                    required,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Subtracts a checked amount. Callers verify coverage first.
    fn debit(&mut self, holder: Address, kind: ItemKind, quantity: Quantity) {
        if let Some(balance) = self.balances.get_mut(&(holder, kind)) {
            *balance -= quantity;
        }
    }
}
