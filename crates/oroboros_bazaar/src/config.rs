//! # Bazaar Configuration
//!
//! Loaded once at startup from a TOML file. All balance data (fees, caps,
//! the item catalog, recipes) lives in config, never in code.
//!
//! ```toml
//! escrow_account = "0x000000000000000000000000000000000000e5c0"
//!
//! [auction]
//! fee_divisor = 20
//! min_fee = "0.001"
//!
//! [[items]]
//! kind = 1
//! name = "Iron Ore"
//! flags = ["tradeable", "material"]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::auction::AuctionConfig;
use crate::crafting::Recipe;
use crate::error::{BazaarError, BazaarResult};
use crate::ledger::ItemDefinition;

/// Event journal settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Journal file. No journal is kept when unset.
    pub path: Option<PathBuf>,
    /// `fsync` after every committed operation.
    pub sync_on_commit: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: None,
            sync_on_commit: true,
        }
    }
}

/// Everything the bazaar needs at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BazaarConfig {
    /// Ledger account that holds auction escrow.
    pub escrow_account: Address,
    /// Auction house tuning.
    pub auction: AuctionConfig,
    /// Event journal.
    pub journal: JournalConfig,
    /// Initial item catalog.
    pub items: Vec<ItemDefinition>,
    /// Initial crafting recipes.
    pub recipes: Vec<Recipe>,
}

impl Default for BazaarConfig {
    fn default() -> Self {
        Self {
            escrow_account: default_escrow_account(),
            auction: AuctionConfig::default(),
            journal: JournalConfig::default(),
            items: Vec::new(),
            recipes: Vec::new(),
        }
    }
}

/// `0x...e5c0`, clear of every externally owned account range.
fn default_escrow_account() -> Address {
    let mut bytes = [0u8; 20];
    bytes[18] = 0xe5;
    bytes[19] = 0xc0;
    Address::new(bytes)
}

impl BazaarConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for malformed TOML or a failed [`validate`](Self::validate).
    pub fn from_toml_str(content: &str) -> BazaarResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BazaarError::InvalidConfig(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> BazaarResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BazaarError::InvalidConfig(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Serializes back to TOML.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if serialization fails.
    pub fn to_toml_string(&self) -> BazaarResult<String> {
        toml::to_string_pretty(self).map_err(|e| BazaarError::InvalidConfig(format!("Failed to write config: {e}")))
    }

    /// Checks values that would break the engine at runtime.
    ///
    /// Recipe cycles are detected when the recipes are installed.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> BazaarResult<()> {
        if self.escrow_account.is_zero() {
            return Err(BazaarError::InvalidConfig("escrow_account must not be the null address".into()));
        }
        if self.auction.fee_divisor == 0 {
            return Err(BazaarError::InvalidConfig("auction.fee_divisor must be positive".into()));
        }
        if self.auction.max_active_listings == 0 {
            return Err(BazaarError::InvalidConfig("auction.max_active_listings must be positive".into()));
        }
        if self.auction.max_listing_duration_secs == 0 {
            return Err(BazaarError::InvalidConfig("auction.max_listing_duration_secs must be positive".into()));
        }

        let mut kinds = HashSet::new();
        for item in &self.items {
            if !kinds.insert(item.kind) {
                return Err(BazaarError::InvalidConfig(format!("duplicate item kind {}", item.kind)));
            }
            if item.name.trim().is_empty() {
                return Err(BazaarError::InvalidConfig(format!("item {} has no name", item.kind)));
            }
        }

        let mut recipe_ids = HashSet::new();
        for recipe in &self.recipes {
            if !recipe_ids.insert(recipe.id) {
                return Err(BazaarError::InvalidConfig(format!("duplicate recipe id {}", recipe.id)));
            }
            if let Some(line) = recipe
                .inputs
                .iter()
                .chain(&recipe.outputs)
                .find(|line| !kinds.contains(&line.item))
            {
                return Err(BazaarError::InvalidConfig(format!(
                    "recipe {} references unknown item {}",
                    recipe.id, line.item
                )));
            }
        }
        Ok(())
    }
}
