//! # Treasury
//!
//! A single pooled PULSE balance. Marketplace fees and vendor sales flow in,
//! rewards and administrative withdrawals flow out.
//!
//! `pooled_balance` never goes negative and `total_collected` never
//! decreases.

use std::collections::HashMap;

use alloy_primitives::Address;

use crate::access::PayoutPolicy;
use crate::error::{BazaarError, BazaarResult};
use crate::events::{BazaarEvent, CollectionSource, DisbursementReason, EventLog};
use crate::ledger::ItemLedger;
use crate::pulse::Pulse;
use crate::purse::Purses;

/// The pooled currency account.
#[derive(Clone, Debug, Default)]
pub struct Treasury {
    pooled_balance: Pulse,
    total_collected: Pulse,
    total_disbursed: Pulse,
    by_source: HashMap<CollectionSource, Pulse>,
}

impl Treasury {
    /// Creates an empty treasury.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently available funds.
    #[must_use]
    pub const fn pooled_balance(&self) -> Pulse {
        self.pooled_balance
    }

    /// Running total of every collection.
    #[must_use]
    pub const fn total_collected(&self) -> Pulse {
        self.total_collected
    }

    /// Running total of every disbursement.
    #[must_use]
    pub const fn total_disbursed(&self) -> Pulse {
        self.total_disbursed
    }

    /// Running total collected from one source.
    #[must_use]
    pub fn collected_from(&self, source: &CollectionSource) -> Pulse {
        self.by_source.get(source).copied().unwrap_or(Pulse::ZERO)
    }

    /// Credits the pool.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero amount; `ArithmeticOverflow` if a
    /// counter would overflow.
    pub fn collect(&mut self, amount: Pulse, source: CollectionSource, log: &mut EventLog) -> BazaarResult<()> {
        if amount.is_zero() {
            return Err(BazaarError::invalid("collected amount must be positive"));
        }
        let pooled = self.pooled_balance.safe_add(amount)?;
        let collected = self.total_collected.safe_add(amount)?;
        let per_source = self.collected_from(&source).safe_add(amount)?;

        self.pooled_balance = pooled;
        self.total_collected = collected;
        self.by_source.insert(source.clone(), per_source);

        log.emit(BazaarEvent::FeeCollected { amount, source });
        Ok(())
    }

    /// Pays `amount` out of the pool into `recipient`'s purse.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for the null recipient or a zero amount
    /// - `InsufficientFunds` if the pool holds less than `amount`
    /// - `TransferFailed` if the recipient refuses; nothing changes
    pub fn disburse(
        &mut self,
        recipient: Address,
        amount: Pulse,
        reason: DisbursementReason,
        purses: &mut Purses,
        payouts: &dyn PayoutPolicy,
        log: &mut EventLog,
    ) -> BazaarResult<()> {
        if recipient.is_zero() {
            return Err(BazaarError::invalid("disbursement to the null address"));
        }
        if amount.is_zero() {
            return Err(BazaarError::invalid("disbursed amount must be positive"));
        }
        let remaining = self
            .pooled_balance
            .checked_sub(amount)
            .ok_or(BazaarError::InsufficientFunds {
                required: amount,
                available: self.pooled_balance,
            })?;
        let disbursed = self.total_disbursed.safe_add(amount)?;

        purses.pay(recipient, amount, payouts)?;
        self.pooled_balance = remaining;
        self.total_disbursed = disbursed;

        log.emit(BazaarEvent::FundsDisbursed { recipient, amount, reason });
        Ok(())
    }
}

/// Mutable view of everything a trade settles against.
///
/// The auction house and vendors receive one of these per operation so a
/// trade can move items and currency in one step.
pub struct Settlement<'a> {
    /// Item balances.
    pub ledger: &'a mut ItemLedger,
    /// Pooled fees.
    pub treasury: &'a mut Treasury,
    /// Spendable currency.
    pub purses: &'a mut Purses,
    /// Payment hand-off oracle.
    pub payouts: &'a dyn PayoutPolicy,
    /// Events of the current operation.
    pub log: &'a mut EventLog,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AcceptAll, RefusingRecipients};

    #[test]
    fn test_collect() {
        let mut treasury = Treasury::new();
        let mut log = EventLog::new();

        treasury.collect(Pulse::from_whole(2), CollectionSource::MarketplaceFee, &mut log).unwrap();
        treasury.collect(Pulse::from_whole(5), CollectionSource::VendorSale, &mut log).unwrap();

        assert_eq!(treasury.pooled_balance(), Pulse::from_whole(7));
        assert_eq!(treasury.total_collected(), Pulse::from_whole(7));
        assert_eq!(treasury.collected_from(&CollectionSource::VendorSale), Pulse::from_whole(5));
        assert!(treasury.collect(Pulse::ZERO, CollectionSource::VendorSale, &mut log).is_err());
    }

    #[test]
    fn test_disburse() {
        let player = Address::with_last_byte(3);
        let mut treasury = Treasury::new();
        let mut purses = Purses::new();
        let mut log = EventLog::new();
        treasury.collect(Pulse::from_whole(10), CollectionSource::MarketplaceFee, &mut log).unwrap();

        treasury
            .disburse(player, Pulse::from_whole(4), DisbursementReason::Reward("quest".into()), &mut purses, &AcceptAll, &mut log)
            .unwrap();

        assert_eq!(treasury.pooled_balance(), Pulse::from_whole(6));
        assert_eq!(treasury.total_collected(), Pulse::from_whole(10));
        assert_eq!(purses.balance_of(player), Pulse::from_whole(4));
    }

    #[test]
    fn test_disburse_overdraw() {
        let mut treasury = Treasury::new();
        let mut purses = Purses::new();
        let mut log = EventLog::new();

        let result = treasury.disburse(
            Address::with_last_byte(1),
            Pulse::ONE,
            DisbursementReason::Withdrawal,
            &mut purses,
            &AcceptAll,
            &mut log,
        );
        assert_eq!(
            result,
            Err(BazaarError::InsufficientFunds { required: Pulse::ONE, available: Pulse::ZERO })
        );
    }

    #[test]
    fn test_disburse_refused() {
        let player = Address::with_last_byte(9);
        let policy = RefusingRecipients::new();
        policy.refuse(player);

        let mut treasury = Treasury::new();
        let mut purses = Purses::new();
        let mut log = EventLog::new();
        treasury.collect(Pulse::ONE, CollectionSource::External("repair".into()), &mut log).unwrap();

        let result = treasury.disburse(player, Pulse::ONE, DisbursementReason::Withdrawal, &mut purses, &policy, &mut log);
        assert!(matches!(result, Err(BazaarError::TransferFailed { .. })));
        assert_eq!(treasury.pooled_balance(), Pulse::ONE);
        assert_eq!(treasury.total_disbursed(), Pulse::ZERO);
    }
}
