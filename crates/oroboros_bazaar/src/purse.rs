//! # Purses
//!
//! Spendable PULSE per account. Purses are where buyers pay from and where
//! sellers, refunds and treasury disbursements are paid to.
//!
//! Every outbound hand-off asks the [`PayoutPolicy`] first. A refusal is a
//! `TransferFailed` error and leaves the purse untouched; the enclosing
//! operation then discards all of its other effects.

use std::collections::HashMap;

use alloy_primitives::Address;

use crate::access::PayoutPolicy;
use crate::error::{BazaarError, BazaarResult};
use crate::events::{BazaarEvent, EventLog};
use crate::pulse::Pulse;

/// Currency balances per account.
#[derive(Clone, Debug, Default)]
pub struct Purses {
    balances: HashMap<Address, Pulse>,
    total_deposited: Pulse,
}

impl Purses {
    /// Creates an empty set of purses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `account`.
    #[must_use]
    pub fn balance_of(&self, account: Address) -> Pulse {
        self.balances.get(&account).copied().unwrap_or(Pulse::ZERO)
    }

    /// Currency that ever entered the economy through [`Purses::deposit`].
    #[must_use]
    pub const fn total_deposited(&self) -> Pulse {
        self.total_deposited
    }

    /// Sum of every purse.
    ///
    /// # Errors
    ///
    /// `ArithmeticOverflow` if the sum does not fit a [`Pulse`].
    pub fn total_held(&self) -> BazaarResult<Pulse> {
        self.balances.values().try_fold(Pulse::ZERO, |acc, v| acc.safe_add(*v))
    }

    /// Brings currency into the economy.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for the null account or a zero amount;
    /// `ArithmeticOverflow` if a counter would overflow.
    pub fn deposit(&mut self, account: Address, amount: Pulse, log: &mut EventLog) -> BazaarResult<()> {
        if account.is_zero() {
            return Err(BazaarError::invalid("deposit to the null address"));
        }
        if amount.is_zero() {
            return Err(BazaarError::invalid("deposit amount must be positive"));
        }
        let total = self.total_deposited.safe_add(amount)?;
        self.credit(account, amount)?;
        self.total_deposited = total;
        log.emit(BazaarEvent::CurrencyDeposited { account, amount });
        Ok(())
    }

    /// Takes `amount` out of `account`.
    ///
    /// # Errors
    ///
    /// `InsufficientFunds` if the purse holds less.
    pub fn debit(&mut self, account: Address, amount: Pulse) -> BazaarResult<()> {
        let available = self.balance_of(account);
        let remaining = available
            .checked_sub(amount)
            .ok_or(BazaarError::InsufficientFunds { required: amount, available })?;
        self.balances.insert(account, remaining);
        Ok(())
    }

    /// Hands `amount` to `recipient`. Zero amounts are a no-op.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for the null recipient; `TransferFailed` if the
    /// recipient refuses.
    pub fn pay(&mut self, recipient: Address, amount: Pulse, payouts: &dyn PayoutPolicy) -> BazaarResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        if recipient.is_zero() {
            return Err(BazaarError::invalid("payment to the null address"));
        }
        if !payouts.accepts(recipient, amount) {
            return Err(BazaarError::TransferFailed { recipient, amount });
        }
        self.credit(recipient, amount)
    }

    fn credit(&mut self, account: Address, amount: Pulse) -> BazaarResult<()> {
        let balance = self.balance_of(account).safe_add(amount)?;
        self.balances.insert(account, balance);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AcceptAll, RefusingRecipients};

    #[test]
    fn test_deposit_and_debit() {
        let alice = Address::with_last_byte(1);
        let mut purses = Purses::new();
        let mut log = EventLog::new();

        purses.deposit(alice, Pulse::from_whole(10), &mut log).unwrap();
        purses.debit(alice, Pulse::from_whole(4)).unwrap();

        assert_eq!(purses.balance_of(alice), Pulse::from_whole(6));
        assert_eq!(purses.total_deposited(), Pulse::from_whole(10));
        assert_eq!(
            purses.debit(alice, Pulse::from_whole(7)),
            Err(BazaarError::InsufficientFunds {
                required: Pulse::from_whole(7),
                available: Pulse::from_whole(6),
            })
        );
    }

    #[test]
    fn test_deposit_validation() {
        let mut purses = Purses::new();
        let mut log = EventLog::new();
        assert!(purses.deposit(Address::ZERO, Pulse::ONE, &mut log).is_err());
        assert!(purses.deposit(Address::with_last_byte(1), Pulse::ZERO, &mut log).is_err());
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_refused_payment() {
        let bob = Address::with_last_byte(2);
        let policy = RefusingRecipients::new();
        policy.refuse(bob);

        let mut purses = Purses::new();
        let result = purses.pay(bob, Pulse::ONE, &policy);
        assert_eq!(result, Err(BazaarError::TransferFailed { recipient: bob, amount: Pulse::ONE }));
        assert_eq!(purses.balance_of(bob), Pulse::ZERO);

        purses.pay(bob, Pulse::ZERO, &policy).unwrap();
        purses.pay(bob, Pulse::ONE, &AcceptAll).unwrap();
        assert_eq!(purses.total_held(), Ok(Pulse::ONE));
    }

    #[test]
    fn test_total_held_overflow_is_reported() {
        let mut purses = Purses::new();
        purses.balances.insert(Address::with_last_byte(1), Pulse::MAX);
        purses.balances.insert(Address::with_last_byte(2), Pulse::ONE);

        assert_eq!(purses.total_held(), Err(BazaarError::ArithmeticOverflow));
    }
}
