//! # External Collaborators
//!
//! The bazaar never owns permissions, the pause switch, the clock or the
//! payment rail. It queries them through these narrow traits on every call:
//!
//! - [`AccessControl`] - "does caller hold role R?"
//! - [`PauseSwitch`] - "is the economy halted?"
//! - [`Clock`] - "what time is it?" (seconds)
//! - [`PayoutPolicy`] - "does this recipient accept this payment?"
//!
//! In-process implementations are provided for servers and tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::Address;
use parking_lot::RwLock;

use crate::pulse::Pulse;

/// Capabilities a caller may hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Registers vendors, items and recipes; withdraws treasury funds.
    Administrator,
    /// The trusted game server: mints, burns, moves items, pays rewards.
    GameContract,
    /// Day-to-day operations such as explicit vendor restocks.
    Operator,
}

/// Answers "does `caller` hold `role`?".
pub trait AccessControl: Send + Sync {
    /// Returns true if `caller` holds `role`.
    fn has_role(&self, caller: Address, role: Role) -> bool;
}

/// Answers "is the economy paused?".
pub trait PauseSwitch: Send + Sync {
    /// Returns true while mutating operations must be rejected.
    fn is_paused(&self) -> bool;
}

/// Monotonic wall-clock source, in seconds.
pub trait Clock: Send + Sync {
    /// Current time in seconds.
    fn now(&self) -> u64;
}

/// Decides whether a currency hand-off to `recipient` goes through.
///
/// A refusal makes the whole operation fail with `TransferFailed`.
pub trait PayoutPolicy: Send + Sync {
    /// Returns true if `recipient` accepts `amount`.
    fn accepts(&self, recipient: Address, amount: Pulse) -> bool;
}

// =============================================================================
// In-process implementations
// =============================================================================

/// Role grants held in memory.
#[derive(Debug, Default)]
pub struct RoleRegistry {
    grants: RwLock<HashMap<Role, HashSet<Address>>>,
}

impl RoleRegistry {
    /// Creates an empty registry (nobody holds any role).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `role` to `account`.
    pub fn grant(&self, role: Role, account: Address) {
        self.grants.write().entry(role).or_default().insert(account);
    }

    /// Revokes `role` from `account`. Returns true if it was held.
    pub fn revoke(&self, role: Role, account: Address) -> bool {
        self.grants
            .write()
            .get_mut(&role)
            .is_some_and(|holders| holders.remove(&account))
    }

    /// Builder-style grant.
    #[must_use]
    pub fn with(self, role: Role, account: Address) -> Self {
        self.grant(role, account);
        self
    }
}

impl AccessControl for RoleRegistry {
    fn has_role(&self, caller: Address, role: Role) -> bool {
        self.grants
            .read()
            .get(&role)
            .is_some_and(|holders| holders.contains(&caller))
    }
}

/// A simple on/off switch.
#[derive(Debug, Default)]
pub struct PauseFlag(AtomicBool);

impl PauseFlag {
    /// Creates an unpaused switch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Halts mutating operations.
    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Resumes mutating operations.
    pub fn unpause(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PauseSwitch for PauseFlag {
    fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Unix time from the system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to. Used by the deterministic server
/// loop (block timestamps) and by tests.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    /// Creates a clock reading `start`.
    #[must_use]
    pub fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    /// Sets the current time.
    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward by `secs`.
    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Every recipient accepts every payment.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl PayoutPolicy for AcceptAll {
    fn accepts(&self, _recipient: Address, _amount: Pulse) -> bool {
        true
    }
}

/// Recipients on this list refuse all payments (frozen or contract accounts
/// that cannot receive).
#[derive(Debug, Default)]
pub struct RefusingRecipients(RwLock<HashSet<Address>>);

impl RefusingRecipients {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `account` refuse payments.
    pub fn refuse(&self, account: Address) {
        self.0.write().insert(account);
    }

    /// Makes `account` accept payments again.
    pub fn accept(&self, account: Address) {
        self.0.write().remove(&account);
    }
}

impl PayoutPolicy for RefusingRecipients {
    fn accepts(&self, recipient: Address, _amount: Pulse) -> bool {
        !self.0.read().contains(&recipient)
    }
}
