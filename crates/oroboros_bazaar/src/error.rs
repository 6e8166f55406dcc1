//! # Bazaar Error Types
//!
//! Every failure aborts the whole operation. Nothing here is recoverable
//! inside the engine; the caller decides whether to resubmit.

use std::fmt;

use alloy_primitives::Address;
use thiserror::Error;

use crate::access::Role;
use crate::ledger::{ItemKind, Quantity};
use crate::pulse::Pulse;

/// Why an `Unauthorized` caller was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// The operation is gated on a role the caller does not hold.
    MissingRole(Role),
    /// The caller does not own the record it tried to change.
    NotOwner(String),
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRole(role) => write!(f, "lacks {role:?}"),
            Self::NotOwner(what) => write!(f, "is not the owner of {what}"),
        }
    }
}

/// Errors that can occur in the bazaar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BazaarError {
    /// Malformed input: zero amounts, mismatched batch lengths, empty
    /// required lists, out-of-range durations.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Lookup on an entity that was never registered.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity (listing, vendor, item kind, ...).
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Registration of an entity that already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of entity.
        entity: &'static str,
        /// Duplicate identifier.
        id: String,
    },

    /// The caller may not perform the operation.
    #[error("unauthorized: {caller} {denial}")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
        /// What the caller was missing.
        denial: Denial,
    },

    /// The external pause switch is set.
    #[error("system paused")]
    SystemPaused,

    /// A holder does not own enough units of an item kind.
    #[error("insufficient balance: {holder} needs {required} of item {kind}, has {available}")]
    InsufficientBalance {
        /// Holder being debited.
        holder: Address,
        /// Item kind.
        kind: ItemKind,
        /// Units required.
        required: Quantity,
        /// Units available.
        available: Quantity,
    },

    /// Not enough currency in a purse, the treasury, or the attached payment.
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Amount required.
        required: Pulse,
        /// Amount available.
        available: Pulse,
    },

    /// The operation is not allowed in the current state (inactive or
    /// expired listing, self-trade, restock cycle not elapsed, ...).
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// The recipient refused a payment hand-off.
    #[error("transfer of {amount} to {recipient} failed")]
    TransferFailed {
        /// Recipient that refused.
        recipient: Address,
        /// Amount that was refused.
        amount: Pulse,
    },

    /// Arithmetic overflow in a quantity or currency calculation.
    #[error("arithmetic overflow in economic calculation")]
    ArithmeticOverflow,

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The event journal could not be written or read.
    #[error("journal error: {0}")]
    Journal(String),
}

impl BazaarError {
    /// Shorthand for [`BazaarError::InvalidArgument`].
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Shorthand for [`BazaarError::StateConflict`].
    pub(crate) fn conflict(msg: impl Into<String>) -> Self {
        Self::StateConflict(msg.into())
    }

    /// Shorthand for [`BazaarError::NotFound`].
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`BazaarError::AlreadyExists`].
    pub(crate) fn exists(entity: &'static str, id: impl ToString) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for bazaar operations.
pub type BazaarResult<T> = Result<T, BazaarError>;
