//! Error model.
//!
//! `AllocationError` and `IntegrityError` come out of the pure split and
//! settlement code. `ServiceError` is what the service layer returns to its
//! callers and wraps both.

use thiserror::Error;

use crate::money::Money;
use crate::schemas::{ExpenseId, MemberId};
use crate::store::StoreError;

/// A rejected expense. Nothing was applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("expense amount must be greater than zero, got {0}")]
    NonPositiveAmount(Money),

    #[error("splits add up to {actual} but the expense amount is {expected}")]
    SumMismatch { expected: Money, actual: Money },

    #[error("member {0} is not part of this group")]
    NotAMember(MemberId),

    #[error("an equal split needs at least one participant")]
    NoParticipants,

    #[error("member {0} appears more than once in the split")]
    DuplicateParticipant(MemberId),

    #[error("split for member {member} is negative ({amount})")]
    NegativeShare { member: MemberId, amount: Money },

    #[error("splits add up to more than can be represented")]
    Overflow,
}

/// A stored expense that breaks the split invariant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("expense {expense}: splits add up to {actual} but the amount is {expected}")]
    SplitSumMismatch {
        expense: ExpenseId,
        expected: Money,
        actual: Money,
    },

    #[error("expense {expense} has a non-positive amount {amount}")]
    NonPositiveAmount { expense: ExpenseId, amount: Money },

    #[error("balances overflow at expense {expense}")]
    Overflow { expense: ExpenseId },
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] AllocationError),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
