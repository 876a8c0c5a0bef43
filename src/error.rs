// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types for ledger and store operations.

use crate::base::UserId;
use std::fmt;
use thiserror::Error;

/// Failures raised by a [`Store`](crate::store::Store) backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite reported an error (I/O, busy database, constraint, ...)
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An insert was expected to create a row but created none
    #[error("no rows created for user {0}")]
    NoRowsCreated(UserId),

    /// An update was expected to touch a row but touched none
    #[error("no rows updated for user {0}")]
    NoRowsUpdated(UserId),

    /// A write would have stored a negative balance
    #[error("balance of user {0} would become negative")]
    NegativeBalance(UserId),

    /// A credit would have overflowed the stored balance
    #[error("balance of user {0} would overflow")]
    Overflow(UserId),
}

/// Step of a transfer at which the store failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Begin,
    Lock,
    Debit,
    Credit,
    Commit,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            TransferStage::Begin => "begin",
            TransferStage::Lock => "lock",
            TransferStage::Debit => "debit",
            TransferStage::Credit => "credit",
            TransferStage::Commit => "commit",
        };
        f.write_str(stage)
    }
}

/// Coarse classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InsufficientFunds,
    InvalidArgument,
    StoreFailure,
}

impl ErrorKind {
    /// Returns `true` when the caller's request was at fault.
    pub fn is_client_error(self) -> bool {
        !matches!(self, ErrorKind::StoreFailure)
    }
}

/// Ledger operation errors.
///
/// Every variant leaves the stored balances exactly as they were before the
/// failed call.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// No account exists for the user
    #[error("user {0} not found")]
    NotFound(UserId),

    /// Debit would take the balance below zero
    #[error("insufficient funds for user {user_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        user_id: UserId,
        balance: i64,
        required: i64,
    },

    /// Amount is zero or negative
    #[error("invalid amount {0} (must be positive)")]
    InvalidAmount(i64),

    /// Transfer source and destination are the same user
    #[error("cannot transfer from user {0} to itself")]
    SameAccount(UserId),

    /// Credit would overflow the balance
    #[error("balance overflow for user {0}")]
    BalanceOverflow(UserId),

    /// The store failed while a transfer was in progress; nothing was applied
    #[error("transfer failed at {stage}: {source}")]
    TransferFailed {
        stage: TransferStage,
        #[source]
        source: StoreError,
    },

    /// The store failed outside a transfer
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::InvalidAmount(_)
            | LedgerError::SameAccount(_)
            | LedgerError::BalanceOverflow(_) => ErrorKind::InvalidArgument,
            LedgerError::TransferFailed { .. } | LedgerError::Store(_) => ErrorKind::StoreFailure,
        }
    }

    pub(crate) fn transfer(stage: TransferStage) -> impl FnOnce(StoreError) -> LedgerError {
        move |source| LedgerError::TransferFailed { stage, source }
    }
}
