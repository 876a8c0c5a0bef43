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

//! Account snapshots and balance arithmetic.
//!
//! An [`Account`] is an immutable view of one stored row. Balance changes are
//! computed here and persisted by the ledger through a store transaction.
//!
//! # Example
//!
//! ```
//! use balance_ledger_rs::{Account, AdjustmentKind, UserId};
//!
//! let account = Account::new(UserId(1), 10);
//! let updated = account.apply(AdjustmentKind::Subtract, 4).unwrap();
//! assert_eq!(updated.balance(), 6);
//! ```

use crate::LedgerError;
use crate::base::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Direction of a single-account balance adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentKind {
    Add,
    Subtract,
}

impl fmt::Display for AdjustmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjustmentKind::Add => f.write_str("add"),
            AdjustmentKind::Subtract => f.write_str("subtract"),
        }
    }
}

/// Returned when a string names no known [`AdjustmentKind`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid balance operation type {0:?}")]
pub struct UnknownAdjustmentKind(pub String);

impl FromStr for AdjustmentKind {
    type Err = UnknownAdjustmentKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "add" => Ok(AdjustmentKind::Add),
            "subtract" => Ok(AdjustmentKind::Subtract),
            _ => Err(UnknownAdjustmentKind(s.to_string())),
        }
    }
}

/// Snapshot of a user's balance.
///
/// Serializes as `{"id": .., "balance": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "id")]
    user_id: UserId,
    balance: i64,
}

impl Account {
    pub fn new(user_id: UserId, balance: i64) -> Self {
        let account = Self { user_id, balance };
        account.assert_invariants();
        account
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= 0,
            "Invariant violated: balance of user {} went negative: {}",
            self.user_id,
            self.balance
        );
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Returns the account with `amount` added.
    pub fn credit(&self, amount: i64) -> Result<Account, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(self.user_id))?;
        Ok(Account::new(self.user_id, balance))
    }

    /// Returns the account with `amount` taken out.
    pub fn debit(&self, amount: i64) -> Result<Account, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if self.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                user_id: self.user_id,
                balance: self.balance,
                required: amount,
            });
        }
        Ok(Account::new(self.user_id, self.balance - amount))
    }

    pub fn apply(&self, kind: AdjustmentKind, amount: i64) -> Result<Account, LedgerError> {
        match kind {
            AdjustmentKind::Add => self.credit(amount),
            AdjustmentKind::Subtract => self.debit(amount),
        }
    }
}
