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

//! Typed requests accepted by the [`Ledger`](crate::Ledger).
//!
//! Field names follow the JSON bodies of the HTTP API, so the request layer
//! can deserialize straight into these types and hand them to the core.

use crate::LedgerError;
use crate::account::AdjustmentKind;
use crate::base::UserId;
use serde::{Deserialize, Serialize};

/// Add to or subtract from one user's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    pub user_id: UserId,
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: AdjustmentKind,
}

impl AdjustmentRequest {
    pub fn new(user_id: UserId, amount: i64, kind: AdjustmentKind) -> Self {
        Self {
            user_id,
            amount,
            kind,
        }
    }

    pub fn add(user_id: UserId, amount: i64) -> Self {
        Self::new(user_id, amount, AdjustmentKind::Add)
    }

    pub fn subtract(user_id: UserId, amount: i64) -> Self {
        Self::new(user_id, amount, AdjustmentKind::Subtract)
    }

    /// Checks the request shape without touching the store.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= 0 {
            return Err(LedgerError::InvalidAmount(self.amount));
        }
        Ok(())
    }
}

/// Move funds from one user to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    #[serde(rename = "from_user_id")]
    pub from: UserId,
    #[serde(rename = "to_user_id")]
    pub to: UserId,
    pub amount: i64,
}

impl TransferRequest {
    pub fn new(from: UserId, to: UserId, amount: i64) -> Self {
        Self { from, to, amount }
    }

    /// Checks the request shape without touching the store.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= 0 {
            return Err(LedgerError::InvalidAmount(self.amount));
        }
        if self.from == self.to {
            return Err(LedgerError::SameAccount(self.from));
        }
        Ok(())
    }
}
