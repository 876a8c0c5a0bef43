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

//! Storage capability used by the ledger.
//!
//! A [`Store`] is a key→balance table with point reads and multi-statement
//! transactions. All balance mutations go through a [`StoreTransaction`]:
//!
//! - rows read with [`StoreTransaction::get_account_for_update`] stay locked
//!   until the transaction ends, including keys that have no row yet;
//! - writes become visible to other readers only at [`StoreTransaction::commit`];
//! - dropping a transaction without committing rolls it back.
//!
//! Two backends are provided: [`MemoryStore`] and [`SqliteStore`].
//!
//! Row locks are taken in the order rows are first touched. Callers that
//! touch more than one row lock them in ascending [`UserId`] order.

mod memory;
mod sqlite;

pub use memory::{MemoryStore, MemoryTransaction};
pub use sqlite::{SqliteStore, SqliteTransaction};

use crate::account::Account;
use crate::base::UserId;
use crate::error::StoreError;

/// A shared balance table.
pub trait Store: Send + Sync {
    /// Open transaction borrowing the store.
    type Transaction<'a>: StoreTransaction
    where
        Self: 'a;

    /// Reads the committed balance of one user.
    fn get_account(&self, user_id: UserId) -> Result<Option<Account>, StoreError>;

    /// Reads every committed account, ordered by user ID.
    fn accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Starts a transaction.
    fn begin(&self) -> Result<Self::Transaction<'_>, StoreError>;
}

/// Statements executed inside one store transaction.
///
/// Write methods return the number of rows affected.
pub trait StoreTransaction {
    /// Reads a row and holds its lock until the transaction ends.
    fn get_account_for_update(&mut self, user_id: UserId) -> Result<Option<Account>, StoreError>;

    /// Creates a row unless one already exists for the user.
    fn insert_account(&mut self, account: &Account) -> Result<u64, StoreError>;

    /// Overwrites the balance of an existing row.
    fn update_balance(&mut self, user_id: UserId, balance: i64) -> Result<u64, StoreError>;

    /// Subtracts `amount` if the row exists and holds at least `amount`.
    fn debit(&mut self, user_id: UserId, amount: i64) -> Result<u64, StoreError>;

    /// Adds `amount` to an existing row.
    fn credit(&mut self, user_id: UserId, amount: i64) -> Result<u64, StoreError>;

    fn commit(self) -> Result<(), StoreError>;

    fn rollback(self) -> Result<(), StoreError>;
}
