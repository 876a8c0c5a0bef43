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

//! In-process store with per-row locks.
//!
//! Each key maps to an `Arc<Mutex<Option<i64>>>` slot; `None` marks a key
//! that has no account. A [`MemoryTransaction`] keeps an owned guard for every
//! slot it touched and stages its writes. Commit copies the staged balances
//! into the slots while all guards are still held, so other readers observe
//! either none or all of a transaction's writes.
//!
//! Locking an absent key creates an empty slot. When the transaction ends, a
//! slot that is still empty and referenced by nobody else is removed again.

use super::{Store, StoreTransaction};
use crate::account::Account;
use crate::base::UserId;
use crate::error::StoreError;
use dashmap::DashMap;
use parking_lot::{Mutex, RawMutex, lock_api};
use std::collections::BTreeMap;
use std::sync::Arc;

type Row = Arc<Mutex<Option<i64>>>;
type RowGuard = lock_api::ArcMutexGuard<RawMutex, Option<i64>>;

/// Balance table held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: DashMap<UserId, Row>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose table already holds `accounts`.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        for account in accounts {
            store.rows.insert(
                account.user_id(),
                Arc::new(Mutex::new(Some(account.balance()))),
            );
        }
        store
    }

    /// Returns the slot for `user_id`, creating an empty one if needed.
    fn slot(&self, user_id: UserId) -> Row {
        // The shard guard is released on return, before the caller locks the row.
        let entry = self.rows.entry(user_id).or_default();
        Arc::clone(entry.value())
    }

    fn existing(&self, user_id: UserId) -> Option<Row> {
        self.rows.get(&user_id).map(|row| Arc::clone(row.value()))
    }

    /// Drops the slot of `user_id` if it holds no account and is unshared.
    fn release_empty(&self, user_id: UserId) {
        // Clones are only taken under the shard lock `remove_if` holds, so a
        // count of one cannot change underneath the check.
        self.rows.remove_if(&user_id, |_, row| {
            Arc::strong_count(row) == 1 && row.lock().is_none()
        });
    }
}

impl Store for MemoryStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn get_account(&self, user_id: UserId) -> Result<Option<Account>, StoreError> {
        let Some(row) = self.existing(user_id) else {
            return Ok(None);
        };
        let balance = *row.lock();
        Ok(balance.map(|balance| Account::new(user_id, balance)))
    }

    fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut rows: Vec<(UserId, Row)> = self
            .rows
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        rows.sort_by_key(|(user_id, _)| *user_id);

        Ok(rows
            .into_iter()
            .filter_map(|(user_id, row)| {
                let balance = *row.lock();
                balance.map(|balance| Account::new(user_id, balance))
            })
            .collect())
    }

    fn begin(&self) -> Result<MemoryTransaction<'_>, StoreError> {
        Ok(MemoryTransaction {
            store: self,
            locked: BTreeMap::new(),
            staged: BTreeMap::new(),
        })
    }
}

/// Transaction over a [`MemoryStore`].
///
/// Dropping it without calling [`commit`](StoreTransaction::commit) discards
/// the staged writes. Either way every row lock is released on drop.
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    /// Row guards held until the transaction ends.
    locked: BTreeMap<UserId, RowGuard>,
    /// Balances written by this transaction, applied on commit.
    staged: BTreeMap<UserId, i64>,
}

impl MemoryTransaction<'_> {
    fn lock(&mut self, user_id: UserId) {
        if !self.locked.contains_key(&user_id) {
            let guard = self.store.slot(user_id).lock_arc();
            self.locked.insert(user_id, guard);
        }
    }

    /// Balance as seen by this transaction, staged writes included.
    fn current(&mut self, user_id: UserId) -> Option<i64> {
        self.lock(user_id);
        match self.staged.get(&user_id) {
            Some(balance) => Some(*balance),
            None => self.locked.get(&user_id).and_then(|guard| **guard),
        }
    }

    fn stage(&mut self, user_id: UserId, balance: i64) -> Result<u64, StoreError> {
        if balance < 0 {
            return Err(StoreError::NegativeBalance(user_id));
        }
        self.staged.insert(user_id, balance);
        Ok(1)
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn get_account_for_update(&mut self, user_id: UserId) -> Result<Option<Account>, StoreError> {
        Ok(self
            .current(user_id)
            .map(|balance| Account::new(user_id, balance)))
    }

    fn insert_account(&mut self, account: &Account) -> Result<u64, StoreError> {
        let user_id = account.user_id();
        match self.current(user_id) {
            Some(_) => Ok(0),
            None => self.stage(user_id, account.balance()),
        }
    }

    fn update_balance(&mut self, user_id: UserId, balance: i64) -> Result<u64, StoreError> {
        match self.current(user_id) {
            Some(_) => self.stage(user_id, balance),
            None => Ok(0),
        }
    }

    fn debit(&mut self, user_id: UserId, amount: i64) -> Result<u64, StoreError> {
        match self.current(user_id) {
            Some(balance) if balance >= amount => {
                let balance = balance
                    .checked_sub(amount)
                    .ok_or(StoreError::Overflow(user_id))?;
                self.stage(user_id, balance)
            }
            _ => Ok(0),
        }
    }

    fn credit(&mut self, user_id: UserId, amount: i64) -> Result<u64, StoreError> {
        match self.current(user_id) {
            Some(balance) => {
                let balance = balance
                    .checked_add(amount)
                    .ok_or(StoreError::Overflow(user_id))?;
                self.stage(user_id, balance)
            }
            None => Ok(0),
        }
    }

    fn commit(mut self) -> Result<(), StoreError> {
        for (user_id, balance) in std::mem::take(&mut self.staged) {
            // Staging always locks the row first.
            if let Some(guard) = self.locked.get_mut(&user_id) {
                **guard = Some(balance);
            }
        }
        Ok(())
    }

    fn rollback(self) -> Result<(), StoreError> {
        drop(self);
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        let touched: Vec<UserId> = self.locked.keys().copied().collect();
        // Guards hold a reference to their slot; release them first.
        self.locked.clear();
        for user_id in touched {
            self.store.release_empty(user_id);
        }
    }
}
