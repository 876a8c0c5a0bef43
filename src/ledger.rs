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

//! Ledger core.
//!
//! The [`Ledger`] owns the business rules for balances: lookups, signed
//! adjustments and atomic peer-to-peer transfers. Durable state lives in the
//! [`Store`]; the ledger itself holds nothing but the store handle.
//!
//! # Operations
//!
//! - **Balance**: read one committed account, or `None` when absent.
//! - **Adjust**: add to or subtract from one balance, creating the account on
//!   its first credit.
//! - **Transfer**: debit one user and credit another in a single store
//!   transaction.
//!
//! # Consistency
//!
//! Every mutation runs in a store transaction that row-locks what it reads, so
//! concurrent calls on the same account are serialized by the store and no
//! update is lost. A transaction that does not reach commit is rolled back
//! when it is dropped, whatever the exit path.

use crate::account::{Account, AdjustmentKind};
use crate::base::UserId;
use crate::error::{LedgerError, StoreError, TransferStage};
use crate::request::{AdjustmentRequest, TransferRequest};
use crate::store::{Store, StoreTransaction};
use tracing::{debug, info, instrument, warn};

/// Fails with `error` unless exactly one row was affected.
fn expect_one_row(rows: u64, error: impl FnOnce() -> StoreError) -> Result<(), StoreError> {
    if rows == 1 { Ok(()) } else { Err(error()) }
}

/// Balance ledger over a shared store.
///
/// # Invariants
///
/// - A committed balance is never negative.
/// - A transfer applies both of its legs or neither.
/// - Accounts are created only by an `add` adjustment and never deleted.
pub struct Ledger<S> {
    store: S,
}

impl<S: Store> Ledger<S> {
    pub fn new(store: S) -> Self {
        Ledger { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the committed account of `user_id`, or `None` if it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Store`] - The store could not be read.
    #[instrument(skip(self))]
    pub fn balance(&self, user_id: UserId) -> Result<Option<Account>, LedgerError> {
        Ok(self.store.get_account(user_id)?)
    }

    /// Returns every account ordered by user ID.
    pub fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.store.accounts()?)
    }

    /// Applies an adjustment and returns the updated account.
    ///
    /// | Kind | Account absent | Account present |
    /// |------|----------------|-----------------|
    /// | add | created with `amount` | balance + amount |
    /// | subtract | [`LedgerError::NotFound`] | balance - amount, if covered |
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Amount is not positive.
    /// - [`LedgerError::NotFound`] - Subtract on an absent account.
    /// - [`LedgerError::InsufficientFunds`] - Subtract exceeds the balance.
    /// - [`LedgerError::BalanceOverflow`] - Add exceeds the balance range.
    /// - [`LedgerError::Store`] - The store failed or a write touched no row.
    #[instrument(skip_all, fields(user_id = %request.user_id, kind = %request.kind, amount = request.amount))]
    pub fn adjust(&self, request: AdjustmentRequest) -> Result<Account, LedgerError> {
        request.validate()?;
        let AdjustmentRequest {
            user_id,
            amount,
            kind,
        } = request;

        let mut tx = self.store.begin()?;
        let current = tx.get_account_for_update(user_id)?;

        let updated = match (current, kind) {
            (None, AdjustmentKind::Subtract) => {
                debug!("subtract rejected: no such user");
                return Err(LedgerError::NotFound(user_id));
            }
            (None, AdjustmentKind::Add) => {
                let account = Account::new(user_id, amount);
                expect_one_row(tx.insert_account(&account)?, || {
                    StoreError::NoRowsCreated(user_id)
                })?;
                account
            }
            (Some(account), kind) => {
                let updated = account.apply(kind, amount).inspect_err(|err| {
                    debug!(error = %err, balance = account.balance(), "adjustment rejected");
                })?;
                expect_one_row(tx.update_balance(user_id, updated.balance())?, || {
                    StoreError::NoRowsUpdated(user_id)
                })?;
                updated
            }
        };

        tx.commit().inspect_err(|err| warn!(error = %err, "commit failed"))?;
        info!(balance = updated.balance(), "adjustment committed");
        Ok(updated)
    }

    /// Moves `amount` from one user to another atomically.
    ///
    /// Both rows are locked in ascending ID order before either is written, so
    /// transfers in opposite directions between the same users cannot
    /// deadlock. The debit is conditional on the balance still covering the
    /// amount and each leg must touch exactly one row.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Amount is not positive.
    /// - [`LedgerError::SameAccount`] - Source and destination are equal.
    /// - [`LedgerError::NotFound`] - Either user does not exist.
    /// - [`LedgerError::InsufficientFunds`] - Source balance is below `amount`.
    /// - [`LedgerError::BalanceOverflow`] - Destination balance would overflow.
    /// - [`LedgerError::TransferFailed`] - The store failed at the given stage.
    #[instrument(skip_all, fields(from = %request.from, to = %request.to, amount = request.amount))]
    pub fn transfer(&self, request: TransferRequest) -> Result<(), LedgerError> {
        request.validate()?;
        let TransferRequest { from, to, amount } = request;

        let mut tx = self
            .store
            .begin()
            .map_err(LedgerError::transfer(TransferStage::Begin))?;

        let (first, second) = if from < to { (from, to) } else { (to, from) };
        let first_row = tx
            .get_account_for_update(first)
            .map_err(LedgerError::transfer(TransferStage::Lock))?;
        let second_row = tx
            .get_account_for_update(second)
            .map_err(LedgerError::transfer(TransferStage::Lock))?;
        let (payer, payee) = if from < to {
            (first_row, second_row)
        } else {
            (second_row, first_row)
        };
        let payer = payer.ok_or(LedgerError::NotFound(from))?;
        let payee = payee.ok_or(LedgerError::NotFound(to))?;

        // Same checks the store enforces; failing here gives the caller a
        // precise error instead of a zero-row update.
        payer.debit(amount).inspect_err(|err| {
            debug!(error = %err, "transfer rejected");
        })?;
        payee.credit(amount)?;

        tx.debit(from, amount)
            .and_then(|rows| expect_one_row(rows, || StoreError::NoRowsUpdated(from)))
            .map_err(LedgerError::transfer(TransferStage::Debit))
            .inspect_err(|err| warn!(error = %err, "transfer aborted"))?;
        tx.credit(to, amount)
            .and_then(|rows| expect_one_row(rows, || StoreError::NoRowsUpdated(to)))
            .map_err(LedgerError::transfer(TransferStage::Credit))
            .inspect_err(|err| warn!(error = %err, "transfer aborted"))?;

        tx.commit()
            .map_err(LedgerError::transfer(TransferStage::Commit))
            .inspect_err(|err| warn!(error = %err, "transfer aborted"))?;

        info!("transfer committed");
        Ok(())
    }
}
