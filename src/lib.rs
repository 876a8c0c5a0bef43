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

//! # Balance Ledger
//!
//! This library keeps a non-negative integer balance per user and moves funds
//! between users. Balances live in a transactional [`Store`]; the [`Ledger`]
//! enforces the rules on top of it.
//!
//! ## Core Components
//!
//! - [`Ledger`]: balance lookups, adjustments and atomic transfers
//! - [`Store`]: storage capability, implemented by [`MemoryStore`] and [`SqliteStore`]
//! - [`AdjustmentRequest`] / [`TransferRequest`]: typed operation inputs
//! - [`LedgerError`]: error types for failed operations
//! - [`http`]: JSON API exposing the ledger
//!
//! ## Example
//!
//! ```
//! use balance_ledger_rs::{AdjustmentRequest, Ledger, MemoryStore, TransferRequest, UserId};
//!
//! let ledger = Ledger::new(MemoryStore::new());
//!
//! // The first credit creates the account
//! ledger.adjust(AdjustmentRequest::add(UserId(1), 10)).unwrap();
//!
//! ledger.adjust(AdjustmentRequest::add(UserId(2), 1)).unwrap();
//! ledger.transfer(TransferRequest::new(UserId(1), UserId(2), 4)).unwrap();
//!
//! let account = ledger.balance(UserId(1)).unwrap().unwrap();
//! assert_eq!(account.balance(), 6);
//! ```
//!
//! ## Thread Safety
//!
//! A [`Ledger`] can be shared across threads. Concurrent operations on the
//! same account are serialized by the store's row locks. [`MemoryStore`] runs
//! operations on different accounts in parallel; [`SqliteStore`] serializes
//! all transactions on its connection.

pub mod account;
mod base;
pub mod error;
pub mod http;
mod ledger;
pub mod logging;
mod request;
pub mod store;

pub use account::{Account, AdjustmentKind};
pub use base::UserId;
pub use error::{ErrorKind, LedgerError, StoreError, TransferStage};
pub use ledger::Ledger;
pub use request::{AdjustmentRequest, TransferRequest};
pub use store::{MemoryStore, SqliteStore, Store, StoreTransaction};
