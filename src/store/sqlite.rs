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

//! SQLite-backed store.
//!
//! The table layout mirrors a plain relational `users` table:
//!
//! ```sql
//! CREATE TABLE users (
//!     id      INTEGER PRIMARY KEY CHECK (id >= 0),
//!     balance INTEGER NOT NULL CHECK (balance >= 0)
//! );
//! ```
//!
//! A single connection is shared behind a mutex. Transactions start with
//! `BEGIN IMMEDIATE`, so the database write lock is taken before the first
//! read and held until `COMMIT` or `ROLLBACK`.

use super::{Store, StoreTransaction};
use crate::account::Account;
use crate::base::UserId;
use crate::error::StoreError;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const QUERY_CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS users (
        id      INTEGER PRIMARY KEY CHECK (id >= 0),
        balance INTEGER NOT NULL CHECK (balance >= 0)
    )";
const QUERY_GET_USER: &str = "SELECT id, balance FROM users WHERE id = ?1";
const QUERY_LIST_USERS: &str = "SELECT id, balance FROM users ORDER BY id";
const QUERY_CREATE_USER: &str =
    "INSERT INTO users (id, balance) VALUES (?1, ?2) ON CONFLICT (id) DO NOTHING";
const QUERY_UPDATE_USER: &str = "UPDATE users SET balance = ?1 WHERE id = ?2";
const QUERY_TAKE_FROM_USER_BALANCE: &str =
    "UPDATE users SET balance = balance - ?1 WHERE id = ?2 AND balance >= ?1";
const QUERY_PUT_TO_USER_BALANCE: &str = "UPDATE users SET balance = balance + ?1 WHERE id = ?2";

fn read_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account::new(UserId(row.get(0)?), row.get(1)?))
}

/// Balance table stored in SQLite.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::with_connection(conn)
    }

    /// Creates a private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(QUERY_CREATE_TABLE, [])?;
        debug!("users table ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Store for SqliteStore {
    type Transaction<'a> = SqliteTransaction<'a>;

    fn get_account(&self, user_id: UserId) -> Result<Option<Account>, StoreError> {
        let conn = self.conn.lock();
        let account = conn
            .prepare_cached(QUERY_GET_USER)?
            .query_row(params![user_id.0], read_account)
            .optional()?;
        Ok(account)
    }

    fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(QUERY_LIST_USERS)?;
        let accounts = stmt
            .query_map([], read_account)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    fn begin(&self) -> Result<SqliteTransaction<'_>, StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(SqliteTransaction { conn, open: true })
    }
}

/// Transaction over a [`SqliteStore`].
///
/// Holds the connection for its whole lifetime. Dropping it while still open
/// issues `ROLLBACK`.
pub struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    open: bool,
}

impl SqliteTransaction<'_> {
    fn execute<P: rusqlite::Params>(&mut self, sql: &str, params: P) -> Result<u64, StoreError> {
        let rows = self.conn.prepare_cached(sql)?.execute(params)?;
        Ok(rows as u64)
    }

    fn finish(&mut self, sql: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(sql)?;
        self.open = false;
        Ok(())
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn get_account_for_update(&mut self, user_id: UserId) -> Result<Option<Account>, StoreError> {
        // BEGIN IMMEDIATE already holds the write lock, so a plain read is
        // stable until the transaction ends.
        let account = self
            .conn
            .prepare_cached(QUERY_GET_USER)?
            .query_row(params![user_id.0], read_account)
            .optional()?;
        Ok(account)
    }

    fn insert_account(&mut self, account: &Account) -> Result<u64, StoreError> {
        self.execute(
            QUERY_CREATE_USER,
            params![account.user_id().0, account.balance()],
        )
    }

    fn update_balance(&mut self, user_id: UserId, balance: i64) -> Result<u64, StoreError> {
        self.execute(QUERY_UPDATE_USER, params![balance, user_id.0])
    }

    fn debit(&mut self, user_id: UserId, amount: i64) -> Result<u64, StoreError> {
        self.execute(QUERY_TAKE_FROM_USER_BALANCE, params![amount, user_id.0])
    }

    fn credit(&mut self, user_id: UserId, amount: i64) -> Result<u64, StoreError> {
        self.execute(QUERY_PUT_TO_USER_BALANCE, params![amount, user_id.0])
    }

    fn commit(mut self) -> Result<(), StoreError> {
        // On failure `open` stays set and Drop rolls back.
        self.finish("COMMIT")
    }

    fn rollback(mut self) -> Result<(), StoreError> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "rollback of abandoned transaction failed");
            }
        }
    }
}
