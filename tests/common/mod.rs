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

//! Ledger scenarios shared by the per-store test suites.
//!
//! Each scenario takes a factory so it runs against a fresh store.

#![allow(dead_code)]

use balance_ledger_rs::{
    AdjustmentRequest, ErrorKind, Ledger, LedgerError, Store, TransferRequest, UserId,
};
use std::sync::{Arc, Barrier};
use std::thread;

/// Creates the given accounts through the public API.
pub fn seed<S: Store>(ledger: &Ledger<S>, accounts: &[(u32, i64)]) {
    for &(id, balance) in accounts {
        if balance == 0 {
            ledger.adjust(AdjustmentRequest::add(UserId(id), 1)).unwrap();
            ledger
                .adjust(AdjustmentRequest::subtract(UserId(id), 1))
                .unwrap();
        } else {
            ledger
                .adjust(AdjustmentRequest::add(UserId(id), balance))
                .unwrap();
        }
    }
}

pub fn seeded<S: Store>(store: S, accounts: &[(u32, i64)]) -> Ledger<S> {
    let ledger = Ledger::new(store);
    seed(&ledger, accounts);
    ledger
}

pub fn balance_of<S: Store>(ledger: &Ledger<S>, id: u32) -> Option<i64> {
    ledger
        .balance(UserId(id))
        .unwrap()
        .map(|account| account.balance())
}

// =============================================================================
// Adjustments
// =============================================================================

pub fn add_creates_missing_account<S: Store>(store: S) {
    let ledger = Ledger::new(store);
    assert_eq!(balance_of(&ledger, 1), None);

    let account = ledger.adjust(AdjustmentRequest::add(UserId(1), 25)).unwrap();
    assert_eq!(account.balance(), 25);
    assert_eq!(balance_of(&ledger, 1), Some(25));

    let account = ledger.adjust(AdjustmentRequest::add(UserId(1), 5)).unwrap();
    assert_eq!(account.balance(), 30);
}

pub fn subtract_missing_account_creates_nothing<S: Store>(store: S) {
    let ledger = Ledger::new(store);

    let err = ledger
        .adjust(AdjustmentRequest::subtract(UserId(1), 5))
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(UserId(1))));
    assert_eq!(balance_of(&ledger, 1), None);
    assert!(ledger.accounts().unwrap().is_empty());
}

pub fn subtract_beyond_balance_is_rejected<S: Store>(store: S) {
    let ledger = seeded(store, &[(1, 10)]);

    let account = ledger
        .adjust(AdjustmentRequest::subtract(UserId(1), 5))
        .unwrap();
    assert_eq!(account.balance(), 5);

    let err = ledger
        .adjust(AdjustmentRequest::subtract(UserId(1), 10))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientFunds {
            user_id: UserId(1),
            balance: 5,
            required: 10,
        }
    ));
    assert_eq!(balance_of(&ledger, 1), Some(5));
}

pub fn subtract_entire_balance_leaves_zero<S: Store>(store: S) {
    let ledger = seeded(store, &[(1, 10)]);
    ledger
        .adjust(AdjustmentRequest::subtract(UserId(1), 10))
        .unwrap();
    assert_eq!(balance_of(&ledger, 1), Some(0));
}

pub fn non_positive_amounts_are_rejected<S: Store>(store: S) {
    let ledger = seeded(store, &[(1, 10), (2, 10)]);

    for amount in [0, -1, i64::MIN] {
        let err = ledger
            .adjust(AdjustmentRequest::add(UserId(3), amount))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = ledger
            .adjust(AdjustmentRequest::subtract(UserId(1), amount))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = ledger
            .transfer(TransferRequest::new(UserId(1), UserId(2), amount))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    assert_eq!(balance_of(&ledger, 1), Some(10));
    assert_eq!(balance_of(&ledger, 2), Some(10));
    assert_eq!(balance_of(&ledger, 3), None);
}

pub fn overflowing_add_is_rejected<S: Store>(store: S) {
    let ledger = seeded(store, &[(1, i64::MAX)]);
    let err = ledger
        .adjust(AdjustmentRequest::add(UserId(1), 1))
        .unwrap_err();
    assert!(matches!(err, LedgerError::BalanceOverflow(UserId(1))));
    assert_eq!(balance_of(&ledger, 1), Some(i64::MAX));
}

// =============================================================================
// Transfers
// =============================================================================

pub fn transfer_moves_entire_balance<S: Store>(store: S) {
    let ledger = seeded(store, &[(1, 10), (2, 0)]);
    ledger
        .transfer(TransferRequest::new(UserId(1), UserId(2), 10))
        .unwrap();
    assert_eq!(balance_of(&ledger, 1), Some(0));
    assert_eq!(balance_of(&ledger, 2), Some(10));
}

pub fn transfer_with_insufficient_funds_changes_nothing<S: Store>(store: S) {
    let ledger = seeded(store, &[(1, 3), (2, 7)]);
    let err = ledger
        .transfer(TransferRequest::new(UserId(1), UserId(2), 4))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(balance_of(&ledger, 1), Some(3));
    assert_eq!(balance_of(&ledger, 2), Some(7));
}

pub fn transfer_to_self_is_rejected<S: Store>(store: S) {
    let ledger = seeded(store, &[(1, 100)]);

    for amount in [1, 100, 1_000] {
        let err = ledger
            .transfer(TransferRequest::new(UserId(1), UserId(1), amount))
            .unwrap_err();
        assert!(matches!(err, LedgerError::SameAccount(UserId(1))));
    }
    assert_eq!(balance_of(&ledger, 1), Some(100));
}

pub fn transfer_with_unknown_users_fails_not_found<S: Store>(store: S) {
    let ledger = seeded(store, &[(1, 10)]);

    let err = ledger
        .transfer(TransferRequest::new(UserId(1), UserId(2), 5))
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(UserId(2))));

    let err = ledger
        .transfer(TransferRequest::new(UserId(3), UserId(1), 5))
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(UserId(3))));

    assert_eq!(balance_of(&ledger, 1), Some(10));
    assert_eq!(balance_of(&ledger, 2), None);
    assert_eq!(balance_of(&ledger, 3), None);
}

pub fn accounts_are_listed_in_id_order<S: Store>(store: S) {
    let ledger = seeded(store, &[(3, 30), (1, 10), (2, 0)]);
    let listed: Vec<(u32, i64)> = ledger
        .accounts()
        .unwrap()
        .into_iter()
        .map(|account| (account.user_id().0, account.balance()))
        .collect();
    assert_eq!(listed, vec![(1, 10), (2, 0), (3, 30)]);
}

// =============================================================================
// Concurrency
// =============================================================================

/// `A→B 5` and `B→A 3` racing from A=10, B=10 always settle at A=8, B=12.
pub fn opposite_transfers_settle<S: Store + 'static>(make: impl Fn() -> S) {
    for _ in 0..50 {
        let ledger = Arc::new(seeded(make(), &[(1, 10), (2, 10)]));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [(1, 2, 5), (2, 1, 3)]
            .into_iter()
            .map(|(from, to, amount)| {
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    ledger.transfer(TransferRequest::new(UserId(from), UserId(to), amount))
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(balance_of(&ledger, 1), Some(8));
        assert_eq!(balance_of(&ledger, 2), Some(12));
    }
}

/// First credits to the same new account from many threads are all kept.
pub fn concurrent_first_credits_are_not_lost<S: Store + 'static>(store: S) {
    const THREADS: i64 = 8;
    const CREDITS: i64 = 25;

    let ledger = Arc::new(Ledger::new(store));
    let barrier = Arc::new(Barrier::new(THREADS as usize));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..CREDITS {
                    ledger.adjust(AdjustmentRequest::add(UserId(7), 1)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(balance_of(&ledger, 7), Some(THREADS * CREDITS));
}

/// Random transfers across a few accounts never change the total or leave a
/// balance negative.
pub fn concurrent_transfers_conserve_total<S: Store + 'static>(store: S) {
    const USERS: u32 = 4;
    const THREADS: u32 = 8;
    const TRANSFERS: u32 = 100;

    let ledger = Arc::new(seeded(store, &[(0, 50), (1, 50), (2, 50), (3, 50)]));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                for i in 0..TRANSFERS {
                    let from = (t + i) % USERS;
                    let to = (t + i * 3 + 1) % USERS;
                    if from == to {
                        continue;
                    }
                    let amount = i64::from(i % 20 + 1);
                    match ledger.transfer(TransferRequest::new(UserId(from), UserId(to), amount)) {
                        Ok(()) => {}
                        Err(err) => assert_eq!(err.kind(), ErrorKind::InsufficientFunds),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let accounts = ledger.accounts().unwrap();
    assert!(accounts.iter().all(|account| account.balance() >= 0));
    assert_eq!(accounts.iter().map(|account| account.balance()).sum::<i64>(), 200);
}
