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

use anyhow::Context;
use balance_ledger_rs::{
    AdjustmentKind, AdjustmentRequest, Ledger, MemoryStore, SqliteStore, Store, TransferRequest,
    UserId, http, logging,
};
use clap::{Parser, Subcommand};
use csv::{ReaderBuilder, Trim, Writer};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Balance Ledger - Per-user balances with atomic transfers
///
/// Serves the JSON API, or replays a CSV of operations and prints the
/// resulting balances to stdout.
#[derive(Parser, Debug)]
#[command(name = "balance-ledger")]
#[command(about = "A per-user balance ledger with atomic transfers", long_about = None)]
struct Cli {
    /// SQLite database file; an in-memory store is used when omitted
    #[arg(long, env = "LEDGER_DATABASE", value_name = "PATH", global = true)]
    database: Option<PathBuf>,

    /// How long SQLite waits on a locked database before failing
    #[arg(
        long,
        env = "LEDGER_BUSY_TIMEOUT_MS",
        value_name = "MS",
        default_value_t = 5000,
        global = true
    )]
    busy_timeout_ms: u64,

    /// Log filter, e.g. `info` or `balance_ledger_rs=debug` (RUST_LOG wins)
    #[arg(
        long,
        env = "LEDGER_LOG",
        value_name = "FILTER",
        default_value = "info",
        global = true
    )]
    log: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LEDGER_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON API
    Serve {
        #[arg(long, env = "LEDGER_LISTEN", default_value = "127.0.0.1:8000")]
        listen: SocketAddr,
    },
    /// Replay operations from a CSV file
    ///
    /// Expected format: type,user,to,amount
    /// Example: balance-ledger replay operations.csv > balances.csv
    Replay {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log, cli.log_json).context("installing log subscriber")?;

    match &cli.database {
        Some(path) => {
            let store = SqliteStore::open(path, Duration::from_millis(cli.busy_timeout_ms))
                .with_context(|| format!("opening database '{}'", path.display()))?;
            info!(path = %path.display(), "using SQLite store");
            run(cli.command, Ledger::new(store)).await
        }
        None => {
            info!("using in-memory store");
            run(cli.command, Ledger::new(MemoryStore::new())).await
        }
    }
}

async fn run<S: Store + 'static>(command: Command, ledger: Ledger<S>) -> anyhow::Result<()> {
    match command {
        Command::Serve { listen } => {
            let listener = TcpListener::bind(listen)
                .await
                .with_context(|| format!("binding {listen}"))?;
            http::serve(listener, Arc::new(ledger))
                .await
                .context("serving HTTP API")
        }
        Command::Replay { input } => {
            let file = File::open(&input)
                .with_context(|| format!("opening '{}'", input.display()))?;
            let summary =
                replay(&ledger, BufReader::new(file)).context("reading operations")?;
            info!(
                applied = summary.applied,
                skipped = summary.skipped,
                "replay finished"
            );
            write_balances(&ledger, std::io::stdout().lock())
        }
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, user, to, amount`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    op_type: String,
    user: u32,
    #[serde(deserialize_with = "csv::invalid_option")]
    to: Option<u32>,
    amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Adjust(AdjustmentRequest),
    Transfer(TransferRequest),
}

impl CsvRecord {
    /// Returns `None` for unknown types or a transfer without a recipient.
    fn into_operation(self) -> Option<Operation> {
        let user_id = UserId(self.user);

        if self.op_type.eq_ignore_ascii_case("transfer") {
            let to = UserId(self.to?);
            return Some(Operation::Transfer(TransferRequest::new(
                user_id,
                to,
                self.amount,
            )));
        }

        let kind = self.op_type.parse::<AdjustmentKind>().ok()?;
        Some(Operation::Adjust(AdjustmentRequest::new(
            user_id,
            self.amount,
            kind,
        )))
    }
}

/// Counts of rows applied and skipped by [`replay`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ReplaySummary {
    applied: usize,
    skipped: usize,
}

/// Applies every operation in a CSV stream to `ledger`.
///
/// Rows are streamed one at a time. Malformed rows and operations the ledger
/// rejects are logged and skipped.
///
/// # CSV Format
///
/// ```csv
/// type,user,to,amount
/// add,1,,100
/// subtract,1,,30
/// transfer,1,2,50
/// ```
///
/// # Errors
///
/// Returns a CSV error only when the underlying reader fails.
fn replay<S: Store, R: Read>(ledger: &Ledger<S>, reader: R) -> Result<ReplaySummary, csv::Error> {
    let mut summary = ReplaySummary::default();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(err) if err.is_io_error() => return Err(err),
            Err(err) => {
                warn!(error = %err, "skipping malformed row");
                summary.skipped += 1;
                continue;
            }
        };

        let Some(operation) = record.into_operation() else {
            warn!("skipping row with unknown operation");
            summary.skipped += 1;
            continue;
        };

        let outcome = match operation {
            Operation::Adjust(request) => ledger.adjust(request).map(|_| ()),
            Operation::Transfer(request) => ledger.transfer(request),
        };
        match outcome {
            Ok(()) => summary.applied += 1,
            Err(err) => {
                debug!(error = %err, ?operation, "skipping rejected operation");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

/// Writes every balance as CSV `id,balance`, ordered by ID.
fn write_balances<S: Store, W: Write>(ledger: &Ledger<S>, writer: W) -> anyhow::Result<()> {
    let mut wtr = Writer::from_writer(writer);
    for account in ledger.accounts().context("listing accounts")? {
        wtr.serialize(account).context("writing balances")?;
    }
    wtr.flush().context("writing balances")?;
    Ok(())
}
