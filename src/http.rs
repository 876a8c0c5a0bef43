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

//! JSON API over a [`Ledger`].
//!
//! ## Endpoints
//!
//! All routes are mounted under `/api/users`:
//!
//! - `GET /balance` with `{"user_id": 1}` - Get a user's balance
//! - `POST /balance` with `{"user_id": 1, "amount": 10, "type": "add"}` - Add or subtract
//! - `POST /p2p` with `{"from_user_id": 1, "to_user_id": 2, "amount": 5}` - Transfer
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:8000/api/users/balance \
//!   -H "Content-Type: application/json" \
//!   -d '{"user_id": 1, "amount": 100, "type": "add"}'
//!
//! curl -X GET http://localhost:8000/api/users/balance \
//!   -H "Content-Type: application/json" \
//!   -d '{"user_id": 1}'
//! ```
//!
//! Requests are shape-checked and pre-checked against current balances here,
//! then handed to the ledger, which enforces the same rules again inside its
//! transaction. Ledger calls block on the store, so they run on tokio's
//! blocking pool.

use crate::{
    AdjustmentKind, AdjustmentRequest, ErrorKind, Ledger, LedgerError, Store, TransferRequest,
    UserId,
};
use axum::{
    Json, Router,
    extract::{OriginalUri, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

// === Request/Response DTOs ===

/// Request body for balance lookups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BalanceQuery {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentResponse {
    pub message: String,
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Response body for errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the ledger.
pub struct AppState<S> {
    pub ledger: Arc<Ledger<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

// === Error Handling ===

/// Failure of a request, convertible into an HTTP response.
#[derive(Debug)]
pub enum AppError {
    /// Body missing, malformed or of the wrong shape.
    InvalidBody(JsonRejection),
    /// The ledger refused or failed the operation.
    Ledger {
        action: &'static str,
        source: LedgerError,
    },
    /// The blocking task running the operation died.
    Internal(String),
}

impl AppError {
    fn ledger(action: &'static str) -> impl FnOnce(LedgerError) -> AppError {
        move |source| AppError::Ledger { action, source }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidBody(rejection)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidBody(rejection) => (
                StatusCode::BAD_REQUEST,
                "INVALID_BODY",
                format!(
                    "parsing data from request body failed with error: {}",
                    rejection.body_text()
                ),
            ),
            AppError::Ledger { action, source } => {
                let code = match source.kind() {
                    ErrorKind::NotFound => "NOT_FOUND",
                    ErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
                    ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
                    ErrorKind::StoreFailure => "STORE_FAILURE",
                };
                if source.kind().is_client_error() {
                    debug!(error = %source, action, "request rejected");
                    (StatusCode::BAD_REQUEST, code, source.to_string())
                } else {
                    error!(error = %source, action, "store failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        code,
                        format!("{action} failed with error: {source}"),
                    )
                }
            }
            AppError::Internal(message) => {
                error!(%message, "request task failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
            }
        };

        (
            status,
            Json(ErrorResponse {
                message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

/// Runs a ledger call on the blocking pool.
///
/// If the request is abandoned the task still runs to completion, so any
/// transaction it opened is committed or rolled back, never left open.
async fn run_blocking<S, T, F>(
    state: &AppState<S>,
    action: &'static str,
    op: F,
) -> Result<T, AppError>
where
    S: Store + 'static,
    T: Send + 'static,
    F: FnOnce(&Ledger<S>) -> Result<T, LedgerError> + Send + 'static,
{
    let ledger = Arc::clone(&state.ledger);
    tokio::task::spawn_blocking(move || op(&ledger))
        .await
        .map_err(|err| AppError::Internal(format!("{action} failed with error: {err}")))?
        .map_err(AppError::ledger(action))
}

// === Pre-checks ===

fn check_adjustment<S: Store>(
    ledger: &Ledger<S>,
    request: &AdjustmentRequest,
) -> Result<(), LedgerError> {
    if request.kind == AdjustmentKind::Subtract {
        let account = ledger
            .balance(request.user_id)?
            .ok_or(LedgerError::NotFound(request.user_id))?;
        account.debit(request.amount)?;
    }
    Ok(())
}

fn check_transfer<S: Store>(
    ledger: &Ledger<S>,
    request: &TransferRequest,
) -> Result<(), LedgerError> {
    let payer = ledger
        .balance(request.from)?
        .ok_or(LedgerError::NotFound(request.from))?;
    payer.debit(request.amount)?;
    ledger
        .balance(request.to)?
        .ok_or(LedgerError::NotFound(request.to))?;
    Ok(())
}

// === Handlers ===

/// GET /api/users/balance - Get a user's balance.
async fn get_balance<S: Store + 'static>(
    State(state): State<AppState<S>>,
    payload: Result<Json<BalanceQuery>, JsonRejection>,
) -> Result<Json<BalanceResponse>, AppError> {
    let Json(BalanceQuery { user_id }) = payload?;

    let account = run_blocking(&state, "getting balance", move |ledger| {
        ledger.balance(user_id)?.ok_or(LedgerError::NotFound(user_id))
    })
    .await?;

    Ok(Json(BalanceResponse {
        balance: account.balance(),
    }))
}

/// POST /api/users/balance - Add to or subtract from a balance.
async fn adjust_balance<S: Store + 'static>(
    State(state): State<AppState<S>>,
    payload: Result<Json<AdjustmentRequest>, JsonRejection>,
) -> Result<Json<AdjustmentResponse>, AppError> {
    let Json(request) = payload?;
    request
        .validate()
        .map_err(AppError::ledger("making operation"))?;

    let account = run_blocking(&state, "making operation", move |ledger| {
        check_adjustment(ledger, &request)?;
        ledger.adjust(request)
    })
    .await?;

    Ok(Json(AdjustmentResponse {
        message: "operation completed".to_string(),
        balance: account.balance(),
    }))
}

/// POST /api/users/p2p - Transfer between two users.
async fn transfer<S: Store + 'static>(
    State(state): State<AppState<S>>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = payload?;
    request
        .validate()
        .map_err(AppError::ledger("making transfer"))?;

    run_blocking(&state, "making transfer", move |ledger| {
        check_transfer(ledger, &request)?;
        ledger.transfer(request)
    })
    .await?;

    Ok(Json(MessageResponse {
        message: "transfer completed".to_string(),
    }))
}

async fn route_not_found(
    OriginalUri(uri): OriginalUri,
) -> (StatusCode, Json<MessageResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(MessageResponse {
            message: format!("Route '{uri}' does not exist in this API!"),
        }),
    )
}

// === Router ===

pub fn router<S: Store + 'static>(ledger: Arc<Ledger<S>>) -> Router {
    let users = Router::new()
        .route("/balance", get(get_balance::<S>).post(adjust_balance::<S>))
        .route("/p2p", post(transfer::<S>));

    Router::new()
        .nest("/api/users", users)
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { ledger })
}

/// Serves the API on `listener` until Ctrl-C.
pub async fn serve<S: Store + 'static>(
    listener: TcpListener,
    ledger: Arc<Ledger<S>>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "ledger API listening");
    }
    axum::serve(listener, router(ledger))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            error!(error = %err, "cannot listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
