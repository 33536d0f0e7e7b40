use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::handlers::{error_response, OwnerId};
use crate::models::ids::parse_uuid;
use crate::models::{Account, Transaction};
use crate::store::NewAccount;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
    pub balance: Decimal,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Serialize)]
pub struct AccountWithTransactions {
    #[serde(flatten)]
    pub account: Account,
    pub transactions: Vec<Transaction>,
    pub transaction_count: usize,
}

pub async fn create_account(
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), (StatusCode, Json<Value>)> {
    let account = state
        .store
        .create_account(NewAccount {
            user_id,
            name: payload.name,
            balance: payload.balance,
            is_default: payload.is_default,
        })
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_accounts(
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
) -> Result<Json<Vec<Account>>, (StatusCode, Json<Value>)> {
    let accounts = state
        .store
        .list_accounts(user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(accounts))
}

pub async fn get_account(
    Path(account_id): Path<String>,
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
) -> Result<Json<AccountWithTransactions>, (StatusCode, Json<Value>)> {
    let account_id = parse_uuid(&account_id, "account id").map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e})),
        )
    })?;

    let account = state
        .store
        .find_account(account_id, user_id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(EngineError::NotFound("account")))?;

    let transactions = state
        .store
        .list_transactions(account_id, user_id)
        .await
        .map_err(error_response)?;

    Ok(Json(AccountWithTransactions {
        transaction_count: transactions.len(),
        account,
        transactions,
    }))
}

pub async fn set_default_account(
    Path(account_id): Path<String>,
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
) -> Result<Json<Account>, (StatusCode, Json<Value>)> {
    let account_id = parse_uuid(&account_id, "account id").map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e})),
        )
    })?;

    let account = state
        .store
        .set_default_account(account_id, user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(account))
}
