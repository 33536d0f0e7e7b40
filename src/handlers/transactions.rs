use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::handlers::{error_response, OwnerId};
use crate::models::ids::parse_uuid;
use crate::models::{RecurringInterval, Transaction, TransactionKind};
use crate::store::{NewTransaction, TransactionUpdate};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateTransactionRequest {
    pub account_id: String,
    pub kind: String, // "INCOME" or "EXPENSE"
    pub amount: Decimal,
    pub date: String, // ISO date string
    pub category: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurring_interval: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateTransactionRequest {
    pub kind: Option<String>,
    pub amount: Option<Decimal>,
    pub date: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub is_recurring: Option<bool>,
    pub recurring_interval: Option<String>,
}

#[derive(Deserialize)]
pub struct BulkDeleteRequest {
    pub transaction_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
}

fn bad_request(message: String) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message})),
    )
}

fn parse_kind(raw: &str) -> Result<TransactionKind, (StatusCode, Json<Value>)> {
    TransactionKind::from_str(raw)
        .ok_or_else(|| bad_request(format!("Invalid transaction kind: {raw}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate, (StatusCode, Json<Value>)> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| bad_request(format!("Invalid date format: {e}")))
}

fn parse_interval(raw: &str) -> Result<RecurringInterval, (StatusCode, Json<Value>)> {
    RecurringInterval::from_str(raw)
        .ok_or_else(|| error_response(EngineError::InvalidIntervalKind(raw.to_string())))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
    Json(payload): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), (StatusCode, Json<Value>)> {
    let account_id = parse_uuid(&payload.account_id, "account id")
        .map_err(bad_request)?;
    let kind = parse_kind(&payload.kind)?;
    let date = parse_date(&payload.date)?;
    let recurring_interval = payload
        .recurring_interval
        .as_deref()
        .map(parse_interval)
        .transpose()?;

    let transaction = state
        .store
        .create_transaction(NewTransaction {
            account_id,
            user_id,
            kind,
            amount: payload.amount,
            date,
            category: payload.category,
            description: payload.description,
            is_recurring: payload.is_recurring,
            recurring_interval,
        })
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn get_transaction(
    Path(transaction_id): Path<String>,
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
) -> Result<Json<Transaction>, (StatusCode, Json<Value>)> {
    let transaction_id = parse_uuid(&transaction_id, "transaction id").map_err(bad_request)?;

    let transaction = state
        .store
        .find_transaction(transaction_id, user_id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(EngineError::NotFound("transaction")))?;
    Ok(Json(transaction))
}

pub async fn update_transaction(
    Path(transaction_id): Path<String>,
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
    Json(payload): Json<UpdateTransactionRequest>,
) -> Result<Json<Transaction>, (StatusCode, Json<Value>)> {
    let transaction_id = parse_uuid(&transaction_id, "transaction id").map_err(bad_request)?;

    let kind = payload.kind.as_deref().map(parse_kind).transpose()?;
    let date = payload.date.as_deref().map(parse_date).transpose()?;
    let recurring_interval = payload
        .recurring_interval
        .as_deref()
        .map(parse_interval)
        .transpose()?
        .map(Some);

    let transaction = state
        .store
        .update_transaction(
            transaction_id,
            user_id,
            TransactionUpdate {
                kind,
                amount: payload.amount,
                date,
                category: payload.category,
                description: payload.description.map(Some),
                is_recurring: payload.is_recurring,
                recurring_interval,
            },
        )
        .await
        .map_err(error_response)?;

    Ok(Json(transaction))
}

pub async fn delete_transaction(
    Path(transaction_id): Path<String>,
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let parsed = parse_uuid(&transaction_id, "transaction id").map_err(bad_request)?;

    let deleted = state
        .store
        .delete_transactions(&[parsed], user_id)
        .await
        .map_err(error_response)?;
    if deleted == 0 {
        return Err(error_response(EngineError::NotFound("transaction")));
    }

    Ok(Json(serde_json::json!({
        "id": transaction_id,
        "message": "Transaction deleted successfully"
    })))
}

pub async fn bulk_delete_transactions(
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
    Json(payload): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, (StatusCode, Json<Value>)> {
    let mut ids = Vec::with_capacity(payload.transaction_ids.len());
    for raw in &payload.transaction_ids {
        ids.push(parse_uuid(raw, "transaction id").map_err(bad_request)?);
    }

    let deleted = state
        .store
        .delete_transactions(&ids, user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(BulkDeleteResponse { deleted }))
}
