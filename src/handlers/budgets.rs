use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::handlers::{error_response, OwnerId};
use crate::models::ids::parse_uuid;
use crate::models::Budget;
use crate::utils::date::month_bounds;
use crate::AppState;

#[derive(Deserialize)]
pub struct UpsertBudgetRequest {
    pub amount: Decimal,
}

#[derive(Deserialize)]
pub struct BudgetQuery {
    pub account_id: Option<String>,
}

#[derive(Serialize)]
pub struct CurrentBudgetResponse {
    pub budget: Option<Budget>,
    pub current_expenses: Decimal,
}

/// Current budget plus this month's expenses against the given account
/// (default account when none is given).
pub async fn get_budget(
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
    Query(query): Query<BudgetQuery>,
) -> Result<Json<CurrentBudgetResponse>, (StatusCode, Json<Value>)> {
    let budget = state
        .store
        .find_budget(user_id)
        .await
        .map_err(error_response)?;

    let account = match &query.account_id {
        Some(raw) => {
            let account_id = parse_uuid(raw, "account id").map_err(|e| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": e})),
                )
            })?;
            state
                .store
                .find_account(account_id, user_id)
                .await
                .map_err(error_response)?
        }
        None => state
            .store
            .find_default_account(user_id)
            .await
            .map_err(error_response)?,
    };

    let current_expenses = match account {
        Some(account) => {
            let (month_start, month_end) = month_bounds(Utc::now().date_naive());
            state
                .store
                .sum_expenses(account.id, month_start, month_end)
                .await
                .map_err(error_response)?
        }
        None => Decimal::ZERO,
    };

    Ok(Json(CurrentBudgetResponse {
        budget,
        current_expenses,
    }))
}

pub async fn upsert_budget(
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
    Json(payload): Json<UpsertBudgetRequest>,
) -> Result<Json<Budget>, (StatusCode, Json<Value>)> {
    let budget = state
        .store
        .upsert_budget(user_id, payload.amount)
        .await
        .map_err(error_response)?;
    Ok(Json(budget))
}
