pub mod accounts;
pub mod budgets;
pub mod transactions;

pub use accounts::{
    create_account, get_account, get_accounts, set_default_account, AccountWithTransactions,
    CreateAccountRequest,
};
pub use budgets::{get_budget, upsert_budget, CurrentBudgetResponse, UpsertBudgetRequest};
pub use transactions::{
    bulk_delete_transactions, create_transaction, delete_transaction, get_transaction,
    BulkDeleteRequest, CreateTransactionRequest, UpdateTransactionRequest, update_transaction,
};

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::ids::parse_uuid;

/// Owner identity from the `x-user-id` header. Authentication itself is an
/// upstream gateway's job; this API only trusts the forwarded identity.
pub struct OwnerId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({"error": "Missing x-user-id header"})),
                )
            })?;
        let user_id = parse_uuid(raw, "user id").map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": e})),
            )
        })?;
        Ok(OwnerId(user_id))
    }
}

/// Translate engine errors into the API's error body shape.
pub(crate) fn error_response(e: EngineError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Validation(_) | EngineError::InvalidIntervalKind(_) => {
            StatusCode::BAD_REQUEST
        }
        EngineError::Unavailable(_) | EngineError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Internal error: {e:?}");
        (
            status,
            Json(serde_json::json!({"error": "Internal server error"})),
        )
    } else {
        (status, Json(serde_json::json!({"error": e.to_string()})))
    }
}
