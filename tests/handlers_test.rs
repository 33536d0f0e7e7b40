// HTTP surface: owner header handling, account/transaction/budget CRUD with
// balance arithmetic, and parse-boundary rejections.

mod test_helpers;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use finance_tracker_api::services::notifier::Notifier;
use finance_tracker_api::store::{LedgerStore, MemoryLedgerStore};
use finance_tracker_api::{router, AppState, Config};

use test_helpers::{create_test_user, dec, RecordingNotifier};

struct TestApp {
    server: TestServer,
    store: Arc<MemoryLedgerStore>,
    user_id: Uuid,
}

async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryLedgerStore::new());
    let user_id = create_test_user(&store).await;
    let notifier: Arc<dyn Notifier> = Arc::new(RecordingNotifier::new());
    let state = AppState {
        store: store.clone(),
        notifier,
        config: Arc::new(Config::from_env().expect("config from defaults")),
    };
    let server = TestServer::new(router(state)).expect("test server");
    TestApp {
        server,
        store,
        user_id,
    }
}

fn user_header(user_id: Uuid) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-user-id"),
        HeaderValue::from_str(&user_id.to_string()).expect("header value"),
    )
}

fn balance_of(body: &Value) -> Decimal {
    body["balance"]
        .as_str()
        .expect("balance in body")
        .parse()
        .expect("decimal balance")
}

#[tokio::test]
async fn requests_without_an_owner_header_are_unauthorized() {
    let app = spawn_app().await;
    let response = app.server.get("/api/accounts").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn account_creation_enforces_a_single_default() {
    let app = spawn_app().await;
    let (name, value) = user_header(app.user_id);

    // First account is forced default even when the request says otherwise.
    let response = app
        .server
        .post("/api/accounts")
        .add_header(name.clone(), value.clone())
        .json(&json!({"name": "Checking", "balance": "100.00", "is_default": false}))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let first: Value = response.json();
    assert_eq!(first["is_default"], json!(true));

    let response = app
        .server
        .post("/api/accounts")
        .add_header(name.clone(), value.clone())
        .json(&json!({"name": "Savings", "balance": "500.00", "is_default": true}))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let response = app
        .server
        .get("/api/accounts")
        .add_header(name, value)
        .await;
    let accounts: Vec<Value> = response.json();
    assert_eq!(accounts.len(), 2);
    let defaults: Vec<_> = accounts
        .iter()
        .filter(|a| a["is_default"] == json!(true))
        .collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0]["name"], json!("Savings"));
}

#[tokio::test]
async fn creating_a_transaction_moves_the_balance() {
    let app = spawn_app().await;
    let (name, value) = user_header(app.user_id);

    let response = app
        .server
        .post("/api/accounts")
        .add_header(name.clone(), value.clone())
        .json(&json!({"name": "Checking", "balance": "100.00"}))
        .await;
    let account: Value = response.json();
    let account_id = account["id"].as_str().expect("account id").to_string();

    let response = app
        .server
        .post("/api/transactions")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "account_id": account_id,
            "kind": "EXPENSE",
            "amount": "30.00",
            "date": "2026-08-01",
            "category": "groceries"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let response = app
        .server
        .get(&format!("/api/accounts/{account_id}"))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(balance_of(&body), dec("70.00"));
    assert_eq!(body["transaction_count"], json!(1));
}

#[tokio::test]
async fn unknown_recurring_interval_is_a_bad_request() {
    let app = spawn_app().await;
    let (name, value) = user_header(app.user_id);

    let response = app
        .server
        .post("/api/accounts")
        .add_header(name.clone(), value.clone())
        .json(&json!({"name": "Checking", "balance": "100.00"}))
        .await;
    let account: Value = response.json();
    let account_id = account["id"].as_str().expect("account id");

    let response = app
        .server
        .post("/api/transactions")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "account_id": account_id,
            "kind": "EXPENSE",
            "amount": "10.00",
            "date": "2026-08-01",
            "category": "subscriptions",
            "is_recurring": true,
            "recurring_interval": "FORTNIGHTLY"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"]
        .as_str()
        .is_some_and(|e| e.contains("FORTNIGHTLY")));

    // Nothing was written.
    let account = app
        .store
        .find_account(
            account_id.parse().expect("uuid"),
            app.user_id,
        )
        .await
        .expect("store read")
        .expect("account exists");
    assert_eq!(account.balance, dec("100.00"));
}

#[tokio::test]
async fn deleting_a_transaction_restores_the_balance() {
    let app = spawn_app().await;
    let (name, value) = user_header(app.user_id);

    let response = app
        .server
        .post("/api/accounts")
        .add_header(name.clone(), value.clone())
        .json(&json!({"name": "Checking", "balance": "100.00"}))
        .await;
    let account: Value = response.json();
    let account_id = account["id"].as_str().expect("account id").to_string();

    let response = app
        .server
        .post("/api/transactions")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "account_id": account_id,
            "kind": "EXPENSE",
            "amount": "40.00",
            "date": "2026-08-01",
            "category": "groceries"
        }))
        .await;
    let transaction: Value = response.json();
    let transaction_id = transaction["id"].as_str().expect("transaction id");

    let response = app
        .server
        .delete(&format!("/api/transactions/{transaction_id}"))
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = app
        .server
        .get(&format!("/api/accounts/{account_id}"))
        .add_header(name, value)
        .await;
    let body: Value = response.json();
    assert_eq!(balance_of(&body), dec("100.00"));
    assert_eq!(body["transaction_count"], json!(0));
}

#[tokio::test]
async fn budget_round_trip_reports_current_month_expenses() {
    let app = spawn_app().await;
    let (name, value) = user_header(app.user_id);

    let response = app
        .server
        .post("/api/accounts")
        .add_header(name.clone(), value.clone())
        .json(&json!({"name": "Checking", "balance": "1000.00"}))
        .await;
    let account: Value = response.json();
    let account_id = account["id"].as_str().expect("account id").to_string();

    let response = app
        .server
        .put("/api/budget")
        .add_header(name.clone(), value.clone())
        .json(&json!({"amount": "4000.00"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    // An expense dated today lands in the current month window.
    let today = chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string();
    app.server
        .post("/api/transactions")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "account_id": account_id,
            "kind": "EXPENSE",
            "amount": "250.00",
            "date": today,
            "category": "groceries"
        }))
        .await;

    let response = app
        .server
        .get("/api/budget")
        .add_query_param("account_id", &account_id)
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    let amount: Decimal = body["budget"]["amount"]
        .as_str()
        .expect("budget amount")
        .parse()
        .expect("decimal amount");
    assert_eq!(amount, dec("4000.00"));
    let expenses: Decimal = body["current_expenses"]
        .as_str()
        .expect("current expenses")
        .parse()
        .expect("decimal expenses");
    assert_eq!(expenses, dec("250.00"));
}
