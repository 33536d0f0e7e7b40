//! Outbound notifications. Fire-and-forget from the engine's perspective:
//! delivery failures are logged by callers and never roll back ledger state
//! that already committed.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::Value;

use crate::config::Config;
use crate::error::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateKind {
    BudgetAlert,
    MonthlyReport,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::BudgetAlert => "budget-alert",
            TemplateKind::MonthlyReport => "monthly-report",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        kind: TemplateKind,
        payload: Value,
    ) -> Result<(), EngineError>;
}

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let from: Mailbox = config
            .mail_from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid MAIL_FROM address: {e}"))?;

        let transport = if config.smtp_username.is_empty() {
            // Unauthenticated relay, e.g. a local dev mailcatcher.
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
                .credentials(Credentials::new(
                    config.smtp_username.clone(),
                    config.smtp_password.clone(),
                ))
                .build()
        };

        Ok(Self { transport, from })
    }
}

fn subject(kind: TemplateKind, payload: &Value) -> String {
    match kind {
        TemplateKind::BudgetAlert => match payload.get("account_name").and_then(Value::as_str) {
            Some(name) => format!("Budget Alert for {name}"),
            None => "Budget Alert".to_string(),
        },
        TemplateKind::MonthlyReport => match payload.get("month").and_then(Value::as_str) {
            Some(month) => format!("Financial Report for {month}"),
            None => "Financial Report".to_string(),
        },
    }
}

fn render_body(kind: TemplateKind, payload: &Value) -> String {
    let user_name = payload
        .get("user_name")
        .and_then(Value::as_str)
        .unwrap_or("there");
    let mut body = format!("Hi {user_name},\n\n");

    match kind {
        TemplateKind::BudgetAlert => {
            body.push_str(&format!(
                "You have used {}% of your monthly budget.\n",
                payload.get("percentage_used").cloned().unwrap_or_default()
            ));
            body.push_str(&format!(
                "Budget: {}\nSpent so far: {}\n",
                payload.get("budget_amount").cloned().unwrap_or_default(),
                payload.get("total_expenses").cloned().unwrap_or_default()
            ));
        }
        TemplateKind::MonthlyReport => {
            if let Some(stats) = payload.get("stats") {
                body.push_str(&format!(
                    "Here is your report for {}.\n\nIncome: {}\nExpenses: {}\nTransactions: {}\n",
                    payload.get("month").and_then(Value::as_str).unwrap_or(""),
                    stats.get("total_income").cloned().unwrap_or_default(),
                    stats.get("total_expenses").cloned().unwrap_or_default(),
                    stats.get("transaction_count").cloned().unwrap_or_default()
                ));
            }
            if let Some(insights) = payload.get("insights").and_then(Value::as_array) {
                body.push_str("\nInsights:\n");
                for insight in insights {
                    if let Some(text) = insight.as_str() {
                        body.push_str(&format!("- {text}\n"));
                    }
                }
            }
        }
    }
    body
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(
        &self,
        recipient: &str,
        kind: TemplateKind,
        payload: Value,
    ) -> Result<(), EngineError> {
        let to: Mailbox = recipient.parse().map_err(|e| {
            EngineError::Validation(format!("invalid recipient address {recipient}: {e}"))
        })?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject(kind, &payload))
            .header(ContentType::TEXT_PLAIN)
            .body(render_body(kind, &payload))
            .map_err(|e| EngineError::Internal(e.into()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| EngineError::Unavailable(format!("smtp send failed: {e}")))?;
        Ok(())
    }
}
