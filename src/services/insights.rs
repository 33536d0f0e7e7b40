//! Best-effort financial insights from an external provider. Report delivery
//! is the contract to uphold; insight quality is not, so any failure here
//! degrades to a static fallback set instead of aborting the report.

use std::time::Duration;

use reqwest::Client;
use tracing::warn;

use crate::services::reports::MonthlyStats;

pub struct InsightsClient {
    client: Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl InsightsClient {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url,
            api_key,
        }
    }

    pub async fn monthly_insights(&self, stats: &MonthlyStats, month: &str) -> Vec<String> {
        match self.fetch(stats, month).await {
            Ok(insights) if !insights.is_empty() => insights,
            Ok(_) => {
                warn!("insights provider returned an empty set, using fallback");
                fallback_insights()
            }
            Err(e) => {
                warn!(error = %e, "insights provider unavailable, using fallback");
                fallback_insights()
            }
        }
    }

    async fn fetch(&self, stats: &MonthlyStats, month: &str) -> anyhow::Result<Vec<String>> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no insights provider configured"))?;

        let mut request = self
            .client
            .post(format!("{base_url}/v1/monthly-insights"))
            .json(&serde_json::json!({ "stats": stats, "month": month }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<Vec<String>>().await?)
    }
}

pub fn fallback_insights() -> Vec<String> {
    vec![
        "Your highest expense category this month might need attention.".to_string(),
        "Consider setting up a budget for better financial management.".to_string(),
        "Track your recurring expenses to identify potential savings.".to_string(),
    ]
}
