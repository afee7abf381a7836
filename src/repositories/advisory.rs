use crate::models::advisory::{RiskAssessment, RiskQuery};

use anyhow::bail;
use async_trait::async_trait;

/// Scores a deposit reference for fraud risk.
#[async_trait]
pub trait RiskAdvisor: Send + Sync + 'static {
    async fn assess(
        &self,
        reference: &str,
        amount_in_cents: i64,
        method: &str,
    ) -> Result<RiskAssessment, anyhow::Error>;
}

pub struct HttpRiskAdvisor {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpRiskAdvisor {
    pub fn new(url: String, api_key: Option<String>) -> Self {
        Self {
            url,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RiskAdvisor for HttpRiskAdvisor {
    async fn assess(
        &self,
        reference: &str,
        amount_in_cents: i64,
        method: &str,
    ) -> Result<RiskAssessment, anyhow::Error> {
        let payload = RiskQuery {
            reference,
            amount_in_cents,
            method,
        };

        let mut request = self
            .client
            .post(format!("{}/api/risk", self.url))
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            bail!("Advisory: unexpected status {}.", response.status());
        }

        let assessment: RiskAssessment = response.json().await?;
        if !(0.0..=100.0).contains(&assessment.risk_score) {
            bail!("Advisory: risk score out of range.");
        }

        Ok(assessment)
    }
}

/// Stand-in when no advisory endpoint is configured; every call takes the manual-review path.
pub struct UnconfiguredRiskAdvisor;

#[async_trait]
impl RiskAdvisor for UnconfiguredRiskAdvisor {
    async fn assess(
        &self,
        _reference: &str,
        _amount_in_cents: i64,
        _method: &str,
    ) -> Result<RiskAssessment, anyhow::Error> {
        bail!("Advisory: no endpoint configured.")
    }
}
