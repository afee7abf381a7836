use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub is_valid_format: bool,
    pub reasoning: String,
}

impl RiskAssessment {
    pub fn manual_review() -> Self {
        Self {
            risk_score: 50.0,
            is_valid_format: true,
            reasoning: "Advisory service unavailable. Manual review queued.".to_string(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.risk_score > 80.0 || !self.is_valid_format
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskQuery<'a> {
    pub reference: &'a str,
    pub amount_in_cents: i64,
    pub method: &'a str,
}
