use serde::{Deserialize, Serialize};

/// Why a referral code was not applied. Each variant leaves both accounts untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralRejection {
    AccountNotFound,
    AlreadyDecided,
    SelfReferral,
    UnknownCode,
}

impl ReferralRejection {
    pub fn message(&self) -> &'static str {
        match self {
            ReferralRejection::AccountNotFound => "Current user not found",
            ReferralRejection::AlreadyDecided => "Referral already processed",
            ReferralRejection::SelfReferral => "You cannot refer yourself",
            ReferralRejection::UnknownCode => "Invalid Referral Code",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferralOutcome {
    pub success: bool,
    pub message: String,
    pub rejection: Option<ReferralRejection>,
}

impl ReferralOutcome {
    pub fn applied() -> Self {
        Self {
            success: true,
            message: "Referral bonus applied successfully".to_string(),
            rejection: None,
        }
    }

    pub fn rejected(rejection: ReferralRejection) -> Self {
        Self {
            success: false,
            message: rejection.message().to_string(),
            rejection: Some(rejection),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApplyReferralRequest {
    pub code: String,
}
