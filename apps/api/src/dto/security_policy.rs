use std::str::FromStr;

use sentinel_core::AppError;
use sentinel_domain::{AnomalySensitivity, SecurityPolicy, SecurityPolicySettings};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::format_timestamp;

/// API representation of the organization security policy.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/security-policy-response.ts"
)]
pub struct SecurityPolicyResponse {
    pub id: String,
    pub alert_threshold_bps: u16,
    pub block_threshold_bps: u16,
    pub velocity_threshold: u32,
    pub anomaly_sensitivity: String,
    pub enable_auto_block: bool,
    pub enable_geo_blocking: bool,
    pub blocked_countries: Vec<String>,
    pub enable_ip_reputation_check: bool,
    pub suspicious_activity_alert_email: bool,
    pub updated_at: String,
}

impl From<SecurityPolicy> for SecurityPolicyResponse {
    fn from(value: SecurityPolicy) -> Self {
        let id = value.id().to_string();
        let settings = value.settings;
        Self {
            id,
            alert_threshold_bps: settings.alert_threshold_bps,
            block_threshold_bps: settings.block_threshold_bps,
            velocity_threshold: settings.velocity_threshold,
            anomaly_sensitivity: settings.anomaly_sensitivity.as_str().to_owned(),
            enable_auto_block: settings.enable_auto_block,
            enable_geo_blocking: settings.enable_geo_blocking,
            blocked_countries: settings.blocked_countries,
            enable_ip_reputation_check: settings.enable_ip_reputation_check,
            suspicious_activity_alert_email: settings.suspicious_activity_alert_email,
            updated_at: format_timestamp(value.updated_at),
        }
    }
}

/// Incoming payload replacing the security policy settings.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/update-security-policy-request.ts"
)]
pub struct UpdateSecurityPolicyRequest {
    pub alert_threshold_bps: u16,
    pub block_threshold_bps: u16,
    pub velocity_threshold: u32,
    pub anomaly_sensitivity: String,
    pub enable_auto_block: bool,
    pub enable_geo_blocking: bool,
    #[serde(default)]
    pub blocked_countries: Vec<String>,
    pub enable_ip_reputation_check: bool,
    pub suspicious_activity_alert_email: bool,
}

impl TryFrom<UpdateSecurityPolicyRequest> for SecurityPolicySettings {
    type Error = AppError;

    fn try_from(value: UpdateSecurityPolicyRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            alert_threshold_bps: value.alert_threshold_bps,
            block_threshold_bps: value.block_threshold_bps,
            velocity_threshold: value.velocity_threshold,
            anomaly_sensitivity: AnomalySensitivity::from_str(value.anomaly_sensitivity.as_str())?,
            enable_auto_block: value.enable_auto_block,
            enable_geo_blocking: value.enable_geo_blocking,
            blocked_countries: value.blocked_countries,
            enable_ip_reputation_check: value.enable_ip_reputation_check,
            suspicious_activity_alert_email: value.suspicious_activity_alert_email,
        })
    }
}
