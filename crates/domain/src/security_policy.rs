//! Per-organization detection policy.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sentinel_core::{AppError, AppResult, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::TenantScoped;

/// Sensitivity of the anomaly detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySensitivity {
    /// Fewer alerts.
    Low,
    /// Balanced.
    Medium,
    /// More alerts.
    High,
}

impl AnomalySensitivity {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for AnomalySensitivity {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(AppError::Validation(format!(
                "unknown anomaly sensitivity '{value}'"
            ))),
        }
    }
}

/// Tunable policy settings.
///
/// Thresholds are stored in basis points (0..=10000) so that policy values
/// can be audited without floating point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicySettings {
    /// Risk score that raises an alert, in basis points.
    pub alert_threshold_bps: u16,
    /// Risk score that blocks a request, in basis points.
    pub block_threshold_bps: u16,
    /// Suspicious requests per minute before velocity alerts.
    pub velocity_threshold: u32,
    /// Detector sensitivity.
    pub anomaly_sensitivity: AnomalySensitivity,
    /// Whether requests over the block threshold are blocked.
    pub enable_auto_block: bool,
    /// Whether geo blocking is active.
    pub enable_geo_blocking: bool,
    /// ISO 3166-1 alpha-2 codes, sorted and unique.
    pub blocked_countries: Vec<String>,
    /// Whether IP reputation lookups run.
    pub enable_ip_reputation_check: bool,
    /// Whether admins receive alert e-mails.
    pub suspicious_activity_alert_email: bool,
}

impl Default for SecurityPolicySettings {
    fn default() -> Self {
        Self {
            alert_threshold_bps: 6_000,
            block_threshold_bps: 8_000,
            velocity_threshold: 5,
            anomaly_sensitivity: AnomalySensitivity::Medium,
            enable_auto_block: false,
            enable_geo_blocking: false,
            blocked_countries: Vec::new(),
            enable_ip_reputation_check: true,
            suspicious_activity_alert_email: true,
        }
    }
}

impl SecurityPolicySettings {
    /// Validates thresholds and normalizes the country list.
    pub fn normalized(mut self) -> AppResult<Self> {
        if self.block_threshold_bps > 10_000 || self.alert_threshold_bps > 10_000 {
            return Err(AppError::Validation(
                "risk thresholds must be between 0 and 10000 basis points".to_owned(),
            ));
        }

        if self.alert_threshold_bps > self.block_threshold_bps {
            return Err(AppError::Validation(
                "alert threshold must not exceed block threshold".to_owned(),
            ));
        }

        if self.velocity_threshold == 0 {
            return Err(AppError::Validation(
                "velocity threshold must be positive".to_owned(),
            ));
        }

        let mut countries = Vec::with_capacity(self.blocked_countries.len());
        for country in self.blocked_countries {
            let code = country.trim().to_ascii_uppercase();
            if code.len() != 2 || !code.chars().all(|character| character.is_ascii_alphabetic()) {
                return Err(AppError::Validation(format!(
                    "'{country}' is not an ISO 3166-1 alpha-2 country code"
                )));
            }
            countries.push(code);
        }
        countries.sort();
        countries.dedup();
        self.blocked_countries = countries;

        Ok(self)
    }
}

/// The single policy row of an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    id: Uuid,
    tenant_id: TenantId,
    /// Current settings.
    pub settings: SecurityPolicySettings,
    /// Last change timestamp.
    pub updated_at: DateTime<Utc>,
}

impl SecurityPolicy {
    /// Creates the default policy for a new organization.
    #[must_use]
    pub fn default_for(tenant_id: TenantId, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            settings: SecurityPolicySettings::default(),
            updated_at: now,
        }
    }

    /// Rebuilds a policy from persisted fields.
    #[must_use]
    pub fn from_parts(
        id: Uuid,
        tenant_id: TenantId,
        settings: SecurityPolicySettings,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            settings,
            updated_at,
        }
    }

    /// Returns the policy identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl TenantScoped for SecurityPolicy {
    const ENTITY_LABEL: &'static str = "security policy";

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn row_id(&self) -> Uuid {
        self.id
    }
}
