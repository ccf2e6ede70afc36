//! Threat log entries produced by the detection pipeline.

use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sentinel_core::{AppError, AppResult, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::TenantScoped;

/// Severity assigned to a threat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatSeverity {
    /// Informational.
    Low,
    /// Needs review.
    Medium,
    /// Needs action.
    High,
    /// Needs immediate action.
    Critical,
}

impl ThreatSeverity {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Returns all severities from lowest to highest.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[Self::Low, Self::Medium, Self::High, Self::Critical]
    }

    /// Derives a severity from a risk score in `[0, 1]`.
    #[must_use]
    pub fn from_risk_score(risk_score: f64) -> Self {
        if risk_score >= 0.9 {
            Self::Critical
        } else if risk_score >= 0.7 {
            Self::High
        } else if risk_score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl FromStr for ThreatSeverity {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(AppError::Validation(format!(
                "invalid severity '{value}', must be one of low, medium, high, critical"
            ))),
        }
    }
}

/// Observed request fields of a threat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatObservation {
    /// When the request happened.
    pub occurred_at: DateTime<Utc>,
    /// Client address.
    pub source_ip: IpAddr,
    /// Target address, if known.
    pub destination_ip: Option<IpAddr>,
    /// Application user reported by the sensor.
    pub user_ref: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Action label.
    pub action: String,
    /// Resource path or name.
    pub resource: String,
    /// HTTP method.
    pub method: Option<String>,
    /// HTTP status code.
    pub status_code: Option<u16>,
    /// Anomaly score in `[0, 1]`.
    pub anomaly_score: f64,
    /// Risk score in `[0, 1]`.
    pub risk_score: f64,
    /// Whether the request was blocked.
    pub is_blocked: bool,
    /// Whether the scoring engine flagged the request.
    pub ai_flagged: bool,
    /// Raw sensor payload.
    pub raw_data: Value,
}

impl ThreatObservation {
    fn validate(&self) -> AppResult<()> {
        if self.action.trim().is_empty() || self.resource.trim().is_empty() {
            return Err(AppError::Validation(
                "threat action and resource must not be empty".to_owned(),
            ));
        }

        for (label, score) in [
            ("anomaly_score", self.anomaly_score),
            ("risk_score", self.risk_score),
        ] {
            if !(0.0..=1.0).contains(&score) {
                return Err(AppError::Validation(format!(
                    "{label} must be between 0 and 1"
                )));
            }
        }

        if !self.raw_data.is_object() {
            return Err(AppError::Validation(
                "raw_data must be a JSON object".to_owned(),
            ));
        }

        Ok(())
    }
}

/// A threat log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatLog {
    id: Uuid,
    tenant_id: TenantId,
    /// Observed request data.
    pub observation: ThreatObservation,
    /// Assigned severity.
    pub severity: ThreatSeverity,
    /// Analyst verdict; `None` until triaged.
    pub false_positive: Option<bool>,
    created_at: DateTime<Utc>,
}

impl ThreatLog {
    /// Creates a new threat log, deriving severity from the risk score when
    /// none is supplied.
    pub fn new(
        tenant_id: TenantId,
        observation: ThreatObservation,
        severity: Option<ThreatSeverity>,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        observation.validate()?;
        let severity =
            severity.unwrap_or_else(|| ThreatSeverity::from_risk_score(observation.risk_score));

        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id,
            observation,
            severity,
            false_positive: None,
            created_at,
        })
    }

    /// Rebuilds a threat log from persisted fields.
    #[must_use]
    pub fn from_parts(
        id: Uuid,
        tenant_id: TenantId,
        observation: ThreatObservation,
        severity: ThreatSeverity,
        false_positive: Option<bool>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            observation,
            severity,
            false_positive,
            created_at,
        }
    }

    /// Returns the threat identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Marks the threat as a false positive and unblocks it.
    pub fn flag_false_positive(&mut self) -> AppResult<()> {
        if self.false_positive == Some(true) {
            return Err(AppError::Conflict(format!(
                "threat '{}' is already flagged as false positive",
                self.id
            )));
        }

        self.false_positive = Some(true);
        self.observation.is_blocked = false;
        Ok(())
    }
}

impl TenantScoped for ThreatLog {
    const ENTITY_LABEL: &'static str = "threat";

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn row_id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use chrono::Utc;
    use sentinel_core::TenantId;
    use serde_json::json;

    use super::{ThreatLog, ThreatObservation, ThreatSeverity};

    fn observation(risk_score: f64) -> ThreatObservation {
        ThreatObservation {
            occurred_at: Utc::now(),
            source_ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
            destination_ip: None,
            user_ref: None,
            user_agent: None,
            action: "login".to_owned(),
            resource: "/api/v1/auth/login".to_owned(),
            method: Some("POST".to_owned()),
            status_code: Some(401),
            anomaly_score: 0.2,
            risk_score,
            is_blocked: true,
            ai_flagged: true,
            raw_data: json!({}),
        }
    }

    #[test]
    fn severity_is_derived_from_risk_score() {
        let threat = ThreatLog::new(TenantId::new(), observation(0.95), None, Utc::now());
        assert!(threat.is_ok());
        assert_eq!(
            threat.unwrap_or_else(|_| unreachable!()).severity,
            ThreatSeverity::Critical
        );
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        let threat = ThreatLog::new(TenantId::new(), observation(1.5), None, Utc::now());
        assert!(threat.is_err());
    }

    #[test]
    fn flagging_false_positive_unblocks_once() {
        let mut threat = ThreatLog::new(TenantId::new(), observation(0.5), None, Utc::now())
            .unwrap_or_else(|_| unreachable!());

        assert!(threat.flag_false_positive().is_ok());
        assert_eq!(threat.false_positive, Some(true));
        assert!(!threat.observation.is_blocked);
        assert!(threat.flag_false_positive().is_err());
    }
}
