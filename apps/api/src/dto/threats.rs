use std::net::IpAddr;
use std::str::FromStr;

use chrono::Utc;
use sentinel_application::ThreatListQuery;
use sentinel_application::ports::SeverityCount;
use sentinel_core::AppError;
use sentinel_domain::{ThreatLog, ThreatObservation, ThreatSeverity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use super::{format_timestamp, parse_timestamp};

/// Incoming threat observation from a sensor.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/ingest-threat-request.ts"
)]
pub struct IngestThreatRequest {
    pub occurred_at: Option<String>,
    pub source_ip: String,
    pub destination_ip: Option<String>,
    pub user_ref: Option<String>,
    pub user_agent: Option<String>,
    pub action: String,
    pub resource: String,
    pub method: Option<String>,
    pub status_code: Option<u16>,
    pub anomaly_score: f64,
    pub risk_score: f64,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub ai_flagged: bool,
    #[ts(type = "Record<string, unknown> | null")]
    pub raw_data: Option<Value>,
    pub severity: Option<String>,
}

impl IngestThreatRequest {
    /// Converts the payload into an observation and optional severity override.
    pub fn into_observation(self) -> Result<(ThreatObservation, Option<ThreatSeverity>), AppError> {
        let occurred_at = match self.occurred_at.as_deref() {
            Some(value) => parse_timestamp("occurred_at", value)?,
            None => Utc::now(),
        };
        let severity = self
            .severity
            .as_deref()
            .map(ThreatSeverity::from_str)
            .transpose()?;

        let observation = ThreatObservation {
            occurred_at,
            source_ip: parse_ip("source_ip", self.source_ip.as_str())?,
            destination_ip: self
                .destination_ip
                .as_deref()
                .map(|value| parse_ip("destination_ip", value))
                .transpose()?,
            user_ref: self.user_ref,
            user_agent: self.user_agent,
            action: self.action,
            resource: self.resource,
            method: self.method.map(|method| method.to_ascii_uppercase()),
            status_code: self.status_code,
            anomaly_score: self.anomaly_score,
            risk_score: self.risk_score,
            is_blocked: self.is_blocked,
            ai_flagged: self.ai_flagged,
            raw_data: self
                .raw_data
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
        };

        Ok((observation, severity))
    }
}

fn parse_ip(field: &str, value: &str) -> Result<IpAddr, AppError> {
    IpAddr::from_str(value.trim())
        .map_err(|_| AppError::Validation(format!("{field} '{value}' is not an IP address")))
}

/// API representation of a threat log.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/threat-response.ts"
)]
pub struct ThreatResponse {
    pub id: String,
    pub occurred_at: String,
    pub source_ip: String,
    pub destination_ip: Option<String>,
    pub user_ref: Option<String>,
    pub user_agent: Option<String>,
    pub action: String,
    pub resource: String,
    pub method: Option<String>,
    pub status_code: Option<u16>,
    pub anomaly_score: f64,
    pub risk_score: f64,
    pub is_blocked: bool,
    pub ai_flagged: bool,
    #[ts(type = "Record<string, unknown>")]
    pub raw_data: Value,
    pub severity: String,
    pub false_positive: Option<bool>,
    pub created_at: String,
}

impl From<ThreatLog> for ThreatResponse {
    fn from(value: ThreatLog) -> Self {
        let id = value.id().to_string();
        let created_at = format_timestamp(value.created_at());
        let observation = value.observation;

        Self {
            id,
            occurred_at: format_timestamp(observation.occurred_at),
            source_ip: observation.source_ip.to_string(),
            destination_ip: observation.destination_ip.map(|ip| ip.to_string()),
            user_ref: observation.user_ref,
            user_agent: observation.user_agent,
            action: observation.action,
            resource: observation.resource,
            method: observation.method,
            status_code: observation.status_code,
            anomaly_score: observation.anomaly_score,
            risk_score: observation.risk_score,
            is_blocked: observation.is_blocked,
            ai_flagged: observation.ai_flagged,
            raw_data: observation.raw_data,
            severity: value.severity.as_str().to_owned(),
            false_positive: value.false_positive,
            created_at,
        }
    }
}

/// Query parameters for threat listing.
#[derive(Debug, Default, Deserialize)]
pub struct ThreatListParams {
    pub severity: Option<String>,
    pub days: Option<u32>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ThreatListParams {
    pub fn into_query(self) -> Result<ThreatListQuery, AppError> {
        let defaults = ThreatListQuery::default();
        Ok(ThreatListQuery {
            severity: self
                .severity
                .as_deref()
                .map(ThreatSeverity::from_str)
                .transpose()?,
            days: self.days.unwrap_or(defaults.days),
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
        })
    }
}

/// Query parameters for the severity summary.
#[derive(Debug, Default, Deserialize)]
pub struct ThreatSummaryParams {
    pub days: Option<u32>,
}

/// Threat count for one severity.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/severity-count-response.ts"
)]
pub struct SeverityCountResponse {
    pub severity: String,
    #[ts(type = "number")]
    pub count: u64,
}

impl From<SeverityCount> for SeverityCountResponse {
    fn from(value: SeverityCount) -> Self {
        Self {
            severity: value.severity.as_str().to_owned(),
            count: value.count,
        }
    }
}

/// Severity summary over a look-back window.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/threat-summary-response.ts"
)]
pub struct ThreatSummaryResponse {
    pub days: u32,
    pub counts: Vec<SeverityCountResponse>,
}

/// Incoming payload for a false positive verdict.
#[derive(Debug, Default, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/flag-false-positive-request.ts"
)]
pub struct FlagFalsePositiveRequest {
    #[serde(default)]
    pub reason: Option<String>,
}
