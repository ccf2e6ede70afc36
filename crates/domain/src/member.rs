//! Organization members and their roles.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sentinel_core::{AppError, AppResult, NonEmptyString, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::TenantScoped;

/// Role of a member inside one organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    /// Full administrative access.
    Admin,
    /// Can triage threats.
    Analyst,
    /// Read-only access.
    Viewer,
}

impl MemberRole {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Analyst => "analyst",
            Self::Viewer => "viewer",
        }
    }

    /// Returns whether the role may change tenant configuration.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Returns whether the role may triage threats.
    #[must_use]
    pub fn can_triage(&self) -> bool {
        matches!(self, Self::Admin | Self::Analyst)
    }
}

impl FromStr for MemberRole {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "analyst" => Ok(Self::Analyst),
            "viewer" => Ok(Self::Viewer),
            _ => Err(AppError::Validation(format!("unknown member role '{value}'"))),
        }
    }
}

/// Validated, lower-cased email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Creates a validated email address.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim().to_lowercase();

        let Some((local, domain)) = trimmed.split_once('@') else {
            return Err(AppError::Validation(
                "email address must contain exactly one '@'".to_owned(),
            ));
        };

        if local.is_empty() || domain.contains('@') {
            return Err(AppError::Validation(
                "email address must contain exactly one '@'".to_owned(),
            ));
        }

        if domain.is_empty() || !domain.contains('.') {
            return Err(AppError::Validation(
                "email domain must contain at least one '.'".to_owned(),
            ));
        }

        if trimmed.len() > 254 {
            return Err(AppError::Validation(
                "email address must not exceed 254 characters".to_owned(),
            ));
        }

        Ok(Self(trimmed))
    }

    /// Returns the validated email string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// A user account inside one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    id: Uuid,
    tenant_id: TenantId,
    email: EmailAddress,
    full_name: NonEmptyString,
    /// Current role.
    pub role: MemberRole,
    /// Whether the member may sign in.
    pub is_active: bool,
    /// Sessions issued before this instant are invalid.
    pub sessions_revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Member {
    /// Creates a new active member.
    pub fn new(
        tenant_id: TenantId,
        email: &str,
        full_name: &str,
        role: MemberRole,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id,
            email: EmailAddress::new(email)?,
            full_name: NonEmptyString::new(full_name)?,
            role,
            is_active: true,
            sessions_revoked_at: None,
            created_at,
        })
    }

    /// Rebuilds a member from persisted fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: Uuid,
        tenant_id: TenantId,
        email: &str,
        full_name: &str,
        role: MemberRole,
        is_active: bool,
        sessions_revoked_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            tenant_id,
            email: EmailAddress::new(email)?,
            full_name: NonEmptyString::new(full_name)?,
            role,
            is_active,
            sessions_revoked_at,
            created_at,
        })
    }

    /// Returns the member identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the email address.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Returns the full name.
    #[must_use]
    pub fn full_name(&self) -> &str {
        self.full_name.as_str()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl TenantScoped for Member {
    const ENTITY_LABEL: &'static str = "member";

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn row_id(&self) -> Uuid {
        self.id
    }
}
