use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::TenantId;

/// Identity of whoever performed an action inside a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    subject: String,
    member_id: Option<Uuid>,
    ip_address: Option<IpAddr>,
    user_agent: Option<String>,
}

impl ActorContext {
    /// Creates an actor for an organization member.
    #[must_use]
    pub fn member(
        member_id: Uuid,
        ip_address: Option<IpAddr>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            subject: format!("member:{member_id}"),
            member_id: Some(member_id),
            ip_address,
            user_agent,
        }
    }

    /// Creates an actor for a trusted background process.
    #[must_use]
    pub fn system(subject: impl Into<String>) -> Self {
        Self {
            subject: format!("system:{}", subject.into()),
            member_id: None,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Rebuilds an actor from persisted fields.
    #[must_use]
    pub fn from_parts(
        subject: String,
        member_id: Option<Uuid>,
        ip_address: Option<IpAddr>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            subject,
            member_id,
            ip_address,
            user_agent,
        }
    }

    /// Returns the stable actor subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Returns the member identifier when the actor is a member.
    #[must_use]
    pub fn member_id(&self) -> Option<Uuid> {
        self.member_id
    }

    /// Returns the client address reported by the gateway.
    #[must_use]
    pub fn ip_address(&self) -> Option<IpAddr> {
        self.ip_address
    }

    /// Returns the client user agent reported by the gateway.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}

/// Active tenant for one unit of work.
///
/// A context is created once per request or job and passed by reference to
/// every tenant-scoped port. It is never stored in shared mutable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
    actor: ActorContext,
}

impl TenantContext {
    /// Creates a context from a trusted assertion.
    ///
    /// Request handling code should obtain contexts from the tenant context
    /// resolver, which validates the assertion first.
    #[must_use]
    pub fn new(tenant_id: TenantId, actor: ActorContext) -> Self {
        Self { tenant_id, actor }
    }

    /// Creates a context for a background job acting on one tenant.
    #[must_use]
    pub fn system(tenant_id: TenantId, subject: impl Into<String>) -> Self {
        Self::new(tenant_id, ActorContext::system(subject))
    }

    /// Returns the active tenant.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the acting identity.
    #[must_use]
    pub fn actor(&self) -> &ActorContext {
        &self.actor
    }

    /// Returns the member identifier of the actor, if any.
    #[must_use]
    pub fn member_id(&self) -> Option<Uuid> {
        self.actor.member_id()
    }
}
