//! Infrastructure adapters for application ports.
//!
//! PostgreSQL adapters open one transaction per call, scope it to the
//! active tenant for row-level security, and write audited mutations and
//! their audit record in that same transaction. The in-memory store keeps
//! the same guarantees for tests and local runs.

#![forbid(unsafe_code)]

mod in_memory_rate_limit_repository;
mod in_memory_tenant_store;
mod postgres_api_key_repository;
mod postgres_audit_trail_repository;
mod postgres_member_repository;
mod postgres_rate_limit_repository;
mod postgres_security_policy_repository;
mod postgres_tenant_repository;
mod postgres_tenant_scope;
#[cfg(test)]
mod postgres_test_support;
mod postgres_threat_repository;

pub use in_memory_rate_limit_repository::InMemoryRateLimitRepository;
pub use in_memory_tenant_store::{InMemoryTenantStore, TenantPartition};
pub use postgres_api_key_repository::PostgresApiKeyRepository;
pub use postgres_audit_trail_repository::PostgresAuditTrailRepository;
pub use postgres_member_repository::PostgresMemberRepository;
pub use postgres_rate_limit_repository::PostgresRateLimitRepository;
pub use postgres_security_policy_repository::PostgresSecurityPolicyRepository;
pub use postgres_tenant_repository::PostgresTenantRepository;
pub use postgres_threat_repository::PostgresThreatRepository;
