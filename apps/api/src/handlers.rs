pub mod api_keys;
pub mod audit;
pub mod health;
pub mod members;
pub mod organizations;
pub mod security_policy;
pub mod threats;
