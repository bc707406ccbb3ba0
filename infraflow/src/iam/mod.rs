//! Identity and access model.
//!
//! This module provides:
//! - Service principals that may be trusted by a role
//! - Policy documents with a wildcard-aware evaluator
//! - The shared execution role granted to pipeline actions

mod policy;
mod principal;
mod role;

pub use policy::{wildcard_match, Decision, Effect, PolicyDocument, PolicyStatement};
pub use principal::ServicePrincipal;
pub use role::{
    deployment_role_pattern, AssumedRoleSession, ExecutionRole, ASSUME_ROLE_ACTION,
    DEFAULT_PARTITION, DEPLOY_POLICY_NAME, DEPLOY_ROLE_LOGICAL_ID, DEPLOY_ROLE_PREFIX,
};
