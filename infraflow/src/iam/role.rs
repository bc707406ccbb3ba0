//! The execution role shared by every pipeline action.

use super::{Decision, PolicyDocument, PolicyStatement, ServicePrincipal};
use crate::errors::PermissionDeniedError;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Logical id of the execution role.
pub const DEPLOY_ROLE_LOGICAL_ID: &str = "InfrastructureDeployRole";
/// Name of the single inline policy.
pub const DEPLOY_POLICY_NAME: &str = "CdkDeployPermissions";
/// The only action the role is granted.
pub const ASSUME_ROLE_ACTION: &str = "sts:AssumeRole";
/// Prefix every assumable deployment role name carries.
pub const DEPLOY_ROLE_PREFIX: &str = "cdk-";
/// Partition used when none is configured.
pub const DEFAULT_PARTITION: &str = "aws";

/// Resource pattern matching every deployment role in every account.
#[must_use]
pub fn deployment_role_pattern(partition: &str) -> String {
    format!("arn:{partition}:iam::*:role/{DEPLOY_ROLE_PREFIX}*")
}

/// The single identity under which every pipeline action runs.
///
/// Both the build runner and the orchestrator trust it, and any action may
/// use it to assume any role matching [`deployment_role_pattern`]. Splitting
/// it into per-stage roles is an open policy decision; the shared shape is
/// kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRole {
    logical_id: String,
    trusted_principals: Vec<ServicePrincipal>,
    inline_policies: BTreeMap<String, PolicyDocument>,
}

impl ExecutionRole {
    /// Provisions the execution role for a partition.
    #[must_use]
    pub fn provision(partition: &str) -> Self {
        let mut inline_policies = BTreeMap::new();
        inline_policies.insert(
            DEPLOY_POLICY_NAME.to_string(),
            PolicyDocument::new(vec![PolicyStatement::allow(
                [ASSUME_ROLE_ACTION],
                [deployment_role_pattern(partition)],
            )]),
        );

        Self {
            logical_id: DEPLOY_ROLE_LOGICAL_ID.to_string(),
            trusted_principals: vec![
                ServicePrincipal::build_runner(),
                ServicePrincipal::orchestrator(),
            ],
            inline_policies,
        }
    }

    /// Returns the logical id.
    #[must_use]
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// Returns the trusted principals.
    #[must_use]
    pub fn trusted_principals(&self) -> &[ServicePrincipal] {
        &self.trusted_principals
    }

    /// Returns the inline policies keyed by name.
    #[must_use]
    pub fn inline_policies(&self) -> &BTreeMap<String, PolicyDocument> {
        &self.inline_policies
    }

    /// Returns true if the principal may assume this role.
    #[must_use]
    pub fn trusts(&self, principal: &ServicePrincipal) -> bool {
        self.trusted_principals.contains(principal)
    }

    /// Evaluates a request against every inline policy.
    #[must_use]
    pub fn evaluate(&self, action: &str, resource: &str) -> Decision {
        let mut decision = Decision::ImplicitDeny;
        for policy in self.inline_policies.values() {
            match policy.evaluate(action, resource) {
                Decision::ExplicitDeny => return Decision::ExplicitDeny,
                Decision::Allow => decision = Decision::Allow,
                Decision::ImplicitDeny => {}
            }
        }
        decision
    }

    /// Assumes a deployment role.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionDeniedError`] when the policy does not allow
    /// `sts:AssumeRole` on `target_arn`. There is no fallback.
    pub fn assume(&self, target_arn: &str) -> Result<AssumedRoleSession, PermissionDeniedError> {
        if self.evaluate(ASSUME_ROLE_ACTION, target_arn).is_allowed() {
            tracing::debug!(role = %self.logical_id, target = target_arn, "Assumed deployment role");
            Ok(AssumedRoleSession {
                role_arn: target_arn.to_string(),
                session_name: format!("{}-{}", self.logical_id, Uuid::new_v4().simple()),
                source_role: self.logical_id.clone(),
            })
        } else {
            tracing::warn!(role = %self.logical_id, target = target_arn, "AssumeRole denied");
            Err(PermissionDeniedError {
                role: self.logical_id.clone(),
                action: ASSUME_ROLE_ACTION.to_string(),
                resource: target_arn.to_string(),
            })
        }
    }

    /// Renders the trust policy.
    #[must_use]
    pub fn assume_role_policy_document(&self) -> Value {
        json!({
            "Version": super::policy::POLICY_VERSION,
            "Statement": [{
                "Effect": "Allow",
                "Action": ASSUME_ROLE_ACTION,
                "Principal": {
                    "Service": self.trusted_principals.iter().map(ServicePrincipal::as_str).collect::<Vec<_>>(),
                },
            }],
        })
    }
}

/// A session obtained by assuming a deployment role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssumedRoleSession {
    /// The assumed role.
    pub role_arn: String,
    /// Unique session name.
    pub session_name: String,
    /// Logical id of the role that assumed it.
    pub source_role: String,
}
