//! Policy documents and evaluation.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Policy language version rendered into every document.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Whether a statement grants or refuses its actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Grants the actions.
    Allow,
    /// Refuses the actions, overriding any grant.
    Deny,
}

/// Outcome of evaluating a request against a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// A statement allows the request and none denies it.
    Allow,
    /// A statement explicitly denies the request.
    ExplicitDeny,
    /// No statement matches the request.
    ImplicitDeny,
}

impl Decision {
    /// Returns true for [`Decision::Allow`].
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// One statement of a policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    /// Grant or refuse.
    pub effect: Effect,
    /// Action patterns, e.g. `sts:AssumeRole`.
    pub actions: Vec<String>,
    /// Resource ARN patterns.
    pub resources: Vec<String>,
}

impl PolicyStatement {
    /// Creates an `Allow` statement.
    #[must_use]
    pub fn allow(
        actions: impl IntoIterator<Item = impl Into<String>>,
        resources: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a `Deny` statement.
    #[must_use]
    pub fn deny(
        actions: impl IntoIterator<Item = impl Into<String>>,
        resources: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::allow(actions, resources)
        }
    }

    /// Returns true if the statement covers the action on the resource.
    ///
    /// Action names compare case-insensitively; resource ARNs do not.
    #[must_use]
    pub fn matches(&self, action: &str, resource: &str) -> bool {
        self.actions.iter().any(|p| wildcard_match(p, action, true))
            && self.resources.iter().any(|p| wildcard_match(p, resource, false))
    }

    /// Renders the statement in policy JSON form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "Effect": match self.effect {
                Effect::Allow => "Allow",
                Effect::Deny => "Deny",
            },
            "Action": single_or_list(&self.actions),
            "Resource": single_or_list(&self.resources),
        })
    }
}

/// An ordered set of statements.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// The statements.
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    /// Creates a document from statements.
    #[must_use]
    pub fn new(statements: Vec<PolicyStatement>) -> Self {
        Self { statements }
    }

    /// Evaluates a request: explicit deny wins, then any allow, otherwise
    /// the request is implicitly denied.
    #[must_use]
    pub fn evaluate(&self, action: &str, resource: &str) -> Decision {
        let mut allowed = false;
        for statement in self.statements.iter().filter(|s| s.matches(action, resource)) {
            match statement.effect {
                Effect::Deny => return Decision::ExplicitDeny,
                Effect::Allow => allowed = true,
            }
        }
        if allowed {
            Decision::Allow
        } else {
            Decision::ImplicitDeny
        }
    }

    /// Renders the document in policy JSON form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "Version": POLICY_VERSION,
            "Statement": self.statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
        })
    }
}

fn single_or_list(values: &[String]) -> Value {
    match values {
        [single] => json!(single),
        many => json!(many),
    }
}

/// Matches `value` against a pattern where `*` matches any run of
/// characters and `?` matches exactly one.
#[must_use]
pub fn wildcard_match(pattern: &str, value: &str, case_insensitive: bool) -> bool {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    let mut buf = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    expr.push('$');

    RegexBuilder::new(&expr)
        .case_insensitive(case_insensitive)
        .build()
        .is_ok_and(|re| re.is_match(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("arn:aws:iam::*:role/cdk-*", "arn:aws:iam::123:role/cdk-hnb659fds-deploy-role", false));
        assert!(!wildcard_match("arn:aws:iam::*:role/cdk-*", "arn:aws:iam::123:role/admin", false));
        assert!(wildcard_match("sts:AssumeRole", "STS:assumerole", true));
        assert!(!wildcard_match("sts:AssumeRole", "STS:assumerole", false));
        assert!(wildcard_match("s3:?etObject", "s3:GetObject", false));
        assert!(!wildcard_match("a.b", "axb", false));
    }

    #[test]
    fn test_evaluate_allow_and_implicit_deny() {
        let doc = PolicyDocument::new(vec![PolicyStatement::allow(
            ["sts:AssumeRole"],
            ["arn:aws:iam::*:role/cdk-*"],
        )]);

        assert_eq!(
            doc.evaluate("sts:AssumeRole", "arn:aws:iam::111111111111:role/cdk-deploy"),
            Decision::Allow
        );
        assert_eq!(
            doc.evaluate("sts:AssumeRole", "arn:aws:iam::111111111111:role/deploy-cdk"),
            Decision::ImplicitDeny
        );
        assert_eq!(
            doc.evaluate("s3:GetObject", "arn:aws:iam::111111111111:role/cdk-deploy"),
            Decision::ImplicitDeny
        );
    }

    #[test]
    fn test_explicit_deny_wins() {
        let doc = PolicyDocument::new(vec![
            PolicyStatement::allow(["sts:*"], ["*"]),
            PolicyStatement::deny(["sts:AssumeRole"], ["arn:aws:iam::*:role/cdk-admin"]),
        ]);

        assert_eq!(doc.evaluate("sts:AssumeRole", "arn:aws:iam::1:role/cdk-admin"), Decision::ExplicitDeny);
        assert!(doc.evaluate("sts:AssumeRole", "arn:aws:iam::1:role/cdk-deploy").is_allowed());
    }

    #[test]
    fn test_to_json() {
        let doc = PolicyDocument::new(vec![PolicyStatement::allow(
            ["sts:AssumeRole"],
            ["arn:aws:iam::*:role/cdk-*"],
        )]);
        assert_eq!(
            doc.to_json(),
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Action": "sts:AssumeRole",
                    "Resource": "arn:aws:iam::*:role/cdk-*",
                }],
            })
        );
    }
}
