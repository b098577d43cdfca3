//! Authorization decisions handed to the fronting gateway.
//!
//! Two terminal outcomes. Allow carries exactly one statement granting invoke on the
//! resource. Deny carries no statement at all: absence of a grant is the deny signal.
//! An identity refused by a later check is still an absent grant, flagged `explicit_deny`
//! for audit only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

pub const POLICY_VERSION: &str = "2012-10-17";
pub const INVOKE_ACTION: &str = "execute-api:Invoke";
pub const CONTEXT_USER_KEY: &str = "user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub action: Vec<String>,
    pub effect: Effect,
    pub resource: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub principal_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_document: Option<PolicyDocument>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub explicit_deny: bool,
}

impl Decision {
    /// Allow only if some statement grants it; everything else is Deny.
    pub fn effect(&self) -> Effect {
        let granted = self
            .policy_document
            .as_ref()
            .map(|p| p.statement.iter().any(|s| s.effect == Effect::Allow))
            .unwrap_or(false);
        if granted { Effect::Allow } else { Effect::Deny }
    }

    pub fn is_allowed(&self) -> bool { self.effect() == Effect::Allow }

    /// Resources named by an Allow statement.
    pub fn resources(&self) -> Vec<&str> {
        self.policy_document
            .iter()
            .flat_map(|p| p.statement.iter())
            .filter(|s| s.effect == Effect::Allow)
            .flat_map(|s| s.resource.iter().map(String::as_str))
            .collect()
    }
}

/// Turn an authentication outcome into a decision for `resource`.
pub fn decide(outcome: &Result<String, AuthError>, resource: &str) -> Decision {
    match outcome {
        Ok(email) if !email.is_empty() => allow(email, resource),
        _ => Decision {
            principal_id: String::new(),
            policy_document: None,
            context: BTreeMap::new(),
            explicit_deny: false,
        },
    }
}

/// Authenticated identity that a later authorization check refused.
pub fn forbid(email: &str) -> Decision {
    Decision {
        principal_id: email.to_string(),
        policy_document: None,
        context: BTreeMap::new(),
        explicit_deny: true,
    }
}

fn allow(email: &str, resource: &str) -> Decision {
    let mut context = BTreeMap::new();
    context.insert(CONTEXT_USER_KEY.to_string(), email.to_string());
    Decision {
        principal_id: email.to_string(),
        policy_document: Some(PolicyDocument {
            version: POLICY_VERSION.to_string(),
            statement: vec![Statement {
                action: vec![INVOKE_ACTION.to_string()],
                effect: Effect::Allow,
                resource: vec![resource.to_string()],
            }],
        }),
        context,
        explicit_deny: false,
    }
}
