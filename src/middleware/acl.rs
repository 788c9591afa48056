//! Path based access control.
//!
//! Evaluated before the handler runs. The rule table is read-only after
//! startup and shared by every request without locking.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::config::AclConfig;
use crate::error::AppError;

pub type PrincipalId = u64;

pub const DENIED_MESSAGE: &str = "Sorry, You are not allowed!";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AclRule {
    /// Exact request paths this rule applies to.
    pub paths: HashSet<String>,
    #[serde(default)]
    pub read: HashSet<PrincipalId>,
    #[serde(default)]
    pub write: HashSet<PrincipalId>,
    #[serde(default)]
    pub delete: HashSet<PrincipalId>,
}

impl AclRule {
    /// The permission set guarding `method`, if the method is guarded at all.
    pub fn permissions_for(&self, method: &Method) -> Option<&HashSet<PrincipalId>> {
        match *method {
            Method::GET => Some(&self.read),
            Method::POST | Method::PUT | Method::PATCH => Some(&self.write),
            Method::DELETE => Some(&self.delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Resolves the principals acting on behalf of a request.
pub trait PrincipalResolver: Send + Sync {
    fn principals(&self, req: &Request) -> HashSet<PrincipalId>;
}

/// Returns the same principal set for every request.
///
/// Stand-in until authentication exists; the configured ids carry no meaning
/// beyond exercising the rule table.
#[derive(Debug, Clone)]
pub struct StaticPrincipals(pub HashSet<PrincipalId>);

impl PrincipalResolver for StaticPrincipals {
    fn principals(&self, _req: &Request) -> HashSet<PrincipalId> {
        self.0.clone()
    }
}

pub struct AccessControl {
    rules: Vec<AclRule>,
    resolver: Box<dyn PrincipalResolver>,
}

impl AccessControl {
    pub fn new(rules: Vec<AclRule>, resolver: Box<dyn PrincipalResolver>) -> Self {
        Self { rules, resolver }
    }

    pub fn from_config(cfg: &AclConfig) -> Self {
        Self::new(cfg.rules.clone(), Box::new(StaticPrincipals(cfg.caller_principals.clone())))
    }

    pub fn rules(&self) -> &[AclRule] {
        &self.rules
    }

    pub fn check(&self, req: &Request) -> Decision {
        let principals = self.resolver.principals(req);
        evaluate(&self.rules, req.method(), req.uri().path(), &principals)
    }
}

/// First matching rule wins. Unlisted paths, unguarded methods and empty
/// permission sets all allow.
pub fn evaluate(rules: &[AclRule], method: &Method, path: &str, principals: &HashSet<PrincipalId>) -> Decision {
    let Some(rule) = rules.iter().find(|r| r.paths.contains(path)) else {
        return Decision::Allow;
    };
    match rule.permissions_for(method) {
        Some(allowed) if !allowed.is_empty() => {
            if allowed.is_disjoint(principals) {
                Decision::Deny
            } else {
                Decision::Allow
            }
        }
        _ => Decision::Allow,
    }
}

pub async fn acl_middleware(State(acl): State<Arc<AccessControl>>, req: Request, next: Next) -> Response {
    match acl.check(&req) {
        Decision::Allow => next.run(req).await,
        Decision::Deny => {
            tracing::warn!(method = %req.method(), path = %req.uri().path(), "Access denied by ACL");
            AppError::Forbidden(DENIED_MESSAGE.to_string()).into_response()
        }
    }
}
