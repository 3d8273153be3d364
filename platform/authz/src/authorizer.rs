use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::AuthzError;
use crate::evaluator::{Decision, DenyReason, Grant, PermissionEvaluator};
use crate::policy::{AuthorizationPolicy, Requirement, RoleRequirement};
use crate::principal::{Principal, claim_types};
use crate::provider::{PolicyProvider, RequirePermission};

/// Resolves policies by name and evaluates every requirement they carry.
#[derive(Clone)]
pub struct Authorizer {
    provider: Arc<dyn PolicyProvider>,
    evaluator: PermissionEvaluator,
}

impl Authorizer {
    pub fn new(provider: Arc<dyn PolicyProvider>, evaluator: PermissionEvaluator) -> Self {
        Self {
            provider,
            evaluator,
        }
    }

    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }

    pub fn resolve(&self, policy_name: &str) -> Result<Arc<AuthorizationPolicy>, AuthzError> {
        self.provider
            .policy(policy_name)
            .ok_or_else(|| AuthzError::PolicyNotFound(policy_name.to_owned()))
    }

    /// Unknown policy names are a configuration fault, not a denial.
    pub async fn authorize_named(
        &self,
        principal: Option<&Principal>,
        policy_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Decision, AuthzError> {
        let policy = self.resolve(policy_name)?;
        Ok(self.authorize(principal, &policy, cancel).await)
    }

    pub async fn require(
        &self,
        principal: Option<&Principal>,
        marker: &RequirePermission,
        cancel: &CancellationToken,
    ) -> Result<Decision, AuthzError> {
        self.authorize_named(principal, &marker.policy_name(), cancel)
            .await
    }

    /// All requirements must succeed; the first failure is returned.
    pub async fn authorize(
        &self,
        principal: Option<&Principal>,
        policy: &AuthorizationPolicy,
        cancel: &CancellationToken,
    ) -> Decision {
        let mut last = Decision::Fail(DenyReason::NotGranted);
        for requirement in policy.requirements() {
            last = match requirement {
                Requirement::Authenticated => authenticated(principal),
                Requirement::Role(roles) => in_role(principal, roles),
                Requirement::Permission(permission) => {
                    self.evaluator.evaluate(principal, permission, cancel).await
                }
            };
            if let Decision::Fail(reason) = last {
                debug!(policy = policy.name(), %reason, "policy requirement failed");
                return last;
            }
        }
        last
    }

    /// Checks that every declared marker resolves to a policy. Run at
    /// startup so a misnamed permission never reaches a request.
    pub fn verify<'a, I>(&self, markers: I) -> Result<(), AuthzError>
    where
        I: IntoIterator<Item = &'a RequirePermission>,
    {
        for marker in markers {
            if let Err(err) = self.resolve(&marker.policy_name()) {
                warn!(operation = marker.operation, %err, "unresolvable permission policy");
                return Err(err);
            }
        }
        Ok(())
    }
}

fn authenticated(principal: Option<&Principal>) -> Decision {
    match principal {
        Some(principal) if principal.is_authenticated() => Decision::Succeed(Grant::Authenticated),
        _ => Decision::Fail(DenyReason::Unauthenticated),
    }
}

fn in_role(principal: Option<&Principal>, requirement: &RoleRequirement) -> Decision {
    let Some(principal) = principal.filter(|p| p.is_authenticated()) else {
        return Decision::Fail(DenyReason::Unauthenticated);
    };
    let member = requirement
        .roles()
        .iter()
        .any(|role| principal.has_claim(claim_types::ROLE, role));
    if member {
        Decision::Succeed(Grant::Role)
    } else {
        Decision::Fail(DenyReason::MissingRole)
    }
}
