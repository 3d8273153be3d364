//! Authorization for permission-gated operations.
//!
//! A protected operation declares a [`RequirePermission`]. At request time
//! the boundary asks the [`Authorizer`] for the policy named
//! `"Permission:<name>"`; the [`PermissionPolicyProvider`] synthesizes it on
//! the fly and the [`PermissionEvaluator`] checks it against the caller's
//! claims, falling back to the permission store on a miss.

mod authorizer;
mod evaluator;
mod policy;
mod principal;
mod provider;

use thiserror::Error;

pub use authorizer::Authorizer;
pub use evaluator::{Decision, DenyReason, Grant, PermissionEvaluator, PermissionSource};
pub use policy::{
    AuthorizationPolicy, PermissionRequirement, PolicyBuilder, Requirement, RoleRequirement,
    permission_key,
};
pub use principal::{Claim, IdentityError, Principal, claim_types};
pub use provider::{
    PERMISSION_POLICY_PREFIX, PermissionPolicyProvider, PolicyProvider, RequirePermission,
    StaticPolicies, permission_from_policy_name, permission_policy_name,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("no policy named `{0}` is configured")]
    PolicyNotFound(String),
    #[error("permission requirement must name a permission")]
    EmptyPermission,
    #[error("role requirement must list at least one role")]
    EmptyRoles,
    #[error("policy `{0}` has no requirements")]
    EmptyPolicy(String),
}
