use std::collections::HashMap;
use std::sync::Arc;

use crate::policy::{AuthorizationPolicy, PermissionRequirement};
use crate::AuthzError;

/// Policy names starting with this prefix (ASCII case-insensitive) are
/// resolved to a single permission requirement.
pub const PERMISSION_POLICY_PREFIX: &str = "Permission:";

/// Resolves policy names to policies. Lookups are synchronous and cheap.
pub trait PolicyProvider: Send + Sync {
    fn policy(&self, name: &str) -> Option<Arc<AuthorizationPolicy>>;
}

impl<P: PolicyProvider + ?Sized> PolicyProvider for Arc<P> {
    fn policy(&self, name: &str) -> Option<Arc<AuthorizationPolicy>> {
        (**self).policy(name)
    }
}

/// Statically registered policies, keyed case-insensitively by name.
#[derive(Clone, Debug, Default)]
pub struct StaticPolicies {
    policies: HashMap<String, Arc<AuthorizationPolicy>>,
}

impl StaticPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    /// The role policies every deployment ships with. Each admits any one
    /// of its listed roles; there is no implied hierarchy between them.
    pub fn with_role_defaults() -> Result<Self, AuthzError> {
        let mut policies = Self::new();
        for (name, roles) in [
            ("SuperAdmin", &["SuperAdmin", "Admin"][..]),
            ("Admin", &["Role", "Admin"][..]),
            ("User", &["Role", "User"][..]),
        ] {
            policies.insert(
                AuthorizationPolicy::builder(name)
                    .require_authenticated()
                    .require_role(roles.iter().copied())?
                    .build()?,
            );
        }
        Ok(policies)
    }

    /// Registers `policy`, replacing any policy with the same name.
    pub fn insert(&mut self, policy: AuthorizationPolicy) {
        self.policies
            .insert(policy.name().to_ascii_lowercase(), Arc::new(policy));
    }

    pub fn with(mut self, policy: AuthorizationPolicy) -> Self {
        self.insert(policy);
        self
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.values().map(|policy| policy.name())
    }
}

impl PolicyProvider for StaticPolicies {
    fn policy(&self, name: &str) -> Option<Arc<AuthorizationPolicy>> {
        self.policies.get(&name.to_ascii_lowercase()).cloned()
    }
}

/// Synthesizes `Permission:<name>` policies on demand.
///
/// Statically registered policies win: `defaults` is consulted first and only
/// names it does not know are parsed for the prefix.
#[derive(Clone, Debug, Default)]
pub struct PermissionPolicyProvider<P = StaticPolicies> {
    defaults: P,
}

impl<P: PolicyProvider> PermissionPolicyProvider<P> {
    pub fn new(defaults: P) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &P {
        &self.defaults
    }
}

impl<P: PolicyProvider> PolicyProvider for PermissionPolicyProvider<P> {
    fn policy(&self, name: &str) -> Option<Arc<AuthorizationPolicy>> {
        if let Some(policy) = self.defaults.policy(name) {
            return Some(policy);
        }
        let permission = permission_from_policy_name(name)?;
        let requirement = PermissionRequirement::new(permission).ok()?;
        Some(Arc::new(AuthorizationPolicy::for_permission(
            name,
            requirement,
        )))
    }
}

/// Returns the permission named by a `Permission:` policy, preserving the
/// suffix exactly. The suffix may be empty.
pub fn permission_from_policy_name(name: &str) -> Option<&str> {
    let prefix = name.get(..PERMISSION_POLICY_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(PERMISSION_POLICY_PREFIX) {
        return None;
    }
    Some(&name[PERMISSION_POLICY_PREFIX.len()..])
}

pub fn permission_policy_name(permission: &str) -> String {
    format!("{PERMISSION_POLICY_PREFIX}{permission}")
}

/// Declarative marker attached to a protected operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequirePermission {
    pub operation: &'static str,
    pub permission: &'static str,
}

impl RequirePermission {
    pub const fn new(operation: &'static str, permission: &'static str) -> Self {
        Self {
            operation,
            permission,
        }
    }

    pub fn policy_name(&self) -> String {
        permission_policy_name(self.permission)
    }
}
