use crate::AuthzError;

/// Comparison key for stored permission names: trimmed and case-folded.
pub fn permission_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A single permission the caller must hold. The name is non-empty and is
/// carried verbatim from the policy name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionRequirement {
    permission: String,
}

impl PermissionRequirement {
    pub fn new(permission: impl Into<String>) -> Result<Self, AuthzError> {
        let permission = permission.into();
        if permission.trim().is_empty() {
            return Err(AuthzError::EmptyPermission);
        }
        Ok(Self { permission })
    }

    pub fn permission(&self) -> &str {
        &self.permission
    }

    pub fn key(&self) -> String {
        permission_key(&self.permission)
    }
}

/// Satisfied when the caller carries any one of the listed roles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleRequirement {
    roles: Vec<String>,
}

impl RoleRequirement {
    pub fn any_of<I, S>(roles: I) -> Result<Self, AuthzError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        if roles.is_empty() {
            return Err(AuthzError::EmptyRoles);
        }
        Ok(Self { roles })
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Role(RoleRequirement),
    Permission(PermissionRequirement),
}

/// Named set of requirements; all must succeed for the policy to pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    name: String,
    requirements: Vec<Requirement>,
}

impl AuthorizationPolicy {
    pub fn builder(name: impl Into<String>) -> PolicyBuilder {
        PolicyBuilder {
            name: name.into(),
            requirements: Vec::new(),
        }
    }

    /// Policy consisting of exactly one permission requirement.
    pub fn for_permission(name: impl Into<String>, requirement: PermissionRequirement) -> Self {
        Self {
            name: name.into(),
            requirements: vec![Requirement::Permission(requirement)],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn permission(&self) -> Option<&PermissionRequirement> {
        self.requirements.iter().find_map(|requirement| match requirement {
            Requirement::Permission(permission) => Some(permission),
            _ => None,
        })
    }
}

#[derive(Debug)]
pub struct PolicyBuilder {
    name: String,
    requirements: Vec<Requirement>,
}

impl PolicyBuilder {
    pub fn require_authenticated(mut self) -> Self {
        self.requirements.push(Requirement::Authenticated);
        self
    }

    pub fn require_role<I, S>(mut self, roles: I) -> Result<Self, AuthzError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements
            .push(Requirement::Role(RoleRequirement::any_of(roles)?));
        Ok(self)
    }

    pub fn require_permission(mut self, permission: impl Into<String>) -> Result<Self, AuthzError> {
        self.requirements
            .push(Requirement::Permission(PermissionRequirement::new(permission)?));
        Ok(self)
    }

    pub fn build(self) -> Result<AuthorizationPolicy, AuthzError> {
        if self.requirements.is_empty() {
            return Err(AuthzError::EmptyPolicy(self.name));
        }
        Ok(AuthorizationPolicy {
            name: self.name,
            requirements: self.requirements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_requirement_rejects_blank_names() {
        assert_eq!(
            PermissionRequirement::new(""),
            Err(AuthzError::EmptyPermission)
        );
        assert_eq!(
            PermissionRequirement::new("  "),
            Err(AuthzError::EmptyPermission)
        );
        let requirement = PermissionRequirement::new("Users:Read").unwrap();
        assert_eq!(requirement.permission(), "Users:Read");
    }

    #[test]
    fn builder_requires_at_least_one_requirement() {
        let err = AuthorizationPolicy::builder("Empty").build().unwrap_err();
        assert_eq!(err, AuthzError::EmptyPolicy("Empty".into()));

        let policy = AuthorizationPolicy::builder("Admin")
            .require_authenticated()
            .require_role(["Admin"])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(policy.requirements().len(), 2);
        assert!(policy.permission().is_none());
    }

    #[test]
    fn role_requirement_needs_a_role() {
        assert_eq!(
            RoleRequirement::any_of(Vec::<String>::new()),
            Err(AuthzError::EmptyRoles)
        );
    }
}
