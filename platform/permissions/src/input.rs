use platform_api::ApiError;

pub(crate) const NAME_MAX: usize = 128;
pub(crate) const DESCRIPTION_MAX: usize = 512;
pub(crate) const RESOURCE_MAX: usize = 64;
pub(crate) const ACTION_MAX: usize = 64;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewPermission {
    pub name: String,
    pub description: String,
    pub resource: String,
    pub action: String,
}

impl NewPermission {
    pub fn new(
        name: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            action: action.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Trims every field and checks the column limits.
    pub(crate) fn normalized(self) -> Result<Self, ApiError> {
        Ok(Self {
            name: required("name", &self.name, NAME_MAX)?,
            description: optional("description", &self.description, DESCRIPTION_MAX)?,
            resource: required("resource", &self.resource, RESOURCE_MAX)?,
            action: required("action", &self.action, ACTION_MAX)?,
        })
    }
}

/// Partial update; `None` leaves the field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
}

impl PermissionChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.resource.is_none()
            && self.action.is_none()
    }

    pub(crate) fn normalized(self) -> Result<Self, ApiError> {
        Ok(Self {
            name: self
                .name
                .map(|v| required("name", &v, NAME_MAX))
                .transpose()?,
            description: self
                .description
                .map(|v| optional("description", &v, DESCRIPTION_MAX))
                .transpose()?,
            resource: self
                .resource
                .map(|v| required("resource", &v, RESOURCE_MAX))
                .transpose()?,
            action: self
                .action
                .map(|v| required("action", &v, ACTION_MAX))
                .transpose()?,
        })
    }
}

/// Page request for listing permissions. `page` is 1-based.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionQuery {
    pub page: u64,
    pub page_size: u64,
    pub search: Option<String>,
}

impl Default for PermissionQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 50,
            search: None,
        }
    }
}

impl PermissionQuery {
    pub(crate) fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase)
    }
}

fn required(field: &'static str, value: &str, max: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    optional(field, value, max)
}

fn optional(field: &'static str, value: &str, max: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.chars().count() > max {
        return Err(ApiError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_permission_is_trimmed_and_checked() {
        let input = NewPermission::new("  Users:Read ", "Users", "Read")
            .with_description(" read users ")
            .normalized()
            .unwrap();
        assert_eq!(input.name, "Users:Read");
        assert_eq!(input.description, "read users");

        let err = NewPermission::new(" ", "Users", "Read")
            .normalized()
            .unwrap_err();
        assert_eq!(err.code(), platform_api::codes::VALIDATION);

        let err = NewPermission::new("x".repeat(NAME_MAX + 1), "Users", "Read")
            .normalized()
            .unwrap_err();
        assert!(err.message().contains("128"));
    }

    #[test]
    fn changes_only_validate_present_fields() {
        let changes = PermissionChanges {
            description: Some(String::new()),
            ..Default::default()
        };
        assert!(changes.normalized().is_ok());

        let changes = PermissionChanges {
            action: Some("   ".into()),
            ..Default::default()
        };
        assert!(changes.normalized().is_err());
        assert!(PermissionChanges::default().is_empty());
    }

    #[test]
    fn blank_search_is_ignored() {
        let query = PermissionQuery {
            search: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(query.search_term(), None);
        let query = PermissionQuery {
            search: Some(" Users ".into()),
            ..Default::default()
        };
        assert_eq!(query.search_term().as_deref(), Some("users"));
    }
}
