//! Permission each GraphQL operation is gated by.

use platform_authz::RequirePermission;

pub const PERMISSION: RequirePermission = RequirePermission::new("permission", "Permissions:Read");
pub const PERMISSION_BY_NAME: RequirePermission =
    RequirePermission::new("permissionByName", "Permissions:Read");
pub const PERMISSIONS: RequirePermission = RequirePermission::new("permissions", "Permissions:Read");
pub const PERMISSIONS_BY_IDS: RequirePermission =
    RequirePermission::new("permissionsByIds", "Permissions:Read");
pub const PERMISSIONS_BY_RESOURCE: RequirePermission =
    RequirePermission::new("permissionsByResource", "Permissions:Read");
pub const ROLE_PERMISSIONS: RequirePermission =
    RequirePermission::new("rolePermissions", "Roles:Read");
pub const USER_PERMISSIONS: RequirePermission =
    RequirePermission::new("userPermissions", "Users:Read");
pub const USER_HAS_PERMISSION: RequirePermission =
    RequirePermission::new("userHasPermission", "Users:Read");
pub const USER_HAS_ALL: RequirePermission = RequirePermission::new("userHasAll", "Users:Read");
pub const USER_HAS_ANY: RequirePermission = RequirePermission::new("userHasAny", "Users:Read");
pub const CREATE_PERMISSION: RequirePermission =
    RequirePermission::new("createPermission", "Permissions:Create");
pub const UPDATE_PERMISSION: RequirePermission =
    RequirePermission::new("updatePermission", "Permissions:Update");
pub const DELETE_PERMISSION: RequirePermission =
    RequirePermission::new("deletePermission", "Permissions:Delete");
pub const RESTORE_PERMISSION: RequirePermission =
    RequirePermission::new("restorePermission", "Permissions:Restore");

pub const OPERATIONS: &[RequirePermission] = &[
    PERMISSION,
    PERMISSION_BY_NAME,
    PERMISSIONS,
    PERMISSIONS_BY_IDS,
    PERMISSIONS_BY_RESOURCE,
    ROLE_PERMISSIONS,
    USER_PERMISSIONS,
    USER_HAS_PERMISSION,
    USER_HAS_ALL,
    USER_HAS_ANY,
    CREATE_PERMISSION,
    UPDATE_PERMISSION,
    DELETE_PERMISSION,
    RESTORE_PERMISSION,
];

/// Distinct permission names referenced by [`OPERATIONS`], in first-seen order.
pub fn declared_permissions() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = Vec::new();
    for operation in OPERATIONS {
        if !names.contains(&operation.permission) {
            names.push(operation.permission);
        }
    }
    names
}
