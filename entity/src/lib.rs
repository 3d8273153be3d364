//! Persistence entities for the permission graph
//! (`permissions` <- `role_permissions` -> `roles` <- `user_roles`).

pub mod permissions;
pub mod role_permissions;
pub mod roles;
pub mod user_roles;
