//! The permission store: lookups over the role/permission graph and the
//! permission lifecycle (create, update, soft delete, restore).
//!
//! Every operation returns an [`Outcome`](platform_api::Outcome). Database
//! faults are logged and surface as `EXCEPTION` failures.

mod input;
mod service;

pub use entity::permissions::Model as Permission;
pub use input::{NewPermission, PermissionChanges, PermissionQuery};
pub use service::PermissionService;
