use std::collections::HashSet;

use anyhow::{Context, Result};
use entity::{role_permissions, roles, user_roles};
use platform_api::codes;
use platform_permissions::{NewPermission, PermissionService};
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::graphql::operations;

pub const ADMIN_ROLE: &str = "Admin";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub grants_added: usize,
    pub admin_role: Uuid,
    pub assigned_user: Option<Uuid>,
}

/// Creates every declared permission, an `Admin` role holding all of them
/// and, optionally, assigns that role to `admin_user`. Safe to rerun.
pub async fn run(service: &PermissionService, admin_user: Option<Uuid>) -> Result<SeedReport> {
    let cancel = CancellationToken::new();
    let mut report = SeedReport::default();

    let mut permission_ids = Vec::new();
    for name in operations::declared_permissions() {
        let (resource, action) = name.split_once(':').unwrap_or((name, name));
        let created = service
            .create(NewPermission::new(name, resource, action), None, &cancel)
            .await;
        let permission = match created.into_result() {
            Ok(permission) => {
                report.permissions_created += 1;
                permission
            }
            Err(err) if err.code() == codes::CONFLICT => service
                .get_by_name(name, &cancel)
                .await
                .into_result()
                .with_context(|| format!("loading permission {name}"))?,
            Err(err) => return Err(err).with_context(|| format!("creating permission {name}")),
        };
        permission_ids.push(permission.id);
    }

    let uow = service.unit_of_work();
    let txn = uow.begin().await?;
    let conn = txn.connection();

    let role = roles::Entity::find()
        .filter(roles::Column::Name.eq(ADMIN_ROLE))
        .one(conn)
        .await?;
    let role_id = match role {
        Some(role) => role.id,
        None => {
            txn.repository::<roles::Entity>()
                .add(
                    roles::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        name: Set(ADMIN_ROLE.to_string()),
                        ..Default::default()
                    },
                    None,
                )
                .await?
                .id
        }
    };
    report.admin_role = role_id;

    let granted: HashSet<Uuid> = role_permissions::Entity::find()
        .filter(role_permissions::Column::RoleId.eq(role_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|link| link.permission_id)
        .collect();
    let links: Vec<_> = permission_ids
        .into_iter()
        .filter(|id| !granted.contains(id))
        .map(|permission_id| role_permissions::ActiveModel {
            role_id: Set(role_id),
            permission_id: Set(permission_id),
        })
        .collect();
    report.grants_added = links.len();
    if !links.is_empty() {
        role_permissions::Entity::insert_many(links)
            .exec_without_returning(conn)
            .await?;
    }

    if let Some(user_id) = admin_user {
        let assigned = user_roles::Entity::find_by_id((user_id, role_id))
            .one(conn)
            .await?
            .is_some();
        if !assigned {
            user_roles::Entity::insert(user_roles::ActiveModel {
                user_id: Set(user_id),
                role_id: Set(role_id),
            })
            .exec_without_returning(conn)
            .await?;
        }
        report.assigned_user = Some(user_id);
    }

    txn.commit().await?;
    info!(
        permissions_created = report.permissions_created,
        grants_added = report.grants_added,
        admin_user = ?report.assigned_user,
        "seed complete"
    );
    Ok(report)
}
