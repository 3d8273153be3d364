use async_graphql::{Context, InputObject, Object, SimpleObject};
use chrono::{DateTime, Utc};
use platform_db::Page;
use platform_permissions::{NewPermission, Permission, PermissionChanges, PermissionQuery};
use tracing::instrument;
use uuid::Uuid;

use super::{authorize, operations, respond};

const DEFAULT_PAGE_SIZE: u64 = 50;

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Permission")]
pub struct PermissionNode {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub resource: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Permission> for PermissionNode {
    fn from(model: Permission) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            resource: model.resource,
            action: model.action,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.map(|at| at.with_timezone(&Utc)),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct PermissionPage {
    pub items: Vec<PermissionNode>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

impl From<Page<Permission>> for PermissionPage {
    fn from(page: Page<Permission>) -> Self {
        let page = page.map(PermissionNode::from);
        Self {
            items: page.items,
            total: page.total,
            page: page.page,
            page_size: page.page_size,
        }
    }
}

#[derive(Clone, Debug, InputObject)]
pub struct CreatePermissionInput {
    pub name: String,
    pub resource: String,
    pub action: String,
    #[graphql(default)]
    pub description: String,
}

#[derive(Clone, Debug, Default, InputObject)]
pub struct UpdatePermissionInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
}

fn nodes(permissions: Vec<Permission>) -> Vec<PermissionNode> {
    permissions.into_iter().map(PermissionNode::from).collect()
}

#[derive(Default)]
pub struct PermissionQueries;

#[Object]
impl PermissionQueries {
    #[instrument(name = "graphql.permission", skip_all, fields(%id))]
    async fn permission(&self, ctx: &Context<'_>, id: Uuid) -> async_graphql::Result<PermissionNode> {
        let (data, request) = authorize(ctx, &operations::PERMISSION).await?;
        respond(data.service.get_by_id(id, &request.cancel).await.map(Into::into))
    }

    #[instrument(name = "graphql.permission_by_name", skip_all)]
    async fn permission_by_name(
        &self,
        ctx: &Context<'_>,
        name: String,
    ) -> async_graphql::Result<PermissionNode> {
        let (data, request) = authorize(ctx, &operations::PERMISSION_BY_NAME).await?;
        respond(
            data.service
                .get_by_name(&name, &request.cancel)
                .await
                .map(Into::into),
        )
    }

    #[instrument(name = "graphql.permissions", skip_all)]
    async fn permissions(
        &self,
        ctx: &Context<'_>,
        page: Option<u64>,
        page_size: Option<u64>,
        search: Option<String>,
    ) -> async_graphql::Result<PermissionPage> {
        let (data, request) = authorize(ctx, &operations::PERMISSIONS).await?;
        let query = PermissionQuery {
            page: page.unwrap_or(1),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            search,
        };
        respond(data.service.list(&query, &request.cancel).await.map(Into::into))
    }

    #[instrument(name = "graphql.permissions_by_ids", skip_all)]
    async fn permissions_by_ids(
        &self,
        ctx: &Context<'_>,
        ids: Vec<Uuid>,
    ) -> async_graphql::Result<Vec<PermissionNode>> {
        let (data, request) = authorize(ctx, &operations::PERMISSIONS_BY_IDS).await?;
        respond(data.service.get_by_ids(&ids, &request.cancel).await.map(nodes))
    }

    #[instrument(name = "graphql.permissions_by_resource", skip_all)]
    async fn permissions_by_resource(
        &self,
        ctx: &Context<'_>,
        resource: String,
    ) -> async_graphql::Result<Vec<PermissionNode>> {
        let (data, request) = authorize(ctx, &operations::PERMISSIONS_BY_RESOURCE).await?;
        respond(
            data.service
                .get_by_resource(&resource, &request.cancel)
                .await
                .map(nodes),
        )
    }

    #[instrument(name = "graphql.role_permissions", skip_all, fields(%role_id))]
    async fn role_permissions(
        &self,
        ctx: &Context<'_>,
        role_id: Uuid,
    ) -> async_graphql::Result<Vec<PermissionNode>> {
        let (data, request) = authorize(ctx, &operations::ROLE_PERMISSIONS).await?;
        respond(data.service.get_by_role(role_id, &request.cancel).await.map(nodes))
    }

    #[instrument(name = "graphql.user_permissions", skip_all, fields(%user_id))]
    async fn user_permissions(
        &self,
        ctx: &Context<'_>,
        user_id: Uuid,
    ) -> async_graphql::Result<Vec<PermissionNode>> {
        let (data, request) = authorize(ctx, &operations::USER_PERMISSIONS).await?;
        respond(data.service.get_by_user(user_id, &request.cancel).await.map(nodes))
    }

    #[instrument(name = "graphql.user_has_permission", skip_all, fields(%user_id))]
    async fn user_has_permission(
        &self,
        ctx: &Context<'_>,
        user_id: Uuid,
        name: String,
    ) -> async_graphql::Result<bool> {
        let (data, request) = authorize(ctx, &operations::USER_HAS_PERMISSION).await?;
        respond(
            data.service
                .user_has_permission(user_id, &name, &request.cancel)
                .await,
        )
    }

    #[instrument(name = "graphql.user_has_all", skip_all, fields(%user_id))]
    async fn user_has_all(
        &self,
        ctx: &Context<'_>,
        user_id: Uuid,
        names: Vec<String>,
    ) -> async_graphql::Result<bool> {
        let (data, request) = authorize(ctx, &operations::USER_HAS_ALL).await?;
        respond(data.service.user_has_all(user_id, &names, &request.cancel).await)
    }

    #[instrument(name = "graphql.user_has_any", skip_all, fields(%user_id))]
    async fn user_has_any(
        &self,
        ctx: &Context<'_>,
        user_id: Uuid,
        names: Vec<String>,
    ) -> async_graphql::Result<bool> {
        let (data, request) = authorize(ctx, &operations::USER_HAS_ANY).await?;
        respond(data.service.user_has_any(user_id, &names, &request.cancel).await)
    }
}

#[derive(Default)]
pub struct PermissionMutations;

#[Object]
impl PermissionMutations {
    #[instrument(name = "graphql.create_permission", skip_all)]
    async fn create_permission(
        &self,
        ctx: &Context<'_>,
        input: CreatePermissionInput,
    ) -> async_graphql::Result<PermissionNode> {
        let (data, request) = authorize(ctx, &operations::CREATE_PERMISSION).await?;
        let new = NewPermission::new(input.name, input.resource, input.action)
            .with_description(input.description);
        let actor = request.principal.user_id().ok();
        respond(
            data.service
                .create(new, actor, &request.cancel)
                .await
                .map(Into::into),
        )
    }

    #[instrument(name = "graphql.update_permission", skip_all, fields(%id))]
    async fn update_permission(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        input: UpdatePermissionInput,
    ) -> async_graphql::Result<PermissionNode> {
        let (data, request) = authorize(ctx, &operations::UPDATE_PERMISSION).await?;
        let changes = PermissionChanges {
            name: input.name,
            description: input.description,
            resource: input.resource,
            action: input.action,
        };
        let actor = request.principal.user_id().ok();
        respond(
            data.service
                .update(id, changes, actor, &request.cancel)
                .await
                .map(Into::into),
        )
    }

    #[instrument(name = "graphql.delete_permission", skip_all, fields(%id))]
    async fn delete_permission(&self, ctx: &Context<'_>, id: Uuid) -> async_graphql::Result<bool> {
        let (data, request) = authorize(ctx, &operations::DELETE_PERMISSION).await?;
        let actor = request.principal.user_id().ok();
        respond(
            data.service
                .delete(id, actor, &request.cancel)
                .await
                .map(|()| true),
        )
    }

    #[instrument(name = "graphql.restore_permission", skip_all, fields(%id))]
    async fn restore_permission(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
    ) -> async_graphql::Result<PermissionNode> {
        let (data, request) = authorize(ctx, &operations::RESTORE_PERMISSION).await?;
        let actor = request.principal.user_id().ok();
        respond(
            data.service
                .restore(id, actor, &request.cancel)
                .await
                .map(Into::into),
        )
    }
}
