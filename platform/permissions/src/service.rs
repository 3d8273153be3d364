use std::collections::HashSet;
use std::future::Future;

use async_trait::async_trait;
use entity::{permissions, role_permissions, user_roles};
use platform_api::{ApiError, Outcome};
use platform_authz::{PermissionSource, permission_key};
use platform_db::{DbError, Page, Repository, UnitOfWork};
use sea_orm::sea_query::{Expr, Func, LikeExpr, Query, SelectStatement, SimpleExpr};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, IntoActiveModel, Order,
    QueryFilter, QueryOrder,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span};
use uuid::Uuid;

use crate::input::{NewPermission, PermissionChanges, PermissionQuery};
use crate::Permission;

type StoreResult<T> = Result<Outcome<T>, DbError>;

/// Reads and writes permissions through the unit of work.
///
/// Reads run on the pool; writes run in their own transaction. Role and
/// user-role rows are only read.
#[derive(Clone)]
pub struct PermissionService {
    uow: UnitOfWork,
    span: Span,
}

impl PermissionService {
    pub fn new(uow: UnitOfWork) -> Self {
        Self::with_span(uow, Span::current())
    }

    pub fn with_span(uow: UnitOfWork, span: Span) -> Self {
        Self { uow, span }
    }

    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.uow
    }

    pub async fn get_by_id(&self, id: Uuid, cancel: &CancellationToken) -> Outcome<Permission> {
        self.run("get_by_id", cancel, async {
            let found = self.permissions().get_by_id(id).await?;
            Ok(Outcome::from_nullable(found))
        })
        .await
    }

    /// Unknown ids are skipped.
    pub async fn get_by_ids(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Outcome<Vec<Permission>> {
        self.run("get_by_ids", cancel, async {
            if ids.is_empty() {
                return Ok(Outcome::success(Vec::new()));
            }
            let repo = self.permissions();
            let found = repo
                .query()
                .filter(permissions::Column::Id.is_in(ids.iter().copied()))
                .order_by_asc(permissions::Column::Name)
                .all(repo.connection())
                .await
                .map_err(DbError::from)?;
            Ok(Outcome::success(found))
        })
        .await
    }

    pub async fn get_by_name(&self, name: &str, cancel: &CancellationToken) -> Outcome<Permission> {
        self.run("get_by_name", cancel, async {
            let found = self.permissions().first(lower_eq(permissions::Column::Name, name)).await?;
            Ok(match found {
                Some(permission) => Outcome::success(permission),
                None => Outcome::failure(ApiError::not_found(format!(
                    "permission with name '{name}' not found"
                ))),
            })
        })
        .await
    }

    pub async fn get_by_resource(
        &self,
        resource: &str,
        cancel: &CancellationToken,
    ) -> Outcome<Vec<Permission>> {
        self.run("get_by_resource", cancel, async {
            let repo = self.permissions();
            let found = repo
                .query()
                .filter(lower_eq(permissions::Column::Resource, resource))
                .order_by_asc(permissions::Column::Name)
                .all(repo.connection())
                .await
                .map_err(DbError::from)?;
            Ok(Outcome::success(found))
        })
        .await
    }

    pub async fn get_by_role(
        &self,
        role_id: Uuid,
        cancel: &CancellationToken,
    ) -> Outcome<Vec<Permission>> {
        self.run("get_by_role", cancel, async {
            let granted = permission_ids_for_roles(
                Expr::col(role_permissions::Column::RoleId).eq(role_id),
            );
            Ok(Outcome::success(self.granted_permissions(granted).await?))
        })
        .await
    }

    /// Effective permissions across all of the user's roles, each listed once.
    pub async fn get_by_user(
        &self,
        user_id: Uuid,
        cancel: &CancellationToken,
    ) -> Outcome<Vec<Permission>> {
        self.run("get_by_user", cancel, async {
            Ok(Outcome::success(self.user_permissions(user_id).await?))
        })
        .await
    }

    pub async fn user_has_permission(
        &self,
        user_id: Uuid,
        name: &str,
        cancel: &CancellationToken,
    ) -> Outcome<bool> {
        self.run("user_has_permission", cancel, async {
            let held = self.user_permission_names(user_id).await?;
            Ok(Outcome::success(held.contains(&permission_key(name))))
        })
        .await
    }

    /// True when the user holds every name. An empty list is trivially held.
    pub async fn user_has_all<S: AsRef<str> + Sync>(
        &self,
        user_id: Uuid,
        names: &[S],
        cancel: &CancellationToken,
    ) -> Outcome<bool> {
        self.run("user_has_all", cancel, async {
            let held = self.user_permission_names(user_id).await?;
            let all = names
                .iter()
                .all(|name| held.contains(&permission_key(name.as_ref())));
            Ok(Outcome::success(all))
        })
        .await
    }

    /// True when the user holds at least one name. An empty list is never held.
    pub async fn user_has_any<S: AsRef<str> + Sync>(
        &self,
        user_id: Uuid,
        names: &[S],
        cancel: &CancellationToken,
    ) -> Outcome<bool> {
        self.run("user_has_any", cancel, async {
            let held = self.user_permission_names(user_id).await?;
            let any = names
                .iter()
                .any(|name| held.contains(&permission_key(name.as_ref())));
            Ok(Outcome::success(any))
        })
        .await
    }

    /// Search matches name, description and resource, ignoring case.
    pub async fn list(
        &self,
        query: &PermissionQuery,
        cancel: &CancellationToken,
    ) -> Outcome<Page<Permission>> {
        self.run("list", cancel, async {
            let filter = query.search_term().map(|term| {
                Condition::any()
                    .add(lower(permissions::Column::Name).like(contains(&term)))
                    .add(lower(permissions::Column::Description).like(contains(&term)))
                    .add(lower(permissions::Column::Resource).like(contains(&term)))
            });
            let page = self
                .permissions()
                .get_paged(
                    query.page,
                    query.page_size,
                    filter,
                    Some((permissions::Column::Name, Order::Asc)),
                )
                .await?;
            Ok(Outcome::success(page))
        })
        .await
    }

    pub async fn create(
        &self,
        input: NewPermission,
        actor: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Outcome<Permission> {
        self.run("create", cancel, async {
            let input = match input.normalized() {
                Ok(input) => input,
                Err(err) => return Ok(Outcome::failure(err)),
            };
            let txn = self.uow.begin().await?;
            let repo = txn.repository::<permissions::Entity>();
            if let Some(conflict) = name_conflict(&repo, &input.name, None).await? {
                return Ok(Outcome::failure(conflict));
            }
            let created = repo
                .add(
                    permissions::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        name: Set(input.name),
                        description: Set(input.description),
                        resource: Set(input.resource),
                        action: Set(input.action),
                        ..Default::default()
                    },
                    actor,
                )
                .await?;
            txn.commit().await?;
            info!(permission_id = %created.id, name = %created.name, "permission created");
            Ok(Outcome::success(created))
        })
        .await
    }

    pub async fn update(
        &self,
        id: Uuid,
        changes: PermissionChanges,
        actor: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Outcome<Permission> {
        self.run("update", cancel, async {
            let changes = match changes.normalized() {
                Ok(changes) => changes,
                Err(err) => return Ok(Outcome::failure(err)),
            };
            let txn = self.uow.begin().await?;
            let repo = txn.repository::<permissions::Entity>();
            let Some(current) = repo.get_by_id(id).await? else {
                return Ok(Outcome::failure(not_found(id)));
            };
            if changes.is_empty() {
                return Ok(Outcome::success(current));
            }
            if let Some(name) = changes.name.as_deref() {
                if let Some(conflict) = name_conflict(&repo, name, Some(id)).await? {
                    return Ok(Outcome::failure(conflict));
                }
            }

            let mut active = current.into_active_model();
            if let Some(name) = changes.name {
                active.name = Set(name);
            }
            if let Some(description) = changes.description {
                active.description = Set(description);
            }
            if let Some(resource) = changes.resource {
                active.resource = Set(resource);
            }
            if let Some(action) = changes.action {
                active.action = Set(action);
            }
            let updated = repo.update(active, actor).await?;
            txn.commit().await?;
            info!(permission_id = %id, "permission updated");
            Ok(Outcome::success(updated))
        })
        .await
    }

    /// Soft delete. Role links are kept so a restore brings grants back.
    pub async fn delete(
        &self,
        id: Uuid,
        actor: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Outcome<()> {
        self.run("delete", cancel, async {
            let txn = self.uow.begin().await?;
            let deleted = txn
                .repository::<permissions::Entity>()
                .delete_by_id::<permissions::ActiveModel, _>(id, actor)
                .await?;
            if !deleted {
                return Ok(Outcome::failure(not_found(id)));
            }
            txn.commit().await?;
            info!(permission_id = %id, "permission deleted");
            Ok(Outcome::success(()))
        })
        .await
    }

    pub async fn restore(
        &self,
        id: Uuid,
        actor: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Outcome<Permission> {
        self.run("restore", cancel, async {
            let txn = self.uow.begin().await?;
            let repo = txn.repository::<permissions::Entity>();
            let Some(current) = repo.get_by_id_with_deleted(id).await? else {
                return Ok(Outcome::failure(not_found(id)));
            };
            if !current.is_deleted {
                return Ok(Outcome::success(current));
            }
            if let Some(conflict) = name_conflict(&repo, &current.name, Some(id)).await? {
                return Ok(Outcome::failure(conflict));
            }
            let restored = repo.restore::<permissions::ActiveModel>(current, actor).await?;
            txn.commit().await?;
            info!(permission_id = %id, "permission restored");
            Ok(Outcome::success(restored))
        })
        .await
    }

    /// Names of the given permissions that do not exist, compared ignoring case.
    pub async fn missing_names<S: AsRef<str> + Sync>(
        &self,
        names: &[S],
        cancel: &CancellationToken,
    ) -> Outcome<Vec<String>> {
        self.run("missing_names", cancel, async {
            let known: HashSet<String> = self
                .permissions()
                .query()
                .all(self.uow.pool())
                .await
                .map_err(DbError::from)?
                .into_iter()
                .map(|permission| permission_key(&permission.name))
                .collect();
            let mut missing: Vec<String> = names
                .iter()
                .map(|name| name.as_ref().to_owned())
                .filter(|name| !known.contains(&permission_key(name)))
                .collect();
            missing.sort();
            missing.dedup();
            Ok(Outcome::success(missing))
        })
        .await
    }

    fn permissions(&self) -> Repository<'_, permissions::Entity, platform_db::DbPool> {
        self.uow.repository::<permissions::Entity>()
    }

    async fn user_permissions(&self, user_id: Uuid) -> Result<Vec<Permission>, DbError> {
        let granted = permission_ids_for_roles(
            Expr::col(role_permissions::Column::RoleId).in_subquery(roles_of(user_id)),
        );
        self.granted_permissions(granted).await
    }

    async fn user_permission_names(&self, user_id: Uuid) -> Result<HashSet<String>, DbError> {
        Ok(self
            .user_permissions(user_id)
            .await?
            .into_iter()
            .map(|permission| permission_key(&permission.name))
            .collect())
    }

    async fn granted_permissions(
        &self,
        granted: SelectStatement,
    ) -> Result<Vec<Permission>, DbError> {
        let repo = self.permissions();
        Ok(repo
            .query()
            .filter(permissions::Column::Id.in_subquery(granted))
            .order_by_asc(permissions::Column::Name)
            .all(repo.connection())
            .await?)
    }

    /// Runs one store operation under its own span. Cancellation wins over
    /// completion; database faults become `EXCEPTION` failures.
    async fn run<T, F>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        work: F,
    ) -> Outcome<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let span = info_span!(parent: &self.span, "permissions.store", operation);
        async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("permission store call cancelled");
                    Outcome::failure(ApiError::cancelled())
                }
                result = work => match result {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(error = %err, "permission store call failed");
                        Outcome::failure(ApiError::from_error(&err))
                    }
                },
            }
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl PermissionSource for PermissionService {
    async fn permissions_for_user(
        &self,
        user_id: Uuid,
        cancel: &CancellationToken,
    ) -> Outcome<Vec<String>> {
        self.get_by_user(user_id, cancel)
            .await
            .map(|permissions| permissions.into_iter().map(|p| p.name).collect())
    }
}

fn lower(column: permissions::Column) -> Expr {
    Expr::expr(Func::lower(Expr::col((permissions::Entity, column))))
}

fn lower_eq(column: permissions::Column, value: &str) -> SimpleExpr {
    lower(column).eq(permission_key(value))
}

const LIKE_ESCAPE: char = '!';

/// `LIKE` pattern matching `term` anywhere, with wildcards in `term` taken
/// literally.
fn contains(term: &str) -> LikeExpr {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(ch);
    }
    pattern.push('%');
    LikeExpr::new(pattern).escape(LIKE_ESCAPE)
}

fn roles_of(user_id: Uuid) -> SelectStatement {
    Query::select()
        .column(user_roles::Column::RoleId)
        .from(user_roles::Entity)
        .and_where(Expr::col(user_roles::Column::UserId).eq(user_id))
        .to_owned()
}

fn permission_ids_for_roles(roles: SimpleExpr) -> SelectStatement {
    Query::select()
        .column(role_permissions::Column::PermissionId)
        .from(role_permissions::Entity)
        .and_where(roles)
        .to_owned()
}

async fn name_conflict<C: ConnectionTrait>(
    repo: &Repository<'_, permissions::Entity, C>,
    name: &str,
    except: Option<Uuid>,
) -> Result<Option<ApiError>, DbError> {
    let mut filter = Condition::all().add(lower_eq(permissions::Column::Name, name));
    if let Some(id) = except {
        filter = filter.add(permissions::Column::Id.ne(id));
    }
    Ok(repo
        .any(filter)
        .await?
        .then(|| ApiError::conflict(format!("permission '{}' already exists", name.trim()))))
}

fn not_found(id: Uuid) -> ApiError {
    ApiError::not_found(format!("permission {id} not found"))
}
