use std::sync::Arc;

use entity::{role_permissions, roles, user_roles};
use migration::{Migrator, MigratorTrait};
use platform_api::codes;
use platform_authz::{
    Claim, Decision, DenyReason, Grant, PermissionEvaluator, PermissionRequirement, Principal,
};
use platform_db::UnitOfWork;
use platform_permissions::{
    NewPermission, Permission, PermissionChanges, PermissionQuery, PermissionService,
};
use sea_orm::{ActiveValue::Set, Database, EntityTrait};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Fixture {
    service: PermissionService,
    cancel: CancellationToken,
}

impl Fixture {
    async fn new() -> Self {
        let conn = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&conn, None).await.unwrap();
        Self {
            service: PermissionService::new(UnitOfWork::new(conn)),
            cancel: CancellationToken::new(),
        }
    }

    async fn permission(&self, name: &str) -> Permission {
        let resource = name.split(':').next().unwrap_or(name);
        let action = name.rsplit(':').next().unwrap_or(name);
        self.service
            .create(NewPermission::new(name, resource, action), None, &self.cancel)
            .await
            .into_value()
    }

    async fn role(&self, name: &str, grants: &[&Permission]) -> Uuid {
        let uow = self.service.unit_of_work();
        let role = uow
            .repository::<roles::Entity>()
            .add(
                roles::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    name: Set(name.to_string()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        for permission in grants {
            role_permissions::Entity::insert(role_permissions::ActiveModel {
                role_id: Set(role.id),
                permission_id: Set(permission.id),
            })
            .exec_without_returning(uow.pool())
            .await
            .unwrap();
        }
        role.id
    }

    async fn assign(&self, user_id: Uuid, role_id: Uuid) {
        user_roles::Entity::insert(user_roles::ActiveModel {
            user_id: Set(user_id),
            role_id: Set(role_id),
        })
        .exec_without_returning(self.service.unit_of_work().pool())
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn role_grants_resolve_through_the_store() {
    let fx = Fixture::new().await;
    let delete = fx.permission("Users:Delete").await;
    let admin = fx.role("Admin", &[&delete]).await;
    let u1 = Uuid::new_v4();
    fx.assign(u1, admin).await;

    let evaluator = PermissionEvaluator::new(Arc::new(fx.service.clone()));
    let principal = Principal::user(u1);

    let decision = evaluator
        .evaluate(
            Some(&principal),
            &PermissionRequirement::new("Users:Delete").unwrap(),
            &fx.cancel,
        )
        .await;
    assert_eq!(decision, Decision::Succeed(Grant::Store));

    let decision = evaluator
        .evaluate(
            Some(&principal),
            &PermissionRequirement::new("Users:Ban").unwrap(),
            &fx.cancel,
        )
        .await;
    assert_eq!(decision, Decision::Fail(DenyReason::NotGranted));

    let with_claim = principal.with_claim(Claim::permission("Users:Ban"));
    let decision = evaluator
        .evaluate(
            Some(&with_claim),
            &PermissionRequirement::new("Users:Ban").unwrap(),
            &fx.cancel,
        )
        .await;
    assert_eq!(decision, Decision::Succeed(Grant::Claim));
}

#[tokio::test]
async fn lookups_by_name_and_resource_ignore_case() {
    let fx = Fixture::new().await;
    let read = fx.permission("Users:Read").await;
    fx.permission("Users:Write").await;
    fx.permission("Orders:Read").await;

    let found = fx
        .service
        .get_by_name("users:read", &fx.cancel)
        .await
        .into_value();
    assert_eq!(found.id, read.id);

    let missing = fx.service.get_by_name("Users:Ban", &fx.cancel).await;
    assert_eq!(missing.error().code(), codes::NOT_FOUND);

    let users = fx
        .service
        .get_by_resource("USERS", &fx.cancel)
        .await
        .into_value();
    let names: Vec<_> = users.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Users:Read", "Users:Write"]);
}

#[tokio::test]
async fn get_by_id_reports_null_for_unknown_ids() {
    let fx = Fixture::new().await;
    let read = fx.permission("Users:Read").await;
    let write = fx.permission("Users:Write").await;

    let found = fx.service.get_by_id(read.id, &fx.cancel).await;
    assert_eq!(found.value().name, "Users:Read");

    let missing = fx.service.get_by_id(Uuid::new_v4(), &fx.cancel).await;
    assert_eq!(missing.error().code(), codes::NULL_VALUE);

    let many = fx
        .service
        .get_by_ids(&[write.id, Uuid::new_v4(), read.id], &fx.cancel)
        .await
        .into_value();
    assert_eq!(many.len(), 2);
}

#[tokio::test]
async fn user_permissions_are_deduplicated_across_roles() {
    let fx = Fixture::new().await;
    let read = fx.permission("Users:Read").await;
    let delete = fx.permission("Users:Delete").await;
    fx.permission("Orders:Read").await;
    let admin = fx.role("Admin", &[&read, &delete]).await;
    let viewer = fx.role("Viewer", &[&read]).await;
    let user = Uuid::new_v4();
    fx.assign(user, admin).await;
    fx.assign(user, viewer).await;

    let held = fx.service.get_by_user(user, &fx.cancel).await.into_value();
    let names: Vec<_> = held.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Users:Delete", "Users:Read"]);

    let by_role = fx.service.get_by_role(viewer, &fx.cancel).await.into_value();
    assert_eq!(by_role.len(), 1);

    let nobody = fx
        .service
        .get_by_user(Uuid::new_v4(), &fx.cancel)
        .await
        .into_value();
    assert!(nobody.is_empty());
}

#[tokio::test]
async fn has_all_and_has_any_agree_with_single_checks() {
    let fx = Fixture::new().await;
    let read = fx.permission("Users:Read").await;
    let reports = fx.permission("Relatórios:Ver").await;
    fx.permission("Users:Delete").await;
    let role = fx.role("Viewer", &[&read, &reports]).await;
    let user = Uuid::new_v4();
    fx.assign(user, role).await;

    for held in [" Users:Read ", "USERS:READ", "RELATÓRIOS:VER"] {
        assert!(
            fx.service
                .user_has_permission(user, held, &fx.cancel)
                .await
                .into_value(),
            "{held}"
        );
    }

    let candidates = [
        "Users:Read",
        "users:delete",
        "Users:Ban",
        "USERS:READ",
        " Users:Read ",
        "RELATÓRIOS:VER",
    ];
    for a in candidates {
        for b in candidates {
            let has_a = fx
                .service
                .user_has_permission(user, a, &fx.cancel)
                .await
                .into_value();
            let has_b = fx
                .service
                .user_has_permission(user, b, &fx.cancel)
                .await
                .into_value();
            let all = fx
                .service
                .user_has_all(user, &[a, b], &fx.cancel)
                .await
                .into_value();
            let any = fx
                .service
                .user_has_any(user, &[a, b], &fx.cancel)
                .await
                .into_value();
            assert_eq!(all, has_a && has_b, "all({a}, {b})");
            assert_eq!(any, has_a || has_b, "any({a}, {b})");
        }
    }

    let none: [&str; 0] = [];
    assert!(fx.service.user_has_all(user, &none, &fx.cancel).await.into_value());
    assert!(!fx.service.user_has_any(user, &none, &fx.cancel).await.into_value());
}

#[tokio::test]
async fn names_are_unique_ignoring_case() {
    let fx = Fixture::new().await;
    let read = fx.permission("Users:Read").await;
    let write = fx.permission("Users:Write").await;

    let duplicate = fx
        .service
        .create(NewPermission::new("USERS:READ", "Users", "Read"), None, &fx.cancel)
        .await;
    assert_eq!(duplicate.error().code(), codes::CONFLICT);

    let rename = fx
        .service
        .update(
            write.id,
            PermissionChanges {
                name: Some("users:read".into()),
                ..Default::default()
            },
            None,
            &fx.cancel,
        )
        .await;
    assert_eq!(rename.error().code(), codes::CONFLICT);

    let recase = fx
        .service
        .update(
            read.id,
            PermissionChanges {
                name: Some("users:read".into()),
                description: Some("List users".into()),
                ..Default::default()
            },
            None,
            &fx.cancel,
        )
        .await
        .into_value();
    assert_eq!(recase.name, "users:read");
    assert!(recase.updated_at.is_some());
}

#[tokio::test]
async fn invalid_input_is_rejected_before_writing() {
    let fx = Fixture::new().await;
    let blank = fx
        .service
        .create(NewPermission::new("  ", "Users", "Read"), None, &fx.cancel)
        .await;
    assert_eq!(blank.error().code(), codes::VALIDATION);

    let page = fx
        .service
        .list(&PermissionQuery::default(), &fx.cancel)
        .await
        .into_value();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn soft_delete_hides_and_restore_brings_back_grants() {
    let fx = Fixture::new().await;
    let delete = fx.permission("Users:Delete").await;
    let role = fx.role("Admin", &[&delete]).await;
    let user = Uuid::new_v4();
    fx.assign(user, role).await;
    let actor = Some(Uuid::new_v4());

    assert!(fx.service.delete(delete.id, actor, &fx.cancel).await.is_success());
    assert!(
        !fx.service
            .user_has_permission(user, "Users:Delete", &fx.cancel)
            .await
            .into_value()
    );
    assert_eq!(
        fx.service.get_by_name("Users:Delete", &fx.cancel).await.error().code(),
        codes::NOT_FOUND
    );
    let again = fx.service.delete(delete.id, actor, &fx.cancel).await;
    assert_eq!(again.error().code(), codes::NOT_FOUND);

    let restored = fx
        .service
        .restore(delete.id, actor, &fx.cancel)
        .await
        .into_value();
    assert!(!restored.is_deleted);
    assert!(restored.deleted_at.is_none());
    assert!(
        fx.service
            .user_has_permission(user, "Users:Delete", &fx.cancel)
            .await
            .into_value()
    );
}

#[tokio::test]
async fn restore_conflicts_with_a_live_duplicate() {
    let fx = Fixture::new().await;
    let original = fx.permission("Users:Delete").await;
    assert!(fx.service.delete(original.id, None, &fx.cancel).await.is_success());
    fx.permission("users:delete").await;

    let restored = fx.service.restore(original.id, None, &fx.cancel).await;
    assert_eq!(restored.error().code(), codes::CONFLICT);
}

#[tokio::test]
async fn list_pages_and_searches() {
    let fx = Fixture::new().await;
    for name in ["Users:Read", "Users:Write", "Orders:Read", "Orders:Refund"] {
        fx.permission(name).await;
    }
    let page = fx
        .service
        .list(
            &PermissionQuery {
                page: 2,
                page_size: 3,
                search: None,
            },
            &fx.cancel,
        )
        .await
        .into_value();
    assert_eq!(page.total, 4);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].name, "Users:Write");

    let page = fx
        .service
        .list(
            &PermissionQuery {
                search: Some("ORDERS".into()),
                ..Default::default()
            },
            &fx.cancel,
        )
        .await
        .into_value();
    let names: Vec<_> = page.items.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Orders:Read", "Orders:Refund"]);
}

#[tokio::test]
async fn search_treats_wildcards_literally() {
    let fx = Fixture::new().await;
    for name in ["Users:Read", "Audit_Log:Read", "Orders:Read"] {
        fx.permission(name).await;
    }
    let search = |term: &str| PermissionQuery {
        search: Some(term.into()),
        ..Default::default()
    };

    let page = fx.service.list(&search("_"), &fx.cancel).await.into_value();
    let names: Vec<_> = page.items.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Audit_Log:Read"]);

    let page = fx.service.list(&search("%"), &fx.cancel).await.into_value();
    assert_eq!(page.total, 0);
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn missing_names_reports_unknown_permissions() {
    let fx = Fixture::new().await;
    fx.permission("Users:Read").await;
    let missing = fx
        .service
        .missing_names(&["users:read", "Users:Ban", "Users:Ban"], &fx.cancel)
        .await
        .into_value();
    assert_eq!(missing, ["Users:Ban"]);
}

#[tokio::test]
async fn cancelled_calls_fail_with_cancelled() {
    let fx = Fixture::new().await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = fx.service.get_by_user(Uuid::new_v4(), &cancel).await;
    assert_eq!(outcome.error().code(), codes::CANCELLED);

    let evaluator = PermissionEvaluator::new(Arc::new(fx.service.clone()));
    let decision = evaluator
        .evaluate(
            Some(&Principal::user(Uuid::new_v4())),
            &PermissionRequirement::new("Users:Read").unwrap(),
            &cancel,
        )
        .await;
    assert_eq!(decision, Decision::Fail(DenyReason::Cancelled));
}

#[tokio::test]
async fn database_faults_become_exception_outcomes() {
    let fx = Fixture::new().await;
    fx.service.unit_of_work().pool().clone().close().await.unwrap();

    let outcome = fx.service.get_by_user(Uuid::new_v4(), &fx.cancel).await;
    assert_eq!(outcome.error().code(), codes::EXCEPTION);

    let decision = PermissionEvaluator::new(Arc::new(fx.service.clone()))
        .evaluate(
            Some(&Principal::user(Uuid::new_v4())),
            &PermissionRequirement::new("Users:Read").unwrap(),
            &fx.cancel,
        )
        .await;
    assert_eq!(decision, Decision::Fail(DenyReason::StoreFailure));
}
