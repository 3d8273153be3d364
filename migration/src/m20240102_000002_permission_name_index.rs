use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ConnectionTrait, DatabaseBackend};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Permissions {
    Table,
    Resource,
    IsDeleted,
}

#[derive(DeriveIden)]
enum UserRoles {
    Table,
    RoleId,
}

// Name uniqueness is case-insensitive and enforced by the permission store,
// so only lookup indexes live in the schema.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("idx_permissions_resource")
                    .table(Permissions::Table)
                    .col(Permissions::Resource)
                    .col(Permissions::IsDeleted)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_user_roles_role")
                    .table(UserRoles::Table)
                    .col(UserRoles::RoleId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        let lower_name_index = match manager.get_database_backend() {
            DatabaseBackend::Postgres => Some(
                "CREATE INDEX IF NOT EXISTS idx_permissions_lower_name \
                 ON permissions (lower(name)) WHERE NOT is_deleted",
            ),
            _ => None,
        };
        if let Some(sql) = lower_name_index {
            manager.get_connection().execute_unprepared(sql).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS idx_permissions_lower_name")
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_user_roles_role")
                    .table(UserRoles::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_permissions_resource")
                    .table(Permissions::Table)
                    .to_owned(),
            )
            .await
    }
}
