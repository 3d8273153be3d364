use crate::roles;
use sea_orm::entity::prelude::*;
use uuid::Uuid;

/// Grants a role to a user. Users themselves live with the identity
/// provider; only their stable id is stored here.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "user_roles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub role_id: Uuid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "roles::Entity",
        from = "Column::RoleId",
        to = "roles::Column::Id",
        on_delete = "Cascade"
    )]
    Role,
}

impl Related<roles::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Role.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
