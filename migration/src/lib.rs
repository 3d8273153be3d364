pub use sea_orm_migration::prelude::*;

mod m20240101_000001_permission_graph;
mod m20240102_000002_permission_name_index;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_permission_graph::Migration),
            Box::new(m20240102_000002_permission_name_index::Migration),
        ]
    }
}
