//! Schema migrations for the reputation store.

pub use sea_orm_migration::prelude::*;

mod m20261018_000001_create_ip_reputation;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20261018_000001_create_ip_reputation::Migration)]
    }
}
