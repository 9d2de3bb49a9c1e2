pub use sea_orm_migration::prelude::*;

mod m20250601_000001_create_pipeline_tables;
mod m20250614_000002_add_contact_email_uniqueness;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_pipeline_tables::Migration),
            Box::new(m20250614_000002_add_contact_email_uniqueness::Migration),
        ]
    }
}
