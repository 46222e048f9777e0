//! SeaORM database migrations.

pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_cutover_tables;
mod m20261001_000002_create_cutover_checklists;
mod m20261001_000003_create_freeze_windows;
mod m20261001_000004_create_reconciliation_jobs;
mod m20261001_000005_create_cutover_audit_entries;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_cutover_tables::Migration),
            Box::new(m20261001_000002_create_cutover_checklists::Migration),
            Box::new(m20261001_000003_create_freeze_windows::Migration),
            Box::new(m20261001_000004_create_reconciliation_jobs::Migration),
            Box::new(m20261001_000005_create_cutover_audit_entries::Migration),
        ]
    }
}
