//! Migration: Create cutover_checklists.
//!
//! Eight boolean gates per cutover attempt, one-to-one with cutover_tables.

use sea_orm_migration::prelude::*;

use super::m20261001_000001_create_cutover_tables::CutoverTables;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let gate = |column: CutoverChecklists| {
            ColumnDef::new(column)
                .boolean()
                .not_null()
                .default(false)
                .to_owned()
        };

        manager
            .create_table(
                Table::create()
                    .table(CutoverChecklists::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CutoverChecklists::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CutoverChecklists::CutoverTableId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(CutoverChecklists::TableName)
                            .string_len(63)
                            .not_null(),
                    )
                    .col(gate(CutoverChecklists::DataConsistency))
                    .col(gate(CutoverChecklists::ReferentialIntegrity))
                    .col(gate(CutoverChecklists::PerformanceValidation))
                    .col(gate(CutoverChecklists::SecurityValidation))
                    .col(gate(CutoverChecklists::BackupComplete))
                    .col(gate(CutoverChecklists::FreezeWindowScheduled))
                    .col(gate(CutoverChecklists::TeamNotified))
                    .col(gate(CutoverChecklists::RollbackPlanReady))
                    .col(
                        ColumnDef::new(CutoverChecklists::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CutoverChecklists::CompletedBy)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CutoverChecklists::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CutoverChecklists::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cutover_checklists_cutover_table_id")
                            .from(CutoverChecklists::Table, CutoverChecklists::CutoverTableId)
                            .to(CutoverTables::Table, CutoverTables::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CutoverChecklists::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden, Clone, Copy)]
enum CutoverChecklists {
    Table,
    Id,
    CutoverTableId,
    TableName,
    DataConsistency,
    ReferentialIntegrity,
    PerformanceValidation,
    SecurityValidation,
    BackupComplete,
    FreezeWindowScheduled,
    TeamNotified,
    RollbackPlanReady,
    CompletedAt,
    CompletedBy,
    CreatedAt,
    UpdatedAt,
}
