//! Migration: Create reconciliation_jobs.
//!
//! Each row is one run of the drift detector. Retries are new rows linked via retry_of.

use sea_orm_migration::prelude::*;

use super::m20261001_000001_create_cutover_tables::CutoverTables;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReconciliationJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReconciliationJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::CutoverTableId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::TableName)
                            .string_len(63)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::JobType)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::Attempt)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(ReconciliationJobs::RetryOf).uuid().null())
                    .col(
                        ColumnDef::new(ReconciliationJobs::ScheduledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::RecordsProcessed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::RecordsTotal)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::DriftDetected)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::DriftPercentage)
                            .double()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::Errors)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::BlockingAlert)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::TriggeredBy)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reconciliation_jobs_cutover_table_id")
                            .from(ReconciliationJobs::Table, ReconciliationJobs::CutoverTableId)
                            .to(CutoverTables::Table, CutoverTables::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Runner picks pending jobs in scheduling order
        manager
            .create_index(
                Index::create()
                    .name("idx_reconciliation_jobs_status")
                    .table(ReconciliationJobs::Table)
                    .col(ReconciliationJobs::Status)
                    .col(ReconciliationJobs::ScheduledAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reconciliation_jobs_cutover_table_id")
                    .table(ReconciliationJobs::Table)
                    .col(ReconciliationJobs::CutoverTableId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReconciliationJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ReconciliationJobs {
    Table,
    Id,
    CutoverTableId,
    TableName,
    JobType,
    Status,
    Attempt,
    RetryOf,
    ScheduledAt,
    StartedAt,
    CompletedAt,
    RecordsProcessed,
    RecordsTotal,
    DriftDetected,
    DriftPercentage,
    Errors,
    BlockingAlert,
    TriggeredBy,
    CreatedAt,
    UpdatedAt,
}
