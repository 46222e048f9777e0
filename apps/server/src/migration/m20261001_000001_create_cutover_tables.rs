//! Migration: Create cutover_tables.
//!
//! One row per registration attempt of a logical table. The row is the only
//! mutable shared state of the engine and is guarded by `version`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CutoverTables::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CutoverTables::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(CutoverTables::Name).string_len(63).not_null())
                    .col(ColumnDef::new(CutoverTables::Attempt).integer().not_null().default(1))
                    .col(
                        ColumnDef::new(CutoverTables::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::ReadSource)
                            .string_len(20)
                            .not_null()
                            .default("legacy"),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::WriteSource)
                            .string_len(20)
                            .not_null()
                            .default("legacy"),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::ValidationStatus)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::DriftPercentage)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::RecordCountLegacy)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::RecordCountNew)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::RecordCountDifference)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::ReferentialIntegrityStatus)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::ReferentialIntegrityIssues)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::DualWriteStartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::ReadSwitchedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::LastReconciledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::CutoverDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::RollbackDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(CutoverTables::RollbackReason).text().null())
                    .col(ColumnDef::new(CutoverTables::Version).integer().not_null().default(0))
                    .col(ColumnDef::new(CutoverTables::CreatedBy).string_len(255).not_null())
                    .col(
                        ColumnDef::new(CutoverTables::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CutoverTables::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // A name may be registered again only as a new attempt
        manager
            .create_index(
                Index::create()
                    .name("idx_cutover_tables_name_attempt")
                    .table(CutoverTables::Table)
                    .col(CutoverTables::Name)
                    .col(CutoverTables::Attempt)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_cutover_tables_status")
                    .table(CutoverTables::Table)
                    .col(CutoverTables::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CutoverTables::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum CutoverTables {
    Table,
    Id,
    Name,
    Attempt,
    Status,
    ReadSource,
    WriteSource,
    ValidationStatus,
    DriftPercentage,
    RecordCountLegacy,
    RecordCountNew,
    RecordCountDifference,
    ReferentialIntegrityStatus,
    ReferentialIntegrityIssues,
    DualWriteStartedAt,
    ReadSwitchedAt,
    LastReconciledAt,
    CutoverDate,
    RollbackDate,
    RollbackReason,
    Version,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}
