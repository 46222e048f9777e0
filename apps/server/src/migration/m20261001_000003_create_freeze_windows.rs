//! Migration: Create freeze_windows and freeze_window_tables.
//!
//! A window may cover several tables cut over together.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FreezeWindows::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FreezeWindows::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(FreezeWindows::Description).text().not_null())
                    .col(
                        ColumnDef::new(FreezeWindows::StartTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FreezeWindows::EndTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FreezeWindows::Status)
                            .string_len(20)
                            .not_null()
                            .default("scheduled"),
                    )
                    .col(ColumnDef::new(FreezeWindows::CreatedBy).string_len(255).not_null())
                    .col(
                        ColumnDef::new(FreezeWindows::ActivatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(FreezeWindows::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(FreezeWindows::CancelledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(FreezeWindows::CancelReason).text().null())
                    .col(ColumnDef::new(FreezeWindows::Version).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(FreezeWindows::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(FreezeWindows::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_freeze_windows_status")
                    .table(FreezeWindows::Table)
                    .col(FreezeWindows::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FreezeWindowTables::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FreezeWindowTables::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FreezeWindowTables::FreezeWindowId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FreezeWindowTables::TableName)
                            .string_len(63)
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_freeze_window_tables_window_id")
                            .from(FreezeWindowTables::Table, FreezeWindowTables::FreezeWindowId)
                            .to(FreezeWindows::Table, FreezeWindows::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_freeze_window_tables_window_table")
                    .table(FreezeWindowTables::Table)
                    .col(FreezeWindowTables::FreezeWindowId)
                    .col(FreezeWindowTables::TableName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_freeze_window_tables_table_name")
                    .table(FreezeWindowTables::Table)
                    .col(FreezeWindowTables::TableName)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FreezeWindowTables::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FreezeWindows::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FreezeWindows {
    Table,
    Id,
    Description,
    StartTime,
    EndTime,
    Status,
    CreatedBy,
    ActivatedAt,
    CompletedAt,
    CancelledAt,
    CancelReason,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FreezeWindowTables {
    Table,
    Id,
    FreezeWindowId,
    TableName,
}
