//! Migration: Create cutover_audit_entries.
//!
//! Append-only. The (table_name, sequence) unique index makes concurrent appends
//! to the same chain collide instead of forking it.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CutoverAuditEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CutoverAuditEntries::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CutoverAuditEntries::TableName)
                            .string_len(63)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CutoverAuditEntries::CutoverTableId).uuid().null())
                    .col(
                        ColumnDef::new(CutoverAuditEntries::Sequence)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CutoverAuditEntries::Operation)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CutoverAuditEntries::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CutoverAuditEntries::Transition)
                            .string_len(40)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CutoverAuditEntries::Actor)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CutoverAuditEntries::Details)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CutoverAuditEntries::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(CutoverAuditEntries::PrevHash)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CutoverAuditEntries::EntryHash)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CutoverAuditEntries::CreatedAt)
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
                    .name("idx_cutover_audit_entries_table_sequence")
                    .table(CutoverAuditEntries::Table)
                    .col(CutoverAuditEntries::TableName)
                    .col(CutoverAuditEntries::Sequence)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CutoverAuditEntries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CutoverAuditEntries {
    Table,
    Id,
    TableName,
    CutoverTableId,
    Sequence,
    Operation,
    Status,
    Transition,
    Actor,
    Details,
    ErrorMessage,
    PrevHash,
    EntryHash,
    CreatedAt,
}
