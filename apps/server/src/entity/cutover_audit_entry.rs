//! Cutover audit entry entity for SeaORM.
//!
//! Rows are only ever inserted.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cutover_audit_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub table_name: String,
    pub cutover_table_id: Option<Uuid>,
    /// Position in the per-table chain, starting at 1
    pub sequence: i64,
    /// prepare, cutover, rollback, validation, reconciliation
    pub operation: String,
    /// success, failure, in_progress
    pub status: String,
    /// State-machine edge for transition entries
    pub transition: Option<String>,
    pub actor: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub details: Json,
    pub error_message: Option<String>,
    pub prev_hash: String,
    pub entry_hash: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
