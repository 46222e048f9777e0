//! Cutover table entity for SeaORM.
//!
//! One row per registration attempt of a logical table under migration.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cutover_tables")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// 1-based; a rolled back table is retried under a new attempt
    pub attempt: i32,
    /// pending, ready, cutover, completed, rolled_back
    pub status: String,
    /// legacy, supabase, dual
    pub read_source: String,
    /// legacy, supabase, dual
    pub write_source: String,
    /// pending, passed, failed
    pub validation_status: String,
    #[sea_orm(column_type = "Double")]
    pub drift_percentage: f64,
    pub record_count_legacy: i64,
    pub record_count_new: i64,
    pub record_count_difference: i64,
    /// pending, clean, issues
    pub referential_integrity_status: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub referential_integrity_issues: Json,
    pub dual_write_started_at: Option<DateTimeUtc>,
    pub read_switched_at: Option<DateTimeUtc>,
    pub last_reconciled_at: Option<DateTimeUtc>,
    pub cutover_date: Option<DateTimeUtc>,
    pub rollback_date: Option<DateTimeUtc>,
    pub rollback_reason: Option<String>,
    /// Optimistic-concurrency counter guarding every row write
    pub version: i32,
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::cutover_checklist::Entity")]
    Checklist,
    #[sea_orm(has_many = "super::reconciliation_job::Entity")]
    ReconciliationJobs,
}

impl Related<super::cutover_checklist::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Checklist.def()
    }
}

impl Related<super::reconciliation_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReconciliationJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
