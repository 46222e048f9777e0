//! Reconciliation job entity for SeaORM.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "reconciliation_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub cutover_table_id: Uuid,
    pub table_name: String,
    /// full, incremental, drift_check
    pub job_type: String,
    /// pending, running, completed, failed
    pub status: String,
    /// 1-based attempt counter across the retry chain
    pub attempt: i32,
    /// Failed job this one retries
    pub retry_of: Option<Uuid>,
    /// Earliest time the runner may pick the job up
    pub scheduled_at: DateTimeUtc,
    pub started_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
    pub records_processed: i64,
    pub records_total: Option<i64>,
    /// Count of mismatched records
    pub drift_detected: i64,
    #[sea_orm(column_type = "Double", nullable)]
    pub drift_percentage: Option<f64>,
    #[sea_orm(column_type = "JsonBinary")]
    pub errors: Json,
    /// Retries exhausted (or non-transient failure); blocks validation until a later job passes
    pub blocking_alert: bool,
    pub triggered_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cutover_table::Entity",
        from = "Column::CutoverTableId",
        to = "super::cutover_table::Column::Id",
        on_delete = "Cascade"
    )]
    CutoverTable,
}

impl Related<super::cutover_table::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CutoverTable.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
