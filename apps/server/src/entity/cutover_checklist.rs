//! Cutover checklist entity for SeaORM.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cutover_checklists")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub cutover_table_id: Uuid,
    pub table_name: String,
    /// Driven by the latest reconciliation outcome
    pub data_consistency: bool,
    /// Driven by the latest reconciliation outcome
    pub referential_integrity: bool,
    pub performance_validation: bool,
    pub security_validation: bool,
    pub backup_complete: bool,
    pub freeze_window_scheduled: bool,
    pub team_notified: bool,
    pub rollback_plan_ready: bool,
    /// Set when all eight gates are true, cleared when one flips back
    pub completed_at: Option<DateTimeUtc>,
    pub completed_by: Option<String>,
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
