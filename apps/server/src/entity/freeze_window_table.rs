//! Freeze window affected-table entity for SeaORM.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "freeze_window_tables")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub freeze_window_id: Uuid,
    pub table_name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::freeze_window::Entity",
        from = "Column::FreezeWindowId",
        to = "super::freeze_window::Column::Id",
        on_delete = "Cascade"
    )]
    FreezeWindow,
}

impl Related<super::freeze_window::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FreezeWindow.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
