//! SeaORM Entity for action_plans table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
pub enum PlanStatus {
    #[sea_orm(string_value = "Pending")]
    #[serde(alias = "Pendente")]
    Pending,
    #[sea_orm(string_value = "InProgress")]
    #[serde(alias = "Em Andamento")]
    InProgress,
    #[sea_orm(string_value = "Completed")]
    #[serde(alias = "Concluído", alias = "Concluido")]
    Completed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "action_plans")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Fixed at creation.
    pub risk_id: i32,
    pub responsible_id: i32,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub deadline: chrono::NaiveDate,
    pub status: PlanStatus,
    #[sea_orm(column_type = "JsonBinary")]
    pub evidence_files: Json,
    #[sea_orm(column_type = "JsonBinary")]
    pub history_logs: Json,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::risk_reports::Entity",
        from = "Column::RiskId",
        to = "super::risk_reports::Column::Id",
        on_delete = "Restrict"
    )]
    RiskReport,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::ResponsibleId",
        to = "super::users::Column::Id"
    )]
    Responsible,
}

impl Related<super::risk_reports::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RiskReport.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
