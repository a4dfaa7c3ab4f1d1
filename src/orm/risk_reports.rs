//! SeaORM Entity for risk_reports table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
pub enum RiskCategory {
    #[sea_orm(string_value = "Infrastructure")]
    #[serde(alias = "Infraestrutura")]
    Infrastructure,
    #[sea_orm(string_value = "Conduct")]
    #[serde(alias = "Conduta")]
    Conduct,
    #[sea_orm(string_value = "Environmental")]
    #[serde(alias = "Ambiental")]
    Environmental,
    #[sea_orm(string_value = "Other")]
    #[serde(alias = "Outro")]
    Other,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
pub enum Priority {
    #[sea_orm(string_value = "Low")]
    #[serde(alias = "Baixa")]
    Low,
    #[sea_orm(string_value = "Medium")]
    #[serde(alias = "Média", alias = "Media")]
    Medium,
    #[sea_orm(string_value = "High")]
    #[serde(alias = "Alta")]
    High,
    #[sea_orm(string_value = "Critical")]
    #[serde(alias = "Crítica", alias = "Critica")]
    Critical,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
pub enum RiskStatus {
    #[sea_orm(string_value = "Open")]
    #[serde(alias = "Aberto")]
    Open,
    #[sea_orm(string_value = "InTreatment")]
    #[serde(alias = "Em Tratamento")]
    InTreatment,
    #[sea_orm(string_value = "Resolved")]
    #[serde(alias = "Resolvido")]
    Resolved,
    #[sea_orm(string_value = "Cancelled")]
    #[serde(alias = "Cancelado")]
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "risk_reports")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub category: RiskCategory,
    pub location: String,
    pub priority: Priority,
    pub status: RiskStatus,
    pub reporter_id: i32,
    pub assigned_to: Option<i32>,
    /// Ordered list of `{url, name, type}`.
    #[sea_orm(column_type = "JsonBinary")]
    pub evidence_files: Json,
    /// Append-only list of `{status, updated_by, comment, timestamp}`.
    #[sea_orm(column_type = "JsonBinary")]
    pub history_logs: Json,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::ReporterId",
        to = "super::users::Column::Id"
    )]
    Reporter,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::AssignedTo",
        to = "super::users::Column::Id"
    )]
    Assignee,
    #[sea_orm(has_many = "super::action_plans::Entity")]
    ActionPlans,
}

impl Related<super::action_plans::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ActionPlans.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
