//! SeaORM Entity for reports table (general workplace occurrences)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceType {
    #[sea_orm(string_value = "logistico")]
    Logistico,
    #[sea_orm(string_value = "estrutural")]
    Estrutural,
    #[sea_orm(string_value = "sugestao")]
    Sugestao,
    #[sea_orm(string_value = "reclamacao")]
    Reclamacao,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    #[sea_orm(string_value = "baixo")]
    Baixo,
    #[sea_orm(string_value = "medio")]
    Medio,
    #[sea_orm(string_value = "alto")]
    Alto,
    #[sea_orm(string_value = "critico")]
    Critico,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum OccurrencePriority {
    #[sea_orm(string_value = "baixa")]
    Baixa,
    #[sea_orm(string_value = "media")]
    Media,
    #[sea_orm(string_value = "alta")]
    Alta,
    #[sea_orm(string_value = "critica")]
    Critica,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceStatus {
    #[sea_orm(string_value = "pendente")]
    Pendente,
    #[sea_orm(string_value = "em_analise")]
    EmAnalise,
    #[sea_orm(string_value = "em_andamento")]
    EmAndamento,
    #[sea_orm(string_value = "resolvido")]
    Resolvido,
    #[sea_orm(string_value = "fechado")]
    Fechado,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "reports")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Anonymous reports have no author.
    pub user_id: Option<i32>,
    pub report_type: OccurrenceType,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub location: String,
    pub impact: Impact,
    pub priority: Option<OccurrencePriority>,
    /// List of attachment URLs.
    #[sea_orm(column_type = "JsonBinary")]
    pub attachments: Json,
    pub status: OccurrenceStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub resolution_description: Option<String>,
    pub resolved_at: Option<chrono::NaiveDateTime>,
    pub resolved_by: Option<i32>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Author,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::ResolvedBy",
        to = "super::users::Column::Id"
    )]
    Resolver,
    #[sea_orm(has_many = "super::report_comments::Entity")]
    Comments,
}

impl Related<super::report_comments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
