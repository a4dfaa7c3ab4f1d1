//! SeaORM Entity for exams table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum ExamType {
    #[sea_orm(string_value = "blood")]
    Blood,
    #[sea_orm(string_value = "urine")]
    Urine,
    #[sea_orm(string_value = "xray")]
    Xray,
    #[sea_orm(string_value = "mri")]
    Mri,
    #[sea_orm(string_value = "ct")]
    Ct,
    #[sea_orm(string_value = "other")]
    Other,
}

impl ExamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamType::Blood => "blood",
            ExamType::Urine => "urine",
            ExamType::Xray => "xray",
            ExamType::Mri => "mri",
            ExamType::Ct => "ct",
            ExamType::Other => "other",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum ExamStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "exams")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub exam_type: ExamType,
    pub file_url: String,
    pub file_original_name: String,
    pub file_mime_type: String,
    pub file_size: i64,
    pub description: Option<String>,
    pub performed_at: chrono::NaiveDate,
    pub expires_at: chrono::NaiveDate,
    pub status: ExamStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub results: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub doctor_notes: Option<String>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
