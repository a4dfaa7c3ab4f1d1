//! Notification event definitions

use crate::orm::exams::{ExamStatus, ExamType};
use crate::risk::{RiskStatus, UserContact};
use chrono::NaiveDate;
use serde::Serialize;

/// Everything the backend pushes to users.
///
/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum NotificationEvent {
    NewCriticalRisk {
        risk_id: i32,
        title: String,
        location: String,
        reporter_id: i32,
    },
    RiskReclassifiedAsCritical {
        risk_id: i32,
        title: String,
        location: String,
        updated_by: i32,
    },
    RiskStatusChanged {
        risk_id: i32,
        title: String,
        status: RiskStatus,
        updated_by: i32,
    },
    ActionPlanOverdue {
        plan_id: i32,
        risk_id: i32,
        description: String,
        deadline: NaiveDate,
        days_overdue: i64,
        responsible: Option<UserContact>,
    },
    ActionPlanDeadlineWarning {
        plan_id: i32,
        risk_id: i32,
        /// None when the risk could not be loaded.
        risk_title: Option<String>,
        description: String,
        deadline: NaiveDate,
        days_remaining: i64,
    },
    ExamStatusChanged {
        exam_id: i32,
        exam_type: ExamType,
        status: ExamStatus,
    },
}

impl NotificationEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::NewCriticalRisk { .. } => "newCriticalRisk",
            Self::RiskReclassifiedAsCritical { .. } => "riskReclassifiedAsCritical",
            Self::RiskStatusChanged { .. } => "riskStatusChanged",
            Self::ActionPlanOverdue { .. } => "actionPlanOverdue",
            Self::ActionPlanDeadlineWarning { .. } => "actionPlanDeadlineWarning",
            Self::ExamStatusChanged { .. } => "examStatusChanged",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = NotificationEvent::ActionPlanDeadlineWarning {
            plan_id: 4,
            risk_id: 2,
            risk_title: Some("Loose railing".to_string()),
            description: "Replace the railing".to_string(),
            deadline: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            days_remaining: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.event_name());
        assert_eq!(json["data"]["days_remaining"], 2);
        assert_eq!(json["data"]["risk_title"], "Loose railing");
        assert_eq!(json["data"]["deadline"], "2024-06-03");
    }
}
