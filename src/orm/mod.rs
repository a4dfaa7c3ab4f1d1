pub mod action_plans;
pub mod checkins;
pub mod exams;
pub mod pills;
pub mod report_comments;
pub mod report_snapshots;
pub mod reports;
pub mod risk_reports;
pub mod users;
