//! Persistence seam for risk reports and action plans.
//!
//! Every write is a single-record write. Saves are conditional on the
//! [`Revision`] the caller loaded: the stored status and the number of
//! history entries must both be unchanged, otherwise the save is refused and
//! the audit trail stays as it was.

mod database;
mod memory;

pub use database::DatabaseStore;
pub use memory::MemoryStore;

use super::{
    ActionPlan, Listing, Paging, PlanFilter, PlanSort, PlanStatus, Revision, RiskFilter,
    RiskReport, RiskSort, RiskStatus, SortOrder,
};
use async_trait::async_trait;
use sea_orm::DbErr;
use serde::Serialize;

/// Enough about a user to address a notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserContact {
    pub id: i32,
    pub name: String,
    pub email: String,
}

#[async_trait]
pub trait RiskStore: Send + Sync {
    /// Stores a new risk, ignoring `risk.id`, and returns it with its id.
    async fn insert_risk(&self, risk: RiskReport) -> Result<RiskReport, DbErr>;

    async fn find_risk(&self, id: i32) -> Result<Option<RiskReport>, DbErr>;

    /// Overwrites the risk if its stored revision is still `expected`.
    /// Returns false when the record changed underneath the caller or is gone.
    async fn save_risk(&self, risk: &RiskReport, expected: Revision<RiskStatus>)
        -> Result<bool, DbErr>;

    async fn delete_risk(&self, id: i32) -> Result<bool, DbErr>;

    /// All risks matching the filter, oldest first.
    async fn find_risks(&self, filter: &RiskFilter) -> Result<Vec<RiskReport>, DbErr>;

    async fn page_risks(
        &self,
        filter: &RiskFilter,
        sort: RiskSort,
        order: SortOrder,
        paging: Paging,
    ) -> Result<Listing<RiskReport>, DbErr>;

    async fn insert_action_plan(&self, plan: ActionPlan) -> Result<ActionPlan, DbErr>;

    async fn find_action_plan(&self, id: i32) -> Result<Option<ActionPlan>, DbErr>;

    /// Overwrites the plan if its stored revision is still `expected`.
    async fn save_action_plan(
        &self,
        plan: &ActionPlan,
        expected: Revision<PlanStatus>,
    ) -> Result<bool, DbErr>;

    /// All plans matching the filter, oldest first.
    async fn find_action_plans(&self, filter: &PlanFilter) -> Result<Vec<ActionPlan>, DbErr>;

    async fn page_action_plans(
        &self,
        filter: &PlanFilter,
        sort: PlanSort,
        order: SortOrder,
        paging: Paging,
    ) -> Result<Listing<ActionPlan>, DbErr>;

    async fn count_action_plans(&self, risk_id: i32) -> Result<u64, DbErr>;

    /// Plans of `risk_id` other than `exclude` that are not Completed.
    async fn count_incomplete_siblings(&self, risk_id: i32, exclude: i32) -> Result<u64, DbErr>;

    async fn admin_ids(&self) -> Result<Vec<i32>, DbErr>;

    async fn user_contact(&self, id: i32) -> Result<Option<UserContact>, DbErr>;
}
