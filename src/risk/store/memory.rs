//! In-process store used by tests and local experiments.

use super::{RiskStore, UserContact};
use crate::risk::{
    ActionPlan, Listing, Paging, PlanFilter, PlanSort, PlanStatus, Revision, RiskFilter,
    RiskReport, RiskSort, RiskStatus, SortOrder,
};
use async_trait::async_trait;
use sea_orm::DbErr;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    next_risk_id: i32,
    next_plan_id: i32,
    risks: BTreeMap<i32, RiskReport>,
    plans: BTreeMap<i32, ActionPlan>,
    users: BTreeMap<i32, (UserContact, bool)>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// When set, every risk write fails.
    fail_risk_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user so admin fan-out and contact lookups can find them.
    pub fn add_user(&self, id: i32, name: &str, is_admin: bool) -> Result<(), DbErr> {
        let contact = UserContact {
            id,
            name: name.to_string(),
            email: format!("{}@oris.test", name.to_lowercase().replace(' ', ".")),
        };
        self.lock()?.users.insert(id, (contact, is_admin));
        Ok(())
    }

    /// Makes subsequent risk writes fail with a connection error.
    pub fn fail_risk_writes(&self, fail: bool) {
        self.fail_risk_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, DbErr> {
        self.inner
            .lock()
            .map_err(|_| DbErr::Custom("memory store poisoned".to_string()))
    }

    fn check_risk_writes(&self) -> Result<(), DbErr> {
        if self.fail_risk_writes.load(Ordering::SeqCst) {
            return Err(DbErr::Conn("risk writes disabled".to_string()));
        }
        Ok(())
    }
}

fn page<T: Clone>(mut items: Vec<T>, paging: Paging) -> Listing<T> {
    let total = items.len() as u64;
    let items = items
        .drain(..)
        .skip(paging.offset() as usize)
        .take(paging.limit as usize)
        .collect();
    Listing::new(items, total, paging)
}

fn ordered(ord: CmpOrdering, order: SortOrder) -> CmpOrdering {
    match order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    }
}

#[async_trait]
impl RiskStore for MemoryStore {
    async fn insert_risk(&self, mut risk: RiskReport) -> Result<RiskReport, DbErr> {
        self.check_risk_writes()?;
        let mut inner = self.lock()?;
        inner.next_risk_id += 1;
        risk.id = inner.next_risk_id;
        inner.risks.insert(risk.id, risk.clone());
        Ok(risk)
    }

    async fn find_risk(&self, id: i32) -> Result<Option<RiskReport>, DbErr> {
        Ok(self.lock()?.risks.get(&id).cloned())
    }

    async fn save_risk(
        &self,
        risk: &RiskReport,
        expected: Revision<RiskStatus>,
    ) -> Result<bool, DbErr> {
        self.check_risk_writes()?;
        let mut inner = self.lock()?;
        match inner.risks.get_mut(&risk.id) {
            Some(stored) if stored.revision() == expected => {
                *stored = risk.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_risk(&self, id: i32) -> Result<bool, DbErr> {
        self.check_risk_writes()?;
        Ok(self.lock()?.risks.remove(&id).is_some())
    }

    async fn find_risks(&self, filter: &RiskFilter) -> Result<Vec<RiskReport>, DbErr> {
        let inner = self.lock()?;
        let mut risks: Vec<RiskReport> = inner
            .risks
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        risks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(risks)
    }

    async fn page_risks(
        &self,
        filter: &RiskFilter,
        sort: RiskSort,
        order: SortOrder,
        paging: Paging,
    ) -> Result<Listing<RiskReport>, DbErr> {
        let mut risks = self.find_risks(filter).await?;
        risks.sort_by(|a, b| {
            let ord = match sort {
                RiskSort::CreatedAt => a.created_at.cmp(&b.created_at),
                RiskSort::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                RiskSort::Title => a.title.cmp(&b.title),
            };
            ordered(ord.then(a.id.cmp(&b.id)), order)
        });
        Ok(page(risks, paging))
    }

    async fn insert_action_plan(&self, mut plan: ActionPlan) -> Result<ActionPlan, DbErr> {
        let mut inner = self.lock()?;
        inner.next_plan_id += 1;
        plan.id = inner.next_plan_id;
        inner.plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    async fn find_action_plan(&self, id: i32) -> Result<Option<ActionPlan>, DbErr> {
        Ok(self.lock()?.plans.get(&id).cloned())
    }

    async fn save_action_plan(
        &self,
        plan: &ActionPlan,
        expected: Revision<PlanStatus>,
    ) -> Result<bool, DbErr> {
        let mut inner = self.lock()?;
        match inner.plans.get_mut(&plan.id) {
            Some(stored) if stored.revision() == expected => {
                *stored = plan.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_action_plans(&self, filter: &PlanFilter) -> Result<Vec<ActionPlan>, DbErr> {
        let inner = self.lock()?;
        let mut plans: Vec<ActionPlan> = inner
            .plans
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(plans)
    }

    async fn page_action_plans(
        &self,
        filter: &PlanFilter,
        sort: PlanSort,
        order: SortOrder,
        paging: Paging,
    ) -> Result<Listing<ActionPlan>, DbErr> {
        let mut plans = self.find_action_plans(filter).await?;
        plans.sort_by(|a, b| {
            let ord = match sort {
                PlanSort::CreatedAt => a.created_at.cmp(&b.created_at),
                PlanSort::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                PlanSort::Deadline => a.deadline.cmp(&b.deadline),
            };
            ordered(ord.then(a.id.cmp(&b.id)), order)
        });
        Ok(page(plans, paging))
    }

    async fn count_action_plans(&self, risk_id: i32) -> Result<u64, DbErr> {
        let inner = self.lock()?;
        Ok(inner.plans.values().filter(|p| p.risk_id == risk_id).count() as u64)
    }

    async fn count_incomplete_siblings(&self, risk_id: i32, exclude: i32) -> Result<u64, DbErr> {
        let inner = self.lock()?;
        Ok(inner
            .plans
            .values()
            .filter(|p| p.risk_id == risk_id && p.id != exclude)
            .filter(|p| p.status != PlanStatus::Completed)
            .count() as u64)
    }

    async fn admin_ids(&self) -> Result<Vec<i32>, DbErr> {
        let inner = self.lock()?;
        Ok(inner
            .users
            .values()
            .filter(|(_, is_admin)| *is_admin)
            .map(|(contact, _)| contact.id)
            .collect())
    }

    async fn user_contact(&self, id: i32) -> Result<Option<UserContact>, DbErr> {
        Ok(self.lock()?.users.get(&id).map(|(contact, _)| contact.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{HistoryLog, Priority, RiskCategory, CREATED_COMMENT};
    use chrono::NaiveDate;

    fn risk(title: &str, day: u32) -> RiskReport {
        let at = NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        RiskReport {
            id: 0,
            title: title.to_string(),
            description: "description long enough".to_string(),
            category: RiskCategory::Other,
            location: "Warehouse".to_string(),
            priority: Priority::Low,
            status: RiskStatus::Open,
            reporter_id: 1,
            assigned_to: None,
            evidence_files: vec![],
            history_logs: vec![HistoryLog::new(RiskStatus::Open, 1, CREATED_COMMENT, at)],
            created_at: at,
            updated_at: at,
        }
    }

    #[actix_rt::test]
    async fn test_save_is_conditional_on_revision() {
        let store = MemoryStore::new();
        let mut stored = store.insert_risk(risk("Wet floor", 1)).await.unwrap();
        assert_eq!(stored.id, 1);
        let loaded = stored.revision();

        stored.title = "Wet floor near dock".to_string();
        assert!(store.save_risk(&stored, loaded).await.unwrap());
        let resolved = Revision {
            status: RiskStatus::Resolved,
            ..loaded
        };
        assert!(!store.save_risk(&stored, resolved).await.unwrap());

        let found = store.find_risk(1).await.unwrap().unwrap();
        assert_eq!(found.title, "Wet floor near dock");
    }

    #[actix_rt::test]
    async fn test_stale_copy_cannot_overwrite_history_after_status_returns() {
        let store = MemoryStore::new();
        let stale = store.insert_risk(risk("Wet floor", 1)).await.unwrap();
        let stale_revision = stale.revision();

        let mut current = stale.clone();
        let at = current.created_at;
        current.push_status(RiskStatus::Cancelled, 2, "duplicate", at);
        assert!(store.save_risk(&current, stale_revision).await.unwrap());
        let cancelled = current.revision();
        current.push_status(RiskStatus::Open, 2, "not a duplicate", at);
        assert!(store.save_risk(&current, cancelled).await.unwrap());

        // Open again, but with three entries instead of one.
        assert_eq!(current.status, stale_revision.status);
        assert!(!store.save_risk(&stale, stale_revision).await.unwrap());

        let found = store.find_risk(stale.id).await.unwrap().unwrap();
        assert_eq!(found.history_logs.len(), 3);
        assert_eq!(found.history_logs[2].comment, "not a duplicate");
    }

    #[actix_rt::test]
    async fn test_page_risks_sorts_and_slices() {
        let store = MemoryStore::new();
        for (title, day) in [("Bravo", 2), ("Alpha", 3), ("Charlie", 1)] {
            store.insert_risk(risk(title, day)).await.unwrap();
        }

        let listing = store
            .page_risks(
                &RiskFilter::default(),
                RiskSort::Title,
                SortOrder::Asc,
                Paging { page: 1, limit: 2 },
            )
            .await
            .unwrap();
        let titles: Vec<_> = listing.items.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Bravo"]);
        assert_eq!(listing.total, 3);
        assert_eq!(listing.pages, 2);

        let newest = store
            .page_risks(
                &RiskFilter::default(),
                RiskSort::CreatedAt,
                SortOrder::Desc,
                Paging { page: 1, limit: 1 },
            )
            .await
            .unwrap();
        assert_eq!(newest.items[0].title, "Alpha");
    }

    #[actix_rt::test]
    async fn test_failed_risk_writes() {
        let store = MemoryStore::new();
        store.fail_risk_writes(true);
        assert!(store.insert_risk(risk("Wet floor", 1)).await.is_err());
    }
}
