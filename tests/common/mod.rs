//! Shared helpers for the integration tests. Everything runs against the
//! in-memory store, so no database is needed.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use oris::notifications::{NotificationEvent, Notifier, NotifyError};
use oris::risk::{MemoryStore, NewActionPlan, NewRisk, Priority, RiskCategory, RiskEngine};
use std::sync::{Arc, Mutex};

pub const REPORTER: i32 = 1;
pub const ADMIN: i32 = 2;
pub const SECOND_ADMIN: i32 = 3;
pub const RESPONSIBLE: i32 = 4;
pub const ASSIGNEE: i32 = 5;

/// Keeps every event instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(i32, NotificationEvent)>>,
    /// When set, every delivery fails after being recorded.
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(i32, NotificationEvent)> {
        self.sent.lock().unwrap().clone()
    }

    /// Recipients of events with the given wire name.
    pub fn recipients_of(&self, name: &str) -> Vec<i32> {
        self.sent()
            .into_iter()
            .filter(|(_, e)| e.event_name() == name)
            .map(|(user, _)| user)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: i32, event: NotificationEvent) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((user_id, event));
        if self.fail {
            return Err(NotifyError::Unavailable);
        }
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: RiskEngine,
}

/// An engine over a store with two administrators and three regular users.
pub fn harness() -> Harness {
    harness_with(RecordingNotifier::default())
}

pub fn harness_with(notifier: RecordingNotifier) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.add_user(REPORTER, "Rita Reporter", false).unwrap();
    store.add_user(ADMIN, "Ada Admin", true).unwrap();
    store.add_user(SECOND_ADMIN, "Otto Admin", true).unwrap();
    store.add_user(RESPONSIBLE, "Rui Responsible", false).unwrap();
    store.add_user(ASSIGNEE, "Alma Assignee", false).unwrap();

    let notifier = Arc::new(notifier);
    let engine = RiskEngine::new(store.clone(), notifier.clone());
    Harness {
        store,
        notifier,
        engine,
    }
}

pub fn new_risk(title: &str, location: &str, priority: Priority) -> NewRisk {
    NewRisk {
        title: title.to_string(),
        description: format!("{} reported during the morning inspection", title),
        category: RiskCategory::Infrastructure,
        location: location.to_string(),
        priority,
        assigned_to: None,
        evidence_files: vec![],
    }
}

pub fn new_plan(risk_id: i32, deadline: NaiveDate) -> NewActionPlan {
    NewActionPlan {
        risk_id,
        responsible_id: RESPONSIBLE,
        description: "Fix the hazard and document the repair".to_string(),
        deadline,
        evidence_files: vec![],
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
