// File: ./src/model/item.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A remote task list as enumerated or created on the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskListRef {
    pub name: String,
    pub remote_id: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    NeedsAction,
    Completed,
}

impl TaskStatus {
    /// `completed` in any case and with surrounding whitespace; everything else needs action.
    pub fn from_cell(cell: &str) -> Self {
        if cell.trim().eq_ignore_ascii_case("completed") {
            Self::Completed
        } else {
            Self::NeedsAction
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Outbound task, built from one task row and sent once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub status: TaskStatus,
    pub due: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: TaskStatus::NeedsAction,
            due: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListCounters {
    pub total: u64,
    pub completed: u64,
    pub needs_action: u64,
}

impl ListCounters {
    pub fn record(&mut self, status: TaskStatus) {
        self.total += 1;
        if status.is_done() {
            self.completed += 1;
        } else {
            self.needs_action += 1;
        }
    }

    pub fn merge(&mut self, other: &ListCounters) {
        self.total += other.total;
        self.completed += other.completed;
        self.needs_action += other.needs_action;
    }
}

/// Per-list counters accumulated over a whole export run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report {
    pub lists: BTreeMap<String, ListCounters>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, list: &str, status: TaskStatus) {
        self.lists.entry(list.to_string()).or_default().record(status);
    }

    pub fn get(&self, list: &str) -> Option<&ListCounters> {
        self.lists.get(list)
    }

    pub fn totals(&self) -> ListCounters {
        let mut sum = ListCounters::default();
        for counters in self.lists.values() {
            sum.merge(counters);
        }
        sum
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}
