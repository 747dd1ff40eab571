// File: ./src/model/mod.rs
pub mod classify;
pub mod item;
pub mod row;

pub use classify::{RowKind, SkipReason, TaskCandidate, classify};
pub use item::{ListCounters, NewTask, Report, TaskListRef, TaskStatus};
pub use row::{ColumnMap, ColumnNames, Row};
