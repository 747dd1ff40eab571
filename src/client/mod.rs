// File: ./src/client/mod.rs
pub mod cert;
pub mod core;
pub mod middleware;
pub mod service;

pub use crate::client::core::TasksClient;
pub use crate::client::service::{ServiceError, TaskService};
