// File: ./src/client/service.rs
//! The remote task/list service as the exporter sees it.
use crate::model::{NewTask, TaskListRef};
use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("offline: no service URL configured")]
    Offline,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// 409 or 400 on create usually means a list with that name appeared
    /// concurrently; the resolver's relist fallback handles it.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ServiceError::Status { status, .. }
                if *status == StatusCode::CONFLICT || *status == StatusCode::BAD_REQUEST
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            ServiceError::Status { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS
        )
    }
}

/// Opaque RPC-style collaborator. Failures are per call; callers decide
/// whether to skip, fall back, or stop.
#[allow(async_fn_in_trait)]
pub trait TaskService {
    /// Every list the account owns, following pagination to the end.
    async fn list_all(&self) -> Result<Vec<TaskListRef>, ServiceError>;
    async fn create_list(&self, name: &str) -> Result<TaskListRef, ServiceError>;
    async fn create_task(&self, list_id: &str, task: &NewTask) -> Result<(), ServiceError>;
}
