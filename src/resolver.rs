// File: ./src/resolver.rs
//! Maps list names to remote list ids.
//!
//! The service has no atomic find-or-create, and a list it just created may
//! not show up in enumeration for a moment. Resolution is therefore:
//! cache hit, else create, else (after a backoff longer than that delay)
//! enumerate and match by exact name. Two independent runs racing on the same
//! name can still produce duplicate lists.
use crate::checkpoint::ListCache;
use crate::client::{ServiceError, TaskService};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Cached,
    Created,
    /// Create failed, but the list was found by relisting.
    Recovered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub remote_id: String,
    pub how: Resolution,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("list '{name}' could not be created ({create}) and was not found after relisting")]
    NotFound { name: String, create: ServiceError },
    #[error("list '{name}' could not be created ({create}) and relisting failed: {list}")]
    RelistFailed {
        name: String,
        create: ServiceError,
        list: ServiceError,
    },
}

pub struct ListResolver<'a, S: TaskService> {
    service: &'a S,
    backoff: Duration,
}

impl<'a, S: TaskService> ListResolver<'a, S> {
    pub fn new(service: &'a S, backoff: Duration) -> Self {
        Self { service, backoff }
    }

    /// Resolve `name`, writing any id learned from the remote through to `cache`.
    pub async fn resolve(
        &self,
        name: &str,
        cache: &mut ListCache,
    ) -> Result<Resolved, ResolveError> {
        if let Some(id) = cache.get(name) {
            return Ok(Resolved {
                remote_id: id.clone(),
                how: Resolution::Cached,
            });
        }

        let create_err = match self.service.create_list(name).await {
            Ok(list) => {
                log::info!("Created task list '{}' ({})", name, list.remote_id);
                cache.insert(name.to_string(), list.remote_id.clone());
                return Ok(Resolved {
                    remote_id: list.remote_id,
                    how: Resolution::Created,
                });
            }
            Err(e) => e,
        };

        if create_err.is_conflict() {
            log::info!(
                "List '{}' already exists remotely ({}); relisting in {:?}",
                name,
                create_err,
                self.backoff
            );
        } else {
            log::warn!(
                "Creating list '{}' failed ({}); relisting in {:?}",
                name,
                create_err,
                self.backoff
            );
        }
        tokio::time::sleep(self.backoff).await;

        let lists = match self.service.list_all().await {
            Ok(lists) => lists,
            Err(list) => {
                return Err(ResolveError::RelistFailed {
                    name: name.to_string(),
                    create: create_err,
                    list,
                });
            }
        };

        match lists.into_iter().find(|l| l.name == name) {
            Some(found) => {
                log::info!("Found task list '{}' ({}) after relisting", name, found.remote_id);
                cache.insert(name.to_string(), found.remote_id.clone());
                Ok(Resolved {
                    remote_id: found.remote_id,
                    how: Resolution::Recovered,
                })
            }
            None => Err(ResolveError::NotFound {
                name: name.to_string(),
                create: create_err,
            }),
        }
    }

    /// Overwrite cache entries with the remote's current view. The remote
    /// wins on conflict; entries the remote doesn't know are kept. When the
    /// remote holds several lists with one name, the first listed is used.
    pub async fn refresh(&self, cache: &mut ListCache) -> Result<usize, ServiceError> {
        let lists = self.service.list_all().await?;
        let count = lists.len();
        let mut seen = std::collections::HashSet::new();
        for list in lists {
            if seen.insert(list.name.clone()) {
                cache.insert(list.name, list.remote_id);
            }
        }
        Ok(count)
    }
}
