// File: ./src/scheduler.rs
//! One-shot continuation triggers.
//!
//! A long export is split into many short invocations. Each invocation that
//! leaves rows behind registers exactly one future trigger for the export
//! handler; the host later fires it and the next batch runs. Two pending
//! triggers would run the same rows twice, so registration always clears
//! the handler's existing triggers first.
use crate::context::AppContext;
use crate::storage::LocalStorage;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub id: Uuid,
    pub handler: String,
    pub fire_at: DateTime<Utc>,
}

impl Trigger {
    fn after(handler: &str, delay: Duration) -> Result<Self> {
        let delay = chrono::Duration::from_std(delay).context("reschedule delay out of range")?;
        Ok(Self {
            id: Uuid::new_v4(),
            handler: handler.to_string(),
            fire_at: Utc::now() + delay,
        })
    }
}

/// What the execution host offers: timed one-shot invocations by handler.
pub trait TriggerHost: Send + Sync {
    fn schedule_once(&self, handler: &str, delay: Duration) -> Result<()>;
    fn cancel_all(&self, handler: &str) -> Result<()>;
    fn pending(&self, handler: &str) -> Result<Vec<Trigger>>;
}

/// Keeps at most one pending continuation for one handler.
pub struct SchedulerBridge<'a> {
    host: &'a dyn TriggerHost,
    handler: String,
    delay: Duration,
}

impl<'a> SchedulerBridge<'a> {
    pub fn new(host: &'a dyn TriggerHost, handler: impl Into<String>, delay: Duration) -> Self {
        Self {
            host,
            handler: handler.into(),
            delay,
        }
    }

    /// Replace whatever is pending with a single trigger `delay` from now.
    pub fn reschedule(&self) -> Result<()> {
        self.host.cancel_all(&self.handler)?;
        self.host.schedule_once(&self.handler, self.delay)?;
        log::info!(
            "Scheduled continuation '{}' in {}s",
            self.handler,
            self.delay.as_secs()
        );
        Ok(())
    }

    pub fn cancel_all(&self) -> Result<()> {
        self.host.cancel_all(&self.handler)
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct TriggerFile {
    #[serde(default)]
    triggers: Vec<Trigger>,
}

/// Triggers persisted to `triggers.json`; fired by `tasksheet tick`/`watch`.
#[derive(Debug, Clone)]
pub struct FileTriggerHost {
    path: PathBuf,
}

impl FileTriggerHost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(ctx: &dyn AppContext) -> Result<Self> {
        Ok(Self::new(ctx.get_triggers_path()?))
    }

    fn load_internal(path: &Path) -> Result<TriggerFile> {
        if !path.exists() {
            return Ok(TriggerFile::default());
        }
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read triggers {:?}", path))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse triggers {:?}", path))
    }

    fn modify<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Trigger>) -> T,
    {
        LocalStorage::with_lock(&self.path, || {
            let mut file = Self::load_internal(&self.path)?;
            let out = f(&mut file.triggers);
            let json = serde_json::to_string_pretty(&file)?;
            LocalStorage::atomic_write(&self.path, json)?;
            Ok(out)
        })
    }

    pub fn load(&self) -> Result<Vec<Trigger>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        LocalStorage::with_lock(&self.path, || Ok(Self::load_internal(&self.path)?.triggers))
    }

    /// Remove and return the handler's triggers that are due at `now`.
    pub fn take_due(&self, handler: &str, now: DateTime<Utc>) -> Result<Vec<Trigger>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        self.modify(|triggers| {
            let (due, rest): (Vec<Trigger>, Vec<Trigger>) = triggers
                .drain(..)
                .partition(|t| t.handler == handler && t.fire_at <= now);
            *triggers = rest;
            due
        })
    }

    pub fn next_fire_at(&self, handler: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|t| t.handler == handler)
            .map(|t| t.fire_at)
            .min())
    }

    /// Drop every trigger, readable or not.
    pub fn wipe(&self) -> Result<()> {
        LocalStorage::with_lock(&self.path, || {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            Ok(())
        })
    }
}

impl TriggerHost for FileTriggerHost {
    fn schedule_once(&self, handler: &str, delay: Duration) -> Result<()> {
        let trigger = Trigger::after(handler, delay)?;
        self.modify(|triggers| triggers.push(trigger))
    }

    fn cancel_all(&self, handler: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.modify(|triggers| triggers.retain(|t| t.handler != handler))
    }

    fn pending(&self, handler: &str) -> Result<Vec<Trigger>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|t| t.handler == handler)
            .collect())
    }
}

/// In-process host for tests: nothing ever fires on its own.
#[derive(Debug, Default)]
pub struct MemoryTriggerHost {
    triggers: Mutex<Vec<Trigger>>,
}

impl MemoryTriggerHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn triggers(&self) -> Result<std::sync::MutexGuard<'_, Vec<Trigger>>> {
        self.triggers
            .lock()
            .map_err(|_| anyhow::anyhow!("trigger lock poisoned"))
    }
}

impl TriggerHost for MemoryTriggerHost {
    fn schedule_once(&self, handler: &str, delay: Duration) -> Result<()> {
        let trigger = Trigger::after(handler, delay)?;
        self.triggers()?.push(trigger);
        Ok(())
    }

    fn cancel_all(&self, handler: &str) -> Result<()> {
        self.triggers()?.retain(|t| t.handler != handler);
        Ok(())
    }

    fn pending(&self, handler: &str) -> Result<Vec<Trigger>> {
        Ok(self
            .triggers()?
            .iter()
            .filter(|t| t.handler == handler)
            .cloned()
            .collect())
    }
}
