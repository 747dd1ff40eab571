// File: ./src/checkpoint.rs
//! The export checkpoint: everything a later invocation needs to resume.
//!
//! The checkpoint is an explicit value. The runner loads it once at the start
//! of an invocation, mutates its own copy, and stores it back before asking
//! for a continuation. Each field lives under its own key so the store stays
//! inspectable with `tasksheet status`.
//!
//! ⚠️ VERSION BUMP REQUIRED:
//! Changing how any field is encoded requires incrementing CHECKPOINT_VERSION.
use crate::error::{RunError, RunResult};
use crate::model::Report;
use crate::storage::KeyValueStore;
use std::collections::BTreeMap;

const CHECKPOINT_VERSION: u32 = 1;

pub const KEY_VERSION: &str = "export.version";
pub const KEY_SOURCE: &str = "export.source";
pub const KEY_NEXT_ROW: &str = "export.next_row";
pub const KEY_LIST_CACHE: &str = "export.list_cache";
pub const KEY_LAST_LIST: &str = "export.last_list";
pub const KEY_REPORT: &str = "export.report";

const ALL_KEYS: &[&str] = &[
    KEY_VERSION,
    KEY_SOURCE,
    KEY_NEXT_ROW,
    KEY_LIST_CACHE,
    KEY_LAST_LIST,
    KEY_REPORT,
];

/// List display name -> remote list id. A possibly stale view of the remote.
pub type ListCache = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub source: String,
    /// 1-based row of the first unprocessed row; never below the first data row.
    pub next_row: usize,
    pub list_cache: ListCache,
    pub last_list: Option<String>,
    pub report: Report,
}

impl Checkpoint {
    pub fn fresh(source: impl Into<String>, first_data_row: usize) -> Self {
        Self {
            source: source.into(),
            next_row: first_data_row,
            list_cache: ListCache::new(),
            last_list: None,
            report: Report::new(),
        }
    }

    /// Read the checkpoint. `Ok(None)` when no source reference is stored.
    ///
    /// Missing fields take their defaults; fields that are present but
    /// unreadable make the whole checkpoint inconsistent.
    pub fn load(store: &dyn KeyValueStore, first_data_row: usize) -> RunResult<Option<Self>> {
        let Some(source) = store.get(KEY_SOURCE)? else {
            return Ok(None);
        };

        if let Some(raw) = store.get(KEY_VERSION)? {
            let version: u32 = raw
                .trim()
                .parse()
                .map_err(|_| RunError::Inconsistent(format!("bad version '{}'", raw)))?;
            if version != CHECKPOINT_VERSION {
                return Err(RunError::Inconsistent(format!(
                    "checkpoint version {} is not supported (expected {})",
                    version, CHECKPOINT_VERSION
                )));
            }
        }

        let next_row = match store.get(KEY_NEXT_ROW)? {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| RunError::Inconsistent(format!("bad next row '{}'", raw)))?
                .max(first_data_row),
            None => first_data_row,
        };

        let list_cache = match store.get(KEY_LIST_CACHE)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| RunError::Inconsistent(format!("bad list cache: {}", e)))?,
            None => ListCache::new(),
        };

        let last_list = store.get(KEY_LAST_LIST)?.filter(|s| !s.is_empty());

        let report = match store.get(KEY_REPORT)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| RunError::Inconsistent(format!("bad report: {}", e)))?,
            None => Report::new(),
        };

        Ok(Some(Self {
            source,
            next_row,
            list_cache,
            last_list,
            report,
        }))
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> anyhow::Result<()> {
        let entries = [
            (KEY_VERSION, CHECKPOINT_VERSION.to_string()),
            (KEY_SOURCE, self.source.clone()),
            (KEY_NEXT_ROW, self.next_row.to_string()),
            (KEY_LIST_CACHE, serde_json::to_string(&self.list_cache)?),
            (KEY_LAST_LIST, self.last_list.clone().unwrap_or_default()),
            (KEY_REPORT, serde_json::to_string(&self.report)?),
        ];
        store.set_many(&entries)
    }

    /// Remove every checkpoint key.
    pub fn clear(store: &dyn KeyValueStore) -> anyhow::Result<()> {
        store.delete_many(ALL_KEYS)
    }

    pub fn exists(store: &dyn KeyValueStore) -> anyhow::Result<bool> {
        Ok(store.get(KEY_SOURCE)?.is_some())
    }
}
