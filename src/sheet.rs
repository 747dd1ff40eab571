// File: ./src/sheet.rs
//! Spreadsheet data source.
//!
//! A sheet is addressed like a spreadsheet: row 1 holds the headers, data
//! starts at row 2, and row numbers are 1-based. The exporter only reads.
use crate::model::Row;
use crate::storage::LocalStorage;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const HEADER_ROW: usize = 1;

pub trait SheetSource {
    /// Opaque reference recorded in the checkpoint.
    fn source_id(&self) -> &str;
    fn headers(&self) -> Result<Vec<String>>;
    /// Number of the last populated row; `HEADER_ROW` when there is no data.
    fn last_row(&self) -> Result<usize>;
    /// Up to `count` rows starting at row `start`, in order.
    fn row_slice(&self, start: usize, count: usize) -> Result<Vec<Row>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl Sheet {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn last_row(&self) -> usize {
        let populated = self
            .rows
            .iter()
            .rposition(|r| !r.is_blank())
            .map(|i| i + 1)
            .unwrap_or(0);
        HEADER_ROW + populated
    }

    pub fn row_slice(&self, start: usize, count: usize) -> Vec<Row> {
        let last = self.last_row();
        (start..start.saturating_add(count))
            .take_while(|n| *n <= last)
            .filter_map(|n| n.checked_sub(HEADER_ROW + 1))
            .filter_map(|i| self.rows.get(i))
            .cloned()
            .collect()
    }
}

/// A sheet stored as a JSON document on disk, identified by its path.
#[derive(Debug, Clone)]
pub struct SheetFile {
    id: String,
    sheet: Sheet,
}

impl SheetFile {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read sheet '{}'", path.display()))?;
        let sheet: Sheet = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse sheet '{}'", path.display()))?;
        Ok(Self {
            id: path.to_string_lossy().to_string(),
            sheet,
        })
    }

    pub fn save(path: &Path, sheet: &Sheet) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        LocalStorage::with_lock(path, || {
            let json = serde_json::to_string_pretty(sheet)?;
            LocalStorage::atomic_write(path, json)?;
            Ok(())
        })
    }

    /// A sheet that lives only in memory, under the given id.
    pub fn in_memory(id: impl Into<String>, sheet: Sheet) -> Self {
        Self {
            id: id.into(),
            sheet,
        }
    }

    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.id)
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }
}

impl SheetSource for SheetFile {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn headers(&self) -> Result<Vec<String>> {
        Ok(self.sheet.headers.clone())
    }

    fn last_row(&self) -> Result<usize> {
        Ok(self.sheet.last_row())
    }

    fn row_slice(&self, start: usize, count: usize) -> Result<Vec<Row>> {
        Ok(self.sheet.row_slice(start, count))
    }
}
