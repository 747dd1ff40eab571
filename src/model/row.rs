// File: ./src/model/row.rs
//! Spreadsheet rows and header resolution.
use serde::{Deserialize, Serialize};

/// One spreadsheet line: cell values by column position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    pub cells: Vec<String>,
}

impl Row {
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }

    /// Cell at `index`; missing trailing cells read as empty.
    pub fn cell(&self, index: Option<usize>) -> &str {
        index
            .and_then(|i| self.cells.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }
}

/// Names of the logical columns the exporter reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub title: String,
    pub id: String,
    pub status: String,
    pub due: String,
    pub links: String,
    pub list: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            title: "title".to_string(),
            id: "id".to_string(),
            status: "status".to_string(),
            due: "due".to_string(),
            links: "links".to_string(),
            list: "list".to_string(),
        }
    }
}

/// Header -> index mapping, resolved once per batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub title: Option<usize>,
    pub id: Option<usize>,
    pub status: Option<usize>,
    pub due: Option<usize>,
    pub links: Option<usize>,
    pub list: Option<usize>,
}

impl ColumnMap {
    /// Header matching is case-insensitive and ignores surrounding whitespace.
    pub fn resolve(headers: &[String], names: &ColumnNames) -> Self {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
        };
        Self {
            title: find(&names.title),
            id: find(&names.id),
            status: find(&names.status),
            due: find(&names.due),
            links: find(&names.links),
            list: find(&names.list),
        }
    }

    /// Required columns that are absent. Without a title column neither list
    /// markers nor tasks can be recognised.
    pub fn missing_required(&self, names: &ColumnNames) -> Vec<String> {
        let mut missing = Vec::new();
        if self.title.is_none() {
            missing.push(names.title.clone());
        }
        missing
    }
}
