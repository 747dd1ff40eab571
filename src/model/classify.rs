// File: ./src/model/classify.rs
//! Row classification: decides whether a sheet row names a task list,
//! describes a task, or carries nothing usable.
use crate::model::item::{NewTask, TaskStatus};
use crate::model::row::{ColumnMap, Row};
use chrono::{DateTime, NaiveDate};
use std::fmt;

pub const STARRED_TOKEN: &str = "starred";
pub const STARRED_PREFIX: &str = "★ ";
pub const LINK_NOTES_PREFIX: &str = "Link: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKind {
    ListMarker { name: String },
    Task(TaskCandidate),
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCandidate {
    /// Effective list: the row's own list cell, else the carried-forward marker.
    pub list: String,
    pub task: NewTask,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither a title nor an id to fall back on.
    MissingTitle,
    /// No list marker seen yet and the row has no list cell.
    NoListContext,
    /// A list marker whose name resolved to nothing.
    EmptyListName,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingTitle => write!(f, "no title or id"),
            SkipReason::NoListContext => write!(f, "no list established before this row"),
            SkipReason::EmptyListName => write!(f, "list marker without a name"),
        }
    }
}

/// Classify one row. Pure: the only state is `last_list`, the most recent
/// list-marker name seen before this row.
pub fn classify(row: &Row, columns: &ColumnMap, marker: &str, last_list: Option<&str>) -> RowKind {
    let title_cell = row.cell(columns.title).trim();
    let list_cell = row.cell(columns.list).trim();

    if let Some(rest) = strip_marker(title_cell, marker) {
        let name = if list_cell.is_empty() {
            rest.trim_start_matches(':').trim()
        } else {
            list_cell
        };
        if name.is_empty() {
            return RowKind::Skip(SkipReason::EmptyListName);
        }
        return RowKind::ListMarker {
            name: name.to_string(),
        };
    }

    let id_cell = row.cell(columns.id).trim();
    let title = if title_cell.is_empty() {
        id_cell
    } else {
        title_cell
    };
    if title.is_empty() {
        return RowKind::Skip(SkipReason::MissingTitle);
    }

    let list = if !list_cell.is_empty() {
        list_cell
    } else {
        match last_list {
            Some(name) if !name.trim().is_empty() => name,
            _ => return RowKind::Skip(SkipReason::NoListContext),
        }
    };

    let links = parse_links(row.cell(columns.links));
    let mut task = NewTask::new(if links.starred {
        format!("{}{}", STARRED_PREFIX, title)
    } else {
        title.to_string()
    });
    task.status = TaskStatus::from_cell(row.cell(columns.status));
    task.due = parse_due(row.cell(columns.due));
    task.notes = links.notes();

    RowKind::Task(TaskCandidate {
        list: list.to_string(),
        task,
    })
}

/// Remainder of `title` after a case-insensitive `marker` prefix.
fn strip_marker<'a>(title: &'a str, marker: &str) -> Option<&'a str> {
    let marker = marker.trim();
    if marker.is_empty() {
        return None;
    }
    let head = title.get(..marker.len())?;
    if head.eq_ignore_ascii_case(marker) {
        title.get(marker.len()..)
    } else {
        None
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Links {
    urls: Vec<String>,
    starred: bool,
}

impl Links {
    fn notes(&self) -> Option<String> {
        if self.urls.is_empty() {
            None
        } else {
            Some(format!("{}{}", LINK_NOTES_PREFIX, self.urls.join(", ")))
        }
    }
}

fn parse_links(cell: &str) -> Links {
    let mut links = Links::default();
    for token in cell
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        if token.eq_ignore_ascii_case(STARRED_TOKEN) {
            links.starred = true;
        } else {
            links.urls.push(token.to_string());
        }
    }
    links
}

/// Lenient due-date parsing; anything unrecognised yields `None`.
pub fn parse_due(cell: &str) -> Option<NaiveDate> {
    let s = cell.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    ["%Y/%m/%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}
