// File: ./src/import.rs
// Turns a task-list JSON export into a sheet the exporter can read back.
use crate::model::Row;
use crate::model::classify::{STARRED_TOKEN, parse_due};
use crate::sheet::{Sheet, SheetFile};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Only columns the exporter reads. Task notes are rebuilt from links on
/// export, so imported notes are not carried.
pub const IMPORT_HEADERS: [&str; 5] = ["title", "id", "status", "due", "links"];

#[derive(Deserialize, Debug, Default)]
pub struct TaskListExport {
    #[serde(default)]
    pub items: Vec<ExportedList>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ExportedList {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub items: Vec<ExportedTask>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ExportedTask {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub due: Option<String>,
    #[serde(default)]
    pub links: Vec<ExportedLink>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Deserialize, Debug, Default)]
pub struct ExportedLink {
    #[serde(default)]
    pub link: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub lists: usize,
    pub tasks: usize,
}

/// Title cell prefix for marker rows. "list:" and "list" both render as
/// "List: " so the default configuration reads its own imports.
fn marker_label(marker: &str) -> String {
    let trimmed = marker.trim();
    let bare = trimmed.trim_end_matches(':');
    if bare.eq_ignore_ascii_case("list") {
        "List: ".to_string()
    } else {
        format!("{} ", trimmed)
    }
}

fn task_row(task: &ExportedTask) -> Row {
    // Keep an unparseable due as-is; the exporter drops it later.
    let due = match task.due.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => parse_due(raw)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| raw.to_string()),
        _ => String::new(),
    };

    let mut links: Vec<&str> = task
        .links
        .iter()
        .map(|l| l.link.trim())
        .filter(|l| !l.is_empty())
        .collect();
    if task.starred {
        links.push(STARRED_TOKEN);
    }

    Row::new([
        task.title.clone(),
        task.id.clone(),
        task.status.clone(),
        due,
        links.join(", "),
    ])
}

/// Build the sheet: a marker row per list, then that list's tasks.
pub fn to_sheet(export: &TaskListExport, marker: &str) -> (Sheet, ImportSummary) {
    let label = marker_label(marker);
    let mut sheet = Sheet::new(IMPORT_HEADERS);
    let mut summary = ImportSummary::default();

    for list in &export.items {
        let name = match list.title.trim() {
            "" => list.id.trim(),
            title => title,
        };
        if name.is_empty() {
            log::warn!("Skipping a list with neither title nor id");
            continue;
        }

        sheet.push(Row::new([
            format!("{}{}", label, name),
            list.id.clone(),
            String::new(),
            String::new(),
            String::new(),
        ]));
        summary.lists += 1;

        for task in list.items.iter().filter(|t| !t.deleted) {
            sheet.push(task_row(task));
            summary.tasks += 1;
        }
    }

    (sheet, summary)
}

pub fn parse_export(json: &str) -> Result<TaskListExport> {
    serde_json::from_str(json).context("Failed to parse task list export")
}

/// Read the export at `src` and write the sheet to `dest`.
pub fn import_file(src: &Path, dest: &Path, marker: &str) -> Result<ImportSummary> {
    let json = fs::read_to_string(src)
        .with_context(|| format!("Failed to read export '{}'", src.display()))?;
    let export = parse_export(&json)?;
    let (sheet, summary) = to_sheet(&export, marker);
    SheetFile::save(dest, &sheet)?;
    log::info!(
        "Imported {} tasks in {} lists into {}",
        summary.tasks,
        summary.lists,
        dest.display()
    );
    Ok(summary)
}
