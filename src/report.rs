// File: ./src/report.rs
// Renders the finished per-list counters of an export run.
use crate::context::AppContext;
use crate::model::{ListCounters, Report, Row};
use crate::sheet::{Sheet, SheetFile};
use anyhow::Result;
use std::path::PathBuf;

pub const REPORT_HEADERS: [&str; 4] = ["List", "Total", "Completed", "Needs Action"];
pub const TOTAL_LABEL: &str = "Total";

pub trait ReportBuilder: Send + Sync {
    fn build(&self, report: &Report) -> Result<()>;
}

fn counter_row(label: &str, c: &ListCounters) -> Row {
    Row::new([
        label.to_string(),
        c.total.to_string(),
        c.completed.to_string(),
        c.needs_action.to_string(),
    ])
}

/// One row per list in name order, then a totals row.
pub fn summary_sheet(report: &Report) -> Sheet {
    let mut sheet = Sheet::new(REPORT_HEADERS);
    for (name, counters) in &report.lists {
        sheet.push(counter_row(name, counters));
    }
    sheet.push(counter_row(TOTAL_LABEL, &report.totals()));
    sheet
}

/// Writes the summary as a sheet document.
#[derive(Debug, Clone)]
pub struct SheetReportBuilder {
    path: PathBuf,
}

impl SheetReportBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(ctx: &dyn AppContext) -> Result<Self> {
        Ok(Self::new(ctx.get_report_path()?))
    }
}

impl ReportBuilder for SheetReportBuilder {
    fn build(&self, report: &Report) -> Result<()> {
        SheetFile::save(&self.path, &summary_sheet(report))?;
        log::info!("Report written to {}", self.path.display());
        LogReportBuilder.build(report)
    }
}

pub struct LogReportBuilder;

impl ReportBuilder for LogReportBuilder {
    fn build(&self, report: &Report) -> Result<()> {
        if report.is_empty() {
            log::info!("Export finished: no tasks were created");
            return Ok(());
        }
        for (name, c) in &report.lists {
            log::info!(
                "  {}: {} tasks ({} completed, {} needs action)",
                name,
                c.total,
                c.completed,
                c.needs_action
            );
        }
        let t = report.totals();
        log::info!(
            "Export finished: {} tasks in {} lists ({} completed, {} needs action)",
            t.total,
            report.lists.len(),
            t.completed,
            t.needs_action
        );
        Ok(())
    }
}
