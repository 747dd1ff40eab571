// File: ./src/runner.rs
//! The resumable batch export.
//!
//! One call to [`ExportRunner::start`] or [`ExportRunner::resume`] is one
//! invocation of the host:
//!
//! ```text
//! LoadCheckpoint -> RefreshCache -> SliceRows -> ForEachRow -> PersistCheckpoint
//!                                                      |
//!                                   more rows? Reschedule : Finalize
//! ```
//!
//! All state that must outlive the invocation is in the [`Checkpoint`], which
//! is written back before the continuation is scheduled. Remote failures
//! skip the row they belong to; only structural problems end the run.
use crate::checkpoint::Checkpoint;
use crate::client::TaskService;
use crate::config::ExportSettings;
use crate::error::{RunError, RunResult};
use crate::model::{ColumnMap, Report, Row, RowKind, classify};
use crate::report::ReportBuilder;
use crate::resolver::ListResolver;
use crate::scheduler::{SchedulerBridge, TriggerHost};
use crate::sheet::SheetSource;
use crate::storage::KeyValueStore;

/// Per-invocation counters, for logging and callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub first_row: usize,
    pub rows: usize,
    pub markers: usize,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Failed creates the service refused for quota (also counted in `failed`).
    pub rate_limited: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Rows remain; exactly one continuation is pending.
    Rescheduled {
        next_row: usize,
        last_row: usize,
        stats: BatchStats,
    },
    /// Every row was processed; the checkpoint and triggers are gone.
    Finished { report: Report, stats: BatchStats },
}

impl BatchOutcome {
    pub fn stats(&self) -> &BatchStats {
        match self {
            BatchOutcome::Rescheduled { stats, .. } | BatchOutcome::Finished { stats, .. } => {
                stats
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, BatchOutcome::Finished { .. })
    }
}

pub struct ExportRunner<'a, S: TaskService> {
    service: &'a S,
    store: &'a dyn KeyValueStore,
    triggers: &'a dyn TriggerHost,
    reporter: &'a dyn ReportBuilder,
    settings: ExportSettings,
}

impl<'a, S: TaskService> ExportRunner<'a, S> {
    pub fn new(
        service: &'a S,
        store: &'a dyn KeyValueStore,
        triggers: &'a dyn TriggerHost,
        reporter: &'a dyn ReportBuilder,
        settings: ExportSettings,
    ) -> Self {
        Self {
            service,
            store,
            triggers,
            reporter,
            settings,
        }
    }

    fn bridge(&self) -> SchedulerBridge<'a> {
        SchedulerBridge::new(
            self.triggers,
            self.settings.handler_id.clone(),
            self.settings.reschedule_delay,
        )
    }

    /// Begin a new run over `sheet`, discarding any previous checkpoint and
    /// pending continuation, then process the first batch.
    pub async fn start(&self, sheet: &dyn SheetSource) -> RunResult<BatchOutcome> {
        // Columns are checked before anything stale is touched.
        let columns = self.resolve_columns(sheet)?;

        self.bridge().cancel_all()?;
        Checkpoint::clear(self.store)?;

        let checkpoint = Checkpoint::fresh(sheet.source_id(), self.settings.first_data_row);
        checkpoint.save(self.store)?;
        log::info!("Starting export of '{}'", sheet.source_id());

        self.run_batch(sheet, checkpoint, &columns).await
    }

    /// Continue the run recorded in the checkpoint. `open` turns the stored
    /// source reference back into a sheet.
    pub async fn resume<Src, F>(&self, open: F) -> RunResult<BatchOutcome>
    where
        Src: SheetSource,
        F: FnOnce(&str) -> anyhow::Result<Src>,
    {
        let checkpoint = match Checkpoint::load(self.store, self.settings.first_data_row) {
            Ok(Some(cp)) => cp,
            Ok(None) => return Err(self.abort(RunError::MissingSource)),
            Err(e) => return Err(self.abort(e)),
        };

        let sheet = match open(&checkpoint.source) {
            Ok(sheet) => sheet,
            Err(e) => {
                return Err(self.abort(RunError::Inconsistent(format!(
                    "cannot open source '{}': {:#}",
                    checkpoint.source, e
                ))));
            }
        };
        if sheet.source_id() != checkpoint.source {
            return Err(self.abort(RunError::Inconsistent(format!(
                "checkpoint is for '{}', not '{}'",
                checkpoint.source,
                sheet.source_id()
            ))));
        }

        let columns = match self.resolve_columns(&sheet) {
            Ok(columns) => columns,
            Err(e) => return Err(self.abort(e)),
        };

        log::info!(
            "Resuming export of '{}' at row {}",
            checkpoint.source,
            checkpoint.next_row
        );
        self.run_batch(&sheet, checkpoint, &columns).await
    }

    /// Cancel pending continuations for a run that cannot go on.
    fn abort(&self, err: RunError) -> RunError {
        if let Err(e) = self.bridge().cancel_all() {
            log::error!("Failed to cancel pending continuations: {:#}", e);
        }
        log::error!("Export stopped: {}", err);
        err
    }

    fn resolve_columns(&self, sheet: &dyn SheetSource) -> RunResult<ColumnMap> {
        let headers = sheet.headers()?;
        let columns = ColumnMap::resolve(&headers, &self.settings.columns);
        let missing = columns.missing_required(&self.settings.columns);
        if missing.is_empty() {
            Ok(columns)
        } else {
            log::error!(
                "Sheet '{}' has no {} column",
                sheet.source_id(),
                missing.join("/")
            );
            Err(RunError::MissingColumns(missing))
        }
    }

    async fn run_batch(
        &self,
        sheet: &dyn SheetSource,
        mut checkpoint: Checkpoint,
        columns: &ColumnMap,
    ) -> RunResult<BatchOutcome> {
        let resolver = ListResolver::new(self.service, self.settings.list_race_backoff);

        match resolver.refresh(&mut checkpoint.list_cache).await {
            Ok(count) => log::debug!("Refreshed list cache: {} remote lists", count),
            Err(e) => log::warn!("Could not refresh task lists, using cached ids: {}", e),
        }

        let last_row = sheet.last_row()?;
        let start = checkpoint.next_row;
        let mut stats = BatchStats {
            first_row: start,
            ..BatchStats::default()
        };

        if start <= last_row {
            let count = self.settings.batch_size.min(last_row - start + 1);
            let rows = sheet.row_slice(start, count)?;
            log::info!(
                "Processing rows {}-{} of {}",
                start,
                start + count - 1,
                last_row
            );

            for (offset, row) in rows.iter().enumerate() {
                self.process_row(
                    start + offset,
                    row,
                    columns,
                    &resolver,
                    &mut checkpoint,
                    &mut stats,
                )
                .await;
            }

            // Advance by the slice size, not by rows returned, so the cursor
            // always moves forward.
            checkpoint.next_row = start + count;
            stats.rows = count;
        }

        checkpoint.save(self.store)?;
        log::info!(
            "Batch done: {} rows, {} created, {} skipped, {} failed ({} rate limited)",
            stats.rows,
            stats.created,
            stats.skipped,
            stats.failed,
            stats.rate_limited
        );

        if checkpoint.next_row > last_row {
            return self.finalize(checkpoint, stats);
        }

        self.bridge().reschedule()?;
        Ok(BatchOutcome::Rescheduled {
            next_row: checkpoint.next_row,
            last_row,
            stats,
        })
    }

    async fn process_row(
        &self,
        row_no: usize,
        row: &Row,
        columns: &ColumnMap,
        resolver: &ListResolver<'_, S>,
        checkpoint: &mut Checkpoint,
        stats: &mut BatchStats,
    ) {
        let kind = classify(
            row,
            columns,
            &self.settings.list_marker,
            checkpoint.last_list.as_deref(),
        );

        let candidate = match kind {
            RowKind::ListMarker { name } => {
                log::debug!("Row {}: list '{}'", row_no, name);
                checkpoint.last_list = Some(name);
                stats.markers += 1;
                return;
            }
            RowKind::Skip(reason) => {
                if row.is_blank() {
                    log::debug!("Row {}: blank", row_no);
                } else {
                    log::warn!("Row {}: skipped ({})", row_no, reason);
                }
                stats.skipped += 1;
                return;
            }
            RowKind::Task(candidate) => candidate,
        };

        let list_id = match resolver
            .resolve(&candidate.list, &mut checkpoint.list_cache)
            .await
        {
            Ok(resolved) => resolved.remote_id,
            Err(e) => {
                log::warn!("Row {}: skipped ({})", row_no, e);
                stats.failed += 1;
                return;
            }
        };

        match self.service.create_task(&list_id, &candidate.task).await {
            Ok(()) => {
                log::debug!(
                    "Row {}: created '{}' in '{}'",
                    row_no,
                    candidate.task.title,
                    candidate.list
                );
                checkpoint
                    .report
                    .record(&candidate.list, candidate.task.status);
                stats.created += 1;
            }
            Err(e) if e.is_rate_limited() => {
                log::warn!(
                    "Row {}: task '{}' not created, rate limited ({})",
                    row_no,
                    candidate.task.title,
                    e
                );
                stats.failed += 1;
                stats.rate_limited += 1;
            }
            Err(e) => {
                log::warn!(
                    "Row {}: task '{}' not created ({})",
                    row_no,
                    candidate.task.title,
                    e
                );
                stats.failed += 1;
            }
        }

        tokio::time::sleep(self.settings.inter_call_delay).await;
    }

    /// Hand the report over, then drop the checkpoint and any trigger. A
    /// failed report leaves the checkpoint in place so the next invocation
    /// finalizes again without touching rows.
    fn finalize(&self, checkpoint: Checkpoint, stats: BatchStats) -> RunResult<BatchOutcome> {
        self.reporter.build(&checkpoint.report)?;
        Checkpoint::clear(self.store)?;
        self.bridge().cancel_all()?;
        log::info!("Export of '{}' complete", checkpoint.source);
        Ok(BatchOutcome::Finished {
            report: checkpoint.report,
            stats,
        })
    }
}
