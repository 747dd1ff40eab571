// File: src/controller.rs
//! Wires configuration and on-disk backends to the export runner.
//!
//! The binary delegates every command here, so the same code paths are
//! driven by tests through a `TestContext`.
use crate::checkpoint::Checkpoint;
use crate::client::TasksClient;
use crate::config::{Config, ExportSettings};
use crate::context::AppContext;
use crate::error::RunResult;
use crate::import::{self, ImportSummary};
use crate::report::SheetReportBuilder;
use crate::runner::{BatchOutcome, ExportRunner};
use crate::scheduler::{FileTriggerHost, TriggerHost};
use crate::sheet::SheetFile;
use crate::storage::FileStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Snapshot for `tasksheet status`.
#[derive(Debug, Clone)]
pub struct ExportStatus {
    pub checkpoint: Option<Checkpoint>,
    pub pending_triggers: usize,
    pub next_trigger: Option<DateTime<Utc>>,
}

struct Backends {
    client: TasksClient,
    store: FileStore,
    triggers: FileTriggerHost,
    reporter: SheetReportBuilder,
}

impl Backends {
    fn open(ctx: &dyn AppContext, config: &Config) -> Result<Self> {
        let client = TasksClient::new(&config.url, &config.token, config.allow_insecure_certs)?;
        if client.is_offline() {
            log::warn!("No service URL configured; every remote call will fail");
        }
        Ok(Self {
            client,
            store: FileStore::open(ctx)?,
            triggers: FileTriggerHost::open(ctx)?,
            reporter: SheetReportBuilder::open(ctx)?,
        })
    }

    fn runner(&self, settings: ExportSettings) -> ExportRunner<'_, TasksClient> {
        ExportRunner::new(
            &self.client,
            &self.store,
            &self.triggers,
            &self.reporter,
            settings,
        )
    }
}

#[derive(Clone)]
pub struct ExportController {
    pub ctx: Arc<dyn AppContext>,
    pub config: Config,
}

impl ExportController {
    pub fn new(ctx: Arc<dyn AppContext>, config: Config) -> Self {
        Self { ctx, config }
    }

    /// Controller with the configuration found under `ctx`, or defaults.
    pub fn load(ctx: Arc<dyn AppContext>) -> Result<Self> {
        let config = Config::load_or_default(ctx.as_ref())?;
        Ok(Self::new(ctx, config))
    }

    fn sheet_path(&self, sheet: Option<&Path>) -> Result<PathBuf> {
        match sheet {
            Some(p) => Ok(p.to_path_buf()),
            None => self.ctx.get_default_sheet_path(),
        }
    }

    /// Convert a JSON export into a sheet file. Returns where it was written.
    pub fn import(&self, export: &Path, sheet: Option<&Path>) -> Result<(PathBuf, ImportSummary)> {
        let dest = self.sheet_path(sheet)?;
        let summary = import::import_file(export, &dest, &self.config.list_marker)?;
        Ok((dest, summary))
    }

    /// Start a fresh run over the sheet at `sheet` (or the default sheet).
    pub async fn start_export(&self, sheet: Option<&Path>) -> RunResult<BatchOutcome> {
        let path = self.sheet_path(sheet)?;
        // Continuations may run from another working directory.
        let path = std::fs::canonicalize(&path)
            .with_context(|| format!("Sheet '{}' not found", path.display()))?;
        let sheet = SheetFile::load(&path)?;

        let backends = Backends::open(self.ctx.as_ref(), &self.config)?;
        backends
            .runner(self.config.export_settings())
            .start(&sheet)
            .await
    }

    /// Run the next batch of the run recorded in the checkpoint.
    pub async fn continue_export(&self) -> RunResult<BatchOutcome> {
        let backends = Backends::open(self.ctx.as_ref(), &self.config)?;
        backends
            .runner(self.config.export_settings())
            .resume(|source| SheetFile::load(Path::new(source)))
            .await
    }

    /// Fire the continuation if it is due. `Ok(None)` when nothing was due.
    pub async fn tick(&self) -> RunResult<Option<BatchOutcome>> {
        let triggers = FileTriggerHost::open(self.ctx.as_ref())?;
        let due = triggers.take_due(&self.config.handler_id, Utc::now())?;
        if due.is_empty() {
            log::debug!("No continuation due");
            return Ok(None);
        }
        if due.len() > 1 {
            log::warn!("{} continuations were due; running one batch", due.len());
        }
        self.continue_export().await.map(Some)
    }

    /// Keep firing continuations until none is pending. Returns the last
    /// batch outcome, if any batch ran.
    pub async fn watch(&self) -> RunResult<Option<BatchOutcome>> {
        let triggers = FileTriggerHost::open(self.ctx.as_ref())?;
        let mut last = None;
        loop {
            let Some(fire_at) = triggers.next_fire_at(&self.config.handler_id)? else {
                return Ok(last);
            };
            let wait = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if !wait.is_zero() {
                log::info!("Next batch at {}", fire_at.to_rfc3339());
                tokio::time::sleep(wait).await;
            }
            if let Some(outcome) = self.tick().await? {
                last = Some(outcome);
            }
        }
    }

    pub fn status(&self) -> Result<ExportStatus> {
        let store = FileStore::open(self.ctx.as_ref())?;
        let triggers = FileTriggerHost::open(self.ctx.as_ref())?;
        let checkpoint = Checkpoint::load(&store, self.config.export_settings().first_data_row)
            .map_err(anyhow::Error::from)?;
        let pending = triggers.pending(&self.config.handler_id)?;
        Ok(ExportStatus {
            checkpoint,
            pending_triggers: pending.len(),
            next_trigger: pending.iter().map(|t| t.fire_at).min(),
        })
    }

    /// Drop the checkpoint and every pending continuation, even when either
    /// file is unreadable.
    pub fn reset(&self) -> Result<()> {
        let store = FileStore::open(self.ctx.as_ref())?;
        if let Err(e) = Checkpoint::clear(&store) {
            log::warn!("Checkpoint unreadable ({:#}); removing state file", e);
            store.wipe()?;
        }
        let triggers = FileTriggerHost::open(self.ctx.as_ref())?;
        if let Err(e) = triggers.cancel_all(&self.config.handler_id) {
            log::warn!("Triggers unreadable ({:#}); removing trigger file", e);
            triggers.wipe()?;
        }
        log::info!("Export state cleared");
        Ok(())
    }
}
