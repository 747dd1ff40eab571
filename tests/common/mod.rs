// Shared fixtures for the integration tests.
#![allow(dead_code)]

use http::StatusCode;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tasksheet::client::{ServiceError, TaskService};
use tasksheet::config::ExportSettings;
use tasksheet::model::{NewTask, Report, Row, TaskListRef};
use tasksheet::report::ReportBuilder;
use tasksheet::runner::{BatchOutcome, ExportRunner};
use tasksheet::scheduler::MemoryTriggerHost;
use tasksheet::sheet::{Sheet, SheetFile};
use tasksheet::storage::MemoryStore;

#[derive(Default)]
struct FakeState {
    lists: Vec<TaskListRef>,
    tasks: Vec<(String, NewTask)>,
    next_id: usize,
    create_list_calls: usize,
    list_all_calls: usize,
    // Name -> id of a list another writer creates concurrently.
    races: Vec<(String, String)>,
    rejected_lists: HashSet<String>,
    failing_titles: HashSet<String>,
    throttled_titles: HashSet<String>,
    listing_fails: bool,
}

/// In-memory task service with scriptable failures.
#[derive(Default)]
pub struct FakeService {
    state: Mutex<FakeState>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list(self, name: &str, id: &str) -> Self {
        self.state.lock().unwrap().lists.push(TaskListRef {
            name: name.to_string(),
            remote_id: id.to_string(),
        });
        self
    }

    /// Creating `name` fails with 409 because another writer just created it
    /// as `id`; the list shows up when enumerating afterwards.
    pub fn race_on(self, name: &str, id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .races
            .push((name.to_string(), id.to_string()));
        self
    }

    /// Creating `name` fails and the list never appears.
    pub fn reject_list(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .rejected_lists
            .insert(name.to_string());
        self
    }

    pub fn fail_task(self, title: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_titles
            .insert(title.to_string());
        self
    }

    /// Creating a task called `title` is refused with 429.
    pub fn throttle_task(self, title: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .throttled_titles
            .insert(title.to_string());
        self
    }

    pub fn fail_listing(self) -> Self {
        self.state.lock().unwrap().listing_fails = true;
        self
    }

    pub fn lists(&self) -> Vec<TaskListRef> {
        self.state.lock().unwrap().lists.clone()
    }

    pub fn list_id(&self, name: &str) -> Option<String> {
        self.lists()
            .into_iter()
            .find(|l| l.name == name)
            .map(|l| l.remote_id)
    }

    pub fn tasks(&self) -> Vec<(String, NewTask)> {
        self.state.lock().unwrap().tasks.clone()
    }

    /// Titles created in the list called `name`, in creation order.
    pub fn titles_in(&self, name: &str) -> Vec<String> {
        let Some(id) = self.list_id(name) else {
            return Vec::new();
        };
        self.tasks()
            .into_iter()
            .filter(|(list, _)| *list == id)
            .map(|(_, t)| t.title)
            .collect()
    }

    pub fn create_list_calls(&self) -> usize {
        self.state.lock().unwrap().create_list_calls
    }

    pub fn list_all_calls(&self) -> usize {
        self.state.lock().unwrap().list_all_calls
    }
}

fn status_error(status: StatusCode) -> ServiceError {
    ServiceError::Status {
        status,
        body: String::new(),
    }
}

impl TaskService for FakeService {
    async fn list_all(&self) -> Result<Vec<TaskListRef>, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.list_all_calls += 1;
        if state.listing_fails {
            return Err(status_error(StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(state.lists.clone())
    }

    async fn create_list(&self, name: &str) -> Result<TaskListRef, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.create_list_calls += 1;
        if state.rejected_lists.contains(name) {
            return Err(status_error(StatusCode::FORBIDDEN));
        }
        if let Some(pos) = state.races.iter().position(|(n, _)| n == name) {
            let (name, id) = state.races.remove(pos);
            state.lists.push(TaskListRef {
                name,
                remote_id: id,
            });
            return Err(status_error(StatusCode::CONFLICT));
        }
        state.next_id += 1;
        let list = TaskListRef {
            name: name.to_string(),
            remote_id: format!("fake-{}", state.next_id),
        };
        state.lists.push(list.clone());
        Ok(list)
    }

    async fn create_task(&self, list_id: &str, task: &NewTask) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        if !state.lists.iter().any(|l| l.remote_id == list_id) {
            return Err(status_error(StatusCode::NOT_FOUND));
        }
        if state.throttled_titles.contains(&task.title) {
            return Err(status_error(StatusCode::TOO_MANY_REQUESTS));
        }
        if state.failing_titles.contains(&task.title) {
            return Err(status_error(StatusCode::INTERNAL_SERVER_ERROR));
        }
        state.tasks.push((list_id.to_string(), task.clone()));
        Ok(())
    }
}

/// Keeps every report it is handed; can be told to fail.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Report>>,
    failing: AtomicBool,
}

impl RecordingReporter {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }
}

impl ReportBuilder for RecordingReporter {
    fn build(&self, report: &Report) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("report destination unavailable");
        }
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

pub fn settings(batch_size: usize) -> ExportSettings {
    ExportSettings {
        batch_size,
        inter_call_delay: Duration::ZERO,
        list_race_backoff: Duration::ZERO,
        ..ExportSettings::default()
    }
}

pub fn sheet(id: &str, headers: &[&str], rows: Vec<Vec<&str>>) -> SheetFile {
    let mut sheet = Sheet::new(headers.iter().copied());
    for row in rows {
        sheet.push(Row::new(row));
    }
    SheetFile::in_memory(id, sheet)
}

pub const HEADERS: [&str; 5] = ["title", "id", "status", "due", "links"];

/// Everything one export run needs, held in memory.
#[derive(Default)]
pub struct Harness {
    pub service: FakeService,
    pub store: MemoryStore,
    pub triggers: MemoryTriggerHost,
    pub reporter: RecordingReporter,
}

impl Harness {
    pub fn new(service: FakeService) -> Self {
        Self {
            service,
            ..Self::default()
        }
    }

    pub fn runner(&self, batch_size: usize) -> ExportRunner<'_, FakeService> {
        self.runner_with(settings(batch_size))
    }

    pub fn runner_with(&self, settings: ExportSettings) -> ExportRunner<'_, FakeService> {
        ExportRunner::new(
            &self.service,
            &self.store,
            &self.triggers,
            &self.reporter,
            settings,
        )
    }

    /// Start a run and keep resuming until it finishes. Returns every
    /// outcome in order.
    pub async fn drain(&self, sheet: &SheetFile, batch_size: usize) -> Vec<BatchOutcome> {
        let runner = self.runner(batch_size);
        let mut outcomes = vec![runner.start(sheet).await.unwrap()];
        while !outcomes.last().unwrap().is_finished() {
            assert!(outcomes.len() < 10_000, "run does not terminate");
            let outcome = runner.resume(|_| Ok(sheet.clone())).await.unwrap();
            outcomes.push(outcome);
        }
        outcomes
    }
}
