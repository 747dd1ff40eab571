// Batch export behaviour against an in-memory service.
mod common;

use chrono::NaiveDate;
use common::{FakeService, HEADERS, Harness, sheet};
use std::time::Duration;
use tasksheet::checkpoint::{self, Checkpoint};
use tasksheet::error::RunError;
use tasksheet::model::TaskStatus;
use tasksheet::runner::BatchOutcome;
use tasksheet::scheduler::TriggerHost;
use tasksheet::storage::KeyValueStore;

const HANDLER: &str = "continue_export";

fn pending(h: &Harness) -> usize {
    h.triggers.pending(HANDLER).unwrap().len()
}

#[tokio::test]
async fn test_marker_then_starred_task() {
    let h = Harness::new(FakeService::new());
    let sheet = sheet(
        "sheet-1",
        &HEADERS,
        vec![
            vec!["List: Work", "list1", "", "", ""],
            vec!["Buy milk", "t1", "needsAction", "2024-05-01", "http://a starred"],
        ],
    );

    let outcome = h.runner(100).start(&sheet).await.unwrap();
    let BatchOutcome::Finished { report, stats } = outcome else {
        panic!("expected the run to finish in one batch");
    };
    assert_eq!(stats.markers, 1);
    assert_eq!(stats.created, 1);

    let work = h.service.list_id("Work").expect("list created");
    let tasks = h.service.tasks();
    assert_eq!(tasks.len(), 1);
    let (list_id, task) = &tasks[0];
    assert_eq!(*list_id, work);
    assert_eq!(task.title, "★ Buy milk");
    assert_eq!(task.status, TaskStatus::NeedsAction);
    assert_eq!(task.due, NaiveDate::from_ymd_opt(2024, 5, 1));
    assert_eq!(task.notes.as_deref(), Some("Link: http://a"));

    let counters = report.get("Work").unwrap();
    assert_eq!(counters.total, 1);
    assert_eq!(counters.needs_action, 1);
    assert_eq!(counters.completed, 0);

    assert_eq!(h.reporter.reports(), vec![report]);
    assert!(h.store.is_empty(), "checkpoint keys must be removed");
    assert_eq!(pending(&h), 0);
}

#[tokio::test]
async fn test_list_context_carries_across_batches() {
    let h = Harness::new(FakeService::new());
    let titles: Vec<String> = (1..=199).map(|i| format!("Task {}", i)).collect();
    let mut rows = vec![vec!["List: Home", "", "", "", ""]];
    rows.extend(titles.iter().map(|t| vec![t.as_str(), "", "", "", ""]));
    let sheet = sheet("sheet-carry", &HEADERS, rows);

    let runner = h.runner(100);
    let first = runner.start(&sheet).await.unwrap();
    let BatchOutcome::Rescheduled {
        next_row, last_row, ..
    } = first
    else {
        panic!("first batch should leave rows behind");
    };
    assert_eq!(next_row, 102);
    assert_eq!(last_row, 201);
    assert_eq!(pending(&h), 1);

    let saved = Checkpoint::load(&h.store, 2).unwrap().unwrap();
    assert_eq!(saved.last_list.as_deref(), Some("Home"));
    assert_eq!(saved.next_row, 102);

    let second = runner.resume(|_| Ok(sheet.clone())).await.unwrap();
    assert!(second.is_finished());
    assert_eq!(h.service.titles_in("Home"), titles);
    assert_eq!(h.service.create_list_calls(), 1);
    assert_eq!(pending(&h), 0);
}

fn mixed_sheet(id: &str) -> tasksheet::sheet::SheetFile {
    sheet(
        id,
        &HEADERS,
        vec![
            vec!["List: Errands", "", "", "", ""],
            vec!["Post office", "", "needsAction", "", ""],
            vec!["Pharmacy", "", "completed", "2024/02/03", ""],
            vec!["", "", "", "", ""],
            vec!["List: Reading", "", "", "", ""],
            vec!["Dune", "", "completed", "", "starred"],
            vec!["", "book-2", "", "", "http://x, http://y"],
            vec!["List:", "", "", "", ""],
            vec!["Hyperion", "", "", "05/06/2024", ""],
            vec!["list: Errands", "", "", "", ""],
            vec!["Bank", "", "COMPLETED", "", ""],
        ],
    )
}

#[tokio::test]
async fn test_batched_run_matches_single_pass() {
    let one = Harness::new(FakeService::new());
    let one_pass = one.drain(&mixed_sheet("sheet-eq"), 1000).await;
    assert_eq!(one_pass.len(), 1);

    for batch in [1, 2, 3, 5] {
        let many = Harness::new(FakeService::new());
        let outcomes = many.drain(&mixed_sheet("sheet-eq"), batch).await;
        assert!(outcomes.len() > 1);

        let (BatchOutcome::Finished { report: a, .. }, BatchOutcome::Finished { report: b, .. }) =
            (one_pass.last().unwrap(), outcomes.last().unwrap())
        else {
            panic!("both runs must finish");
        };
        assert_eq!(a, b, "batch size {}", batch);
        for list in ["Errands", "Reading"] {
            assert_eq!(
                one.service.titles_in(list),
                many.service.titles_in(list),
                "list {} with batch size {}",
                list,
                batch
            );
        }
    }

    let errands = one.service.titles_in("Errands");
    assert_eq!(errands, vec!["Post office", "Pharmacy", "Bank"]);
    let reading = one.service.titles_in("Reading");
    assert_eq!(reading, vec!["★ Dune", "book-2", "Hyperion"]);
}

#[tokio::test]
async fn test_cursor_only_moves_forward() {
    let h = Harness::new(FakeService::new());
    let outcomes = h.drain(&mixed_sheet("sheet-cursor"), 3).await;

    let mut previous = 2;
    for outcome in &outcomes {
        assert_eq!(outcome.stats().first_row, previous);
        if let BatchOutcome::Rescheduled { next_row, .. } = outcome {
            assert!(*next_row > previous);
            previous = *next_row;
        }
    }
    // 11 data rows in batches of 3.
    assert_eq!(outcomes.len(), 4);
}

#[tokio::test]
async fn test_title_falls_back_to_id_and_bad_due_is_dropped() {
    let h = Harness::new(FakeService::new());
    let sheet = sheet(
        "sheet-fallback",
        &HEADERS,
        vec![
            vec!["List: Misc", "", "", "", ""],
            vec!["", "id-7", "completed", "not a date", ""],
            vec!["", "", "completed", "2024-01-01", ""],
        ],
    );

    let outcome = h.runner(10).start(&sheet).await.unwrap();
    assert_eq!(outcome.stats().skipped, 1);
    let tasks = h.service.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].1.title, "id-7");
    assert_eq!(tasks[0].1.due, None);
    assert_eq!(tasks[0].1.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_rows_before_any_marker_are_skipped() {
    let h = Harness::new(FakeService::new());
    let sheet = sheet(
        "sheet-orphans",
        &HEADERS,
        vec![
            vec!["Orphan", "", "", "", ""],
            vec!["List: Late", "", "", "", ""],
            vec!["Adopted", "", "", "", ""],
        ],
    );

    let outcome = h.runner(10).start(&sheet).await.unwrap();
    assert_eq!(outcome.stats().skipped, 1);
    assert_eq!(h.service.titles_in("Late"), vec!["Adopted"]);
}

#[tokio::test]
async fn test_list_cell_applies_to_its_row_only() {
    let h = Harness::new(FakeService::new());
    let sheet = sheet(
        "sheet-list-col",
        &["title", "list"],
        vec![
            vec!["List: A", ""],
            vec!["x", "B"],
            vec!["y", ""],
        ],
    );

    h.runner(10).start(&sheet).await.unwrap();
    assert_eq!(h.service.titles_in("A"), vec!["y"]);
    assert_eq!(h.service.titles_in("B"), vec!["x"]);
}

#[tokio::test]
async fn test_remote_failures_skip_rows_but_run_continues() {
    let service = FakeService::new()
        .reject_list("Locked")
        .fail_task("Flaky");
    let h = Harness::new(service);
    let sheet = sheet(
        "sheet-failures",
        &HEADERS,
        vec![
            vec!["List: Locked", "", "", "", ""],
            vec!["Never", "", "", "", ""],
            vec!["List: Open", "", "", "", ""],
            vec!["Flaky", "", "", "", ""],
            vec!["Solid", "", "", "", ""],
        ],
    );

    let outcome = h.runner(100).start(&sheet).await.unwrap();
    let BatchOutcome::Finished { report, stats } = outcome else {
        panic!("expected a finished run");
    };
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.created, 1);
    assert_eq!(h.service.titles_in("Open"), vec!["Solid"]);
    assert!(report.get("Locked").is_none());
    assert_eq!(report.get("Open").unwrap().total, 1);
}

#[tokio::test]
async fn test_concurrently_created_list_is_recovered() {
    let h = Harness::new(FakeService::new().race_on("Shared", "other-writer"));
    let sheet = sheet(
        "sheet-race",
        &HEADERS,
        vec![
            vec!["List: Shared", "", "", "", ""],
            vec!["One", "", "", "", ""],
            vec!["Two", "", "", "", ""],
        ],
    );

    h.runner(10).start(&sheet).await.unwrap();
    let tasks = h.service.tasks();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|(list, _)| list == "other-writer"));
    assert_eq!(h.service.create_list_calls(), 1);
}

#[tokio::test]
async fn test_existing_remote_list_is_reused() {
    let h = Harness::new(FakeService::new().with_list("Work", "remote-work"));
    let sheet = sheet(
        "sheet-reuse",
        &HEADERS,
        vec![vec!["List: Work", "", "", "", ""], vec!["Report", "", "", "", ""]],
    );

    h.runner(10).start(&sheet).await.unwrap();
    assert_eq!(h.service.create_list_calls(), 0);
    assert_eq!(h.service.tasks()[0].0, "remote-work");
}

#[tokio::test]
async fn test_refresh_failure_is_not_fatal() {
    let h = Harness::new(FakeService::new().fail_listing());
    let sheet = sheet(
        "sheet-refresh",
        &HEADERS,
        vec![vec!["List: Work", "", "", "", ""], vec!["Report", "", "", "", ""]],
    );

    let outcome = h.runner(10).start(&sheet).await.unwrap();
    assert!(outcome.is_finished());
    assert_eq!(h.service.titles_in("Work"), vec!["Report"]);
}

#[tokio::test]
async fn test_resume_without_checkpoint_cancels_triggers() {
    let h = Harness::new(FakeService::new());
    h.triggers
        .schedule_once(HANDLER, Duration::from_secs(60))
        .unwrap();
    let sheet = mixed_sheet("sheet-any");

    let err = h
        .runner(10)
        .resume(|_| Ok(sheet.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::MissingSource));
    assert_eq!(pending(&h), 0);
    assert!(h.service.tasks().is_empty());
}

#[tokio::test]
async fn test_resume_against_other_source_is_inconsistent() {
    let h = Harness::new(FakeService::new());
    let runner = h.runner(2);
    runner.start(&mixed_sheet("sheet-a")).await.unwrap();
    assert_eq!(pending(&h), 1);
    let created = h.service.tasks().len();

    let err = runner
        .resume(|_| Ok(mixed_sheet("sheet-b")))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Inconsistent(_)));
    assert_eq!(pending(&h), 0);
    assert_eq!(h.service.tasks().len(), created);
}

#[tokio::test]
async fn test_unopenable_source_is_inconsistent() {
    let h = Harness::new(FakeService::new());
    let runner = h.runner(2);
    runner.start(&mixed_sheet("sheet-gone")).await.unwrap();

    let err = runner
        .resume(|source| -> anyhow::Result<tasksheet::sheet::SheetFile> {
            anyhow::bail!("{} was deleted", source)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Inconsistent(_)));
    assert_eq!(pending(&h), 0);
}

#[tokio::test]
async fn test_missing_title_column_leaves_state_alone() {
    let h = Harness::new(FakeService::new());
    let runner = h.runner(2);
    runner.start(&mixed_sheet("sheet-old")).await.unwrap();
    let before = Checkpoint::load(&h.store, 2).unwrap().unwrap();

    let bad = sheet("sheet-new", &["name", "status"], vec![vec!["x", ""]]);
    let err = runner.start(&bad).await.unwrap_err();
    match err {
        RunError::MissingColumns(cols) => assert_eq!(cols, vec!["title".to_string()]),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(Checkpoint::load(&h.store, 2).unwrap().unwrap(), before);
    assert_eq!(pending(&h), 1);
}

#[tokio::test]
async fn test_restart_discards_previous_run() {
    let h = Harness::new(FakeService::new());
    let runner = h.runner(2);
    runner.start(&mixed_sheet("sheet-first")).await.unwrap();

    let fresh = sheet(
        "sheet-second",
        &HEADERS,
        vec![vec!["List: Fresh", "", "", "", ""], vec!["Only", "", "", "", ""]],
    );
    let outcome = runner.start(&fresh).await.unwrap();
    let BatchOutcome::Finished { report, .. } = outcome else {
        panic!("second run fits one batch");
    };
    assert_eq!(report.lists.keys().collect::<Vec<_>>(), vec!["Fresh"]);
    assert_eq!(pending(&h), 0);
}

#[tokio::test]
async fn test_failed_report_keeps_checkpoint_for_retry() {
    let h = Harness::new(FakeService::new());
    h.reporter.set_failing(true);
    let sheet = mixed_sheet("sheet-report");

    let runner = h.runner(100);
    assert!(runner.start(&sheet).await.is_err());
    assert!(Checkpoint::exists(&h.store).unwrap());
    let created = h.service.tasks().len();

    h.reporter.set_failing(false);
    let outcome = runner.resume(|_| Ok(sheet.clone())).await.unwrap();
    assert!(outcome.is_finished());
    assert_eq!(outcome.stats().rows, 0);
    assert_eq!(h.service.tasks().len(), created);
    assert_eq!(h.reporter.reports().len(), 1);
    assert!(!Checkpoint::exists(&h.store).unwrap());
}

#[tokio::test]
async fn test_empty_sheet_finishes_immediately() {
    let h = Harness::new(FakeService::new());
    let sheet = sheet("sheet-empty", &HEADERS, vec![vec!["", "", "", "", ""]]);

    let outcome = h.runner(10).start(&sheet).await.unwrap();
    let BatchOutcome::Finished { report, stats } = outcome else {
        panic!("nothing to process");
    };
    assert!(report.is_empty());
    assert_eq!(stats.rows, 0);
    assert_eq!(h.reporter.reports().len(), 1);
    assert_eq!(pending(&h), 0);
}

#[tokio::test]
async fn test_corrupt_checkpoint_stops_the_run() {
    let h = Harness::new(FakeService::new());
    h.store.set(checkpoint::KEY_SOURCE, "sheet-x").unwrap();
    h.store.set(checkpoint::KEY_NEXT_ROW, "eleven").unwrap();
    h.triggers
        .schedule_once(HANDLER, Duration::from_secs(60))
        .unwrap();

    let sheet = mixed_sheet("sheet-x");
    let err = h
        .runner(10)
        .resume(|_| Ok(sheet.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Inconsistent(_)));
    assert_eq!(pending(&h), 0);
}

#[tokio::test]
async fn test_single_list_single_task() {
    let h = Harness::new(FakeService::new());
    let sheet = sheet(
        "sheet-basic",
        &HEADERS,
        vec![
            vec!["List: Work", "list1"],
            vec!["Buy milk", "", "needsAction", "", "http://x"],
        ],
    );

    let outcome = h.runner(100).start(&sheet).await.unwrap();
    let BatchOutcome::Finished { report, .. } = outcome else {
        panic!("expected the run to finish");
    };
    assert_eq!(h.service.lists().len(), 1);
    let tasks = h.service.tasks();
    assert_eq!(tasks[0].1.title, "Buy milk");
    assert_eq!(tasks[0].1.notes.as_deref(), Some("Link: http://x"));
    let work = report.get("Work").unwrap();
    assert_eq!((work.total, work.completed, work.needs_action), (1, 0, 1));
}

fn paced_settings() -> tasksheet::config::ExportSettings {
    tasksheet::config::ExportSettings {
        batch_size: 100,
        inter_call_delay: Duration::from_millis(500),
        list_race_backoff: Duration::from_millis(2000),
        ..common::settings(100)
    }
}

#[tokio::test(start_paused = true)]
async fn test_race_backoff_and_call_delay_are_waited_out() {
    let h = Harness::new(FakeService::new().race_on("Shared", "theirs"));
    let sheet = sheet(
        "sheet-paced",
        &HEADERS,
        vec![
            vec!["List: Shared", "", "", "", ""],
            vec!["One", "", "", "", ""],
            vec!["Two", "", "", "", ""],
        ],
    );

    let began = tokio::time::Instant::now();
    let outcome = h.runner_with(paced_settings()).start(&sheet).await.unwrap();
    let elapsed = began.elapsed();

    assert!(outcome.is_finished());
    assert_eq!(h.service.tasks().len(), 2);
    // One relist backoff plus one pause per task.
    assert!(
        elapsed >= Duration::from_millis(2000 + 2 * 500),
        "elapsed {:?}",
        elapsed
    );
    assert!(elapsed < Duration::from_millis(3500), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_tasks_still_pause() {
    let h = Harness::new(FakeService::new().throttle_task("Busy").fail_task("Broken"));
    let sheet = sheet(
        "sheet-paced-failures",
        &HEADERS,
        vec![
            vec!["List: Work", "", "", "", ""],
            vec!["Busy", "", "", "", ""],
            vec!["Broken", "", "", "", ""],
            vec!["Fine", "", "", "", ""],
        ],
    );

    let began = tokio::time::Instant::now();
    let outcome = h.runner_with(paced_settings()).start(&sheet).await.unwrap();
    let elapsed = began.elapsed();

    let stats = outcome.stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.rate_limited, 1);
    // No race: only the per-task pause, for every attempted task.
    assert!(elapsed >= Duration::from_millis(3 * 500), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2000), "elapsed {:?}", elapsed);
}
