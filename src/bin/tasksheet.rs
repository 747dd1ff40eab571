// Binary entry point for the command line tool.
use anyhow::{Result, bail};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tasksheet::cli::print_help;
use tasksheet::context::{AppContext, StandardContext};
use tasksheet::controller::ExportController;
use tasksheet::runner::BatchOutcome;

fn init_logging(ctx: &dyn AppContext, verbose: bool) -> Result<()> {
    let config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    let term_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        term_level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    // The file log keeps row-level detail for later runs fired from cron.
    match ctx.get_log_path().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Into::into)
    }) {
        Ok(file) => loggers.push(WriteLogger::new(LevelFilter::Debug, config, file)),
        Err(e) => eprintln!("Warning: file logging disabled: {:#}", e),
    }

    CombinedLogger::init(loggers)?;
    Ok(())
}

fn print_outcome(outcome: &BatchOutcome) {
    let stats = outcome.stats();
    match outcome {
        BatchOutcome::Rescheduled {
            next_row, last_row, ..
        } => println!(
            "Processed {} rows ({} created). Continuing at row {} of {}.",
            stats.rows, stats.created, next_row, last_row
        ),
        BatchOutcome::Finished { report, .. } => {
            let totals = report.totals();
            println!(
                "Export complete: {} tasks in {} lists ({} completed, {} needs action).",
                totals.total,
                report.lists.len(),
                totals.completed,
                totals.needs_action
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut override_root: Option<PathBuf> = None;
    let mut sheet: Option<PathBuf> = None;
    let mut verbose = false;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help("tasksheet");
                return Ok(());
            }
            "--root" | "-r" => {
                if i + 1 < args.len() {
                    override_root = Some(args[i + 1].clone().into());
                    i += 1; // Also consumed the value
                }
            }
            "--sheet" | "-s" => {
                if i + 1 < args.len() {
                    sheet = Some(args[i + 1].clone().into());
                    i += 1;
                }
            }
            "--verbose" | "-v" => verbose = true,
            arg if !arg.starts_with('-') => positional.push(arg.to_string()),
            other => eprintln!("Ignoring unknown flag '{}'", other),
        }
        i += 1;
    }

    let Some(command) = positional.first().cloned() else {
        print_help("tasksheet");
        return Ok(());
    };

    let ctx = Arc::new(StandardContext::new(override_root));
    init_logging(ctx.as_ref(), verbose)?;
    let controller = ExportController::load(ctx)?;

    match command.as_str() {
        "help" => print_help("tasksheet"),
        "import" => {
            let Some(export) = positional.get(1) else {
                bail!("Usage: tasksheet import <export.json> [--sheet <path>]");
            };
            let (dest, summary) = controller.import(export.as_ref(), sheet.as_deref())?;
            println!(
                "Imported {} tasks in {} lists into {}",
                summary.tasks,
                summary.lists,
                dest.display()
            );
        }
        "export" => print_outcome(&controller.start_export(sheet.as_deref()).await?),
        "continue" => print_outcome(&controller.continue_export().await?),
        "tick" => match controller.tick().await? {
            Some(outcome) => print_outcome(&outcome),
            None => println!("Nothing due."),
        },
        "watch" => match controller.watch().await? {
            Some(outcome) => print_outcome(&outcome),
            None => println!("No export pending."),
        },
        "status" => {
            let status = controller.status()?;
            match &status.checkpoint {
                None => println!("No export in progress."),
                Some(cp) => {
                    println!("Source:       {}", cp.source);
                    println!("Next row:     {}", cp.next_row);
                    println!(
                        "Current list: {}",
                        cp.last_list.as_deref().unwrap_or("(none)")
                    );
                    println!("Known lists:  {}", cp.list_cache.len());
                    for (name, c) in &cp.report.lists {
                        println!(
                            "  {}: {} ({} completed, {} needs action)",
                            name, c.total, c.completed, c.needs_action
                        );
                    }
                }
            }
            match status.next_trigger {
                Some(at) => println!(
                    "Next batch:   {} ({} pending)",
                    at.to_rfc3339(),
                    status.pending_triggers
                ),
                None => println!("Next batch:   none scheduled"),
            }
        }
        "reset" => {
            controller.reset()?;
            println!("Export state cleared.");
        }
        other => {
            print_help("tasksheet");
            bail!("Unknown command '{}'", other);
        }
    }

    Ok(())
}
