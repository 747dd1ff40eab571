// File: ./src/cli.rs
//! Shared command-line interface logic, like printing help.

pub fn print_help(binary_name: &str) {
    println!(
        "Tasksheet v{} - Resumable batch export of task spreadsheets",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("USAGE:");
    println!("    {} [--root <path>] [--verbose] <command>", binary_name);
    println!();
    println!("COMMANDS:");
    println!("    import <export.json> [--sheet <path>]   Build a sheet from a task-list export");
    println!("    export [--sheet <path>]                 Start a new export run (first batch)");
    println!("    continue                                Run the next batch now");
    println!("    tick                                    Run the next batch if it is due");
    println!("    watch                                   Run batches as they come due until done");
    println!("    status                                  Show the checkpoint and pending batch");
    println!("    reset                                   Forget the current run");
    println!("    help                                    Show this help message");
    println!();
    println!("OPTIONS:");
    println!("    -r, --root <path>     Use a different directory for config and data.");
    println!("    -v, --verbose         Log every row.");
    println!("    -h, --help            Show this help message.");
    println!();
    println!("SCHEDULING:");
    println!("    Each batch leaves one pending continuation behind. Either keep");
    println!("    `{} watch` running, or call `{} tick` from cron:", binary_name, binary_name);
    println!("        * * * * *  {} tick", binary_name);
    println!();
    println!("SHEET COLUMNS:");
    println!("    title (required), id, status, due, links, list");
    println!("    Rows whose title starts with \"List:\" open a new task list.");
}
