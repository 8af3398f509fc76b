use crate::cli::TasksArgs;
use crate::exit_codes;
use crate::output;
use pupil_rs::config::{BaselineWindow, Grammar};
use pupil_rs::{Task, TaskConfig};
use serde::Serialize;

#[derive(Serialize)]
struct TaskInfo {
    name: &'static str,
    description: &'static str,
    config: TaskConfig,
}

fn grammar_name(grammar: &Grammar) -> &'static str {
    match grammar {
        Grammar::MarkerPair(_) => "marker-pair",
        Grammar::NullSeparated(_) => "null-separated",
        Grammar::PositionalQuadruple { .. } => "positional-quadruple",
    }
}

fn baseline_name(window: &BaselineWindow) -> String {
    let (which, ms) = match window {
        BaselineWindow::BaselineTail { duration_ms } => ("last", duration_ms),
        BaselineWindow::BaselineHead { duration_ms } => ("first", duration_ms),
        BaselineWindow::ResponseHead { duration_ms } => ("response first", duration_ms),
    };
    format!("{} {}ms", which, ms)
}

pub fn execute(args: TasksArgs) -> i32 {
    let tasks: Vec<TaskInfo> = Task::ALL
        .iter()
        .map(|&t| TaskInfo {
            name: t.name(),
            description: t.description(),
            config: TaskConfig::for_task(t),
        })
        .collect();

    if args.json {
        match output::to_json(&tasks, false) {
            Ok(json) => {
                if let Err(e) = output::write_output(&json, None) {
                    eprintln!("Error: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    } else {
        println!("Supported tasks:\n");
        println!(
            "  {:<10} {:<22} {:<10} {:<8} {:<10} {:<16}",
            "Task", "Segmentation", "Pupil mm", "Bin ms", "Quartile", "Baseline"
        );
        println!("  {}", "-".repeat(80));
        for t in &tasks {
            let c = &t.config;
            println!(
                "  {:<10} {:<22} {:<10} {:<8} {:<10} {:<16}",
                t.name,
                grammar_name(&c.grammar),
                format!("{}-{}", c.deblink.lo, c.deblink.hi),
                c.bin_width_ms,
                c.quartile_width_ms
                    .map(|q| q.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                baseline_name(&c.baseline)
            );
        }
        println!();
        for t in &tasks {
            println!("  {}: {}", t.name, t.description);
        }
    }

    exit_codes::SUCCESS
}
