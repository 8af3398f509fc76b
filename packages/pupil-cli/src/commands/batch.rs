use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::cli::BatchArgs;
use crate::commands::run::{file_stem, output_dir_for, process_file};
use crate::exit_codes;
use crate::output;
use crate::params;
use pupil_rs::TaskConfig;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
enum Status {
    Ok,
    Failed,
    /// Not started because an earlier subject failed under `--fail-fast`
    Skipped,
}

#[derive(Debug, Serialize)]
struct SubjectOutcome {
    file: String,
    status: Status,
    subject: Option<String>,
    excluded_trials: Vec<u32>,
    outputs: Vec<PathBuf>,
    error: Option<String>,
    #[serde(skip)]
    exit_code: i32,
}

impl SubjectOutcome {
    fn new(file: &str, status: Status) -> Self {
        Self {
            file: file.to_string(),
            status,
            subject: None,
            excluded_trials: Vec::new(),
            outputs: Vec::new(),
            error: None,
            exit_code: exit_codes::SUCCESS,
        }
    }

    fn failed(file: &str, error: String, exit_code: i32) -> Self {
        Self {
            error: Some(error),
            exit_code,
            ..Self::new(file, Status::Failed)
        }
    }
}

fn process_one(file: &str, args: &BatchArgs, config: &TaskConfig) -> SubjectOutcome {
    let path = Path::new(file);
    let result = match process_file(path, config) {
        Ok(r) => r,
        Err(e) => return SubjectOutcome::failed(file, e.to_string(), params::exit_code_for(&e)),
    };

    let dir = output_dir_for(path, args.output_dir.as_deref());
    match output::write_subject_tables(&result, config, &dir, file_stem(path), args.plot_request) {
        Ok(outputs) => SubjectOutcome {
            subject: Some(result.subject.clone()),
            excluded_trials: result.excluded.iter().map(|e| e.trial).collect(),
            outputs,
            ..SubjectOutcome::new(file, Status::Ok)
        },
        Err(msg) => SubjectOutcome::failed(file, msg, exit_codes::EXECUTION_ERROR),
    }
}

pub fn execute(args: BatchArgs) -> i32 {
    let files = match resolve_files(&args) {
        Ok(f) => f,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if files.is_empty() {
        eprintln!("Error: No matching files found");
        return exit_codes::INPUT_ERROR;
    }

    if args.dry_run {
        for f in &files {
            println!("{}", f);
        }
        if !args.quiet {
            eprintln!("Found {} file(s)", files.len());
        }
        return exit_codes::SUCCESS;
    }

    let config = match params::build_config(args.task, &args.processing) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs.unwrap_or(0))
        .build()
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: Failed to start worker pool: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let total = files.len();
    let start_time = Instant::now();
    let abort = AtomicBool::new(false);

    let outcomes: Vec<SubjectOutcome> = pool.install(|| {
        files
            .par_iter()
            .map(|file| {
                if abort.load(Ordering::Relaxed) {
                    return SubjectOutcome::new(file, Status::Skipped);
                }
                let outcome = process_one(file, &args, &config);
                if outcome.status == Status::Failed && args.fail_fast {
                    abort.store(true, Ordering::Relaxed);
                }
                outcome
            })
            .collect()
    });

    let succeeded = outcomes.iter().filter(|o| o.status == Status::Ok).count();
    let failed = outcomes.iter().filter(|o| o.status == Status::Failed).count();

    if !args.quiet {
        for (i, o) in outcomes.iter().enumerate() {
            match o.status {
                Status::Ok => eprintln!("[{}/{}] {}: ok", i + 1, total, o.file),
                Status::Failed => eprintln!(
                    "[{}/{}] {}: {}",
                    i + 1,
                    total,
                    o.file,
                    o.error.as_deref().unwrap_or("failed")
                ),
                Status::Skipped => eprintln!("[{}/{}] {}: skipped", i + 1, total, o.file),
            }
        }
        eprintln!(
            "Batch complete: {}/{} succeeded, {}/{} failed, {:.1}s",
            succeeded,
            total,
            failed,
            total,
            start_time.elapsed().as_secs_f64()
        );
    }

    if args.json {
        match output::to_json(&outcomes, false) {
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
    }

    if failed == 0 {
        exit_codes::SUCCESS
    } else if succeeded > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        outcomes
            .iter()
            .find(|o| o.status == Status::Failed)
            .map_or(exit_codes::EXECUTION_ERROR, |o| o.exit_code)
    }
}

fn resolve_files(args: &BatchArgs) -> Result<Vec<String>, String> {
    if let Some(ref pattern) = args.glob {
        resolve_glob(pattern)
    } else if let Some(ref files) = args.files {
        Ok(files.clone())
    } else {
        Err("One of --glob or --files must be specified".to_string())
    }
}

fn resolve_glob(pattern: &str) -> Result<Vec<String>, String> {
    let paths = glob::glob(pattern)
        .map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))?;

    let mut files: Vec<String> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    if let Some(s) = path.to_str() {
                        files.push(s.to_string());
                    }
                }
            }
            Err(e) => {
                log::warn!("glob error: {}", e);
            }
        }
    }
    files.sort();
    Ok(files)
}
