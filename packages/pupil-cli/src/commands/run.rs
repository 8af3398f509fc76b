use std::path::{Path, PathBuf};

use crate::cli::RunArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use pupil_rs::gazedata::read_session;
use pupil_rs::{process_session, PupilError, SubjectResult, TaskConfig};

/// Ingest and process one file. Nothing is written here.
pub fn process_file(path: &Path, config: &TaskConfig) -> Result<SubjectResult, PupilError> {
    let session = read_session(path)?;
    process_session(&session, config)
}

/// Output directory for a file: the explicit one, else the file's own
pub fn output_dir_for(file: &Path, output_dir: Option<&str>) -> PathBuf {
    match output_dir {
        Some(dir) => PathBuf::from(dir),
        None => file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

pub fn file_stem(file: &Path) -> &str {
    file.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
}

pub fn execute(args: RunArgs) -> i32 {
    let config = match params::build_config(args.task, &args.processing) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let path = Path::new(&args.file);
    if !args.quiet {
        eprintln!("Processing {} ({})...", args.file, args.task);
    }

    let result = match process_file(path, &config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return params::exit_code_for(&e);
        }
    };

    let dir = output_dir_for(path, args.output_dir.as_deref());
    let written = match output::write_subject_tables(
        &result,
        &config,
        &dir,
        file_stem(path),
        args.plot_request,
    ) {
        Ok(w) => w,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    if args.json {
        match output::to_json(&result, args.compact) {
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

    if !args.quiet {
        for excluded in &result.excluded {
            eprintln!("  Trial {} excluded: {}", excluded.trial, excluded.reason);
        }
        eprintln!(
            "Subject {}: {} trials, {} binned rows, {} file(s) written",
            result.subject,
            result.blink_table.len(),
            result.binned.len(),
            written.len()
        );
    }

    exit_codes::SUCCESS
}
