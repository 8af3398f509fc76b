use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use pupil_rs::gazedata::{check_file, missing_columns};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ValidateOutput {
    file: String,
    exists: bool,
    supported: bool,
    missing_columns: Vec<&'static str>,
    size_bytes: Option<u64>,
    error: Option<String>,
}

pub fn execute(args: ValidateArgs) -> i32 {
    let path = Path::new(&args.file);
    let exists = path.is_file();

    let checked = check_file(path);
    let supported = checked.is_ok();
    let size_bytes = if exists {
        std::fs::metadata(path).ok().map(|m| m.len())
    } else {
        None
    };

    let (missing, error) = match checked.and_then(|_| missing_columns(path)) {
        Ok(missing) if missing.is_empty() => (missing, None),
        Ok(missing) => {
            let msg = format!("Missing required columns: {}", missing.join(", "));
            (missing, Some(msg))
        }
        Err(e) => (Vec::new(), Some(e.to_string())),
    };

    let result = ValidateOutput {
        file: args.file.clone(),
        exists,
        supported,
        missing_columns: missing,
        size_bytes,
        error: error.clone(),
    };

    if args.json {
        match output::to_json(&result, false) {
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
    } else if let Some(ref err) = error {
        eprintln!("Error: {}", err);
    } else {
        println!(
            "File '{}' is valid ({} bytes)",
            args.file,
            size_bytes.unwrap_or(0)
        );
    }

    if error.is_some() {
        exit_codes::INPUT_ERROR
    } else {
        exit_codes::SUCCESS
    }
}
