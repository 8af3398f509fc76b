use crate::cli::ProcessingArgs;
use crate::exit_codes;
use pupil_rs::{PupilError, Task, TaskConfig};

/// Start from the task preset, apply the JSON config, then the flags.
pub fn build_config(task: Task, args: &ProcessingArgs) -> Result<TaskConfig, String> {
    let mut config = match args.config {
        Some(ref path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read config '{}': {}", path, e))?;
            let config = TaskConfig::for_task(task)
                .overlay_json(&json)
                .map_err(|e| format!("Config '{}': {}", path, e))?;
            if config.task != task {
                return Err(format!(
                    "Config '{}' is for task '{}', not '{}'",
                    path, config.task, task
                ));
            }
            config
        }
        None => TaskConfig::for_task(task),
    };

    if let Some(hi) = args.hi {
        config.deblink.hi = hi;
    }
    if let Some(lo) = args.lo {
        config.deblink.lo = lo;
    }
    if let Some(padding) = args.padding {
        config.deblink.padding = padding;
    }
    if let Some(width) = args.bin_width_ms {
        config.bin_width_ms = width;
    }
    if let Some(width) = args.quartile_width_ms {
        config.quartile_width_ms = Some(width);
    }
    if let Some(cutoff) = args.cutoff_hz {
        config.resample.cutoff_hz = cutoff;
    }
    if let Some(order) = args.filter_order {
        config.resample.filter_order = order;
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Exit code a failed subject reports
pub fn exit_code_for(error: &PupilError) -> i32 {
    match error {
        PupilError::FileNotFound(_)
        | PupilError::UnsupportedFileType(_)
        | PupilError::Ingestion(_)
        | PupilError::InvalidConfig(_) => exit_codes::INPUT_ERROR,
        PupilError::Segmentation(_) => exit_codes::SEGMENTATION_ERROR,
        PupilError::Io(_) | PupilError::Json(_) => exit_codes::EXECUTION_ERROR,
    }
}
