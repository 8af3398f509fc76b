use std::io::Write;
use std::path::{Path, PathBuf};

use pupil_rs::config::TimestampPrecision;
use pupil_rs::timefmt::format_elapsed;
use pupil_rs::{BinnedRow, PlotRequest, SubjectResult, TaskConfig};

/// Write JSON string to stdout or a file.
pub fn write_output(json: &str, output_path: Option<&str>) -> Result<(), String> {
    match output_path {
        Some(path) => std::fs::write(Path::new(path), json)
            .map_err(|e| format!("Failed to write output file '{}': {}", path, e)),
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .map_err(|e| format!("Failed to write to stdout: {}", e))
        }
    }
}

/// Serialize a value to JSON (pretty or compact).
pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, String> {
    if compact {
        serde_json::to_string(value).map_err(|e| format!("JSON serialization failed: {}", e))
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| format!("JSON serialization failed: {}", e))
    }
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_error(path: &Path, e: impl std::fmt::Display) -> String {
    format!("Failed to write '{}': {}", path.display(), e)
}

fn write_blink_table(result: &SubjectResult, with_condition: bool, path: &Path) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;

    let mut header = vec!["Subject", "Session", "Trial"];
    if with_condition {
        header.push("Condition");
    }
    header.push("BlinkPct");
    writer.write_record(&header).map_err(|e| csv_error(path, e))?;

    for row in &result.blink_table {
        let mut record = vec![
            result.subject.clone(),
            result.session.clone(),
            row.trial.to_string(),
        ];
        if with_condition {
            record.push(row.condition.map(|c| c.to_string()).unwrap_or_default());
        }
        record.push(row.blink_fraction.to_string());
        writer.write_record(&record).map_err(|e| csv_error(path, e))?;
    }

    writer.flush().map_err(|e| csv_error(path, e))
}

fn write_binned_table(
    result: &SubjectResult,
    rows: &[BinnedRow],
    with_condition: bool,
    precision: TimestampPrecision,
    path: &Path,
) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;

    let mut header = vec!["Subject", "Session", "Trial"];
    if with_condition {
        header.push("Condition");
    }
    header.extend(["Timestamp", "Dilation", "Baseline", "Diameter", "BlinkPct"]);
    writer.write_record(&header).map_err(|e| csv_error(path, e))?;

    for row in rows {
        let mut record = vec![
            result.subject.clone(),
            result.session.clone(),
            row.trial.to_string(),
        ];
        if with_condition {
            record.push(row.condition.map(|c| c.to_string()).unwrap_or_default());
        }
        record.extend([
            format_elapsed(row.bin_end_us, precision),
            cell(row.dilation),
            cell(row.baseline),
            cell(row.diameter),
            cell(row.blink),
        ]);
        writer.write_record(&record).map_err(|e| csv_error(path, e))?;
    }

    writer.flush().map_err(|e| csv_error(path, e))
}

/// Write a subject's tables into `dir`, returning the paths written.
pub fn write_subject_tables(
    result: &SubjectResult,
    config: &TaskConfig,
    dir: &Path,
    stem: &str,
    plot_request: bool,
) -> Result<Vec<PathBuf>, String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create output directory '{}': {}", dir.display(), e))?;

    let mut written = Vec::new();
    let with_condition = config.report_condition;

    let blink_path = dir.join(format!("{}_BlinkPct.csv", stem));
    write_blink_table(result, with_condition, &blink_path)?;
    written.push(blink_path);

    let pupil_path = dir.join(format!("{}_ProcessedPupil.csv", stem));
    write_binned_table(
        result,
        &result.binned,
        with_condition,
        config.timestamp_precision,
        &pupil_path,
    )?;
    written.push(pupil_path);

    if let Some(ref quartiles) = result.quartiles {
        let path = dir.join(format!("{}_ProcessedPupil_Quartiles.csv", stem));
        write_binned_table(
            result,
            quartiles,
            with_condition,
            config.timestamp_precision,
            &path,
        )?;
        written.push(path);
    }

    if plot_request {
        let path = dir.join(format!("{}_PlotRequest.json", stem));
        let json = to_json(&PlotRequest::for_subject(result), false)?;
        write_output(&json, path.to_str())?;
        written.push(path);
    }

    for path in &written {
        log::info!("Wrote {}", path.display());
    }

    Ok(written)
}
