use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

fn pupilproc() -> Command {
    Command::cargo_bin("pupilproc").unwrap()
}

const HEADER: &str = "TETTime\tSubject\tSession\tDiameterPupilLeftEye\tDiameterPupilRightEye\tValidityLeftEye\tValidityRightEye\tCurrentObject\n";

/// Fluency export with `trials` trials of 10 samples, 100 ms apart.
/// The fifth sample of trial 1 is a blink.
fn write_fluency(dir: &Path, name: &str, trials: usize) -> PathBuf {
    let layout = [
        "ReadLetter",
        "ReadLetter",
        "ReadLetter",
        "BeginFile",
        "BeginFile",
        "RecordLetter",
        "RecordLetter",
        "RecordLetter",
        "RecordLetter",
        "RecordLetter",
    ];
    let mut text = String::from(HEADER);
    for trial in 0..trials {
        for (i, label) in layout.iter().enumerate() {
            let t = 1000 + (trial * layout.len() + i) * 100;
            let (d, v) = if trial == 0 && i == 4 { (0.0, 4) } else { (4.0, 0) };
            text.push_str(&format!("{}\t101\t1\t{}\t{}\t{}\t{}\t{}\n", t, d, d, v, v, label));
        }
    }
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn read_csv(path: &Path) -> Vec<Vec<String>> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.split(',').map(str::to_string).collect())
        .collect()
}

#[test]
fn test_run_fluency_writes_tables() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fluency(dir.path(), "Fluency_101.gazedata", 6);
    let out = dir.path().join("out");

    pupilproc()
        .args(["run", "--task", "fluency", "--plot-request", "--quiet", "--file"])
        .arg(&input)
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .success();

    let blink = read_csv(&out.join("Fluency_101_BlinkPct.csv"));
    assert_eq!(blink[0], vec!["Subject", "Session", "Trial", "BlinkPct"]);
    assert_eq!(blink.len(), 7);
    assert_eq!(blink[1], vec!["101", "1", "1", "0.1"]);

    let pupil = read_csv(&out.join("Fluency_101_ProcessedPupil.csv"));
    assert_eq!(
        pupil[0],
        vec!["Subject", "Session", "Trial", "Timestamp", "Dilation", "Baseline", "Diameter", "BlinkPct"]
    );
    for row in &pupil[1..] {
        assert_eq!(row[3], "00:00:00.500000");
        let dilation: f64 = row[4].parse().unwrap();
        assert!(dilation.abs() < 1e-9);
    }

    assert!(!out.join("Fluency_101_ProcessedPupil_Quartiles.csv").exists());
    assert!(out.join("Fluency_101_PlotRequest.json").exists());
}

#[test]
fn test_run_json_summary() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fluency(dir.path(), "s.gazedata", 6);

    let output = pupilproc()
        .args(["run", "--task", "fluency", "--json", "--quiet", "--file"])
        .arg(&input)
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["subject"], "101");
    assert_eq!(parsed["task"], "fluency");
    assert_eq!(parsed["blink_table"].as_array().unwrap().len(), 6);
    assert!(parsed["excluded"].as_array().unwrap().is_empty());

    // default output location is next to the input
    assert!(dir.path().join("s_ProcessedPupil.csv").exists());
}

#[test]
fn test_malformed_fluency_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fluency(dir.path(), "short.gazedata", 5);

    pupilproc()
        .args(["run", "--task", "fluency", "--file"])
        .arg(&input)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Malformed input stream"));

    let written: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".csv"))
        .collect();
    assert!(written.is_empty());
}

#[test]
fn test_bin_width_override() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fluency(dir.path(), "s.gazedata", 6);

    pupilproc()
        .args(["run", "--task", "fluency", "--quiet", "--bin-width-ms", "250", "--file"])
        .arg(&input)
        .assert()
        .success();

    let pupil = read_csv(&dir.path().join("s_ProcessedPupil.csv"));
    // 400 ms of response in 250 ms bins
    assert_eq!(pupil.len(), 1 + 6 * 2);
    assert_eq!(pupil[2][3], "00:00:00.500000");
}

#[test]
fn test_batch_continues_past_bad_subject() {
    let dir = tempfile::tempdir().unwrap();
    write_fluency(dir.path(), "a.gazedata", 6);
    write_fluency(dir.path(), "b.gazedata", 5);
    write_fluency(dir.path(), "c.gazedata", 6);
    let out = dir.path().join("out");

    let output = pupilproc()
        .args(["batch", "--task", "fluency", "--json", "--quiet", "--glob"])
        .arg(format!("{}/*.gazedata", dir.path().display()))
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .code(4);

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let statuses: Vec<&str> = parsed
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["ok", "failed", "ok"]);

    assert!(out.join("a_ProcessedPupil.csv").exists());
    assert!(!out.join("b_ProcessedPupil.csv").exists());
    assert!(out.join("c_ProcessedPupil.csv").exists());
}

#[test]
fn test_batch_bad_first_subject_does_not_stop_later_ones() {
    let dir = tempfile::tempdir().unwrap();
    write_fluency(dir.path(), "a_bad.gazedata", 5);
    write_fluency(dir.path(), "b_good.gazedata", 6);

    let output = pupilproc()
        .args(["batch", "--task", "fluency", "--jobs", "1", "--json", "--quiet", "--glob"])
        .arg(format!("{}/*.gazedata", dir.path().display()))
        .assert()
        .code(4);

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed[0]["status"], "failed");
    assert_eq!(parsed[1]["status"], "ok");
    assert!(dir.path().join("b_good_ProcessedPupil.csv").exists());
}

#[test]
fn test_batch_fail_fast_skips_remaining_subjects() {
    let dir = tempfile::tempdir().unwrap();
    write_fluency(dir.path(), "a_bad.gazedata", 5);
    write_fluency(dir.path(), "b_good.gazedata", 6);

    let output = pupilproc()
        .args(["batch", "--task", "fluency", "--jobs", "1", "--fail-fast", "--json", "--quiet", "--glob"])
        .arg(format!("{}/*.gazedata", dir.path().display()))
        .assert()
        .code(2);

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed[1]["status"], "skipped");
    assert!(!dir.path().join("b_good_ProcessedPupil.csv").exists());
}

#[test]
fn test_batch_all_failing_reports_first_error() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fluency(dir.path(), "a.gazedata", 4);

    pupilproc()
        .args(["batch", "--task", "fluency", "--quiet", "--files"])
        .arg(&a)
        .assert()
        .code(2);
}
