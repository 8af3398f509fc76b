//! Per-task processing configuration
//!
//! Every tunable of the pipeline lives here. Each task has a preset
//! (`TaskConfig::for_task`); callers may override any field, e.g. from a
//! JSON file, and must call [`TaskConfig::validate`] before processing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{PupilError, Result};
use crate::types::Condition;

/// Cognitive task a recording comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Fluency,
    Encoding,
    Recall,
}

impl Task {
    pub const ALL: [Task; 3] = [Task::Fluency, Task::Encoding, Task::Recall];

    pub fn name(&self) -> &'static str {
        match self {
            Task::Fluency => "fluency",
            Task::Encoding => "encoding",
            Task::Recall => "recall",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Task::Fluency => {
                "Verbal fluency: six marker-delimited trials, Letter then Category, 500ms bins"
            }
            Task::Encoding => {
                "Word-list encoding: trials separated by blank labels, Ready baseline, PlayWord response"
            }
            Task::Recall => {
                "Word-list recall: recall rows only, six positional baseline/response quadruples"
            }
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fluency" => Ok(Task::Fluency),
            "encoding" | "hvlt-encoding" => Ok(Task::Encoding),
            "recall" | "hvlt-recall" => Ok(Task::Recall),
            _ => Err(format!(
                "Unknown task '{}'. Valid tasks: fluency, encoding, recall",
                s
            )),
        }
    }
}

/// Largest accepted blink padding, in samples on each side
pub const MAX_PADDING: usize = 100;

/// Artifact (blink) detection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeblinkConfig {
    /// Largest plausible pupil diameter (mm)
    pub hi: f64,
    /// Smallest plausible pupil diameter (mm)
    pub lo: f64,
    /// Samples discarded on each side of a detected blink
    pub padding: usize,
}

impl Default for DeblinkConfig {
    fn default() -> Self {
        Self {
            hi: 5.0,
            lo: 2.0,
            padding: 2,
        }
    }
}

/// Uniform grid and low-pass filter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    /// Grid period in microseconds
    pub sample_period_us: i64,
    /// Low-pass cutoff in Hz
    pub cutoff_hz: f64,
    /// Butterworth order
    pub filter_order: usize,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            sample_period_us: 33_333,
            cutoff_hz: 4.0,
            filter_order: 3,
        }
    }
}

impl ResampleConfig {
    pub fn sample_rate(&self) -> f64 {
        1_000_000.0 / self.sample_period_us as f64
    }
}

/// Where the per-trial baseline is taken from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaselineWindow {
    /// Last `duration_ms` of the Baseline phase
    BaselineTail { duration_ms: u32 },
    /// First `duration_ms` of the Baseline phase
    BaselineHead { duration_ms: u32 },
    /// First `duration_ms` of the Response phase
    ResponseHead { duration_ms: u32 },
}

impl BaselineWindow {
    pub fn duration_us(&self) -> i64 {
        let ms = match self {
            BaselineWindow::BaselineTail { duration_ms }
            | BaselineWindow::BaselineHead { duration_ms }
            | BaselineWindow::ResponseHead { duration_ms } => *duration_ms,
        };
        i64::from(ms) * 1000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPrecision {
    /// `HH:MM:SS`
    Seconds,
    /// `HH:MM:SS.ffffff`
    Micros,
}

/// Marker labels of a marker-pair task grammar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerGrammar {
    pub baseline_start: String,
    pub baseline_stop: String,
    pub response_start: String,
    pub response_stop: String,
    pub trials: usize,
    /// Condition of each trial, in trial order
    pub conditions: Vec<Condition>,
}

impl MarkerGrammar {
    pub fn fluency() -> Self {
        Self {
            baseline_start: "ReadLetter".to_string(),
            baseline_stop: "BeginFile".to_string(),
            response_start: "RecordLetter".to_string(),
            response_stop: "RecordLetter".to_string(),
            trials: 6,
            conditions: default_conditions(),
        }
    }

    pub fn recall() -> Self {
        Self {
            baseline_start: "ReadRecall".to_string(),
            baseline_stop: "BeginRecall".to_string(),
            response_start: "RecordRecall".to_string(),
            response_stop: "RecordRecall".to_string(),
            trials: 6,
            conditions: default_conditions(),
        }
    }

    /// Number of boundary rows a well-formed stream contains
    pub fn expected_boundaries(&self) -> usize {
        self.trials * 4
    }
}

fn default_conditions() -> Vec<Condition> {
    vec![
        Condition::Letter,
        Condition::Letter,
        Condition::Letter,
        Condition::Category,
        Condition::Category,
        Condition::Category,
    ]
}

/// Labels of the blank-separated encoding grammar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingGrammar {
    pub baseline_label: String,
    pub response_pattern: String,
}

impl Default for EncodingGrammar {
    fn default() -> Self {
        Self {
            baseline_label: "Ready".to_string(),
            response_pattern: "PlayWord".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grammar {
    MarkerPair(MarkerGrammar),
    NullSeparated(EncodingGrammar),
    PositionalQuadruple {
        /// Only rows whose label contains this are segmented
        row_filter: String,
        markers: MarkerGrammar,
    },
}

/// Complete configuration for one task run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub task: Task,
    pub deblink: DeblinkConfig,
    pub resample: ResampleConfig,
    pub baseline: BaselineWindow,
    /// Output bin width in milliseconds
    pub bin_width_ms: u32,
    /// Coarse ("quartile") bin width in milliseconds
    pub quartile_width_ms: Option<u32>,
    pub timestamp_precision: TimestampPrecision,
    /// Whether output rows carry a Condition column
    pub report_condition: bool,
    pub grammar: Grammar,
}

impl TaskConfig {
    pub fn for_task(task: Task) -> Self {
        match task {
            Task::Fluency => Self {
                task,
                deblink: DeblinkConfig::default(),
                resample: ResampleConfig::default(),
                baseline: BaselineWindow::BaselineTail { duration_ms: 500 },
                bin_width_ms: 500,
                quartile_width_ms: None,
                timestamp_precision: TimestampPrecision::Micros,
                report_condition: false,
                grammar: Grammar::MarkerPair(MarkerGrammar::fluency()),
            },
            Task::Encoding => Self {
                task,
                deblink: DeblinkConfig {
                    hi: 4.0,
                    lo: 1.5,
                    ..DeblinkConfig::default()
                },
                resample: ResampleConfig::default(),
                baseline: BaselineWindow::BaselineTail { duration_ms: 500 },
                bin_width_ms: 1000,
                quartile_width_ms: Some(6000),
                timestamp_precision: TimestampPrecision::Seconds,
                report_condition: false,
                grammar: Grammar::NullSeparated(EncodingGrammar::default()),
            },
            Task::Recall => Self {
                task,
                deblink: DeblinkConfig::default(),
                resample: ResampleConfig::default(),
                baseline: BaselineWindow::BaselineHead { duration_ms: 2000 },
                bin_width_ms: 1000,
                quartile_width_ms: Some(15_000),
                timestamp_precision: TimestampPrecision::Seconds,
                report_condition: true,
                grammar: Grammar::PositionalQuadruple {
                    row_filter: "Recall".to_string(),
                    markers: MarkerGrammar::recall(),
                },
            },
        }
    }

    /// Parse a JSON config naming its `task`. Fields it leaves out keep
    /// that task's preset values.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        let task = match value.get("task") {
            Some(task) => Task::deserialize(task)?,
            None => {
                return Err(PupilError::InvalidConfig(
                    "config does not name its task".to_string(),
                ))
            }
        };
        Self::for_task(task).overlay(value)
    }

    /// Apply a (possibly partial) JSON config on top of `self`.
    ///
    /// Objects merge key by key; any other value replaces the current one.
    pub fn overlay_json(self, json: &str) -> Result<Self> {
        self.overlay(serde_json::from_str(json)?)
    }

    fn overlay(self, patch: Value) -> Result<Self> {
        if !patch.is_object() {
            return Err(PupilError::InvalidConfig(
                "config must be a JSON object".to_string(),
            ));
        }
        let mut merged = serde_json::to_value(&self)?;
        merge_json(&mut merged, patch);
        let config: TaskConfig = serde_json::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    pub fn bin_width_us(&self) -> i64 {
        i64::from(self.bin_width_ms) * 1000
    }

    pub fn quartile_width_us(&self) -> Option<i64> {
        self.quartile_width_ms.map(|ms| i64::from(ms) * 1000)
    }

    /// Reject nonsensical parameters before any data is touched.
    pub fn validate(&self) -> Result<()> {
        let d = &self.deblink;
        if !d.lo.is_finite() || !d.hi.is_finite() {
            return Err(PupilError::InvalidConfig(
                "pupil thresholds must be finite".to_string(),
            ));
        }
        if d.lo < 0.0 {
            return Err(PupilError::InvalidConfig(format!(
                "lower pupil threshold {} must not be negative",
                d.lo
            )));
        }
        if d.padding > MAX_PADDING {
            return Err(PupilError::InvalidConfig(format!(
                "blink padding {} exceeds the maximum of {} samples",
                d.padding, MAX_PADDING
            )));
        }
        if d.lo >= d.hi {
            return Err(PupilError::InvalidConfig(format!(
                "lower pupil threshold {} must be below upper threshold {}",
                d.lo, d.hi
            )));
        }

        let r = &self.resample;
        if r.sample_period_us <= 0 {
            return Err(PupilError::InvalidConfig(
                "sample period must be greater than 0".to_string(),
            ));
        }
        if r.filter_order == 0 || r.filter_order > 8 {
            return Err(PupilError::InvalidConfig(format!(
                "filter order {} is out of range [1, 8]",
                r.filter_order
            )));
        }
        let nyquist = r.sample_rate() / 2.0;
        if !(r.cutoff_hz > 0.0 && r.cutoff_hz < nyquist) {
            return Err(PupilError::InvalidConfig(format!(
                "cutoff {} Hz must lie in (0, {:.2}) Hz for a {} us grid",
                r.cutoff_hz, nyquist, r.sample_period_us
            )));
        }

        if self.baseline.duration_us() == 0 {
            return Err(PupilError::InvalidConfig(
                "baseline window must be longer than 0 ms".to_string(),
            ));
        }

        if self.bin_width_ms == 0 {
            return Err(PupilError::InvalidConfig(
                "bin width must be greater than 0".to_string(),
            ));
        }
        if self.bin_width_us() < r.sample_period_us {
            return Err(PupilError::InvalidConfig(format!(
                "bin width {} ms is shorter than the sample period",
                self.bin_width_ms
            )));
        }
        if let Some(q) = self.quartile_width_ms {
            if q == 0 || q % self.bin_width_ms != 0 {
                return Err(PupilError::InvalidConfig(format!(
                    "quartile width {} ms must be a positive multiple of bin width {} ms",
                    q, self.bin_width_ms
                )));
            }
        }

        match &self.grammar {
            Grammar::MarkerPair(m) => validate_markers(m)?,
            Grammar::PositionalQuadruple { row_filter, markers } => {
                if row_filter.is_empty() {
                    return Err(PupilError::InvalidConfig(
                        "recall row filter must not be empty".to_string(),
                    ));
                }
                validate_markers(markers)?;
                for label in [
                    &markers.baseline_start,
                    &markers.baseline_stop,
                    &markers.response_start,
                    &markers.response_stop,
                ] {
                    if !label.contains(row_filter.as_str()) {
                        return Err(PupilError::InvalidConfig(format!(
                            "marker '{}' would be removed by row filter '{}'",
                            label, row_filter
                        )));
                    }
                }
            }
            Grammar::NullSeparated(e) => {
                if e.baseline_label.is_empty() || e.response_pattern.is_empty() {
                    return Err(PupilError::InvalidConfig(
                        "encoding labels must not be empty".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn validate_markers(m: &MarkerGrammar) -> Result<()> {
    if m.trials == 0 {
        return Err(PupilError::InvalidConfig(
            "trial count must be greater than 0".to_string(),
        ));
    }
    if m.conditions.len() != m.trials {
        return Err(PupilError::InvalidConfig(format!(
            "{} conditions given for {} trials",
            m.conditions.len(),
            m.trials
        )));
    }
    Ok(())
}
