use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PupilError, Result};

/// One gaze-tracker reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Session-relative time in microseconds
    pub timestamp_us: i64,
    pub left_diameter: f64,
    pub right_diameter: f64,
    pub left_blink: bool,
    pub right_blink: bool,
    /// Active task object; `None` between task events
    pub current_object: Option<String>,
}

impl RawSample {
    pub fn label(&self) -> Option<&str> {
        self.current_object.as_deref()
    }
}

/// A complete recording for one subject and session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSession {
    pub subject: String,
    pub session: String,
    pub samples: Vec<RawSample>,
}

impl RawSession {
    /// Build a session, rejecting samples that go back in time.
    pub fn new(subject: String, session: String, samples: Vec<RawSample>) -> Result<Self> {
        if let Some(pos) = samples
            .windows(2)
            .position(|w| w[1].timestamp_us < w[0].timestamp_us)
        {
            return Err(PupilError::Ingestion(format!(
                "timestamps decrease at row {} ({} -> {})",
                pos + 1,
                samples[pos].timestamp_us,
                samples[pos + 1].timestamp_us
            )));
        }

        Ok(Self {
            subject,
            session,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Task condition of a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Letter,
    Category,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Letter => write!(f, "Letter"),
            Condition::Category => write!(f, "Category"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialPhase {
    Baseline,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Boundary {
    Start,
    Stop,
}

/// A detected boundary in the raw stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialEvent {
    /// 1-based, dense
    pub trial: u32,
    pub condition: Option<Condition>,
    pub phase: TrialPhase,
    pub boundary: Boundary,
    pub timestamp_us: i64,
    /// Row in the session the boundary sits on
    pub row: usize,
}

/// A session row assigned to a trial, with its phase if it lies inside one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRow {
    pub index: usize,
    pub phase: Option<TrialPhase>,
}

/// Raw-sample sub-range of one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialWindow {
    pub trial: u32,
    pub condition: Option<Condition>,
    pub rows: Vec<WindowRow>,
}

impl TrialWindow {
    pub fn phase_rows(&self, phase: TrialPhase) -> impl Iterator<Item = &WindowRow> {
        self.rows.iter().filter(move |r| r.phase == Some(phase))
    }

    /// Copy the window's samples out of the session, in row order.
    pub fn samples<'a>(&'a self, session: &'a RawSession) -> impl Iterator<Item = &'a RawSample> + 'a {
        self.rows.iter().map(move |r| &session.samples[r.index])
    }
}

/// One point of a conditioned, uniformly sampled trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionedPoint {
    /// Grid label (bin end) relative to the trial's first sample
    pub elapsed_us: i64,
    /// Low-pass filtered diameter
    pub diameter: f64,
    /// Fraction of contributing raw samples that were blinks; `None` if no samples
    pub blink: Option<f64>,
    /// Raw samples that fell into this grid bin
    pub samples: usize,
    /// Of those, samples that were valid before interpolation
    pub valid_samples: usize,
    pub phase: Option<TrialPhase>,
    pub label: Option<String>,
}

impl ConditionedPoint {
    pub fn is_observed(&self) -> bool {
        self.samples > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionedTrial {
    pub trial: u32,
    pub condition: Option<Condition>,
    pub points: Vec<ConditionedPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DilationPoint {
    /// Time since response onset
    pub elapsed_us: i64,
    pub diameter: f64,
    pub dilation: f64,
    pub blink: Option<f64>,
    /// False for grid points inside the response span that no raw sample
    /// fell into; they carry interpolated values and are left out of bins
    pub observed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DilationTrial {
    pub trial: u32,
    pub condition: Option<Condition>,
    pub baseline: f64,
    pub points: Vec<DilationPoint>,
}

/// One (trial x time bin) summary row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedRow {
    pub trial: u32,
    pub condition: Option<Condition>,
    /// Bin label: its end time, relative to response onset
    pub bin_end_us: i64,
    pub dilation: Option<f64>,
    pub baseline: Option<f64>,
    pub diameter: Option<f64>,
    pub blink: Option<f64>,
    /// Observed points that contributed to the means
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBlink {
    pub trial: u32,
    pub condition: Option<Condition>,
    pub blink_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedTrial {
    pub trial: u32,
    pub reason: crate::error::TrialError,
}

/// Everything the pipeline derives from one subject's session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectResult {
    pub id: String,
    pub subject: String,
    pub session: String,
    pub task: crate::config::Task,
    pub blink_table: Vec<TrialBlink>,
    pub binned: Vec<BinnedRow>,
    pub quartiles: Option<Vec<BinnedRow>>,
    pub excluded: Vec<ExcludedTrial>,
    pub created_at: String,
}

impl SubjectResult {
    pub fn new(subject: String, session: String, task: crate::config::Task) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject,
            session,
            task,
            blink_table: Vec::new(),
            binned: Vec::new(),
            quartiles: None,
            excluded: Vec::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_quartiles(mut self, quartiles: Vec<BinnedRow>) -> Self {
        self.quartiles = Some(quartiles);
        self
    }
}
