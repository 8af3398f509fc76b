//! Trial segmentation
//!
//! Turns a raw session into ordered, non-overlapping [`TrialWindow`]s with
//! Baseline/Response phase tags. Each task has its own grammar:
//!
//! - [`MarkerPairSegmenter`]: label transitions into fixed start/stop markers
//!   (verbal fluency).
//! - [`NullSeparatedSegmenter`]: runs of non-empty labels separated by blank
//!   rows (word-list encoding).
//! - [`PositionalQuadrupleSegmenter`]: marker detection on a pre-filtered
//!   stream, four boundary timestamps per trial (word-list recall).
//!
//! A stream that does not match its grammar is rejected as a whole; no
//! partial trial list is ever returned.

use crate::config::{EncodingGrammar, Grammar, MarkerGrammar};
use crate::error::{PupilError, Result};
use crate::types::{Boundary, RawSample, RawSession, TrialEvent, TrialPhase, TrialWindow, WindowRow};

/// Produces trial windows from a raw session
pub trait TrialSegmenter {
    fn name(&self) -> &'static str;

    fn segment(&self, session: &RawSession) -> Result<Vec<TrialWindow>>;
}

/// Build the segmenter matching a configured grammar
pub fn segmenter_for(grammar: &Grammar) -> Box<dyn TrialSegmenter> {
    match grammar {
        Grammar::MarkerPair(markers) => Box::new(MarkerPairSegmenter::new(markers.clone())),
        Grammar::NullSeparated(labels) => Box::new(NullSeparatedSegmenter::new(labels.clone())),
        Grammar::PositionalQuadruple { row_filter, markers } => Box::new(
            PositionalQuadrupleSegmenter::new(row_filter.clone(), markers.clone()),
        ),
    }
}

/// Label of a sample, treating blank text as absent
fn label(sample: &RawSample) -> Option<&str> {
    sample
        .current_object
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
}

fn malformed(msg: String) -> PupilError {
    PupilError::Segmentation(msg)
}

/// Detect the trial event table of a marker-pair grammar.
///
/// `rows` selects (in order) the session rows taking part; labels are
/// compared against the previous/next non-empty label among those rows.
pub fn detect_trial_events(
    session: &RawSession,
    rows: &[usize],
    grammar: &MarkerGrammar,
) -> Result<Vec<TrialEvent>> {
    let labels: Vec<Option<&str>> = rows.iter().map(|&i| label(&session.samples[i])).collect();

    // (position in `rows`, boundary)
    let mut candidates: Vec<(usize, Boundary)> = Vec::new();

    let mut previous: Option<&str> = None;
    for (pos, current) in labels.iter().enumerate() {
        if let Some(l) = *current {
            if previous != Some(l) && (l == grammar.baseline_start || l == grammar.response_start) {
                candidates.push((pos, Boundary::Start));
            }
            previous = Some(l);
        }
    }

    let mut next: Option<&str> = None;
    for (pos, current) in labels.iter().enumerate().rev() {
        if let Some(l) = *current {
            if next != Some(l) && (l == grammar.baseline_stop || l == grammar.response_stop) {
                candidates.push((pos, Boundary::Stop));
            }
            next = Some(l);
        }
    }

    // Start sorts before Stop on the same row
    candidates.sort_by_key(|&(pos, boundary)| (pos, boundary == Boundary::Stop));

    let expected = grammar.expected_boundaries();
    if candidates.len() != expected {
        return Err(malformed(format!(
            "expected {} boundary rows ({} trials x 2 phases x start/stop), found {}",
            expected,
            grammar.trials,
            candidates.len()
        )));
    }

    let layout = [
        (TrialPhase::Baseline, Boundary::Start, grammar.baseline_start.as_str()),
        (TrialPhase::Baseline, Boundary::Stop, grammar.baseline_stop.as_str()),
        (TrialPhase::Response, Boundary::Start, grammar.response_start.as_str()),
        (TrialPhase::Response, Boundary::Stop, grammar.response_stop.as_str()),
    ];

    let mut events = Vec::with_capacity(expected);
    let mut last_stop: Option<i64> = None;

    for (t, quad) in candidates.chunks(4).enumerate() {
        let trial = t as u32 + 1;
        let condition = grammar.conditions.get(t).copied();

        for (&(pos, boundary), &(phase, want_boundary, want_label)) in quad.iter().zip(layout.iter()) {
            let row = rows[pos];
            let found = labels[pos].unwrap_or("");
            if boundary != want_boundary || found != want_label {
                return Err(malformed(format!(
                    "trial {}: expected {:?} {:?} on '{}' but found {:?} on '{}' at row {}",
                    trial, phase, want_boundary, want_label, boundary, found, row
                )));
            }
            events.push(TrialEvent {
                trial,
                condition,
                phase,
                boundary,
                timestamp_us: session.samples[row].timestamp_us,
                row,
            });
        }

        let quad_events = &events[events.len() - 4..];
        for pair in quad_events.chunks(2) {
            if pair[0].timestamp_us >= pair[1].timestamp_us {
                return Err(malformed(format!(
                    "trial {} {:?} phase starts at {} us but stops at {} us",
                    trial, pair[0].phase, pair[0].timestamp_us, pair[1].timestamp_us
                )));
            }
        }
        if quad_events[1].timestamp_us > quad_events[2].timestamp_us {
            return Err(malformed(format!(
                "trial {} response starts before its baseline stops",
                trial
            )));
        }
        if let Some(stop) = last_stop {
            if quad_events[0].timestamp_us <= stop {
                return Err(malformed(format!(
                    "trial {} starts before trial {} stops",
                    trial,
                    trial - 1
                )));
            }
        }
        last_stop = Some(quad_events[3].timestamp_us);
    }

    log::debug!(
        "Detected {} trial events for {} trials",
        events.len(),
        grammar.trials
    );

    Ok(events)
}

fn phase_at(t: i64, quad: &[TrialEvent]) -> Option<TrialPhase> {
    if t >= quad[0].timestamp_us && t <= quad[1].timestamp_us {
        Some(TrialPhase::Baseline)
    } else if t >= quad[2].timestamp_us && t <= quad[3].timestamp_us {
        Some(TrialPhase::Response)
    } else {
        None
    }
}

/// Verbal fluency: fixed marker pairs over the whole stream
pub struct MarkerPairSegmenter {
    grammar: MarkerGrammar,
}

impl MarkerPairSegmenter {
    pub fn new(grammar: MarkerGrammar) -> Self {
        Self { grammar }
    }
}

impl TrialSegmenter for MarkerPairSegmenter {
    fn name(&self) -> &'static str {
        "marker-pair"
    }

    fn segment(&self, session: &RawSession) -> Result<Vec<TrialWindow>> {
        let rows: Vec<usize> = (0..session.len()).collect();
        let events = detect_trial_events(session, &rows, &self.grammar)?;

        let windows = events
            .chunks(4)
            .map(|quad| {
                let (first, last) = (quad[0].row, quad[3].row);
                let rows = (first..=last)
                    .map(|index| {
                        let phase = if index <= quad[1].row {
                            Some(TrialPhase::Baseline)
                        } else if index >= quad[2].row {
                            Some(TrialPhase::Response)
                        } else {
                            None
                        };
                        WindowRow { index, phase }
                    })
                    .collect();
                TrialWindow {
                    trial: quad[0].trial,
                    condition: quad[0].condition,
                    rows,
                }
            })
            .collect();

        Ok(windows)
    }
}

/// Word-list encoding: trials are runs of non-empty labels
pub struct NullSeparatedSegmenter {
    grammar: EncodingGrammar,
}

impl NullSeparatedSegmenter {
    pub fn new(grammar: EncodingGrammar) -> Self {
        Self { grammar }
    }

    fn phase_of(&self, label: &str) -> Option<TrialPhase> {
        if label == self.grammar.baseline_label {
            Some(TrialPhase::Baseline)
        } else if label.contains(self.grammar.response_pattern.as_str()) {
            Some(TrialPhase::Response)
        } else {
            None
        }
    }
}

impl TrialSegmenter for NullSeparatedSegmenter {
    fn name(&self) -> &'static str {
        "null-separated"
    }

    fn segment(&self, session: &RawSession) -> Result<Vec<TrialWindow>> {
        let mut runs: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();

        for (index, sample) in session.samples.iter().enumerate() {
            if label(sample).is_some() {
                current.push(index);
            } else if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            runs.push(current);
        }

        if runs.is_empty() {
            return Err(malformed("no labelled rows in stream".to_string()));
        }

        let mut windows = Vec::with_capacity(runs.len());
        for (n, run) in runs.into_iter().enumerate() {
            let trial = n as u32 + 1;
            // Everything that is neither baseline nor response is noise
            let rows: Vec<WindowRow> = run
                .into_iter()
                .filter_map(|index| {
                    let phase = label(&session.samples[index]).and_then(|l| self.phase_of(l))?;
                    Some(WindowRow {
                        index,
                        phase: Some(phase),
                    })
                })
                .collect();

            if !rows.iter().any(|r| r.phase == Some(TrialPhase::Response)) {
                return Err(malformed(format!(
                    "trial {} has no '{}' rows",
                    trial, self.grammar.response_pattern
                )));
            }

            windows.push(TrialWindow {
                trial,
                condition: None,
                rows,
            });
        }

        log::debug!("Partitioned stream into {} encoding trials", windows.len());

        Ok(windows)
    }
}

/// Word-list recall: pre-filtered stream, four positional boundaries per trial
pub struct PositionalQuadrupleSegmenter {
    row_filter: String,
    grammar: MarkerGrammar,
}

impl PositionalQuadrupleSegmenter {
    pub fn new(row_filter: String, grammar: MarkerGrammar) -> Self {
        Self { row_filter, grammar }
    }

    /// Rows whose label contains the task substring
    pub fn filtered_rows(&self, session: &RawSession) -> Vec<usize> {
        session
            .samples
            .iter()
            .enumerate()
            .filter(|(_, s)| label(s).is_some_and(|l| l.contains(self.row_filter.as_str())))
            .map(|(i, _)| i)
            .collect()
    }
}

impl TrialSegmenter for PositionalQuadrupleSegmenter {
    fn name(&self) -> &'static str {
        "positional-quadruple"
    }

    fn segment(&self, session: &RawSession) -> Result<Vec<TrialWindow>> {
        let rows = self.filtered_rows(session);
        if rows.is_empty() {
            return Err(malformed(format!(
                "no rows labelled with '{}'",
                self.row_filter
            )));
        }

        let events = detect_trial_events(session, &rows, &self.grammar)?;

        let windows = events
            .chunks(4)
            .map(|quad| {
                let (start, stop) = (quad[0].timestamp_us, quad[3].timestamp_us);
                let rows = rows
                    .iter()
                    .copied()
                    .filter(|&i| {
                        let t = session.samples[i].timestamp_us;
                        t >= start && t <= stop
                    })
                    .map(|index| WindowRow {
                        index,
                        phase: phase_at(session.samples[index].timestamp_us, quad),
                    })
                    .collect();
                TrialWindow {
                    trial: quad[0].trial,
                    condition: quad[0].condition,
                    rows,
                }
            })
            .collect();

        Ok(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Condition;

    fn session_from_labels(labels: &[Option<&str>]) -> RawSession {
        let samples = labels
            .iter()
            .enumerate()
            .map(|(i, l)| RawSample {
                timestamp_us: i as i64 * 100_000,
                left_diameter: 4.0,
                right_diameter: 4.0,
                left_blink: false,
                right_blink: false,
                current_object: l.map(str::to_string),
            })
            .collect();
        RawSession::new("S1".to_string(), "1".to_string(), samples).unwrap()
    }

    fn fluency_labels(trials: usize) -> Vec<Option<&'static str>> {
        let mut labels = vec![Some("Instructions")];
        for _ in 0..trials {
            labels.extend([
                Some("ReadLetter"),
                Some("ReadLetter"),
                Some("BeginFile"),
                Some("BeginFile"),
                Some("RecordLetter"),
                Some("RecordLetter"),
                Some("RecordLetter"),
                Some("Rest"),
            ]);
        }
        labels
    }

    #[test]
    fn test_fluency_six_trials() {
        let session = session_from_labels(&fluency_labels(6));
        let windows = MarkerPairSegmenter::new(MarkerGrammar::fluency())
            .segment(&session)
            .unwrap();

        assert_eq!(windows.len(), 6);
        assert_eq!(windows[0].trial, 1);
        assert_eq!(windows[0].condition, Some(Condition::Letter));
        assert_eq!(windows[3].condition, Some(Condition::Category));

        // ReadLetter x2, BeginFile x2, RecordLetter x3; Rest is outside
        assert_eq!(windows[0].rows.len(), 7);
        assert_eq!(windows[0].phase_rows(TrialPhase::Baseline).count(), 4);
        assert_eq!(windows[0].phase_rows(TrialPhase::Response).count(), 3);
    }

    #[test]
    fn test_fluency_windows_do_not_overlap() {
        let session = session_from_labels(&fluency_labels(6));
        let windows = MarkerPairSegmenter::new(MarkerGrammar::fluency())
            .segment(&session)
            .unwrap();

        let mut seen = std::collections::HashSet::new();
        for w in &windows {
            for r in &w.rows {
                assert!(seen.insert(r.index), "row {} in two windows", r.index);
            }
        }
    }

    #[test]
    fn test_fluency_wrong_boundary_count_fails() {
        let session = session_from_labels(&fluency_labels(5));
        let err = MarkerPairSegmenter::new(MarkerGrammar::fluency())
            .segment(&session)
            .unwrap_err();
        match err {
            PupilError::Segmentation(msg) => assert!(msg.contains("found 20")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fluency_blank_rows_do_not_split_a_marker_run() {
        let mut labels = fluency_labels(6);
        // Blank inside the first ReadLetter run: ffill keeps it one run
        labels.insert(2, None);
        let session = session_from_labels(&labels);
        let windows = MarkerPairSegmenter::new(MarkerGrammar::fluency())
            .segment(&session)
            .unwrap();
        assert_eq!(windows.len(), 6);
    }

    #[test]
    fn test_fluency_out_of_order_markers_fail() {
        let mut labels = fluency_labels(6);
        // Swap the first trial's BeginFile and ReadLetter runs
        labels[1] = Some("BeginFile");
        labels[2] = Some("BeginFile");
        labels[3] = Some("ReadLetter");
        labels[4] = Some("ReadLetter");
        let session = session_from_labels(&labels);
        let result = MarkerPairSegmenter::new(MarkerGrammar::fluency()).segment(&session);
        assert!(matches!(result, Err(PupilError::Segmentation(_))));
    }

    #[test]
    fn test_single_row_response_fails() {
        let mut labels = fluency_labels(6);
        labels[5] = Some("Rest");
        labels[6] = Some("Rest");
        let session = session_from_labels(&labels);
        let result = MarkerPairSegmenter::new(MarkerGrammar::fluency()).segment(&session);
        assert!(matches!(result, Err(PupilError::Segmentation(_))));
    }

    #[test]
    fn test_encoding_runs() {
        let labels = [
            None,
            Some("Ready"),
            Some("Ready"),
            Some("Fixation"),
            Some("PlayWord1"),
            Some("PlayWord2"),
            None,
            None,
            Some("Ready"),
            Some("PlayWord1"),
            Some(""),
            Some("Ready"),
            Some("PlayWord3"),
        ];
        let session = session_from_labels(&labels);
        let windows = NullSeparatedSegmenter::new(EncodingGrammar::default())
            .segment(&session)
            .unwrap();

        assert_eq!(windows.len(), 3);
        assert_eq!(
            windows.iter().map(|w| w.trial).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        // Fixation is noise
        assert_eq!(windows[0].rows.len(), 4);
        assert_eq!(windows[0].phase_rows(TrialPhase::Response).count(), 2);
        assert_eq!(windows[2].rows[0].index, 11);
    }

    #[test]
    fn test_encoding_without_response_fails() {
        let labels = [Some("Ready"), Some("Ready"), None, Some("Ready"), Some("PlayWord1")];
        let session = session_from_labels(&labels);
        let result = NullSeparatedSegmenter::new(EncodingGrammar::default()).segment(&session);
        assert!(matches!(result, Err(PupilError::Segmentation(_))));
    }

    #[test]
    fn test_encoding_empty_stream_fails() {
        let session = session_from_labels(&[None, None]);
        let result = NullSeparatedSegmenter::new(EncodingGrammar::default()).segment(&session);
        assert!(result.is_err());
    }

    #[test]
    fn test_recall_prefilter_and_positions() {
        let mut labels = vec![Some("ReadLetter"), Some("RecordLetter")];
        for _ in 0..6 {
            labels.extend([
                Some("ReadRecall"),
                Some("ReadRecall"),
                Some("Noise"),
                Some("BeginRecall"),
                Some("RecordRecall"),
                Some("RecordRecall"),
                None,
            ]);
        }
        let session = session_from_labels(&labels);
        let segmenter =
            PositionalQuadrupleSegmenter::new("Recall".to_string(), MarkerGrammar::recall());
        let windows = segmenter.segment(&session).unwrap();

        assert_eq!(windows.len(), 6);
        // Noise row is filtered out before segmentation
        assert_eq!(windows[0].rows.len(), 5);
        assert_eq!(windows[0].phase_rows(TrialPhase::Baseline).count(), 3);
        assert_eq!(windows[0].phase_rows(TrialPhase::Response).count(), 2);
        assert!(windows[0]
            .rows
            .iter()
            .all(|r| session.samples[r.index].label().unwrap().contains("Recall")));
    }

    #[test]
    fn test_recall_without_recall_rows_fails() {
        let session = session_from_labels(&fluency_labels(6));
        let segmenter =
            PositionalQuadrupleSegmenter::new("Recall".to_string(), MarkerGrammar::recall());
        assert!(matches!(
            segmenter.segment(&session),
            Err(PupilError::Segmentation(_))
        ));
    }

    #[test]
    fn test_event_table_layout() {
        let session = session_from_labels(&fluency_labels(6));
        let rows: Vec<usize> = (0..session.len()).collect();
        let events = detect_trial_events(&session, &rows, &MarkerGrammar::fluency()).unwrap();

        assert_eq!(events.len(), 24);
        assert_eq!(events[0].boundary, Boundary::Start);
        assert_eq!(events[0].phase, TrialPhase::Baseline);
        assert_eq!(events[3].boundary, Boundary::Stop);
        assert_eq!(events[3].phase, TrialPhase::Response);
        assert_eq!(events[23].trial, 6);
        assert!(events.windows(2).all(|w| w[0].row <= w[1].row));
    }
}
