//! Per-subject processing
//!
//! Segment → deblink → resample/filter → baseline/dilation → bins.
//! A stream that does not segment fails the whole subject; anything that goes
//! wrong inside one trial only drops that trial.

use crate::baseline::compute_dilation;
use crate::bins::{bin_trials, merge_bins};
use crate::config::TaskConfig;
use crate::deblink::{blink_fraction, deblink};
use crate::error::{Result, TrialError};
use crate::profile_scope;
use crate::resample::resample_filter;
use crate::segment::segmenter_for;
use crate::types::{
    ConditionedTrial, DilationTrial, ExcludedTrial, RawSample, RawSession, SubjectResult,
    TrialBlink, TrialWindow,
};

/// Deblink and resample one trial window
pub fn condition_trial(
    session: &RawSession,
    window: &TrialWindow,
    config: &TaskConfig,
) -> std::result::Result<ConditionedTrial, TrialError> {
    let samples: Vec<RawSample> = window.samples(session).cloned().collect();
    condition_samples(session, window, &samples, config)
}

/// `samples` are the window's rows, already copied out of the session
fn condition_samples(
    session: &RawSession,
    window: &TrialWindow,
    samples: &[RawSample],
    config: &TaskConfig,
) -> std::result::Result<ConditionedTrial, TrialError> {
    let deblinked = deblink(samples, &config.deblink)?;

    let labels: Vec<Option<&str>> = window
        .rows
        .iter()
        .map(|r| session.samples[r.index].label())
        .collect();
    let phases: Vec<_> = window.rows.iter().map(|r| r.phase).collect();

    Ok(ConditionedTrial {
        trial: window.trial,
        condition: window.condition,
        points: resample_filter(&deblinked, &labels, &phases, &config.resample),
    })
}

fn process_trial(
    session: &RawSession,
    window: &TrialWindow,
    samples: &[RawSample],
    config: &TaskConfig,
) -> std::result::Result<DilationTrial, TrialError> {
    let conditioned = condition_samples(session, window, samples, config)?;
    compute_dilation(&conditioned, &config.baseline)
}

/// Run the full pipeline for one subject's session.
pub fn process_session(session: &RawSession, config: &TaskConfig) -> Result<SubjectResult> {
    profile_scope!(format!("process_session {}", session.subject));
    config.validate()?;

    let segmenter = segmenter_for(&config.grammar);
    let windows = {
        profile_scope!("segment");
        segmenter.segment(session)?
    };
    log::info!(
        "Subject {} session {}: {} trials ({} segmenter)",
        session.subject,
        session.session,
        windows.len(),
        segmenter.name()
    );

    let mut result = SubjectResult::new(
        session.subject.clone(),
        session.session.clone(),
        config.task,
    );

    let mut dilation = Vec::with_capacity(windows.len());
    for window in &windows {
        let samples: Vec<RawSample> = window.samples(session).cloned().collect();
        result.blink_table.push(TrialBlink {
            trial: window.trial,
            condition: window.condition,
            blink_fraction: blink_fraction(&samples, &config.deblink),
        });

        match process_trial(session, window, &samples, config) {
            Ok(trial) => {
                log::debug!(
                    "Trial {}: baseline {:.4}, {} response points",
                    trial.trial,
                    trial.baseline,
                    trial.points.len()
                );
                dilation.push(trial);
            }
            Err(reason) => {
                log::warn!(
                    "Subject {}: excluding trial {}: {}",
                    session.subject,
                    window.trial,
                    reason
                );
                result.excluded.push(ExcludedTrial {
                    trial: window.trial,
                    reason,
                });
            }
        }
    }

    let bin_width = config.bin_width_us();
    result.binned = {
        profile_scope!("bin");
        bin_trials(&dilation, bin_width)
    };

    if let Some(quartile_width) = config.quartile_width_us() {
        let factor = (quartile_width / bin_width) as usize;
        let quartiles = merge_bins(&result.binned, bin_width, factor);
        result = result.with_quartiles(quartiles);
    }

    log::info!(
        "Subject {}: {} binned rows, {} trials excluded",
        session.subject,
        result.binned.len(),
        result.excluded.len()
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Task;
    use crate::error::PupilError;

    fn sample(t_ms: i64, d: f64, label: Option<&str>) -> RawSample {
        RawSample {
            timestamp_us: t_ms * 1000,
            left_diameter: d,
            right_diameter: d,
            left_blink: false,
            right_blink: false,
            current_object: label.map(str::to_string),
        }
    }

    /// Encoding stream: `trials` blocks of Ready (1 s) + PlayWord (2 s),
    /// separated by a blank row
    fn encoding_session(trials: usize, diameter: impl Fn(usize) -> f64) -> RawSession {
        let mut samples = Vec::new();
        let mut t = 0;
        for k in 0..trials {
            for _ in 0..30 {
                samples.push(sample(t, diameter(k), Some("Ready")));
                t += 33;
            }
            for _ in 0..60 {
                samples.push(sample(t, diameter(k) + 0.2, Some("PlayWord3")));
                t += 33;
            }
            samples.push(sample(t, diameter(k), None));
            t += 33;
        }
        RawSession::new("E1".to_string(), "1".to_string(), samples).unwrap()
    }

    #[test]
    fn test_encoding_session_dilation() {
        let session = encoding_session(3, |_| 3.0);
        let result = process_session(&session, &TaskConfig::for_task(Task::Encoding)).unwrap();

        assert_eq!(result.blink_table.len(), 3);
        assert!(result.excluded.is_empty());
        // 1947 ms of response at 1 s bins
        assert_eq!(result.binned.iter().filter(|r| r.trial == 1).count(), 2);
        let late = result.binned.iter().find(|r| r.trial == 1 && r.bin_end_us == 2_000_000).unwrap();
        assert!((late.dilation.unwrap() - 0.2).abs() < 0.05);

        let quartiles = result.quartiles.unwrap();
        assert_eq!(quartiles.len(), 3);
        assert!(quartiles.iter().all(|q| q.bin_end_us == 6_000_000));
    }

    #[test]
    fn test_bad_trial_is_excluded_not_fatal() {
        let session = encoding_session(3, |k| if k == 1 { 9.0 } else { 3.0 });
        let result = process_session(&session, &TaskConfig::for_task(Task::Encoding)).unwrap();

        assert_eq!(result.excluded.len(), 1);
        assert_eq!(result.excluded[0].trial, 2);
        assert_eq!(result.excluded[0].reason, TrialError::NoValidSamples);
        assert!(result.binned.iter().all(|r| r.trial != 2));
        let blink = result.blink_table.iter().find(|b| b.trial == 2).unwrap();
        assert!((blink.blink_fraction - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_config_rejected_before_processing() {
        let session = encoding_session(1, |_| 3.0);
        let mut config = TaskConfig::for_task(Task::Encoding);
        config.bin_width_ms = 0;
        assert!(matches!(
            process_session(&session, &config),
            Err(PupilError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_segmentation_failure_is_fatal() {
        let samples = (0..10).map(|i| sample(i * 10, 3.0, None)).collect();
        let session = RawSession::new("E2".to_string(), "1".to_string(), samples).unwrap();
        assert!(matches!(
            process_session(&session, &TaskConfig::for_task(Task::Encoding)),
            Err(PupilError::Segmentation(_))
        ));
    }
}
