use crate::config::BaselineWindow;
use crate::error::TrialError;
use crate::types::{ConditionedPoint, ConditionedTrial, DilationPoint, DilationTrial, TrialPhase};

fn phase_points(trial: &ConditionedTrial, phase: TrialPhase) -> Vec<&ConditionedPoint> {
    trial
        .points
        .iter()
        .filter(|p| p.phase == Some(phase))
        .collect()
}

/// Points of the configured baseline window
fn window_points<'a>(trial: &'a ConditionedTrial, window: &BaselineWindow) -> Vec<&'a ConditionedPoint> {
    let span = window.duration_us();
    match window {
        BaselineWindow::BaselineTail { .. } => {
            let points = phase_points(trial, TrialPhase::Baseline);
            let Some(end) = points.last().map(|p| p.elapsed_us) else {
                return Vec::new();
            };
            points
                .into_iter()
                .filter(|p| p.elapsed_us > end - span)
                .collect()
        }
        BaselineWindow::BaselineHead { .. } | BaselineWindow::ResponseHead { .. } => {
            let phase = if matches!(window, BaselineWindow::BaselineHead { .. }) {
                TrialPhase::Baseline
            } else {
                TrialPhase::Response
            };
            let points = phase_points(trial, phase);
            let Some(start) = points.first().map(|p| p.elapsed_us) else {
                return Vec::new();
            };
            points
                .into_iter()
                .filter(|p| p.elapsed_us < start + span)
                .collect()
        }
    }
}

/// Mean diameter over the baseline window.
///
/// Undefined when the window holds no observed point, or when every raw
/// sample behind it was a blink.
pub fn compute_baseline(trial: &ConditionedTrial, window: &BaselineWindow) -> Result<f64, TrialError> {
    let points = window_points(trial, window);
    let observed: Vec<&ConditionedPoint> = points.into_iter().filter(|p| p.is_observed()).collect();

    if !observed.iter().any(|p| p.valid_samples > 0) {
        return Err(TrialError::BaselineUndefined);
    }

    let sum: f64 = observed.iter().map(|p| p.diameter).sum();
    Ok(sum / observed.len() as f64)
}

/// Subtract the trial baseline and keep only the Response phase, with
/// elapsed time restarting at response onset.
pub fn compute_dilation(trial: &ConditionedTrial, window: &BaselineWindow) -> Result<DilationTrial, TrialError> {
    let response = phase_points(trial, TrialPhase::Response);
    let Some(onset) = response.first().map(|p| p.elapsed_us) else {
        return Err(TrialError::NoResponse);
    };

    let baseline = compute_baseline(trial, window)?;

    let points = response
        .into_iter()
        .map(|p| DilationPoint {
            elapsed_us: p.elapsed_us - onset,
            diameter: p.diameter,
            dilation: p.diameter - baseline,
            blink: p.blink,
            observed: p.is_observed(),
        })
        .collect();

    Ok(DilationTrial {
        trial: trial.trial,
        condition: trial.condition,
        baseline,
        points,
    })
}
