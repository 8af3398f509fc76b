//! Blink detection and interpolation
//!
//! Based on the artifact rejection procedure of Jackson & Sirois (2009):
//! implausible diameters and tracker-flagged blinks are discarded together
//! with a few neighbouring samples (eyelid ramp), then linearly interpolated.

use crate::config::DeblinkConfig;
use crate::error::TrialError;
use crate::types::RawSample;

/// A trial's samples after blink removal; same length as the input
#[derive(Debug, Clone, PartialEq)]
pub struct DeblinkedTrial {
    pub timestamps_us: Vec<i64>,
    /// Combined left/right diameter, every value interpolated or measured
    pub diameter: Vec<f64>,
    /// Samples that were invalid before interpolation (padding not included)
    pub invalid: Vec<bool>,
}

impl DeblinkedTrial {
    pub fn len(&self) -> usize {
        self.diameter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diameter.is_empty()
    }
}

#[inline]
fn eye_diameter(diameter: f64, blink: bool, config: &DeblinkConfig) -> Option<f64> {
    if blink || !diameter.is_finite() || diameter < config.lo || diameter > config.hi {
        None
    } else {
        Some(diameter)
    }
}

/// Mean of the plausible eyes of a sample, `None` if neither eye is usable
pub fn combined_diameter(sample: &RawSample, config: &DeblinkConfig) -> Option<f64> {
    let left = eye_diameter(sample.left_diameter, sample.left_blink, config);
    let right = eye_diameter(sample.right_diameter, sample.right_blink, config);
    match (left, right) {
        (Some(l), Some(r)) => Some((l + r) / 2.0),
        (Some(d), None) | (None, Some(d)) => Some(d),
        (None, None) => None,
    }
}

/// Fraction of samples with no usable eye
pub fn blink_fraction(samples: &[RawSample], config: &DeblinkConfig) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let invalid = samples
        .iter()
        .filter(|s| combined_diameter(s, config).is_none())
        .count();
    invalid as f64 / samples.len() as f64
}

/// Detect blinks and interpolate them away.
///
/// Interior gaps are filled linearly in time between the nearest kept
/// samples; gaps at either end hold the nearest kept value.
pub fn deblink(samples: &[RawSample], config: &DeblinkConfig) -> Result<DeblinkedTrial, TrialError> {
    let n = samples.len();
    let measured: Vec<Option<f64>> = samples
        .iter()
        .map(|s| combined_diameter(s, config))
        .collect();
    let invalid: Vec<bool> = measured.iter().map(Option::is_none).collect();

    let mut discard = invalid.clone();
    if config.padding > 0 {
        for i in (0..n).filter(|&i| invalid[i]) {
            let lo = i.saturating_sub(config.padding);
            let hi = i.saturating_add(config.padding).min(n.saturating_sub(1));
            for d in &mut discard[lo..=hi] {
                *d = true;
            }
        }
    }

    if discard.iter().all(|&d| d) {
        return Err(TrialError::NoValidSamples);
    }

    let timestamps_us: Vec<i64> = samples.iter().map(|s| s.timestamp_us).collect();

    // Nearest kept sample at or after each index
    let mut next_anchor = vec![None; n];
    let mut upcoming = None;
    for i in (0..n).rev() {
        if !discard[i] {
            upcoming = Some(i);
        }
        next_anchor[i] = upcoming;
    }

    let mut diameter = Vec::with_capacity(n);
    let mut previous: Option<usize> = None;
    for i in 0..n {
        if !discard[i] {
            // kept samples are always measured
            diameter.push(measured[i].unwrap_or_default());
            previous = Some(i);
            continue;
        }

        let value = match (previous, next_anchor[i]) {
            (Some(a), Some(b)) => {
                let (da, db) = (diameter[a], measured[b].unwrap_or_default());
                let span = (timestamps_us[b] - timestamps_us[a]) as f64;
                if span > 0.0 {
                    let frac = (timestamps_us[i] - timestamps_us[a]) as f64 / span;
                    da + (db - da) * frac
                } else {
                    da
                }
            }
            (Some(a), None) => diameter[a],
            (None, Some(b)) => measured[b].unwrap_or_default(),
            (None, None) => unreachable!("at least one sample is kept"),
        };
        diameter.push(value);
    }

    log::trace!(
        "Deblinked {} samples: {} invalid, {} discarded with padding",
        n,
        invalid.iter().filter(|&&b| b).count(),
        discard.iter().filter(|&&d| d).count()
    );

    Ok(DeblinkedTrial {
        timestamps_us,
        diameter,
        invalid,
    })
}
