//! Uniform-grid resampling and smoothing
//!
//! Bins are right-closed and right-labelled: bin k covers
//! `(t0 + (k-1)w, t0 + kw]` and is labelled `t0 + kw`. The first bin also
//! takes `t0` itself, so a span of duration `D` always yields
//! `max(1, ceil(D / w))` bins.

use crate::config::ResampleConfig;
use crate::deblink::DeblinkedTrial;
use crate::filters::lowpass_filtfilt;
use crate::types::{ConditionedPoint, TrialPhase};

/// Index of the bin holding a sample `elapsed_us` after the anchor
#[inline]
pub fn bin_index(elapsed_us: i64, width_us: i64) -> usize {
    if elapsed_us <= 0 {
        return 0;
    }
    let k = (elapsed_us + width_us - 1) / width_us;
    (k - 1) as usize
}

/// Number of bins covering `duration_us`
#[inline]
pub fn bin_count(duration_us: i64, width_us: i64) -> usize {
    bin_index(duration_us, width_us) + 1
}

/// Right-edge label of bin `index`, relative to the anchor
#[inline]
pub fn bin_label(index: usize, width_us: i64) -> i64 {
    (index as i64 + 1) * width_us
}

/// Most frequent value; ties go to the value seen first
pub fn dominant<T: PartialEq>(values: impl IntoIterator<Item = T>) -> Option<T> {
    let mut tally: Vec<(T, usize)> = Vec::new();
    for v in values {
        match tally.iter_mut().find(|(seen, _)| *seen == v) {
            Some((_, n)) => *n += 1,
            None => tally.push((v, 1)),
        }
    }
    let mut best: Option<(T, usize)> = None;
    for (v, n) in tally {
        if best.as_ref().map_or(true, |(_, bn)| n > *bn) {
            best = Some((v, n));
        }
    }
    best.map(|(v, _)| v)
}

#[derive(Default)]
struct GridBin<'a> {
    diameter_sum: f64,
    samples: usize,
    valid: usize,
    blinks: usize,
    labels: Vec<Option<&'a str>>,
    phases: Vec<Option<TrialPhase>>,
}

/// Fill `None` entries by linear interpolation over index, holding the
/// nearest value at the ends. Returns `None` if nothing is present.
fn fill_gaps(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let anchors: Vec<usize> = (0..values.len()).filter(|&i| values[i].is_some()).collect();
    let (&first, &last) = (anchors.first()?, anchors.last()?);

    let mut out = Vec::with_capacity(values.len());
    let mut a = first;
    let mut next = anchors.iter().copied().skip(1);
    let mut b = next.next().unwrap_or(first);

    for (i, v) in values.iter().enumerate() {
        if let Some(v) = v {
            out.push(*v);
            if i == b {
                a = b;
                b = next.next().unwrap_or(last);
            }
            continue;
        }
        let (va, vb) = (values[a].unwrap_or_default(), values[b].unwrap_or_default());
        let value = if i < first {
            va
        } else if i > last {
            values[last].unwrap_or_default()
        } else {
            va + (vb - va) * (i - a) as f64 / (b - a) as f64
        };
        out.push(value);
    }
    Some(out)
}

/// Empty grid bins take the phase of the observed bins around them when
/// both sides agree, so a gap inside a phase stays part of it.
fn bridge_phases(phases: &mut [Option<TrialPhase>], observed: &[bool]) {
    let mut previous: Option<usize> = None;
    let mut i = 0;
    while i < phases.len() {
        if observed[i] {
            previous = Some(i);
            i += 1;
            continue;
        }
        let next = (i..phases.len()).find(|&j| observed[j]);
        if let (Some(a), Some(b)) = (previous, next) {
            if phases[a] == phases[b] {
                let phase = phases[a];
                phases[i..b].fill(phase);
            }
        }
        i = next.unwrap_or(phases.len());
    }
}

/// Regularise a deblinked trial onto the configured grid and low-pass it.
///
/// `labels` and `phases` run parallel to the trial's samples and are
/// resampled by dominant value, never averaged.
pub fn resample_filter(
    trial: &DeblinkedTrial,
    labels: &[Option<&str>],
    phases: &[Option<TrialPhase>],
    config: &ResampleConfig,
) -> Vec<ConditionedPoint> {
    let Some(&t0) = trial.timestamps_us.first() else {
        return Vec::new();
    };
    let period = config.sample_period_us;
    let duration = trial.timestamps_us.last().copied().unwrap_or(t0) - t0;

    let mut grid: Vec<GridBin> = (0..bin_count(duration, period))
        .map(|_| GridBin::default())
        .collect();

    for i in 0..trial.len() {
        let bin = &mut grid[bin_index(trial.timestamps_us[i] - t0, period)];
        bin.diameter_sum += trial.diameter[i];
        bin.samples += 1;
        if trial.invalid[i] {
            bin.blinks += 1;
        } else {
            bin.valid += 1;
        }
        bin.labels.push(labels.get(i).copied().flatten());
        bin.phases.push(phases.get(i).copied().flatten());
    }

    let means: Vec<Option<f64>> = grid
        .iter()
        .map(|b| (b.samples > 0).then(|| b.diameter_sum / b.samples as f64))
        .collect();
    // The first bin always holds t0, so there is at least one mean
    let filled = fill_gaps(&means).unwrap_or_default();
    let filtered = lowpass_filtfilt(
        &filled,
        config.cutoff_hz,
        config.sample_rate(),
        config.filter_order,
    );

    let observed: Vec<bool> = grid.iter().map(|b| b.samples > 0).collect();
    let mut phases: Vec<Option<TrialPhase>> = grid
        .iter_mut()
        .map(|b| dominant(std::mem::take(&mut b.phases)).flatten())
        .collect();
    bridge_phases(&mut phases, &observed);

    grid.into_iter()
        .zip(filtered)
        .zip(phases)
        .enumerate()
        .map(|(k, ((bin, diameter), phase))| ConditionedPoint {
            elapsed_us: bin_label(k, period),
            diameter,
            blink: (bin.samples > 0).then(|| bin.blinks as f64 / bin.samples as f64),
            samples: bin.samples,
            valid_samples: bin.valid,
            phase,
            label: dominant(bin.labels).flatten().map(str::to_string),
        })
        .collect()
}
