//! Time-bin aggregation of dilation trials
//!
//! Bins are laid out from each trial's own response onset using the same
//! right-closed/right-labelled rule as the resampling grid
//! ([`crate::resample::bin_index`]). Only observed points contribute; a bin
//! with none is emitted with `None` values.

use crate::resample::{bin_count, bin_index, bin_label};
use crate::types::{BinnedRow, DilationTrial};

#[derive(Default, Clone)]
struct Accumulator {
    dilation: f64,
    diameter: f64,
    blink: f64,
    blink_n: usize,
    count: usize,
}

fn mean(sum: f64, n: usize) -> Option<f64> {
    (n > 0).then(|| sum / n as f64)
}

/// Bin one trial's response series
pub fn bin_trial(trial: &DilationTrial, width_us: i64) -> Vec<BinnedRow> {
    let Some(duration) = trial.points.last().map(|p| p.elapsed_us) else {
        return Vec::new();
    };

    let mut acc = vec![Accumulator::default(); bin_count(duration, width_us)];
    for p in trial.points.iter().filter(|p| p.observed) {
        let a = &mut acc[bin_index(p.elapsed_us, width_us)];
        a.dilation += p.dilation;
        a.diameter += p.diameter;
        if let Some(b) = p.blink {
            a.blink += b;
            a.blink_n += 1;
        }
        a.count += 1;
    }

    acc.into_iter()
        .enumerate()
        .map(|(k, a)| BinnedRow {
            trial: trial.trial,
            condition: trial.condition,
            bin_end_us: bin_label(k, width_us),
            dilation: mean(a.dilation, a.count),
            baseline: (a.count > 0).then_some(trial.baseline),
            diameter: mean(a.diameter, a.count),
            blink: mean(a.blink, a.blink_n),
            count: a.count,
        })
        .collect()
}

/// Bin every trial, ordered by trial
pub fn bin_trials(trials: &[DilationTrial], width_us: i64) -> Vec<BinnedRow> {
    let mut rows: Vec<BinnedRow> = trials.iter().flat_map(|t| bin_trial(t, width_us)).collect();
    rows.sort_by_key(|r| (r.trial, r.bin_end_us));
    rows
}

fn weighted(values: &[(Option<f64>, usize)]) -> Option<f64> {
    let (sum, n) = values
        .iter()
        .filter_map(|&(v, n)| v.map(|v| (v * n as f64, n)))
        .fold((0.0, 0), |(s, c), (v, n)| (s + v, c + n));
    mean(sum, n)
}

/// Combine fine bins into coarse bins `factor` times wider, weighting each
/// fine mean by its point count.
///
/// For the same trials this matches `bin_trials(trials, fine_width_us * factor)`.
pub fn merge_bins(fine: &[BinnedRow], fine_width_us: i64, factor: usize) -> Vec<BinnedRow> {
    let factor = factor.max(1);
    let coarse_width = fine_width_us * factor as i64;
    let mut merged: Vec<BinnedRow> = Vec::new();

    let mut start = 0;
    while start < fine.len() {
        let trial = fine[start].trial;
        let end = fine[start..]
            .iter()
            .position(|r| r.trial != trial)
            .map_or(fine.len(), |p| start + p);
        let rows = &fine[start..end];

        let groups = rows
            .iter()
            .map(|r| bin_index(r.bin_end_us, fine_width_us) / factor)
            .max()
            .map_or(0, |m| m + 1);

        for g in 0..groups {
            let members: Vec<&BinnedRow> = rows
                .iter()
                .filter(|r| bin_index(r.bin_end_us, fine_width_us) / factor == g)
                .collect();
            let pick = |f: fn(&BinnedRow) -> Option<f64>| {
                weighted(&members.iter().map(|&r| (f(r), r.count)).collect::<Vec<_>>())
            };
            let count: usize = members.iter().map(|r| r.count).sum();

            merged.push(BinnedRow {
                trial,
                condition: rows[0].condition,
                bin_end_us: bin_label(g, coarse_width),
                dilation: pick(|r| r.dilation),
                baseline: pick(|r| r.baseline),
                diameter: pick(|r| r.diameter),
                blink: pick(|r| r.blink),
                count,
            });
        }

        start = end;
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DilationPoint;

    fn dilation_trial(trial: u32, values: &[(i64, f64, bool)]) -> DilationTrial {
        DilationTrial {
            trial,
            condition: None,
            baseline: 3.0,
            points: values
                .iter()
                .map(|&(t_ms, d, observed)| DilationPoint {
                    elapsed_us: t_ms * 1000,
                    diameter: d,
                    dilation: d - 3.0,
                    blink: observed.then_some(0.0),
                    observed,
                })
                .collect(),
        }
    }

    #[test]
    fn test_bins_relative_to_onset() {
        let t = dilation_trial(
            1,
            &[(0, 3.0, true), (250, 3.2, true), (500, 3.4, true), (750, 3.6, true), (1000, 3.8, true)],
        );
        let rows = bin_trial(&t, 500_000);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].bin_end_us, 500_000);
        assert_eq!(rows[0].count, 3);
        assert!((rows[0].diameter.unwrap() - 3.2).abs() < 1e-9);
        assert!((rows[1].dilation.unwrap() - 0.7).abs() < 1e-9);
        assert_eq!(rows[1].baseline, Some(3.0));
    }

    #[test]
    fn test_empty_bin_is_missing_not_zero() {
        let t = dilation_trial(
            1,
            &[(0, 3.0, true), (600, 3.1, false), (1200, 3.2, true)],
        );
        let rows = bin_trial(&t, 500_000);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].count, 0);
        assert_eq!(rows[1].dilation, None);
        assert_eq!(rows[1].baseline, None);
        assert_eq!(rows[1].blink, None);
        assert!(rows[2].dilation.is_some());
    }

    #[test]
    fn test_bin_trials_sorted_by_trial() {
        let a = dilation_trial(2, &[(0, 3.0, true)]);
        let b = dilation_trial(1, &[(0, 3.0, true), (1500, 3.0, true)]);
        let rows = bin_trials(&[a, b], 1_000_000);
        let order: Vec<(u32, i64)> = rows.iter().map(|r| (r.trial, r.bin_end_us)).collect();
        assert_eq!(order, vec![(1, 1_000_000), (1, 2_000_000), (2, 1_000_000)]);
    }

    #[test]
    fn test_merged_fine_bins_match_coarse_bins() {
        let values: Vec<(i64, f64, bool)> = (0..=180)
            .map(|i| {
                let t = i * 100;
                (t, 3.0 + ((i * 37) % 11) as f64 / 10.0, i % 7 != 3)
            })
            .collect();
        let trials = vec![dilation_trial(1, &values), dilation_trial(2, &values[..95])];

        let fine = bin_trials(&trials, 1_000_000);
        let coarse = bin_trials(&trials, 6_000_000);
        let merged = merge_bins(&fine, 1_000_000, 6);

        assert_eq!(merged.len(), coarse.len());
        for (m, c) in merged.iter().zip(&coarse) {
            assert_eq!((m.trial, m.bin_end_us, m.count), (c.trial, c.bin_end_us, c.count));
            for (x, y) in [(m.dilation, c.dilation), (m.diameter, c.diameter), (m.baseline, c.baseline)] {
                assert!((x.unwrap() - y.unwrap()).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_coarse_grand_mean_equals_fine_grand_mean() {
        let values: Vec<(i64, f64, bool)> = (0..600)
            .map(|i| (i * 100, 3.0 + (i % 13) as f64 * 0.05, true))
            .collect();
        let trials = vec![dilation_trial(1, &values)];

        let fine = bin_trials(&trials, 1_000_000);
        let quartiles = bin_trials(&trials, 15_000_000);
        let grand = |rows: &[BinnedRow]| {
            weighted(&rows.iter().map(|r| (r.dilation, r.count)).collect::<Vec<_>>()).unwrap()
        };

        assert_eq!(quartiles.len(), 4);
        assert!((grand(&fine) - grand(&quartiles)).abs() < 1e-9);
    }
}
