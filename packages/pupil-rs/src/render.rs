//! Plot requests
//!
//! The pipeline does not draw anything. It describes the per-subject
//! dilation plot as a [`PlotRequest`] that a front end can render.

use serde::{Deserialize, Serialize};

use crate::types::{BinnedRow, SubjectResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSeries {
    pub name: String,
    /// (seconds since response onset, mean dilation); empty bins are skipped
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotRequest {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<PlotSeries>,
}

impl PlotRequest {
    /// One line per trial, in trial order
    pub fn from_rows(title: impl Into<String>, rows: &[BinnedRow]) -> Self {
        let mut series: Vec<(u32, PlotSeries)> = Vec::new();

        for row in rows {
            let Some(dilation) = row.dilation else {
                continue;
            };
            let idx = match series.iter().position(|(t, _)| *t == row.trial) {
                Some(i) => i,
                None => {
                    let name = match row.condition {
                        Some(c) => format!("Trial {} ({})", row.trial, c),
                        None => format!("Trial {}", row.trial),
                    };
                    series.push((row.trial, PlotSeries { name, points: Vec::new() }));
                    series.len() - 1
                }
            };
            series[idx].1.points.push((row.bin_end_us as f64 / 1e6, dilation));
        }

        series.sort_by_key(|(t, _)| *t);

        Self {
            title: title.into(),
            x_label: "Time since response onset (s)".to_string(),
            y_label: "Pupil dilation (mm)".to_string(),
            series: series.into_iter().map(|(_, s)| s).collect(),
        }
    }

    pub fn for_subject(result: &SubjectResult) -> Self {
        Self::from_rows(
            format!(
                "Subject {} session {}: {}",
                result.subject, result.session, result.task
            ),
            &result.binned,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Condition;

    fn row(trial: u32, bin_end_us: i64, dilation: Option<f64>) -> BinnedRow {
        BinnedRow {
            trial,
            condition: Some(Condition::Letter),
            bin_end_us,
            dilation,
            baseline: dilation.map(|_| 3.0),
            diameter: dilation.map(|d| d + 3.0),
            blink: None,
            count: usize::from(dilation.is_some()),
        }
    }

    #[test]
    fn test_one_series_per_trial() {
        let rows = vec![
            row(2, 500_000, Some(0.1)),
            row(1, 500_000, Some(0.2)),
            row(1, 1_000_000, None),
            row(1, 1_500_000, Some(0.3)),
        ];
        let plot = PlotRequest::from_rows("S1", &rows);

        assert_eq!(plot.series.len(), 2);
        assert_eq!(plot.series[0].name, "Trial 1 (Letter)");
        assert_eq!(plot.series[0].points, vec![(0.5, 0.2), (1.5, 0.3)]);
        assert_eq!(plot.series[1].points, vec![(0.5, 0.1)]);
    }

    #[test]
    fn test_serializes() {
        let plot = PlotRequest::from_rows("S1", &[row(1, 500_000, Some(0.2))]);
        let json = serde_json::to_value(&plot).unwrap();
        assert_eq!(json["title"], "S1");
        assert_eq!(json["series"][0]["points"][0][0], 0.5);
    }
}
