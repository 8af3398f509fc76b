use chrono::NaiveTime;

use crate::config::TimestampPrecision;

/// Render trial-local elapsed time as a clock string.
///
/// `TimestampPrecision::Seconds` gives `HH:MM:SS`, `Micros` gives
/// `HH:MM:SS.ffffff`. Spans past 24h keep counting hours.
pub fn format_elapsed(elapsed_us: i64, precision: TimestampPrecision) -> String {
    let sign = if elapsed_us < 0 { "-" } else { "" };
    let abs = elapsed_us.unsigned_abs();
    let secs = abs / 1_000_000;
    let micros = (abs % 1_000_000) as u32;

    let fmt = match precision {
        TimestampPrecision::Seconds => "%H:%M:%S",
        TimestampPrecision::Micros => "%H:%M:%S%.6f",
    };

    match u32::try_from(secs)
        .ok()
        .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, micros * 1000))
    {
        Some(time) => format!("{}{}", sign, time.format(fmt)),
        None => {
            let clock = format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
            match precision {
                TimestampPrecision::Seconds => format!("{}{}", sign, clock),
                TimestampPrecision::Micros => format!("{}{}.{:06}", sign, clock, micros),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds() {
        assert_eq!(format_elapsed(0, TimestampPrecision::Seconds), "00:00:00");
        assert_eq!(format_elapsed(15_000_000, TimestampPrecision::Seconds), "00:00:15");
        assert_eq!(format_elapsed(61_400_000, TimestampPrecision::Seconds), "00:01:01");
    }

    #[test]
    fn test_micros() {
        assert_eq!(
            format_elapsed(500_000, TimestampPrecision::Micros),
            "00:00:00.500000"
        );
        assert_eq!(
            format_elapsed(3_723_000_001, TimestampPrecision::Micros),
            "01:02:03.000001"
        );
    }

    #[test]
    fn test_past_one_day() {
        assert_eq!(
            format_elapsed(90_000_000_000, TimestampPrecision::Seconds),
            "25:00:00"
        );
    }
}
