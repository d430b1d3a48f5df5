//! Result model & threshold classifier — component A. `classify` is the one
//! pure function the whole pipeline hangs off of: every checker's numeric
//! value passes through it exactly once.

use crate::models::{Status, Thresholds};

/// Classify a numeric value against optional thresholds. Alarm is checked
/// before warning; any absent threshold is ignored. Boundary values (value
/// exactly equal to a threshold) trigger that level — `>=`/`<=`, not `>`/`<`.
pub fn classify(value: f64, thresholds: &Thresholds) -> Status {
    if let Some(high_alarm) = thresholds.high_alarm {
        if value >= high_alarm {
            return Status::Alarm;
        }
    }
    if let Some(low_alarm) = thresholds.low_alarm {
        if value <= low_alarm {
            return Status::Alarm;
        }
    }
    if let Some(high_warning) = thresholds.high_warning {
        if value >= high_warning {
            return Status::Warning;
        }
    }
    if let Some(low_warning) = thresholds.low_warning {
        if value <= low_warning {
            return Status::Warning;
        }
    }
    Status::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds(low_warning: Option<f64>, high_warning: Option<f64>, low_alarm: Option<f64>, high_alarm: Option<f64>) -> Thresholds {
        Thresholds { low_warning, high_warning, low_alarm, high_alarm }
    }

    #[test]
    fn no_thresholds_is_always_ok() {
        assert_eq!(classify(1e9, &Thresholds::default()), Status::Ok);
    }

    #[test]
    fn high_alarm_boundary_is_inclusive() {
        let t = thresholds(None, Some(1000.0), None, Some(2000.0));
        assert_eq!(classify(1999.0, &t), Status::Warning);
        assert_eq!(classify(2000.0, &t), Status::Alarm);
        assert_eq!(classify(2001.0, &t), Status::Alarm);
    }

    #[test]
    fn low_alarm_boundary_is_inclusive() {
        let t = thresholds(Some(20.0), None, Some(5.0), None);
        assert_eq!(classify(6.0, &t), Status::Warning);
        assert_eq!(classify(5.0, &t), Status::Alarm);
        assert_eq!(classify(4.0, &t), Status::Alarm);
    }

    #[test]
    fn alarm_takes_priority_over_warning() {
        // A value that crosses both the warning and alarm line is alarm, not warning.
        let t = thresholds(None, Some(100.0), None, Some(100.0));
        assert_eq!(classify(100.0, &t), Status::Alarm);
    }

    #[test]
    fn monotone_in_high_thresholds() {
        // Raising high_alarm can never turn an ok/warning value into a worse
        // classification for the same probe value.
        let looser = thresholds(None, Some(100.0), None, Some(200.0));
        let tighter = thresholds(None, Some(100.0), None, Some(150.0));
        for value in [90.0, 120.0, 160.0, 250.0] {
            let worse = |s: Status| match s {
                Status::Ok => 0,
                Status::Warning => 1,
                Status::Alarm => 2,
                Status::Error => 3,
            };
            assert!(worse(classify(value, &tighter)) >= worse(classify(value, &looser)));
        }
    }
}
