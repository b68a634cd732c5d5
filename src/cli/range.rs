//! Grid-axis argument: a single value or an inclusive `start:stop:step` sweep.

use std::fmt;
use std::str::FromStr;

/// Relative slack on the number of steps, so `0:1:0.1` includes 1.
const STEP_SLACK: f64 = 1e-9;

/// Parse `v` or `start:stop:step` into `(start, stop, step)`.
///
/// A single value is returned as `(v, v, 0.0)`. For a sweep the step must be
/// non-zero and point from start towards stop; `start == stop` is allowed and
/// yields one value.
pub fn parse_range(s: &str) -> Result<(f64, f64, f64), String> {
    let parts: Vec<&str> = s.split(':').map(str::trim).collect();
    let number = |raw: &str, what: &str| -> Result<f64, String> {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("Invalid {what} value '{raw}'"))
    };

    match parts.as_slice() {
        [v] => {
            let v = number(v, "single")?;
            Ok((v, v, 0.0))
        }
        [start, stop, step] => {
            let (start, stop, step) = (
                number(start, "start")?,
                number(stop, "stop")?,
                number(step, "step")?,
            );
            if step == 0.0 {
                return Err("Step cannot be zero".to_string());
            }
            if step > 0.0 && start > stop {
                return Err("For positive step, start must not exceed stop".to_string());
            }
            if step < 0.0 && start < stop {
                return Err("For negative step, start must not be below stop".to_string());
            }
            Ok((start, stop, step))
        }
        _ => Err("Range must be a value or 'start:stop:step'".to_string()),
    }
}

/// One grid axis as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeArg(pub f64, pub f64, pub f64);

impl FromStr for RangeArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, stop, step) = parse_range(s)?;
        Ok(RangeArg(start, stop, step))
    }
}

impl fmt::Display for RangeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.2 == 0.0 {
            write!(f, "{}", self.0)
        } else {
            write!(f, "{}:{}:{}", self.0, self.1, self.2)
        }
    }
}

impl RangeArg {
    /// Every value from start to stop (inclusive).
    ///
    /// Values are computed as `start + i * step` rather than by accumulation,
    /// so long sweeps do not drift off table nodes.
    pub fn to_vec(&self) -> Vec<f64> {
        let (start, stop, step) = (self.0, self.1, self.2);
        if step == 0.0 {
            return vec![start];
        }
        let n = ((stop - start) / step + STEP_SLACK).floor().max(0.0) as usize;
        (0..=n).map(|i| start + i as f64 * step).collect()
    }
}

/// Flatten a list of axis arguments into one list of values.
pub fn expand(ranges: &[RangeArg]) -> Vec<f64> {
    ranges.iter().flat_map(RangeArg::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_values_and_sweeps() {
        assert_eq!(parse_range("3.1").unwrap(), (3.1, 3.1, 0.0));
        assert_eq!(parse_range("0:2:0.5").unwrap(), (0.0, 2.0, 0.5));
        assert_eq!(parse_range("10:8:-1").unwrap(), (10.0, 8.0, -1.0));
        assert_eq!(parse_range("1:1:0.5").unwrap(), (1.0, 1.0, 0.5));

        assert!(parse_range("1:2").is_err());
        assert!(parse_range("1:2:0").is_err());
        assert!(parse_range("5:1:1").is_err());
        assert!(parse_range("1:5:-1").is_err());
        assert!(parse_range("abc").is_err());
        assert!(parse_range("nan").is_err());
    }

    #[test]
    fn sweeps_include_the_stop_value() {
        assert_eq!(RangeArg(0.0, 1.0, 0.25).to_vec(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(RangeArg(10.0, 8.0, -0.5).to_vec(), vec![10.0, 9.5, 9.0, 8.5, 8.0]);
        assert_eq!(RangeArg(0.0, 2.1, 0.5).to_vec().len(), 5);

        let tenths = RangeArg(0.0, 1.0, 0.1).to_vec();
        assert_eq!(tenths.len(), 11);
        assert!((tenths[10] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_value_and_display() {
        let v: RangeArg = "3.1".parse().unwrap();
        assert_eq!(v.to_vec(), vec![3.1]);
        assert_eq!(v.to_string(), "3.1");
        assert_eq!(RangeArg(0.0, 1.0, 0.5).to_string(), "0:1:0.5");
    }

    #[test]
    fn expand_concatenates() {
        let axes = [RangeArg(6.0, 6.0, 0.0), RangeArg(7.0, 8.0, 0.5)];
        assert_eq!(expand(&axes), vec![6.0, 7.0, 7.5, 8.0]);
    }
}
