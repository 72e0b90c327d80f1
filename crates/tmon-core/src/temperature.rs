//! Whole-degree Celsius readings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A temperature in whole degrees Celsius.
///
/// Sensors only ever report integer degrees; fractional readings are
/// truncated toward zero at the probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Celsius(pub i32);

impl Celsius {
    /// Converts a milli-degree count (as exposed by thermal zones) to whole degrees.
    ///
    /// Integer division truncates toward zero, so `-1500` becomes `-1`.
    pub fn from_millidegrees(millis: i64) -> DomainResult<Self> {
        let degrees = millis / 1000;
        i32::try_from(degrees)
            .map(Self)
            .map_err(|_| DomainError::InvalidFieldValue {
                field: "millidegrees".to_string(),
                value: millis.to_string(),
                expected: "a value within the i32 range once divided by 1000".to_string(),
            })
    }

    /// Converts a fractional reading to whole degrees, truncating toward zero.
    ///
    /// `21.7` becomes `21` and `-0.5` becomes `0`. Non-finite or out of
    /// range values are rejected.
    pub fn from_fractional(value: f64) -> DomainResult<Self> {
        let truncated = value.trunc();
        if !truncated.is_finite() || truncated < f64::from(i32::MIN) || truncated > f64::from(i32::MAX) {
            return Err(DomainError::InvalidFieldValue {
                field: "temperature".to_string(),
                value: value.to_string(),
                expected: "a finite value within the i32 range".to_string(),
            });
        }
        Ok(Self(truncated as i32))
    }
}

impl fmt::Display for Celsius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Celsius {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i32>()
            .map(Self)
            .map_err(|e| DomainError::ParseError {
                field: "temperature".to_string(),
                reason: format!("{s:?}: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_plain_decimal() {
        assert_eq!(Celsius(23).to_string(), "23");
        assert_eq!(Celsius(-1).to_string(), "-1");
        assert_eq!(Celsius(0).to_string(), "0");
    }

    #[test]
    fn test_from_millidegrees_truncates() {
        assert_eq!(Celsius::from_millidegrees(42_999).unwrap(), Celsius(42));
        assert_eq!(Celsius::from_millidegrees(-1_500).unwrap(), Celsius(-1));
        assert_eq!(Celsius::from_millidegrees(999).unwrap(), Celsius(0));
    }

    #[test]
    fn test_from_millidegrees_out_of_range() {
        assert!(Celsius::from_millidegrees(i64::MAX).is_err());
    }

    #[test]
    fn test_from_fractional_truncates_not_rounds() {
        assert_eq!(Celsius::from_fractional(21.7).unwrap(), Celsius(21));
        assert_eq!(Celsius::from_fractional(21.2).unwrap(), Celsius(21));
        assert_eq!(Celsius::from_fractional(-3.9).unwrap(), Celsius(-3));
    }

    #[test]
    fn test_from_fractional_rejects_nan() {
        assert!(Celsius::from_fractional(f64::NAN).is_err());
        assert!(Celsius::from_fractional(f64::INFINITY).is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!("23".parse::<Celsius>().unwrap(), Celsius(23));
        assert_eq!("-1".parse::<Celsius>().unwrap(), Celsius(-1));
        assert!("21.7".parse::<Celsius>().is_err());
        assert!("".parse::<Celsius>().is_err());
    }
}
