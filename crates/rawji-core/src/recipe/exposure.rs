//! Exposure compensation in third-stop steps.
//!
//! The profile stores exposure as EV×10 rounded to an integer, so +1/3 EV
//! is 3, +2/3 EV is 7 and +5 EV is 50.

use std::fmt;

use super::ValidationError;

/// Largest magnitude, in thirds of a stop (±5 EV).
const MAX_THIRDS: i8 = 15;

/// How far a requested EV may sit from the nearest third stop. Lets
/// callers write 0.7 or 0.67 for 2/3.
const ALIGNMENT_TOLERANCE_EV: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExposureBias {
    thirds: i8,
}

impl ExposureBias {
    pub const ZERO: ExposureBias = ExposureBias { thirds: 0 };

    pub fn from_ev(ev: f64) -> Result<Self, ValidationError> {
        if !ev.is_finite() || ev.abs() > 5.0 + ALIGNMENT_TOLERANCE_EV {
            return Err(ValidationError::ExposureOutOfRange { ev });
        }
        let thirds = (ev * 3.0).round();
        if (ev - thirds / 3.0).abs() > ALIGNMENT_TOLERANCE_EV {
            return Err(ValidationError::ExposureNotAligned { ev });
        }
        Self::from_thirds(thirds as i8)
    }

    pub fn from_thirds(thirds: i8) -> Result<Self, ValidationError> {
        if !(-MAX_THIRDS..=MAX_THIRDS).contains(&thirds) {
            return Err(ValidationError::ExposureOutOfRange {
                ev: f64::from(thirds) / 3.0,
            });
        }
        Ok(Self { thirds })
    }

    pub fn thirds(self) -> i8 {
        self.thirds
    }

    pub fn ev(self) -> f64 {
        f64::from(self.thirds) / 3.0
    }

    /// Profile value (EV×10).
    pub fn to_raw(self) -> i32 {
        (f64::from(self.thirds) * 10.0 / 3.0).round() as i32
    }

    /// Accepts only values this encoding produces.
    pub fn from_raw(raw: i32) -> Result<Self, ValidationError> {
        let thirds = (f64::from(raw) * 3.0 / 10.0).round();
        if thirds.abs() > f64::from(MAX_THIRDS) {
            return Err(ValidationError::ExposureOutOfRange {
                ev: f64::from(raw) / 10.0,
            });
        }
        let exposure = Self {
            thirds: thirds as i8,
        };
        if exposure.to_raw() != raw {
            return Err(ValidationError::ExposureNotAligned {
                ev: f64::from(raw) / 10.0,
            });
        }
        Ok(exposure)
    }
}

impl fmt::Display for ExposureBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+.2} EV", self.ev())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_third_stop_alignment() {
        assert_eq!(ExposureBias::from_ev(0.67).unwrap().thirds(), 2);
        assert_eq!(ExposureBias::from_ev(0.7).unwrap().thirds(), 2);
        assert_eq!(ExposureBias::from_ev(-1.33).unwrap().thirds(), -4);
        assert_eq!(ExposureBias::from_ev(1.0).unwrap().thirds(), 3);
        assert!(matches!(
            ExposureBias::from_ev(0.5),
            Err(ValidationError::ExposureNotAligned { .. })
        ));
        assert!(matches!(
            ExposureBias::from_ev(-2.5),
            Err(ValidationError::ExposureNotAligned { .. })
        ));
    }

    #[test]
    fn test_range() {
        assert_eq!(ExposureBias::from_ev(5.0).unwrap().to_raw(), 50);
        assert_eq!(ExposureBias::from_ev(-5.0).unwrap().to_raw(), -50);
        assert!(matches!(
            ExposureBias::from_ev(5.33),
            Err(ValidationError::ExposureOutOfRange { .. })
        ));
        assert!(ExposureBias::from_thirds(16).is_err());
        assert!(ExposureBias::from_ev(f64::NAN).is_err());
    }

    #[test]
    fn test_raw_encoding() {
        let raws: Vec<i32> = (-3..=3)
            .map(|t| ExposureBias::from_thirds(t).unwrap().to_raw())
            .collect();
        assert_eq!(raws, vec![-10, -7, -3, 0, 3, 7, 10]);

        for thirds in -MAX_THIRDS..=MAX_THIRDS {
            let exposure = ExposureBias::from_thirds(thirds).unwrap();
            assert_eq!(ExposureBias::from_raw(exposure.to_raw()).unwrap(), exposure);
        }
        // 5 is half way between 1/3 (3) and 2/3 (7).
        assert!(ExposureBias::from_raw(5).is_err());
        assert!(ExposureBias::from_raw(60).is_err());
    }
}
