//! Pan calibration

/// Clamp a pan value into [-1, 1]; NaN maps to centre
pub fn clamp_pan(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Raw tracker pan plus a user calibration offset
#[derive(Debug, Clone, Default)]
pub struct PanCalibration {
    offset: f64,
    current: f64,
}

impl PanCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calibrate a raw value: `clamp(raw + offset, -1, 1)`
    pub fn apply(&mut self, raw: f64) -> f64 {
        self.current = clamp_pan(raw + self.offset);
        self.current
    }

    /// Make the current pan the new centre.
    ///
    /// After this, a raw input equal to the pan shown before recentering
    /// maps to 0.
    pub fn recenter(&mut self) {
        self.offset = -self.current;
        self.current = 0.0;
        tracing::info!("Recentered, calibration offset {:.3}", self.offset);
    }

    /// Forget the current pan (offset is kept)
    pub fn reset(&mut self) {
        self.current = 0.0;
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_apply_with_zero_offset() {
        let mut cal = PanCalibration::new();
        assert_eq!(cal.apply(0.5), 0.5);
        assert_eq!(cal.apply(-1.7), -1.0);
        assert_eq!(cal.apply(3.0), 1.0);
    }

    #[test]
    fn test_recenter_makes_current_zero() {
        let mut cal = PanCalibration::new();
        cal.apply(0.3);
        cal.recenter();
        assert_eq!(cal.current(), 0.0);
        assert_eq!(cal.apply(0.3), 0.0);
        assert!((cal.apply(0.8) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_recenter_at_clamped_edge() {
        let mut cal = PanCalibration::new();
        assert_eq!(cal.apply(1.6), 1.0);
        cal.recenter();
        assert_eq!(cal.apply(1.0), 0.0);
    }

    #[test]
    fn test_reset_keeps_offset() {
        let mut cal = PanCalibration::new();
        cal.apply(-0.4);
        cal.recenter();
        cal.apply(0.0);
        cal.reset();
        assert_eq!(cal.current(), 0.0);
        assert!((cal.offset() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_nan_is_centre() {
        assert_eq!(clamp_pan(f64::NAN), 0.0);
    }

    proptest! {
        #[test]
        fn calibrated_pan_is_clamped(raw in proptest::num::f64::ANY, offset in -1e6f64..1e6) {
            let mut cal = PanCalibration { offset, current: 0.0 };
            let pan = cal.apply(raw);
            prop_assert!((-1.0..=1.0).contains(&pan));
        }

        #[test]
        fn recentered_value_maps_to_zero(first in -1.0f64..1.0, offset in -0.5f64..0.5) {
            let mut cal = PanCalibration { offset, current: 0.0 };
            let shown = cal.apply(first);
            cal.recenter();
            prop_assert!(cal.apply(shown).abs() < 1e-12);
        }
    }
}
