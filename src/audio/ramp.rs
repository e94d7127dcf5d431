//! Sample-accurate linear parameter ramps
//!
//! Instant jumps in pan or gain are audible as clicks, so every parameter
//! change moves from the current value to the target over a fixed window.

use std::time::Duration;

/// Linear ramp between the current value and a target
#[derive(Debug, Clone)]
pub struct LinearRamp {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl LinearRamp {
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Ramp from wherever the value is now (even mid-ramp) to `target`
    /// over `frames` frames. Zero frames jumps immediately.
    pub fn set_target(&mut self, target: f32, frames: u32) {
        self.target = target;
        if frames == 0 {
            self.current = target;
            self.step = 0.0;
            self.remaining = 0;
        } else {
            self.step = (target - self.current) / frames as f32;
            self.remaining = frames;
        }
    }

    /// Advance one frame and return the value for that frame
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            } else {
                self.current += self.step;
            }
        }
        self.current
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }
}

/// Number of frames covering `duration` at `sample_rate`
pub fn ramp_frames(duration: Duration, sample_rate: u32) -> u32 {
    (duration.as_secs_f64() * sample_rate as f64).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ramp_reaches_target() {
        let mut ramp = LinearRamp::new(0.0);
        ramp.set_target(1.0, 4);

        assert!((ramp.next() - 0.25).abs() < 1e-6);
        assert!((ramp.next() - 0.5).abs() < 1e-6);
        assert!((ramp.next() - 0.75).abs() < 1e-6);
        assert_eq!(ramp.next(), 1.0);
        assert!(!ramp.is_ramping());
        assert_eq!(ramp.next(), 1.0);
    }

    #[test]
    fn test_zero_frames_jumps() {
        let mut ramp = LinearRamp::new(-1.0);
        ramp.set_target(0.5, 0);
        assert_eq!(ramp.value(), 0.5);
        assert!(!ramp.is_ramping());
    }

    #[test]
    fn test_retarget_starts_from_current_value() {
        let mut ramp = LinearRamp::new(0.0);
        ramp.set_target(1.0, 10);
        for _ in 0..5 {
            ramp.next();
        }
        let midway = ramp.value();
        assert!((midway - 0.5).abs() < 1e-5);

        ramp.set_target(0.0, 5);
        let first = ramp.next();
        assert!(first < midway && first > 0.0);
    }

    #[test]
    fn test_ramp_frames() {
        assert_eq!(ramp_frames(Duration::from_millis(100), 48000), 4800);
        assert_eq!(ramp_frames(Duration::from_millis(100), 44100), 4410);
        assert_eq!(ramp_frames(Duration::ZERO, 48000), 0);
    }

    proptest! {
        #[test]
        fn ramp_stays_between_endpoints(
            start in -1.0f32..=1.0,
            target in -1.0f32..=1.0,
            frames in 1u32..2000,
        ) {
            let mut ramp = LinearRamp::new(start);
            ramp.set_target(target, frames);
            let (lo, hi) = if start < target { (start, target) } else { (target, start) };
            for _ in 0..frames {
                let v = ramp.next();
                prop_assert!(v >= lo - 1e-4 && v <= hi + 1e-4);
            }
            prop_assert_eq!(ramp.value(), target);
        }
    }
}
