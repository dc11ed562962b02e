//! Strength Envelope
//!
//! Session-wide intensity in [0, 1]. A `playingness` accumulator moves toward
//! the fade-in length while playing and back toward 0 while stopping; the
//! fade curves map its normalized position to strength.

use bgm_core::Curve;

use crate::config::PlayerConfig;

/// Direction the envelope is moving in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadeDirection {
    #[default]
    In,
    Out,
}

/// Fade-in / fade-out state machine
#[derive(Debug, Clone)]
pub struct StrengthEnvelope {
    strength: f32,
    playingness: f64,
    fade_in_time: f64,
    fade_out_time: f64,
    fade_in_curve: Curve,
    fade_out_curve: Curve,
    direction: FadeDirection,
}

impl StrengthEnvelope {
    /// Envelope at strength 0, about to fade in
    pub fn new(fade_in_time: f64, fade_in_curve: Curve, fade_out_time: f64, fade_out_curve: Curve) -> Self {
        Self {
            strength: 0.0,
            playingness: 0.0,
            fade_in_time: sanitize_time(fade_in_time),
            fade_out_time: sanitize_time(fade_out_time),
            fade_in_curve,
            fade_out_curve,
            direction: FadeDirection::In,
        }
    }

    /// Envelope using the player's fade settings
    pub fn from_config(config: &PlayerConfig) -> Self {
        Self::new(
            config.fade_in_time,
            config.fade_in_curve.clone(),
            config.fade_out_time,
            config.fade_out_curve.clone(),
        )
    }

    /// Change fade direction
    ///
    /// `playingness` is clamped into the new direction's range, so a fade-out
    /// never lasts longer than `fade_out_time`.
    pub fn set_direction(&mut self, direction: FadeDirection) {
        self.direction = direction;
        let limit = match direction {
            FadeDirection::In => self.fade_in_time,
            FadeDirection::Out => self.fade_out_time,
        };
        self.playingness = self.playingness.clamp(0.0, limit);
    }

    /// Step by `dt` seconds and return the new strength
    pub fn advance(&mut self, dt: f64) -> f32 {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };

        self.strength = match self.direction {
            FadeDirection::In => {
                self.playingness = (self.playingness + dt).clamp(0.0, self.fade_in_time);
                if self.playingness < self.fade_in_time {
                    self.fade_in_curve
                        .evaluate((self.playingness / self.fade_in_time) as f32)
                } else {
                    1.0
                }
            }
            FadeDirection::Out => {
                self.playingness = (self.playingness - dt).clamp(0.0, self.fade_out_time);
                if self.playingness > 0.0 {
                    self.fade_out_curve
                        .evaluate((self.playingness / self.fade_out_time) as f32)
                } else {
                    0.0
                }
            }
        }
        .clamp(0.0, 1.0);

        self.strength
    }

    #[inline]
    pub fn strength(&self) -> f32 {
        self.strength
    }

    #[inline]
    pub fn playingness(&self) -> f64 {
        self.playingness
    }

    #[inline]
    pub fn direction(&self) -> FadeDirection {
        self.direction
    }

    /// True once a fade-out has reached strength 0
    #[inline]
    pub fn is_silent(&self) -> bool {
        self.direction == FadeDirection::Out && self.strength <= 0.0
    }
}

fn sanitize_time(time: f64) -> f64 {
    if time.is_finite() && time > 0.0 { time } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn linear_envelope(fade_in: f64, fade_out: f64) -> StrengthEnvelope {
        StrengthEnvelope::new(
            fade_in,
            Curve::linear(0.0, 0.0, 1.0, 1.0),
            fade_out,
            Curve::linear(0.0, 0.0, 1.0, 1.0),
        )
    }

    #[test]
    fn test_fade_in_linear() {
        let mut env = linear_envelope(2.0, 1.0);
        assert_eq!(env.strength(), 0.0);

        assert_relative_eq!(env.advance(1.0), 0.5, epsilon = 1e-5);
        assert_eq!(env.advance(1.0), 1.0);
        assert_eq!(env.advance(5.0), 1.0);
        assert_eq!(env.playingness(), 2.0);
    }

    #[test]
    fn test_fade_out_reaches_zero() {
        let mut env = linear_envelope(1.0, 1.0);
        env.advance(1.0);
        assert_eq!(env.strength(), 1.0);

        env.set_direction(FadeDirection::Out);
        assert!(!env.is_silent());
        assert_eq!(env.advance(1.0), 0.0);
        assert!(env.is_silent());
    }

    #[test]
    fn test_fade_out_bounded_by_fade_out_time() {
        let mut env = linear_envelope(4.0, 1.0);
        env.advance(4.0);

        env.set_direction(FadeDirection::Out);
        assert_eq!(env.playingness(), 1.0);
        assert_relative_eq!(env.advance(0.5), 0.5, epsilon = 1e-5);
        assert_eq!(env.advance(0.5), 0.0);
    }

    #[test]
    fn test_reverse_mid_fade() {
        let mut env = linear_envelope(2.0, 2.0);
        env.advance(2.0);
        env.set_direction(FadeDirection::Out);
        assert_relative_eq!(env.advance(1.0), 0.5, epsilon = 1e-5);

        env.set_direction(FadeDirection::In);
        assert_relative_eq!(env.advance(0.5), 0.75, epsilon = 1e-5);
        assert!(!env.is_silent());
    }

    #[test]
    fn test_zero_fade_times() {
        let mut env = linear_envelope(0.0, 0.0);
        assert_eq!(env.advance(0.0), 1.0);

        env.set_direction(FadeDirection::Out);
        assert_eq!(env.advance(0.0), 0.0);
        assert!(env.is_silent());
    }

    #[test]
    fn test_invalid_dt_is_ignored() {
        let mut env = linear_envelope(2.0, 2.0);
        env.advance(1.0);
        let before = env.strength();

        assert_eq!(env.advance(f64::NAN), before);
        assert_eq!(env.advance(-3.0), before);
        assert_eq!(env.playingness(), 1.0);
    }

    #[test]
    fn test_negative_fade_time_treated_as_zero() {
        let mut env = linear_envelope(-1.0, f64::INFINITY);
        assert_eq!(env.advance(0.1), 1.0);
        env.set_direction(FadeDirection::Out);
        assert_eq!(env.advance(0.1), 0.0);
    }
}
