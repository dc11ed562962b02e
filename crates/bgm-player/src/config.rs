//! Player Configuration
//!
//! Fade shapes, look-ahead and random seeding. Loadable from JSON; missing
//! fields fall back to their defaults.

use bgm_core::Curve;
use serde::{Deserialize, Serialize};

use crate::{PlayerError, PlayerResult};

/// Player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Fade-in length (seconds)
    #[serde(default = "default_fade_time")]
    pub fade_in_time: f64,
    /// Strength over normalized fade-in progress
    #[serde(default = "default_fade_curve")]
    pub fade_in_curve: Curve,
    /// Fade-out length (seconds)
    #[serde(default = "default_fade_time")]
    pub fade_out_time: f64,
    /// Strength over normalized remaining fade-out (1 = fade just started)
    #[serde(default = "default_fade_curve")]
    pub fade_out_curve: Curve,
    /// How early the next loop is scheduled before the loop boundary (seconds)
    #[serde(default = "default_look_ahead")]
    pub look_ahead: f64,
    /// Drop pending sequence events when the session is torn down
    #[serde(default)]
    pub cancel_pending_on_stop: bool,
    /// Fixed seed for trigger rolls (None = OS entropy)
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_fade_time() -> f64 {
    1.0
}

fn default_fade_curve() -> Curve {
    Curve::ease_in_out(0.0, 0.0, 1.0, 1.0)
}

fn default_look_ahead() -> f64 {
    0.1
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            fade_in_time: default_fade_time(),
            fade_in_curve: default_fade_curve(),
            fade_out_time: default_fade_time(),
            fade_out_curve: default_fade_curve(),
            look_ahead: default_look_ahead(),
            cancel_pending_on_stop: false,
            seed: None,
        }
    }
}

impl PlayerConfig {
    /// Builder: fade-in
    pub fn with_fade_in(mut self, time: f64, curve: Curve) -> Self {
        self.fade_in_time = time;
        self.fade_in_curve = curve;
        self
    }

    /// Builder: fade-out
    pub fn with_fade_out(mut self, time: f64, curve: Curve) -> Self {
        self.fade_out_time = time;
        self.fade_out_curve = curve;
        self
    }

    /// Builder: look-ahead
    pub fn with_look_ahead(mut self, look_ahead: f64) -> Self {
        self.look_ahead = look_ahead;
        self
    }

    /// Builder: cancel pending sequence events on teardown
    pub fn with_cancel_pending_on_stop(mut self, cancel: bool) -> Self {
        self.cancel_pending_on_stop = cancel;
        self
    }

    /// Builder: fixed seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Load config from JSON string
    pub fn from_json(json: &str) -> PlayerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load and validate config from JSON string
    pub fn load(json: &str) -> PlayerResult<Self> {
        let config = Self::from_json(json)?;
        config
            .validate()
            .map_err(|errors| PlayerError::Config(errors.join("; ")))?;
        Ok(config)
    }

    /// Save config to JSON string
    pub fn to_json(&self) -> PlayerResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save config to compact JSON
    pub fn to_json_compact(&self) -> PlayerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Validate config
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("fade_in_time", self.fade_in_time),
            ("fade_out_time", self.fade_out_time),
            ("look_ahead", self.look_ahead),
        ] {
            if !value.is_finite() || value < 0.0 {
                errors.push(format!("{} must be a finite, non-negative number (got {})", name, value));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Copy with invalid times replaced by 0
    pub fn sanitized(&self) -> Self {
        let fix = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        Self {
            fade_in_time: fix(self.fade_in_time),
            fade_out_time: fix(self.fade_out_time),
            look_ahead: fix(self.look_ahead),
            ..self.clone()
        }
    }
}
