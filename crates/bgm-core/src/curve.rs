//! Keyframe Curves
//!
//! Piecewise cubic curves used for every volume shape in the sequencer:
//! per-sequence volume over time, per-sequence volume over strength, and the
//! player's fade-in/fade-out shapes.
//!
//! Each segment is a cubic Hermite spline between two keyframes, driven by the
//! left key's out-tangent and the right key's in-tangent. An infinite tangent
//! on either side turns the segment into a step that holds the left value.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// KEYFRAME
// ═══════════════════════════════════════════════════════════════════════════════

/// Single curve keyframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Position on the curve (x)
    pub time: f32,
    /// Output value at `time` (y)
    pub value: f32,
    /// Slope arriving from the previous key
    #[serde(default)]
    pub in_tangent: f32,
    /// Slope leaving toward the next key
    #[serde(default)]
    pub out_tangent: f32,
}

impl Keyframe {
    /// Create a keyframe with flat tangents
    pub fn new(time: f32, value: f32) -> Self {
        Self {
            time,
            value,
            in_tangent: 0.0,
            out_tangent: 0.0,
        }
    }

    /// Create a keyframe with explicit tangents
    pub fn with_tangents(time: f32, value: f32, in_tangent: f32, out_tangent: f32) -> Self {
        Self {
            time,
            value,
            in_tangent,
            out_tangent,
        }
    }

    /// Create a stepped keyframe (holds its value until the next key)
    pub fn stepped(time: f32, value: f32) -> Self {
        Self::with_tangents(time, value, f32::INFINITY, f32::INFINITY)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CURVE
// ═══════════════════════════════════════════════════════════════════════════════

/// Keyframe curve over the normalized domain [0, 1]
///
/// Serialized as a plain array of keyframes. Keys are always kept sorted by
/// `time`, including after deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Keyframe>", into = "Vec<Keyframe>")]
pub struct Curve {
    keys: Vec<Keyframe>,
}

impl Curve {
    /// Create an empty curve (evaluates to 0 everywhere)
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Create a curve from arbitrary keys (sorted on construction)
    pub fn from_keys(mut keys: Vec<Keyframe>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    /// Flat curve returning `value` everywhere
    pub fn constant(value: f32) -> Self {
        Self {
            keys: vec![Keyframe::new(0.0, value), Keyframe::new(1.0, value)],
        }
    }

    /// Straight line from (t0, v0) to (t1, v1)
    pub fn linear(t0: f32, v0: f32, t1: f32, v1: f32) -> Self {
        if t0 == t1 {
            return Self::from_keys(vec![Keyframe::new(t0, v1)]);
        }
        let slope = (v1 - v0) / (t1 - t0);
        Self::from_keys(vec![
            Keyframe::with_tangents(t0, v0, 0.0, slope),
            Keyframe::with_tangents(t1, v1, slope, 0.0),
        ])
    }

    /// Smooth S-shaped curve from (t0, v0) to (t1, v1) with flat ends
    pub fn ease_in_out(t0: f32, v0: f32, t1: f32, v1: f32) -> Self {
        if t0 == t1 {
            return Self::from_keys(vec![Keyframe::new(t0, v1)]);
        }
        Self::from_keys(vec![Keyframe::new(t0, v0), Keyframe::new(t1, v1)])
    }

    /// Insert a keyframe, keeping keys sorted
    pub fn add_key(&mut self, key: Keyframe) {
        let pos = self.keys.partition_point(|k| k.time <= key.time);
        self.keys.insert(pos, key);
    }

    /// All keyframes, sorted by time
    #[inline]
    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    /// Number of keyframes
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if the curve has no keyframes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Evaluate the curve at `t`
    ///
    /// `t` is clamped to [0, 1] first. Outside the key range the nearest
    /// boundary key's value is returned.
    pub fn evaluate(&self, t: f32) -> f32 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return 0.0,
        };

        if t <= first.time {
            return first.value;
        }
        if t >= last.time {
            return last.value;
        }

        // first.time < t < last.time, so idx is in 1..len
        let idx = self.keys.partition_point(|k| k.time <= t);
        hermite(&self.keys[idx - 1], &self.keys[idx], t)
    }
}

impl Default for Curve {
    fn default() -> Self {
        Self::constant(1.0)
    }
}

impl From<Vec<Keyframe>> for Curve {
    fn from(keys: Vec<Keyframe>) -> Self {
        Self::from_keys(keys)
    }
}

impl From<Curve> for Vec<Keyframe> {
    fn from(curve: Curve) -> Self {
        curve.keys
    }
}

/// Cubic Hermite segment between two keys
#[inline]
fn hermite(k0: &Keyframe, k1: &Keyframe, t: f32) -> f32 {
    let width = k1.time - k0.time;
    if width <= 0.0 {
        return k1.value;
    }
    if !k0.out_tangent.is_finite() || !k1.in_tangent.is_finite() {
        return k0.value;
    }

    let s = (t - k0.time) / width;
    let s2 = s * s;
    let s3 = s2 * s;

    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;

    h00 * k0.value + h10 * width * k0.out_tangent + h01 * k1.value + h11 * width * k1.in_tangent
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
