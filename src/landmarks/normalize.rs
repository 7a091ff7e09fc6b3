//! Data-boundary normalisation for landmark sets.
//!
//! Both the simple and the holistic message formats funnel through
//! [`normalize_points`], so every landmark in the system went through the same
//! clamping rules.

use serde::{Deserialize, Deserializer, Serialize};

use super::{Landmark, HAND_LANDMARKS};

/// A landmark as it arrives on the wire. Any coordinate may be missing or
/// non-numeric, and an entry that is not an object at all deserializes to a
/// point with every coordinate missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RawLandmark {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
}

impl RawLandmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }
}

impl From<&Landmark> for RawLandmark {
    fn from(p: &Landmark) -> Self {
        RawLandmark::new(p.x, p.y, p.z)
    }
}

impl<'de> Deserialize<'de> for RawLandmark {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let serde_json::Value::Object(fields) = serde_json::Value::deserialize(deserializer)? else {
            return Ok(RawLandmark::default());
        };
        let field = |name: &str| fields.get(name).and_then(lenient_coordinate);
        Ok(RawLandmark {
            x: field("x"),
            y: field("y"),
            z: field("z"),
        })
    }
}

// Numbers and numeric strings parse; anything else is None.
fn lenient_coordinate(value: &serde_json::Value) -> Option<f32> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.map(|v| v as f32).filter(|v| v.is_finite())
}

fn coordinate(value: Option<f32>) -> f32 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Truncate to `limit` points, clamp x/y into [0,1], pass z through.
/// Missing coordinates become 0. Short input is not padded.
pub fn normalize_points(raw: &[RawLandmark], limit: usize) -> Vec<Landmark> {
    raw.iter()
        .take(limit)
        .map(|r| {
            Landmark::new(
                coordinate(r.x).clamp(0.0, 1.0),
                coordinate(r.y).clamp(0.0, 1.0),
                coordinate(r.z),
            )
        })
        .collect()
}

/// Normalise one hand. The caller treats fewer than 21 outputs as invalid.
pub fn normalize_landmarks(raw: &[RawLandmark]) -> Vec<Landmark> {
    normalize_points(raw, HAND_LANDMARKS)
}
