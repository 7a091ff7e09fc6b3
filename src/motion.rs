use nalgebra::{distance, Point2};
use serde::{Deserialize, Serialize};

use crate::landmarks::{Frame, Handedness};

/// Capture rate assumed when converting per-frame quantities to per-second.
pub const ASSUMED_FPS: f32 = 30.0;

/// Net displacement below this is reported as no direction.
const DIRECTION_EPSILON: f32 = 0.02;

const CIRCULAR_MAX_SPREAD: f32 = 0.3;
const WAVE_MIN_X_STD: f32 = 0.1;
const WAVE_MAX_Y_STD: f32 = 0.05;
const LINEAR_RANGE_DOMINANCE: f32 = 3.0;
const LINEAR_MIN_CORRELATION: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionType {
    Static,
    Linear,
    Circular,
    Wave,
    Complex,
    None,
}

impl MotionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionType::Static => "static",
            MotionType::Linear => "linear",
            MotionType::Circular => "circular",
            MotionType::Wave => "wave",
            MotionType::Complex => "complex",
            MotionType::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionFeatures {
    pub motion_type: MotionType,
    pub direction: Direction,
    pub repetitions: u32,
    /// Mean per-step displacement per second of buffer.
    pub speed: f32,
    /// Mean per-step displacement scaled to 30 fps.
    pub motion_level: f32,
    pub frame_count: usize,
    /// Which hand the trajectory follows. None when no hand was seen.
    pub hand: Option<Handedness>,
}

impl MotionFeatures {
    fn no_hand(frame_count: usize) -> MotionFeatures {
        MotionFeatures {
            motion_type: MotionType::None,
            direction: Direction::None,
            repetitions: 1,
            speed: 0.0,
            motion_level: 0.0,
            frame_count,
            hand: None,
        }
    }

    /// True when the trajectory carries enough movement for the dynamic path.
    pub fn is_dynamic(&self) -> bool {
        !matches!(self.motion_type, MotionType::Static | MotionType::None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionConfig {
    /// Frames needed for the quick static/moving check.
    pub min_quick_frames: usize,
    /// Frames needed before a trajectory is classified.
    pub min_frames: usize,
    /// Motion level below which a buffer counts as static, in normalised
    /// screen units per second.
    pub static_threshold: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            min_quick_frames: 5,
            min_frames: 10,
            static_threshold: 0.15,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MotionAnalyzer {
    config: MotionConfig,
}

impl MotionAnalyzer {
    pub fn new(config: MotionConfig) -> MotionAnalyzer {
        MotionAnalyzer { config }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Quick movement measure. None until `min_quick_frames` are buffered.
    ///
    /// The unit is normalised screen units per second: the mean wrist
    /// displacement between consecutive frames, scaled by [`ASSUMED_FPS`].
    /// `static_threshold` is compared in the same unit.
    pub fn motion_level(&self, frames: &[Frame]) -> Option<f32> {
        if frames.len() < self.config.min_quick_frames {
            return None;
        }
        let (_, path) = tracked_path(frames)?;
        Some(mean_step(&path) * ASSUMED_FPS)
    }

    pub fn is_static(&self, frames: &[Frame]) -> Option<bool> {
        self.motion_level(frames)
            .map(|level| level < self.config.static_threshold)
    }

    /// Full trajectory analysis. None until `min_frames` are buffered.
    pub fn analyze(&self, frames: &[Frame]) -> Option<MotionFeatures> {
        if frames.len() < self.config.min_frames {
            return None;
        }
        let Some((hand, path)) = tracked_path(frames) else {
            return Some(MotionFeatures::no_hand(frames.len()));
        };

        let step = mean_step(&path);
        let motion_level = step * ASSUMED_FPS;
        let duration = frames.len() as f32 / ASSUMED_FPS;
        let speed = step / duration;

        let motion_type = if motion_level < self.config.static_threshold {
            MotionType::Static
        } else {
            classify_shape(&path)
        };

        Some(MotionFeatures {
            motion_type,
            direction: net_direction(&path),
            repetitions: count_peaks(&path).max(1),
            speed,
            motion_level,
            frame_count: frames.len(),
            hand: Some(hand),
        })
    }
}

// Wrist positions of the right hand, or of the left hand if the right one never shows.
fn tracked_path(frames: &[Frame]) -> Option<(Handedness, Vec<Point2<f32>>)> {
    for handedness in [Handedness::Right, Handedness::Left] {
        let path: Vec<Point2<f32>> = frames
            .iter()
            .filter_map(|f| f.hand(handedness))
            .map(|h| h.wrist().xy())
            .collect();
        if !path.is_empty() {
            return Some((handedness, path));
        }
    }
    None
}

fn mean_step(path: &[Point2<f32>]) -> f32 {
    if path.len() < 2 {
        return 0.0;
    }
    let total: f32 = path.windows(2).map(|w| distance(&w[0], &w[1])).sum();
    total / (path.len() - 1) as f32
}

fn mean_std(values: impl Iterator<Item = f32> + Clone) -> (f32, f32) {
    let n = values.clone().count().max(1) as f32;
    let mean = values.clone().sum::<f32>() / n;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, var.sqrt())
}

fn range(values: impl Iterator<Item = f32>) -> f32 {
    let (lo, hi) = values.fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if hi < lo {
        0.0
    } else {
        hi - lo
    }
}

fn pearson(path: &[Point2<f32>]) -> f32 {
    let (mx, sx) = mean_std(path.iter().map(|p| p.x));
    let (my, sy) = mean_std(path.iter().map(|p| p.y));
    if sx < f32::EPSILON || sy < f32::EPSILON {
        return 0.0;
    }
    let cov = path.iter().map(|p| (p.x - mx) * (p.y - my)).sum::<f32>() / path.len() as f32;
    cov / (sx * sy)
}

/// Checked in order: circular, wave, linear, complex.
pub fn classify_shape(path: &[Point2<f32>]) -> MotionType {
    if path.len() < 2 {
        return MotionType::Static;
    }
    let (cx, _) = mean_std(path.iter().map(|p| p.x));
    let (cy, _) = mean_std(path.iter().map(|p| p.y));
    let centroid = Point2::new(cx, cy);

    let (mean_dist, std_dist) = mean_std(path.iter().map(|p| distance(p, &centroid)));
    if mean_dist < f32::EPSILON {
        return MotionType::Static;
    }
    if std_dist / mean_dist < CIRCULAR_MAX_SPREAD {
        return MotionType::Circular;
    }

    let (_, std_x) = mean_std(path.iter().map(|p| p.x));
    let (_, std_y) = mean_std(path.iter().map(|p| p.y));
    if std_x > WAVE_MIN_X_STD && std_y < WAVE_MAX_Y_STD {
        return MotionType::Wave;
    }

    let range_x = range(path.iter().map(|p| p.x));
    let range_y = range(path.iter().map(|p| p.y));
    let dominant = range_x >= LINEAR_RANGE_DOMINANCE * range_y
        || range_y >= LINEAR_RANGE_DOMINANCE * range_x;
    if dominant || pearson(path).abs() > LINEAR_MIN_CORRELATION {
        return MotionType::Linear;
    }

    MotionType::Complex
}

/// First-to-last displacement. The horizontal axis wins ties.
pub fn net_direction(path: &[Point2<f32>]) -> Direction {
    let (Some(first), Some(last)) = (path.first(), path.last()) else {
        return Direction::None;
    };
    let d = last - first;
    if d.x.abs() < DIRECTION_EPSILON && d.y.abs() < DIRECTION_EPSILON {
        return Direction::None;
    }
    if d.x.abs() >= d.y.abs() {
        if d.x > 0.0 {
            Direction::Right
        } else {
            Direction::Left
        }
    } else if d.y > 0.0 {
        Direction::Down
    } else {
        Direction::Up
    }
}

/// Strict local maxima of the y series.
pub fn count_peaks(path: &[Point2<f32>]) -> u32 {
    path.windows(3)
        .filter(|w| w[1].y > w[0].y && w[1].y > w[2].y)
        .count() as u32
}
