//! Generated landmark streams for demos and tests.
//!
//! Hands are built in image coordinates around a wrist position, fingers
//! pointing up (negative y).

use std::f32::consts::PI;

use crate::landmarks::{Frame, Hand, Landmark, RawLandmark};
use crate::motion::ASSUMED_FPS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoShape {
    Open,
    Fist,
    Pointing,
    Peace,
    ILoveYou,
}

impl DemoShape {
    /// Extended flags in thumb..pinky order.
    pub fn fingers(self) -> [bool; 5] {
        match self {
            DemoShape::Open => [true; 5],
            DemoShape::Fist => [false; 5],
            DemoShape::Pointing => [false, true, false, false, false],
            DemoShape::Peace => [false, true, true, false, false],
            DemoShape::ILoveYou => [true, true, false, false, true],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trajectory {
    Hold,
    /// Two horizontal oscillations of amplitude 0.2.
    Wave,
    /// Two vertical oscillations of amplitude 0.1.
    Nod,
    Circle,
}

const FINGER_X: [f32; 4] = [-0.04, 0.0, 0.04, 0.08];
const EXTENDED_Y: [f32; 4] = [-0.10, -0.14, -0.17, -0.20];
const CURLED_Y: [f32; 4] = [-0.10, -0.13, -0.10, -0.08];

/// 21 landmarks for `shape` with the wrist at `wrist`.
pub fn synthetic_hand(shape: DemoShape, wrist: (f32, f32)) -> Vec<Landmark> {
    let (bx, by) = wrist;
    let fingers = shape.fingers();
    let at = |dx: f32, dy: f32| Landmark::new(bx + dx, by + dy, 0.0);

    let mut points = Vec::with_capacity(21);
    points.push(at(0.0, 0.0));

    points.push(at(-0.04, -0.03));
    points.push(at(-0.07, -0.05));
    points.push(at(-0.09, -0.07));
    if fingers[0] {
        points.push(at(-0.12, -0.09));
    } else {
        points.push(at(-0.03, -0.08));
    }

    for (finger, x) in FINGER_X.iter().enumerate() {
        let ys = if fingers[finger + 1] {
            &EXTENDED_Y
        } else {
            &CURLED_Y
        };
        points.extend(ys.iter().map(|y| at(*x, *y)));
    }
    points
}

pub fn synthetic_raw_hand(shape: DemoShape, wrist: (f32, f32)) -> Vec<RawLandmark> {
    synthetic_hand(shape, wrist)
        .iter()
        .map(RawLandmark::from)
        .collect()
}

/// Wrist positions for `frames` steps of `trajectory` around `center`.
pub fn trajectory(kind: Trajectory, frames: usize, center: (f32, f32)) -> Vec<(f32, f32)> {
    let (cx, cy) = center;
    (0..frames)
        .map(|i| {
            let t = i as f32 / frames.max(1) as f32;
            match kind {
                Trajectory::Hold => (cx, cy),
                Trajectory::Wave => (cx + 0.2 * (4.0 * PI * t).sin(), cy),
                Trajectory::Nod => (cx, cy + 0.1 * (4.0 * PI * t).sin()),
                Trajectory::Circle => (
                    cx + 0.15 * (2.0 * PI * t).cos(),
                    cy + 0.15 * (2.0 * PI * t).sin(),
                ),
            }
        })
        .collect()
}

/// A right-hand clip at the assumed capture rate.
pub fn synthetic_frames(
    shape: DemoShape,
    kind: Trajectory,
    frames: usize,
    center: (f32, f32),
) -> Vec<Frame> {
    trajectory(kind, frames, center)
        .into_iter()
        .enumerate()
        .map(|(i, wrist)| Frame {
            right_hand: Hand::from_points(&synthetic_hand(shape, wrist)).ok(),
            timestamp: i as f64 / ASSUMED_FPS as f64,
            ..Default::default()
        })
        .collect()
}
