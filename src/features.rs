//! Static handshape features derived from a single hand.
//!
//! Finger extension uses the image y axis (y grows downward): a finger is
//! extended when its tip sits above its PIP joint by more than
//! [`EXTENSION_EPSILON`].
//!
//! The thumb folds across the palm rather than down it, so it is tested on x:
//! the thumb counts as extended when its tip lies further from the index MCP
//! than its IP joint does, again by more than the epsilon. The test measures
//! distance to the index knuckle, so it gives the same answer for either hand.

use nalgebra::distance;
use serde::{Deserialize, Serialize};

use crate::error::RecognitionError;
use crate::landmarks::{Finger, Hand, HandJoint, Landmark, HAND_LANDMARKS};

pub const EXTENSION_EPSILON: f32 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandShape {
    Fist,
    Open,
    Pointing,
    Peace,
    ILoveYou,
    Partial,
}

impl HandShape {
    /// Classify from the extended flags in thumb..pinky order.
    pub fn classify(fingers: &[bool; 5]) -> HandShape {
        let [thumb, index, middle, ring, pinky] = *fingers;
        match fingers.iter().filter(|f| **f).count() {
            0 => HandShape::Fist,
            5 => HandShape::Open,
            1 if index => HandShape::Pointing,
            2 if index && middle => HandShape::Peace,
            3 if thumb && index && pinky && !middle && !ring => HandShape::ILoveYou,
            _ => HandShape::Partial,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HandShape::Fist => "fist",
            HandShape::Open => "open",
            HandShape::Pointing => "pointing",
            HandShape::Peace => "peace",
            HandShape::ILoveYou => "i_love_you",
            HandShape::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PalmOrientation {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Back,
    Unknown,
}

impl PalmOrientation {
    /// Dominant axis of the wrist -> middle MCP vector.
    pub fn from_hand(hand: &Hand) -> PalmOrientation {
        let v = hand.joint(HandJoint::MiddleMcp) - hand.wrist();
        let (ax, ay, az) = (v.x.abs(), v.y.abs(), v.z.abs());
        if ax == 0.0 && ay == 0.0 && az == 0.0 {
            return PalmOrientation::Unknown;
        }
        if az > ax && az > ay {
            // MediaPipe depth is negative toward the camera.
            if v.z < 0.0 {
                PalmOrientation::Forward
            } else {
                PalmOrientation::Back
            }
        } else if ay >= ax {
            if v.y < 0.0 {
                PalmOrientation::Up
            } else {
                PalmOrientation::Down
            }
        } else if v.x > 0.0 {
            PalmOrientation::Right
        } else {
            PalmOrientation::Left
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalBand {
    High,
    Middle,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalBand {
    Left,
    Center,
    Right,
}

/// Where the hand sits in the camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenPosition {
    pub vertical: VerticalBand,
    pub horizontal: HorizontalBand,
}

impl ScreenPosition {
    pub fn from_points(points: &[Landmark]) -> ScreenPosition {
        let n = points.len().max(1) as f32;
        let mean_x = points.iter().map(|p| p.x).sum::<f32>() / n;
        let mean_y = points.iter().map(|p| p.y).sum::<f32>() / n;

        let vertical = if mean_y < 0.3 {
            VerticalBand::High
        } else if mean_y > 0.7 {
            VerticalBand::Low
        } else {
            VerticalBand::Middle
        };
        let horizontal = if mean_x < 0.3 {
            HorizontalBand::Left
        } else if mean_x > 0.7 {
            HorizontalBand::Right
        } else {
            HorizontalBand::Center
        };
        ScreenPosition {
            vertical,
            horizontal,
        }
    }
}

impl Default for ScreenPosition {
    fn default() -> Self {
        ScreenPosition {
            vertical: VerticalBand::Middle,
            horizontal: HorizontalBand::Center,
        }
    }
}

/// Features of one hand. Recomputed every frame, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct HandFeatures {
    /// False for the sentinel returned when the input was not a full hand.
    pub valid: bool,
    /// Extended flags in thumb, index, middle, ring, pinky order.
    pub fingers: [bool; 5],
    pub shape: HandShape,
    pub palm: PalmOrientation,
    pub position: ScreenPosition,
    /// Mean fingertip distance to the middle MCP.
    pub openness: f32,
}

impl HandFeatures {
    pub fn invalid() -> HandFeatures {
        HandFeatures {
            valid: false,
            fingers: [false; 5],
            shape: HandShape::Partial,
            palm: PalmOrientation::Unknown,
            position: ScreenPosition::default(),
            openness: 0.0,
        }
    }

    pub fn from_hand(hand: &Hand) -> HandFeatures {
        let mut fingers = [false; 5];
        for (slot, finger) in fingers.iter_mut().zip(Finger::ALL) {
            *slot = finger_extended(hand, finger);
        }

        HandFeatures {
            valid: true,
            fingers,
            shape: HandShape::classify(&fingers),
            palm: PalmOrientation::from_hand(hand),
            position: ScreenPosition::from_points(hand.points()),
            openness: openness(hand),
        }
    }

    /// Strict variant: anything but exactly 21 points is an error.
    pub fn try_from_points(points: &[Landmark]) -> Result<HandFeatures, RecognitionError> {
        Hand::from_points(points).map(|hand| HandFeatures::from_hand(&hand))
    }

    pub fn extended(&self, finger: Finger) -> bool {
        self.fingers[finger as usize]
    }

    pub fn extended_count(&self) -> usize {
        self.fingers.iter().filter(|f| **f).count()
    }
}

/// Lenient variant: short or long input yields [`HandFeatures::invalid`].
pub fn extract_features(points: &[Landmark]) -> HandFeatures {
    HandFeatures::try_from_points(points).unwrap_or_else(|_| HandFeatures::invalid())
}

pub fn finger_extended(hand: &Hand, finger: Finger) -> bool {
    let tip = hand.joint(finger.tip());
    let pip = hand.joint(finger.pip());
    match finger {
        Finger::Thumb => {
            let anchor = hand.joint(HandJoint::IndexMcp).x;
            (tip.x - anchor).abs() > (pip.x - anchor).abs() + EXTENSION_EPSILON
        }
        _ => tip.y < pip.y - EXTENSION_EPSILON,
    }
}

pub fn openness(hand: &Hand) -> f32 {
    let palm = hand.joint(HandJoint::MiddleMcp);
    let total: f32 = Finger::ALL
        .iter()
        .map(|f| distance(&hand.joint(f.tip()), &palm))
        .sum();
    total / Finger::ALL.len() as f32
}

/// Per-joint mean over a set of hands (used to steady a static pose).
pub fn average_hand<'a, I>(hands: I) -> Option<Hand>
where
    I: IntoIterator<Item = &'a Hand>,
{
    let mut sum = [nalgebra::Vector3::<f32>::zeros(); HAND_LANDMARKS];
    let mut count = 0usize;
    for hand in hands {
        for (acc, p) in sum.iter_mut().zip(hand.points()) {
            *acc += p.coords;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let points: Vec<Landmark> = sum
        .iter()
        .map(|v| Landmark::from(*v / count as f32))
        .collect();
    Hand::from_points(&points).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{synthetic_hand, DemoShape};

    fn make_hand(shape: DemoShape) -> Hand {
        Hand::from_points(&synthetic_hand(shape, (0.5, 0.4))).unwrap()
    }

    #[test]
    fn test_fist() {
        let features = HandFeatures::from_hand(&make_hand(DemoShape::Fist));
        assert!(features.valid);
        assert_eq!(features.fingers, [false; 5]);
        assert_eq!(features.shape, HandShape::Fist);
    }

    #[test]
    fn test_open_hand() {
        let features = HandFeatures::from_hand(&make_hand(DemoShape::Open));
        assert_eq!(features.fingers, [true; 5]);
        assert_eq!(features.shape, HandShape::Open);
        assert_eq!(features.palm, PalmOrientation::Up);
    }

    #[test]
    fn test_open_is_more_open_than_fist() {
        let open = HandFeatures::from_hand(&make_hand(DemoShape::Open));
        let fist = HandFeatures::from_hand(&make_hand(DemoShape::Fist));
        assert!(open.openness > fist.openness);
    }

    #[test]
    fn test_shape_table() {
        assert_eq!(
            HandShape::classify(&[false, true, false, false, false]),
            HandShape::Pointing
        );
        assert_eq!(
            HandShape::classify(&[false, true, true, false, false]),
            HandShape::Peace
        );
        assert_eq!(
            HandShape::classify(&[true, true, false, false, true]),
            HandShape::ILoveYou
        );
        // a lone pinky is not pointing
        assert_eq!(
            HandShape::classify(&[false, false, false, false, true]),
            HandShape::Partial
        );
        assert_eq!(
            HandShape::classify(&[true, true, true, false, false]),
            HandShape::Partial
        );
    }

    #[test]
    fn test_synthetic_shapes_classify() {
        let cases = [
            (DemoShape::Pointing, HandShape::Pointing),
            (DemoShape::Peace, HandShape::Peace),
            (DemoShape::ILoveYou, HandShape::ILoveYou),
        ];
        for (demo, expected) in cases {
            let features = HandFeatures::from_hand(&make_hand(demo));
            assert_eq!(features.shape, expected, "{:?}", demo);
        }
    }

    #[test]
    fn test_deterministic() {
        let points = synthetic_hand(DemoShape::Peace, (0.3, 0.6));
        let a = extract_features(&points);
        let b = extract_features(&points);
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_input_is_invalid() {
        let points = synthetic_hand(DemoShape::Open, (0.5, 0.5));
        let features = extract_features(&points[..20]);
        assert!(!features.valid);
        assert_eq!(features.palm, PalmOrientation::Unknown);
        assert_eq!(
            HandFeatures::try_from_points(&points[..20]),
            Err(RecognitionError::InvalidHandShape { found: 20 })
        );
    }

    #[test]
    fn test_palm_orientation_axes() {
        let mut points = vec![Landmark::new(0.5, 0.5, 0.0); 21];
        points[HandJoint::MiddleMcp.index()] = Landmark::new(0.6, 0.52, 0.0);
        let hand = Hand::from_points(&points).unwrap();
        assert_eq!(PalmOrientation::from_hand(&hand), PalmOrientation::Right);

        points[HandJoint::MiddleMcp.index()] = Landmark::new(0.5, 0.5, -0.2);
        let hand = Hand::from_points(&points).unwrap();
        assert_eq!(PalmOrientation::from_hand(&hand), PalmOrientation::Forward);

        points[HandJoint::MiddleMcp.index()] = Landmark::new(0.5, 0.5, 0.0);
        let hand = Hand::from_points(&points).unwrap();
        assert_eq!(PalmOrientation::from_hand(&hand), PalmOrientation::Unknown);
    }

    #[test]
    fn test_screen_position_bands() {
        let points = synthetic_hand(DemoShape::Fist, (0.15, 0.9));
        let position = ScreenPosition::from_points(&points);
        assert_eq!(position.horizontal, HorizontalBand::Left);
        assert_eq!(position.vertical, VerticalBand::Low);
    }

    #[test]
    fn test_average_hand_of_translated_copies() {
        let a = make_hand(DemoShape::Open);
        let b = Hand::from_points(&synthetic_hand(DemoShape::Open, (0.7, 0.4))).unwrap();
        let avg = average_hand([&a, &b]).unwrap();
        assert!((avg.wrist().x - 0.6).abs() < 1e-5);
        assert_eq!(HandFeatures::from_hand(&avg).shape, HandShape::Open);
        assert!(average_hand(std::iter::empty()).is_none());
    }
}
