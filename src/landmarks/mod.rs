pub mod normalize;

pub use normalize::{normalize_landmarks, normalize_points, RawLandmark};

use nalgebra::Point3;

use crate::error::RecognitionError;

/// One tracked keypoint: x, y frame-relative in [0,1], z unscaled depth.
pub type Landmark = Point3<f32>;

pub const HAND_LANDMARKS: usize = 21;
pub const POSE_LANDMARKS: usize = 33;
pub const FACE_LANDMARKS: usize = 468;

/// Anatomical numbering of the 21 hand keypoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandJoint {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

impl HandJoint {
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// Knuckle joint (for the thumb, the MCP).
    pub fn mcp(self) -> HandJoint {
        match self {
            Finger::Thumb => HandJoint::ThumbMcp,
            Finger::Index => HandJoint::IndexMcp,
            Finger::Middle => HandJoint::MiddleMcp,
            Finger::Ring => HandJoint::RingMcp,
            Finger::Pinky => HandJoint::PinkyMcp,
        }
    }

    /// Middle joint (for the thumb, the IP).
    pub fn pip(self) -> HandJoint {
        match self {
            Finger::Thumb => HandJoint::ThumbIp,
            Finger::Index => HandJoint::IndexPip,
            Finger::Middle => HandJoint::MiddlePip,
            Finger::Ring => HandJoint::RingPip,
            Finger::Pinky => HandJoint::PinkyPip,
        }
    }

    pub fn tip(self) -> HandJoint {
        match self {
            Finger::Thumb => HandJoint::ThumbTip,
            Finger::Index => HandJoint::IndexTip,
            Finger::Middle => HandJoint::MiddleTip,
            Finger::Ring => HandJoint::RingTip,
            Finger::Pinky => HandJoint::PinkyTip,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Finger::Thumb => "thumb",
            Finger::Index => "index",
            Finger::Middle => "middle",
            Finger::Ring => "ring",
            Finger::Pinky => "pinky",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

/// A complete hand: always exactly 21 landmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    points: [Landmark; HAND_LANDMARKS],
}

impl Hand {
    pub fn from_points(points: &[Landmark]) -> Result<Hand, RecognitionError> {
        if points.len() != HAND_LANDMARKS {
            return Err(RecognitionError::InvalidHandShape {
                found: points.len(),
            });
        }
        let mut hand = Hand {
            points: [Landmark::origin(); HAND_LANDMARKS],
        };
        hand.points.copy_from_slice(points);
        Ok(hand)
    }

    pub fn joint(&self, joint: HandJoint) -> Landmark {
        self.points[joint.index()]
    }

    pub fn wrist(&self) -> Landmark {
        self.joint(HandJoint::Wrist)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    /// Flattened (x, y, z) row of 63 values in joint order.
    pub fn flatten(&self) -> [f32; HAND_LANDMARKS * 3] {
        let mut row = [0.0; HAND_LANDMARKS * 3];
        for (i, p) in self.points.iter().enumerate() {
            row[i * 3] = p.x;
            row[i * 3 + 1] = p.y;
            row[i * 3 + 2] = p.z;
        }
        row
    }
}

/// A point-in-time capture of every tracked landmark set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub left_hand: Option<Hand>,
    pub right_hand: Option<Hand>,
    pub pose: Option<Vec<Landmark>>,
    pub face: Option<Vec<Landmark>>,
    pub timestamp: f64,
    /// An inbound hand was dropped because it had fewer than 21 points.
    pub incomplete_hand: bool,
}

impl Frame {
    /// Build a frame from raw per-hand records. Every set goes through the
    /// same normaliser. Hands shorter than 21 points are dropped.
    pub fn from_raw(
        right: Option<&[RawLandmark]>,
        left: Option<&[RawLandmark]>,
        pose: Option<&[RawLandmark]>,
        face: Option<&[RawLandmark]>,
        timestamp: f64,
    ) -> Frame {
        let mut incomplete_hand = false;
        let mut hand = |raw: Option<&[RawLandmark]>| -> Option<Hand> {
            let raw = raw.filter(|r| !r.is_empty())?;
            match Hand::from_points(&normalize_landmarks(raw)) {
                Ok(hand) => Some(hand),
                Err(_) => {
                    incomplete_hand = true;
                    None
                }
            }
        };
        let right_hand = hand(right);
        let left_hand = hand(left);

        Frame {
            left_hand,
            right_hand,
            pose: pose
                .filter(|p| !p.is_empty())
                .map(|p| normalize_points(p, POSE_LANDMARKS)),
            face: face
                .filter(|f| !f.is_empty())
                .map(|f| normalize_points(f, FACE_LANDMARKS)),
            timestamp,
            incomplete_hand,
        }
    }

    pub fn hand(&self, handedness: Handedness) -> Option<&Hand> {
        match handedness {
            Handedness::Left => self.left_hand.as_ref(),
            Handedness::Right => self.right_hand.as_ref(),
        }
    }

    pub fn hand_count(&self) -> usize {
        self.left_hand.is_some() as usize + self.right_hand.is_some() as usize
    }

    pub fn has_hands(&self) -> bool {
        self.hand_count() > 0
    }

    /// Dominant hand first: right, then left.
    pub fn primary_hand(&self) -> Option<&Hand> {
        self.right_hand.as_ref().or(self.left_hand.as_ref())
    }

    pub fn has_face(&self) -> bool {
        self.face.as_ref().map_or(false, |f| !f.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_raw(n: usize) -> Vec<RawLandmark> {
        (0..n)
            .map(|i| RawLandmark::new(0.01 * i as f32, 0.5, 0.0))
            .collect()
    }

    #[test]
    fn test_joint_indices() {
        assert_eq!(HandJoint::Wrist.index(), 0);
        assert_eq!(HandJoint::ThumbTip.index(), 4);
        assert_eq!(HandJoint::MiddleMcp.index(), 9);
        assert_eq!(HandJoint::PinkyTip.index(), 20);
        assert_eq!(Finger::Ring.pip().index(), 14);
    }

    #[test]
    fn test_hand_rejects_short_input() {
        let points = vec![Landmark::origin(); 20];
        assert_eq!(
            Hand::from_points(&points),
            Err(RecognitionError::InvalidHandShape { found: 20 })
        );
    }

    #[test]
    fn test_flatten_order() {
        let points: Vec<Landmark> = (0..21)
            .map(|i| Landmark::new(i as f32, 0.5, -1.0))
            .collect();
        let hand = Hand::from_points(&points).unwrap();
        let row = hand.flatten();
        assert_eq!(row.len(), 63);
        assert_eq!(row[3], 1.0);
        assert_eq!(row[4], 0.5);
        assert_eq!(row[62], -1.0);
    }

    #[test]
    fn test_frame_drops_incomplete_hand() {
        let right = make_raw(21);
        let left = make_raw(12);
        let frame = Frame::from_raw(Some(&right), Some(&left), None, None, 1.0);
        assert!(frame.right_hand.is_some());
        assert!(frame.left_hand.is_none());
        assert!(frame.incomplete_hand);
        assert_eq!(frame.hand_count(), 1);
    }

    #[test]
    fn test_frame_without_hands() {
        let frame = Frame::from_raw(None, Some(&[]), None, None, 0.0);
        assert!(!frame.has_hands());
        assert!(!frame.incomplete_hand);
        assert!(frame.primary_hand().is_none());
    }

    #[test]
    fn test_primary_hand_falls_back_to_left() {
        let left = make_raw(21);
        let frame = Frame::from_raw(None, Some(&left), None, None, 0.0);
        assert!(frame.primary_hand().is_some());
        assert!(frame.hand(Handedness::Right).is_none());
    }
}
