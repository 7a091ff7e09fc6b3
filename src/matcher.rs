//! Greedy nearest-pattern matching against the sign catalog.
//!
//! Each eligible definition is scored as `matched weight / compared weight`.
//! Fingers weigh 1 each, hand shape 2, palm 1, motion type 2, direction 1,
//! repetitions 1 and a facial expression requirement 1. The highest ratio
//! wins and an exact tie keeps the entry that comes first in the catalog.

use crate::catalog::{HandPattern, MotionPattern, SignCatalog, SignKind};
use crate::features::HandFeatures;
use crate::motion::MotionFeatures;

pub const UNKNOWN: &str = "UNKNOWN";

const SHAPE_WEIGHT: f32 = 2.0;
const MOTION_TYPE_WEIGHT: f32 = 2.0;
/// Repetition counts within this distance of the pattern still agree.
const REPETITION_TOLERANCE: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub label: String,
    pub confidence: f32,
    pub is_motion: bool,
}

impl MatchResult {
    pub fn unknown() -> MatchResult {
        MatchResult {
            label: UNKNOWN.to_string(),
            confidence: 0.0,
            is_motion: false,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN
    }
}

/// What else is visible in the frame besides the matched hand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchContext {
    pub two_hands: bool,
    pub face_present: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Score {
    matched: f32,
    compared: f32,
}

impl Score {
    fn add(&mut self, weight: f32, agrees: bool) {
        self.compared += weight;
        if agrees {
            self.matched += weight;
        }
    }

    fn ratio(&self) -> Option<f32> {
        (self.compared > 0.0).then(|| self.matched / self.compared)
    }
}

#[derive(Debug, Clone)]
pub struct SignMatcher {
    min_match_ratio: f32,
}

impl Default for SignMatcher {
    fn default() -> Self {
        SignMatcher::new(0.5)
    }
}

impl SignMatcher {
    pub fn new(min_match_ratio: f32) -> SignMatcher {
        SignMatcher { min_match_ratio }
    }

    /// Held-pose path: static and facial signs, plus motionless two-handed
    /// signs when both hands are up.
    pub fn match_static(
        &self,
        catalog: &SignCatalog,
        features: &HandFeatures,
        context: MatchContext,
    ) -> MatchResult {
        if !features.valid {
            return MatchResult::unknown();
        }
        let candidates = catalog.iter().filter_map(|sign| {
            let mut score = Score::default();
            match &sign.kind {
                SignKind::Static { hand } => score_hand(&mut score, hand, features),
                SignKind::TwoHanded { hand, motion: None } if context.two_hands => {
                    if let Some(hand) = hand {
                        score_hand(&mut score, hand, features);
                    }
                }
                SignKind::Facial { hand, .. } => {
                    if let Some(hand) = hand {
                        score_hand(&mut score, hand, features);
                    }
                    score.add(1.0, context.face_present);
                }
                _ => return None,
            }
            Some((sign.name.as_str(), score))
        });
        self.best(candidates, false)
    }

    /// Trajectory path: dynamic signs, plus moving two-handed signs when both
    /// hands are up. `hand` adds handshape agreement when available.
    pub fn match_dynamic(
        &self,
        catalog: &SignCatalog,
        motion: &MotionFeatures,
        hand: Option<&HandFeatures>,
        context: MatchContext,
    ) -> MatchResult {
        let hand = hand.filter(|h| h.valid);
        let candidates = catalog.iter().filter_map(|sign| {
            let (pattern, expected) = match &sign.kind {
                SignKind::Dynamic { hand, motion } => (hand.as_ref(), motion),
                SignKind::TwoHanded {
                    hand,
                    motion: Some(motion),
                } if context.two_hands => (hand.as_ref(), motion),
                _ => return None,
            };
            let mut score = Score::default();
            score_motion(&mut score, expected, motion);
            if let (Some(pattern), Some(features)) = (pattern, hand) {
                score_hand(&mut score, pattern, features);
            }
            Some((sign.name.as_str(), score))
        });
        self.best(candidates, true)
    }

    fn best<'a>(
        &self,
        candidates: impl Iterator<Item = (&'a str, Score)>,
        is_motion: bool,
    ) -> MatchResult {
        let mut best: Option<(&str, f32)> = None;
        for (name, score) in candidates {
            let Some(ratio) = score.ratio() else {
                continue;
            };
            // strict comparison keeps the earliest of equal scores
            if best.map_or(true, |(_, top)| ratio > top) {
                best = Some((name, ratio));
            }
        }

        match best {
            Some((name, ratio)) if ratio > self.min_match_ratio => MatchResult {
                label: name.to_string(),
                confidence: ratio.clamp(0.0, 1.0),
                is_motion,
            },
            _ => MatchResult::unknown(),
        }
    }
}

fn score_hand(score: &mut Score, pattern: &HandPattern, features: &HandFeatures) {
    if let Some(fingers) = pattern.fingers {
        for (expected, actual) in fingers.iter().zip(features.fingers.iter()) {
            score.add(1.0, expected == actual);
        }
    }
    if let Some(shape) = pattern.shape {
        score.add(SHAPE_WEIGHT, shape == features.shape);
    }
    if let Some(palm) = pattern.palm {
        score.add(1.0, palm == features.palm);
    }
}

fn score_motion(score: &mut Score, pattern: &MotionPattern, motion: &MotionFeatures) {
    score.add(MOTION_TYPE_WEIGHT, pattern.motion == motion.motion_type);
    if let Some(direction) = pattern.direction {
        score.add(1.0, direction == motion.direction);
    }
    if let Some(repetitions) = pattern.repetitions {
        score.add(
            1.0,
            repetitions.abs_diff(motion.repetitions) <= REPETITION_TOLERANCE,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SignDefinition;
    use crate::features::{HandShape, PalmOrientation, ScreenPosition};
    use crate::motion::{Direction, MotionType};

    fn make_features(fingers: [bool; 5]) -> HandFeatures {
        HandFeatures {
            valid: true,
            fingers,
            shape: HandShape::classify(&fingers),
            palm: PalmOrientation::Up,
            position: ScreenPosition::default(),
            openness: 0.1,
        }
    }

    fn make_motion(motion_type: MotionType, direction: Direction, repetitions: u32) -> MotionFeatures {
        MotionFeatures {
            motion_type,
            direction,
            repetitions,
            speed: 1.0,
            motion_level: 1.0,
            frame_count: 30,
            hand: None,
        }
    }

    fn make_static(name: &str, shape: HandShape) -> SignDefinition {
        SignDefinition {
            name: name.to_string(),
            description: String::new(),
            category: "test".to_string(),
            kind: SignKind::Static {
                hand: HandPattern {
                    shape: Some(shape),
                    ..Default::default()
                },
            },
        }
    }

    #[test]
    fn test_fist_matches_stop() {
        let catalog = SignCatalog::default();
        let result = SignMatcher::default().match_static(
            &catalog,
            &make_features([false; 5]),
            MatchContext::default(),
        );
        assert_eq!(result.label, "STOP");
        assert_eq!(result.confidence, 1.0);
        assert!(!result.is_motion);
    }

    #[test]
    fn test_tie_keeps_catalog_order() {
        let first = make_static("FIRST", HandShape::Fist);
        let second = make_static("SECOND", HandShape::Fist);
        let features = make_features([false; 5]);
        let matcher = SignMatcher::default();

        let catalog = SignCatalog::new(vec![first.clone(), second.clone()]);
        let result = matcher.match_static(&catalog, &features, MatchContext::default());
        assert_eq!(result.label, "FIRST");

        let catalog = SignCatalog::new(vec![second, first]);
        let result = matcher.match_static(&catalog, &features, MatchContext::default());
        assert_eq!(result.label, "SECOND");
    }

    #[test]
    fn test_permutation_without_ties() {
        let mut signs = vec![
            make_static("OPEN", HandShape::Open),
            make_static("FIST", HandShape::Fist),
            make_static("POINT", HandShape::Pointing),
        ];
        let features = make_features([false, true, false, false, false]);
        let matcher = SignMatcher::default();
        for _ in 0..signs.len() {
            signs.rotate_left(1);
            let catalog = SignCatalog::new(signs.clone());
            let result = matcher.match_static(&catalog, &features, MatchContext::default());
            assert_eq!(result.label, "POINT");
        }
    }

    #[test]
    fn test_below_min_ratio_is_unknown() {
        let catalog = SignCatalog::new(vec![make_static("OPEN", HandShape::Open)]);
        let result = SignMatcher::default().match_static(
            &catalog,
            &make_features([false; 5]),
            MatchContext::default(),
        );
        assert!(result.is_unknown());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_invalid_features_are_unknown() {
        let result = SignMatcher::default().match_static(
            &SignCatalog::default(),
            &HandFeatures::invalid(),
            MatchContext::default(),
        );
        assert!(result.is_unknown());
    }

    #[test]
    fn test_wave_prefers_hello() {
        let catalog = SignCatalog::default();
        let open = make_features([true; 5]);
        let result = SignMatcher::default().match_dynamic(
            &catalog,
            &make_motion(MotionType::Wave, Direction::Left, 1),
            Some(&open),
            MatchContext::default(),
        );
        assert_eq!(result.label, "HELLO");
        assert_eq!(result.confidence, 1.0);
        assert!(result.is_motion);
    }

    #[test]
    fn test_repetitions_break_wave_tie() {
        let catalog = SignCatalog::default();
        let open = make_features([true; 5]);
        let result = SignMatcher::default().match_dynamic(
            &catalog,
            &make_motion(MotionType::Wave, Direction::Left, 3),
            Some(&open),
            MatchContext::default(),
        );
        // HELLO and GOODBYE both agree fully; HELLO is listed first
        assert_eq!(result.label, "HELLO");

        let only_goodbye = SignCatalog::new(vec![catalog.get("GOODBYE").unwrap().clone()]);
        let result = SignMatcher::default().match_dynamic(
            &only_goodbye,
            &make_motion(MotionType::Wave, Direction::Left, 1),
            Some(&open),
            MatchContext::default(),
        );
        assert_eq!(result.label, "GOODBYE");
        assert!((result.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_two_handed_needs_two_hands() {
        let catalog = SignCatalog::new(vec![SignCatalog::default().get("HELP").unwrap().clone()]);
        let fist = make_features([false; 5]);
        let motion = make_motion(MotionType::Linear, Direction::Up, 1);
        let matcher = SignMatcher::default();

        let alone = matcher.match_dynamic(&catalog, &motion, Some(&fist), MatchContext::default());
        assert!(alone.is_unknown());

        let both = matcher.match_dynamic(
            &catalog,
            &motion,
            Some(&fist),
            MatchContext {
                two_hands: true,
                face_present: false,
            },
        );
        assert_eq!(both.label, "HELP");
    }

    #[test]
    fn test_facial_requirement_counts_one_field() {
        let catalog = SignCatalog::new(vec![SignCatalog::default()
            .get("I_DONT_UNDERSTAND")
            .unwrap()
            .clone()]);
        let pointing = make_features([false, true, false, false, false]);
        let matcher = SignMatcher::default();

        let with_face = matcher.match_static(
            &catalog,
            &pointing,
            MatchContext {
                two_hands: false,
                face_present: true,
            },
        );
        assert_eq!(with_face.confidence, 1.0);

        let without_face = matcher.match_static(&catalog, &pointing, MatchContext::default());
        assert!((without_face.confidence - 2.0 / 3.0).abs() < 1e-6);
    }
}
