//! Last-resort single-frame heuristics.
//!
//! Consulted only when neither the dictionary nor the sequence model is
//! confident. Shapes that match no rule produce no candidate.

use nalgebra::distance;

use crate::landmarks::{Frame, Hand, HandJoint};
use crate::matcher::MatchResult;

#[derive(Debug, Clone, Copy, PartialEq)]
struct RuleFeatures {
    thumb_up: bool,
    index_up: bool,
    middle_up: bool,
    thumb_index_close: bool,
    height: f32,
    center_x: f32,
}

impl RuleFeatures {
    fn from_hand(hand: &Hand) -> RuleFeatures {
        let wrist = hand.wrist();
        let thumb_tip = hand.joint(HandJoint::ThumbTip);
        let index_tip = hand.joint(HandJoint::IndexTip);
        let middle_tip = hand.joint(HandJoint::MiddleTip);

        RuleFeatures {
            thumb_up: thumb_tip.y < wrist.y - 0.1,
            index_up: index_tip.y < hand.joint(HandJoint::IndexPip).y,
            middle_up: middle_tip.y < hand.joint(HandJoint::MiddlePip).y,
            thumb_index_close: distance(&thumb_tip.xy(), &index_tip.xy()) < 0.05,
            height: wrist.y,
            center_x: wrist.x,
        }
    }
}

fn result(label: &str, confidence: f32) -> Option<MatchResult> {
    Some(MatchResult {
        label: label.to_string(),
        confidence,
        is_motion: false,
    })
}

pub fn classify_frame(frame: &Frame) -> Option<MatchResult> {
    match (&frame.right_hand, &frame.left_hand) {
        (Some(right), Some(left)) => two_hands(
            RuleFeatures::from_hand(right),
            RuleFeatures::from_hand(left),
        ),
        (Some(hand), None) | (None, Some(hand)) => one_hand(RuleFeatures::from_hand(hand)),
        (None, None) => None,
    }
}

fn one_hand(hand: RuleFeatures) -> Option<MatchResult> {
    if hand.thumb_up && !hand.index_up {
        result("YES", 0.85)
    } else if hand.index_up && !hand.middle_up {
        result("HELLO", 0.80)
    } else if hand.thumb_index_close {
        result("GOOD", 0.82)
    } else if hand.height < 0.3 {
        result("HELLO", 0.75)
    } else {
        None
    }
}

fn two_hands(right: RuleFeatures, left: RuleFeatures) -> Option<MatchResult> {
    if right.height < 0.4 && left.height < 0.4 {
        result("THANK_YOU", 0.88)
    } else if (right.center_x - left.center_x).abs() < 0.2 {
        result("PLEASE", 0.85)
    } else {
        None
    }
}
