use std::sync::Arc;

use tracing::{debug, info};

use crate::arbiter::{Candidate, CandidateSource, Clock, FrameSignals, Verdict};
use crate::catalog::SignCatalog;
use crate::events::Event;
use crate::features::{average_hand, HandFeatures};
use crate::landmarks::{Frame, Handedness};
use crate::matcher::{MatchContext, MatchResult, SignMatcher};
use crate::motion::{MotionAnalyzer, ASSUMED_FPS};
use crate::rules;
use crate::sequence_model::SequenceModel;
use crate::session::SessionState;

/// The recognition service shared by every session.
///
/// Holds only read-only collaborators; all mutable state lives in the
/// [`SessionState`] handed to [`Recognizer::process_frame`].
pub struct Recognizer {
    catalog: Arc<SignCatalog>,
    matcher: SignMatcher,
    motion: MotionAnalyzer,
    model: Arc<SequenceModel>,
    clock: Arc<dyn Clock>,
}

impl Recognizer {
    pub fn new(
        catalog: Arc<SignCatalog>,
        matcher: SignMatcher,
        motion: MotionAnalyzer,
        model: Arc<SequenceModel>,
        clock: Arc<dyn Clock>,
    ) -> Recognizer {
        Recognizer {
            catalog,
            matcher,
            motion,
            model,
            clock,
        }
    }

    pub fn catalog(&self) -> &SignCatalog {
        &self.catalog
    }

    pub fn model(&self) -> &SequenceModel {
        &self.model
    }

    /// Labels the session can produce: the catalog first, then any extra
    /// model classes.
    pub fn available_gestures(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.catalog.iter().map(|s| s.name.clone()).collect();
        for class in self.model.class_names() {
            if !labels.contains(class) {
                labels.push(class.clone());
            }
        }
        labels
    }

    /// Buffer one frame and return at most one event for it.
    ///
    /// Frames without hands are buffered and answered with `no_hands`.
    /// Until the buffer holds enough frames for the quick motion check,
    /// frames are buffered silently.
    pub fn process_frame(&self, session: &mut SessionState, frame: Frame) -> Option<Event> {
        let now = self.clock.now();
        session.touch(now);

        let hand_count = frame.hand_count();
        let incomplete_hand = frame.incomplete_hand;
        let face_present = frame.has_face();
        let timestamp = frame.timestamp;
        session.push_frame(frame);

        if hand_count == 0 {
            return Some(Event::no_hands());
        }

        let frames = session.frames.as_slice();
        if frames.len() < self.motion.config().min_quick_frames {
            return None;
        }

        let signals = frame_signals(frames, hand_count, incomplete_hand);
        let context = MatchContext {
            two_hands: hand_count >= 2,
            face_present,
        };

        let dictionary = self.match_dictionary(frames, context);
        let candidate = session.arbiter.arbitrate(
            dictionary,
            || self.model_candidate(frames),
            || frames.last().and_then(rules::classify_frame).map(|r| to_candidate(r, CandidateSource::Rules)),
        );
        if let Some(candidate) = &candidate {
            debug!(session = %session.id(), label = %candidate.label, confidence = candidate.confidence, source = ?candidate.source, "candidate");
        }

        match session.arbiter.evaluate(candidate, signals) {
            Verdict::Emit(prediction) => {
                info!(session = %session.id(), label = %prediction.label, confidence = prediction.confidence, "prediction");
                session.record(&prediction, now);
                Some(Event::prediction(prediction, timestamp))
            }
            Verdict::Rejected { label, confidence } => Some(Event::low_confidence(label, confidence)),
            Verdict::Pending => None,
        }
    }

    /// Static path while the hand is still, dynamic path once a trajectory
    /// has been classified.
    fn match_dictionary(&self, frames: &[Frame], context: MatchContext) -> Option<Candidate> {
        let window = &frames[frames.len().saturating_sub(self.motion.config().min_frames)..];

        let result = if self.motion.is_static(window)? {
            let hand = average_hand(window.iter().filter_map(Frame::primary_hand))?;
            self.matcher
                .match_static(&self.catalog, &HandFeatures::from_hand(&hand), context)
        } else {
            let motion = self.motion.analyze(frames)?;
            if !motion.is_dynamic() {
                return None;
            }
            let handedness = motion.hand.unwrap_or(Handedness::Right);
            let hand = average_hand(frames.iter().filter_map(|f| f.hand(handedness)))
                .map(|h| HandFeatures::from_hand(&h));
            self.matcher
                .match_dynamic(&self.catalog, &motion, hand.as_ref(), context)
        };

        (!result.is_unknown()).then(|| to_candidate(result, CandidateSource::Dictionary))
    }

    fn model_candidate(&self, frames: &[Frame]) -> Option<Candidate> {
        if !self.model.is_loaded() {
            return None;
        }
        let prediction = self.model.predict(frames);
        if prediction.is_unknown() {
            return None;
        }
        Some(Candidate {
            label: prediction.label,
            confidence: prediction.confidence,
            source: CandidateSource::Model,
            is_motion: true,
            probabilities: prediction.probabilities,
        })
    }
}

fn to_candidate(result: MatchResult, source: CandidateSource) -> Candidate {
    Candidate {
        label: result.label,
        confidence: result.confidence,
        source,
        is_motion: result.is_motion,
        probabilities: Vec::new(),
    }
}

fn frame_signals(frames: &[Frame], hand_count: usize, incomplete_hand: bool) -> FrameSignals {
    let with_hands = frames.iter().filter(|f| f.has_hands()).count();
    let span = match (frames.first(), frames.last()) {
        (Some(first), Some(last)) => (last.timestamp - first.timestamp) as f32,
        _ => 0.0,
    };
    let duration_seconds = if span > 0.0 {
        span
    } else {
        frames.len() as f32 / ASSUMED_FPS
    };

    FrameSignals {
        hand_count,
        incomplete_hand,
        hand_presence: with_hands as f32 / frames.len().max(1) as f32,
        frame_count: frames.len(),
        duration_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::{ArbiterConfig, ConfidenceArbiter, ManualClock};
    use crate::synthetic::{synthetic_frames, DemoShape, Trajectory};

    fn make_recognizer(clock: &ManualClock) -> Recognizer {
        Recognizer::new(
            Arc::new(SignCatalog::default()),
            SignMatcher::default(),
            MotionAnalyzer::default(),
            Arc::new(SequenceModel::unloaded()),
            Arc::new(clock.clone()),
        )
    }

    fn make_session(clock: &ManualClock) -> SessionState {
        let arbiter = ConfidenceArbiter::new(ArbiterConfig::default(), Arc::new(clock.clone()));
        SessionState::new("test", 30, 20, arbiter, clock.now())
    }

    #[test]
    fn test_no_hands_event() {
        let clock = ManualClock::new();
        let recognizer = make_recognizer(&clock);
        let mut session = make_session(&clock);
        let event = recognizer.process_frame(&mut session, Frame::default());
        assert_eq!(event, Some(Event::no_hands()));
        assert_eq!(session.frame_count(), 1);
    }

    #[test]
    fn test_short_buffer_is_silent() {
        let clock = ManualClock::new();
        let recognizer = make_recognizer(&clock);
        let mut session = make_session(&clock);
        for frame in synthetic_frames(DemoShape::Fist, Trajectory::Hold, 4, (0.5, 0.4)) {
            assert!(recognizer.process_frame(&mut session, frame).is_none());
        }
    }

    #[test]
    fn test_static_fist_emits_stop() {
        let clock = ManualClock::new();
        let recognizer = make_recognizer(&clock);
        let mut session = make_session(&clock);
        let events: Vec<Option<Event>> = synthetic_frames(DemoShape::Fist, Trajectory::Hold, 6, (0.5, 0.4))
            .into_iter()
            .map(|frame| recognizer.process_frame(&mut session, frame))
            .collect();
        assert!(events[..5].iter().all(Option::is_none));
        match &events[5] {
            Some(Event::Prediction { sign, is_motion, .. }) => {
                assert_eq!(sign, "STOP");
                assert!(!is_motion);
            }
            other => panic!("expected a prediction, got {:?}", other),
        }
        assert_eq!(session.prediction_count(), 1);
        assert_eq!(session.history().words(), vec!["STOP"]);
    }

    #[test]
    fn test_frame_signals() {
        let mut frames = synthetic_frames(DemoShape::Open, Trajectory::Hold, 4, (0.5, 0.5));
        frames.push(Frame {
            timestamp: 0.5,
            ..Default::default()
        });
        let signals = frame_signals(&frames, 1, false);
        assert!((signals.hand_presence - 0.8).abs() < 1e-6);
        assert_eq!(signals.frame_count, 5);
        assert!((signals.duration_seconds - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_available_gestures_start_with_catalog() {
        let clock = ManualClock::new();
        let gestures = make_recognizer(&clock).available_gestures();
        assert_eq!(gestures.first().map(String::as_str), Some("HELLO"));
        assert_eq!(gestures.len(), SignCatalog::default().len());
    }
}
