use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ndarray::ArrayView2;
use serde_json::{json, Value};

use silentvoice::arbiter::{ArbiterConfig, CandidateSource, Clock, ConfidenceArbiter, ManualClock};
use silentvoice::catalog::SignCatalog;
use silentvoice::dataset::sample_tensor;
use silentvoice::error::ModelError;
use silentvoice::events::Event;
use silentvoice::features::{average_hand, HandFeatures, HandShape};
use silentvoice::landmarks::Frame;
use silentvoice::matcher::{MatchContext, SignMatcher};
use silentvoice::motion::{MotionAnalyzer, MotionType};
use silentvoice::recognizer::Recognizer;
use silentvoice::sequence_model::{SequenceClassifier, SequenceModel};
use silentvoice::session::{SessionRegistry, SessionSettings, SessionState};
use silentvoice::synthetic::{synthetic_frames, synthetic_raw_hand, trajectory, DemoShape, Trajectory};
use silentvoice::text2sign::TextToSign;
use silentvoice::transport::MessageHandler;

struct FixedClassifier(Vec<f32>);

impl SequenceClassifier for FixedClassifier {
    fn predict(&self, _sequence: ArrayView2<f32>) -> Result<Vec<f32>, ModelError> {
        Ok(self.0.clone())
    }
}

fn make_recognizer(clock: &ManualClock, catalog: SignCatalog, model: SequenceModel) -> Recognizer {
    Recognizer::new(
        Arc::new(catalog),
        SignMatcher::default(),
        MotionAnalyzer::default(),
        Arc::new(model),
        Arc::new(clock.clone()),
    )
}

fn make_session(clock: &ManualClock) -> SessionState {
    let arbiter = ConfidenceArbiter::new(ArbiterConfig::default(), Arc::new(clock.clone()));
    SessionState::new("e2e", 30, 20, arbiter, clock.now())
}

fn predicted_signs(events: &[Option<Event>]) -> Vec<String> {
    events
        .iter()
        .flatten()
        .filter_map(|event| match event {
            Event::Prediction { sign, .. } => Some(sign.clone()),
            _ => None,
        })
        .collect()
}

// ── Static path ──

#[test]
fn test_held_fist_selects_static_path() {
    let frames = synthetic_frames(DemoShape::Fist, Trajectory::Hold, 5, (0.5, 0.4));
    let analyzer = MotionAnalyzer::default();
    assert_eq!(analyzer.is_static(&frames), Some(true));
    assert!(analyzer.motion_level(&frames).unwrap() < 1e-6);

    let hand = average_hand(frames.iter().filter_map(Frame::primary_hand)).unwrap();
    let features = HandFeatures::from_hand(&hand);
    assert_eq!(features.shape, HandShape::Fist);
    assert_eq!(features.fingers, [false; 5]);

    let result = SignMatcher::default().match_static(
        &SignCatalog::default(),
        &features,
        MatchContext::default(),
    );
    assert_eq!(result.label, "STOP");
    assert!(result.confidence > 0.0);
    assert!(!result.is_motion);
}

#[test]
fn test_held_fist_emits_once_per_cooldown() {
    let clock = ManualClock::new();
    let recognizer = make_recognizer(&clock, SignCatalog::default(), SequenceModel::unloaded());
    let mut session = make_session(&clock);

    let events: Vec<Option<Event>> = synthetic_frames(DemoShape::Fist, Trajectory::Hold, 20, (0.5, 0.4))
        .into_iter()
        .map(|frame| recognizer.process_frame(&mut session, frame))
        .collect();
    assert_eq!(predicted_signs(&events), vec!["STOP"]);

    clock.advance(Duration::from_millis(1100));
    let events: Vec<Option<Event>> = synthetic_frames(DemoShape::Fist, Trajectory::Hold, 3, (0.5, 0.4))
        .into_iter()
        .map(|frame| recognizer.process_frame(&mut session, frame))
        .collect();
    assert_eq!(predicted_signs(&events), vec!["STOP"]);
    assert_eq!(session.history().words(), vec!["STOP", "STOP"]);
}

// ── Dynamic path ──

#[test]
fn test_wave_is_classified_as_wave() {
    let frames = synthetic_frames(DemoShape::Open, Trajectory::Wave, 30, (0.5, 0.5));
    let motion = MotionAnalyzer::default().analyze(&frames).unwrap();
    assert_eq!(motion.motion_type, MotionType::Wave);
    assert!(motion.is_dynamic());

    let hand = average_hand(frames.iter().filter_map(Frame::primary_hand)).unwrap();
    let result = SignMatcher::default().match_dynamic(
        &SignCatalog::default(),
        &motion,
        Some(&HandFeatures::from_hand(&hand)),
        MatchContext::default(),
    );
    assert_eq!(result.label, "HELLO");
    assert!(result.is_motion);
}

#[test]
fn test_wave_stream_only_emits_hello() {
    let clock = ManualClock::new();
    let recognizer = make_recognizer(&clock, SignCatalog::default(), SequenceModel::unloaded());
    let mut session = make_session(&clock);

    let events: Vec<Option<Event>> = synthetic_frames(DemoShape::Open, Trajectory::Wave, 30, (0.5, 0.5))
        .into_iter()
        .map(|frame| recognizer.process_frame(&mut session, frame))
        .collect();
    let signs = predicted_signs(&events);
    assert!(!signs.is_empty());
    assert!(signs.iter().all(|s| s == "HELLO"), "unexpected signs {:?}", signs);
}

// ── Sequence model ──

#[test]
fn test_model_fills_in_when_dictionary_has_nothing() {
    let catalog = SignCatalog::from_json_str(
        r#"{"HELLO": {"type": "dynamic", "hand": {"shape": "open"}, "motion": {"motion": "wave"}}}"#,
    )
    .unwrap();
    let model = SequenceModel::with_classifier(
        Arc::new(FixedClassifier(vec![0.05, 0.9, 0.05])),
        vec!["A".into(), "MODEL_SIGN".into(), "C".into()],
        30,
    );
    let clock = ManualClock::new();
    let recognizer = make_recognizer(&clock, catalog, model);
    let mut session = make_session(&clock);

    let events: Vec<Option<Event>> = synthetic_frames(DemoShape::Peace, Trajectory::Hold, 8, (0.5, 0.5))
        .into_iter()
        .map(|frame| recognizer.process_frame(&mut session, frame))
        .collect();
    let prediction = events.iter().flatten().find_map(|event| match event {
        Event::Prediction {
            sign,
            source,
            confidence,
            ..
        } => Some((sign.clone(), *source, *confidence)),
        _ => None,
    });
    let (sign, source, confidence) = prediction.expect("model prediction");
    assert_eq!(sign, "MODEL_SIGN");
    assert_eq!(source, CandidateSource::Model);
    assert!(confidence >= 0.4);
}

#[test]
fn test_training_interfaces() {
    let sample: Vec<Vec<Vec<_>>> = trajectory(Trajectory::Wave, 12, (0.5, 0.5))
        .into_iter()
        .map(|wrist| vec![synthetic_raw_hand(DemoShape::Open, wrist)])
        .collect();
    let tensor = sample_tensor(&sample, 30);
    assert_eq!(tensor.dim(), (30, 126));

    let mut model = SequenceModel::unloaded();
    assert!(!model.load(Path::new("/nonexistent/signs.onnx"), vec!["HELLO".into()]));
    assert!(!model.is_loaded());
    assert!(model.predict(&[]).is_unknown());
}

// ── Wire ──

#[test]
fn test_holistic_wave_over_the_handler() {
    let clock = ManualClock::new();
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let recognizer = make_recognizer(&clock, SignCatalog::default(), SequenceModel::unloaded());
    let handler = MessageHandler::new(
        Arc::new(SessionRegistry::new(SessionSettings::default(), shared)),
        Arc::new(recognizer),
        TextToSign::default(),
        false,
    );

    let reply = handler.handle_bytes(json!({"session": "w", "type": "connect"}).to_string().as_bytes());
    let events: Vec<Value> = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(events[0]["type"], "connection");

    let mut predictions = Vec::new();
    for (i, wrist) in trajectory(Trajectory::Wave, 30, (0.5, 0.5)).into_iter().enumerate() {
        let message = json!({
            "session": "w",
            "type": "holistic",
            "timestamp": i as f64 / 30.0,
            "data": {"rightHandLandmarks": synthetic_raw_hand(DemoShape::Open, wrist)},
        });
        let reply = handler.handle_bytes(message.to_string().as_bytes());
        assert_eq!(reply.session.as_deref(), Some("w"));
        let events: Vec<Value> = serde_json::from_slice(&reply.body).unwrap();
        predictions.extend(events.into_iter().filter(|e| e["type"] == "prediction"));
    }
    assert!(!predictions.is_empty());
    for prediction in &predictions {
        assert_eq!(prediction["sign"], "HELLO");
        assert!(prediction["confidence"].as_f64().unwrap() >= 0.4);
        assert!(prediction["timestamp"].is_number());
    }

    let reply = handler.handle_bytes(json!({"session": "w", "type": "sentence"}).to_string().as_bytes());
    let events: Vec<Value> = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(events[0]["type"], "sentence");
    assert!(events[0]["sentence"].as_str().unwrap().starts_with("HELLO"));
}
