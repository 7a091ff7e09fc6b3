//! Inbound JSON messages and their mapping onto recognizer calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::events::{unix_timestamp, Event};
use crate::landmarks::{Frame, RawLandmark};
use crate::recognizer::Recognizer;
use crate::session::{lock_session, SessionRegistry};
use crate::text2sign::{TextToSign, Translation};

fn default_session() -> String {
    "default".to_string()
}

/// `{ "session": id, "type": kind, ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default = "default_session")]
    pub session: String,
    #[serde(flatten)]
    pub message: ClientMessage,
}

impl Envelope {
    pub fn new(session: impl Into<String>, message: ClientMessage) -> Envelope {
        Envelope {
            session: session.into(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Connect,
    /// Hands only, as a list of 21-point sets.
    Landmarks { data: SimpleLandmarks },
    /// A bare list of hands, first right then left.
    Pose {
        data: Vec<Vec<RawLandmark>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    Holistic {
        data: HolisticLandmarks,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    Speech { text: String },
    Sentence {
        #[serde(default)]
        clear: bool,
    },
    Stats,
    Ping,
    Disconnect,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleLandmarks {
    #[serde(default)]
    pub multi_hand_landmarks: Vec<Vec<RawLandmark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolisticLandmarks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_hand_landmarks: Option<Vec<RawLandmark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_hand_landmarks: Option<Vec<RawLandmark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose_landmarks: Option<Vec<RawLandmark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_landmarks: Option<Vec<RawLandmark>>,
}

/// A serialized reply and the session it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub session: Option<String>,
    pub body: Vec<u8>,
}

/// Maps each inbound message to the events sent back for it.
pub struct MessageHandler {
    registry: Arc<SessionRegistry>,
    recognizer: Arc<Recognizer>,
    text: TextToSign,
    legacy: bool,
}

impl MessageHandler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        recognizer: Arc<Recognizer>,
        text: TextToSign,
        legacy: bool,
    ) -> MessageHandler {
        MessageHandler {
            registry,
            recognizer,
            text,
            legacy,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn handle(&self, envelope: Envelope) -> Vec<Event> {
        let Envelope { session, message } = envelope;
        match message {
            ClientMessage::Connect => {
                let (_, created) = self.registry.connect(&session);
                vec![Event::Connection {
                    status: if created { "connected" } else { "reconnected" }.to_string(),
                    session,
                    model_loaded: self.recognizer.model().is_loaded(),
                    available_gestures: self.recognizer.available_gestures(),
                }]
            }
            ClientMessage::Landmarks { data } => {
                let hands = &data.multi_hand_landmarks;
                let frame = Frame::from_raw(
                    hands.first().map(Vec::as_slice),
                    hands.get(1).map(Vec::as_slice),
                    None,
                    None,
                    data.timestamp.unwrap_or_else(|| self.now()),
                );
                self.process(&session, frame)
            }
            ClientMessage::Pose { data, timestamp } => {
                let frame = Frame::from_raw(
                    data.first().map(Vec::as_slice),
                    data.get(1).map(Vec::as_slice),
                    None,
                    None,
                    timestamp.unwrap_or_else(|| self.now()),
                );
                self.process(&session, frame)
            }
            ClientMessage::Holistic { data, timestamp } => {
                let frame = Frame::from_raw(
                    data.right_hand_landmarks.as_deref(),
                    data.left_hand_landmarks.as_deref(),
                    data.pose_landmarks.as_deref(),
                    data.face_landmarks.as_deref(),
                    timestamp.unwrap_or_else(|| self.now()),
                );
                self.process(&session, frame)
            }
            ClientMessage::Speech { text } => {
                let event = match self.text.translate(&text) {
                    Translation::Signs(signs) => Event::SignSequence {
                        signs,
                        original_text: text,
                        timestamp: unix_timestamp(),
                    },
                    Translation::FingerSpelling(letters) => Event::FingerSpelling {
                        letters,
                        original_text: text,
                        timestamp: unix_timestamp(),
                    },
                };
                vec![event]
            }
            ClientMessage::Sentence { clear } => {
                let Some(shared) = self.registry.get(&session) else {
                    return vec![Event::error(format!("unknown session {}", session))];
                };
                let mut state = lock_session(&shared);
                let event = Event::Sentence {
                    sentence: state.history().sentence(),
                    words: state.history().words(),
                };
                if clear {
                    state.history_mut().clear();
                }
                vec![event]
            }
            ClientMessage::Stats => {
                let Some(shared) = self.registry.get(&session) else {
                    return vec![Event::error(format!("unknown session {}", session))];
                };
                let arbiter = lock_session(&shared).arbiter().stats();
                vec![Event::Stats {
                    registry: self.registry.stats(),
                    arbiter,
                }]
            }
            ClientMessage::Ping => vec![Event::Pong],
            ClientMessage::Disconnect => {
                self.registry.disconnect(&session);
                vec![Event::Disconnected { session }]
            }
        }
    }

    /// Frames for a session that never sent `connect` open one implicitly.
    fn process(&self, session: &str, frame: Frame) -> Vec<Event> {
        let (shared, _) = self.registry.connect(session);
        let mut state = lock_session(&shared);
        self.recognizer
            .process_frame(&mut state, frame)
            .into_iter()
            .collect()
    }

    fn now(&self) -> f64 {
        self.registry.clock().now().as_secs_f64()
    }

    /// Decode, handle and encode one request. Undecodable input is answered
    /// with an `error` event rather than dropped.
    pub fn handle_bytes(&self, bytes: &[u8]) -> Reply {
        let (session, events) = match serde_json::from_slice::<Envelope>(bytes) {
            Ok(envelope) => {
                let session = envelope.session.clone();
                debug!(session = %session, "message received");
                (Some(session), self.handle(envelope))
            }
            Err(err) => {
                warn!(%err, "invalid message");
                (None, vec![Event::error(format!("invalid message: {}", err))])
            }
        };

        let body = self.render(&events).unwrap_or_else(|err| {
            warn!(%err, "failed to encode reply");
            br#"[{"type":"error","message":"failed to encode reply"}]"#.to_vec()
        });
        Reply { session, body }
    }

    /// A JSON array of wire events.
    pub fn render(&self, events: &[Event]) -> Result<Vec<u8>, TransportError> {
        let values = events
            .iter()
            .map(|e| e.to_wire(self.legacy))
            .collect::<Result<Vec<Value>, _>>()?;
        Ok(serde_json::to_vec(&values)?)
    }
}
