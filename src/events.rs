//! Outbound events. Every event serializes with a `type` discriminator.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};

use crate::arbiter::{ArbiterStats, CandidateSource, ConfidenceLevel, Prediction};
use crate::session::RegistryStats;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Connection {
        status: String,
        session: String,
        model_loaded: bool,
        available_gestures: Vec<String>,
    },
    Prediction {
        sign: String,
        confidence: f32,
        is_motion: bool,
        frame_count: usize,
        duration_seconds: f32,
        source: CandidateSource,
        level: ConfidenceLevel,
        timestamp: f64,
    },
    NoHands {
        message: String,
    },
    LowConfidence {
        sign: String,
        confidence: f32,
        message: String,
    },
    Error {
        message: String,
    },
    SignSequence {
        signs: Vec<String>,
        original_text: String,
        timestamp: f64,
    },
    FingerSpelling {
        letters: Vec<String>,
        original_text: String,
        timestamp: f64,
    },
    Sentence {
        sentence: String,
        words: Vec<String>,
    },
    Stats {
        registry: RegistryStats,
        arbiter: ArbiterStats,
    },
    Pong,
    Disconnected {
        session: String,
    },
}

impl Event {
    pub fn prediction(prediction: Prediction, timestamp: f64) -> Event {
        Event::Prediction {
            sign: prediction.label,
            confidence: prediction.confidence,
            is_motion: prediction.is_motion,
            frame_count: prediction.frame_count,
            duration_seconds: prediction.duration_seconds,
            source: prediction.source,
            level: prediction.level,
            timestamp,
        }
    }

    pub fn no_hands() -> Event {
        Event::NoHands {
            message: "No hands detected".to_string(),
        }
    }

    pub fn low_confidence(sign: String, confidence: f32) -> Event {
        Event::LowConfidence {
            sign,
            confidence,
            message: "Gesture not clear, please try again".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Event {
        Event::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Connection { .. } => "connection",
            Event::Prediction { .. } => "prediction",
            Event::NoHands { .. } => "no_hands",
            Event::LowConfidence { .. } => "low_confidence",
            Event::Error { .. } => "error",
            Event::SignSequence { .. } => "sign_sequence",
            Event::FingerSpelling { .. } => "finger_spelling",
            Event::Sentence { .. } => "sentence",
            Event::Stats { .. } => "stats",
            Event::Pong => "pong",
            Event::Disconnected { .. } => "disconnected",
        }
    }

    /// Wire form. With `legacy` set, predictions use the older
    /// `{type, word, confidence}` shape; every other event is unchanged.
    pub fn to_wire(&self, legacy: bool) -> Result<Value, serde_json::Error> {
        match self {
            Event::Prediction {
                sign, confidence, ..
            } if legacy => Ok(json!({
                "type": "prediction",
                "word": sign,
                "confidence": confidence,
            })),
            _ => serde_json::to_value(self),
        }
    }
}

/// Seconds since the Unix epoch, for event timestamps.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
