//! Real-time sign gesture recognition over streamed hand landmarks.
//!
//! Frames flow through [`recognizer::Recognizer`]: landmarks are normalised,
//! turned into hand features and motion descriptors, matched against the
//! [`catalog::SignCatalog`], optionally cross-checked by a trained
//! [`sequence_model::SequenceModel`], and finally gated by the per-session
//! [`arbiter::ConfidenceArbiter`].

pub mod arbiter;
pub mod catalog;
pub mod config;
pub mod dataset;
pub mod error;
pub mod events;
pub mod features;
pub mod landmarks;
pub mod matcher;
pub mod motion;
pub mod recognizer;
pub mod rules;
pub mod sequence_model;
pub mod session;
pub mod synthetic;
pub mod text2sign;
pub mod transport;
pub mod utils;
