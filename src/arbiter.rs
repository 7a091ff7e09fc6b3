//! Per-session confidence arbitration.
//!
//! Candidates from the dictionary matcher, the sequence model and the rule
//! fallback are reconciled by [`ConfidenceArbiter::arbitrate`], adjusted by
//! [`ConfidenceArbiter::evaluate`], and then pass through a small state
//! machine:
//!
//! ```text
//! Idle -> Detecting -> Holding -> Transitioning -> Idle
//!            ^            |            |
//!            +------------+            +--> Holding (same label, cooldown over)
//! ```
//!
//! Only the `Holding` state emits. Every time read goes through the injected
//! [`Clock`], so cooldown behaviour can be driven from tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::BoundedBuffer;

pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> ManualClock {
        ManualClock::default()
    }

    pub fn advance(&self, by: Duration) {
        self.micros.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, to: Duration) {
        self.micros.store(to.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

/// True for the placeholder labels the matcher and the model use.
pub fn is_unknown_label(label: &str) -> bool {
    label.is_empty() || label.eq_ignore_ascii_case("unknown")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    pub rejection_threshold: f32,
    pub cooldown_secs: f32,
    /// Below this the sequence model is consulted.
    pub model_fallback_below: f32,
    /// Below this the rule fallback is consulted.
    pub rule_fallback_below: f32,
    pub history_size: usize,
    pub smoothing_window: usize,
    pub consistency_window: usize,
    pub high_confidence: f32,
    pub medium_confidence: f32,
    pub low_confidence: f32,
    pub calibration_factor: f32,
    pub stats_window: usize,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        ArbiterConfig {
            rejection_threshold: 0.4,
            cooldown_secs: 1.0,
            model_fallback_below: 0.5,
            rule_fallback_below: 0.3,
            history_size: 5,
            smoothing_window: 3,
            consistency_window: 3,
            high_confidence: 0.85,
            medium_confidence: 0.70,
            low_confidence: 0.50,
            calibration_factor: 1.0,
            stats_window: 100,
        }
    }
}

impl ArbiterConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f32(self.cooldown_secs.max(0.0))
    }

    pub fn level(&self, confidence: f32) -> ConfidenceLevel {
        if confidence >= self.high_confidence {
            ConfidenceLevel::High
        } else if confidence >= self.medium_confidence {
            ConfidenceLevel::Medium
        } else if confidence >= self.low_confidence {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::Rejected
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Dictionary,
    Model,
    Rules,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub label: String,
    pub confidence: f32,
    pub source: CandidateSource,
    pub is_motion: bool,
    /// Full class distribution when the source has one.
    pub probabilities: Vec<f32>,
}

impl Candidate {
    pub fn new(label: impl Into<String>, confidence: f32, source: CandidateSource) -> Candidate {
        Candidate {
            label: label.into(),
            confidence,
            source,
            is_motion: false,
            probabilities: Vec::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        is_unknown_label(&self.label)
    }
}

/// Per-frame facts the adjustments depend on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSignals {
    pub hand_count: usize,
    /// An inbound hand in this frame had fewer than 21 points.
    pub incomplete_hand: bool,
    /// Share of buffered frames that had at least one hand.
    pub hand_presence: f32,
    pub frame_count: usize,
    pub duration_seconds: f32,
}

impl Default for FrameSignals {
    fn default() -> Self {
        FrameSignals {
            hand_count: 1,
            incomplete_hand: false,
            hand_presence: 1.0,
            frame_count: 0,
            duration_seconds: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
    pub is_motion: bool,
    pub frame_count: usize,
    pub duration_seconds: f32,
    pub source: CandidateSource,
    pub level: ConfidenceLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Emit(Prediction),
    Rejected { label: String, confidence: f32 },
    /// Nothing to report yet.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbiterState {
    Idle,
    Detecting,
    Holding,
    Transitioning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbiterStats {
    pub average_confidence: f32,
    pub prediction_count: usize,
    pub high_confidence_ratio: f32,
    pub calibration_factor: f32,
}

pub struct ConfidenceArbiter {
    config: ArbiterConfig,
    clock: Arc<dyn Clock>,
    state: ArbiterState,
    calibration_factor: f32,
    /// Raw labels of recognised candidates, for temporal smoothing.
    history: BoundedBuffer<String>,
    /// Every evaluation's label including unknowns, for the consistency test.
    recent: BoundedBuffer<String>,
    confidences: BoundedBuffer<f32>,
    last_emitted: Option<String>,
    emitted_at: HashMap<String, Duration>,
}

impl std::fmt::Debug for ConfidenceArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfidenceArbiter")
            .field("state", &self.state)
            .field("last_emitted", &self.last_emitted)
            .finish()
    }
}

impl ConfidenceArbiter {
    pub fn new(config: ArbiterConfig, clock: Arc<dyn Clock>) -> ConfidenceArbiter {
        ConfidenceArbiter {
            calibration_factor: config.calibration_factor.clamp(0.8, 1.2),
            history: BoundedBuffer::new(config.history_size.max(1)),
            recent: BoundedBuffer::new(config.consistency_window.max(1)),
            confidences: BoundedBuffer::new(config.stats_window.max(1)),
            config,
            clock,
            state: ArbiterState::Idle,
            last_emitted: None,
            emitted_at: HashMap::new(),
        }
    }

    pub fn state(&self) -> ArbiterState {
        self.state
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Dictionary first, then the model if still below
    /// `model_fallback_below`, then the rules if below `rule_fallback_below`.
    /// A later source replaces the current best only with a strictly higher
    /// confidence. Unknown candidates never survive.
    pub fn arbitrate<M, R>(&self, dictionary: Option<Candidate>, model: M, rules: R) -> Option<Candidate>
    where
        M: FnOnce() -> Option<Candidate>,
        R: FnOnce() -> Option<Candidate>,
    {
        let confidence = |c: &Option<Candidate>| c.as_ref().map_or(0.0, |c| c.confidence);

        let mut best = dictionary.filter(|c| !c.is_unknown());
        if confidence(&best) < self.config.model_fallback_below {
            best = higher(best, model());
        }
        if confidence(&best) < self.config.rule_fallback_below {
            best = higher(best, rules());
        }
        best
    }

    /// Adjust the candidate's confidence, advance the state machine and decide
    /// whether to emit.
    pub fn evaluate(&mut self, candidate: Option<Candidate>, signals: FrameSignals) -> Verdict {
        let now = self.clock.now();

        let Some(candidate) = candidate.filter(|c| !c.is_unknown() && c.confidence > 0.0) else {
            self.recent.push(String::new());
            self.advance(None, now);
            return Verdict::Pending;
        };

        let confidence = self.adjust(&candidate, &signals);
        self.history.push(candidate.label.clone());
        self.recent.push(candidate.label.clone());
        self.confidences.push(confidence);
        self.advance(Some(candidate.label.as_str()), now);

        if confidence < self.config.rejection_threshold {
            debug!(label = %candidate.label, confidence, "below rejection threshold");
            return Verdict::Rejected {
                label: candidate.label,
                confidence,
            };
        }

        if self.state != ArbiterState::Holding || !self.cooldown_allows(&candidate.label, now) {
            return Verdict::Pending;
        }

        self.last_emitted = Some(candidate.label.clone());
        self.emitted_at.insert(candidate.label.clone(), now);
        self.state = ArbiterState::Transitioning;

        Verdict::Emit(Prediction {
            level: self.config.level(confidence),
            label: candidate.label,
            confidence,
            is_motion: candidate.is_motion,
            frame_count: signals.frame_count,
            duration_seconds: signals.duration_seconds,
            source: candidate.source,
        })
    }

    fn adjust(&self, candidate: &Candidate, signals: &FrameSignals) -> f32 {
        let mut confidence = candidate.confidence.clamp(0.0, 1.0);
        confidence *= context_modifier(signals.hand_count, candidate.is_motion);
        if let Some(penalty) = entropy_penalty(&candidate.probabilities) {
            confidence *= penalty;
        }
        confidence *= stability_factor(signals);
        confidence = self.smooth(&candidate.label, confidence);
        (confidence * self.calibration_factor).clamp(0.0, 1.0)
    }

    fn smooth(&self, label: &str, confidence: f32) -> f32 {
        if self.history.is_empty() {
            return confidence;
        }
        let window: Vec<&String> = self.history.recent(self.config.smoothing_window).collect();
        let agreeing = window.iter().filter(|l| l.as_str() == label).count();
        // exact thirds: 2 of 3 boosts, 1 of 3 penalises
        if agreeing * 3 >= window.len() * 2 {
            (confidence * 1.1).min(1.0)
        } else if agreeing * 3 <= window.len() {
            confidence * 0.9
        } else {
            confidence
        }
    }

    fn consistent(&self, label: &str) -> bool {
        self.recent.iter().filter(|l| l.as_str() == label).count() >= 2
    }

    fn since_emitted(&self, label: &str, now: Duration) -> bool {
        self.emitted_at
            .get(label)
            .map_or(true, |at| now.saturating_sub(*at) >= self.config.cooldown())
    }

    fn cooldown_allows(&self, label: &str, now: Duration) -> bool {
        self.last_emitted.as_deref() != Some(label) || self.since_emitted(label, now)
    }

    fn cooldown_over(&self, now: Duration) -> bool {
        self.last_emitted
            .as_deref()
            .map_or(true, |label| self.since_emitted(label, now))
    }

    fn advance(&mut self, label: Option<&str>, now: Duration) {
        let next = match (self.state, label) {
            (ArbiterState::Transitioning, label) => {
                let consistent = label.map_or(false, |l| self.consistent(l));
                let switched = label.is_some() && label != self.last_emitted.as_deref();
                if consistent && switched {
                    ArbiterState::Holding
                } else if self.cooldown_over(now) {
                    if consistent {
                        ArbiterState::Holding
                    } else {
                        ArbiterState::Idle
                    }
                } else {
                    ArbiterState::Transitioning
                }
            }
            (_, None) => ArbiterState::Idle,
            (_, Some(label)) => {
                if self.consistent(label) {
                    ArbiterState::Holding
                } else {
                    ArbiterState::Detecting
                }
            }
        };
        if next != self.state {
            debug!(from = ?self.state, to = ?next, "arbiter state");
        }
        self.state = next;
    }

    /// Nudge the calibration factor from observed true and false positive
    /// confidences. Clamped to [0.8, 1.2].
    pub fn calibrate(&mut self, true_positives: &[f32], false_positives: &[f32]) {
        if true_positives.is_empty() || false_positives.is_empty() {
            return;
        }
        let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len() as f32;
        let tp = mean(true_positives);
        if tp <= 0.0 {
            return;
        }
        self.calibration_factor = (1.0 + (tp - mean(false_positives)) * 0.1).clamp(0.8, 1.2);
        debug!(factor = self.calibration_factor, "calibrated");
    }

    pub fn calibration_factor(&self) -> f32 {
        self.calibration_factor
    }

    pub fn reset_history(&mut self) {
        self.history.clear();
        self.recent.clear();
        self.state = ArbiterState::Idle;
    }

    pub fn stats(&self) -> ArbiterStats {
        let count = self.confidences.len();
        let high = self
            .confidences
            .iter()
            .filter(|c| **c >= self.config.high_confidence)
            .count();
        ArbiterStats {
            average_confidence: self.confidences.get_mean(),
            prediction_count: count,
            high_confidence_ratio: if count == 0 {
                0.0
            } else {
                high as f32 / count as f32
            },
            calibration_factor: self.calibration_factor,
        }
    }
}

fn higher(current: Option<Candidate>, challenger: Option<Candidate>) -> Option<Candidate> {
    let challenger = challenger.filter(|c| !c.is_unknown());
    match (current, challenger) {
        (Some(current), Some(challenger)) if challenger.confidence > current.confidence => {
            Some(challenger)
        }
        (Some(current), _) => Some(current),
        (None, challenger) => challenger,
    }
}

/// Hand-count modifier times sign-kind modifier.
pub fn context_modifier(hand_count: usize, is_motion: bool) -> f32 {
    let hands = if hand_count >= 2 { 0.95 } else { 1.0 };
    let kind = if is_motion { 0.90 } else { 1.05 };
    hands * kind
}

/// `1 - 0.3 * H / ln(n)`. None without a usable distribution.
pub fn entropy_penalty(probabilities: &[f32]) -> Option<f32> {
    if probabilities.len() < 2 {
        return None;
    }
    let entropy: f32 = probabilities
        .iter()
        .map(|p| -p * (p + 1e-10).ln())
        .sum();
    let max_entropy = (probabilities.len() as f32).ln();
    let normalized = (entropy / max_entropy).clamp(0.0, 1.0);
    Some(1.0 - 0.3 * normalized)
}

/// Lower when hands come and go across the buffer or a hand arrived short.
pub fn stability_factor(signals: &FrameSignals) -> f32 {
    let presence = signals.hand_presence.clamp(0.0, 1.0);
    let mut factor = 0.5 + 0.5 * presence;
    if signals.incomplete_hand {
        factor *= 0.7;
    }
    factor
}
