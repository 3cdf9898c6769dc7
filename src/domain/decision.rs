use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Confidence attached to keyword-inferred verdicts.
pub const INFERRED_CONFIDENCE: f64 = 0.5;
/// Confidence attached to the deterministic fallback rule.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// A release verdict: allow or hold, why, and how much the producer trusts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub can_release: bool,
    pub reason: String,
    pub confidence: f64,
}

impl Verdict {
    pub fn new(can_release: bool, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            can_release,
            reason: reason.into(),
            confidence: clamp_confidence(confidence),
        }
    }
}

/// Clamps into `[0, 1]`; NaN is treated as unknown and mapped to 0.5.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        INFERRED_CONFIDENCE
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Why the decision engine used its deterministic rule.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackCause {
    /// No language backend is configured.
    Unconfigured,
    /// The backend failed or timed out.
    BackendFailed(String),
}

/// The outcome of a release evaluation, tagged by provenance.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Parsed from a structured JSON answer of the language backend.
    Primary(Verdict),
    /// Inferred from release/hold wording when the answer held no JSON.
    Inferred(Verdict),
    /// Deterministic heuristic, used whenever the backend is unavailable.
    Heuristic { verdict: Verdict, cause: FallbackCause },
}

impl Decision {
    pub fn verdict(&self) -> &Verdict {
        match self {
            Decision::Primary(verdict) | Decision::Inferred(verdict) => verdict,
            Decision::Heuristic { verdict, .. } => verdict,
        }
    }

    pub fn into_verdict(self) -> Verdict {
        match self {
            Decision::Primary(verdict) | Decision::Inferred(verdict) => verdict,
            Decision::Heuristic { verdict, .. } => verdict,
        }
    }

    pub fn source(&self) -> DecisionSource {
        match self {
            Decision::Primary(_) => DecisionSource::Model,
            Decision::Inferred(_) => DecisionSource::ModelText,
            Decision::Heuristic { .. } => DecisionSource::Fallback,
        }
    }
}

/// Provenance of a persisted decision record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Model,
    ModelText,
    Fallback,
    DisputePolicy,
    Forced,
    Cancellation,
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionSource::Model => "model",
            DecisionSource::ModelText => "model_text",
            DecisionSource::Fallback => "fallback",
            DecisionSource::DisputePolicy => "dispute_policy",
            DecisionSource::Forced => "forced",
            DecisionSource::Cancellation => "cancellation",
        };
        f.write_str(s)
    }
}

/// Audit trail attached to an order; overwritten on every release attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub can_release: bool,
    pub reason: String,
    pub confidence: f64,
    pub source: DecisionSource,
    pub evaluated_at: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn from_verdict(verdict: Verdict, source: DecisionSource) -> Self {
        Self {
            can_release: verdict.can_release,
            reason: verdict.reason,
            confidence: verdict.confidence,
            source,
            evaluated_at: Utc::now(),
        }
    }

    pub fn from_decision(decision: Decision) -> Self {
        let source = decision.source();
        Self::from_verdict(decision.into_verdict(), source)
    }
}

/// Failure of a language-generation backend. Never escapes the decision engine.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed backend response: {0}")]
    Malformed(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}
