//! Recency-decay scoring (§4.10): a multiplicative penalty applied to the raw
//! similarity score as a function of how far a payload timestamp sits from a
//! target instant, pushed server-side as a Qdrant formula query rather than
//! re-scored client-side.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayKind {
    Linear,
    Exponential,
    Gaussian,
}

#[derive(Debug, Clone)]
pub struct DecayConfig {
    pub kind: DecayKind,
    /// Dotted payload path holding the timestamp to decay against, e.g.
    /// `system_metadata.updated_at`.
    pub datetime_field: String,
    pub target: DateTime<Utc>,
    /// Time span, in seconds, over which the decay function falls to its
    /// midpoint value.
    pub scale_seconds: f64,
    /// Score multiplier at `scale_seconds` distance from `target`, in (0, 1).
    pub midpoint: f64,
    /// How strongly decay is blended into the final score: 0.0 ignores decay
    /// entirely, 1.0 replaces the raw score with the decay curve, and values
    /// in between blend `(1 - weight) + weight * decay` multiplicatively.
    pub weight: f64,
}

impl DecayConfig {
    pub fn scale_seconds(&self) -> f64 {
        self.scale_seconds
    }
}
