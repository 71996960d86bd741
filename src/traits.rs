//! Read-only access to the backend's personality trait scores.

use std::fmt;

use crate::models::{TraitSnapshot, TraitVector};
use crate::transport::{Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraitKind {
    Openness,
    Conscientiousness,
    Extraversion,
    Agreeableness,
    Neuroticism,
}

impl TraitKind {
    pub const ALL: [TraitKind; 5] = [
        TraitKind::Openness,
        TraitKind::Conscientiousness,
        TraitKind::Extraversion,
        TraitKind::Agreeableness,
        TraitKind::Neuroticism,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TraitKind::Openness => "Openness",
            TraitKind::Conscientiousness => "Conscientiousness",
            TraitKind::Extraversion => "Extraversion",
            TraitKind::Agreeableness => "Agreeableness",
            TraitKind::Neuroticism => "Emotional Sensitivity",
        }
    }
}

impl fmt::Display for TraitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraitBand {
    Low,
    Moderate,
    High,
}

impl TraitBand {
    pub fn of(score: f64) -> Self {
        if score < 4.0 {
            TraitBand::Low
        } else if score < 7.0 {
            TraitBand::Moderate
        } else {
            TraitBand::High
        }
    }
}

impl TraitVector {
    pub fn score(&self, kind: TraitKind) -> f64 {
        match kind {
            TraitKind::Openness => self.openness,
            TraitKind::Conscientiousness => self.conscientiousness,
            TraitKind::Extraversion => self.extraversion,
            TraitKind::Agreeableness => self.agreeableness,
            TraitKind::Neuroticism => self.neuroticism,
        }
    }

    /// `(kind, score, band)` in display order.
    pub fn summary(&self) -> Vec<(TraitKind, f64, TraitBand)> {
        TraitKind::ALL
            .iter()
            .map(|&kind| {
                let score = self.score(kind);
                (kind, score, TraitBand::of(score))
            })
            .collect()
    }
}

pub struct TraitsClient {
    transport: Transport,
}

impl TraitsClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub async fn current(&self) -> Result<TraitVector, TransportError> {
        self.transport.get("/traits/").await
    }

    /// Recent trait changes, newest first.
    pub async fn history(&self) -> Result<Vec<TraitSnapshot>, TransportError> {
        self.transport.get("/traits/history").await
    }
}
