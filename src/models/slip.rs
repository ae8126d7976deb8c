use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One leg of a betting slip: the pick text and its decimal odds multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlipLeg {
    pub pick: String,
    pub odds: f64,
}

/// Structured slip parsed from a job's recognized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSlip {
    pub job_id: Uuid,
    pub legs: Vec<SlipLeg>,
    /// Product of the leg odds.
    pub total_odds: f64,
}

impl ParsedSlip {
    pub fn new(job_id: Uuid, legs: Vec<SlipLeg>) -> Self {
        let total_odds = legs.iter().map(|l| l.odds).product();
        Self {
            job_id,
            legs,
            total_odds,
        }
    }
}
