use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

/// One recognized text region, as reported by the OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TextRegion {
    #[garde(skip)]
    pub bbox: BoundingBox,

    #[garde(length(min = 1))]
    pub text: String,

    /// Engine confidence, passed through unmodified.
    #[garde(range(min = 0.0, max = 1.0))]
    pub confidence: f64,
}

/// Recognized text for one job. Written once on success, immutable after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub job_id: Uuid,
    /// Regions in engine reading order (top-to-bottom, left-to-right per line).
    pub regions: Vec<TextRegion>,
    /// Region texts joined in reading order, one line per region.
    pub full_text: String,
    pub engine_version: String,
}

impl RecognitionResult {
    /// Assemble a result from engine regions, joining texts in engine order.
    pub fn from_regions(job_id: Uuid, regions: Vec<TextRegion>, engine_version: &str) -> Self {
        let full_text = regions
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            job_id,
            regions,
            full_text,
            engine_version: engine_version.to_string(),
        }
    }

    /// Region texts at or above the given confidence floor.
    pub fn lines_above(&self, min_confidence: f64) -> Vec<&str> {
        self.regions
            .iter()
            .filter(|r| r.confidence >= min_confidence)
            .map(|r| r.text.as_str())
            .collect()
    }
}
