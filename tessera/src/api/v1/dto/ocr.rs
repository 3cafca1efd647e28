use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{RegionConfidence, StageTimings};
use crate::processing::{LineItem, OcrOutcome};

/// Recognized text of one image.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OcrResponse {
    pub text: String,
    pub regions: Vec<RegionConfidence>,
    /// Language tag the text was recognized with, e.g. `eng+deu`.
    pub language: String,
    /// Mean region confidence in `[0, 1]`; 0 when no text was found.
    pub mean_confidence: f32,
    pub timings: StageTimings,
}

impl From<OcrOutcome> for OcrResponse {
    fn from(outcome: OcrOutcome) -> Self {
        let mean_confidence = outcome.result.mean_confidence();
        let (text, regions, language) = outcome.result.into_parts();
        Self {
            text,
            regions,
            language: language.as_str().to_string(),
            mean_confidence,
            timings: outcome.timings,
        }
    }
}

/// Recognized text plus the shopping-list entries found in it.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemsResponse {
    pub text: String,
    pub items: Vec<LineItem>,
    pub mean_confidence: f32,
    pub timings: StageTimings,
}

/// Body of `POST /process-image`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LegacyItemsResponse {
    pub items: Vec<LineItem>,
}
