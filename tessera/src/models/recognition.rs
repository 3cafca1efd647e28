use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};

/// Tesseract-style language tag: one or more traineddata names joined by `+`
/// (e.g. `eng`, `eng+deu`, `chi_sim`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LangTag(String);

impl LangTag {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let well_formed = !value.is_empty()
            && value.split('+').all(|part| {
                !part.is_empty()
                    && part
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            });

        if !well_formed {
            return Err(TesseraError::UnsupportedLanguage(format!(
                "Malformed language tag '{value}'"
            )));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Individual language names making up this tag.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('+')
    }
}

impl std::fmt::Display for LangTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for LangTag {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LangTag {
    type Error = TesseraError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<LangTag> for String {
    fn from(tag: LangTag) -> Self {
        tag.0
    }
}

/// Page segmentation mode, numbered as Tesseract numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PageSegMode {
    OsdOnly = 0,
    AutoOsd = 1,
    AutoOnly = 2,
    Auto = 3,
    SingleColumn = 4,
    SingleBlockVertText = 5,
    SingleBlock = 6,
    SingleLine = 7,
    SingleWord = 8,
    CircleWord = 9,
    SingleChar = 10,
    SparseText = 11,
    SparseTextOsd = 12,
    RawLine = 13,
}

impl PageSegMode {
    pub const ALL: [PageSegMode; 14] = [
        Self::OsdOnly,
        Self::AutoOsd,
        Self::AutoOnly,
        Self::Auto,
        Self::SingleColumn,
        Self::SingleBlockVertText,
        Self::SingleBlock,
        Self::SingleLine,
        Self::SingleWord,
        Self::CircleWord,
        Self::SingleChar,
        Self::SparseText,
        Self::SparseTextOsd,
        Self::RawLine,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Default for PageSegMode {
    /// Uniform block of text. Default for shopping lists.
    fn default() -> Self {
        Self::SingleBlock
    }
}

impl TryFrom<u8> for PageSegMode {
    type Error = TesseraError;

    fn try_from(value: u8) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_u8() == value)
            .ok_or_else(|| {
                TesseraError::InvalidSegmentationMode(format!(
                    "Unknown page segmentation mode {value} (expected 0-13)"
                ))
            })
    }
}

impl From<PageSegMode> for u8 {
    fn from(mode: PageSegMode) -> Self {
        mode.as_u8()
    }
}

impl std::fmt::Display for PageSegMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

impl std::str::FromStr for PageSegMode {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self> {
        let value: u8 = s.trim().parse().map_err(|_| {
            TesseraError::InvalidSegmentationMode(format!(
                "Page segmentation mode must be a number, got '{s}'"
            ))
        })?;
        Self::try_from(value)
    }
}

/// Pixel rectangle of a recognized region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RegionConfidence {
    /// Region identifier, unique within one result (e.g. `b1.p1.l2`).
    pub id: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

/// Output of one recognition call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    text: String,
    regions: Vec<RegionConfidence>,
    language: LangTag,
}

impl RecognitionResult {
    /// Scores outside `[0, 1]` are clamped and NaN scores become 0.
    pub fn new(text: String, regions: Vec<RegionConfidence>, language: LangTag) -> Self {
        let regions = regions
            .into_iter()
            .map(|mut region| {
                region.confidence = clamp_unit(region.confidence);
                region
            })
            .collect();

        Self {
            text,
            regions,
            language,
        }
    }

    pub fn empty(language: LangTag) -> Self {
        Self::new(String::new(), Vec::new(), language)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn regions(&self) -> &[RegionConfidence] {
        &self.regions
    }

    pub fn language(&self) -> &LangTag {
        &self.language
    }

    /// Mean region confidence, or 0 when nothing was recognized.
    pub fn mean_confidence(&self) -> f32 {
        if self.regions.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.regions.iter().map(|r| r.confidence).sum();
        clamp_unit(sum / self.regions.len() as f32)
    }

    pub fn into_parts(self) -> (String, Vec<RegionConfidence>, LangTag) {
        (self.text, self.regions, self.language)
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
