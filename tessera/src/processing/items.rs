use regex::Regex;
use serde::Serialize;

use crate::error::{Result, TesseraError};

/// Common misreads in shopping lists and what they should read.
const CORRECTIONS: &[(&str, &str)] = &[
    ("Oi", "Oil"),
    ("Potatc", "Potato"),
    ("0nion", "Onion"),
    ("Chines", "Chinese"),
    ("Chicken Bonles", "Chicken Boneless"),
    ("Bazal Leave", "Basil Leaves"),
    ("Casor", "Kasoor"),
    ("Capckm", "Capsicum"),
    ("Comber", "Cucumber"),
    ("Green Patta", "Green Leaves"),
    ("Salad Patta", "Salad Leaves"),
];

const MIN_LINE_CHARS: usize = 3;

/// One entry of a recognized shopping list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct LineItem {
    pub itemname: String,
    /// Amount with unit and without whitespace (e.g. `2kg`); empty when the
    /// line carried no amount.
    pub quantity: String,
}

/// Turns recognized text into `{itemname, quantity}` records.
#[derive(Debug, Clone)]
pub struct LineItemExtractor {
    noise: Regex,
    item: Regex,
    whitespace: Regex,
    corrections: Vec<(Regex, &'static str)>,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| TesseraError::Internal(format!("Invalid pattern '{pattern}': {e}")))
}

impl LineItemExtractor {
    pub fn new() -> Result<Self> {
        let corrections = CORRECTIONS
            .iter()
            .map(|(from, to)| {
                compile(&format!(r"(?i)\b{}\b", regex::escape(from))).map(|re| (re, *to))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            noise: compile(r"[^\w\s.]+")?,
            item: compile(
                r"(?i)^(.*?)\s*(\d+(?:\.\d+)?(?:\s*(?:kg|g|gr|pkt|lit|can|piece|pieces|pcs))?)?(?:\s*V)?$",
            )?,
            whitespace: compile(r"\s+")?,
            corrections,
        })
    }

    /// Extract items line by line. Lines shorter than three characters are
    /// skipped; `+` and `,` separate several items on one line.
    pub fn extract(&self, text: &str) -> Vec<LineItem> {
        text.lines()
            .map(str::trim)
            .filter(|line| line.chars().count() >= MIN_LINE_CHARS)
            .flat_map(|line| line.split(['+', ',']))
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(|part| self.parse_item(part))
            .collect()
    }

    fn parse_item(&self, raw: &str) -> Option<LineItem> {
        let cleaned = self.noise.replace_all(raw, " ");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return None;
        }

        let caps = self.item.captures(cleaned)?;
        let name = caps.get(1).map_or("", |m| m.as_str()).trim();
        let mut itemname = title_case(name);
        for (pattern, replacement) in &self.corrections {
            if pattern.is_match(&itemname) {
                itemname = pattern.replace_all(&itemname, *replacement).into_owned();
            }
        }

        let quantity = caps
            .get(2)
            .map(|m| self.whitespace.replace_all(m.as_str(), "").into_owned())
            .unwrap_or_default();

        (itemname.chars().count() > 1).then_some(LineItem { itemname, quantity })
    }
}

/// Uppercase the first letter of every alphabetic run and lowercase the rest,
/// so `0nion` becomes `0Nion` and `green PATTA` becomes `Green Patta`.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
