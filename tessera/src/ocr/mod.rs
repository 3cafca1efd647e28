//! Image normalization, preprocessing and text recognition.
//!
//! # Architecture
//!
//! - [`ImageNormalizer`] validates uploads and decodes them into canonical
//!   rasters.
//! - [`preprocess`] applies deterministic image transforms.
//! - [`OcrEngine`] is the recognition backend trait. [`TesseractEngine`] runs
//!   the `tesseract` CLI as a child process and [`VisionApiEngine`] calls an
//!   OpenAI-compatible vision endpoint.
//! - [`OcrAdapter`] selects the engine from `OcrConfig::engine`, validates
//!   language and segmentation options and enforces the recognition timeout.

mod adapter;
mod api;
mod engine;
mod normalize;
mod preprocessing;
mod tesseract;

pub use adapter::OcrAdapter;
pub use api::{VisionApiEngine, VisionProvider};
pub use engine::{OcrEngine, UnavailableEngine};
pub use normalize::ImageNormalizer;
pub use preprocessing::preprocess;
pub use tesseract::TesseractEngine;
