//! Tessera: an OCR request pipeline behind a small HTTP service.
//!
//! An upload is validated and decoded by [`ocr::ImageNormalizer`], cleaned
//! up by [`ocr::preprocess`] and recognized by an [`ocr::OcrEngine`] chosen
//! through [`ocr::OcrAdapter`]. [`processing::ProcessingPipeline`] drives one
//! request through those stages under admission control, a deadline and
//! cancellation.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod ocr;
pub mod processing;
