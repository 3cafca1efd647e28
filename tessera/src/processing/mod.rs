mod admission;
mod items;
mod pipeline;

pub use admission::{Admission, AdmissionPermit};
pub use items::{LineItem, LineItemExtractor};
pub use pipeline::{OcrOutcome, ProcessingPipeline, StageFailure};
