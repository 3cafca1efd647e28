pub(crate) mod health;
pub mod items;
pub mod ocr;

pub use health::health_check;
