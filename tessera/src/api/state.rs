use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::ocr::OcrAdapter;
use crate::processing::{LineItemExtractor, ProcessingPipeline};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: ProcessingPipeline,
    pub items: Arc<LineItemExtractor>,
}

impl AppState {
    pub fn new(config: Config, adapter: OcrAdapter) -> Result<Self> {
        let pipeline = ProcessingPipeline::new(&config, adapter);
        let items = Arc::new(LineItemExtractor::new()?);

        Ok(Self {
            config: Arc::new(config),
            pipeline,
            items,
        })
    }
}
