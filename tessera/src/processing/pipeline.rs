use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::admission::Admission;
use crate::config::Config;
use crate::error::{Result, TesseraError};
use crate::models::{
    OcrRequest, PreprocessConfig, RecognitionResult, RequestContext, RequestStage, StageTimings,
};
use crate::ocr::{preprocess, ImageNormalizer, OcrAdapter};

/// Successful run of one request.
#[derive(Debug, Clone)]
pub struct OcrOutcome {
    pub request_id: Uuid,
    pub result: RecognitionResult,
    pub timings: StageTimings,
}

/// Failed run: the stage that was active and why it failed. No partial text
/// is ever attached.
#[derive(Debug)]
pub struct StageFailure {
    pub request_id: Uuid,
    pub stage: RequestStage,
    pub error: TesseraError,
    pub timings: StageTimings,
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (stage: {})", self.error, self.stage)
    }
}

impl std::error::Error for StageFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Runs requests through decode, preprocess and recognize under admission
/// control, a per-request deadline and cooperative cancellation.
#[derive(Debug, Clone)]
pub struct ProcessingPipeline {
    normalizer: ImageNormalizer,
    adapter: OcrAdapter,
    admission: Admission,
    preprocess_defaults: PreprocessConfig,
    request_timeout: Duration,
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

impl ProcessingPipeline {
    pub fn new(config: &Config, adapter: OcrAdapter) -> Self {
        Self {
            normalizer: ImageNormalizer::from_config(config),
            adapter,
            admission: Admission::from_config(&config.limits),
            preprocess_defaults: config.preprocess,
            request_timeout: config.limits.request_timeout(),
        }
    }

    pub fn adapter(&self) -> &OcrAdapter {
        &self.adapter
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub fn preprocess_defaults(&self) -> &PreprocessConfig {
        &self.preprocess_defaults
    }

    /// Validate, admit and run one request to completion.
    pub async fn process(
        &self,
        request: OcrRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<OcrOutcome, StageFailure> {
        let mut ctx = match self.prepare(request, cancel) {
            Ok(ctx) => ctx,
            Err(error) => {
                warn!(kind = error.kind(), error = %error, "Request rejected");
                return Err(StageFailure {
                    request_id: Uuid::new_v4(),
                    stage: RequestStage::Received,
                    error,
                    timings: StageTimings::default(),
                });
            }
        };

        match self.run(&mut ctx).await {
            Ok(result) => {
                ctx.complete();
                info!(
                    request_id = %ctx.id(),
                    regions = result.regions().len(),
                    confidence = result.mean_confidence(),
                    total_ms = ctx.timings.total_ms,
                    "Request completed"
                );
                debug!(request_id = %ctx.id(), text = %result.text(), "Raw recognized text");
                Ok(OcrOutcome {
                    request_id: ctx.id(),
                    result,
                    timings: ctx.timings,
                })
            }
            Err(error) => {
                let stage = ctx.fail();
                warn!(
                    request_id = %ctx.id(),
                    stage = %stage,
                    kind = error.kind(),
                    error = %error,
                    "Request failed"
                );
                Err(StageFailure {
                    request_id: ctx.id(),
                    stage,
                    error,
                    timings: ctx.timings,
                })
            }
        }
    }

    /// Cheap validation that runs before admission: payload size, format
    /// sniffing, language, segmentation mode and preprocessing bounds.
    fn prepare(&self, request: OcrRequest, cancel: CancellationToken) -> Result<RequestContext> {
        self.normalizer.check(&request.blob)?;
        let language = self.adapter.resolve_language(request.language.as_deref())?;
        let segmentation = self
            .adapter
            .resolve_segmentation(request.segmentation.as_deref())?;
        let preprocess = request
            .preprocess
            .unwrap_or(self.preprocess_defaults)
            .validate()?;
        let timeout = request
            .timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(self.request_timeout);

        Ok(RequestContext::new(
            request.blob,
            language,
            segmentation,
            preprocess,
            timeout,
            cancel,
        ))
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<RecognitionResult> {
        ctx.check_live(RequestStage::Decoding)?;
        let permit = self
            .admission
            .admit(ctx.deadline(), ctx.cancel_token())
            .await?;
        ctx.timings.queued_ms = millis(permit.queued_for());

        ctx.advance(RequestStage::Decoding)?;
        debug!(request_id = %ctx.id(), "Decoding");
        let started = Instant::now();
        let blob = ctx
            .take_blob()
            .ok_or_else(|| TesseraError::Internal("Request image already consumed".into()))?;
        let normalizer = self.normalizer.clone();
        let (raster, permit) = await_blocking(
            ctx,
            RequestStage::Decoding,
            tokio::task::spawn_blocking(move || (normalizer.normalize(&blob), permit)),
        )
        .await?;
        let raster = raster?;
        ctx.timings.decode_ms = millis(started.elapsed());

        ctx.advance(RequestStage::Preprocessing)?;
        debug!(
            request_id = %ctx.id(),
            width = raster.width(),
            height = raster.height(),
            "Preprocessing"
        );
        let started = Instant::now();
        let config = ctx.preprocess;
        let (raster, permit) = await_blocking(
            ctx,
            RequestStage::Preprocessing,
            tokio::task::spawn_blocking(move || (preprocess(raster, &config), permit)),
        )
        .await?;
        ctx.timings.preprocess_ms = millis(started.elapsed());

        ctx.advance(RequestStage::Recognizing)?;
        let remaining = ctx.remaining();
        let deadline_bound = remaining < self.adapter.timeout();
        let timeout = remaining.min(self.adapter.timeout());
        debug!(
            request_id = %ctx.id(),
            language = %ctx.language,
            psm = %ctx.segmentation,
            timeout_ms = millis(timeout),
            "Recognizing"
        );
        let started = Instant::now();
        let result = self
            .adapter
            .recognize_within(
                &raster,
                &ctx.language,
                ctx.segmentation,
                timeout,
                ctx.cancel_token(),
            )
            .await;
        ctx.timings.recognize_ms = millis(started.elapsed());
        drop(permit);

        match result {
            Err(TesseraError::RecognitionTimeout(_)) if deadline_bound => Err(
                TesseraError::DeadlineExceeded(RequestStage::Recognizing.to_string()),
            ),
            other => other,
        }
    }
}

/// Await a blocking task, giving up early on cancellation or deadline. The
/// task itself runs to completion on the blocking pool and its output is
/// dropped. Tasks take the admission permit with them, so an abandoned task
/// keeps its slot until the work actually stops.
async fn await_blocking<T>(
    ctx: &RequestContext,
    stage: RequestStage,
    handle: JoinHandle<T>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = ctx.cancel_token().cancelled() => Err(TesseraError::Cancelled),
        _ = tokio::time::sleep_until(ctx.deadline()) => {
            Err(TesseraError::DeadlineExceeded(stage.to_string()))
        }
        joined = handle => joined
            .map_err(|e| TesseraError::Internal(format!("{stage} task failed: {e}"))),
    }
}
