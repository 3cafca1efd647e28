use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ImageBlob, LangTag, PageSegMode, PreprocessConfig};
use crate::error::{Result, TesseraError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStage {
    #[default]
    Received,
    Decoding,
    Preprocessing,
    Recognizing,
    Completed,
    Failed,
}

impl RequestStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RequestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Decoding => write!(f, "decoding"),
            Self::Preprocessing => write!(f, "preprocessing"),
            Self::Recognizing => write!(f, "recognizing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Inbound call as handed over by the HTTP boundary. Every override is
/// optional and falls back to the configured default.
#[derive(Debug, Clone)]
pub struct OcrRequest {
    pub blob: ImageBlob,
    pub language: Option<String>,
    pub segmentation: Option<String>,
    pub preprocess: Option<PreprocessConfig>,
    pub timeout: Option<Duration>,
}

impl OcrRequest {
    pub fn new(blob: ImageBlob) -> Self {
        Self {
            blob,
            language: None,
            segmentation: None,
            preprocess: None,
            timeout: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_segmentation(mut self, mode: impl Into<String>) -> Self {
        self.segmentation = Some(mode.into());
        self
    }

    pub fn with_preprocess(mut self, preprocess: PreprocessConfig) -> Self {
        self.preprocess = Some(preprocess);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Wall-clock milliseconds spent in each stage.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageTimings {
    pub queued_ms: u64,
    pub decode_ms: u64,
    pub preprocess_ms: u64,
    pub recognize_ms: u64,
    pub total_ms: u64,
}

/// Per-request state: identity, resolved options, deadline, cancellation and
/// the stage machine.
#[derive(Debug)]
pub struct RequestContext {
    id: Uuid,
    blob: Option<ImageBlob>,
    pub language: LangTag,
    pub segmentation: PageSegMode,
    pub preprocess: PreprocessConfig,
    deadline: Instant,
    cancel: CancellationToken,
    stage: RequestStage,
    started: Instant,
    pub timings: StageTimings,
}

impl RequestContext {
    pub fn new(
        blob: ImageBlob,
        language: LangTag,
        segmentation: PageSegMode,
        preprocess: PreprocessConfig,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let started = Instant::now();
        Self {
            id: Uuid::new_v4(),
            blob: Some(blob),
            language,
            segmentation,
            preprocess,
            deadline: started + timeout,
            cancel,
            stage: RequestStage::Received,
            started,
            timings: StageTimings::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage(&self) -> RequestStage {
        self.stage
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Hand the upload to the decoder. The blob is dropped as soon as the
    /// caller is done with it.
    pub fn take_blob(&mut self) -> Option<ImageBlob> {
        self.blob.take()
    }

    /// Check deadline and cancellation, then enter `next`.
    pub fn advance(&mut self, next: RequestStage) -> Result<()> {
        if self.stage.is_terminal() {
            return Err(TesseraError::Internal(format!(
                "Request {} already {}, cannot enter {next}",
                self.id, self.stage
            )));
        }
        self.check_live(next)?;
        self.stage = next;
        Ok(())
    }

    /// Fails with `Cancelled` or `DeadlineExceeded` when the request may not
    /// proceed to `next`.
    pub fn check_live(&self, next: RequestStage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TesseraError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(TesseraError::DeadlineExceeded(next.to_string()));
        }
        Ok(())
    }

    pub fn complete(&mut self) {
        if !self.stage.is_terminal() {
            self.stage = RequestStage::Completed;
        }
        self.timings.total_ms = self.elapsed_ms();
    }

    /// Move to `Failed` and return the stage that was active when the failure
    /// happened.
    pub fn fail(&mut self) -> RequestStage {
        let failed_in = self.stage;
        if !self.stage.is_terminal() {
            self.stage = RequestStage::Failed;
        }
        self.timings.total_ms = self.elapsed_ms();
        failed_in
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
