use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::engine::OcrEngine;
use crate::config::OcrConfig;
use crate::error::{Result, TesseraError};
use crate::models::{
    BoundingBox, LangTag, PageSegMode, RasterImage, RecognitionResult, RegionConfidence,
};

/// Tesseract run as a child process.
///
/// The raster goes in as PNG on stdin and results come back as TSV on
/// stdout. The child is killed when the call is cancelled or its future is
/// dropped, so a stuck recognition never outlives its request.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: String,
    engine_mode: u8,
    char_whitelist: Option<String>,
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary: config.tesseract_path.clone(),
            engine_mode: config.engine_mode,
            char_whitelist: config.char_whitelist.clone(),
        }
    }

    fn command(&self, language: &LangTag, mode: PageSegMode) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(language.as_str())
            .arg("--psm")
            .arg(mode.to_string())
            .arg("--oem")
            .arg(self.engine_mode.to_string());
        if let Some(whitelist) = &self.char_whitelist {
            cmd.arg("-c")
                .arg(format!("tessedit_char_whitelist={whitelist}"));
        }
        cmd.arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, png: Vec<u8>, language: &LangTag, mode: PageSegMode) -> Result<String> {
        let mut child = self.command(language, mode).spawn().map_err(|e| {
            TesseraError::Recognition(format!("Failed to start {}: {e}", self.binary))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TesseraError::Recognition("Tesseract stdin unavailable".into()))?;

        // Feed stdin concurrently so a full stdout pipe cannot deadlock us.
        let writer = tokio::spawn(async move {
            stdin.write_all(&png).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| TesseraError::Recognition(format!("Tesseract did not finish: {e}")))?;

        if let Ok(Err(e)) = writer.await {
            debug!(error = %e, "Tesseract closed stdin early");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TesseraError::Recognition(format!(
                "Tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| TesseraError::Recognition("Tesseract produced non UTF-8 output".into()))
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(
        &self,
        image: &RasterImage,
        language: &LangTag,
        mode: PageSegMode,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult> {
        let raster = image.clone();
        let png = tokio::task::spawn_blocking(move || raster.encode_png())
            .await
            .map_err(|e| TesseraError::Internal(format!("PNG encoding task failed: {e}")))??;

        let tsv = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TesseraError::Cancelled),
            out = self.run(png, language, mode) => out?,
        };

        parse_tsv(&tsv, language)
    }
}

struct Word<'a> {
    key: (u32, u32, u32, u32),
    bbox: BoundingBox,
    conf: f32,
    text: &'a str,
}

struct Line {
    key: (u32, u32, u32, u32),
    words: Vec<String>,
    conf_sum: f32,
    bbox: BoundingBox,
}

impl Line {
    fn region(&self) -> RegionConfidence {
        let (_, block, par, line) = self.key;
        RegionConfidence {
            id: format!("b{block}.p{par}.l{line}"),
            confidence: self.conf_sum / self.words.len() as f32 / 100.0,
            bbox: Some(self.bbox),
        }
    }
}

fn union(a: BoundingBox, b: BoundingBox) -> BoundingBox {
    let left = a.left.min(b.left);
    let top = a.top.min(b.top);
    let right = (a.left + a.width).max(b.left + b.width);
    let bottom = (a.top + a.height).max(b.top + b.height);
    BoundingBox {
        left,
        top,
        width: right - left,
        height: bottom - top,
    }
}

fn parse_field<T: std::str::FromStr>(fields: &[&str], idx: usize, row: usize) -> Result<T> {
    fields
        .get(idx)
        .and_then(|f| f.trim().parse().ok())
        .ok_or_else(|| {
            TesseraError::Recognition(format!("Malformed TSV row {row}: bad column {idx}"))
        })
}

/// Parse one word row. Rows above word level and empty words yield `None`.
fn parse_row(row: usize, line: &str) -> Result<Option<Word<'_>>> {
    let fields: Vec<&str> = line.splitn(12, '\t').collect();
    if fields.len() < 11 {
        return Err(TesseraError::Recognition(format!(
            "Malformed TSV row {row}: expected 12 columns, got {}",
            fields.len()
        )));
    }

    let level: u32 = parse_field(&fields, 0, row)?;
    if level != 5 {
        return Ok(None);
    }

    let conf: f32 = parse_field(&fields, 10, row)?;
    let text = fields.get(11).map(|t| t.trim()).unwrap_or("");
    if conf < 0.0 || text.is_empty() {
        return Ok(None);
    }

    Ok(Some(Word {
        key: (
            parse_field(&fields, 1, row)?,
            parse_field(&fields, 2, row)?,
            parse_field(&fields, 3, row)?,
            parse_field(&fields, 4, row)?,
        ),
        bbox: BoundingBox {
            left: parse_field(&fields, 6, row)?,
            top: parse_field(&fields, 7, row)?,
            width: parse_field(&fields, 8, row)?,
            height: parse_field(&fields, 9, row)?,
        },
        conf,
        text,
    }))
}

/// Turn Tesseract TSV into text and per-line regions.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num, left,
/// top, width, height, conf, text. Words (level 5) are grouped by line; each
/// line becomes one region whose confidence is the mean word confidence
/// scaled to `[0, 1]`. Lines from different paragraphs are separated by a
/// blank line in the text.
pub(crate) fn parse_tsv(tsv: &str, language: &LangTag) -> Result<RecognitionResult> {
    let mut rows = tsv.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    match rows.next() {
        None => return Ok(RecognitionResult::empty(language.clone())),
        Some((_, header)) if header.starts_with("level") => {}
        Some((_, header)) => {
            return Err(TesseraError::Recognition(format!(
                "Unexpected TSV header: {}",
                header.chars().take(40).collect::<String>()
            )))
        }
    }

    let mut lines: Vec<Line> = Vec::new();
    for (idx, raw) in rows {
        let Some(word) = parse_row(idx + 1, raw)? else {
            continue;
        };

        match lines.last_mut() {
            Some(line) if line.key == word.key => {
                line.words.push(word.text.to_string());
                line.conf_sum += word.conf;
                line.bbox = union(line.bbox, word.bbox);
            }
            _ => lines.push(Line {
                key: word.key,
                words: vec![word.text.to_string()],
                conf_sum: word.conf,
                bbox: word.bbox,
            }),
        }
    }

    let mut text = String::new();
    let mut previous: Option<(u32, u32, u32)> = None;
    for line in &lines {
        let paragraph = (line.key.0, line.key.1, line.key.2);
        if let Some(prev) = previous {
            text.push('\n');
            if prev != paragraph {
                text.push('\n');
            }
        }
        text.push_str(&line.words.join(" "));
        previous = Some(paragraph);
    }

    let regions = lines.iter().map(Line::region).collect();
    Ok(RecognitionResult::new(text, regions, language.clone()))
}
