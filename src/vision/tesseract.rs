//! Tesseract CLI backend
//!
//! Pipes each region as PNG into the `tesseract` executable and parses its
//! TSV output. A worker remembers its whitelist and passes it on every call
//! as `tessedit_char_whitelist`.

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

use super::ocr::{OcrEngine, OcrText, OcrWorker};
use super::surface;
use crate::config::OcrSettings;

/// Settings shared by every Tesseract worker
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    executable: PathBuf,
    language: String,
    page_segmentation_mode: u8,
}

impl TesseractEngine {
    pub fn new(settings: &OcrSettings) -> Self {
        Self {
            executable: settings
                .tesseract_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("tesseract")),
            language: settings.language.clone(),
            page_segmentation_mode: settings.page_segmentation_mode,
        }
    }

    fn build_command(&self, whitelist: &str) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.page_segmentation_mode.to_string());
        if !whitelist.is_empty() {
            command.arg("-c").arg(format!("tessedit_char_whitelist={}", whitelist));
        }
        command.arg("tsv");
        command
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn spawn_worker(&self) -> Result<Box<dyn OcrWorker>> {
        Ok(Box::new(TesseractWorker {
            engine: self.clone(),
            whitelist: String::new(),
        }))
    }
}

/// One Tesseract configuration; each call runs a short-lived process
pub struct TesseractWorker {
    engine: TesseractEngine,
    whitelist: String,
}

impl OcrWorker for TesseractWorker {
    fn configure(&mut self, whitelist: &str) -> Result<()> {
        self.whitelist = whitelist.to_string();
        Ok(())
    }

    fn recognize(&mut self, image: &RgbaImage) -> Result<OcrText> {
        let png = surface::encode_png(image).context("Failed to encode region for Tesseract")?;

        let mut child = self
            .engine
            .build_command(&self.whitelist)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {:?}", self.engine.executable))?;

        child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Tesseract stdin unavailable"))?
            .write_all(&png)
            .context("Failed to send image to Tesseract")?;

        let output = child.wait_with_output().context("Tesseract did not finish")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let result = parse_tsv_output(&tsv);
        debug!("Tesseract read {:?} ({:.2})", result.text, result.confidence);
        Ok(result)
    }
}

/// Parse Tesseract TSV output into one line of text.
///
/// Word rows (level 5) are joined with single spaces, lines with a space as
/// well; confidence is the mean word confidence scaled to 0..1.
fn parse_tsv_output(tsv: &str) -> OcrText {
    let mut words: Vec<&str> = Vec::new();
    let mut conf_sum = 0.0f32;

    // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
    //             left, top, width, height, conf, text
    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        let text = fields[11].trim();

        if level != 5 || text.is_empty() || conf < 0.0 {
            continue;
        }

        words.push(text);
        conf_sum += conf;
    }

    let confidence = if words.is_empty() {
        0.0
    } else {
        (conf_sum / words.len() as f32 / 100.0).clamp(0.0, 1.0)
    };

    OcrText {
        text: words.join(" "),
        confidence,
    }
}
