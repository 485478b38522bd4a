//! Text recognition through tesseract.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::time::Duration;
use tracing::{debug, instrument};

use crate::config::EnginesConfig;
use crate::staging::{OutputSlot, StagedFile};

use super::error::ConvertError;
use super::image::{flatten_onto_white, load_image};
use super::process::EngineCommand;
use super::traits::Converter;
use super::types::{first_input, first_name, Artifact, ConverterDescriptor, Operation, Params};

/// Summary returned by `ocr-text`.
pub fn text_report(file_name: &str, recognized: &str) -> serde_json::Value {
    let text = recognized.trim();
    json!({
        "success": true,
        "filename": file_name,
        "text": text,
        "character_count": text.chars().count(),
        "word_count": text.split_whitespace().count(),
    })
}

/// Image-to-text and image-to-searchable-PDF recognition.
pub struct OcrConverter {
    descriptor: ConverterDescriptor,
    tesseract: PathBuf,
    language: String,
    timeout: Duration,
}

impl OcrConverter {
    pub fn new(descriptor: ConverterDescriptor, engines: &EnginesConfig) -> Self {
        Self {
            descriptor,
            tesseract: engines.tesseract.clone(),
            language: engines.ocr_language.clone(),
            timeout: Duration::from_secs(engines.process_timeout_secs),
        }
    }

    /// Writes an opaque RGB copy of the input; tesseract assumes no alpha.
    async fn normalize(source: &Path, work_dir: &Path) -> Result<PathBuf, ConvertError> {
        let source = source.to_path_buf();
        let target = work_dir.join("page.png");
        let written = target.clone();

        tokio::task::spawn_blocking(move || {
            let flat = flatten_onto_white(&load_image(&source)?);
            DynamicImage::ImageRgb8(flat)
                .save_with_format(&target, ImageFormat::Png)
                .map_err(|e| ConvertError::engine("image", format!("Failed to normalize image: {}", e)))
        })
        .await
        .map_err(|e| ConvertError::engine("image", e.to_string()))??;

        Ok(written)
    }

    fn command(&self) -> EngineCommand {
        EngineCommand::new("tesseract", &self.tesseract, self.timeout)
    }
}

#[async_trait]
impl Converter for OcrConverter {
    fn descriptor(&self) -> &ConverterDescriptor {
        &self.descriptor
    }

    fn output_name(&self, inputs: &[StagedFile], _params: &Params) -> String {
        let (_, stem) = first_name(inputs);
        match self.descriptor.operation {
            Operation::OcrText => format!("{}_ocr.json", stem),
            _ => format!("{}_ocr.pdf", stem),
        }
    }

    #[instrument(skip_all, fields(operation = %self.descriptor.operation))]
    async fn execute(
        &self,
        inputs: &[StagedFile],
        output: &OutputSlot,
        _params: &Params,
    ) -> Result<Artifact, ConvertError> {
        let input = first_input(inputs)?;
        let work_dir = output.work_dir().await?;
        let page = Self::normalize(&input.path, &work_dir).await?;

        if self.descriptor.operation == Operation::OcrText {
            let result = self
                .command()
                .arg(&page)
                .arg("stdout")
                .args(["-l", self.language.as_str()])
                .run()
                .await?;
            let report = text_report(&input.original_name, &result.stdout_text());
            let body = serde_json::to_vec_pretty(&report)
                .map_err(|e| ConvertError::engine("tesseract", e.to_string()))?;
            tokio::fs::write(output.scratch_path(), body).await?;
            return Ok(Artifact::new("application/json"));
        }

        // tesseract appends ".pdf" to the output base itself
        let base = work_dir.join("searchable");
        self.command()
            .arg(&page)
            .arg(&base)
            .args(["-l", self.language.as_str(), "pdf"])
            .run()
            .await?;

        let produced = base.with_extension("pdf");
        if !tokio::fs::try_exists(&produced).await? {
            return Err(ConvertError::artifact_not_found(format!(
                "tesseract wrote no PDF at {}",
                produced.display()
            )));
        }
        debug!(produced = %produced.display(), "Searchable PDF written");
        tokio::fs::rename(&produced, output.scratch_path()).await?;
        Ok(Artifact::new("application/pdf"))
    }
}
