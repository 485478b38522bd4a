//! Office document conversions (LibreOffice) and Markdown rendering.

use async_trait::async_trait;
use pulldown_cmark::{html, Options, Parser};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::time::Duration;
use tracing::{debug, instrument};

use crate::config::EnginesConfig;
use crate::staging::{OutputSlot, StagedFile};

use super::error::ConvertError;
use super::process::EngineCommand;
use super::traits::Converter;
use super::types::{first_input, first_name, Artifact, ConverterDescriptor, Operation, Params};

/// Document conversions for the document family.
pub struct DocumentConverter {
    descriptor: ConverterDescriptor,
    soffice: PathBuf,
    timeout: Duration,
}

/// What the office suite is asked to produce.
struct OfficeTarget {
    extension: &'static str,
    filter: &'static str,
    import_filter: Option<&'static str>,
}

impl DocumentConverter {
    pub fn new(descriptor: ConverterDescriptor, engines: &EnginesConfig) -> Self {
        Self {
            descriptor,
            soffice: engines.soffice.clone(),
            timeout: Duration::from_secs(engines.process_timeout_secs),
        }
    }

    fn office_target(&self) -> Option<OfficeTarget> {
        match self.descriptor.operation {
            Operation::PdfToWord => Some(OfficeTarget {
                extension: "docx",
                filter: "docx:MS Word 2007 XML",
                import_filter: Some("writer_pdf_import"),
            }),
            Operation::WordToPdf => Some(OfficeTarget {
                extension: "pdf",
                filter: "pdf",
                import_filter: None,
            }),
            Operation::CsvToExcel => Some(OfficeTarget {
                extension: "xlsx",
                filter: "xlsx:Calc MS Excel 2007 XML",
                import_filter: None,
            }),
            _ => None,
        }
    }

    fn output_extension(&self) -> &'static str {
        self.office_target()
            .map(|t| t.extension)
            .unwrap_or("html")
    }

    /// Builds soffice arguments for a headless conversion into `work_dir`.
    ///
    /// Each run gets its own user profile so concurrent conversions do not
    /// fight over the profile lock.
    fn build_office_args(input: &Path, work_dir: &Path, target: &OfficeTarget) -> Vec<OsString> {
        let mut profile = OsString::from("-env:UserInstallation=file://");
        profile.push(work_dir.join("profile"));

        let mut args: Vec<OsString> = vec![
            "--headless".into(),
            "--norestore".into(),
            "--nolockcheck".into(),
            profile,
        ];
        if let Some(import) = target.import_filter {
            args.push(format!("--infilter={}", import).into());
        }
        args.extend([
            "--convert-to".into(),
            target.filter.into(),
            "--outdir".into(),
            work_dir.as_os_str().to_os_string(),
            input.as_os_str().to_os_string(),
        ]);
        args
    }

    async fn convert_with_office(
        &self,
        input: &StagedFile,
        output: &OutputSlot,
        target: OfficeTarget,
    ) -> Result<(), ConvertError> {
        let work_dir = output.work_dir().await?;
        let args = Self::build_office_args(&input.path, &work_dir, &target);

        EngineCommand::new("soffice", &self.soffice, self.timeout)
            .args(&args)
            .run()
            .await?;

        // soffice names its output after the input file's stem
        let stem = input
            .path
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        let mut produced = work_dir.join(stem);
        produced.set_extension(target.extension);
        debug!(path = %produced.display(), "Office conversion finished");

        if !produced.exists() {
            return Err(ConvertError::engine(
                "soffice",
                format!(
                    "Conversion of '{}' produced no {} file",
                    input.original_name, target.extension
                ),
            ));
        }
        tokio::fs::rename(&produced, output.scratch_path()).await?;
        Ok(())
    }
}

/// Renders Markdown into a standalone HTML page.
pub fn render_markdown(markdown: &str, title: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut body = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut body, Parser::new_ext(markdown, options));

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        body
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
impl Converter for DocumentConverter {
    fn descriptor(&self) -> &ConverterDescriptor {
        &self.descriptor
    }

    fn output_name(&self, inputs: &[StagedFile], _params: &Params) -> String {
        let (_, stem) = first_name(inputs);
        format!("{}.{}", stem, self.output_extension())
    }

    #[instrument(skip_all, fields(operation = %self.descriptor.operation))]
    async fn execute(
        &self,
        inputs: &[StagedFile],
        output: &OutputSlot,
        _params: &Params,
    ) -> Result<Artifact, ConvertError> {
        let input = first_input(inputs)?;
        let content_type = self
            .descriptor
            .output_types
            .first()
            .copied()
            .unwrap_or("application/octet-stream");

        match self.office_target() {
            Some(target) => self.convert_with_office(input, output, target).await?,
            None => {
                let bytes = tokio::fs::read(&input.path).await?;
                let markdown = String::from_utf8(bytes).map_err(|_| {
                    ConvertError::validation("Markdown file is not valid UTF-8")
                })?;
                let page = render_markdown(&markdown, &input.stem());
                tokio::fs::write(output.scratch_path(), page).await?;
            }
        }

        Ok(Artifact::new(content_type))
    }
}
