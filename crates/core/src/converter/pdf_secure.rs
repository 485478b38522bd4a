//! PDF compression and encryption through qpdf.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::time::Duration;
use tracing::instrument;

use crate::config::EnginesConfig;
use crate::staging::{OutputSlot, StagedFile};

use super::error::ConvertError;
use super::process::EngineCommand;
use super::traits::Converter;
use super::types::{first_input, first_name, Artifact, ConverterDescriptor, Operation, Params};

/// qpdf exits with 3 when it succeeded but printed warnings.
const QPDF_WARNINGS: i32 = 3;

/// `pdf-compress`, `pdf-protect` and `pdf-unlock`.
pub struct QpdfConverter {
    descriptor: ConverterDescriptor,
    qpdf: PathBuf,
    timeout: Duration,
}

impl QpdfConverter {
    pub fn new(descriptor: ConverterDescriptor, engines: &EnginesConfig) -> Self {
        Self {
            descriptor,
            qpdf: engines.qpdf.clone(),
            timeout: Duration::from_secs(engines.process_timeout_secs),
        }
    }

    fn build_args(
        operation: Operation,
        input: &Path,
        output: &Path,
        password: &str,
    ) -> Vec<String> {
        let input = input.to_string_lossy().to_string();
        let output = output.to_string_lossy().to_string();

        match operation {
            Operation::PdfProtect => vec![
                "--encrypt".to_string(),
                password.to_string(),
                password.to_string(),
                "256".to_string(),
                "--".to_string(),
                input,
                output,
            ],
            Operation::PdfUnlock => vec![
                format!("--password={}", password),
                "--decrypt".to_string(),
                input,
                output,
            ],
            _ => vec![
                "--object-streams=generate".to_string(),
                "--compress-streams=y".to_string(),
                "--recompress-flate".to_string(),
                input,
                output,
            ],
        }
    }
}

#[async_trait]
impl Converter for QpdfConverter {
    fn descriptor(&self) -> &ConverterDescriptor {
        &self.descriptor
    }

    fn output_name(&self, inputs: &[StagedFile], _params: &Params) -> String {
        let (name, _) = first_name(inputs);
        let prefix = match self.descriptor.operation {
            Operation::PdfProtect => "protected",
            Operation::PdfUnlock => "unlocked",
            _ => "compressed",
        };
        format!("{}_{}", prefix, name)
    }

    #[instrument(skip_all, fields(operation = %self.descriptor.operation))]
    async fn execute(
        &self,
        inputs: &[StagedFile],
        output: &OutputSlot,
        params: &Params,
    ) -> Result<Artifact, ConvertError> {
        let input = first_input(inputs)?;
        let args = Self::build_args(
            self.descriptor.operation,
            &input.path,
            output.scratch_path(),
            params.text("password"),
        );

        EngineCommand::new("qpdf", &self.qpdf, self.timeout)
            .args(&args)
            .accept_exit_code(QPDF_WARNINGS)
            .run()
            .await?;

        if !tokio::fs::try_exists(output.scratch_path()).await? {
            return Err(ConvertError::artifact_not_found(
                "qpdf reported success but wrote no file",
            ));
        }
        Ok(Artifact::new("application/pdf"))
    }
}
