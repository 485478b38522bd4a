//! Trait definitions for the converter module.

use async_trait::async_trait;

use crate::staging::{OutputSlot, StagedFile};

use super::error::ConvertError;
use super::types::{Artifact, ConverterDescriptor, Params};

/// One conversion operation backed by a library, a process or the network.
///
/// The executor always calls [`ConverterDescriptor::check`] and then
/// [`Converter::validate`] before [`Converter::execute`], so `execute` can
/// rely on well-formed parameters.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Static metadata for this operation.
    fn descriptor(&self) -> &ConverterDescriptor;

    /// Operation-specific checks beyond the declared schema.
    fn validate(&self, _inputs: &[StagedFile], _params: &Params) -> Result<(), ConvertError> {
        Ok(())
    }

    /// Name the produced artifact is delivered under.
    fn output_name(&self, inputs: &[StagedFile], params: &Params) -> String;

    /// Writes the artifact into `output.scratch_path()`.
    ///
    /// Implementations must not touch `output.path()`; committing the scratch
    /// file is the executor's job.
    async fn execute(
        &self,
        inputs: &[StagedFile],
        output: &OutputSlot,
        params: &Params,
    ) -> Result<Artifact, ConvertError>;
}
