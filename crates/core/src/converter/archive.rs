//! Zip packaging.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::instrument;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::staging::{OutputSlot, StagedFile};

use super::error::ConvertError;
use super::traits::Converter;
use super::types::{Artifact, ConverterDescriptor, Params};

fn zip_error(error: zip::result::ZipError) -> ConvertError {
    match error {
        zip::result::ZipError::Io(e) => ConvertError::Io(e),
        other => ConvertError::engine("zip", other.to_string()),
    }
}

/// Writes `entries` (archive name, source path) into a deflated zip at `dest`.
pub fn write_archive(entries: &[(String, PathBuf)], dest: &Path) -> Result<(), ConvertError> {
    let mut writer = ZipWriter::new(BufWriter::new(File::create(dest)?));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for (name, source) in entries {
        writer.start_file(name.as_str(), options).map_err(zip_error)?;
        let mut reader = BufReader::new(File::open(source)?);
        std::io::copy(&mut reader, &mut writer)?;
    }

    writer.finish().map_err(zip_error)?;
    Ok(())
}

/// Packs every input under its client-facing name.
pub struct ArchiveConverter {
    descriptor: ConverterDescriptor,
}

impl ArchiveConverter {
    pub fn new(descriptor: ConverterDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl Converter for ArchiveConverter {
    fn descriptor(&self) -> &ConverterDescriptor {
        &self.descriptor
    }

    /// Two uploads with the same name would shadow each other in the archive.
    fn validate(&self, inputs: &[StagedFile], _params: &Params) -> Result<(), ConvertError> {
        let mut seen = HashSet::new();
        for file in inputs {
            if !seen.insert(file.original_name.as_str()) {
                return Err(ConvertError::validation(format!(
                    "Duplicate file name in archive: {}",
                    file.original_name
                )));
            }
        }
        Ok(())
    }

    fn output_name(&self, _inputs: &[StagedFile], _params: &Params) -> String {
        "archive.zip".to_string()
    }

    #[instrument(skip_all, fields(operation = %self.descriptor.operation, files = inputs.len()))]
    async fn execute(
        &self,
        inputs: &[StagedFile],
        output: &OutputSlot,
        _params: &Params,
    ) -> Result<Artifact, ConvertError> {
        let entries: Vec<(String, PathBuf)> = inputs
            .iter()
            .map(|f| (f.original_name.clone(), f.path.clone()))
            .collect();
        let dest = output.scratch_path().to_path_buf();

        tokio::task::spawn_blocking(move || write_archive(&entries, &dest))
            .await
            .map_err(|e| ConvertError::engine("zip", e.to_string()))??;

        Ok(Artifact::new("application/zip"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_write_archive_keeps_names_and_content() {
        let temp = tempfile::TempDir::new().unwrap();
        let a = temp.path().join("job-1_notes.txt");
        let b = temp.path().join("job-2_data.csv");
        std::fs::write(&a, b"hello").unwrap();
        std::fs::write(&b, b"x,y\n1,2\n").unwrap();

        let dest = temp.path().join("archive.zip");
        write_archive(
            &[("notes.txt".to_string(), a), ("data.csv".to_string(), b)],
            &dest,
        )
        .unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive
            .by_name("notes.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "hello");
        assert!(archive.by_name("data.csv").is_ok());
    }

    #[test]
    fn test_missing_source_is_io() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = write_archive(
            &[("gone.txt".to_string(), temp.path().join("gone.txt"))],
            &temp.path().join("out.zip"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::converter::error::ErrorKind::Io);
    }
}
