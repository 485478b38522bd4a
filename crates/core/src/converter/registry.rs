//! Operation-name to converter resolution.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;

use super::archive::ArchiveConverter;
use super::catalog::describe;
use super::codes::CodeConverter;
use super::document::DocumentConverter;
use super::error::ConvertError;
use super::fetch::FetchConverter;
use super::image::ImageConverter;
use super::media::MediaConverter;
use super::ocr::OcrConverter;
use super::pdf::PdfConverter;
use super::pdf_secure::QpdfConverter;
use super::text::TextConverter;
use super::traits::Converter;
use super::types::{ConverterDescriptor, Operation};

/// Immutable table of converters, built once at startup.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: BTreeMap<Operation, Arc<dyn Converter>>,
}

impl ConverterRegistry {
    /// Registers a converter for every operation.
    pub fn new(config: &Config) -> Result<Self, ConvertError> {
        let engines = &config.engines;
        let mut registry = Self::empty();

        for &operation in Operation::ALL {
            let descriptor = describe(operation);
            let converter: Arc<dyn Converter> = match operation {
                Operation::PdfToWord
                | Operation::WordToPdf
                | Operation::CsvToExcel
                | Operation::MarkdownToHtml => Arc::new(DocumentConverter::new(descriptor, engines)),
                Operation::ImageConvert
                | Operation::ImageFilter
                | Operation::ImageAdjust
                | Operation::ImageMetadata
                | Operation::ImageStripMetadata => Arc::new(ImageConverter::new(descriptor, engines)),
                Operation::ColorPalette | Operation::QrCode | Operation::Barcode => {
                    Arc::new(CodeConverter::new(descriptor))
                }
                Operation::MediaConvert | Operation::MediaCompress => {
                    Arc::new(MediaConverter::new(descriptor, engines))
                }
                Operation::MediaFetch => {
                    Arc::new(FetchConverter::new(descriptor, engines, &config.fetch)?)
                }
                Operation::ArchiveCreate => Arc::new(ArchiveConverter::new(descriptor)),
                Operation::PdfCompress | Operation::PdfProtect | Operation::PdfUnlock => {
                    Arc::new(QpdfConverter::new(descriptor, engines))
                }
                Operation::PdfMerge
                | Operation::PdfSplit
                | Operation::PdfRotate
                | Operation::PdfInfo
                | Operation::PdfFindReplace
                | Operation::PdfAddText
                | Operation::PdfAddImage
                | Operation::PdfWatermark
                | Operation::PdfHighlight => Arc::new(PdfConverter::new(descriptor, engines)),
                Operation::OcrText | Operation::OcrPdf => Arc::new(OcrConverter::new(descriptor, engines)),
                Operation::Base64Encode
                | Operation::Base64Decode
                | Operation::JsonToYaml
                | Operation::YamlToJson
                | Operation::JsonFormat
                | Operation::UrlEncode
                | Operation::UrlDecode
                | Operation::UuidGenerate
                | Operation::LoremIpsum => Arc::new(TextConverter::new(descriptor)),
            };
            registry.converters.insert(operation, converter);
        }

        Ok(registry)
    }

    /// A registry with no converters; see [`ConverterRegistry::register`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds or replaces the converter for its descriptor's operation.
    pub fn register(mut self, converter: Arc<dyn Converter>) -> Self {
        let operation = converter.descriptor().operation;
        self.converters.insert(operation, converter);
        self
    }

    /// Resolves a wire name such as `pdf-merge`.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Converter>, ConvertError> {
        let operation: Operation = name.parse()?;
        self.get(operation).ok_or(ConvertError::UnknownOperation {
            name: name.to_string(),
        })
    }

    pub fn get(&self, operation: Operation) -> Option<Arc<dyn Converter>> {
        self.converters.get(&operation).cloned()
    }

    /// Descriptors of every registered operation, in catalogue order.
    pub fn descriptors(&self) -> Vec<ConverterDescriptor> {
        self.converters
            .values()
            .map(|c| c.descriptor().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("operations", &self.converters.keys().collect::<Vec<_>>())
            .finish()
    }
}
