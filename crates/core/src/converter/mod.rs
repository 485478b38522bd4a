//! Converters: one uniform contract over heterogeneous engines.
//!
//! Every operation is described by a static [`ConverterDescriptor`] and
//! served by an implementation of [`Converter`]. Implementations are grouped
//! by family and wrap one engine each:
//!
//! - office documents through LibreOffice (`soffice`), Markdown in-process
//! - images, QR codes, barcodes and palettes in-process (`image`, `qrcode`,
//!   `barcoders`)
//! - audio and video through `ffmpeg`, remote media through `yt-dlp`
//! - PDF page work through pdfium, encryption and compression through `qpdf`
//! - OCR through `tesseract`
//! - zip archives and text codecs in-process
//!
//! Failures are reported as [`ConvertError`], each of which reduces to one
//! [`ErrorKind`].
//!
//! # Example
//!
//! ```ignore
//! use convertino_core::converter::{ConverterRegistry, Params};
//!
//! let registry = ConverterRegistry::new(&config)?;
//! let converter = registry.lookup("pdf-rotate")?;
//! converter.descriptor().check(&inputs, &params)?;
//! converter.validate(&inputs, &params)?;
//! let artifact = converter.execute(&inputs, &slot, &params).await?;
//! ```

mod archive;
mod catalog;
mod codes;
mod document;
mod error;
mod exif;
mod fetch;
mod image;
mod media;
mod ocr;
mod pdf;
mod pdf_secure;
mod pdfium;
mod process;
mod registry;
mod text;
mod traits;
mod types;

pub use archive::ArchiveConverter;
pub use catalog::describe;
pub use codes::CodeConverter;
pub use document::{render_markdown, DocumentConverter};
pub use error::{ConvertError, ErrorKind};
pub use exif::parse_exif;
pub use fetch::{parse_target, FetchConverter, Preflight};
pub use self::image::{ImageConverter, ImageFilter, ImageTarget};
pub use media::{MediaConverter, MediaFormat};
pub use ocr::OcrConverter;
pub use pdf::{PageSelection, PdfConverter, MAX_SPLIT_PAGES};
pub use pdf_secure::QpdfConverter;
pub use pdfium::PdfEngine;
pub use process::{EngineCommand, EngineOutput};
pub use registry::ConverterRegistry;
pub use text::TextConverter;
pub use traits::Converter;
pub use types::{
    Artifact, ConverterDescriptor, Family, Multiplicity, Operation, ParamKind, ParamSpec, Params,
};
