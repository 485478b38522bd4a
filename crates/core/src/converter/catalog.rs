//! Static descriptors for every operation.

use super::types::{ConverterDescriptor, Multiplicity, Operation, ParamSpec};

pub(crate) const IMAGE_EXTENSIONS: &[&str] =
    &["png", "jpg", "jpeg", "webp", "gif", "bmp", "tiff", "tif"];
pub(crate) const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "mkv", "webm", "flv", "wmv", "m4v", "mp3", "wav", "flac", "ogg", "aac",
    "m4a", "opus", "wma",
];
const PDF: &[&str] = &["pdf"];
const PDF_TYPE: &[&str] = &["application/pdf"];
const JSON_TYPE: &[&str] = &["application/json"];
const PNG_TYPE: &[&str] = &["image/png"];
const TEXT_TYPE: &[&str] = &["text/plain"];

pub(crate) const IMAGE_TARGETS: &[&str] = &["png", "jpeg", "webp", "gif", "bmp", "tiff", "pdf"];
pub(crate) const IMAGE_FILTERS: &[&str] = &["grayscale", "sepia", "blur", "sharpen", "edge", "emboss"];
pub(crate) const MEDIA_TARGETS: &[&str] =
    &["mp4", "avi", "mov", "mkv", "mp3", "wav", "flac", "ogg", "aac"];
pub(crate) const FETCH_FORMATS: &[&str] = &["mp4", "mp3", "m4a", "wav", "flac", "ogg"];
pub(crate) const BARCODE_TYPES: &[&str] = &["code128", "code39", "ean13", "ean8", "upca"];
pub(crate) const ROTATION_ANGLES: &[&str] = &["90", "180", "270", "-90"];
pub(crate) const TEXT_COLORS: &[&str] = &["black", "red", "blue", "green", "white"];

/// Coordinates are page points; this only rules out absurd values.
const MAX_COORDINATE: f64 = 14_400.0;
const MAX_PAGE_INDEX: i64 = 99_999;

fn descriptor(
    operation: Operation,
    summary: &'static str,
    inputs: Multiplicity,
    extensions: &'static [&'static str],
    params: Vec<ParamSpec>,
    output_types: &'static [&'static str],
) -> ConverterDescriptor {
    ConverterDescriptor {
        operation,
        family: operation.family(),
        summary,
        inputs,
        extensions,
        params,
        output_types,
    }
}

fn coordinate(name: &'static str, default: f64) -> ParamSpec {
    ParamSpec::float(name, 0.0, MAX_COORDINATE, default)
}

fn page_num() -> ParamSpec {
    ParamSpec::integer("page_num", 0, MAX_PAGE_INDEX, 0)
}

/// Builds the descriptor for `operation`.
pub fn describe(operation: Operation) -> ConverterDescriptor {
    use Multiplicity::{AtLeast, Exactly, None, Single};
    use Operation as Op;

    match operation {
        Op::PdfToWord => descriptor(
            operation,
            "Convert a PDF into an editable Word document",
            Single,
            PDF,
            vec![],
            &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"],
        ),
        Op::WordToPdf => descriptor(
            operation,
            "Render a word-processor document as PDF",
            Single,
            &["doc", "docx", "odt", "rtf"],
            vec![],
            PDF_TYPE,
        ),
        Op::CsvToExcel => descriptor(
            operation,
            "Convert a CSV table into an Excel workbook",
            Single,
            &["csv"],
            vec![],
            &["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"],
        ),
        Op::MarkdownToHtml => descriptor(
            operation,
            "Render Markdown as a standalone HTML page",
            Single,
            &["md", "markdown"],
            vec![],
            &["text/html"],
        ),
        Op::ImageConvert => descriptor(
            operation,
            "Re-encode an image in another format",
            Single,
            IMAGE_EXTENSIONS,
            vec![ParamSpec::choice("target_format", IMAGE_TARGETS, Option::None)],
            &[
                "image/png",
                "image/jpeg",
                "image/webp",
                "image/gif",
                "image/bmp",
                "image/tiff",
                "application/pdf",
            ],
        ),
        Op::ImageFilter => descriptor(
            operation,
            "Apply a filter to an image",
            Single,
            IMAGE_EXTENSIONS,
            vec![ParamSpec::choice("filter", IMAGE_FILTERS, Option::None)],
            PNG_TYPE,
        ),
        Op::ImageAdjust => descriptor(
            operation,
            "Adjust brightness, contrast and saturation",
            Single,
            IMAGE_EXTENSIONS,
            vec![
                ParamSpec::float("brightness", 0.0, 3.0, 1.0),
                ParamSpec::float("contrast", 0.0, 3.0, 1.0),
                ParamSpec::float("saturation", 0.0, 3.0, 1.0),
            ],
            PNG_TYPE,
        ),
        Op::ImageMetadata => descriptor(
            operation,
            "Read EXIF metadata from an image",
            Single,
            IMAGE_EXTENSIONS,
            vec![],
            JSON_TYPE,
        ),
        Op::ImageStripMetadata => descriptor(
            operation,
            "Re-encode an image without its metadata",
            Single,
            IMAGE_EXTENSIONS,
            vec![],
            PNG_TYPE,
        ),
        Op::ColorPalette => descriptor(
            operation,
            "Extract the dominant colours of an image",
            Single,
            IMAGE_EXTENSIONS,
            vec![ParamSpec::integer("color_count", 1, 16, 5)],
            JSON_TYPE,
        ),
        Op::QrCode => descriptor(
            operation,
            "Generate a QR code",
            None,
            &[],
            vec![
                ParamSpec::non_empty("data"),
                ParamSpec::integer("size", 1, 50, 10),
                ParamSpec::integer("border", 0, 20, 4),
                ParamSpec::text("fill_color"),
                ParamSpec::text("back_color"),
            ],
            PNG_TYPE,
        ),
        Op::Barcode => descriptor(
            operation,
            "Generate a linear barcode",
            None,
            &[],
            vec![
                ParamSpec::non_empty("data"),
                ParamSpec::choice("barcode_type", BARCODE_TYPES, Some("code128")),
            ],
            PNG_TYPE,
        ),
        Op::MediaConvert => descriptor(
            operation,
            "Transcode audio or video into another container",
            Single,
            MEDIA_EXTENSIONS,
            vec![ParamSpec::choice("target_format", MEDIA_TARGETS, Option::None)],
            &["video/*", "audio/*"],
        ),
        Op::MediaCompress => descriptor(
            operation,
            "Re-encode a video with H.264 at a given quality",
            Single,
            &["mp4", "avi", "mov", "mkv"],
            vec![ParamSpec::integer("crf", 0, 51, 28)],
            &["video/*"],
        ),
        Op::MediaFetch => descriptor(
            operation,
            "Download remote media and convert it",
            None,
            &[],
            vec![
                ParamSpec::non_empty("url"),
                ParamSpec::choice("format", FETCH_FORMATS, Some("mp4")),
            ],
            &["video/mp4", "audio/*"],
        ),
        Op::ArchiveCreate => descriptor(
            operation,
            "Pack files into a zip archive",
            AtLeast { count: 1 },
            &[],
            vec![],
            &["application/zip"],
        ),
        Op::PdfMerge => descriptor(
            operation,
            "Concatenate PDFs in upload order",
            AtLeast { count: 2 },
            PDF,
            vec![],
            PDF_TYPE,
        ),
        Op::PdfSplit => descriptor(
            operation,
            "Extract pages by range, e.g. 1-3,5",
            Single,
            PDF,
            vec![ParamSpec::non_empty("pages")],
            PDF_TYPE,
        ),
        Op::PdfRotate => descriptor(
            operation,
            "Rotate every page",
            Single,
            PDF,
            vec![ParamSpec::choice("angle", ROTATION_ANGLES, Some("90"))],
            PDF_TYPE,
        ),
        Op::PdfCompress => descriptor(
            operation,
            "Compress streams and drop unused objects",
            Single,
            PDF,
            vec![],
            PDF_TYPE,
        ),
        Op::PdfProtect => descriptor(
            operation,
            "Encrypt a PDF with a password",
            Single,
            PDF,
            vec![ParamSpec::non_empty("password")],
            PDF_TYPE,
        ),
        Op::PdfUnlock => descriptor(
            operation,
            "Remove password protection",
            Single,
            PDF,
            vec![ParamSpec::text("password")],
            PDF_TYPE,
        ),
        Op::PdfInfo => descriptor(
            operation,
            "Report page count and document metadata",
            Single,
            PDF,
            vec![],
            JSON_TYPE,
        ),
        Op::PdfFindReplace => descriptor(
            operation,
            "Replace text occurrences on every page",
            Single,
            PDF,
            vec![ParamSpec::non_empty("find_text"), ParamSpec::text("replace_text")],
            PDF_TYPE,
        ),
        Op::PdfAddText => descriptor(
            operation,
            "Draw text on a page",
            Single,
            PDF,
            vec![
                ParamSpec::non_empty("text"),
                page_num(),
                coordinate("x", 100.0),
                coordinate("y", 100.0),
                ParamSpec::integer("font_size", 1, 200, 12),
                ParamSpec::choice("color", TEXT_COLORS, Some("black")),
            ],
            PDF_TYPE,
        ),
        Op::PdfAddImage => descriptor(
            operation,
            "Place an image on a page (PDF first, image second)",
            Exactly { count: 2 },
            &[],
            vec![
                page_num(),
                coordinate("x", 100.0),
                coordinate("y", 100.0),
                ParamSpec::float("width", 0.01, MAX_COORDINATE, 100.0),
                ParamSpec::float("height", 0.01, MAX_COORDINATE, 100.0),
            ],
            PDF_TYPE,
        ),
        Op::PdfWatermark => descriptor(
            operation,
            "Stamp diagonal text across every page",
            Single,
            PDF,
            vec![
                ParamSpec::non_empty("watermark_text"),
                ParamSpec::float("opacity", 0.0, 1.0, 0.3),
            ],
            PDF_TYPE,
        ),
        Op::PdfHighlight => descriptor(
            operation,
            "Highlight a rectangle on a page",
            Single,
            PDF,
            vec![
                page_num(),
                coordinate("x0", 0.0).required(),
                coordinate("y0", 0.0).required(),
                coordinate("x1", 0.0).required(),
                coordinate("y1", 0.0).required(),
            ],
            PDF_TYPE,
        ),
        Op::OcrText => descriptor(
            operation,
            "Recognise text in an image",
            Single,
            &["jpg", "jpeg", "png", "tiff", "tif", "bmp", "gif"],
            vec![],
            JSON_TYPE,
        ),
        Op::OcrPdf => descriptor(
            operation,
            "Produce a searchable PDF from an image",
            Single,
            &["jpg", "jpeg", "png", "tiff", "tif", "bmp"],
            vec![],
            PDF_TYPE,
        ),
        Op::Base64Encode => descriptor(
            operation,
            "Base64-encode text",
            None,
            &[],
            vec![ParamSpec::text("text").required()],
            TEXT_TYPE,
        ),
        Op::Base64Decode => descriptor(
            operation,
            "Decode Base64 into UTF-8 text",
            None,
            &[],
            vec![ParamSpec::text("text").required()],
            TEXT_TYPE,
        ),
        Op::JsonToYaml => descriptor(
            operation,
            "Convert a JSON file to YAML",
            Single,
            &["json"],
            vec![],
            &["text/yaml"],
        ),
        Op::YamlToJson => descriptor(
            operation,
            "Convert a YAML file to JSON",
            Single,
            &["yaml", "yml"],
            vec![],
            JSON_TYPE,
        ),
        Op::JsonFormat => descriptor(
            operation,
            "Pretty-print or minify JSON",
            None,
            &[],
            vec![ParamSpec::text("text").required(), ParamSpec::flag("minify", false)],
            JSON_TYPE,
        ),
        Op::UrlEncode => descriptor(
            operation,
            "Percent-encode text",
            None,
            &[],
            vec![ParamSpec::text("text").required()],
            TEXT_TYPE,
        ),
        Op::UrlDecode => descriptor(
            operation,
            "Decode percent-encoded text",
            None,
            &[],
            vec![ParamSpec::text("text").required()],
            TEXT_TYPE,
        ),
        Op::UuidGenerate => descriptor(
            operation,
            "Generate version 1 or version 4 UUIDs",
            None,
            &[],
            vec![
                ParamSpec::integer("count", 1, 100, 1),
                ParamSpec::choice("version", &["1", "4"], Some("4")),
            ],
            JSON_TYPE,
        ),
        Op::LoremIpsum => descriptor(
            operation,
            "Generate placeholder text",
            None,
            &[],
            vec![
                ParamSpec::integer("paragraphs", 1, 50, 3),
                ParamSpec::integer("words_per_para", 1, 500, 50),
            ],
            TEXT_TYPE,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::types::{Family, ParamKind};

    #[test]
    fn test_every_operation_has_descriptor() {
        for op in Operation::ALL {
            let d = describe(*op);
            assert_eq!(d.operation, *op);
            assert_eq!(d.family, op.family());
            assert!(!d.output_types.is_empty(), "{} has no output type", op);
        }
    }

    #[test]
    fn test_merge_requires_two_inputs() {
        let d = describe(Operation::PdfMerge);
        assert!(!d.inputs.accepts(1));
        assert!(d.inputs.accepts(2));
    }

    #[test]
    fn test_rotation_choices() {
        let d = describe(Operation::PdfRotate);
        let angle = d.params.iter().find(|p| p.name == "angle").unwrap();
        match &angle.kind {
            ParamKind::Choice { options, default } => {
                assert_eq!(*options, &["90", "180", "270", "-90"]);
                assert_eq!(*default, Some("90"));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_generators_take_no_files() {
        for op in [Operation::QrCode, Operation::Barcode, Operation::MediaFetch] {
            assert!(describe(op).inputs.accepts(0));
        }
        assert_eq!(describe(Operation::QrCode).family, Family::Code);
    }
}
