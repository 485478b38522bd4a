//! Types shared by every converter.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::staging::StagedFile;

use super::error::ConvertError;

/// Operation family; one converter implementation per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Document,
    Image,
    Code,
    Media,
    Fetch,
    Archive,
    Pdf,
    Ocr,
    Text,
}

macro_rules! operations {
    ($($variant:ident => $name:literal, $family:ident;)+) => {
        /// Closed set of conversion operations.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub enum Operation {
            $(
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl Operation {
            /// Every operation, in catalogue order.
            pub const ALL: &'static [Operation] = &[$(Operation::$variant),+];

            /// Kebab-case identifier used on the wire.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Operation::$variant => $name,)+
                }
            }

            pub fn family(&self) -> Family {
                match self {
                    $(Operation::$variant => Family::$family,)+
                }
            }
        }

        impl FromStr for Operation {
            type Err = ConvertError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Operation::$variant),)+
                    other => Err(ConvertError::UnknownOperation {
                        name: other.to_string(),
                    }),
                }
            }
        }
    };
}

operations! {
    PdfToWord => "pdf-to-word", Document;
    WordToPdf => "word-to-pdf", Document;
    CsvToExcel => "csv-to-excel", Document;
    MarkdownToHtml => "markdown-to-html", Document;
    ImageConvert => "image-convert", Image;
    ImageFilter => "image-filter", Image;
    ImageAdjust => "image-adjust", Image;
    ImageMetadata => "image-metadata", Image;
    ImageStripMetadata => "image-strip-metadata", Image;
    ColorPalette => "color-palette", Code;
    QrCode => "qr-code", Code;
    Barcode => "barcode", Code;
    MediaConvert => "media-convert", Media;
    MediaCompress => "media-compress", Media;
    MediaFetch => "media-fetch", Fetch;
    ArchiveCreate => "archive-create", Archive;
    PdfMerge => "pdf-merge", Pdf;
    PdfSplit => "pdf-split", Pdf;
    PdfRotate => "pdf-rotate", Pdf;
    PdfCompress => "pdf-compress", Pdf;
    PdfProtect => "pdf-protect", Pdf;
    PdfUnlock => "pdf-unlock", Pdf;
    PdfInfo => "pdf-info", Pdf;
    PdfFindReplace => "pdf-find-replace", Pdf;
    PdfAddText => "pdf-add-text", Pdf;
    PdfAddImage => "pdf-add-image", Pdf;
    PdfWatermark => "pdf-watermark", Pdf;
    PdfHighlight => "pdf-highlight", Pdf;
    OcrText => "ocr-text", Ocr;
    OcrPdf => "ocr-pdf", Ocr;
    Base64Encode => "base64-encode", Text;
    Base64Decode => "base64-decode", Text;
    JsonToYaml => "json-to-yaml", Text;
    YamlToJson => "yaml-to-json", Text;
    JsonFormat => "json-format", Text;
    UrlEncode => "url-encode", Text;
    UrlDecode => "url-decode", Text;
    UuidGenerate => "uuid-generate", Text;
    LoremIpsum => "lorem-ipsum", Text;
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many file parts an operation accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Multiplicity {
    /// Parameters only.
    None,
    Single,
    Exactly { count: usize },
    AtLeast { count: usize },
}

impl Multiplicity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Self::None => count == 0,
            Self::Single => count == 1,
            Self::Exactly { count: n } => count == n,
            Self::AtLeast { count: n } => count >= n,
        }
    }

    fn describe(&self) -> String {
        match *self {
            Self::None => "no files".to_string(),
            Self::Single => "exactly one file".to_string(),
            Self::Exactly { count } => format!("exactly {} files", count),
            Self::AtLeast { count } => format!("at least {} files", count),
        }
    }
}

/// Declared shape of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    Text {
        non_empty: bool,
    },
    Integer {
        min: i64,
        max: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<i64>,
    },
    Float {
        min: f64,
        max: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<f64>,
    },
    /// Case-insensitive choice among fixed options.
    Choice {
        options: &'static [&'static str],
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<&'static str>,
    },
    Flag {
        default: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
    #[serde(flatten)]
    pub kind: ParamKind,
}

impl ParamSpec {
    /// Optional free text.
    pub fn text(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            kind: ParamKind::Text { non_empty: false },
        }
    }

    /// Required text that must not be blank.
    pub fn non_empty(name: &'static str) -> Self {
        Self {
            name,
            required: true,
            kind: ParamKind::Text { non_empty: true },
        }
    }

    pub fn integer(name: &'static str, min: i64, max: i64, default: i64) -> Self {
        Self {
            name,
            required: false,
            kind: ParamKind::Integer {
                min,
                max,
                default: Some(default),
            },
        }
    }

    pub fn float(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            required: false,
            kind: ParamKind::Float {
                min,
                max,
                default: Some(default),
            },
        }
    }

    pub fn choice(
        name: &'static str,
        options: &'static [&'static str],
        default: Option<&'static str>,
    ) -> Self {
        Self {
            name,
            required: default.is_none(),
            kind: ParamKind::Choice { options, default },
        }
    }

    pub fn flag(name: &'static str, default: bool) -> Self {
        Self {
            name,
            required: false,
            kind: ParamKind::Flag { default },
        }
    }

    /// Marks the parameter as mandatory and drops its default.
    pub fn required(mut self) -> Self {
        self.required = true;
        match &mut self.kind {
            ParamKind::Integer { default, .. } => *default = None,
            ParamKind::Float { default, .. } => *default = None,
            ParamKind::Choice { default, .. } => *default = None,
            ParamKind::Text { .. } | ParamKind::Flag { .. } => {}
        }
        self
    }

    /// Checks one parameter against its declaration.
    pub fn check(&self, params: &Params) -> Result<(), ConvertError> {
        let Some(raw) = params.get(self.name) else {
            return if self.required {
                Err(ConvertError::validation(format!(
                    "Missing required parameter '{}'",
                    self.name
                )))
            } else {
                Ok(())
            };
        };

        match &self.kind {
            ParamKind::Text { non_empty } => {
                if *non_empty && raw.trim().is_empty() {
                    return Err(ConvertError::validation(format!(
                        "Parameter '{}' cannot be empty",
                        self.name
                    )));
                }
            }
            ParamKind::Integer { min, max, .. } => {
                let value = params.integer(self.name, *min)?;
                if value < *min || value > *max {
                    return Err(ConvertError::validation(format!(
                        "Parameter '{}' must be between {} and {}",
                        self.name, min, max
                    )));
                }
            }
            ParamKind::Float { min, max, .. } => {
                let value = params.float(self.name, *min)?;
                if value < *min || value > *max {
                    return Err(ConvertError::validation(format!(
                        "Parameter '{}' must be between {} and {}",
                        self.name, min, max
                    )));
                }
            }
            ParamKind::Choice { options, .. } => {
                if !options.iter().any(|o| o.eq_ignore_ascii_case(raw.trim())) {
                    return Err(ConvertError::validation(format!(
                        "Parameter '{}' must be one of: {}",
                        self.name,
                        options.join(", ")
                    )));
                }
            }
            ParamKind::Flag { .. } => {
                params.flag(self.name, false)?;
            }
        }
        Ok(())
    }
}

/// Static metadata describing one operation.
#[derive(Debug, Clone, Serialize)]
pub struct ConverterDescriptor {
    pub operation: Operation,
    pub family: Family,
    pub summary: &'static str,
    pub inputs: Multiplicity,
    /// Accepted lower-case extensions; empty accepts any file.
    pub extensions: &'static [&'static str],
    pub params: Vec<ParamSpec>,
    pub output_types: &'static [&'static str],
}

impl ConverterDescriptor {
    /// Checks multiplicity, extensions and the declared parameter schema.
    pub fn check(&self, inputs: &[StagedFile], params: &Params) -> Result<(), ConvertError> {
        if !self.inputs.accepts(inputs.len()) {
            return Err(ConvertError::validation(format!(
                "{} expects {}, got {}",
                self.operation,
                self.inputs.describe(),
                inputs.len()
            )));
        }

        if !self.extensions.is_empty() {
            for input in inputs {
                let ext = input.extension().unwrap_or_default();
                if !self.extensions.contains(&ext.as_str()) {
                    return Err(ConvertError::validation(format!(
                        "Unsupported file type for '{}'. Accepted: {}",
                        input.original_name,
                        self.extensions.join(", ")
                    )));
                }
            }
        }

        for spec in &self.params {
            spec.check(params)?;
        }
        Ok(())
    }
}

/// Operation parameters as received (text key/value pairs).
///
/// Blank values are treated as absent so that empty form fields fall back
/// to defaults.
#[derive(Debug, Clone, Default)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style [`Params::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Raw value, or `None` when missing or blank.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Raw value including blank strings; empty when missing.
    pub fn text(&self, name: &str) -> &str {
        self.0.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn required_text(&self, name: &str) -> Result<&str, ConvertError> {
        self.get(name).ok_or_else(|| {
            ConvertError::validation(format!("Missing required parameter '{}'", name))
        })
    }

    pub fn integer(&self, name: &str, default: i64) -> Result<i64, ConvertError> {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                ConvertError::validation(format!("Parameter '{}' must be an integer", name))
            }),
        }
    }

    pub fn float(&self, name: &str, default: f64) -> Result<f64, ConvertError> {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    ConvertError::validation(format!("Parameter '{}' must be a number", name))
                }),
        }
    }

    pub fn flag(&self, name: &str, default: bool) -> Result<bool, ConvertError> {
        match self.get(name).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(ConvertError::validation(format!(
                    "Parameter '{}' must be true or false",
                    name
                ))),
            },
        }
    }

    /// Lower-cased choice value, or `default`.
    pub fn choice(&self, name: &str, default: &str) -> String {
        self.get(name)
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_else(|| default.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// What a converter reports about the artifact it wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub content_type: String,
    /// Delivery name when it differs from the allocated one (fetch only).
    pub file_name: Option<String>,
    /// Extra response metadata, e.g. the replacement count of find/replace.
    pub extra: BTreeMap<String, String>,
}

impl Artifact {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            file_name: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.extra.insert(key.into(), value.to_string());
        self
    }
}

/// First staged input, or a validation error when none was supplied.
pub(crate) fn first_input(inputs: &[StagedFile]) -> Result<&StagedFile, ConvertError> {
    inputs
        .first()
        .ok_or_else(|| ConvertError::validation("No input file was uploaded"))
}

/// Client-facing name and stem of the first input, with fallbacks for
/// naming outputs before validation has run.
pub(crate) fn first_name(inputs: &[StagedFile]) -> (String, String) {
    inputs
        .first()
        .map(|f| (f.original_name.clone(), f.stem()))
        .unwrap_or_else(|| ("output".to_string(), "output".to_string()))
}
