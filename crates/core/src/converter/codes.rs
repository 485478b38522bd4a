//! Generated images and colour extraction: QR codes, barcodes, palettes.

use async_trait::async_trait;
use barcoders::sym::code128::Code128;
use barcoders::sym::code39::Code39;
use barcoders::sym::ean13::EAN13;
use barcoders::sym::ean8::EAN8;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use qrcode::{Color, EcLevel, QrCode};
use serde_json::json;
use tracing::instrument;

use crate::staging::{OutputSlot, StagedFile};

use super::error::ConvertError;
use super::image::load_image;
use super::traits::Converter;
use super::types::{first_input, first_name, Artifact, ConverterDescriptor, Operation, Params};

const BARCODE_MODULE_PX: u32 = 2;
const BARCODE_HEIGHT_PX: u32 = 120;
const BARCODE_QUIET_MODULES: u32 = 10;

/// Parses a colour name or `#rgb` / `#rrggbb` literal.
pub fn parse_color(raw: &str) -> Option<Rgb<u8>> {
    let value = raw.trim().to_ascii_lowercase();
    let named = match value.as_str() {
        "black" => Some([0, 0, 0]),
        "white" => Some([255, 255, 255]),
        "red" => Some([255, 0, 0]),
        "green" => Some([0, 128, 0]),
        "blue" => Some([0, 0, 255]),
        "yellow" => Some([255, 255, 0]),
        "orange" => Some([255, 165, 0]),
        "purple" => Some([128, 0, 128]),
        "gray" | "grey" => Some([128, 128, 128]),
        "navy" => Some([0, 0, 128]),
        _ => None,
    };
    if let Some(rgb) = named {
        return Some(Rgb(rgb));
    }

    let hex = value.strip_prefix('#')?;
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
    Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// Renders `data` as a QR code with `box_size` pixels per module and a
/// quiet zone of `border` modules.
pub fn render_qr(
    data: &str,
    box_size: u32,
    border: u32,
    fill: Rgb<u8>,
    back: Rgb<u8>,
) -> Result<RgbImage, ConvertError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
        .map_err(|e| ConvertError::validation(format!("QR generation failed: {}", e)))?;
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let side = (modules + 2 * border) * box_size;

    Ok(RgbImage::from_fn(side, side, |x, y| {
        let mx = (x / box_size) as i64 - border as i64;
        let my = (y / box_size) as i64 - border as i64;
        if mx < 0 || my < 0 || mx >= modules as i64 || my >= modules as i64 {
            return back;
        }
        match colors[(my as u32 * modules + mx as u32) as usize] {
            Color::Dark => fill,
            Color::Light => back,
        }
    }))
}

fn digits_only(data: &str, kind: &str) -> Result<(), ConvertError> {
    if data.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ConvertError::validation(format!("{} barcodes take digits only", kind)))
    }
}

/// Drops a supplied check digit; the encoder always computes its own.
fn payload_digits<'a>(data: &'a str, kind: &str, body: usize) -> Result<&'a str, ConvertError> {
    digits_only(data, kind)?;
    match data.len() {
        n if n == body => Ok(data),
        n if n == body + 1 => Ok(&data[..body]),
        _ => Err(ConvertError::validation(format!(
            "{} barcodes need {} digits",
            kind, body
        ))),
    }
}

/// Encodes `data` into bar modules (1 = bar).
pub fn encode_barcode(kind: &str, data: &str) -> Result<Vec<u8>, ConvertError> {
    let invalid = |e: barcoders::error::Error| {
        ConvertError::validation(format!("Invalid {} data: {}", kind, e))
    };

    match kind {
        // 'Ɓ' selects character set B (printable ASCII)
        "code128" => Code128::new(format!("\u{0181}{}", data))
            .map(|b| b.encode())
            .map_err(invalid),
        "code39" => Code39::new(data.to_ascii_uppercase())
            .map(|b| b.encode())
            .map_err(invalid),
        "ean13" => EAN13::new(payload_digits(data, "EAN-13", 12)?)
            .map(|b| b.encode())
            .map_err(invalid),
        "ean8" => EAN8::new(payload_digits(data, "EAN-8", 7)?)
            .map(|b| b.encode())
            .map_err(invalid),
        // UPC-A is EAN-13 with a leading zero
        "upca" => EAN13::new(format!("0{}", payload_digits(data, "UPC-A", 11)?))
            .map(|b| b.encode())
            .map_err(invalid),
        other => Err(ConvertError::validation(format!(
            "Unsupported barcode type: {}",
            other
        ))),
    }
}

pub fn render_barcode(modules: &[u8]) -> RgbImage {
    let width = (modules.len() as u32 + 2 * BARCODE_QUIET_MODULES) * BARCODE_MODULE_PX;
    RgbImage::from_fn(width, BARCODE_HEIGHT_PX, |x, _| {
        let index = (x / BARCODE_MODULE_PX) as i64 - BARCODE_QUIET_MODULES as i64;
        let bar = usize::try_from(index)
            .ok()
            .and_then(|i| modules.get(i))
            .is_some_and(|m| *m == 1);
        if bar {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    })
}

/// A box of pixels in median-cut quantisation.
struct ColorBox {
    pixels: Vec<[u8; 3]>,
}

impl ColorBox {
    /// Channel with the largest spread, with its low and high bounds.
    fn widest_channel(&self) -> (usize, u8, u8) {
        (0..3)
            .map(|c| {
                let (lo, hi) = self
                    .pixels
                    .iter()
                    .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[c]), hi.max(p[c])));
                (c, lo, hi)
            })
            .max_by_key(|(_, lo, hi)| hi.saturating_sub(*lo))
            .unwrap_or((0, 0, 0))
    }

    fn spread(&self) -> u8 {
        let (_, lo, hi) = self.widest_channel();
        hi.saturating_sub(lo)
    }

    fn average(&self) -> [u8; 3] {
        let n = self.pixels.len().max(1) as u64;
        let mut sum = [0u64; 3];
        for p in &self.pixels {
            for c in 0..3 {
                sum[c] += p[c] as u64;
            }
        }
        sum.map(|s| ((s + n / 2) / n) as u8)
    }
}

/// Dominant colours of `image` by median cut, most populous first.
pub fn dominant_colors(image: &DynamicImage, count: usize) -> Vec<[u8; 3]> {
    let rgba = image.to_rgba8();
    let total = rgba.pixels().len();
    let stride = (total / 250_000).max(1);

    let pixels: Vec<[u8; 3]> = rgba
        .pixels()
        .step_by(stride)
        // transparent and near-white pixels are background
        .filter(|p| p[3] >= 125 && !(p[0] > 250 && p[1] > 250 && p[2] > 250))
        .map(|p| [p[0], p[1], p[2]])
        .collect();
    if pixels.is_empty() {
        return Vec::new();
    }

    let mut boxes = vec![ColorBox { pixels }];
    while boxes.len() < count {
        let Some((index, _)) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.spread() > 0)
            .max_by_key(|(_, b)| b.pixels.len())
        else {
            break;
        };

        let splitting = boxes.swap_remove(index);
        let (channel, lo, hi) = splitting.widest_channel();
        let cut = lo + (hi - lo) / 2;
        // both halves are non-empty because lo <= cut < hi
        let (lower, upper): (Vec<_>, Vec<_>) =
            splitting.pixels.into_iter().partition(|p| p[channel] <= cut);
        boxes.push(ColorBox { pixels: lower });
        boxes.push(ColorBox { pixels: upper });
    }

    boxes.sort_by(|a, b| b.pixels.len().cmp(&a.pixels.len()));
    boxes.iter().map(ColorBox::average).collect()
}

/// Palette extraction plus QR and barcode generation.
pub struct CodeConverter {
    descriptor: ConverterDescriptor,
}

impl CodeConverter {
    pub fn new(descriptor: ConverterDescriptor) -> Self {
        Self { descriptor }
    }

    fn color_param(params: &Params, name: &str, default: &str) -> Result<Rgb<u8>, ConvertError> {
        let raw = params.get(name).unwrap_or(default);
        parse_color(raw)
            .ok_or_else(|| ConvertError::validation(format!("Invalid colour for '{}': {}", name, raw)))
    }

    async fn write_png(image: RgbImage, path: std::path::PathBuf) -> Result<(), ConvertError> {
        tokio::task::spawn_blocking(move || {
            DynamicImage::ImageRgb8(image)
                .save_with_format(&path, ImageFormat::Png)
                .map_err(|e| ConvertError::engine("image", format!("Failed to encode PNG: {}", e)))
        })
        .await
        .map_err(|e| ConvertError::engine("image", e.to_string()))?
    }
}

#[async_trait]
impl Converter for CodeConverter {
    fn descriptor(&self) -> &ConverterDescriptor {
        &self.descriptor
    }

    fn validate(&self, _inputs: &[StagedFile], params: &Params) -> Result<(), ConvertError> {
        if self.descriptor.operation == Operation::QrCode {
            Self::color_param(params, "fill_color", "black")?;
            Self::color_param(params, "back_color", "white")?;
        }
        Ok(())
    }

    fn output_name(&self, inputs: &[StagedFile], params: &Params) -> String {
        match self.descriptor.operation {
            Operation::QrCode => "qrcode.png".to_string(),
            Operation::Barcode => format!("barcode_{}.png", params.choice("barcode_type", "code128")),
            _ => format!("{}_palette.json", first_name(inputs).1),
        }
    }

    #[instrument(skip_all, fields(operation = %self.descriptor.operation))]
    async fn execute(
        &self,
        inputs: &[StagedFile],
        output: &OutputSlot,
        params: &Params,
    ) -> Result<Artifact, ConvertError> {
        let dest = output.scratch_path().to_path_buf();

        match self.descriptor.operation {
            Operation::QrCode => {
                let data = params.required_text("data")?.to_string();
                let size = params.integer("size", 10)? as u32;
                let border = params.integer("border", 4)? as u32;
                let fill = Self::color_param(params, "fill_color", "black")?;
                let back = Self::color_param(params, "back_color", "white")?;
                let image = render_qr(&data, size, border, fill, back)?;
                Self::write_png(image, dest).await?;
                Ok(Artifact::new("image/png"))
            }
            Operation::Barcode => {
                let kind = params.choice("barcode_type", "code128");
                let modules = encode_barcode(&kind, params.required_text("data")?.trim())?;
                Self::write_png(render_barcode(&modules), dest).await?;
                Ok(Artifact::new("image/png"))
            }
            _ => {
                let input = first_input(inputs)?;
                let source = input.path.clone();
                let count = params.integer("color_count", 5)? as usize;
                let colors = tokio::task::spawn_blocking(move || {
                    load_image(&source).map(|image| dominant_colors(&image, count))
                })
                .await
                .map_err(|e| ConvertError::engine("image", e.to_string()))??;

                let entries: Vec<_> = colors
                    .iter()
                    .map(|[r, g, b]| {
                        json!({
                            "hex": format!("#{:02x}{:02x}{:02x}", r, g, b),
                            "rgb": format!("rgb({}, {}, {})", r, g, b),
                            "values": { "r": r, "g": g, "b": b },
                        })
                    })
                    .collect();
                let report = json!({ "filename": input.original_name, "colors": entries });
                let body = serde_json::to_vec_pretty(&report)
                    .map_err(|e| ConvertError::engine("image", e.to_string()))?;
                tokio::fs::write(&dest, body).await?;
                Ok(Artifact::new("application/json"))
            }
        }
    }
}
