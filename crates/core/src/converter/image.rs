//! In-process image conversions.

use async_trait::async_trait;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Rgb, RgbImage};
use pdfium_render::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::config::EnginesConfig;
use crate::staging::{OutputSlot, StagedFile};

use super::error::ConvertError;
use super::exif::parse_exif;
use super::pdfium::{pdfium_error, save_document, PdfEngine};
use super::traits::Converter;
use super::types::{first_input, first_name, Artifact, ConverterDescriptor, Operation, Params};

/// Encodable targets of `image-convert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTarget {
    Png,
    Jpeg,
    Webp,
    Gif,
    Bmp,
    Tiff,
    Pdf,
}

impl ImageTarget {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "tiff" | "tif" => Some(Self::Tiff),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Pdf => "application/pdf",
        }
    }

    fn image_format(&self) -> Option<ImageFormat> {
        match self {
            Self::Png => Some(ImageFormat::Png),
            Self::Jpeg => Some(ImageFormat::Jpeg),
            Self::Webp => Some(ImageFormat::WebP),
            Self::Gif => Some(ImageFormat::Gif),
            Self::Bmp => Some(ImageFormat::Bmp),
            Self::Tiff => Some(ImageFormat::Tiff),
            Self::Pdf => None,
        }
    }
}

/// Image filters offered by `image-filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    Grayscale,
    Sepia,
    Blur,
    Sharpen,
    Edge,
    Emboss,
}

impl ImageFilter {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "grayscale" => Some(Self::Grayscale),
            "sepia" => Some(Self::Sepia),
            "blur" => Some(Self::Blur),
            "sharpen" => Some(Self::Sharpen),
            "edge" => Some(Self::Edge),
            "emboss" => Some(Self::Emboss),
            _ => None,
        }
    }
}

/// A convolution kernel with PIL-compatible scale and offset.
struct Kernel {
    size: usize,
    weights: &'static [f32],
    scale: f32,
    offset: f32,
}

const BLUR: Kernel = Kernel {
    size: 5,
    weights: &[
        1.0, 1.0, 1.0, 1.0, 1.0, //
        1.0, 0.0, 0.0, 0.0, 1.0, //
        1.0, 0.0, 0.0, 0.0, 1.0, //
        1.0, 0.0, 0.0, 0.0, 1.0, //
        1.0, 1.0, 1.0, 1.0, 1.0,
    ],
    scale: 16.0,
    offset: 0.0,
};

const SHARPEN: Kernel = Kernel {
    size: 3,
    weights: &[-2.0, -2.0, -2.0, -2.0, 32.0, -2.0, -2.0, -2.0, -2.0],
    scale: 16.0,
    offset: 0.0,
};

const FIND_EDGES: Kernel = Kernel {
    size: 3,
    weights: &[-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0],
    scale: 1.0,
    offset: 0.0,
};

const EMBOSS: Kernel = Kernel {
    size: 3,
    weights: &[-1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
    scale: 1.0,
    offset: 128.0,
};

fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn luma(pixel: &Rgb<u8>) -> f32 {
    // ITU-R 601-2, as used for "L" conversions
    (pixel[0] as f32 * 299.0 + pixel[1] as f32 * 587.0 + pixel[2] as f32 * 114.0) / 1000.0
}

fn convolve(image: &RgbImage, kernel: &Kernel) -> RgbImage {
    let (width, height) = image.dimensions();
    let radius = (kernel.size / 2) as i64;

    RgbImage::from_fn(width, height, |x, y| {
        let mut acc = [0f32; 3];
        for ky in 0..kernel.size {
            for kx in 0..kernel.size {
                let weight = kernel.weights[ky * kernel.size + kx];
                if weight == 0.0 {
                    continue;
                }
                let sx = (x as i64 + kx as i64 - radius).clamp(0, width as i64 - 1) as u32;
                let sy = (y as i64 + ky as i64 - radius).clamp(0, height as i64 - 1) as u32;
                let p = image.get_pixel(sx, sy);
                for c in 0..3 {
                    acc[c] += p[c] as f32 * weight;
                }
            }
        }
        Rgb(acc.map(|v| clamp_channel(v / kernel.scale + kernel.offset)))
    })
}

/// Applies `filter`, returning a new RGB image.
pub fn apply_filter(image: &RgbImage, filter: ImageFilter) -> RgbImage {
    match filter {
        ImageFilter::Grayscale => RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let l = clamp_channel(luma(image.get_pixel(x, y)));
            Rgb([l, l, l])
        }),
        ImageFilter::Sepia => RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let l = luma(image.get_pixel(x, y)).round();
            Rgb([
                clamp_channel(l),
                clamp_channel((l * 0.95).floor()),
                clamp_channel((l * 0.82).floor()),
            ])
        }),
        ImageFilter::Blur => convolve(image, &BLUR),
        ImageFilter::Sharpen => convolve(image, &SHARPEN),
        ImageFilter::Edge => convolve(image, &FIND_EDGES),
        ImageFilter::Emboss => convolve(image, &EMBOSS),
    }
}

fn blend(image: &RgbImage, degenerate: impl Fn(&Rgb<u8>) -> [f32; 3], factor: f32) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        let d = degenerate(p);
        Rgb([0, 1, 2].map(|c| clamp_channel(d[c] + (p[c] as f32 - d[c]) * factor)))
    })
}

/// Brightness, contrast and saturation enhancement; 1.0 leaves a channel
/// unchanged.
pub fn adjust(image: &RgbImage, brightness: f32, contrast: f32, saturation: f32) -> RgbImage {
    let mut out = image.clone();

    if brightness != 1.0 {
        out = blend(&out, |_| [0.0; 3], brightness);
    }

    if contrast != 1.0 {
        let pixels = (out.width() as f64 * out.height() as f64).max(1.0);
        let mean = out.pixels().map(|p| luma(p) as f64).sum::<f64>() / pixels;
        let mean = (mean + 0.5).floor() as f32;
        out = blend(&out, |_| [mean; 3], contrast);
    }

    if saturation != 1.0 {
        out = blend(
            &out,
            |p| {
                let l = luma(p).round();
                [l; 3]
            },
            saturation,
        );
    }

    out
}

/// Composites any transparency onto opaque white.
pub fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y);
        let alpha = p[3] as f32 / 255.0;
        Rgb([0, 1, 2].map(|c| clamp_channel(p[c] as f32 * alpha + 255.0 * (1.0 - alpha))))
    })
}

pub(crate) fn load_image(path: &Path) -> Result<DynamicImage, ConvertError> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| ConvertError::engine("image", format!("Failed to decode image: {}", e)))
}

fn save_image(image: &DynamicImage, path: &Path, format: ImageFormat) -> Result<(), ConvertError> {
    image
        .save_with_format(path, format)
        .map_err(|e| ConvertError::engine("image", format!("Failed to encode image: {}", e)))
}

/// Reads the raw EXIF block of an image, if its container carries one.
fn read_exif_block(path: &Path) -> Result<Option<Vec<u8>>, String> {
    let mut decoder = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| e.to_string())?
        .into_decoder()
        .map_err(|e| e.to_string())?;
    decoder.exif_metadata().map_err(|e| e.to_string())
}

/// Builds the `image-metadata` report. Read failures degrade to an empty
/// result carrying the error text.
pub fn metadata_report(path: &Path, file_name: &str) -> serde_json::Value {
    match read_exif_block(path) {
        Ok(block) => {
            let tags = block.map(|raw| parse_exif(&raw)).unwrap_or_default();
            json!({
                "filename": file_name,
                "has_exif": !tags.is_empty(),
                "exif_data": tags,
            })
        }
        Err(error) => {
            debug!(error = %error, "Metadata read failed; reporting empty result");
            json!({
                "filename": file_name,
                "has_exif": false,
                "exif_data": {},
                "error": error,
            })
        }
    }
}

/// Image conversions, filters, adjustments and metadata handling.
pub struct ImageConverter {
    descriptor: ConverterDescriptor,
    pdf: PdfEngine,
}

impl ImageConverter {
    pub fn new(descriptor: ConverterDescriptor, engines: &EnginesConfig) -> Self {
        Self {
            descriptor,
            pdf: PdfEngine::new(engines),
        }
    }

    fn target(params: &Params) -> Result<ImageTarget, ConvertError> {
        let name = params.required_text("target_format")?;
        ImageTarget::parse(name)
            .ok_or_else(|| ConvertError::validation(format!("Unsupported target format: {}", name)))
    }

    async fn blocking<T, F>(task: F) -> Result<T, ConvertError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ConvertError> + Send + 'static,
    {
        tokio::task::spawn_blocking(task)
            .await
            .map_err(|e| ConvertError::engine("image", format!("Image task failed: {}", e)))?
    }

    async fn convert(&self, input: PathBuf, output: PathBuf, target: ImageTarget) -> Result<(), ConvertError> {
        let Some(format) = target.image_format() else {
            return self.convert_to_pdf(input, output).await;
        };

        Self::blocking(move || {
            let image = load_image(&input)?;
            let encodable = match target {
                // JPEG has no alpha channel; flatten before encoding
                ImageTarget::Jpeg => DynamicImage::ImageRgb8(flatten_onto_white(&image)),
                ImageTarget::Png | ImageTarget::Tiff => image,
                _ => DynamicImage::ImageRgba8(image.to_rgba8()),
            };
            save_image(&encodable, &output, format)
        })
        .await
    }

    async fn convert_to_pdf(&self, input: PathBuf, output: PathBuf) -> Result<(), ConvertError> {
        let image = Self::blocking(move || load_image(&input).map(|i| flatten_onto_white(&i))).await?;

        self.pdf
            .run(move |pdfium| {
                let (width, height) = (image.width() as f32, image.height() as f32);
                let mut document = pdfium
                    .create_new_pdf()
                    .map_err(|e| pdfium_error("Failed to create PDF", e))?;
                let mut page = document
                    .pages_mut()
                    .create_page_at_end(PdfPagePaperSize::from_points(
                        PdfPoints::new(width),
                        PdfPoints::new(height),
                    ))
                    .map_err(|e| pdfium_error("Failed to add page", e))?;
                page.objects_mut()
                    .create_image_object(
                        PdfPoints::ZERO,
                        PdfPoints::ZERO,
                        &DynamicImage::ImageRgb8(image),
                        Some(PdfPoints::new(width)),
                        Some(PdfPoints::new(height)),
                    )
                    .map_err(|e| pdfium_error("Failed to place image", e))?;
                save_document(&document, &output)
            })
            .await
    }
}

#[async_trait]
impl Converter for ImageConverter {
    fn descriptor(&self) -> &ConverterDescriptor {
        &self.descriptor
    }

    fn validate(&self, _inputs: &[StagedFile], params: &Params) -> Result<(), ConvertError> {
        match self.descriptor.operation {
            Operation::ImageConvert => Self::target(params).map(|_| ()),
            Operation::ImageFilter => {
                let name = params.required_text("filter")?;
                ImageFilter::parse(name)
                    .map(|_| ())
                    .ok_or_else(|| ConvertError::validation("Invalid filter type"))
            }
            _ => Ok(()),
        }
    }

    fn output_name(&self, inputs: &[StagedFile], params: &Params) -> String {
        let (_, stem) = first_name(inputs);
        match self.descriptor.operation {
            Operation::ImageConvert => {
                let ext = ImageTarget::parse(&params.choice("target_format", "png"))
                    .map(|t| t.extension())
                    .unwrap_or("png");
                format!("{}.{}", stem, ext)
            }
            Operation::ImageFilter => format!("filtered_{}.png", stem),
            Operation::ImageAdjust => format!("adjusted_{}.png", stem),
            Operation::ImageMetadata => format!("{}_metadata.json", stem),
            _ => format!("no_exif_{}.png", stem),
        }
    }

    #[instrument(skip_all, fields(operation = %self.descriptor.operation))]
    async fn execute(
        &self,
        inputs: &[StagedFile],
        output: &OutputSlot,
        params: &Params,
    ) -> Result<Artifact, ConvertError> {
        let input = first_input(inputs)?;
        let source = input.path.clone();
        let dest = output.scratch_path().to_path_buf();

        match self.descriptor.operation {
            Operation::ImageConvert => {
                let target = Self::target(params)?;
                self.convert(source, dest, target).await?;
                Ok(Artifact::new(target.content_type()))
            }
            Operation::ImageFilter => {
                let filter = ImageFilter::parse(params.text("filter"))
                    .ok_or_else(|| ConvertError::validation("Invalid filter type"))?;
                Self::blocking(move || {
                    let rgb = load_image(&source)?.to_rgb8();
                    save_image(
                        &DynamicImage::ImageRgb8(apply_filter(&rgb, filter)),
                        &dest,
                        ImageFormat::Png,
                    )
                })
                .await?;
                Ok(Artifact::new("image/png"))
            }
            Operation::ImageAdjust => {
                let brightness = params.float("brightness", 1.0)? as f32;
                let contrast = params.float("contrast", 1.0)? as f32;
                let saturation = params.float("saturation", 1.0)? as f32;
                Self::blocking(move || {
                    let rgb = load_image(&source)?.to_rgb8();
                    let adjusted = adjust(&rgb, brightness, contrast, saturation);
                    save_image(&DynamicImage::ImageRgb8(adjusted), &dest, ImageFormat::Png)
                })
                .await?;
                Ok(Artifact::new("image/png"))
            }
            Operation::ImageMetadata => {
                let name = input.original_name.clone();
                let report = Self::blocking(move || Ok(metadata_report(&source, &name))).await?;
                let body = serde_json::to_vec_pretty(&report)
                    .map_err(|e| ConvertError::engine("image", e.to_string()))?;
                tokio::fs::write(&dest, body).await?;
                Ok(Artifact::new("application/json"))
            }
            _ => {
                // PNG re-encoding keeps pixels only
                Self::blocking(move || {
                    let image = load_image(&source)?;
                    save_image(&image, &dest, ImageFormat::Png)
                })
                .await?;
                Ok(Artifact::new("image/png"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_flatten_removes_alpha_onto_white() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 0, Rgba([10, 20, 30, 255]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_half_transparent_pixel_blends() {
        let mut rgba = RgbaImage::new(1, 1);
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 128]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(rgba));
        let v = flat.get_pixel(0, 0)[0];
        assert!((126..=128).contains(&v), "got {}", v);
    }

    #[test]
    fn test_grayscale_and_sepia() {
        let image = RgbImage::from_pixel(1, 1, Rgb([200, 100, 50]));
        let gray = apply_filter(&image, ImageFilter::Grayscale);
        let p = gray.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);

        let sepia = apply_filter(&image, ImageFilter::Sepia);
        let s = sepia.get_pixel(0, 0);
        assert!(s[0] >= s[1] && s[1] >= s[2]);
    }

    #[test]
    fn test_convolution_keeps_flat_images_flat() {
        let image = RgbImage::from_pixel(6, 6, Rgb([90, 90, 90]));
        assert_eq!(apply_filter(&image, ImageFilter::Blur), image);
        assert_eq!(apply_filter(&image, ImageFilter::Sharpen), image);
        let edges = apply_filter(&image, ImageFilter::Edge);
        assert!(edges.pixels().all(|p| p == &Rgb([0, 0, 0])));
        let emboss = apply_filter(&image, ImageFilter::Emboss);
        assert!(emboss.pixels().all(|p| p == &Rgb([128, 128, 128])));
    }

    #[test]
    fn test_adjust_identity_and_brightness() {
        let image = RgbImage::from_pixel(2, 2, Rgb([100, 50, 25]));
        assert_eq!(adjust(&image, 1.0, 1.0, 1.0), image);
        let brighter = adjust(&image, 2.0, 1.0, 1.0);
        assert_eq!(brighter.get_pixel(0, 0), &Rgb([200, 100, 50]));
        let dark = adjust(&image, 0.0, 1.0, 1.0);
        assert_eq!(dark.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_zero_saturation_is_gray() {
        let image = RgbImage::from_pixel(1, 1, Rgb([200, 100, 50]));
        let p = *adjust(&image, 1.0, 1.0, 0.0).get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!(ImageTarget::parse("JPEG"), Some(ImageTarget::Jpeg));
        assert_eq!(ImageTarget::parse("pdf"), Some(ImageTarget::Pdf));
        assert_eq!(ImageTarget::parse("svg"), None);
        assert_eq!(ImageTarget::Webp.content_type(), "image/webp");
    }

    #[test]
    fn test_metadata_report_degrades_on_garbage() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not an image").unwrap();

        let report = metadata_report(&path, "broken.jpg");
        assert_eq!(report["has_exif"], false);
        assert_eq!(report["exif_data"], json!({}));
        assert!(report.get("error").is_some());
    }

    #[test]
    fn test_metadata_report_without_exif() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("plain.png");
        RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])).save(&path).unwrap();

        let report = metadata_report(&path, "plain.png");
        assert_eq!(report["filename"], "plain.png");
        assert_eq!(report["has_exif"], false);
        assert!(report.get("error").is_none());
    }
}
