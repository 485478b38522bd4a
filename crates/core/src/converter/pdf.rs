//! PDF page and content operations on top of pdfium.
//!
//! Callers pass coordinates with a top-left origin, matching what a user sees
//! on screen. PDF user space starts at the bottom-left, so every vertical
//! coordinate is flipped against the page height before drawing.

use async_trait::async_trait;
use pdfium_render::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::config::EnginesConfig;
use crate::staging::{OutputSlot, StagedFile};

use super::catalog::IMAGE_EXTENSIONS;
use super::error::ConvertError;
use super::image::{flatten_onto_white, load_image};
use super::pdfium::{open_document, pdfium_error, save_document, PdfEngine};
use super::traits::Converter;
use super::types::{first_input, first_name, Artifact, ConverterDescriptor, Operation, Params};

const REPLACEMENT_FONT_SIZE: f32 = 12.0;
const MIN_REPLACEMENT_FONT_SIZE: f32 = 6.0;
const MAX_REPLACEMENT_FONT_SIZE: f32 = 72.0;
const WATERMARK_FONT_SIZE: f32 = 60.0;
const HIGHLIGHT: PdfColor = PdfColor::new(255, 255, 0, 96);

/// Most pages a single split may emit, repeats included.
pub const MAX_SPLIT_PAGES: usize = 10_000;

/// A 1-based page selection such as `1-3,5`, held as inclusive 0-based spans.
///
/// Spans are never expanded until the page count is known, so a request for
/// `1-1000000000000` costs two integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    spans: Vec<(i64, i64)>,
}

impl PageSelection {
    /// Parses the selection grammar. Reversed ranges select nothing; a
    /// selection made only of reversed ranges is rejected.
    pub fn parse(spec: &str) -> Result<Self, ConvertError> {
        let invalid = || ConvertError::validation(format!("Invalid page selection: {}", spec));
        let mut spans = Vec::new();

        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (start, end) = match part.split_once('-') {
                Some((start, end)) => (
                    start.trim().parse::<i64>().map_err(|_| invalid())?,
                    end.trim().parse::<i64>().map_err(|_| invalid())?,
                ),
                None => {
                    let page = part.parse::<i64>().map_err(|_| invalid())?;
                    (page, page)
                }
            };
            if start <= end {
                spans.push((start.saturating_sub(1), end.saturating_sub(1)));
            }
        }

        if spans.is_empty() {
            return Err(invalid());
        }
        Ok(Self { spans })
    }

    /// Indices that exist in a document of `count` pages, in request order.
    /// Pages outside the document are dropped.
    pub fn resolve(&self, count: i64) -> Result<Vec<PdfPageIndex>, ConvertError> {
        let last = count.min(PdfPageIndex::MAX as i64 + 1) - 1;
        let mut pages = Vec::new();

        for &(start, end) in &self.spans {
            let (low, high) = (start.max(0), end.min(last));
            if low > high {
                continue;
            }
            if pages.len() as i64 + (high - low + 1) > MAX_SPLIT_PAGES as i64 {
                return Err(ConvertError::validation(format!(
                    "Page selection exceeds {} pages",
                    MAX_SPLIT_PAGES
                )));
            }
            // low and high are within 0..=PdfPageIndex::MAX here
            pages.extend((low..=high).map(|i| i as PdfPageIndex));
        }
        Ok(pages)
    }
}

/// Rotation after turning a page by `angle` degrees clockwise.
pub fn compose_rotation(current: i32, angle: i32) -> i32 {
    (current + angle).rem_euclid(360)
}

fn rotation_degrees(rotation: PdfPageRenderRotation) -> i32 {
    match rotation {
        PdfPageRenderRotation::None => 0,
        PdfPageRenderRotation::Degrees90 => 90,
        PdfPageRenderRotation::Degrees180 => 180,
        PdfPageRenderRotation::Degrees270 => 270,
    }
}

fn rotation_from_degrees(degrees: i32) -> PdfPageRenderRotation {
    match degrees {
        90 => PdfPageRenderRotation::Degrees90,
        180 => PdfPageRenderRotation::Degrees180,
        270 => PdfPageRenderRotation::Degrees270,
        _ => PdfPageRenderRotation::None,
    }
}

/// Named text colours accepted by `pdf-add-text`.
pub fn text_color(name: &str) -> PdfColor {
    match name {
        "red" => PdfColor::new(255, 0, 0, 255),
        "blue" => PdfColor::new(0, 0, 255, 255),
        "green" => PdfColor::new(0, 255, 0, 255),
        "white" => PdfColor::new(255, 255, 255, 255),
        _ => PdfColor::new(0, 0, 0, 255),
    }
}

/// Watermark grey for an opacity in `[0, 1]`; fuller opacity is darker.
pub fn watermark_gray(opacity: f64) -> u8 {
    ((1.0 - opacity.clamp(0.0, 1.0)) * 255.0).round() as u8
}

/// Whether the raw file declares an encryption dictionary.
pub fn is_encrypted(bytes: &[u8]) -> bool {
    bytes.windows(b"/Encrypt".len()).any(|w| w == b"/Encrypt")
}

fn page_index(document: &PdfDocument<'_>, page_num: i64) -> Result<PdfPageIndex, ConvertError> {
    let count = document.pages().len() as i64;
    if page_num < 0 || page_num >= count {
        return Err(ConvertError::validation(format!(
            "Invalid page number {} (document has {} pages)",
            page_num, count
        )));
    }
    PdfPageIndex::try_from(page_num)
        .map_err(|_| ConvertError::validation(format!("Invalid page number {}", page_num)))
}

fn get_page<'a>(document: &PdfDocument<'a>, index: PdfPageIndex) -> Result<PdfPage<'a>, ConvertError> {
    document
        .pages()
        .get(index)
        .map_err(|e| pdfium_error("Failed to load page", e))
}

/// Draws `text` with its baseline starting at (`x`, `baseline`) in PDF space.
#[allow(clippy::too_many_arguments)]
fn place_text<'a>(
    document: &PdfDocument<'a>,
    page: &mut PdfPage<'a>,
    font: PdfFontToken,
    text: &str,
    font_size: f32,
    color: PdfColor,
    x: f32,
    baseline: f32,
    rotation_degrees: f32,
) -> Result<(), ConvertError> {
    let mut object = PdfPageTextObject::new(document, text, font, PdfPoints::new(font_size))
        .map_err(|e| pdfium_error("Failed to create text", e))?;
    object
        .set_fill_color(color)
        .map_err(|e| pdfium_error("Failed to colour text", e))?;
    if rotation_degrees != 0.0 {
        object
            .rotate_counter_clockwise_degrees(rotation_degrees)
            .map_err(|e| pdfium_error("Failed to rotate text", e))?;
    }
    object
        .translate(PdfPoints::new(x), PdfPoints::new(baseline))
        .map_err(|e| pdfium_error("Failed to position text", e))?;
    page.objects_mut()
        .add_text_object(object)
        .map_err(|e| pdfium_error("Failed to add text", e))?;
    Ok(())
}

/// Text placement read from the request.
#[derive(Debug, Clone)]
struct TextPlacement {
    text: String,
    page_num: i64,
    x: f32,
    y: f32,
    font_size: f32,
    color: PdfColor,
}

/// Image placement read from the request; `y` is the top edge.
#[derive(Debug, Clone, Copy)]
struct ImagePlacement {
    page_num: i64,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

/// A highlight rectangle given by two opposite corners.
#[derive(Debug, Clone, Copy)]
struct HighlightArea {
    page_num: i64,
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
}

fn merge(pdfium: &Pdfium, sources: &[PathBuf], dest: &Path) -> Result<(), ConvertError> {
    let mut merged = pdfium
        .create_new_pdf()
        .map_err(|e| pdfium_error("Failed to create PDF", e))?;
    for source in sources {
        let document = open_document(pdfium, source, None)?;
        merged
            .pages_mut()
            .append(&document)
            .map_err(|e| pdfium_error("Failed to append pages", e))?;
    }
    save_document(&merged, dest)
}

fn split(
    pdfium: &Pdfium,
    source: &Path,
    dest: &Path,
    selection: &PageSelection,
) -> Result<usize, ConvertError> {
    let document = open_document(pdfium, source, None)?;
    let keep = selection.resolve(document.pages().len() as i64)?;
    debug!(kept = keep.len(), "Splitting pages");

    let mut extracted = pdfium
        .create_new_pdf()
        .map_err(|e| pdfium_error("Failed to create PDF", e))?;
    for &index in &keep {
        let at = extracted.pages().len();
        extracted
            .pages_mut()
            .copy_page_from_document(&document, index, at)
            .map_err(|e| pdfium_error("Failed to copy page", e))?;
    }
    save_document(&extracted, dest)?;
    Ok(keep.len())
}

fn rotate(pdfium: &Pdfium, source: &Path, dest: &Path, angle: i32) -> Result<(), ConvertError> {
    let document = open_document(pdfium, source, None)?;
    for index in 0..document.pages().len() {
        let mut page = get_page(&document, index)?;
        let current = page
            .rotation()
            .map(rotation_degrees)
            .map_err(|e| pdfium_error("Failed to read rotation", e))?;
        page.set_rotation(rotation_from_degrees(compose_rotation(current, angle)));
    }
    save_document(&document, dest)
}

fn info(pdfium: &Pdfium, source: &Path, encrypted: bool) -> Result<serde_json::Value, ConvertError> {
    let document = open_document(pdfium, source, None)?;
    let metadata = document.metadata();
    let tag = |kind: PdfDocumentMetadataTagType| -> String {
        metadata
            .get(kind)
            .map(|t| t.value().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "N/A".to_string())
    };

    Ok(json!({
        "pages": document.pages().len(),
        "title": tag(PdfDocumentMetadataTagType::Title),
        "author": tag(PdfDocumentMetadataTagType::Author),
        "subject": tag(PdfDocumentMetadataTagType::Subject),
        "creator": tag(PdfDocumentMetadataTagType::Creator),
        "producer": tag(PdfDocumentMetadataTagType::Producer),
        "creation_date": tag(PdfDocumentMetadataTagType::CreationDate),
        "isEncrypted": encrypted,
    }))
}

/// Font size for replacement text drawn into a match box of `height` points.
fn replacement_font_size(height: f32) -> f32 {
    if height.is_finite() && height > 0.0 {
        height.clamp(MIN_REPLACEMENT_FONT_SIZE, MAX_REPLACEMENT_FONT_SIZE)
    } else {
        REPLACEMENT_FONT_SIZE
    }
}

/// Bounding boxes of every case-insensitive occurrence of `find` on a page,
/// one `Vec` per occurrence with one box per line it spans.
fn match_boxes(page: &PdfPage<'_>, find: &str) -> Result<Vec<Vec<PdfRect>>, ConvertError> {
    let text = page
        .text()
        .map_err(|e| pdfium_error("Failed to read page text", e))?;
    let search = text
        .search(find, &PdfSearchOptions::new())
        .map_err(|e| pdfium_error("Failed to search text", e))?;

    let mut matches = Vec::new();
    for segments in search.iter(PdfSearchDirection::SearchForward) {
        let boxes: Vec<PdfRect> = segments.iter().map(|segment| segment.bounds()).collect();
        if !boxes.is_empty() {
            matches.push(boxes);
        }
    }
    Ok(matches)
}

/// Slack, in points, when testing whether a text object sits inside a match.
const CONTAINMENT_SLACK: f32 = 0.5;

fn contains(outer: &PdfRect, inner: &PdfRect) -> bool {
    inner.left().value >= outer.left().value - CONTAINMENT_SLACK
        && inner.right().value <= outer.right().value + CONTAINMENT_SLACK
        && inner.bottom().value >= outer.bottom().value - CONTAINMENT_SLACK
        && inner.top().value <= outer.top().value + CONTAINMENT_SLACK
}

fn intersects(a: &PdfRect, b: &PdfRect) -> bool {
    a.left().value < b.right().value
        && b.left().value < a.right().value
        && a.bottom().value < b.top().value
        && b.bottom().value < a.top().value
}

/// Removes text objects that are nothing but a match: either lying wholly
/// inside one of `boxes`, or holding exactly `find` and touching a box.
fn remove_covered_text(
    page: &mut PdfPage<'_>,
    boxes: &[PdfRect],
    find: &str,
) -> Result<(), ConvertError> {
    let mut covered = Vec::new();
    for (position, object) in page.objects().iter().enumerate() {
        let Some(text) = object.as_text_object().map(|t| t.text()) else {
            continue;
        };
        let Ok(bounds) = object.bounds() else {
            continue;
        };
        let bounds = bounds.to_rect();
        let only_match = text.trim().eq_ignore_ascii_case(find.trim());
        if boxes
            .iter()
            .any(|b| contains(b, &bounds) || (only_match && intersects(b, &bounds)))
        {
            covered.push(position);
        }
    }
    for position in covered.into_iter().rev() {
        page.objects_mut()
            .remove_object_at_index(position)
            .map_err(|e| pdfium_error("Failed to remove text", e))?;
    }
    Ok(())
}

/// Redacts every occurrence of `find` and draws `replace` inside the first
/// box of each. Text objects wholly inside a match are removed; glyphs that
/// share an object with other text are painted over with white. Returns the
/// number of occurrences.
fn find_replace(
    pdfium: &Pdfium,
    source: &Path,
    dest: &Path,
    find: &str,
    replace: &str,
) -> Result<usize, ConvertError> {
    let mut document = open_document(pdfium, source, None)?;
    let font = document.fonts_mut().helvetica();
    let mut replaced = 0;

    for index in 0..document.pages().len() {
        let mut page = get_page(&document, index)?;
        let matches = match_boxes(&page, find)?;
        if matches.is_empty() {
            continue;
        }
        replaced += matches.len();
        let all_boxes: Vec<PdfRect> = matches.iter().flatten().copied().collect();
        remove_covered_text(&mut page, &all_boxes, find)?;

        for boxes in &matches {
            for rect in boxes {
                page.objects_mut()
                    .create_path_object_rect(*rect, None, None, Some(PdfColor::WHITE))
                    .map_err(|e| pdfium_error("Failed to cover text", e))?;
            }
            let Some(first) = boxes.first() else {
                continue;
            };
            if replace.is_empty() {
                continue;
            }
            place_text(
                &document,
                &mut page,
                font,
                replace,
                replacement_font_size(first.height().value),
                PdfColor::BLACK,
                first.left().value,
                first.bottom().value,
                0.0,
            )?;
        }
    }

    save_document(&document, dest)?;
    Ok(replaced)
}

fn add_text(pdfium: &Pdfium, source: &Path, dest: &Path, placement: TextPlacement) -> Result<(), ConvertError> {
    let mut document = open_document(pdfium, source, None)?;
    let index = page_index(&document, placement.page_num)?;
    let font = document.fonts_mut().helvetica();
    let mut page = get_page(&document, index)?;
    let baseline = page.height().value - placement.y;

    place_text(
        &document,
        &mut page,
        font,
        &placement.text,
        placement.font_size,
        placement.color,
        placement.x,
        baseline,
        0.0,
    )?;
    save_document(&document, dest)
}

fn add_image(
    pdfium: &Pdfium,
    source: &Path,
    image: image::DynamicImage,
    dest: &Path,
    placement: ImagePlacement,
) -> Result<(), ConvertError> {
    let document = open_document(pdfium, source, None)?;
    let index = page_index(&document, placement.page_num)?;
    let mut page = get_page(&document, index)?;
    let bottom = page.height().value - placement.y - placement.height;

    page.objects_mut()
        .create_image_object(
            PdfPoints::new(placement.x),
            PdfPoints::new(bottom),
            &image,
            Some(PdfPoints::new(placement.width)),
            Some(PdfPoints::new(placement.height)),
        )
        .map_err(|e| pdfium_error("Failed to place image", e))?;
    save_document(&document, dest)
}

fn watermark(pdfium: &Pdfium, source: &Path, dest: &Path, text: &str, opacity: f64) -> Result<(), ConvertError> {
    let mut document = open_document(pdfium, source, None)?;
    let font = document.fonts_mut().helvetica();
    let gray = watermark_gray(opacity);
    let color = PdfColor::new(gray, gray, gray, 255);
    // Helvetica averages about half an em per glyph
    let half_width = text.chars().count() as f32 * WATERMARK_FONT_SIZE * 0.25;
    let offset = half_width * std::f32::consts::FRAC_1_SQRT_2;

    for index in 0..document.pages().len() {
        let mut page = get_page(&document, index)?;
        let (cx, cy) = (page.width().value / 2.0, page.height().value / 2.0);
        place_text(
            &document,
            &mut page,
            font,
            text,
            WATERMARK_FONT_SIZE,
            color,
            cx - offset,
            cy - offset,
            45.0,
        )?;
    }
    save_document(&document, dest)
}

fn highlight(pdfium: &Pdfium, source: &Path, dest: &Path, area: HighlightArea) -> Result<(), ConvertError> {
    let document = open_document(pdfium, source, None)?;
    let index = page_index(&document, area.page_num)?;
    let mut page = get_page(&document, index)?;
    let height = page.height().value;

    let rect = PdfRect::new_from_values(
        height - area.y0.max(area.y1),
        area.x0.min(area.x1),
        height - area.y0.min(area.y1),
        area.x0.max(area.x1),
    );
    page.objects_mut()
        .create_path_object_rect(rect, None, None, Some(HIGHLIGHT))
        .map_err(|e| pdfium_error("Failed to draw highlight", e))?;
    save_document(&document, dest)
}

/// PDF merging, splitting, rotation, inspection and page edits.
pub struct PdfConverter {
    descriptor: ConverterDescriptor,
    engine: PdfEngine,
}

impl PdfConverter {
    pub fn new(descriptor: ConverterDescriptor, engines: &EnginesConfig) -> Self {
        Self {
            descriptor,
            engine: PdfEngine::new(engines),
        }
    }

    fn coordinate(params: &Params, name: &str, default: f64) -> Result<f32, ConvertError> {
        params.float(name, default).map(|v| v as f32)
    }
}

#[async_trait]
impl Converter for PdfConverter {
    fn descriptor(&self) -> &ConverterDescriptor {
        &self.descriptor
    }

    fn validate(&self, inputs: &[StagedFile], params: &Params) -> Result<(), ConvertError> {
        match self.descriptor.operation {
            Operation::PdfSplit => PageSelection::parse(params.required_text("pages")?).map(|_| ()),
            Operation::PdfAddImage => {
                let is_pdf = inputs
                    .first()
                    .and_then(StagedFile::extension)
                    .is_some_and(|e| e == "pdf");
                let is_image = inputs
                    .get(1)
                    .and_then(StagedFile::extension)
                    .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()));
                if is_pdf && is_image {
                    Ok(())
                } else {
                    Err(ConvertError::validation(
                        "Expected a PDF followed by an image",
                    ))
                }
            }
            _ => Ok(()),
        }
    }

    fn output_name(&self, inputs: &[StagedFile], _params: &Params) -> String {
        let name = match self.descriptor.operation {
            Operation::PdfMerge => "merged.pdf",
            Operation::PdfSplit => "split_pages.pdf",
            Operation::PdfRotate => "rotated.pdf",
            Operation::PdfInfo => return format!("{}_info.json", first_name(inputs).1),
            Operation::PdfFindReplace => "edited.pdf",
            Operation::PdfAddText => "with_text.pdf",
            Operation::PdfAddImage => "with_image.pdf",
            Operation::PdfWatermark => "watermarked.pdf",
            _ => "highlighted.pdf",
        };
        name.to_string()
    }

    #[instrument(skip_all, fields(operation = %self.descriptor.operation))]
    async fn execute(
        &self,
        inputs: &[StagedFile],
        output: &OutputSlot,
        params: &Params,
    ) -> Result<Artifact, ConvertError> {
        let source = first_input(inputs)?.path.clone();
        let dest = output.scratch_path().to_path_buf();
        let pdf = Artifact::new("application/pdf");

        match self.descriptor.operation {
            Operation::PdfMerge => {
                let sources: Vec<PathBuf> = inputs.iter().map(|f| f.path.clone()).collect();
                self.engine.run(move |p| merge(p, &sources, &dest)).await?;
                Ok(pdf)
            }
            Operation::PdfSplit => {
                let selection = PageSelection::parse(params.required_text("pages")?)?;
                let kept = self
                    .engine
                    .run(move |p| split(p, &source, &dest, &selection))
                    .await?;
                Ok(pdf.with_extra("pages", kept))
            }
            Operation::PdfRotate => {
                let angle: i32 = params.choice("angle", "90").parse().map_err(|_| {
                    ConvertError::validation("Angle must be 90, 180, 270 or -90")
                })?;
                self.engine.run(move |p| rotate(p, &source, &dest, angle)).await?;
                Ok(pdf)
            }
            Operation::PdfInfo => {
                let encrypted = is_encrypted(&tokio::fs::read(&source).await?);
                let report = self.engine.run(move |p| info(p, &source, encrypted)).await?;
                let body = serde_json::to_vec_pretty(&report)
                    .map_err(|e| ConvertError::engine("pdfium", e.to_string()))?;
                tokio::fs::write(&dest, body).await?;
                Ok(Artifact::new("application/json"))
            }
            Operation::PdfFindReplace => {
                let find = params.required_text("find_text")?.to_string();
                let replace = params.text("replace_text").to_string();
                let replaced = self
                    .engine
                    .run(move |p| find_replace(p, &source, &dest, &find, &replace))
                    .await?;
                Ok(pdf.with_extra("replacements", replaced))
            }
            Operation::PdfAddText => {
                let placement = TextPlacement {
                    text: params.required_text("text")?.to_string(),
                    page_num: params.integer("page_num", 0)?,
                    x: Self::coordinate(params, "x", 100.0)?,
                    y: Self::coordinate(params, "y", 100.0)?,
                    font_size: params.integer("font_size", 12)? as f32,
                    color: text_color(&params.choice("color", "black")),
                };
                self.engine
                    .run(move |p| add_text(p, &source, &dest, placement))
                    .await?;
                Ok(pdf)
            }
            Operation::PdfAddImage => {
                let placement = ImagePlacement {
                    page_num: params.integer("page_num", 0)?,
                    x: Self::coordinate(params, "x", 100.0)?,
                    y: Self::coordinate(params, "y", 100.0)?,
                    width: Self::coordinate(params, "width", 100.0)?,
                    height: Self::coordinate(params, "height", 100.0)?,
                };
                let image_path = inputs
                    .get(1)
                    .map(|f| f.path.clone())
                    .ok_or_else(|| ConvertError::validation("Expected a PDF followed by an image"))?;
                let image = tokio::task::spawn_blocking(move || {
                    load_image(&image_path).map(|i| image::DynamicImage::ImageRgb8(flatten_onto_white(&i)))
                })
                .await
                .map_err(|e| ConvertError::engine("image", e.to_string()))??;
                self.engine
                    .run(move |p| add_image(p, &source, image, &dest, placement))
                    .await?;
                Ok(pdf)
            }
            Operation::PdfWatermark => {
                let text = params.required_text("watermark_text")?.to_string();
                let opacity = params.float("opacity", 0.3)?;
                self.engine
                    .run(move |p| watermark(p, &source, &dest, &text, opacity))
                    .await?;
                Ok(pdf)
            }
            _ => {
                let area = HighlightArea {
                    page_num: params.integer("page_num", 0)?,
                    x0: Self::coordinate(params, "x0", 0.0)?,
                    y0: Self::coordinate(params, "y0", 0.0)?,
                    x1: Self::coordinate(params, "x1", 0.0)?,
                    y1: Self::coordinate(params, "y1", 0.0)?,
                };
                self.engine
                    .run(move |p| highlight(p, &source, &dest, area))
                    .await?;
                Ok(pdf)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::error::ErrorKind;

    fn parse(spec: &str) -> PageSelection {
        PageSelection::parse(spec).unwrap()
    }

    #[test]
    fn test_page_selection_resolves_in_request_order() {
        assert_eq!(parse("1-2,4").resolve(5).unwrap(), vec![0, 1, 3]);
        assert_eq!(parse(" 2 , 4-4 ").resolve(5).unwrap(), vec![1, 3]);
        assert_eq!(parse("3,1,3").resolve(3).unwrap(), vec![2, 0, 2]);
        // reversed ranges select nothing but do not fail on their own
        assert_eq!(parse("5-3,1").resolve(5).unwrap(), vec![0]);
    }

    #[test]
    fn test_page_selection_drops_missing_pages() {
        assert_eq!(parse("1-10").resolve(3).unwrap(), vec![0, 1, 2]);
        assert_eq!(parse("0,2,99").resolve(3).unwrap(), vec![1]);
        assert!(parse("7-9").resolve(3).unwrap().is_empty());
        assert!(parse("1").resolve(0).unwrap().is_empty());
    }

    #[test]
    fn test_page_selection_huge_range_stays_bounded() {
        let selection = parse("1-1000000000000");
        assert_eq!(selection.resolve(4).unwrap(), vec![0, 1, 2, 3]);

        let extreme = parse(&format!("0-{}", i64::MAX));
        assert_eq!(extreme.resolve(2).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_page_selection_caps_repeated_pages() {
        let spec = vec!["1-1000"; 11].join(",");
        let err = parse(&spec).resolve(1000).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let spec = vec!["1-1000"; 10].join(",");
        assert_eq!(parse(&spec).resolve(1000).unwrap().len(), MAX_SPLIT_PAGES);
    }

    #[test]
    fn test_page_selection_rejects_garbage() {
        for bad in ["", "a", "1-b", ",,", "3-1", "1-2-3"] {
            let err = PageSelection::parse(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{:?}", bad);
        }
    }

    #[test]
    fn test_contains_with_slack() {
        let outer = PdfRect::new_from_values(100.0, 50.0, 112.0, 120.0);
        assert!(contains(&outer, &PdfRect::new_from_values(100.2, 50.0, 111.8, 119.7)));
        assert!(contains(&outer, &PdfRect::new_from_values(99.8, 49.6, 112.4, 120.3)));
        assert!(!contains(&outer, &PdfRect::new_from_values(100.0, 50.0, 112.0, 200.0)));
        assert!(!contains(&outer, &PdfRect::new_from_values(80.0, 50.0, 112.0, 120.0)));
    }

    #[test]
    fn test_intersects() {
        let a = PdfRect::new_from_values(100.0, 50.0, 112.0, 120.0);
        assert!(intersects(&a, &PdfRect::new_from_values(95.0, 110.0, 115.0, 200.0)));
        assert!(!intersects(&a, &PdfRect::new_from_values(100.0, 130.0, 112.0, 200.0)));
        assert!(!intersects(&a, &PdfRect::new_from_values(120.0, 50.0, 130.0, 120.0)));
    }

    #[test]
    fn test_replacement_font_size() {
        assert_eq!(replacement_font_size(10.0), 10.0);
        assert_eq!(replacement_font_size(1.0), MIN_REPLACEMENT_FONT_SIZE);
        assert_eq!(replacement_font_size(500.0), MAX_REPLACEMENT_FONT_SIZE);
        assert_eq!(replacement_font_size(f32::NAN), REPLACEMENT_FONT_SIZE);
    }

    #[test]
    fn test_compose_rotation() {
        assert_eq!(compose_rotation(0, 90), 90);
        assert_eq!(compose_rotation(270, 180), 90);
        assert_eq!(compose_rotation(0, -90), 270);
        assert_eq!(compose_rotation(90, 270), 0);
        for degrees in [0, 90, 180, 270] {
            assert_eq!(rotation_degrees(rotation_from_degrees(degrees)), degrees);
        }
    }

    #[test]
    fn test_watermark_gray() {
        assert_eq!(watermark_gray(0.3), 179);
        assert_eq!(watermark_gray(1.0), 0);
        assert_eq!(watermark_gray(0.0), 255);
        assert_eq!(watermark_gray(4.0), 0);
    }

    #[test]
    fn test_encryption_scan() {
        assert!(is_encrypted(b"%PDF-1.7 trailer << /Encrypt 5 0 R >>"));
        assert!(!is_encrypted(b"%PDF-1.7 trailer << /Root 1 0 R >>"));
    }

    fn channels(color: PdfColor) -> (u8, u8, u8) {
        (color.red(), color.green(), color.blue())
    }

    #[test]
    fn test_text_colors() {
        assert_eq!(channels(text_color("red")), (255, 0, 0));
        assert_eq!(channels(text_color("green")), (0, 255, 0));
        assert_eq!(channels(text_color("unknown")), (0, 0, 0));
    }
}
