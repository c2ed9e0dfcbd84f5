//! Image compression step.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageEncoder, ImageFormat};
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use rayon::prelude::*;

use crate::builder::{relative_to, SitePaths};
use crate::fs::{self, format_size};
use crate::step::{StepError, StepKind, StepOutput, StepScope, TransformStep};

/// Quality used when re-encoding JPEGs.
pub const JPEG_QUALITY: u8 = 85;

/// Image formats handled by the images step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Svg,
}

impl ImageKind {
    /// Detect the kind from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(ImageKind::Png),
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "gif" => Some(ImageKind::Gif),
            "svg" => Some(ImageKind::Svg),
            _ => None,
        }
    }
}

/// SVG elements whose character data is rendered or parsed.
const TEXT_ELEMENTS: &[&[u8]] = &[
    b"text", b"tspan", b"textPath", b"title", b"desc", b"style", b"script",
];

/// Compresses `img/**/*.{png,jpeg,jpg,gif,svg}` into `<dest>/img/`.
#[derive(Debug, Default)]
pub struct ImagesStep;

impl ImagesStep {
    pub fn new() -> Self {
        Self
    }

    /// Compress one image, falling back to the original bytes when
    /// compression does not help.
    pub fn optimize(&self, bytes: &[u8], kind: ImageKind) -> Result<Vec<u8>, String> {
        let optimized = match kind {
            ImageKind::Png => recompress_png(bytes)?,
            ImageKind::Jpeg => recompress_jpeg(bytes)?,
            ImageKind::Gif => return Ok(bytes.to_vec()),
            ImageKind::Svg => minify_svg(bytes)?,
        };

        if optimized.len() < bytes.len() {
            Ok(optimized)
        } else {
            Ok(bytes.to_vec())
        }
    }

    fn sources(&self, root: &Path, scope: &StepScope) -> Vec<(PathBuf, ImageKind)> {
        let candidates = match scope {
            StepScope::All => fs::walk_files(root),
            StepScope::Only(files) => files
                .iter()
                .map(|rel| root.join(rel))
                .filter(|path| path.is_file())
                .collect(),
        };

        candidates
            .into_iter()
            .filter_map(|path| ImageKind::from_path(&path).map(|kind| (path, kind)))
            .collect()
    }
}

impl TransformStep for ImagesStep {
    fn kind(&self) -> StepKind {
        StepKind::Images
    }

    fn run(&self, paths: &SitePaths, scope: &StepScope) -> Result<StepOutput, StepError> {
        let root = paths.img_dir();
        let dest_root = paths.dest_img_dir();
        let sources = self.sources(&root, scope);

        let compressed = sources
            .par_iter()
            .map(|(source, kind)| {
                let original = fs::read(source)?;
                let data = self
                    .optimize(&original, *kind)
                    .map_err(|message| StepError::Image {
                        path: source.clone(),
                        message,
                    })?;
                Ok((dest_root.join(relative_to(source, &root)), original.len(), data))
            })
            .collect::<Result<Vec<_>, StepError>>()?;

        let mut output = StepOutput::new(StepKind::Images);
        let mut saved = 0u64;
        let mut total = 0u64;

        for (dest, original_len, data) in compressed {
            fs::write(&dest, &data)?;
            total += original_len as u64;
            saved += (original_len - data.len()) as u64;
            output.record(dest, data.len());
        }

        if !output.files.is_empty() {
            let percent = if total > 0 { saved * 100 / total } else { 0 };
            tracing::info!(
                "Minified {} image(s) (saved {} - {}%)",
                output.files.len(),
                format_size(saved),
                percent
            );
        }

        Ok(output)
    }
}

fn recompress_png(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| e.to_string())?;

    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive)
        .write_image(img.as_bytes(), img.width(), img.height(), img.color().into())
        .map_err(|e| e.to_string())?;

    Ok(out)
}

fn recompress_jpeg(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
        .map_err(|e| e.to_string())?;
    let img = match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .write_image(img.as_bytes(), img.width(), img.height(), img.color().into())
        .map_err(|e| e.to_string())?;

    Ok(out)
}

/// Drop comments, `<metadata>`, a doctype without an internal subset and
/// layout whitespace between tags.
///
/// Works on XML events, so text content, CDATA and attributes are written
/// back exactly as read.
fn minify_svg(svg: &[u8]) -> Result<Vec<u8>, String> {
    let mut reader = Reader::from_reader(svg);
    let mut writer = Writer::new(Cursor::new(Vec::with_capacity(svg.len())));
    // Depth inside a <metadata> subtree
    let mut skipping = 0usize;
    // Open elements from TEXT_ELEMENTS
    let mut in_text = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("XML parse error at position {}: {}", reader.error_position(), e))?;

        if skipping > 0 {
            match event {
                Event::Start(_) => skipping += 1,
                Event::End(_) => skipping -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        let keep = match event {
            Event::Eof => break,
            Event::Comment(_) => None,
            Event::DocType(doctype) if !doctype.contains(&b'[') => None,
            Event::Start(e) if e.local_name().as_ref() == b"metadata" => {
                skipping = 1;
                None
            }
            Event::Empty(e) if e.local_name().as_ref() == b"metadata" => None,
            Event::Text(text) if in_text == 0 && is_layout_whitespace(&text) => None,
            Event::Start(e) => {
                if is_text_element(e.local_name().as_ref()) {
                    in_text += 1;
                }
                Some(Event::Start(e))
            }
            Event::End(e) => {
                if is_text_element(e.local_name().as_ref()) {
                    in_text = in_text.saturating_sub(1);
                }
                Some(Event::End(e))
            }
            event => Some(event),
        };

        if let Some(event) = keep {
            writer.write_event(event).map_err(|e| e.to_string())?;
        }
    }

    Ok(writer.into_inner().into_inner())
}

fn is_text_element(name: &[u8]) -> bool {
    TEXT_ELEMENTS.iter().any(|element| *element == name)
}

/// Whitespace spanning a line break, as used to indent markup.
fn is_layout_whitespace(text: &[u8]) -> bool {
    text.contains(&b'\n') && text.iter().all(u8::is_ascii_whitespace)
}
