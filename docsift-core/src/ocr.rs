//! Image OCR adapter
//!
//! Every image-to-text call in the extractors goes through [`ImageOcr`], which
//! gates out images that would only produce noise before touching the engine.
//! The production engine shells out to the `tesseract` binary; it is detected
//! once at startup, and when it is missing every OCR call returns `""`.

use crate::config::OcrConfig;
use crate::error::ExtractionError;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageOutputFormat};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Engine that turns a PNG-encoded image into text.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, png: &[u8]) -> Result<String, ExtractionError>;

    /// Engine identifier for logging
    fn name(&self) -> &str;
}

/// Common install locations on Windows, where tesseract is rarely on PATH.
const WINDOWS_INSTALL_PATHS: [&str; 3] = [
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    r"C:\Tesseract-OCR\tesseract.exe",
];

/// Tesseract invoked as an external process in single-uniform-block mode.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
}

impl TesseractCli {
    /// Find a working tesseract binary.
    ///
    /// Tries the configured path, then `tesseract` on PATH, then the common
    /// Windows install locations.
    pub fn detect(configured: Option<&str>) -> Option<Self> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(path) = configured {
            candidates.push(PathBuf::from(path));
        }
        candidates.push(PathBuf::from("tesseract"));
        candidates.extend(WINDOWS_INSTALL_PATHS.iter().map(PathBuf::from));

        candidates
            .into_iter()
            .find(|c| is_tesseract_available(c))
            .map(|binary| Self { binary })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, png: &[u8]) -> Result<String, ExtractionError> {
        let mut input = tempfile::Builder::new()
            .prefix("docsift-ocr-")
            .suffix(".png")
            .tempfile()?;
        input.write_all(png)?;
        input.flush()?;

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .arg("--psm")
            .arg("6")
            .output()
            .map_err(|e| {
                ExtractionError::OcrProcessing(format!(
                    "Failed to run tesseract at '{}': {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::OcrProcessing(format!(
                "tesseract exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// Check if a tesseract binary answers `--version`.
pub fn is_tesseract_available(binary: &Path) -> bool {
    Command::new(binary)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Gatekeeper in front of the OCR engine.
#[derive(Clone)]
pub struct ImageOcr {
    engine: Option<Arc<dyn OcrEngine>>,
    min_image_px: u32,
    min_embedded_image_px: u32,
}

impl ImageOcr {
    pub fn new(engine: Option<Arc<dyn OcrEngine>>) -> Self {
        let defaults = OcrConfig::default();
        Self {
            engine,
            min_image_px: defaults.min_image_px,
            min_embedded_image_px: defaults.min_embedded_image_px,
        }
    }

    /// Adapter on which every call is a no-op.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Detect the engine once, according to config.
    pub fn from_config(config: &OcrConfig) -> Self {
        let engine: Option<Arc<dyn OcrEngine>> = if !config.enabled {
            info!("OCR disabled by configuration");
            None
        } else {
            match TesseractCli::detect(config.tesseract_path.as_deref()) {
                Some(tesseract) => {
                    info!(binary = %tesseract.binary().display(), "Tesseract OCR available");
                    Some(Arc::new(tesseract))
                }
                None => {
                    warn!("Tesseract not found; OCR fallback disabled");
                    None
                }
            }
        };
        Self {
            engine,
            min_image_px: config.min_image_px,
            min_embedded_image_px: config.min_embedded_image_px,
        }
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    /// OCR an in-memory image. Returns `""` for anything unusable.
    pub fn ocr(&self, image: Option<&DynamicImage>) -> String {
        let Some(engine) = &self.engine else {
            return String::new();
        };
        let Some(image) = image else {
            return String::new();
        };

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return String::new();
        }
        if width < self.min_image_px || height < self.min_image_px {
            debug!(width, height, "Image too small for OCR");
            return String::new();
        }

        let png = match encode_rgb_png(image) {
            Ok(png) => png,
            Err(e) => {
                warn!(error = %e, "Could not prepare image for OCR");
                return String::new();
            }
        };

        match engine.recognize(&png) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(engine = engine.name(), error = %e, "OCR failed");
                String::new()
            }
        }
    }

    /// OCR an image embedded in an office document.
    ///
    /// Only raster formats are considered (vector formats such as WMF/EMF are
    /// skipped silently), and images under the embedded-size threshold are
    /// ignored as icons and bullets.
    pub fn ocr_embedded(&self, bytes: &[u8]) -> String {
        if !self.is_available() {
            return String::new();
        }
        let format = match image::guess_format(bytes) {
            Ok(f) if is_ocr_raster(f) => f,
            _ => return String::new(),
        };
        let image = match image::load_from_memory_with_format(bytes, format) {
            Ok(img) => img,
            Err(e) => {
                debug!(error = %e, "Embedded image could not be decoded");
                return String::new();
            }
        };
        let (width, height) = image.dimensions();
        if width < self.min_embedded_image_px || height < self.min_embedded_image_px {
            return String::new();
        }
        self.ocr(Some(&image))
    }
}

fn is_ocr_raster(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Tiff | ImageFormat::Gif
    )
}

fn encode_rgb_png(image: &DynamicImage) -> Result<Vec<u8>, ExtractionError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut png = Vec::new();
    rgb.write_to(&mut png, ImageOutputFormat::Png)?;
    Ok(png)
}


#[cfg(test)]
mod tests {
    use super::testing::{png_bytes, CountingEngine};
    use super::*;

    #[test]
    fn no_engine_means_empty_text() {
        let ocr = ImageOcr::disabled();
        let img = DynamicImage::new_rgb8(200, 200);
        assert!(!ocr.is_available());
        assert_eq!(ocr.ocr(Some(&img)), "");
    }

    #[test]
    fn tiny_images_never_reach_the_engine() {
        let engine = CountingEngine::new("text");
        let ocr = ImageOcr::new(Some(engine.clone()));

        assert_eq!(ocr.ocr(Some(&DynamicImage::new_rgb8(9, 9))), "");
        assert_eq!(ocr.ocr(Some(&DynamicImage::new_rgb8(500, 5))), "");
        assert_eq!(ocr.ocr(Some(&DynamicImage::new_rgb8(0, 40))), "");
        assert_eq!(ocr.ocr(None), "");
        assert_eq!(engine.call_count(), 0);
    }

    #[test]
    fn usable_image_is_recognized_and_trimmed() {
        let engine = CountingEngine::new("Invoice total 42");
        let ocr = ImageOcr::new(Some(engine.clone()));
        let img = DynamicImage::new_luma8(20, 20);
        assert_eq!(ocr.ocr(Some(&img)), "Invoice total 42");
        assert_eq!(engine.call_count(), 1);
    }

    #[test]
    fn embedded_images_are_filtered_by_format_and_size() {
        let engine = CountingEngine::new("scanned");
        let ocr = ImageOcr::new(Some(engine.clone()));

        assert_eq!(ocr.ocr_embedded(&png_bytes(40, 40)), "");
        assert_eq!(ocr.ocr_embedded(b"\x01\x00\x09\x00not really a wmf"), "");
        assert_eq!(engine.call_count(), 0);

        assert_eq!(ocr.ocr_embedded(&png_bytes(64, 64)), "scanned");
        assert_eq!(engine.call_count(), 1);
    }

    #[test]
    fn failing_engine_degrades_to_empty() {
        struct Broken;
        impl OcrEngine for Broken {
            fn recognize(&self, _png: &[u8]) -> Result<String, ExtractionError> {
                Err(ExtractionError::OcrProcessing("boom".into()))
            }
            fn name(&self) -> &str {
                "broken"
            }
        }
        let ocr = ImageOcr::new(Some(Arc::new(Broken)));
        assert_eq!(ocr.ocr(Some(&DynamicImage::new_rgb8(30, 30))), "");
    }

    #[test]
    fn missing_binary_is_not_detected() {
        assert!(!is_tesseract_available(Path::new(
            "/nonexistent/docsift/tesseract"
        )));
    }
}
