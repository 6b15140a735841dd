use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, ImageOutputFormat};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::EditError;
use crate::raster::RasterBuffer;

// ============================================================================
// FORMATS
// ============================================================================

/// Common RAW camera file extensions (lowercase).
pub const RAW_EXTENSIONS: &[&str] = &[
    "cr2", "cr3", "nef", "nrw", "arw", "srf", "sr2", "dng", "orf", "rw2", "pef", "raf", "raw",
    "rwl", "srw", "x3f", "3fr", "fff", "iiq", "mrw", "mef", "mos", "kdc", "dcr", "erf",
];

/// Raster extensions decoded through the `image` crate.
pub const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

pub fn is_raw_extension(ext: &str) -> bool {
    RAW_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// `true` when `path` has an extension the editor can open.
pub fn is_supported_image(path: &Path) -> bool {
    let ext = extension_of(path);
    RASTER_EXTENSIONS.contains(&ext.as_str()) || is_raw_extension(&ext)
}

/// Formats the editor can write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveFormat {
    Png,
    Jpeg,
    Bmp,
    Tiff,
}

impl SaveFormat {
    pub fn from_extension(ext: &str) -> Option<SaveFormat> {
        match ext.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "bmp" => Some(SaveFormat::Bmp),
            "tif" | "tiff" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<SaveFormat, EditError> {
        let ext = extension_of(path);
        SaveFormat::from_extension(&ext).ok_or(EditError::UnsupportedFormat(ext))
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tiff => "tiff",
        }
    }
}

// ============================================================================
// LOAD
// ============================================================================

/// Decode a RAW camera file through imagepipe (demosaic + color pipeline).
pub fn decode_raw_image(path: &Path) -> Result<RasterBuffer, EditError> {
    let mut pipeline = imagepipe::Pipeline::new_from_file(path)
        .map_err(|e| EditError::Decode(format!("RAW decode error: {}", e)))?;

    let srgb = pipeline
        .output_8bit(None)
        .map_err(|e| EditError::Decode(format!("RAW processing error: {}", e)))?;

    // srgb.data is packed RGB, 3 bytes per pixel
    let expected = srgb.width * srgb.height * 3;
    if srgb.data.len() < expected {
        return Err(EditError::Decode(format!(
            "RAW buffer too short: expected {} bytes, got {}",
            expected,
            srgb.data.len()
        )));
    }
    let mut data = srgb.data;
    data.truncate(expected);
    let rgb = image::RgbImage::from_raw(srgb.width as u32, srgb.height as u32, data)
        .ok_or_else(|| EditError::Decode("Failed to create image from RAW data".to_string()))?;
    Ok(RasterBuffer::from_rgb(&rgb))
}

/// Load a photo for editing. Missing files fail with `NotFound`.
pub fn load_image(path: &Path) -> Result<RasterBuffer, EditError> {
    if !path.is_file() {
        return Err(EditError::NotFound(path.to_path_buf()));
    }
    if is_raw_extension(&extension_of(path)) {
        return decode_raw_image(path);
    }
    let img = image::open(path)?;
    Ok(RasterBuffer::from_dynamic(img))
}

// ============================================================================
// SAVE
// ============================================================================

/// Encode `image` as `format` into `writer`.
pub fn encode<W: Write + std::io::Seek>(
    image: &DynamicImage,
    writer: &mut W,
    format: SaveFormat,
    quality: u8,
) -> Result<(), EditError> {
    match format {
        SaveFormat::Png => {
            PngEncoder::new(writer).write_image(
                image.as_bytes(),
                image.width(),
                image.height(),
                image.color(),
            )?;
        }
        SaveFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = image.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));
            encoder.encode(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(writer);
            encoder.encode(image.as_bytes(), image.width(), image.height(), image.color())?;
        }
        SaveFormat::Tiff => {
            image.write_to(writer, ImageOutputFormat::Tiff)?;
        }
    }
    Ok(())
}

/// Sibling path used while writing `dest`.
fn temp_sibling(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image");
    let tmp_name = format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple());
    match dest.parent() {
        Some(dir) => dir.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

/// Write `buffer` to `dest`, inferring the format from the extension.
///
/// The bytes go to a temporary sibling file that is renamed over `dest` only
/// after a complete write, so a failure never leaves a partial file and never
/// touches an existing one.
pub fn save_atomic(buffer: &RasterBuffer, dest: &Path, jpeg_quality: u8) -> Result<(), EditError> {
    let format = SaveFormat::from_path(dest)?;
    let tmp = temp_sibling(dest);

    let result = (|| -> Result<(), EditError> {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        encode(&buffer.to_dynamic(), &mut writer, format, jpeg_quality)?;
        let file = writer
            .into_inner()
            .map_err(|e| EditError::Io(e.into_error()))?;
        file.sync_all()?;
        fs::rename(&tmp, dest)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
