use std::path::PathBuf;

/// Errors surfaced by loading, saving and segmenting images.
///
/// Input mistakes (pointer outside the image, commit without anchor) are not
/// errors at all; they are dropped where they happen.
#[derive(Debug)]
pub enum EditError {
    /// The file to open does not exist.
    NotFound(PathBuf),
    /// The file exists but could not be decoded as an image.
    Decode(String),
    /// The buffer could not be encoded in the requested format.
    Encode(String),
    /// The destination extension maps to no writable format.
    UnsupportedFormat(String),
    /// Filesystem failure while reading or writing.
    Io(std::io::Error),
    /// Background segmentation failed; the session keeps working without it.
    Segmentation(String),
}

impl std::fmt::Display for EditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditError::NotFound(p) => write!(f, "Image not found: {}", p.display()),
            EditError::Decode(e) => write!(f, "Failed to decode image: {}", e),
            EditError::Encode(e) => write!(f, "Failed to encode image: {}", e),
            EditError::UnsupportedFormat(ext) => write!(f, "Unsupported image format: '{}'", ext),
            EditError::Io(e) => write!(f, "I/O error: {}", e),
            EditError::Segmentation(e) => write!(f, "Background removal failed: {}", e),
        }
    }
}

impl std::error::Error for EditError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EditError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EditError {
    fn from(e: std::io::Error) -> Self {
        EditError::Io(e)
    }
}

impl From<image::ImageError> for EditError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => EditError::Io(io),
            image::ImageError::Encoding(enc) => EditError::Encode(enc.to_string()),
            image::ImageError::Unsupported(u) => EditError::UnsupportedFormat(u.to_string()),
            other => EditError::Decode(other.to_string()),
        }
    }
}
