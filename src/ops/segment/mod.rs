// ============================================================================
// BACKGROUND SEGMENTATION: one cut-out per loaded photo, off the UI thread
// ============================================================================

pub mod border;
pub mod onnx;

use image::{RgbImage, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

use crate::error::EditError;
use crate::raster::RasterBuffer;
use crate::settings::AppSettings;

pub use border::BorderKeySegmenter;
pub use onnx::OnnxSegmenter;

/// Result of segmenting one photo: the cut-out and the photo it came from.
#[derive(Clone, Debug)]
pub struct Segmentation {
    /// `Rgba`, background transparent.
    pub foreground: RasterBuffer,
    /// `Rgb`, as decoded.
    pub original: RasterBuffer,
}

pub type SegmentationOutcome = Result<Segmentation, EditError>;

/// Something that can separate a photo's subject from its background.
pub trait Segmenter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return `image` with the background made transparent. Must keep the
    /// input dimensions.
    fn cut_out(&self, image: &RgbImage) -> Result<RgbaImage, EditError>;

    /// Decode `path` and cut it out.
    fn segment(&self, path: &Path) -> SegmentationOutcome {
        let original = crate::io::load_image(path)?.to_rgb();
        let foreground = self.cut_out(&original)?;
        if foreground.dimensions() != original.dimensions() {
            return Err(EditError::Segmentation(format!(
                "{} returned {}x{} for a {}x{} photo",
                self.name(),
                foreground.width(),
                foreground.height(),
                original.width(),
                original.height()
            )));
        }
        Ok(Segmentation {
            foreground: RasterBuffer::from_rgba(foreground),
            original: RasterBuffer::from_rgb(&original),
        })
    }
}

/// ONNX when both runtime and model are configured, otherwise the border key.
pub fn from_settings(settings: &AppSettings) -> Arc<dyn Segmenter> {
    if settings.has_onnx() {
        Arc::new(OnnxSegmenter::new(
            settings.onnx_runtime_path.clone(),
            settings.segmentation_model_path.clone(),
        ))
    } else {
        Arc::new(BorderKeySegmenter::new(settings.border_tolerance))
    }
}

/// Run `segmenter` on its own thread. Errors and panics both arrive on the
/// returned channel as `Err`.
/// Never runs on the rayon pool, which the UI thread's rasterizers share.
pub fn spawn_segmentation(segmenter: Arc<dyn Segmenter>, path: PathBuf) -> Receiver<SegmentationOutcome> {
    let (tx, rx) = mpsc::channel();
    let spawned = std::thread::Builder::new().name("segmentation".into()).spawn(move || {
        crate::log_info!("Segmentation ({}) started for {}", segmenter.name(), path.display());
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| segmenter.segment(&path)))
            .unwrap_or_else(|payload| Err(EditError::Segmentation(panic_message(payload.as_ref()))));
        match &outcome {
            Ok(_) => crate::log_info!("Segmentation finished for {}", path.display()),
            Err(e) => crate::log_warn!("Segmentation failed for {}: {}", path.display(), e),
        }
        let _ = tx.send(outcome);
    });
    // A failed spawn drops the sender; the session reads that as a failure.
    if let Err(e) = spawned {
        crate::log_err!("Could not start segmentation thread: {}", e);
    }
    rx
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", s)
    } else {
        "worker panicked".to_string()
    }
}
