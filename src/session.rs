// ============================================================================
// EDIT SESSION: committed frame, history, tools and segmentation of one photo
// ============================================================================

use image::{Rgb, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use crate::canvas::{ImagePoint, Viewport, map_to_image};
use crate::components::history::{EditHistory, Frame};
use crate::components::tools::{EditMode, ToolState};
use crate::error::EditError;
use crate::events::{EventSink, SessionEvent, parent_dir};
use crate::ops::adjustments::{Channel, ChannelGains};
use crate::ops::segment::{self, Segmentation, SegmentationOutcome, Segmenter};
use crate::ops::shapes::{self, ShapeGeometry};
use crate::ops::transform::Transform;
use crate::ops::compare;
use crate::raster::RasterBuffer;
use crate::settings::AppSettings;

const NOT_REQUESTED: &str = "background removal not requested";

/// Unique per open image; ties `Saved` events back to their tab.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        SessionId(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Where the one-per-load background segmentation stands.
pub enum SegmentationState {
    Pending,
    Ready(Segmentation),
    Failed(String),
}

/// Keyboard input routed to the session while the surface has focus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    Backspace,
    Enter,
}

/// Result of the remove/restore background toggle.
#[derive(Clone, Debug, PartialEq)]
pub enum BackgroundToggle {
    Removed,
    Restored,
    /// Segmentation still running; nothing changed.
    Pending,
    /// Segmentation failed for this photo; nothing changed.
    Unavailable(String),
}

pub struct EditSession {
    id: SessionId,
    path: PathBuf,
    /// As loaded, 3-channel, load-time orientation.
    original: RasterBuffer,
    frame: Frame,
    history: EditHistory,
    tools: ToolState,
    gains: ChannelGains,
    pub viewport: Viewport,
    dirty: bool,
    /// Pointer button held since an accepted pointer-down.
    dragging: bool,
    /// Bumped on every visible change; the surface re-uploads its texture
    /// when this moves.
    revision: u64,
    segmentation: SegmentationState,
    segmentation_rx: Option<Receiver<SegmentationOutcome>>,
    events: EventSink,
    jpeg_quality: u8,
}

impl EditSession {
    /// Decode `path`. With a `segmenter`, its background segmentation starts
    /// on a worker thread; without one the background toggle stays unavailable.
    pub fn open(
        path: &Path,
        settings: &AppSettings,
        segmenter: Option<Arc<dyn Segmenter>>,
        events: EventSink,
    ) -> Result<Self, EditError> {
        let loaded = crate::io::load_image(path)?;
        let original = RasterBuffer::from_rgb(&loaded.to_rgb());
        crate::log_info!(
            "Opened {} ({}x{})",
            path.display(),
            original.width(),
            original.height()
        );
        let mut session = Self::with_original(path.to_path_buf(), original, settings, events);
        match segmenter {
            Some(segmenter) => {
                session.segmentation_rx = Some(segment::spawn_segmentation(segmenter, path.to_path_buf()));
            }
            None => session.segmentation = SegmentationState::Failed(NOT_REQUESTED.to_string()),
        }
        Ok(session)
    }

    fn with_original(path: PathBuf, original: RasterBuffer, settings: &AppSettings, events: EventSink) -> Self {
        Self {
            id: SessionId::new(),
            path,
            frame: Frame::new(original.clone()),
            original,
            history: EditHistory::new(),
            tools: ToolState::new(settings.default_pen_color, settings.default_brush_size),
            gains: ChannelGains::default(),
            viewport: Viewport::default(),
            dirty: false,
            dragging: false,
            revision: 0,
            segmentation: SegmentationState::Pending,
            segmentation_rx: None,
            events,
            jpeg_quality: settings.jpeg_quality,
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name plus a dirty marker, for the tab strip.
    pub fn title(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        if self.dirty { format!("{}*", name) } else { name }
    }

    pub fn committed(&self) -> &RasterBuffer {
        &self.frame.buffer
    }

    pub fn original(&self) -> &RasterBuffer {
        &self.original
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    pub fn tools(&self) -> &ToolState {
        &self.tools
    }

    pub fn mode(&self) -> EditMode {
        self.tools.mode()
    }

    pub fn gains(&self) -> &ChannelGains {
        &self.gains
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn segmentation(&self) -> &SegmentationState {
        &self.segmentation
    }

    pub fn is_segmentation_pending(&self) -> bool {
        matches!(self.segmentation, SegmentationState::Pending)
    }

    pub fn background_removed(&self) -> bool {
        self.frame.background_removed
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    // ========================================================================
    // TOOLS
    // ========================================================================

    pub fn select_mode(&mut self, mode: EditMode, color: Option<Rgb<u8>>) -> EditMode {
        self.dragging = false;
        let active = self.tools.select_mode(mode, color);
        self.touch();
        active
    }

    pub fn set_pen_color(&mut self, color: Rgb<u8>) {
        self.tools.set_pen_color(color);
        self.touch();
    }

    pub fn set_brush_size(&mut self, size: u32) {
        self.tools.set_brush_size(size);
        self.touch();
    }

    /// Drop any gesture or pending text before a committed operation.
    fn abandon_gesture(&mut self) {
        if self.tools.gesture().is_some() || !self.tools.text().is_empty() {
            crate::log_info!("Abandoned in-progress {}", self.tools.mode().label());
        }
        self.tools.abandon();
        self.dragging = false;
    }

    // ========================================================================
    // POINTER INPUT
    // ========================================================================

    /// Map a pointer position relative to the drawn image into image space.
    pub fn map_pointer(&self, pointer: (f32, f32), displayed: (f32, f32)) -> Option<ImagePoint> {
        map_to_image(pointer, displayed, self.frame.buffer.dimensions())
    }

    /// Start a gesture. Points outside the buffer are ignored.
    pub fn pointer_down(&mut self, at: ImagePoint) {
        if !self.frame.buffer.contains(at.x, at.y) {
            return;
        }
        match self.tools.mode() {
            EditMode::Idle => return,
            EditMode::Text => {
                if !self.tools.text().is_empty()
                    && let Some(gesture) = self.tools.take_gesture()
                {
                    let text = self.tools.take_text();
                    if let Some(shape) = shapes::geometry(EditMode::Text, &gesture, &text) {
                        self.commit_shape(EditMode::Text, &shape);
                    }
                }
            }
            _ => {}
        }
        self.tools.begin_gesture(at);
        self.dragging = true;
        self.touch();
    }

    /// Extend the gesture. Points outside the buffer are clamped to its edge.
    pub fn pointer_move(&mut self, to: ImagePoint) {
        if !self.dragging {
            return;
        }
        let (w, h) = self.frame.buffer.dimensions();
        if self.tools.extend_gesture(to.clamped(w, h)) {
            self.touch();
        }
    }

    /// Finish the drag. Shapes commit; a text box stays open for typing.
    /// Without an anchor this does nothing.
    pub fn pointer_up(&mut self, at: Option<ImagePoint>) {
        if !self.dragging {
            return;
        }
        if let Some(at) = at {
            self.pointer_move(at);
        }
        self.dragging = false;
        let mode = self.tools.mode();
        if !mode.is_shape() {
            return;
        }
        let Some(gesture) = self.tools.take_gesture() else { return };
        if let Some(shape) = shapes::geometry(mode, &gesture, "") {
            self.commit_shape(mode, &shape);
        }
    }

    /// The pointer left the surface mid-drag: commit what was last previewed.
    pub fn pointer_leave(&mut self) {
        self.pointer_up(None);
    }

    fn commit_shape(&mut self, mode: EditMode, shape: &ShapeGeometry) {
        let before = self.frame.clone();
        shapes::rasterize(
            &mut self.frame.buffer,
            shape,
            self.tools.pen_color(),
            self.tools.brush_size(),
        );
        self.record(before, mode.label());
    }

    /// Push `before` onto the history after the frame was changed.
    fn record(&mut self, before: Frame, description: &str) {
        self.history.commit(before, description);
        self.dirty = true;
        self.touch();
        crate::log_info!(
            "{}: {} (history {} / {:.1} MB)",
            self.title(),
            description,
            self.history.undo_len(),
            self.history.memory_usage() as f64 / (1024.0 * 1024.0)
        );
    }

    // ========================================================================
    // KEYBOARD
    // ========================================================================

    /// Feed text mode. Returns `false` when the key was not consumed.
    pub fn key_input(&mut self, key: KeyInput) -> bool {
        if self.tools.mode() != EditMode::Text {
            return false;
        }
        match key {
            KeyInput::Char(c) if !c.is_control() => self.tools.push_char(c),
            KeyInput::Char(_) => return false,
            KeyInput::Backspace => self.tools.pop_char(),
            KeyInput::Enter => self.tools.push_char('\n'),
        }
        self.touch();
        true
    }

    // ========================================================================
    // DISPLAY
    // ========================================================================

    /// The shape the current gesture would commit, if any.
    pub fn preview_shape(&self) -> Option<ShapeGeometry> {
        let gesture = self.tools.gesture()?;
        shapes::geometry(self.tools.mode(), gesture, self.tools.text())
    }

    /// What the surface shows: the committed buffer with the in-progress
    /// shape and the pending channel gains, rendered on a copy.
    pub fn display_buffer(&self) -> RasterBuffer {
        let mut shown = self.frame.buffer.clone();
        if let Some(shape) = self.preview_shape() {
            shapes::rasterize(&mut shown, &shape, self.tools.pen_color(), self.tools.brush_size());
        }
        self.gains.apply(&mut shown);
        shown
    }

    /// Load-time photo in the current orientation next to the displayed
    /// buffer, split at `split` percent.
    pub fn before_after(&self, split: u8) -> Option<RgbaImage> {
        let mut before = self.original.clone();
        self.frame.orientation.apply(&mut before);
        compare::before_after(before.pixels(), self.display_buffer().pixels(), split)
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    pub fn undo(&mut self) -> Option<String> {
        self.abandon_gesture();
        let description = self.history.undo(&mut self.frame)?;
        self.dirty = true;
        self.touch();
        crate::log_info!("{}: undo {}", self.title(), description);
        Some(description)
    }

    pub fn redo(&mut self) -> Option<String> {
        self.abandon_gesture();
        let description = self.history.redo(&mut self.frame)?;
        self.dirty = true;
        self.touch();
        crate::log_info!("{}: redo {}", self.title(), description);
        Some(description)
    }

    // ========================================================================
    // OPERATIONS
    // ========================================================================

    pub fn apply_transform(&mut self, transform: Transform) {
        self.abandon_gesture();
        let before = self.frame.clone();
        transform.apply(&mut self.frame.buffer);
        self.frame.orientation = self.frame.orientation.then(transform);
        self.record(before, transform.label());
    }

    /// Set a channel's gain. Only the preview changes until `apply_gains`.
    pub fn set_channel_gain(&mut self, channel: Channel, enabled: bool, value: u8) {
        self.gains.set_enabled(channel, enabled);
        self.gains.set_value(channel, value);
        self.touch();
    }

    pub fn reset_gains(&mut self) {
        self.gains.reset();
        self.touch();
    }

    /// Bake the gain table into the committed buffer and reset it. Returns
    /// `false` when the table is the identity.
    pub fn apply_gains(&mut self) -> bool {
        if self.gains.is_identity() {
            return false;
        }
        self.abandon_gesture();
        let before = self.frame.clone();
        self.gains.apply(&mut self.frame.buffer);
        self.gains.reset();
        self.record(before, "Channel gains");
        true
    }

    /// Swap between the cut-out foreground and the original photo. Any
    /// annotations on the committed buffer are replaced; the swap is undoable.
    pub fn toggle_background(&mut self) -> BackgroundToggle {
        let source = match &self.segmentation {
            SegmentationState::Pending => return BackgroundToggle::Pending,
            SegmentationState::Failed(e) => return BackgroundToggle::Unavailable(e.clone()),
            SegmentationState::Ready(seg) => {
                if self.frame.background_removed {
                    self.original.clone()
                } else {
                    seg.foreground.clone()
                }
            }
        };
        let mut replacement = source;
        self.frame.orientation.apply(&mut replacement);
        if replacement.dimensions() != self.frame.buffer.dimensions() {
            crate::log_warn!(
                "Background toggle skipped: {:?} does not match {:?}",
                replacement.dimensions(),
                self.frame.buffer.dimensions()
            );
            return BackgroundToggle::Unavailable("cut-out size does not match the photo".to_string());
        }

        self.abandon_gesture();
        let before = self.frame.clone();
        let removing = !self.frame.background_removed;
        self.frame.buffer = replacement;
        self.frame.background_removed = removing;
        if removing {
            self.record(before, "Remove background");
            BackgroundToggle::Removed
        } else {
            self.record(before, "Restore background");
            BackgroundToggle::Restored
        }
    }

    // ========================================================================
    // SEGMENTATION
    // ========================================================================

    /// Pick up a finished segmentation without blocking. Returns `true` when
    /// the state changed.
    pub fn poll_segmentation(&mut self) -> bool {
        let Some(rx) = &self.segmentation_rx else { return false };
        match rx.try_recv() {
            Ok(outcome) => {
                self.accept_segmentation(outcome);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.accept_segmentation(Err(EditError::Segmentation("worker exited".into())));
                true
            }
        }
    }

    /// Block up to `timeout` for the segmentation. Returns `true` when it is
    /// no longer pending.
    pub fn wait_segmentation(&mut self, timeout: Duration) -> bool {
        if let Some(rx) = &self.segmentation_rx {
            match rx.recv_timeout(timeout) {
                Ok(outcome) => self.accept_segmentation(outcome),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.accept_segmentation(Err(EditError::Segmentation("worker exited".into())))
                }
            }
        }
        !self.is_segmentation_pending()
    }

    fn accept_segmentation(&mut self, outcome: SegmentationOutcome) {
        self.segmentation_rx = None;
        self.segmentation = match outcome {
            // The worker decodes the file again; if it changed on disk since
            // `open`, the cut-out belongs to a different photo.
            Ok(seg) if seg.original != self.original => {
                let msg = "photo changed on disk since it was opened".to_string();
                crate::log_warn!("{}: background removal unavailable: {}", self.title(), msg);
                SegmentationState::Failed(msg)
            }
            Ok(seg) if seg.foreground.dimensions() == self.original.dimensions() => {
                SegmentationState::Ready(seg)
            }
            Ok(seg) => {
                let msg = format!(
                    "cut-out is {:?}, photo is {:?}",
                    seg.foreground.dimensions(),
                    self.original.dimensions()
                );
                crate::log_warn!("{}: background removal unavailable: {}", self.title(), msg);
                SegmentationState::Failed(msg)
            }
            Err(e) => {
                crate::log_warn!("{}: background removal unavailable: {}", self.title(), e);
                SegmentationState::Failed(e.to_string())
            }
        };
        self.touch();
    }

    // ========================================================================
    // SAVE
    // ========================================================================

    /// Write the committed buffer to `dest` and tell the gallery.
    pub fn save(&mut self, dest: &Path) -> Result<(), EditError> {
        crate::io::save_atomic(&self.frame.buffer, dest, self.jpeg_quality)?;
        self.path = dest.to_path_buf();
        self.dirty = false;
        self.touch();
        crate::log_info!("Saved {}", dest.display());
        self.events.emit(SessionEvent::Saved {
            session: self.id,
            path: dest.to_path_buf(),
            dir: parent_dir(dest),
        });
        Ok(())
    }
}

#[cfg(test)]
impl EditSession {
    /// Session over an in-memory buffer with no segmentation running.
    pub(crate) fn from_buffer(buffer: RasterBuffer) -> Self {
        Self::with_original(
            PathBuf::from("test.png"),
            buffer,
            &AppSettings::default(),
            EventSink::detached(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::segment::testing::{FailingSegmenter, SleepingSegmenter, StubSegmenter, write_photo};
    use crate::raster::ChannelLayout;

    const WAIT: Duration = Duration::from_secs(30);

    fn white(w: u32, h: u32) -> EditSession {
        EditSession::from_buffer(RasterBuffer::filled(w, h, Rgb([255, 255, 255])))
    }

    fn drag(s: &mut EditSession, from: (f32, f32), to: (f32, f32)) {
        s.pointer_down(ImagePoint::new(from.0, from.1));
        s.pointer_move(ImagePoint::new(to.0, to.1));
    }

    fn opened(segmenter: Arc<dyn Segmenter>) -> (EditSession, std::sync::mpsc::Receiver<SessionEvent>) {
        let path = write_photo(5, 4);
        let (sink, rx) = EventSink::channel();
        let s = EditSession::open(&path, &AppSettings::default(), Some(segmenter), sink).unwrap();
        (s, rx)
    }

    #[test]
    fn preview_is_idempotent_and_leaves_committed_alone() {
        let mut s = white(100, 100);
        s.select_mode(EditMode::Rectangle, None);
        let committed = s.committed().clone();
        drag(&mut s, (10.0, 10.0), (50.0, 50.0));

        let first = s.display_buffer();
        let second = s.display_buffer();
        assert_eq!(first, second);
        assert_ne!(first, committed);
        assert_eq!(s.committed(), &committed);
        assert!(!s.history().can_undo());
        assert!(!s.is_dirty());
    }

    #[test]
    fn commit_matches_last_preview() {
        let mut s = white(100, 100);
        s.select_mode(EditMode::Circle, Some(Rgb([200, 0, 0])));
        drag(&mut s, (20.0, 20.0), (60.0, 50.0));
        let preview = s.display_buffer();
        s.pointer_up(None);
        assert_eq!(s.committed(), &preview);
        assert_eq!(s.history().undo_description(), Some("Circle"));
        assert!(s.tools().gesture().is_none());
        assert_eq!(s.mode(), EditMode::Circle);
    }

    #[test]
    fn undo_then_redo_is_identity() {
        let mut s = white(40, 40);
        let before = s.committed().clone();
        s.select_mode(EditMode::DiagonalLine, None);
        drag(&mut s, (1.0, 1.0), (30.0, 30.0));
        s.pointer_up(None);
        let after = s.committed().clone();

        assert_eq!(s.undo().as_deref(), Some("Line"));
        assert_eq!(s.committed(), &before);
        assert_eq!(s.redo().as_deref(), Some("Line"));
        assert_eq!(s.committed(), &after);
    }

    #[test]
    fn undo_redo_walks_mixed_commits() {
        let mut s = EditSession::from_buffer(RasterBuffer::filled(30, 20, Rgb([180, 140, 90])));
        let loaded = s.committed().clone();

        s.select_mode(EditMode::Rectangle, Some(Rgb([0, 0, 200])));
        drag(&mut s, (2.0, 3.0), (20.0, 15.0));
        s.pointer_up(None);
        s.apply_transform(Transform::RotateCw);
        s.set_channel_gain(Channel::Green, true, 40);
        assert!(s.apply_gains());
        s.apply_transform(Transform::FlipVertical);
        let edited = s.committed().clone();
        assert_eq!(s.history().undo_len(), 4);

        for _ in 0..4 {
            assert!(s.undo().is_some());
        }
        assert!(s.undo().is_none());
        assert_eq!(s.committed(), &loaded);

        for _ in 0..4 {
            assert!(s.redo().is_some());
        }
        assert!(s.redo().is_none());
        assert_eq!(s.committed(), &edited);
    }

    #[test]
    fn new_commit_drops_redo() {
        let mut s = white(40, 40);
        s.select_mode(EditMode::Rectangle, None);
        drag(&mut s, (1.0, 1.0), (10.0, 10.0));
        s.pointer_up(None);
        s.undo();
        assert!(s.history().can_redo());
        drag(&mut s, (5.0, 5.0), (20.0, 20.0));
        s.pointer_up(None);
        assert!(!s.history().can_redo());
        assert!(s.redo().is_none());
    }

    #[test]
    fn pointer_up_without_anchor_is_noop() {
        let mut s = white(20, 20);
        s.select_mode(EditMode::Rectangle, None);
        s.pointer_up(Some(ImagePoint::new(5.0, 5.0)));
        assert!(!s.history().can_undo());
    }

    #[test]
    fn pointer_down_outside_is_ignored() {
        let mut s = white(20, 20);
        s.select_mode(EditMode::Rectangle, None);
        s.pointer_down(ImagePoint::new(25.0, 5.0));
        assert!(s.tools().gesture().is_none());
        s.pointer_down(ImagePoint::new(-1.0, 5.0));
        assert!(s.tools().gesture().is_none());
    }

    #[test]
    fn idle_mode_ignores_pointer() {
        let mut s = white(20, 20);
        drag(&mut s, (1.0, 1.0), (10.0, 10.0));
        s.pointer_up(None);
        assert!(!s.history().can_undo());
        assert_eq!(s.display_buffer(), *s.committed());
    }

    #[test]
    fn drag_outside_is_clamped_to_edge() {
        let mut s = white(100, 50);
        s.select_mode(EditMode::Rectangle, None);
        drag(&mut s, (10.0, 10.0), (500.0, -20.0));
        let g = s.tools().gesture().unwrap();
        assert_eq!(g.current, ImagePoint::new(99.0, 0.0));
    }

    #[test]
    fn pointer_leave_commits_last_preview() {
        let mut s = white(50, 50);
        s.select_mode(EditMode::HorizontalLine, None);
        drag(&mut s, (5.0, 5.0), (40.0, 30.0));
        let preview = s.display_buffer();
        s.pointer_leave();
        assert_eq!(s.committed(), &preview);
        assert_eq!(s.history().undo_len(), 1);
    }

    #[test]
    fn mode_switch_abandons_gesture_and_text() {
        let mut s = white(50, 50);
        s.select_mode(EditMode::Text, None);
        drag(&mut s, (5.0, 5.0), (40.0, 30.0));
        s.key_input(KeyInput::Char('A'));
        s.select_mode(EditMode::Circle, None);
        assert_eq!(s.mode(), EditMode::Circle);
        assert!(s.tools().gesture().is_none());
        assert!(s.tools().text().is_empty());

        // Reselecting the active mode goes back to idle.
        assert_eq!(s.select_mode(EditMode::Circle, None), EditMode::Idle);
    }

    #[test]
    fn text_commits_on_next_pointer_down() {
        let mut s = white(120, 120);
        s.select_mode(EditMode::Text, None);
        drag(&mut s, (10.0, 10.0), (60.0, 40.0));
        s.pointer_up(None);
        assert!(s.tools().gesture().is_some());

        assert!(s.key_input(KeyInput::Char('H')));
        assert!(s.key_input(KeyInput::Char('x')));
        assert!(s.key_input(KeyInput::Backspace));
        assert!(s.key_input(KeyInput::Enter));
        assert!(s.key_input(KeyInput::Char('i')));
        assert_eq!(s.tools().text(), "H\ni");
        let preview = s.display_buffer();
        assert_ne!(&preview, s.committed());
        assert!(!s.history().can_undo());

        s.pointer_down(ImagePoint::new(80.0, 80.0));
        assert_eq!(s.committed(), &preview);
        assert_eq!(s.history().undo_description(), Some("Text"));
        assert!(s.tools().text().is_empty());
        assert_eq!(s.tools().gesture().unwrap().anchor, ImagePoint::new(80.0, 80.0));
    }

    #[test]
    fn empty_text_box_commits_nothing() {
        let mut s = white(60, 60);
        s.select_mode(EditMode::Text, None);
        drag(&mut s, (10.0, 10.0), (30.0, 30.0));
        s.pointer_up(None);
        s.pointer_down(ImagePoint::new(40.0, 40.0));
        assert!(!s.history().can_undo());
    }

    #[test]
    fn keys_ignored_outside_text_mode() {
        let mut s = white(10, 10);
        assert!(!s.key_input(KeyInput::Char('a')));
        s.select_mode(EditMode::Rectangle, None);
        assert!(!s.key_input(KeyInput::Enter));
    }

    #[test]
    fn transform_abandons_gesture_and_is_undoable() {
        let mut s = white(30, 10);
        s.select_mode(EditMode::Rectangle, None);
        drag(&mut s, (1.0, 1.0), (5.0, 5.0));
        s.apply_transform(Transform::RotateCw);
        assert!(s.tools().gesture().is_none());
        assert_eq!(s.committed().dimensions(), (10, 30));
        s.apply_transform(Transform::FlipHorizontal);
        assert_eq!(s.committed().dimensions(), (10, 30));
        s.undo();
        s.undo();
        assert_eq!(s.committed().dimensions(), (30, 10));
    }

    #[test]
    fn gains_preview_then_apply() {
        let mut s = EditSession::from_buffer(RasterBuffer::filled(4, 4, Rgb([200, 100, 50])));
        s.set_channel_gain(Channel::Red, true, 50);
        assert_eq!(s.display_buffer().pixels().get_pixel(0, 0)[0], 100);
        assert_eq!(s.committed().pixels().get_pixel(0, 0)[0], 200);

        assert!(s.apply_gains());
        assert_eq!(s.committed().pixels().get_pixel(0, 0)[0], 100);
        assert!(s.gains().is_identity());
        assert!(!s.apply_gains());

        s.undo();
        assert_eq!(s.committed().pixels().get_pixel(0, 0)[0], 200);
    }

    #[test]
    fn before_after_uses_oriented_original() {
        let mut s = white(8, 4);
        s.apply_transform(Transform::RotateCcw);
        let composite = s.before_after(50).unwrap();
        assert_eq!(composite.dimensions(), (4, 8));
    }

    #[test]
    fn open_missing_file_fails() {
        let missing = std::env::temp_dir().join("epanouident-missing-photo.png");
        let result = EditSession::open(
            &missing,
            &AppSettings::default(),
            Some(Arc::new(StubSegmenter)),
            EventSink::detached(),
        );
        assert!(matches!(result, Err(EditError::NotFound(_))));
    }

    #[test]
    fn open_without_segmenter_leaves_toggle_unavailable() {
        let path = write_photo(5, 4);
        let mut s = EditSession::open(&path, &AppSettings::default(), None, EventSink::detached()).unwrap();
        assert!(!s.is_segmentation_pending());
        assert!(!s.poll_segmentation());
        let before = s.committed().clone();
        assert_eq!(
            s.toggle_background(),
            BackgroundToggle::Unavailable(NOT_REQUESTED.to_string())
        );
        assert_eq!(s.committed(), &before);
    }

    #[test]
    fn drawing_stays_responsive_while_segmenting() {
        let path = write_photo(5, 4);
        let mut sessions: Vec<EditSession> = (0..rayon::current_num_threads() + 1)
            .map(|_| {
                EditSession::open(
                    &path,
                    &AppSettings::default(),
                    Some(Arc::new(SleepingSegmenter(Duration::from_secs(3)))),
                    EventSink::detached(),
                )
                .unwrap()
            })
            .collect();
        std::thread::sleep(Duration::from_millis(100));

        let mut s = white(200, 200);
        let start = std::time::Instant::now();
        s.select_mode(EditMode::Rectangle, None);
        drag(&mut s, (10.0, 10.0), (150.0, 120.0));
        let preview = s.display_buffer();
        s.pointer_up(None);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(s.committed(), &preview);

        for session in &mut sessions {
            assert!(session.wait_segmentation(WAIT));
        }
    }

    #[test]
    fn cut_out_of_changed_photo_is_rejected() {
        let mut s = white(4, 4);
        let other = RasterBuffer::filled(4, 4, Rgb([0, 0, 0]));
        s.accept_segmentation(Ok(Segmentation {
            foreground: RasterBuffer::from_rgba(other.pixels().clone()),
            original: other,
        }));
        assert!(matches!(s.segmentation(), SegmentationState::Failed(_)));
        assert!(matches!(s.toggle_background(), BackgroundToggle::Unavailable(_)));

        let mut s = white(4, 4);
        let original = s.original().clone();
        s.accept_segmentation(Ok(Segmentation {
            foreground: RasterBuffer::from_rgba(original.pixels().clone()),
            original,
        }));
        assert!(matches!(s.segmentation(), SegmentationState::Ready(_)));
    }

    #[test]
    fn toggle_is_noop_while_pending() {
        let (mut s, _rx) = opened(Arc::new(StubSegmenter));
        let before = s.committed().clone();
        // Nothing is picked up until the session polls.
        assert_eq!(s.toggle_background(), BackgroundToggle::Pending);
        assert_eq!(s.committed(), &before);
        assert!(!s.history().can_undo());
    }

    #[test]
    fn toggle_is_noop_after_failure() {
        let (mut s, _rx) = opened(Arc::new(FailingSegmenter));
        assert!(s.wait_segmentation(WAIT));
        assert!(matches!(s.segmentation(), SegmentationState::Failed(_)));
        let before = s.committed().clone();
        assert!(matches!(s.toggle_background(), BackgroundToggle::Unavailable(_)));
        assert_eq!(s.committed(), &before);
        assert!(!s.history().can_undo());
    }

    #[test]
    fn toggle_swaps_foreground_and_original() {
        let (mut s, _rx) = opened(Arc::new(StubSegmenter));
        assert!(s.wait_segmentation(WAIT));
        let original = s.committed().clone();
        assert_eq!(original.layout(), ChannelLayout::Rgb);

        assert_eq!(s.toggle_background(), BackgroundToggle::Removed);
        assert!(s.background_removed());
        assert_eq!(s.committed().layout(), ChannelLayout::Rgba);
        assert_eq!(s.committed().dimensions(), original.dimensions());
        assert_eq!(s.committed().pixels().get_pixel(0, 0)[3], 0);
        assert_eq!(s.committed().pixels().get_pixel(1, 0)[3], 255);

        assert_eq!(s.toggle_background(), BackgroundToggle::Restored);
        assert_eq!(s.committed(), &original);

        s.undo();
        assert!(s.background_removed());
        assert_eq!(s.committed().layout(), ChannelLayout::Rgba);
    }

    #[test]
    fn toggle_after_rotate_keeps_orientation() {
        let (mut s, _rx) = opened(Arc::new(StubSegmenter));
        assert!(s.wait_segmentation(WAIT));
        s.apply_transform(Transform::RotateCw);
        assert_eq!(s.committed().dimensions(), (4, 5));

        assert_eq!(s.toggle_background(), BackgroundToggle::Removed);
        assert_eq!(s.committed().dimensions(), (4, 5));
        // The transparent first column is now the top row.
        for x in 0..4 {
            assert_eq!(s.committed().pixels().get_pixel(x, 0)[3], 0);
            assert_eq!(s.committed().pixels().get_pixel(x, 1)[3], 255);
        }
    }

    #[test]
    fn save_emits_event_and_clears_dirty() {
        let (mut s, rx) = opened(Arc::new(StubSegmenter));
        s.apply_transform(Transform::FlipVertical);
        assert!(s.is_dirty());
        let dir = std::env::temp_dir().join(format!("epanouident-save-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let dest = dir.join("edited.png");

        s.save(&dest).unwrap();
        assert!(dest.is_file());
        assert!(!s.is_dirty());
        assert_eq!(s.path(), dest.as_path());
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Saved {
                session: s.id(),
                path: dest.clone(),
                dir: dir.clone(),
            }
        );
    }

    #[test]
    fn failed_save_keeps_dirty_and_stays_silent() {
        let (mut s, rx) = opened(Arc::new(StubSegmenter));
        s.apply_transform(Transform::FlipVertical);
        let dest = std::env::temp_dir().join("epanouident-out.gif");
        assert!(matches!(s.save(&dest), Err(EditError::UnsupportedFormat(_))));
        assert!(s.is_dirty());
        assert!(rx.try_recv().is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn map_pointer_scales_each_axis() {
        let s = white(1000, 500);
        assert_eq!(
            s.map_pointer((100.0, 100.0), (500.0, 250.0)),
            Some(ImagePoint::new(200.0, 200.0))
        );
        assert_eq!(s.map_pointer((1.0, 1.0), (0.0, 250.0)), None);
    }

    #[test]
    fn title_marks_dirty() {
        let mut s = white(4, 4);
        assert_eq!(s.title(), "test.png");
        s.apply_transform(Transform::FlipHorizontal);
        assert_eq!(s.title(), "test.png*");
    }
}
