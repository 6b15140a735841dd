use eframe::egui;
use egui::{Color32, ColorImage, Pos2, Rect, TextureHandle, TextureOptions};
use image::Rgb;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use crate::components::tools::{EditMode, MAX_BRUSH_SIZE, MIN_BRUSH_SIZE};
use crate::events::{EventSink, IngestAction, IngestEvent, SessionEvent, file_available};
use crate::io::{RASTER_EXTENSIONS, RAW_EXTENSIONS, SaveFormat};
use crate::ops::adjustments::{Channel, MAX_GAIN};
use crate::ops::segment::{self, Segmenter};
use crate::ops::transform::Transform;
use crate::session::{BackgroundToggle, EditSession, KeyInput, SegmentationState};
use crate::settings::AppSettings;

/// Repaint cadence while a segmentation worker is running.
const SEGMENTATION_POLL: Duration = Duration::from_millis(100);

// ============================================================================
// TAB: one open session plus its GPU texture
// ============================================================================

struct SessionTab {
    session: EditSession,
    texture: Option<TextureHandle>,
    /// `(session revision, compare split)` the texture was built from.
    texture_key: Option<(u64, Option<u8>)>,
}

impl SessionTab {
    fn new(session: EditSession) -> Self {
        Self {
            session,
            texture: None,
            texture_key: None,
        }
    }

    /// Re-upload the displayed pixels when the session changed.
    fn refresh_texture(&mut self, ctx: &egui::Context, compare: Option<u8>) {
        let key = (self.session.revision(), compare);
        if self.texture.is_some() && self.texture_key == Some(key) {
            return;
        }
        let pixels = match compare {
            Some(split) => self
                .session
                .before_after(split)
                .unwrap_or_else(|| self.session.display_buffer().into_pixels()),
            None => self.session.display_buffer().into_pixels(),
        };
        let size = [pixels.width() as usize, pixels.height() as usize];
        let color_image = ColorImage::from_rgba_unmultiplied(size, pixels.as_raw());
        match &mut self.texture {
            Some(tex) => tex.set(color_image, TextureOptions::NEAREST),
            None => {
                self.texture = Some(ctx.load_texture(
                    format!("session_{}", self.session.id()),
                    color_image,
                    TextureOptions::NEAREST,
                ))
            }
        }
        self.texture_key = Some(key);
    }
}

// ============================================================================
// APP
// ============================================================================

pub struct EpanouiDentApp {
    settings: AppSettings,
    segmenter: Arc<dyn Segmenter>,
    tabs: Vec<SessionTab>,
    active: usize,
    events: EventSink,
    event_rx: Receiver<SessionEvent>,
    /// Before/after split in percent, when the comparison view is on.
    compare: Option<u8>,
    status: String,
    pending_startup_files: Vec<PathBuf>,
}

impl EpanouiDentApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, startup_files: Vec<PathBuf>) -> Self {
        let settings = AppSettings::load();
        let segmenter = segment::from_settings(&settings);
        crate::log_info!("Background removal: {}", segmenter.name());
        let (events, event_rx) = EventSink::channel();
        Self {
            settings,
            segmenter,
            tabs: Vec::new(),
            active: 0,
            events,
            event_rx,
            compare: None,
            status: String::new(),
            pending_startup_files: startup_files,
        }
    }

    fn active_session(&mut self) -> Option<&mut EditSession> {
        self.tabs.get_mut(self.active).map(|t| &mut t.session)
    }

    fn set_status(&mut self, msg: impl Into<String>) {
        self.status = msg.into();
    }

    // ========================================================================
    // FILES
    // ========================================================================

    fn open_path(&mut self, path: PathBuf) {
        match EditSession::open(&path, &self.settings, Some(self.segmenter.clone()), self.events.clone()) {
            Ok(session) => {
                self.tabs.push(SessionTab::new(session));
                self.active = self.tabs.len() - 1;
                self.set_status(format!("Opened {}", path.display()));
            }
            Err(e) => {
                crate::log_err!("Open {} failed: {}", path.display(), e);
                self.set_status(format!("Could not open {}: {}", path.display(), e));
            }
        }
    }

    fn handle_open_file(&mut self) {
        let exts: Vec<&str> = RASTER_EXTENSIONS.iter().chain(RAW_EXTENSIONS).copied().collect();
        let mut dialog = rfd::FileDialog::new().add_filter("Image", &exts);
        if !self.settings.ingest_dir.is_empty() {
            dialog = dialog.set_directory(&self.settings.ingest_dir);
        }
        if let Some(paths) = dialog.pick_files() {
            for path in paths {
                self.open_path(path);
            }
        }
    }

    fn handle_save(&mut self) {
        let Some(tab) = self.tabs.get_mut(self.active) else { return };
        let current = tab.session.path().to_path_buf();
        let stem = current
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo".to_string());
        let ext = SaveFormat::from_path(&current).unwrap_or(SaveFormat::Png).extension();
        let mut dialog = rfd::FileDialog::new()
            .add_filter("PNG", &["png"])
            .add_filter("JPEG", &["jpg", "jpeg"])
            .add_filter("BMP", &["bmp"])
            .add_filter("TIFF", &["tif", "tiff"])
            .set_file_name(format!("{}.{}", stem, ext));
        if let Some(dir) = current.parent() {
            dialog = dialog.set_directory(dir);
        }
        let Some(dest) = dialog.save_file() else { return };
        let result = tab.session.save(&dest);
        match result {
            Ok(()) => {}
            Err(e) => {
                crate::log_err!("Save {} failed: {}", dest.display(), e);
                self.set_status(format!("Save failed: {}", e));
            }
        }
    }

    fn close_tab(&mut self, idx: usize) {
        if idx >= self.tabs.len() {
            return;
        }
        let tab = self.tabs.remove(idx);
        crate::log_info!("Closed {}", tab.session.path().display());
        if self.active >= self.tabs.len() {
            self.active = self.tabs.len().saturating_sub(1);
        }
    }

    /// Camera ingestion and dropped files both arrive here.
    pub fn ingest(&mut self, event: IngestEvent) {
        match file_available(&event) {
            Some(IngestAction::Open(path)) => self.open_path(path),
            Some(IngestAction::Announce(msg)) => {
                crate::log_info!("{}", msg);
                self.set_status(msg);
            }
            None => {}
        }
    }

    // ========================================================================
    // EDIT ACTIONS
    // ========================================================================

    fn undo(&mut self) {
        let Some(session) = self.active_session() else { return };
        let msg = match session.undo() {
            Some(d) => format!("Undo: {}", d),
            None => "Nothing to undo".to_string(),
        };
        self.set_status(msg);
    }

    fn redo(&mut self) {
        let Some(session) = self.active_session() else { return };
        let msg = match session.redo() {
            Some(d) => format!("Redo: {}", d),
            None => "Nothing to redo".to_string(),
        };
        self.set_status(msg);
    }

    fn toggle_background(&mut self) {
        let Some(session) = self.active_session() else { return };
        let msg = match session.toggle_background() {
            BackgroundToggle::Removed => "Background removed".to_string(),
            BackgroundToggle::Restored => "Background restored".to_string(),
            BackgroundToggle::Pending => "Background removal is still running".to_string(),
            BackgroundToggle::Unavailable(e) => format!("Background removal unavailable: {}", e),
        };
        self.set_status(msg);
    }

    // ========================================================================
    // PER-FRAME PLUMBING
    // ========================================================================

    fn drain_session_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                SessionEvent::Saved { session, path, dir } => {
                    crate::log_info!("Session {} saved; gallery re-scan of {}", session, dir.display());
                    self.set_status(format!("Saved {}", path.display()));
                }
            }
        }
    }

    /// Returns `true` while any session still waits on its worker.
    fn poll_segmentations(&mut self) -> bool {
        let mut pending = false;
        for tab in &mut self.tabs {
            tab.session.poll_segmentation();
            pending |= tab.session.is_segmentation_pending();
        }
        pending
    }

    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let events = ctx.input(|i| i.events.clone());
        for event in events {
            match event {
                egui::Event::Key {
                    key,
                    pressed: true,
                    modifiers,
                    ..
                } if modifiers.command => match key {
                    egui::Key::Z if modifiers.shift => self.redo(),
                    egui::Key::Z => self.undo(),
                    egui::Key::Y => self.redo(),
                    egui::Key::O => self.handle_open_file(),
                    egui::Key::S => self.handle_save(),
                    _ => {}
                },
                egui::Event::Key {
                    key, pressed: true, ..
                } => {
                    let input = match key {
                        egui::Key::Backspace => KeyInput::Backspace,
                        egui::Key::Enter => KeyInput::Enter,
                        _ => continue,
                    };
                    if let Some(session) = self.active_session() {
                        session.key_input(input);
                    }
                }
                egui::Event::Text(text) => {
                    if let Some(session) = self.active_session() {
                        for c in text.chars() {
                            session.key_input(KeyInput::Char(c));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    // ========================================================================
    // PANELS
    // ========================================================================

    fn menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Open…").clicked() {
                        ui.close_menu();
                        self.handle_open_file();
                    }
                    if ui.add_enabled(!self.tabs.is_empty(), egui::Button::new("Save…")).clicked() {
                        ui.close_menu();
                        self.handle_save();
                    }
                    if ui.add_enabled(!self.tabs.is_empty(), egui::Button::new("Close")).clicked() {
                        ui.close_menu();
                        self.close_tab(self.active);
                    }
                });
                let (undo_label, redo_label) = match self.tabs.get(self.active) {
                    Some(tab) => (
                        tab.session.history().undo_description().map(|d| format!("Undo {}", d)),
                        tab.session.history().redo_description().map(|d| format!("Redo {}", d)),
                    ),
                    None => (None, None),
                };
                ui.menu_button("Edit", |ui| {
                    let undo = egui::Button::new(undo_label.as_deref().unwrap_or("Undo")).shortcut_text("Ctrl+Z");
                    if ui.add_enabled(undo_label.is_some(), undo).clicked() {
                        ui.close_menu();
                        self.undo();
                    }
                    let redo = egui::Button::new(redo_label.as_deref().unwrap_or("Redo")).shortcut_text("Ctrl+Y");
                    if ui.add_enabled(redo_label.is_some(), redo).clicked() {
                        ui.close_menu();
                        self.redo();
                    }
                });
            });

            let mut close = None;
            ui.horizontal_wrapped(|ui| {
                for (idx, tab) in self.tabs.iter().enumerate() {
                    if ui.selectable_label(idx == self.active, tab.session.title()).clicked() {
                        self.active = idx;
                    }
                    if ui.small_button("×").clicked() {
                        close = Some(idx);
                    }
                    ui.separator();
                }
            });
            if let Some(idx) = close {
                self.close_tab(idx);
            }
        });
    }

    fn tool_panel(&mut self, ctx: &egui::Context) {
        let mut toggle_background = false;
        let compare = &mut self.compare;
        egui::SidePanel::left("tool_panel").resizable(false).show(ctx, |ui| {
            let Some(tab) = self.tabs.get_mut(self.active) else {
                ui.label("Open a photo to start editing.");
                return;
            };
            let session = &mut tab.session;

            ui.heading("Draw");
            for mode in EditMode::all() {
                if ui.selectable_label(session.mode() == *mode, mode.label()).clicked() {
                    session.select_mode(*mode, None);
                }
            }
            ui.horizontal(|ui| {
                let c = session.tools().pen_color();
                let mut rgb = [c[0], c[1], c[2]];
                if ui.color_edit_button_srgb(&mut rgb).changed() {
                    session.set_pen_color(Rgb(rgb));
                }
                ui.label("Pen");
            });
            let mut brush = session.tools().brush_size();
            if ui
                .add(egui::Slider::new(&mut brush, MIN_BRUSH_SIZE..=MAX_BRUSH_SIZE).text("Brush"))
                .changed()
            {
                session.set_brush_size(brush);
            }

            ui.separator();
            ui.heading("Image");
            for t in Transform::all() {
                if ui.button(t.label()).clicked() {
                    session.apply_transform(*t);
                }
            }
            let ready = matches!(session.segmentation(), SegmentationState::Ready(_));
            let label = if session.background_removed() {
                "Restore background"
            } else {
                "Remove background"
            };
            if ui.add_enabled(ready, egui::Button::new(label)).clicked() {
                toggle_background = true;
            }

            ui.separator();
            ui.heading("Channels");
            for channel in Channel::all() {
                let gain = session.gains().get(*channel);
                let (mut enabled, mut value) = (gain.enabled, gain.value);
                let changed = ui
                    .horizontal(|ui| {
                        let a = ui.checkbox(&mut enabled, channel.label()).changed();
                        let b = ui.add(egui::Slider::new(&mut value, 0..=MAX_GAIN).suffix("%")).changed();
                        a || b
                    })
                    .inner;
                if changed {
                    session.set_channel_gain(*channel, enabled, value);
                }
            }
            ui.horizontal(|ui| {
                if ui.button("Apply").clicked() {
                    session.apply_gains();
                }
                if ui.button("Reset").clicked() {
                    session.reset_gains();
                }
            });

            ui.separator();
            let mut comparing = compare.is_some();
            if ui.checkbox(&mut comparing, "Before / after").changed() {
                *compare = if comparing { Some(50) } else { None };
            }
            if let Some(split) = compare.as_mut() {
                ui.add(egui::Slider::new(split, 0..=100).suffix("%"));
            }

            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("−").clicked() {
                    session.viewport.zoom_out();
                }
                if ui.button(format!("{:.0}%", session.viewport.zoom * 100.0)).clicked() {
                    session.viewport.reset_zoom();
                }
                if ui.button("+").clicked() {
                    session.viewport.zoom_in();
                }
            });
        });
        if toggle_background {
            self.toggle_background();
        }
    }

    fn status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let Some(tab) = self.tabs.get(self.active) {
                    let s = &tab.session;
                    ui.label(format!("Tool: {}", s.mode().label()));
                    ui.separator();
                    let history = ui.label(format!(
                        "History: {} ({:.1} MB)",
                        s.history().undo_description().unwrap_or("—"),
                        s.history().memory_usage() as f64 / (1024.0 * 1024.0)
                    ));
                    if s.history().can_undo() {
                        history.on_hover_text(s.history().undo_history().join("\n"));
                    }
                    ui.separator();
                    let seg = match s.segmentation() {
                        SegmentationState::Pending => "Background: analysing…",
                        SegmentationState::Ready(_) => "Background: ready",
                        SegmentationState::Failed(_) => "Background: unavailable",
                    };
                    ui.label(seg);
                    ui.separator();
                }
                ui.label(&self.status);
            });
        });
    }

    fn image_surface(&mut self, ctx: &egui::Context) {
        let compare = self.compare;
        egui::CentralPanel::default()
            .frame(egui::Frame {
                fill: Color32::from_gray(40),
                ..Default::default()
            })
            .show(ctx, |ui| {
                let panel = ui.max_rect();
                let response = ui.interact(panel, ui.id().with("image_surface"), egui::Sense::click_and_drag());
                let Some(tab) = self.tabs.get_mut(self.active) else { return };
                tab.refresh_texture(ctx, compare);

                let buffer_size = tab.session.committed().dimensions();
                let displayed = tab
                    .session
                    .viewport
                    .displayed_size(buffer_size, (panel.width(), panel.height()));
                let image_rect = Rect::from_center_size(panel.center(), egui::vec2(displayed.0, displayed.1));

                let painter = ui.painter_at(panel);
                painter.rect_filled(image_rect, 0.0, Color32::from_gray(128));
                if let Some(tex) = &tab.texture {
                    painter.image(
                        tex.id(),
                        image_rect,
                        Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                        Color32::WHITE,
                    );
                }

                if response.hovered() {
                    let dy = ctx.input(|i| i.scroll_delta.y);
                    if dy.abs() > 0.1 {
                        tab.session.viewport.scroll(dy);
                    }
                }

                // Comparison is a read-only view.
                if compare.is_some() {
                    return;
                }
                let surface = image_rect.intersect(panel);
                let (pressed, released, pos) = ctx.input(|i| {
                    (
                        i.pointer.primary_pressed(),
                        i.pointer.primary_released(),
                        i.pointer.latest_pos(),
                    )
                });
                let session = &mut tab.session;
                let inside = pos.filter(|p| surface.contains(*p));
                let mapped = inside.and_then(|p| {
                    let rel = p - image_rect.min;
                    session.map_pointer((rel.x, rel.y), displayed)
                });

                if pressed {
                    if let Some(pt) = mapped {
                        session.pointer_down(pt);
                    }
                } else if session.is_dragging() {
                    match mapped {
                        Some(pt) if released => session.pointer_up(Some(pt)),
                        Some(pt) => session.pointer_move(pt),
                        None => session.pointer_leave(),
                    }
                }
                if released && session.is_dragging() {
                    session.pointer_up(None);
                }
            });
    }
}

impl eframe::App for EpanouiDentApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // --- Dynamic window title: "EpanouiDent - <file>[*]" ---
        let title = match self.tabs.get(self.active) {
            Some(tab) => format!("EpanouiDent - {}", tab.session.title()),
            None => "EpanouiDent".to_string(),
        };
        ctx.send_viewport_cmd(egui::ViewportCommand::Title(title));

        // Files passed on the command line, then anything dropped on the window.
        for path in std::mem::take(&mut self.pending_startup_files) {
            self.open_path(path);
        }
        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.clone())
                .collect()
        });
        for path in dropped {
            self.ingest(IngestEvent::FileDownloaded(path));
        }

        self.drain_session_events();
        if self.poll_segmentations() {
            ctx.request_repaint_after(SEGMENTATION_POLL);
        }
        self.handle_keyboard(ctx);

        self.menu_bar(ctx);
        self.status_bar(ctx);
        self.tool_panel(ctx);
        self.image_surface(ctx);
    }
}
