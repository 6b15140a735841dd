use image::Rgb;

use crate::canvas::ImagePoint;

pub const MIN_BRUSH_SIZE: u32 = 1;
pub const MAX_BRUSH_SIZE: u32 = 100;

// ============================================================================
// EDIT MODE
// ============================================================================

/// The single active input mode of a session. Exactly one is active; drawing
/// modes are mutually exclusive by construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub enum EditMode {
    #[default]
    Idle,
    FreeLine,
    Rectangle,
    Circle,
    HorizontalLine,
    VerticalLine,
    DiagonalLine,
    Text,
}

impl EditMode {
    pub fn label(&self) -> &'static str {
        match self {
            EditMode::Idle => "None",
            EditMode::FreeLine => "Free line",
            EditMode::Rectangle => "Rectangle",
            EditMode::Circle => "Circle",
            EditMode::HorizontalLine => "Horizontal line",
            EditMode::VerticalLine => "Vertical line",
            EditMode::DiagonalLine => "Line",
            EditMode::Text => "Text",
        }
    }

    /// Every selectable mode, in tool panel order.
    pub fn all() -> &'static [EditMode] {
        &[
            EditMode::Circle,
            EditMode::Rectangle,
            EditMode::HorizontalLine,
            EditMode::VerticalLine,
            EditMode::DiagonalLine,
            EditMode::FreeLine,
            EditMode::Text,
        ]
    }

    /// Modes whose pointer gesture commits on release.
    pub fn is_shape(&self) -> bool {
        !matches!(self, EditMode::Idle | EditMode::Text)
    }
}

// ============================================================================
// GESTURE
// ============================================================================

/// An in-progress pointer drag in image space.
#[derive(Clone, Debug, PartialEq)]
pub struct Gesture {
    pub anchor: ImagePoint,
    pub current: ImagePoint,
    /// Every point seen since the anchor, anchor first. Feeds the free line.
    pub path: Vec<ImagePoint>,
}

impl Gesture {
    fn start(at: ImagePoint) -> Self {
        Self {
            anchor: at,
            current: at,
            path: vec![at],
        }
    }

    fn extend(&mut self, to: ImagePoint) {
        self.current = to;
        if self.path.last() != Some(&to) {
            self.path.push(to);
        }
    }
}

// ============================================================================
// TOOL STATE
// ============================================================================

/// Per-session tool parameters plus the gesture and text being composed.
#[derive(Clone, Debug)]
pub struct ToolState {
    mode: EditMode,
    pen_color: Rgb<u8>,
    brush_size: u32,
    gesture: Option<Gesture>,
    text: String,
}

impl Default for ToolState {
    fn default() -> Self {
        Self {
            mode: EditMode::Idle,
            pen_color: Rgb([0, 0, 0]),
            brush_size: MIN_BRUSH_SIZE,
            gesture: None,
            text: String::new(),
        }
    }
}

impl ToolState {
    pub fn new(pen_color: Rgb<u8>, brush_size: u32) -> Self {
        let mut state = Self {
            pen_color,
            ..Self::default()
        };
        state.set_brush_size(brush_size);
        state
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn pen_color(&self) -> Rgb<u8> {
        self.pen_color
    }

    pub fn brush_size(&self) -> u32 {
        self.brush_size
    }

    pub fn gesture(&self) -> Option<&Gesture> {
        self.gesture.as_ref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Switch to `mode`, or back to `Idle` when `mode` is already active.
    /// Any switch drops the gesture and the text being typed.
    pub fn select_mode(&mut self, mode: EditMode, color: Option<Rgb<u8>>) -> EditMode {
        if let Some(c) = color {
            self.pen_color = c;
        }
        self.mode = if self.mode == mode { EditMode::Idle } else { mode };
        self.abandon();
        self.mode
    }

    pub fn set_pen_color(&mut self, color: Rgb<u8>) {
        self.pen_color = color;
    }

    pub fn set_brush_size(&mut self, size: u32) {
        self.brush_size = size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
    }

    /// Drop the gesture and any pending text.
    pub fn abandon(&mut self) {
        self.gesture = None;
        self.text.clear();
    }

    pub fn begin_gesture(&mut self, at: ImagePoint) {
        self.gesture = Some(Gesture::start(at));
    }

    /// Returns `false` when there is no gesture to extend.
    pub fn extend_gesture(&mut self, to: ImagePoint) -> bool {
        match self.gesture.as_mut() {
            Some(g) => {
                g.extend(to);
                true
            }
            None => false,
        }
    }

    pub fn take_gesture(&mut self) -> Option<Gesture> {
        self.gesture.take()
    }

    pub fn push_char(&mut self, c: char) {
        self.text.push(c);
    }

    pub fn pop_char(&mut self) {
        self.text.pop();
    }

    pub fn take_text(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_black_pen_and_unit_brush() {
        let tools = ToolState::default();
        assert_eq!(tools.mode(), EditMode::Idle);
        assert_eq!(tools.pen_color(), Rgb([0, 0, 0]));
        assert_eq!(tools.brush_size(), 1);
    }

    #[test]
    fn selecting_active_mode_toggles_to_idle() {
        let mut tools = ToolState::default();
        assert_eq!(tools.select_mode(EditMode::Circle, None), EditMode::Circle);
        assert_eq!(tools.select_mode(EditMode::Circle, None), EditMode::Idle);
    }

    #[test]
    fn switching_mode_replaces_previous_and_drops_gesture() {
        let mut tools = ToolState::default();
        tools.select_mode(EditMode::Rectangle, Some(Rgb([255, 0, 0])));
        tools.begin_gesture(ImagePoint::new(1.0, 1.0));
        tools.push_char('a');

        assert_eq!(tools.select_mode(EditMode::Text, None), EditMode::Text);
        assert!(tools.gesture().is_none());
        assert!(tools.text().is_empty());
        assert_eq!(tools.pen_color(), Rgb([255, 0, 0]));
    }

    #[test]
    fn brush_size_is_clamped() {
        let mut tools = ToolState::default();
        tools.set_brush_size(0);
        assert_eq!(tools.brush_size(), 1);
        tools.set_brush_size(250);
        assert_eq!(tools.brush_size(), MAX_BRUSH_SIZE);
        assert_eq!(ToolState::new(Rgb([0, 0, 0]), 12).brush_size(), 12);
    }

    #[test]
    fn gesture_path_skips_repeated_points() {
        let mut tools = ToolState::default();
        assert!(!tools.extend_gesture(ImagePoint::new(2.0, 2.0)));
        tools.begin_gesture(ImagePoint::new(0.0, 0.0));
        tools.extend_gesture(ImagePoint::new(2.0, 2.0));
        tools.extend_gesture(ImagePoint::new(2.0, 2.0));
        let g = tools.take_gesture().unwrap();
        assert_eq!(g.path.len(), 2);
        assert_eq!(g.current, ImagePoint::new(2.0, 2.0));
        assert!(tools.gesture().is_none());
    }

    #[test]
    fn text_editing_keys() {
        let mut tools = ToolState::default();
        tools.push_char('h');
        tools.push_char('i');
        tools.push_char('\n');
        tools.pop_char();
        tools.pop_char();
        assert_eq!(tools.text(), "h");
        assert_eq!(tools.take_text(), "h");
        assert!(tools.text().is_empty());
    }
}
