// ============================================================================
// STYLE & FRAME PARAMETERS
// ============================================================================
//
// Everything the side panel (or a preset / CLI flag) can set that is not cell
// geometry.  Setters clamp into range so the rest of the crate can trust the
// values.

use std::fmt;
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

use crate::color::parse_hex;

pub const CELL_SIZE_RANGE: RangeInclusive<f32> = -100.0..=100.0;
pub const CELL_SPREAD_RANGE: RangeInclusive<f32> = -400.0..=400.0;
pub const CELL_TUMBLE_RANGE: RangeInclusive<f32> = 0.0..=100.0;
pub const CELL_RADIUS_RANGE: RangeInclusive<f32> = 0.0..=100.0;
pub const CANVAS_SCALE_RANGE: RangeInclusive<f32> = 10.0..=200.0;

/// Degrees of rotation at tumble 100 and a rotation factor of ±1.
pub const MAX_TUMBLE_DEG: f32 = 280.0;

/// Export scale choices offered by the desktop host.
pub const EXPORT_SCALES: [f32; 4] = [1.0, 1.5, 2.0, 4.0];
/// Largest export multiplier: a 16000 px long side.
pub const MAX_EXPORT_SCALE: f32 = 8.0;

fn clamp_to(v: f32, range: &RangeInclusive<f32>) -> f32 {
    if v.is_nan() { *range.start() } else { v.clamp(*range.start(), *range.end()) }
}

/// What a cell shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ContentMode {
    #[default]
    Image,
    Color,
}

impl ContentMode {
    pub fn parse(s: &str) -> Option<ContentMode> {
        match s.trim().to_lowercase().as_str() {
            "image" => Some(ContentMode::Image),
            "color" | "colour" => Some(ContentMode::Color),
            _ => None,
        }
    }
}

/// How an image crop fills its cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ImageFit {
    /// Stretch the crop to the cell.
    #[default]
    Fill,
    /// Crop the source further so it keeps the cell's aspect.
    Cover,
}

impl ImageFit {
    pub fn parse(s: &str) -> Option<ImageFit> {
        match s.trim().to_lowercase().as_str() {
            "fill" => Some(ImageFit::Fill),
            "cover" => Some(ImageFit::Cover),
            _ => None,
        }
    }
}

/// Per-cell visual controls shared by all layout modes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StyleParams {
    cell_size: f32,
    cell_spread: f32,
    cell_tumble: f32,
    cell_border_radius: f32,
    canvas_scale: f32,
    pub content_mode: ContentMode,
}

impl Default for StyleParams {
    fn default() -> Self {
        Self {
            cell_size: 0.0,
            cell_spread: 0.0,
            cell_tumble: 0.0,
            cell_border_radius: 0.0,
            canvas_scale: 100.0,
            content_mode: ContentMode::Image,
        }
    }
}

impl StyleParams {
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }
    pub fn cell_spread(&self) -> f32 {
        self.cell_spread
    }
    pub fn cell_tumble(&self) -> f32 {
        self.cell_tumble
    }
    pub fn cell_border_radius(&self) -> f32 {
        self.cell_border_radius
    }
    pub fn canvas_scale(&self) -> f32 {
        self.canvas_scale
    }

    pub fn set_cell_size(&mut self, v: f32) {
        self.cell_size = clamp_to(v, &CELL_SIZE_RANGE);
    }
    pub fn set_cell_spread(&mut self, v: f32) {
        self.cell_spread = clamp_to(v, &CELL_SPREAD_RANGE);
    }
    pub fn set_cell_tumble(&mut self, v: f32) {
        self.cell_tumble = clamp_to(v, &CELL_TUMBLE_RANGE);
    }
    pub fn set_cell_border_radius(&mut self, v: f32) {
        self.cell_border_radius = clamp_to(v, &CELL_RADIUS_RANGE);
    }
    pub fn set_canvas_scale(&mut self, v: f32) {
        self.canvas_scale = clamp_to(v, &CANVAS_SCALE_RANGE);
    }

    /// `1 + cell_size / 100`
    pub fn scale_factor(&self) -> f32 {
        1.0 + self.cell_size / 100.0
    }

    /// `cell_spread / 100`
    pub fn spread_factor(&self) -> f32 {
        self.cell_spread / 100.0
    }

    /// Rotation (degrees) of a cell with the given factor in [-1, 1].
    pub fn tumble_degrees(&self, rotation_factor: f32) -> f32 {
        rotation_factor * (self.cell_tumble / 100.0) * MAX_TUMBLE_DEG
    }

    /// `canvas_scale / 100`
    pub fn content_scale(&self) -> f32 {
        self.canvas_scale / 100.0
    }
}

// ============================================================================
// CANVAS FRAME
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum CanvasRatio {
    /// Follow the source image's aspect.
    #[default]
    Original,
    /// Fixed `W:H`, both positive.
    Ratio(f32, f32),
}

impl CanvasRatio {
    /// `original`, `W:H` or `WxH`.
    pub fn parse(s: &str) -> Option<CanvasRatio> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("original") {
            return Some(CanvasRatio::Original);
        }
        let (w, h) = s.split_once(':').or_else(|| s.split_once('x'))?;
        let w: f32 = w.trim().parse().ok()?;
        let h: f32 = h.trim().parse().ok()?;
        if w > 0.0 && h > 0.0 && w.is_finite() && h.is_finite() {
            Some(CanvasRatio::Ratio(w, h))
        } else {
            None
        }
    }

    /// Width / height, using `image_aspect` for `Original`.
    pub fn aspect(&self, image_aspect: f32) -> f32 {
        match *self {
            CanvasRatio::Original => image_aspect,
            CanvasRatio::Ratio(w, h) => w / h,
        }
    }
}

impl fmt::Display for CanvasRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanvasRatio::Original => write!(f, "original"),
            CanvasRatio::Ratio(w, h) => write!(f, "{}:{}", w, h),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Background {
    #[default]
    Transparent,
    Solid([u8; 3]),
    /// Cover-fit image: the dedicated background image, else the source image.
    Image,
}

impl Background {
    /// `transparent`, `image` or a `#rrggbb` color.
    pub fn parse(s: &str) -> Option<Background> {
        match s.trim().to_lowercase().as_str() {
            "transparent" | "none" => Some(Background::Transparent),
            "image" => Some(Background::Image),
            other => parse_hex(other).map(Background::Solid),
        }
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Background::Transparent => write!(f, "transparent"),
            Background::Image => write!(f, "image"),
            Background::Solid([r, g, b]) => write!(f, "#{:02x}{:02x}{:02x}", r, g, b),
        }
    }
}

/// Output frame: aspect, background and export resolution multiplier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasFrame {
    pub ratio: CanvasRatio,
    pub background: Background,
    export_scale: f32,
}

impl Default for CanvasFrame {
    fn default() -> Self {
        Self {
            ratio: CanvasRatio::Original,
            background: Background::Transparent,
            export_scale: 1.0,
        }
    }
}

impl CanvasFrame {
    pub fn export_scale(&self) -> f32 {
        self.export_scale
    }

    /// Values outside `(0, MAX_EXPORT_SCALE]` are ignored.
    pub fn set_export_scale(&mut self, v: f32) {
        if v > 0.0 && v <= MAX_EXPORT_SCALE {
            self.export_scale = v;
        }
    }
}

// ============================================================================
// INLINE NUMERIC EDIT
// ============================================================================

/// How long the error flag of a rejected inline edit stays raised.
pub const INLINE_ERROR_HOLD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum ValueError {
    NotANumber(String),
    OutOfRange { value: f32, min: f32, max: f32 },
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueError::NotANumber(s) => write!(f, "'{}' is not a number", s),
            ValueError::OutOfRange { value, min, max } => {
                write!(f, "{} is outside {}..{}", value, min, max)
            }
        }
    }
}

impl std::error::Error for ValueError {}

/// Parse typed text as a number inside `range`.  A trailing `%` is allowed.
pub fn parse_inline_value(text: &str, range: &RangeInclusive<f32>) -> Result<f32, ValueError> {
    let trimmed = text.trim().trim_end_matches('%').trim();
    let value: f32 = trimmed
        .parse()
        .map_err(|_| ValueError::NotANumber(text.trim().to_string()))?;
    if !value.is_finite() {
        return Err(ValueError::NotANumber(text.trim().to_string()));
    }
    if !range.contains(&value) {
        return Err(ValueError::OutOfRange {
            value,
            min: *range.start(),
            max: *range.end(),
        });
    }
    Ok(value)
}

/// Text buffer behind a click-to-type numeric readout.
///
/// A rejected commit leaves the bound value untouched, reverts the text and
/// raises an error flag that lowers itself after [`INLINE_ERROR_HOLD`].
#[derive(Clone, Debug, Default)]
pub struct InlineEdit {
    pub text: String,
    error_at: Option<Instant>,
}

impl InlineEdit {
    /// Start editing with the current value shown.
    pub fn begin(&mut self, current: f32) {
        self.text = format_value(current);
    }

    /// Returns the accepted value, or `None` after reverting to `current`.
    pub fn commit(&mut self, current: f32, range: &RangeInclusive<f32>, now: Instant) -> Option<f32> {
        match parse_inline_value(&self.text, range) {
            Ok(v) => {
                self.error_at = None;
                self.text = format_value(v);
                Some(v)
            }
            Err(e) => {
                crate::log_info!("Inline edit rejected: {}", e);
                self.error_at = Some(now);
                self.text = format_value(current);
                None
            }
        }
    }

    pub fn has_error(&self, now: Instant) -> bool {
        self.error_at
            .is_some_and(|t| now.saturating_duration_since(t) < INLINE_ERROR_HOLD)
    }

    /// Time left until the error flag clears, for scheduling a repaint.
    pub fn error_remaining(&self, now: Instant) -> Option<Duration> {
        let t = self.error_at?;
        INLINE_ERROR_HOLD.checked_sub(now.saturating_duration_since(t)).filter(|d| !d.is_zero())
    }
}

fn format_value(v: f32) -> String {
    if v.fract() == 0.0 { format!("{}", v as i64) } else { format!("{:.1}", v) }
}
