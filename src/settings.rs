// ============================================================================
// SETTINGS: key=value editor defaults and CLI presets
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};

use crate::geometry::LayoutMode;
use crate::geometry::freestyle::{CHAOS_RANGE, SCATTER_ZOOM_RANGE};
use crate::params::{Background, CanvasRatio, ContentMode, ImageFit, StyleParams};

pub const CELL_COUNT_MIN: usize = 1;
pub const CELL_COUNT_MAX: usize = 400;
const SETTINGS_FILE: &str = "settings.txt";

#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    InvalidValue { key: String, value: String },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "I/O error: {}", e),
            SettingsError::InvalidValue { key, value } => {
                write!(f, "invalid value '{}' for '{}'", value, key)
            }
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<std::io::Error> for SettingsError {
    fn from(e: std::io::Error) -> Self {
        SettingsError::Io(e)
    }
}

/// Starting values for a fresh editor session.  The same text format doubles
/// as the CLI preset format.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub mode: LayoutMode,
    pub cell_count: usize,
    pub content_mode: ContentMode,
    pub chaos: f32,
    pub scatter_zoom: f32,
    pub image_fit: ImageFit,
    pub style: StyleParams,
    pub ratio: CanvasRatio,
    pub background: Background,
    /// Color used when switching the background to "solid".
    pub background_color: [u8; 3],
    pub export_scale: f32,
    /// Fixed RNG seed; `None` seeds from the clock.
    pub seed: Option<u64>,
    /// Directory the open dialog starts in.
    pub last_dir: Option<PathBuf>,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            mode: LayoutMode::Grid,
            cell_count: 16,
            content_mode: ContentMode::Image,
            chaos: 10.0,
            scatter_zoom: 100.0,
            image_fit: ImageFit::Fill,
            style: StyleParams::default(),
            ratio: CanvasRatio::Original,
            background: Background::Transparent,
            background_color: [255, 255, 255],
            export_scale: 1.0,
            seed: None,
            last_dir: None,
        }
    }
}

fn invalid(key: &str, value: &str) -> SettingsError {
    SettingsError::InvalidValue { key: key.to_string(), value: value.to_string() }
}

fn parse_f32(key: &str, val: &str) -> Result<f32, SettingsError> {
    val.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(key, val))
}

impl EditorSettings {
    /// `<data dir>/Osmosis/settings.txt`
    pub fn settings_path() -> PathBuf {
        crate::logger::app_dir().join(SETTINGS_FILE)
    }

    /// Apply one `key=value` pair.  Unknown keys are ignored; a bad value
    /// leaves the field as it was.
    pub fn apply(&mut self, key: &str, val: &str) -> Result<(), SettingsError> {
        match key {
            "mode" => self.mode = LayoutMode::parse(val).ok_or_else(|| invalid(key, val))?,
            "cell_count" | "cells" => {
                let n: usize = val.parse().map_err(|_| invalid(key, val))?;
                self.cell_count = n.clamp(CELL_COUNT_MIN, CELL_COUNT_MAX);
            }
            "content" | "content_mode" => {
                self.content_mode = ContentMode::parse(val).ok_or_else(|| invalid(key, val))?
            }
            "chaos" => {
                self.chaos = parse_f32(key, val)?.clamp(*CHAOS_RANGE.start(), *CHAOS_RANGE.end())
            }
            "scatter_zoom" | "zoom" => {
                self.scatter_zoom = parse_f32(key, val)?
                    .clamp(*SCATTER_ZOOM_RANGE.start(), *SCATTER_ZOOM_RANGE.end())
            }
            "image_fit" | "fit" => self.image_fit = ImageFit::parse(val).ok_or_else(|| invalid(key, val))?,
            "cell_size" | "size" => self.style.set_cell_size(parse_f32(key, val)?),
            "cell_spread" | "spread" => self.style.set_cell_spread(parse_f32(key, val)?),
            "cell_tumble" | "tumble" => self.style.set_cell_tumble(parse_f32(key, val)?),
            "cell_border_radius" | "radius" => self.style.set_cell_border_radius(parse_f32(key, val)?),
            "canvas_scale" => self.style.set_canvas_scale(parse_f32(key, val)?),
            "canvas_ratio" | "ratio" => self.ratio = CanvasRatio::parse(val).ok_or_else(|| invalid(key, val))?,
            "background" => {
                let bg = Background::parse(val).ok_or_else(|| invalid(key, val))?;
                if let Background::Solid(rgb) = bg {
                    self.background_color = rgb;
                }
                self.background = bg;
            }
            "background_color" => {
                self.background_color = crate::color::parse_hex(val).ok_or_else(|| invalid(key, val))?
            }
            "export_scale" => {
                let v = parse_f32(key, val)?;
                if v <= 0.0 || v > crate::params::MAX_EXPORT_SCALE {
                    return Err(invalid(key, val));
                }
                self.export_scale = v;
            }
            "seed" => {
                self.seed = if val.is_empty() || val == "none" {
                    None
                } else {
                    Some(val.parse().map_err(|_| invalid(key, val))?)
                }
            }
            "last_dir" => self.last_dir = if val.is_empty() { None } else { Some(PathBuf::from(val)) },
            _ => {}
        }
        Ok(())
    }

    /// Overlay every `key=value` line of `content` onto `self`.  Blank lines and
    /// `#` comments are skipped.  Returns the rejected lines.
    pub fn apply_str(&mut self, content: &str) -> Vec<SettingsError> {
        let mut errors = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            if let Err(e) = self.apply(key.trim(), val.trim()) {
                errors.push(e);
            }
        }
        errors
    }

    /// Defaults overlaid with `content`.
    pub fn parse_str(content: &str) -> (Self, Vec<SettingsError>) {
        let mut s = Self::default();
        let errors = s.apply_str(content);
        (s, errors)
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let (s, errors) = Self::parse_str(&content);
        for e in &errors {
            crate::log_warn!("{}: {}", path.display(), e);
        }
        Ok(s)
    }

    /// Load from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let path = Self::settings_path();
        match Self::load_from(&path) {
            Ok(s) => s,
            Err(SettingsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                crate::log_warn!("Settings load failed ({}), using defaults", e);
                Self::default()
            }
        }
    }

    pub fn to_config_string(&self) -> String {
        let content_str = match self.content_mode {
            ContentMode::Image => "image",
            ContentMode::Color => "color",
        };
        let fit_str = match self.image_fit {
            ImageFit::Fill => "fill",
            ImageFit::Cover => "cover",
        };
        let [r, g, b] = self.background_color;
        format!(
            "mode={}\n\
             cell_count={}\n\
             content_mode={content_str}\n\
             chaos={}\n\
             scatter_zoom={}\n\
             image_fit={fit_str}\n\
             cell_size={}\n\
             cell_spread={}\n\
             cell_tumble={}\n\
             cell_border_radius={}\n\
             canvas_scale={}\n\
             canvas_ratio={}\n\
             background={}\n\
             background_color=#{:02x}{:02x}{:02x}\n\
             export_scale={}\n\
             seed={}\n\
             last_dir={}\n",
            self.mode.label().to_lowercase(),
            self.cell_count,
            self.chaos,
            self.scatter_zoom,
            self.style.cell_size(),
            self.style.cell_spread(),
            self.style.cell_tumble(),
            self.style.cell_border_radius(),
            self.style.canvas_scale(),
            self.ratio,
            self.background,
            r,
            g,
            b,
            self.export_scale,
            self.seed.map(|s| s.to_string()).unwrap_or_default(),
            self.last_dir.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
        )
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    /// Save settings to disk
    pub fn save(&self) {
        if let Err(e) = self.save_to(&Self::settings_path()) {
            crate::log_warn!("Settings save failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fresh_editor() {
        let s = EditorSettings::default();
        assert_eq!(s.cell_count, 16);
        assert_eq!(s.chaos, 10.0);
        assert_eq!(s.mode, LayoutMode::Grid);
        assert_eq!(s.style.canvas_scale(), 100.0);
    }

    #[test]
    fn export_scale_is_capped() {
        let mut s = EditorSettings::default();
        assert!(s.apply("export_scale", "1000").is_err());
        assert!(s.apply("export_scale", "0").is_err());
        assert_eq!(s.export_scale, 1.0);
        s.apply("export_scale", "8").unwrap();
        assert_eq!(s.export_scale, 8.0);
    }

    #[test]
    fn preset_overrides_and_clamps() {
        let (s, errors) = EditorSettings::parse_str(
            "# scatter preset\n\
             mode=scatter\n\
             cells=900\n\
             chaos=250\n\
             spread=-50\n\
             radius=100\n\
             ratio=1:1\n\
             background=#102030\n\
             export_scale=2\n\
             seed=42\n\
             unknown_key=whatever\n",
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(s.mode, LayoutMode::Scatter);
        assert_eq!(s.cell_count, CELL_COUNT_MAX);
        assert_eq!(s.chaos, 100.0);
        assert_eq!(s.style.cell_spread(), -50.0);
        assert_eq!(s.style.cell_border_radius(), 100.0);
        assert_eq!(s.ratio, CanvasRatio::Ratio(1.0, 1.0));
        assert_eq!(s.background, Background::Solid([0x10, 0x20, 0x30]));
        assert_eq!(s.background_color, [0x10, 0x20, 0x30]);
        assert_eq!(s.export_scale, 2.0);
        assert_eq!(s.seed, Some(42));
    }

    #[test]
    fn bad_values_keep_defaults_and_are_reported() {
        let (s, errors) = EditorSettings::parse_str("chaos=lots\nmode=spiral\nexport_scale=-1\ncell_count=9\n");
        assert_eq!(errors.len(), 3);
        assert_eq!(s.chaos, 10.0);
        assert_eq!(s.mode, LayoutMode::Grid);
        assert_eq!(s.export_scale, 1.0);
        assert_eq!(s.cell_count, 9);
    }

    #[test]
    fn config_string_round_trips() {
        let (mut s, _) = EditorSettings::parse_str("mode=palette\ntumble=35\nfit=cover\nbackground=image\n");
        s.last_dir = Some(PathBuf::from("/tmp/pics"));
        let (back, errors) = EditorSettings::parse_str(&s.to_config_string());
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(back, s);
    }
}
