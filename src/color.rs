// ============================================================================
// COLOR EXTRACTION: ranked palette and per-cell average colors
// ============================================================================

use std::collections::HashMap;
use std::fmt;

use image::RgbaImage;
use image::imageops::{self, FilterType};
use rayon::prelude::*;

/// Longest side of the sampling buffer used for the global palette.
pub const PALETTE_SAMPLE_MAX: f32 = 50.0;
/// Every n-th pixel is read when building the palette.
pub const PALETTE_STRIDE: usize = 8;
/// Every n-th pixel is read when averaging a cell.
pub const CELL_STRIDE: usize = 4;
/// Pixels below this alpha are ignored.
pub const ALPHA_VISIBLE: u8 = 128;
/// Channel quantization step.
pub const QUANT_STEP: f32 = 40.0;
/// Number of palette colors offered as background swatches.
pub const SWATCH_COUNT: usize = 8;

const MID_GRAY: [u8; 3] = [128, 128, 128];

/// A swatch as extracted (`Rgb`) or generated by the hue fallback (`Hsl`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PaletteColor {
    Rgb([u8; 3]),
    /// Hue in degrees, saturation and lightness in percent.
    Hsl { h: f32, s: f32, l: f32 },
}

impl PaletteColor {
    pub fn to_rgb(&self) -> [u8; 3] {
        match *self {
            PaletteColor::Rgb(rgb) => rgb,
            PaletteColor::Hsl { h, s, l } => hsl_to_rgb(h, s, l),
        }
    }

    /// `#rrggbb`
    pub fn to_hex(&self) -> String {
        let [r, g, b] = self.to_rgb();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

impl fmt::Display for PaletteColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaletteColor::Rgb([r, g, b]) => write!(f, "rgb({}, {}, {})", r, g, b),
            PaletteColor::Hsl { h, s, l } => write!(f, "hsl({}, {}%, {}%)", h, s, l),
        }
    }
}

/// Standard HSL → RGB conversion (h in degrees, s/l in percent).
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [u8; 3] {
    let h = (h / 360.0).rem_euclid(1.0);
    let s = (s / 100.0).clamp(0.0, 1.0);
    let l = (l / 100.0).clamp(0.0, 1.0);

    let (r, g, b) = if s == 0.0 {
        (l, l, l)
    } else {
        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        (
            hue_to_rgb(p, q, h + 1.0 / 3.0),
            hue_to_rgb(p, q, h),
            hue_to_rgb(p, q, h - 1.0 / 3.0),
        )
    };
    [
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    ]
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 0.5 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

/// Parse `#rrggbb` (the leading `#` is optional).
pub fn parse_hex(s: &str) -> Option<[u8; 3]> {
    let s = s.trim().trim_start_matches('#');
    if s.len() != 6 || !s.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&s[0..2], 16).ok()?;
    let g = u8::from_str_radix(&s[2..4], 16).ok()?;
    let b = u8::from_str_radix(&s[4..6], 16).ok()?;
    Some([r, g, b])
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractError {
    EmptyImage,
    DegenerateCell { row: usize, col: usize },
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::EmptyImage => write!(f, "image has no pixels"),
            ExtractError::DegenerateCell { row, col } => {
                write!(f, "cell ({}, {}) covers no source pixels", row, col)
            }
        }
    }
}

impl std::error::Error for ExtractError {}

// ============================================================================
// PALETTE
// ============================================================================

/// `count` evenly spaced hues at 70 % saturation, 60 % lightness.
pub fn fallback_hues(count: usize) -> Vec<PaletteColor> {
    (0..count)
        .map(|i| PaletteColor::Hsl {
            h: (i as f32 * 360.0 / count as f32) % 360.0,
            s: 70.0,
            l: 60.0,
        })
        .collect()
}

fn quantize(c: u8) -> u8 {
    ((c as f32 / QUANT_STEP).round() * QUANT_STEP) as u8
}

/// Ranked quantized colors of `image`, at most `count` of them.
///
/// The image is resampled so its longer side is 50 px, then every 8th pixel is
/// bucketed.  Ties keep first-seen order.
pub fn try_extract_palette(image: &RgbaImage, count: usize) -> Result<Vec<PaletteColor>, ExtractError> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(ExtractError::EmptyImage);
    }
    let scale = (PALETTE_SAMPLE_MAX / w as f32).min(PALETTE_SAMPLE_MAX / h as f32);
    let sw = ((w as f32 * scale).floor() as u32).max(1);
    let sh = ((h as f32 * scale).floor() as u32).max(1);
    let sample = imageops::resize(image, sw, sh, FilterType::Triangle);

    let mut counts: HashMap<[u8; 3], usize> = HashMap::new();
    let mut order: Vec<[u8; 3]> = Vec::new();
    for px in sample.pixels().step_by(PALETTE_STRIDE) {
        let [r, g, b, a] = px.0;
        if a < ALPHA_VISIBLE {
            continue;
        }
        let key = [quantize(r), quantize(g), quantize(b)];
        let n = counts.entry(key).or_insert(0);
        if *n == 0 {
            order.push(key);
        }
        *n += 1;
    }

    // `sort_by` is stable, so equal counts stay in first-seen order.
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    Ok(order.into_iter().take(count).map(PaletteColor::Rgb).collect())
}

/// Always `count` swatches: extracted colors first, padded with fallback hues.
/// Extraction failure yields the fallback hues alone.
pub fn extract_palette(image: &RgbaImage, count: usize) -> Vec<PaletteColor> {
    match try_extract_palette(image, count) {
        Ok(mut colors) => {
            if colors.len() < count {
                let missing = count - colors.len();
                crate::log_info!(
                    "Palette: {} distinct buckets, padding {} with fallback hues",
                    colors.len(),
                    missing
                );
                colors.extend(fallback_hues(count).into_iter().skip(colors.len()));
            }
            colors
        }
        Err(e) => {
            crate::log_warn!("Palette extraction failed ({}), using fallback hues", e);
            fallback_hues(count)
        }
    }
}

/// Hex strings of the first eight palette colors.
pub fn background_swatches(palette: &[PaletteColor]) -> Vec<String> {
    palette.iter().take(SWATCH_COUNT).map(|c| c.to_hex()).collect()
}

// ============================================================================
// PER-CELL AVERAGES
// ============================================================================

/// Average visible color of every cell of a `cols × rows` partition, row-major.
pub fn try_cell_average_colors(
    image: &RgbaImage,
    cols: usize,
    rows: usize,
) -> Result<Vec<PaletteColor>, ExtractError> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || cols == 0 || rows == 0 {
        return Err(ExtractError::EmptyImage);
    }
    let cw = w as f32 / cols as f32;
    let ch = h as f32 / rows as f32;
    let sw = cw.floor() as u32;
    let sh = ch.floor() as u32;
    if sw == 0 || sh == 0 {
        return Err(ExtractError::DegenerateCell { row: 0, col: 0 });
    }

    (0..cols * rows)
        .into_par_iter()
        .map(|i| {
            let row = i / cols;
            let col = i % cols;
            let sx = (col as f32 * cw).floor() as u32;
            let sy = (row as f32 * ch).floor() as u32;
            if sx >= w || sy >= h {
                return Err(ExtractError::DegenerateCell { row, col });
            }
            Ok(PaletteColor::Rgb(average_rect(image, sx, sy, sw.min(w - sx), sh.min(h - sy))))
        })
        .collect()
}

fn average_rect(image: &RgbaImage, sx: u32, sy: u32, sw: u32, sh: u32) -> [u8; 3] {
    let total = sw as usize * sh as usize;
    let (mut r, mut g, mut b, mut n) = (0u64, 0u64, 0u64, 0u64);
    for k in (0..total).step_by(CELL_STRIDE) {
        let x = sx + (k % sw as usize) as u32;
        let y = sy + (k / sw as usize) as u32;
        let [pr, pg, pb, pa] = image.get_pixel(x, y).0;
        if pa < ALPHA_VISIBLE {
            continue;
        }
        r += pr as u64;
        g += pg as u64;
        b += pb as u64;
        n += 1;
    }
    if n == 0 {
        return MID_GRAY;
    }
    let avg = |c: u64| (c as f64 / n as f64).round() as u8;
    [avg(r), avg(g), avg(b)]
}

/// Like [`try_cell_average_colors`], falling back to evenly spaced hues.
pub fn cell_average_colors(image: &RgbaImage, cols: usize, rows: usize) -> Vec<PaletteColor> {
    match try_cell_average_colors(image, cols, rows) {
        Ok(colors) => colors,
        Err(e) => {
            crate::log_warn!("Cell color extraction failed ({}), using fallback hues", e);
            fallback_hues(cols * rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn two_tone(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, _| {
            if x < w / 2 { Rgba([250, 10, 10, 255]) } else { Rgba([10, 10, 250, 255]) }
        })
    }

    #[test]
    fn hex_formatting_for_rgb_and_hsl() {
        assert_eq!(PaletteColor::Rgb([255, 0, 128]).to_hex(), "#ff0080");
        assert_eq!(PaletteColor::Hsl { h: 0.0, s: 100.0, l: 50.0 }.to_hex(), "#ff0000");
        assert_eq!(PaletteColor::Hsl { h: 120.0, s: 0.0, l: 50.0 }.to_rgb(), [128, 128, 128]);
        assert_eq!(PaletteColor::Rgb([1, 2, 3]).to_string(), "rgb(1, 2, 3)");
    }

    #[test]
    fn parse_hex_accepts_with_and_without_hash() {
        assert_eq!(parse_hex("#10ff20"), Some([0x10, 0xff, 0x20]));
        assert_eq!(parse_hex("10FF20"), Some([0x10, 0xff, 0x20]));
        assert_eq!(parse_hex("#fff"), None);
    }

    #[test]
    fn quantization_merges_nearby_values() {
        assert_eq!(quantize(0), 0);
        assert_eq!(quantize(19), 0);
        assert_eq!(quantize(21), 40);
        assert_eq!(quantize(255), 240);
    }

    #[test]
    fn palette_is_padded_to_requested_count() {
        let p = extract_palette(&two_tone(100, 100), 6);
        assert_eq!(p.len(), 6);
        assert!(matches!(p[0], PaletteColor::Rgb(_)));
        assert!(matches!(p[5], PaletteColor::Hsl { .. }));
    }

    #[test]
    fn palette_ranks_dominant_color_first() {
        let img = RgbaImage::from_fn(100, 100, |x, _| {
            if x < 80 { Rgba([0, 200, 0, 255]) } else { Rgba([200, 0, 0, 255]) }
        });
        let p = try_extract_palette(&img, 2).unwrap();
        assert_eq!(p[0], PaletteColor::Rgb([0, 200, 0]));
    }

    #[test]
    fn transparent_image_falls_back_to_hues() {
        let img = RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 0]));
        assert!(try_extract_palette(&img, 4).unwrap().is_empty());
        assert_eq!(extract_palette(&img, 4), fallback_hues(4));
    }

    #[test]
    fn empty_image_is_an_error() {
        let img = RgbaImage::new(0, 0);
        assert_eq!(try_extract_palette(&img, 3), Err(ExtractError::EmptyImage));
        assert_eq!(extract_palette(&img, 3).len(), 3);
    }

    #[test]
    fn cell_averages_follow_partition() {
        let c = try_cell_average_colors(&two_tone(80, 40), 2, 1).unwrap();
        assert_eq!(c, vec![PaletteColor::Rgb([250, 10, 10]), PaletteColor::Rgb([10, 10, 250])]);
    }

    #[test]
    fn invisible_cell_is_mid_gray() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 10]));
        let c = try_cell_average_colors(&img, 2, 2).unwrap();
        assert!(c.iter().all(|c| *c == PaletteColor::Rgb(MID_GRAY)));
    }

    #[test]
    fn degenerate_partition_uses_fallback() {
        let img = two_tone(3, 3);
        assert!(try_cell_average_colors(&img, 4, 4).is_err());
        assert_eq!(cell_average_colors(&img, 4, 4).len(), 16);
    }

    #[test]
    fn swatches_are_capped_at_eight() {
        let s = background_swatches(&fallback_hues(12));
        assert_eq!(s.len(), 8);
        assert!(s.iter().all(|h| h.starts_with('#') && h.len() == 7));
    }
}
