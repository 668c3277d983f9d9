// ============================================================================
// RASTER: CPU drawing of resolved cells into RGBA buffers
// ============================================================================
//
// Everything here is inverse-mapped: each destination pixel center is taken
// back into the cell's local frame (or the source image) and sampled.  Rows
// are processed in parallel with rayon.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::geometry::{CellRect, cover_rect};
use crate::scene::CellFill;
use crate::transform::{ResolvedCell, coverage, rounded_rect_sdf};

/// Bilinear sample with coordinates clamped into `clip` (pixel rect of `img`).
/// Returns straight (non-premultiplied) RGBA as floats.
pub fn sample_clamped(img: &RgbaImage, x: f32, y: f32, clip: CellRect) -> [f32; 4] {
    let max_x = (img.width() as f32 - 1.0).max(0.0);
    let max_y = (img.height() as f32 - 1.0).max(0.0);
    let lo_x = clip.x.clamp(0.0, max_x);
    let lo_y = clip.y.clamp(0.0, max_y);
    let hi_x = (clip.right() - 1.0).clamp(lo_x, max_x);
    let hi_y = (clip.bottom() - 1.0).clamp(lo_y, max_y);
    let x = x.clamp(lo_x, hi_x);
    let y = y.clamp(lo_y, hi_y);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(hi_x.ceil() as u32);
    let y1 = (y0 + 1).min(hi_y.ceil() as u32);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let px = |sx: u32, sy: u32| -> [f32; 4] {
        let p = img.get_pixel(sx, sy);
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    };
    let tl = px(x0, y0);
    let tr = px(x1, y0);
    let bl = px(x0, y1);
    let br = px(x1, y1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0.0; 4];
    for c in 0..4 {
        out[c] = lerp(lerp(tl[c], tr[c], fx), lerp(bl[c], br[c], fx), fy);
    }
    out
}

/// Bilinear sample, transparent outside the image.
fn sample_or_clear(img: &RgbaImage, x: f32, y: f32) -> [f32; 4] {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let px = |sx: i64, sy: i64| -> [f32; 4] {
        if sx < 0 || sy < 0 || sx >= img.width() as i64 || sy >= img.height() as i64 {
            [0.0; 4]
        } else {
            let p = img.get_pixel(sx as u32, sy as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
        }
    };
    let tl = px(x0, y0);
    let tr = px(x0 + 1, y0);
    let bl = px(x0, y0 + 1);
    let br = px(x0 + 1, y0 + 1);
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0.0; 4];
    for c in 0..4 {
        out[c] = lerp(lerp(tl[c], tr[c], fx), lerp(bl[c], br[c], fx), fy);
    }
    out
}

/// Straight-alpha source-over of `src` (alpha pre-multiplied by `cov`) onto `dst`.
#[inline]
pub fn blend_over(dst: &mut [u8], src: [f32; 4], cov: f32) {
    let sa = (src[3] / 255.0) * cov;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let v = (src[c] * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Row range `[y0, y1)` and column range `[x0, x1)` of `rect` inside a canvas.
fn clip_span(rect: CellRect, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x0 = rect.x.floor().max(0.0) as u32;
    let y0 = rect.y.floor().max(0.0) as u32;
    let x1 = (rect.right().ceil().max(0.0) as u32).min(width);
    let y1 = (rect.bottom().ceil().max(0.0) as u32).min(height);
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

/// Draw one cell: rotated rounded rectangle with anti-aliased edges, filled
/// with a crop of `source` or a flat color.
pub fn draw_cell(canvas: &mut RgbaImage, cell: &ResolvedCell, fill: &CellFill, source: Option<&RgbaImage>) {
    if !cell.is_visible() {
        return;
    }
    // One pixel of slack for the anti-aliased rim.
    let bb = cell.bounding_box();
    let bb = CellRect::new(bb.x - 1.0, bb.y - 1.0, bb.width + 2.0, bb.height + 2.0);
    let Some((x0, y0, x1, y1)) = clip_span(bb, canvas.width(), canvas.height()) else { return };

    let crop = match (fill, source) {
        (CellFill::Crop { source: rect, .. }, Some(img)) => Some((img, *rect)),
        (CellFill::Crop { .. }, None) => return,
        (CellFill::Solid(_), _) => None,
    };
    let solid = match fill {
        CellFill::Solid([r, g, b]) => [*r as f32, *g as f32, *b as f32, 255.0],
        CellFill::Crop { .. } => [0.0; 4],
    };

    let hw = cell.width * 0.5;
    let hh = cell.height * 0.5;
    let row_bytes = canvas.width() as usize * 4;
    let start = y0 as usize * row_bytes;
    let end = y1 as usize * row_bytes;
    let raw: &mut [u8] = canvas.as_mut();

    raw[start..end].par_chunks_mut(row_bytes).enumerate().for_each(|(i, row)| {
        let py = (y0 as usize + i) as f32 + 0.5;
        for x in x0..x1 {
            let local = cell.to_local((x as f32 + 0.5, py));
            let cov = coverage(rounded_rect_sdf(local, hw, hh, cell.radius));
            if cov <= 0.0 {
                continue;
            }
            let color = match crop {
                Some((img, rect)) => {
                    let u = (local.0 / cell.width + 0.5).clamp(0.0, 1.0);
                    let v = (local.1 / cell.height + 0.5).clamp(0.0, 1.0);
                    let sx = rect.x + u * rect.width - 0.5;
                    let sy = rect.y + v * rect.height - 0.5;
                    sample_clamped(img, sx, sy, rect)
                }
                None => solid,
            };
            let idx = x as usize * 4;
            blend_over(&mut row[idx..idx + 4], color, cov);
        }
    });
}

pub fn fill_solid(canvas: &mut RgbaImage, rgb: [u8; 3]) {
    let px = Rgba([rgb[0], rgb[1], rgb[2], 255]);
    canvas.pixels_mut().for_each(|p| *p = px);
}

/// Draw `img` cover-fit and centered over the whole canvas.
pub fn paint_cover(canvas: &mut RgbaImage, img: &RgbaImage) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let (cw, ch) = (canvas.width() as f32, canvas.height() as f32);
    let dest = cover_rect(cw, ch, img.width() as f32 / img.height() as f32);
    let sx = img.width() as f32 / dest.width;
    let sy = img.height() as f32 / dest.height;
    let full = CellRect::new(0.0, 0.0, img.width() as f32, img.height() as f32);
    let row_bytes = canvas.width() as usize * 4;

    canvas.as_mut().par_chunks_mut(row_bytes).enumerate().for_each(|(y, row)| {
        let src_y = (y as f32 + 0.5 - dest.y) * sy - 0.5;
        for x in 0..row_bytes / 4 {
            let src_x = (x as f32 + 0.5 - dest.x) * sx - 0.5;
            let c = sample_clamped(img, src_x, src_y, full);
            blend_over(&mut row[x * 4..x * 4 + 4], c, 1.0);
        }
    });
}

/// Draw `layer` over `canvas`, scaled by `scale` about the canvas center.
/// Both buffers must be the same size.
pub fn composite_scaled(canvas: &mut RgbaImage, layer: &RgbaImage, scale: f32) {
    if scale <= 0.0 || layer.dimensions() != canvas.dimensions() {
        return;
    }
    let cx = canvas.width() as f32 * 0.5;
    let cy = canvas.height() as f32 * 0.5;
    let inv = 1.0 / scale;
    let row_bytes = canvas.width() as usize * 4;
    let identity = (scale - 1.0).abs() < 1e-6;

    canvas.as_mut().par_chunks_mut(row_bytes).enumerate().for_each(|(y, row)| {
        for x in 0..row_bytes / 4 {
            let c = if identity {
                let p = layer.get_pixel(x as u32, y as u32);
                [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
            } else {
                let lx = cx + (x as f32 + 0.5 - cx) * inv - 0.5;
                let ly = cy + (y as f32 + 0.5 - cy) * inv - 0.5;
                sample_or_clear(layer, lx, ly)
            };
            blend_over(&mut row[x * 4..x * 4 + 4], c, 1.0);
        }
    });
}

/// Two-tone checkerboard, the preview's stand-in for transparency.
pub fn checkerboard(width: u32, height: u32, tile: u32) -> RgbaImage {
    let tile = tile.max(1);
    RgbaImage::from_fn(width, height, |x, y| {
        if ((x / tile) + (y / tile)) % 2 == 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([204, 204, 204, 255])
        }
    })
}
