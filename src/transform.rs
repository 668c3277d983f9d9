// ============================================================================
// TRANSFORM PIPELINE: spread → scale → rotate → radius
// ============================================================================
//
// One pure function turns a cell placement plus the global style into the
// final oriented rounded rectangle.  The preview mesh and the export raster
// both draw from `ResolvedCell`, so they can never disagree.

use crate::geometry::CellRect;
use crate::params::{ImageFit, StyleParams};

/// What a cell spreads away from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpreadReference {
    /// Aligned grid cell: displacement is its normalized index times its own extent.
    Grid { row: usize, col: usize, rows: usize, cols: usize },
    /// Freestyle cell: displacement is its distance from the layout center.
    Centroid { center: (f32, f32) },
}

/// Base geometry of one cell before styling, in frame pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellPlacement {
    pub bounds: CellRect,
    pub spread: SpreadReference,
    /// Per-cell tumble factor in [-1, 1].
    pub rotation_factor: f32,
}

/// Final oriented rectangle of a cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedCell {
    pub center: (f32, f32),
    pub width: f32,
    pub height: f32,
    /// Radians, clockwise in y-down space.
    pub rotation: f32,
    pub radius: f32,
}

/// `min(w, h) / 2 · pct / 100`
pub fn border_radius_px(width: f32, height: f32, pct: f32) -> f32 {
    width.min(height).max(0.0) * 0.5 * (pct / 100.0)
}

/// Normalized grid position in [-0.5, 0.5].
fn normalized(index: usize, count: usize) -> f32 {
    if count == 0 {
        return 0.0;
    }
    (index as f32 + 0.5) / count as f32 - 0.5
}

pub fn resolve(placement: &CellPlacement, style: &StyleParams) -> ResolvedCell {
    let b = placement.bounds;
    let (mut cx, mut cy) = b.center();
    let spread = style.spread_factor();

    if spread != 0.0 {
        match placement.spread {
            SpreadReference::Grid { row, col, rows, cols } => {
                cx += normalized(col, cols) * spread * b.width;
                cy += normalized(row, rows) * spread * b.height;
            }
            SpreadReference::Centroid { center } => {
                cx += (cx - center.0) * spread;
                cy += (cy - center.1) * spread;
            }
        }
    }

    let scale = style.scale_factor().max(0.0);
    let width = b.width * scale;
    let height = b.height * scale;

    ResolvedCell {
        center: (cx, cy),
        width,
        height,
        rotation: style.tumble_degrees(placement.rotation_factor).to_radians(),
        radius: border_radius_px(width, height, style.cell_border_radius()),
    }
}

impl ResolvedCell {
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Map a world point into the cell's unrotated frame, origin at the center.
    pub fn to_local(&self, p: (f32, f32)) -> (f32, f32) {
        let dx = p.0 - self.center.0;
        let dy = p.1 - self.center.1;
        let (s, c) = self.rotation.sin_cos();
        (dx * c + dy * s, -dx * s + dy * c)
    }

    /// Inverse of [`to_local`](Self::to_local).
    pub fn to_world(&self, l: (f32, f32)) -> (f32, f32) {
        let (s, c) = self.rotation.sin_cos();
        (
            self.center.0 + l.0 * c - l.1 * s,
            self.center.1 + l.0 * s + l.1 * c,
        )
    }

    /// Signed distance to the rounded outline (negative inside).
    pub fn signed_distance(&self, p: (f32, f32)) -> f32 {
        rounded_rect_sdf(self.to_local(p), self.width * 0.5, self.height * 0.5, self.radius)
    }

    pub fn contains(&self, p: (f32, f32)) -> bool {
        self.signed_distance(p) <= 0.0
    }

    /// Axis-aligned box around the rotated rectangle.
    pub fn bounding_box(&self) -> CellRect {
        let hw = self.width * 0.5;
        let hh = self.height * 0.5;
        let (s, c) = self.rotation.sin_cos();
        let ex = hw * c.abs() + hh * s.abs();
        let ey = hw * s.abs() + hh * c.abs();
        CellRect::new(self.center.0 - ex, self.center.1 - ey, ex * 2.0, ey * 2.0)
    }

    /// Closed outline in world space, `segments` points per rounded corner.
    /// Each point carries its normalized (0..1) position inside the unrotated rect.
    pub fn outline(&self, segments: usize) -> Vec<((f32, f32), (f32, f32))> {
        let hw = self.width * 0.5;
        let hh = self.height * 0.5;
        let r = self.radius.min(hw).min(hh);
        let local: Vec<(f32, f32)> = if r <= 0.0 || segments == 0 {
            vec![(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)]
        } else {
            // Corner centers clockwise from top-left, each sweeping 90°.
            let corners = [
                (-hw + r, -hh + r, std::f32::consts::PI),
                (hw - r, -hh + r, 1.5 * std::f32::consts::PI),
                (hw - r, hh - r, 0.0),
                (-hw + r, hh - r, 0.5 * std::f32::consts::PI),
            ];
            let mut pts = Vec::with_capacity(corners.len() * (segments + 1));
            for (ccx, ccy, start) in corners {
                for i in 0..=segments {
                    let a = start + std::f32::consts::FRAC_PI_2 * i as f32 / segments as f32;
                    pts.push((ccx + r * a.cos(), ccy + r * a.sin()));
                }
            }
            pts
        };

        local
            .into_iter()
            .map(|l| {
                let uv = (
                    if self.width > 0.0 { l.0 / self.width + 0.5 } else { 0.5 },
                    if self.height > 0.0 { l.1 / self.height + 0.5 } else { 0.5 },
                );
                (self.to_world(l), uv)
            })
            .collect()
    }
}

/// Signed distance from `p` (relative to the center) to a rounded rectangle.
pub fn rounded_rect_sdf(p: (f32, f32), half_w: f32, half_h: f32, radius: f32) -> f32 {
    let r = radius.clamp(0.0, half_w.min(half_h).max(0.0));
    let qx = p.0.abs() - half_w + r;
    let qy = p.1.abs() - half_h + r;
    let outside = (qx.max(0.0).powi(2) + qy.max(0.0).powi(2)).sqrt();
    outside + qx.max(qy).min(0.0) - r
}

/// Anti-aliased coverage (0..1) for a signed distance in pixels.
pub fn coverage(sdf: f32) -> f32 {
    (0.5 - sdf).clamp(0.0, 1.0)
}

/// Source rectangle for a crop drawn into a `dest_w × dest_h` cell.
pub fn fit_source_rect(src: CellRect, dest_w: f32, dest_h: f32, fit: ImageFit) -> CellRect {
    match fit {
        ImageFit::Fill => src,
        ImageFit::Cover => {
            if dest_w <= 0.0 || dest_h <= 0.0 || src.width <= 0.0 || src.height <= 0.0 {
                return src;
            }
            let dest_aspect = dest_w / dest_h;
            let (cx, cy) = src.center();
            if src.aspect() > dest_aspect {
                CellRect::from_center(cx, cy, src.height * dest_aspect, src.height)
            } else {
                CellRect::from_center(cx, cy, src.width, src.width / dest_aspect)
            }
        }
    }
}
