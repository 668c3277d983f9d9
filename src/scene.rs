// ============================================================================
// SCENE LAYOUT: editor state → cells placed in an output frame
// ============================================================================
//
// Plain data shared by the preview and export paths.  A frame has a size, a
// content box (the image's aspect fitted inside the frame) and the content
// scale that both renderers apply about the frame center.

use crate::editor::EditorState;
use crate::geometry::freestyle::CellSource;
use crate::geometry::{CellRect, LayoutMode, fit_aspect};
use crate::params::{CanvasRatio, ContentMode};
use crate::transform::{CellPlacement, ResolvedCell, SpreadReference, fit_source_rect, resolve};

/// Padding removed from the preview area before fitting the frame.
pub const PREVIEW_PADDING: f32 = 80.0;
/// Long side of an export at scale 1.
pub const EXPORT_BASE_PX: f32 = 2000.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneFrame {
    pub width: f32,
    pub height: f32,
    /// Image-aspect box centered in the frame.
    pub content: CellRect,
    /// `canvas_scale / 100`, applied about the frame center.
    pub content_scale: f32,
}

impl SceneFrame {
    pub fn new(width: f32, height: f32, image_aspect: f32, content_scale: f32) -> Self {
        Self {
            width,
            height,
            content: content_box(width, height, image_aspect),
            content_scale,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width * 0.5, self.height * 0.5)
    }

    /// Content-layer point → frame point.
    pub fn apply_content_scale(&self, p: (f32, f32)) -> (f32, f32) {
        let (cx, cy) = self.center();
        (cx + (p.0 - cx) * self.content_scale, cy + (p.1 - cy) * self.content_scale)
    }

    /// Frame point → content-layer point.
    pub fn remove_content_scale(&self, p: (f32, f32)) -> (f32, f32) {
        let (cx, cy) = self.center();
        let s = if self.content_scale > 0.0 { self.content_scale } else { 1.0 };
        (cx + (p.0 - cx) / s, cy + (p.1 - cy) / s)
    }

    /// A resolved cell as it appears after the content scale.
    pub fn scale_cell(&self, cell: &ResolvedCell) -> ResolvedCell {
        let s = self.content_scale;
        ResolvedCell {
            center: self.apply_content_scale(cell.center),
            width: cell.width * s,
            height: cell.height * s,
            radius: cell.radius * s,
            rotation: cell.rotation,
        }
    }
}

/// Image-aspect box fitted and centered in a `frame_w × frame_h` frame.
pub fn content_box(frame_w: f32, frame_h: f32, image_aspect: f32) -> CellRect {
    let (w, h) = fit_aspect(frame_w, frame_h, image_aspect);
    CellRect::new((frame_w - w) * 0.5, (frame_h - h) * 0.5, w, h)
}

/// On-screen frame size for a preview area of `container` pixels.
pub fn preview_frame_size(container: (f32, f32), ratio: CanvasRatio, image_aspect: f32) -> (f32, f32) {
    let avail_w = (container.0 - PREVIEW_PADDING).max(1.0);
    let avail_h = (container.1 - PREVIEW_PADDING).max(1.0);
    fit_aspect(avail_w, avail_h, ratio.aspect(image_aspect))
}

/// Export size: the longer side is `2000 × export_scale`.
pub fn export_size(ratio: CanvasRatio, export_scale: f32, image_w: u32, image_h: u32) -> (u32, u32) {
    let base = EXPORT_BASE_PX * export_scale;
    let (w, h) = match ratio {
        CanvasRatio::Original => {
            let aspect = if image_h == 0 { 1.0 } else { image_w as f32 / image_h as f32 };
            if aspect > 1.0 { (base, base / aspect) } else { (base * aspect, base) }
        }
        CanvasRatio::Ratio(rw, rh) => {
            if rw > rh { (base, base / rw * rh) } else { (base / rh * rw, base) }
        }
    };
    (w.round().max(1.0) as u32, h.round().max(1.0) as u32)
}

// ============================================================================
// CELLS
// ============================================================================

/// What a laid-out cell paints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CellFill {
    /// Part of partition crop (row, col) of a `cols × rows` split.
    Crop {
        row: usize,
        col: usize,
        cols: usize,
        rows: usize,
        /// Pixels of the source image to draw.
        source: CellRect,
        /// The same area as fractions (0..1) of the partition crop.
        uv: CellRect,
    },
    Solid([u8; 3]),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LaidOutCell {
    pub placement: CellPlacement,
    pub fill: CellFill,
    /// Index into the grid (row-major) or freestyle cell list.
    pub index: usize,
}

impl LaidOutCell {
    pub fn resolve(&self, state: &EditorState) -> ResolvedCell {
        resolve(&self.placement, &state.style)
    }
}

/// Maps freestyle layout coordinates into the frame: `p · scale + offset`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Framing {
    pub scale: f32,
    pub offset: (f32, f32),
}

impl Framing {
    pub fn identity() -> Self {
        Self { scale: 1.0, offset: (0.0, 0.0) }
    }

    pub fn to_frame(&self, p: (f32, f32)) -> (f32, f32) {
        (p.0 * self.scale + self.offset.0, p.1 * self.scale + self.offset.1)
    }

    pub fn to_layout(&self, p: (f32, f32)) -> (f32, f32) {
        let s = if self.scale > 0.0 { self.scale } else { 1.0 };
        ((p.0 - self.offset.0) / s, (p.1 - self.offset.1) / s)
    }
}

/// Fit the freestyle base bounds into `content`, centered.
pub fn freestyle_framing(state: &EditorState, content: CellRect) -> Option<Framing> {
    let bb = state.freestyle.base_bounds()?;
    if bb.width <= 0.0 || bb.height <= 0.0 {
        return None;
    }
    let scale = (content.width / bb.width).min(content.height / bb.height);
    let (cx, cy) = content.center();
    let (bx, by) = bb.center();
    Some(Framing { scale, offset: (cx - bx * scale, cy - by * scale) })
}

fn crop_fill(
    state: &EditorState,
    row: usize,
    col: usize,
    cols: usize,
    rows: usize,
    dest: CellRect,
) -> Option<CellFill> {
    let image = state.image()?;
    let cw = image.width() as f32 / cols as f32;
    let ch = image.height() as f32 / rows as f32;
    let full = CellRect::new(col as f32 * cw, row as f32 * ch, cw, ch);
    let source = fit_source_rect(full, dest.width, dest.height, state.image_fit);
    let uv = CellRect::new(
        (source.x - full.x) / cw,
        (source.y - full.y) / ch,
        source.width / cw,
        source.height / ch,
    );
    Some(CellFill::Crop { row, col, cols, rows, source, uv })
}

fn color_fill(state: &EditorState, index: usize) -> CellFill {
    let rgb = state
        .cell_colors
        .get(index)
        .map(|c| c.to_rgb())
        .unwrap_or([128, 128, 128]);
    CellFill::Solid(rgb)
}

/// Lay the active layout's cells into `content` (frame pixels).
///
/// With `snap` the grid tracks land on whole pixels.  Freestyle cells are
/// placed with `framing` (see [`freestyle_framing`]).
pub fn layout_cells(state: &EditorState, content: CellRect, snap: bool) -> Vec<LaidOutCell> {
    if !state.has_image() {
        return Vec::new();
    }
    match state.mode() {
        LayoutMode::Grid => layout_grid(state, content, snap),
        LayoutMode::Scatter | LayoutMode::Palette => match freestyle_framing(state, content) {
            Some(framing) => layout_freestyle(state, framing, content.center()),
            None => Vec::new(),
        },
    }
}

fn layout_grid(state: &EditorState, content: CellRect, snap: bool) -> Vec<LaidOutCell> {
    let grid = &state.grid;
    let n = grid.size();
    grid.cell_rects(content.width, content.height, snap)
        .into_iter()
        .enumerate()
        .filter_map(|(i, (row, col, r))| {
            let bounds = CellRect::new(r.x + content.x, r.y + content.y, r.width, r.height);
            let fill = match state.style.content_mode {
                ContentMode::Image => crop_fill(state, row, col, n, n, bounds)?,
                ContentMode::Color => color_fill(state, i),
            };
            Some(LaidOutCell {
                placement: CellPlacement {
                    bounds,
                    spread: SpreadReference::Grid { row, col, rows: n, cols: n },
                    rotation_factor: grid.rotation_factor(row, col),
                },
                fill,
                index: i,
            })
        })
        .collect()
}

/// Freestyle cells mapped through `framing`, spreading from `spread_center`.
pub fn layout_freestyle(state: &EditorState, framing: Framing, spread_center: (f32, f32)) -> Vec<LaidOutCell> {
    state
        .freestyle
        .cells
        .iter()
        .enumerate()
        .filter_map(|(i, cell)| {
            let r = cell.rect();
            let (x, y) = framing.to_frame((r.x, r.y));
            let bounds = CellRect::new(x, y, r.width * framing.scale, r.height * framing.scale);
            let fill = match cell.source {
                CellSource::Color(c) => CellFill::Solid(c.to_rgb()),
                CellSource::Image { image_row, image_col, image_cols, image_rows, .. } => {
                    match state.style.content_mode {
                        ContentMode::Image => crop_fill(state, image_row, image_col, image_cols, image_rows, bounds)?,
                        ContentMode::Color => color_fill(state, image_row * image_cols + image_col),
                    }
                }
            };
            Some(LaidOutCell {
                placement: CellPlacement {
                    bounds,
                    spread: SpreadReference::Centroid { center: spread_center },
                    rotation_factor: cell.rotation_factor(),
                },
                fill,
                index: i,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ImageSource;
    use image::{Rgba, RgbaImage};

    fn loaded(mode: LayoutMode) -> EditorState {
        let mut e = EditorState::with_seed(21);
        e.set_layout_mode(mode);
        e.load_image(ImageSource::from_rgba("t", RgbaImage::from_pixel(800, 600, Rgba([9, 9, 9, 255]))));
        e
    }

    #[test]
    fn export_sizes() {
        assert_eq!(export_size(CanvasRatio::Ratio(1.0, 1.0), 2.0, 10, 10), (4000, 4000));
        assert_eq!(export_size(CanvasRatio::Ratio(16.0, 9.0), 1.0, 10, 10), (2000, 1125));
        assert_eq!(export_size(CanvasRatio::Ratio(4.0, 5.0), 1.0, 10, 10), (1600, 2000));
        assert_eq!(export_size(CanvasRatio::Original, 1.0, 800, 600), (2000, 1500));
        assert_eq!(export_size(CanvasRatio::Original, 1.5, 600, 900), (2000, 3000));
    }

    #[test]
    fn preview_frame_respects_padding_and_ratio() {
        let (w, h) = preview_frame_size((1080.0, 680.0), CanvasRatio::Ratio(1.0, 1.0), 2.0);
        assert_eq!((w, h), (600.0, 600.0));
        let (w, h) = preview_frame_size((1080.0, 680.0), CanvasRatio::Original, 2.0);
        assert_eq!((w, h), (1000.0, 500.0));
    }

    #[test]
    fn content_box_is_centered() {
        let b = content_box(1000.0, 1000.0, 2.0);
        assert_eq!(b, CellRect::new(0.0, 250.0, 1000.0, 500.0));
    }

    #[test]
    fn grid_cells_tile_the_content_box() {
        let e = loaded(LayoutMode::Grid);
        let content = CellRect::new(10.0, 20.0, 800.0, 600.0);
        let cells = layout_cells(&e, content, true);
        assert_eq!(cells.len(), 16);
        for c in &cells {
            assert_eq!((c.placement.bounds.width, c.placement.bounds.height), (200.0, 150.0));
        }
        assert_eq!(cells[5].placement.bounds.x, 210.0);
        match cells[5].fill {
            CellFill::Crop { row, col, source, uv, .. } => {
                assert_eq!((row, col), (1, 1));
                assert_eq!(source, CellRect::new(200.0, 150.0, 200.0, 150.0));
                assert_eq!(uv, CellRect::new(0.0, 0.0, 1.0, 1.0));
            }
            CellFill::Solid(_) => panic!("expected a crop"),
        }
    }

    #[test]
    fn freestyle_framing_fits_and_centers_base_bounds() {
        let e = loaded(LayoutMode::Scatter);
        let content = CellRect::new(0.0, 0.0, 400.0, 300.0);
        let f = freestyle_framing(&e, content).unwrap();
        let bb = e.freestyle.base_bounds().unwrap();
        let mapped = bb.scaled(f.scale, f.offset);
        assert!((mapped.center().0 - 200.0).abs() < 1e-3);
        assert!((mapped.center().1 - 150.0).abs() < 1e-3);
        assert!(mapped.width <= 400.0 + 1e-3 && mapped.height <= 300.0 + 1e-3);
        let p = f.to_layout(f.to_frame((12.0, 34.0)));
        assert!((p.0 - 12.0).abs() < 1e-3 && (p.1 - 34.0).abs() < 1e-3);
    }

    #[test]
    fn palette_cells_are_solid() {
        let e = loaded(LayoutMode::Palette);
        let cells = layout_cells(&e, CellRect::new(0.0, 0.0, 500.0, 500.0), false);
        assert_eq!(cells.len(), 16);
        assert!(cells.iter().all(|c| matches!(c.fill, CellFill::Solid(_))));
    }

    #[test]
    fn no_image_no_cells() {
        let e = EditorState::with_seed(1);
        assert!(layout_cells(&e, CellRect::new(0.0, 0.0, 10.0, 10.0), false).is_empty());
    }

    #[test]
    fn content_scale_round_trip() {
        let f = SceneFrame::new(200.0, 100.0, 2.0, 0.5);
        assert_eq!(f.apply_content_scale((200.0, 100.0)), (150.0, 75.0));
        assert_eq!(f.remove_content_scale((150.0, 75.0)), (200.0, 100.0));
    }
}
