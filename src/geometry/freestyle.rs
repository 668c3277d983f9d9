// ============================================================================
// FREESTYLE CELLS: Scatter and Palette layouts
// ============================================================================
//
// Both modes lay cells on a virtual `cols × rows` grid inside the viewport and
// then let the user drag, resize and select them.  Coordinates are viewport
// pixels; the scene maps them into the output frame.

use std::ops::RangeInclusive;

use rand::Rng;

use super::{CellRect, MIN_CELL_PX, bounds_of};
use crate::color::PaletteColor;

/// Padding removed from the viewport before laying out cells (half on each side).
pub const LAYOUT_PADDING: f32 = 100.0;
/// Width and height closer than this snap to a square while resizing.
pub const SQUARE_SNAP_PX: f32 = 20.0;
/// Palette cells never start larger than this.
pub const PALETTE_MAX_CELL: f32 = 200.0;
/// Palette and "randomize" offsets, as a fraction of the cell size.
pub const POSITION_JITTER: f32 = 0.3;

pub const CHAOS_RANGE: RangeInclusive<f32> = 0.0..=100.0;
pub const SCATTER_ZOOM_RANGE: RangeInclusive<f32> = 50.0..=200.0;

/// What a freestyle cell draws.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CellSource {
    /// A crop of a `image_cols × image_rows` partition of the source image.
    Image {
        image_row: usize,
        image_col: usize,
        image_cols: usize,
        image_rows: usize,
        rotation_factor: f32,
    },
    Color(PaletteColor),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FreestyleCell {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Un-jittered anchor on the virtual grid.
    pub base_x: f32,
    pub base_y: f32,
    /// Excluded from bulk resizes until the collection is rebuilt.
    pub individually_modified: bool,
    pub source: CellSource,
}

impl FreestyleCell {
    pub fn rect(&self) -> CellRect {
        CellRect::new(self.x, self.y, self.width, self.height)
    }

    pub fn base_rect(&self) -> CellRect {
        CellRect::new(self.base_x, self.base_y, self.width, self.height)
    }

    pub fn rotation_factor(&self) -> f32 {
        match self.source {
            CellSource::Image { rotation_factor, .. } => rotation_factor,
            CellSource::Color(_) => 0.0,
        }
    }

    /// Resize keeping the current center.
    fn resize_about_center(&mut self, width: f32, height: f32) {
        let (cx, cy) = self.rect().center();
        self.width = width.max(MIN_CELL_PX);
        self.height = height.max(MIN_CELL_PX);
        self.x = cx - self.width * 0.5;
        self.y = cy - self.height * 0.5;
    }
}

/// Inputs of a Scatter re-initialization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScatterSettings {
    pub count: usize,
    /// 0..=100 %
    pub chaos: f32,
    /// Scatter zoom, 100 = fill the viewport.
    pub zoom: f32,
    /// Current `cell_size` and `cell_spread` style values; jitter grows with both.
    pub cell_size: f32,
    pub cell_spread: f32,
}

/// `cols = ceil(sqrt(n))`, `rows = ceil(n / cols)`.
pub fn virtual_grid(count: usize) -> (usize, usize) {
    if count == 0 {
        return (0, 0);
    }
    let cols = (count as f32).sqrt().ceil() as usize;
    let rows = count.div_ceil(cols);
    (cols, rows)
}

/// Jitter damping for zoomed-in layouts: `max(0.1, 1 − (zoom − 1)·0.5)` with zoom as a fraction.
pub fn offset_multiplier(zoom_pct: f32) -> f32 {
    (1.0 - (zoom_pct / 100.0 - 1.0) * 0.5).max(0.1)
}

/// Random pair swaps of source positions applied at `chaos` percent.
pub fn shuffle_count(count: usize, chaos: f32) -> usize {
    if chaos < 50.0 {
        return 0;
    }
    (count as f32 * (chaos - 50.0) / 50.0).floor() as usize
}

/// Which edges a resize drags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ResizeEdges {
    pub left: bool,
    pub right: bool,
    pub top: bool,
    pub bottom: bool,
}

impl ResizeEdges {
    pub fn any(&self) -> bool {
        self.left || self.right || self.top || self.bottom
    }
}

/// Baseline of a cell move.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveDrag {
    pub index: usize,
    pub origin: (f32, f32),
    start: (f32, f32),
}

/// Baseline of a cell resize.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResizeDrag {
    pub index: usize,
    pub edges: ResizeEdges,
    pub origin: (f32, f32),
    start: CellRect,
    /// Whether the last frame snapped to a square.
    pub snapped: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FreestyleLayout {
    pub cells: Vec<FreestyleCell>,
    pub selected: Option<usize>,
}

fn padded_container(viewport: (f32, f32)) -> (f32, f32) {
    (
        (viewport.0 - LAYOUT_PADDING).max(MIN_CELL_PX),
        (viewport.1 - LAYOUT_PADDING).max(MIN_CELL_PX),
    )
}

fn symmetric<R: Rng>(rng: &mut R, max: f32) -> f32 {
    if max > 0.0 { rng.random_range(-max..=max) } else { 0.0 }
}

impl FreestyleLayout {
    /// Scatter layout: one image crop per cell, jittered and shuffled by chaos.
    pub fn init_scatter<R: Rng>(viewport: (f32, f32), settings: &ScatterSettings, rng: &mut R) -> Self {
        let n = settings.count;
        let (cols, rows) = virtual_grid(n);
        if n == 0 {
            return Self::default();
        }
        let (cw, ch) = padded_container(viewport);
        let zoom = settings.zoom / 100.0;
        let cell_w = (cw / cols as f32 * zoom).max(MIN_CELL_PX);
        let cell_h = (ch / rows as f32 * zoom).max(MIN_CELL_PX);
        let start_x = (cw - cell_w * cols as f32) * 0.5 + LAYOUT_PADDING * 0.5;
        let start_y = (ch - cell_h * rows as f32) * 0.5 + LAYOUT_PADDING * 0.5;

        let chaos = settings.chaos.clamp(0.0, 100.0) / 100.0;
        let jitter = 0.5
            * offset_multiplier(settings.zoom)
            * chaos
            * (1.0 + settings.cell_size / 100.0)
            * (1.0 + settings.cell_spread.abs() / 200.0);
        let max_dx = cell_w * jitter;
        let max_dy = cell_h * jitter;

        let mut positions: Vec<(usize, usize)> = (0..n).map(|i| (i / cols, i % cols)).collect();
        for _ in 0..shuffle_count(n, settings.chaos) {
            let j = rng.random_range(0..n);
            let k = rng.random_range(0..n);
            positions.swap(j, k);
        }

        let cells = (0..n)
            .map(|i| {
                let (row, col) = (i / cols, i % cols);
                let base_x = start_x + col as f32 * cell_w;
                let base_y = start_y + row as f32 * cell_h;
                let (dx, dy) = if chaos > 0.0 {
                    (symmetric(rng, max_dx), symmetric(rng, max_dy))
                } else {
                    (0.0, 0.0)
                };
                let (image_row, image_col) = positions[i];
                FreestyleCell {
                    x: base_x + dx,
                    y: base_y + dy,
                    width: cell_w,
                    height: cell_h,
                    base_x,
                    base_y,
                    individually_modified: false,
                    source: CellSource::Image {
                        image_row,
                        image_col,
                        image_cols: cols,
                        image_rows: rows,
                        rotation_factor: rng.random_range(-1.0f32..=1.0),
                    },
                }
            })
            .collect();

        Self { cells, selected: None }
    }

    /// Palette layout: cell `i` shows `palette[i]` on a loose grid.
    pub fn init_palette<R: Rng>(viewport: (f32, f32), palette: &[PaletteColor], rng: &mut R) -> Self {
        let n = palette.len();
        let (cols, rows) = virtual_grid(n);
        if n == 0 {
            return Self::default();
        }
        let (cw, ch) = padded_container(viewport);
        let cell_w = (cw / cols as f32).min(PALETTE_MAX_CELL).max(MIN_CELL_PX);
        let cell_h = (ch / rows as f32).min(PALETTE_MAX_CELL).max(MIN_CELL_PX);
        let start_x = (cw - cell_w * cols as f32) * 0.5 + LAYOUT_PADDING * 0.5;
        let start_y = (ch - cell_h * rows as f32) * 0.5 + LAYOUT_PADDING * 0.5;

        let cells = palette
            .iter()
            .enumerate()
            .map(|(i, color)| {
                let base_x = start_x + (i % cols) as f32 * cell_w;
                let base_y = start_y + (i / cols) as f32 * cell_h;
                FreestyleCell {
                    x: base_x + symmetric(rng, cell_w * POSITION_JITTER),
                    y: base_y + symmetric(rng, cell_h * POSITION_JITTER),
                    width: cell_w,
                    height: cell_h,
                    base_x,
                    base_y,
                    individually_modified: false,
                    source: CellSource::Color(*color),
                }
            })
            .collect();

        Self { cells, selected: None }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Move every cell to its anchor plus a fresh offset of up to 30 % of its size.
    pub fn randomize_positions<R: Rng>(&mut self, zoom_pct: f32, rng: &mut R) {
        let m = offset_multiplier(zoom_pct);
        for cell in &mut self.cells {
            cell.x = cell.base_x + symmetric(rng, cell.width * POSITION_JITTER * m);
            cell.y = cell.base_y + symmetric(rng, cell.height * POSITION_JITTER * m);
        }
    }

    /// Bounds of the un-jittered anchors; the stable framing reference.
    pub fn base_bounds(&self) -> Option<CellRect> {
        bounds_of(self.cells.iter().map(|c| c.base_rect()))
    }

    /// Bounds of the cells where they currently are.
    pub fn live_bounds(&self) -> Option<CellRect> {
        bounds_of(self.cells.iter().map(|c| c.rect()))
    }

    // ---- selection ----

    /// Exclusive select.  Returns the rounded size to publish.
    pub fn select(&mut self, index: usize) -> Option<(f32, f32)> {
        let cell = self.cells.get(index)?;
        self.selected = Some(index);
        Some((cell.width.round(), cell.height.round()))
    }

    /// Clear the selection.  Returns the first cell's rounded size to publish.
    pub fn deselect(&mut self) -> Option<(f32, f32)> {
        self.selected = None;
        self.cells.first().map(|c| (c.width.round(), c.height.round()))
    }

    // ---- bulk / targeted sizing ----

    /// Resize every cell that is not individually modified, each about its own center.
    pub fn resize_all_to(&mut self, width: f32, height: f32) {
        for cell in self.cells.iter_mut().filter(|c| !c.individually_modified) {
            cell.resize_about_center(width, height);
        }
    }

    /// Dimension-control commit: the selected cell only (marked modified), or every unmodified cell.
    pub fn apply_dimensions(&mut self, width: f32, height: f32) {
        match self.selected.and_then(|i| self.cells.get_mut(i)) {
            Some(cell) => {
                cell.resize_about_center(width, height);
                cell.individually_modified = true;
            }
            None => self.resize_all_to(width, height),
        }
    }

    // ---- pointer drags ----

    pub fn begin_move(&self, index: usize, origin: (f32, f32)) -> Option<MoveDrag> {
        let cell = self.cells.get(index)?;
        Some(MoveDrag { index, origin, start: (cell.x, cell.y) })
    }

    pub fn update_move(&mut self, drag: &MoveDrag, pointer: (f32, f32)) {
        if let Some(cell) = self.cells.get_mut(drag.index) {
            cell.x = drag.start.0 + pointer.0 - drag.origin.0;
            cell.y = drag.start.1 + pointer.1 - drag.origin.1;
        }
    }

    pub fn begin_resize(&self, index: usize, edges: ResizeEdges, origin: (f32, f32)) -> Option<ResizeDrag> {
        let cell = self.cells.get(index)?;
        Some(ResizeDrag { index, edges, origin, start: cell.rect(), snapped: false })
    }

    /// Apply one resize frame.  Returns the rounded size to publish.
    pub fn update_resize(&mut self, drag: &mut ResizeDrag, pointer: (f32, f32)) -> Option<(f32, f32)> {
        if drag.index >= self.cells.len() {
            return None;
        }
        let dx = pointer.0 - drag.origin.0;
        let dy = pointer.1 - drag.origin.1;
        let s = drag.start;
        let (mut left, mut right, mut top, mut bottom) = (s.x, s.right(), s.y, s.bottom());
        if drag.edges.left {
            left = (s.x + dx).min(right - MIN_CELL_PX);
        }
        if drag.edges.right {
            right = (s.right() + dx).max(left + MIN_CELL_PX);
        }
        if drag.edges.top {
            top = (s.y + dy).min(bottom - MIN_CELL_PX);
        }
        if drag.edges.bottom {
            bottom = (s.bottom() + dy).max(top + MIN_CELL_PX);
        }

        let (mut w, mut h) = (right - left, bottom - top);
        drag.snapped = (w - h).abs() < SQUARE_SNAP_PX;
        if drag.snapped {
            let avg = (w + h) * 0.5;
            w = avg;
            h = avg;
        }

        if self.selected == Some(drag.index) {
            let cell = &mut self.cells[drag.index];
            // The edge opposite the dragged one stays put.
            cell.x = if drag.edges.left { right - w } else { left };
            cell.y = if drag.edges.top { bottom - h } else { top };
            cell.width = w;
            cell.height = h;
            cell.individually_modified = true;
        } else {
            self.resize_all_to(w, h);
        }
        Some((w.round(), h.round()))
    }
}

// ============================================================================
// DIMENSION CONTROL
// ============================================================================

/// Width/height pair shown for the selected cell (or the group), with aspect lock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DimensionControl {
    pub width: f32,
    pub height: f32,
    locked: bool,
    ratio: f32,
}

impl Default for DimensionControl {
    fn default() -> Self {
        Self { width: 100.0, height: 100.0, locked: true, ratio: 1.0 }
    }
}

impl DimensionControl {
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Locking captures the current width / height.
    pub fn toggle_lock(&mut self) {
        self.locked = !self.locked;
        if self.locked && self.height > 0.0 {
            self.ratio = self.width / self.height;
        }
    }

    /// Show a size coming from the cells.
    pub fn publish(&mut self, size: (f32, f32)) {
        self.width = size.0;
        self.height = size.1;
    }

    pub fn set_width(&mut self, width: f32) {
        self.width = width.max(MIN_CELL_PX).round();
        if self.locked && self.ratio > 0.0 {
            self.height = (self.width / self.ratio).round().max(MIN_CELL_PX);
        }
    }

    pub fn set_height(&mut self, height: f32) {
        self.height = height.max(MIN_CELL_PX).round();
        if self.locked && self.ratio > 0.0 {
            self.width = (self.height * self.ratio).round().max(MIN_CELL_PX);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn scatter(count: usize, chaos: f32) -> FreestyleLayout {
        let settings = ScatterSettings { count, chaos, zoom: 100.0, cell_size: 0.0, cell_spread: 0.0 };
        FreestyleLayout::init_scatter((900.0, 700.0), &settings, &mut Pcg32::seed_from_u64(3))
    }

    #[test]
    fn virtual_grid_shapes() {
        assert_eq!(virtual_grid(16), (4, 4));
        assert_eq!(virtual_grid(10), (4, 3));
        assert_eq!(virtual_grid(1), (1, 1));
        assert_eq!(virtual_grid(0), (0, 0));
    }

    #[test]
    fn zero_chaos_has_no_jitter_and_no_shuffle() {
        let l = scatter(16, 0.0);
        assert_eq!(l.cells.len(), 16);
        for (i, c) in l.cells.iter().enumerate() {
            assert_eq!((c.x, c.y), (c.base_x, c.base_y));
            match c.source {
                CellSource::Image { image_row, image_col, image_cols, image_rows, .. } => {
                    assert_eq!((image_row, image_col), (i / 4, i % 4));
                    assert_eq!((image_cols, image_rows), (4, 4));
                }
                CellSource::Color(_) => panic!("scatter cell with color"),
            }
        }
    }

    #[test]
    fn scatter_fills_padded_viewport_and_centers() {
        let l = scatter(4, 0.0);
        let b = l.base_bounds().unwrap();
        assert!((b.width - 800.0).abs() < 1e-3);
        assert!((b.height - 600.0).abs() < 1e-3);
        assert_eq!(b.center(), (450.0, 350.0));
    }

    #[test]
    fn shuffle_count_thresholds() {
        assert_eq!(shuffle_count(16, 49.0), 0);
        assert_eq!(shuffle_count(16, 50.0), 0);
        assert_eq!(shuffle_count(16, 75.0), 8);
        assert_eq!(shuffle_count(16, 100.0), 16);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let l = scatter(9, 100.0);
        for c in &l.cells {
            assert!((c.x - c.base_x).abs() <= c.width * 0.5 + 1e-3);
            assert!((c.y - c.base_y).abs() <= c.height * 0.5 + 1e-3);
        }
    }

    #[test]
    fn palette_cells_take_colors_in_order_and_cap_size() {
        let palette: Vec<_> = (0..5).map(|i| PaletteColor::Rgb([i * 10, 0, 0])).collect();
        let l = FreestyleLayout::init_palette((2000.0, 2000.0), &palette, &mut Pcg32::seed_from_u64(1));
        assert_eq!(l.cells.len(), 5);
        for (i, c) in l.cells.iter().enumerate() {
            assert_eq!(c.source, CellSource::Color(palette[i]));
            assert_eq!(c.width, PALETTE_MAX_CELL);
            assert!((c.x - c.base_x).abs() <= c.width * POSITION_JITTER + 1e-3);
            assert_eq!(c.rotation_factor(), 0.0);
        }
    }

    #[test]
    fn bulk_resize_skips_modified_cells_and_keeps_centers() {
        let mut l = scatter(16, 30.0);
        l.cells[5].individually_modified = true;
        let before = l.cells.clone();
        l.resize_all_to(120.0, 80.0);
        assert_eq!(l.cells[5], before[5]);
        for (i, c) in l.cells.iter().enumerate().filter(|(i, _)| *i != 5) {
            assert_eq!((c.width, c.height), (120.0, 80.0));
            let (ox, oy) = before[i].rect().center();
            let (nx, ny) = c.rect().center();
            assert!((ox - nx).abs() < 1e-3 && (oy - ny).abs() < 1e-3);
        }
    }

    #[test]
    fn selected_resize_touches_only_that_cell() {
        let mut l = scatter(4, 0.0);
        l.select(1);
        let start = l.cells[1].rect();
        let mut d = l.begin_resize(1, ResizeEdges { right: true, ..Default::default() }, (0.0, 0.0)).unwrap();
        let published = l.update_resize(&mut d, (100.0, 0.0)).unwrap();
        assert!(l.cells[1].individually_modified);
        assert_eq!(l.cells[1].x, start.x);
        assert_eq!(published, ((start.width + 100.0).round(), start.height.round()));
        assert_eq!(l.cells[0].width, start.width);
    }

    #[test]
    fn unselected_resize_drives_the_group() {
        let mut l = scatter(4, 0.0);
        let mut d = l.begin_resize(0, ResizeEdges { bottom: true, ..Default::default() }, (0.0, 0.0)).unwrap();
        let h0 = l.cells[0].height;
        l.update_resize(&mut d, (0.0, -60.0));
        assert!(l.cells.iter().all(|c| (c.height - (h0 - 60.0)).abs() < 1e-3));
        assert!(l.cells.iter().all(|c| !c.individually_modified));
    }

    #[test]
    fn near_square_resize_snaps() {
        let mut l = FreestyleLayout {
            cells: vec![FreestyleCell {
                x: 0.0,
                y: 0.0,
                width: 100.0,
                height: 80.0,
                base_x: 0.0,
                base_y: 0.0,
                individually_modified: false,
                source: CellSource::Color(PaletteColor::Rgb([0, 0, 0])),
            }],
            selected: Some(0),
        };
        let mut d = l.begin_resize(0, ResizeEdges { left: true, ..Default::default() }, (0.0, 0.0)).unwrap();
        l.update_resize(&mut d, (10.0, 0.0));
        assert!(d.snapped);
        let c = l.cells[0];
        assert_eq!((c.width, c.height), (85.0, 85.0));
        assert_eq!(c.rect().right(), 100.0);
    }

    #[test]
    fn resize_never_goes_below_minimum() {
        let mut l = scatter(1, 0.0);
        l.select(0);
        let mut d = l.begin_resize(0, ResizeEdges { right: true, bottom: true, ..Default::default() }, (0.0, 0.0)).unwrap();
        l.update_resize(&mut d, (-5000.0, -5000.0));
        assert!(l.cells[0].width >= MIN_CELL_PX && l.cells[0].height >= MIN_CELL_PX);
    }

    #[test]
    fn move_is_relative_to_drag_start() {
        let mut l = scatter(4, 0.0);
        let (x0, y0) = (l.cells[2].x, l.cells[2].y);
        let d = l.begin_move(2, (10.0, 10.0)).unwrap();
        l.update_move(&d, (30.0, 5.0));
        l.update_move(&d, (30.0, 5.0));
        assert_eq!((l.cells[2].x, l.cells[2].y), (x0 + 20.0, y0 - 5.0));
        assert_eq!((l.cells[2].base_x, l.cells[2].base_y), (x0, y0));
    }

    #[test]
    fn select_and_deselect_publish_sizes() {
        let mut l = scatter(4, 0.0);
        l.cells[3].width = 55.4;
        assert_eq!(l.select(3).map(|s| s.0), Some(55.0));
        assert_eq!(l.selected, Some(3));
        assert_eq!(l.select(9), None);
        assert_eq!(l.selected, Some(3));
        let first = l.cells[0];
        assert_eq!(l.deselect(), Some((first.width.round(), first.height.round())));
        assert_eq!(l.selected, None);
    }

    #[test]
    fn apply_dimensions_marks_selected_cell() {
        let mut l = scatter(4, 0.0);
        l.select(2);
        l.apply_dimensions(40.0, 30.0);
        assert!(l.cells[2].individually_modified);
        assert_eq!((l.cells[2].width, l.cells[2].height), (40.0, 30.0));
        l.deselect();
        l.apply_dimensions(60.0, 60.0);
        assert_eq!(l.cells[2].width, 40.0);
        assert_eq!(l.cells[0].width, 60.0);
    }

    #[test]
    fn randomize_keeps_offsets_bounded() {
        let mut l = scatter(9, 0.0);
        l.randomize_positions(100.0, &mut Pcg32::seed_from_u64(11));
        for c in &l.cells {
            assert!((c.x - c.base_x).abs() <= c.width * POSITION_JITTER + 1e-3);
        }
    }

    #[test]
    fn aspect_lock_follows_captured_ratio() {
        let mut d = DimensionControl::default();
        assert!(d.is_locked());
        d.set_width(150.0);
        assert_eq!(d.height, 150.0);
        d.toggle_lock();
        d.publish((120.0, 80.0));
        d.toggle_lock();
        assert_eq!(d.ratio(), 1.5);
        d.set_height(40.0);
        assert_eq!(d.width, 60.0);
        d.set_width(100.0);
        assert_eq!(d.height, 67.0);
    }
}
