// ============================================================================
// PREVIEW SCENE: retained cell nodes for the interactive canvas
// ============================================================================
//
// A frame (the export canvas in screen pixels) holds the content layer, which
// holds one node per cell.  Structural edits rebuild everything; style edits
// only re-resolve the transforms of the nodes already there.

use std::collections::HashMap;
use std::sync::Arc;

use image::RgbaImage;
use image::imageops::{self, FilterType};
use uuid::Uuid;

use crate::editor::EditorState;
use crate::geometry::freestyle::ResizeEdges;
use crate::geometry::{CellRect, LayoutMode};
use crate::io::ImageSource;
use crate::params::Background;
use crate::scene::{
    CellFill, Framing, LaidOutCell, SceneFrame, freestyle_framing, layout_cells, preview_frame_size,
};
use crate::transform::{CellPlacement, ResolvedCell, SpreadReference, resolve};

/// Longest side of a cached partition crop.
pub const CROP_MAX_PX: u32 = 400;
/// Distance from a cell edge (screen px) that grabs the edge instead of the body.
pub const EDGE_GRAB_PX: f32 = 8.0;

// ============================================================================
// CROP CACHE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct CropKey {
    cols: usize,
    rows: usize,
    image: Uuid,
}

/// Downscaled partition crops of the current image.
///
/// Keyed by partition and image identity; any key change throws away every
/// crop and bumps the generation so hosts can drop their textures too.
#[derive(Default)]
pub struct CropCache {
    key: Option<CropKey>,
    crops: HashMap<(usize, usize), Arc<RgbaImage>>,
    generation: u64,
    hits: u64,
    misses: u64,
}

impl CropCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.crops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
    }

    pub fn clear(&mut self) {
        if self.key.take().is_some() || !self.is_empty() {
            self.crops.clear();
            self.generation += 1;
        }
    }

    fn retarget(&mut self, key: CropKey) {
        if self.key != Some(key) {
            if self.key.is_some() {
                crate::log_info!(
                    "Crop cache invalidated ({} crops) for {}x{} partition",
                    self.crops.len(),
                    key.cols,
                    key.rows
                );
            }
            self.crops.clear();
            self.key = Some(key);
            self.generation += 1;
        }
    }

    /// Crop (row, col) of a `cols × rows` split of `image`.
    pub fn get(&mut self, image: &ImageSource, cols: usize, rows: usize, row: usize, col: usize) -> Arc<RgbaImage> {
        self.retarget(CropKey { cols, rows, image: image.id });
        if let Some(c) = self.crops.get(&(row, col)) {
            self.hits += 1;
            return c.clone();
        }
        self.misses += 1;
        let crop = Arc::new(make_crop(&image.pixels, cols, rows, row, col));
        self.crops.insert((row, col), crop.clone());
        crop
    }
}

/// Integer pixel rect of partition cell (row, col); at least 1×1.
fn partition_rect(w: u32, h: u32, cols: usize, rows: usize, row: usize, col: usize) -> (u32, u32, u32, u32) {
    let cols = cols.max(1) as u64;
    let rows = rows.max(1) as u64;
    let (w64, h64) = (w as u64, h as u64);
    let x0 = (col as u64 * w64 / cols).min(w64.saturating_sub(1));
    let y0 = (row as u64 * h64 / rows).min(h64.saturating_sub(1));
    let x1 = ((col as u64 + 1) * w64 / cols).clamp(x0 + 1, w64.max(1));
    let y1 = ((row as u64 + 1) * h64 / rows).clamp(y0 + 1, h64.max(1));
    (x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
}

fn make_crop(image: &RgbaImage, cols: usize, rows: usize, row: usize, col: usize) -> RgbaImage {
    let (x, y, w, h) = partition_rect(image.width(), image.height(), cols, rows, row, col);
    let crop = imageops::crop_imm(image, x, y, w, h).to_image();
    let longest = w.max(h);
    if longest <= CROP_MAX_PX {
        return crop;
    }
    let s = CROP_MAX_PX as f32 / longest as f32;
    let nw = ((w as f32 * s).round() as u32).max(1);
    let nh = ((h as f32 * s).round() as u32).max(1);
    imageops::resize(&crop, nw, nh, FilterType::Triangle)
}

// ============================================================================
// SCENE
// ============================================================================

/// One drawable cell.
#[derive(Clone, Debug)]
pub struct PreviewNode {
    /// Index into the grid (row-major) or freestyle cell list.
    pub index: usize,
    pub placement: CellPlacement,
    pub fill: CellFill,
    /// Final geometry in frame pixels, content scale included.
    pub resolved: ResolvedCell,
    pub crop: Option<Arc<RgbaImage>>,
}

impl PreviewNode {
    /// Grid (row, col) for grid cells.
    pub fn grid_position(&self) -> Option<(usize, usize)> {
        match self.placement.spread {
            SpreadReference::Grid { row, col, .. } => Some((row, col)),
            SpreadReference::Centroid { .. } => None,
        }
    }
}

/// Line segment `(from, to)` in frame pixels.
pub type Segment = ((f32, f32), (f32, f32));

/// Interior track boundaries of the grid, spanning the content box.
fn grid_crosshairs(state: &EditorState, frame: &SceneFrame) -> Vec<Segment> {
    if state.mode() != LayoutMode::Grid {
        return Vec::new();
    }
    let c = frame.content;
    let (vertical, horizontal) = state.grid.crosshairs();
    let vs = vertical.into_iter().map(|t| {
        let x = c.x + t * c.width;
        ((x, c.y), (x, c.bottom()))
    });
    let hs = horizontal.into_iter().map(|t| {
        let y = c.y + t * c.height;
        ((c.x, y), (c.right(), y))
    });
    vs.chain(hs)
        .map(|(a, b)| (frame.apply_content_scale(a), frame.apply_content_scale(b)))
        .collect()
}

#[derive(Clone, Debug)]
pub struct PreviewScene {
    pub frame: SceneFrame,
    pub mode: LayoutMode,
    pub background: Background,
    /// Freestyle layout → frame mapping (freestyle modes only).
    pub framing: Option<Framing>,
    pub nodes: Vec<PreviewNode>,
    /// Guide lines along the interior grid boundaries, frame pixels (grid mode only).
    pub crosshairs: Vec<Segment>,
    /// Crop cache generation the nodes' crops belong to.
    pub crop_generation: u64,
}

/// Result of a pointer probe.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    /// Position in `PreviewScene::nodes`.
    pub node: usize,
    /// The cell's layout index.
    pub index: usize,
    pub edges: ResizeEdges,
}

impl PreviewScene {
    /// Frame point → freestyle layout point.
    pub fn to_layout(&self, p: (f32, f32)) -> (f32, f32) {
        let q = self.frame.remove_content_scale(p);
        self.framing.unwrap_or_else(Framing::identity).to_layout(q)
    }

    /// On-screen size of the grid, used to bound track drags.
    pub fn grid_px(&self) -> (f32, f32) {
        let s = self.frame.content_scale;
        (self.frame.content.width * s, self.frame.content.height * s)
    }

    /// Topmost cell under `p` (frame pixels), with the edges within the grab
    /// margin.  Edges are only reported for freestyle cells.
    pub fn hit_test(&self, p: (f32, f32)) -> Option<Hit> {
        self.nodes.iter().enumerate().rev().find_map(|(i, n)| {
            let r = &n.resolved;
            if !r.is_visible() || !r.contains(p) {
                return None;
            }
            let edges = if self.mode.is_freestyle() {
                let (lx, ly) = r.to_local(p);
                let hw = r.width * 0.5;
                let hh = r.height * 0.5;
                let m = EDGE_GRAB_PX.min(hw * 0.5).min(hh * 0.5);
                ResizeEdges {
                    left: lx < -hw + m,
                    right: lx > hw - m,
                    top: ly < -hh + m,
                    bottom: ly > hh - m,
                }
            } else {
                ResizeEdges::default()
            };
            Some(Hit { node: i, index: n.index, edges })
        })
    }
}

/// Owns the crop cache and the current scene.
#[derive(Default)]
pub struct PreviewRenderer {
    pub cache: CropCache,
    scene: Option<PreviewScene>,
}

impl PreviewRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scene(&self) -> Option<&PreviewScene> {
        self.scene.as_ref()
    }

    /// Recompute the whole scene for a `container`-sized preview area.
    pub fn rebuild(&mut self, state: &EditorState, container: (f32, f32)) {
        let Some(image) = state.image() else {
            self.scene = None;
            self.cache.clear();
            return;
        };
        let aspect = image.aspect();
        let (w, h) = preview_frame_size(container, state.frame.ratio, aspect);
        let frame = SceneFrame::new(w, h, aspect, state.style.content_scale());
        let framing = match state.mode() {
            LayoutMode::Grid => None,
            _ => freestyle_framing(state, frame.content),
        };

        let cells = layout_cells(state, frame.content, false);
        let nodes = cells
            .into_iter()
            .map(|c| self.node_for(state, image, &frame, c))
            .collect();

        self.scene = Some(PreviewScene {
            frame,
            mode: state.mode(),
            background: state.frame.background,
            framing,
            nodes,
            crosshairs: grid_crosshairs(state, &frame),
            crop_generation: self.cache.generation(),
        });
    }

    fn node_for(&mut self, state: &EditorState, image: &ImageSource, frame: &SceneFrame, cell: LaidOutCell) -> PreviewNode {
        let crop = match cell.fill {
            CellFill::Crop { row, col, cols, rows, .. } => Some(self.cache.get(image, cols, rows, row, col)),
            CellFill::Solid(_) => None,
        };
        PreviewNode {
            index: cell.index,
            placement: cell.placement,
            fill: cell.fill,
            resolved: frame.scale_cell(&resolve(&cell.placement, &state.style)),
            crop,
        }
    }

    /// Re-resolve existing nodes after a style change.  Returns `true` when
    /// there is nothing to update and a full rebuild is needed instead.
    pub fn update_styles(&mut self, state: &EditorState) -> bool {
        let Some(scene) = self.scene.as_mut().filter(|s| !s.nodes.is_empty()) else {
            return true;
        };
        scene.frame.content_scale = state.style.content_scale();
        let frame = scene.frame;
        for node in &mut scene.nodes {
            node.resolved = frame.scale_cell(&resolve(&node.placement, &state.style));
        }
        scene.crosshairs = grid_crosshairs(state, &frame);
        false
    }

    /// Area the frame occupies when centered in a `container`.
    pub fn frame_rect_in(&self, container: CellRect) -> Option<CellRect> {
        let f = self.scene.as_ref()?.frame;
        let (cx, cy) = container.center();
        Some(CellRect::from_center(cx, cy, f.width, f.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn loaded(seed: u64) -> EditorState {
        let mut e = EditorState::with_seed(seed);
        e.load_image(ImageSource::from_rgba(
            "p",
            RgbaImage::from_fn(1200, 900, |x, y| Rgba([(x / 5) as u8, (y / 4) as u8, 0, 255])),
        ));
        e
    }

    #[test]
    fn crops_are_capped() {
        let img = ImageSource::from_rgba("big", RgbaImage::new(1000, 500));
        let mut cache = CropCache::new();
        let c = cache.get(&img, 1, 1, 0, 0);
        assert_eq!(c.dimensions(), (400, 200));
        let small = cache.get(&img, 4, 4, 1, 1);
        assert_eq!(small.dimensions(), (250, 125));
    }

    #[test]
    fn cache_hits_and_invalidation() {
        let img = ImageSource::from_rgba("a", RgbaImage::new(40, 40));
        let mut cache = CropCache::new();
        cache.get(&img, 2, 2, 0, 0);
        cache.get(&img, 2, 2, 0, 0);
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
        let g = cache.generation();
        cache.get(&img, 3, 3, 0, 0);
        assert!(cache.generation() > g);
        assert_eq!(cache.len(), 1);
        let other = ImageSource::from_rgba("a", RgbaImage::new(40, 40));
        cache.get(&other, 3, 3, 0, 0);
        assert_eq!(cache.misses(), 3);
    }

    #[test]
    fn clearing_drops_crops_and_bumps_generation_once() {
        let img = ImageSource::from_rgba("a", RgbaImage::new(40, 40));
        let mut cache = CropCache::new();
        cache.get(&img, 2, 2, 1, 1);
        let g = cache.generation();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.generation(), g + 1);
        cache.clear();
        assert_eq!(cache.generation(), g + 1);
    }

    #[test]
    fn partition_rects_tile_the_image() {
        let mut x = 0;
        for col in 0..3 {
            let (x0, _, w, _) = partition_rect(10, 10, 3, 1, 0, col);
            assert_eq!(x0, x);
            x += w;
        }
        assert_eq!(x, 10);
    }

    #[test]
    fn rebuild_then_style_update_reuses_nodes() {
        let mut e = loaded(1);
        let mut r = PreviewRenderer::new();
        r.rebuild(&e, (880.0, 680.0));
        let scene = r.scene().unwrap();
        assert_eq!(scene.nodes.len(), 16);
        assert_eq!((scene.frame.width, scene.frame.height), (800.0, 600.0));
        let before = scene.nodes[0].resolved;
        let misses = r.cache.misses();

        e.set_cell_size(-50.0);
        assert!(!r.update_styles(&e));
        let after = r.scene().unwrap().nodes[0].resolved;
        assert_eq!(after.width, before.width * 0.5);
        assert_eq!(r.cache.misses(), misses);

        r.rebuild(&e, (880.0, 680.0));
        assert_eq!(r.cache.misses(), misses);
        assert_eq!(r.cache.hits(), 16);
    }

    #[test]
    fn grid_crosshairs_follow_weights_and_canvas_scale() {
        let mut e = loaded(4);
        e.grid.column_weights = vec![3.0, 1.0, 1.0, 1.0];
        let mut r = PreviewRenderer::new();
        r.rebuild(&e, (880.0, 680.0));
        let scene = r.scene().unwrap();
        assert_eq!(scene.crosshairs.len(), 6);
        // Frame 800×600 matches the image aspect, so content fills it.
        assert_eq!(scene.crosshairs[0], ((400.0, 0.0), (400.0, 600.0)));
        assert_eq!(scene.crosshairs[3], ((0.0, 150.0), (800.0, 150.0)));

        e.set_canvas_scale(50.0);
        assert!(!r.update_styles(&e));
        let ((x, y0), (_, y1)) = r.scene().unwrap().crosshairs[0];
        assert!((x - 400.0).abs() < 1e-3);
        assert!((y0 - 150.0).abs() < 1e-3 && (y1 - 450.0).abs() < 1e-3);

        e.set_layout_mode(LayoutMode::Scatter);
        r.rebuild(&e, (880.0, 680.0));
        assert!(r.scene().unwrap().crosshairs.is_empty());
    }

    #[test]
    fn style_update_without_scene_asks_for_rebuild() {
        let e = EditorState::with_seed(2);
        let mut r = PreviewRenderer::new();
        assert!(r.update_styles(&e));
        r.rebuild(&e, (500.0, 500.0));
        assert!(r.scene().is_none());
        assert!(r.update_styles(&e));
    }

    #[test]
    fn hit_test_finds_grid_cell_and_freestyle_edges() {
        let mut e = loaded(3);
        let mut r = PreviewRenderer::new();
        r.rebuild(&e, (880.0, 680.0));
        let hit = r.scene().unwrap().hit_test((250.0, 170.0)).unwrap();
        assert_eq!(hit.index, 5);
        assert!(!hit.edges.any());
        assert!(r.scene().unwrap().hit_test((-5.0, -5.0)).is_none());

        e.set_layout_mode(LayoutMode::Scatter);
        r.rebuild(&e, (880.0, 680.0));
        let scene = r.scene().unwrap();
        let top = scene.nodes.last().unwrap().resolved;
        let near_left = top.to_world((-top.width * 0.5 + 1.0, 0.0));
        let hit = scene.hit_test(near_left).unwrap();
        assert_eq!(hit.node, scene.nodes.len() - 1);
        assert!(hit.edges.left && !hit.edges.right);
    }
}
