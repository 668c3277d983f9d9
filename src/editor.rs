// ============================================================================
// EDITOR STATE: the single owner of image, layout and style state
// ============================================================================
//
// Every mutation goes through a method here and reports which frame work it
// needs (`FrameTask`).  Renderers only ever borrow the state.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::SeedableRng;
use rand_pcg::Pcg32;

use crate::color::{self, PaletteColor};
use crate::geometry::freestyle::{
    CHAOS_RANGE, DimensionControl, FreestyleLayout, MoveDrag, ResizeDrag, ResizeEdges,
    SCATTER_ZOOM_RANGE, ScatterSettings, virtual_grid,
};
use crate::geometry::grid::{GridLayout, TrackDrag};
use crate::geometry::LayoutMode;
use crate::io::ImageSource;
use crate::params::{Background, CanvasFrame, CanvasRatio, ContentMode, ImageFit, StyleParams};
use crate::scheduler::FrameTask;
use crate::settings::{CELL_COUNT_MAX, CELL_COUNT_MIN, EditorSettings};

/// Preview viewport assumed until the host reports its real size.
pub const DEFAULT_VIEWPORT: (f32, f32) = (1000.0, 800.0);

/// A user action that needs an image was attempted without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoImage;

impl fmt::Display for NoImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Please upload an image first!")
    }
}

impl std::error::Error for NoImage {}

/// The one pointer gesture in progress, if any.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DragState {
    Track(TrackDrag),
    Move(MoveDrag),
    Resize(ResizeDrag),
}

#[derive(Clone)]
pub struct EditorState {
    image: Option<ImageSource>,
    background_image: Option<ImageSource>,
    mode: LayoutMode,
    cell_count: usize,
    pub style: StyleParams,
    pub frame: CanvasFrame,
    /// Remembered so toggling Solid → other → Solid keeps the pick.
    pub background_color: [u8; 3],
    pub image_fit: ImageFit,
    chaos: f32,
    scatter_zoom: f32,
    viewport: (f32, f32),
    pub grid: GridLayout,
    pub freestyle: FreestyleLayout,
    /// Ranked swatches, always `cell_count` long once an image is loaded.
    pub palette: Vec<PaletteColor>,
    /// Average color per cell of the active partition (Color content mode).
    pub cell_colors: Vec<PaletteColor>,
    pub dims: DimensionControl,
    drag: Option<DragState>,
    rng: Pcg32,
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5eed)
}

/// `round(sqrt(cell_count))`, at least 1.
pub fn grid_size_for(cell_count: usize) -> usize {
    ((cell_count as f32).sqrt().round() as usize).max(1)
}

impl Default for EditorState {
    fn default() -> Self {
        Self::new(&EditorSettings::default())
    }
}

impl EditorState {
    pub fn new(settings: &EditorSettings) -> Self {
        let mut rng = Pcg32::seed_from_u64(settings.seed.unwrap_or_else(clock_seed));
        let cell_count = settings.cell_count.clamp(CELL_COUNT_MIN, CELL_COUNT_MAX);
        let grid = GridLayout::new(grid_size_for(cell_count), &mut rng);
        let mut frame = CanvasFrame::default();
        frame.ratio = settings.ratio;
        frame.background = settings.background;
        frame.set_export_scale(settings.export_scale);
        let mut style = settings.style;
        style.content_mode = settings.content_mode;
        Self {
            image: None,
            background_image: None,
            mode: settings.mode,
            cell_count,
            style,
            frame,
            background_color: settings.background_color,
            image_fit: settings.image_fit,
            chaos: settings.chaos.clamp(*CHAOS_RANGE.start(), *CHAOS_RANGE.end()),
            scatter_zoom: settings.scatter_zoom.clamp(*SCATTER_ZOOM_RANGE.start(), *SCATTER_ZOOM_RANGE.end()),
            viewport: DEFAULT_VIEWPORT,
            grid,
            freestyle: FreestyleLayout::default(),
            palette: Vec::new(),
            cell_colors: Vec::new(),
            dims: DimensionControl::default(),
            drag: None,
            rng,
        }
    }

    /// Fixed-seed editor with default settings.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(&EditorSettings { seed: Some(seed), ..Default::default() })
    }

    /// Snapshot of the current choices, for persisting as defaults.
    pub fn to_settings(&self, base: &EditorSettings) -> EditorSettings {
        EditorSettings {
            mode: self.mode,
            cell_count: self.cell_count,
            content_mode: self.style.content_mode,
            chaos: self.chaos,
            scatter_zoom: self.scatter_zoom,
            image_fit: self.image_fit,
            style: self.style,
            ratio: self.frame.ratio,
            background: self.frame.background,
            background_color: self.background_color,
            export_scale: self.frame.export_scale(),
            ..base.clone()
        }
    }

    // ---- read access ----

    pub fn image(&self) -> Option<&ImageSource> {
        self.image.as_ref()
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn background_image(&self) -> Option<&ImageSource> {
        self.background_image.as_ref()
    }

    /// Image drawn for `Background::Image`: the dedicated one, else the source.
    pub fn background_fill_image(&self) -> Option<&ImageSource> {
        self.background_image.as_ref().or(self.image.as_ref())
    }

    pub fn mode(&self) -> LayoutMode {
        self.mode
    }

    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    pub fn grid_size(&self) -> usize {
        grid_size_for(self.cell_count)
    }

    pub fn chaos(&self) -> f32 {
        self.chaos
    }

    pub fn scatter_zoom(&self) -> f32 {
        self.scatter_zoom
    }

    pub fn viewport(&self) -> (f32, f32) {
        self.viewport
    }

    pub fn drag(&self) -> Option<&DragState> {
        self.drag.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// `(cols, rows)` of the image partition the active mode draws from.
    pub fn partition(&self) -> (usize, usize) {
        match self.mode {
            LayoutMode::Grid => (self.grid.size(), self.grid.size()),
            LayoutMode::Scatter | LayoutMode::Palette => virtual_grid(self.cell_count),
        }
    }

    /// Hex strings of the background swatches.
    pub fn swatches(&self) -> Vec<String> {
        color::background_swatches(&self.palette)
    }

    // ---- image lifecycle ----

    pub fn load_image(&mut self, source: ImageSource) -> FrameTask {
        crate::log_info!(
            "Image loaded: {} ({}x{})",
            source.name,
            source.width(),
            source.height()
        );
        self.image = Some(source);
        self.drag = None;
        self.grid.regenerate_rotations(&mut self.rng);
        self.initialize_for_mode();
        FrameTask::FullRender
    }

    /// Drop the image and every piece of geometry derived from it.
    pub fn clear_image(&mut self) -> Result<FrameTask, NoImage> {
        if self.image.take().is_none() {
            return Err(NoImage);
        }
        self.drag = None;
        self.grid = GridLayout::new(self.grid_size(), &mut self.rng);
        self.freestyle = FreestyleLayout::default();
        self.palette.clear();
        self.cell_colors.clear();
        self.dims = DimensionControl::default();
        crate::log_info!("Image cleared");
        Ok(FrameTask::FullRender)
    }

    pub fn set_background_image(&mut self, source: Option<ImageSource>) -> FrameTask {
        self.background_image = source;
        if self.background_image.is_some() {
            self.frame.background = Background::Image;
        }
        FrameTask::FullRender
    }

    /// Rebuild palette, cell colors and the active layout's geometry.
    fn initialize_for_mode(&mut self) {
        let Some(image) = self.image.as_ref() else { return };
        let pixels = image.pixels.clone();
        self.palette = color::extract_palette(&pixels, self.cell_count);
        self.refresh_cell_colors();

        let n = self.grid_size();
        self.grid.resize(n, &mut self.rng);

        self.freestyle = match self.mode {
            LayoutMode::Grid => FreestyleLayout::default(),
            LayoutMode::Scatter => {
                let settings = ScatterSettings {
                    count: self.cell_count,
                    chaos: self.chaos,
                    zoom: self.scatter_zoom,
                    cell_size: self.style.cell_size(),
                    cell_spread: self.style.cell_spread(),
                };
                FreestyleLayout::init_scatter(self.viewport, &settings, &mut self.rng)
            }
            LayoutMode::Palette => FreestyleLayout::init_palette(self.viewport, &self.palette, &mut self.rng),
        };
        self.publish_first_cell();
        crate::log_info!(
            "Initialized {} layout: {} cells",
            self.mode.label(),
            match self.mode {
                LayoutMode::Grid => self.grid.cell_count(),
                _ => self.freestyle.cells.len(),
            }
        );
    }

    fn refresh_cell_colors(&mut self) {
        let Some(image) = self.image.as_ref() else { return };
        if self.style.content_mode != ContentMode::Color {
            self.cell_colors.clear();
            return;
        }
        let (cols, rows) = self.partition();
        self.cell_colors = color::cell_average_colors(&image.pixels, cols, rows);
    }

    fn publish_first_cell(&mut self) {
        if let Some(size) = self.freestyle.deselect() {
            self.dims.publish(size);
        }
    }

    // ---- structural parameters ----

    /// Switch layout.  Scatter with square corners picks up full pills and
    /// Grid with full pills goes back to square corners.
    pub fn set_layout_mode(&mut self, mode: LayoutMode) -> FrameTask {
        if mode == self.mode {
            return FrameTask::SidebarRefresh;
        }
        self.mode = mode;
        self.drag = None;
        match mode {
            LayoutMode::Scatter if self.style.cell_border_radius() == 0.0 => {
                self.style.set_cell_border_radius(100.0)
            }
            LayoutMode::Grid if self.style.cell_border_radius() == 100.0 => {
                self.style.set_cell_border_radius(0.0)
            }
            _ => {}
        }
        if mode == LayoutMode::Grid {
            self.grid.regenerate_rotations(&mut self.rng);
        }
        self.initialize_for_mode();
        FrameTask::FullRender
    }

    /// Change the unified cell count.  Grid weights and rotations carry over by index.
    pub fn set_cell_count(&mut self, count: usize) -> FrameTask {
        let count = count.clamp(CELL_COUNT_MIN, CELL_COUNT_MAX);
        if count == self.cell_count {
            return FrameTask::SidebarRefresh;
        }
        self.cell_count = count;
        self.drag = None;
        if self.has_image() {
            self.initialize_for_mode();
        } else {
            let n = self.grid_size();
            self.grid.resize(n, &mut self.rng);
        }
        FrameTask::FullRender
    }

    pub fn set_content_mode(&mut self, mode: ContentMode) -> FrameTask {
        self.style.content_mode = mode;
        self.refresh_cell_colors();
        FrameTask::FullRender
    }

    /// Chaos only shapes the Scatter layout, which is rebuilt.
    pub fn set_chaos(&mut self, chaos: f32) -> FrameTask {
        self.chaos = chaos.clamp(*CHAOS_RANGE.start(), *CHAOS_RANGE.end());
        if self.mode == LayoutMode::Scatter {
            self.initialize_for_mode();
        }
        FrameTask::FullRender
    }

    pub fn set_scatter_zoom(&mut self, zoom: f32) -> FrameTask {
        self.scatter_zoom = zoom.clamp(*SCATTER_ZOOM_RANGE.start(), *SCATTER_ZOOM_RANGE.end());
        if self.mode == LayoutMode::Scatter {
            self.initialize_for_mode();
        }
        FrameTask::FullRender
    }

    /// Record the host's preview area.  Existing freestyle cells keep their
    /// geometry; the scene refits them.
    pub fn set_viewport(&mut self, width: f32, height: f32) -> Option<FrameTask> {
        let vp = (width.max(1.0), height.max(1.0));
        if (vp.0 - self.viewport.0).abs() < 0.5 && (vp.1 - self.viewport.1).abs() < 0.5 {
            return None;
        }
        self.viewport = vp;
        Some(FrameTask::FullRender)
    }

    pub fn set_image_fit(&mut self, fit: ImageFit) -> FrameTask {
        self.image_fit = fit;
        FrameTask::FullRender
    }

    pub fn set_canvas_ratio(&mut self, ratio: CanvasRatio) -> FrameTask {
        self.frame.ratio = ratio;
        FrameTask::FullRender
    }

    pub fn set_background(&mut self, background: Background) -> FrameTask {
        if let Background::Solid(rgb) = background {
            self.background_color = rgb;
        }
        self.frame.background = background;
        FrameTask::FullRender
    }

    pub fn set_export_scale(&mut self, scale: f32) -> FrameTask {
        self.frame.set_export_scale(scale);
        FrameTask::SidebarRefresh
    }

    // ---- style parameters (fast path) ----

    pub fn set_cell_size(&mut self, v: f32) -> FrameTask {
        self.style.set_cell_size(v);
        FrameTask::StyleUpdate
    }

    pub fn set_cell_spread(&mut self, v: f32) -> FrameTask {
        self.style.set_cell_spread(v);
        FrameTask::StyleUpdate
    }

    pub fn set_cell_tumble(&mut self, v: f32) -> FrameTask {
        self.style.set_cell_tumble(v);
        FrameTask::StyleUpdate
    }

    pub fn set_cell_border_radius(&mut self, v: f32) -> FrameTask {
        self.style.set_cell_border_radius(v);
        FrameTask::StyleUpdate
    }

    pub fn set_canvas_scale(&mut self, v: f32) -> FrameTask {
        self.style.set_canvas_scale(v);
        FrameTask::StyleUpdate
    }

    // ---- layout actions ----

    /// Grid: all weights back to 1.  Freestyle: cells rebuilt from scratch.
    pub fn reset_layout(&mut self) -> Result<FrameTask, NoImage> {
        if !self.has_image() {
            return Err(NoImage);
        }
        self.drag = None;
        match self.mode {
            LayoutMode::Grid => self.grid.reset_weights(),
            _ => self.initialize_for_mode(),
        }
        Ok(FrameTask::FullRender)
    }

    pub fn randomize_positions(&mut self) -> Option<FrameTask> {
        if !self.mode.is_freestyle() || self.freestyle.is_empty() {
            return None;
        }
        self.freestyle.randomize_positions(self.scatter_zoom, &mut self.rng);
        Some(FrameTask::FullRender)
    }

    // ---- selection & dimensions ----

    pub fn select_cell(&mut self, index: usize) -> Option<FrameTask> {
        let size = self.freestyle.select(index)?;
        self.dims.publish(size);
        Some(FrameTask::SidebarRefresh)
    }

    pub fn deselect_cell(&mut self) -> FrameTask {
        self.publish_first_cell();
        FrameTask::SidebarRefresh
    }

    pub fn selected_cell(&self) -> Option<usize> {
        self.freestyle.selected
    }

    pub fn toggle_aspect_lock(&mut self) -> FrameTask {
        self.dims.toggle_lock();
        FrameTask::SidebarRefresh
    }

    /// Width edit (height follows when locked), applied to the target cells.
    pub fn set_dimension_width(&mut self, width: f32) -> FrameTask {
        self.dims.set_width(width);
        self.freestyle.apply_dimensions(self.dims.width, self.dims.height);
        FrameTask::FullRender
    }

    pub fn set_dimension_height(&mut self, height: f32) -> FrameTask {
        self.dims.set_height(height);
        self.freestyle.apply_dimensions(self.dims.width, self.dims.height);
        FrameTask::FullRender
    }

    // ---- pointer drags ----

    /// Start dragging the track boundary of grid cell (row, col).
    pub fn begin_track_drag(&mut self, row: usize, col: usize, pointer: (f32, f32)) {
        if self.mode == LayoutMode::Grid && self.has_image() {
            self.drag = Some(DragState::Track(self.grid.begin_track_drag(row, col, pointer)));
        }
    }

    /// Start moving freestyle cell `index`.  `pointer` is in layout space.
    pub fn begin_cell_move(&mut self, index: usize, pointer: (f32, f32)) {
        if let Some(d) = self.freestyle.begin_move(index, pointer) {
            self.drag = Some(DragState::Move(d));
        }
    }

    pub fn begin_cell_resize(&mut self, index: usize, edges: ResizeEdges, pointer: (f32, f32)) {
        if !edges.any() {
            return self.begin_cell_move(index, pointer);
        }
        if let Some(d) = self.freestyle.begin_resize(index, edges, pointer) {
            self.drag = Some(DragState::Resize(d));
        }
    }

    /// Advance the active drag.  `pointer` is in the same space the drag began
    /// in; `grid_px` is the rendered grid size (track drags only).
    pub fn drag_to(&mut self, pointer: (f32, f32), grid_px: (f32, f32)) -> Option<FrameTask> {
        match self.drag.as_mut()? {
            DragState::Track(d) => self.grid.drag_track(d, pointer, grid_px).then_some(FrameTask::FullRender),
            DragState::Move(d) => {
                self.freestyle.update_move(d, pointer);
                Some(FrameTask::FullRender)
            }
            DragState::Resize(d) => {
                let size = self.freestyle.update_resize(d, pointer)?;
                self.dims.publish(size);
                Some(FrameTask::FullRender)
            }
        }
    }

    /// Release (or pointer loss): keep whatever was applied last.
    pub fn end_drag(&mut self) {
        self.drag = None;
    }
}
