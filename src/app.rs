use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use eframe::egui;
use egui::epaint::{Vertex, WHITE_UV};
use egui::{Color32, ColorImage, Pos2, Rect, Sense, Stroke, TextureHandle, TextureId, TextureOptions, Vec2};
use image::RgbaImage;
use image::imageops::{self, FilterType};
use uuid::Uuid;

use osmosis::editor::{DragState, EditorState};
use osmosis::geometry::{CellRect, LayoutMode, cover_rect};
use osmosis::io::{IMAGE_EXTENSIONS, LoadOutcome, LoadQueue};
use osmosis::params::{
    Background, CANVAS_SCALE_RANGE, CELL_RADIUS_RANGE, CELL_SIZE_RANGE, CELL_SPREAD_RANGE,
    CELL_TUMBLE_RANGE, CanvasRatio, ContentMode, EXPORT_SCALES, ImageFit, InlineEdit,
};
use osmosis::geometry::freestyle::{CHAOS_RANGE, SCATTER_ZOOM_RANGE};
use osmosis::render::export::{self, ExportError};
use osmosis::render::preview::{PreviewNode, PreviewRenderer, PreviewScene};
use osmosis::render::raster;
use osmosis::scene::{CellFill, Framing, SceneFrame};
use osmosis::scheduler::{FrameScheduler, FrameTask};
use osmosis::settings::{CELL_COUNT_MAX, CELL_COUNT_MIN, EditorSettings};

/// Shown in place of the file name after a failed load.
const LOAD_FAILED_LABEL: &str = "Failed to load image";
/// Longest side of the preview's background-image texture.
const BACKGROUND_PREVIEW_MAX: u32 = 1024;
/// Points per rounded corner in a cell mesh.
const CORNER_SEGMENTS: usize = 6;
const CHECKER_TILE: u32 = 10;

const RATIO_PRESETS: &[(&str, CanvasRatio)] = &[
    ("Original", CanvasRatio::Original),
    ("1:1", CanvasRatio::Ratio(1.0, 1.0)),
    ("4:5", CanvasRatio::Ratio(4.0, 5.0)),
    ("3:2", CanvasRatio::Ratio(3.0, 2.0)),
    ("16:9", CanvasRatio::Ratio(16.0, 9.0)),
    ("9:16", CanvasRatio::Ratio(9.0, 16.0)),
];

// ============================================================================
// ASYNC EXPORT: background render + encode with channel completion
// ============================================================================

/// Result delivered from a background export job.
enum ExportResult {
    Done { path: PathBuf, size: (u32, u32), elapsed: Duration },
    Failed(String),
}

/// Style slider that also takes typed values.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum StyleField {
    Size,
    Spread,
    Tumble,
    Radius,
    CanvasScale,
}

impl StyleField {
    const ALL: [StyleField; 5] = [
        StyleField::Size,
        StyleField::Spread,
        StyleField::Tumble,
        StyleField::Radius,
        StyleField::CanvasScale,
    ];

    fn label(self) -> &'static str {
        match self {
            StyleField::Size => "Cell Size",
            StyleField::Spread => "Cell Spread",
            StyleField::Tumble => "Cell Tumble",
            StyleField::Radius => "Border Radius",
            StyleField::CanvasScale => "Canvas Scale",
        }
    }

    fn range(self) -> std::ops::RangeInclusive<f32> {
        match self {
            StyleField::Size => CELL_SIZE_RANGE,
            StyleField::Spread => CELL_SPREAD_RANGE,
            StyleField::Tumble => CELL_TUMBLE_RANGE,
            StyleField::Radius => CELL_RADIUS_RANGE,
            StyleField::CanvasScale => CANVAS_SCALE_RANGE,
        }
    }

    fn get(self, state: &EditorState) -> f32 {
        match self {
            StyleField::Size => state.style.cell_size(),
            StyleField::Spread => state.style.cell_spread(),
            StyleField::Tumble => state.style.cell_tumble(),
            StyleField::Radius => state.style.cell_border_radius(),
            StyleField::CanvasScale => state.style.canvas_scale(),
        }
    }

    fn set(self, state: &mut EditorState, v: f32) -> FrameTask {
        match self {
            StyleField::Size => state.set_cell_size(v),
            StyleField::Spread => state.set_cell_spread(v),
            StyleField::Tumble => state.set_cell_tumble(v),
            StyleField::Radius => state.set_cell_border_radius(v),
            StyleField::CanvasScale => state.set_canvas_scale(v),
        }
    }
}

/// Frame and framing captured when a drag starts, so pointer mapping stays
/// fixed while the scene is rebuilt underneath it.
#[derive(Clone, Copy)]
struct DragMapping {
    frame: SceneFrame,
    framing: Option<Framing>,
    grid_px: (f32, f32),
}

impl DragMapping {
    fn of(scene: &PreviewScene) -> Self {
        Self { frame: scene.frame, framing: scene.framing, grid_px: scene.grid_px() }
    }

    fn to_layout(&self, p: (f32, f32)) -> (f32, f32) {
        let q = self.frame.remove_content_scale(p);
        self.framing.unwrap_or_else(Framing::identity).to_layout(q)
    }
}

pub struct OsmosisApp {
    settings: EditorSettings,
    state: EditorState,
    scheduler: FrameScheduler,
    preview: PreviewRenderer,

    // Background decodes (last request wins per queue)
    loads: LoadQueue,
    background_loads: LoadQueue,
    file_name: String,

    // Background export
    export_sender: mpsc::Sender<ExportResult>,
    export_receiver: mpsc::Receiver<ExportResult>,
    export_running: bool,
    status: String,

    // GPU textures for the preview
    crop_textures: HashMap<(usize, usize), TextureHandle>,
    texture_generation: u64,
    background_texture: Option<(Uuid, TextureHandle)>,
    checker_texture: Option<((u32, u32), TextureHandle)>,

    // Interaction
    preview_area: Rect,
    drag_mapping: Option<DragMapping>,
    inline_edits: HashMap<StyleField, InlineEdit>,
    editing_field: Option<StyleField>,
    cell_count_text: String,

    /// Blocking message window.
    alert: Option<String>,
}

impl OsmosisApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, settings: EditorSettings) -> Self {
        let state = EditorState::new(&settings);
        let (export_sender, export_receiver) = mpsc::channel();
        let mut scheduler = FrameScheduler::new();
        scheduler.schedule(FrameTask::FullRender);
        Self {
            cell_count_text: state.cell_count().to_string(),
            settings,
            state,
            scheduler,
            preview: PreviewRenderer::new(),
            loads: LoadQueue::new(),
            background_loads: LoadQueue::new(),
            file_name: String::new(),
            export_sender,
            export_receiver,
            export_running: false,
            status: String::new(),
            crop_textures: HashMap::new(),
            texture_generation: 0,
            background_texture: None,
            checker_texture: None,
            preview_area: Rect::NOTHING,
            drag_mapping: None,
            inline_edits: HashMap::new(),
            editing_field: None,
            alert: None,
        }
    }

    fn schedule(&mut self, task: FrameTask) {
        self.scheduler.schedule(task);
    }

    // ---- file handling ----

    fn pick_image(&self) -> Option<PathBuf> {
        let mut dialog = rfd::FileDialog::new().add_filter("Images", IMAGE_EXTENSIONS);
        if let Some(dir) = &self.settings.last_dir {
            dialog = dialog.set_directory(dir);
        }
        dialog.pick_file()
    }

    fn open_image(&mut self, path: PathBuf) {
        if let Some(dir) = path.parent() {
            self.settings.last_dir = Some(dir.to_path_buf());
        }
        self.loads.request(path);
    }

    fn poll_loads(&mut self) {
        if let Some(LoadOutcome { path, result, .. }) = self.loads.poll() {
            match result {
                Ok(source) => {
                    self.file_name = source.name.clone();
                    let task = self.state.load_image(source);
                    self.schedule(task);
                    self.schedule(FrameTask::SidebarRefresh);
                    self.cell_count_text = self.state.cell_count().to_string();
                }
                Err(e) => {
                    osmosis::log_err!("Load failed for {}: {}", path.display(), e);
                    self.file_name = LOAD_FAILED_LABEL.to_string();
                    self.alert = Some(format!("{}:\n{}", LOAD_FAILED_LABEL, e));
                }
            }
        }
        if let Some(LoadOutcome { path, result, .. }) = self.background_loads.poll() {
            match result {
                Ok(source) => {
                    let task = self.state.set_background_image(Some(source));
                    self.schedule(task);
                }
                Err(e) => {
                    osmosis::log_err!("Background load failed for {}: {}", path.display(), e);
                    self.alert = Some(format!("{}:\n{}", LOAD_FAILED_LABEL, e));
                }
            }
        }
    }

    fn start_export(&mut self) {
        if !self.state.has_image() {
            self.alert = Some(ExportError::NoImage.to_string());
            return;
        }
        let stem = std::path::Path::new(&self.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mosaic".to_string());
        let mut dialog = rfd::FileDialog::new()
            .add_filter("PNG", &["png"])
            .set_file_name(format!("{}_osmosis.png", stem));
        if let Some(dir) = &self.settings.last_dir {
            dialog = dialog.set_directory(dir);
        }
        let Some(path) = dialog.save_file() else { return };

        let snapshot = self.state.clone();
        let sender = self.export_sender.clone();
        self.export_running = true;
        self.status = "Exporting…".to_string();
        rayon::spawn(move || {
            let start = Instant::now();
            let msg = match export::export_to_file(&snapshot, &path, false) {
                Ok(size) => ExportResult::Done { path, size, elapsed: start.elapsed() },
                Err(e) => {
                    osmosis::log_err!("Export failed: {}", e);
                    ExportResult::Failed(e.to_string())
                }
            };
            let _ = sender.send(msg);
        });
    }

    fn poll_exports(&mut self) {
        while let Ok(result) = self.export_receiver.try_recv() {
            self.export_running = false;
            match result {
                ExportResult::Done { path, size, elapsed } => {
                    self.status = format!(
                        "Saved {} ({}×{}, {:.1}s)",
                        path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
                        size.0,
                        size.1,
                        elapsed.as_secs_f32()
                    );
                }
                ExportResult::Failed(e) => {
                    self.status.clear();
                    self.alert = Some(format!("Export failed:\n{}", e));
                }
            }
        }
    }

    // ---- side panel ----

    fn show_controls(&mut self, ui: &mut egui::Ui) {
        egui::ScrollArea::vertical().show(ui, |ui| {
            self.file_section(ui);
            ui.separator();
            self.layout_section(ui);
            ui.separator();
            self.style_section(ui);
            if self.state.mode().is_freestyle() {
                ui.separator();
                self.dimension_section(ui);
            }
            ui.separator();
            self.canvas_section(ui);
            ui.separator();
            self.export_section(ui);
        });
    }

    fn file_section(&mut self, ui: &mut egui::Ui) {
        ui.heading("Image");
        ui.horizontal(|ui| {
            if ui.button("Open…").clicked()
                && let Some(path) = self.pick_image()
            {
                self.open_image(path);
            }
            if ui.button("Clear").clicked() {
                match self.state.clear_image() {
                    Ok(task) => {
                        self.file_name.clear();
                        self.schedule(task);
                    }
                    Err(e) => self.alert = Some(e.to_string()),
                }
            }
        });
        let name = if self.loads.is_pending() {
            "Loading…"
        } else if self.file_name.is_empty() {
            "No image"
        } else {
            self.file_name.as_str()
        };
        ui.label(name);
    }

    fn layout_section(&mut self, ui: &mut egui::Ui) {
        ui.heading("Layout");
        ui.horizontal(|ui| {
            for &mode in LayoutMode::all() {
                if ui.selectable_label(self.state.mode() == mode, mode.label()).clicked() {
                    let task = self.state.set_layout_mode(mode);
                    self.schedule(task);
                }
            }
        });

        ui.horizontal(|ui| {
            ui.label("Cells");
            let resp = ui.add(egui::TextEdit::singleline(&mut self.cell_count_text).desired_width(50.0));
            if resp.lost_focus() {
                match self.cell_count_text.trim().parse::<usize>() {
                    Ok(n) if n != self.state.cell_count() => {
                        let task = self.state.set_cell_count(n);
                        self.schedule(task);
                    }
                    Ok(_) => {}
                    Err(_) => osmosis::log_info!("Cell count '{}' ignored", self.cell_count_text),
                }
                self.cell_count_text = self.state.cell_count().to_string();
            }
            ui.weak(format!("{}–{}", CELL_COUNT_MIN, CELL_COUNT_MAX));
        });

        ui.horizontal(|ui| {
            ui.label("Content");
            for (label, mode) in [("Image", ContentMode::Image), ("Color", ContentMode::Color)] {
                if ui.selectable_label(self.state.style.content_mode == mode, label).clicked() {
                    let task = self.state.set_content_mode(mode);
                    self.schedule(task);
                }
            }
        });

        if self.state.mode() == LayoutMode::Scatter {
            let mut chaos = self.state.chaos();
            if ui.add(egui::Slider::new(&mut chaos, CHAOS_RANGE).text("Chaos")).drag_released() {
                let task = self.state.set_chaos(chaos);
                self.schedule(task);
            }
            let mut zoom = self.state.scatter_zoom();
            if ui.add(egui::Slider::new(&mut zoom, SCATTER_ZOOM_RANGE).text("Zoom %")).drag_released() {
                let task = self.state.set_scatter_zoom(zoom);
                self.schedule(task);
            }
        }

        ui.horizontal(|ui| {
            if ui.button("Reset Layout").clicked() {
                match self.state.reset_layout() {
                    Ok(task) => self.schedule(task),
                    Err(e) => self.alert = Some(e.to_string()),
                }
            }
            if self.state.mode().is_freestyle()
                && ui.button("Randomize").clicked()
                && let Some(task) = self.state.randomize_positions()
            {
                self.schedule(task);
            }
        });
    }

    fn style_section(&mut self, ui: &mut egui::Ui) {
        ui.heading("Style");
        let now = Instant::now();
        for field in StyleField::ALL {
            let range = field.range();
            let current = field.get(&self.state);
            ui.label(field.label());
            ui.horizontal(|ui| {
                let mut v = current;
                let slider = ui.add(egui::Slider::new(&mut v, range.clone()).show_value(false));
                if slider.changed() {
                    let task = field.set(&mut self.state, v);
                    self.schedule(task);
                }

                let edit = self.inline_edits.entry(field).or_default();
                if self.editing_field != Some(field) {
                    edit.begin(field.get(&self.state));
                }
                let flagged = edit.has_error(now);
                let mut text_edit = egui::TextEdit::singleline(&mut edit.text).desired_width(56.0);
                if flagged {
                    text_edit = text_edit.text_color(Color32::from_rgb(230, 70, 70));
                }
                let resp = ui.add(text_edit);
                if resp.gained_focus() {
                    self.editing_field = Some(field);
                }
                if resp.lost_focus() {
                    self.editing_field = None;
                    let current = field.get(&self.state);
                    if let Some(accepted) = edit.commit(current, &range, now) {
                        let task = field.set(&mut self.state, accepted);
                        self.scheduler.schedule(task);
                    }
                }
                if let Some(left) = edit.error_remaining(now) {
                    ui.ctx().request_repaint_after(left);
                }
            });
        }

        ui.horizontal(|ui| {
            ui.label("Fit");
            for (label, fit) in [("Fill", ImageFit::Fill), ("Cover", ImageFit::Cover)] {
                if ui.selectable_label(self.state.image_fit == fit, label).clicked() {
                    let task = self.state.set_image_fit(fit);
                    self.schedule(task);
                }
            }
        });
    }

    fn dimension_section(&mut self, ui: &mut egui::Ui) {
        ui.heading("Cell Dimensions");
        match self.state.selected_cell() {
            Some(i) => ui.label(format!("Cell #{} selected", i + 1)),
            None => ui.label("All cells"),
        };
        let mut w = self.state.dims.width;
        let mut h = self.state.dims.height;
        ui.horizontal(|ui| {
            ui.label("W");
            if ui.add(egui::DragValue::new(&mut w).clamp_range(2.0..=4000.0)).changed() {
                let task = self.state.set_dimension_width(w);
                self.schedule(task);
            }
            let lock = if self.state.dims.is_locked() { "🔒" } else { "🔓" };
            if ui.button(lock).on_hover_text("Lock aspect ratio").clicked() {
                let task = self.state.toggle_aspect_lock();
                self.schedule(task);
            }
            ui.label("H");
            if ui.add(egui::DragValue::new(&mut h).clamp_range(2.0..=4000.0)).changed() {
                let task = self.state.set_dimension_height(h);
                self.schedule(task);
            }
        });
        if self.state.selected_cell().is_some() && ui.button("Deselect").clicked() {
            let task = self.state.deselect_cell();
            self.schedule(task);
        }
    }

    fn canvas_section(&mut self, ui: &mut egui::Ui) {
        ui.heading("Canvas");
        let current = self.state.frame.ratio;
        let current_label = RATIO_PRESETS
            .iter()
            .find(|(_, r)| *r == current)
            .map(|(l, _)| l.to_string())
            .unwrap_or_else(|| current.to_string());
        egui::ComboBox::from_id_source("canvas_ratio")
            .selected_text(current_label)
            .show_ui(ui, |ui| {
                for (label, ratio) in RATIO_PRESETS {
                    if ui.selectable_label(current == *ratio, *label).clicked() {
                        let task = self.state.set_canvas_ratio(*ratio);
                        self.schedule(task);
                    }
                }
            });

        let bg = self.state.frame.background;
        ui.horizontal(|ui| {
            if ui.selectable_label(bg == Background::Transparent, "None").clicked() {
                let task = self.state.set_background(Background::Transparent);
                self.schedule(task);
            }
            if ui.selectable_label(matches!(bg, Background::Solid(_)), "Color").clicked() {
                let task = self.state.set_background(Background::Solid(self.state.background_color));
                self.schedule(task);
            }
            if ui.selectable_label(bg == Background::Image, "Image").clicked() {
                let task = self.state.set_background(Background::Image);
                self.schedule(task);
            }
        });

        if let Background::Solid(_) = bg {
            ui.horizontal(|ui| {
                let mut rgb = self.state.background_color;
                if ui.color_edit_button_srgb(&mut rgb).changed() {
                    let task = self.state.set_background(Background::Solid(rgb));
                    self.schedule(task);
                }
                for hex in self.state.swatches() {
                    let Some(rgb) = osmosis::color::parse_hex(&hex) else { continue };
                    let (rect, resp) = ui.allocate_exact_size(Vec2::splat(16.0), Sense::click());
                    ui.painter().rect_filled(rect, 2.0, Color32::from_rgb(rgb[0], rgb[1], rgb[2]));
                    if resp.on_hover_text(hex.as_str()).clicked() {
                        let task = self.state.set_background(Background::Solid(rgb));
                        self.schedule(task);
                    }
                }
            });
        }
        if bg == Background::Image {
            let source = self.state.background_image().map_or("Using the source image", |b| b.name.as_str());
            ui.weak(source);
        }
        if bg == Background::Image && ui.button("Background image…").clicked()
            && let Some(path) = self.pick_image()
        {
            self.background_loads.request(path);
        }
    }

    fn export_section(&mut self, ui: &mut egui::Ui) {
        ui.heading("Export");
        ui.horizontal(|ui| {
            ui.label("Scale");
            for s in EXPORT_SCALES {
                if ui.selectable_label(self.state.frame.export_scale() == s, format!("{}×", s)).clicked() {
                    let task = self.state.set_export_scale(s);
                    self.schedule(task);
                }
            }
        });
        if let Ok((w, h)) = export::output_size(&self.state) {
            ui.weak(format!("{} × {} px", w, h));
        }
        ui.add_enabled_ui(!self.export_running, |ui| {
            if ui.button("Export PNG…").clicked() {
                self.start_export();
            }
        });
        if !self.status.is_empty() {
            ui.label(self.status.as_str());
        }
    }

    // ---- preview ----

    fn run_frame_tasks(&mut self) {
        if self.scheduler.is_idle() {
            return;
        }
        let container = (self.preview_area.width(), self.preview_area.height());
        for task in self.scheduler.drain() {
            match task {
                FrameTask::FullRender => self.preview.rebuild(&self.state, container),
                FrameTask::StyleUpdate => {
                    if self.preview.update_styles(&self.state) {
                        self.preview.rebuild(&self.state, container);
                    }
                }
                FrameTask::SidebarRefresh => {
                    self.cell_count_text = self.state.cell_count().to_string();
                }
            }
        }
    }

    fn handle_pointer(&mut self, response: &egui::Response, frame_origin: Pos2) {
        let p = response.interact_pointer_pos().map(|pos| (pos.x - frame_origin.x, pos.y - frame_origin.y));

        if response.drag_started()
            && let Some(p) = p
            && let Some(scene) = self.preview.scene()
            && let Some(hit) = scene.hit_test(p)
        {
            let mapping = DragMapping::of(scene);
            if scene.mode == LayoutMode::Grid {
                if let Some((row, col)) = scene.nodes[hit.node].grid_position() {
                    self.state.begin_track_drag(row, col, p);
                    self.drag_mapping = Some(mapping);
                }
            } else {
                if let Some(task) = self.state.select_cell(hit.index) {
                    self.schedule(task);
                }
                let lp = mapping.to_layout(p);
                if hit.edges.any() {
                    self.state.begin_cell_resize(hit.index, hit.edges, lp);
                } else {
                    self.state.begin_cell_move(hit.index, lp);
                }
                self.drag_mapping = Some(mapping);
            }
        } else if response.dragged()
            && let Some(p) = p
            && let Some(mapping) = self.drag_mapping
        {
            let pointer = match self.state.drag() {
                Some(DragState::Track(_)) => p,
                _ => mapping.to_layout(p),
            };
            if let Some(task) = self.state.drag_to(pointer, mapping.grid_px) {
                self.schedule(task);
                self.schedule(FrameTask::SidebarRefresh);
            }
        }

        if response.drag_released() || (!response.dragged() && self.state.is_dragging()) {
            self.state.end_drag();
            self.drag_mapping = None;
        } else if response.clicked()
            && self.state.mode().is_freestyle()
            && let Some(p) = p
            && let Some(scene) = self.preview.scene()
        {
            let task = match scene.hit_test(p) {
                Some(hit) => self.state.select_cell(hit.index),
                None => Some(self.state.deselect_cell()),
            };
            if let Some(task) = task {
                self.schedule(task);
            }
        }
    }

    fn sync_textures(&mut self, ctx: &egui::Context) {
        let Some(scene) = self.preview.scene() else {
            self.crop_textures.clear();
            return;
        };
        if scene.crop_generation != self.texture_generation {
            self.crop_textures.clear();
            self.texture_generation = scene.crop_generation;
        }
        for node in &scene.nodes {
            let (CellFill::Crop { row, col, .. }, Some(crop)) = (&node.fill, &node.crop) else { continue };
            self.crop_textures.entry((*row, *col)).or_insert_with(|| {
                ctx.load_texture(
                    format!("crop_{}_{}", row, col),
                    color_image(crop),
                    TextureOptions::LINEAR,
                )
            });
        }

        let size = (scene.frame.width.round() as u32, scene.frame.height.round() as u32);
        if scene.background == Background::Transparent
            && self.checker_texture.as_ref().map(|(s, _)| *s) != Some(size)
        {
            let checker = raster::checkerboard(size.0.max(1), size.1.max(1), CHECKER_TILE);
            let tex = ctx.load_texture("checker", color_image(&checker), TextureOptions::NEAREST);
            self.checker_texture = Some((size, tex));
        }

        if scene.background == Background::Image
            && let Some(bg) = self.state.background_fill_image()
            && self.background_texture.as_ref().map(|(id, _)| *id) != Some(bg.id)
        {
            let small = downscale(&bg.pixels, BACKGROUND_PREVIEW_MAX);
            let tex = ctx.load_texture("background", color_image(&small), TextureOptions::LINEAR);
            self.background_texture = Some((bg.id, tex));
        }
    }

    fn paint_scene(&self, painter: &egui::Painter, frame_rect: Rect) {
        let Some(scene) = self.preview.scene() else { return };
        let painter = painter.with_clip_rect(frame_rect);
        let full_uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));

        match scene.background {
            Background::Transparent => {
                if let Some((_, tex)) = &self.checker_texture {
                    painter.image(tex.id(), frame_rect, full_uv, Color32::WHITE);
                }
            }
            Background::Solid([r, g, b]) => painter.rect_filled(frame_rect, 0.0, Color32::from_rgb(r, g, b)),
            Background::Image => {
                if let Some((_, tex)) = &self.background_texture {
                    let [tw, th] = tex.size();
                    let c = cover_rect(frame_rect.width(), frame_rect.height(), tw as f32 / th.max(1) as f32);
                    let dest = Rect::from_min_size(frame_rect.min + Vec2::new(c.x, c.y), Vec2::new(c.width, c.height));
                    painter.image(tex.id(), dest, full_uv, Color32::WHITE);
                }
            }
        }

        for node in &scene.nodes {
            let texture = match node.fill {
                CellFill::Crop { row, col, .. } => self.crop_textures.get(&(row, col)).map(|t| t.id()),
                CellFill::Solid(_) => None,
            };
            painter.add(egui::Shape::mesh(cell_mesh(node, frame_rect.min, texture)));

            if scene.mode.is_freestyle() && self.state.selected_cell() == Some(node.index) {
                let pts = node
                    .resolved
                    .outline(CORNER_SEGMENTS)
                    .into_iter()
                    .map(|((x, y), _)| frame_rect.min + Vec2::new(x, y))
                    .collect();
                painter.add(egui::Shape::closed_line(pts, Stroke::new(2.0, Color32::from_rgb(60, 140, 255))));
            }
        }

        let guide = Stroke::new(1.0, Color32::from_white_alpha(90));
        for ((x0, y0), (x1, y1)) in &scene.crosshairs {
            painter.line_segment(
                [frame_rect.min + Vec2::new(*x0, *y0), frame_rect.min + Vec2::new(*x1, *y1)],
                guide,
            );
        }
    }
}

fn to_screen_rect(r: CellRect) -> Rect {
    Rect::from_min_size(Pos2::new(r.x, r.y), Vec2::new(r.width, r.height))
}

fn color_image(img: &RgbaImage) -> ColorImage {
    ColorImage::from_rgba_unmultiplied([img.width() as usize, img.height() as usize], img.as_raw())
}

fn downscale(img: &RgbaImage, max: u32) -> RgbaImage {
    let longest = img.width().max(img.height());
    if longest <= max {
        return img.clone();
    }
    let s = max as f32 / longest as f32;
    let w = ((img.width() as f32 * s).round() as u32).max(1);
    let h = ((img.height() as f32 * s).round() as u32).max(1);
    imageops::resize(img, w, h, FilterType::Triangle)
}

/// Triangle fan over the cell's rounded outline.
fn cell_mesh(node: &PreviewNode, origin: Pos2, texture: Option<TextureId>) -> egui::Mesh {
    let r = &node.resolved;
    let (tex, color, uv_rect) = match (node.fill, texture) {
        (CellFill::Crop { uv, .. }, Some(id)) => (id, Color32::WHITE, Some(uv)),
        (CellFill::Solid([cr, cg, cb]), _) => (TextureId::default(), Color32::from_rgb(cr, cg, cb), None),
        (CellFill::Crop { .. }, None) => (TextureId::default(), Color32::from_gray(128), None),
    };
    let map_uv = |(u, v): (f32, f32)| match uv_rect {
        Some(CellRect { x, y, width, height }) => Pos2::new(x + u * width, y + v * height),
        None => WHITE_UV,
    };
    let to_screen = |(x, y): (f32, f32)| origin + Vec2::new(x, y);

    let outline = r.outline(CORNER_SEGMENTS);
    let mut mesh = egui::Mesh::with_texture(tex);
    mesh.vertices.push(Vertex { pos: to_screen(r.center), uv: map_uv((0.5, 0.5)), color });
    for (p, uv) in &outline {
        mesh.vertices.push(Vertex { pos: to_screen(*p), uv: map_uv(*uv), color });
    }
    let n = outline.len() as u32;
    for i in 0..n {
        mesh.add_triangle(0, 1 + i, 1 + (i + 1) % n);
    }
    mesh
}

impl eframe::App for OsmosisApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.viewport().close_requested()) {
            self.state.to_settings(&self.settings).save();
        }

        // --- Dropped files ---
        let dropped: Vec<PathBuf> = ctx.input(|i| i.raw.dropped_files.iter().filter_map(|f| f.path.clone()).collect());
        if let Some(path) = dropped.into_iter().last() {
            self.open_image(path);
        }

        self.poll_loads();
        self.poll_exports();
        if self.loads.is_pending() || self.background_loads.is_pending() || self.export_running {
            ctx.request_repaint_after(Duration::from_millis(50));
        }

        egui::SidePanel::left("controls")
            .resizable(false)
            .exact_width(290.0)
            .show(ctx, |ui| self.show_controls(ui));

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::from_gray(32)))
            .show(ctx, |ui| {
                let area = ui.available_rect_before_wrap();
                if area.size() != self.preview_area.size() {
                    if let Some(task) = self.state.set_viewport(area.width(), area.height()) {
                        self.scheduler.schedule(task);
                    } else {
                        self.scheduler.schedule(FrameTask::FullRender);
                    }
                }
                self.preview_area = area;

                let response = ui.allocate_rect(area, Sense::click_and_drag());
                let container = CellRect::new(area.min.x, area.min.y, area.width(), area.height());
                if let Some(r) = self.preview.frame_rect_in(container) {
                    self.handle_pointer(&response, to_screen_rect(r).min);
                }

                self.run_frame_tasks();
                self.sync_textures(ctx);

                let painter = ui.painter_at(area);
                match self.preview.frame_rect_in(container) {
                    Some(r) if self.state.has_image() => self.paint_scene(&painter, to_screen_rect(r)),
                    _ => {
                        painter.text(
                            area.center(),
                            egui::Align2::CENTER_CENTER,
                            "Open or drop an image to begin",
                            egui::FontId::proportional(18.0),
                            Color32::from_gray(160),
                        );
                    }
                }
            });

        if let Some(msg) = self.alert.clone() {
            egui::Window::new("Osmosis")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label(msg);
                    if ui.button("OK").clicked() {
                        self.alert = None;
                    }
                });
        }
    }
}
