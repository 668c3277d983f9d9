//! End-to-end behaviour of the editor through the public library surface.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use rand::SeedableRng;
use rand_pcg::Pcg32;

use osmosis::color::extract_palette;
use osmosis::editor::EditorState;
use osmosis::geometry::freestyle::{FreestyleLayout, ScatterSettings, shuffle_count};
use osmosis::geometry::grid::{GridLayout, remap_rotations, track_positions};
use osmosis::geometry::{CellRect, LayoutMode};
use osmosis::io::{ImageSource, LoadQueue};
use osmosis::params::{CanvasRatio, StyleParams};
use osmosis::render::export;
use osmosis::render::preview::PreviewRenderer;
use osmosis::scene::{SceneFrame, content_box, layout_cells};
use osmosis::scheduler::{FrameScheduler, FrameTask};
use osmosis::transform::{CellPlacement, ResolvedCell, SpreadReference, resolve};

const EPS: f32 = 1e-3;

fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255]))
}

fn editor_with(w: u32, h: u32) -> EditorState {
    let mut e = EditorState::with_seed(42);
    e.load_image(ImageSource::from_rgba("scenario.png", gradient(w, h)));
    e
}

fn scatter(count: usize, chaos: f32) -> FreestyleLayout {
    let settings = ScatterSettings { count, chaos, zoom: 100.0, cell_size: 0.0, cell_spread: 0.0 };
    FreestyleLayout::init_scatter((1000.0, 800.0), &settings, &mut Pcg32::seed_from_u64(3))
}

#[test]
fn sixteen_cell_grid_tiles_the_fitted_box() {
    let e = editor_with(800, 600);
    assert_eq!(e.mode(), LayoutMode::Grid);
    assert_eq!(e.grid.size(), 4);
    assert!(e.grid.column_weights.iter().all(|w| *w == 1.0));
    assert!(e.grid.row_weights.iter().all(|w| *w == 1.0));

    let b = content_box(800.0, 600.0, 800.0 / 600.0);
    let rects = e.grid.cell_rects(b.width, b.height, false);
    assert_eq!(rects.len(), 16);
    let share = b.width * b.height / 16.0;
    for (_, _, r) in rects {
        assert!((r.width * r.height - share).abs() < 0.01, "cell area {}", r.width * r.height);
    }
}

#[test]
fn zero_chaos_scatter_sits_on_its_base_grid() {
    let layout = scatter(16, 0.0);
    assert_eq!(layout.cells.len(), 16);
    for c in &layout.cells {
        assert_eq!(c.x, c.base_x);
        assert_eq!(c.y, c.base_y);
    }
}

#[test]
fn full_chaos_shuffles_once_per_cell() {
    assert_eq!(shuffle_count(16, 100.0), 16);
    assert_eq!(shuffle_count(16, 50.0), 0);
    assert_eq!(shuffle_count(16, 0.0), 0);
}

#[test]
fn bulk_resize_skips_individually_modified_cells() {
    let mut layout = scatter(9, 0.0);
    layout.select(4);
    layout.apply_dimensions(33.0, 44.0);
    layout.deselect();
    let modified = layout.cells[4];
    assert!(modified.individually_modified);

    let centers: Vec<(f32, f32)> = layout.cells.iter().map(|c| c.rect().center()).collect();
    layout.resize_all_to(120.0, 80.0);

    assert_eq!(layout.cells[4], modified);
    for (i, c) in layout.cells.iter().enumerate().filter(|(i, _)| *i != 4) {
        assert_eq!((c.width, c.height), (120.0, 80.0));
        let (cx, cy) = c.rect().center();
        assert!((cx - centers[i].0).abs() < EPS && (cy - centers[i].1).abs() < EPS);
    }
}

#[test]
fn square_export_at_double_scale() {
    let mut e = editor_with(300, 200);
    e.set_canvas_ratio(CanvasRatio::Ratio(1.0, 1.0));
    e.set_export_scale(2.0);
    assert_eq!(export::output_size(&e).unwrap(), (4000, 4000));
}

#[test]
fn scheduler_coalesces_a_burst_into_one_render() {
    let mut s = FrameScheduler::new();
    for _ in 0..50 {
        s.schedule(FrameTask::StyleUpdate);
        s.schedule(FrameTask::FullRender);
    }
    assert_eq!(s.drain(), vec![FrameTask::FullRender]);
    assert!(s.is_idle());
    assert_eq!(s.frames_drained(), 1);
}

#[test]
fn crop_cache_reuses_then_invalidates_on_partition_change() {
    let mut e = editor_with(640, 480);
    let mut preview = PreviewRenderer::new();
    preview.rebuild(&e, (1000.0, 800.0));
    let misses = preview.cache.misses();
    let generation = preview.cache.generation();
    assert_eq!(misses, 16);

    preview.rebuild(&e, (1000.0, 800.0));
    assert_eq!(preview.cache.misses(), misses);
    assert!(preview.cache.hits() >= 16);
    assert_eq!(preview.cache.generation(), generation);

    e.set_cell_count(9);
    preview.rebuild(&e, (1000.0, 800.0));
    assert!(preview.cache.generation() > generation);
    assert_eq!(preview.cache.len(), 9);
}

#[test]
fn only_the_newest_load_is_applied() {
    let mut q = LoadQueue::new();
    let stale = q.submit_with(PathBuf::from("slow.png"), || {
        thread::sleep(Duration::from_millis(150));
        Ok(ImageSource::from_rgba("slow.png", gradient(4, 4)))
    });
    let fresh = q.submit_with(PathBuf::from("fast.png"), || Ok(ImageSource::from_rgba("fast.png", gradient(8, 8))));
    assert!(fresh > stale);

    let outcome = q.wait(Duration::from_secs(5)).expect("newest load finishes");
    assert_eq!(outcome.ticket, fresh);
    assert_eq!(outcome.result.unwrap().name, "fast.png");

    thread::sleep(Duration::from_millis(300));
    assert!(q.poll().is_none());
}

#[test]
fn palette_has_exactly_the_requested_swatches() {
    let img = gradient(120, 90);
    for n in [1, 5, 16, 64] {
        assert_eq!(extract_palette(&img, n).len(), n);
    }
    let flat = RgbaImage::from_pixel(20, 20, Rgba([10, 200, 30, 255]));
    assert_eq!(extract_palette(&flat, 12).len(), 12);
}

#[test]
fn rotation_remap_keeps_the_shared_corner() {
    let mut rng = Pcg32::seed_from_u64(9);
    let old: Vec<f32> = (0..9).map(|i| i as f32 / 10.0).collect();

    let grown = remap_rotations(&old, 3, 5, &mut rng);
    assert_eq!(grown.len(), 25);
    for row in 0..3 {
        for col in 0..3 {
            assert_eq!(grown[row * 5 + col], old[row * 3 + col]);
        }
    }

    let shrunk = remap_rotations(&old, 3, 2, &mut rng);
    assert_eq!(shrunk, vec![old[0], old[1], old[3], old[4]]);
}

#[test]
fn dragged_tracks_never_drop_below_two_pixels() {
    let mut rng = Pcg32::seed_from_u64(1);
    let mut grid = GridLayout::new(4, &mut rng);
    let px = (10.0, 10.0);
    let pulls = [(-5000.0, 0.0), (5000.0, 0.0), (0.0, -5000.0), (0.0, 5000.0)];
    for (i, pull) in pulls.iter().enumerate() {
        let mut drag = grid.begin_track_drag(i % 4, (i + 1) % 4, (0.0, 0.0));
        grid.drag_track(&mut drag, *pull, px);
        for length in [10.0f32, 100.0, 800.0] {
            let cols = track_positions(&grid.column_weights, length, false);
            let rows = track_positions(&grid.row_weights, length, false);
            for w in cols.windows(2).chain(rows.windows(2)) {
                let min = 2.0 * length / px.0;
                assert!(w[1] - w[0] >= min - EPS, "track {} < {}", w[1] - w[0], min);
            }
        }
    }
}

#[test]
fn neutral_style_is_the_identity_and_full_radius_is_a_pill() {
    let placement = CellPlacement {
        bounds: CellRect::new(10.0, 20.0, 90.0, 30.0),
        spread: SpreadReference::Grid { row: 1, col: 2, rows: 4, cols: 4 },
        rotation_factor: 0.8,
    };
    let r = resolve(&placement, &StyleParams::default());
    assert_eq!(r.center, (55.0, 35.0));
    assert_eq!((r.width, r.height), (90.0, 30.0));
    assert_eq!(r.rotation, 0.0);
    assert_eq!(r.radius, 0.0);

    let mut style = StyleParams::default();
    style.set_cell_border_radius(100.0);
    for (w, h) in [(90.0, 30.0), (30.0, 90.0), (50.0, 50.0)] {
        let p = CellPlacement { bounds: CellRect::new(0.0, 0.0, w, h), ..placement };
        assert_eq!(resolve(&p, &style).radius, w.min(h) / 2.0);
    }
}

#[test]
fn scatter_export_renders_every_cell() {
    let mut e = editor_with(400, 300);
    e.set_layout_mode(LayoutMode::Scatter);
    let out = export::export(&e).unwrap();
    assert_eq!(out.dimensions(), (2000, 1500));
    assert!(out.pixels().any(|p| p.0[3] == 255));
}

/// Center offset from the frame center, size and radius as fractions of the frame, plus rotation.
fn relative(frame: &SceneFrame, r: &ResolvedCell) -> [f32; 6] {
    let (cx, cy) = frame.center();
    [
        (r.center.0 - cx) / frame.width,
        (r.center.1 - cy) / frame.height,
        r.width / frame.width,
        r.height / frame.height,
        r.radius / frame.width,
        r.rotation,
    ]
}

fn assert_same_composition(e: &EditorState) {
    let mut preview = PreviewRenderer::new();
    preview.rebuild(e, (1000.0, 800.0));
    let scene = preview.scene().unwrap();

    let image = e.image().unwrap();
    let (w, h) = export::output_size(e).unwrap();
    let frame = SceneFrame::new(w as f32, h as f32, image.aspect(), e.style.content_scale());
    let exported: Vec<ResolvedCell> = layout_cells(e, frame.content, true)
        .iter()
        .map(|c| frame.scale_cell(&c.resolve(e)))
        .collect();

    assert_eq!(scene.nodes.len(), exported.len());
    for (node, out) in scene.nodes.iter().zip(&exported) {
        let a = relative(&scene.frame, &node.resolved);
        let b = relative(&frame, out);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 2e-3, "cell {}: preview {:?} vs export {:?}", node.index, a, b);
        }
    }
}

fn styled(mode: LayoutMode) -> EditorState {
    let mut e = editor_with(400, 300);
    e.set_layout_mode(mode);
    e.set_cell_size(20.0);
    e.set_cell_spread(30.0);
    e.set_cell_tumble(40.0);
    e.set_cell_border_radius(50.0);
    e.set_canvas_scale(80.0);
    e
}

#[test]
fn preview_and_export_resolve_the_same_grid() {
    assert_same_composition(&styled(LayoutMode::Grid));
}

#[test]
fn preview_and_export_resolve_the_same_scatter() {
    let mut e = styled(LayoutMode::Scatter);
    e.set_canvas_ratio(CanvasRatio::Ratio(1.0, 1.0));
    assert_same_composition(&e);
}

fn max_jitter(cell_size: f32, cell_spread: f32) -> (f32, f32) {
    let settings = ScatterSettings { count: 25, chaos: 100.0, zoom: 100.0, cell_size, cell_spread };
    let layout = FreestyleLayout::init_scatter((1000.0, 800.0), &settings, &mut Pcg32::seed_from_u64(21));
    let cell_w = layout.cells[0].width;
    let max = layout
        .cells
        .iter()
        .map(|c| (c.x - c.base_x).abs())
        .fold(0.0f32, f32::max);
    (max, cell_w)
}

#[test]
fn scatter_jitter_grows_with_size_and_spread() {
    let (base, cell_w) = max_jitter(0.0, 0.0);
    // 0.5 · offset multiplier 1 · chaos 1 · (1 + 0) · (1 + 0)
    assert!(base > 0.0 && base <= cell_w * 0.5 + EPS);

    let (bigger, _) = max_jitter(100.0, 0.0);
    assert!(bigger <= cell_w + EPS);
    let ratio = bigger / base;
    assert!((1.9..=2.1).contains(&ratio), "size 100 ratio {}", ratio);

    let (spread_out, _) = max_jitter(0.0, -200.0);
    let ratio = spread_out / base;
    assert!((1.9..=2.1).contains(&ratio), "|spread| 200 ratio {}", ratio);
}
