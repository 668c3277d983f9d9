// ============================================================================
// EXPORT COMPOSITOR: full-resolution raster of the current composition
// ============================================================================

use std::fmt;
use std::path::Path;
use std::time::Instant;

use image::{ImageError, RgbaImage};

use crate::editor::{EditorState, NoImage};
use crate::geometry::{CellRect, LayoutMode};
use crate::params::{Background, ContentMode};
use crate::render::raster::{composite_scaled, draw_cell, fill_solid, paint_cover};
use crate::scene::{CellFill, Framing, LaidOutCell, SceneFrame, export_size, layout_cells, layout_freestyle};
use crate::transform::{ResolvedCell, fit_source_rect};

#[derive(Debug)]
pub enum ExportError {
    NoImage,
    ZeroSize,
    Encode(ImageError),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::NoImage => write!(f, "{}", NoImage),
            ExportError::ZeroSize => write!(f, "Export size is zero"),
            ExportError::Encode(e) => write!(f, "Encode error: {}", e),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<ImageError> for ExportError {
    fn from(e: ImageError) -> Self {
        ExportError::Encode(e)
    }
}

impl From<NoImage> for ExportError {
    fn from(_: NoImage) -> Self {
        ExportError::NoImage
    }
}

/// Pixel size the next [`export`] will produce.
pub fn output_size(state: &EditorState) -> Result<(u32, u32), ExportError> {
    let image = state.image().ok_or(ExportError::NoImage)?;
    let (w, h) = export_size(state.frame.ratio, state.frame.export_scale(), image.width(), image.height());
    if w == 0 || h == 0 {
        return Err(ExportError::ZeroSize);
    }
    Ok((w, h))
}

/// Render the composition: background, then the content layer scaled about
/// the frame center.
pub fn export(state: &EditorState) -> Result<RgbaImage, ExportError> {
    let image = state.image().ok_or(ExportError::NoImage)?;
    let (w, h) = output_size(state)?;
    let start = Instant::now();
    crate::log_info!("Export started: {}x{} ({} mode)", w, h, state.mode().label());

    let mut canvas = RgbaImage::new(w, h);
    match state.frame.background {
        Background::Transparent => {}
        Background::Solid(rgb) => fill_solid(&mut canvas, rgb),
        Background::Image => {
            if let Some(bg) = state.background_fill_image() {
                paint_cover(&mut canvas, &bg.pixels);
            }
        }
    }

    let frame = SceneFrame::new(w as f32, h as f32, image.aspect(), state.style.content_scale());
    let mut layer = RgbaImage::new(w, h);
    for cell in layout_cells(state, frame.content, true) {
        let resolved = cell.resolve(state);
        draw_cell(&mut layer, &resolved, &cell.fill, Some(&image.pixels));
    }
    composite_scaled(&mut canvas, &layer, frame.content_scale);

    crate::log_info!("Export finished: {}x{} in {:.2?}", w, h, start.elapsed());
    Ok(canvas)
}

fn untransformed(bounds: CellRect, radius: f32) -> ResolvedCell {
    ResolvedCell {
        center: bounds.center(),
        width: bounds.width,
        height: bounds.height,
        rotation: 0.0,
        radius,
    }
}

/// Layout-only export with no style transforms and no background.
///
/// Grid: weighted tracks at the image's own pixel size.  Freestyle: cells at
/// their live bounds, cropped to the arrangement, pill-clipped whenever the
/// border radius is non-zero.
pub fn export_raw(state: &EditorState) -> Result<RgbaImage, ExportError> {
    let image = state.image().ok_or(ExportError::NoImage)?;
    let start = Instant::now();

    let canvas = match state.mode() {
        LayoutMode::Grid => {
            let (w, h) = (image.width(), image.height());
            let mut canvas = RgbaImage::new(w, h);
            let color_mode = state.style.content_mode == ContentMode::Color;
            for (i, (row, col, rect)) in state.grid.cell_rects(w as f32, h as f32, true).into_iter().enumerate() {
                let fill = match state.cell_colors.get(i) {
                    Some(c) if color_mode => CellFill::Solid(c.to_rgb()),
                    _ => {
                        let n = state.grid.size();
                        let full = state.grid.source_rect(row, col, w as f32, h as f32);
                        let source = fit_source_rect(full, rect.width, rect.height, state.image_fit);
                        CellFill::Crop {
                            row,
                            col,
                            cols: n,
                            rows: n,
                            source,
                            uv: CellRect::new(0.0, 0.0, 1.0, 1.0),
                        }
                    }
                };
                draw_cell(&mut canvas, &untransformed(rect, 0.0), &fill, Some(&image.pixels));
            }
            canvas
        }
        LayoutMode::Scatter | LayoutMode::Palette => {
            let bounds = state.freestyle.live_bounds().ok_or(ExportError::ZeroSize)?;
            let w = bounds.width.ceil() as u32;
            let h = bounds.height.ceil() as u32;
            if w == 0 || h == 0 {
                return Err(ExportError::ZeroSize);
            }
            let framing = Framing { scale: 1.0, offset: (-bounds.x, -bounds.y) };
            let pill = state.style.cell_border_radius() > 0.0;
            let mut canvas = RgbaImage::new(w, h);
            for cell in layout_freestyle(state, framing, (0.0, 0.0)) {
                let LaidOutCell { placement, fill, .. } = cell;
                let b = placement.bounds;
                let radius = if pill { b.width.min(b.height) * 0.5 } else { 0.0 };
                draw_cell(&mut canvas, &untransformed(b, radius), &fill, Some(&image.pixels));
            }
            canvas
        }
    };

    crate::log_info!(
        "Raw export finished: {}x{} in {:.2?}",
        canvas.width(),
        canvas.height(),
        start.elapsed()
    );
    Ok(canvas)
}

/// Render and write a PNG.  Returns the written size.
pub fn export_to_file(state: &EditorState, path: &Path, raw: bool) -> Result<(u32, u32), ExportError> {
    let img = if raw { export_raw(state)? } else { export(state)? };
    crate::io::save_png(&img, path).inspect_err(|e| {
        crate::log_err!("Export write failed for {}: {}", path.display(), e);
    })?;
    crate::log_info!("Exported {}", path.display());
    Ok(img.dimensions())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ImageSource;
    use crate::params::CanvasRatio;
    use image::Rgba;

    fn loaded(w: u32, h: u32) -> EditorState {
        let mut e = EditorState::with_seed(11);
        e.load_image(ImageSource::from_rgba("e", RgbaImage::from_pixel(w, h, Rgba([200, 10, 10, 255]))));
        e
    }

    #[test]
    fn no_image_is_refused() {
        let e = EditorState::with_seed(1);
        assert!(matches!(export(&e), Err(ExportError::NoImage)));
        assert!(matches!(export_raw(&e), Err(ExportError::NoImage)));
        assert_eq!(ExportError::NoImage.to_string(), "Please upload an image first!");
    }

    #[test]
    fn square_ratio_at_scale_two() {
        let mut e = loaded(30, 20);
        e.set_canvas_ratio(CanvasRatio::Ratio(1.0, 1.0));
        e.set_export_scale(2.0);
        assert_eq!(output_size(&e).unwrap(), (4000, 4000));
    }

    #[test]
    fn neutral_grid_export_reproduces_the_image_area() {
        let mut e = loaded(40, 20);
        e.set_background(Background::Solid([0, 0, 255]));
        let out = export(&e).unwrap();
        assert_eq!(out.dimensions(), (2000, 1000));
        assert_eq!(*out.get_pixel(10, 10), Rgba([200, 10, 10, 255]));
        assert_eq!(*out.get_pixel(1990, 990), Rgba([200, 10, 10, 255]));
    }

    #[test]
    fn half_canvas_scale_shows_background_at_edges() {
        let mut e = loaded(40, 40);
        e.set_background(Background::Solid([0, 0, 255]));
        e.set_canvas_scale(50.0);
        let out = export(&e).unwrap();
        assert_eq!(*out.get_pixel(5, 5), Rgba([0, 0, 255, 255]));
        assert_eq!(*out.get_pixel(1000, 1000), Rgba([200, 10, 10, 255]));
    }

    #[test]
    fn raw_grid_keeps_image_size() {
        let e = loaded(37, 23);
        let out = export_raw(&e).unwrap();
        assert_eq!(out.dimensions(), (37, 23));
        assert_eq!(*out.get_pixel(0, 0), Rgba([200, 10, 10, 255]));
    }

    #[test]
    fn raw_scatter_is_cropped_to_arrangement() {
        let mut e = loaded(40, 40);
        e.set_layout_mode(LayoutMode::Scatter);
        let b = e.freestyle.live_bounds().unwrap();
        let out = export_raw(&e).unwrap();
        assert_eq!(out.dimensions(), (b.width.ceil() as u32, b.height.ceil() as u32));
    }
}
