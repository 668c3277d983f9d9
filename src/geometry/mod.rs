// ============================================================================
// CELL GEOMETRY: shared rectangle math and layout-mode enums
// ============================================================================

pub mod freestyle;
pub mod grid;

/// No rendered cell track or freestyle cell may fall below this many pixels.
pub const MIN_CELL_PX: f32 = 2.0;

/// Axis-aligned rectangle in f32 pixel space (top-left origin).
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct CellRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CellRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle of the given size centered on `(cx, cy)`.
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width * 0.5, cy - height * 0.5, width, height)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 { self.width / self.height } else { 1.0 }
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &CellRect) -> CellRect {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        CellRect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Map through `p * scale + offset` on both axes.
    pub fn scaled(&self, scale: f32, offset: (f32, f32)) -> CellRect {
        CellRect::new(
            self.x * scale + offset.0,
            self.y * scale + offset.1,
            self.width * scale,
            self.height * scale,
        )
    }
}

/// Bounding rectangle of a set of rectangles, `None` when empty.
pub fn bounds_of<I: IntoIterator<Item = CellRect>>(rects: I) -> Option<CellRect> {
    rects.into_iter().reduce(|acc, r| acc.union(&r))
}

/// Largest `aspect`-shaped box that fits inside `container` ("contain" fit).
pub fn fit_aspect(container_w: f32, container_h: f32, aspect: f32) -> (f32, f32) {
    if container_h <= 0.0 || aspect <= 0.0 {
        return (container_w.max(0.0), container_h.max(0.0));
    }
    if container_w / container_h > aspect {
        (container_h * aspect, container_h)
    } else {
        (container_w, container_w / aspect)
    }
}

/// Smallest `aspect`-shaped rectangle covering the container, centered on it.
pub fn cover_rect(container_w: f32, container_h: f32, aspect: f32) -> CellRect {
    if container_h <= 0.0 || aspect <= 0.0 {
        return CellRect::new(0.0, 0.0, container_w, container_h);
    }
    if container_w / container_h > aspect {
        let h = container_w / aspect;
        CellRect::new(0.0, (container_h - h) * 0.5, container_w, h)
    } else {
        let w = container_h * aspect;
        CellRect::new((container_w - w) * 0.5, 0.0, w, container_h)
    }
}

/// Which partition strategy is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LayoutMode {
    #[default]
    Grid,
    Scatter,
    Palette,
}

impl LayoutMode {
    pub fn label(&self) -> &'static str {
        match self {
            LayoutMode::Grid => "Grid",
            LayoutMode::Scatter => "Scatter",
            LayoutMode::Palette => "Palette",
        }
    }

    pub fn all() -> &'static [LayoutMode] {
        &[LayoutMode::Grid, LayoutMode::Scatter, LayoutMode::Palette]
    }

    pub fn parse(s: &str) -> Option<LayoutMode> {
        match s.trim().to_lowercase().as_str() {
            "grid" => Some(LayoutMode::Grid),
            "scatter" | "freestyle" => Some(LayoutMode::Scatter),
            "palette" => Some(LayoutMode::Palette),
            _ => None,
        }
    }

    /// Scatter and Palette share the freestyle cell collection.
    pub fn is_freestyle(&self) -> bool {
        !matches!(self, LayoutMode::Grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_aspect_letterboxes_wide_container() {
        let (w, h) = fit_aspect(1000.0, 600.0, 4.0 / 3.0);
        assert_eq!(h, 600.0);
        assert!((w - 800.0).abs() < 1e-3);
    }

    #[test]
    fn fit_aspect_pillarboxes_tall_container() {
        let (w, h) = fit_aspect(400.0, 900.0, 2.0);
        assert_eq!(w, 400.0);
        assert_eq!(h, 200.0);
    }

    #[test]
    fn cover_rect_overflows_one_axis_and_stays_centered() {
        let r = cover_rect(100.0, 100.0, 2.0);
        assert_eq!(r.height, 100.0);
        assert_eq!(r.width, 200.0);
        assert_eq!(r.center(), (50.0, 50.0));
    }

    #[test]
    fn bounds_of_unions_all_rects() {
        let b = bounds_of([
            CellRect::new(10.0, 10.0, 5.0, 5.0),
            CellRect::new(-3.0, 2.0, 4.0, 30.0),
        ])
        .unwrap();
        assert_eq!(b, CellRect::new(-3.0, 2.0, 18.0, 30.0));
        assert!(bounds_of(std::iter::empty()).is_none());
    }

    #[test]
    fn layout_mode_parses_legacy_freestyle_name() {
        assert_eq!(LayoutMode::parse("Freestyle"), Some(LayoutMode::Scatter));
        assert_eq!(LayoutMode::parse("nope"), None);
    }
}
