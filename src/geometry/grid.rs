// ============================================================================
// GRID LAYOUT: weighted tracks, rotation table, track-resize protocol
// ============================================================================
//
// Track weights behave like CSS `fr` units: a track's pixel size is its share
// of the weight sum times the axis length.  The image itself is always split
// uniformly; weights only redistribute where each crop lands.

use rand::Rng;

use super::{CellRect, MIN_CELL_PX};

/// Pointer travel (px) before a track drag commits to an axis.
pub const DRAG_THRESHOLD: f32 = 10.0;
/// Weight change per pointer pixel before the response curve.
pub const DRAG_SENSITIVITY: f32 = 0.005;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Column,
    Row,
}

/// `grid_size × grid_size` cells with per-track weights and per-cell tumble factors.
#[derive(Clone, Debug, PartialEq)]
pub struct GridLayout {
    size: usize,
    pub column_weights: Vec<f32>,
    pub row_weights: Vec<f32>,
    /// Row-major, `row * size + col`, each in [-1, 1].
    pub rotations: Vec<f32>,
}

/// Baseline captured when a track drag starts.  Moves are computed against it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackDrag {
    pub row: usize,
    pub col: usize,
    pub origin: (f32, f32),
    /// `None` until the pointer leaves the dead zone.
    pub axis: Option<Axis>,
    base_column_weight: f32,
    base_row_weight: f32,
}

impl GridLayout {
    pub fn new<R: Rng>(size: usize, rng: &mut R) -> Self {
        let size = size.max(1);
        Self {
            size,
            column_weights: vec![1.0; size],
            row_weights: vec![1.0; size],
            rotations: (0..size * size).map(|_| random_factor(rng)).collect(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cell_count(&self) -> usize {
        self.size * self.size
    }

    /// Change the grid size, keeping weights by track index and rotations by (row, col).
    pub fn resize<R: Rng>(&mut self, new_size: usize, rng: &mut R) {
        let new_size = new_size.max(1);
        if new_size == self.size {
            return;
        }
        self.column_weights = resize_weights(&self.column_weights, new_size, 1.0);
        self.row_weights = resize_weights(&self.row_weights, new_size, 1.0);
        self.rotations = remap_rotations(&self.rotations, self.size, new_size, rng);
        self.size = new_size;
    }

    pub fn reset_weights(&mut self) {
        self.column_weights = vec![1.0; self.size];
        self.row_weights = vec![1.0; self.size];
    }

    pub fn regenerate_rotations<R: Rng>(&mut self, rng: &mut R) {
        self.rotations = (0..self.cell_count()).map(|_| random_factor(rng)).collect();
    }

    pub fn rotation_factor(&self, row: usize, col: usize) -> f32 {
        self.rotations.get(row * self.size + col).copied().unwrap_or(0.0)
    }

    pub fn column_positions(&self, width: f32, snap: bool) -> Vec<f32> {
        track_positions(&self.column_weights, width, snap)
    }

    pub fn row_positions(&self, height: f32, snap: bool) -> Vec<f32> {
        track_positions(&self.row_weights, height, snap)
    }

    /// Destination rectangle of every cell inside a `width × height` box, row-major.
    pub fn cell_rects(&self, width: f32, height: f32, snap: bool) -> Vec<(usize, usize, CellRect)> {
        let cols = self.column_positions(width, snap);
        let rows = self.row_positions(height, snap);
        let mut out = Vec::with_capacity(self.cell_count());
        for row in 0..self.size {
            for col in 0..self.size {
                out.push((
                    row,
                    col,
                    CellRect::new(
                        cols[col],
                        rows[row],
                        cols[col + 1] - cols[col],
                        rows[row + 1] - rows[row],
                    ),
                ));
            }
        }
        out
    }

    /// Fractional offsets (0..1) of the interior boundaries: (vertical lines, horizontal lines).
    pub fn crosshairs(&self) -> (Vec<f32>, Vec<f32>) {
        let inner = |w: &[f32]| {
            let p = track_positions(w, 1.0, false);
            p[1..p.len() - 1].to_vec()
        };
        (inner(&self.column_weights), inner(&self.row_weights))
    }

    /// Uniform source crop of cell (row, col) in image pixels.
    pub fn source_rect(&self, row: usize, col: usize, image_w: f32, image_h: f32) -> CellRect {
        let cw = image_w / self.size as f32;
        let ch = image_h / self.size as f32;
        CellRect::new(col as f32 * cw, row as f32 * ch, cw, ch)
    }

    pub fn begin_track_drag(&self, row: usize, col: usize, origin: (f32, f32)) -> TrackDrag {
        let row = row.min(self.size - 1);
        let col = col.min(self.size - 1);
        TrackDrag {
            row,
            col,
            origin,
            axis: None,
            base_column_weight: self.column_weights[col],
            base_row_weight: self.row_weights[row],
        }
    }

    /// Apply one drag frame.  `grid_px` is the rendered grid size in pixels.
    /// Returns `true` when a weight changed.
    pub fn drag_track(&mut self, drag: &mut TrackDrag, pointer: (f32, f32), grid_px: (f32, f32)) -> bool {
        let dx = pointer.0 - drag.origin.0;
        let dy = pointer.1 - drag.origin.1;

        let axis = match drag.axis {
            Some(axis) => axis,
            None => {
                if dx.abs() <= DRAG_THRESHOLD && dy.abs() <= DRAG_THRESHOLD {
                    return false;
                }
                let axis = if dx.abs() > dy.abs() { Axis::Column } else { Axis::Row };
                drag.axis = Some(axis);
                axis
            }
        };

        let (weights, index, base, delta, length) = match axis {
            Axis::Column => (&mut self.column_weights, drag.col, drag.base_column_weight, dx, grid_px.0),
            Axis::Row => (&mut self.row_weights, drag.row, drag.base_row_weight, dy, grid_px.1),
        };

        let Some((min_w, max_w)) = weight_bounds(weights, index, length) else {
            return false;
        };
        let proposed = base + response_curve(delta * DRAG_SENSITIVITY);
        // Lower bound wins when the two disagree.
        let next = proposed.min(max_w).max(min_w);
        if next == weights[index] {
            return false;
        }
        weights[index] = next;
        true
    }
}

/// Uniform random tumble factor in [-1, 1].
pub fn random_factor<R: Rng>(rng: &mut R) -> f32 {
    rng.random_range(-1.0f32..=1.0)
}

/// `Δ + Δ·|Δ|·0.5`: fine control near zero, faster travel for long drags.
pub fn response_curve(raw: f32) -> f32 {
    raw + raw * raw.abs() * 0.5
}

/// Boundaries of every track (len = weights + 1) along an axis of `length` px.
///
/// Each boundary derives from the cumulative weight sum, so error never
/// accumulates across tracks.  With `snap` the interior boundaries are rounded
/// to whole pixels and the last one is pinned to `length`.
pub fn track_positions(weights: &[f32], length: f32, snap: bool) -> Vec<f32> {
    let total: f32 = weights.iter().sum();
    let mut out = Vec::with_capacity(weights.len() + 1);
    out.push(0.0);
    if weights.is_empty() {
        return out;
    }
    let mut acc = 0.0f32;
    for (i, w) in weights.iter().enumerate() {
        acc += w;
        let pos = if i == weights.len() - 1 {
            length
        } else if total > 0.0 {
            acc / total * length
        } else {
            length * (i + 1) as f32 / weights.len() as f32
        };
        out.push(if snap && i != weights.len() - 1 { pos.round() } else { pos });
    }
    out
}

/// Allowed weight range for track `index` so that neither it nor any other
/// track renders below [`MIN_CELL_PX`] along an axis of `length` px.
///
/// With `S` the sum and `m` the minimum of the other weights:
/// `max = m·L/p − S` keeps the smallest neighbour ≥ p, and
/// `min = p·S/(L − p)` keeps the dragged track ≥ p.
pub fn weight_bounds(weights: &[f32], index: usize, length: f32) -> Option<(f32, f32)> {
    if index >= weights.len() || length <= MIN_CELL_PX {
        return None;
    }
    let others = weights
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, w)| *w);
    let (sum, min) = others.fold((0.0f32, f32::INFINITY), |(s, m), w| (s + w, m.min(w)));
    if !min.is_finite() {
        return None;
    }
    let max_w = min * length / MIN_CELL_PX - sum;
    let min_w = MIN_CELL_PX * sum / (length - MIN_CELL_PX);
    Some((min_w, max_w))
}

/// Truncate or extend with `default`; an empty source yields a fresh vector.
pub fn resize_weights(weights: &[f32], len: usize, default: f32) -> Vec<f32> {
    if weights.is_empty() {
        return vec![default; len];
    }
    let mut out: Vec<f32> = weights.iter().copied().take(len).collect();
    out.resize(len, default);
    out
}

/// Re-index a row-major rotation table from `old_size²` to `new_size²` cells.
/// Cells present in both grids keep their factor; new cells draw a fresh one.
pub fn remap_rotations<R: Rng>(old: &[f32], old_size: usize, new_size: usize, rng: &mut R) -> Vec<f32> {
    let mut out = Vec::with_capacity(new_size * new_size);
    for i in 0..new_size * new_size {
        let row = i / new_size;
        let col = i % new_size;
        let kept = if row < old_size && col < old_size {
            old.get(row * old_size + col).copied()
        } else {
            None
        };
        out.push(match kept {
            Some(v) => v,
            None => random_factor(rng),
        });
    }
    out
}
