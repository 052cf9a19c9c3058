use crate::map::polygon::BBox;
use std::collections::HashMap;

/// Spatial index for municipality shapes using conservative approximation.
/// Each shape's bounding box is indexed into every cell it overlaps,
/// guaranteeing no false negatives while allowing false positives
/// (eliminated by the exact point-in-polygon test).
pub struct FeatureGrid {
    cells: HashMap<(i32, i32), Vec<usize>>,
    cell_size: f64,
    /// Union of all indexed bboxes
    extent: BBox,
}

impl FeatureGrid {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cells: HashMap::new(),
            cell_size,
            extent: BBox::empty(),
        }
    }

    #[inline(always)]
    fn to_cell(&self, lon: f64, lat: f64) -> (i32, i32) {
        let x = (lon / self.cell_size).floor() as i32;
        let y = (lat / self.cell_size).floor() as i32;
        (x, y)
    }

    /// Build from `(feature index, bbox)` pairs
    pub fn build(bboxes: impl Iterator<Item = (usize, BBox)>, cell_size: f64) -> Self {
        let mut grid = Self::new(cell_size);
        for (idx, bbox) in bboxes {
            grid.extent = grid.extent.union(&bbox);
            let min_cell = grid.to_cell(bbox.min.x, bbox.min.y);
            let max_cell = grid.to_cell(bbox.max.x, bbox.max.y);
            for y in min_cell.1..=max_cell.1 {
                for x in min_cell.0..=max_cell.0 {
                    grid.cells.entry((x, y)).or_default().push(idx);
                }
            }
        }
        grid
    }

    /// Candidate features whose bbox may contain the point
    #[inline]
    pub fn at(&self, lon: f64, lat: f64) -> &[usize] {
        self.cells
            .get(&self.to_cell(lon, lat))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Inclusive cell range covering `bounds`, clipped to the indexed extent.
    /// `None` when the bounds miss every indexed shape.
    pub fn cell_range(&self, bounds: &BBox) -> Option<((i32, i32), (i32, i32))> {
        let clipped = bounds.intersection(&self.extent);
        if clipped.is_empty() {
            return None;
        }
        Some((
            self.to_cell(clipped.min.x, clipped.min.y),
            self.to_cell(clipped.max.x, clipped.max.y),
        ))
    }

    /// Append feature indices for the given bounds into results vec.
    /// May contain duplicates; caller should dedup after all queries.
    pub fn query_into(&self, bounds: &BBox, results: &mut Vec<usize>) {
        let Some((min_cell, max_cell)) = self.cell_range(bounds) else {
            return;
        };
        for y in min_cell.1..=max_cell.1 {
            for x in min_cell.0..=max_cell.0 {
                if let Some(indices) = self.cells.get(&(x, y)) {
                    results.extend_from_slice(indices);
                }
            }
        }
    }
}
