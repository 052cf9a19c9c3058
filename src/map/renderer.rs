use crate::braille::BrailleCanvas;
use crate::data::Dataset;
use crate::map::geometry::draw_polyline;
use crate::map::projection::Viewport;
use crate::map::spatial::FeatureGrid;
use glam::DVec2;
use rayon::prelude::*;

/// A geographic line (sequence of lon/lat coordinates)
pub type LineString = Vec<(f64, f64)>;

/// Index grid cells per dataset extent
const GRID_DIVISIONS: f64 = 64.0;

/// Display settings for map layers
#[derive(Clone)]
pub struct DisplaySettings {
    pub show_borders: bool,
    pub show_backdrop: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            show_borders: true,
            show_backdrop: true,
        }
    }
}

/// One rendered frame: which municipality covers each character cell, plus
/// the line layers drawn on top
pub struct MapLayers {
    pub cols: usize,
    pub rows: usize,
    /// Municipality index per cell, row-major
    pub regions: Vec<Option<usize>>,
    pub borders: BrailleCanvas,
    pub backdrop: BrailleCanvas,
}

impl MapLayers {
    pub fn region_at(&self, col: usize, row: usize) -> Option<usize> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        self.regions[row * self.cols + col]
    }
}

/// Choropleth renderer over a loaded dataset
pub struct MapRenderer {
    grid: FeatureGrid,
    backdrop: Vec<LineString>,
    pub settings: DisplaySettings,
}

impl MapRenderer {
    pub fn new(dataset: &Dataset) -> Self {
        let cell_size = dataset
            .bounds()
            .map(|b| {
                let extent = (b.max - b.min).max_element();
                (extent / GRID_DIVISIONS).max(1e-3)
            })
            .unwrap_or(1.0);

        let grid = FeatureGrid::build(
            dataset
                .municipalities
                .iter()
                .enumerate()
                .filter_map(|(i, m)| m.shape.as_ref().map(|s| (i, s.bbox))),
            cell_size,
        );

        Self {
            grid,
            backdrop: Vec::new(),
            settings: DisplaySettings::default(),
        }
    }

    pub fn with_backdrop(mut self, backdrop: Vec<LineString>) -> Self {
        self.backdrop = backdrop;
        self
    }

    pub fn has_backdrop(&self) -> bool {
        !self.backdrop.is_empty()
    }

    /// Municipality whose shape contains the point
    pub fn municipality_at(&self, dataset: &Dataset, lon: f64, lat: f64) -> Option<usize> {
        let p = DVec2::new(lon, lat);
        self.grid.at(lon, lat).iter().copied().find(|&i| {
            dataset
                .municipalities
                .get(i)
                .and_then(|m| m.shape.as_ref())
                .is_some_and(|s| s.contains(p))
        })
    }

    /// Render all layers for a `cols` x `rows` character area
    pub fn render(&self, dataset: &Dataset, cols: usize, rows: usize, viewport: &Viewport) -> MapLayers {
        let regions: Vec<Option<usize>> = (0..rows)
            .into_par_iter()
            .flat_map_iter(|row| {
                (0..cols).map(move |col| {
                    // Sample the center of the 2x4 braille cell
                    let (lon, lat) = viewport.unproject_f(col as f64 * 2.0 + 1.0, row as f64 * 4.0 + 2.0);
                    self.municipality_at(dataset, lon, lat)
                })
            })
            .collect();

        let mut borders = BrailleCanvas::new(cols, rows);
        if self.settings.show_borders {
            let mut visible = Vec::new();
            self.grid.query_into(&viewport.visible_bounds(), &mut visible);
            visible.sort_unstable();
            visible.dedup();

            for shape in visible
                .iter()
                .filter_map(|&i| dataset.municipalities.get(i)?.shape.as_ref())
            {
                for ring in shape.rings() {
                    draw_polyline(&mut borders, ring.iter().map(|v| (v.x, v.y)), viewport);
                }
            }
        }

        let mut backdrop = BrailleCanvas::new(cols, rows);
        if self.settings.show_backdrop {
            for line in &self.backdrop {
                draw_polyline(&mut backdrop, line.iter().copied(), viewport);
            }
        }

        MapLayers {
            cols,
            rows,
            regions,
            borders,
            backdrop,
        }
    }

    /// Toggle municipality borders
    pub fn toggle_borders(&mut self) {
        self.settings.show_borders = !self.settings.show_borders;
    }

    /// Toggle backdrop outlines
    pub fn toggle_backdrop(&mut self) {
        self.settings.show_backdrop = !self.settings.show_backdrop;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Municipality;
    use crate::map::projection::MIN_ZOOM;
    use crate::map::Shape;
    use geojson::Value;
    use std::collections::HashMap;

    fn square(name: &str, x0: f64, y0: f64) -> Municipality {
        sized_square(name, x0, y0, 1.0)
    }

    fn sized_square(name: &str, x0: f64, y0: f64, size: f64) -> Municipality {
        let ring = vec![
            vec![x0, y0],
            vec![x0 + size, y0],
            vec![x0 + size, y0 + size],
            vec![x0, y0 + size],
            vec![x0, y0],
        ];
        Municipality {
            name: name.to_string(),
            population: 1000.0,
            counts: HashMap::new(),
            shape: Shape::from_geometry(&Value::Polygon(vec![ring])),
        }
    }

    fn dataset() -> Dataset {
        Dataset::from_municipalities(vec![
            square("West", 4.0, 52.0),
            square("Oost", 5.0, 52.0),
            Municipality {
                name: "Zonder vorm".to_string(),
                population: 10.0,
                counts: HashMap::new(),
                shape: None,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_municipality_at() {
        let dataset = dataset();
        let renderer = MapRenderer::new(&dataset);
        assert_eq!(renderer.municipality_at(&dataset, 4.5, 52.5), Some(0));
        assert_eq!(renderer.municipality_at(&dataset, 5.5, 52.5), Some(1));
        assert_eq!(renderer.municipality_at(&dataset, 7.0, 52.5), None);
    }

    #[test]
    fn test_render_covers_both_regions() {
        let dataset = dataset();
        let renderer = MapRenderer::new(&dataset);
        let bounds = dataset.bounds().unwrap();
        let viewport = Viewport::fit((5.0, 52.5), &bounds, 40 * 2, 20 * 4);
        let layers = renderer.render(&dataset, 40, 20, &viewport);

        assert_eq!(layers.regions.len(), 40 * 20);
        assert!(layers.regions.contains(&Some(0)));
        assert!(layers.regions.contains(&Some(1)));
        assert!(layers.regions.contains(&None));
        assert!(!layers.regions.contains(&Some(2)));
        assert_eq!(layers.region_at(100, 100), None);
    }

    #[test]
    fn test_borders_toggle() {
        let dataset = dataset();
        let mut renderer = MapRenderer::new(&dataset);
        let viewport = Viewport::fit((5.0, 52.5), &dataset.bounds().unwrap(), 40, 40);

        let drawn = renderer.render(&dataset, 20, 10, &viewport);
        assert!(drawn.borders.to_string().chars().any(|c| c != '\u{2800}' && c != '\n'));

        renderer.toggle_borders();
        let hidden = renderer.render(&dataset, 20, 10, &viewport);
        assert!(hidden.borders.to_string().chars().all(|c| c == '\u{2800}' || c == '\n'));
    }

    #[test]
    fn test_border_culling_bounded_at_min_zoom() {
        let municipalities = (0..400)
            .map(|i| {
                let x0 = 3.4 + (i % 20) as f64 * 0.16;
                let y0 = 50.7 + (i / 20) as f64 * 0.16;
                sized_square(&format!("Gemeente {i}"), x0, y0, 0.15)
            })
            .collect();
        let dataset = Dataset::from_municipalities(municipalities).unwrap();
        let renderer = MapRenderer::new(&dataset);
        let bounds = dataset.bounds().unwrap();

        let mut viewport = Viewport::fit((5.0, 52.0), &bounds, 82 * 2, 36 * 4);
        viewport.zoom = MIN_ZOOM;
        let visible = viewport.visible_bounds();
        assert!(visible.max.x - visible.min.x > 90.0);

        let ((x0, y0), (x1, y1)) = renderer.grid.cell_range(&visible).unwrap();
        let scanned = (x1 - x0 + 1) as usize * (y1 - y0 + 1) as usize;
        assert!(scanned <= 100 * 100, "scanned {scanned} cells");

        let layers = renderer.render(&dataset, 82, 36, &viewport);
        assert_eq!(layers.regions.len(), 82 * 36);
    }
}
