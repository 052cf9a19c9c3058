use geojson::Value;
use glam::DVec2;

/// A closed ring of lon/lat vertices
pub type Ring = Vec<DVec2>;

/// Axis-aligned bounding box in lon/lat degrees
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub min: DVec2,
    pub max: DVec2,
}

impl BBox {
    pub fn empty() -> Self {
        Self {
            min: DVec2::splat(f64::INFINITY),
            max: DVec2::splat(f64::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn extend(&mut self, p: DVec2) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Overlap of two boxes; empty when they are disjoint
    pub fn intersection(&self, other: &BBox) -> BBox {
        BBox {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    #[inline(always)]
    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }
}

/// Polygon with an exterior ring followed by zero or more holes
#[derive(Clone, Debug)]
pub struct Polygon {
    pub rings: Vec<Ring>,
}

impl Polygon {
    fn exterior(&self) -> Option<&Ring> {
        self.rings.first()
    }

    fn holes(&self) -> &[Ring] {
        self.rings.get(1..).unwrap_or(&[])
    }

    fn contains(&self, p: DVec2) -> bool {
        match self.exterior() {
            Some(exterior) => {
                ring_contains(exterior, p) && !self.holes().iter().any(|h| ring_contains(h, p))
            }
            None => false,
        }
    }
}

/// Municipality outline: one or more polygons (GeoJSON Polygon or MultiPolygon)
#[derive(Clone, Debug)]
pub struct Shape {
    pub polygons: Vec<Polygon>,
    pub bbox: BBox,
}

impl Shape {
    /// Build from a GeoJSON geometry. Returns `None` for non-polygonal geometry.
    pub fn from_geometry(value: &Value) -> Option<Self> {
        let polygons: Vec<Polygon> = match value {
            Value::Polygon(rings) => vec![polygon_from_coords(rings)],
            Value::MultiPolygon(polygons) => polygons.iter().map(|p| polygon_from_coords(p)).collect(),
            Value::GeometryCollection(geometries) => geometries
                .iter()
                .filter_map(|g| Shape::from_geometry(&g.value))
                .flat_map(|s| s.polygons)
                .collect(),
            _ => return None,
        };

        Self::from_polygons(polygons)
    }

    pub fn from_polygons(polygons: Vec<Polygon>) -> Option<Self> {
        let mut bbox = BBox::empty();
        for ring in polygons.iter().flat_map(|p| &p.rings) {
            for &v in ring {
                bbox.extend(v);
            }
        }
        if bbox.is_empty() {
            return None;
        }
        Some(Self { polygons, bbox })
    }

    /// Point-in-shape test (even-odd within each polygon, holes excluded)
    pub fn contains(&self, p: DVec2) -> bool {
        self.bbox.contains(p) && self.polygons.iter().any(|poly| poly.contains(p))
    }

    /// All rings, for border drawing
    pub fn rings(&self) -> impl Iterator<Item = &Ring> {
        self.polygons.iter().flat_map(|p| p.rings.iter())
    }

    /// Area-weighted centroid; holes subtract. Falls back to the bbox center
    /// for degenerate (zero-area) shapes.
    pub fn centroid(&self) -> DVec2 {
        let mut weighted = DVec2::ZERO;
        let mut total = 0.0;

        for poly in &self.polygons {
            for (i, ring) in poly.rings.iter().enumerate() {
                let (area, centroid) = ring_area_centroid(ring);
                let weight = if i == 0 { area.abs() } else { -area.abs() };
                if area != 0.0 {
                    weighted += centroid * weight;
                    total += weight;
                }
            }
        }

        if total.abs() < f64::EPSILON {
            self.bbox.center()
        } else {
            weighted / total
        }
    }
}

fn polygon_from_coords(rings: &[Vec<Vec<f64>>]) -> Polygon {
    Polygon {
        rings: rings
            .iter()
            .map(|ring| {
                ring.iter()
                    .filter(|c| c.len() >= 2)
                    .map(|c| DVec2::new(c[0], c[1]))
                    .collect()
            })
            .collect(),
    }
}

/// Ray casting test against a single ring
#[inline]
fn ring_contains(ring: &[DVec2], p: DVec2) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let a = ring[i];
        let b = ring[j];
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Signed area and centroid of a ring (shoelace)
fn ring_area_centroid(ring: &[DVec2]) -> (f64, DVec2) {
    let n = ring.len();
    if n < 3 {
        return (0.0, DVec2::ZERO);
    }

    let mut area2 = 0.0;
    let mut c = DVec2::ZERO;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let cross = a.perp_dot(b);
        area2 += cross;
        c += (a + b) * cross;
    }

    if area2 == 0.0 {
        return (0.0, DVec2::ZERO);
    }
    (area2 * 0.5, c / (3.0 * area2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Vec<Vec<f64>> {
        vec![
            vec![x0, y0],
            vec![x0 + size, y0],
            vec![x0 + size, y0 + size],
            vec![x0, y0 + size],
            vec![x0, y0],
        ]
    }

    #[test]
    fn test_polygon_contains() {
        let shape = Shape::from_geometry(&Value::Polygon(vec![square(0.0, 0.0, 2.0)])).unwrap();
        assert!(shape.contains(DVec2::new(1.0, 1.0)));
        assert!(!shape.contains(DVec2::new(3.0, 1.0)));
    }

    #[test]
    fn test_hole_excluded() {
        let shape = Shape::from_geometry(&Value::Polygon(vec![
            square(0.0, 0.0, 4.0),
            square(1.0, 1.0, 2.0),
        ]))
        .unwrap();
        assert!(shape.contains(DVec2::new(0.5, 0.5)));
        assert!(!shape.contains(DVec2::new(2.0, 2.0)));
    }

    #[test]
    fn test_multipolygon_centroid() {
        let shape = Shape::from_geometry(&Value::MultiPolygon(vec![
            vec![square(0.0, 0.0, 1.0)],
            vec![square(2.0, 0.0, 1.0)],
        ]))
        .unwrap();
        let c = shape.centroid();
        assert!((c.x - 1.5).abs() < 1e-9);
        assert!((c.y - 0.5).abs() < 1e-9);
        assert_eq!(shape.bbox.min, DVec2::new(0.0, 0.0));
        assert_eq!(shape.bbox.max, DVec2::new(3.0, 1.0));
    }

    #[test]
    fn test_point_geometry_rejected() {
        assert!(Shape::from_geometry(&Value::Point(vec![5.0, 52.0])).is_none());
    }

    #[test]
    fn test_degenerate_centroid_falls_back_to_bbox() {
        let line = vec![vec![0.0, 0.0], vec![2.0, 2.0], vec![0.0, 0.0]];
        let shape = Shape::from_geometry(&Value::Polygon(vec![line])).unwrap();
        assert_eq!(shape.centroid(), DVec2::new(1.0, 1.0));
    }
}
