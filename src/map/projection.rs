use crate::map::polygon::BBox;
use std::f64::consts::PI;

pub const MIN_ZOOM: f64 = 0.5;
pub const MAX_ZOOM: f64 = 20_000.0;

/// Share of the canvas the fitted dataset may occupy
const FIT_MARGIN: f64 = 0.92;

/// Viewport representing the visible map area and zoom level
#[derive(Clone, Debug)]
pub struct Viewport {
    /// Center longitude (-180 to 180)
    pub center_lon: f64,
    /// Center latitude (-85 to 85)
    pub center_lat: f64,
    /// Zoom level (higher = more zoomed in)
    pub zoom: f64,
    /// Canvas pixel width
    pub width: usize,
    /// Canvas pixel height
    pub height: usize,
}

/// Web Mercator x in [0, 1]
#[inline(always)]
fn mercator_x(lon: f64) -> f64 {
    (lon + 180.0) / 360.0
}

/// Web Mercator y in [0, 1], north up
#[inline(always)]
fn mercator_y(lat: f64) -> f64 {
    let lat_rad = lat.clamp(-85.0, 85.0) * PI / 180.0;
    (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0
}

#[inline(always)]
fn inverse_mercator_y(y: f64) -> f64 {
    (PI * (1.0 - 2.0 * y)).sinh().atan() * 180.0 / PI
}

impl Viewport {
    pub fn new(center_lon: f64, center_lat: f64, zoom: f64, width: usize, height: usize) -> Self {
        Self {
            center_lon,
            center_lat,
            zoom,
            width,
            height,
        }
    }

    /// Center on `(lon, lat)` with the largest zoom that keeps `bounds` visible
    pub fn fit(center: (f64, f64), bounds: &BBox, width: usize, height: usize) -> Self {
        let mut vp = Self::new(center.0, center.1, 1.0, width, height);
        vp.zoom = vp.zoom_to_fit(bounds);
        vp
    }

    fn zoom_to_fit(&self, bounds: &BBox) -> f64 {
        if bounds.is_empty() || self.width == 0 || self.height == 0 {
            return 1.0;
        }
        let cx = mercator_x(self.center_lon);
        let cy = mercator_y(self.center_lat);

        // Half-extents measured from the (possibly off-center) center point
        let half_w = (mercator_x(bounds.max.x) - cx).max(cx - mercator_x(bounds.min.x));
        let half_h = (mercator_y(bounds.min.y) - cy).max(cy - mercator_y(bounds.max.y));

        let w = self.width as f64;
        let h = self.height as f64;
        let zoom_x = if half_w > 0.0 { 0.5 / half_w } else { MAX_ZOOM };
        let zoom_y = if half_h > 0.0 { 0.5 * h / (w * half_h) } else { MAX_ZOOM };

        (zoom_x.min(zoom_y) * FIT_MARGIN).clamp(MIN_ZOOM, MAX_ZOOM)
    }

    fn scale(&self) -> f64 {
        self.zoom * self.width as f64
    }

    /// Pan the viewport by pixel delta
    pub fn pan(&mut self, dx: i32, dy: i32) {
        let scale = self.scale();
        if scale <= 0.0 {
            return;
        }
        let x = mercator_x(self.center_lon) + dx as f64 / scale;
        let y = mercator_y(self.center_lat) + dy as f64 / scale;

        self.center_lon = x * 360.0 - 180.0;
        // Wrap longitude
        if self.center_lon > 180.0 {
            self.center_lon -= 360.0;
        } else if self.center_lon < -180.0 {
            self.center_lon += 360.0;
        }
        self.center_lat = inverse_mercator_y(y).clamp(-85.0, 85.0);
    }

    /// Zoom in by a factor
    pub fn zoom_in(&mut self) {
        self.zoom = (self.zoom * 1.5).min(MAX_ZOOM);
    }

    /// Zoom out by a factor
    pub fn zoom_out(&mut self) {
        self.zoom = (self.zoom / 1.5).max(MIN_ZOOM);
    }

    /// Zoom in towards a specific pixel location
    pub fn zoom_in_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, 1.5);
    }

    /// Zoom out from a specific pixel location
    pub fn zoom_out_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, 1.0 / 1.5);
    }

    /// Zoom by factor keeping the geographic point under the pixel fixed
    fn zoom_at(&mut self, px: i32, py: i32, factor: f64) {
        let (lon, lat) = self.unproject(px, py);
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);

        let (new_px, new_py) = self.project(lon, lat);
        self.pan(new_px - px, new_py - py);
    }

    /// Unproject pixel coordinates back to geographic coordinates (lon, lat)
    pub fn unproject(&self, px: i32, py: i32) -> (f64, f64) {
        self.unproject_f(px as f64, py as f64)
    }

    /// Sub-pixel unprojection, used to sample cell centers
    pub fn unproject_f(&self, px: f64, py: f64) -> (f64, f64) {
        let scale = self.scale();
        let x = (px - self.width as f64 / 2.0) / scale + mercator_x(self.center_lon);
        let y = (py - self.height as f64 / 2.0) / scale + mercator_y(self.center_lat);
        (x * 360.0 - 180.0, inverse_mercator_y(y))
    }

    /// Project a geographic coordinate (lon, lat) to pixel coordinates
    pub fn project(&self, lon: f64, lat: f64) -> (i32, i32) {
        let scale = self.scale();
        let px = (mercator_x(lon) - mercator_x(self.center_lon)) * scale + self.width as f64 / 2.0;
        let py = (mercator_y(lat) - mercator_y(self.center_lat)) * scale + self.height as f64 / 2.0;
        (px as i32, py as i32)
    }

    /// Geographic bounds of the visible area
    pub fn visible_bounds(&self) -> BBox {
        let (min_lon, max_lat) = self.unproject(0, 0);
        let (max_lon, min_lat) = self.unproject(self.width as i32, self.height as i32);
        let mut bbox = BBox::empty();
        bbox.extend(glam::DVec2::new(min_lon, min_lat));
        bbox.extend(glam::DVec2::new(max_lon, max_lat));
        bbox
    }

    /// Check if a line segment might be visible (rough bounding box check)
    pub fn line_might_be_visible(&self, p1: (i32, i32), p2: (i32, i32)) -> bool {
        let min_x = p1.0.min(p2.0);
        let max_x = p1.0.max(p2.0);
        let min_y = p1.1.min(p2.1);
        let max_y = p1.1.max(p2.1);

        max_x >= 0 && min_x < self.width as i32 && max_y >= 0 && min_y < self.height as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    #[test]
    fn test_project_center() {
        let vp = Viewport::new(0.0, 0.0, 1.0, 100, 100);
        let (x, y) = vp.project(0.0, 0.0);
        assert_eq!(x, 50);
        assert_eq!(y, 50);
    }

    #[test]
    fn test_pan() {
        let mut vp = Viewport::new(0.0, 0.0, 1.0, 100, 100);
        vp.pan(10, 0);
        assert!(vp.center_lon > 0.0);
        vp.pan(0, 10);
        assert!(vp.center_lat < 0.0);
    }

    #[test]
    fn test_unproject_inverts_project() {
        let vp = Viewport::new(5.3, 52.1, 80.0, 200, 160);
        let (px, py) = vp.project(4.9, 52.37);
        let (lon, lat) = vp.unproject(px, py);
        assert!((lon - 4.9).abs() < 0.05);
        assert!((lat - 52.37).abs() < 0.05);
    }

    #[test]
    fn test_fit_keeps_bounds_visible() {
        let bounds = BBox {
            min: DVec2::new(3.3, 50.7),
            max: DVec2::new(7.2, 53.6),
        };
        let vp = Viewport::fit((5.3, 52.1), &bounds, 200, 160);
        assert!(vp.zoom > 1.0);

        for corner in [bounds.min, bounds.max] {
            let (px, py) = vp.project(corner.x, corner.y);
            assert!(px >= 0 && px <= 200, "x {px} outside canvas");
            assert!(py >= 0 && py <= 160, "y {py} outside canvas");
        }
    }

    #[test]
    fn test_zoom_at_keeps_point_fixed() {
        let mut vp = Viewport::new(5.0, 52.0, 50.0, 200, 160);
        let before = vp.unproject(40, 30);
        vp.zoom_in_at(40, 30);
        let after = vp.unproject(40, 30);
        assert!((before.0 - after.0).abs() < 0.05);
        assert!((before.1 - after.1).abs() < 0.05);
    }
}
