use crate::braille::BrailleCanvas;
use crate::map::projection::Viewport;

/// Draw a line using Bresenham's algorithm
pub fn draw_line(canvas: &mut BrailleCanvas, x0: i32, y0: i32, x1: i32, y1: i32) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let mut x = x0;
    let mut y = y0;

    loop {
        canvas.set_pixel_signed(x, y);

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;

        if e2 >= dy {
            if x == x1 {
                break;
            }
            err += dy;
            x += sx;
        }

        if e2 <= dx {
            if y == y1 {
                break;
            }
            err += dx;
            y += sy;
        }
    }
}

/// Project and draw a polyline with viewport culling.
/// Segments longer than the canvas are skipped (antimeridian wrap).
pub fn draw_polyline<I>(canvas: &mut BrailleCanvas, points: I, viewport: &Viewport)
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut prev: Option<(i32, i32)> = None;

    for (lon, lat) in points {
        let (px, py) = viewport.project(lon, lat);

        if let Some((prev_x, prev_y)) = prev {
            if (prev_x, prev_y) != (px, py) {
                let dist = ((px - prev_x).abs() + (py - prev_y).abs()) as usize;
                if dist < viewport.width.max(1) * 2
                    && viewport.line_might_be_visible((prev_x, prev_y), (px, py))
                {
                    draw_line(canvas, prev_x, prev_y, px, py);
                }
            }
        }

        prev = Some((px, py));
    }
}
