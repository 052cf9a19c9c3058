mod geometry;
mod polygon;
mod projection;
mod renderer;
mod spatial;

pub use polygon::{BBox, Polygon, Ring, Shape};
pub use projection::Viewport;
pub use renderer::{LineString, MapLayers, MapRenderer};
