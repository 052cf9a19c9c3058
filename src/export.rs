//! Standalone HTML export of the current choropleth.
//!
//! The page draws the configured tile layer with Leaflet and overlays the
//! municipalities as GeoJSON, styled with the same scale and palette as the
//! terminal view. Values are bound to features by municipality name, so a
//! name without a value simply renders unstyled.

use crate::config::TileConfig;
use crate::data::Dataset;
use crate::map::Shape;
use crate::metric::DerivedMetric;
use crate::palette::{self, FILL_OPACITY};
use crate::scale::{format_value, Scale};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

/// Initial Leaflet zoom level
const ZOOM_START: u8 = 7;
/// Border opacity
const LINE_OPACITY: f64 = 0.2;

/// Everything the page needs besides the geometry
pub struct ExportOptions<'a> {
    pub title: &'a str,
    pub legend_title: &'a str,
    /// Current selection, shown under the title
    pub subtitle: &'a str,
    pub tiles: &'a TileConfig,
    /// (lon, lat)
    pub center: (f64, f64),
}

/// Value table keyed by municipality name
pub fn values_by_name(dataset: &Dataset, metric: &DerivedMetric) -> HashMap<String, f64> {
    dataset
        .municipalities
        .iter()
        .enumerate()
        .filter_map(|(i, m)| metric.get(i).map(|v| (m.name.clone(), v)))
        .collect()
}

/// Render the page. `scale` is `None` when no legend could be built; all
/// municipalities are then unstyled.
pub fn render_html(
    dataset: &Dataset,
    values: &HashMap<String, f64>,
    scale: Option<&Scale>,
    options: &ExportOptions,
) -> String {
    let colors = scale.map(|s| palette::sequential(s.bucket_count())).unwrap_or_default();
    let features = feature_collection(dataset, values, scale, &colors);
    let geojson = serde_json::to_string(&features)
        .unwrap_or_else(|_| "{\"type\":\"FeatureCollection\",\"features\":[]}".to_string())
        .replace("</", "<\\/");

    if options.tiles.needs_token() && options.tiles.access_token.is_none() {
        warn!("tile URL expects an access token but none is configured");
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="nl">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
    <style>{css}</style>
</head>
<body>
    <h1>{title}</h1>
    <p class="selection">{subtitle}</p>
    <div id="map"></div>
    <script>
    const data = {geojson};
    const map = L.map('map').setView([{lat}, {lon}], {zoom});
    L.tileLayer({tile_url}, {{ attribution: {attribution} }}).addTo(map);
    L.geoJSON(data, {{
        style: f => ({{
            fillColor: f.properties.fill || '#000000',
            fillOpacity: f.properties.fill ? {fill_opacity} : 0,
            color: '#000000',
            weight: 1,
            opacity: {line_opacity}
        }}),
        onEachFeature: (f, layer) => layer.bindTooltip(
            '<b>' + f.properties.name + '</b><br>' + (f.properties.label ?? 'geen gegevens'))
    }}).addTo(map);
    </script>
    {legend}
</body>
</html>"#,
        title = escape_html(options.title),
        subtitle = escape_html(options.subtitle),
        css = inline_css(),
        geojson = geojson,
        lat = options.center.1,
        lon = options.center.0,
        zoom = ZOOM_START,
        tile_url = js_string(&options.tiles.resolved_url()),
        attribution = js_string(&options.tiles.attribution),
        fill_opacity = FILL_OPACITY,
        line_opacity = LINE_OPACITY,
        legend = render_legend(options.legend_title, scale, &colors),
    )
}

/// Write the page to disk
pub fn write_html(path: &Path, html: &str) -> io::Result<()> {
    fs::write(path, html)?;
    info!(path = %path.display(), bytes = html.len(), "exported HTML map");
    Ok(())
}

fn feature_collection(
    dataset: &Dataset,
    values: &HashMap<String, f64>,
    scale: Option<&Scale>,
    colors: &[palette::Rgb],
) -> FeatureCollection {
    let features = dataset
        .municipalities
        .iter()
        .filter_map(|m| {
            let shape = m.shape.as_ref()?;
            let value = values.get(&m.name).copied();
            let fill = value
                .zip(scale)
                .and_then(|(v, s)| s.bucket(v))
                .and_then(|b| colors.get(b))
                .map(|&c| palette::to_hex(c));

            let mut properties = JsonObject::new();
            properties.insert("name".to_string(), JsonValue::from(m.name.clone()));
            properties.insert("value".to_string(), value.map_or(JsonValue::Null, JsonValue::from));
            properties.insert(
                "label".to_string(),
                value.map_or(JsonValue::Null, |v| JsonValue::from(format_value(v))),
            );
            properties.insert("fill".to_string(), fill.map_or(JsonValue::Null, JsonValue::from));

            Some(Feature {
                bbox: None,
                geometry: Some(Geometry::new(shape_to_geometry(shape))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn shape_to_geometry(shape: &Shape) -> Value {
    Value::MultiPolygon(
        shape
            .polygons
            .iter()
            .map(|p| {
                p.rings
                    .iter()
                    .map(|ring| ring.iter().map(|v| vec![v.x, v.y]).collect())
                    .collect()
            })
            .collect(),
    )
}

fn render_legend(title: &str, scale: Option<&Scale>, colors: &[palette::Rgb]) -> String {
    let Some(scale) = scale else {
        return format!(
            r#"<div class="legend"><h4>{}</h4><p>Geen schaal voor deze selectie</p></div>"#,
            escape_html(title)
        );
    };

    let rows: String = scale
        .labels()
        .iter()
        .zip(colors)
        .map(|(label, &color)| {
            format!(
                r#"<div><span class="swatch" style="background:{}"></span>{}</div>"#,
                palette::to_hex(color),
                escape_html(label)
            )
        })
        .collect();

    format!(r#"<div class="legend"><h4>{}</h4>{}</div>"#, escape_html(title), rows)
}

fn inline_css() -> &'static str {
    r#"
body { font-family: system-ui, sans-serif; margin: 1rem; }
h1 { font-size: 1.5rem; margin: 0 0 0.25rem 0; }
.selection { color: #6b7280; margin: 0 0 0.75rem 0; }
#map { width: 1000px; height: 1000px; }
.legend { margin-top: 0.75rem; }
.legend h4 { margin: 0 0 0.25rem 0; }
.swatch { display: inline-block; width: 1.5rem; height: 0.9rem; margin-right: 0.5rem; opacity: 0.75; }
"#
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// JSON string literal, safe inside a script block
fn js_string(text: &str) -> String {
    JsonValue::from(text).to_string().replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Municipality;
    use crate::scale::Classification;

    fn municipality(name: &str, x0: f64) -> Municipality {
        let ring = vec![
            vec![x0, 52.0],
            vec![x0 + 1.0, 52.0],
            vec![x0 + 1.0, 53.0],
            vec![x0, 52.0],
        ];
        Municipality {
            name: name.to_string(),
            population: 1.0,
            counts: HashMap::new(),
            shape: Shape::from_geometry(&Value::Polygon(vec![ring])),
        }
    }

    fn options(tiles: &TileConfig) -> ExportOptions<'_> {
        ExportOptions {
            title: "Rijksmonumenten per gemeente",
            legend_title: "Monumenten",
            subtitle: "Molens / Totaal aantal",
            tiles,
            center: (5.0, 52.5),
        }
    }

    #[test]
    fn test_unknown_name_renders_unstyled() {
        let dataset = Dataset::from_municipalities(vec![municipality("Delft", 4.0), municipality("Gouda", 5.0)]).unwrap();
        let scale = Scale::build(40.0, Classification::EqualIntervals).unwrap();
        let mut values = HashMap::new();
        values.insert("Delft".to_string(), 40.0);
        values.insert("Nergenshuizen".to_string(), 3.0);

        let fc = feature_collection(&dataset, &values, Some(&scale), &palette::sequential(4));
        assert_eq!(fc.features.len(), 2);

        let delft = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(delft["fill"], JsonValue::from("#081d58"));
        let gouda = fc.features[1].properties.as_ref().unwrap();
        assert_eq!(gouda["fill"], JsonValue::Null);
        assert_eq!(gouda["value"], JsonValue::Null);
    }

    #[test]
    fn test_page_contains_tiles_and_legend() {
        let dataset = Dataset::from_municipalities(vec![municipality("Delft", 4.0)]).unwrap();
        let scale = Scale::build(250.0, Classification::PowersOfTen).unwrap();
        let mut values = HashMap::new();
        values.insert("Delft".to_string(), 250.0);

        let tiles = TileConfig {
            url_template: "https://tiles.example/{z}/{x}/{y}?access_token={token}".to_string(),
            attribution: "Example".to_string(),
            access_token: Some("secret".to_string()),
        };
        let html = render_html(&dataset, &values, Some(&scale), &options(&tiles));

        assert!(html.contains("access_token=secret"));
        assert!(html.contains("setView([52.5, 5], 7)"));
        assert!(html.contains("100 – 1000"));
        assert!(html.contains("\"name\":\"Delft\""));
    }

    #[test]
    fn test_page_without_scale() {
        let dataset = Dataset::from_municipalities(vec![municipality("Delft", 4.0)]).unwrap();
        let tiles = TileConfig::default();
        let html = render_html(&dataset, &HashMap::new(), None, &options(&tiles));
        assert!(html.contains("Geen schaal voor deze selectie"));
        assert!(html.contains("tile.openstreetmap.org"));
    }

    #[test]
    fn test_script_breakout_escaped() {
        let dataset = Dataset::from_municipalities(vec![municipality("</script><b>", 4.0)]).unwrap();
        let tiles = TileConfig::default();
        let html = render_html(&dataset, &HashMap::new(), None, &options(&tiles));
        assert_eq!(html.matches("</script>").count(), 2);
    }
}
