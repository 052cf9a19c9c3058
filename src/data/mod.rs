//! Loading of the municipality dataset and the category mapping table.
//!
//! Both inputs are read once at startup, validated, and then treated as
//! immutable for the lifetime of the process.

use crate::config::ColumnNames;
use crate::map::{BBox, LineString, Shape};
use geojson::{GeoJson, Geometry, Value};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("file not found: {0}")]
    MissingFile(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid GeoJSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: simd_json::Error,
    },
    #[error("{0} is not a GeoJSON FeatureCollection")]
    NotAFeatureCollection(PathBuf),
    #[error("{0} contains no municipalities")]
    EmptyDataset(PathBuf),
    #[error("feature #{index} has no '{column}' property")]
    MissingProperty { index: usize, column: String },
    #[error("municipality name '{0}' occurs more than once")]
    DuplicateName(String),
    #[error("column '{column}' is not numeric for municipality '{municipality}'")]
    NotNumeric { column: String, municipality: String },
    #[error("invalid CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path} has no '{column}' column")]
    MissingHeader { path: PathBuf, column: String },
    #[error("category '{category}' maps to column '{column}', which the dataset does not have")]
    UnknownSubcategory { category: String, column: String },
}

pub type Result<T> = std::result::Result<T, DataError>;

/// One municipality: name key, population, raw subcategory counts and outline
#[derive(Clone, Debug)]
pub struct Municipality {
    pub name: String,
    pub population: f64,
    pub counts: HashMap<String, f64>,
    pub shape: Option<Shape>,
}

impl Municipality {
    /// Raw count for a subcategory column; absent or null counts are zero
    pub fn count(&self, column: &str) -> f64 {
        self.counts.get(column).copied().unwrap_or(0.0)
    }
}

/// All municipalities plus the property schema seen while loading
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub municipalities: Vec<Municipality>,
    /// Every property key seen on any feature
    columns: BTreeSet<String>,
    /// Property keys with at least one non-numeric, non-null value
    non_numeric: HashMap<String, String>,
}

impl Dataset {
    pub fn from_municipalities(municipalities: Vec<Municipality>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut columns = BTreeSet::new();
        for m in &municipalities {
            if !seen.insert(m.name.as_str()) {
                return Err(DataError::DuplicateName(m.name.clone()));
            }
            columns.extend(m.counts.keys().cloned());
        }
        Ok(Self {
            municipalities,
            columns,
            non_numeric: HashMap::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.municipalities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.municipalities.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// Check that a column exists and holds numbers for every municipality
    pub fn require_numeric(&self, column: &str) -> Result<()> {
        match self.non_numeric.get(column) {
            Some(municipality) => Err(DataError::NotNumeric {
                column: column.to_string(),
                municipality: municipality.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Combined bounds of all shapes
    pub fn bounds(&self) -> Option<BBox> {
        self.municipalities
            .iter()
            .filter_map(|m| m.shape.as_ref().map(|s| s.bbox))
            .reduce(|a, b| a.union(&b))
    }

    /// Map centering coordinate: median centroid longitude, mean centroid latitude
    pub fn center(&self) -> Option<(f64, f64)> {
        let centroids: Vec<_> = self
            .municipalities
            .iter()
            .filter_map(|m| m.shape.as_ref().map(Shape::centroid))
            .collect();
        if centroids.is_empty() {
            return None;
        }

        let mut lons: Vec<f64> = centroids.iter().map(|c| c.x).collect();
        lons.sort_by(f64::total_cmp);
        let mid = lons.len() / 2;
        let median_lon = if lons.len() % 2 == 0 {
            (lons[mid - 1] + lons[mid]) / 2.0
        } else {
            lons[mid]
        };
        let mean_lat = centroids.iter().map(|c| c.y).sum::<f64>() / centroids.len() as f64;

        Some((median_lon, mean_lat))
    }
}

/// Load the municipality GeoJSON FeatureCollection
pub fn load_dataset(path: &Path, columns: &ColumnNames) -> Result<Dataset> {
    let geojson = read_geojson(path)?;
    let GeoJson::FeatureCollection(fc) = geojson else {
        return Err(DataError::NotAFeatureCollection(path.to_path_buf()));
    };

    let mut municipalities = Vec::with_capacity(fc.features.len());
    let mut non_numeric = HashMap::new();
    let mut schema = BTreeSet::new();

    for (index, feature) in fc.features.into_iter().enumerate() {
        let props = feature.properties.unwrap_or_default();

        let name = match props.get(&columns.name) {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Number(n)) => n.to_string(),
            _ => {
                return Err(DataError::MissingProperty {
                    index,
                    column: columns.name.clone(),
                })
            }
        };

        let population = match props.get(&columns.population) {
            None => {
                return Err(DataError::MissingProperty {
                    index,
                    column: columns.population.clone(),
                })
            }
            Some(value) => match parse_number(value) {
                Numeric::Value(v) => v,
                Numeric::Null => {
                    warn!(municipality = %name, "population is null, treating as 0");
                    0.0
                }
                Numeric::Invalid => {
                    return Err(DataError::NotNumeric {
                        column: columns.population.clone(),
                        municipality: name,
                    })
                }
            },
        };

        let mut counts = HashMap::new();
        for (key, value) in &props {
            schema.insert(key.clone());
            if key == &columns.name {
                non_numeric.entry(key.clone()).or_insert_with(|| name.clone());
                continue;
            }
            if key == &columns.population {
                counts.insert(key.clone(), population);
                continue;
            }
            match parse_number(value) {
                Numeric::Value(v) => {
                    counts.insert(key.clone(), v);
                }
                Numeric::Null => {
                    counts.insert(key.clone(), 0.0);
                }
                Numeric::Invalid => {
                    non_numeric.entry(key.clone()).or_insert_with(|| name.clone());
                }
            }
        }

        let shape = feature.geometry.as_ref().and_then(|g| Shape::from_geometry(&g.value));
        if shape.is_none() {
            warn!(municipality = %name, "feature has no polygon geometry, it will not be drawn");
        }

        municipalities.push(Municipality {
            name,
            population,
            counts,
            shape,
        });
    }

    if municipalities.is_empty() {
        return Err(DataError::EmptyDataset(path.to_path_buf()));
    }

    let mut dataset = Dataset::from_municipalities(municipalities)?;
    dataset.columns = schema;
    dataset.non_numeric = non_numeric;

    info!(
        path = %path.display(),
        municipalities = dataset.len(),
        columns = dataset.columns.len(),
        "loaded municipality dataset"
    );
    Ok(dataset)
}

enum Numeric {
    Value(f64),
    Null,
    Invalid,
}

/// Numbers and numeric strings are accepted
fn parse_number(value: &JsonValue) -> Numeric {
    match value {
        JsonValue::Number(n) => n.as_f64().map_or(Numeric::Invalid, Numeric::Value),
        JsonValue::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map_or(Numeric::Invalid, Numeric::Value),
        JsonValue::Null => Numeric::Null,
        _ => Numeric::Invalid,
    }
}

fn read_geojson(path: &Path) -> Result<GeoJson> {
    if !path.exists() {
        return Err(DataError::MissingFile(path.to_path_buf()));
    }
    let mut bytes = fs::read(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    simd_json::serde::from_slice(&mut bytes).map_err(|source| DataError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// One row of the mapping table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingEntry {
    pub category: String,
    pub column: String,
}

/// Top-level category label to subcategory columns (one-to-many)
#[derive(Clone, Debug, Default)]
pub struct CategoryMapping {
    entries: Vec<MappingEntry>,
}

impl CategoryMapping {
    pub fn new(entries: Vec<MappingEntry>) -> Self {
        Self { entries }
    }

    /// Distinct category labels, sorted
    pub fn categories(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn contains(&self, category: &str) -> bool {
        self.entries.iter().any(|e| e.category == category)
    }

    /// Subcategory columns mapped to a category, in table order
    pub fn columns_for<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.category == category)
            .map(|e| e.column.as_str())
    }

    /// Every mapped column must exist in the dataset and be numeric
    pub fn validate_against(&self, dataset: &Dataset) -> Result<()> {
        for entry in &self.entries {
            if !dataset.has_column(&entry.column) {
                return Err(DataError::UnknownSubcategory {
                    category: entry.category.clone(),
                    column: entry.column.clone(),
                });
            }
            dataset.require_numeric(&entry.column)?;
        }
        Ok(())
    }
}

/// Load the category mapping CSV
pub fn load_category_mapping(path: &Path, columns: &ColumnNames) -> Result<CategoryMapping> {
    if !path.exists() {
        return Err(DataError::MissingFile(path.to_path_buf()));
    }
    let csv_err = |source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();
    let find = |column: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}') == column)
            .ok_or_else(|| DataError::MissingHeader {
                path: path.to_path_buf(),
                column: column.to_string(),
            })
    };
    let label_idx = find(&columns.category_label)?;
    let column_idx = find(&columns.category_column)?;

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let (Some(category), Some(column)) = (record.get(label_idx), record.get(column_idx)) else {
            continue;
        };
        if category.is_empty() || column.is_empty() {
            continue;
        }
        entries.push(MappingEntry {
            category: category.to_string(),
            column: column.to_string(),
        });
    }

    let mapping = CategoryMapping::new(entries);
    info!(
        path = %path.display(),
        rows = mapping.entries.len(),
        categories = mapping.categories().len(),
        "loaded category mapping"
    );
    Ok(mapping)
}

/// Load backdrop outlines (coastlines, country borders) as plain line strings
pub fn load_outlines(path: &Path) -> Result<Vec<LineString>> {
    let geojson = read_geojson(path)?;
    let mut lines = Vec::new();
    process_geojson_lines(&geojson, |line| lines.push(line));
    info!(path = %path.display(), lines = lines.len(), "loaded backdrop outlines");
    Ok(lines)
}

/// Process GeoJSON and extract line features
fn process_geojson_lines<F>(geojson: &GeoJson, mut add_line: F)
where
    F: FnMut(LineString),
{
    match geojson {
        GeoJson::FeatureCollection(fc) => {
            for feature in &fc.features {
                if let Some(ref geometry) = feature.geometry {
                    process_geometry_lines(geometry, &mut add_line);
                }
            }
        }
        GeoJson::Feature(f) => {
            if let Some(ref geometry) = f.geometry {
                process_geometry_lines(geometry, &mut add_line);
            }
        }
        GeoJson::Geometry(geometry) => {
            process_geometry_lines(geometry, &mut add_line);
        }
    }
}

fn process_geometry_lines<F>(geometry: &Geometry, add_line: &mut F)
where
    F: FnMut(LineString),
{
    let to_line = |coords: &Vec<Vec<f64>>| -> LineString { coords.iter().map(|c| (c[0], c[1])).collect() };
    match &geometry.value {
        Value::LineString(coords) => add_line(to_line(coords)),
        Value::MultiLineString(lines) => lines.iter().for_each(|l| add_line(to_line(l))),
        Value::Polygon(rings) => rings.iter().for_each(|r| add_line(to_line(r))),
        Value::MultiPolygon(polygons) => polygons
            .iter()
            .flat_map(|rings| rings.iter())
            .for_each(|r| add_line(to_line(r))),
        Value::GeometryCollection(geometries) => {
            for g in geometries {
                process_geometry_lines(g, add_line);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    pub(crate) fn write_temp(contents: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    pub(crate) const SAMPLE_GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "properties": {"gemeentenaam": "Amsterdam", "TotaleBevolking_1": 100000, "kerk": 3, "molen": 2, "woonhuis": "4"},
             "geometry": {"type": "Polygon", "coordinates": [[[4.0,52.0],[5.0,52.0],[5.0,53.0],[4.0,53.0],[4.0,52.0]]]}},
            {"type": "Feature",
             "properties": {"gemeentenaam": "Utrecht", "TotaleBevolking_1": 50000, "kerk": 1, "molen": null, "woonhuis": 10},
             "geometry": {"type": "MultiPolygon", "coordinates": [[[[5.0,52.0],[6.0,52.0],[6.0,53.0],[5.0,53.0],[5.0,52.0]]]]}},
            {"type": "Feature",
             "properties": {"gemeentenaam": "Schiermonnikoog", "TotaleBevolking_1": 0, "kerk": 1, "molen": 0, "woonhuis": 0},
             "geometry": {"type": "Polygon", "coordinates": [[[6.0,53.0],[7.0,53.0],[7.0,54.0],[6.0,54.0],[6.0,53.0]]]}}
        ]
    }"#;

    pub(crate) const SAMPLE_MAPPING: &str = "hoofdcategorie,column_mapping\n\
        Religieuze gebouwen,kerk\n\
        Molens,molen\n\
        Religieuze gebouwen,molen\n\
        Woningen,woonhuis\n";

    #[test]
    fn test_load_dataset() {
        let file = write_temp(SAMPLE_GEOJSON, ".geojson");
        let dataset = load_dataset(file.path(), &ColumnNames::default()).unwrap();
        assert_eq!(dataset.len(), 3);

        let utrecht = &dataset.municipalities[1];
        assert_eq!(utrecht.name, "Utrecht");
        assert_eq!(utrecht.population, 50000.0);
        assert_eq!(utrecht.count("molen"), 0.0);
        assert!(utrecht.shape.is_some());

        // numeric strings are accepted
        assert_eq!(dataset.municipalities[0].count("woonhuis"), 4.0);
        assert!(dataset.has_column("kerk"));
    }

    #[test]
    fn test_center_is_median_lon_mean_lat() {
        let file = write_temp(SAMPLE_GEOJSON, ".geojson");
        let dataset = load_dataset(file.path(), &ColumnNames::default()).unwrap();
        let (lon, lat) = dataset.center().unwrap();
        // centroids: (4.5, 52.5), (5.5, 52.5), (6.5, 53.5)
        assert!((lon - 5.5).abs() < 1e-9);
        assert!((lat - 52.833333333).abs() < 1e-6);
    }

    #[test]
    fn test_missing_file() {
        let err = load_dataset(Path::new("/nonexistent.geojson"), &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, DataError::MissingFile(_)));
    }

    #[test]
    fn test_empty_collection_rejected() {
        let file = write_temp(r#"{"type": "FeatureCollection", "features": []}"#, ".geojson");
        let err = load_dataset(file.path(), &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, DataError::EmptyDataset(_)));
    }

    #[test]
    fn test_mapping_missing_file() {
        let err = load_category_mapping(Path::new("/nonexistent.csv"), &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, DataError::MissingFile(_)));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let json = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"gemeentenaam": "Ede", "TotaleBevolking_1": 1}, "geometry": null},
            {"type": "Feature", "properties": {"gemeentenaam": "Ede", "TotaleBevolking_1": 2}, "geometry": null}
        ]}"#;
        let file = write_temp(json, ".geojson");
        let err = load_dataset(file.path(), &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, DataError::DuplicateName(name) if name == "Ede"));
    }

    #[test]
    fn test_missing_population_rejected() {
        let json = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"gemeentenaam": "Ede"}, "geometry": null}
        ]}"#;
        let file = write_temp(json, ".geojson");
        let err = load_dataset(file.path(), &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, DataError::MissingProperty { index: 0, .. }));
    }

    #[test]
    fn test_not_a_feature_collection() {
        let json = r#"{"type": "Point", "coordinates": [5.0, 52.0]}"#;
        let file = write_temp(json, ".geojson");
        let err = load_dataset(file.path(), &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, DataError::NotAFeatureCollection(_)));
    }

    #[test]
    fn test_load_mapping() {
        let file = write_temp(SAMPLE_MAPPING, ".csv");
        let mapping = load_category_mapping(file.path(), &ColumnNames::default()).unwrap();
        assert_eq!(mapping.categories(), vec!["Molens", "Religieuze gebouwen", "Woningen"]);
        let cols: Vec<_> = mapping.columns_for("Religieuze gebouwen").collect();
        assert_eq!(cols, vec!["kerk", "molen"]);
    }

    #[test]
    fn test_mapping_missing_header() {
        let file = write_temp("categorie,kolom\nA,b\n", ".csv");
        let err = load_category_mapping(file.path(), &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, DataError::MissingHeader { column, .. } if column == "hoofdcategorie"));
    }

    #[test]
    fn test_mapping_validation() {
        let data = write_temp(SAMPLE_GEOJSON, ".geojson");
        let dataset = load_dataset(data.path(), &ColumnNames::default()).unwrap();

        let good = write_temp(SAMPLE_MAPPING, ".csv");
        let mapping = load_category_mapping(good.path(), &ColumnNames::default()).unwrap();
        assert!(mapping.validate_against(&dataset).is_ok());

        let bad = CategoryMapping::new(vec![MappingEntry {
            category: "Kastelen".to_string(),
            column: "kasteel".to_string(),
        }]);
        let err = bad.validate_against(&dataset).unwrap_err();
        assert!(matches!(err, DataError::UnknownSubcategory { column, .. } if column == "kasteel"));
    }

    #[test]
    fn test_non_numeric_column_rejected_on_validation() {
        let json = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"gemeentenaam": "Ede", "TotaleBevolking_1": 10, "kerk": "veel"}, "geometry": null}
        ]}"#;
        let file = write_temp(json, ".geojson");
        let dataset = load_dataset(file.path(), &ColumnNames::default()).unwrap();
        let mapping = CategoryMapping::new(vec![MappingEntry {
            category: "Kerken".to_string(),
            column: "kerk".to_string(),
        }]);
        let err = mapping.validate_against(&dataset).unwrap_err();
        assert!(matches!(err, DataError::NotNumeric { municipality, .. } if municipality == "Ede"));
    }

    #[test]
    fn test_key_columns_in_mapping() {
        let file = write_temp(SAMPLE_GEOJSON, ".geojson");
        let dataset = load_dataset(file.path(), &ColumnNames::default()).unwrap();

        let by_name = CategoryMapping::new(vec![MappingEntry {
            category: "Namen".to_string(),
            column: "gemeentenaam".to_string(),
        }]);
        let err = by_name.validate_against(&dataset).unwrap_err();
        assert!(matches!(err, DataError::NotNumeric { column, .. } if column == "gemeentenaam"));

        let by_population = CategoryMapping::new(vec![MappingEntry {
            category: "Inwoners".to_string(),
            column: "TotaleBevolking_1".to_string(),
        }]);
        assert!(by_population.validate_against(&dataset).is_ok());
        assert_eq!(dataset.municipalities[0].count("TotaleBevolking_1"), 100000.0);
    }

    #[test]
    fn test_outlines_from_polygons() {
        let file = write_temp(SAMPLE_GEOJSON, ".geojson");
        let lines = load_outlines(file.path()).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 5);
    }
}
