use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable holding the tile service access token
pub const TILE_TOKEN_ENV: &str = "MONUMENT_MAP_TILE_TOKEN";

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "monument-map.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Input file locations
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataPaths {
    pub geojson: PathBuf,
    pub mapping: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        let dir = Path::new("monuments_dashboard_data");
        Self {
            geojson: dir.join("municipal_monument_count.geojson"),
            mapping: dir.join("monument_category_column_mapping.csv"),
        }
    }
}

/// Schema column names in the two input files
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnNames {
    /// Municipality name key in the GeoJSON properties
    pub name: String,
    /// Total population in the GeoJSON properties
    pub population: String,
    /// Top-level category label in the mapping CSV
    pub category_label: String,
    /// Subcategory column name in the mapping CSV
    pub category_column: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            name: "gemeentenaam".to_string(),
            population: "TotaleBevolking_1".to_string(),
            category_label: "hoofdcategorie".to_string(),
            category_column: "column_mapping".to_string(),
        }
    }
}

/// Tile layer used by the HTML export
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TileConfig {
    /// Leaflet URL template; `{token}` is replaced with the access token
    pub url_template: String,
    pub attribution: String,
    pub access_token: Option<String>,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            url_template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "&copy; <a href=\"http://www.openstreetmap.org/copyright\">OpenStreetMap</a>"
                .to_string(),
            access_token: None,
        }
    }
}

impl TileConfig {
    /// Tile URL with the access token substituted (empty when none is set)
    pub fn resolved_url(&self) -> String {
        self.url_template
            .replace("{token}", self.access_token.as_deref().unwrap_or(""))
    }

    pub fn needs_token(&self) -> bool {
        self.url_template.contains("{token}")
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub title: String,
    pub legend_title: String,
    /// Optional outline GeoJSON drawn beneath the municipalities
    pub backdrop: Option<PathBuf>,
    pub export_path: PathBuf,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: "Rijksmonumenten per gemeente".to_string(),
            legend_title: "Aantal monumenten in de gekozen categorie".to_string(),
            backdrop: None,
            export_path: PathBuf::from("monument-map.html"),
        }
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub data: DataPaths,
    pub columns: ColumnNames,
    pub tiles: TileConfig,
    pub display: DisplayConfig,
}

impl Config {
    /// Parse a TOML document; missing sections fall back to defaults
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration. An explicit path must exist; otherwise the default
    /// file is used when present and built-in defaults when not.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&text, &path)
    }

    /// Apply a tile token from the environment, if one is given
    pub fn with_tile_token(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.tiles.access_token = Some(token);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_relative() {
        let config = Config::default();
        assert!(config.data.geojson.is_relative());
        assert!(config.data.mapping.is_relative());
        assert_eq!(config.columns.name, "gemeentenaam");
        assert!(config.tiles.access_token.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let text = r#"
            [columns]
            population = "inwoners"

            [tiles]
            url_template = "https://tiles.example/{z}/{x}/{y}?access_token={token}"
        "#;
        let config = Config::from_toml(text, Path::new("test.toml")).unwrap();
        assert_eq!(config.columns.population, "inwoners");
        assert_eq!(config.columns.name, "gemeentenaam");
        assert!(config.tiles.needs_token());
        assert_eq!(config.display, DisplayConfig::default());
    }

    #[test]
    fn test_token_substitution() {
        let config = Config::default().with_tile_token(Some("abc".to_string()));
        let mut tiles = config.tiles;
        tiles.url_template = "https://t/{z}/{x}/{y}?t={token}".to_string();
        assert_eq!(tiles.resolved_url(), "https://t/{z}/{x}/{y}?t=abc");
    }

    #[test]
    fn test_empty_env_token_ignored() {
        let config = Config::default().with_tile_token(Some(String::new()));
        assert!(config.tiles.access_token.is_none());
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/monument-map.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("[data\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
