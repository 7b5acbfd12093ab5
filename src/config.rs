use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Static file holding visited places.
pub const POINTS_FILE: &str = "places.geojson";
/// Static file holding visited province boundaries.
pub const POLYGONS_FILE: &str = "provinces.geojson";

/// Connection details for the GeoServer instance used as the second tier.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub base_url: String,
    pub workspace: String,
    pub layer_name: String,
    pub srs: String,
    pub match_field: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:8080/geoserver".to_string(),
            workspace: "footprints".to_string(),
            layer_name: "places".to_string(),
            srs: "EPSG:3857".to_string(),
            match_field: None,
        }
    }
}

impl RemoteConfig {
    /// `workspace:layer`, as GeoServer names layers.
    pub fn qualified_layer(&self) -> String {
        format!("{}:{}", self.workspace, self.layer_name)
    }

    /// Field compared against region names, `name` unless configured.
    pub fn match_field(&self) -> &str {
        self.match_field.as_deref().unwrap_or("name")
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mapbox_token: Option<String>,
    pub data_dir: PathBuf,
    pub start_path: String,
    pub points: RemoteConfig,
    pub polygons: RemoteConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let points = RemoteConfig::default();
        let polygons = RemoteConfig {
            layer_name: "provinces".to_string(),
            match_field: Some("name".to_string()),
            ..points.clone()
        };
        Self {
            mapbox_token: None,
            data_dir: PathBuf::from("data"),
            start_path: "/".to_string(),
            points,
            polygons,
        }
    }
}

impl AppConfig {
    /// Reads `.env` / process variables, keeping defaults for anything unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        config.mapbox_token = text("MAP_BOX_API_TOKEN");
        if let Some(dir) = text("FOOTPRINTS_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = text("FOOTPRINTS_START_PAGE") {
            config.start_path = path;
        }

        let enabled = match text("GEOSERVER_ENABLED") {
            Some(v) => parse_flag(&v).unwrap_or_else(|| {
                log::warn!("GEOSERVER_ENABLED={:?} is not a boolean, remote layers stay disabled", v);
                false
            }),
            None => false,
        };

        for remote in [&mut config.points, &mut config.polygons] {
            remote.enabled = enabled;
            if let Some(url) = text("GEOSERVER_URL") {
                remote.base_url = url.trim_end_matches('/').to_string();
            }
            if let Some(workspace) = text("GEOSERVER_WORKSPACE") {
                remote.workspace = workspace;
            }
            if let Some(srs) = text("GEOSERVER_SRS") {
                remote.srs = srs;
            }
        }
        if let Some(layer) = text("GEOSERVER_POINTS_LAYER") {
            config.points.layer_name = layer;
        }
        if let Some(layer) = text("GEOSERVER_POLYGONS_LAYER") {
            config.polygons.layer_name = layer;
        }
        if let Some(field) = text("GEOSERVER_MATCH_FIELD") {
            config.polygons.match_field = Some(field);
        }

        config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
