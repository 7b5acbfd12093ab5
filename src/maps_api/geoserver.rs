use reqwest::Url;

use super::cql;
use super::error::{LoadError, TileError};
use super::jsonp::CallbackRegistry;
use crate::config::RemoteConfig;
use crate::map::features::{self, PlaceFeature};
use crate::map::map_tile::{GeoBounds, MapTile};

/// Pixel size requested for each WMS tile.
pub const WMS_TILE_SIZE: u32 = 256;

/// A GeoServer rendered overlay: every visible tile is a GetMap request
/// carrying the same filter and inline style.
#[derive(Debug, Clone)]
pub struct WmsLayer {
    endpoint: Url,
    layers: String,
    srs: String,
    cql_filter: Option<String>,
    sld_body: String,
}

impl WmsLayer {
    pub fn new(remote: &RemoteConfig, cql_filter: Option<String>, sld_body: String) -> Result<Self, LoadError> {
        let endpoint = service_endpoint(remote, "wms")
            .map_err(|e| LoadError::RemoteFetchFailed(e.to_string()))?;
        Ok(Self {
            endpoint,
            layers: remote.qualified_layer(),
            srs: remote.srs.clone(),
            cql_filter,
            sld_body,
        })
    }

    pub fn cql_filter(&self) -> Option<&str> {
        self.cql_filter.as_deref()
    }

    pub fn layers(&self) -> &str {
        &self.layers
    }

    pub fn tile_url(&self, zoom: u32, x: u32, y: u32) -> Url {
        let bbox = GeoBounds::from_x_y_zoom(x, y, zoom).to_bbox(&self.srs);
        let size = WMS_TILE_SIZE.to_string();
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("service", "WMS")
                .append_pair("version", "1.1.1")
                .append_pair("request", "GetMap")
                .append_pair("layers", &self.layers)
                .append_pair("styles", "")
                .append_pair("format", "image/png")
                .append_pair("transparent", "true")
                .append_pair("srs", &self.srs)
                .append_pair("width", &size)
                .append_pair("height", &size)
                .append_pair("bbox", &bbox)
                .append_pair("SLD_BODY", &self.sld_body);
            if let Some(filter) = &self.cql_filter {
                query.append_pair("CQL_FILTER", filter);
            }
        }
        url
    }
}

/// `{base}/{workspace}/{service}`
fn service_endpoint(remote: &RemoteConfig, service: &str) -> Result<Url, TileError> {
    let raw = format!(
        "{}/{}/{}",
        remote.base_url.trim_end_matches('/'),
        remote.workspace,
        service
    );
    Url::parse(&raw).map_err(|e| TileError::Url {
        url: raw.clone(),
        reason: e.to_string(),
    })
}

/// WFS GetFeature returning the whole point layer as JSONP.
pub fn feature_query_url(remote: &RemoteConfig, callback: &str) -> Result<Url, TileError> {
    let mut url = service_endpoint(remote, "ows")?;
    url.query_pairs_mut()
        .append_pair("service", "WFS")
        .append_pair("version", "1.0.0")
        .append_pair("request", "GetFeature")
        .append_pair("typeName", &remote.qualified_layer())
        .append_pair("outputFormat", "text/javascript")
        .append_pair("format_options", &format!("callback:{}", callback))
        .append_pair("srsName", "EPSG:4326");
    Ok(url)
}

#[derive(Debug, Clone, Default)]
pub struct GeoServerClient {
    client: reqwest::Client,
    callbacks: CallbackRegistry,
}

impl GeoServerClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            callbacks: CallbackRegistry::new(),
        }
    }

    #[cfg(test)]
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Raw point features through the feature-query endpoint.
    pub async fn query_features(&self, remote: &RemoteConfig) -> Result<Vec<PlaceFeature>, TileError> {
        let callback = self.callbacks.register();
        let url = feature_query_url(remote, callback.name())?;
        log::debug!("Querying features from {}", url);

        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(TileError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.text().await?;
        let payload = callback.unwrap_payload(&body)?;
        Ok(features::parse_places(payload)?)
    }

    /// Fetches and decodes one GetMap tile of a WMS overlay.
    pub async fn fetch_wms_tile(&self, layer: &WmsLayer, zoom: u32, x: u32, y: u32) -> Result<MapTile, TileError> {
        let url = layer.tile_url(zoom, x, y);
        log::trace!("Fetching WMS tile from {}", url);

        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(TileError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(MapTile::decode(x, y, zoom, &bytes)?)
    }
}
