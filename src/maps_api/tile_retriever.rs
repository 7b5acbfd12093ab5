use reqwest;

use super::error::TileError;
use crate::map::basemap::BasemapDefinition;
use crate::map::map_tile::MapTile;

#[derive(Debug, Clone)]
pub struct TileRetriever {
    client: reqwest::Client,
    access_token: Option<String>,
}

impl TileRetriever {
    pub fn new(access_token: Option<String>) -> Self {
        // OpenStreetMap refuses tile requests without an identifying agent
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            access_token,
        }
    }

    /// Asynchronously fetches a basemap tile and decodes it into a MapTile.
    pub async fn fetch_tile(
        &self,
        basemap: &BasemapDefinition,
        zoom: u32,
        x: u32,
        y: u32,
    ) -> Result<MapTile, TileError> {
        let url = basemap
            .tile_url(zoom, x, y, self.access_token.as_deref())
            .ok_or_else(|| TileError::MissingToken(basemap.name.to_string()))?;
        log::trace!("Fetching {} tile ({}, {}, {})", basemap.name, zoom, x, y);

        // Fetch the image data
        let response = self.client.get(&url).send().await?;

        // If the response is not successful, return an error
        if !response.status().is_success() {
            return Err(TileError::Status {
                status: response.status().as_u16(),
                // the query string may hold the access token
                url: url.split('?').next().unwrap_or_default().to_string(),
            });
        }

        let bytes = response.bytes().await?;

        // PNG for OpenStreetMap, WebP / JPEG for Mapbox
        Ok(MapTile::decode(x, y, zoom, &bytes)?)
    }
}
