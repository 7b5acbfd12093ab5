use std::path::PathBuf;

use super::cql;
use super::error::{LoadError, Result};
use super::geoserver::{GeoServerClient, WmsLayer};
use crate::config::{POINTS_FILE, POLYGONS_FILE};
use crate::map::features::{self, MEMBER_PROPERTY};
use crate::map::overlay::{DatasetKind, OverlayHandle, OverlayRequest, PlaceLayer};

/// Resolves overlays from the bundled snapshot first and GeoServer second.
#[derive(Debug, Clone)]
pub struct OverlayLoader {
    data_dir: PathBuf,
    geoserver: GeoServerClient,
}

impl OverlayLoader {
    pub fn new(data_dir: impl Into<PathBuf>, geoserver: GeoServerClient) -> Self {
        Self {
            data_dir: data_dir.into(),
            geoserver,
        }
    }

    /// Never yields an empty local overlay: an empty filtered snapshot moves
    /// on to the remote tier. Remote WMS overlays are images, so a filter
    /// matching nothing there still comes back as a (blank) overlay.
    pub async fn load_overlay(&self, request: &OverlayRequest) -> Result<OverlayHandle> {
        if request.kind == DatasetKind::Polygons && request.filter.regions().iter().all(|r| r.is_empty()) {
            return Err(LoadError::LocalResultEmpty { kind: request.kind });
        }

        match self.load_local(request).await {
            Ok(handle) => {
                log::info!(
                    "Loaded {} {} from the static snapshot",
                    handle.feature_count().unwrap_or_default(),
                    request.kind
                );
                return Ok(handle);
            }
            Err(e) => log::info!("{}, falling back to GeoServer", e),
        }

        self.load_remote(request).await
    }

    async fn load_local(&self, request: &OverlayRequest) -> Result<OverlayHandle> {
        let path = self.data_dir.join(match request.kind {
            DatasetKind::Points => POINTS_FILE,
            DatasetKind::Polygons => POLYGONS_FILE,
        });
        let fetch_failed = |reason: String| LoadError::LocalFetchFailed {
            path: path.clone(),
            reason,
        };

        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        let empty = LoadError::LocalResultEmpty { kind: request.kind };
        match request.kind {
            DatasetKind::Points => {
                let places = features::parse_places(&text).map_err(|e| fetch_failed(e.to_string()))?;
                let places = features::filter_places(places, request.filter.member());
                if places.is_empty() {
                    return Err(empty);
                }
                Ok(OverlayHandle::Markers(PlaceLayer::new(places)))
            }
            DatasetKind::Polygons => {
                let provinces = features::parse_provinces(&text).map_err(|e| fetch_failed(e.to_string()))?;
                let provinces =
                    features::filter_provinces(provinces, request.remote.match_field(), request.filter.regions());
                if provinces.is_empty() {
                    return Err(empty);
                }
                Ok(OverlayHandle::Regions(provinces))
            }
        }
    }

    async fn load_remote(&self, request: &OverlayRequest) -> Result<OverlayHandle> {
        let remote = &request.remote;
        if !remote.enabled {
            return Err(LoadError::RemoteDisabled);
        }
        let layer = remote.qualified_layer();

        let overlay = match request.kind {
            DatasetKind::Points => match request.filter.member() {
                Some(member) => WmsLayer::new(remote, Some(cql::equals(MEMBER_PROPERTY, member)), cql::point_style(&layer))?,
                None if request.feature_query => {
                    match self.geoserver.query_features(remote).await {
                        Ok(places) if !places.is_empty() => {
                            log::info!("Loaded {} points from the feature query", places.len());
                            return Ok(OverlayHandle::Markers(PlaceLayer::new(places)));
                        }
                        Ok(_) => log::warn!("Feature query for {} returned no points, rendering WMS", layer),
                        Err(e) => log::warn!("Feature query for {} failed: {}, rendering WMS", layer, e),
                    }
                    WmsLayer::new(remote, None, cql::point_style(&layer))?
                }
                None => WmsLayer::new(remote, None, cql::point_style(&layer))?,
            },
            DatasetKind::Polygons => {
                let filter = cql::contains_any(remote.match_field(), request.filter.regions());
                WmsLayer::new(remote, filter, cql::polygon_style(&layer))?
            }
        };

        log::info!("Rendering {} through WMS layer {}", request.kind, overlay.layers());
        Ok(OverlayHandle::Wms(overlay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use std::fs;

    const PLACES: &str = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [113.26, 23.13]},
         "properties": {"member": "lin", "location": "广州"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [104.07, 30.67]},
         "properties": {"member": "chen", "location": "成都"}}
    ]}"#;

    const PROVINCES: &str = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature",
         "geometry": {"type": "Polygon", "coordinates": [[[110, 20], [117, 20], [117, 25], [110, 20]]]},
         "properties": {"name": "广东省"}}
    ]}"#;

    fn remote(enabled: bool) -> RemoteConfig {
        RemoteConfig {
            enabled,
            base_url: "http://127.0.0.1:9/geoserver".to_string(),
            match_field: Some("name".to_string()),
            ..RemoteConfig::default()
        }
    }

    fn loader_with(files: &[(&str, &str)]) -> (tempfile::TempDir, OverlayLoader) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        let loader = OverlayLoader::new(dir.path(), GeoServerClient::new());
        (dir, loader)
    }

    #[tokio::test]
    async fn member_points_come_from_snapshot() {
        let (_dir, loader) = loader_with(&[(POINTS_FILE, PLACES)]);
        let request = OverlayRequest::points(Some("lin".into()), remote(false));
        match loader.load_overlay(&request).await.unwrap() {
            OverlayHandle::Markers(layer) => {
                assert_eq!(layer.places().len(), 1);
                assert_eq!(layer.places()[0].location, "广州");
            }
            other => panic!("expected markers, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_member_result_moves_to_remote_tier() {
        let (_dir, loader) = loader_with(&[(POINTS_FILE, PLACES)]);

        let disabled = OverlayRequest::points(Some("O'Brien".into()), remote(false));
        assert!(matches!(loader.load_overlay(&disabled).await, Err(LoadError::RemoteDisabled)));

        let enabled = OverlayRequest::points(Some("O'Brien".into()), remote(true));
        match loader.load_overlay(&enabled).await.unwrap() {
            OverlayHandle::Wms(layer) => assert_eq!(layer.cql_filter(), Some("member = 'O''Brien'")),
            other => panic!("expected a WMS overlay, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_snapshot_with_remote_disabled_fails_fast() {
        let (_dir, loader) = loader_with(&[]);
        let request = OverlayRequest::points(None, remote(false));
        assert!(matches!(loader.load_overlay(&request).await, Err(LoadError::RemoteDisabled)));

        let request = OverlayRequest::polygons(vec!["广东".into()], remote(false));
        assert!(matches!(loader.load_overlay(&request).await, Err(LoadError::RemoteDisabled)));
    }

    #[tokio::test]
    async fn broken_snapshot_falls_through() {
        let (_dir, loader) = loader_with(&[(POINTS_FILE, "{ not geojson")]);
        let request = OverlayRequest::points(Some("lin".into()), remote(true));
        assert!(matches!(loader.load_overlay(&request).await, Ok(OverlayHandle::Wms(_))));
    }

    #[tokio::test]
    async fn polygons_match_by_substring() {
        let (_dir, loader) = loader_with(&[(POLYGONS_FILE, PROVINCES)]);
        let request = OverlayRequest::polygons(vec!["广东".into(), "云南".into()], remote(false));
        match loader.load_overlay(&request).await.unwrap() {
            OverlayHandle::Regions(regions) => assert_eq!(regions[0].name("name"), Some("广东省")),
            other => panic!("expected regions, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unmatched_polygons_render_filtered_wms() {
        let (_dir, loader) = loader_with(&[(POLYGONS_FILE, PROVINCES)]);
        let request = OverlayRequest::polygons(vec!["云南".into(), "Xi'an".into()], remote(true));
        match loader.load_overlay(&request).await.unwrap() {
            OverlayHandle::Wms(layer) => assert_eq!(
                layer.cql_filter(),
                Some(r"name LIKE '%云南%' OR name LIKE '%Xi\'an%'")
            ),
            other => panic!("expected a WMS overlay, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_region_list_is_skipped() {
        let (_dir, loader) = loader_with(&[(POLYGONS_FILE, PROVINCES)]);
        let request = OverlayRequest::polygons(Vec::new(), remote(true));
        assert!(matches!(
            loader.load_overlay(&request).await,
            Err(LoadError::LocalResultEmpty { kind: DatasetKind::Polygons })
        ));
    }

    #[tokio::test]
    async fn aggregate_points_fall_back_to_unfiltered_wms() {
        let dir = tempfile::tempdir().unwrap();
        let client = GeoServerClient::new();
        let loader = OverlayLoader::new(dir.path(), client.clone());
        let request = OverlayRequest::all_points(remote(true));
        match loader.load_overlay(&request).await.unwrap() {
            OverlayHandle::Wms(layer) => assert!(layer.cql_filter().is_none()),
            other => panic!("expected a WMS overlay, got {:?}", other),
        }
        assert_eq!(client.callbacks().issued(), 1);
    }

    #[tokio::test]
    async fn memberless_points_skip_feature_query() {
        let dir = tempfile::tempdir().unwrap();
        let client = GeoServerClient::new();
        let loader = OverlayLoader::new(dir.path(), client.clone());
        let request = OverlayRequest::points(None, remote(true));
        match loader.load_overlay(&request).await.unwrap() {
            OverlayHandle::Wms(layer) => assert!(layer.cql_filter().is_none()),
            other => panic!("expected a WMS overlay, got {:?}", other),
        }
        assert_eq!(client.callbacks().issued(), 0);
    }
}
