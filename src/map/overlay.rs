use std::fmt;

use rstar::primitives::GeomWithData;
use rstar::RTree;

use super::features::{PlaceFeature, ProvinceFeature};
use crate::config::RemoteConfig;
use crate::maps_api::geoserver::WmsLayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Points,
    Polygons,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::Points => write!(f, "points"),
            DatasetKind::Polygons => write!(f, "polygons"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureFilter {
    All,
    Member(String),
    Regions(Vec<String>),
}

impl FeatureFilter {
    pub fn member(&self) -> Option<&str> {
        match self {
            FeatureFilter::Member(m) => Some(m),
            _ => None,
        }
    }

    pub fn regions(&self) -> &[String] {
        match self {
            FeatureFilter::Regions(r) => r,
            _ => &[],
        }
    }
}

/// One overlay to resolve, built fresh for every page.
#[derive(Debug, Clone)]
pub struct OverlayRequest {
    pub kind: DatasetKind,
    pub filter: FeatureFilter,
    pub remote: RemoteConfig,
    /// Whether the remote tier may try the raw feature query before WMS.
    pub feature_query: bool,
}

impl OverlayRequest {
    pub fn points(member: Option<String>, remote: RemoteConfig) -> Self {
        Self {
            kind: DatasetKind::Points,
            filter: member.map_or(FeatureFilter::All, FeatureFilter::Member),
            remote,
            feature_query: false,
        }
    }

    /// Every member's points, as the aggregate page shows them.
    pub fn all_points(remote: RemoteConfig) -> Self {
        Self {
            feature_query: true,
            ..Self::points(None, remote)
        }
    }

    pub fn polygons(regions: Vec<String>, remote: RemoteConfig) -> Self {
        Self {
            kind: DatasetKind::Polygons,
            filter: FeatureFilter::Regions(regions),
            remote,
            feature_query: false,
        }
    }
}

type IndexedPlace = GeomWithData<[f64; 2], usize>;

/// Markers plus an R-tree over their lng/lat positions for hover lookups.
pub struct PlaceLayer {
    places: Vec<PlaceFeature>,
    index: RTree<IndexedPlace>,
}

impl PlaceLayer {
    pub fn new(places: Vec<PlaceFeature>) -> Self {
        let index = RTree::bulk_load(
            places
                .iter()
                .enumerate()
                .map(|(i, p)| IndexedPlace::new([p.coordinates.longitude(), p.coordinates.latitude()], i))
                .collect(),
        );
        Self { places, index }
    }

    pub fn places(&self) -> &[PlaceFeature] {
        &self.places
    }

    pub fn nearest(&self, longitude: f64, latitude: f64) -> Option<&PlaceFeature> {
        self.index
            .nearest_neighbor(&[longitude, latitude])
            .and_then(|hit| self.places.get(hit.data))
    }
}

impl fmt::Debug for PlaceLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaceLayer").field("places", &self.places.len()).finish()
    }
}

/// A resolved, renderable overlay. Local results are never empty; a WMS
/// overlay is an image and cannot be checked for emptiness.
#[derive(Debug)]
pub enum OverlayHandle {
    Markers(PlaceLayer),
    Regions(Vec<ProvinceFeature>),
    Wms(WmsLayer),
}

impl OverlayHandle {
    pub fn source(&self) -> &'static str {
        match self {
            OverlayHandle::Markers(_) | OverlayHandle::Regions(_) => "local",
            OverlayHandle::Wms(_) => "wms",
        }
    }

    pub fn feature_count(&self) -> Option<usize> {
        match self {
            OverlayHandle::Markers(layer) => Some(layer.places().len()),
            OverlayHandle::Regions(regions) => Some(regions.len()),
            OverlayHandle::Wms(_) => None,
        }
    }
}
