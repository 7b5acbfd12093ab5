use std::collections::{HashMap, HashSet};

use crate::config::AppConfig;
use crate::map::features::PlaceFeature;
use crate::map::map::MapState;
use crate::map::map_tile::Coordinate;
use crate::map::overlay::OverlayRequest;

pub const LANDING_PATH: &str = "/";
pub const AGGREGATE_PATH: &str = "/map";
pub const MEMBER_PATH_PREFIX: &str = "/member/";
/// Attribute carrying the member a personal page belongs to.
pub const MEMBER_ATTRIBUTE: &str = "data-member";

pub const DEFAULT_CENTER: (f64, f64) = (35.0, 105.0);
pub const AGGREGATE_ZOOM: f32 = 4.0;
pub const MEMBER_ZOOM: f32 = 3.0;

/// Regions shown on the aggregate page.
pub const AGGREGATE_REGIONS: &[&str] = &[
    "北京", "上海", "浙江", "广东", "广西", "湖南", "四川", "重庆", "云南", "河北", "山东",
];

/// Regions each member has visited.
pub const MEMBER_REGIONS: &[(&str, &[&str])] = &[
    ("lin", &["广东", "广西", "湖南"]),
    ("chen", &["四川", "重庆", "云南"]),
    ("wang", &["北京", "河北", "山东"]),
];

/// Structural elements a page may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    EnterControl,
    MapContainer,
    ZoomIn,
    ZoomOut,
    BasemapSelector,
}

/// What the host knows about the page being shown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDocument {
    pub path: String,
    pub attributes: HashMap<String, String>,
    pub anchors: HashSet<Anchor>,
}

impl PageDocument {
    /// The document each route of the site renders.
    pub fn for_route(path: &str) -> Self {
        let mut document = PageDocument {
            path: path.to_string(),
            ..Default::default()
        };
        let map_anchors = [Anchor::MapContainer, Anchor::ZoomIn, Anchor::ZoomOut, Anchor::BasemapSelector];

        if normalize(path) == LANDING_PATH {
            document.anchors.insert(Anchor::EnterControl);
        } else if normalize(path) == AGGREGATE_PATH {
            document.anchors.extend(map_anchors);
        } else if let Some(member) = path.strip_prefix(MEMBER_PATH_PREFIX) {
            let member = member.trim_end_matches('/');
            if !member.is_empty() {
                document.attributes.insert(MEMBER_ATTRIBUTE.to_string(), member.to_string());
            }
            document.anchors.extend(map_anchors);
        }
        document
    }

    pub fn has(&self, anchor: Anchor) -> bool {
        self.anchors.contains(&anchor)
    }
}

fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => LANDING_PATH,
        trimmed => trimmed,
    }
}

pub fn member_path(member: &str) -> String {
    format!("{}{}", MEMBER_PATH_PREFIX, member)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKind {
    Landing,
    AggregateMap,
    MemberMap { member: Option<String> },
    Blank,
}

/// Classifies a document once. The aggregate path wins over a map
/// container, which wins over an enter control.
pub fn classify(document: &PageDocument) -> PageKind {
    if normalize(&document.path) == AGGREGATE_PATH {
        PageKind::AggregateMap
    } else if document.has(Anchor::MapContainer) {
        PageKind::MemberMap {
            member: document.attributes.get(MEMBER_ATTRIBUTE).cloned(),
        }
    } else if document.has(Anchor::EnterControl) {
        PageKind::Landing
    } else {
        PageKind::Blank
    }
}

/// Visited regions of a member; an unknown member has none.
pub fn regions_for(member: &str) -> Vec<String> {
    MEMBER_REGIONS
        .iter()
        .find(|(name, _)| *name == member)
        .map(|(_, regions)| regions.iter().map(|r| r.to_string()).collect())
        .unwrap_or_default()
}

pub fn members() -> impl Iterator<Item = &'static str> {
    MEMBER_REGIONS.iter().map(|(name, _)| *name)
}

impl PageKind {
    pub fn initial_view(&self) -> Option<MapState> {
        let center = Coordinate::new(DEFAULT_CENTER.0, DEFAULT_CENTER.1);
        match self {
            PageKind::AggregateMap => Some(MapState::new(center, AGGREGATE_ZOOM)),
            PageKind::MemberMap { .. } => Some(MapState::new(center, MEMBER_ZOOM)),
            PageKind::Landing | PageKind::Blank => None,
        }
    }

    /// Point request first, then polygons. A member without a region
    /// mapping gets no polygon request at all.
    pub fn overlay_requests(&self, config: &AppConfig) -> Vec<OverlayRequest> {
        match self {
            PageKind::AggregateMap => vec![
                OverlayRequest::all_points(config.points.clone()),
                OverlayRequest::polygons(
                    AGGREGATE_REGIONS.iter().map(|r| r.to_string()).collect(),
                    config.polygons.clone(),
                ),
            ],
            PageKind::MemberMap { member } => {
                let mut requests = vec![OverlayRequest::points(member.clone(), config.points.clone())];
                let regions = member.as_deref().map(regions_for).unwrap_or_default();
                if regions.is_empty() {
                    log::info!("No region mapping for member {:?}, skipping province overlay", member);
                } else {
                    requests.push(OverlayRequest::polygons(regions, config.polygons.clone()));
                }
                requests
            }
            PageKind::Landing | PageKind::Blank => Vec::new(),
        }
    }
}

/// Markers shown when the point overlay cannot be loaded at all.
pub fn default_places() -> Vec<PlaceFeature> {
    vec![
        PlaceFeature::new("", "北京", 39.9042, 116.4074),
        PlaceFeature::new("", "上海", 31.2304, 121.4737),
        PlaceFeature::new("", "广州", 23.1291, 113.2644),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::overlay::{DatasetKind, FeatureFilter};

    #[test]
    fn routes_classify_to_one_kind_each() {
        assert_eq!(classify(&PageDocument::for_route("/")), PageKind::Landing);
        assert_eq!(classify(&PageDocument::for_route("/map/")), PageKind::AggregateMap);
        assert_eq!(
            classify(&PageDocument::for_route("/member/lin")),
            PageKind::MemberMap { member: Some("lin".to_string()) }
        );
        assert_eq!(classify(&PageDocument::for_route("/about")), PageKind::Blank);
    }

    #[test]
    fn aggregate_path_wins_over_other_anchors() {
        let mut document = PageDocument::for_route("/map");
        document.anchors.insert(Anchor::EnterControl);
        document.attributes.insert(MEMBER_ATTRIBUTE.to_string(), "lin".to_string());
        assert_eq!(classify(&document), PageKind::AggregateMap);

        let mut document = PageDocument::for_route("/");
        document.anchors.insert(Anchor::MapContainer);
        assert_eq!(classify(&document), PageKind::MemberMap { member: None });
    }

    #[test]
    fn unknown_member_skips_polygons_without_error() {
        assert!(regions_for("nobody").is_empty());
        let kind = classify(&PageDocument::for_route("/member/nobody"));
        let requests = kind.overlay_requests(&AppConfig::default());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, DatasetKind::Points);
        assert_eq!(requests[0].filter, FeatureFilter::Member("nobody".to_string()));
    }

    #[test]
    fn member_pages_request_their_regions() {
        let kind = PageKind::MemberMap { member: Some("chen".to_string()) };
        let requests = kind.overlay_requests(&AppConfig::default());
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].filter.regions(), ["四川", "重庆", "云南"].map(String::from));
        assert_eq!(kind.initial_view().unwrap().zoom(), MEMBER_ZOOM);
    }

    #[test]
    fn memberless_page_never_uses_feature_query() {
        let kind = PageKind::MemberMap { member: None };
        let requests = kind.overlay_requests(&AppConfig::default());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].filter, FeatureFilter::All);
        assert!(!requests[0].feature_query);
    }

    #[test]
    fn aggregate_page_requests_everything() {
        let requests = PageKind::AggregateMap.overlay_requests(&AppConfig::default());
        assert_eq!(requests[0].filter, FeatureFilter::All);
        assert!(requests[0].feature_query);
        assert_eq!(requests[1].filter.regions().len(), AGGREGATE_REGIONS.len());
        assert!(PageKind::Landing.overlay_requests(&AppConfig::default()).is_empty());
        assert!(PageKind::Landing.initial_view().is_none());
    }
}
