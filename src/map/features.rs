use std::str::FromStr;

use geojson::{FeatureCollection, GeoJson, JsonObject, Value};
use serde::{Deserialize, Serialize};

use super::map_tile::{Coordinate, GeoBounds};

/// Property holding the member a place belongs to.
pub const MEMBER_PROPERTY: &str = "member";
/// Property holding the human readable place name.
pub const LOCATION_PROPERTY: &str = "location";

/// A visited place.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlaceFeature {
    pub member: String,
    pub location: String,
    pub coordinates: Coordinate,
}

impl PlaceFeature {
    pub fn new(member: impl Into<String>, location: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            member: member.into(),
            location: location.into(),
            coordinates: Coordinate::new(lat, lng),
        }
    }
}

/// A visited province boundary. Every polygon ring is kept, holes included.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvinceFeature {
    pub rings: Vec<Vec<Coordinate>>,
    pub properties: JsonObject,
    pub bounds: Option<GeoBounds>,
}

impl ProvinceFeature {
    pub fn new(rings: Vec<Vec<Coordinate>>, properties: JsonObject) -> Self {
        let bounds = GeoBounds::enclosing(rings.iter().flatten());
        Self { rings, properties, bounds }
    }

    /// Value of the configured name field, if it is a string.
    pub fn name(&self, field: &str) -> Option<&str> {
        self.properties.get(field).and_then(|v| v.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeatureParseError {
    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),
}

fn feature_collection(text: &str) -> Result<FeatureCollection, FeatureParseError> {
    let geojson = GeoJson::from_str(text)?;
    Ok(FeatureCollection::try_from(geojson)?)
}

fn position(p: &[f64]) -> Option<Coordinate> {
    // GeoJSON positions are [lng, lat]
    match p {
        [lng, lat, ..] => Some(Coordinate::new(*lat, *lng)),
        _ => None,
    }
}

fn ring(positions: &[Vec<f64>]) -> Vec<Coordinate> {
    positions.iter().filter_map(|p| position(p)).collect()
}

/// Reads point features. Features without a point geometry are skipped,
/// missing `member` / `location` properties become empty strings.
pub fn parse_places(text: &str) -> Result<Vec<PlaceFeature>, FeatureParseError> {
    let collection = feature_collection(text)?;
    let places = collection
        .features
        .iter()
        .filter_map(|feature| {
            let coordinates = match feature.geometry.as_ref().map(|g| &g.value) {
                Some(Value::Point(p)) => position(p)?,
                _ => return None,
            };
            let text_property = |key: &str| {
                feature
                    .property(key)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            Some(PlaceFeature {
                member: text_property(MEMBER_PROPERTY),
                location: text_property(LOCATION_PROPERTY),
                coordinates,
            })
        })
        .collect();
    Ok(places)
}

/// Reads polygon and multipolygon features. Other geometries are skipped.
pub fn parse_provinces(text: &str) -> Result<Vec<ProvinceFeature>, FeatureParseError> {
    let collection = feature_collection(text)?;
    let provinces = collection
        .features
        .into_iter()
        .filter_map(|feature| {
            let rings: Vec<Vec<Coordinate>> = match feature.geometry.map(|g| g.value) {
                Some(Value::Polygon(polygon)) => polygon.iter().map(|r| ring(r)).collect(),
                Some(Value::MultiPolygon(polygons)) => polygons
                    .iter()
                    .flat_map(|polygon| polygon.iter().map(|r| ring(r)))
                    .collect(),
                _ => return None,
            };
            Some(ProvinceFeature::new(rings, feature.properties.unwrap_or_default()))
        })
        .collect();
    Ok(provinces)
}

/// Keeps the places of `member`, or every place when no member is given.
pub fn filter_places(places: Vec<PlaceFeature>, member: Option<&str>) -> Vec<PlaceFeature> {
    match member {
        Some(member) => places.into_iter().filter(|p| p.member == member).collect(),
        None => places,
    }
}

/// Keeps provinces whose `field` value contains any of `names`.
///
/// The match is a loose substring test: `"广东"` keeps a stored `"广东省"`,
/// and one requested name may keep several provinces.
pub fn filter_provinces(
    provinces: Vec<ProvinceFeature>,
    field: &str,
    names: &[String],
) -> Vec<ProvinceFeature> {
    provinces
        .into_iter()
        .filter(|province| {
            province.name(field).is_some_and(|stored| {
                names
                    .iter()
                    .any(|requested| !requested.is_empty() && stored.contains(requested.as_str()))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLACES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [113.26, 23.13]},
             "properties": {"member": "lin", "location": "广州"}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [121.47, 31.23]},
             "properties": {"member": "chen", "location": "上海"}},
            {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
             "properties": {"member": "lin"}}
        ]
    }"#;

    const PROVINCES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "geometry": {"type": "Polygon", "coordinates": [[[110, 20], [117, 20], [117, 25], [110, 25], [110, 20]]]},
             "properties": {"name": "广东省"}},
            {"type": "Feature",
             "geometry": {"type": "MultiPolygon", "coordinates": [
                 [[[104, 21], [112, 21], [112, 26], [104, 26], [104, 21]]],
                 [[[108, 18], [109, 18], [109, 19], [108, 18]]]
             ]},
             "properties": {"name": "广西壮族自治区"}},
            {"type": "Feature",
             "geometry": {"type": "Polygon", "coordinates": [[[120, 30], [122, 30], [122, 32], [120, 30]]]},
             "properties": {"NAME_1": "Shanghai"}}
        ]
    }"#;

    #[test]
    fn parses_points_and_skips_other_geometries() {
        let places = parse_places(PLACES).unwrap();
        assert_eq!(places.len(), 2);
        assert_eq!(places[0], PlaceFeature::new("lin", "广州", 23.13, 113.26));
    }

    #[test]
    fn member_filter_is_exact() {
        let places = parse_places(PLACES).unwrap();
        assert_eq!(filter_places(places.clone(), Some("lin")).len(), 1);
        assert!(filter_places(places.clone(), Some("li")).is_empty());
        assert_eq!(filter_places(places, None).len(), 2);
    }

    #[test]
    fn parses_multipolygons_into_rings() {
        let provinces = parse_provinces(PROVINCES).unwrap();
        assert_eq!(provinces.len(), 3);
        assert_eq!(provinces[1].rings.len(), 2);
        let bounds = provinces[0].bounds.unwrap();
        assert_eq!(bounds, GeoBounds::new(20.0, 110.0, 25.0, 117.0));
    }

    #[test]
    fn shorter_requested_name_matches_longer_stored_name() {
        let provinces = parse_provinces(PROVINCES).unwrap();
        let kept = filter_provinces(provinces, "name", &["广东".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name("name"), Some("广东省"));
    }

    #[test]
    fn region_filter_uses_configured_field() {
        let provinces = parse_provinces(PROVINCES).unwrap();
        let names = vec!["Shang".to_string(), "广".to_string()];
        assert_eq!(filter_provinces(provinces.clone(), "NAME_1", &names).len(), 1);
        // "广" is contained in both Chinese names
        assert_eq!(filter_provinces(provinces.clone(), "name", &names).len(), 2);
        assert!(filter_provinces(provinces, "name", &[String::new()]).is_empty());
    }

    #[test]
    fn rejects_non_collections() {
        assert!(parse_places("{\"type\": \"Point\", \"coordinates\": [1, 2]}").is_err());
        assert!(parse_provinces("not json").is_err());
    }
}
