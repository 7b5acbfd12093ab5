use serde::{Deserialize, Serialize};
use image;

/// Radius used by EPSG:3857 (spherical Web Mercator).
pub const EARTH_RADIUS: f64 = 6_378_137.0;
/// Latitude limit of the Web Mercator square.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct GeoBounds {
    south: f64, // minimum latitude
    west: f64,  // minimum longitude
    north: f64, // maximum latitude
    east: f64,  // maximum longitude
}

impl GeoBounds {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self { south, west, north, east }
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn center(&self) -> Coordinate {
        Coordinate {
            latitude: (self.south + self.north) / 2.0,
            longitude: (self.west + self.east) / 2.0,
        }
    }

    pub fn intersects(&self, other: &GeoBounds) -> bool {
        self.south <= other.north && self.north >= other.south && self.west <= other.east && self.east >= other.west
    }

    /// Smallest bounds holding every coordinate, `None` for an empty input.
    pub fn enclosing<'a>(coords: impl IntoIterator<Item = &'a Coordinate>) -> Option<Self> {
        coords.into_iter().fold(None, |acc, c| {
            Some(match acc {
                None => GeoBounds::new(c.latitude, c.longitude, c.latitude, c.longitude),
                Some(b) => GeoBounds {
                    south: b.south.min(c.latitude),
                    west: b.west.min(c.longitude),
                    north: b.north.max(c.latitude),
                    east: b.east.max(c.longitude),
                },
            })
        })
    }

    pub fn from_x_y_zoom(x: u32, y: u32, zoom: u32) -> Self {
        tile_coords_to_geo_bounds(x, y, zoom)
    }

    /// The bounds as a WMS 1.1.1 `bbox` value in the given reference system.
    /// Web Mercator gets metres, anything else is treated as lon/lat degrees.
    pub fn to_bbox(&self, srs: &str) -> String {
        if srs.eq_ignore_ascii_case("EPSG:3857") || srs.eq_ignore_ascii_case("EPSG:900913") {
            let (min_x, min_y) = Coordinate::new(self.south, self.west).to_mercator_meters();
            let (max_x, max_y) = Coordinate::new(self.north, self.east).to_mercator_meters();
            format!("{},{},{},{}", min_x, min_y, max_x, max_y)
        } else {
            format!("{},{},{},{}", self.west, self.south, self.east, self.north)
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Default for Coordinate {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Position in "world pixels" at a fractional zoom, where the whole
    /// world is `tile_size * 2^zoom` pixels wide.
    pub fn to_world_pixels(&self, zoom: f64, tile_size: f64) -> (f64, f64) {
        let world = tile_size * 2.0_f64.powf(zoom);
        let lat = self.latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = (self.longitude + 180.0) / 360.0 * world;
        let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0 * world;
        (x, y)
    }

    pub fn from_world_pixels(x: f64, y: f64, zoom: f64, tile_size: f64) -> Self {
        let world = tile_size * 2.0_f64.powf(zoom);
        let longitude = x / world * 360.0 - 180.0;
        let n = std::f64::consts::PI * (1.0 - 2.0 * y / world);
        let latitude = n.sinh().atan().to_degrees();
        Self { latitude, longitude }
    }

    pub fn to_mercator_meters(&self) -> (f64, f64) {
        let lat = self.latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = EARTH_RADIUS * self.longitude.to_radians();
        let y = EARTH_RADIUS * (std::f64::consts::PI / 4.0 + lat / 2.0).tan().ln();
        (x, y)
    }
}

pub struct MapTile {
    pub x: u32,
    pub y: u32,
    pub zoom: u32,
    pub image_size: egui::Vec2,  // In pixels
    image_data: Vec<u8>,         // RGBA8
    texture: Option<egui::TextureHandle>, // Has to be an option so it can be loaded lazily, without needing the app context
}

impl MapTile {
    pub fn new(x: u32, y: u32, zoom: u32, image_size: egui::Vec2, image_data: Vec<u8>) -> Self {
        Self {
            x,
            y,
            zoom,
            image_size,
            image_data,
            texture: None,
        }
    }

    /// Decodes an encoded PNG / JPEG / WebP tile into an RGBA tile.
    pub fn decode(x: u32, y: u32, zoom: u32, bytes: &[u8]) -> image::ImageResult<Self> {
        let image = image::load_from_memory(bytes)?;
        let image_buffer = image.to_rgba8();
        let (width, height) = image_buffer.dimensions();
        Ok(Self::new(
            x,
            y,
            zoom,
            egui::vec2(width as f32, height as f32),
            image_buffer.into_raw(),
        ))
    }

    pub fn texture(&mut self, ctx: &egui::Context) -> &egui::TextureHandle {
        let (x, y, zoom) = (self.x, self.y, self.zoom);
        let size = [self.image_size.x as usize, self.image_size.y as usize];
        let data = &self.image_data;
        self.texture.get_or_insert_with(|| {
            let color_image = egui::ColorImage::from_rgba_unmultiplied(size, data);
            ctx.load_texture(
                format!("tile_{}_{}_zoom{}", x, y, zoom),
                color_image,
                egui::TextureOptions::default(),
            )
        })
    }
}

/// Convert tile x, y, zoom into geographical bounds (GeoBounds)
pub fn tile_coords_to_geo_bounds(x: u32, y: u32, zoom: u32) -> GeoBounds {
    let n = 2.0_f64.powi(zoom as i32);

    // Longitudes:
    let west = x as f64 / n * 360.0 - 180.0;
    let east = (x as f64 + 1.0) / n * 360.0 - 180.0;

    // For latitudes, we use the inverse of the Mercator projection.
    let lat_rad_north = ((std::f64::consts::PI * (1.0 - 2.0 * y as f64 / n)).sinh()).atan();
    let lat_rad_south = ((std::f64::consts::PI * (1.0 - 2.0 * (y as f64 + 1.0) / n)).sinh()).atan();

    GeoBounds {
        south: lat_rad_south.to_degrees(),
        west,
        north: lat_rad_north.to_degrees(),
        east,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn world_pixels_round_trip_through_center() {
        let c = Coordinate::new(23.13, 113.26);
        let (x, y) = c.to_world_pixels(5.5, 256.0);
        let back = Coordinate::from_world_pixels(x, y, 5.5, 256.0);
        assert_relative_eq!(back.latitude(), 23.13, epsilon = 1e-9);
        assert_relative_eq!(back.longitude(), 113.26, epsilon = 1e-9);
    }

    #[test]
    fn zoom_zero_tile_covers_mercator_world() {
        let b = tile_coords_to_geo_bounds(0, 0, 0);
        assert_relative_eq!(b.west(), -180.0);
        assert_relative_eq!(b.east(), 180.0);
        assert_relative_eq!(b.north(), MAX_LATITUDE, epsilon = 1e-9);
        assert_relative_eq!(b.south(), -MAX_LATITUDE, epsilon = 1e-9);
    }

    #[test]
    fn bbox_in_degrees_and_meters() {
        let b = GeoBounds::new(0.0, 0.0, 10.0, 20.0);
        assert_eq!(b.to_bbox("EPSG:4326"), "0,0,20,10");
        let meters = b.to_bbox("EPSG:3857");
        let parts: Vec<f64> = meters.split(',').map(|p| p.parse().unwrap()).collect();
        assert_relative_eq!(parts[0], 0.0);
        assert_relative_eq!(parts[2], 2_226_389.815_858_32, epsilon = 1e-3);
    }

    #[test]
    fn enclosing_bounds() {
        let coords = [Coordinate::new(1.0, 2.0), Coordinate::new(-3.0, 5.0)];
        let b = GeoBounds::enclosing(coords.iter()).unwrap();
        assert_eq!(b, GeoBounds::new(-3.0, 2.0, 1.0, 5.0));
        assert!(GeoBounds::enclosing(std::iter::empty()).is_none());
    }
}
